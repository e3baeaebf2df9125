//! SSRF protection for outbound fetches.

mod url_validator;

pub use url_validator::UrlValidator;
