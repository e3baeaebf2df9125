//! Fetcher implementations.

mod http;
mod mock;
mod rate_limited;

pub use http::HttpFetcher;
pub use mock::{MockFailure, MockFetcher};
pub use rate_limited::RateLimitedFetcher;
