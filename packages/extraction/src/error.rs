//! Typed errors for the extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Callers that need a
//! retry decision should use [`ExtractionError::is_transient`] rather than
//! matching on display strings.

use thiserror::Error;

/// Errors that can occur during extraction operations.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Fetching a URL failed
    #[error("fetch failed: {0}")]
    Crawl(#[from] CrawlError),

    /// No registered strategy claims the URL
    #[error("no extraction strategy handles: {url}")]
    StrategyNotFound { url: String },

    /// Delegation chain exceeded the hop cap
    #[error("delegation limit of {max_hops} hops exceeded at: {url}")]
    DelegationLimit { url: String, max_hops: usize },

    /// Delegation chain revisited a URL
    #[error("delegation cycle detected at: {url}")]
    DelegationCycle { url: String },

    /// The fetched document is not usable by the selected strategy
    #[error("malformed content at {url}: {reason}")]
    Malformed { url: String, reason: String },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl ExtractionError {
    /// Whether retrying the same extraction later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractionError::Crawl(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Errors that can occur while fetching a single URL.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Security validation failed
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// HTTP request failed before a response was received
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Upstream answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Rate limit exceeded (HTTP 429 or local limiter)
    #[error("rate limit exceeded: {url}")]
    RateLimitExceeded { url: String },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Connection timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Connection refused or reset
    #[error("connection failed: {url}")]
    Connect { url: String },
}

impl CrawlError {
    /// Timeouts, rate limiting, 5xx and connection failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            CrawlError::Timeout { .. }
            | CrawlError::RateLimitExceeded { .. }
            | CrawlError::Connect { .. } => true,
            CrawlError::Status { status, .. } => *status == 429 || *status >= 500,
            CrawlError::Http(_)
            | CrawlError::Security(_)
            | CrawlError::InvalidUrl { .. } => false,
        }
    }
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result type alias for security operations.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
