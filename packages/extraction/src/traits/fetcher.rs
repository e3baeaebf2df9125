//! Fetcher trait for pluggable network access.
//!
//! Strategies never touch the network themselves. The registry fetches a URL
//! through a [`Fetcher`], hands the response headers to each strategy's
//! `can_handle`, and passes the whole [`FetchedPage`] to the selected
//! strategy's `extract`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use extraction::{Fetcher, HttpFetcher, ValidatedFetcher};
//!
//! let fetcher = ValidatedFetcher::new(HttpFetcher::new(Duration::from_secs(30))?);
//! let page = fetcher.fetch("https://example.com/post").await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CrawlError, CrawlResult};
use crate::security::UrlValidator;

/// A fetched HTTP response, reduced to what strategies need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,

    /// URL after following redirects
    pub final_url: String,

    /// HTTP status code
    pub status: u16,

    /// Response headers with lowercased names
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Decoded body for textual responses, empty for binary ones
    pub body: String,

    /// Size of the response body in bytes
    pub byte_len: usize,

    /// When the response was received
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    /// Create a 200 response with minimal fields.
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        let body = body.into();
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            headers: HashMap::new(),
            byte_len: body.len(),
            body,
            fetched_at: Utc::now(),
        }
    }

    /// Set a response header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the content-type header.
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("content-type", content_type)
    }

    /// Record that the request was redirected.
    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    /// Set the byte length for binary bodies.
    pub fn with_byte_len(mut self, byte_len: usize) -> Self {
        self.byte_len = byte_len;
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type without parameters, lowercased (e.g. `text/html`).
    pub fn media_type(&self) -> Option<String> {
        media_type(&self.headers)
    }

    /// Check if this page has any text.
    pub fn has_content(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

/// Media type from a lowercased header map, without parameters.
pub fn media_type(headers: &HashMap<String, String>) -> Option<String> {
    headers.get("content-type").map(|ct| {
        ct.split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    })
}

/// Fetcher trait for retrieving a single URL.
///
/// Implementations:
/// - `HttpFetcher` - reqwest with a per-request timeout
/// - `RateLimitedFetcher` - governor-backed wrapper
/// - `ValidatedFetcher` - SSRF-checking wrapper
/// - `MockFetcher` - canned responses for tests
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch one URL. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage>;

    /// Get the fetcher name for logging.
    fn name(&self) -> &str;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        (**self).fetch(url).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A fetcher that validates URLs before fetching.
///
/// Wrap any network-backed fetcher with this in production, since URLs come
/// from user submissions and from delegation targets found in page bodies.
pub struct ValidatedFetcher<F: Fetcher> {
    inner: F,
    validator: UrlValidator,
}

impl<F: Fetcher> ValidatedFetcher<F> {
    /// Create a new validated fetcher with default security rules.
    pub fn new(fetcher: F) -> Self {
        Self {
            inner: fetcher,
            validator: UrlValidator::new(),
        }
    }

    /// Create with a custom validator.
    pub fn with_validator(fetcher: F, validator: UrlValidator) -> Self {
        Self {
            inner: fetcher,
            validator,
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for ValidatedFetcher<F> {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        self.validator
            .validate_with_dns(url)
            .await
            .map_err(CrawlError::Security)?;

        let page = self.inner.fetch(url).await?;

        // Redirects may land somewhere the original URL would not be allowed to go
        if page.final_url != page.url {
            self.validator
                .validate(&page.final_url)
                .map_err(CrawlError::Security)?;
        }

        Ok(page)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
