//! Mock fetcher for testing.
//!
//! Provides canned pages keyed by URL, scripted failures, and call tracking.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::error::{CrawlError, CrawlResult};
use crate::traits::fetcher::{FetchedPage, Fetcher};

/// A failure the mock returns instead of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    RateLimited,
    Connect,
    Status(u16),
}

impl MockFailure {
    fn into_error(self, url: &str) -> CrawlError {
        let url = url.to_string();
        match self {
            MockFailure::Timeout => CrawlError::Timeout { url },
            MockFailure::RateLimited => CrawlError::RateLimitExceeded { url },
            MockFailure::Connect => CrawlError::Connect { url },
            MockFailure::Status(status) => CrawlError::Status { url, status },
        }
    }
}

/// Mock fetcher for testing.
///
/// Unknown URLs answer with a 404 status error. Scripted failures for a URL
/// are consumed in order before its page is returned.
///
/// # Example
///
/// ```rust
/// use extraction::{FetchedPage, MockFailure, MockFetcher};
///
/// let mock = MockFetcher::new()
///     .with_page(FetchedPage::new("https://example.com", "<p>Hello</p>"))
///     .with_failures("https://example.com", [MockFailure::Timeout]);
/// // First fetch times out, the second returns the page
/// ```
#[derive(Default, Clone)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, FetchedPage>>>,
    failures: Arc<RwLock<HashMap<String, VecDeque<MockFailure>>>>,
    fetch_calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    /// Create a new empty mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page keyed by its requested URL.
    pub fn add_page(&self, page: FetchedPage) {
        self.pages.write().unwrap().insert(page.url.clone(), page);
    }

    /// Builder form of [`add_page`](Self::add_page).
    pub fn with_page(self, page: FetchedPage) -> Self {
        self.add_page(page);
        self
    }

    /// Add an HTML page.
    pub fn with_html(self, url: &str, html: &str) -> Self {
        self.with_page(FetchedPage::new(url, html).with_content_type("text/html; charset=utf-8"))
    }

    /// Queue failures returned for `url` before any page.
    pub fn with_failures(self, url: &str, failures: impl IntoIterator<Item = MockFailure>) -> Self {
        self.failures
            .write()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(failures);
        self
    }

    /// Get the number of times fetch was called.
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.read().unwrap().len()
    }

    /// Get the URLs that were requested, in order.
    pub fn fetch_calls(&self) -> Vec<String> {
        self.fetch_calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        self.fetch_calls.write().unwrap().push(url.to_string());

        let scripted = self
            .failures
            .write()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        if let Some(failure) = scripted {
            return Err(failure.into_error(url));
        }

        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| CrawlError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_canned_page_and_records_calls() {
        let mock = MockFetcher::new().with_html("https://example.com/", "<p>hi</p>");

        let page = mock.fetch("https://example.com/").await.unwrap();
        assert_eq!(page.body, "<p>hi</p>");
        assert_eq!(page.media_type().as_deref(), Some("text/html"));
        assert_eq!(mock.fetch_call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_url_is_404() {
        let mock = MockFetcher::new();
        let err = mock.fetch("https://missing.example.com/").await.unwrap_err();
        assert!(matches!(err, CrawlError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let url = "https://example.com/";
        let mock = MockFetcher::new()
            .with_html(url, "ok")
            .with_failures(url, [MockFailure::Timeout, MockFailure::Status(503)]);

        assert!(matches!(mock.fetch(url).await, Err(CrawlError::Timeout { .. })));
        assert!(matches!(
            mock.fetch(url).await,
            Err(CrawlError::Status { status: 503, .. })
        ));
        assert!(mock.fetch(url).await.is_ok());
    }
}
