//! Rate-limited fetcher wrapper.
//!
//! Wraps any Fetcher with rate limiting using the governor crate.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::CrawlResult;
use crate::traits::fetcher::{FetchedPage, Fetcher};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fetcher wrapper that enforces a process-wide request rate.
pub struct RateLimitedFetcher<F: Fetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

impl<F: Fetcher> RateLimitedFetcher<F> {
    /// Create a new rate-limited fetcher.
    pub fn new(fetcher: F, requests_per_second: NonZeroU32) -> Self {
        Self::with_quota(fetcher, Quota::per_second(requests_per_second))
    }

    /// Create with a custom quota.
    pub fn with_quota(fetcher: F, quota: Quota) -> Self {
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        self.limiter.until_ready().await;
        self.inner.fetch(url).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
