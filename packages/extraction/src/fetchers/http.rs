//! HTTP fetcher backed by reqwest.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CrawlError, CrawlResult};
use crate::traits::fetcher::{media_type, FetchedPage, Fetcher};

/// Media types whose bodies are decoded as text.
fn is_textual(media_type: Option<&str>) -> bool {
    match media_type {
        None => true,
        Some(mt) => {
            mt.starts_with("text/")
                || mt.ends_with("+xml")
                || mt.ends_with("/xml")
                || mt.ends_with("/json")
        }
    }
}

/// Fetches one URL per call with a bounded timeout.
///
/// Every request carries its own timeout; a timeout surfaces as
/// [`CrawlError::Timeout`] so callers can treat it as transient.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher with the given request timeout.
    pub fn new(timeout: Duration) -> CrawlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::Http(Box::new(e)))?;

        Ok(Self {
            client,
            user_agent: "DigestBot/1.0".to_string(),
        })
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn map_send_error(url: &str, e: reqwest::Error) -> CrawlError {
        if e.is_timeout() {
            CrawlError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            CrawlError::Connect {
                url: url.to_string(),
            }
        } else if e.is_builder() {
            CrawlError::InvalidUrl {
                url: url.to_string(),
            }
        } else {
            CrawlError::Http(Box::new(e))
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        debug!(url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                Self::map_send_error(url, e)
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CrawlError::RateLimitExceeded {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;

        let body = if is_textual(media_type(&headers).as_deref()) {
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            String::new()
        };

        debug!(
            url = %url,
            final_url = %final_url,
            byte_len = bytes.len(),
            "HTTP fetch complete"
        );

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            headers,
            body,
            byte_len: bytes.len(),
            fetched_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
