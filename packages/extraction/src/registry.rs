//! Ordered strategy registry with bounded delegation.
//!
//! ```text
//! dispatch(url)
//!     │
//!     ├─► Fetcher.fetch(url)
//!     ├─► first strategy whose can_handle(final_url, headers) is true
//!     └─► Strategy.extract(page)
//!             ├─► Data      → done
//!             └─► Delegate  → dispatch again (hop cap + visited set)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::error::{CrawlError, ExtractionError, Result};
use crate::strategies::{default_strategies, Strategy};
use crate::traits::fetcher::Fetcher;
use crate::types::{ExtractedData, Extraction};

/// Successful dispatch outcome.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub data: ExtractedData,
    /// Name of the strategy that produced `data`
    pub strategy: &'static str,
    /// Every URL fetched, starting with the requested one
    pub chain: Vec<String>,
}

impl Dispatched {
    /// Number of delegation hops taken.
    pub fn hops(&self) -> usize {
        self.chain.len().saturating_sub(1)
    }
}

/// Holds strategies in registration order and runs dispatch.
pub struct StrategyRegistry {
    strategies: Vec<Strategy>,
    fetcher: Arc<dyn Fetcher>,
    max_hops: usize,
}

impl StrategyRegistry {
    pub const DEFAULT_MAX_HOPS: usize = 3;

    /// Registry with the built-in strategies.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_strategies(fetcher, default_strategies())
    }

    /// Registry with an explicit strategy order.
    pub fn with_strategies(fetcher: Arc<dyn Fetcher>, strategies: Vec<Strategy>) -> Self {
        Self {
            strategies,
            fetcher,
            max_hops: Self::DEFAULT_MAX_HOPS,
        }
    }

    /// Override the delegation hop cap.
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// First strategy, in registration order, that claims the URL.
    pub fn select(
        &self,
        url: &Url,
        headers: &std::collections::HashMap<String, String>,
    ) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.can_handle(url, headers))
    }

    /// Fetch `url`, extract with the first matching strategy, and follow delegations.
    pub async fn dispatch(&self, url: &str) -> Result<Dispatched> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut chain: Vec<String> = Vec::new();
        let mut current = url.to_string();

        visited.insert(visit_key(&current)?);

        loop {
            chain.push(current.clone());

            let page = self.fetcher.fetch(&current).await?;
            let final_url = Url::parse(&page.final_url).map_err(|_| CrawlError::InvalidUrl {
                url: page.final_url.clone(),
            })?;

            // A redirect back onto an earlier hop is the same cycle in disguise
            if page.final_url != current && !visited.insert(visit_key(&page.final_url)?) {
                return Err(ExtractionError::DelegationCycle {
                    url: page.final_url.clone(),
                });
            }

            let strategy = self.select(&final_url, &page.headers).ok_or_else(|| {
                ExtractionError::StrategyNotFound {
                    url: current.clone(),
                }
            })?;

            debug!(
                url = %current,
                final_url = %page.final_url,
                strategy = strategy.name(),
                "strategy selected"
            );

            match strategy.extract(&page)? {
                Extraction::Data(data) => {
                    return Ok(Dispatched {
                        data,
                        strategy: strategy.name(),
                        chain,
                    });
                }
                Extraction::Delegate(next) => {
                    let hop = chain.len();
                    if !visited.insert(visit_key(&next)?) {
                        return Err(ExtractionError::DelegationCycle { url: next });
                    }
                    if hop > self.max_hops {
                        return Err(ExtractionError::DelegationLimit {
                            url: next,
                            max_hops: self.max_hops,
                        });
                    }

                    info!(
                        from = %current,
                        to = %next,
                        hop,
                        strategy = strategy.name(),
                        "strategy delegated"
                    );
                    current = next;
                }
            }
        }
    }
}

/// URL identity for cycle detection: parsed, without fragment.
fn visit_key(url: &str) -> Result<String> {
    let mut parsed = Url::parse(url).map_err(|_| CrawlError::InvalidUrl {
        url: url.to_string(),
    })?;
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::{MockFailure, MockFetcher};
    use crate::traits::fetcher::FetchedPage;
    use crate::types::ExtractedKind;

    fn registry(mock: &MockFetcher) -> StrategyRegistry {
        StrategyRegistry::new(Arc::new(mock.clone()))
    }

    fn pubmed_page(pmid: u32, pmc: u32) -> String {
        format!(
            r#"<a href="https://www.ncbi.nlm.nih.gov/pmc/articles/PMC{pmc}/">Free PMC article {pmid}</a>"#
        )
    }

    #[tokio::test]
    async fn test_dispatch_generic_html() {
        let mock = MockFetcher::new().with_html(
            "https://example.com/post",
            "<title>Hello</title><p>Body text</p>",
        );

        let result = registry(&mock).dispatch("https://example.com/post").await.unwrap();

        assert_eq!(result.strategy, "html");
        assert_eq!(result.hops(), 0);
        assert_eq!(result.data.title.as_deref(), Some("Hello"));
        assert_eq!(result.data.kind, ExtractedKind::Article);
    }

    #[tokio::test]
    async fn test_pubmed_delegates_to_pmc_full_text() {
        let mock = MockFetcher::new()
            .with_html("https://pubmed.ncbi.nlm.nih.gov/111/", &pubmed_page(111, 222))
            .with_html(
                "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC222/",
                "<title>Full text</title><p>Methods and results.</p>",
            );

        let result = registry(&mock)
            .dispatch("https://pubmed.ncbi.nlm.nih.gov/111/")
            .await
            .unwrap();

        assert_eq!(result.strategy, "html");
        assert_eq!(result.hops(), 1);
        assert_eq!(
            result.chain,
            vec![
                "https://pubmed.ncbi.nlm.nih.gov/111/".to_string(),
                "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC222/".to_string(),
            ]
        );
        assert!(result.data.text.contains("Methods and results."));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_a_cycle() {
        // PMC copy redirects back to the citation, which points at the PMC copy again
        let mock = MockFetcher::new()
            .with_html("https://pubmed.ncbi.nlm.nih.gov/1/", &pubmed_page(1, 1))
            .with_page(
                FetchedPage::new("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/", pubmed_page(1, 1))
                    .with_content_type("text/html")
                    .with_final_url("https://pubmed.ncbi.nlm.nih.gov/1/"),
            );

        let err = registry(&mock)
            .dispatch("https://pubmed.ncbi.nlm.nih.gov/1/")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::DelegationCycle { .. }));
        assert!(!err.is_transient());
        assert_eq!(mock.fetch_call_count(), 2);
    }

    #[tokio::test]
    async fn test_endless_delegation_stops_at_hop_cap() {
        // Each PMC link redirects to a fresh citation page with another PMC link
        let mut mock = MockFetcher::new()
            .with_html("https://pubmed.ncbi.nlm.nih.gov/1/", &pubmed_page(1, 1));
        for n in 1..=10u32 {
            mock = mock.with_page(
                FetchedPage::new(
                    format!("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC{n}/"),
                    pubmed_page(n + 1, n + 1),
                )
                .with_content_type("text/html")
                .with_final_url(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", n + 1)),
            );
        }

        let err = registry(&mock)
            .dispatch("https://pubmed.ncbi.nlm.nih.gov/1/")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExtractionError::DelegationLimit { max_hops: 3, .. }
        ));
        // The original fetch plus three delegated hops
        assert_eq!(mock.fetch_call_count(), 4);
    }

    #[tokio::test]
    async fn test_unclaimed_content_type_is_strategy_not_found() {
        let mock = MockFetcher::new().with_page(
            FetchedPage::new("https://example.com/archive.zip", "").with_content_type("application/zip"),
        );

        let err = registry(&mock)
            .dispatch("https://example.com/archive.zip")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::StrategyNotFound { ref url } if url == "https://example.com/archive.zip"));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_transient() {
        let url = "https://example.com/slow";
        let mock = MockFetcher::new()
            .with_html(url, "<p>eventually</p>")
            .with_failures(url, [MockFailure::Timeout]);

        let err = registry(&mock).dispatch(url).await.unwrap_err();
        assert!(err.is_transient());

        assert!(registry(&mock).dispatch(url).await.is_ok());
    }
}
