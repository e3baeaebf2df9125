//! Strategy-Dispatched Content Extraction
//!
//! Turns a submitted URL into normalized [`ExtractedData`] by fetching it,
//! picking the first registered [`Strategy`] that claims it, and following
//! bounded delegations between strategies (e.g. a PubMed citation pointing at
//! its PubMed Central full text).
//!
//! # Usage
//!
//! ```rust,ignore
//! use extraction::{HttpFetcher, StrategyRegistry, ValidatedFetcher};
//!
//! let fetcher = ValidatedFetcher::new(HttpFetcher::new(Duration::from_secs(30))?);
//! let registry = StrategyRegistry::new(Arc::new(fetcher));
//!
//! let dispatched = registry.dispatch("https://arxiv.org/pdf/2401.00001").await?;
//! println!("{} via {}", dispatched.data.url, dispatched.strategy);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - The [`Fetcher`] abstraction and SSRF-validating wrapper
//! - [`fetchers`] - HTTP, rate-limited and mock fetchers
//! - [`strategies`] - The closed set of extraction strategies
//! - [`registry`] - Ordered dispatch with hop cap and cycle detection
//! - [`html`] - Selector and markdown helpers shared by strategies
//! - [`security`] - URL validation

pub mod error;
pub mod fetchers;
pub mod html;
pub mod registry;
pub mod security;
pub mod strategies;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{CrawlError, ExtractionError, SecurityError};
pub use fetchers::{HttpFetcher, MockFailure, MockFetcher, RateLimitedFetcher};
pub use registry::{Dispatched, StrategyRegistry};
pub use security::UrlValidator;
pub use strategies::{default_strategies, Strategy};
pub use traits::fetcher::{FetchedPage, Fetcher, ValidatedFetcher};
pub use types::{ExtractedData, ExtractedKind, Extraction};
