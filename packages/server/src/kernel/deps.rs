//! Server dependencies for handlers (using traits for testability)
//!
//! This module provides the central dependency container passed to every task
//! handler and processor slot. All external services use trait abstractions
//! so tests can swap in the mocks from `test_dependencies`.

use std::sync::Arc;

use extraction::StrategyRegistry;

use crate::kernel::clock::Clock;
use crate::kernel::jobs::{CheckoutManager, QueueService};
use crate::kernel::store::{AuditLog, CheckoutStore, ContentStore, TaskStore};
use crate::kernel::{BaseChatService, BaseSummarizer, BaseThumbnailService, BaseTranscriber};

/// Default cap on rows created by one crawl expansion.
pub const DEFAULT_MAX_CRAWL_LINKS: usize = 10;

/// Server dependencies accessible to handlers
#[derive(Clone)]
pub struct ServerDeps {
    pub tasks: Arc<dyn TaskStore>,
    pub contents: Arc<dyn ContentStore>,
    pub checkout_store: Arc<dyn CheckoutStore>,
    pub audit: Arc<dyn AuditLog>,
    pub queue: Arc<QueueService>,
    pub checkouts: Arc<CheckoutManager>,
    /// Strategy registry (from extraction library)
    pub extraction: Arc<StrategyRegistry>,
    pub summarizer: Arc<dyn BaseSummarizer>,
    pub transcriber: Arc<dyn BaseTranscriber>,
    pub thumbnails: Arc<dyn BaseThumbnailService>,
    pub chat: Arc<dyn BaseChatService>,
    pub clock: Arc<dyn Clock>,
    pub max_crawl_links: usize,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    ///
    /// The queue service and checkout manager are built over the same stores.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        contents: Arc<dyn ContentStore>,
        checkout_store: Arc<dyn CheckoutStore>,
        audit: Arc<dyn AuditLog>,
        queue: QueueService,
        extraction: Arc<StrategyRegistry>,
        summarizer: Arc<dyn BaseSummarizer>,
        transcriber: Arc<dyn BaseTranscriber>,
        thumbnails: Arc<dyn BaseThumbnailService>,
        chat: Arc<dyn BaseChatService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let checkouts = CheckoutManager::new(checkout_store.clone(), clock.clone());
        Self {
            tasks,
            contents,
            checkout_store,
            audit,
            queue: Arc::new(queue),
            checkouts: Arc::new(checkouts),
            extraction,
            summarizer,
            transcriber,
            thumbnails,
            chat,
            clock,
            max_crawl_links: DEFAULT_MAX_CRAWL_LINKS,
        }
    }

    pub fn with_max_crawl_links(mut self, max_crawl_links: usize) -> Self {
        self.max_crawl_links = max_crawl_links;
        self
    }
}
