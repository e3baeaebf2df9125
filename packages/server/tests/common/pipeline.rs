//! In-memory pipeline driver.
//!
//! Wires the real handler registry to `TestDependencies` and steps one
//! processor per queue by hand, so tests control time and ordering.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use server_core::domains::contents::{Content, ContentType};
use server_core::domains::ingestion::build_registry;
use server_core::kernel::jobs::{
    PollOutcome, ProcessorConfig, QueueName, SequentialProcessor, TaskOutcome,
};
use server_core::kernel::{ServerDeps, TestDependencies};

pub struct Pipeline {
    pub test: TestDependencies,
    pub deps: Arc<ServerDeps>,
    processors: Vec<SequentialProcessor>,
}

impl Pipeline {
    pub fn new(test: TestDependencies) -> Self {
        let deps = test.clone().into_server_deps();
        let registry = Arc::new(build_registry());
        let processors = QueueName::ALL
            .into_iter()
            .map(|queue| {
                SequentialProcessor::new(
                    deps.clone(),
                    registry.clone(),
                    ProcessorConfig::for_queue(queue).with_worker_id(format!("test-{queue}")),
                )
            })
            .collect();

        Self {
            test,
            deps,
            processors,
        }
    }

    pub async fn seed(&self, url: &str, content_type: ContentType) -> Result<Content> {
        self.test
            .seed_content(Content::builder().url(url).content_type(content_type).build())
            .await
    }

    /// Poll every queue until all are idle, returning outcomes in order.
    pub async fn drain(&self) -> Result<Vec<TaskOutcome>> {
        let mut outcomes = Vec::new();

        // Bounded so a handler that keeps spawning work fails the test instead of hanging
        for _ in 0..200 {
            let mut idle = true;
            for processor in &self.processors {
                if let PollOutcome::Processed { outcome, .. } = processor.poll_once().await? {
                    outcomes.push(outcome);
                    idle = false;
                }
            }
            if idle {
                return Ok(outcomes);
            }
        }

        anyhow::bail!("pipeline did not settle")
    }

    /// Move the manual clock past any retry backoff.
    pub fn advance(&self, by: Duration) {
        self.test.clock.advance(by);
    }
}
