//! Sequential task processor: one slot, one task at a time.
//!
//! ```text
//! SequentialProcessor (one per queue slot)
//!     │
//!     ├─► QueueService.dequeue (atomic claim, bucket rotation)
//!     ├─► CheckoutManager.acquire(content_id)
//!     │       └─► Conflict → release task, no retry penalty
//!     ├─► HandlerRegistry.execute
//!     │       ├─► Ok  → complete_task, enqueue follow-ups
//!     │       └─► Err → classify → fail_task
//!     └─► CheckoutManager.release (always)
//! ```
//!
//! A slot never runs two tasks at once. Throughput comes from running more
//! slots, each its own tokio task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::checkout::CheckoutOutcome;
use super::classifier::classify;
use super::queue::FailOutcome;
use super::registry::{HandlerOutcome, HandlerRegistry, TaskContext};
use super::task::{QueueName, Task};
use crate::common::{ContentId, TaskId};
use crate::domains::contents::ContentStatus;
use crate::kernel::ServerDeps;

/// Configuration for one processor slot.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub queue: QueueName,
    /// Worker ID for this slot
    pub worker_id: String,
    /// Task lease and checkout TTL
    pub lease_ttl: Duration,
    /// Poll interval right after activity
    pub min_poll_interval: Duration,
    /// Ceiling for idle polling
    pub max_poll_interval: Duration,
    /// Idle polls at the minimum interval before widening
    pub fast_polls: u32,
    /// How long a task waits after losing a checkout race
    pub conflict_delay: Duration,
}

impl ProcessorConfig {
    pub fn for_queue(queue: QueueName) -> Self {
        Self {
            queue,
            worker_id: format!("worker-{}", Uuid::new_v4()),
            lease_ttl: Duration::from_secs(30 * 60),
            min_poll_interval: Duration::from_millis(100),
            max_poll_interval: Duration::from_secs(30),
            fast_polls: 5,
            conflict_delay: Duration::from_secs(5),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }
}

/// Adaptive idle backoff: a burst of fast polls, then doubling to a ceiling.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    min: Duration,
    max: Duration,
    fast_polls: u32,
    idle_polls: u32,
}

impl PollBackoff {
    pub fn new(min: Duration, max: Duration, fast_polls: u32) -> Self {
        Self {
            min,
            max: max.max(min),
            fast_polls,
            idle_polls: 0,
        }
    }

    /// A task was seen; go back to fast polling.
    pub fn reset(&mut self) {
        self.idle_polls = 0;
    }

    /// Delay before the next poll after finding nothing.
    pub fn next_idle_delay(&mut self) -> Duration {
        self.idle_polls = self.idle_polls.saturating_add(1);
        if self.idle_polls <= self.fast_polls {
            return self.min;
        }
        let doublings = (self.idle_polls - self.fast_polls).min(20);
        self.min.saturating_mul(1 << doublings).min(self.max)
    }
}

/// How one claimed task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { follow_ups: usize },
    Retrying { retry_count: i32 },
    Failed,
    /// Another worker holds the content; the task went back to pending.
    Conflict,
    /// The task stopped being ours before we could record the outcome.
    Lost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Idle,
    Processed { task_id: TaskId, outcome: TaskOutcome },
}

pub struct SequentialProcessor {
    deps: Arc<ServerDeps>,
    registry: Arc<HandlerRegistry>,
    config: ProcessorConfig,
}

impl SequentialProcessor {
    pub fn new(deps: Arc<ServerDeps>, registry: Arc<HandlerRegistry>, config: ProcessorConfig) -> Self {
        Self {
            deps,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Claim and fully resolve at most one task.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let Some(task) = self
            .deps
            .queue
            .dequeue(self.config.queue, &self.config.worker_id, self.config.lease_ttl)
            .await?
        else {
            return Ok(PollOutcome::Idle);
        };

        let outcome = self.process(&task).await?;
        Ok(PollOutcome::Processed {
            task_id: task.id,
            outcome,
        })
    }

    async fn process(&self, task: &Task) -> Result<TaskOutcome> {
        let content_id = match task.content_id() {
            Ok(id) => id,
            Err(e) => return self.record_failure(task, None, e.into()).await,
        };

        match self
            .deps
            .checkouts
            .acquire(content_id, &self.config.worker_id, self.config.lease_ttl)
            .await?
        {
            CheckoutOutcome::Acquired(_) => {}
            CheckoutOutcome::Conflict => {
                info!(
                    task_id = %task.id,
                    content_id = %content_id,
                    worker_id = %self.config.worker_id,
                    "content checked out elsewhere, releasing task"
                );
                self.deps
                    .queue
                    .release_task(task.id, &self.config.worker_id, self.config.conflict_delay)
                    .await?;
                return Ok(TaskOutcome::Conflict);
            }
        }

        let outcome = match self.execute(task).await {
            Ok(handled) => self.record_success(task, handled).await,
            Err(e) => self.record_failure(task, Some(content_id), e).await,
        };

        match self
            .deps
            .checkouts
            .release(content_id, &self.config.worker_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(content_id = %content_id, "checkout already gone at release"),
            Err(e) => error!(content_id = %content_id, error = %e, "failed to release checkout"),
        }

        outcome
    }

    /// Run the handler, turning a panic into an ordinary error.
    async fn execute(&self, task: &Task) -> Result<HandlerOutcome> {
        debug!(task_id = %task.id, task_type = %task.task_type, "executing task");

        let ctx = TaskContext::for_task(task, &self.config.worker_id);
        let run = self.registry.execute(task, ctx, self.deps.clone());

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(anyhow!("handler panicked: {message}"))
            }
        }
    }

    async fn record_success(&self, task: &Task, handled: HandlerOutcome) -> Result<TaskOutcome> {
        if !self
            .deps
            .queue
            .complete_task(task.id, &self.config.worker_id, handled.result)
            .await?
        {
            return Ok(TaskOutcome::Lost);
        }

        let follow_ups = handled.follow_ups.len();
        for follow_up in handled.follow_ups {
            let next = self
                .deps
                .queue
                .enqueue(
                    follow_up.task_type,
                    follow_up.task_type.queue().as_str(),
                    follow_up.payload,
                    None,
                    None,
                )
                .await?;
            debug!(task_id = %task.id, next_task_id = %next, next_type = %follow_up.task_type, "follow-up enqueued");
        }

        Ok(TaskOutcome::Completed { follow_ups })
    }

    async fn record_failure(
        &self,
        task: &Task,
        content_id: Option<ContentId>,
        error: anyhow::Error,
    ) -> Result<TaskOutcome> {
        let retryable = classify(&error);
        let message = format!("{error:#}");
        warn!(task_id = %task.id, task_type = %task.task_type, retryable, error = %message, "task failed");

        match self
            .deps
            .queue
            .fail_task(task.id, &self.config.worker_id, &message, retryable)
            .await?
        {
            FailOutcome::Rescheduled { retry_count, .. } => Ok(TaskOutcome::Retrying { retry_count }),
            FailOutcome::NotProcessing => Ok(TaskOutcome::Lost),
            FailOutcome::Failed => {
                if let Some(content_id) = content_id.filter(|_| task.task_type.owns_content_lifecycle()) {
                    self.mark_content_failed(content_id, &message).await;
                }
                Ok(TaskOutcome::Failed)
            }
        }
    }

    /// Terminal pipeline failure; best effort, the task outcome already stands.
    async fn mark_content_failed(&self, content_id: ContentId, message: &str) {
        let content = match self.deps.contents.find_content(content_id).await {
            Ok(Some(content)) => content,
            Ok(None) => return,
            Err(e) => {
                error!(content_id = %content_id, error = %e, "failed to load content");
                return;
            }
        };

        let expected = content.status;
        if expected == ContentStatus::Failed || !expected.can_transition_to(ContentStatus::Failed) {
            return;
        }

        let mut failed = content;
        failed.status = ContentStatus::Failed;
        failed.error_message = Some(message.to_string());

        let now = self.deps.clock.now();
        match self.deps.contents.save_content(&failed, expected, now).await {
            Ok(()) => info!(content_id = %content_id, "content marked failed"),
            Err(e) => warn!(content_id = %content_id, error = %e, "could not mark content failed"),
        }
    }

    /// Poll until `shutdown` fires. The in-flight task always finishes.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            queue = %self.config.queue,
            worker_id = %self.config.worker_id,
            "processor starting"
        );

        let mut backoff = PollBackoff::new(
            self.config.min_poll_interval,
            self.config.max_poll_interval,
            self.config.fast_polls,
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(PollOutcome::Processed { .. }) => {
                    backoff.reset();
                    continue;
                }
                Ok(PollOutcome::Idle) => backoff.next_idle_delay(),
                Err(e) => {
                    error!(queue = %self.config.queue, error = %e, "poll failed");
                    backoff.next_idle_delay()
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(worker_id = %self.config.worker_id, "processor stopped");
        Ok(())
    }

    /// Run on its own tokio task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(shutdown))
    }
}
