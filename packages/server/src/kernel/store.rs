// Storage traits for tasks, content, checkouts and audit events.
//
// Every mutation is a single predicate-guarded write so processors and the
// watchdog can run against the same rows without application-level locks.
// Callers pass `now` so lease and backoff arithmetic follow the injected Clock.
//
// Implementations: MemoryStore (tests, local runs) and PostgresStore.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::common::{ContentId, TaskId};
use crate::domains::contents::{Content, ContentStatus, ContentType};
use crate::kernel::jobs::{AuditEvent, Checkout, QueueName, Task, TaskError, TaskStatus, TaskType};

/// Pending tasks grouped by the raw `(task_type, queue)` columns.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RouteCount {
    pub task_type: String,
    pub queue: String,
    pub count: i64,
}

impl RouteCount {
    /// Queue this group should be on, when it is on the wrong one.
    pub fn correct_queue(&self) -> Option<(TaskType, QueueName)> {
        let task_type: TaskType = self.task_type.parse().ok()?;
        let expected = task_type.queue();
        (expected.as_str() != self.queue).then_some((task_type, expected))
    }
}

// =============================================================================
// Task Store
// =============================================================================

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: &Task) -> Result<()>;

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// Distinct `retry_count` values among eligible tasks, ascending.
    async fn eligible_buckets(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Vec<i32>>;

    /// Atomically claim the oldest eligible task in one retry bucket.
    ///
    /// Returns `None` if the bucket emptied or every candidate was claimed
    /// concurrently.
    async fn claim_in_bucket(
        &self,
        queue: QueueName,
        retry_count: i32,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Task>>;

    /// `processing -> completed`, replacing the payload with its scrubbed form.
    ///
    /// This and the other resolving writes only apply while `worker_id` holds
    /// the lease, so a worker whose task was requeued and reclaimed is a no-op.
    async fn mark_task_completed(
        &self,
        id: TaskId,
        worker_id: &str,
        payload: &Value,
        result: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `processing -> pending` with a new retry count and `run_after`.
    async fn reschedule_task(
        &self,
        id: TaskId,
        worker_id: &str,
        retry_count: i32,
        run_after: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `processing -> failed`. Terminal.
    async fn mark_task_failed(
        &self,
        id: TaskId,
        worker_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `processing -> pending` without touching `retry_count`.
    async fn release_task(
        &self,
        id: TaskId,
        worker_id: &str,
        run_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Processing tasks whose lease expired before `stale_before`.
    async fn find_stale_tasks(&self, stale_before: DateTime<Utc>) -> Result<Vec<Task>>;

    /// Move one stale task back to pending if it is still stale.
    async fn requeue_stale_task(
        &self,
        id: TaskId,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn pending_routes(&self) -> Result<Vec<RouteCount>>;

    /// Move pending tasks of `task_type` from queue `from` to `to`.
    async fn reroute_pending(
        &self,
        task_type: TaskType,
        from: &str,
        to: QueueName,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    async fn counts_by_status(&self, queue: QueueName) -> Result<HashMap<TaskStatus, i64>>;
}

// =============================================================================
// Content Store
// =============================================================================

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new item. Returns `false` if `(url, content_type)` already exists.
    async fn insert_content(&self, content: &Content) -> Result<bool>;

    async fn find_content(&self, id: ContentId) -> Result<Option<Content>>;

    async fn find_content_by_url(&self, url: &str, content_type: ContentType) -> Result<Option<Content>>;

    /// Write `content` if the stored status is still `expected`.
    ///
    /// Implementations call [`check_content_write`] first.
    async fn save_content(&self, content: &Content, expected: ContentStatus, now: DateTime<Utc>) -> Result<()>;

    /// `failed -> processing`, counting a content-level retry.
    async fn retry_content(&self, id: ContentId, now: DateTime<Utc>) -> Result<Content>;
}

/// Validation shared by every `save_content` implementation.
pub fn check_content_write(content: &Content, expected: ContentStatus) -> Result<(), TaskError> {
    if !expected.can_transition_to(content.status) {
        return Err(TaskError::InvalidTransition {
            from: expected.to_string(),
            to: content.status.to_string(),
        });
    }
    content.validate()
}

// =============================================================================
// Checkout Store
// =============================================================================

#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Take the lease unless an unexpired one exists.
    async fn try_checkout(
        &self,
        content_id: ContentId,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Checkout>>;

    /// Drop the lease if `worker_id` still holds it.
    async fn release_checkout(&self, content_id: ContentId, worker_id: &str) -> Result<bool>;

    async fn find_checkout(&self, content_id: ContentId) -> Result<Option<Checkout>>;

    async fn count_expired_checkouts(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn purge_expired_checkouts(&self, now: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// Audit Log
// =============================================================================

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record_event(&self, event: &AuditEvent) -> Result<()>;

    /// Newest first.
    async fn recent_events(&self, component: &str, limit: usize) -> Result<Vec<AuditEvent>>;
}
