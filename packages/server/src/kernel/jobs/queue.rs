//! Queue service over the task store.
//!
//! Owns enqueue validation, retry-bucket rotation on dequeue, payload
//! scrubbing on completion, and backoff scheduling on failure.
//!
//! # Bucket rotation
//!
//! ```text
//! eligible tasks on queue "content"
//!     retry 0: t1 t2 t3 t4 ...   ◄── served, pointer = 0
//!     retry 1: t9                ◄── next call
//!     retry 3: t7                ◄── call after that, then wrap to 0
//! ```
//!
//! A flood of fresh tasks cannot starve retried ones: every non-empty bucket
//! is served once per rotation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::error::TaskError;
use super::events::AuditEvent;
use super::payload::{self, TaskPayload};
use super::retry::RetryPolicy;
use super::task::{QueueName, Task, TaskStatus, TaskType, DEFAULT_MAX_RETRIES};
use crate::common::TaskId;
use crate::kernel::clock::Clock;
use crate::kernel::store::{AuditLog, TaskStore};

const AUDIT_COMPONENT: &str = "queue";

/// What `fail_task` did with the task.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    Rescheduled { retry_count: i32, run_after: DateTime<Utc> },
    Failed,
    /// The task was no longer processing (e.g. requeued by the watchdog).
    NotProcessing,
}

pub struct QueueService {
    tasks: Arc<dyn TaskStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    default_max_retries: i32,
    /// Last bucket served, per queue
    rotation: Mutex<HashMap<QueueName, i32>>,
}

impl QueueService {
    pub fn new(tasks: Arc<dyn TaskStore>, audit: Arc<dyn AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks,
            audit,
            clock,
            retry: RetryPolicy::default(),
            default_max_retries: DEFAULT_MAX_RETRIES,
            rotation: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: i32) -> Self {
        self.default_max_retries = max_retries.max(0);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Insert a task after validating its queue name and payload shape.
    pub async fn enqueue(
        &self,
        task_type: TaskType,
        queue: &str,
        payload: Value,
        run_after: Option<DateTime<Utc>>,
        max_retries: Option<i32>,
    ) -> Result<TaskId> {
        let queue: QueueName = queue.parse()?;
        payload::validate(task_type, &payload)?;

        if task_type.queue() != queue {
            warn!(
                task_type = %task_type,
                queue = %queue,
                expected = %task_type.queue(),
                "task enqueued on a queue its type does not route to"
            );
        }

        let now = self.clock.now();
        let task = Task::builder()
            .task_type(task_type)
            .queue(queue)
            .payload(payload)
            .max_retries(max_retries.unwrap_or(self.default_max_retries).max(0))
            .run_after(run_after.unwrap_or(now))
            .created_at(now)
            .updated_at(now)
            .build();

        self.tasks.insert_task(&task).await?;
        debug!(task_id = %task.id, task_type = %task_type, queue = %queue, "task enqueued");
        Ok(task.id)
    }

    /// Enqueue a typed payload on the queue its type routes to.
    pub async fn enqueue_payload<P: TaskPayload>(&self, payload: &P) -> Result<TaskId> {
        let task_type = P::TASK_TYPE;
        self.enqueue(
            task_type,
            task_type.queue().as_str(),
            serde_json::to_value(payload)?,
            None,
            None,
        )
        .await
    }

    /// Claim the next task on `queue`, rotating across retry buckets.
    pub async fn dequeue(&self, queue: QueueName, worker_id: &str, lease_ttl: Duration) -> Result<Option<Task>> {
        let now = self.clock.now();
        let buckets = self.tasks.eligible_buckets(queue, now).await?;
        if buckets.is_empty() {
            return Ok(None);
        }

        let lease_expires_at = now + chrono::Duration::from_std(lease_ttl)?;
        let last = self.last_bucket(queue);

        for bucket in rotation_order(&buckets, last) {
            // Another slot may drain the bucket first; fall through to the next one
            if let Some(task) = self
                .tasks
                .claim_in_bucket(queue, bucket, worker_id, now, lease_expires_at)
                .await?
            {
                self.set_last_bucket(queue, bucket);
                debug!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    queue = %queue,
                    bucket,
                    worker_id,
                    "task claimed"
                );
                return Ok(Some(task));
            }
        }

        Ok(None)
    }

    /// Mark completed, dropping transient payload fields.
    ///
    /// Only the worker holding the lease can resolve the task.
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        worker_id: &str,
        result: Option<Value>,
    ) -> Result<bool> {
        let task = self
            .tasks
            .find_task(task_id)
            .await?
            .ok_or_else(|| TaskError::not_found("task", task_id))?;
        let now = self.clock.now();
        let scrubbed = payload::scrub(&task.payload);

        let completed = self
            .tasks
            .mark_task_completed(task_id, worker_id, &scrubbed, result.as_ref(), now)
            .await?;
        if !completed {
            warn!(task_id = %task_id, worker_id, "completion ignored, lease not held");
            return Ok(false);
        }

        info!(task_id = %task_id, task_type = %task.task_type, "task completed");
        self.audit(&task, "completed", json!({ "task_id": task_id, "retry_count": task.retry_count }), now)
            .await;
        Ok(true)
    }

    /// Reschedule with backoff if retryable and attempts remain, otherwise fail.
    pub async fn fail_task(
        &self,
        task_id: TaskId,
        worker_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<FailOutcome> {
        let task = self
            .tasks
            .find_task(task_id)
            .await?
            .ok_or_else(|| TaskError::not_found("task", task_id))?;
        let now = self.clock.now();

        if retryable && task.retry_count < task.max_retries {
            let retry_count = task.retry_count + 1;
            let run_after = self.retry.next_run_after(task.retry_count, now);

            if !self
                .tasks
                .reschedule_task(task_id, worker_id, retry_count, run_after, error, now)
                .await?
            {
                return Ok(FailOutcome::NotProcessing);
            }

            warn!(
                task_id = %task_id,
                task_type = %task.task_type,
                retry_count,
                max_retries = task.max_retries,
                run_after = %run_after,
                error,
                "task rescheduled"
            );
            self.audit(
                &task,
                "retry_scheduled",
                json!({
                    "task_id": task_id,
                    "retry_count": retry_count,
                    "run_after": run_after,
                    "error": error,
                }),
                now,
            )
            .await;
            return Ok(FailOutcome::Rescheduled { retry_count, run_after });
        }

        if !self.tasks.mark_task_failed(task_id, worker_id, error, now).await? {
            return Ok(FailOutcome::NotProcessing);
        }

        warn!(
            task_id = %task_id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            retryable,
            error,
            "task failed"
        );
        self.audit(
            &task,
            "failed",
            json!({
                "task_id": task_id,
                "retry_count": task.retry_count,
                "retryable": retryable,
                "error": error,
            }),
            now,
        )
        .await;
        Ok(FailOutcome::Failed)
    }

    /// Put a claimed task back to pending without counting an attempt.
    pub async fn release_task(&self, task_id: TaskId, worker_id: &str, delay: Duration) -> Result<bool> {
        let now = self.clock.now();
        let run_after = now + chrono::Duration::from_std(delay)?;
        let released = self.tasks.release_task(task_id, worker_id, run_after, now).await?;
        debug!(task_id = %task_id, released, run_after = %run_after, "task released");
        Ok(released)
    }

    pub async fn counts_by_status(&self, queue: QueueName) -> Result<HashMap<TaskStatus, i64>> {
        self.tasks.counts_by_status(queue).await
    }

    async fn audit(&self, task: &Task, status: &str, data: Value, now: DateTime<Utc>) {
        let event = AuditEvent::new(AUDIT_COMPONENT, task.task_type.as_str(), status, data, now);
        if let Err(e) = self.audit.record_event(&event).await {
            warn!(task_id = %task.id, error = %e, "failed to record audit event");
        }
    }

    fn last_bucket(&self, queue: QueueName) -> Option<i32> {
        self.rotation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&queue)
            .copied()
    }

    fn set_last_bucket(&self, queue: QueueName, bucket: i32) {
        self.rotation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(queue, bucket);
    }
}

/// Buckets in the order to try them: the first one after `last`, wrapping.
///
/// `buckets` must be sorted ascending.
pub fn rotation_order(buckets: &[i32], last: Option<i32>) -> Vec<i32> {
    let start = match last {
        Some(last) => buckets.partition_point(|&b| b <= last),
        None => 0,
    };
    let start = if start >= buckets.len() { 0 } else { start };

    buckets[start..]
        .iter()
        .chain(&buckets[..start])
        .copied()
        .collect()
}
