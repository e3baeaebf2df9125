//! In-memory store for tests and local runs.
//!
//! All state sits behind one mutex, so every trait method is a single atomic
//! step, matching the conditional updates of the Postgres store.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::common::{ContentId, TaskId};
use crate::domains::contents::{Content, ContentStatus, ContentType};
use crate::kernel::jobs::{AuditEvent, Checkout, QueueName, Task, TaskError, TaskStatus, TaskType};
use crate::kernel::store::{
    check_content_write, AuditLog, CheckoutStore, ContentStore, RouteCount, TaskStore,
};

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Task>,
    contents: HashMap<ContentId, Content>,
    checkouts: HashMap<ContentId, Checkout>,
    events: Vec<AuditEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of every task, oldest first.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.lock().tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        tasks
    }

    /// Snapshot of every audit event, in write order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().events.clone()
    }
}

/// The task, if it is processing under `worker_id`'s lease.
fn leased_mut<'a>(state: &'a mut State, id: TaskId, worker_id: &str) -> Option<&'a mut Task> {
    state
        .tasks
        .get_mut(&id)
        .filter(|t| t.status == TaskStatus::Processing && t.worker_id.as_deref() == Some(worker_id))
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &Task) -> Result<()> {
        self.lock().tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    async fn eligible_buckets(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Vec<i32>> {
        let buckets: BTreeSet<i32> = self
            .lock()
            .tasks
            .values()
            .filter(|t| t.queue == queue && t.is_eligible(now))
            .map(|t| t.retry_count)
            .collect();
        Ok(buckets.into_iter().collect())
    }

    async fn claim_in_bucket(
        &self,
        queue: QueueName,
        retry_count: i32,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let mut state = self.lock();
        let oldest = state
            .tasks
            .values()
            .filter(|t| t.queue == queue && t.retry_count == retry_count && t.is_eligible(now))
            .min_by_key(|t| (t.created_at, t.id))
            .map(|t| t.id);

        let Some(id) = oldest else {
            return Ok(None);
        };
        let Some(task) = state.tasks.get_mut(&id) else {
            return Ok(None);
        };

        task.status = TaskStatus::Processing;
        task.worker_id = Some(worker_id.to_string());
        task.lease_expires_at = Some(lease_expires_at);
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn mark_task_completed(
        &self,
        id: TaskId,
        worker_id: &str,
        payload: &Value,
        result: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock();
        Ok(leased_mut(&mut state, id, worker_id)
            .map(|task| {
                task.status = TaskStatus::Completed;
                task.payload = payload.clone();
                task.result = result.cloned();
                task.error_message = None;
                task.worker_id = None;
                task.lease_expires_at = None;
                task.updated_at = now;
            })
            .is_some())
    }

    async fn reschedule_task(
        &self,
        id: TaskId,
        worker_id: &str,
        retry_count: i32,
        run_after: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock();
        Ok(leased_mut(&mut state, id, worker_id)
            .map(|task| {
                task.status = TaskStatus::Pending;
                task.retry_count = retry_count;
                task.run_after = run_after;
                task.error_message = Some(error.to_string());
                task.worker_id = None;
                task.lease_expires_at = None;
                task.updated_at = now;
            })
            .is_some())
    }

    async fn mark_task_failed(
        &self,
        id: TaskId,
        worker_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock();
        Ok(leased_mut(&mut state, id, worker_id)
            .map(|task| {
                task.status = TaskStatus::Failed;
                task.error_message = Some(error.to_string());
                task.worker_id = None;
                task.lease_expires_at = None;
                task.updated_at = now;
            })
            .is_some())
    }

    async fn release_task(
        &self,
        id: TaskId,
        worker_id: &str,
        run_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock();
        Ok(leased_mut(&mut state, id, worker_id)
            .map(|task| {
                task.status = TaskStatus::Pending;
                task.run_after = run_after;
                task.worker_id = None;
                task.lease_expires_at = None;
                task.updated_at = now;
            })
            .is_some())
    }

    async fn find_stale_tasks(&self, stale_before: DateTime<Utc>) -> Result<Vec<Task>> {
        let mut stale: Vec<Task> = self
            .lock()
            .tasks
            .values()
            .filter(|t| is_stale(t, stale_before))
            .cloned()
            .collect();
        stale.sort_by_key(|t| (t.created_at, t.id));
        Ok(stale)
    }

    async fn requeue_stale_task(
        &self,
        id: TaskId,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock();
        Ok(state
            .tasks
            .get_mut(&id)
            .filter(|t| is_stale(t, stale_before))
            .map(|task| {
                task.status = TaskStatus::Pending;
                task.run_after = now;
                task.worker_id = None;
                task.lease_expires_at = None;
                task.updated_at = now;
            })
            .is_some())
    }

    async fn pending_routes(&self) -> Result<Vec<RouteCount>> {
        let mut counts: HashMap<(TaskType, QueueName), i64> = HashMap::new();
        for task in self.lock().tasks.values() {
            if task.status == TaskStatus::Pending {
                *counts.entry((task.task_type, task.queue)).or_default() += 1;
            }
        }

        let mut routes: Vec<RouteCount> = counts
            .into_iter()
            .map(|((task_type, queue), count)| RouteCount {
                task_type: task_type.to_string(),
                queue: queue.to_string(),
                count,
            })
            .collect();
        routes.sort_by(|a, b| (&a.task_type, &a.queue).cmp(&(&b.task_type, &b.queue)));
        Ok(routes)
    }

    async fn reroute_pending(
        &self,
        task_type: TaskType,
        from: &str,
        to: QueueName,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut moved = 0;
        for task in self.lock().tasks.values_mut() {
            if task.status == TaskStatus::Pending
                && task.task_type == task_type
                && task.queue.as_str() == from
            {
                task.queue = to;
                task.updated_at = now;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn counts_by_status(&self, queue: QueueName) -> Result<HashMap<TaskStatus, i64>> {
        let mut counts = HashMap::new();
        for task in self.lock().tasks.values().filter(|t| t.queue == queue) {
            *counts.entry(task.status).or_default() += 1;
        }
        Ok(counts)
    }
}

fn is_stale(task: &Task, stale_before: DateTime<Utc>) -> bool {
    task.status == TaskStatus::Processing
        && task.lease_expires_at.is_some_and(|expiry| expiry < stale_before)
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_content(&self, content: &Content) -> Result<bool> {
        content.validate()?;

        let mut state = self.lock();
        let duplicate = state
            .contents
            .values()
            .any(|c| c.url == content.url && c.content_type == content.content_type);
        if duplicate {
            return Ok(false);
        }
        state.contents.insert(content.id, content.clone());
        Ok(true)
    }

    async fn find_content(&self, id: ContentId) -> Result<Option<Content>> {
        Ok(self.lock().contents.get(&id).cloned())
    }

    async fn find_content_by_url(&self, url: &str, content_type: ContentType) -> Result<Option<Content>> {
        Ok(self
            .lock()
            .contents
            .values()
            .find(|c| c.url == url && c.content_type == content_type)
            .cloned())
    }

    async fn save_content(&self, content: &Content, expected: ContentStatus, now: DateTime<Utc>) -> Result<()> {
        check_content_write(content, expected)?;

        let mut state = self.lock();
        let stored = state
            .contents
            .get_mut(&content.id)
            .ok_or_else(|| TaskError::not_found("content", content.id))?;
        if stored.status != expected {
            return Err(TaskError::StaleWrite {
                entity: "content",
                id: content.id.to_string(),
            }
            .into());
        }

        *stored = Content {
            updated_at: now,
            ..content.clone()
        };
        Ok(())
    }

    async fn retry_content(&self, id: ContentId, now: DateTime<Utc>) -> Result<Content> {
        let mut state = self.lock();
        let content = state
            .contents
            .get_mut(&id)
            .ok_or_else(|| TaskError::not_found("content", id))?;
        if content.status != ContentStatus::Failed {
            return Err(TaskError::InvalidTransition {
                from: content.status.to_string(),
                to: ContentStatus::Processing.to_string(),
            }
            .into());
        }

        content.status = ContentStatus::Processing;
        content.retry_count += 1;
        content.error_message = None;
        content.updated_at = now;
        Ok(content.clone())
    }
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn try_checkout(
        &self,
        content_id: ContentId,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Checkout>> {
        let mut state = self.lock();
        if state
            .checkouts
            .get(&content_id)
            .is_some_and(|held| !held.is_expired(now))
        {
            return Ok(None);
        }

        let checkout = Checkout {
            content_id,
            worker_id: worker_id.to_string(),
            acquired_at: now,
            expires_at,
        };
        state.checkouts.insert(content_id, checkout.clone());
        Ok(Some(checkout))
    }

    async fn release_checkout(&self, content_id: ContentId, worker_id: &str) -> Result<bool> {
        let mut state = self.lock();
        let held = state
            .checkouts
            .get(&content_id)
            .is_some_and(|c| c.worker_id == worker_id);
        if held {
            state.checkouts.remove(&content_id);
        }
        Ok(held)
    }

    async fn find_checkout(&self, content_id: ContentId) -> Result<Option<Checkout>> {
        Ok(self.lock().checkouts.get(&content_id).cloned())
    }

    async fn count_expired_checkouts(&self, now: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .lock()
            .checkouts
            .values()
            .filter(|c| c.is_expired(now))
            .count() as u64)
    }

    async fn purge_expired_checkouts(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock();
        let before = state.checkouts.len();
        state.checkouts.retain(|_, c| !c.is_expired(now));
        Ok((before - state.checkouts.len()) as u64)
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn record_event(&self, event: &AuditEvent) -> Result<()> {
        self.lock().events.push(event.clone());
        Ok(())
    }

    async fn recent_events(&self, component: &str, limit: usize) -> Result<Vec<AuditEvent>> {
        Ok(self
            .lock()
            .events
            .iter()
            .rev()
            .filter(|e| e.component == component)
            .take(limit)
            .cloned()
            .collect())
    }
}
