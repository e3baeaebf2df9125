//! Postgres implementation of the store traits.
//!
//! Every state change is a single conditional statement. Claims lock the
//! candidate row with `FOR UPDATE SKIP LOCKED` so concurrent slots skip past
//! each other instead of blocking.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::common::{ContentId, TaskId};
use crate::domains::contents::{Content, ContentStatus, ContentType};
use crate::kernel::jobs::{AuditEvent, Checkout, QueueName, Task, TaskError, TaskStatus, TaskType};
use crate::kernel::store::{
    check_content_write, AuditLog, CheckoutStore, ContentStore, RouteCount, TaskStore,
};

const TASK_COLUMNS: &str = "id, task_type, queue, payload, status, retry_count, max_retries, run_after, \
     worker_id, lease_expires_at, result, error_message, created_at, updated_at";

const CONTENT_COLUMNS: &str = "id, url, content_type, status, platform, title, metadata, retry_count, \
     error_message, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Task Store
// =============================================================================

#[async_trait]
impl TaskStore for PostgresStore {
    async fn insert_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, task_type, queue, payload, status, retry_count, max_retries,
                               run_after, worker_id, lease_expires_at, result, error_message,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(task.id)
        .bind(task.task_type.as_str())
        .bind(task.queue.as_str())
        .bind(&task.payload)
        .bind(task.status)
        .bind(task.retry_count)
        .bind(task.max_retries)
        .bind(task.run_after)
        .bind(&task.worker_id)
        .bind(task.lease_expires_at)
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    async fn eligible_buckets(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Vec<i32>> {
        let buckets = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT DISTINCT retry_count
            FROM tasks
            WHERE queue = $1 AND status = 'pending' AND run_after <= $2
            ORDER BY retry_count
            "#,
        )
        .bind(queue.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(buckets)
    }

    async fn claim_in_bucket(
        &self,
        queue: QueueName,
        retry_count: i32,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            WITH next_task AS (
                SELECT id
                FROM tasks
                WHERE queue = $1
                  AND retry_count = $2
                  AND status = 'pending'
                  AND run_after <= $3
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tasks
            SET status = 'processing',
                worker_id = $4,
                lease_expires_at = $5,
                updated_at = $3
            WHERE id IN (SELECT id FROM next_task)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(queue.as_str())
        .bind(retry_count)
        .bind(now)
        .bind(worker_id)
        .bind(lease_expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn mark_task_completed(
        &self,
        id: TaskId,
        worker_id: &str,
        payload: &Value,
        result: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'completed',
                payload = $3,
                result = $4,
                worker_id = NULL,
                lease_expires_at = NULL,
                error_message = NULL,
                updated_at = $5
            WHERE id = $1 AND status = 'processing' AND worker_id = $2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(payload)
        .bind(result)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
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
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending',
                retry_count = $3,
                run_after = $4,
                error_message = $5,
                worker_id = NULL,
                lease_expires_at = NULL,
                updated_at = $6
            WHERE id = $1 AND status = 'processing' AND worker_id = $2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(retry_count)
        .bind(run_after)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn mark_task_failed(
        &self,
        id: TaskId,
        worker_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed',
                error_message = $3,
                worker_id = NULL,
                lease_expires_at = NULL,
                updated_at = $4
            WHERE id = $1 AND status = 'processing' AND worker_id = $2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn release_task(
        &self,
        id: TaskId,
        worker_id: &str,
        run_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending',
                run_after = $3,
                worker_id = NULL,
                lease_expires_at = NULL,
                updated_at = $4
            WHERE id = $1 AND status = 'processing' AND worker_id = $2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(run_after)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn find_stale_tasks(&self, stale_before: DateTime<Utc>) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE status = 'processing' AND lease_expires_at < $1
            ORDER BY lease_expires_at
            "#
        ))
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn requeue_stale_task(
        &self,
        id: TaskId,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending',
                run_after = $3,
                worker_id = NULL,
                lease_expires_at = NULL,
                updated_at = $3
            WHERE id = $1 AND status = 'processing' AND lease_expires_at < $2
            "#,
        )
        .bind(id)
        .bind(stale_before)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn pending_routes(&self) -> Result<Vec<RouteCount>> {
        let routes = sqlx::query_as::<_, RouteCount>(
            r#"
            SELECT task_type, queue, COUNT(*) AS count
            FROM tasks
            WHERE status = 'pending'
            GROUP BY task_type, queue
            ORDER BY task_type, queue
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(routes)
    }

    async fn reroute_pending(
        &self,
        task_type: TaskType,
        from: &str,
        to: QueueName,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET queue = $3, updated_at = $4
            WHERE task_type = $1 AND queue = $2 AND status = 'pending'
            "#,
        )
        .bind(task_type.as_str())
        .bind(from)
        .bind(to.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected())
    }

    async fn counts_by_status(&self, queue: QueueName) -> Result<HashMap<TaskStatus, i64>> {
        let rows = sqlx::query_as::<_, (TaskStatus, i64)>(
            "SELECT status, COUNT(*) FROM tasks WHERE queue = $1 GROUP BY status",
        )
        .bind(queue.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

// =============================================================================
// Content Store
// =============================================================================

#[async_trait]
impl ContentStore for PostgresStore {
    async fn insert_content(&self, content: &Content) -> Result<bool> {
        content.validate()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO contents (id, url, content_type, status, platform, title, metadata,
                                  retry_count, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (url, content_type) DO NOTHING
            "#,
        )
        .bind(content.id)
        .bind(&content.url)
        .bind(content.content_type)
        .bind(content.status)
        .bind(&content.platform)
        .bind(&content.title)
        .bind(sqlx::types::Json(&content.metadata))
        .bind(content.retry_count)
        .bind(&content.error_message)
        .bind(content.created_at)
        .bind(content.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(inserted.rows_affected() == 1)
    }

    async fn find_content(&self, id: ContentId) -> Result<Option<Content>> {
        let content = sqlx::query_as::<_, Content>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(content)
    }

    async fn find_content_by_url(&self, url: &str, content_type: ContentType) -> Result<Option<Content>> {
        let content = sqlx::query_as::<_, Content>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents WHERE url = $1 AND content_type = $2"
        ))
        .bind(url)
        .bind(content_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(content)
    }

    async fn save_content(&self, content: &Content, expected: ContentStatus, now: DateTime<Utc>) -> Result<()> {
        check_content_write(content, expected)?;

        let updated = sqlx::query(
            r#"
            UPDATE contents
            SET status = $3,
                platform = $4,
                title = $5,
                metadata = $6,
                retry_count = $7,
                error_message = $8,
                updated_at = $9
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(content.id)
        .bind(expected)
        .bind(content.status)
        .bind(&content.platform)
        .bind(&content.title)
        .bind(sqlx::types::Json(&content.metadata))
        .bind(content.retry_count)
        .bind(&content.error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }
        if self.find_content(content.id).await?.is_none() {
            return Err(TaskError::not_found("content", content.id).into());
        }
        Err(TaskError::StaleWrite {
            entity: "content",
            id: content.id.to_string(),
        }
        .into())
    }

    async fn retry_content(&self, id: ContentId, now: DateTime<Utc>) -> Result<Content> {
        let content = sqlx::query_as::<_, Content>(&format!(
            r#"
            UPDATE contents
            SET status = 'processing',
                retry_count = retry_count + 1,
                error_message = NULL,
                updated_at = $2
            WHERE id = $1 AND status = 'failed'
            RETURNING {CONTENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match content {
            Some(content) => Ok(content),
            None => {
                let current = self
                    .find_content(id)
                    .await?
                    .ok_or_else(|| TaskError::not_found("content", id))?;
                Err(TaskError::InvalidTransition {
                    from: current.status.to_string(),
                    to: ContentStatus::Processing.to_string(),
                }
                .into())
            }
        }
    }
}

// =============================================================================
// Checkout Store
// =============================================================================

#[async_trait]
impl CheckoutStore for PostgresStore {
    async fn try_checkout(
        &self,
        content_id: ContentId,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Checkout>> {
        // Takes over an expired lease in the same statement; a live one wins
        let checkout = sqlx::query_as::<_, Checkout>(
            r#"
            INSERT INTO checkouts (content_id, worker_id, acquired_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (content_id) DO UPDATE
            SET worker_id = EXCLUDED.worker_id,
                acquired_at = EXCLUDED.acquired_at,
                expires_at = EXCLUDED.expires_at
            WHERE checkouts.expires_at <= $3
            RETURNING content_id, worker_id, acquired_at, expires_at
            "#,
        )
        .bind(content_id)
        .bind(worker_id)
        .bind(now)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(checkout)
    }

    async fn release_checkout(&self, content_id: ContentId, worker_id: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM checkouts WHERE content_id = $1 AND worker_id = $2")
            .bind(content_id)
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() == 1)
    }

    async fn find_checkout(&self, content_id: ContentId) -> Result<Option<Checkout>> {
        let checkout = sqlx::query_as::<_, Checkout>(
            "SELECT content_id, worker_id, acquired_at, expires_at FROM checkouts WHERE content_id = $1",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(checkout)
    }

    async fn count_expired_checkouts(&self, now: DateTime<Utc>) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM checkouts WHERE expires_at <= $1")
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn purge_expired_checkouts(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM checkouts WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected())
    }
}

// =============================================================================
// Audit Log
// =============================================================================

#[async_trait]
impl AuditLog for PostgresStore {
    async fn record_event(&self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (id, component, operation, status, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(&event.component)
        .bind(&event.operation)
        .bind(&event.status)
        .bind(&event.data)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_events(&self, component: &str, limit: usize) -> Result<Vec<AuditEvent>> {
        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT id, component, operation, status, data, created_at
            FROM audit_events
            WHERE component = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(component)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}
