//! Task model: one schedulable unit of work routed to a queue.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use super::error::TaskError;
use crate::common::{ContentId, TaskId};

pub const DEFAULT_MAX_RETRIES: i32 = 3;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named partition of the task table with its own processor slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Content,
    Transcribe,
    Chat,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Content, QueueName::Transcribe, QueueName::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Content => "content",
            QueueName::Transcribe => "transcribe",
            QueueName::Chat => "chat",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| TaskError::UnknownQueue(s.to_string()))
    }
}

impl TryFrom<String> for QueueName {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Closed set of task types. Each routes to exactly one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    AnalyzeUrl,
    ProcessContent,
    Transcribe,
    Summarize,
    GenerateThumbnail,
    DiscoverFeeds,
    DigDeeper,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::AnalyzeUrl,
        TaskType::ProcessContent,
        TaskType::Transcribe,
        TaskType::Summarize,
        TaskType::GenerateThumbnail,
        TaskType::DiscoverFeeds,
        TaskType::DigDeeper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::AnalyzeUrl => "analyze_url",
            TaskType::ProcessContent => "process_content",
            TaskType::Transcribe => "transcribe",
            TaskType::Summarize => "summarize",
            TaskType::GenerateThumbnail => "generate_thumbnail",
            TaskType::DiscoverFeeds => "discover_feeds",
            TaskType::DigDeeper => "dig_deeper",
        }
    }

    /// The queue this task type belongs on.
    pub fn queue(&self) -> QueueName {
        match self {
            TaskType::Transcribe => QueueName::Transcribe,
            TaskType::DigDeeper => QueueName::Chat,
            _ => QueueName::Content,
        }
    }

    /// Whether a terminal failure of this task fails the content item.
    ///
    /// Enrichment tasks run after the content is already completed and
    /// leave it untouched when they give up.
    pub fn owns_content_lifecycle(&self) -> bool {
        matches!(
            self,
            TaskType::AnalyzeUrl
                | TaskType::ProcessContent
                | TaskType::Transcribe
                | TaskType::Summarize
        )
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TaskError::UnknownTaskType(s.to_string()))
    }
}

impl TryFrom<String> for TaskType {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Task Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Task {
    #[builder(default)]
    pub id: TaskId,

    #[sqlx(try_from = "String")]
    pub task_type: TaskType,
    #[sqlx(try_from = "String")]
    pub queue: QueueName,
    pub payload: serde_json::Value,

    #[builder(default)]
    pub status: TaskStatus,
    #[builder(default)]
    pub retry_count: i32,
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: i32,
    pub run_after: DateTime<Utc>,

    // Lease, set while processing
    #[builder(default)]
    pub worker_id: Option<String>,
    #[builder(default)]
    pub lease_expires_at: Option<DateTime<Utc>>,

    // Outcome
    #[builder(default)]
    pub result: Option<serde_json::Value>,
    #[builder(default)]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// The content item this task operates on.
    pub fn content_id(&self) -> Result<ContentId, TaskError> {
        self.payload
            .get("content_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TaskError::validation(format!("task {} payload has no content_id", self.id)))
            .and_then(|raw| {
                ContentId::parse(raw)
                    .map_err(|e| TaskError::validation(format!("invalid content_id {raw}: {e}")))
            })
    }

    /// Whether the task sits on the queue its type routes to.
    pub fn is_routed_correctly(&self) -> bool {
        self.task_type.queue() == self.queue
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.run_after <= now
    }
}
