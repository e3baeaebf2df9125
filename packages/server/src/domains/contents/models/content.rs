use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use super::metadata::ContentMetadata;
use crate::common::ContentId;
use crate::kernel::jobs::TaskError;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    Podcast,
    News,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::Podcast => "podcast",
            ContentType::News => "news",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content lifecycle.
///
/// ```text
/// new ─► pending ─► processing ─► completed
///  │        │           │
///  └────────┴───────────┴─► failed ─► processing (retry)
///  └────────┴───────────┴─► skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "content_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    #[default]
    New,
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::New => "new",
            ContentStatus::Pending => "pending",
            ContentStatus::Processing => "processing",
            ContentStatus::Completed => "completed",
            ContentStatus::Failed => "failed",
            ContentStatus::Skipped => "skipped",
        }
    }

    /// Forward-only, except the explicit `failed -> processing` retry.
    pub fn can_transition_to(&self, to: ContentStatus) -> bool {
        use ContentStatus::*;

        if *self == to {
            return true;
        }
        matches!(
            (self, to),
            (New, Pending | Processing | Skipped | Failed)
                | (Pending, Processing | Skipped | Failed)
                | (Processing, Completed | Failed | Skipped)
                | (Failed, Processing)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContentStatus::Completed | ContentStatus::Skipped)
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Content Model
// ============================================================================

/// One ingested item. Unique on `(url, content_type)`.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Content {
    #[builder(default)]
    pub id: ContentId,
    #[builder(setter(into))]
    pub url: String,
    pub content_type: ContentType,
    #[builder(default)]
    pub status: ContentStatus,
    #[builder(default, setter(strip_option, into))]
    pub platform: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub title: Option<String>,
    #[builder(default)]
    #[sqlx(json)]
    pub metadata: ContentMetadata,
    /// Content-level reprocessing attempts
    #[builder(default)]
    pub retry_count: i32,
    #[builder(default)]
    pub error_message: Option<String>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Content {
    /// Move to `to`, rejecting backward moves.
    pub fn transition(&mut self, to: ContentStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(to) {
            return Err(TaskError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Checks run before every write.
    pub fn validate(&self) -> Result<(), TaskError> {
        url::Url::parse(&self.url)
            .map_err(|e| TaskError::validation(format!("invalid content URL {}: {e}", self.url)))?;
        self.metadata.validate(self.content_type, self.status)
    }

    /// Text available for summarization.
    pub fn body(&self) -> Option<&str> {
        self.metadata.details.as_ref().and_then(|d| d.body())
    }
}
