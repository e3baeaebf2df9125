//! Per-task-type payload shapes.
//!
//! Every payload references a content item. Fields listed in
//! [`TRANSIENT_FIELDS`] live only for a single attempt and are scrubbed when
//! the task completes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TaskError;
use super::task::TaskType;
use crate::common::ContentId;

/// Payload keys removed from the persisted row on completion.
pub const TRANSIENT_FIELDS: &[&str] = &["instruction", "crawl_links"];

/// A typed payload bound to its task type.
pub trait TaskPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TASK_TYPE: TaskType;

    fn content_id(&self) -> ContentId;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeUrl {
    pub content_id: ContentId,
    /// Also enqueue same-site links found on the page
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub crawl_links: bool,
    /// Forwarded to summarization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessContent {
    pub content_id: ContentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transcribe {
    pub content_id: ContentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Summarize {
    pub content_id: ContentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateThumbnail {
    pub content_id: ContentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoverFeeds {
    pub content_id: ContentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DigDeeper {
    pub content_id: ContentId,
    /// The follow-up question
    pub instruction: String,
}

macro_rules! task_payload {
    ($($payload:ident => $task_type:ident),* $(,)?) => {
        $(
            impl TaskPayload for $payload {
                const TASK_TYPE: TaskType = TaskType::$task_type;

                fn content_id(&self) -> ContentId {
                    self.content_id
                }
            }
        )*
    };
}

task_payload! {
    AnalyzeUrl => AnalyzeUrl,
    ProcessContent => ProcessContent,
    Transcribe => Transcribe,
    Summarize => Summarize,
    GenerateThumbnail => GenerateThumbnail,
    DiscoverFeeds => DiscoverFeeds,
    DigDeeper => DigDeeper,
}

fn check<P: TaskPayload>(payload: &Value) -> Result<(), TaskError> {
    serde_json::from_value::<P>(payload.clone())
        .map(|_| ())
        .map_err(|e| TaskError::validation(format!("invalid {} payload: {e}", P::TASK_TYPE)))
}

/// Check `payload` against the shape `task_type` expects.
pub fn validate(task_type: TaskType, payload: &Value) -> Result<(), TaskError> {
    if !payload.is_object() {
        return Err(TaskError::validation(format!(
            "{task_type} payload must be a JSON object"
        )));
    }

    match task_type {
        TaskType::AnalyzeUrl => check::<AnalyzeUrl>(payload),
        TaskType::ProcessContent => check::<ProcessContent>(payload),
        TaskType::Transcribe => check::<Transcribe>(payload),
        TaskType::Summarize => check::<Summarize>(payload),
        TaskType::GenerateThumbnail => check::<GenerateThumbnail>(payload),
        TaskType::DiscoverFeeds => check::<DiscoverFeeds>(payload),
        TaskType::DigDeeper => {
            check::<DigDeeper>(payload)?;
            let blank = payload
                .get("instruction")
                .and_then(Value::as_str)
                .is_some_and(|s| s.trim().is_empty());
            if blank {
                return Err(TaskError::validation("dig_deeper instruction is empty"));
            }
            Ok(())
        }
    }
}

/// Copy of `payload` without transient fields.
pub fn scrub(payload: &Value) -> Value {
    let mut scrubbed = payload.clone();
    if let Some(map) = scrubbed.as_object_mut() {
        for field in TRANSIENT_FIELDS {
            map.remove(*field);
        }
    }
    scrubbed
}
