//! Type-specific metadata envelope stored with each content item.
//!
//! The envelope is a common set of fields plus a `details` variant whose tag
//! must agree with the item's `content_type`. It is validated on every write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::{ContentStatus, ContentType};
use crate::kernel::jobs::TaskError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ContentDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<StructuredSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feed_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deep_dives: Vec<DeepDive>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDetails {
    Article(ArticleDetails),
    Podcast(PodcastDetails),
    News(NewsDetails),
}

impl ContentDetails {
    pub fn content_type(&self) -> ContentType {
        match self {
            ContentDetails::Article(_) => ContentType::Article,
            ContentDetails::Podcast(_) => ContentType::Podcast,
            ContentDetails::News(_) => ContentType::News,
        }
    }

    /// Text the summarizer works from, if it exists yet.
    pub fn body(&self) -> Option<&str> {
        let body = match self {
            ContentDetails::Article(a) => Some(a.text.as_str()),
            ContentDetails::News(n) => Some(n.text.as_str()),
            ContentDetails::Podcast(p) => p.transcript.as_deref(),
        };
        body.filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDetails {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub word_count: usize,
}

impl ArticleDetails {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            text,
            author: None,
            published_at: None,
            word_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodcastDetails {
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDetails {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

/// LLM summary output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredSummary {
    pub headline: String,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// How the body was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub strategy: String,
    /// URLs fetched, starting with the submitted one
    pub chain: Vec<String>,
    pub final_url: String,
    pub extracted_at: DateTime<Utc>,
}

/// Answer to a follow-up question. The question itself is not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepDive {
    pub answer: String,
    pub answered_at: DateTime<Utc>,
}

impl ContentMetadata {
    pub fn validate(&self, content_type: ContentType, status: ContentStatus) -> Result<(), TaskError> {
        if let Some(details) = &self.details {
            if details.content_type() != content_type {
                return Err(TaskError::MetadataMismatch {
                    expected: content_type.to_string(),
                    found: details.content_type().to_string(),
                });
            }

            match details {
                ContentDetails::Article(a) if a.text.trim().is_empty() => {
                    return Err(TaskError::validation("article body is empty"));
                }
                ContentDetails::News(n) if n.text.trim().is_empty() => {
                    return Err(TaskError::validation("news body is empty"));
                }
                ContentDetails::Podcast(p) if p.audio_url.trim().is_empty() => {
                    return Err(TaskError::validation("podcast has no audio URL"));
                }
                _ => {}
            }
        }

        match status {
            ContentStatus::Processing if self.details.is_none() => Err(TaskError::validation(
                "processing content must carry extracted details",
            )),
            ContentStatus::Completed if self.details.is_none() || self.summary.is_none() => Err(
                TaskError::validation("completed content must carry details and a summary"),
            ),
            _ => Ok(()),
        }
    }
}
