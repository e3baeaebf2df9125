// Trait definitions for the downstream collaborators handlers call into.
//
// These are INFRASTRUCTURE traits only - prompts and parsing live behind them,
// pipeline decisions live in the handlers.
//
// Naming convention: Base* for trait names (e.g., BaseSummarizer)
//
// Implementations report transient trouble (timeouts, 429, 5xx) as
// `TaskError::TransientExternal` so the retry classifier can see it.

use anyhow::Result;
use async_trait::async_trait;

use crate::domains::contents::{Content, ContentType, StructuredSummary};
use crate::kernel::alerts::Alert;

// =============================================================================
// Summarizer (LLM)
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub content_type: ContentType,
    pub title: Option<String>,
    pub text: String,
    /// Ephemeral steering text from the submitter
    pub instruction: Option<String>,
}

#[async_trait]
pub trait BaseSummarizer: Send + Sync {
    async fn summarize(&self, request: SummaryRequest) -> Result<StructuredSummary>;
}

// =============================================================================
// Transcriber
// =============================================================================

#[async_trait]
pub trait BaseTranscriber: Send + Sync {
    /// Transcribe the audio at `audio_url` to plain text.
    async fn transcribe(&self, audio_url: &str) -> Result<String>;
}

// =============================================================================
// Thumbnail Service
// =============================================================================

#[async_trait]
pub trait BaseThumbnailService: Send + Sync {
    /// Image URL to show next to the item, if one can be found or made.
    async fn thumbnail_for(&self, content: &Content) -> Result<Option<String>>;
}

// =============================================================================
// Chat Service (dig deeper)
// =============================================================================

#[async_trait]
pub trait BaseChatService: Send + Sync {
    /// Answer `question` using `context` (summary plus body) as grounding.
    async fn answer(&self, context: &str, question: &str) -> Result<String>;
}

// =============================================================================
// Alert Sink
// =============================================================================

#[async_trait]
pub trait BaseAlertSink: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<()>;
}
