use anyhow::Result;
use serde_json::json;
use tracing::info;

use super::{ensure_processing, load_content};
use crate::domains::contents::{Content, ContentStatus, ContentType};
use crate::kernel::jobs::payload::{DiscoverFeeds, GenerateThumbnail, Summarize};
use crate::kernel::jobs::{HandlerOutcome, TaskContext, TaskError, TaskType};
use crate::kernel::{ServerDeps, SummaryRequest};

/// Summarize the body and complete the item.
///
/// Completed content skips the LLM call but still emits the follow-ups, so a
/// task redelivered after its save but before completion loses nothing.
pub async fn summarize(payload: Summarize, ctx: TaskContext, deps: &ServerDeps) -> Result<HandlerOutcome> {
    let mut content = load_content(deps, payload.content_id).await?;

    if content.status == ContentStatus::Completed {
        return follow_ups(&content, HandlerOutcome::done());
    }
    if !ensure_processing(&content, TaskType::Summarize)? {
        return Ok(HandlerOutcome::done());
    }

    let text = content
        .body()
        .ok_or_else(|| TaskError::validation(format!("content {} has no text to summarize", content.id)))?
        .to_string();

    let summary = deps
        .summarizer
        .summarize(SummaryRequest {
            content_type: content.content_type,
            title: content.title.clone(),
            text,
            instruction: payload.instruction,
        })
        .await?;

    content.metadata.summary = Some(summary);
    content.transition(ContentStatus::Completed)?;
    deps.contents
        .save_content(&content, ContentStatus::Processing, deps.clock.now())
        .await?;

    info!(
        task_id = %ctx.task_id,
        content_id = %content.id,
        attempt = ctx.retry_count,
        "content summarized"
    );

    let headline = content.metadata.summary.as_ref().map(|s| s.headline.clone());
    follow_ups(&content, HandlerOutcome::done().with_result(json!({ "headline": headline })))
}

fn follow_ups(content: &Content, outcome: HandlerOutcome) -> Result<HandlerOutcome> {
    let mut outcome = outcome.then(&GenerateThumbnail {
        content_id: content.id,
    })?;
    if content.content_type == ContentType::Article {
        outcome = outcome.then(&DiscoverFeeds {
            content_id: content.id,
        })?;
    }
    Ok(outcome)
}
