use anyhow::Result;
use tracing::info;

use super::load_content;
use crate::domains::contents::{ContentDetails, ContentStatus};
use crate::kernel::jobs::payload::{ProcessContent, Summarize, Transcribe};
use crate::kernel::jobs::{HandlerOutcome, TaskContext};
use crate::kernel::ServerDeps;

/// Claim the item for processing and route it to its next step.
///
/// Podcasts without a transcript go to the transcribe queue first.
pub async fn process_content(
    payload: ProcessContent,
    ctx: TaskContext,
    deps: &ServerDeps,
) -> Result<HandlerOutcome> {
    let mut content = load_content(deps, payload.content_id).await?;

    if content.status.is_terminal() {
        info!(task_id = %ctx.task_id, content_id = %content.id, status = %content.status, "content already finished, skipping");
        return Ok(HandlerOutcome::done());
    }

    if content.status != ContentStatus::Processing {
        let expected = content.status;
        content.transition(ContentStatus::Processing)?;
        deps.contents
            .save_content(&content, expected, deps.clock.now())
            .await?;
    }

    let needs_transcript = matches!(
        &content.metadata.details,
        Some(ContentDetails::Podcast(p)) if p.transcript.is_none()
    );

    info!(
        task_id = %ctx.task_id,
        content_id = %content.id,
        content_type = %content.content_type,
        needs_transcript,
        "content processing"
    );

    if needs_transcript {
        HandlerOutcome::done().then(&Transcribe {
            content_id: content.id,
            instruction: payload.instruction,
        })
    } else {
        HandlerOutcome::done().then(&Summarize {
            content_id: content.id,
            instruction: payload.instruction,
        })
    }
}
