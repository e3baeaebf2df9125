use anyhow::Result;
use serde_json::json;
use tracing::{debug, info};

use super::load_content;
use crate::domains::contents::ContentStatus;
use crate::kernel::jobs::payload::GenerateThumbnail;
use crate::kernel::jobs::{HandlerOutcome, TaskContext};
use crate::kernel::ServerDeps;

pub async fn generate_thumbnail(
    payload: GenerateThumbnail,
    ctx: TaskContext,
    deps: &ServerDeps,
) -> Result<HandlerOutcome> {
    let mut content = load_content(deps, payload.content_id).await?;

    if content.status != ContentStatus::Completed {
        debug!(content_id = %content.id, status = %content.status, "thumbnail requested before completion, skipping");
        return Ok(HandlerOutcome::done());
    }
    if let Some(existing) = &content.metadata.thumbnail_url {
        return Ok(HandlerOutcome::done().with_result(json!({ "thumbnail_url": existing })));
    }

    let Some(thumbnail_url) = deps.thumbnails.thumbnail_for(&content).await? else {
        info!(task_id = %ctx.task_id, content_id = %content.id, "no thumbnail available");
        return Ok(HandlerOutcome::done().with_result(json!({ "thumbnail_url": null })));
    };

    content.metadata.thumbnail_url = Some(thumbnail_url.clone());
    deps.contents
        .save_content(&content, ContentStatus::Completed, deps.clock.now())
        .await?;

    info!(task_id = %ctx.task_id, content_id = %content.id, thumbnail_url = %thumbnail_url, "thumbnail stored");
    Ok(HandlerOutcome::done().with_result(json!({ "thumbnail_url": thumbnail_url })))
}
