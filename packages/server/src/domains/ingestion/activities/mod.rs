//! Task handlers for the ingestion pipeline.
//!
//! ```text
//! analyze_url ─► process_content ─┬─► summarize ─┬─► generate_thumbnail
//!                                 │              └─► discover_feeds (articles)
//!                                 └─► transcribe ─► summarize
//! ```
//!
//! Handlers only read and write content through conditional saves and report
//! failures as errors. Retry policy belongs to the processor.

pub mod analyze_url;
pub mod dig_deeper;
pub mod discover_feeds;
pub mod generate_thumbnail;
pub mod process_content;
pub mod summarize;
pub mod transcribe;

use anyhow::Result;
use tracing::info;

use crate::common::ContentId;
use crate::domains::contents::{Content, ContentStatus};
use crate::kernel::jobs::payload::{
    AnalyzeUrl, DigDeeper, DiscoverFeeds, GenerateThumbnail, ProcessContent, Summarize, Transcribe,
};
use crate::kernel::jobs::{HandlerRegistry, TaskError, TaskType};
use crate::kernel::ServerDeps;

pub use analyze_url::analyze_url;
pub use dig_deeper::dig_deeper;
pub use discover_feeds::discover_feeds;
pub use generate_thumbnail::generate_thumbnail;
pub use process_content::process_content;
pub use summarize::summarize;
pub use transcribe::transcribe;

/// Registry with a handler for every task type.
pub fn build_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register::<AnalyzeUrl, _, _>(|payload, ctx, deps| async move {
        analyze_url(payload, ctx, &deps).await
    });
    registry.register::<ProcessContent, _, _>(|payload, ctx, deps| async move {
        process_content(payload, ctx, &deps).await
    });
    registry.register::<Transcribe, _, _>(|payload, ctx, deps| async move {
        transcribe(payload, ctx, &deps).await
    });
    registry.register::<Summarize, _, _>(|payload, ctx, deps| async move {
        summarize(payload, ctx, &deps).await
    });
    registry.register::<GenerateThumbnail, _, _>(|payload, ctx, deps| async move {
        generate_thumbnail(payload, ctx, &deps).await
    });
    registry.register::<DiscoverFeeds, _, _>(|payload, ctx, deps| async move {
        discover_feeds(payload, ctx, &deps).await
    });
    registry.register::<DigDeeper, _, _>(|payload, ctx, deps| async move {
        dig_deeper(payload, ctx, &deps).await
    });

    registry
}

pub(crate) async fn load_content(deps: &ServerDeps, id: ContentId) -> Result<Content> {
    let content = deps
        .contents
        .find_content(id)
        .await?
        .ok_or_else(|| TaskError::not_found("content", id))?;
    Ok(content)
}

/// Whether a mid-pipeline step should run against `content`.
///
/// Terminal content means a redelivered task already finished its work, so
/// the step is skipped. Any other status besides `processing` is out of
/// order and fails the task.
pub(crate) fn ensure_processing(content: &Content, step: TaskType) -> Result<bool, TaskError> {
    match content.status {
        ContentStatus::Processing => Ok(true),
        status if status.is_terminal() => {
            info!(content_id = %content.id, status = %status, step = %step, "content already finished, skipping");
            Ok(false)
        }
        status => Err(TaskError::InvalidTransition {
            from: status.to_string(),
            to: ContentStatus::Processing.to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> crate::kernel::jobs::TaskContext {
    crate::kernel::jobs::TaskContext {
        task_id: crate::common::TaskId::new(),
        retry_count: 0,
        worker_id: "worker-test".to_string(),
    }
}
