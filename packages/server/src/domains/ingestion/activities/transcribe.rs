use anyhow::Result;
use serde_json::json;
use tracing::info;

use super::{ensure_processing, load_content};
use crate::domains::contents::ContentDetails;
use crate::kernel::jobs::payload::{Summarize, Transcribe};
use crate::kernel::jobs::{HandlerOutcome, TaskContext, TaskError, TaskType};
use crate::kernel::ServerDeps;

/// Transcribe a podcast's audio, then hand it to summarization.
pub async fn transcribe(payload: Transcribe, ctx: TaskContext, deps: &ServerDeps) -> Result<HandlerOutcome> {
    let mut content = load_content(deps, payload.content_id).await?;
    if !ensure_processing(&content, TaskType::Transcribe)? {
        return Ok(HandlerOutcome::done());
    }

    let Some(ContentDetails::Podcast(details)) = content.metadata.details.as_mut() else {
        return Err(TaskError::validation(format!("content {} is not a podcast", content.id)).into());
    };

    // A redelivered task finds the transcript from the earlier attempt
    if details.transcript.is_none() {
        let transcript = deps.transcriber.transcribe(&details.audio_url).await?;
        if transcript.trim().is_empty() {
            return Err(TaskError::validation(format!("empty transcript for {}", details.audio_url)).into());
        }
        details.transcript = Some(transcript);

        let status = content.status;
        deps.contents
            .save_content(&content, status, deps.clock.now())
            .await?;
    }

    let words = content.body().map(|b| b.split_whitespace().count()).unwrap_or(0);
    info!(task_id = %ctx.task_id, content_id = %content.id, words, "podcast transcribed");

    HandlerOutcome::done()
        .with_result(json!({ "words": words }))
        .then(&Summarize {
            content_id: content.id,
            instruction: payload.instruction,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::contents::{Content, ContentStatus, ContentType, PodcastDetails};
    use crate::domains::ingestion::activities::test_context;
    use crate::kernel::store::ContentStore;
    use crate::kernel::test_dependencies::MockTranscriber;
    use crate::kernel::TestDependencies;

    fn processing_podcast(transcript: Option<&str>) -> Content {
        let mut content = Content::builder()
            .url("https://example.com/ep1")
            .content_type(ContentType::Podcast)
            .status(ContentStatus::Processing)
            .build();
        content.metadata.details = Some(ContentDetails::Podcast(PodcastDetails {
            audio_url: "https://cdn.example.com/ep1.mp3".into(),
            duration_seconds: None,
            show_notes: None,
            transcript: transcript.map(str::to_string),
        }));
        content
    }

    #[tokio::test]
    async fn test_transcript_is_stored_and_summarize_follows() {
        let transcriber = MockTranscriber::new().with_transcript("welcome to the show today");
        let test = TestDependencies::new().mock_transcriber(transcriber);
        let seeded = test.seed_content(processing_podcast(None)).await.unwrap();
        let deps = test.clone().into_server_deps();

        let outcome = transcribe(
            Transcribe {
                content_id: seeded.id,
                instruction: None,
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap();

        let stored = test.store.find_content(seeded.id).await.unwrap().unwrap();
        assert_eq!(stored.body(), Some("welcome to the show today"));
        assert_eq!(test.transcriber.calls(), vec!["https://cdn.example.com/ep1.mp3".to_string()]);
        assert_eq!(outcome.follow_ups[0].task_type, TaskType::Summarize);
    }

    #[tokio::test]
    async fn test_existing_transcript_is_not_redone() {
        let test = TestDependencies::new();
        let seeded = test.seed_content(processing_podcast(Some("already here"))).await.unwrap();
        let deps = test.clone().into_server_deps();

        transcribe(
            Transcribe {
                content_id: seeded.id,
                instruction: None,
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap();

        assert!(test.transcriber.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_propagates() {
        let transcriber = MockTranscriber::new().with_failure(TaskError::transient("upstream 503"));
        let test = TestDependencies::new().mock_transcriber(transcriber);
        let seeded = test.seed_content(processing_podcast(None)).await.unwrap();
        let deps = test.clone().into_server_deps();

        let err = transcribe(
            Transcribe {
                content_id: seeded.id,
                instruction: None,
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap_err();

        assert!(crate::kernel::jobs::classify(&err));
    }
}
