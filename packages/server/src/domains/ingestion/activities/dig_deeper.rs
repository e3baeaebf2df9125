//! Follow-up questions on summarized content.

use anyhow::Result;
use serde_json::json;
use tracing::info;

use super::load_content;
use crate::domains::contents::{Content, ContentStatus, DeepDive};
use crate::kernel::jobs::payload::DigDeeper;
use crate::kernel::jobs::{HandlerOutcome, TaskContext, TaskError};
use crate::kernel::ServerDeps;

/// Characters of body text sent along with the summary.
const MAX_CONTEXT_BODY: usize = 12_000;

pub async fn dig_deeper(payload: DigDeeper, ctx: TaskContext, deps: &ServerDeps) -> Result<HandlerOutcome> {
    let mut content = load_content(deps, payload.content_id).await?;

    if content.status != ContentStatus::Completed {
        return Err(TaskError::validation(format!(
            "content {} is {}, only completed content can be questioned",
            content.id, content.status
        ))
        .into());
    }

    let answer = deps
        .chat
        .answer(&build_context(&content), &payload.instruction)
        .await?;

    content.metadata.deep_dives.push(DeepDive {
        answer: answer.clone(),
        answered_at: deps.clock.now(),
    });
    deps.contents
        .save_content(&content, ContentStatus::Completed, deps.clock.now())
        .await?;

    info!(
        task_id = %ctx.task_id,
        content_id = %content.id,
        dives = content.metadata.deep_dives.len(),
        "follow-up answered"
    );
    Ok(HandlerOutcome::done().with_result(json!({ "answer": answer })))
}

fn build_context(content: &Content) -> String {
    let mut context = String::new();

    if let Some(title) = &content.title {
        context.push_str(&format!("Title: {title}\n"));
    }
    if let Some(summary) = &content.metadata.summary {
        context.push_str(&format!("Summary: {}\n", summary.summary));
        for point in &summary.key_points {
            context.push_str(&format!("- {point}\n"));
        }
    }
    if let Some(body) = content.body() {
        let body: String = body.chars().take(MAX_CONTEXT_BODY).collect();
        context.push('\n');
        context.push_str(&body);
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::contents::{ArticleDetails, ContentDetails, ContentType, StructuredSummary};
    use crate::domains::ingestion::activities::test_context;
    use crate::kernel::store::ContentStore;
    use crate::kernel::test_dependencies::MockChat;
    use crate::kernel::TestDependencies;

    fn article(status: ContentStatus) -> Content {
        let mut content = Content::builder()
            .url("https://example.com/study")
            .content_type(ContentType::Article)
            .status(status)
            .title("A sleep study")
            .build();
        content.metadata.details = Some(ContentDetails::Article(ArticleDetails::new(
            "We enrolled 40 participants.",
        )));
        if status == ContentStatus::Completed {
            content.metadata.summary = Some(StructuredSummary {
                headline: "A sleep study".into(),
                summary: "Sleep helps memory.".into(),
                key_points: vec!["40 participants".into()],
                topics: vec!["sleep".into()],
            });
        }
        content
    }

    #[tokio::test]
    async fn test_answer_is_appended() {
        let test = TestDependencies::new().mock_chat(MockChat::new().with_answer("Forty people."));
        let seeded = test.seed_content(article(ContentStatus::Completed)).await.unwrap();
        let deps = test.clone().into_server_deps();

        let outcome = dig_deeper(
            DigDeeper {
                content_id: seeded.id,
                instruction: "What was the sample size?".into(),
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap();

        assert_eq!(outcome.result.unwrap()["answer"], "Forty people.");
        let stored = test.store.find_content(seeded.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.deep_dives.len(), 1);
        assert_eq!(stored.metadata.deep_dives[0].answer, "Forty people.");

        let calls = test.chat.calls();
        assert_eq!(calls[0].question, "What was the sample size?");
        assert!(calls[0].context.contains("Sleep helps memory."));
        assert!(calls[0].context.contains("We enrolled 40 participants."));
    }

    #[tokio::test]
    async fn test_unsummarized_content_is_rejected() {
        let test = TestDependencies::new();
        let seeded = test.seed_content(article(ContentStatus::Processing)).await.unwrap();
        let deps = test.clone().into_server_deps();

        let err = dig_deeper(
            DigDeeper {
                content_id: seeded.id,
                instruction: "Why?".into(),
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap_err();

        assert!(!crate::kernel::jobs::classify(&err));
        assert!(test.chat.calls().is_empty());
    }
}
