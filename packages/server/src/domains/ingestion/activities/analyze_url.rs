//! Extraction step: fetch the URL, pick a strategy, record what it found.

use anyhow::Result;
use extraction::{ExtractedData, ExtractedKind};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::load_content;
use crate::common::ContentId;
use crate::domains::contents::{
    ArticleDetails, Content, ContentDetails, ContentStatus, ContentType, NewsDetails, PodcastDetails,
    Provenance,
};
use crate::kernel::jobs::payload::{AnalyzeUrl, ProcessContent};
use crate::kernel::jobs::{HandlerOutcome, TaskContext, TaskError};
use crate::kernel::ServerDeps;

pub async fn analyze_url(payload: AnalyzeUrl, ctx: TaskContext, deps: &ServerDeps) -> Result<HandlerOutcome> {
    let mut content = load_content(deps, payload.content_id).await?;

    // Later stages own the item once it is past pending
    if !matches!(content.status, ContentStatus::New | ContentStatus::Pending) {
        info!(
            task_id = %ctx.task_id,
            content_id = %content.id,
            status = %content.status,
            "content already analyzed, skipping"
        );
        return Ok(HandlerOutcome::done());
    }

    let expected = content.status;
    let dispatched = deps.extraction.dispatch(&content.url).await?;
    let data = &dispatched.data;
    let now = deps.clock.now();

    content.metadata.details = Some(details_for(content.content_type, data)?);
    content.title = data.title.clone().or(content.title);
    content.platform = Some(data.platform.clone());
    content.metadata.image_url = data.image_url.clone();
    content.metadata.feed_links = data.feed_links.clone();
    content.metadata.provenance = Some(Provenance {
        strategy: dispatched.strategy.to_string(),
        chain: dispatched.chain.clone(),
        final_url: data.url.clone(),
        extracted_at: now,
    });
    content.transition(ContentStatus::Pending)?;

    deps.contents.save_content(&content, expected, now).await?;

    info!(
        task_id = %ctx.task_id,
        content_id = %content.id,
        strategy = dispatched.strategy,
        hops = dispatched.hops(),
        platform = %data.platform,
        "content analyzed"
    );

    let mut outcome = HandlerOutcome::done();
    let mut crawled = 0;
    if payload.crawl_links {
        for content_id in expand_links(deps, &content, &data.links).await? {
            outcome = outcome.then(&AnalyzeUrl {
                content_id,
                crawl_links: false,
                instruction: None,
            })?;
            crawled += 1;
        }
    }

    outcome
        .with_result(json!({
            "strategy": dispatched.strategy,
            "hops": dispatched.hops(),
            "crawled": crawled,
        }))
        .then(&ProcessContent {
            content_id: content.id,
            instruction: payload.instruction,
        })
}

/// Map extracted data onto the details variant the content type requires.
fn details_for(content_type: ContentType, data: &ExtractedData) -> Result<ContentDetails, TaskError> {
    let text = data.text.trim();

    match content_type {
        ContentType::Podcast => {
            let ExtractedKind::Audio {
                audio_url,
                duration_seconds,
            } = &data.kind
            else {
                return Err(TaskError::validation(format!("no audio found at {}", data.url)));
            };
            Ok(ContentDetails::Podcast(PodcastDetails {
                audio_url: audio_url.clone(),
                duration_seconds: *duration_seconds,
                show_notes: (!text.is_empty()).then(|| text.to_string()),
                transcript: None,
            }))
        }
        ContentType::Article if text.is_empty() => Err(TaskError::validation(format!(
            "no readable text at {}",
            data.url
        ))),
        ContentType::Article => {
            let mut details = ArticleDetails::new(text);
            details.author = data.author.clone();
            details.published_at = data.published_at.clone();
            Ok(ContentDetails::Article(details))
        }
        ContentType::News if text.is_empty() => Err(TaskError::validation(format!(
            "no readable text at {}",
            data.url
        ))),
        ContentType::News => Ok(ContentDetails::News(NewsDetails {
            text: text.to_string(),
            source_name: Url::parse(&data.url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string())),
        })),
    }
}

/// Create `new` article rows for same-site links, up to the configured cap.
async fn expand_links(deps: &ServerDeps, parent: &Content, links: &[String]) -> Result<Vec<ContentId>> {
    let mut created = Vec::new();

    for link in links {
        if created.len() >= deps.max_crawl_links {
            break;
        }
        if *link == parent.url {
            continue;
        }

        let now = deps.clock.now();
        let child = Content::builder()
            .url(link.as_str())
            .content_type(ContentType::Article)
            .created_at(now)
            .updated_at(now)
            .build();

        match deps.contents.insert_content(&child).await {
            Ok(true) => created.push(child.id),
            Ok(false) => debug!(url = %link, "linked content already known"),
            Err(e) => warn!(url = %link, error = %e, "skipping linked URL"),
        }
    }

    if !created.is_empty() {
        info!(content_id = %parent.id, created = created.len(), "crawl expanded");
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domains::ingestion::activities::test_context;
    use crate::kernel::store::ContentStore;
    use crate::kernel::TestDependencies;
    use extraction::{FetchedPage, MockFetcher};

    const ARTICLE_HTML: &str = r#"
        <html><head>
          <title>Sleep and memory</title>
          <meta name="author" content="A. Researcher">
          <meta property="og:image" content="https://example.com/cover.png">
          <link rel="alternate" type="application/rss+xml" href="/feed.xml">
        </head><body>
          <p>Sleep consolidates memory in several distinct stages.</p>
          <a href="/posts/one">One</a>
          <a href="/posts/two">Two</a>
          <a href="/posts/three">Three</a>
          <a href="https://elsewhere.test/x">Elsewhere</a>
        </body></html>
    "#;

    fn content(url: &str, content_type: ContentType) -> Content {
        Content::builder().url(url).content_type(content_type).build()
    }

    #[tokio::test]
    async fn test_article_moves_to_pending_with_details() {
        let test = TestDependencies::new()
            .mock_fetcher(MockFetcher::new().with_html("https://example.com/post", ARTICLE_HTML));
        let seeded = test
            .seed_content(content("https://example.com/post", ContentType::Article))
            .await
            .unwrap();
        let deps = test.clone().into_server_deps();

        let outcome = analyze_url(
            AnalyzeUrl {
                content_id: seeded.id,
                crawl_links: false,
                instruction: Some("focus on methods".into()),
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap();

        let stored = test.store.find_content(seeded.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ContentStatus::Pending);
        assert_eq!(stored.title.as_deref(), Some("Sleep and memory"));
        assert_eq!(stored.platform.as_deref(), Some("web"));
        assert_eq!(stored.metadata.image_url.as_deref(), Some("https://example.com/cover.png"));
        assert_eq!(stored.metadata.feed_links, vec!["https://example.com/feed.xml".to_string()]);
        let Some(ContentDetails::Article(details)) = &stored.metadata.details else {
            panic!("expected article details");
        };
        assert!(details.text.contains("consolidates memory"));
        assert_eq!(details.author.as_deref(), Some("A. Researcher"));
        assert_eq!(stored.metadata.provenance.as_ref().unwrap().strategy, "html");

        assert_eq!(outcome.follow_ups.len(), 1);
        assert_eq!(
            outcome.follow_ups[0].payload,
            json!({ "content_id": seeded.id, "instruction": "focus on methods" })
        );
    }

    #[tokio::test]
    async fn test_podcast_without_audio_is_rejected() {
        let test = TestDependencies::new()
            .mock_fetcher(MockFetcher::new().with_html("https://example.com/show", ARTICLE_HTML));
        let seeded = test
            .seed_content(content("https://example.com/show", ContentType::Podcast))
            .await
            .unwrap();
        let deps = test.clone().into_server_deps();

        let err = analyze_url(
            AnalyzeUrl {
                content_id: seeded.id,
                crawl_links: false,
                instruction: None,
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap_err();

        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Validation(_))));
        let stored = test.store.find_content(seeded.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ContentStatus::New);
    }

    #[tokio::test]
    async fn test_podcast_audio_file() {
        let page = FetchedPage::new("https://cdn.example.com/ep42.mp3", "")
            .with_content_type("audio/mpeg")
            .with_byte_len(1_000_000);
        let test = TestDependencies::new().mock_fetcher(MockFetcher::new().with_page(page));
        let seeded = test
            .seed_content(content("https://cdn.example.com/ep42.mp3", ContentType::Podcast))
            .await
            .unwrap();
        let deps = test.clone().into_server_deps();

        analyze_url(
            AnalyzeUrl {
                content_id: seeded.id,
                crawl_links: false,
                instruction: None,
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap();

        let stored = test.store.find_content(seeded.id).await.unwrap().unwrap();
        let Some(ContentDetails::Podcast(details)) = &stored.metadata.details else {
            panic!("expected podcast details");
        };
        assert_eq!(details.audio_url, "https://cdn.example.com/ep42.mp3");
        assert_eq!(details.transcript, None);
        assert_eq!(stored.platform.as_deref(), Some("podcast"));
    }

    #[tokio::test]
    async fn test_crawl_links_caps_and_skips_known_urls() {
        let test = TestDependencies::new()
            .mock_fetcher(MockFetcher::new().with_html("https://example.com/post", ARTICLE_HTML));
        let seeded = test
            .seed_content(content("https://example.com/post", ContentType::Article))
            .await
            .unwrap();
        test.seed_content(content("https://example.com/posts/one", ContentType::Article))
            .await
            .unwrap();
        let deps = Arc::new((*test.clone().into_server_deps()).clone().with_max_crawl_links(1));

        let outcome = analyze_url(
            AnalyzeUrl {
                content_id: seeded.id,
                crawl_links: true,
                instruction: None,
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap();

        // posts/one already exists, posts/two fills the cap of one
        let two = test
            .store
            .find_content_by_url("https://example.com/posts/two", ContentType::Article)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(two.status, ContentStatus::New);
        assert!(test
            .store
            .find_content_by_url("https://example.com/posts/three", ContentType::Article)
            .await
            .unwrap()
            .is_none());

        assert_eq!(outcome.follow_ups.len(), 2);
        assert_eq!(outcome.follow_ups[0].payload, json!({ "content_id": two.id }));
        assert_eq!(outcome.result.unwrap()["crawled"], 1);
    }

    #[tokio::test]
    async fn test_already_processing_is_skipped() {
        let mock = MockFetcher::new();
        let test = TestDependencies::new().mock_fetcher(mock.clone());
        let mut item = content("https://example.com/post", ContentType::Article);
        item.metadata.details = Some(ContentDetails::Article(ArticleDetails::new("body")));
        item.status = ContentStatus::Processing;
        let seeded = test.seed_content(item).await.unwrap();
        let deps = test.clone().into_server_deps();

        let outcome = analyze_url(
            AnalyzeUrl {
                content_id: seeded.id,
                crawl_links: false,
                instruction: None,
            },
            test_context(),
            &deps,
        )
        .await
        .unwrap();

        assert!(outcome.follow_ups.is_empty());
        assert_eq!(mock.fetch_call_count(), 0);
    }
}
