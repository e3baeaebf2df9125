use anyhow::Result;
use extraction::html;
use serde_json::json;
use tracing::info;
use url::Url;

use super::load_content;
use crate::domains::contents::ContentStatus;
use crate::kernel::jobs::payload::DiscoverFeeds;
use crate::kernel::jobs::{HandlerOutcome, TaskContext, TaskError};
use crate::kernel::ServerDeps;

/// Record the RSS/Atom feeds an article's page advertises.
///
/// Feeds seen at extraction time are reused; otherwise the page is fetched
/// again from its final URL.
pub async fn discover_feeds(payload: DiscoverFeeds, ctx: TaskContext, deps: &ServerDeps) -> Result<HandlerOutcome> {
    let mut content = load_content(deps, payload.content_id).await?;

    if matches!(content.status, ContentStatus::Failed | ContentStatus::Skipped) {
        return Ok(HandlerOutcome::done());
    }
    if !content.metadata.feed_links.is_empty() {
        let count = content.metadata.feed_links.len();
        return Ok(HandlerOutcome::done().with_result(json!({ "feeds": count })));
    }

    let page_url = content
        .metadata
        .provenance
        .as_ref()
        .map(|p| p.final_url.clone())
        .unwrap_or_else(|| content.url.clone());

    let page = deps.extraction.fetcher().fetch(&page_url).await?;
    let base = Url::parse(&page.final_url)
        .map_err(|e| TaskError::validation(format!("invalid page URL {}: {e}", page.final_url)))?;
    let feeds = html::extract_feed_links(&base, &page.body);

    if !feeds.is_empty() {
        content.metadata.feed_links = feeds;
        let status = content.status;
        deps.contents
            .save_content(&content, status, deps.clock.now())
            .await?;
    }

    let count = content.metadata.feed_links.len();
    info!(task_id = %ctx.task_id, content_id = %content.id, feeds = count, "feeds discovered");
    Ok(HandlerOutcome::done().with_result(json!({ "feeds": count })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::contents::{ArticleDetails, Content, ContentDetails, ContentType, StructuredSummary};
    use crate::domains::ingestion::activities::test_context;
    use crate::kernel::store::ContentStore;
    use crate::kernel::TestDependencies;
    use extraction::MockFetcher;

    fn completed(url: &str) -> Content {
        let mut content = Content::builder()
            .url(url)
            .content_type(ContentType::Article)
            .status(ContentStatus::Completed)
            .build();
        content.metadata.details = Some(ContentDetails::Article(ArticleDetails::new("Body.")));
        content.metadata.summary = Some(StructuredSummary {
            headline: "Headline".into(),
            summary: "Summary.".into(),
            key_points: vec![],
            topics: vec![],
        });
        content
    }

    #[tokio::test]
    async fn test_fetches_page_for_feeds() {
        let mock = MockFetcher::new().with_html(
            "https://blog.example.com/post",
            r#"<link rel="alternate" type="application/atom+xml" href="/atom.xml"><p>x</p>"#,
        );
        let test = TestDependencies::new().mock_fetcher(mock);
        let seeded = test
            .seed_content(completed("https://blog.example.com/post"))
            .await
            .unwrap();
        let deps = test.clone().into_server_deps();

        let outcome = discover_feeds(DiscoverFeeds { content_id: seeded.id }, test_context(), &deps)
            .await
            .unwrap();

        let stored = test.store.find_content(seeded.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.feed_links, vec!["https://blog.example.com/atom.xml".to_string()]);
        assert_eq!(outcome.result.unwrap()["feeds"], 1);
    }

    #[tokio::test]
    async fn test_known_feeds_skip_the_fetch() {
        let mock = MockFetcher::new();
        let test = TestDependencies::new().mock_fetcher(mock.clone());
        let mut item = completed("https://blog.example.com/post");
        item.metadata.feed_links = vec!["https://blog.example.com/rss".into()];
        let seeded = test.seed_content(item).await.unwrap();
        let deps = test.clone().into_server_deps();

        discover_feeds(DiscoverFeeds { content_id: seeded.id }, test_context(), &deps)
            .await
            .unwrap();

        assert_eq!(mock.fetch_call_count(), 0);
    }
}
