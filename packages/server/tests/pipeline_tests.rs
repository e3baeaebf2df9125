//! End-to-end pipeline tests against the in-memory store.

mod common;

use std::time::Duration;

use extraction::MockFetcher;
use futures::future::join_all;
use serde_json::json;
use server_core::common::ContentId;
use server_core::domains::contents::{Content, ContentDetails, ContentStatus, ContentType, NewsDetails};
use server_core::kernel::jobs::payload::{AnalyzeUrl, GenerateThumbnail, Summarize};
use server_core::kernel::jobs::{
    QueueName, Task, TaskOutcome, TaskStatus, TaskType, Watchdog, WatchdogConfig,
};
use server_core::kernel::store::{AuditLog, ContentStore, TaskStore};
use server_core::kernel::test_dependencies::{MockSummarizer, MockTranscriber};
use server_core::kernel::{Clock, TestDependencies};

use common::Pipeline;

const ARTICLE_HTML: &str = r#"
    <html><head>
      <title>Sleep and memory</title>
      <meta property="og:image" content="https://example.com/cover.png">
      <link rel="alternate" type="application/rss+xml" href="/feed.xml">
    </head><body>
      <p>Sleep consolidates memory in several distinct stages.</p>
      <p>Participants who slept recalled more word pairs.</p>
    </body></html>
"#;

const EPISODE_HTML: &str = r#"
    <html><head>
      <title>Episode 42: Deep sleep</title>
      <meta property="og:audio" content="https://cdn.example.com/ep42.mp3">
    </head><body><p>This week we talk about deep sleep.</p></body></html>
"#;

const LEASE: Duration = Duration::from_secs(30 * 60);

#[tokio::test]
async fn article_runs_from_submission_to_completion() {
    let test = TestDependencies::new()
        .mock_fetcher(MockFetcher::new().with_html("https://example.com/post", ARTICLE_HTML));
    let pipeline = Pipeline::new(test);
    let content = pipeline
        .seed("https://example.com/post", ContentType::Article)
        .await
        .unwrap();

    let analyze_id = pipeline
        .deps
        .queue
        .enqueue_payload(&AnalyzeUrl {
            content_id: content.id,
            crawl_links: false,
            instruction: Some("focus on methods".into()),
        })
        .await
        .unwrap();

    let outcomes = pipeline.drain().await.unwrap();

    // analyze, process, summarize, thumbnail, feeds
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, TaskOutcome::Completed { .. })));

    let stored = pipeline.test.store.find_content(content.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ContentStatus::Completed);
    assert_eq!(stored.title.as_deref(), Some("Sleep and memory"));
    assert!(stored.metadata.summary.is_some());
    assert_eq!(
        stored.metadata.thumbnail_url.as_deref(),
        Some("https://example.com/cover.png")
    );
    assert_eq!(
        stored.metadata.feed_links,
        vec!["https://example.com/feed.xml".to_string()]
    );

    // The instruction reached the summarizer and was scrubbed from the stored task
    let calls = pipeline.test.summarizer.calls();
    assert_eq!(calls[0].instruction.as_deref(), Some("focus on methods"));
    let analyze = pipeline.test.store.find_task(analyze_id).await.unwrap().unwrap();
    assert_eq!(analyze.status, TaskStatus::Completed);
    assert_eq!(analyze.payload, json!({ "content_id": content.id }));
}

#[tokio::test]
async fn podcast_is_transcribed_before_summarizing() {
    let test = TestDependencies::new()
        .mock_fetcher(MockFetcher::new().with_html("https://example.com/ep42", EPISODE_HTML))
        .mock_transcriber(MockTranscriber::new().with_transcript("welcome back to the show"));
    let pipeline = Pipeline::new(test);
    let content = pipeline
        .seed("https://example.com/ep42", ContentType::Podcast)
        .await
        .unwrap();

    pipeline
        .deps
        .queue
        .enqueue_payload(&AnalyzeUrl {
            content_id: content.id,
            crawl_links: false,
            instruction: None,
        })
        .await
        .unwrap();

    let outcomes = pipeline.drain().await.unwrap();
    // analyze, process, transcribe, summarize, thumbnail
    assert_eq!(outcomes.len(), 5);

    let stored = pipeline.test.store.find_content(content.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ContentStatus::Completed);
    let Some(ContentDetails::Podcast(details)) = &stored.metadata.details else {
        panic!("expected podcast details");
    };
    assert_eq!(details.transcript.as_deref(), Some("welcome back to the show"));
    assert_eq!(
        pipeline.test.transcriber.calls(),
        vec!["https://cdn.example.com/ep42.mp3".to_string()]
    );
    assert_eq!(
        pipeline.test.summarizer.calls()[0].text,
        "welcome back to the show"
    );
}

#[tokio::test]
async fn summarize_recovers_after_two_timeouts() {
    let test = TestDependencies::new().mock_summarizer(MockSummarizer::new().with_timeouts(2));
    let pipeline = Pipeline::new(test);

    let mut content = Content::builder()
        .url("https://news.example.com/budget")
        .content_type(ContentType::News)
        .status(ContentStatus::Processing)
        .build();
    content.metadata.details = Some(ContentDetails::News(NewsDetails {
        text: "The council approved the budget on Tuesday.".into(),
        source_name: Some("news.example.com".into()),
    }));
    let content = pipeline.test.seed_content(content).await.unwrap();

    let task_id = pipeline
        .deps
        .queue
        .enqueue_payload(&Summarize {
            content_id: content.id,
            instruction: None,
        })
        .await
        .unwrap();

    assert_eq!(
        pipeline.drain().await.unwrap(),
        vec![TaskOutcome::Retrying { retry_count: 1 }]
    );
    pipeline.advance(Duration::from_secs(2 * 3600));
    assert_eq!(
        pipeline.drain().await.unwrap(),
        vec![TaskOutcome::Retrying { retry_count: 2 }]
    );
    pipeline.advance(Duration::from_secs(2 * 3600));
    let outcomes = pipeline.drain().await.unwrap();
    assert_eq!(outcomes[0], TaskOutcome::Completed { follow_ups: 1 });

    let task = pipeline.test.store.find_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 2);

    let stored = pipeline.test.store.find_content(content.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ContentStatus::Completed);
    assert_eq!(pipeline.test.summarizer.call_count(), 3);
}

#[tokio::test]
async fn terminal_extraction_failure_fails_the_content() {
    // No page registered: the fetcher answers 404
    let pipeline = Pipeline::new(TestDependencies::new());
    let content = pipeline
        .seed("https://example.com/missing", ContentType::Article)
        .await
        .unwrap();

    pipeline
        .deps
        .queue
        .enqueue_payload(&AnalyzeUrl {
            content_id: content.id,
            crawl_links: false,
            instruction: None,
        })
        .await
        .unwrap();

    assert_eq!(pipeline.drain().await.unwrap(), vec![TaskOutcome::Failed]);
    let stored = pipeline.test.store.find_content(content.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ContentStatus::Failed);
    assert!(stored.error_message.is_some());
}

#[tokio::test]
async fn watchdog_requeues_a_stale_lease() {
    let test = TestDependencies::new();
    let deps = test.clone().into_server_deps();
    let content = test
        .seed_content(
            Content::builder()
                .url("https://example.com/a")
                .content_type(ContentType::Article)
                .build(),
        )
        .await
        .unwrap();

    let task_id = deps
        .queue
        .enqueue_payload(&GenerateThumbnail {
            content_id: content.id,
        })
        .await
        .unwrap();
    let claimed = deps
        .queue
        .dequeue(QueueName::Content, "dead-worker", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, task_id);

    // Lease expired three hours ago, past the two hour threshold
    test.clock.advance(LEASE + Duration::from_secs(3 * 3600));

    let watchdog = Watchdog::from_deps(&deps, test.alerts.clone(), WatchdogConfig::default());
    let report = watchdog.run_once().await.unwrap();
    assert_eq!(report.requeued, 1);
    assert_eq!(report.touched_count(), 1);

    let task = test.store.find_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.worker_id, None);

    let events = test.store.recent_events("watchdog", 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].count("touched_count"), Some(1));

    // A second cycle finds nothing left to do
    let again = watchdog.run_once().await.unwrap();
    assert_eq!(again.touched_count(), 0);
    let events = test.store.recent_events("watchdog", 10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].count("touched_count"), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_have_one_winner() {
    let test = TestDependencies::new();
    let deps = test.clone().into_server_deps();
    let content_id = ContentId::new();

    let attempts = (0..8).map(|i| {
        let deps = deps.clone();
        tokio::spawn(async move {
            deps.checkouts
                .acquire(content_id, &format!("worker-{i}"), LEASE)
                .await
                .unwrap()
        })
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_acquired()).count(), 1);
}

#[tokio::test]
async fn retried_tasks_are_not_starved_by_fresh_ones() {
    let test = TestDependencies::new();
    let deps = test.clone().into_server_deps();
    let now = test.clock.now();

    for _ in 0..3 {
        deps.queue
            .enqueue_payload(&GenerateThumbnail {
                content_id: ContentId::new(),
            })
            .await
            .unwrap();
    }
    let retried = Task::builder()
        .task_type(TaskType::GenerateThumbnail)
        .queue(QueueName::Content)
        .payload(json!({ "content_id": ContentId::new() }))
        .retry_count(1)
        .run_after(now)
        .created_at(now)
        .updated_at(now)
        .build();
    test.store.insert_task(&retried).await.unwrap();

    let mut buckets = Vec::new();
    while let Some(task) = deps
        .queue
        .dequeue(QueueName::Content, "worker-1", LEASE)
        .await
        .unwrap()
    {
        buckets.push(task.retry_count);
    }

    assert_eq!(buckets, vec![0, 1, 0, 0]);
}
