// TestDependencies - mock implementations for testing
//
// Provides mock collaborators plus an in-memory store and manual clock that
// can be turned into ServerDeps for handler and processor tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use extraction::{MockFetcher, StrategyRegistry};

use super::alerts::Alert;
use super::clock::ManualClock;
use super::jobs::{QueueService, RetryPolicy, TaskError};
use super::stores::MemoryStore;
use super::{
    BaseAlertSink, BaseChatService, BaseSummarizer, BaseThumbnailService, BaseTranscriber,
    ServerDeps, SummaryRequest,
};
use crate::common::ContentId;
use crate::domains::contents::{Content, StructuredSummary};

// =============================================================================
// Mock Summarizer
// =============================================================================

pub struct MockSummarizer {
    failures: Arc<Mutex<VecDeque<TaskError>>>,
    responses: Arc<Mutex<Vec<StructuredSummary>>>,
    calls: Arc<Mutex<Vec<SummaryRequest>>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            failures: Arc::new(Mutex::new(VecDeque::new())),
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail the next `times` calls with a transient timeout
    pub fn with_timeouts(self, times: usize) -> Self {
        {
            let mut failures = self.failures.lock().unwrap();
            for _ in 0..times {
                failures.push_back(TaskError::transient("summarizer request timed out"));
            }
        }
        self
    }

    /// Fail the next call with the given error
    pub fn with_failure(self, error: TaskError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    pub fn with_summary(self, summary: StructuredSummary) -> Self {
        self.responses.lock().unwrap().push(summary);
        self
    }

    pub fn calls(&self) -> Vec<SummaryRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSummarizer for MockSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> Result<StructuredSummary> {
        self.calls.lock().unwrap().push(request.clone());

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error.into());
        }

        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            return Ok(responses.remove(0));
        }

        let headline = request
            .title
            .unwrap_or_else(|| request.text.split_whitespace().take(6).collect::<Vec<_>>().join(" "));
        Ok(StructuredSummary {
            headline,
            summary: format!("Mock summary of {} words.", request.text.split_whitespace().count()),
            key_points: vec!["Mock key point".to_string()],
            topics: vec![request.content_type.to_string()],
        })
    }
}

// =============================================================================
// Mock Transcriber
// =============================================================================

pub struct MockTranscriber {
    transcript: String,
    failures: Arc<Mutex<VecDeque<TaskError>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self {
            transcript: "Welcome to the show. Today we talk about mock audio.".to_string(),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_transcript(mut self, transcript: &str) -> Self {
        self.transcript = transcript.to_string();
        self
    }

    pub fn with_failure(self, error: TaskError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    /// Audio URLs that were transcribed
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseTranscriber for MockTranscriber {
    async fn transcribe(&self, audio_url: &str) -> Result<String> {
        self.calls.lock().unwrap().push(audio_url.to_string());

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error.into());
        }
        Ok(self.transcript.clone())
    }
}

// =============================================================================
// Mock Thumbnail Service
// =============================================================================

pub struct MockThumbnailService {
    calls: Arc<Mutex<Vec<ContentId>>>,
}

impl MockThumbnailService {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<ContentId> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockThumbnailService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseThumbnailService for MockThumbnailService {
    async fn thumbnail_for(&self, content: &Content) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(content.id);
        Ok(Some(
            content
                .metadata
                .image_url
                .clone()
                .unwrap_or_else(|| format!("https://thumbs.test/{}.png", content.id)),
        ))
    }
}

// =============================================================================
// Mock Chat Service
// =============================================================================

/// Arguments captured from an answer call
#[derive(Debug, Clone)]
pub struct ChatCallArgs {
    pub context: String,
    pub question: String,
}

pub struct MockChat {
    answer: String,
    calls: Arc<Mutex<Vec<ChatCallArgs>>>,
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            answer: "Mock answer.".to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_answer(mut self, answer: &str) -> Self {
        self.answer = answer.to_string();
        self
    }

    pub fn calls(&self) -> Vec<ChatCallArgs> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseChatService for MockChat {
    async fn answer(&self, context: &str, question: &str) -> Result<String> {
        self.calls.lock().unwrap().push(ChatCallArgs {
            context: context.to_string(),
            question: question.to_string(),
        });
        Ok(self.answer.clone())
    }
}

// =============================================================================
// Recording Alert Sink
// =============================================================================

#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseAlertSink for RecordingAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub fetcher: MockFetcher,
    pub summarizer: Arc<MockSummarizer>,
    pub transcriber: Arc<MockTranscriber>,
    pub thumbnails: Arc<MockThumbnailService>,
    pub chat: Arc<MockChat>,
    pub alerts: Arc<RecordingAlertSink>,
    pub retry: RetryPolicy,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::default()),
            fetcher: MockFetcher::new(),
            summarizer: Arc::new(MockSummarizer::new()),
            transcriber: Arc::new(MockTranscriber::new()),
            thumbnails: Arc::new(MockThumbnailService::new()),
            chat: Arc::new(MockChat::new()),
            alerts: Arc::new(RecordingAlertSink::new()),
            // No jitter so backoff assertions are exact
            retry: RetryPolicy {
                base: Duration::from_secs(30),
                max_delay: Duration::from_secs(3600),
                jitter: Duration::ZERO,
            },
        }
    }

    /// Set the fetcher behind the strategy registry
    pub fn mock_fetcher(mut self, fetcher: MockFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn mock_summarizer(mut self, summarizer: MockSummarizer) -> Self {
        self.summarizer = Arc::new(summarizer);
        self
    }

    pub fn mock_transcriber(mut self, transcriber: MockTranscriber) -> Self {
        self.transcriber = Arc::new(transcriber);
        self
    }

    pub fn mock_chat(mut self, chat: MockChat) -> Self {
        self.chat = Arc::new(chat);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Insert a content row at `new`
    pub async fn seed_content(&self, content: Content) -> Result<Content> {
        use super::store::ContentStore;

        let inserted = self.store.insert_content(&content).await?;
        anyhow::ensure!(inserted, "content {} already exists", content.url);
        Ok(content)
    }

    /// Convert into ServerDeps for testing
    pub fn into_server_deps(self) -> Arc<ServerDeps> {
        let queue = QueueService::new(self.store.clone(), self.store.clone(), self.clock.clone())
            .with_retry_policy(self.retry);
        let registry = StrategyRegistry::new(Arc::new(self.fetcher));

        Arc::new(ServerDeps::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.store,
            queue,
            Arc::new(registry),
            self.summarizer,
            self.transcriber,
            self.thumbnails,
            self.chat,
            self.clock,
        ))
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
