//! OpenAI-compatible client backing the summarizer, transcriber and chat traits.
//!
//! Speaks the chat completions and audio transcriptions endpoints directly over
//! `reqwest`. 429 and 5xx answers surface as `TaskError::TransientExternal`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::jobs::TaskError;
use super::traits::{BaseChatService, BaseSummarizer, BaseTranscriber, SummaryRequest};
use crate::domains::contents::StructuredSummary;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Longest body sent to the model, in characters.
const MAX_INPUT_CHARS: usize = 48_000;

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize content for a reading queue. \
Answer with a JSON object with keys headline (string), summary (string), \
key_points (array of strings) and topics (array of strings).";

const CHAT_SYSTEM_PROMPT: &str = "Answer the question using only the provided material. \
Say so when the material does not contain the answer.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

impl Message {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    transcription_model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
        })
    }

    /// Set a custom base URL (for proxies or compatible servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_transcription_model(mut self, model: impl Into<String>) -> Self {
        self.transcription_model = model.into();
        self
    }

    async fn chat(&self, messages: Vec<Message>, json_output: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            response_format: json_output.then(|| serde_json::json!({ "type": "json_object" })),
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?;

        let response = check_status(response, "chat completion").await?;
        let body: ChatResponse = response
            .json()
            .await
            .context("chat completion response was not JSON")?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| TaskError::transient("chat completion returned no content").into())
    }
}

/// Map an HTTP status to the error taxonomy, passing successes through.
///
/// The response body is logged but kept out of the error, so provider text
/// never influences retry classification.
async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    warn!(status = %status, error = %error_text, "{what} failed");
    Err(TaskError::from_status(what, status.as_u16()).into())
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl BaseSummarizer for OpenAiClient {
    async fn summarize(&self, request: SummaryRequest) -> Result<StructuredSummary> {
        let mut prompt = format!("Content type: {}\n", request.content_type);
        if let Some(title) = &request.title {
            prompt.push_str(&format!("Title: {title}\n"));
        }
        if let Some(instruction) = &request.instruction {
            prompt.push_str(&format!("Reader instruction: {instruction}\n"));
        }
        prompt.push('\n');
        prompt.push_str(truncate(&request.text, MAX_INPUT_CHARS));

        let raw = self
            .chat(
                vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(prompt)],
                true,
            )
            .await?;

        // A malformed answer is worth asking for again
        serde_json::from_str::<StructuredSummary>(&raw).map_err(|e| {
            TaskError::transient(format!("summary was not the expected JSON: {e}")).into()
        })
    }
}

#[async_trait]
impl BaseChatService for OpenAiClient {
    async fn answer(&self, context: &str, question: &str) -> Result<String> {
        let prompt = format!(
            "Material:\n{}\n\nQuestion: {question}",
            truncate(context, MAX_INPUT_CHARS)
        );
        self.chat(vec![Message::system(CHAT_SYSTEM_PROMPT), Message::user(prompt)], false)
            .await
    }
}

#[async_trait]
impl BaseTranscriber for OpenAiClient {
    async fn transcribe(&self, audio_url: &str) -> Result<String> {
        let audio = self
            .http_client
            .get(audio_url)
            .send()
            .await
            .with_context(|| format!("audio download failed: {audio_url}"))?;
        let audio = check_status(audio, "audio download").await?;
        let bytes = audio.bytes().await.context("audio download interrupted")?;

        debug!(audio_url, bytes = bytes.len(), "uploading audio for transcription");

        let file_name = audio_url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("audio.mp3")
            .to_string();
        let form = reqwest::multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name),
            );

        let response = self
            .http_client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?;

        let response = check_status(response, "transcription").await?;
        let body: TranscriptionResponse = response
            .json()
            .await
            .context("transcription response was not JSON")?;
        Ok(body.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn test_rejected_request_is_terminal_whatever_the_body() {
        // A 400 whose body happens to mention 429 and timeouts
        let err = anyhow::Error::from(TaskError::from_status("chat completion", 400))
            .context("summarize failed: resulted in 130429 tokens, request timeout");
        assert!(!crate::kernel::jobs::classify(&err));
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "m",
            messages: vec![Message::system("s"), Message::user("u")],
            response_format: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][1]["role"], "user");
        assert!(value.get("response_format").is_none());
    }
}
