use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use crate::kernel::jobs::{ProcessorConfig, QueueName, RetryPolicy, DEFAULT_MAX_RETRIES};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // Processor slots per queue
    pub content_slots: usize,
    pub transcribe_slots: usize,
    pub chat_slots: usize,

    pub lease_ttl: Duration,
    pub min_poll_interval: Duration,
    pub max_poll_interval: Duration,
    pub http_timeout: Duration,
    /// Process-wide ceiling on outbound extraction fetches
    pub fetch_requests_per_second: NonZeroU32,

    pub max_retries: i32,
    pub retry_base: Duration,
    pub retry_max_delay: Duration,
    pub max_crawl_links: usize,

    pub alert_webhook_url: Option<String>,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub transcription_model: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            content_slots: parse_or(&var, "WORKER_CONTENT_SLOTS", 2)?,
            transcribe_slots: parse_or(&var, "WORKER_TRANSCRIBE_SLOTS", 1)?,
            chat_slots: parse_or(&var, "WORKER_CHAT_SLOTS", 1)?,
            lease_ttl: Duration::from_secs(parse_or(&var, "LEASE_TTL_SECS", 30 * 60)?),
            min_poll_interval: Duration::from_millis(parse_or(&var, "POLL_MIN_MS", 100)?),
            max_poll_interval: Duration::from_secs(parse_or(&var, "POLL_MAX_SECS", 30)?),
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 30)?),
            fetch_requests_per_second: parse_or(
                &var,
                "FETCH_REQUESTS_PER_SECOND",
                NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
            )?,
            max_retries: parse_or(&var, "MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_base: Duration::from_secs(parse_or(&var, "RETRY_BASE_SECS", 30)?),
            retry_max_delay: Duration::from_secs(parse_or(&var, "RETRY_MAX_SECS", 3600)?),
            max_crawl_links: parse_or(&var, "MAX_CRAWL_LINKS", 10)?,
            alert_webhook_url: var("ALERT_WEBHOOK_URL"),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL"),
            openai_model: var("OPENAI_MODEL"),
            transcription_model: var("TRANSCRIPTION_MODEL"),
        })
    }

    pub fn slots_for(&self, queue: QueueName) -> usize {
        match queue {
            QueueName::Content => self.content_slots,
            QueueName::Transcribe => self.transcribe_slots,
            QueueName::Chat => self.chat_slots,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_base, self.retry_max_delay)
    }

    pub fn processor_config(&self, queue: QueueName) -> ProcessorConfig {
        let mut config = ProcessorConfig::for_queue(queue);
        config.lease_ttl = self.lease_ttl;
        config.min_poll_interval = self.min_poll_interval;
        config.max_poll_interval = self.max_poll_interval;
        config
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/ingest")]).unwrap();

        assert_eq!(config.slots_for(QueueName::Content), 2);
        assert_eq!(config.slots_for(QueueName::Transcribe), 1);
        assert_eq!(config.lease_ttl, Duration::from_secs(1800));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_policy().base, Duration::from_secs(30));
        assert!(config.alert_webhook_url.is_none());
        assert_eq!(config.fetch_requests_per_second.get(), 5);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/ingest"),
            ("WORKER_CHAT_SLOTS", "4"),
            ("LEASE_TTL_SECS", "60"),
            ("FETCH_REQUESTS_PER_SECOND", "2"),
            ("ALERT_WEBHOOK_URL", "https://hooks.example.com/x"),
            ("OPENAI_API_KEY", ""),
        ])
        .unwrap();

        assert_eq!(config.chat_slots, 4);
        assert_eq!(config.fetch_requests_per_second.get(), 2);
        assert_eq!(config.processor_config(QueueName::Chat).lease_ttl, Duration::from_secs(60));
        assert_eq!(config.alert_webhook_url.as_deref(), Some("https://hooks.example.com/x"));
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[]).is_err());
        assert!(config(&[("DATABASE_URL", "postgres://x"), ("MAX_RETRIES", "three")]).is_err());
        assert!(config(&[
            ("DATABASE_URL", "postgres://x"),
            ("FETCH_REQUESTS_PER_SECOND", "0")
        ])
        .is_err());
    }
}
