//! Alert sinks for watchdog threshold breaches.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use super::jobs::TaskError;
use super::traits::BaseAlertSink;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub source: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub raised_at: DateTime<Utc>,
}

/// Posts alerts as JSON to a webhook.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build alert webhook client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl BaseAlertSink for WebhookAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .context("alert webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaskError::from_status("alert webhook", status.as_u16()).into());
        }

        info!(title = %alert.title, "alert delivered");
        Ok(())
    }
}

/// Logs alerts when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl BaseAlertSink for LogAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        error!(
            source = %alert.source,
            title = %alert.title,
            data = %alert.data,
            "{}",
            alert.message
        );
        Ok(())
    }
}
