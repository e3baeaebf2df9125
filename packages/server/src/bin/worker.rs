//! Task Worker
//!
//! Runs one sequential processor per configured slot on each queue until
//! Ctrl-C. In-flight tasks finish before the process exits.

use std::sync::Arc;

use anyhow::{Context, Result};
use extraction::{Fetcher, HttpFetcher, RateLimitedFetcher, StrategyRegistry, ValidatedFetcher};
use server_core::domains::ingestion::build_registry;
use server_core::kernel::jobs::{QueueName, QueueService, SequentialProcessor};
use server_core::kernel::{OpenAiClient, OpenGraphThumbnails, PostgresStore, ServerDeps, SystemClock};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting ingestion worker");

    let config = Config::from_env()?;
    let total_slots: usize = QueueName::ALL.iter().map(|q| config.slots_for(*q)).sum();

    // Database setup
    let pool = PgPoolOptions::new()
        .max_connections(total_slots as u32 + 2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PostgresStore::new(pool));
    store.migrate().await?;

    // Extraction with SSRF protection and a shared request budget
    let http = HttpFetcher::new(config.http_timeout).context("Failed to create HTTP fetcher")?;
    let limited = RateLimitedFetcher::new(http, config.fetch_requests_per_second);
    let fetcher: Arc<dyn Fetcher> = Arc::new(ValidatedFetcher::new(limited));
    let extraction = Arc::new(StrategyRegistry::new(fetcher.clone()));

    // LLM + transcription
    let api_key = config
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY must be set")?;
    let mut openai = OpenAiClient::new(api_key, config.http_timeout)?;
    if let Some(url) = &config.openai_base_url {
        openai = openai.with_base_url(url);
    }
    if let Some(model) = &config.openai_model {
        openai = openai.with_chat_model(model);
    }
    if let Some(model) = &config.transcription_model {
        openai = openai.with_transcription_model(model);
    }
    let openai = Arc::new(openai);

    let clock = Arc::new(SystemClock);
    let queue = QueueService::new(store.clone(), store.clone(), clock.clone())
        .with_retry_policy(config.retry_policy())
        .with_default_max_retries(config.max_retries);

    let deps = Arc::new(
        ServerDeps::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            queue,
            extraction,
            openai.clone(),
            openai.clone(),
            Arc::new(OpenGraphThumbnails::new(fetcher)),
            openai,
            clock,
        )
        .with_max_crawl_links(config.max_crawl_links),
    );
    let registry = Arc::new(build_registry());

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal, finishing in-flight tasks");
            shutdown.cancel();
        });
    }

    let mut handles = Vec::with_capacity(total_slots);
    for queue in QueueName::ALL {
        let slots = config.slots_for(queue);
        for _ in 0..slots {
            let processor =
                SequentialProcessor::new(deps.clone(), registry.clone(), config.processor_config(queue));
            handles.push(processor.spawn(shutdown.clone()));
        }
        tracing::info!(queue = %queue, slots, "processors started");
    }

    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "processor exited with error"),
            Err(e) => tracing::error!(error = %e, "processor task panicked"),
        }
    }

    tracing::info!("Ingestion worker stopped");
    Ok(())
}
