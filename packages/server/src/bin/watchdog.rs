//! Watchdog
//!
//! Requeues tasks whose lease went stale, moves misrouted tasks to the right
//! queue and purges expired checkouts. Runs in a loop or once.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use server_core::kernel::jobs::{Watchdog, WatchdogConfig};
use server_core::kernel::{BaseAlertSink, LogAlertSink, PostgresStore, SystemClock, WebhookAlertSink};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "watchdog", about = "Reconcile stale and misrouted tasks")]
struct Args {
    /// Report what would change without writing
    #[arg(long, env = "WATCHDOG_DRY_RUN")]
    dry_run: bool,

    /// Run a single cycle and exit
    #[arg(long, env = "WATCHDOG_ONCE")]
    once: bool,

    #[arg(long, env = "WATCHDOG_INTERVAL_SECS", default_value_t = 300)]
    interval_secs: u64,

    /// Hours past lease expiry before a processing task is requeued
    #[arg(long, env = "WATCHDOG_STALE_HOURS", default_value_t = 2.0)]
    stale_hours: f64,

    /// Alert when more tasks than this are touched within the alert window
    #[arg(long, env = "WATCHDOG_ALERT_THRESHOLD", default_value_t = 25)]
    alert_threshold: u64,

    #[arg(long, env = "WATCHDOG_ALERT_WINDOW_SECS", default_value_t = 3600)]
    alert_window_secs: u64,
}

impl Args {
    fn watchdog_config(&self) -> Result<WatchdogConfig> {
        if !(self.stale_hours.is_finite() && self.stale_hours > 0.0) {
            bail!("--stale-hours must be a positive number");
        }
        if self.interval_secs == 0 {
            bail!("--interval-secs must be positive");
        }

        Ok(WatchdogConfig {
            dry_run: self.dry_run,
            interval: Duration::from_secs(self.interval_secs),
            stale_threshold: Duration::from_secs_f64(self.stale_hours * 3600.0),
            alert_threshold: self.alert_threshold,
            alert_window: Duration::from_secs(self.alert_window_secs),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let args = Args::parse();
    let watchdog_config = args.watchdog_config()?;
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PostgresStore::new(pool));
    store.migrate().await?;

    let alerts: Arc<dyn BaseAlertSink> = match &config.alert_webhook_url {
        Some(url) => Arc::new(WebhookAlertSink::new(url, config.http_timeout)?),
        None => {
            tracing::warn!("ALERT_WEBHOOK_URL not set, alerts go to the log only");
            Arc::new(LogAlertSink)
        }
    };

    let watchdog = Watchdog::new(
        store.clone(),
        store.clone(),
        store,
        alerts,
        Arc::new(SystemClock),
        watchdog_config,
    );

    if args.once {
        let report = watchdog.run_once().await?;
        tracing::info!(
            requeued = report.requeued,
            rerouted = report.rerouted,
            expired_checkouts = report.expired_checkouts,
            dry_run = report.dry_run,
            "watchdog cycle finished"
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
            shutdown.cancel();
        });
    }

    watchdog.run(shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config() {
        let args = Args::parse_from(["watchdog"]);
        let config = args.watchdog_config().unwrap();

        assert!(!config.dry_run);
        assert!(!args.once);
        assert_eq!(config.stale_threshold, Duration::from_secs(2 * 3600));
        assert_eq!(config.alert_threshold, 25);
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from(["watchdog", "--dry-run", "--once", "--stale-hours", "0.5"]);
        let config = args.watchdog_config().unwrap();

        assert!(config.dry_run);
        assert!(args.once);
        assert_eq!(config.stale_threshold, Duration::from_secs(1800));
    }

    #[test]
    fn test_rejects_non_positive_stale_hours() {
        let args = Args::parse_from(["watchdog", "--stale-hours", "0"]);
        assert!(args.watchdog_config().is_err());
    }
}
