//! Watchdog: periodic reconciliation of task state.
//!
//! Each cycle requeues tasks whose lease went stale, moves pending tasks that
//! sit on the wrong queue for their type, and clears expired checkouts. Every
//! write is a predicate-guarded single-row or single-statement update, so the
//! watchdog can run beside live processors, and a second back-to-back cycle
//! touches nothing.
//!
//! Every cycle writes an audit event, including cycles that change nothing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::AuditEvent;
use crate::kernel::alerts::Alert;
use crate::kernel::clock::Clock;
use crate::kernel::store::{AuditLog, CheckoutStore, TaskStore};
use crate::kernel::{BaseAlertSink, ServerDeps};

const AUDIT_COMPONENT: &str = "watchdog";
const AUDIT_OPERATION: &str = "reconcile";

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Report what would change without writing
    pub dry_run: bool,
    pub interval: Duration,
    /// How long past lease expiry a processing task counts as stale
    pub stale_threshold: Duration,
    /// Alert when more tasks than this are touched within `alert_window`
    pub alert_threshold: u64,
    pub alert_window: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            interval: Duration::from_secs(5 * 60),
            stale_threshold: Duration::from_secs(2 * 60 * 60),
            alert_threshold: 25,
            alert_window: Duration::from_secs(60 * 60),
        }
    }
}

/// Counts from one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub requeued: u64,
    pub rerouted: u64,
    pub expired_checkouts: u64,
    pub dry_run: bool,
}

impl ReconcileReport {
    /// Tasks moved (or that would be moved) this cycle.
    pub fn touched_count(&self) -> u64 {
        self.requeued + self.rerouted
    }
}

pub struct Watchdog {
    tasks: Arc<dyn TaskStore>,
    checkouts: Arc<dyn CheckoutStore>,
    audit: Arc<dyn AuditLog>,
    alerts: Arc<dyn BaseAlertSink>,
    clock: Arc<dyn Clock>,
    config: WatchdogConfig,
    /// Touched counts per cycle inside the alert window
    window: Mutex<VecDeque<(DateTime<Utc>, u64)>>,
    last_alert: Mutex<Option<DateTime<Utc>>>,
}

impl Watchdog {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        checkouts: Arc<dyn CheckoutStore>,
        audit: Arc<dyn AuditLog>,
        alerts: Arc<dyn BaseAlertSink>,
        clock: Arc<dyn Clock>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            tasks,
            checkouts,
            audit,
            alerts,
            clock,
            config,
            window: Mutex::new(VecDeque::new()),
            last_alert: Mutex::new(None),
        }
    }

    pub fn from_deps(deps: &ServerDeps, alerts: Arc<dyn BaseAlertSink>, config: WatchdogConfig) -> Self {
        Self::new(
            deps.tasks.clone(),
            deps.checkout_store.clone(),
            deps.audit.clone(),
            alerts,
            deps.clock.clone(),
            config,
        )
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// One reconciliation cycle, always followed by an audit event.
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let now = self.clock.now();
        let result = self.reconcile(now).await;

        let (status, data) = match &result {
            Ok(report) => (
                if report.dry_run { "dry_run" } else { "ok" },
                json!({
                    "requeued": report.requeued,
                    "rerouted": report.rerouted,
                    "expired_checkouts": report.expired_checkouts,
                    "touched_count": report.touched_count(),
                    "dry_run": report.dry_run,
                }),
            ),
            Err(e) => (
                "error",
                json!({ "error": format!("{e:#}"), "dry_run": self.config.dry_run }),
            ),
        };

        let event = AuditEvent::new(AUDIT_COMPONENT, AUDIT_OPERATION, status, data, now);
        if let Err(e) = self.audit.record_event(&event).await {
            warn!(error = %e, "failed to record watchdog audit event");
        }

        if let Ok(report) = &result {
            info!(
                requeued = report.requeued,
                rerouted = report.rerouted,
                expired_checkouts = report.expired_checkouts,
                dry_run = report.dry_run,
                "watchdog cycle finished"
            );
            self.check_alert(report, now).await;
        }

        result
    }

    async fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let dry_run = self.config.dry_run;
        let mut report = ReconcileReport {
            dry_run,
            ..Default::default()
        };

        // 1. Stale leases
        let stale_before = now - chrono::Duration::from_std(self.config.stale_threshold)?;
        let stale = self.tasks.find_stale_tasks(stale_before).await?;
        for task in stale {
            if dry_run {
                report.requeued += 1;
                continue;
            }
            if self.tasks.requeue_stale_task(task.id, stale_before, now).await? {
                warn!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    worker_id = ?task.worker_id,
                    lease_expires_at = ?task.lease_expires_at,
                    "requeued stale task"
                );
                report.requeued += 1;
            }
        }

        // 2. Misrouted pending tasks
        for route in self.tasks.pending_routes().await? {
            let Some((task_type, queue)) = route.correct_queue() else {
                continue;
            };
            if dry_run {
                report.rerouted += route.count.max(0) as u64;
                continue;
            }
            let moved = self
                .tasks
                .reroute_pending(task_type, &route.queue, queue, now)
                .await?;
            if moved > 0 {
                warn!(
                    task_type = %task_type,
                    from = %route.queue,
                    to = %queue,
                    moved,
                    "rerouted misplaced tasks"
                );
            }
            report.rerouted += moved;
        }

        // 3. Expired checkouts
        report.expired_checkouts = if dry_run {
            self.checkouts.count_expired_checkouts(now).await?
        } else {
            self.checkouts.purge_expired_checkouts(now).await?
        };

        Ok(report)
    }

    /// Alert when the rolling touched count crosses the threshold.
    ///
    /// At most one alert per window.
    async fn check_alert(&self, report: &ReconcileReport, now: DateTime<Utc>) {
        let window = chrono::Duration::from_std(self.config.alert_window)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let total: u64 = {
            let mut cycles = self.window.lock().unwrap_or_else(|e| e.into_inner());
            cycles.push_back((now, report.touched_count()));
            while cycles.front().is_some_and(|(at, _)| *at <= now - window) {
                cycles.pop_front();
            }
            cycles.iter().map(|(_, touched)| touched).sum()
        };

        if total <= self.config.alert_threshold {
            return;
        }

        {
            let mut last = self.last_alert.lock().unwrap_or_else(|e| e.into_inner());
            if last.is_some_and(|at| now - at < window) {
                debug!(total, "alert suppressed, already raised this window");
                return;
            }
            *last = Some(now);
        }

        let alert = Alert {
            source: AUDIT_COMPONENT.to_string(),
            title: "Watchdog repaired an unusual number of tasks".to_string(),
            message: format!(
                "{total} tasks touched in the last {}s (threshold {})",
                self.config.alert_window.as_secs(),
                self.config.alert_threshold
            ),
            data: json!({
                "touched_in_window": total,
                "threshold": self.config.alert_threshold,
                "last_cycle": report,
            }),
            raised_at: now,
        };

        if let Err(e) = self.alerts.send_alert(&alert).await {
            error!(error = %e, "failed to send watchdog alert");
        }
    }

    /// Run cycles on the configured cadence until `shutdown` fires.
    ///
    /// A failed cycle is logged and the loop carries on.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            interval_secs = self.config.interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            dry_run = self.config.dry_run,
            "watchdog starting"
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "watchdog cycle failed");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("watchdog stopped");
        Ok(())
    }
}
