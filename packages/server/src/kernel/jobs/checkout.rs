//! Per-content exclusivity leases.
//!
//! A checkout binds one content id to one worker until it expires. Nothing
//! renews a lease; once it lapses the next `acquire` takes over and the
//! watchdog purges the leftover row.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::debug;

use crate::common::ContentId;
use crate::kernel::clock::Clock;
use crate::kernel::store::CheckoutStore;

#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub content_id: ContentId,
    pub worker_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Checkout {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of [`CheckoutManager::acquire`]. A conflict is an expected outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    Acquired(Checkout),
    Conflict,
}

impl CheckoutOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, CheckoutOutcome::Acquired(_))
    }
}

pub struct CheckoutManager {
    store: Arc<dyn CheckoutStore>,
    clock: Arc<dyn Clock>,
}

impl CheckoutManager {
    pub fn new(store: Arc<dyn CheckoutStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn acquire(&self, content_id: ContentId, worker_id: &str, ttl: Duration) -> Result<CheckoutOutcome> {
        let now = self.clock.now();
        let expires_at = now + chrono::Duration::from_std(ttl)?;

        match self.store.try_checkout(content_id, worker_id, now, expires_at).await? {
            Some(checkout) => {
                debug!(content_id = %content_id, worker_id, expires_at = %expires_at, "checkout acquired");
                Ok(CheckoutOutcome::Acquired(checkout))
            }
            None => {
                debug!(content_id = %content_id, worker_id, "checkout conflict");
                Ok(CheckoutOutcome::Conflict)
            }
        }
    }

    /// Returns `false` if the lease had already lapsed or changed hands.
    pub async fn release(&self, content_id: ContentId, worker_id: &str) -> Result<bool> {
        let released = self.store.release_checkout(content_id, worker_id).await?;
        debug!(content_id = %content_id, worker_id, released, "checkout released");
        Ok(released)
    }

    pub async fn holder(&self, content_id: ContentId) -> Result<Option<Checkout>> {
        let now = self.clock.now();
        Ok(self
            .store
            .find_checkout(content_id)
            .await?
            .filter(|c| !c.is_expired(now)))
    }
}
