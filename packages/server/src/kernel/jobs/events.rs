//! Append-only audit events.
//!
//! Written for every task outcome and every watchdog cycle. Never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::AuditEventId;

#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub component: String,
    pub operation: String,
    pub status: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        component: impl Into<String>,
        operation: impl Into<String>,
        status: impl Into<String>,
        data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEventId::new(),
            component: component.into(),
            operation: operation.into(),
            status: status.into(),
            data,
            created_at,
        }
    }

    /// Integer field from `data`, e.g. `touched_count`.
    pub fn count(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(serde_json::Value::as_i64)
    }
}
