//! Typed ID definitions for the ingestion entities.

pub use super::id::Id;

/// Marker type for Content rows.
pub struct Content;

/// Marker type for queued Tasks.
pub struct Task;

/// Marker type for audit log entries.
pub struct AuditEvent;

/// Typed ID for Content rows.
pub type ContentId = Id<Content>;

/// Typed ID for Tasks.
pub type TaskId = Id<Task>;

/// Typed ID for AuditEvents.
pub type AuditEventId = Id<AuditEvent>;
