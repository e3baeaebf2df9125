//! Task infrastructure: queue, checkout, dispatch, processing and reconciliation.
//!
//! # Architecture
//!
//! ```text
//! Producer creates Content, calls QueueService.enqueue
//!     │
//!     └─► TaskStore insert (status = pending)
//!
//! SequentialProcessor (one per queue slot)
//!     │
//!     ├─► QueueService.dequeue (bucket rotation, atomic claim)
//!     ├─► CheckoutManager.acquire(content_id)
//!     ├─► HandlerRegistry.execute → domain handler
//!     └─► complete_task / classify + fail_task, release checkout
//!
//! Watchdog (independent cadence)
//!     └─► requeue stale leases, reroute, purge checkouts, audit, alert
//! ```
//!
//! Handlers live in `domains::ingestion`. This module only provides the
//! infrastructure.

pub mod checkout;
pub mod classifier;
mod error;
pub mod events;
pub mod payload;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod retry;
mod task;
pub mod watchdog;

pub use checkout::{Checkout, CheckoutManager, CheckoutOutcome};
pub use classifier::classify;
pub use error::TaskError;
pub use events::AuditEvent;
pub use processor::{PollBackoff, PollOutcome, ProcessorConfig, SequentialProcessor, TaskOutcome};
pub use queue::{FailOutcome, QueueService};
pub use registry::{FollowUp, HandlerOutcome, HandlerRegistry, TaskContext};
pub use retry::RetryPolicy;
pub use task::{QueueName, Task, TaskStatus, TaskType, DEFAULT_MAX_RETRIES};
pub use watchdog::{ReconcileReport, Watchdog, WatchdogConfig};
