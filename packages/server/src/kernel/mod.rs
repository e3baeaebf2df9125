//! Kernel module - server infrastructure and dependencies.

pub mod alerts;
pub mod clock;
pub mod deps;
pub mod jobs;
pub mod openai;
pub mod store;
pub mod stores;
pub mod test_dependencies;
pub mod thumbnails;
pub mod traits;

pub use alerts::{Alert, LogAlertSink, WebhookAlertSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use deps::ServerDeps;
pub use openai::OpenAiClient;
pub use stores::{MemoryStore, PostgresStore};
pub use test_dependencies::TestDependencies;
pub use thumbnails::OpenGraphThumbnails;
pub use traits::*;
