//! The ingestion pipeline: one handler per task type.

pub mod activities;

pub use activities::build_registry;
