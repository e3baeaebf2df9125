// Content Ingestion Pipeline - Server Core
//
// Durable task queue, content lifecycle and the processor/watchdog loops that
// drive submitted URLs through extraction, transcription and summarization.
//
// Task handlers are organized per-domain in domains/*/activities/

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
