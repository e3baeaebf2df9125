//! Content items and their lifecycle.

pub mod models;

pub use models::*;
