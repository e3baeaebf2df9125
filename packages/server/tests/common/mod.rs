// Common test utilities

#![allow(dead_code)]

pub mod harness;
pub mod pipeline;

pub use harness::*;
pub use pipeline::*;
