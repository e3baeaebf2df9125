//! Store implementations: Postgres for deployments, memory for tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
