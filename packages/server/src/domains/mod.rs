// Business domains
pub mod contents;
pub mod ingestion;
