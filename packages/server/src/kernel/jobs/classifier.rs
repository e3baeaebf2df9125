//! Retry classification.
//!
//! One function decides, for every handler, whether an error is worth
//! another attempt. Handlers only report errors; they never pick a policy.

use extraction::{CrawlError, ExtractionError};

use super::error::TaskError;

/// Phrases that mark an otherwise untyped error as transient.
///
/// Bare status codes are not matched: they turn up in token counts and ids
/// inside provider error bodies.
const TRANSIENT_PATTERNS: &[&str] = &[
    "timed out",
    "rate limit",
    "too many requests",
    "internal server error",
    "bad gateway",
    "gateway timeout",
    "service unavailable",
    "temporarily unavailable",
    "overloaded",
    "connection reset",
    "connection refused",
    "broken pipe",
    "resource exhausted",
];

/// `true` if `error` is transient and the task may be retried.
pub fn classify(error: &anyhow::Error) -> bool {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<TaskError>() {
            return e.is_retryable();
        }
        if let Some(e) = cause.downcast_ref::<ExtractionError>() {
            return e.is_transient();
        }
        if let Some(e) = cause.downcast_ref::<CrawlError>() {
            return e.is_transient();
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return classify_reqwest(e);
        }
        if let Some(e) = cause.downcast_ref::<sqlx::Error>() {
            return classify_sqlx(e);
        }
        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            return classify_io(e);
        }
        if cause.is::<serde_json::Error>() {
            return false;
        }
    }

    let message = format!("{error:#}").to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| message.contains(p))
}

fn classify_reqwest(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        return true;
    }
    e.status()
        .is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
}

fn classify_sqlx(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

fn classify_io(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        TimedOut | ConnectionReset | ConnectionAborted | ConnectionRefused | BrokenPipe | Interrupted
    )
}
