//! Typed errors raised by the queue, stores and task handlers.
//!
//! Handlers return `anyhow::Result`; these variants ride inside the `anyhow`
//! chain so the retry classifier can downcast them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    /// Malformed payload or content. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Timeout, rate limit, 5xx or connection reset from a collaborator.
    #[error("transient external failure: {0}")]
    TransientExternal(String),

    /// A collaborator refused the request (4xx other than 429). Never retried.
    #[error("{service} rejected request with {status}")]
    Rejected { service: String, status: u16 },

    #[error("no extraction strategy claims {url}")]
    StrategyNotFound { url: String },

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("content status cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("metadata variant {found} does not match content type {expected}")]
    MetadataMismatch { expected: String, found: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The row changed underneath a conditional write.
    #[error("{entity} {id} was modified concurrently")]
    StaleWrite { entity: &'static str, id: String },
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientExternal(message.into())
    }

    /// Classify a non-success HTTP status from a collaborator.
    pub fn from_status(service: impl Into<String>, status: u16) -> Self {
        let service = service.into();
        if status == 429 || status >= 500 {
            Self::TransientExternal(format!("{service} returned {status}"))
        } else {
            Self::Rejected { service, status }
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientExternal(_) | Self::StaleWrite { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_kinds_retry() {
        assert!(TaskError::transient("timed out").is_retryable());
        assert!(TaskError::StaleWrite {
            entity: "content",
            id: "x".into()
        }
        .is_retryable());

        assert!(!TaskError::validation("missing content_id").is_retryable());
        assert!(!TaskError::UnknownQueue("mail".into()).is_retryable());
        assert!(!TaskError::not_found("content", "abc").is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert!(TaskError::from_status("chat completion", 429).is_retryable());
        assert!(TaskError::from_status("chat completion", 503).is_retryable());
        assert!(matches!(
            TaskError::from_status("chat completion", 400),
            TaskError::Rejected { status: 400, .. }
        ));
        assert!(!TaskError::from_status("transcription", 401).is_retryable());
    }

    #[test]
    fn test_messages_name_the_subject() {
        let err = TaskError::StrategyNotFound {
            url: "https://example.com/a.zip".into(),
        };
        assert!(err.to_string().contains("https://example.com/a.zip"));
    }
}
