//! Error types for the Docent answering pipeline.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application: configuration, I/O, upstream provider calls, stage
//! timeouts, retrieval, web augmentation, and caching.

use thiserror::Error;

/// Unified error type for the Docent pipeline.
///
/// All functions in the application return `Result<T, AppError>`.
/// We never panic — errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Upstream generative-AI provider errors.
    ///
    /// `status` carries the HTTP status when known; it drives retry
    /// classification.
    #[error("Provider error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// A stage exceeded its timeout budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Document retrieval errors (store lifecycle, imports, citations)
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Web augmentation errors
    #[error("Web search error: {0}")]
    Web(String),

    /// Cache and registry errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build a provider error with an optional HTTP status.
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::Provider {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of a provider error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Provider { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether this error is worth retrying.
    ///
    /// Timeouts are always transient. Provider errors are transient when the
    /// status matches one of `retryable_status`, or when the message carries
    /// a known rate-limit/timeout signature and no status is available.
    pub fn is_transient(&self, retryable_status: &[u16]) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::Provider { status, message } => match status {
                Some(code) => retryable_status.contains(code),
                None => {
                    let lower = message.to_lowercase();
                    lower.contains("rate limit")
                        || lower.contains("timeout")
                        || lower.contains("temporarily")
                        || lower.contains("429")
                        || lower.contains("503")
                }
            },
            _ => false,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        let err = AppError::Timeout("document retrieval".to_string());
        assert!(err.is_transient(&[503]));
        assert!(err.is_transient(&[]));
    }

    #[test]
    fn test_provider_status_classification() {
        let retryable = [500, 503, 429];
        assert!(AppError::provider(Some(503), "overloaded").is_transient(&retryable));
        assert!(AppError::provider(Some(429), "slow down").is_transient(&retryable));
        assert!(!AppError::provider(Some(400), "bad request").is_transient(&retryable));
        assert!(!AppError::provider(Some(401), "unauthorized").is_transient(&retryable));
    }

    #[test]
    fn test_provider_message_signatures() {
        let retryable = [503];
        assert!(AppError::provider(None, "Rate limit exceeded").is_transient(&retryable));
        assert!(AppError::provider(None, "request timeout").is_transient(&retryable));
        assert!(
            AppError::provider(None, "service temporarily unavailable").is_transient(&retryable)
        );
        assert!(!AppError::provider(None, "invalid argument").is_transient(&retryable));
    }

    #[test]
    fn test_non_provider_errors_not_transient() {
        assert!(!AppError::Config("bad".to_string()).is_transient(&[503]));
        assert!(!AppError::Retrieval("no stores".to_string()).is_transient(&[503]));
    }
}
