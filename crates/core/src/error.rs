//! Error types for the Charmline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum, folded into [`Error`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Charmline operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The inbound request is malformed (e.g. an empty message).
    #[error("Validation error: {0}")]
    Validation(String),

    /// An unknown persona or conversation.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The scoring backend returned something that is not an integer in 1..=100.
    #[error("Invalid score: {0}")]
    InvalidScore(String),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable classification of an [`Error`], surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    InvalidScore,
    BackendUnavailable,
    BackendTimeout,
    BackendRejected,
    StoreUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::NotFound => "not_found",
            Self::InvalidScore => "invalid_score",
            Self::BackendUnavailable => "backend_unavailable",
            Self::BackendTimeout => "backend_timeout",
            Self::BackendRejected => "backend_rejected",
            Self::StoreUnavailable => "store_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidScore(_) => ErrorKind::InvalidScore,
            Self::Provider(ProviderError::Unavailable(_)) => ErrorKind::BackendUnavailable,
            Self::Provider(ProviderError::Timeout(_)) => ErrorKind::BackendTimeout,
            Self::Provider(ProviderError::Rejected { .. }) => ErrorKind::BackendRejected,
            Self::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            Self::Store(StoreError::Unavailable(_)) => ErrorKind::StoreUnavailable,
            Self::Config { .. } | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

// --- Bounded context errors ---

/// Failures of a completion backend. All of them are fatal to the current turn.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network failure, 5xx, rate limiting, or a backend that is not configured.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend timed out: {0}")]
    Timeout(String),

    /// The backend refused the request (bad credentials, content policy, 4xx).
    #[error("Backend rejected the request: {message} (status: {status_code})")]
    Rejected { status_code: u16, message: String },
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::Rejected {
            status_code: 400,
            message: "content policy".into(),
        });
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("content policy"));
    }

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            Error::Validation("empty".into()).kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            Error::InvalidScore("ninety".into()).kind(),
            ErrorKind::InvalidScore
        );
        assert_eq!(
            Error::from(ProviderError::Timeout("60s".into())).kind(),
            ErrorKind::BackendTimeout
        );
        assert_eq!(
            Error::from(StoreError::NotFound("conversation abc".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::from(StoreError::Unavailable("disk".into())).kind(),
            ErrorKind::StoreUnavailable
        );
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BackendUnavailable).unwrap();
        assert_eq!(json, "\"backend_unavailable\"");
        assert_eq!(ErrorKind::BackendUnavailable.as_str(), "backend_unavailable");
    }
}
