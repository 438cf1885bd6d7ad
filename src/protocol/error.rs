//! Wire-friendly errors
//!
//! [`ProtocolError`] is what crosses a process boundary: every variant is
//! plain data, serialized with a `code` tag so non-Rust consumers can switch
//! on it. Inside the crate use [`crate::EngineError`] and convert at the
//! edge with `.into()`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ProtocolError {
    #[error("Job not found: {id}")]
    NotFound { id: String },

    #[error("Cannot {action} while {current_state}")]
    InvalidState {
        action: String,
        current_state: String,
    },

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// The network side failed; `retryable` says whether a hard retry may help
    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("No candidates found for '{query}'")]
    NoCandidates { query: String },

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Storage error at {path}: {message}")]
    Storage { path: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Scheduler is shutting down")]
    Shutdown,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProtocolError {
    /// Same string as the serialized `code` tag
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Provider { .. } => "provider",
            Self::NoCandidates { .. } => "no_candidates",
            Self::SizeMismatch { .. } => "size_mismatch",
            Self::Storage { .. } => "storage",
            Self::Cancelled => "cancelled",
            Self::Shutdown => "shutdown",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether a hard retry of the job may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::NoCandidates { .. } | Self::SizeMismatch { .. } => true,
            _ => false,
        }
    }
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_code_tag() {
        let err = ProtocolError::SizeMismatch {
            expected: 10,
            actual: 7,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "size_mismatch");
        assert_eq!(json["code"], err.code());
        let back: ProtocolError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn unit_variants_carry_only_the_code() {
        let json = serde_json::to_string(&ProtocolError::Cancelled).unwrap();
        assert_eq!(json, r#"{"code":"cancelled"}"#);
    }

    #[test]
    fn retryability() {
        assert!(ProtocolError::NoCandidates { query: "a - b".into() }.is_retryable());
        assert!(!ProtocolError::Provider {
            message: "banned".into(),
            retryable: false
        }
        .is_retryable());
        assert!(!ProtocolError::Shutdown.is_retryable());
    }
}
