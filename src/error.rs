//! Typed error hierarchy for peerfetch
//!
//! Every error type includes context about what went wrong and whether
//! a hard retry of the job is likely to help.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the fetch engine
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Search or transfer failure reported by the network provider
    #[error("Provider error: {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
        retryable: bool,
    },

    /// Storage/filesystem errors
    #[error("Storage error at {path:?}: {message}")]
    Storage {
        kind: StorageErrorKind,
        path: PathBuf,
        message: String,
    },

    /// Transferred byte count disagrees with the size the peer declared
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Ranking produced nothing usable for the wanted track
    #[error("No candidates found for '{query}'")]
    NoCandidates { query: String },

    /// Operation was aborted through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid input from user
    #[error("Invalid input for '{field}': {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    /// Job not found
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Invalid state transition
    #[error("Invalid state: cannot {action} while {current_state}")]
    InvalidState {
        action: &'static str,
        current_state: String,
    },

    /// Scheduler is shutting down
    #[error("Scheduler is shutting down")]
    Shutdown,

    /// Internal error (bug)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Provider error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Search request failed
    Search,
    /// Search did not finish in time
    SearchTimeout,
    /// Transfer failed midway
    Transfer,
    /// Peer refused or dropped the upload
    PeerRejected,
    /// Network is not reachable / provider not logged in
    Unavailable,
    /// Other provider error
    Other,
}

/// Storage error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// File/directory not found
    NotFound,
    /// Permission denied
    PermissionDenied,
    /// File already exists
    AlreadyExists,
    /// Invalid path
    InvalidPath,
    /// I/O error
    Io,
}

impl EngineError {
    /// Check if a hard retry of the job is likely to succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Storage { kind, .. } => matches!(kind, StorageErrorKind::Io),
            Self::SizeMismatch { .. } | Self::NoCandidates { .. } => true,
            _ => false,
        }
    }

    /// Create a provider error. Provider failures are always recoverable
    /// through a retry.
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a storage error
    pub fn storage(
        kind: StorageErrorKind,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Short machine-readable category, used in status snapshots
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Provider { .. } => "provider",
            Self::Storage { .. } => "storage",
            Self::SizeMismatch { .. } => "size_mismatch",
            Self::NoCandidates { .. } => "no_candidates",
            Self::Cancelled => "cancelled",
            Self::InvalidInput { .. } => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::Shutdown => "shutdown",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::NotFound => StorageErrorKind::NotFound,
            ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists => StorageErrorKind::AlreadyExists,
            _ => StorageErrorKind::Io,
        };
        Self::Storage {
            kind,
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<walkdir::Error> for EngineError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from).unwrap_or_default();
        let kind = match err.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::NotFound) => StorageErrorKind::NotFound,
            Some(std::io::ErrorKind::PermissionDenied) => StorageErrorKind::PermissionDenied,
            _ => StorageErrorKind::Io,
        };
        Self::Storage {
            kind,
            path,
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Internal(format!("Task failed: {}", err))
        }
    }
}

// Conversion from EngineError to ProtocolError for the public API boundary
impl From<EngineError> for crate::protocol::ProtocolError {
    fn from(e: EngineError) -> Self {
        use crate::protocol::ProtocolError;
        match e {
            EngineError::NotFound(id) => ProtocolError::NotFound { id },
            EngineError::InvalidState {
                action,
                current_state,
            } => ProtocolError::InvalidState {
                action: action.to_string(),
                current_state,
            },
            EngineError::InvalidInput { field, message } => ProtocolError::InvalidInput {
                field: field.to_string(),
                message,
            },
            EngineError::Provider {
                message, retryable, ..
            } => ProtocolError::Provider { message, retryable },
            EngineError::Storage { path, message, .. } => ProtocolError::Storage {
                path: path.display().to_string(),
                message,
            },
            EngineError::SizeMismatch { expected, actual } => {
                ProtocolError::SizeMismatch { expected, actual }
            }
            EngineError::NoCandidates { query } => ProtocolError::NoCandidates { query },
            EngineError::Cancelled => ProtocolError::Cancelled,
            EngineError::Shutdown => ProtocolError::Shutdown,
            EngineError::Internal(msg) => ProtocolError::Internal { message: msg },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolError;

    #[test]
    fn provider_errors_are_retryable() {
        let err = EngineError::provider(ProviderErrorKind::Transfer, "peer went away");
        assert!(err.is_retryable());
        assert_eq!(err.kind_name(), "provider");
    }

    #[test]
    fn cancellation_is_not_retryable() {
        assert!(!EngineError::Cancelled.is_retryable());
        assert!(!EngineError::Shutdown.is_retryable());
    }

    #[test]
    fn io_error_maps_to_storage_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        match EngineError::from(io) {
            EngineError::Storage { kind, .. } => assert_eq!(kind, StorageErrorKind::PermissionDenied),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn size_mismatch_message_names_both_sizes() {
        let err = EngineError::SizeMismatch {
            expected: 100,
            actual: 42,
        };
        assert_eq!(err.to_string(), "Size mismatch: expected 100 bytes, got 42");
        let proto: ProtocolError = err.into();
        assert_eq!(
            proto,
            ProtocolError::SizeMismatch {
                expected: 100,
                actual: 42
            }
        );
        assert!(proto.is_retryable());
    }
}
