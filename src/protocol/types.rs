//! Core protocol types
//!
//! Fundamental types used throughout the protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex digits, handy in log lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a download job.
///
/// Exactly one state holds at any instant. `Completed`, `Failed` and
/// `Cancelled` are terminal; only a hard retry leaves `Failed`/`Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for a concurrency slot
    Pending,
    /// Asking the network for candidates
    Searching,
    /// A candidate was chosen, transfer not started yet
    Queued,
    /// Bytes are flowing
    Downloading,
    /// Paused by user, resumable
    Paused,
    /// Transfer finished and verified
    Completed,
    /// Unrecoverable error for this attempt
    Failed,
    /// Cancelled by user
    Cancelled,
}

impl JobState {
    /// Terminal states end an attempt for good (until a hard retry)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States that hold a concurrency slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Searching | Self::Queued | Self::Downloading)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, Self::Searching | Self::Queued | Self::Downloading)
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Paused)
    }

    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_hard_retry(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Searching => "searching",
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress information for a transfer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Total size in bytes (may be unknown)
    pub total_size: Option<u64>,
    /// Bytes written so far
    pub bytes_transferred: u64,
    /// Current transfer speed in bytes/sec
    pub speed: u64,
    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,
}

impl TransferProgress {
    /// Fraction complete in [0, 1]; 0 while the size is unknown
    pub fn fraction(&self) -> f64 {
        match self.total_size {
            Some(total) if total > 0 => (self.bytes_transferred as f64 / total as f64).min(1.0),
            _ => 0.0,
        }
    }
}
