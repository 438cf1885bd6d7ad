//! Download job state machine
//!
//! A [`DownloadJob`] is the mutable record of one wanted track. Every
//! transition method checks its guard first and returns `None` without
//! touching the job when the guard fails, so callers can apply user actions
//! and scheduler steps in any order without corrupting the lifecycle.
//!
//! ```text
//!  Pending ──► Searching ──► Queued ──► Downloading ──► Completed
//!     ▲            │            │            │
//!     │            └────────────┴────────────┴──► Paused ──(resume)──┐
//!     │                                                              │
//!     └──────────────────────────────────────────────────────────────┘
//!  any non-terminal ──► Failed | Cancelled ──(hard retry)──► Pending
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result, StorageErrorKind};
use crate::protocol::{Candidate, JobId, JobPriority, JobState, TrackQuery, TransferProgress};

/// A state change that actually happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub old: JobState,
    pub new: JobState,
}

/// One wanted track and everything known about fetching it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    pub id: JobId,
    pub track: TrackQuery,
    /// The candidate picked by ranking, once there is one
    pub candidate: Option<Candidate>,
    pub state: JobState,
    pub priority: JobPriority,
    /// Fraction in [0, 1], non-decreasing within an attempt
    pub progress: f64,
    pub bytes_transferred: u64,
    pub total_size: Option<u64>,
    /// Current transfer speed in bytes/sec
    pub speed: u64,
    /// Number of hard retries so far
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Directory the file is saved into
    pub save_dir: PathBuf,
    /// Output file name override
    pub filename: Option<String>,
    /// Final path of the file on disk, set on completion
    pub destination: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DownloadJob {
    pub fn new(track: TrackQuery, priority: JobPriority, save_dir: PathBuf) -> Self {
        Self {
            id: JobId::new(),
            track,
            candidate: None,
            state: JobState::Pending,
            priority,
            progress: 0.0,
            bytes_transferred: 0,
            total_size: None,
            speed: 0,
            retry_count: 0,
            last_attempt_at: None,
            error_message: None,
            save_dir,
            filename: None,
            destination: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }

    /// Where the transfer should write, given the chosen candidate.
    ///
    /// Fails when the name would not stay inside `save_dir`.
    pub fn target_path(&self) -> Result<PathBuf> {
        let name = match (&self.filename, &self.candidate) {
            (Some(name), _) => name.as_str(),
            (None, Some(candidate)) => candidate.file_name(),
            (None, None) => {
                return Err(EngineError::Internal(
                    "no destination for a job without a candidate".into(),
                ))
            }
        };
        if !is_plain_file_name(name) {
            return Err(EngineError::storage(
                StorageErrorKind::InvalidPath,
                &self.save_dir,
                format!("refusing to write '{}' outside the save directory", name),
            ));
        }
        Ok(self.save_dir.join(name))
    }

    pub fn transfer_progress(&self) -> TransferProgress {
        let eta_seconds = match (self.total_size, self.speed) {
            (Some(total), speed) if speed > 0 => {
                Some(total.saturating_sub(self.bytes_transferred) / speed)
            }
            _ => None,
        };
        TransferProgress {
            total_size: self.total_size,
            bytes_transferred: self.bytes_transferred,
            speed: self.speed,
            eta_seconds,
        }
    }

    // Scheduler-driven transitions

    /// Pending -> Searching
    pub fn begin_search(&mut self) -> Option<StateChange> {
        if self.state != JobState::Pending {
            return None;
        }
        self.last_attempt_at = Some(Utc::now());
        self.error_message = None;
        self.set_state(JobState::Searching)
    }

    /// Searching -> Queued, remembering the chosen candidate
    pub fn select_candidate(&mut self, candidate: Candidate) -> Option<StateChange> {
        if self.state != JobState::Searching {
            return None;
        }
        self.total_size = candidate.size;
        self.candidate = Some(candidate);
        self.set_state(JobState::Queued)
    }

    /// Queued -> Downloading
    pub fn start_transfer(&mut self) -> Option<StateChange> {
        if self.state != JobState::Queued {
            return None;
        }
        self.started_at = Some(Utc::now());
        self.set_state(JobState::Downloading)
    }

    /// Record transfer progress. Ignored outside `Downloading`; a smaller
    /// byte count than already recorded never moves progress backwards.
    ///
    /// Returns true when the visible progress changed.
    pub fn record_progress(&mut self, bytes: u64, total: Option<u64>, speed: u64) -> bool {
        if self.state != JobState::Downloading {
            return false;
        }
        if let Some(total) = total.filter(|t| *t > 0) {
            self.total_size = Some(total);
        }
        self.speed = speed;
        if bytes <= self.bytes_transferred {
            return false;
        }
        self.bytes_transferred = bytes;
        let fraction = match self.total_size {
            Some(total) if total > 0 => (bytes as f64 / total as f64).min(1.0),
            _ => self.progress,
        };
        self.progress = self.progress.max(fraction);
        true
    }

    /// Downloading -> Completed
    pub fn complete(&mut self, destination: PathBuf) -> Option<StateChange> {
        if self.state != JobState::Downloading {
            return None;
        }
        self.progress = 1.0;
        self.speed = 0;
        if let Some(total) = self.total_size {
            self.bytes_transferred = self.bytes_transferred.max(total);
        }
        self.destination = Some(destination);
        self.completed_at = Some(Utc::now());
        self.set_state(JobState::Completed)
    }

    /// Any non-terminal state -> Failed
    pub fn fail(&mut self, message: impl Into<String>) -> Option<StateChange> {
        if self.state.is_terminal() {
            return None;
        }
        self.error_message = Some(message.into());
        self.set_state(JobState::Failed)
    }

    // User-driven transitions

    /// Searching/Queued/Downloading -> Paused
    pub fn pause(&mut self) -> Option<StateChange> {
        if !self.state.can_pause() {
            return None;
        }
        self.set_state(JobState::Paused)
    }

    /// Paused -> Pending, ready to compete for a slot again
    pub fn resume(&mut self) -> Option<StateChange> {
        if !self.state.can_resume() {
            return None;
        }
        self.set_state(JobState::Pending)
    }

    /// Any non-terminal state -> Cancelled
    pub fn cancel(&mut self) -> Option<StateChange> {
        if !self.state.can_cancel() {
            return None;
        }
        self.set_state(JobState::Cancelled)
    }

    /// Failed/Cancelled -> Pending, starting a fresh attempt
    pub fn hard_retry(&mut self) -> Option<StateChange> {
        if !self.state.can_hard_retry() {
            return None;
        }
        self.retry_count += 1;
        self.error_message = None;
        self.candidate = None;
        self.total_size = None;
        self.destination = None;
        self.started_at = None;
        self.completed_at = None;
        self.set_state(JobState::Pending)
    }

    fn set_state(&mut self, new: JobState) -> Option<StateChange> {
        let old = self.state;
        if old == JobState::Downloading && new != JobState::Completed {
            self.progress = 0.0;
            self.bytes_transferred = 0;
            self.speed = 0;
        }
        if new == JobState::Pending {
            self.progress = 0.0;
            self.bytes_transferred = 0;
            self.speed = 0;
        }
        self.state = new;
        Some(StateChange { old, new })
    }
}

/// A single path component: not empty, not `.` or `..`, no separators
pub fn is_plain_file_name(name: &str) -> bool {
    !matches!(name.trim(), "" | "." | "..") && !name.contains(['/', '\\'])
}
