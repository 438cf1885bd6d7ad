//! Job events
//!
//! Events emitted by the scheduler. Delivery is fire-and-forget: the
//! scheduler never waits on a listener.

use super::types::{JobId, JobState};
use serde::{Deserialize, Serialize};

/// Events emitted by the download scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was enqueued
    Added { id: JobId },
    /// Lifecycle state changed
    StateChanged {
        id: JobId,
        old_state: JobState,
        new_state: JobState,
        /// Set only when entering `Failed`
        error: Option<String>,
    },
    /// Ranking picked a candidate for the job
    CandidateSelected {
        id: JobId,
        filename: String,
        peer: String,
        score: f64,
    },
    /// Transfer progress; `fraction` never decreases within an attempt
    Progress {
        id: JobId,
        fraction: f64,
        bytes_transferred: u64,
        speed: u64,
    },
    /// An attempt ended. Emitted exactly once per attempt, whatever the
    /// outcome (completed, failed, cancelled or paused).
    Finished { id: JobId, state: JobState },
    /// Job was removed from the active set
    Removed { id: JobId },
}

impl JobEvent {
    /// The job this event is about
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Added { id }
            | Self::StateChanged { id, .. }
            | Self::CandidateSelected { id, .. }
            | Self::Progress { id, .. }
            | Self::Finished { id, .. }
            | Self::Removed { id } => *id,
        }
    }
}
