//! Protocol types for peerfetch
//!
//! This module contains all types that cross the scheduler boundary:
//! - Track queries and candidates coming from the network
//! - Events emitted by the scheduler
//! - Job state, progress and aggregate status
//! - Options for enqueueing jobs
//! - Protocol-level errors
//!
//! These types are designed for serialization and can be used for IPC,
//! RPC, or any message-passing interface.

mod candidate;
mod error;
mod events;
mod options;
mod status;
mod types;

// Re-export all protocol types
pub use candidate::{Candidate, TrackQuery, LOSSLESS_FORMATS};
pub use error::{ProtocolError, ProtocolResult};
pub use events::JobEvent;
pub use options::{EnqueueOptions, JobPriority};
pub use status::SchedulerStats;
pub use types::{JobId, JobState, TransferProgress};
