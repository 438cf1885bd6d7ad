//! Core types for peerfetch
//!
//! Flat re-export of the protocol types. New code may import from
//! `crate::protocol` directly.

pub use crate::protocol::{
    // Search side
    Candidate,
    TrackQuery,
    // Job side
    JobId,
    JobState,
    TransferProgress,
    // Options
    EnqueueOptions,
    JobPriority,
    // Status
    SchedulerStats,
    // Events
    JobEvent,
};
