//! # peerfetch
//!
//! The core of a peer-to-peer music fetcher: decide which offered file best
//! matches a wanted track, download a bounded number of tracks at once, and
//! find files on disk whose names only roughly match what was asked for.
//!
//! ## Features
//!
//! - **Candidate ranking**: seven weighted factors (availability, peer
//!   conditions, quality, tempo/key, metadata, name similarity, size
//!   tiebreak) with `balanced`, `quality_first` and `dj_mode` presets
//! - **Download scheduling**: priority admission into N slots, a guarded
//!   job lifecycle, pause/resume/cancel/hard retry, monotonic progress
//! - **Search coalescing**: concurrent jobs for the same track share one
//!   network search
//! - **Filename resolution**: noise-stripping normalization and
//!   edit-distance matching against a local library
//!
//! Network I/O stays behind [`SearchProvider`]; persistence behind
//! [`LibraryStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use peerfetch::{DownloadScheduler, EngineConfig, EnqueueOptions, SearchProvider, TrackQuery};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(provider: Arc<dyn SearchProvider>) -> peerfetch::Result<()> {
//!     let scheduler = DownloadScheduler::new(EngineConfig::default(), provider)?;
//!     let mut events = scheduler.subscribe();
//!
//!     scheduler.enqueue(
//!         TrackQuery::new("Daft Punk", "One More Time"),
//!         EnqueueOptions::default(),
//!     )?;
//!     scheduler.start(CancellationToken::new())?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

// Modules
pub mod admission;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod job;
pub mod matcher;
pub mod normalize;
pub mod progress;
pub mod protocol;
pub mod provider;
pub mod ranking;
pub mod resolver;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-exports for convenience
pub use config::{EngineConfig, LibraryConfig, SearchConfig};
pub use error::{EngineError, ProviderErrorKind, Result, StorageErrorKind};
pub use protocol::{ProtocolError, ProtocolResult};
pub use types::{
    Candidate, EnqueueOptions, JobEvent, JobId, JobPriority, JobState, SchedulerStats,
    TrackQuery, TransferProgress,
};

// Scheduler exports
pub use job::DownloadJob;
pub use scheduler::DownloadScheduler;

// Ranking exports
pub use ranking::{rank, RankingStrategy, Ranker, ScoreBreakdown, ScoredCandidate, ScoringWeights};

// Matching exports
pub use matcher::best_match;
pub use normalize::normalize;
pub use resolver::{LibraryResolver, ResolvedFile};

// Collaborator exports
pub use provider::{CandidateStream, ProgressCallback, SearchFilters, SearchProvider};
pub use storage::{LibraryEntry, LibraryStatus, LibraryStore, MemoryStorage};

// Admission exports
pub use admission::{AdmissionQueue, AdmissionStats, SlotPermit};
