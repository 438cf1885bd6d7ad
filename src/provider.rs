//! Network provider boundary
//!
//! The scheduler treats search and transfer as opaque network I/O behind
//! [`SearchProvider`]. Implementations wrap a concrete peer-to-peer client.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{Candidate, TrackQuery};

/// Search results as they arrive from the network
pub type CandidateStream = BoxStream<'static, Result<Candidate>>;

/// Called with (bytes written so far, total size if known). May be called
/// from any task; the scheduler keeps the resulting progress monotonic.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Constraints a search result must satisfy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Accepted lower-case extensions; empty accepts any
    #[serde(default)]
    pub allowed_formats: Vec<String>,
    /// Minimum declared bitrate in kbps. Lossless files and files with no
    /// declared bitrate pass.
    #[serde(default)]
    pub min_bitrate: Option<u32>,
    /// Maximum file size in bytes
    #[serde(default)]
    pub max_size: Option<u64>,
    /// Only peers with a free upload slot
    #[serde(default)]
    pub require_free_slot: bool,
}

impl SearchFilters {
    pub fn formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_formats = formats
            .into_iter()
            .map(|f| f.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn min_bitrate(mut self, kbps: u32) -> Self {
        self.min_bitrate = Some(kbps);
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn require_free_slot(mut self, required: bool) -> Self {
        self.require_free_slot = required;
        self
    }

    /// Whether a candidate passes every filter
    pub fn accepts(&self, candidate: &Candidate) -> bool {
        if !self.allowed_formats.is_empty() {
            let Some(format) = candidate.format.as_deref() else {
                return false;
            };
            if !self.allowed_formats.iter().any(|f| f.eq_ignore_ascii_case(format)) {
                return false;
            }
        }
        if let (Some(min), Some(bitrate)) = (self.min_bitrate, candidate.bitrate) {
            if bitrate < min && !candidate.is_lossless() {
                return false;
            }
        }
        if let (Some(max), Some(size)) = (self.max_size, candidate.size) {
            if size > max {
                return false;
            }
        }
        !(self.require_free_slot && !candidate.free_upload_slot)
    }
}

/// Search/transfer collaborator
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Start a search. Results stream in until the provider is done or the
    /// caller stops reading.
    async fn search(&self, query: &TrackQuery, filters: &SearchFilters) -> Result<CandidateStream>;

    /// Fetch `candidate` into `destination`, returning the bytes written
    async fn transfer(
        &self,
        candidate: &Candidate,
        destination: &Path,
        on_progress: ProgressCallback,
    ) -> Result<u64>;

    /// Abort an in-flight transfer of `candidate`. Best effort.
    async fn cancel(&self, candidate: &Candidate);
}

/// Wrap already collected results as a stream
pub fn stream_of(candidates: Vec<Candidate>) -> CandidateStream {
    stream::iter(candidates.into_iter().map(Ok)).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp3(kbps: u32) -> Candidate {
        Candidate::from_remote_path("p", "Artist - Track.mp3", Some(5_000_000)).bitrate(kbps)
    }

    #[test]
    fn default_filters_accept_everything() {
        assert!(SearchFilters::default().accepts(&mp3(64)));
        assert!(SearchFilters::default().accepts(&Candidate::default()));
    }

    #[test]
    fn format_filter() {
        let filters = SearchFilters::default().formats([".FLAC", "mp3"]);
        assert!(filters.accepts(&mp3(320)));
        assert!(!filters.accepts(&Candidate::from_remote_path("p", "a.ogg", None)));
        assert!(!filters.accepts(&Candidate::default()));
    }

    #[test]
    fn bitrate_and_size_filters() {
        let filters = SearchFilters::default().min_bitrate(256).max_size(10_000_000);
        assert!(filters.accepts(&mp3(320)));
        assert!(!filters.accepts(&mp3(128)));
        let lossless = Candidate::from_remote_path("p", "a.flac", Some(1000)).bitrate(100);
        assert!(filters.accepts(&lossless));
        let huge = Candidate::from_remote_path("p", "a.mp3", Some(50_000_000));
        assert!(!filters.accepts(&huge));
    }

    #[test]
    fn free_slot_filter() {
        let filters = SearchFilters::default().require_free_slot(true);
        assert!(!filters.accepts(&mp3(320)));
        assert!(filters.accepts(&mp3(320).peer_conditions(true, 0, 0)));
    }

    #[tokio::test]
    async fn stream_of_yields_in_order() {
        let items: Vec<_> = stream_of(vec![mp3(1), mp3(2)]).collect().await;
        let rates: Vec<_> = items.into_iter().map(|c| c.unwrap().bitrate).collect();
        assert_eq!(rates, vec![Some(1), Some(2)]);
    }
}
