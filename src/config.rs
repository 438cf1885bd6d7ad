//! Engine configuration
//!
//! This module contains all configuration options for the fetch engine.
//! Loading it from disk is left to the embedding application; every type
//! here is plain serde data.

use crate::error::{EngineError, Result};
use crate::provider::SearchFilters;
use crate::ranking::{RankingStrategy, ScoringWeights};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the download scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory to save downloads
    pub download_dir: PathBuf,

    /// Maximum jobs past `Pending` at once
    pub max_concurrent_downloads: usize,

    /// Weight preset used for ranking
    #[serde(default)]
    pub strategy: RankingStrategy,

    /// Custom weights; overrides `strategy` when set
    #[serde(default)]
    pub weights: Option<ScoringWeights>,

    /// Candidates scoring below this total are discarded
    #[serde(default)]
    pub min_candidate_score: f64,

    /// Candidates whose name similarity to the wanted track is below this
    /// are discarded before ranking
    #[serde(default = "default_min_string_similarity")]
    pub min_string_similarity: f64,

    /// Fail the job when the written byte count disagrees with the
    /// candidate's declared size
    #[serde(default = "default_true")]
    pub verify_size: bool,

    /// Minimum milliseconds between progress events for one job
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,

    /// Network search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Local library configuration
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Search-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Give up on a search after this many seconds
    pub timeout_secs: u64,

    /// Stop reading results after this many candidates
    pub max_results: usize,

    /// Filters passed to the provider and re-checked locally
    #[serde(default)]
    pub filters: SearchFilters,
}

/// Library resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Library root; falls back to the download directory
    pub root: Option<PathBuf>,

    /// Audio file extensions considered part of the library
    pub extensions: Vec<String>,

    /// Minimum name similarity for a file to count as a match
    pub min_match_score: f64,

    /// How deep to walk below the root
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_min_string_similarity() -> f64 {
    0.5
}

fn default_progress_interval_ms() -> u64 {
    250
}

fn default_event_capacity() -> usize {
    1024
}

fn default_max_depth() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            max_concurrent_downloads: 3,
            strategy: RankingStrategy::default(),
            weights: None,
            min_candidate_score: 0.0,
            min_string_similarity: default_min_string_similarity(),
            verify_size: true,
            progress_interval_ms: default_progress_interval_ms(),
            event_channel_capacity: default_event_capacity(),
            search: SearchConfig::default(),
            library: LibraryConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_results: 200,
            filters: SearchFilters::default(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: None,
            extensions: ["mp3", "flac", "m4a", "wav", "ogg", "wma"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_match_score: 0.8,
            max_depth: default_max_depth(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the download directory
    pub fn download_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_dir = path.into();
        self
    }

    /// Set maximum concurrent downloads
    pub fn max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max;
        self
    }

    pub fn strategy(mut self, strategy: RankingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn min_candidate_score(mut self, score: f64) -> Self {
        self.min_candidate_score = score;
        self
    }

    pub fn min_string_similarity(mut self, score: f64) -> Self {
        self.min_string_similarity = score;
        self
    }

    pub fn verify_size(mut self, verify: bool) -> Self {
        self.verify_size = verify;
        self
    }

    pub fn progress_interval_ms(mut self, ms: u64) -> Self {
        self.progress_interval_ms = ms;
        self
    }

    /// Set the search timeout
    pub fn search_timeout(mut self, secs: u64) -> Self {
        self.search.timeout_secs = secs;
        self
    }

    pub fn max_search_results(mut self, max: usize) -> Self {
        self.search.max_results = max;
        self
    }

    pub fn search_filters(mut self, filters: SearchFilters) -> Self {
        self.search.filters = filters;
        self
    }

    /// Set the library root used for resolution
    pub fn library_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.library.root = Some(path.into());
        self
    }

    /// Weights the scheduler starts with
    pub fn effective_weights(&self) -> ScoringWeights {
        self.weights.unwrap_or_else(|| self.strategy.weights())
    }

    /// Library root, defaulting to the download directory
    pub fn library_root_or_default(&self) -> PathBuf {
        self.library
            .root
            .clone()
            .unwrap_or_else(|| self.download_dir.clone())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Check download directory
        if !self.download_dir.exists() {
            return Err(EngineError::invalid_input(
                "download_dir",
                format!("Directory does not exist: {:?}", self.download_dir),
            ));
        }

        if !self.download_dir.is_dir() {
            return Err(EngineError::invalid_input(
                "download_dir",
                format!("Path is not a directory: {:?}", self.download_dir),
            ));
        }

        // Check numeric limits
        if self.max_concurrent_downloads == 0 {
            return Err(EngineError::invalid_input(
                "max_concurrent_downloads",
                "Must be at least 1",
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(EngineError::invalid_input(
                "event_channel_capacity",
                "Must be at least 1",
            ));
        }

        if self.search.timeout_secs == 0 {
            return Err(EngineError::invalid_input(
                "search.timeout_secs",
                "Must be at least 1",
            ));
        }

        if self.search.max_results == 0 {
            return Err(EngineError::invalid_input(
                "search.max_results",
                "Must be at least 1",
            ));
        }

        for (field, value) in [
            ("min_string_similarity", self.min_string_similarity),
            ("library.min_match_score", self.library.min_match_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::invalid_input(field, "Must be between 0 and 1"));
            }
        }

        if !self.min_candidate_score.is_finite() {
            return Err(EngineError::invalid_input(
                "min_candidate_score",
                "Must be a finite number",
            ));
        }

        if let Some(weights) = &self.weights {
            weights.validate()?;
        }

        if self.library.extensions.is_empty() {
            return Err(EngineError::invalid_input(
                "library.extensions",
                "At least one extension is required",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.search.timeout_secs, 30);
        assert_eq!(config.library.min_match_score, 0.8);
        assert!(config.library.extensions.iter().any(|e| e == "flac"));
        assert_eq!(config.effective_weights(), RankingStrategy::Balanced.weights());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .max_concurrent_downloads(10)
            .strategy(RankingStrategy::DjMode)
            .search_timeout(5)
            .library_root("/music");

        assert_eq!(config.max_concurrent_downloads, 10);
        assert_eq!(config.effective_weights().musical, 3.0);
        assert_eq!(config.search.timeout(), Duration::from_secs(5));
        assert_eq!(config.library_root_or_default(), PathBuf::from("/music"));
    }

    #[test]
    fn test_config_validation() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new().download_dir(dir.path());
        assert!(config.validate().is_ok());
        assert_eq!(config.library_root_or_default(), dir.path());
    }

    #[test]
    fn test_invalid_download_dir() {
        let config = EngineConfig::new().download_dir("/nonexistent/path/12345");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_limits() {
        let dir = tempdir().unwrap();
        let base = EngineConfig::new().download_dir(dir.path());

        assert!(base.clone().max_concurrent_downloads(0).validate().is_err());
        assert!(base.clone().min_string_similarity(1.5).validate().is_err());
        assert!(base.clone().search_timeout(0).validate().is_err());
        let negative = ScoringWeights {
            availability: -0.1,
            ..Default::default()
        };
        assert!(base.weights(negative).validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let json = r#"{
            "download_dir": "/tmp",
            "max_concurrent_downloads": 2
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_concurrent_downloads, 2);
        assert!(config.verify_size);
        assert_eq!(config.search.max_results, 200);
        assert_eq!(config.strategy, RankingStrategy::Balanced);
    }
}
