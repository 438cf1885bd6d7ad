//! Storage Module
//!
//! Persistence boundary for the local library. The scheduler records what
//! it fetched here, keyed by the track's identity hash, so later lookups
//! can tell whether a track is already on disk.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::TrackQuery;

/// Outcome recorded for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryStatus {
    /// File is on disk at `resolved_path`
    Downloaded,
    /// Last attempt failed
    Failed,
}

/// One persisted track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// [`TrackQuery::identity_hash`] of the track
    pub identity: String,
    pub artist: String,
    pub title: String,
    pub resolved_path: Option<PathBuf>,
    pub status: LibraryStatus,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LibraryEntry {
    pub fn downloaded(track: &TrackQuery, path: PathBuf) -> Self {
        Self {
            identity: track.identity_hash(),
            artist: track.artist.clone(),
            title: track.title.clone(),
            resolved_path: Some(path),
            status: LibraryStatus::Downloaded,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn failed(track: &TrackQuery, error: impl Into<String>) -> Self {
        Self {
            identity: track.identity_hash(),
            artist: track.artist.clone(),
            title: track.title.clone(),
            resolved_path: None,
            status: LibraryStatus::Failed,
            error: Some(error.into()),
            updated_at: Utc::now(),
        }
    }
}

/// Storage trait for the library records
///
/// Implementations must be safe to call from many job tasks at once, and
/// report backend failures as [`EngineError::Storage`](crate::EngineError::Storage).
/// The scheduler logs store failures and never fails a job over them.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Look up a track by its identity hash
    async fn find_by_identity(&self, identity: &str) -> Result<Option<LibraryEntry>>;

    /// Insert or replace the entry with the same identity
    async fn upsert(&self, entry: &LibraryEntry) -> Result<()>;

    /// Load all entries
    async fn load_all(&self) -> Result<Vec<LibraryEntry>>;

    /// Delete an entry
    async fn remove(&self, identity: &str) -> Result<()>;
}

/// In-memory store for testing and embedding
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, LibraryEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl LibraryStore for MemoryStorage {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<LibraryEntry>> {
        Ok(self.entries.read().get(identity).cloned())
    }

    async fn upsert(&self, entry: &LibraryEntry) -> Result<()> {
        self.entries
            .write()
            .insert(entry.identity.clone(), entry.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<LibraryEntry>> {
        Ok(self.entries.read().values().cloned().collect())
    }

    async fn remove(&self, identity: &str) -> Result<()> {
        self.entries.write().remove(identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        let track = TrackQuery::new("Daft Punk", "Aerodynamic");
        let entry = LibraryEntry::downloaded(&track, PathBuf::from("/music/aerodynamic.flac"));

        storage.upsert(&entry).await.unwrap();

        let noisy = TrackQuery::new("daft_punk", "Aerodynamic [HD]");
        let loaded = storage
            .find_by_identity(&noisy.identity_hash())
            .await
            .unwrap()
            .expect("same identity");
        assert_eq!(loaded.status, LibraryStatus::Downloaded);
        assert_eq!(storage.load_all().await.unwrap().len(), 1);

        storage.remove(&entry.identity).await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let storage = MemoryStorage::new();
        let track = TrackQuery::new("Artist", "Track");

        storage
            .upsert(&LibraryEntry::failed(&track, "no candidates"))
            .await
            .unwrap();
        storage
            .upsert(&LibraryEntry::downloaded(&track, PathBuf::from("/m/t.mp3")))
            .await
            .unwrap();

        assert_eq!(storage.len(), 1);
        let entry = storage
            .find_by_identity(&track.identity_hash())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, LibraryStatus::Downloaded);
        assert!(entry.error.is_none());
    }
}
