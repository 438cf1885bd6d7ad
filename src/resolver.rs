//! Local library resolver
//!
//! Maps an expected "artist - title" to a file that already exists on
//! disk, by walking a directory tree and fuzzy-matching file names. Also
//! used after a transfer to find the written file when the provider saved
//! it under a slightly different name.
//!
//! Everything here is blocking filesystem work; async callers go through
//! `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::LibraryConfig;
use crate::error::{EngineError, Result, StorageErrorKind};
use crate::matcher;
use crate::protocol::TrackQuery;

/// A file matched to an expected name
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub score: f64,
}

/// Fuzzy file finder rooted at a library directory
#[derive(Debug, Clone)]
pub struct LibraryResolver {
    root: PathBuf,
    /// Lower-case extensions without the dot
    extensions: Vec<String>,
    min_score: f64,
    max_depth: usize,
}

impl LibraryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(root, &LibraryConfig::default())
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &LibraryConfig) -> Self {
        Self {
            root: root.into(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            min_score: config.min_match_score,
            max_depth: config.max_depth,
        }
    }

    pub fn min_score(mut self, score: f64) -> Self {
        self.min_score = score;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every audio file under the root.
    ///
    /// Fails only when the root itself cannot be read; unreadable entries
    /// below it are logged and skipped.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        scan_dir(&self.root, &self.extensions, self.max_depth)
    }

    /// Best file for `expected` scoring at least the minimum
    pub fn resolve(&self, expected: &str) -> Result<Option<ResolvedFile>> {
        let files = self.scan()?;
        Ok(best_file(expected, &files, self.min_score))
    }

    pub fn resolve_track(&self, track: &TrackQuery) -> Result<Option<ResolvedFile>> {
        self.resolve(&track.display_name())
    }

    /// Locate a freshly transferred file.
    ///
    /// Returns `expected_path` when it exists, otherwise the closest audio
    /// file in the same directory (and one level below) if it clears the
    /// minimum score.
    pub fn reconcile(&self, expected_path: &Path) -> Result<Option<PathBuf>> {
        if expected_path.is_file() {
            return Ok(Some(expected_path.to_path_buf()));
        }
        let Some(dir) = expected_path.parent().filter(|d| d.is_dir()) else {
            return Ok(None);
        };
        let expected = expected_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let files = scan_dir(dir, &self.extensions, 2)?;
        let found = best_file(&expected, &files, self.min_score);
        if let Some(found) = &found {
            debug!(
                "Reconciled {} to {} (score {:.2})",
                expected,
                found.path.display(),
                found.score
            );
        }
        Ok(found.map(|f| f.path))
    }
}

fn scan_dir(root: &Path, extensions: &[String], max_depth: usize) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(root).map_err(|e| {
        EngineError::storage(StorageErrorKind::NotFound, root, e.to_string())
    })?;
    if !meta.is_dir() {
        return Err(EngineError::storage(
            StorageErrorKind::InvalidPath,
            root,
            "library root is not a directory",
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable library entry: {}", EngineError::from(e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let allowed = entry
            .path()
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_ascii_lowercase();
                extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false);
        if allowed {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn best_file(expected: &str, files: &[PathBuf], min_score: f64) -> Option<ResolvedFile> {
    let names: Vec<String> = files
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();

    let (name, score) = matcher::best_match(expected, names.iter().map(String::as_str))?;
    if score < min_score {
        return None;
    }
    let index = names.iter().position(|n| n == name)?;
    Some(ResolvedFile {
        path: files[index].clone(),
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn library() -> TempDir {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Daft Punk").join("Discovery");
        fs::create_dir_all(&album).unwrap();
        fs::write(album.join("Daft Punk - One More Time.flac"), b"x").unwrap();
        fs::write(album.join("Daft Punk - Aerodynamic [320].mp3"), b"x").unwrap();
        fs::write(album.join("cover.jpg"), b"x").unwrap();
        fs::write(album.join("Daft Punk - Digital Love.txt"), b"x").unwrap();
        dir
    }

    #[test]
    fn scan_filters_extensions() {
        let lib = library();
        let files = LibraryResolver::new(lib.path()).scan().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some_and(|e| e == "flac" || e == "mp3")));
    }

    #[test]
    fn resolves_noisy_names() {
        let lib = library();
        let resolver = LibraryResolver::new(lib.path());
        let found = resolver
            .resolve_track(&TrackQuery::new("Daft Punk", "Aerodynamic"))
            .unwrap()
            .expect("match");
        assert!(found.path.ends_with("Daft Punk - Aerodynamic [320].mp3"));
        assert_eq!(found.score, 1.0);
    }

    #[test]
    fn below_threshold_is_none() {
        let lib = library();
        let resolver = LibraryResolver::new(lib.path());
        assert!(resolver.resolve("Daft Punk - Digital Love").unwrap().is_none());
        assert!(resolver.resolve("Completely Different").unwrap().is_none());
    }

    #[test]
    fn missing_root_is_an_error() {
        let resolver = LibraryResolver::new("/definitely/not/here");
        match resolver.scan() {
            Err(EngineError::Storage { kind, .. }) => assert_eq!(kind, StorageErrorKind::NotFound),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reconcile_finds_renamed_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Artist - Track (Official Video).mp3"), b"x").unwrap();
        let resolver = LibraryResolver::new(dir.path());

        let found = resolver
            .reconcile(&dir.path().join("Artist - Track.mp3"))
            .unwrap()
            .expect("renamed file");
        assert!(found.ends_with("Artist - Track (Official Video).mp3"));

        let exact = dir.path().join("Artist - Track (Official Video).mp3");
        assert_eq!(resolver.reconcile(&exact).unwrap(), Some(exact.clone()));

        assert!(resolver
            .reconcile(&dir.path().join("Nothing Like It.mp3"))
            .unwrap()
            .is_none());
    }
}
