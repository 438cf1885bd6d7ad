//! Search-side value types
//!
//! `TrackQuery` describes what the caller wants, `Candidate` is one file
//! offered by a peer. Both are immutable values; the mutable side of a
//! download lives in [`crate::job::DownloadJob`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Formats that carry no lossy compression
pub const LOSSLESS_FORMATS: &[&str] = &["flac", "wav", "alac", "aiff", "aif", "ape", "wv"];

/// The track the caller wants to fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackQuery {
    pub artist: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// Expected length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    /// Camelot notation, e.g. `8A`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl TrackQuery {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    pub fn duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into().to_uppercase());
        self
    }

    /// `"artist - title"`, the form filenames are compared against
    pub fn display_name(&self) -> String {
        match (self.artist.trim(), self.title.trim()) {
            ("", title) => title.to_string(),
            (artist, "") => artist.to_string(),
            (artist, title) => format!("{} - {}", artist, title),
        }
    }

    /// Free text sent to the network search
    pub fn search_text(&self) -> String {
        format!("{} {}", self.artist.trim(), self.title.trim())
            .trim()
            .to_string()
    }

    /// Hex SHA-256 of the canonicalized display name.
    ///
    /// Two queries that differ only in noise (case, punctuation, uploader
    /// tags) share an identity, which keys both persistence lookups and
    /// search coalescing.
    pub fn identity_hash(&self) -> String {
        let canonical = crate::matcher::canonicalize(&self.display_name());
        let digest = Sha256::digest(canonical.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// One file offered by a peer in response to a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// Full remote path as the peer shares it
    pub filename: String,
    /// Declared bitrate in kbps
    #[serde(default)]
    pub bitrate: Option<u32>,
    /// Lower-case extension without the dot
    #[serde(default)]
    pub format: Option<String>,
    /// Length in seconds
    #[serde(default)]
    pub length: Option<u32>,
    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub year: Option<u16>,
    /// Owning peer's user name
    pub peer: String,
    pub free_upload_slot: bool,
    pub queue_length: u32,
    /// Peer's advertised upload speed in bytes/sec
    pub upload_speed: u64,
}

impl Candidate {
    /// Build a candidate from a shared path, parsing what can be parsed.
    ///
    /// Handles the common layouts:
    /// - `Music\Artist\Album\01 - Title.flac`
    /// - `Downloads\Artist - Title.mp3`
    /// - `Title.mp3`
    pub fn from_remote_path(peer: impl Into<String>, path: impl Into<String>, size: Option<u64>) -> Self {
        let filename = path.into();
        let parts: Vec<&str> = filename
            .split(['\\', '/'])
            .filter(|s| !s.is_empty())
            .collect();
        let file = parts.last().copied().unwrap_or("");
        let (stem, format) = match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 => {
                (stem, Some(ext.to_ascii_lowercase()))
            }
            _ => (file, None),
        };
        let stem = strip_track_number(stem).trim();

        let (mut artist, title) = match stem.split_once(" - ") {
            Some((a, t)) if !a.trim().is_empty() && !t.trim().is_empty() => {
                (Some(a.trim().to_string()), t.trim().to_string())
            }
            _ => (None, stem.to_string()),
        };

        let album = if parts.len() >= 2 {
            Some(parts[parts.len() - 2].to_string())
        } else {
            None
        };
        if artist.is_none() && parts.len() >= 3 {
            artist = Some(parts[parts.len() - 3].to_string());
        }

        let year = crate::normalize::extract_year(&filename);

        Self {
            artist,
            title: (!title.is_empty()).then_some(title),
            album,
            filename,
            format,
            size,
            year,
            peer: peer.into(),
            ..Default::default()
        }
    }

    pub fn bitrate(mut self, kbps: u32) -> Self {
        self.bitrate = Some(kbps);
        self
    }

    pub fn length(mut self, seconds: u32) -> Self {
        self.length = Some(seconds);
        self
    }

    pub fn peer_conditions(mut self, free_upload_slot: bool, queue_length: u32, upload_speed: u64) -> Self {
        self.free_upload_slot = free_upload_slot;
        self.queue_length = queue_length;
        self.upload_speed = upload_speed;
        self
    }

    /// Last path component of the remote name
    pub fn file_name(&self) -> &str {
        self.filename
            .rsplit(['\\', '/'])
            .find(|s| !s.is_empty())
            .unwrap_or(&self.filename)
    }

    /// File name without its extension
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 => stem,
            _ => name,
        }
    }

    /// Whether the declared format is lossless
    pub fn is_lossless(&self) -> bool {
        self.format
            .as_deref()
            .map(|f| LOSSLESS_FORMATS.contains(&f.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Strip leading track numbers like `01 - `, `01. `, `1 `, `01-`.
fn strip_track_number(s: &str) -> &str {
    let digits = s.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits > 3 || digits >= s.len() {
        return s;
    }
    let rest = &s[digits..];
    let trimmed = rest.trim_start_matches([' ', '.', '-', '_']);
    if trimmed.len() == rest.len() {
        // "1984abc" is a title, not a track number
        return s;
    }
    trimmed
}
