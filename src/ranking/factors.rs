//! Sub-score factors
//!
//! Each factor maps one aspect of a candidate to [0, 1]. A factor whose
//! inputs are missing scores 0 rather than failing.

use crate::matcher;
use crate::protocol::{Candidate, TrackQuery};

/// Upload speed at which the availability speed term saturates (1 MiB/s)
const AVAILABILITY_SPEED_CAP: f64 = 1024.0 * 1024.0;
/// Upload speed at which the conditions speed term saturates (512 KiB/s)
const CONDITIONS_SPEED_CAP: f64 = 512.0 * 1024.0;
/// Bitrate at which the lossy quality term saturates
const BITRATE_CAP_KBPS: f64 = 320.0;
/// Tempo difference, as a fraction of the wanted tempo, that scores 0
const TEMPO_TOLERANCE: f64 = 0.06;
/// Duration difference in seconds that still counts as a perfect match
const DURATION_GRACE_SECS: f64 = 2.0;
/// Duration difference beyond the grace period that scores 0
const DURATION_TOLERANCE_SECS: f64 = 10.0;
/// File size at which the tiebreaker term reaches one half (100 MiB)
const TIEBREAK_SIZE_HALF: f64 = 100.0 * 1024.0 * 1024.0;

/// Free slot, short queue and fast uploads make a peer available now.
pub fn availability(candidate: &Candidate) -> f64 {
    let slot = if candidate.free_upload_slot { 1.0 } else { 0.0 };
    let queue = 1.0 / (1.0 + candidate.queue_length as f64);
    let speed = (candidate.upload_speed as f64 / AVAILABILITY_SPEED_CAP).min(1.0);
    0.5 * slot + 0.3 * queue + 0.2 * speed
}

/// Network-health proxy for the offering peer
pub fn conditions(candidate: &Candidate) -> f64 {
    let queue = 1.0 / (1.0 + candidate.queue_length as f64);
    let speed = (candidate.upload_speed as f64 / CONDITIONS_SPEED_CAP).min(1.0);
    0.6 * queue + 0.4 * speed
}

/// Monotonic in declared bitrate, with a bonus for lossless formats
pub fn quality(candidate: &Candidate) -> f64 {
    let lossless = candidate.is_lossless();
    let bitrate = match candidate.bitrate {
        Some(kbps) => (kbps as f64 / BITRATE_CAP_KBPS).min(1.0),
        None if lossless => 1.0,
        None => 0.0,
    };
    let bonus = if lossless { 0.4 } else { 0.0 };
    0.6 * bitrate + bonus
}

/// Tempo/key agreement. Only pairs where both sides are known contribute.
pub fn musical(wanted: &TrackQuery, candidate: &Candidate) -> f64 {
    let mut parts = Vec::with_capacity(2);

    if let Some(wanted_bpm) = wanted.bpm.filter(|b| *b > 0.0) {
        if let Some(token) = matcher::extract_bpm_from_path(&candidate.filename) {
            if let Ok(bpm) = token.value.parse::<f64>() {
                parts.push(tempo_similarity(wanted_bpm, bpm) * token.confidence);
            }
        }
    }

    if let Some(wanted_key) = wanted.key.as_deref() {
        if let Some(token) = matcher::extract_key_from_path(&candidate.filename) {
            parts.push(key_similarity(wanted_key, &token.value) * token.confidence);
        }
    }

    mean(&parts)
}

/// Album, year and duration agreement where both sides carry the field
pub fn metadata(wanted: &TrackQuery, candidate: &Candidate) -> f64 {
    let mut parts = Vec::with_capacity(3);

    if let (Some(wanted_album), Some(album)) = (wanted.album.as_deref(), candidate.album.as_deref()) {
        parts.push(matcher::normalized_score(wanted_album, album));
    }

    if let (Some(wanted_year), Some(year)) = (wanted.year, candidate.year) {
        parts.push(match wanted_year.abs_diff(year) {
            0 => 1.0,
            1 => 0.5,
            _ => 0.0,
        });
    }

    if let (Some(wanted_len), Some(len)) = (wanted.duration, candidate.length) {
        let diff = wanted_len.abs_diff(len) as f64;
        let over = (diff - DURATION_GRACE_SECS).max(0.0);
        parts.push((1.0 - over / DURATION_TOLERANCE_SECS).clamp(0.0, 1.0));
    }

    mean(&parts)
}

/// How well the candidate's name matches the wanted "artist - title"
pub fn string_similarity(wanted: &TrackQuery, candidate: &Candidate) -> f64 {
    let wanted_name = wanted.display_name();
    let by_file = matcher::normalized_score(&wanted_name, candidate.file_stem());
    let by_tags = match (candidate.artist.as_deref(), candidate.title.as_deref()) {
        (Some(artist), Some(title)) => {
            matcher::normalized_score(&wanted_name, &format!("{} - {}", artist, title))
        }
        _ => 0.0,
    };
    by_file.max(by_tags)
}

/// Small deterministic preference for larger files, strictly below 1
pub fn tiebreak(candidate: &Candidate) -> f64 {
    match candidate.size {
        Some(size) => {
            let size = size as f64;
            size / (size + TIEBREAK_SIZE_HALF)
        }
        None => 0.0,
    }
}

/// 1 at equal tempo, falling linearly to 0 at the tolerance. Half/double
/// time counts as a match.
pub fn tempo_similarity(wanted: f64, found: f64) -> f64 {
    if wanted <= 0.0 || found <= 0.0 {
        return 0.0;
    }
    [found, found * 2.0, found / 2.0]
        .iter()
        .map(|f| {
            let drift = (wanted - f).abs() / wanted;
            (1.0 - drift / TEMPO_TOLERANCE).clamp(0.0, 1.0)
        })
        .fold(0.0, f64::max)
}

/// Camelot wheel compatibility: same key 1.0; neighbouring number on the
/// same ring, or the relative major/minor, 0.75; anything else 0.
pub fn key_similarity(wanted: &str, found: &str) -> f64 {
    let (Some((wn, wl)), Some((fn_, fl))) = (parse_camelot(wanted), parse_camelot(found)) else {
        return 0.0;
    };
    if wn == fn_ && wl == fl {
        return 1.0;
    }
    let step = (wn as i32 - fn_ as i32).rem_euclid(12);
    let adjacent = step == 1 || step == 11;
    if (wl == fl && adjacent) || (wn == fn_ && wl != fl) {
        0.75
    } else {
        0.0
    }
}

fn parse_camelot(key: &str) -> Option<(u8, char)> {
    let key = key.trim();
    let letter = key.chars().last()?.to_ascii_uppercase();
    if letter != 'A' && letter != 'B' {
        return None;
    }
    let number: u8 = key[..key.len() - 1].parse().ok()?;
    (1..=12).contains(&number).then_some((number, letter))
}

fn mean(parts: &[f64]) -> f64 {
    if parts.is_empty() {
        0.0
    } else {
        parts.iter().sum::<f64>() / parts.len() as f64
    }
}
