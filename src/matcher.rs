//! String Distance Matcher
//!
//! Edit distance and normalized similarity over canonicalized strings, plus
//! path-aware extraction of tempo/key tokens from directory names.

use crate::normalize;

/// Confidence for a token found in the file name itself
pub const CONFIDENCE_FILE: f64 = 1.0;
/// Confidence for a token found in the immediate parent directory
pub const CONFIDENCE_PARENT: f64 = 0.9;
/// Confidence for a token found further up the tree
pub const CONFIDENCE_ANCESTOR: f64 = 0.7;

/// A tempo or key token recovered from a path
#[derive(Debug, Clone, PartialEq)]
pub struct PathToken {
    pub value: String,
    /// 1.0 at the file name, decaying with directory depth
    pub confidence: f64,
    /// 0 = file name, 1 = parent directory, ...
    pub depth: usize,
}

/// Normalize, then keep only lower-cased letters and digits
pub fn canonicalize(s: &str) -> String {
    normalize::normalize(s)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Levenshtein distance between the canonical forms of `a` and `b`
pub fn distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(&canonicalize(a), &canonicalize(b))
}

/// Similarity in [0, 1]: 1 for identical canonical forms, 0 when every
/// character of the longer one has to change.
pub fn normalized_score(a: &str, b: &str) -> f64 {
    let a = canonicalize(a);
    let b = canonicalize(b);
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => strsim::normalized_levenshtein(&a, &b).clamp(0.0, 1.0),
    }
}

/// Highest scoring option for `expected`, with its score.
///
/// Ties keep the earliest option.
pub fn best_match<'a, I>(expected: &str, options: I) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for option in options {
        let score = normalized_score(expected, option);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((option, score));
        }
    }
    best
}

/// First tempo token found scanning from the file name upward
pub fn extract_bpm_from_path(path: &str) -> Option<PathToken> {
    scan_path(path, normalize::extract_bpm)
}

/// First Camelot key token found scanning from the file name upward
pub fn extract_key_from_path(path: &str) -> Option<PathToken> {
    scan_path(path, normalize::extract_key)
}

fn scan_path<F>(path: &str, extract: F) -> Option<PathToken>
where
    F: Fn(&str) -> Option<String>,
{
    path.split(['/', '\\'])
        .filter(|c| !c.is_empty())
        .rev()
        .enumerate()
        .find_map(|(depth, component)| {
            extract(component).map(|value| PathToken {
                value,
                confidence: confidence_for_depth(depth),
                depth,
            })
        })
}

fn confidence_for_depth(depth: usize) -> f64 {
    match depth {
        0 => CONFIDENCE_FILE,
        1 => CONFIDENCE_PARENT,
        _ => CONFIDENCE_ANCESTOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(normalized_score("hello world", "hello world"), 1.0);
        assert_eq!(normalized_score("Hello_World", "hello world"), 1.0);
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(normalized_score("abc", "xyz"), 0.0);
    }

    #[test]
    fn degenerate_cases() {
        assert_eq!(normalized_score("", ""), 1.0);
        assert_eq!(normalized_score("", "abc"), 0.0);
        assert_eq!(normalized_score("[HD]", "abc"), 0.0);
        assert_eq!(distance("", "abc"), 3);
    }

    #[test]
    fn classic_distances() {
        assert_eq!(distance("kitten", "sitting"), 3);
        assert_eq!(distance("flaw", "lawn"), 2);
        assert_eq!(distance("same", "same"), 0);
    }

    #[test]
    fn score_counts_characters_not_bytes() {
        assert_eq!(distance("Beyoncé", "Beyonce"), 1);
        let s = normalized_score("kitten", "sitting");
        assert!((s - 4.0 / 7.0).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn distance_is_symmetric() {
        let words = ["kitten", "sitting", "", "a", "Daft Punk - Aerodynamic", "aerodynamic (2001)", "xyz"];
        for a in words {
            for b in words {
                assert_eq!(distance(a, b), distance(b, a), "{a:?} vs {b:?}");
                let s = normalized_score(a, b);
                assert!((0.0..=1.0).contains(&s));
            }
        }
    }

    #[test]
    fn canonical_form_drops_noise_and_punctuation() {
        assert_eq!(canonicalize("Daft Punk - One More Time [HD].mp3"), "daftpunkonemoretime");
        assert_eq!(canonicalize("Beyoncé"), "beyoncé");
    }

    #[test]
    fn best_match_picks_closest() {
        let options = ["Other Song.mp3", "Artist - Track.flac", "Artist - Trick.mp3"];
        let (best, score) = best_match("Artist - Track", options).expect("has options");
        assert_eq!(best, "Artist - Track.flac");
        assert_eq!(score, 1.0);
        assert!(best_match("x", std::iter::empty()).is_none());
    }

    #[test]
    fn path_tokens_decay_with_depth() {
        let token = extract_bpm_from_path("Music/House 124 BPM/Vol 1/track.mp3").expect("bpm");
        assert_eq!(token.value, "124");
        assert_eq!(token.depth, 2);
        assert_eq!(token.confidence, CONFIDENCE_ANCESTOR);

        let token = extract_key_from_path("Music\\8A\\track.mp3").expect("key");
        assert_eq!(token.value, "8A");
        assert_eq!(token.confidence, CONFIDENCE_PARENT);

        let token = extract_bpm_from_path("Music/90 bpm/track 128bpm.mp3").expect("bpm");
        assert_eq!(token.value, "128");
        assert_eq!(token.confidence, CONFIDENCE_FILE);

        assert!(extract_key_from_path("Music/track.mp3").is_none());
    }
}
