//! Filename Normalizer
//!
//! Strips non-semantic noise from raw filenames so they can be compared:
//!
//! 1. uploader / tag brackets such as `[x264-GRP]` or `{web.dl}`
//! 2. known noise categories, case-insensitive: video/quality markers,
//!    edition/remaster markers, bracketed years, explicit/clean tags,
//!    format/bitrate tags, bracketed tempo/key tags, and a trailing audio
//!    extension
//! 3. underscores to spaces, whitespace collapsed, leading/trailing spaces,
//!    dashes and dots trimmed
//!
//! The pipeline is repeated until the string stops changing, so
//! `normalize(normalize(s)) == normalize(s)` for every input.

use once_cell::sync::Lazy;
use regex::Regex;

/// `[token]` / `{token}` where token is alphanumerics, dashes and dots
static TAG_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[A-Za-z0-9.\-]+\]|\{[A-Za-z0-9.\-]+\}").unwrap());

static NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // video / quality markers
        r"(?i)[\(\[]\s*(?:official\s+)?(?:music\s+|lyrics?\s+)?(?:video|audio|visuali[sz]er|lyrics?|hd|hq|4k|1080p|720p|480p|360p)(?:\s+(?:video|version))?\s*[\)\]]",
        // edition / remaster markers
        r"(?i)[\(\[][^\(\)\[\]]*\b(?:remaster(?:ed)?|deluxe|edition|anniversary|bonus\s+track)\b[^\(\)\[\]]*[\)\]]",
        // bracketed years
        r"[\(\[]\s*\d{4}\s*[\)\]]",
        // explicit / clean tags
        r"(?i)[\(\[]\s*(?:explicit|clean|dirty)(?:\s+(?:version|edit))?\s*[\)\]]",
        // redundant format / bitrate tags
        r"(?i)[\(\[]\s*(?:flac|mp3|aac|m4a|ogg|opus|wav|alac|lossless|web|cd|vinyl|v0|v2|\d{2,4}\s*(?:kbps|k)?|(?:16|24)\s*-?\s*bit(?:\s*[/-]?\s*\d{2,3}(?:\.\d)?\s*khz)?)\s*[\)\]]",
        // bracketed tempo / key tags
        r"(?i)[\(\[]\s*(?:\d{2,3}\s*bpm|(?:1[0-2]|[1-9])[ab])\s*[\)\]]",
        // trailing audio extension
        r"(?i)\.(?:mp3|flac|m4a|wav|ogg|wma|aac|opus|alac|aiff?)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static BPM_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{2,3})\s*bpm\b").unwrap());

/// Camelot notation, `1A`..`12B`, as a whole word
static KEY_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(1[0-2]|[1-9])([AB])\b").unwrap());

static YEAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\(\[]\s*((?:19|20)\d{2})\s*[\)\]]").unwrap());

/// Result of [`normalize_with_extraction`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub normalized: String,
    /// Tempo digits, e.g. `"128"`
    pub bpm: Option<String>,
    /// Upper-case Camelot key, e.g. `"8A"`
    pub key: Option<String>,
}

/// Strip noise tokens from a raw filename
pub fn normalize(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = normalize_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Like [`normalize`], but first recovers tempo and key tokens that the
/// stripping would otherwise destroy.
pub fn normalize_with_extraction(raw: &str) -> Extraction {
    if raw.trim().is_empty() {
        return Extraction::default();
    }
    Extraction {
        normalized: normalize(raw),
        bpm: extract_bpm(raw),
        key: extract_key(raw),
    }
}

/// First `NNN bpm` token, digits only
pub fn extract_bpm(raw: &str) -> Option<String> {
    BPM_TOKEN
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First Camelot key token, upper-cased
pub fn extract_key(raw: &str) -> Option<String> {
    KEY_TOKEN.captures(raw).map(|c| {
        let number = c.get(1).map_or("", |m| m.as_str());
        let letter = c.get(2).map_or("", |m| m.as_str());
        format!("{}{}", number, letter.to_ascii_uppercase())
    })
}

/// Bracketed release year such as `(1999)` or `[2023]`
pub fn extract_year(raw: &str) -> Option<u16> {
    YEAR_TOKEN
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn normalize_pass(input: &str) -> String {
    let mut s = TAG_BRACKETS.replace_all(input, " ").into_owned();
    for pattern in NOISE_PATTERNS.iter() {
        s = pattern.replace_all(&s, " ").into_owned();
    }
    let s = s.replace('_', " ");
    let s = WHITESPACE.replace_all(&s, " ");
    s.trim_matches(|c: char| c == ' ' || c == '-' || c == '.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "Artist - Track [Official Video] (2023).mp3",
        "[a[HD]]",
        "{{x}}",
        "__--..__",
        "Daft_Punk_-_One_More_Time_[320].mp3.mp3",
        "Song (Remastered 2011) [FLAC] (Explicit)",
        "Track (Official Music Video) [4K] [HD]",
        "  ..Leading and trailing..  ",
        "Nested [[x]] (2020) [(1999)]",
        "Title [128 BPM] [8A]",
        "Real Title (Live at Wembley)",
        "",
        "\t\n",
        "Mr. Brightside.",
        "(((2020)))",
        "A.flac.mp3.wav",
        "Song [24bit-96kHz] [WEB]",
    ];

    #[test]
    fn strips_noise_and_extension() {
        assert_eq!(
            normalize("Artist - Track [Official Video] (2023).mp3"),
            "Artist - Track"
        );
    }

    #[test]
    fn strips_each_noise_category() {
        assert_eq!(normalize("Song (Remastered 2011)"), "Song");
        assert_eq!(normalize("Song [Deluxe Edition]"), "Song");
        assert_eq!(normalize("Song (Explicit)"), "Song");
        assert_eq!(normalize("Song [FLAC]"), "Song");
        assert_eq!(normalize("Song [320]"), "Song");
        assert_eq!(normalize("Song (720p)"), "Song");
        assert_eq!(normalize("Song [x264-GRP]"), "Song");
        assert_eq!(normalize("Song {web.dl}"), "Song");
        assert_eq!(normalize("Song [24bit-96kHz]"), "Song");
        assert_eq!(normalize("Song [128 BPM] [8A]"), "Song");
    }

    #[test]
    fn keeps_meaningful_parentheses() {
        assert_eq!(
            normalize("Real Title (Live at Wembley)"),
            "Real Title (Live at Wembley)"
        );
        assert_eq!(normalize("Track (Radio Mix)"), "Track (Radio Mix)");
    }

    #[test]
    fn cleans_delimiters() {
        assert_eq!(normalize("Daft_Punk_-_One_More_Time"), "Daft Punk - One More Time");
        assert_eq!(normalize("  ..Leading and trailing..  "), "Leading and trailing");
        assert_eq!(normalize("a    b\t\tc"), "a b c");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize_with_extraction("  \t "), Extraction::default());
    }

    #[test]
    fn normalization_is_idempotent() {
        for sample in SAMPLES {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn extraction_recovers_tempo_and_key() {
        let ex = normalize_with_extraction("Deep Cut [128 BPM] [8a].flac");
        assert_eq!(ex.normalized, "Deep Cut");
        assert_eq!(ex.bpm.as_deref(), Some("128"));
        assert_eq!(ex.key.as_deref(), Some("8A"));
    }

    #[test]
    fn extraction_leaves_missing_tokens_empty() {
        let ex = normalize_with_extraction("Plain Song.mp3");
        assert_eq!(ex.normalized, "Plain Song");
        assert_eq!(ex.bpm, None);
        assert_eq!(ex.key, None);
    }

    #[test]
    fn key_prefers_two_digit_numbers() {
        assert_eq!(extract_key("Tune 11B").as_deref(), Some("11B"));
        assert_eq!(extract_key("Tune 13A"), None);
        assert_eq!(extract_key("MP3A"), None);
    }

    #[test]
    fn year_extraction() {
        assert_eq!(extract_year("Album (1999)"), Some(1999));
        assert_eq!(extract_year("Album [2023] x"), Some(2023));
        assert_eq!(extract_year("Album 1999"), None);
    }
}
