#![no_main]
use libfuzzer_sys::fuzz_target;
use peerfetch::matcher::{extract_bpm_from_path, extract_key_from_path, normalized_score};

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;
    let score = normalized_score(a, b);
    assert!((0.0..=1.0).contains(&score));
    assert_eq!(score, normalized_score(b, a));
    let _ = extract_bpm_from_path(a);
    let _ = extract_key_from_path(b);
});
