#![no_main]
use libfuzzer_sys::fuzz_target;
use peerfetch::normalize::{normalize, normalize_with_extraction};

fuzz_target!(|data: &str| {
    // Never panics, and a second pass changes nothing
    let once = normalize(data);
    assert_eq!(normalize(&once), once);
    let _ = normalize_with_extraction(data);
});
