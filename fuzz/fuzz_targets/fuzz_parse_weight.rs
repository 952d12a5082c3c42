#![no_main]
use libfuzzer_sys::fuzz_target;
use scalelink_core::{parse_weight, round_weight};

fuzz_target!(|data: &str| {
    if let Some(w) = parse_weight(data) {
        assert!(w.is_finite());
        if w.abs() < 1e12 {
            assert!((round_weight(w) - w).abs() <= 0.0005 + 1e-9);
        }
    }
});
