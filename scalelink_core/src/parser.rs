//! Raw device text to weight.

use regex::Regex;
use std::sync::OnceLock;

fn number_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+\.?\d*").ok()).as_ref()
}

/// Parse one line of device output into a weight.
///
/// Control characters (0x00-0x1F, 0x7F) and ASCII letters are removed, a comma
/// decimal separator becomes a dot, and the first number (optional sign,
/// digits, optional fraction) is returned. Negative values pass through:
/// a tared or unloading scale legitimately reports them.
pub fn parse_weight(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !(c.is_ascii_control() || c.is_ascii_alphabetic()))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    let m = number_re()?.find(cleaned)?;
    m.as_str().parse::<f64>().ok().filter(|w| w.is_finite())
}

/// Round to the 3 decimals reported upstream.
#[inline]
pub fn round_weight(w: f64) -> f64 {
    (w * 1000.0).round() / 1000.0
}
