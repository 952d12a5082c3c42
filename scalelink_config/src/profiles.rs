//! Built-in device profiles.
//!
//! A profile is a named framing/protocol preset. `custom` is a template for
//! hand-entered settings and is never tried during auto-detection.

use scalelink_traits::Parity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleProfile {
    pub id: &'static str,
    pub brand: &'static str,
    pub model: &'static str,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// `None` for devices that transmit continuously.
    pub poll_command: Option<&'static str>,
    pub delimiter: &'static str,
    pub description: &'static str,
}

/// Id of the hand-entered template profile.
pub const CUSTOM_PROFILE_ID: &str = "custom";

pub const PROFILES: &[ScaleProfile] = &[
    ScaleProfile {
        id: "torrey-fs250",
        brand: "Torrey",
        model: "FS-250",
        baud_rate: 9600,
        data_bits: 8,
        parity: Parity::None,
        stop_bits: 1,
        poll_command: Some("W\r\n"),
        delimiter: "\r",
        description: "Torrey FS-250 floor scale",
    },
    ScaleProfile {
        id: "torrey-l-eq",
        brand: "Torrey",
        model: "L-EQ",
        baud_rate: 9600,
        data_bits: 8,
        parity: Parity::None,
        stop_bits: 1,
        poll_command: Some("W\r\n"),
        delimiter: "\r",
        description: "Torrey L-EQ bench scale",
    },
    ScaleProfile {
        id: "generic-continuous",
        brand: "Generic",
        model: "Continuous transmission",
        baud_rate: 9600,
        data_bits: 8,
        parity: Parity::None,
        stop_bits: 1,
        poll_command: None,
        delimiter: "\r\n",
        description: "Generic scale that streams its weight continuously",
    },
    ScaleProfile {
        id: CUSTOM_PROFILE_ID,
        brand: "Custom",
        model: "Manual configuration",
        baud_rate: 9600,
        data_bits: 8,
        parity: Parity::None,
        stop_bits: 1,
        poll_command: Some("W\r\n"),
        delimiter: "\r",
        description: "Enter every serial parameter by hand",
    },
];

pub fn profile_by_id(id: &str) -> Option<&'static ScaleProfile> {
    PROFILES.iter().find(|p| p.id == id)
}

/// Profiles worth trying when probing an unknown port.
pub fn detectable_profiles() -> impl Iterator<Item = &'static ScaleProfile> {
    PROFILES.iter().filter(|p| p.id != CUSTOM_PROFILE_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        let p = profile_by_id("generic-continuous").expect("profile");
        assert!(p.poll_command.is_none());
        assert_eq!(p.delimiter, "\r\n");
        assert!(profile_by_id("nope").is_none());
    }

    #[test]
    fn custom_is_not_detectable() {
        assert!(detectable_profiles().all(|p| p.id != CUSTOM_PROFILE_ID));
        assert_eq!(detectable_profiles().count(), PROFILES.len() - 1);
    }
}
