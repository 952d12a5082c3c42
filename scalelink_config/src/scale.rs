//! Scale definitions: the concrete `ScaleConfig` used at runtime and the
//! file-level `ScaleEntry` it is resolved from.

use scalelink_traits::{Parity, SerialSettings};
use serde::{Deserialize, Deserializer, Serialize};

use crate::profiles::{ScaleProfile, profile_by_id};

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_DATA_BITS: u8 = 8;
pub const DEFAULT_STOP_BITS: u8 = 1;
pub const DEFAULT_DELIMITER: &str = "\r";
pub const DEFAULT_READ_INTERVAL_MS: u64 = 200;

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_data_bits() -> u8 {
    DEFAULT_DATA_BITS
}
fn default_stop_bits() -> u8 {
    DEFAULT_STOP_BITS
}
fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}
fn default_read_interval_ms() -> u64 {
    DEFAULT_READ_INTERVAL_MS
}
fn default_true() -> bool {
    true
}

/// Servers send `null`, `0` or `""` for unset framing fields; all of them
/// fall back to the default.
fn unset_or<'de, D, T>(d: D, fallback: fn() -> T) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default + PartialEq,
{
    let v = Option::<T>::deserialize(d)?;
    Ok(v.filter(|v| *v != T::default()).unwrap_or_else(fallback))
}

fn de_baud_rate<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    unset_or(d, default_baud_rate)
}
fn de_data_bits<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    unset_or(d, default_data_bits)
}
fn de_stop_bits<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    unset_or(d, default_stop_bits)
}
fn de_delimiter<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    unset_or(d, default_delimiter)
}
fn de_read_interval_ms<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    unset_or(d, default_read_interval_ms)
}
fn de_parity<'de, D: Deserializer<'de>>(d: D) -> Result<Parity, D::Error> {
    Ok(Option::<Parity>::deserialize(d)?.unwrap_or_default())
}
fn de_working<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(true))
}

/// One scale, fully resolved. This is also the wire shape of the remote
/// `/config` endpoint, hence camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleConfig {
    pub scale_id: String,
    pub port: String,
    #[serde(default = "default_baud_rate", deserialize_with = "de_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits", deserialize_with = "de_data_bits")]
    pub data_bits: u8,
    #[serde(default, deserialize_with = "de_parity")]
    pub parity: Parity,
    #[serde(default = "default_stop_bits", deserialize_with = "de_stop_bits")]
    pub stop_bits: u8,
    /// `None` (or empty) means the device transmits without being asked.
    #[serde(default)]
    pub poll_command: Option<String>,
    #[serde(default = "default_delimiter", deserialize_with = "de_delimiter")]
    pub delimiter: String,
    #[serde(
        default = "default_read_interval_ms",
        deserialize_with = "de_read_interval_ms"
    )]
    pub read_interval_ms: u64,
    /// Local work-zone membership.
    #[serde(default = "default_true", deserialize_with = "de_working")]
    pub working: bool,
    /// Profile this scale was created from, if any. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
}

impl ScaleConfig {
    /// Build a config from a profile's framing.
    pub fn from_profile(scale_id: &str, port: &str, profile: &ScaleProfile) -> Self {
        Self {
            scale_id: scale_id.to_string(),
            port: port.to_string(),
            baud_rate: profile.baud_rate,
            data_bits: profile.data_bits,
            parity: profile.parity,
            stop_bits: profile.stop_bits,
            poll_command: profile.poll_command.map(str::to_string),
            delimiter: profile.delimiter.to_string(),
            read_interval_ms: DEFAULT_READ_INTERVAL_MS,
            working: true,
            profile_id: Some(profile.id.to_string()),
        }
    }

    /// Poll command, treating an empty string like an absent one.
    pub fn poll_command(&self) -> Option<&str> {
        self.poll_command.as_deref().filter(|c| !c.is_empty())
    }

    pub fn is_continuous(&self) -> bool {
        self.poll_command().is_none()
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
        }
    }

    /// Check framing values; returns the first problem found.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.scale_id.trim().is_empty() {
            eyre::bail!("scale_id must not be empty");
        }
        if self.port.trim().is_empty() {
            eyre::bail!("scale {}: port must not be empty", self.scale_id);
        }
        if self.baud_rate == 0 {
            eyre::bail!("scale {}: baud_rate must be > 0", self.scale_id);
        }
        if !(5..=8).contains(&self.data_bits) {
            eyre::bail!("scale {}: data_bits must be in 5..=8", self.scale_id);
        }
        if !(1..=2).contains(&self.stop_bits) {
            eyre::bail!("scale {}: stop_bits must be 1 or 2", self.scale_id);
        }
        if self.read_interval_ms == 0 {
            eyre::bail!("scale {}: read_interval_ms must be >= 1", self.scale_id);
        }
        if self.delimiter.is_empty() {
            eyre::bail!("scale {}: delimiter must not be empty", self.scale_id);
        }
        Ok(())
    }
}

/// Hand-entered serial parameters (`[scales.custom]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Framing {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_command: Option<String>,
    pub delimiter: String,
    pub read_interval_ms: u64,
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            parity: Parity::None,
            stop_bits: DEFAULT_STOP_BITS,
            poll_command: None,
            delimiter: DEFAULT_DELIMITER.to_string(),
            read_interval_ms: DEFAULT_READ_INTERVAL_MS,
        }
    }
}

/// Where a scale's framing comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleSource {
    Predefined(String),
    Custom(Framing),
}

/// A `[[scales]]` entry as written in the station file.
///
/// Exactly one of `profile` or `custom` must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleEntry {
    pub scale_id: String,
    pub port: String,
    #[serde(default = "default_true")]
    pub working: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Overrides the default read interval of a profile-based scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Framing>,
}

impl ScaleEntry {
    pub fn source(&self) -> eyre::Result<ScaleSource> {
        match (&self.profile, &self.custom) {
            (Some(id), None) => Ok(ScaleSource::Predefined(id.clone())),
            (None, Some(f)) => Ok(ScaleSource::Custom(f.clone())),
            (Some(_), Some(_)) => eyre::bail!(
                "scale {}: set either `profile` or `[custom]`, not both",
                self.scale_id
            ),
            (None, None) => eyre::bail!(
                "scale {}: missing `profile` or `[custom]` framing",
                self.scale_id
            ),
        }
    }

    /// Resolve into a concrete config. Profiles are looked up here, once.
    pub fn resolve(&self) -> eyre::Result<ScaleConfig> {
        let cfg = match self.source()? {
            ScaleSource::Predefined(id) => {
                let profile = profile_by_id(&id).ok_or_else(|| {
                    eyre::eyre!("scale {}: unknown profile '{}'", self.scale_id, id)
                })?;
                let mut cfg = ScaleConfig::from_profile(&self.scale_id, &self.port, profile);
                cfg.working = self.working;
                if let Some(ms) = self.read_interval_ms {
                    cfg.read_interval_ms = ms;
                }
                cfg
            }
            ScaleSource::Custom(f) => ScaleConfig {
                scale_id: self.scale_id.clone(),
                port: self.port.clone(),
                baud_rate: f.baud_rate,
                data_bits: f.data_bits,
                parity: f.parity,
                stop_bits: f.stop_bits,
                poll_command: f.poll_command,
                delimiter: f.delimiter,
                read_interval_ms: self.read_interval_ms.unwrap_or(f.read_interval_ms),
                working: self.working,
                profile_id: None,
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl From<&ScaleConfig> for ScaleEntry {
    /// Keeps the profile reference when the framing still matches it,
    /// otherwise writes the framing out in full.
    fn from(cfg: &ScaleConfig) -> Self {
        let matching_profile = cfg
            .profile_id
            .as_deref()
            .and_then(profile_by_id)
            .filter(|p| {
                let mut expected = ScaleConfig::from_profile(&cfg.scale_id, &cfg.port, p);
                expected.read_interval_ms = cfg.read_interval_ms;
                expected.working = cfg.working;
                &expected == cfg
            });
        match matching_profile {
            Some(p) => ScaleEntry {
                scale_id: cfg.scale_id.clone(),
                port: cfg.port.clone(),
                working: cfg.working,
                profile: Some(p.id.to_string()),
                read_interval_ms: (cfg.read_interval_ms != DEFAULT_READ_INTERVAL_MS)
                    .then_some(cfg.read_interval_ms),
                custom: None,
            },
            None => ScaleEntry {
                scale_id: cfg.scale_id.clone(),
                port: cfg.port.clone(),
                working: cfg.working,
                profile: None,
                read_interval_ms: None,
                custom: Some(Framing {
                    baud_rate: cfg.baud_rate,
                    data_bits: cfg.data_bits,
                    parity: cfg.parity,
                    stop_bits: cfg.stop_bits,
                    poll_command: cfg.poll_command.clone(),
                    delimiter: cfg.delimiter.clone(),
                    read_interval_ms: cfg.read_interval_ms,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_entry(id: &str, port: &str, profile: &str) -> ScaleEntry {
        ScaleEntry {
            scale_id: id.into(),
            port: port.into(),
            working: true,
            profile: Some(profile.into()),
            read_interval_ms: None,
            custom: None,
        }
    }

    #[test]
    fn profile_entry_resolves_framing() {
        let cfg = profile_entry("B1", "/dev/ttyUSB0", "torrey-fs250")
            .resolve()
            .expect("resolve");
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.poll_command(), Some("W\r\n"));
        assert_eq!(cfg.delimiter, "\r");
        assert_eq!(cfg.read_interval_ms, DEFAULT_READ_INTERVAL_MS);
        assert_eq!(cfg.profile_id.as_deref(), Some("torrey-fs250"));
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let err = profile_entry("B1", "/dev/ttyUSB0", "acme-9000")
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("unknown profile"));
    }

    #[test]
    fn both_sources_are_rejected() {
        let mut e = profile_entry("B1", "/dev/ttyUSB0", "torrey-fs250");
        e.custom = Some(Framing::default());
        assert!(e.resolve().is_err());
        e.profile = None;
        e.custom = None;
        assert!(e.resolve().is_err());
    }

    #[test]
    fn empty_poll_command_means_continuous() {
        let mut cfg = ScaleConfig::from_profile(
            "B1",
            "COM3",
            profile_by_id("torrey-l-eq").expect("profile"),
        );
        assert!(!cfg.is_continuous());
        cfg.poll_command = Some(String::new());
        assert!(cfg.is_continuous());
    }

    #[test]
    fn entry_round_trip_keeps_profile_reference() {
        let cfg = profile_entry("B1", "/dev/ttyUSB0", "torrey-fs250")
            .resolve()
            .expect("resolve");
        let entry = ScaleEntry::from(&cfg);
        assert_eq!(entry.profile.as_deref(), Some("torrey-fs250"));
        assert!(entry.custom.is_none());

        let mut edited = cfg.clone();
        edited.baud_rate = 4800;
        let entry = ScaleEntry::from(&edited);
        assert!(entry.profile.is_none());
        assert_eq!(entry.custom.as_ref().map(|f| f.baud_rate), Some(4800));
    }

    #[test]
    fn remote_shape_uses_camel_case_and_defaults() {
        let json = r#"{"scaleId":"B7","port":"/dev/ttyS1","pollCommand":null,"extra":1}"#;
        let cfg: ScaleConfig = serde_json::from_str(json).expect("decode");
        assert_eq!(cfg.scale_id, "B7");
        assert_eq!(cfg.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(cfg.parity, Parity::None);
        assert!(cfg.is_continuous());
        assert!(cfg.working);
    }

    #[test]
    fn remote_shape_treats_unset_framing_as_defaults() {
        let json = r#"{
            "scaleId": "B1", "port": "COM3",
            "baudRate": null, "dataBits": 0, "parity": null, "stopBits": null,
            "delimiter": "", "readIntervalMs": 0, "working": null
        }"#;
        let cfg: ScaleConfig = serde_json::from_str(json).expect("decode");
        assert_eq!(cfg.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(cfg.data_bits, DEFAULT_DATA_BITS);
        assert_eq!(cfg.parity, Parity::None);
        assert_eq!(cfg.stop_bits, DEFAULT_STOP_BITS);
        assert_eq!(cfg.delimiter, DEFAULT_DELIMITER);
        assert_eq!(cfg.read_interval_ms, DEFAULT_READ_INTERVAL_MS);
        assert!(cfg.working);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn remote_shape_keeps_explicit_framing() {
        let json = r#"{"scaleId":"B1","port":"COM3","baudRate":4800,"dataBits":7,"parity":"even","readIntervalMs":50}"#;
        let cfg: ScaleConfig = serde_json::from_str(json).expect("decode");
        assert_eq!((cfg.baud_rate, cfg.data_bits, cfg.read_interval_ms), (4800, 7, 50));
        assert_eq!(cfg.parity, Parity::Even);
    }
}
