//! The configured scale list and its edit operations.
//!
//! Every mutation checks the uniqueness of `scale_id` and `port` first and
//! leaves the set untouched when a check fails.

use scalelink_traits::Parity;
use thiserror::Error;

use crate::scale::ScaleConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScaleSetError {
    #[error("a scale with id {0} already exists")]
    DuplicateId(String),
    #[error("a scale is already configured on port {0}")]
    DuplicatePort(String),
    #[error("port {port} is already used by scale {by}")]
    PortInUse { port: String, by: String },
    #[error("unknown scale {0}")]
    UnknownScale(String),
}

/// Partial update for `ScaleSet::edit`; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleEdit {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub data_bits: Option<u8>,
    pub parity: Option<Parity>,
    pub stop_bits: Option<u8>,
    /// `Some(None)` clears the poll command (continuous device).
    pub poll_command: Option<Option<String>>,
    pub delimiter: Option<String>,
    pub read_interval_ms: Option<u64>,
    pub working: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleSet {
    scales: Vec<ScaleConfig>,
}

impl ScaleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, rejecting the first duplicate id or port.
    pub fn from_configs(
        configs: impl IntoIterator<Item = ScaleConfig>,
    ) -> Result<Self, ScaleSetError> {
        let mut set = Self::new();
        for cfg in configs {
            set.add(cfg)?;
        }
        Ok(set)
    }

    pub fn add(&mut self, cfg: ScaleConfig) -> Result<(), ScaleSetError> {
        if self.get(&cfg.scale_id).is_some() {
            return Err(ScaleSetError::DuplicateId(cfg.scale_id));
        }
        if self.scales.iter().any(|s| s.port == cfg.port) {
            return Err(ScaleSetError::DuplicatePort(cfg.port));
        }
        self.scales.push(cfg);
        Ok(())
    }

    pub fn edit(&mut self, scale_id: &str, edit: ScaleEdit) -> Result<(), ScaleSetError> {
        let idx = self
            .index_of(scale_id)
            .ok_or_else(|| ScaleSetError::UnknownScale(scale_id.to_string()))?;

        if let Some(port) = &edit.port
            && port != &self.scales[idx].port
            && let Some(other) = self
                .scales
                .iter()
                .enumerate()
                .find(|(i, s)| *i != idx && &s.port == port)
                .map(|(_, s)| s)
        {
            return Err(ScaleSetError::PortInUse {
                port: port.clone(),
                by: other.scale_id.clone(),
            });
        }

        let s = &mut self.scales[idx];
        if let Some(v) = edit.port {
            s.port = v;
        }
        if let Some(v) = edit.baud_rate {
            s.baud_rate = v;
        }
        if let Some(v) = edit.data_bits {
            s.data_bits = v;
        }
        if let Some(v) = edit.parity {
            s.parity = v;
        }
        if let Some(v) = edit.stop_bits {
            s.stop_bits = v;
        }
        if let Some(v) = edit.poll_command {
            s.poll_command = v;
        }
        if let Some(v) = edit.delimiter {
            s.delimiter = v;
        }
        if let Some(v) = edit.read_interval_ms {
            s.read_interval_ms = v;
        }
        if let Some(v) = edit.working {
            s.working = v;
        }
        Ok(())
    }

    pub fn remove(&mut self, scale_id: &str) -> Result<ScaleConfig, ScaleSetError> {
        let idx = self
            .index_of(scale_id)
            .ok_or_else(|| ScaleSetError::UnknownScale(scale_id.to_string()))?;
        Ok(self.scales.remove(idx))
    }

    pub fn set_working(&mut self, scale_id: &str, working: bool) -> Result<(), ScaleSetError> {
        self.edit(
            scale_id,
            ScaleEdit {
                working: Some(working),
                ..ScaleEdit::default()
            },
        )
    }

    pub fn get(&self, scale_id: &str) -> Option<&ScaleConfig> {
        self.scales.iter().find(|s| s.scale_id == scale_id)
    }

    /// Scales currently in the work zone.
    pub fn working(&self) -> impl Iterator<Item = &ScaleConfig> {
        self.scales.iter().filter(|s| s.working)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScaleConfig> {
        self.scales.iter()
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    pub fn into_vec(self) -> Vec<ScaleConfig> {
        self.scales
    }

    fn index_of(&self, scale_id: &str) -> Option<usize> {
        self.scales.iter().position(|s| s.scale_id == scale_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::profile_by_id;

    fn scale(id: &str, port: &str) -> ScaleConfig {
        ScaleConfig::from_profile(id, port, profile_by_id("torrey-fs250").expect("profile"))
    }

    #[test]
    fn add_rejects_duplicate_id_without_mutation() {
        let mut set = ScaleSet::from_configs([scale("B1", "/dev/ttyUSB0")]).expect("set");
        let before = set.clone();
        let err = set.add(scale("B1", "/dev/ttyUSB1")).unwrap_err();
        assert_eq!(err, ScaleSetError::DuplicateId("B1".into()));
        assert!(err.to_string().contains("already exists"));
        assert_eq!(set, before);
    }

    #[test]
    fn add_rejects_duplicate_port_without_mutation() {
        let mut set = ScaleSet::from_configs([scale("B1", "/dev/ttyUSB0")]).expect("set");
        let before = set.clone();
        let err = set.add(scale("B2", "/dev/ttyUSB0")).unwrap_err();
        assert_eq!(err, ScaleSetError::DuplicatePort("/dev/ttyUSB0".into()));
        assert_eq!(set, before);
    }

    #[test]
    fn edit_checks_port_conflicts() {
        let mut set =
            ScaleSet::from_configs([scale("B1", "/dev/ttyUSB0"), scale("B2", "/dev/ttyUSB1")])
                .expect("set");
        let err = set
            .edit(
                "B2",
                ScaleEdit {
                    port: Some("/dev/ttyUSB0".into()),
                    ..ScaleEdit::default()
                },
            )
            .unwrap_err();
        assert_eq!(
            err,
            ScaleSetError::PortInUse {
                port: "/dev/ttyUSB0".into(),
                by: "B1".into()
            }
        );

        // Re-stating the current port is not a conflict.
        set.edit(
            "B2",
            ScaleEdit {
                port: Some("/dev/ttyUSB1".into()),
                baud_rate: Some(4800),
                poll_command: Some(None),
                ..ScaleEdit::default()
            },
        )
        .expect("edit");
        let b2 = set.get("B2").expect("B2");
        assert_eq!(b2.baud_rate, 4800);
        assert!(b2.is_continuous());
    }

    #[test]
    fn working_filters_the_zone() {
        let mut set =
            ScaleSet::from_configs([scale("B1", "/dev/ttyUSB0"), scale("B2", "/dev/ttyUSB1")])
                .expect("set");
        set.set_working("B1", false).expect("toggle");
        let ids: Vec<_> = set.working().map(|s| s.scale_id.as_str()).collect();
        assert_eq!(ids, ["B2"]);
        assert!(matches!(
            set.set_working("B9", true),
            Err(ScaleSetError::UnknownScale(_))
        ));
    }

    #[test]
    fn remove_unknown_is_an_error() {
        let mut set = ScaleSet::from_configs([scale("B1", "/dev/ttyUSB0")]).expect("set");
        assert!(set.remove("B2").is_err());
        assert_eq!(set.remove("B1").expect("removed").scale_id, "B1");
        assert!(set.is_empty());
    }
}
