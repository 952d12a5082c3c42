//! Content fingerprint of a scale list, used to skip no-op reconfigurations.
//!
//! Only fields that change how a device is opened or read are hashed:
//! id, port, framing, read interval, poll command and delimiter. The list is
//! ordered by `scale_id` first, so server-side reordering is not a change.

use std::fmt;

use scalelink_config::ScaleConfig;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough for logs
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}

pub fn fingerprint<'a>(scales: impl IntoIterator<Item = &'a ScaleConfig>) -> Fingerprint {
    let mut sorted: Vec<&ScaleConfig> = scales.into_iter().collect();
    sorted.sort_by(|a, b| a.scale_id.cmp(&b.scale_id));

    let mut h = Sha256::new();
    h.update((sorted.len() as u64).to_le_bytes());
    for s in sorted {
        field(&mut h, s.scale_id.as_bytes());
        field(&mut h, s.port.as_bytes());
        h.update(s.baud_rate.to_le_bytes());
        h.update([s.data_bits, s.stop_bits]);
        field(&mut h, s.parity.to_string().as_bytes());
        h.update(s.read_interval_ms.to_le_bytes());
        match s.poll_command() {
            Some(cmd) => {
                h.update([1]);
                field(&mut h, cmd.as_bytes());
            }
            None => h.update([0]),
        }
        field(&mut h, s.delimiter.as_bytes());
    }
    Fingerprint(hex::encode(h.finalize()))
}

// Length prefix keeps ("ab","c") distinct from ("a","bc").
fn field(h: &mut Sha256, bytes: &[u8]) {
    h.update((bytes.len() as u64).to_le_bytes());
    h.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use scalelink_config::profile_by_id;
    use scalelink_traits::Parity;

    fn scale(id: &str, port: &str) -> ScaleConfig {
        ScaleConfig::from_profile(id, port, profile_by_id("torrey-fs250").expect("profile"))
    }

    fn pair() -> Vec<ScaleConfig> {
        vec![scale("B1", "/dev/ttyUSB0"), scale("B2", "/dev/ttyUSB1")]
    }

    #[test]
    fn order_does_not_matter() {
        let a = pair();
        let mut b = pair();
        b.reverse();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn untracked_fields_do_not_matter() {
        let a = pair();
        let mut b = pair();
        b[0].working = false;
        b[1].profile_id = None;
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn empty_poll_equals_absent_poll() {
        let mut a = pair();
        let mut b = pair();
        a[0].poll_command = None;
        b[0].poll_command = Some(String::new());
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn each_tracked_field_changes_the_hash() {
        let base = fingerprint(&pair());
        let edits: Vec<fn(&mut ScaleConfig)> = vec![
            |s| s.scale_id = "B9".into(),
            |s| s.port = "/dev/ttyUSB7".into(),
            |s| s.baud_rate = 4800,
            |s| s.data_bits = 7,
            |s| s.parity = Parity::Even,
            |s| s.stop_bits = 2,
            |s| s.read_interval_ms = 500,
            |s| s.poll_command = Some("P\r\n".into()),
            |s| s.poll_command = None,
            |s| s.delimiter = "\r\n".into(),
        ];
        for (i, edit) in edits.into_iter().enumerate() {
            let mut scales = pair();
            edit(&mut scales[0]);
            assert_ne!(fingerprint(&scales), base, "edit #{i} not detected");
        }
    }

    #[test]
    fn display_is_short() {
        let fp = fingerprint(&pair());
        assert_eq!(fp.as_str().len(), 64);
        assert_eq!(fp.to_string().len(), 12);
    }

    proptest! {
        #[test]
        fn any_permutation_hashes_the_same(
            ids in proptest::collection::hash_set("[A-Z][0-9]{1,2}", 1..6),
            rot in 0usize..6,
        ) {
            let scales: Vec<ScaleConfig> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| scale(id, &format!("/dev/ttyUSB{i}")))
                .collect();
            let mut rotated = scales.clone();
            let len = rotated.len();
            rotated.rotate_left(rot % len);
            prop_assert_eq!(fingerprint(&scales), fingerprint(&rotated));
        }
    }
}
