//! One-shot test readings and profile auto-detection.

use std::time::Duration;

use scalelink_config::{ScaleConfig, detectable_profiles};
use scalelink_traits::SerialOpener;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::ProbeError;
use crate::lines::LineReader;
use crate::parser::parse_weight;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReading {
    pub weight: f64,
    /// First line received, trimmed.
    pub raw: String,
}

/// A port that answered with a parsable weight under `profile_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detected {
    pub port: String,
    pub profile_id: &'static str,
    pub weight: f64,
    pub raw: String,
}

/// Open `cfg.port`, send the poll command if any and wait for one line.
/// The port is closed again before returning.
pub async fn probe(
    opener: &dyn SerialOpener,
    cfg: &ScaleConfig,
    timeout: Duration,
) -> Result<ProbeReading, ProbeError> {
    tokio::time::timeout(timeout, read_one(opener, cfg))
        .await
        .unwrap_or(Err(ProbeError::Timeout))
}

async fn read_one(opener: &dyn SerialOpener, cfg: &ScaleConfig) -> Result<ProbeReading, ProbeError> {
    let stream = opener
        .open(&cfg.serial_settings())
        .await
        .map_err(|e| ProbeError::Open(e.to_string()))?;
    let (rd, mut wr) = tokio::io::split(stream);

    if let Some(cmd) = cfg.poll_command() {
        let write = async {
            wr.write_all(cmd.as_bytes()).await?;
            wr.flush().await
        };
        write.await.map_err(|e| ProbeError::Write(e.to_string()))?;
    }

    let mut lines = LineReader::new(rd, &cfg.delimiter);
    match lines.next_line().await {
        Ok(Some(line)) => {
            let raw = line.trim().to_string();
            match parse_weight(&line) {
                Some(weight) => Ok(ProbeReading { weight, raw }),
                None => Err(ProbeError::Unparsable { raw }),
            }
        }
        Ok(None) => Err(ProbeError::Closed),
        Err(e) => Err(ProbeError::Read(e.to_string())),
    }
}

/// Try every detectable profile on every port, keeping the first profile
/// that yields a reading per port.
pub async fn auto_detect(
    opener: &dyn SerialOpener,
    ports: &[String],
    timeout: Duration,
) -> Vec<Detected> {
    let mut found = Vec::new();
    for port in ports {
        for profile in detectable_profiles() {
            tracing::info!(port = %port, profile = profile.id, "probing");
            let cfg = ScaleConfig::from_profile("probe", port, profile);
            match probe(opener, &cfg, timeout).await {
                Ok(reading) => {
                    tracing::info!(port = %port, profile = profile.id, weight = reading.weight, "scale detected");
                    found.push(Detected {
                        port: port.clone(),
                        profile_id: profile.id,
                        weight: reading.weight,
                        raw: reading.raw,
                    });
                    break;
                }
                Err(e) => tracing::debug!(port = %port, profile = profile.id, error = %e, "no match"),
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedOpener;
    use scalelink_config::profile_by_id;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn polled(port: &str) -> ScaleConfig {
        ScaleConfig::from_profile("probe", port, profile_by_id("torrey-fs250").expect("profile"))
    }

    /// Answer one `W\r\n` with `reply`.
    fn answer(mut device: DuplexStream, reply: &'static [u8]) -> tokio::task::JoinHandle<DuplexStream> {
        tokio::spawn(async move {
            let mut cmd = [0u8; 3];
            device.read_exact(&mut cmd).await.expect("poll");
            assert_eq!(&cmd, b"W\r\n");
            device.write_all(reply).await.expect("reply");
            device
        })
    }

    #[tokio::test]
    async fn polled_device_answers() {
        let opener = ScriptedOpener::new();
        let dev = answer(opener.push_duplex(), b"  +012.50 kg \r");
        let r = probe(&opener, &polled("COM3"), PROBE_TIMEOUT).await.expect("reading");
        assert_eq!(r.weight, 12.5);
        assert_eq!(r.raw, "+012.50 kg");
        dev.await.expect("device");
    }

    #[tokio::test]
    async fn garbage_is_reported_with_raw_text() {
        let opener = ScriptedOpener::new();
        let _dev = answer(opener.push_duplex(), b"ERR\r");
        let err = probe(&opener, &polled("COM3"), PROBE_TIMEOUT).await.unwrap_err();
        assert_eq!(err, ProbeError::Unparsable { raw: "ERR".into() });
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let opener = ScriptedOpener::new();
        opener.push_error("permission denied");
        let err = probe(&opener, &polled("COM3"), PROBE_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ProbeError::Open(m) if m.contains("permission denied")));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out() {
        let opener = ScriptedOpener::new();
        let _device = opener.push_duplex();
        let err = probe(&opener, &polled("COM3"), PROBE_TIMEOUT).await.unwrap_err();
        assert_eq!(err, ProbeError::Timeout);
    }

    #[tokio::test]
    async fn auto_detect_stops_at_first_matching_profile() {
        let opener = ScriptedOpener::new();
        // COM3: torrey-fs250 fails to open, torrey-l-eq answers
        opener.push_error("busy");
        let _dev = answer(opener.push_duplex(), b"3.25\r");
        // COM4: nothing opens for any profile
        let ports = vec!["COM3".to_string(), "COM4".to_string()];

        let found = auto_detect(&opener, &ports, PROBE_TIMEOUT).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].port, "COM3");
        assert_eq!(found[0].profile_id, "torrey-l-eq");
        assert_eq!(found[0].weight, 3.25);
        // 2 attempts on COM3, then all 3 detectable profiles on COM4
        assert_eq!(opener.open_count(), 5);
        assert_eq!(opener.opened_ports()[2..], ["COM4", "COM4", "COM4"]);
    }
}
