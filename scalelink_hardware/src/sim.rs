//! In-memory scale devices for demos and tests.
//!
//! Each open spawns a small device task on the far end of a duplex pipe. A
//! polled device answers every complete poll command with the next weight
//! line; a continuous device writes one line per period. The task exits when
//! the host side is dropped.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scalelink_traits::{BoxedSerial, SerialOpener, SerialSettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::error::HwError;

const PIPE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub enum SimMode {
    /// Answer each occurrence of `command`.
    Polled { command: String },
    /// Transmit unsolicited every `period`.
    Continuous { period: Duration },
}

/// Behaviour of one simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct SimScript {
    pub mode: SimMode,
    pub delimiter: String,
    /// Weights (kg) reported in order, cycling.
    pub weights: Vec<f64>,
}

impl SimScript {
    pub fn polled(command: &str, delimiter: &str, weights: Vec<f64>) -> Self {
        Self {
            mode: SimMode::Polled {
                command: command.to_string(),
            },
            delimiter: delimiter.to_string(),
            weights,
        }
    }

    pub fn continuous(period: Duration, delimiter: &str, weights: Vec<f64>) -> Self {
        Self {
            mode: SimMode::Continuous { period },
            delimiter: delimiter.to_string(),
            weights,
        }
    }

    /// A load placed on an empty platform, swinging a little, then holding.
    pub fn demo_weights() -> Vec<f64> {
        let mut w = vec![0.0, 0.0, 0.0, 3.21, 9.87, 12.61, 12.47, 12.52];
        w.extend(std::iter::repeat_n(12.5, 40));
        w.extend([6.1, 0.4, 0.0]);
        w.extend(std::iter::repeat_n(0.0, 20));
        w
    }

    fn line(&self, i: usize) -> String {
        let w = if self.weights.is_empty() {
            0.0
        } else {
            self.weights[i % self.weights.len()]
        };
        format!("{w:>9.3} kg{}", self.delimiter)
    }
}

/// Opener serving scripted devices keyed by port path.
#[derive(Debug, Default)]
pub struct SimulatedOpener {
    devices: Mutex<HashMap<String, SimScript>>,
}

impl SimulatedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach (or replace) the device behind `port`.
    pub fn attach(&self, port: &str, script: SimScript) {
        if let Ok(mut d) = self.devices.lock() {
            d.insert(port.to_string(), script);
        }
    }

    pub fn detach(&self, port: &str) {
        if let Ok(mut d) = self.devices.lock() {
            d.remove(port);
        }
    }

    pub fn ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self
            .devices
            .lock()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default();
        ports.sort();
        ports
    }
}

#[async_trait]
impl SerialOpener for SimulatedOpener {
    async fn open(
        &self,
        settings: &SerialSettings,
    ) -> Result<BoxedSerial, Box<dyn std::error::Error + Send + Sync>> {
        let script = self
            .devices
            .lock()
            .ok()
            .and_then(|d| d.get(&settings.port).cloned())
            .ok_or_else(|| HwError::NoSuchPort(settings.port.clone()))?;

        let (host, device) = tokio::io::duplex(PIPE_CAPACITY);
        tracing::debug!(port = %settings.port, mode = ?script.mode, "simulated device opened");
        tokio::spawn(serve(device, script));
        Ok(Box::new(host))
    }
}

async fn serve(dev: DuplexStream, script: SimScript) {
    match script.mode.clone() {
        SimMode::Polled { command } if !command.is_empty() => {
            serve_polled(dev, command.into_bytes(), &script).await;
        }
        SimMode::Polled { .. } => {
            serve_continuous(dev, Duration::from_millis(200), &script).await;
        }
        SimMode::Continuous { period } => serve_continuous(dev, period, &script).await,
    }
}

async fn serve_polled(mut dev: DuplexStream, cmd: Vec<u8>, script: &SimScript) {
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 64];
    let mut i = 0;
    loop {
        let n = match dev.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&chunk[..n]);
        while let Some(pos) = pending.windows(cmd.len()).position(|w| w == cmd.as_slice()) {
            pending.drain(..pos + cmd.len());
            if dev.write_all(script.line(i).as_bytes()).await.is_err() {
                return;
            }
            i += 1;
        }
        if pending.len() > PIPE_CAPACITY {
            pending.clear();
        }
    }
}

async fn serve_continuous(mut dev: DuplexStream, period: Duration, script: &SimScript) {
    let mut tick = tokio::time::interval(period.max(Duration::from_millis(1)));
    for i in 0.. {
        tick.tick().await;
        if dev.write_all(script.line(i).as_bytes()).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![12.5, -0.25], 0, "   12.500 kg\r")]
    #[case(vec![12.5, -0.25], 1, "   -0.250 kg\r")]
    #[case(vec![12.5, -0.25], 2, "   12.500 kg\r")]
    #[case(vec![], 5, "    0.000 kg\r")]
    fn formats_weight_lines(#[case] weights: Vec<f64>, #[case] i: usize, #[case] expected: &str) {
        let s = SimScript::polled("W\r\n", "\r", weights);
        assert_eq!(s.line(i), expected);
    }

    #[test]
    fn demo_weights_settle_on_a_load() {
        let w = SimScript::demo_weights();
        assert!(w.windows(5).any(|win| win.iter().all(|&x| x == 12.5)));
    }
}
