//! Serial device seam: framing parameters and an async opener.
//!
//! Implementations live in `scalelink_hardware` (real ports via tokio-serial
//! and an in-memory simulated device). The core only sees a boxed byte stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Parity bit setting for a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Parity::None => "none",
            Parity::Even => "even",
            Parity::Odd => "odd",
        };
        f.write_str(s)
    }
}

/// Everything needed to open one serial device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// OS port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    /// 5..=8
    pub data_bits: u8,
    pub parity: Parity,
    /// 1 or 2
    pub stop_bits: u8,
}

/// Byte stream of an open serial device.
pub trait SerialStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> SerialStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedSerial = Box<dyn SerialStream>;

/// Opens serial devices. Dropping the returned stream closes the device.
#[async_trait]
pub trait SerialOpener: Send + Sync {
    async fn open(
        &self,
        settings: &SerialSettings,
    ) -> Result<BoxedSerial, Box<dyn std::error::Error + Send + Sync>>;
}
