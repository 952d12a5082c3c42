//! Real serial ports through `tokio-serial`.

use async_trait::async_trait;
use scalelink_traits::{BoxedSerial, SerialOpener, SerialSettings};

use crate::error::HwError;

/// Opens OS serial devices. Without the `hardware` feature every open fails
/// with `HwError::Unavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerialOpener;

impl SystemSerialOpener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SerialOpener for SystemSerialOpener {
    async fn open(
        &self,
        settings: &SerialSettings,
    ) -> Result<BoxedSerial, Box<dyn std::error::Error + Send + Sync>> {
        open_port(settings).map_err(Into::into)
    }
}

#[cfg(feature = "hardware")]
fn open_port(s: &SerialSettings) -> crate::error::Result<BoxedSerial> {
    use tokio_serial::SerialPortBuilderExt;

    let stream = tokio_serial::new(&s.port, s.baud_rate)
        .data_bits(data_bits(s.data_bits)?)
        .parity(parity(s.parity))
        .stop_bits(stop_bits(s.stop_bits)?)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| HwError::Serial(format!("{}: {e}", s.port)))?;
    Ok(Box::new(stream))
}

#[cfg(not(feature = "hardware"))]
fn open_port(s: &SerialSettings) -> crate::error::Result<BoxedSerial> {
    tracing::warn!(port = %s.port, "serial support not compiled in");
    Err(HwError::Unavailable)
}

#[cfg(feature = "hardware")]
fn data_bits(n: u8) -> crate::error::Result<tokio_serial::DataBits> {
    use tokio_serial::DataBits;
    match n {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(HwError::Framing(format!("data bits {other}"))),
    }
}

#[cfg(feature = "hardware")]
fn stop_bits(n: u8) -> crate::error::Result<tokio_serial::StopBits> {
    match n {
        1 => Ok(tokio_serial::StopBits::One),
        2 => Ok(tokio_serial::StopBits::Two),
        other => Err(HwError::Framing(format!("stop bits {other}"))),
    }
}

#[cfg(feature = "hardware")]
fn parity(p: scalelink_traits::Parity) -> tokio_serial::Parity {
    match p {
        scalelink_traits::Parity::None => tokio_serial::Parity::None,
        scalelink_traits::Parity::Even => tokio_serial::Parity::Even,
        scalelink_traits::Parity::Odd => tokio_serial::Parity::Odd,
    }
}

#[cfg(all(test, feature = "hardware"))]
mod tests {
    use super::*;

    #[test]
    fn framing_conversions() {
        assert!(matches!(data_bits(7), Ok(tokio_serial::DataBits::Seven)));
        assert!(matches!(data_bits(9), Err(HwError::Framing(_))));
        assert!(matches!(stop_bits(2), Ok(tokio_serial::StopBits::Two)));
        assert!(matches!(stop_bits(0), Err(HwError::Framing(_))));
    }
}
