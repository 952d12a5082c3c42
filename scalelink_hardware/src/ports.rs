//! Serial port enumeration.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

/// Serial ports known to the OS. Enumeration failures are logged and yield
/// an empty list.
#[cfg(feature = "hardware")]
pub fn list_ports() -> Vec<PortInfo> {
    use tokio_serial::SerialPortType;

    let ports = match tokio_serial::available_ports() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "listing serial ports failed");
            return Vec::new();
        }
    };
    let out: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                path: p.port_name,
                manufacturer: usb.manufacturer,
                serial_number: usb.serial_number,
            },
            _ => PortInfo {
                path: p.port_name,
                manufacturer: None,
                serial_number: None,
            },
        })
        .collect();
    tracing::info!(count = out.len(), "serial ports detected");
    for p in &out {
        tracing::debug!(
            path = %p.path,
            manufacturer = p.manufacturer.as_deref().unwrap_or(""),
            serial = p.serial_number.as_deref().unwrap_or(""),
            "port"
        );
    }
    out
}

#[cfg(not(feature = "hardware"))]
pub fn list_ports() -> Vec<PortInfo> {
    tracing::warn!("serial support not compiled in; no ports listed");
    Vec::new()
}
