//! Serial device access for the scale bridge.
//!
//! - `SystemSerialOpener`: real ports via `tokio-serial` (feature `hardware`)
//! - `list_ports`: OS port enumeration
//! - `SimulatedOpener`: scripted in-memory devices for `--simulate` and tests
pub mod error;
pub mod ports;
pub mod serial;
pub mod sim;

pub use error::HwError;
pub use ports::{PortInfo, list_ports};
pub use serial::SystemSerialOpener;
pub use sim::{SimMode, SimScript, SimulatedOpener};
