pub mod clock;
pub mod serial;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use serial::{BoxedSerial, Parity, SerialOpener, SerialSettings, SerialStream};
