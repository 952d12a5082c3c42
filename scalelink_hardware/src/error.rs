use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial error: {0}")]
    Serial(String),
    #[error("unsupported framing: {0}")]
    Framing(String),
    #[error("no device on port {0}")]
    NoSuchPort(String),
    #[error("serial support not compiled in (enable the `hardware` feature)")]
    Unavailable,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
