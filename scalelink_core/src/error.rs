use thiserror::Error;

/// Outcome of a failed exchange with the remote API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited (429)")]
    RateLimited,
    #[error("server responded {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status { status: u16, message: Option<String> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Why a serial session ended.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("could not open port: {0}")]
    Open(String),
    #[error("serial read failed: {0}")]
    Read(String),
    #[error("serial write failed: {0}")]
    Write(String),
    #[error("port closed")]
    Closed,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing remote api client")]
    MissingApi,
    #[error("missing serial opener")]
    MissingOpener,
    #[error("missing station config")]
    MissingConfig,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Why a single test reading failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("could not open port: {0}")]
    Open(String),
    #[error("could not send poll command: {0}")]
    Write(String),
    #[error("serial read failed: {0}")]
    Read(String),
    #[error("data received but no weight could be parsed: {raw:?}")]
    Unparsable { raw: String },
    #[error("timeout: no response")]
    Timeout,
    #[error("port closed before a line was received")]
    Closed,
}
