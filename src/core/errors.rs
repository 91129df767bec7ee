use crate::core::kernel::codec::FrameError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Not connected to gateway")]
    NotConnected,

    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
