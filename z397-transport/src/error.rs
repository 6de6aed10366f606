//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Telnet reset failed: {0}")]
    TelnetResetFailed(String),

    #[error("Telnet reset timed out")]
    TelnetResetTimedOut,
}

impl Error {
    /// Check if the link is gone after this error
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Io(_))
    }
}
