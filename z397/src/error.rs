//! High-level error types

use z397_types::CommandKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] z397_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] z397_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] z397_types::Error),

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Already disconnected")]
    AlreadyDisconnected,

    #[error("Not connected")]
    NotConnected,

    #[error("ID {0} is out of range")]
    IdOutOfRange(u32),

    #[error("Packet ID collision for {0}. Try again later.")]
    IdCollision(u8),

    #[error("Request timeout for ID {id} (command: {command})")]
    RequestTimeout { id: u8, command: CommandKind },

    #[error("Unexpected {actual} response for ID {id} (expected {expected})")]
    UnexpectedResponse {
        id: u8,
        expected: CommandKind,
        actual: CommandKind,
    },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),
}

impl Error {
    /// Check if sending the same request again might succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            Self::RequestTimeout { .. } | Self::IdCollision(_) => true,
            _ => false,
        }
    }

    /// Check if the link has to be opened again before the next request
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::NotConnected | Self::ConnectionLost(_) => true,
            Self::Transport(e) => e.is_disconnect(),
            _ => false,
        }
    }
}
