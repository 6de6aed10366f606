//! Error types for z397-core

use z397_types::CommandKind;

use crate::device_error::DeviceError;

/// Result type alias for z397 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Packet is too short to be valid
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// Checksum verification failed
    #[error("Checksum error for incoming packet (type: 0x{frame_type:02x}, id: {id})")]
    ChecksumMismatch {
        frame_type: u8,
        id: u8,
    },

    /// Frame type byte is not one the protocol defines
    #[error("Unknown frame type: 0x{0:02x}")]
    UnknownFrameType(u8),

    /// Decoded packet matches no known response layout
    #[error("Unknown response structure received (type: 0x{frame_type:02x}, cmdByte: {opcode:?})")]
    UnknownResponseStructure {
        frame_type: u8,
        opcode: Option<u8>,
    },

    /// Controller is absent from the bus
    #[error("Controller not found or invalid response (addr: {addr})")]
    ControllerNotFound {
        addr: u8,
    },

    /// Clock registers do not form a calendar date
    #[error("Invalid date components (addr: {addr})")]
    InvalidDate {
        addr: u8,
    },

    /// Converter reported a fault frame
    #[error("Protocol error: {0}")]
    Device(#[from] DeviceError),

    /// Command needs a controller address
    #[error("Address required for {0}")]
    AddressRequired(CommandKind),

    /// Address lies outside the bus range
    #[error("Address {addr} is out of range for {command}")]
    AddressInvalid {
        command: CommandKind,
        addr: u32,
    },

    /// Command does not travel over the bus
    #[error("{0} is not a bus command")]
    NotBusCommand(CommandKind),

    /// Payload too large
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
}

impl Error {
    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::Device(DeviceError::Crc)
        )
    }
}
