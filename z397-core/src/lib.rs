//! # z397-core
//!
//! Core protocol implementation for the Z397 access-control bus converter.
//!
//! This crate provides the low-level protocol primitives:
//! - Escape packing and the frame envelope
//! - Checksum calculation
//! - Stream framing over fragmented reads
//! - Command encoding and response decoding
//! - Device fault codes and connection state

pub mod bcd;
pub mod checksum;
pub mod codec;
pub mod command;
pub mod constants;
pub mod device_error;
pub mod error;
pub mod frame;
pub mod response;
pub mod session;

pub use codec::DecodedPacket;
pub use command::{FrameType, Opcode};
pub use device_error::DeviceError;
pub use error::{Error, Result};
pub use frame::{FrameReceiver, Inbound, RawFrame};
pub use response::Reply;
pub use session::Session;

/// Default TCP port of the converter's data channel
pub const DEFAULT_PORT: u16 = 1000;

/// Largest frame accepted before the receiver resynchronises
pub const MAX_FRAME_SIZE: usize = 1024;

/// Largest data block an envelope can describe (length byte minus header)
pub const MAX_DATA_SIZE: usize = u8::MAX as usize - 2;
