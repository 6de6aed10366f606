//! Wire frame types, opcodes and command encoding

use std::fmt;

use bytes::Bytes;
use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::trace;
use z397_types::CommandKind;

use crate::{
    bcd, codec,
    constants::{clock, LICENSE},
    error::{Error, Result},
};

/// Frame type, doubling as the frame's start byte
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Converter service traffic
    Service = 0x1e,

    /// Bus-level queries answered by the converter (scan, serial number)
    Bus = 0x20,

    /// Requests relayed to a controller (memory access, door)
    Controller = 0x1f,

    /// Fault report from the converter
    Fault = 0x02,
}

impl FrameType {
    /// Map a start byte to its frame type
    pub fn from_start_byte(byte: u8) -> Option<Self> {
        match byte {
            0x1e => Some(Self::Service),
            0x20 => Some(Self::Bus),
            0x1f => Some(Self::Controller),
            0x02 => Some(Self::Fault),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Service => "SERVICE",
            Self::Bus => "BUS",
            Self::Controller => "CONTROLLER",
            Self::Fault => "FAULT",
        }
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> u8 {
        frame_type as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_start_byte(value).ok_or(Error::UnknownFrameType(value))
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02x})", self.name(), *self as u8)
    }
}

/// Operation byte at payload offset 4
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Bus query (scan or serial number)
    Query = 0x00,

    /// Read controller memory
    ReadMemory = 0x02,

    /// Write controller memory
    WriteMemory = 0x03,

    /// Pulse the door lock
    OpenDoor = 0x07,
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}

/// Resolve the address a command needs
///
/// Addresses outside `0x02..=0x69` are rejected the same way a missing one is,
/// with the offending value kept in the error.
pub fn require_address(command: CommandKind, addr: Option<u32>) -> Result<u8> {
    match addr {
        None => Err(Error::AddressRequired(command)),
        Some(addr) if z397_types::request::ADDRESS_RANGE.contains(&addr) => Ok(addr as u8),
        Some(addr) => Err(Error::AddressInvalid { command, addr }),
    }
}

/// Build the complete wire frame for a bus command
///
/// `now` is only read by `set_time`, which writes it into the controller
/// clock. Lifecycle commands (connect, disconnect, reset) never reach the wire
/// and are rejected.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDateTime;
/// use z397_core::command;
/// use z397_types::CommandKind;
///
/// let frame = command::build(CommandKind::Scan, 1, None, NaiveDateTime::default()).unwrap();
/// assert_eq!(frame[0], 0x20);
/// assert_eq!(frame[frame.len() - 1], 0x0d);
/// ```
pub fn build(command: CommandKind, id: u8, addr: Option<u32>, now: NaiveDateTime) -> Result<Bytes> {
    let (frame_type, data) = match command {
        CommandKind::Scan => scan(id),
        CommandKind::GetSn => serial_number(id, require_address(command, addr)?),
        CommandKind::Open => open(id, require_address(command, addr)?),
        CommandKind::GetTime => get_time(id, require_address(command, addr)?),
        CommandKind::SetTime => set_time(id, require_address(command, addr)?, &now),
        CommandKind::Connect | CommandKind::Disconnect | CommandKind::Reset => {
            return Err(Error::NotBusCommand(command));
        }
    };

    trace!(
        command = command.name(),
        id,
        data = hex::encode(&data),
        "Encoding command"
    );

    codec::assemble(frame_type, &data)
}

/// `[license, id, 0x00, 0x00, 0x00, 0x00]` on the bus channel
pub fn scan(id: u8) -> (FrameType, Vec<u8>) {
    (
        FrameType::Bus,
        vec![LICENSE, id, Opcode::Query.into(), 0x00, 0x00, 0x00],
    )
}

/// `[license, id, 0x00, addr, 0x00, 0x00]` on the bus channel
pub fn serial_number(id: u8, addr: u8) -> (FrameType, Vec<u8>) {
    (
        FrameType::Bus,
        vec![LICENSE, id, Opcode::Query.into(), addr, 0x00, 0x00],
    )
}

/// `[license, id, 0x07, addr, 0x00, 0x00]` on the controller channel
pub fn open(id: u8, addr: u8) -> (FrameType, Vec<u8>) {
    (
        FrameType::Controller,
        vec![LICENSE, id, Opcode::OpenDoor.into(), addr, 0x00, 0x00],
    )
}

/// Read the 7 clock registers
pub fn get_time(id: u8, addr: u8) -> (FrameType, Vec<u8>) {
    let mut data = clock_header(id, Opcode::ReadMemory, addr);
    data.push(0x00);
    (FrameType::Controller, data)
}

/// Write the 7 clock registers from `at`
pub fn set_time(id: u8, addr: u8, at: &NaiveDateTime) -> (FrameType, Vec<u8>) {
    let mut data = clock_header(id, Opcode::WriteMemory, addr);
    data.extend_from_slice(&[
        bcd::encode(at.second()),
        bcd::encode(at.minute()),
        bcd::encode(at.hour()),
        bcd::encode(at.weekday().number_from_monday()),
        bcd::encode(at.day()),
        bcd::encode(at.month()),
        bcd::encode(at.year().rem_euclid(100) as u32),
    ]);
    (FrameType::Controller, data)
}

// [license, id, opcode, addr, bank, bank_type, length, msb, lsb]
fn clock_header(id: u8, opcode: Opcode, addr: u8) -> Vec<u8> {
    vec![
        LICENSE,
        id,
        opcode.into(),
        addr,
        clock::BANK,
        clock::BANK_TYPE,
        clock::LENGTH,
        0x00,
        0x00,
    ]
}
