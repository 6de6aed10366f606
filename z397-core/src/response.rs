//! Response dispatch and parsing
//!
//! Replies carry no explicit command tag. Which command a decoded packet
//! answers is read from the frame type and a few discriminator bytes, checked
//! in table order.

use chrono::NaiveDate;
use tracing::debug;
use z397_types::{CommandKind, ResponseData};

use crate::{
    bcd,
    codec::DecodedPacket,
    command::{FrameType, Opcode},
    constants::{clock, offsets, ACK_MARKER, SCAN_BITMAP_LEN},
    error::{Error, Result},
};

/// Parsed reply, before it is matched with its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Command the reply answers
    pub command: CommandKind,

    /// Controller address reported by the device
    pub addr: Option<u8>,

    /// Payload
    pub data: ResponseData,
}

struct Route {
    frame_type: FrameType,
    command: CommandKind,
    matches: fn(&[u8]) -> bool,
}

fn at(payload: &[u8], offset: usize) -> Option<u8> {
    payload.get(offset).copied()
}

const ROUTES: [Route; 5] = [
    Route {
        frame_type: FrameType::Bus,
        command: CommandKind::Scan,
        matches: |p| at(p, 4) == Some(Opcode::Query as u8) && at(p, 5) == Some(0x00),
    },
    Route {
        frame_type: FrameType::Bus,
        command: CommandKind::GetSn,
        matches: |p| at(p, 4) == Some(Opcode::Query as u8) && at(p, 5).is_some_and(|b| b >= 0x02),
    },
    Route {
        frame_type: FrameType::Controller,
        command: CommandKind::GetTime,
        matches: |p| {
            at(p, 4) == Some(Opcode::ReadMemory as u8) && at(p, 7).is_some_and(|b| b >= clock::BANK_TYPE)
        },
    },
    Route {
        frame_type: FrameType::Controller,
        command: CommandKind::SetTime,
        matches: |p| at(p, 4) == Some(Opcode::WriteMemory as u8) && at(p, 8).is_some_and(|b| b >= ACK_MARKER),
    },
    Route {
        frame_type: FrameType::Controller,
        command: CommandKind::Open,
        matches: |p| at(p, 4) == Some(Opcode::OpenDoor as u8) && at(p, 8).is_some_and(|b| b >= ACK_MARKER),
    },
];

/// Find the command a decoded payload answers
pub fn classify(frame_type: FrameType, payload: &[u8]) -> Option<CommandKind> {
    ROUTES
        .iter()
        .find(|route| route.frame_type == frame_type && (route.matches)(payload))
        .map(|route| route.command)
}

/// Classify and parse a decoded packet
///
/// # Errors
///
/// - `UnknownResponseStructure` if no route matches
/// - `ControllerNotFound` for a serial number reply from an empty address
/// - `InvalidDate` if the clock registers are not a calendar date
/// - `PacketTooShort` if a parser runs out of bytes
pub fn dispatch(packet: &DecodedPacket) -> Result<Reply> {
    let payload = packet.payload.as_ref();

    let command = classify(packet.frame_type, payload).ok_or(Error::UnknownResponseStructure {
        frame_type: packet.frame_type.into(),
        opcode: at(payload, offsets::OPCODE),
    })?;

    let reply = match command {
        CommandKind::Scan => Reply {
            command,
            addr: None,
            data: ResponseData::Addresses(parse_scan(payload)),
        },
        CommandKind::GetSn => {
            let (addr, serial) = parse_serial_number(payload)?;
            Reply {
                command,
                addr: Some(addr),
                data: ResponseData::SerialNumber(serial),
            }
        }
        CommandKind::GetTime => {
            let (addr, time) = parse_time(payload)?;
            Reply {
                command,
                addr: Some(addr),
                data: ResponseData::Time(time),
            }
        }
        _ => Reply {
            command,
            addr: Some(require(payload, offsets::ADDRESS)?),
            data: ResponseData::Ok,
        },
    };

    debug!(id = packet.id, command = command.name(), data = %reply.data, "Parsed reply");

    Ok(reply)
}

fn require(payload: &[u8], offset: usize) -> Result<u8> {
    at(payload, offset).ok_or(Error::PacketTooShort {
        expected: offset + 1,
        actual: payload.len(),
    })
}

/// Addresses present on the bus
///
/// The bitmap runs from offset 8 to the declared length; bit `k` of byte `i`
/// marks address `i * 8 + k + 2`. Only the first `SCAN_BITMAP_LEN` bytes
/// cover the bus; anything past them is ignored.
pub fn parse_scan(payload: &[u8]) -> Vec<u8> {
    let end = at(payload, offsets::LENGTH)
        .map(usize::from)
        .unwrap_or(0)
        .min(payload.len());
    let mut bitmap = payload.get(8..end).unwrap_or(&[]);

    if bitmap.len() > SCAN_BITMAP_LEN {
        let (bus, rest) = bitmap.split_at(SCAN_BITMAP_LEN);
        if rest.iter().any(|byte| *byte != 0) {
            debug!(extra = hex::encode(rest), "Ignoring scan bits past the bus range");
        }
        bitmap = bus;
    }

    bitmap
        .iter()
        .enumerate()
        .flat_map(|(i, byte)| {
            (0..8u8)
                .filter(move |k| byte & (1 << k) != 0)
                .map(move |k| i as u8 * 8 + k + 2)
        })
        .collect()
}

/// Serial number reply: `(addr, serial)`
pub fn parse_serial_number(payload: &[u8]) -> Result<(u8, u16)> {
    let addr = require(payload, offsets::ADDRESS)?;
    let low = require(payload, 6)?;
    let high = require(payload, 7)?;

    if addr & 0x80 != 0 || (low == 0 && high == 0) {
        return Err(Error::ControllerNotFound { addr });
    }

    Ok((addr, u16::from_le_bytes([low, high])))
}

/// Clock reply: `(addr, time)`
///
/// Registers at offset 8.. are sec, min, hour, weekday, day, month, year.
/// The weekday is not used; the year counts from 2000.
pub fn parse_time(payload: &[u8]) -> Result<(u8, chrono::NaiveDateTime)> {
    let addr = require(payload, offsets::ADDRESS)?;
    require(payload, 14)?;

    let field = |offset: usize| bcd::decode(payload[offset]).ok_or(Error::InvalidDate { addr });

    let second = field(8)?;
    let minute = field(9)?;
    let hour = field(10)?;
    let day = field(12)?;
    let month = field(13)?;
    let year = field(14)?;

    NaiveDate::from_ymd_opt(2000 + year as i32, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|time| (addr, time))
        .ok_or(Error::InvalidDate { addr })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn packet(frame_type: FrameType, payload: Vec<u8>) -> DecodedPacket {
        DecodedPacket {
            frame_type,
            id: payload[3],
            payload: Bytes::from(payload),
        }
    }

    fn scan_payload(bitmap: &[u8]) -> Vec<u8> {
        let mut payload = vec![0x00, (8 + bitmap.len()) as u8, 0x08, 0x01, 0x00, 0x00, 0x00, 0x00];
        payload.extend_from_slice(bitmap);
        payload
    }

    fn time_payload(clock: [u8; 7]) -> Vec<u8> {
        let mut payload = vec![0x00, 16, 0x08, 0x05, 0x02, 0x02, 0x00, 0xd0];
        payload.extend_from_slice(&clock);
        payload.push(0x00);
        payload
    }

    #[test]
    fn test_scan_lowest_bit() {
        assert_eq!(parse_scan(&scan_payload(&[0x01])), vec![2]);
    }

    #[test]
    fn test_scan_highest_bit() {
        assert_eq!(parse_scan(&scan_payload(&[0x80])), vec![9]);
    }

    #[test]
    fn test_scan_two_bytes() {
        assert_eq!(parse_scan(&scan_payload(&[0x81, 0x02])), vec![2, 9, 11]);
    }

    #[test]
    fn test_scan_empty_bus() {
        assert_eq!(parse_scan(&scan_payload(&[0x00, 0x00])), Vec::<u8>::new());
        assert_eq!(parse_scan(&scan_payload(&[])), Vec::<u8>::new());
    }

    #[test]
    fn test_scan_respects_declared_length() {
        let mut payload = scan_payload(&[0x01]);
        // Padding with bits set must not leak into the result
        payload.extend_from_slice(&[0xff, 0xff, 0xff]);
        assert_eq!(parse_scan(&payload), vec![2]);
    }

    #[test]
    fn test_scan_covers_whole_bus() {
        let mut bitmap = [0u8; SCAN_BITMAP_LEN];
        bitmap[SCAN_BITMAP_LEN - 1] = 0x80;
        assert_eq!(parse_scan(&scan_payload(&bitmap)), vec![0x69]);
    }

    #[test]
    fn test_scan_ignores_bits_past_bus() {
        let mut bitmap = vec![0u8; SCAN_BITMAP_LEN + 20];
        bitmap[0] = 0x01;
        // Byte 31 would map to 250..=257 if it were read
        for byte in &mut bitmap[SCAN_BITMAP_LEN..] {
            *byte = 0xff;
        }
        assert_eq!(parse_scan(&scan_payload(&bitmap)), vec![2]);
    }

    #[test]
    fn test_serial_number() {
        let payload = vec![0x00, 8, 0x08, 0x01, 0x00, 0x05, 0x34, 0x12];
        assert_eq!(parse_serial_number(&payload).unwrap(), (0x05, 0x1234));
    }

    #[test]
    fn test_serial_number_not_found_high_bit() {
        let payload = vec![0x00, 8, 0x08, 0x01, 0x00, 0x85, 0x34, 0x12];
        assert!(matches!(
            parse_serial_number(&payload),
            Err(Error::ControllerNotFound { addr: 0x85 })
        ));
    }

    #[test]
    fn test_serial_number_not_found_zero() {
        let payload = vec![0x00, 8, 0x08, 0x01, 0x00, 0x05, 0x00, 0x00];
        assert!(matches!(
            parse_serial_number(&payload),
            Err(Error::ControllerNotFound { addr: 0x05 })
        ));
    }

    #[test]
    fn test_time() {
        // 13:45:09, weekday 7, 17.03.24
        let payload = time_payload([0x09, 0x45, 0x13, 0x07, 0x17, 0x03, 0x24]);
        let (addr, time) = parse_time(&payload).unwrap();

        assert_eq!(addr, 0x02);
        assert_eq!(
            time,
            NaiveDate::from_ymd_opt(2024, 3, 17).unwrap().and_hms_opt(13, 45, 9).unwrap()
        );
    }

    #[test]
    fn test_time_invalid_calendar_date() {
        let payload = time_payload([0x00, 0x00, 0x00, 0x01, 0x31, 0x02, 0x24]);
        assert!(matches!(parse_time(&payload), Err(Error::InvalidDate { addr: 0x02 })));
    }

    #[test]
    fn test_time_invalid_digit() {
        let payload = time_payload([0x0a, 0x00, 0x00, 0x01, 0x01, 0x01, 0x24]);
        assert!(matches!(parse_time(&payload), Err(Error::InvalidDate { .. })));
    }

    #[test]
    fn test_time_truncated() {
        let payload = vec![0x00, 12, 0x08, 0x05, 0x02, 0x02, 0x00, 0xd0, 0x00, 0x00];
        assert!(matches!(parse_time(&payload), Err(Error::PacketTooShort { .. })));
    }

    #[test]
    fn test_classify_table() {
        let scan = scan_payload(&[0x01]);
        assert_eq!(classify(FrameType::Bus, &scan), Some(CommandKind::Scan));
        assert_eq!(classify(FrameType::Controller, &scan), None);

        let sn = vec![0x00, 8, 0x08, 0x01, 0x00, 0x05, 0x34, 0x12];
        assert_eq!(classify(FrameType::Bus, &sn), Some(CommandKind::GetSn));

        let time = time_payload([0; 7]);
        assert_eq!(classify(FrameType::Controller, &time), Some(CommandKind::GetTime));

        let set = vec![0x00, 12, 0x08, 0x01, 0x03, 0x02, 0x00, 0xd0, 0x55, 0, 0, 0];
        assert_eq!(classify(FrameType::Controller, &set), Some(CommandKind::SetTime));

        let open = vec![0x00, 12, 0x08, 0x01, 0x07, 0x02, 0x00, 0x00, 0x56, 0, 0, 0];
        assert_eq!(classify(FrameType::Controller, &open), Some(CommandKind::Open));

        let open_nak = vec![0x00, 12, 0x08, 0x01, 0x07, 0x02, 0x00, 0x00, 0x10, 0, 0, 0];
        assert_eq!(classify(FrameType::Controller, &open_nak), None);
    }

    #[test]
    fn test_classify_short_payload() {
        assert_eq!(classify(FrameType::Bus, &[0x00, 4, 0x08, 0x01]), None);
        assert_eq!(classify(FrameType::Service, &[]), None);
    }

    #[test]
    fn test_dispatch_open() {
        let reply = dispatch(&packet(
            FrameType::Controller,
            vec![0x00, 12, 0x08, 0x09, 0x07, 0x03, 0x00, 0x00, 0x55, 0, 0, 0],
        ))
        .unwrap();

        assert_eq!(
            reply,
            Reply {
                command: CommandKind::Open,
                addr: Some(0x03),
                data: ResponseData::Ok,
            }
        );
    }

    #[test]
    fn test_dispatch_scan_has_no_address() {
        let reply = dispatch(&packet(FrameType::Bus, scan_payload(&[0x05]))).unwrap();
        assert_eq!(reply.addr, None);
        assert_eq!(reply.data, ResponseData::Addresses(vec![2, 4]));
    }

    #[test]
    fn test_dispatch_unknown_structure() {
        let result = dispatch(&packet(
            FrameType::Service,
            vec![0x00, 8, 0x08, 0x01, 0x09, 0x00, 0x00, 0x00],
        ));
        assert!(matches!(
            result,
            Err(Error::UnknownResponseStructure { frame_type: 0x1e, opcode: Some(0x09) })
        ));
    }
}
