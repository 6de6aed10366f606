//! Escape packing and the frame envelope
//!
//! # Envelope
//!
//! ```text
//! ┌──────────┬────────┬──────────────────────────────┬──────────┐
//! │ Checksum │ Length │ License, ID, Opcode, ...     │ Padding  │
//! │  1 byte  │ 1 byte │ N bytes                      │ to 4n    │
//! └──────────┴────────┴──────────────────────────────┴──────────┘
//! ```
//!
//! The padded envelope is packed in groups of 4 raw bytes into 5 wire bytes.
//! Each group's high bits move into a sign byte and every wire byte below
//! 48 is XOR'd with `0xCA`, so packed data never contains a start byte or the
//! terminator. The frame is `[type] + packed + [0x0d]`.
//!
//! The two directions place the sign byte differently:
//!
//! | direction | sign byte | bit for raw byte `k` |
//! |---|---|---|
//! | host → converter (outbound) | first | `3 - k` |
//! | converter → host (inbound) | last | `k` |
//!
//! The inbound layout is taken from observed converter behaviour and has not
//! been confirmed against a hardware capture.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{
    checksum,
    command::FrameType,
    constants::{offsets, TERMINATOR},
    error::{Error, Result},
    frame::RawFrame,
    MAX_DATA_SIZE,
};

/// XOR mask applied to escaped bytes
pub const ESCAPE_MASK: u8 = 0xCA;

/// Bytes below this value are escaped
pub const ESCAPE_BELOW: u8 = 48;

/// Raw bytes per packing group
pub const RAW_GROUP: usize = 4;

/// Wire bytes per packing group
pub const WIRE_GROUP: usize = 5;

/// A frame after unpacking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    /// Frame type (start byte)
    pub frame_type: FrameType,

    /// Request ID (decoded offset 3)
    pub id: u8,

    /// Decoded envelope including checksum, length and padding
    pub payload: Bytes,
}

impl DecodedPacket {
    /// Check the envelope checksum
    pub fn checksum_ok(&self) -> bool {
        checksum::verify(&self.payload)
    }
}

fn escape(byte: u8) -> u8 {
    if byte < ESCAPE_BELOW {
        byte ^ ESCAPE_MASK
    } else {
        byte
    }
}

fn unescape(byte: u8) -> u8 {
    if byte & 0x80 != 0 {
        byte ^ ESCAPE_MASK
    } else {
        byte
    }
}

fn unescape_group(group: &[u8]) -> [u8; WIRE_GROUP] {
    let mut out = [0u8; WIRE_GROUP];
    for (slot, byte) in out.iter_mut().zip(group) {
        *slot = unescape(*byte);
    }
    out
}

/// Pack host → converter data (sign byte first)
///
/// Trailing bytes that do not fill a group are dropped; [`assemble`] always
/// pads to a whole number of groups.
pub fn pack_outbound(raw: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(raw.len() / RAW_GROUP * WIRE_GROUP);

    for group in raw.chunks_exact(RAW_GROUP) {
        let sign = group.iter().fold(0u8, |sign, byte| (sign << 1) | (byte >> 7));
        out.put_u8(escape(sign));
        for byte in group {
            out.put_u8(escape(byte & 0x7f));
        }
    }

    out
}

/// Unpack converter → host data (sign byte last)
pub fn unpack_inbound(wire: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(wire.len() / WIRE_GROUP * RAW_GROUP);

    for group in wire.chunks_exact(WIRE_GROUP) {
        let group = unescape_group(group);
        let sign = group[RAW_GROUP];
        for (k, byte) in group[..RAW_GROUP].iter().enumerate() {
            out.put_u8(byte | (((sign >> k) & 1) << 7));
        }
    }

    out
}

/// Pack converter → host data, the counterpart of [`unpack_inbound`]
///
/// Used to emulate a converter.
pub fn pack_inbound(raw: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(raw.len() / RAW_GROUP * WIRE_GROUP);

    for group in raw.chunks_exact(RAW_GROUP) {
        let mut sign = 0u8;
        for (k, byte) in group.iter().enumerate() {
            sign |= (byte >> 7) << k;
            out.put_u8(escape(byte & 0x7f));
        }
        out.put_u8(escape(sign));
    }

    out
}

/// Unpack host → converter data, the counterpart of [`pack_outbound`]
///
/// Used to emulate a converter.
pub fn unpack_outbound(wire: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(wire.len() / WIRE_GROUP * RAW_GROUP);

    for group in wire.chunks_exact(WIRE_GROUP) {
        let group = unescape_group(group);
        let sign = group[0];
        for (k, byte) in group[1..].iter().enumerate() {
            out.put_u8(byte | (((sign >> (RAW_GROUP - 1 - k)) & 1) << 7));
        }
    }

    out
}

/// Build `[checksum, length, data..., padding]`
pub fn envelope(data: &[u8]) -> Result<BytesMut> {
    if data.len() > MAX_DATA_SIZE {
        return Err(Error::PayloadTooLarge {
            size: data.len(),
            max: MAX_DATA_SIZE,
        });
    }

    let length = data.len() + 2;
    let mut buf = BytesMut::with_capacity(length.next_multiple_of(RAW_GROUP));
    buf.put_u8(0);
    buf.put_u8(length as u8);
    buf.put_slice(data);
    buf[offsets::CHECKSUM] = checksum::calculate(&buf);

    while buf.len() % RAW_GROUP != 0 {
        buf.put_u8(0);
    }

    Ok(buf)
}

fn wrap(frame_type: FrameType, packed: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(packed.len() + 2);
    frame.put_u8(frame_type.into());
    frame.put_slice(packed);
    frame.put_u8(TERMINATOR);
    frame.freeze()
}

/// Assemble a host → converter frame
///
/// # Examples
///
/// ```
/// use z397_core::{codec, FrameType};
///
/// let frame = codec::assemble(FrameType::Bus, &[0x08, 1, 0, 0, 0, 0]).unwrap();
/// // 8 envelope bytes pack into 10 wire bytes, plus type and terminator
/// assert_eq!(frame.len(), 12);
/// ```
pub fn assemble(frame_type: FrameType, data: &[u8]) -> Result<Bytes> {
    let envelope = envelope(data)?;
    let frame = wrap(frame_type, &pack_outbound(&envelope));

    trace!(
        frame_type = %frame_type,
        envelope = hex::encode(&envelope),
        wire = hex::encode(&frame),
        "Assembled frame"
    );

    Ok(frame)
}

/// Assemble a converter → host frame, as a converter would send it
pub fn assemble_reply(frame_type: FrameType, data: &[u8]) -> Result<Bytes> {
    let envelope = envelope(data)?;
    Ok(wrap(frame_type, &pack_inbound(&envelope)))
}

fn packet(frame_type: FrameType, payload: BytesMut) -> Result<DecodedPacket> {
    let id = payload
        .get(offsets::ID)
        .copied()
        .ok_or(Error::PacketTooShort {
            expected: offsets::ID + 1,
            actual: payload.len(),
        })?;

    Ok(DecodedPacket {
        frame_type,
        id,
        payload: payload.freeze(),
    })
}

/// Decode a frame received from the converter
pub fn decode(frame: &RawFrame) -> Result<DecodedPacket> {
    let packet = packet(frame.frame_type, unpack_inbound(&frame.payload))?;

    trace!(
        frame_type = %packet.frame_type,
        id = packet.id,
        decoded = hex::encode(&packet.payload),
        "Decoded frame"
    );

    Ok(packet)
}

/// Decode a frame sent by the host, as a converter would read it
pub fn decode_request(frame: &RawFrame) -> Result<DecodedPacket> {
    packet(frame.frame_type, unpack_outbound(&frame.payload))
}
