//! Packed decimal helpers for the controller clock
//!
//! The clock registers store each two-digit value as a byte whose hex digits
//! read as the decimal value: 45 seconds is `0x45`.

/// Encode a value in `0..100`
///
/// Values of 100 and above keep only their last two digits.
pub fn encode(value: u32) -> u8 {
    let value = value % 100;
    (((value / 10) << 4) | (value % 10)) as u8
}

/// Decode a byte, `None` if either nibble is not a decimal digit
pub fn decode(byte: u8) -> Option<u32> {
    let (high, low) = (byte >> 4, byte & 0x0f);
    if high > 9 || low > 9 {
        return None;
    }
    Some(u32::from(high) * 10 + u32::from(low))
}
