//! Z397 checksum algorithm
//!
//! The first byte of every envelope is a one-byte complement checksum:
//! 1. Sum every envelope byte except the checksum slot (padding excluded)
//! 2. Keep the low 8 bits
//! 3. Subtract from 0xFF

use tracing::trace;

/// Calculate the checksum of an unpadded envelope
///
/// The value in the checksum slot (`envelope[0]`) is ignored.
///
/// # Examples
///
/// ```
/// use z397_core::checksum;
///
/// // [checksum, length, license, id, opcode, addr, 0, 0]
/// let cs = checksum::calculate(&[0, 8, 0x08, 1, 0, 0, 0, 0]);
/// assert_eq!(cs, 0xFF - 17);
/// ```
pub fn calculate(envelope: &[u8]) -> u8 {
    let sum = envelope
        .iter()
        .skip(1)
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte));

    0xFF - sum
}

/// Validate the checksum of a decoded packet
///
/// Only the first `decoded[1]` bytes are considered. The packet passes when
/// the declared checksum matches **or** when the byte after the length slot
/// equals the considered length.
pub fn verify(decoded: &[u8]) -> bool {
    let Some(&length) = decoded.get(1) else {
        return false;
    };

    let considered = &decoded[..usize::from(length).min(decoded.len())];
    let Some((&declared_sum, remaining)) = considered.split_first() else {
        return false;
    };

    let computed = remaining
        .iter()
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte))
        ^ 0xFF;
    let declared_length = remaining.get(1).copied().map(usize::from);

    let sum_ok = declared_sum == computed;
    let length_ok = declared_length == Some(remaining.len() + 1);

    trace!(
        declared = format!("0x{:02X}", declared_sum),
        computed = format!("0x{:02X}", computed),
        sum_ok,
        length_ok,
        "Verified checksum"
    );

    sum_ok || length_ok
}
