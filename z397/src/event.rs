//! Connection-level events

use z397_core::DeviceError;

/// Something that happened on the link rather than to a single request
///
/// Delivered through [`Converter::subscribe`](crate::Converter::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Link opened and mode-enable frame sent
    Connected,

    /// Link closed on request (disconnect or reset)
    Disconnected,

    /// A reply failed checksum validation
    ChecksumMismatch { frame_type: u8, id: u8 },

    /// The converter sent a fault frame
    Fault(DeviceError),

    /// Link dropped without being asked to
    Closed { reason: String },
}
