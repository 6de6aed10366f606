//! Stream framing over fragmented TCP reads
//!
//! The converter does not length-prefix its frames. A frame opens with one of
//! the start bytes and closes at the first `0x0d`; reads can split a frame
//! anywhere or carry several frames at once.

use bytes::{Buf, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::{
    command::FrameType, constants::TERMINATOR, device_error::DeviceError, MAX_FRAME_SIZE,
};

/// A delimited frame, packed payload only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame type (start byte)
    pub frame_type: FrameType,

    /// Bytes between the start byte and the terminator
    pub payload: Bytes,
}

/// Output of the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Regular frame, to be unpacked
    Frame(RawFrame),

    /// Fault frame (`0x02`) reported by the converter
    Fault(DeviceError),
}

/// Reassembles frames from arbitrary read chunks
///
/// Holds at most one frame in progress. Bytes outside a frame are discarded
/// until the next start byte; a start byte inside a frame is not honoured.
#[derive(Debug)]
pub struct FrameReceiver {
    buffer: BytesMut,
    /// Type of the frame in progress, `None` between frames
    in_frame: Option<FrameType>,
    max_frame_size: usize,
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a receiver that drops frames longer than `max_frame_size`
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            in_frame: None,
            max_frame_size,
        }
    }

    /// Check if a frame is partially received
    pub fn is_mid_frame(&self) -> bool {
        self.in_frame.is_some()
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Push a chunk and extract every frame it completes
    ///
    /// Returns an empty vector while more data is needed.
    ///
    /// # Examples
    ///
    /// ```
    /// use z397_core::{FrameReceiver, Inbound};
    ///
    /// let mut receiver = FrameReceiver::new();
    /// assert!(receiver.feed(&[0x20, 0x50, 0x51]).is_empty());
    /// let frames = receiver.feed(&[0x52, 0x0d]);
    /// assert!(matches!(&frames[..], [Inbound::Frame(_)]));
    /// ```
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Inbound> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(inbound) = self.try_extract_one() {
            out.push(inbound);
        }
        out
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_frame = None;
    }

    fn try_extract_one(&mut self) -> Option<Inbound> {
        loop {
            let frame_type = match self.in_frame {
                Some(frame_type) => frame_type,
                None => self.seek_start()?,
            };

            let Some(end) = self.buffer.iter().position(|b| *b == TERMINATOR) else {
                if self.buffer.len() > self.max_frame_size {
                    warn!(
                        buffered = self.buffer.len(),
                        max = self.max_frame_size,
                        "Frame exceeds maximum size, dropping"
                    );
                    self.reset();
                }
                return None;
            };

            let mut frame = self.buffer.split_to(end + 1);
            self.in_frame = None;

            // Start byte was consumed by seek_start
            frame.truncate(frame.len() - 1);

            if frame_type == FrameType::Fault {
                return Some(Inbound::Fault(DeviceError::from_code(&frame)));
            }

            if frame.is_empty() {
                trace!(frame_type = %frame_type, "Skipping empty frame");
                continue;
            }

            return Some(Inbound::Frame(RawFrame {
                frame_type,
                payload: frame.freeze(),
            }));
        }
    }

    /// Discard up to the next start byte and enter the frame
    fn seek_start(&mut self) -> Option<FrameType> {
        let found = self
            .buffer
            .iter()
            .enumerate()
            .find_map(|(i, b)| FrameType::from_start_byte(*b).map(|t| (i, t)));

        match found {
            Some((start, frame_type)) => {
                if start > 0 {
                    trace!(
                        discarded = hex::encode(&self.buffer[..start]),
                        "Discarding bytes outside a frame"
                    );
                }
                self.buffer.advance(start + 1);
                self.in_frame = Some(frame_type);
                Some(frame_type)
            }
            None => {
                if !self.buffer.is_empty() {
                    trace!(
                        discarded = hex::encode(&self.buffer),
                        "Received data without start byte"
                    );
                    self.buffer.clear();
                }
                None
            }
        }
    }
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(frame_type: FrameType, payload: &'static [u8]) -> Inbound {
        Inbound::Frame(RawFrame {
            frame_type,
            payload: Bytes::from_static(payload),
        })
    }

    #[test]
    fn test_single_frame() {
        let mut receiver = FrameReceiver::new();
        let frames = receiver.feed(&[0x20, 0x50, 0x60, 0x0d]);

        assert_eq!(frames, vec![frame(FrameType::Bus, &[0x50, 0x60])]);
        assert!(!receiver.is_mid_frame());
        assert_eq!(receiver.buffered(), 0);
    }

    #[test]
    fn test_frame_across_reads() {
        let mut receiver = FrameReceiver::new();

        assert!(receiver.feed(&[0x1f, 0x50]).is_empty());
        assert!(receiver.is_mid_frame());
        assert!(receiver.feed(&[0x51]).is_empty());

        let frames = receiver.feed(&[0x52, 0x0d]);
        assert_eq!(frames, vec![frame(FrameType::Controller, &[0x50, 0x51, 0x52])]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire = [0x1e, 0x70, 0x71, 0xC0, 0x0d];
        let mut receiver = FrameReceiver::new();
        let mut frames = Vec::new();
        for byte in wire {
            frames.extend(receiver.feed(&[byte]));
        }
        assert_eq!(frames, vec![frame(FrameType::Service, &[0x70, 0x71, 0xC0])]);
    }

    #[test]
    fn test_garbage_before_start_is_discarded() {
        let mut receiver = FrameReceiver::new();

        // Converter echo of the mode-enable frame, no start byte
        assert!(receiver.feed(&[0xff, 0xfb, 0x2c]).is_empty());
        assert!(!receiver.is_mid_frame());
        assert_eq!(receiver.buffered(), 0);

        let frames = receiver.feed(&[0xff, 0x20, 0x55, 0x0d]);
        assert_eq!(frames, vec![frame(FrameType::Bus, &[0x55])]);
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut receiver = FrameReceiver::new();
        let frames = receiver.feed(&[0x20, 0x50, 0x0d, 0x1f, 0x60, 0x0d, 0x20, 0x70]);

        assert_eq!(
            frames,
            vec![
                frame(FrameType::Bus, &[0x50]),
                frame(FrameType::Controller, &[0x60]),
            ]
        );
        assert!(receiver.is_mid_frame());

        let frames = receiver.feed(&[0x0d]);
        assert_eq!(frames, vec![frame(FrameType::Bus, &[0x70])]);
    }

    #[test]
    fn test_start_byte_inside_frame_is_data() {
        let mut receiver = FrameReceiver::new();
        let frames = receiver.feed(&[0x20, 0x50, 0x1f, 0x0d]);
        assert_eq!(frames, vec![frame(FrameType::Bus, &[0x50, 0x1f])]);
    }

    #[test]
    fn test_fault_frame() {
        let mut receiver = FrameReceiver::new();
        let frames = receiver.feed(&[0x02, 0x48, 0x4c, 0x33, 0x0d]);
        assert_eq!(frames, vec![Inbound::Fault(DeviceError::TooManyControllers)]);
    }

    #[test]
    fn test_unknown_fault_code() {
        let mut receiver = FrameReceiver::new();
        let frames = receiver.feed(&[0x02, 0x48, 0x99, 0x0d]);
        assert_eq!(
            frames,
            vec![Inbound::Fault(DeviceError::Unknown("0x48, 0x99".into()))]
        );
    }

    #[test]
    fn test_empty_frame_skipped() {
        let mut receiver = FrameReceiver::new();
        let frames = receiver.feed(&[0x20, 0x0d, 0x1f, 0x50, 0x0d]);
        assert_eq!(frames, vec![frame(FrameType::Controller, &[0x50])]);
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let mut receiver = FrameReceiver::with_max_frame_size(8);

        assert!(receiver.feed(&[0x20; 1]).is_empty());
        assert!(receiver.feed(&[0x50; 10]).is_empty());
        assert!(!receiver.is_mid_frame());
        assert_eq!(receiver.buffered(), 0);

        // Tail of the dropped frame is ignored, next frame comes through
        let frames = receiver.feed(&[0x50, 0x0d, 0x1f, 0x60, 0x0d]);
        assert_eq!(frames, vec![frame(FrameType::Controller, &[0x60])]);
    }
}
