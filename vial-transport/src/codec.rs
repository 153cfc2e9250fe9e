//! Frame codec: fixed-size report layout
//!
//! ```text
//! [command] [payload ... zero padded] [checksum]
//! ```
//!
//! The codec only translates bytes. Sequencing, status handling and retries
//! belong to the dispatcher.

use crate::error::TransportError;
use crate::protocol::{self, REPORT_SIZE};
use crate::types::ChecksumType;

/// Encodes commands into fixed-length report frames and decodes responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    report_size: usize,
    checksum: ChecksumType,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(REPORT_SIZE, ChecksumType::default())
    }
}

impl FrameCodec {
    /// Create a codec for reports of `report_size` bytes
    pub fn new(report_size: usize, checksum: ChecksumType) -> Self {
        Self {
            report_size,
            checksum,
        }
    }

    /// Fixed frame length
    pub fn report_size(&self) -> usize {
        self.report_size
    }

    /// Payload bytes available after the command byte (and checksum)
    pub fn payload_capacity(&self) -> usize {
        let trailer = match self.checksum {
            ChecksumType::Trailing => 1,
            ChecksumType::None => 0,
        };
        self.report_size.saturating_sub(1 + trailer)
    }

    /// Build a frame: command byte first, payload following, zero padded
    pub fn encode(&self, command: u8, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let capacity = self.payload_capacity();
        if payload.len() > capacity {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                capacity,
            });
        }

        let mut frame = vec![0u8; self.report_size];
        frame[0] = command;
        frame[1..1 + payload.len()].copy_from_slice(payload);
        protocol::apply_checksum(&mut frame, self.checksum);
        Ok(frame)
    }

    /// Split a frame into its leading status/command echo and payload
    ///
    /// The payload slice spans the full capacity, padding included.
    pub fn decode<'a>(&self, frame: &'a [u8]) -> Result<(u8, &'a [u8]), TransportError> {
        if frame.len() != self.report_size {
            return Err(TransportError::MalformedFrame(format!(
                "expected {} bytes, got {}",
                self.report_size,
                frame.len()
            )));
        }
        if !protocol::verify_checksum(frame, self.checksum) {
            return Err(TransportError::MalformedFrame("checksum mismatch".into()));
        }
        let end = 1 + self.payload_capacity();
        Ok((frame[0], &frame[1..end]))
    }
}
