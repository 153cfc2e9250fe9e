//! Transport error types

use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Transport lost; fatal to the device handle
    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Payload too large: {len} bytes (capacity {capacity})")]
    PayloadTooLarge { len: usize, capacity: usize },

    /// Firmware answered the transaction with a non-OK status
    #[error("Command 0x{command:02X} rejected by firmware (status 0x{status:02X})")]
    RejectedByFirmware { command: u8, status: u8 },

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Whether the caller may retry the same operation on the same handle
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::MalformedFrame(_) | Self::RejectedByFirmware { .. }
        )
    }
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}
