//! Keyboard interface error types

use thiserror::Error;
use vial_transport::TransportError;

/// Errors from keyboard operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyboardError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Secure operation attempted while locked; nothing was sent
    #[error("Keyboard is locked; unlock it first")]
    NotUnlocked,

    #[error("Unlock already in progress")]
    UnlockInProgress,

    #[error("Unlock rejected by keyboard")]
    UnlockRejected,

    #[error("Unlock not confirmed within {0} ms")]
    UnlockTimeout(u64),

    /// Caller-side bounds check failed; nothing was sent
    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Record too large: {len} bytes (slot holds {max})")]
    RecordTooLarge { len: usize, max: usize },

    /// Chunked read disagreed with the declared record length
    #[error("Slot {index} corrupt: {reason}")]
    SlotCorrupt { index: u8, reason: String },

    /// A chunked write stopped part way; `resynced` is what the slot holds now
    #[error("Partial write: {applied} of {total} chunks applied")]
    PartialWrite {
        applied: usize,
        total: usize,
        resynced: Vec<u8>,
    },

    #[error("Unsupported protocol version {0}")]
    UnsupportedProtocol(u16),

    /// Invalid parameter value
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Device returned unexpected response
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Entity record bytes do not match the family layout
    #[error("Decode error: {0}")]
    Decode(String),
}

impl KeyboardError {
    /// Device handle is dead and must be reconnected
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Disconnected))
    }

    /// Caller may retry on the same handle (possibly after a re-read)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::SlotCorrupt { .. } | Self::PartialWrite { .. } | Self::UnexpectedResponse(_) => {
                true
            }
            Self::UnlockRejected | Self::UnlockTimeout(_) => true,
            _ => false,
        }
    }
}

impl From<vial_transport::ParseError> for KeyboardError {
    fn from(e: vial_transport::ParseError) -> Self {
        KeyboardError::UnexpectedResponse(e.to_string())
    }
}
