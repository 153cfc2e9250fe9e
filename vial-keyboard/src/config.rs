//! Engine configuration
//!
//! Loaded from TOML by the CLI; every field has a default so an empty file
//! (or no file) is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vial_transport::protocol::timing;
use vial_transport::ChecksumType;

/// Tunables for one device handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Deadline for a single request/response exchange
    pub transaction_timeout_ms: u64,
    /// Interval between unlock status polls
    pub unlock_poll_interval_ms: u64,
    /// How long to wait for the user to confirm an unlock
    pub unlock_window_ms: u64,
    /// Frame checksum scheme
    pub checksum: ChecksumType,
    /// Read the whole keymap during connect
    pub prefetch_keymap: bool,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: timing::TRANSACTION_TIMEOUT_MS,
            unlock_poll_interval_ms: timing::UNLOCK_POLL_INTERVAL_MS,
            unlock_window_ms: timing::UNLOCK_WINDOW_MS,
            checksum: ChecksumType::default(),
            prefetch_keymap: true,
        }
    }
}

impl KeyboardConfig {
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn unlock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.unlock_poll_interval_ms.max(1))
    }

    pub fn unlock_window(&self) -> Duration {
        Duration::from_millis(self.unlock_window_ms)
    }
}
