//! Transport layer for Vial keyboard configuration
//!
//! This crate provides the byte-level half of the configuration engine:
//!
//! - [`Transport`]: the narrow raw-HID interface (send/receive one report)
//! - [`FrameCodec`]: fixed-size report framing with trailing checksum
//! - [`Dispatcher`]: single-flight request/response transactions with
//!   sequence tagging and caller-visible deadlines
//! - [`HidRawTransport`] / [`HidDiscovery`]: the hidapi-backed adapter
//! - [`mock::MockTransport`]: in-memory transport for simulations and tests
//!
//! ```text
//! [HidRawTransport / MockTransport]  ← implements Transport (raw I/O)
//!                |
//!          [Dispatcher]              ← sequence, echo matching, deadline
//!                |
//!        [vial_keyboard::Keyboard]
//! ```

pub mod codec;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod types;

mod discovery;
mod hid_raw;

pub use codec::FrameCodec;
pub use command::{HidCommand, ParseError};
pub use dispatcher::Dispatcher;
pub use error::TransportError;
pub use types::{ChecksumType, DiscoveredDevice, TransportDeviceInfo};

pub use discovery::HidDiscovery;
pub use hid_raw::HidRawTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// The raw transport trait - all backends implement this
///
/// Implementations move whole reports and nothing else: no retries, no
/// echo matching, no framing. The [`Dispatcher`] is the only caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one report of exactly [`Transport::report_size`] bytes
    async fn send_report(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Read one report, waiting at most `timeout`
    ///
    /// Returns `TransportError::Timeout` if nothing arrived in time.
    async fn read_report(&self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Fixed report length of this endpoint
    fn report_size(&self) -> usize {
        protocol::REPORT_SIZE
    }

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Check if transport is still connected
    async fn is_connected(&self) -> bool;

    /// Close the transport gracefully
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Type alias for a shared transport
pub type BoxedTransport = Arc<dyn Transport>;
