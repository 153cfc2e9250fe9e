//! Raw HID transport over hidapi (interrupt IN/OUT reports)

use std::time::Duration;

use async_trait::async_trait;
use hidapi::HidDevice;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::REPORT_SIZE;
use crate::types::TransportDeviceInfo;
use crate::Transport;

/// HID transport for the Vial raw-HID interface
///
/// Reports are written with a leading report ID of 0, which hidapi strips
/// before the transfer. Reads return the bare report.
pub struct HidRawTransport {
    device: Mutex<HidDevice>,
    info: TransportDeviceInfo,
}

impl HidRawTransport {
    pub fn new(device: HidDevice, info: TransportDeviceInfo) -> Self {
        Self {
            device: Mutex::new(device),
            info,
        }
    }

    /// Classify an I/O failure: a device that no longer answers string
    /// queries has gone away
    fn io_error(device: &HidDevice, err: hidapi::HidError) -> TransportError {
        if device.get_product_string().is_err() {
            TransportError::Disconnected
        } else {
            TransportError::from(err)
        }
    }
}

#[async_trait]
impl Transport for HidRawTransport {
    async fn send_report(&self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() != REPORT_SIZE {
            return Err(TransportError::Internal(format!(
                "report must be {} bytes, got {}",
                REPORT_SIZE,
                frame.len()
            )));
        }

        let mut buf = Vec::with_capacity(REPORT_SIZE + 1);
        buf.push(0);
        buf.extend_from_slice(frame);

        let device = self.device.lock();
        match device.write(&buf) {
            Ok(n) if n >= REPORT_SIZE => Ok(()),
            Ok(n) => Err(TransportError::HidError(format!(
                "short write: {} of {} bytes",
                n,
                buf.len()
            ))),
            Err(e) => Err(Self::io_error(&device, e)),
        }
    }

    async fn read_report(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; REPORT_SIZE];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        let device = self.device.lock();
        match device.read_timeout(&mut buf, timeout_ms) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => {
                if n != REPORT_SIZE {
                    debug!("Short report: {} bytes", n);
                }
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => Err(Self::io_error(&device, e)),
        }
    }

    fn report_size(&self) -> usize {
        REPORT_SIZE
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    async fn is_connected(&self) -> bool {
        let device = self.device.lock();
        device.get_product_string().is_ok()
    }
}
