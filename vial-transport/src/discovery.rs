//! Device discovery for Vial keyboards

use std::ffi::CString;
use std::sync::Arc;

use hidapi::HidApi;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::hid_raw::HidRawTransport;
use crate::protocol::device;
use crate::types::{DiscoveredDevice, TransportDeviceInfo};
use crate::Transport;

/// HID device discovery for the Vial raw-HID interface
#[derive(Debug, Default, Clone)]
pub struct HidDiscovery {
    /// Also list VIA-only boards that lack the Vial serial marker
    include_non_vial: bool,
}

impl HidDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// List raw-HID interfaces whose serial does not carry the Vial marker
    pub fn include_non_vial(mut self, include: bool) -> Self {
        self.include_non_vial = include;
        self
    }

    /// Check if this is the VIA/Vial raw-HID interface
    fn is_raw_hid_interface(device_info: &hidapi::DeviceInfo) -> bool {
        device_info.usage_page() == device::USAGE_PAGE && device_info.usage() == device::USAGE
    }

    fn is_vial_serial(serial: Option<&str>) -> bool {
        serial.is_some_and(|s| s.contains(device::SERIAL_MAGIC))
    }

    /// List currently attached Vial keyboards
    pub fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let api = HidApi::new()?;
        let mut devices = Vec::new();

        for device_info in api.device_list() {
            if !Self::is_raw_hid_interface(device_info) {
                continue;
            }

            let serial = device_info.serial_number().map(|s| s.to_string());
            if !self.include_non_vial && !Self::is_vial_serial(serial.as_deref()) {
                continue;
            }

            let vid = device_info.vendor_id();
            let pid = device_info.product_id();
            let path = device_info.path().to_string_lossy().to_string();

            debug!("Found device: VID={:04X} PID={:04X} path={}", vid, pid, path);

            devices.push(DiscoveredDevice {
                info: TransportDeviceInfo {
                    vid,
                    pid,
                    device_path: path,
                    serial,
                    product_name: device_info.product_string().map(|s| s.to_string()),
                    manufacturer: device_info.manufacturer_string().map(|s| s.to_string()),
                },
            });
        }

        info!("Found {} devices", devices.len());
        Ok(devices)
    }

    /// Open a specific device by its HID path
    pub fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let api = HidApi::new()?;
        let path = CString::new(device.info.device_path.as_bytes()).map_err(|_| {
            TransportError::DeviceNotFound(format!("invalid path {}", device.info.device_path))
        })?;
        let hid = api.open_path(&path)?;

        info!(
            "Opened {} ({:04X}:{:04X})",
            device.info.display_name(),
            device.info.vid,
            device.info.pid
        );
        Ok(Arc::new(HidRawTransport::new(hid, device.info.clone())))
    }

    /// Open the first matching device, optionally restricted to a VID:PID
    pub fn open_first(
        &self,
        filter: Option<(u16, u16)>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let devices = self.list_devices()?;
        let device = devices
            .iter()
            .find(|d| filter.map_or(true, |(vid, pid)| d.info.vid == vid && d.info.pid == pid))
            .ok_or_else(|| {
                TransportError::DeviceNotFound(match filter {
                    Some((vid, pid)) => format!("no Vial keyboard {:04X}:{:04X}", vid, pid),
                    None => "no Vial keyboard attached".into(),
                })
            })?;
        self.open_device(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vial_serial_marker() {
        assert!(HidDiscovery::is_vial_serial(Some("vial:f64c2b3c")));
        assert!(HidDiscovery::is_vial_serial(Some("xyz-vial:f64c2b3c")));
        assert!(!HidDiscovery::is_vial_serial(Some("0123456789")));
        assert!(!HidDiscovery::is_vial_serial(None));
    }
}
