//! Common types for transport layer

use serde::{Deserialize, Serialize};

/// Device identification information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
    /// Manufacturer string if available
    pub manufacturer: Option<String>,
}

impl TransportDeviceInfo {
    /// Human readable name, falling back to `VID:PID`
    pub fn display_name(&self) -> String {
        match (&self.manufacturer, &self.product_name) {
            (Some(m), Some(p)) => format!("{m} {p}"),
            (None, Some(p)) => p.clone(),
            _ => format!("{:04X}:{:04X}", self.vid, self.pid),
        }
    }
}

/// Checksum configuration for frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    /// Last byte holds 255-(sum of all preceding bytes & 0xFF)
    #[default]
    Trailing,
    /// No checksum; the whole report after the command byte is payload
    None,
}

/// Discovered device that can be opened
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Device information
    pub info: TransportDeviceInfo,
}
