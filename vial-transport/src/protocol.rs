//! Protocol constants and utilities for Vial keyboard communication

use crate::types::ChecksumType;

/// Host commands (first byte of every request frame)
pub mod cmd {
    // Handshake
    pub const GET_PROTOCOL_VERSION: u8 = 0x01;
    pub const GET_KEYBOARD_ID: u8 = 0x02;
    pub const GET_MATRIX_INFO: u8 = 0x03;

    // Keymap
    pub const GET_KEYCODE: u8 = 0x04;
    pub const SET_KEYCODE: u8 = 0x05;
    pub const GET_KEYMAP_ROW: u8 = 0x06;
    pub const RESET_KEYMAP: u8 = 0x07;

    pub const BOOTLOADER_JUMP: u8 = 0x0B;

    // Unlock
    pub const UNLOCK_BEGIN: u8 = 0x10;
    pub const UNLOCK_STATUS: u8 = 0x11;
    pub const LOCK: u8 = 0x12;

    // Firmware settings
    pub const SETTINGS_QUERY: u8 = 0x20;
    pub const SETTING_GET: u8 = 0x21;
    pub const SETTING_SET: u8 = 0x22;
    pub const SETTINGS_RESET: u8 = 0x23;

    // Entity tables (macro, combo, tap dance, key override)
    pub const ENTITY_INFO: u8 = 0x30;
    pub const ENTITY_READ: u8 = 0x31;
    pub const ENTITY_WRITE: u8 = 0x32;

    /// Get command name for debugging
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            GET_PROTOCOL_VERSION => "GET_PROTOCOL_VERSION",
            GET_KEYBOARD_ID => "GET_KEYBOARD_ID",
            GET_MATRIX_INFO => "GET_MATRIX_INFO",
            GET_KEYCODE => "GET_KEYCODE",
            SET_KEYCODE => "SET_KEYCODE",
            GET_KEYMAP_ROW => "GET_KEYMAP_ROW",
            RESET_KEYMAP => "RESET_KEYMAP",
            BOOTLOADER_JUMP => "BOOTLOADER_JUMP",
            UNLOCK_BEGIN => "UNLOCK_BEGIN",
            UNLOCK_STATUS => "UNLOCK_STATUS",
            LOCK => "LOCK",
            SETTINGS_QUERY => "SETTINGS_QUERY",
            SETTING_GET => "SETTING_GET",
            SETTING_SET => "SETTING_SET",
            SETTINGS_RESET => "SETTINGS_RESET",
            ENTITY_INFO => "ENTITY_INFO",
            ENTITY_READ => "ENTITY_READ",
            ENTITY_WRITE => "ENTITY_WRITE",
            _ => "UNKNOWN",
        }
    }
}

/// Response status byte (second byte of the response payload)
pub mod status {
    pub const OK: u8 = 0x00;
    pub const REJECTED: u8 = 0x01;
    pub const UNKNOWN_COMMAND: u8 = 0x02;
    pub const OUT_OF_RANGE: u8 = 0x03;

    pub fn name(status: u8) -> &'static str {
        match status {
            OK => "OK",
            REJECTED => "REJECTED",
            UNKNOWN_COMMAND => "UNKNOWN_COMMAND",
            OUT_OF_RANGE => "OUT_OF_RANGE",
            _ => "UNKNOWN",
        }
    }
}

/// Capability flags reported by GET_PROTOCOL_VERSION
pub mod capability {
    /// Firmware can return a run of keycodes from one row in a single frame
    pub const ROW_READ: u8 = 0x01;
}

/// Unlock state byte reported by UNLOCK_STATUS
pub mod unlock_state {
    pub const LOCKED: u8 = 0;
    pub const PENDING: u8 = 1;
    pub const CONFIRMED: u8 = 2;
    pub const REJECTED: u8 = 3;
}

/// Entity table family identifiers
pub mod family {
    pub const MACRO: u8 = 0;
    pub const COMBO: u8 = 1;
    pub const TAP_DANCE: u8 = 2;
    pub const KEY_OVERRIDE: u8 = 3;
}

/// Firmware protocol versions this engine speaks
pub const MIN_PROTOCOL_VERSION: u16 = 1;
pub const MAX_PROTOCOL_VERSION: u16 = 1;

/// Raw HID report size (excluding the report ID hidapi wants on writes)
pub const REPORT_SIZE: usize = 32;

/// Bytes the dispatcher reserves in the request payload (sequence)
pub const REQUEST_HEADER_LEN: usize = 1;
/// Bytes the dispatcher reserves in the response payload (sequence, status)
pub const RESPONSE_HEADER_LEN: usize = 2;

/// HID communication timing constants
pub mod timing {
    /// Default deadline for one transaction (ms)
    pub const TRANSACTION_TIMEOUT_MS: u64 = 500;
    /// Interval between UNLOCK_STATUS polls (ms)
    pub const UNLOCK_POLL_INTERVAL_MS: u64 = 100;
    /// How long the firmware challenge window stays open (ms)
    pub const UNLOCK_WINDOW_MS: u64 = 30_000;
}

/// Device identification constants
pub mod device {
    /// Raw HID usage page used by VIA/Vial firmware
    pub const USAGE_PAGE: u16 = 0xFF60;
    /// Raw HID usage used by VIA/Vial firmware
    pub const USAGE: u16 = 0x61;
    /// Serial number marker Vial firmware advertises
    pub const SERIAL_MAGIC: &str = "vial:f64c2b3c";
}

/// Calculate the trailing checksum over `data`
pub fn calculate_checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (255 - (sum & 0xFF)) as u8
}

/// Write the checksum into the last byte of a full-size frame
pub fn apply_checksum(frame: &mut [u8], checksum_type: ChecksumType) {
    if let ChecksumType::Trailing = checksum_type {
        if let Some((last, body)) = frame.split_last_mut() {
            *last = calculate_checksum(body);
        }
    }
}

/// Verify the trailing checksum of a full-size frame
pub fn verify_checksum(frame: &[u8], checksum_type: ChecksumType) -> bool {
    match checksum_type {
        ChecksumType::Trailing => match frame.split_last() {
            Some((last, body)) => *last == calculate_checksum(body),
            None => false,
        },
        ChecksumType::None => true,
    }
}
