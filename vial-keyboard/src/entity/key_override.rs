//! Key-override records

use std::fmt;

use serde::Serialize;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{EntityCodec, EntityKind};
use crate::error::KeyboardError;
use crate::keycode::Keycode;

/// Serialized record size
pub const RECORD_LEN: usize = 10;

/// Option bits
pub mod options {
    pub const ACTIVATION_TRIGGER_DOWN: u8 = 0x01;
    pub const ACTIVATION_REQUIRED_MOD_DOWN: u8 = 0x02;
    pub const ACTIVATION_NEGATIVE_MOD_UP: u8 = 0x04;
    pub const ONE_MOD: u8 = 0x08;
    pub const NO_REREGISTER_TRIGGER: u8 = 0x10;
    pub const NO_UNREGISTER_ON_OTHER_KEY_DOWN: u8 = 0x20;
    pub const ENABLED: u8 = 0x80;
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct KeyOverrideRecord {
    trigger: U16,
    replacement: U16,
    layers: U16,
    trigger_mods: u8,
    negative_mod_mask: u8,
    suppressed_mods: u8,
    options: u8,
}

/// Replace `trigger` with `replacement` while `trigger_mods` are held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct KeyOverride {
    pub trigger: Keycode,
    pub replacement: Keycode,
    /// Bit per layer on which the override is active
    pub layers: u16,
    pub trigger_mods: u8,
    pub negative_mod_mask: u8,
    pub suppressed_mods: u8,
    pub options: u8,
}

impl KeyOverride {
    pub fn enabled(&self) -> bool {
        self.options & options::ENABLED != 0
    }
}

impl EntityCodec for KeyOverride {
    const KIND: EntityKind = EntityKind::KeyOverride;

    fn encode(&self) -> Result<Vec<u8>, KeyboardError> {
        let record = KeyOverrideRecord {
            trigger: U16::new(self.trigger.raw()),
            replacement: U16::new(self.replacement.raw()),
            layers: U16::new(self.layers),
            trigger_mods: self.trigger_mods,
            negative_mod_mask: self.negative_mod_mask,
            suppressed_mods: self.suppressed_mods,
            options: self.options,
        };
        Ok(record.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, KeyboardError> {
        let record = KeyOverrideRecord::read_from_bytes(bytes).map_err(|_| {
            KeyboardError::Decode(format!(
                "key-override record must be {RECORD_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            trigger: Keycode(record.trigger.get()),
            replacement: Keycode(record.replacement.get()),
            layers: record.layers.get(),
            trigger_mods: record.trigger_mods,
            negative_mod_mask: record.negative_mod_mask,
            suppressed_mods: record.suppressed_mods,
            options: record.options,
        })
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for KeyOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} layers=0x{:04X} mods=0x{:02X} negative=0x{:02X} suppressed=0x{:02X}{}",
            self.trigger,
            self.replacement,
            self.layers,
            self.trigger_mods,
            self.negative_mod_mask,
            self.suppressed_mods,
            if self.enabled() { "" } else { " (disabled)" }
        )
    }
}
