//! Tap-dance records: four actions and a tapping term

use std::fmt;

use serde::Serialize;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{EntityCodec, EntityKind};
use crate::error::KeyboardError;
use crate::keycode::Keycode;

/// Serialized record size
pub const RECORD_LEN: usize = 10;

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct TapDanceRecord {
    on_tap: U16,
    on_hold: U16,
    on_double_tap: U16,
    on_tap_hold: U16,
    tapping_term: U16,
}

/// What a tap-dance key does for each tap pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TapDance {
    pub on_tap: Keycode,
    pub on_hold: Keycode,
    pub on_double_tap: Keycode,
    pub on_tap_hold: Keycode,
    /// Milliseconds
    pub tapping_term: u16,
}

impl EntityCodec for TapDance {
    const KIND: EntityKind = EntityKind::TapDance;

    fn encode(&self) -> Result<Vec<u8>, KeyboardError> {
        let record = TapDanceRecord {
            on_tap: U16::new(self.on_tap.raw()),
            on_hold: U16::new(self.on_hold.raw()),
            on_double_tap: U16::new(self.on_double_tap.raw()),
            on_tap_hold: U16::new(self.on_tap_hold.raw()),
            tapping_term: U16::new(self.tapping_term),
        };
        Ok(record.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, KeyboardError> {
        let record = TapDanceRecord::read_from_bytes(bytes).map_err(|_| {
            KeyboardError::Decode(format!(
                "tap-dance record must be {RECORD_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            on_tap: Keycode(record.on_tap.get()),
            on_hold: Keycode(record.on_hold.get()),
            on_double_tap: Keycode(record.on_double_tap.get()),
            on_tap_hold: Keycode(record.on_tap_hold.get()),
            tapping_term: record.tapping_term.get(),
        })
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for TapDance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tap={} hold={} double={} tap-hold={} term={}ms",
            self.on_tap, self.on_hold, self.on_double_tap, self.on_tap_hold, self.tapping_term
        )
    }
}
