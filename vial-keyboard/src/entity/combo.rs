//! Combo records: up to four trigger keys and one output

use std::fmt;

use serde::Serialize;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{EntityCodec, EntityKind};
use crate::error::KeyboardError;
use crate::keycode::Keycode;

/// Trigger keys per combo
pub const MAX_KEYS: usize = 4;

/// Serialized record size
pub const RECORD_LEN: usize = 10;

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct ComboRecord {
    keys: [U16; MAX_KEYS],
    output: U16,
}

/// A key chord and the keycode it produces
///
/// Unused trigger positions hold `KC_NO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Combo {
    pub keys: [Keycode; MAX_KEYS],
    pub output: Keycode,
}

impl Combo {
    /// Build from up to four trigger keys
    pub fn new(keys: &[Keycode], output: Keycode) -> Result<Self, KeyboardError> {
        if keys.len() > MAX_KEYS {
            return Err(KeyboardError::InvalidValue(format!(
                "combo takes at most {MAX_KEYS} keys, got {}",
                keys.len()
            )));
        }
        let mut slots = [Keycode::KC_NO; MAX_KEYS];
        slots[..keys.len()].copy_from_slice(keys);
        Ok(Self {
            keys: slots,
            output,
        })
    }
}

impl EntityCodec for Combo {
    const KIND: EntityKind = EntityKind::Combo;

    fn encode(&self) -> Result<Vec<u8>, KeyboardError> {
        let record = ComboRecord {
            keys: self.keys.map(|k| U16::new(k.raw())),
            output: U16::new(self.output.raw()),
        };
        Ok(record.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, KeyboardError> {
        let record = ComboRecord::read_from_bytes(bytes).map_err(|_| {
            KeyboardError::Decode(format!(
                "combo record must be {RECORD_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            keys: record.keys.map(|k| Keycode(k.get())),
            output: Keycode(record.output.get()),
        })
    }

    fn is_empty(&self) -> bool {
        self.keys.iter().all(|k| k.is_none()) && self.output.is_none()
    }
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .keys
            .iter()
            .filter(|k| !k.is_none())
            .map(|k| k.to_string())
            .collect();
        write!(f, "{} -> {}", keys.join(" + "), self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(std::mem::size_of::<ComboRecord>(), RECORD_LEN);
        let combo = Combo::new(&[Keycode(0x04), Keycode(0x05)], Keycode(0x29)).unwrap();
        assert_eq!(
            combo.encode().unwrap(),
            vec![0x04, 0, 0x05, 0, 0, 0, 0, 0, 0x29, 0]
        );
        assert_eq!(combo.to_string(), "KC_A + KC_B -> KC_ESCAPE");
    }

    #[test]
    fn test_too_many_keys() {
        assert!(Combo::new(&[Keycode(4); 5], Keycode(5)).is_err());
    }

    #[test]
    fn test_wrong_length() {
        assert!(matches!(
            Combo::decode(&[0; 9]),
            Err(KeyboardError::Decode(_))
        ));
    }
}
