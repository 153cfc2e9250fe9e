//! QMK/Vial 16-bit keycodes
//!
//! A [`Keycode`] is the semantic action stored in the keymap and in entity
//! records, not a raw HID scancode. Basic HID usages occupy `0x0004..=0x00E7`;
//! higher ranges wrap them with modifiers or name layer, tap-dance and macro
//! actions.
//!
//! # Parsing syntax
//!
//! ```text
//! KC_A, a, A      → 0x0004
//! KC_NO, XXXXXXX  → 0x0000
//! KC_TRNS, _______→ 0x0001
//! 0x1234          → 0x1234       (hex literal, any value)
//! LCTL(KC_C)      → 0x0106
//! RSFT(RALT(KC_1))→ 0x161E
//! MO(1) TO(2) TG(3) DF(0)
//! TD(4)           → 0x5704
//! M7              → 0x7707
//! QK_BOOT, RESET  → 0x7C00
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Keycode range bases
pub mod range {
    pub const QK_BASIC_MAX: u16 = 0x00FF;
    pub const QK_MODS: u16 = 0x0100;
    pub const QK_MODS_MAX: u16 = 0x1FFF;
    pub const QK_TO: u16 = 0x5200;
    pub const QK_MOMENTARY: u16 = 0x5220;
    pub const QK_DEF_LAYER: u16 = 0x5240;
    pub const QK_TOGGLE_LAYER: u16 = 0x5260;
    pub const QK_TAP_DANCE: u16 = 0x5700;
    pub const QK_MACRO: u16 = 0x7700;
    pub const QK_BOOT: u16 = 0x7C00;
}

/// Modifier bits as used in the high byte of `QK_MODS` keycodes and in key
/// override modifier masks
pub mod mods {
    pub const CTRL: u8 = 0x01;
    pub const SHIFT: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const GUI: u8 = 0x08;
    /// Modifiers refer to the right-hand keys
    pub const RIGHT: u8 = 0x10;
}

/// A 16-bit QMK keycode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keycode(pub u16);

impl Keycode {
    pub const KC_NO: Keycode = Keycode(0x0000);
    pub const KC_TRNS: Keycode = Keycode(0x0001);
    /// Jump to bootloader; assigning it is a secure operation
    pub const QK_BOOT: Keycode = Keycode(range::QK_BOOT);

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self == Self::KC_NO
    }

    /// Plain HID usage with modifier bits
    pub fn with_mods(mod_bits: u8, key: u8) -> Self {
        Keycode(((mod_bits as u16 & 0x1F) << 8) | key as u16)
    }

    pub fn momentary(layer: u8) -> Self {
        Keycode(range::QK_MOMENTARY | (layer as u16 & 0x1F))
    }

    pub fn tap_dance(index: u8) -> Self {
        Keycode(range::QK_TAP_DANCE | index as u16)
    }

    pub fn macro_key(index: u8) -> Self {
        Keycode(range::QK_MACRO | index as u16)
    }
}

impl From<u16> for Keycode {
    fn from(raw: u16) -> Self {
        Keycode(raw)
    }
}

/// Names of basic HID usages, without the `KC_` prefix
#[rustfmt::skip]
const BASIC_NAMES: &[(u8, &str)] = &[
    (0x04, "A"), (0x05, "B"), (0x06, "C"), (0x07, "D"),
    (0x08, "E"), (0x09, "F"), (0x0A, "G"), (0x0B, "H"),
    (0x0C, "I"), (0x0D, "J"), (0x0E, "K"), (0x0F, "L"),
    (0x10, "M"), (0x11, "N"), (0x12, "O"), (0x13, "P"),
    (0x14, "Q"), (0x15, "R"), (0x16, "S"), (0x17, "T"),
    (0x18, "U"), (0x19, "V"), (0x1A, "W"), (0x1B, "X"),
    (0x1C, "Y"), (0x1D, "Z"),
    (0x1E, "1"), (0x1F, "2"), (0x20, "3"), (0x21, "4"),
    (0x22, "5"), (0x23, "6"), (0x24, "7"), (0x25, "8"),
    (0x26, "9"), (0x27, "0"),
    (0x28, "ENTER"), (0x29, "ESCAPE"), (0x2A, "BSPACE"),
    (0x2B, "TAB"), (0x2C, "SPACE"), (0x2D, "MINUS"), (0x2E, "EQUAL"),
    (0x2F, "LBRACKET"), (0x30, "RBRACKET"), (0x31, "BSLASH"), (0x32, "NONUS_HASH"),
    (0x33, "SCOLON"), (0x34, "QUOTE"), (0x35, "GRAVE"), (0x36, "COMMA"),
    (0x37, "DOT"), (0x38, "SLASH"), (0x39, "CAPSLOCK"),
    (0x3A, "F1"), (0x3B, "F2"), (0x3C, "F3"), (0x3D, "F4"),
    (0x3E, "F5"), (0x3F, "F6"), (0x40, "F7"), (0x41, "F8"),
    (0x42, "F9"), (0x43, "F10"), (0x44, "F11"), (0x45, "F12"),
    (0x46, "PSCREEN"), (0x47, "SCROLLLOCK"), (0x48, "PAUSE"),
    (0x49, "INSERT"), (0x4A, "HOME"), (0x4B, "PGUP"),
    (0x4C, "DELETE"), (0x4D, "END"), (0x4E, "PGDOWN"),
    (0x4F, "RIGHT"), (0x50, "LEFT"), (0x51, "DOWN"), (0x52, "UP"),
    (0x53, "NUMLOCK"), (0x54, "KP_SLASH"), (0x55, "KP_ASTERISK"), (0x56, "KP_MINUS"),
    (0x57, "KP_PLUS"), (0x58, "KP_ENTER"),
    (0x59, "KP_1"), (0x5A, "KP_2"), (0x5B, "KP_3"), (0x5C, "KP_4"),
    (0x5D, "KP_5"), (0x5E, "KP_6"), (0x5F, "KP_7"), (0x60, "KP_8"),
    (0x61, "KP_9"), (0x62, "KP_0"), (0x63, "KP_DOT"),
    (0x64, "NONUS_BSLASH"), (0x65, "APPLICATION"), (0x66, "POWER"),
    (0x67, "KP_EQUAL"),
    (0xE0, "LCTRL"), (0xE1, "LSHIFT"), (0xE2, "LALT"), (0xE3, "LGUI"),
    (0xE4, "RCTRL"), (0xE5, "RSHIFT"), (0xE6, "RALT"), (0xE7, "RGUI"),
];

/// Short aliases accepted when parsing
const ALIASES: &[(&str, u8)] = &[
    ("ENT", 0x28),
    ("ESC", 0x29),
    ("BSPC", 0x2A),
    ("SPC", 0x2C),
    ("MINS", 0x2D),
    ("EQL", 0x2E),
    ("LBRC", 0x2F),
    ("RBRC", 0x30),
    ("BSLS", 0x31),
    ("SCLN", 0x33),
    ("QUOT", 0x34),
    ("GRV", 0x35),
    ("COMM", 0x36),
    ("SLSH", 0x38),
    ("CAPS", 0x39),
    ("DEL", 0x4C),
    ("LCTL", 0xE0),
    ("LSFT", 0xE1),
    ("RCTL", 0xE4),
    ("RSFT", 0xE5),
];

/// Modifier wrapper names, left then right
const MOD_WRAPPERS: &[(u8, &str)] = &[
    (mods::CTRL, "LCTL"),
    (mods::SHIFT, "LSFT"),
    (mods::ALT, "LALT"),
    (mods::GUI, "LGUI"),
    (mods::RIGHT | mods::CTRL, "RCTL"),
    (mods::RIGHT | mods::SHIFT, "RSFT"),
    (mods::RIGHT | mods::ALT, "RALT"),
    (mods::RIGHT | mods::GUI, "RGUI"),
];

/// Name of a basic HID usage, without prefix
pub fn basic_name(code: u8) -> Option<&'static str> {
    BASIC_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

fn basic_code(name: &str) -> Option<u8> {
    let upper = name.to_ascii_uppercase();
    let bare = upper.strip_prefix("KC_").unwrap_or(&upper);
    BASIC_NAMES
        .iter()
        .find(|(_, n)| *n == bare)
        .map(|(c, _)| *c)
        .or_else(|| ALIASES.iter().find(|(n, _)| *n == bare).map(|(_, c)| *c))
}

fn fmt_basic(f: &mut fmt::Formatter<'_>, code: u8) -> fmt::Result {
    match code {
        0x00 => write!(f, "KC_NO"),
        0x01 => write!(f, "KC_TRNS"),
        _ => match basic_name(code) {
            Some(name) => write!(f, "KC_{name}"),
            None => write!(f, "0x{code:04X}"),
        },
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.0;
        match raw {
            0..=range::QK_BASIC_MAX => fmt_basic(f, raw as u8),
            range::QK_MODS..=range::QK_MODS_MAX => {
                let mod_bits = (raw >> 8) as u8;
                let side = mod_bits & mods::RIGHT;
                let mut open = 0;
                for &(bits, name) in MOD_WRAPPERS {
                    if bits & mods::RIGHT == side && mod_bits & bits & 0x0F != 0 {
                        write!(f, "{name}(")?;
                        open += 1;
                    }
                }
                fmt_basic(f, raw as u8)?;
                for _ in 0..open {
                    write!(f, ")")?;
                }
                Ok(())
            }
            0x5200..=0x527F => {
                let layer = raw & 0x1F;
                let op = match raw & 0xFFE0 {
                    range::QK_TO => "TO",
                    range::QK_MOMENTARY => "MO",
                    range::QK_DEF_LAYER => "DF",
                    _ => "TG",
                };
                write!(f, "{op}({layer})")
            }
            0x5700..=0x57FF => write!(f, "TD({})", raw & 0xFF),
            0x7700..=0x77FF => write!(f, "M{}", raw & 0xFF),
            range::QK_BOOT => write!(f, "QK_BOOT"),
            _ => write!(f, "0x{raw:04X}"),
        }
    }
}

/// Error type for parsing a [`Keycode`] from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseKeycodeError {
    UnknownKey(String),
    InvalidHexCode,
    InvalidIndex(String),
    /// Modifier wrapper around something that is not a basic key
    InvalidModTarget(String),
}

impl fmt::Display for ParseKeycodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey(name) => write!(f, "unknown keycode: \"{name}\""),
            Self::InvalidHexCode => write!(f, "invalid hex keycode"),
            Self::InvalidIndex(s) => write!(f, "invalid index in \"{s}\""),
            Self::InvalidModTarget(s) => write!(f, "cannot apply modifier in \"{s}\""),
        }
    }
}

impl std::error::Error for ParseKeycodeError {}

/// Split `NAME(inner)` into its parts
fn call_syntax(s: &str) -> Option<(&str, &str)> {
    let open = s.find('(')?;
    let inner = s.strip_suffix(')')?;
    Some((&s[..open], &inner[open + 1..]))
}

fn parse_index(s: &str, whole: &str, max: u16) -> Result<u16, ParseKeycodeError> {
    match s.trim().parse::<u16>() {
        Ok(n) if n <= max => Ok(n),
        _ => Err(ParseKeycodeError::InvalidIndex(whole.to_string())),
    }
}

impl FromStr for Keycode {
    type Err = ParseKeycodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let upper = s.to_ascii_uppercase();

        match upper.as_str() {
            "KC_NO" | "NO" | "XXXXXXX" | "NONE" => return Ok(Keycode::KC_NO),
            "KC_TRNS" | "KC_TRANSPARENT" | "TRNS" | "_______" => return Ok(Keycode::KC_TRNS),
            "QK_BOOT" | "RESET" | "QK_BOOTLOADER" => return Ok(Keycode::QK_BOOT),
            _ => {}
        }

        if let Some(hex) = upper.strip_prefix("0X") {
            let raw = u16::from_str_radix(hex, 16).map_err(|_| ParseKeycodeError::InvalidHexCode)?;
            return Ok(Keycode(raw));
        }

        if let Some((name, inner)) = call_syntax(&upper) {
            let layer_base = match name {
                "TO" => Some(range::QK_TO),
                "MO" => Some(range::QK_MOMENTARY),
                "DF" => Some(range::QK_DEF_LAYER),
                "TG" => Some(range::QK_TOGGLE_LAYER),
                _ => None,
            };
            if let Some(base) = layer_base {
                return Ok(Keycode(base | parse_index(inner, s, 0x1F)?));
            }
            if name == "TD" {
                return Ok(Keycode(range::QK_TAP_DANCE | parse_index(inner, s, 0xFF)?));
            }
            if let Some(&(bits, _)) = MOD_WRAPPERS.iter().find(|(_, n)| *n == name) {
                let target: Keycode = inner.parse()?;
                if target.0 > range::QK_MODS_MAX {
                    return Err(ParseKeycodeError::InvalidModTarget(s.to_string()));
                }
                let inner_mods = (target.0 >> 8) as u8;
                if inner_mods != 0 && inner_mods & mods::RIGHT != bits & mods::RIGHT {
                    return Err(ParseKeycodeError::InvalidModTarget(s.to_string()));
                }
                return Ok(Keycode::with_mods(inner_mods | bits, target.0 as u8));
            }
            return Err(ParseKeycodeError::UnknownKey(s.to_string()));
        }

        if let Some(digits) = upper.strip_prefix('M') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return Ok(Keycode(range::QK_MACRO | parse_index(digits, s, 0xFF)?));
            }
        }

        basic_code(&upper)
            .map(|code| Keycode(code as u16))
            .ok_or_else(|| ParseKeycodeError::UnknownKey(s.to_string()))
    }
}
