//! Macro records
//!
//! A macro is a sequence of tagged actions:
//!
//! ```text
//! 0x01 kc_lo kc_hi        tap
//! 0x02 kc_lo kc_hi        press
//! 0x03 kc_lo kc_hi        release
//! 0x04 ms_lo ms_hi        delay
//! 0x05 len bytes[len]     type UTF-8 text
//! ```
//!
//! # Text syntax
//!
//! ```text
//! KC_A,tap:KC_B            tap keys
//! down:KC_LSFT,A,up:KC_LSFT
//! 50ms, delay:50           delays
//! "hello, world", text:hi  typed text
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::{EntityCodec, EntityKind};
use crate::error::KeyboardError;
use crate::keycode::Keycode;

mod tag {
    pub const TAP: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const UP: u8 = 0x03;
    pub const DELAY: u8 = 0x04;
    pub const TEXT: u8 = 0x05;
}

/// One step of a macro
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "value", rename_all = "lowercase")]
pub enum MacroAction {
    Tap(Keycode),
    Down(Keycode),
    Up(Keycode),
    /// Milliseconds
    Delay(u16),
    Text(String),
}

/// A macro slot's contents
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Macro {
    pub actions: Vec<MacroAction>,
}

impl Macro {
    pub fn new(actions: Vec<MacroAction>) -> Self {
        Self { actions }
    }
}

fn truncated(at: usize) -> KeyboardError {
    KeyboardError::Decode(format!("macro record truncated at byte {at}"))
}

impl EntityCodec for Macro {
    const KIND: EntityKind = EntityKind::Macro;

    fn encode(&self) -> Result<Vec<u8>, KeyboardError> {
        let mut out = Vec::new();
        for action in &self.actions {
            match action {
                MacroAction::Tap(kc) => {
                    out.push(tag::TAP);
                    out.extend_from_slice(&kc.raw().to_le_bytes());
                }
                MacroAction::Down(kc) => {
                    out.push(tag::DOWN);
                    out.extend_from_slice(&kc.raw().to_le_bytes());
                }
                MacroAction::Up(kc) => {
                    out.push(tag::UP);
                    out.extend_from_slice(&kc.raw().to_le_bytes());
                }
                MacroAction::Delay(ms) => {
                    out.push(tag::DELAY);
                    out.extend_from_slice(&ms.to_le_bytes());
                }
                MacroAction::Text(text) => {
                    let len = u8::try_from(text.len()).map_err(|_| {
                        KeyboardError::InvalidValue(format!(
                            "macro text of {} bytes exceeds 255",
                            text.len()
                        ))
                    })?;
                    out.push(tag::TEXT);
                    out.push(len);
                    out.extend_from_slice(text.as_bytes());
                }
            }
        }
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self, KeyboardError> {
        let mut actions = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let tag = bytes[pos];
            pos += 1;
            match tag {
                tag::TAP | tag::DOWN | tag::UP | tag::DELAY => {
                    let arg = bytes.get(pos..pos + 2).ok_or_else(|| truncated(pos))?;
                    let value = u16::from_le_bytes([arg[0], arg[1]]);
                    pos += 2;
                    actions.push(match tag {
                        tag::TAP => MacroAction::Tap(Keycode(value)),
                        tag::DOWN => MacroAction::Down(Keycode(value)),
                        tag::UP => MacroAction::Up(Keycode(value)),
                        _ => MacroAction::Delay(value),
                    });
                }
                tag::TEXT => {
                    let len = *bytes.get(pos).ok_or_else(|| truncated(pos))? as usize;
                    pos += 1;
                    let raw = bytes.get(pos..pos + len).ok_or_else(|| truncated(pos))?;
                    let text = std::str::from_utf8(raw).map_err(|e| {
                        KeyboardError::Decode(format!("macro text at byte {pos}: {e}"))
                    })?;
                    actions.push(MacroAction::Text(text.to_string()));
                    pos += len;
                }
                other => {
                    return Err(KeyboardError::Decode(format!(
                        "unknown macro action 0x{:02X} at byte {}",
                        other,
                        pos - 1
                    )));
                }
            }
        }
        Ok(Self { actions })
    }

    fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Display for MacroAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tap(kc) => write!(f, "{kc}"),
            Self::Down(kc) => write!(f, "down:{kc}"),
            Self::Up(kc) => write!(f, "up:{kc}"),
            Self::Delay(ms) => write!(f, "{ms}ms"),
            Self::Text(text) => write!(f, "\"{text}\""),
        }
    }
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{action}")?;
        }
        Ok(())
    }
}

/// Split on commas outside double quotes
fn split_steps(s: &str) -> Vec<&str> {
    let mut steps = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                steps.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    steps.push(&s[start..]);
    steps
}

fn parse_keycode(s: &str) -> Result<Keycode, KeyboardError> {
    s.parse()
        .map_err(|e| KeyboardError::InvalidValue(format!("macro step: {e}")))
}

fn parse_delay(s: &str) -> Result<MacroAction, KeyboardError> {
    s.trim()
        .parse()
        .map(MacroAction::Delay)
        .map_err(|_| KeyboardError::InvalidValue(format!("invalid delay \"{s}\"")))
}

impl FromStr for MacroAction {
    type Err = KeyboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(text) = s.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            return Ok(Self::Text(text.to_string()));
        }
        if let Some((kind, arg)) = s.split_once(':') {
            return match kind.trim().to_ascii_lowercase().as_str() {
                "tap" => parse_keycode(arg).map(Self::Tap),
                "down" | "press" => parse_keycode(arg).map(Self::Down),
                "up" | "release" => parse_keycode(arg).map(Self::Up),
                "delay" => parse_delay(arg),
                "text" => Ok(Self::Text(arg.to_string())),
                other => Err(KeyboardError::InvalidValue(format!(
                    "unknown macro step kind \"{other}\""
                ))),
            };
        }
        if let Some(ms) = s.strip_suffix("ms") {
            if !ms.is_empty() && ms.bytes().all(|b| b.is_ascii_digit()) {
                return parse_delay(ms);
            }
        }
        parse_keycode(s).map(Self::Tap)
    }
}

impl FromStr for Macro {
    type Err = KeyboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let actions = split_steps(s)
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<MacroAction>, _>>()?;
        Ok(Self { actions })
    }
}
