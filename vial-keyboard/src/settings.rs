//! Configuration registry: typed firmware settings
//!
//! The wire value of a setting is not self-describing; its width and meaning
//! come from the identifier, looked up in [`SETTINGS`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};
use zerocopy::IntoBytes;

use vial_transport::command::SettingIdData;
use vial_transport::protocol::cmd;
use vial_transport::Dispatcher;

use crate::error::KeyboardError;

/// Value type of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    U8,
    U16,
    U32,
    /// One byte indexing into the listed variant names
    Enum(&'static [&'static str]),
}

impl SettingKind {
    /// Bytes on the wire
    pub fn width(&self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::Enum(_) => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// A known firmware setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDef {
    pub id: u16,
    pub name: &'static str,
    pub kind: SettingKind,
}

const DEBOUNCE_TYPES: &[&str] = &["sym_defer_g", "sym_eager_pk", "asym_eager_defer_pk"];

/// Settings this host knows how to interpret
pub const SETTINGS: &[SettingDef] = &[
    SettingDef { id: 1, name: "grave_esc_override", kind: SettingKind::U8 },
    SettingDef { id: 2, name: "combo_term", kind: SettingKind::U16 },
    SettingDef { id: 3, name: "auto_shift", kind: SettingKind::U8 },
    SettingDef { id: 4, name: "auto_shift_timeout", kind: SettingKind::U16 },
    SettingDef { id: 5, name: "oneshot_tap_toggle", kind: SettingKind::U8 },
    SettingDef { id: 6, name: "oneshot_timeout", kind: SettingKind::U16 },
    SettingDef { id: 7, name: "tapping_term", kind: SettingKind::U16 },
    SettingDef { id: 8, name: "tapping_flags", kind: SettingKind::U8 },
    SettingDef { id: 9, name: "mousekey_delay", kind: SettingKind::U16 },
    SettingDef { id: 10, name: "mousekey_interval", kind: SettingKind::U16 },
    SettingDef { id: 18, name: "tap_code_delay", kind: SettingKind::U16 },
    SettingDef { id: 19, name: "tap_hold_caps_delay", kind: SettingKind::U16 },
    SettingDef { id: 20, name: "tapping_toggle", kind: SettingKind::U8 },
    SettingDef { id: 21, name: "magic_swap_ctl_gui", kind: SettingKind::Bool },
    SettingDef { id: 22, name: "debounce_type", kind: SettingKind::Enum(DEBOUNCE_TYPES) },
    SettingDef { id: 23, name: "idle_sleep_ms", kind: SettingKind::U32 },
];

/// Look up a setting by numeric id
pub fn lookup(id: u16) -> Option<&'static SettingDef> {
    SETTINGS.iter().find(|def| def.id == id)
}

/// Look up a setting by name or decimal id
pub fn lookup_name(name: &str) -> Option<&'static SettingDef> {
    SETTINGS
        .iter()
        .find(|def| def.name.eq_ignore_ascii_case(name))
        .or_else(|| name.parse().ok().and_then(lookup))
}

/// A typed setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    Enum(u8),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::Enum(v) => write!(f, "#{v}"),
        }
    }
}

impl SettingValue {
    /// Decode the little-endian wire value for `def`
    pub fn decode(def: &SettingDef, data: &[u8]) -> Result<Self, KeyboardError> {
        let width = def.kind.width();
        let bytes = data.get(..width).ok_or_else(|| {
            KeyboardError::UnexpectedResponse(format!(
                "{}: expected {} value bytes, got {}",
                def.name,
                width,
                data.len()
            ))
        })?;
        Ok(match def.kind {
            SettingKind::Bool => Self::Bool(bytes[0] != 0),
            SettingKind::U8 => Self::U8(bytes[0]),
            SettingKind::U16 => Self::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
            SettingKind::U32 => {
                Self::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            SettingKind::Enum(_) => Self::Enum(bytes[0]),
        })
    }

    /// Encode for `def`, rejecting a value of the wrong type
    pub fn encode(&self, def: &SettingDef) -> Result<Vec<u8>, KeyboardError> {
        match (def.kind, *self) {
            (SettingKind::Bool, Self::Bool(v)) => Ok(vec![v as u8]),
            (SettingKind::U8, Self::U8(v)) => Ok(vec![v]),
            (SettingKind::U16, Self::U16(v)) => Ok(v.to_le_bytes().to_vec()),
            (SettingKind::U32, Self::U32(v)) => Ok(v.to_le_bytes().to_vec()),
            (SettingKind::Enum(variants), Self::Enum(v)) if (v as usize) < variants.len() => {
                Ok(vec![v])
            }
            (SettingKind::Enum(variants), Self::Enum(v)) => Err(KeyboardError::InvalidValue(
                format!("{}: variant {} of {}", def.name, v, variants.len()),
            )),
            (kind, value) => Err(KeyboardError::InvalidValue(format!(
                "{}: {:?} is not a {:?}",
                def.name, value, kind
            ))),
        }
    }

    /// Parse user text as a value of `def`'s type
    pub fn parse(def: &SettingDef, text: &str) -> Result<Self, KeyboardError> {
        let text = text.trim();
        let invalid = || KeyboardError::InvalidValue(format!("{}: \"{}\"", def.name, text));
        match def.kind {
            SettingKind::Bool => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Ok(Self::Bool(true)),
                "0" | "false" | "off" | "no" => Ok(Self::Bool(false)),
                _ => Err(invalid()),
            },
            SettingKind::U8 => text.parse().map(Self::U8).map_err(|_| invalid()),
            SettingKind::U16 => text.parse().map(Self::U16).map_err(|_| invalid()),
            SettingKind::U32 => text.parse().map(Self::U32).map_err(|_| invalid()),
            SettingKind::Enum(variants) => variants
                .iter()
                .position(|v| v.eq_ignore_ascii_case(text))
                .map(|i| Self::Enum(i as u8))
                .or_else(|| text.parse().ok().map(Self::Enum))
                .ok_or_else(invalid),
        }
    }

    /// Human readable form using `def`'s variant names
    pub fn display_for(&self, def: &SettingDef) -> String {
        match (def.kind, self) {
            (SettingKind::Enum(variants), Self::Enum(v)) => variants
                .get(*v as usize)
                .map(|s| s.to_string())
                .unwrap_or_else(|| self.to_string()),
            _ => self.to_string(),
        }
    }
}

fn require_def(id: u16) -> Result<&'static SettingDef, KeyboardError> {
    lookup(id).ok_or_else(|| KeyboardError::InvalidValue(format!("unknown setting id {id}")))
}

/// Typed get/set of firmware settings with a last-confirmed-value cache
pub struct ConfigRegistry {
    dispatcher: Arc<Dispatcher>,
    cache: RwLock<HashMap<u16, SettingValue>>,
}

impl ConfigRegistry {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Read a setting from firmware
    ///
    /// Always a transaction; settings may change behind this host's back.
    pub async fn get(&self, id: u16) -> Result<SettingValue, KeyboardError> {
        let def = require_def(id)?;
        let resp = self
            .dispatcher
            .query(cmd::SETTING_GET, SettingIdData::new(id).as_bytes())
            .await?;
        let value = SettingValue::decode(def, &resp)?;
        self.cache.write().insert(id, value);
        Ok(value)
    }

    /// Write a setting; the cache changes only once the firmware accepts it
    pub async fn set(&self, id: u16, value: SettingValue) -> Result<(), KeyboardError> {
        let def = require_def(id)?;
        let mut body = SettingIdData::new(id).as_bytes().to_vec();
        body.extend_from_slice(&value.encode(def)?);

        match self.dispatcher.query(cmd::SETTING_SET, &body).await {
            Ok(_) => {
                debug!("{} = {}", def.name, value.display_for(def));
                self.cache.write().insert(id, value);
                Ok(())
            }
            Err(e) => {
                if !matches!(e, vial_transport::TransportError::RejectedByFirmware { .. }) {
                    // Outcome unknown; drop the cached value rather than guess
                    self.cache.write().remove(&id);
                }
                Err(e.into())
            }
        }
    }

    /// Last value confirmed by firmware, if any
    pub fn cached(&self, id: u16) -> Option<SettingValue> {
        self.cache.read().get(&id).copied()
    }

    /// Settings the firmware reports that this host can interpret
    pub async fn supported(&self) -> Result<Vec<&'static SettingDef>, KeyboardError> {
        let mut ids = Vec::new();
        let mut start = 0u16;
        'pages: loop {
            let resp = self
                .dispatcher
                .query(cmd::SETTINGS_QUERY, SettingIdData::new(start).as_bytes())
                .await?;
            let mut last = None;
            for pair in resp.chunks_exact(2) {
                let id = u16::from_le_bytes([pair[0], pair[1]]);
                if id == 0xFFFF {
                    break 'pages;
                }
                ids.push(id);
                last = Some(id);
            }
            match last {
                Some(id) if id >= start && id < 0xFFFE => start = id + 1,
                _ => break,
            }
        }

        let mut defs = Vec::new();
        for id in ids {
            match lookup(id) {
                Some(def) => defs.push(def),
                None => debug!("Skipping unknown setting id {}", id),
            }
        }
        Ok(defs)
    }

    /// Restore firmware defaults and forget cached values
    pub async fn reset(&self) -> Result<(), KeyboardError> {
        let result = self.dispatcher.query(cmd::SETTINGS_RESET, &[]).await;
        self.cache.write().clear();
        result?;
        info!("Settings reset to firmware defaults");
        Ok(())
    }
}
