//! Command handlers for the CLI application.
//!
//! - `device`: list, info, unlock, lock, bootloader
//! - `keymap`: keymap dump/get/set/reset
//! - `settings`: setting list/get/set/reset
//! - `entities`: macro, combo, tap-dance and key-override slots

pub mod device;
pub mod entities;
pub mod keymap;
pub mod settings;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;
use vial_keyboard::{Keyboard, KeyboardConfig, UnlockState};
use vial_transport::HidDiscovery;

use crate::cli::{parse_device_filter, Cli};

/// Result type for command handlers
pub type CommandResult = Result<()>;

/// Options every device command needs
pub struct Session {
    pub config: KeyboardConfig,
    pub filter: Option<(u16, u16)>,
    pub json: bool,
}

impl Session {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => load_config(path)?,
            None => KeyboardConfig::default(),
        };
        if cli.no_prefetch {
            config.prefetch_keymap = false;
        }
        let filter = cli
            .device
            .as_deref()
            .map(parse_device_filter)
            .transpose()
            .map_err(anyhow::Error::msg)?;
        Ok(Self {
            config,
            filter,
            json: cli.json,
        })
    }

    /// Open the first matching keyboard and handshake
    pub async fn connect(&self) -> Result<Keyboard> {
        let transport = HidDiscovery::new()
            .open_first(self.filter)
            .context("Failed to open keyboard")?;
        Keyboard::connect(transport, self.config.clone())
            .await
            .context("Handshake failed")
    }

    /// Open a keyboard without reading its keymap
    pub async fn connect_lazy(&self) -> Result<Keyboard> {
        let session = Self {
            config: KeyboardConfig {
                prefetch_keymap: false,
                ..self.config.clone()
            },
            filter: self.filter,
            json: self.json,
        };
        session.connect().await
    }

    /// Print `value` as JSON, or run `text` for human output
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> CommandResult {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}

/// Load engine configuration from a TOML file
pub fn load_config(path: &Path) -> Result<KeyboardConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = toml::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    debug!("Loaded config from {}: {:?}", path.display(), config);
    Ok(config)
}

/// Run the unlock challenge if the keyboard is not unlocked yet
pub async fn ensure_unlocked(keyboard: &Keyboard) -> CommandResult {
    if keyboard.unlock_state() == UnlockState::Unlocked {
        return Ok(());
    }
    eprintln!("Unlock required: hold the unlock keys on the keyboard...");
    keyboard.begin_unlock().await.context("Unlock failed")?;
    eprintln!("Unlocked.");
    Ok(())
}
