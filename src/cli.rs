// CLI definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vialkb")]
#[command(author, version, about = "Configure Vial keyboards over raw HID")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only use the keyboard with this VID:PID (hex, e.g. 4653:0001)
    #[arg(long, short = 'd', global = true, value_name = "VID:PID")]
    pub device: Option<String>,

    /// Print machine readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Skip reading the whole keymap at connect
    #[arg(long, global = true)]
    pub no_prefetch: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List attached Vial keyboards
    #[command(visible_alias = "ls")]
    List {
        /// Include VIA boards without the Vial serial marker
        #[arg(long)]
        all: bool,
    },

    /// Show protocol version, UID, matrix and entity tables
    #[command(visible_aliases = ["version", "i"])]
    Info,

    /// Run the unlock challenge (hold the unlock keys on the keyboard)
    Unlock,

    /// Re-lock the keyboard
    Lock,

    /// Unlock and jump to the bootloader
    #[command(visible_alias = "boot")]
    Bootloader,

    /// Keymap commands
    #[command(subcommand, visible_alias = "km")]
    Keymap(KeymapCommands),

    /// Firmware settings (QMK settings)
    #[command(subcommand, visible_alias = "set")]
    Setting(SettingCommands),

    /// Macro slots
    #[command(subcommand)]
    Macro(MacroCommands),

    /// Combo slots
    #[command(subcommand)]
    Combo(ComboCommands),

    /// Tap dance slots
    #[command(subcommand, visible_alias = "td")]
    TapDance(TapDanceCommands),

    /// Key override slots
    #[command(subcommand, visible_alias = "ko")]
    KeyOverride(KeyOverrideCommands),
}

/// Matrix position
#[derive(Args, Clone, Copy)]
pub struct KeyPos {
    /// Layer
    pub layer: u8,
    /// Row
    pub row: u8,
    /// Column
    pub col: u8,
}

#[derive(Subcommand)]
pub enum KeymapCommands {
    /// Print the keymap (all layers, or one)
    Dump {
        /// Only this layer
        #[arg(short, long)]
        layer: Option<u8>,
    },

    /// Show the keycode at a position
    Get {
        #[command(flatten)]
        pos: KeyPos,
        /// Read from the keyboard even if the value is known
        #[arg(long)]
        refresh: bool,
    },

    /// Assign a keycode (e.g. KC_ESC, LCTL(KC_C), MO(1), 0x7C00)
    Set {
        #[command(flatten)]
        pos: KeyPos,
        keycode: String,
    },

    /// Restore the firmware's default keymap (unlocks first)
    Reset,
}

#[derive(Subcommand)]
pub enum SettingCommands {
    /// List settings the keyboard supports, with current values
    List,

    /// Read a setting by name or id
    Get { name: String },

    /// Write a setting by name or id
    Set { name: String, value: String },

    /// Restore firmware defaults for all settings
    Reset,
}

/// Subcommands shared by every entity family
#[derive(Subcommand)]
pub enum SlotCommands {
    /// Show every slot
    List {
        /// Include empty slots
        #[arg(short, long)]
        all: bool,
    },

    /// Show one slot
    Get { index: u8 },

    /// Empty a slot
    Clear { index: u8 },
}

#[derive(Subcommand)]
pub enum MacroCommands {
    #[command(flatten)]
    Slot(SlotCommands),

    /// Write a macro (unlocks first)
    ///
    /// Steps are comma separated: KC_A (tap), down:KC_LSFT, up:KC_LSFT,
    /// 50ms or delay:50, "typed text" or text:typed.
    Set { index: u8, actions: String },
}

#[derive(Subcommand)]
pub enum ComboCommands {
    #[command(flatten)]
    Slot(SlotCommands),

    /// Write a combo: up to four trigger keys and the output
    Set {
        index: u8,
        /// Trigger keys, comma separated (e.g. KC_J,KC_K)
        keys: String,
        /// Output keycode
        output: String,
    },
}

#[derive(Subcommand)]
pub enum TapDanceCommands {
    #[command(flatten)]
    Slot(SlotCommands),

    /// Write a tap dance
    Set {
        index: u8,
        /// Keycode on tap
        on_tap: String,
        /// Keycode on hold
        #[arg(long, default_value = "KC_NO")]
        on_hold: String,
        /// Keycode on double tap
        #[arg(long, default_value = "KC_NO")]
        on_double_tap: String,
        /// Keycode on tap then hold
        #[arg(long, default_value = "KC_NO")]
        on_tap_hold: String,
        /// Tapping term in milliseconds
        #[arg(long, default_value = "200")]
        term: u16,
    },
}

#[derive(Subcommand)]
pub enum KeyOverrideCommands {
    #[command(flatten)]
    Slot(SlotCommands),

    /// Write a key override
    Set {
        index: u8,
        /// Trigger keycode
        trigger: String,
        /// Replacement keycode
        replacement: String,
        /// Layer mask (bit per layer)
        #[arg(long, default_value = "0xFFFF", value_parser = parse_u16)]
        layers: u16,
        /// Modifiers that must be held (QMK mod bits)
        #[arg(long, default_value = "0", value_parser = parse_u8)]
        trigger_mods: u8,
        /// Modifiers that must not be held
        #[arg(long, default_value = "0", value_parser = parse_u8)]
        negative_mods: u8,
        /// Modifiers suppressed while active
        #[arg(long, default_value = "0", value_parser = parse_u8)]
        suppressed_mods: u8,
        /// Option bits; 0x80 enables the override
        #[arg(long, default_value = "0x80", value_parser = parse_u8)]
        options: u8,
    },
}

fn parse_int(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number \"{s}\": {e}"))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    u8::try_from(parse_int(s)?).map_err(|_| format!("{s} does not fit in a byte"))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    u16::try_from(parse_int(s)?).map_err(|_| format!("{s} does not fit in 16 bits"))
}

/// Parse a `VID:PID` filter in hex
pub fn parse_device_filter(s: &str) -> Result<(u16, u16), String> {
    let (vid, pid) = s
        .split_once(':')
        .ok_or_else(|| format!("expected VID:PID, got \"{s}\""))?;
    let hex = |part: &str| {
        u16::from_str_radix(part.trim().trim_start_matches("0x"), 16)
            .map_err(|e| format!("invalid id \"{part}\": {e}"))
    };
    Ok((hex(vid)?, hex(pid)?))
}
