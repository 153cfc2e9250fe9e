//! Macro, combo, tap-dance and key-override command handlers.

use std::fmt::Display;

use anyhow::Context;
use serde::Serialize;
use serde_json::json;
use vial_keyboard::{
    Combo, EntityCodec, KeyOverride, Keyboard, KeyboardError, Keycode, Macro, TapDance,
};

use super::{ensure_unlocked, CommandResult, Session};
use crate::cli::SlotCommands;

/// Decoded slot contents; `None` for an empty slot
fn decode_slot<C: EntityCodec>(bytes: &[u8]) -> Result<Option<C>, KeyboardError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let value = C::decode(bytes)?;
    Ok((!value.is_empty()).then_some(value))
}

fn keycode(text: &str) -> anyhow::Result<Keycode> {
    text.trim()
        .parse()
        .with_context(|| format!("Invalid keycode \"{text}\""))
}

/// Run a list/get/clear subcommand for family `C`
pub async fn slot<C>(session: &Session, command: SlotCommands) -> CommandResult
where
    C: EntityCodec + Display + Serialize,
{
    let keyboard = session.connect_lazy().await?;
    match command {
        SlotCommands::List { all } => list::<C>(session, &keyboard, all).await,
        SlotCommands::Get { index } => get::<C>(session, &keyboard, index).await,
        SlotCommands::Clear { index } => {
            if C::KIND.is_secure() {
                ensure_unlocked(&keyboard).await?;
            }
            keyboard.entities().clear_slot(C::KIND, index).await?;
            session.emit(&json!({ "family": C::KIND, "index": index, "cleared": true }), || {
                println!("{} {} cleared", C::KIND, index);
            })
        }
    }
}

async fn list<C>(session: &Session, keyboard: &Keyboard, all: bool) -> CommandResult
where
    C: EntityCodec + Display + Serialize,
{
    let records = keyboard.entities().list(C::KIND).await?;
    let mut slots = Vec::new();
    for (index, bytes) in records.iter().enumerate() {
        match decode_slot::<C>(bytes) {
            Ok(Some(value)) => slots.push((index, Some(value), None)),
            Ok(None) if all => slots.push((index, None, None)),
            Ok(None) => {}
            Err(e) => slots.push((index, None, Some(e.to_string()))),
        }
    }

    let entries: Vec<_> = slots
        .iter()
        .map(|(index, value, error)| json!({ "index": index, "value": value, "error": error }))
        .collect();

    session.emit(&entries, || {
        if slots.is_empty() {
            println!("No {} slots in use", C::KIND);
        }
        for (index, value, error) in &slots {
            match (value, error) {
                (Some(value), _) => println!("{index:3}: {value}"),
                (None, Some(error)) => println!("{index:3}: <unreadable: {error}>"),
                (None, None) => println!("{index:3}: (empty)"),
            }
        }
    })
}

async fn get<C>(session: &Session, keyboard: &Keyboard, index: u8) -> CommandResult
where
    C: EntityCodec + Display + Serialize,
{
    let bytes = keyboard.entities().read_slot(C::KIND, index).await?;
    let value = decode_slot::<C>(&bytes)?;

    session.emit(
        &json!({ "family": C::KIND, "index": index, "value": value, "raw": bytes }),
        || {
            match &value {
                Some(value) => println!("{} {}: {}", C::KIND, index, value),
                None => println!("{} {} is empty", C::KIND, index),
            }
            if !bytes.is_empty() {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                println!("Raw ({} bytes): {}", bytes.len(), hex.join(" "));
            }
        },
    )
}

async fn write<C>(session: &Session, index: u8, value: C) -> CommandResult
where
    C: EntityCodec + Display + Serialize,
{
    let keyboard = session.connect_lazy().await?;
    if C::KIND.is_secure() {
        ensure_unlocked(&keyboard).await?;
    }
    match keyboard.entities().write(index, &value).await {
        Ok(()) => session.emit(&json!({ "family": C::KIND, "index": index, "value": value }), || {
            println!("{} {} set to {}", C::KIND, index, value);
        }),
        Err(KeyboardError::PartialWrite {
            applied,
            total,
            resynced,
        }) => {
            let now = match decode_slot::<C>(&resynced) {
                Ok(Some(v)) => v.to_string(),
                Ok(None) => "(empty)".into(),
                Err(_) => format!("{} undecodable bytes", resynced.len()),
            };
            anyhow::bail!(
                "{} {} only partly written ({applied} of {total} chunks); slot now holds {now}",
                C::KIND,
                index
            )
        }
        Err(e) => Err(e.into()),
    }
}

/// Write a macro from action text
pub async fn set_macro(session: &Session, index: u8, actions: &str) -> CommandResult {
    let value: Macro = actions.parse().context("Invalid macro")?;
    write(session, index, value).await
}

/// Write a combo from comma separated trigger keys
pub async fn set_combo(session: &Session, index: u8, keys: &str, output: &str) -> CommandResult {
    let keys = keys
        .split(',')
        .filter(|k| !k.trim().is_empty())
        .map(keycode)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let value = Combo::new(&keys, keycode(output)?)?;
    write(session, index, value).await
}

/// Write a tap dance
pub async fn set_tap_dance(
    session: &Session,
    index: u8,
    on_tap: &str,
    on_hold: &str,
    on_double_tap: &str,
    on_tap_hold: &str,
    term: u16,
) -> CommandResult {
    let value = TapDance {
        on_tap: keycode(on_tap)?,
        on_hold: keycode(on_hold)?,
        on_double_tap: keycode(on_double_tap)?,
        on_tap_hold: keycode(on_tap_hold)?,
        tapping_term: term,
    };
    write(session, index, value).await
}

/// Write a key override
#[allow(clippy::too_many_arguments)]
pub async fn set_key_override(
    session: &Session,
    index: u8,
    trigger: &str,
    replacement: &str,
    layers: u16,
    trigger_mods: u8,
    negative_mods: u8,
    suppressed_mods: u8,
    options: u8,
) -> CommandResult {
    let value = KeyOverride {
        trigger: keycode(trigger)?,
        replacement: keycode(replacement)?,
        layers,
        trigger_mods,
        negative_mod_mask: negative_mods,
        suppressed_mods,
        options,
    };
    write(session, index, value).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_slot_treats_blank_as_empty() {
        assert_eq!(decode_slot::<Combo>(&[]).unwrap(), None);
        assert_eq!(decode_slot::<Combo>(&[0; 10]).unwrap(), None);
        let combo = Combo::new(&[Keycode(0x0D), Keycode(0x0E)], Keycode(0x29)).unwrap();
        assert_eq!(
            decode_slot::<Combo>(&combo.encode().unwrap()).unwrap(),
            Some(combo)
        );
        assert!(decode_slot::<Combo>(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_keycode_argument() {
        assert_eq!(keycode(" KC_ESC ").unwrap(), Keycode(0x29));
        assert!(keycode("KC_NOPE").is_err());
    }
}
