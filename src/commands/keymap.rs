//! Keymap command handlers.

use anyhow::{bail, Context};
use serde_json::json;
use vial_keyboard::{Keycode, Keymap};

use super::{ensure_unlocked, CommandResult, Session};
use crate::cli::KeyPos;

fn layer_names(keymap: &Keymap, layer: u8) -> Vec<Vec<String>> {
    keymap
        .layer(layer)
        .iter()
        .map(|row| row.iter().map(|kc| kc.to_string()).collect())
        .collect()
}

/// Print the keymap as a grid per layer
pub async fn dump(session: &Session, layer: Option<u8>) -> CommandResult {
    let keyboard = session.connect().await?;
    let keymap = match keyboard.keymap().snapshot() {
        Some(keymap) => keymap,
        None => keyboard.keymap().fetch_full().await?,
    };
    let info = keymap.info;

    let layers: Vec<u8> = match layer {
        Some(l) if l >= info.layers => {
            bail!("Layer {} out of range (keyboard has {})", l, info.layers)
        }
        Some(l) => vec![l],
        None => (0..info.layers).collect(),
    };

    let grids: Vec<_> = layers
        .iter()
        .map(|&l| json!({ "layer": l, "rows": layer_names(&keymap, l) }))
        .collect();

    session.emit(&grids, || {
        for &l in &layers {
            println!("Layer {l}:");
            for (row, names) in layer_names(&keymap, l).iter().enumerate() {
                let cells: Vec<String> = names.iter().map(|n| format!("{n:<10}")).collect();
                println!("  {row:2}: {}", cells.join(" ").trim_end());
            }
            println!();
        }
    })
}

/// Show the keycode at one position
pub async fn get(session: &Session, pos: KeyPos, refresh: bool) -> CommandResult {
    let keyboard = session.connect_lazy().await?;
    let keymap = keyboard.keymap();
    let code = if refresh {
        keymap.refresh_key(pos.layer, pos.row, pos.col).await?
    } else {
        keymap.get_key(pos.layer, pos.row, pos.col).await?
    };

    session.emit(
        &json!({
            "layer": pos.layer,
            "row": pos.row,
            "col": pos.col,
            "keycode": code.raw(),
            "name": code.to_string(),
        }),
        || {
            println!(
                "Layer {} ({},{}): {} (0x{:04X})",
                pos.layer,
                pos.row,
                pos.col,
                code,
                code.raw()
            );
        },
    )
}

/// Assign a keycode
pub async fn set(session: &Session, pos: KeyPos, keycode: &str) -> CommandResult {
    let code: Keycode = keycode
        .parse()
        .with_context(|| format!("Invalid keycode \"{keycode}\""))?;
    let keyboard = session.connect_lazy().await?;
    if code == Keycode::QK_BOOT {
        ensure_unlocked(&keyboard).await?;
    }
    keyboard
        .keymap()
        .set_key(pos.layer, pos.row, pos.col, code)
        .await?;

    session.emit(&json!({ "keycode": code.raw(), "name": code.to_string() }), || {
        println!(
            "Layer {} ({},{}) set to {}",
            pos.layer, pos.row, pos.col, code
        );
    })
}

/// Restore the default keymap
pub async fn reset(session: &Session) -> CommandResult {
    let keyboard = session.connect_lazy().await?;
    ensure_unlocked(&keyboard).await?;
    keyboard.keymap().reset().await?;
    session.emit(&json!({ "reset": true }), || {
        println!("Keymap restored to firmware default");
    })
}
