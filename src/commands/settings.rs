//! Firmware setting command handlers.

use anyhow::anyhow;
use serde_json::json;
use vial_keyboard::settings::lookup_name;
use vial_keyboard::{SettingDef, SettingValue};

use super::{CommandResult, Session};

fn resolve(name: &str) -> anyhow::Result<&'static SettingDef> {
    lookup_name(name).ok_or_else(|| anyhow!("Unknown setting \"{name}\""))
}

/// List supported settings with their current values
pub async fn list(session: &Session) -> CommandResult {
    let keyboard = session.connect_lazy().await?;
    let settings = keyboard.settings();

    let mut rows = Vec::new();
    for def in settings.supported().await? {
        let value = settings.get(def.id).await?;
        rows.push((def, value));
    }

    let entries: Vec<_> = rows
        .iter()
        .map(|(def, value)| {
            json!({ "id": def.id, "name": def.name, "value": value.display_for(def) })
        })
        .collect();

    session.emit(&entries, || {
        if rows.is_empty() {
            println!("Keyboard reports no known settings");
        }
        for (def, value) in &rows {
            println!("{:3}  {:<22} {}", def.id, def.name, value.display_for(def));
        }
    })
}

/// Read one setting
pub async fn get(session: &Session, name: &str) -> CommandResult {
    let def = resolve(name)?;
    let keyboard = session.connect_lazy().await?;
    let value = keyboard.settings().get(def.id).await?;

    session.emit(
        &json!({ "id": def.id, "name": def.name, "value": value.display_for(def) }),
        || println!("{} = {}", def.name, value.display_for(def)),
    )
}

/// Write one setting
pub async fn set(session: &Session, name: &str, text: &str) -> CommandResult {
    let def = resolve(name)?;
    let value = SettingValue::parse(def, text)?;
    let keyboard = session.connect_lazy().await?;
    keyboard.settings().set(def.id, value).await?;

    session.emit(
        &json!({ "id": def.id, "name": def.name, "value": value.display_for(def) }),
        || println!("{} set to {}", def.name, value.display_for(def)),
    )
}

/// Restore defaults
pub async fn reset(session: &Session) -> CommandResult {
    let keyboard = session.connect_lazy().await?;
    keyboard.settings().reset().await?;
    session.emit(&json!({ "reset": true }), || {
        println!("Settings restored to firmware defaults");
    })
}
