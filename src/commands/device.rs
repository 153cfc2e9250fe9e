//! Device-level command handlers.

use serde_json::json;
use vial_keyboard::is_example_uid;
use vial_transport::HidDiscovery;

use super::{ensure_unlocked, CommandResult, Session};

/// List attached keyboards
pub fn list(session: &Session, all: bool) -> CommandResult {
    let devices = HidDiscovery::new().include_non_vial(all).list_devices()?;

    let entries: Vec<_> = devices
        .iter()
        .map(|d| {
            json!({
                "vid": d.info.vid,
                "pid": d.info.pid,
                "name": d.info.display_name(),
                "serial": d.info.serial,
                "path": d.info.device_path,
            })
        })
        .collect();

    session.emit(&entries, || {
        if devices.is_empty() {
            println!("No Vial keyboards found");
            return;
        }
        for d in &devices {
            println!(
                "{:04X}:{:04X}  {}  ({})",
                d.info.vid,
                d.info.pid,
                d.info.display_name(),
                d.info.device_path
            );
        }
    })
}

/// Show identity, geometry and entity tables
pub async fn info(session: &Session) -> CommandResult {
    let keyboard = session.connect_lazy().await?;
    let info = keyboard.info();

    session.emit(info, || {
        println!("Keyboard:     {} ({:04X}:{:04X})", info.name, info.vid, info.pid);
        println!("Protocol:     {}", info.protocol_version);
        println!(
            "Row reads:    {}",
            if info.supports_row_read() { "yes" } else { "no" }
        );
        let note = if is_example_uid(info.uid) {
            "  (example UID, should be changed)"
        } else {
            ""
        };
        println!("UID:          {:016X}{}", info.uid, note);
        println!(
            "Matrix:       {} layers, {} rows x {} cols",
            info.matrix.layers, info.matrix.rows, info.matrix.cols
        );
        if info.unlock_in_progress {
            println!("Unlock:       in progress (run `vialkb unlock` to finish)");
        }
        for table in &info.entity_tables {
            println!(
                "{:<13} {} slots, {} bytes each",
                format!("{}:", table.kind),
                table.slots,
                table.max_size
            );
        }
    })?;

    keyboard.disconnect().await?;
    Ok(())
}

/// Run the unlock challenge
pub async fn unlock(session: &Session) -> CommandResult {
    let keyboard = session.connect_lazy().await?;
    ensure_unlocked(&keyboard).await?;
    session.emit(&json!({ "state": keyboard.unlock_state() }), || {
        println!("Keyboard unlocked until `vialkb lock` or power cycle");
    })
}

/// Re-lock the keyboard
pub async fn lock(session: &Session) -> CommandResult {
    let keyboard = session.connect_lazy().await?;
    keyboard.lock().await?;
    session.emit(&json!({ "state": keyboard.unlock_state() }), || {
        println!("Keyboard locked");
    })
}

/// Unlock and reboot into the bootloader
pub async fn bootloader(session: &Session) -> CommandResult {
    let keyboard = session.connect_lazy().await?;
    ensure_unlocked(&keyboard).await?;
    keyboard.reboot_to_bootloader().await?;
    session.emit(&json!({ "rebooted": true }), || {
        println!("Keyboard is rebooting into the bootloader");
    })
}
