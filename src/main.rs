//! Vial keyboard configuration CLI
//!
//! Reads and writes keymaps, firmware settings, macros, combos, tap dances
//! and key overrides on Vial keyboards over raw HID.

use clap::Parser;
use tracing_subscriber::EnvFilter;

// CLI definitions
mod cli;
use cli::{
    Cli, ComboCommands, Commands, KeyOverrideCommands, KeymapCommands, MacroCommands,
    SettingCommands, TapDanceCommands,
};

// Command handlers
mod commands;
use commands::Session;

use vial_keyboard::{Combo, KeyOverride, Macro, TapDance};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let session = Session::from_cli(&cli)?;

    match cli.command {
        None | Some(Commands::Info) => {
            commands::device::info(&session).await?;
        }
        Some(Commands::List { all }) => {
            commands::device::list(&session, all)?;
        }
        Some(Commands::Unlock) => {
            commands::device::unlock(&session).await?;
        }
        Some(Commands::Lock) => {
            commands::device::lock(&session).await?;
        }
        Some(Commands::Bootloader) => {
            commands::device::bootloader(&session).await?;
        }

        // === Keymap Commands ===
        Some(Commands::Keymap(cmd)) => match cmd {
            KeymapCommands::Dump { layer } => {
                commands::keymap::dump(&session, layer).await?;
            }
            KeymapCommands::Get { pos, refresh } => {
                commands::keymap::get(&session, pos, refresh).await?;
            }
            KeymapCommands::Set { pos, keycode } => {
                commands::keymap::set(&session, pos, &keycode).await?;
            }
            KeymapCommands::Reset => {
                commands::keymap::reset(&session).await?;
            }
        },

        // === Setting Commands ===
        Some(Commands::Setting(cmd)) => match cmd {
            SettingCommands::List => commands::settings::list(&session).await?,
            SettingCommands::Get { name } => commands::settings::get(&session, &name).await?,
            SettingCommands::Set { name, value } => {
                commands::settings::set(&session, &name, &value).await?;
            }
            SettingCommands::Reset => commands::settings::reset(&session).await?,
        },

        // === Entity Commands ===
        Some(Commands::Macro(cmd)) => match cmd {
            MacroCommands::Slot(slot) => commands::entities::slot::<Macro>(&session, slot).await?,
            MacroCommands::Set { index, actions } => {
                commands::entities::set_macro(&session, index, &actions).await?;
            }
        },
        Some(Commands::Combo(cmd)) => match cmd {
            ComboCommands::Slot(slot) => commands::entities::slot::<Combo>(&session, slot).await?,
            ComboCommands::Set {
                index,
                keys,
                output,
            } => {
                commands::entities::set_combo(&session, index, &keys, &output).await?;
            }
        },
        Some(Commands::TapDance(cmd)) => match cmd {
            TapDanceCommands::Slot(slot) => {
                commands::entities::slot::<TapDance>(&session, slot).await?;
            }
            TapDanceCommands::Set {
                index,
                on_tap,
                on_hold,
                on_double_tap,
                on_tap_hold,
                term,
            } => {
                commands::entities::set_tap_dance(
                    &session,
                    index,
                    &on_tap,
                    &on_hold,
                    &on_double_tap,
                    &on_tap_hold,
                    term,
                )
                .await?;
            }
        },
        Some(Commands::KeyOverride(cmd)) => match cmd {
            KeyOverrideCommands::Slot(slot) => {
                commands::entities::slot::<KeyOverride>(&session, slot).await?;
            }
            KeyOverrideCommands::Set {
                index,
                trigger,
                replacement,
                layers,
                trigger_mods,
                negative_mods,
                suppressed_mods,
                options,
            } => {
                commands::entities::set_key_override(
                    &session,
                    index,
                    &trigger,
                    &replacement,
                    layers,
                    trigger_mods,
                    negative_mods,
                    suppressed_mods,
                    options,
                )
                .await?;
            }
        },
    }

    Ok(())
}
