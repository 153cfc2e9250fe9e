//! High-level interface for Vial keyboards
//!
//! [`Keyboard`] is the device handle: it owns the transaction dispatcher for
//! one transport and every host-side mirror derived from it.
//!
//! ```text
//! Keyboard ─┬─ KeymapSync      (keymap mirror)
//!           ├─ ConfigRegistry  (settings cache)
//!           ├─ EntityStore     (slot mirror)
//!           └─ UnlockGate      (secure-op gate)
//!                 │
//!            Dispatcher ── Transport
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod keycode;
pub mod keymap;
pub mod settings;
pub mod unlock;

pub use config::KeyboardConfig;
pub use entity::{
    Combo, EntityCodec, EntityKind, EntityStore, EntityTable, KeyOverride, Macro, MacroAction,
    TapDance,
};
pub use error::KeyboardError;
pub use keycode::Keycode;
pub use keymap::{Keymap, KeymapSync, MatrixInfo};
pub use settings::{ConfigRegistry, SettingDef, SettingKind, SettingValue};
pub use unlock::{UnlockGate, UnlockState};

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use vial_transport::command::{
    HidResponse, KeyboardIdResponse, MatrixInfoResponse, ProtocolVersionResponse,
    QueryKeyboardId, QueryMatrixInfo, QueryProtocolVersion, QueryUnlockStatus,
    UnlockStatusResponse,
};
use vial_transport::protocol::{self, capability, cmd, unlock_state};
use vial_transport::{Dispatcher, Transport, TransportError};

/// UIDs shipped in the firmware's example keyboard definitions
pub const EXAMPLE_KEYBOARD_UIDS: &[u64] = &[
    0xD4A3_6200_603E_3007,
    0x32F6_2BC2_EEF2_237B,
    0x38CE_A320_F230_46A5,
    0xBED2_D31E_C59A_0BD8,
];

/// Low 56 bits shared by generated example UIDs
pub const EXAMPLE_KEYBOARD_PREFIX: u64 = 0x00A6_867B_DFD3_B00F;

/// True for a UID that was copied from an example keyboard
pub fn is_example_uid(uid: u64) -> bool {
    EXAMPLE_KEYBOARD_UIDS.contains(&uid) || uid & 0x00FF_FFFF_FFFF_FFFF == EXAMPLE_KEYBOARD_PREFIX
}

/// Identity and geometry learned at handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub vid: u16,
    pub pid: u16,
    pub name: String,
    pub protocol_version: u16,
    pub capabilities: u8,
    pub uid: u64,
    pub matrix: MatrixInfo,
    /// Firmware was mid-unlock when we connected; finish with `begin_unlock`
    pub unlock_in_progress: bool,
    pub entity_tables: Vec<EntityTable>,
}

impl DeviceInfo {
    pub fn supports_row_read(&self) -> bool {
        self.capabilities & capability::ROW_READ != 0
    }
}

/// Device handle for one connected keyboard
pub struct Keyboard {
    dispatcher: Arc<Dispatcher>,
    config: KeyboardConfig,
    info: DeviceInfo,
    gate: Arc<UnlockGate>,
    keymap: KeymapSync,
    settings: ConfigRegistry,
    entities: EntityStore,
}

impl Keyboard {
    /// Handshake with the firmware and build the device handle
    ///
    /// Checks the protocol version, reads identity, matrix geometry, unlock
    /// status and entity table sizes, then (if configured) the full keymap.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        config: KeyboardConfig,
    ) -> Result<Self, KeyboardError> {
        let dispatcher = Arc::new(Dispatcher::with_timeout(
            transport,
            config.checksum,
            config.transaction_timeout(),
        ));
        let device = dispatcher.device_info().clone();
        debug!("Handshake with {}", device.display_name());

        let resp = dispatcher.send(&QueryProtocolVersion::default()).await?;
        let version = ProtocolVersionResponse::parse(&resp)?;
        if !(protocol::MIN_PROTOCOL_VERSION..=protocol::MAX_PROTOCOL_VERSION)
            .contains(&version.version())
        {
            warn!("Unsupported protocol version {}", version.version());
            return Err(KeyboardError::UnsupportedProtocol(version.version()));
        }

        let resp = dispatcher.send(&QueryKeyboardId::default()).await?;
        let uid = KeyboardIdResponse::parse(&resp)?.uid;
        if is_example_uid(uid) {
            warn!(
                "Keyboard UID {:016X} is an example UID; it should be changed before shipping",
                uid
            );
        }

        let resp = dispatcher.send(&QueryMatrixInfo::default()).await?;
        let matrix = MatrixInfoResponse::parse(&resp)?;
        let matrix = MatrixInfo {
            layers: matrix.layers,
            rows: matrix.rows,
            cols: matrix.cols,
        };

        let resp = dispatcher.send(&QueryUnlockStatus::default()).await?;
        let unlock_in_progress =
            UnlockStatusResponse::parse(&resp)?.state == unlock_state::PENDING;
        if unlock_in_progress {
            info!("Keyboard has an unlock in progress");
        }

        let gate = Arc::new(UnlockGate::new());
        let entities = EntityStore::discover(dispatcher.clone(), gate.clone()).await?;

        let info = DeviceInfo {
            vid: device.vid,
            pid: device.pid,
            name: device.display_name(),
            protocol_version: version.version(),
            capabilities: version.capabilities,
            uid,
            matrix,
            unlock_in_progress,
            entity_tables: entities.tables().to_vec(),
        };

        let keymap = KeymapSync::new(
            dispatcher.clone(),
            gate.clone(),
            matrix,
            info.supports_row_read(),
        );
        let settings = ConfigRegistry::new(dispatcher.clone());

        let keyboard = Self {
            dispatcher,
            config,
            info,
            gate,
            keymap,
            settings,
            entities,
        };

        if keyboard.config.prefetch_keymap {
            keyboard.keymap.fetch_full().await?;
        }

        info!(
            "Connected to {} (protocol {}, {} layers, {}x{})",
            keyboard.info.name,
            keyboard.info.protocol_version,
            matrix.layers,
            matrix.rows,
            matrix.cols
        );
        Ok(keyboard)
    }

    /// Close the transport; the handle is unusable afterwards
    pub async fn disconnect(&self) -> Result<(), KeyboardError> {
        self.keymap.invalidate();
        self.entities.invalidate();
        self.dispatcher.close().await?;
        info!("Disconnected from {}", self.info.name);
        Ok(())
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }

    pub fn unlock_state(&self) -> UnlockState {
        self.gate.state()
    }

    /// Run the unlock challenge until the user confirms on the keyboard
    pub async fn begin_unlock(&self) -> Result<(), KeyboardError> {
        unlock::run_unlock(
            &self.dispatcher,
            &self.gate,
            self.config.unlock_poll_interval(),
            self.config.unlock_window(),
        )
        .await
    }

    /// Re-lock the keyboard
    pub async fn lock(&self) -> Result<(), KeyboardError> {
        unlock::run_lock(&self.dispatcher, &self.gate).await
    }

    /// Jump to the bootloader (secure)
    ///
    /// The keyboard usually drops off the bus before answering; that counts
    /// as success and leaves this handle disconnected.
    pub async fn reboot_to_bootloader(&self) -> Result<(), KeyboardError> {
        self.gate.require_unlocked()?;
        match self.dispatcher.query(cmd::BOOTLOADER_JUMP, &[]).await {
            Ok(_) | Err(TransportError::Disconnected) | Err(TransportError::Timeout) => {
                info!("Keyboard rebooting to bootloader");
                self.dispatcher.mark_disconnected();
                self.keymap.invalidate();
                self.entities.invalidate();
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn keymap(&self) -> &KeymapSync {
        &self.keymap
    }

    pub fn settings(&self) -> &ConfigRegistry {
        &self.settings
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }
}
