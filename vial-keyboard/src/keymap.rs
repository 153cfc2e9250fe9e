//! Keymap synchronizer
//!
//! Keeps a host mirror of the layered key matrix. The mirror only ever holds
//! values the firmware has confirmed: a cell is filled by a read or by an
//! acknowledged write, and cleared whenever the outcome of a write is unknown.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zerocopy::IntoBytes;

use vial_transport::command::{
    parse_keycodes, GetKeycodeData, GetKeymapRowData, HidCommand, SetKeycodeData,
};
use vial_transport::protocol::cmd;
use vial_transport::{Dispatcher, TransportError};

use crate::error::KeyboardError;
use crate::keycode::Keycode;
use crate::unlock::UnlockGate;

/// Matrix dimensions reported at handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatrixInfo {
    pub layers: u8,
    pub rows: u8,
    pub cols: u8,
}

impl MatrixInfo {
    pub fn cell_count(&self) -> usize {
        self.layers as usize * self.rows as usize * self.cols as usize
    }

    fn index(&self, layer: u8, row: u8, col: u8) -> usize {
        (layer as usize * self.rows as usize + row as usize) * self.cols as usize + col as usize
    }

    /// Bounds check without touching the device
    pub fn check(&self, layer: u8, row: u8, col: u8) -> Result<usize, KeyboardError> {
        if layer >= self.layers || row >= self.rows || col >= self.cols {
            return Err(KeyboardError::OutOfRange(format!(
                "key ({layer},{row},{col}) outside {}x{}x{} matrix",
                self.layers, self.rows, self.cols
            )));
        }
        Ok(self.index(layer, row, col))
    }
}

/// A complete keymap snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keymap {
    pub info: MatrixInfo,
    keys: Vec<Keycode>,
}

impl Keymap {
    pub fn get(&self, layer: u8, row: u8, col: u8) -> Option<Keycode> {
        let idx = self.info.check(layer, row, col).ok()?;
        self.keys.get(idx).copied()
    }

    /// One layer as rows of keycodes
    pub fn layer(&self, layer: u8) -> Vec<Vec<Keycode>> {
        if layer >= self.info.layers {
            return Vec::new();
        }
        (0..self.info.rows)
            .map(|row| {
                let start = self.info.index(layer, row, 0);
                self.keys[start..start + self.info.cols as usize].to_vec()
            })
            .collect()
    }
}

/// Bulk and per-key keymap access with a confirmed-values mirror
pub struct KeymapSync {
    dispatcher: Arc<Dispatcher>,
    gate: Arc<UnlockGate>,
    info: MatrixInfo,
    row_read: bool,
    mirror: RwLock<Vec<Option<Keycode>>>,
    /// Held across every firmware exchange that ends in a mirror update,
    /// so a read result can never land on top of a later confirmed write.
    sync: Mutex<()>,
}

impl KeymapSync {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        gate: Arc<UnlockGate>,
        info: MatrixInfo,
        row_read: bool,
    ) -> Self {
        Self {
            dispatcher,
            gate,
            info,
            row_read,
            mirror: RwLock::new(vec![None; info.cell_count()]),
            sync: Mutex::new(()),
        }
    }

    pub fn info(&self) -> MatrixInfo {
        self.info
    }

    /// Read every cell from firmware and replace the mirror
    ///
    /// The mirror is swapped only after the whole grid has been read, so a
    /// failure part way leaves it as it was.
    pub async fn fetch_full(&self) -> Result<Keymap, KeyboardError> {
        let _sync = self.sync.lock().await;
        let mut keys = Vec::with_capacity(self.info.cell_count());
        for layer in 0..self.info.layers {
            for row in 0..self.info.rows {
                if self.row_read {
                    keys.extend(self.read_row(layer, row).await?);
                } else {
                    for col in 0..self.info.cols {
                        keys.push(self.read_cell(layer, row, col).await?);
                    }
                }
            }
        }

        *self.mirror.write() = keys.iter().copied().map(Some).collect();
        info!(
            "Fetched keymap: {} layers, {}x{}",
            self.info.layers, self.info.rows, self.info.cols
        );
        Ok(Keymap {
            info: self.info,
            keys,
        })
    }

    /// Keycode at a cell, from the mirror when known
    pub async fn get_key(&self, layer: u8, row: u8, col: u8) -> Result<Keycode, KeyboardError> {
        let idx = self.info.check(layer, row, col)?;
        if let Some(code) = self.mirror.read()[idx] {
            return Ok(code);
        }

        let _sync = self.sync.lock().await;
        // Filled while we queued
        if let Some(code) = self.mirror.read()[idx] {
            return Ok(code);
        }
        let code = self.read_cell(layer, row, col).await?;
        self.mirror.write()[idx] = Some(code);
        Ok(code)
    }

    /// Re-read a cell from firmware
    ///
    /// A value that differs from the mirror means something else changed the
    /// keymap, so the whole mirror is dropped.
    pub async fn refresh_key(&self, layer: u8, row: u8, col: u8) -> Result<Keycode, KeyboardError> {
        let idx = self.info.check(layer, row, col)?;
        let _sync = self.sync.lock().await;
        let code = self.read_cell(layer, row, col).await?;

        let mut mirror = self.mirror.write();
        if let Some(old) = mirror[idx] {
            if old != code {
                warn!(
                    "Key ({},{},{}) changed outside this host: {} -> {}; dropping keymap mirror",
                    layer, row, col, old, code
                );
                mirror.iter_mut().for_each(|cell| *cell = None);
            }
        }
        mirror[idx] = Some(code);
        Ok(code)
    }

    /// Assign a keycode; the mirror follows only a confirmed write
    pub async fn set_key(
        &self,
        layer: u8,
        row: u8,
        col: u8,
        keycode: Keycode,
    ) -> Result<(), KeyboardError> {
        let idx = self.info.check(layer, row, col)?;
        if keycode == Keycode::QK_BOOT {
            self.gate.require_unlocked()?;
        }

        let command = SetKeycodeData::new(layer, row, col, keycode.raw());
        let _sync = self.sync.lock().await;
        match self.dispatcher.send(&command).await {
            Ok(_) => {
                debug!("Key ({},{},{}) = {}", layer, row, col, keycode);
                self.mirror.write()[idx] = Some(keycode);
                Ok(())
            }
            Err(e) => {
                if !matches!(e, TransportError::RejectedByFirmware { .. }) {
                    self.mirror.write()[idx] = None;
                }
                Err(e.into())
            }
        }
    }

    /// Complete mirror contents, if every cell is known
    pub fn snapshot(&self) -> Option<Keymap> {
        let keys = self.mirror.read().iter().copied().collect::<Option<Vec<_>>>()?;
        Some(Keymap {
            info: self.info,
            keys,
        })
    }

    /// Forget the mirror; the next access re-reads from firmware
    pub fn invalidate(&self) {
        self.mirror.write().iter_mut().for_each(|cell| *cell = None);
    }

    /// Restore the firmware's default keymap (secure)
    pub async fn reset(&self) -> Result<(), KeyboardError> {
        self.gate.require_unlocked()?;
        let _sync = self.sync.lock().await;
        let result = self.dispatcher.query(cmd::RESET_KEYMAP, &[]).await;
        self.invalidate();
        result?;
        info!("Keymap reset to firmware default");
        Ok(())
    }

    async fn read_cell(&self, layer: u8, row: u8, col: u8) -> Result<Keycode, KeyboardError> {
        let resp = self
            .dispatcher
            .send(&GetKeycodeData { layer, row, col })
            .await?;
        let codes = parse_keycodes(&resp, 1)?;
        Ok(Keycode(codes[0]))
    }

    async fn read_row(&self, layer: u8, row: u8) -> Result<Vec<Keycode>, KeyboardError> {
        let per_frame = (self.dispatcher.response_capacity() / 2).clamp(1, u8::MAX as usize);
        let cols = self.info.cols as usize;
        let mut keys = Vec::with_capacity(cols);
        let mut start = 0usize;
        while start < cols {
            let count = per_frame.min(cols - start);
            let command = GetKeymapRowData {
                layer,
                row,
                start_col: start as u8,
                count: count as u8,
            };
            let resp = self
                .dispatcher
                .query(GetKeymapRowData::CMD, command.as_bytes())
                .await?;
            keys.extend(parse_keycodes(&resp, count)?.into_iter().map(Keycode));
            start += count;
        }
        Ok(keys)
    }
}
