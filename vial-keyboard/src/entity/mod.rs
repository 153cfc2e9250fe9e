//! Entity store: slot tables for macros, combos, tap dances and key overrides
//!
//! Every family is a firmware table of fixed slot count and fixed maximum
//! record size. Records longer than one frame move in offset-addressed
//! chunks; each read chunk repeats the declared record length, each write
//! chunk carries it.
//!
//! ```text
//! ENTITY_READ  [family][index][offset u16][max_len]  -> [total u16][len][data]
//! ENTITY_WRITE [family][index][offset u16][total u16][len][data]
//! ```

pub mod combo;
pub mod key_override;
pub mod macros;
pub mod tap_dance;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vial_transport::command::{
    EntityChunkResponse, EntityInfoData, EntityInfoResponse, EntityReadData, EntityWriteChunk,
    EntityWriteHeader, HidResponse,
};
use vial_transport::protocol::family;
use vial_transport::{Dispatcher, TransportError};

use crate::error::KeyboardError;
use crate::unlock::UnlockGate;

pub use combo::Combo;
pub use key_override::KeyOverride;
pub use macros::{Macro, MacroAction};
pub use tap_dance::TapDance;

/// Header bytes of an ENTITY_READ response body
const READ_HEADER_LEN: usize = 3;

/// Entity families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Macro,
    Combo,
    TapDance,
    KeyOverride,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Macro,
        EntityKind::Combo,
        EntityKind::TapDance,
        EntityKind::KeyOverride,
    ];

    /// Family byte on the wire
    pub fn family(self) -> u8 {
        match self {
            Self::Macro => family::MACRO,
            Self::Combo => family::COMBO,
            Self::TapDance => family::TAP_DANCE,
            Self::KeyOverride => family::KEY_OVERRIDE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Macro => "macro",
            Self::Combo => "combo",
            Self::TapDance => "tap-dance",
            Self::KeyOverride => "key-override",
        }
    }

    /// Writes to this family need an unlocked keyboard
    pub fn is_secure(self) -> bool {
        self == Self::Macro
    }

    /// The record a cleared slot holds
    pub fn empty_record(self) -> Vec<u8> {
        match self {
            Self::Macro => Vec::new(),
            Self::Combo => vec![0; combo::RECORD_LEN],
            Self::TapDance => vec![0; tap_dance::RECORD_LEN],
            Self::KeyOverride => vec![0; key_override::RECORD_LEN],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = KeyboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == norm)
            .ok_or_else(|| KeyboardError::InvalidValue(format!("unknown entity family \"{s}\"")))
    }
}

/// Pure conversion between a family's structured form and its record bytes
pub trait EntityCodec: Sized {
    const KIND: EntityKind;

    fn encode(&self) -> Result<Vec<u8>, KeyboardError>;

    fn decode(bytes: &[u8]) -> Result<Self, KeyboardError>;

    /// True for the value a cleared slot decodes to
    fn is_empty(&self) -> bool;
}

/// Geometry of one firmware table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityTable {
    pub kind: EntityKind,
    pub slots: u8,
    pub max_size: usize,
}

/// Slot-level access to all entity tables of one keyboard
pub struct EntityStore {
    dispatcher: Arc<Dispatcher>,
    gate: Arc<UnlockGate>,
    tables: Vec<EntityTable>,
    mirror: RwLock<HashMap<(EntityKind, u8), Vec<u8>>>,
    /// Held for a whole chunk sequence and its mirror update, so readers
    /// never see a record another caller is half way through writing.
    sync: Mutex<()>,
}

impl EntityStore {
    /// Ask the firmware for each family's table geometry
    ///
    /// Families the firmware does not know are left out.
    pub(crate) async fn discover(
        dispatcher: Arc<Dispatcher>,
        gate: Arc<UnlockGate>,
    ) -> Result<Self, KeyboardError> {
        let mut tables = Vec::new();
        for kind in EntityKind::ALL {
            match dispatcher
                .send(&EntityInfoData {
                    family: kind.family(),
                })
                .await
            {
                Ok(resp) => {
                    let info = EntityInfoResponse::parse(&resp)?;
                    debug!(
                        "{} table: {} slots of {} bytes",
                        kind,
                        info.slot_count,
                        info.max_size()
                    );
                    tables.push(EntityTable {
                        kind,
                        slots: info.slot_count,
                        max_size: info.max_size(),
                    });
                }
                Err(TransportError::RejectedByFirmware { status, .. }) => {
                    debug!("{} table not supported (status 0x{:02X})", kind, status);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self::with_tables(dispatcher, gate, tables))
    }

    pub(crate) fn with_tables(
        dispatcher: Arc<Dispatcher>,
        gate: Arc<UnlockGate>,
        tables: Vec<EntityTable>,
    ) -> Self {
        Self {
            dispatcher,
            gate,
            tables,
            mirror: RwLock::new(HashMap::new()),
            sync: Mutex::new(()),
        }
    }

    pub fn tables(&self) -> &[EntityTable] {
        &self.tables
    }

    pub fn table(&self, kind: EntityKind) -> Option<&EntityTable> {
        self.tables.iter().find(|t| t.kind == kind)
    }

    fn checked_table(&self, kind: EntityKind, index: u8) -> Result<EntityTable, KeyboardError> {
        let table = self
            .table(kind)
            .copied()
            .ok_or_else(|| KeyboardError::InvalidValue(format!("{kind} table not supported")))?;
        if index >= table.slots {
            return Err(KeyboardError::OutOfRange(format!(
                "{kind} slot {index} (table has {})",
                table.slots
            )));
        }
        Ok(table)
    }

    /// Last confirmed record bytes for a slot
    pub fn cached(&self, kind: EntityKind, index: u8) -> Option<Vec<u8>> {
        self.mirror.read().get(&(kind, index)).cloned()
    }

    /// Drop every cached record
    pub fn invalidate(&self) {
        self.mirror.write().clear();
    }

    /// Read one record, chunk by chunk in offset order
    pub async fn read_slot(&self, kind: EntityKind, index: u8) -> Result<Vec<u8>, KeyboardError> {
        let table = self.checked_table(kind, index)?;
        let _sync = self.sync.lock().await;
        self.read_slot_locked(&table, index).await
    }

    async fn read_slot_locked(
        &self,
        table: &EntityTable,
        index: u8,
    ) -> Result<Vec<u8>, KeyboardError> {
        let kind = table.kind;
        match self.read_record(table, index).await {
            Ok(record) => {
                self.mirror.write().insert((kind, index), record.clone());
                Ok(record)
            }
            Err(e) => {
                self.mirror.write().remove(&(kind, index));
                if let KeyboardError::SlotCorrupt { reason, .. } = &e {
                    warn!("{} slot {} corrupt: {}", kind, index, reason);
                }
                Err(e)
            }
        }
    }

    async fn read_record(&self, table: &EntityTable, index: u8) -> Result<Vec<u8>, KeyboardError> {
        let chunk_len = self
            .dispatcher
            .response_capacity()
            .saturating_sub(READ_HEADER_LEN)
            .min(u8::MAX as usize) as u8;
        let corrupt = |reason: String| KeyboardError::SlotCorrupt { index, reason };

        let mut record: Vec<u8> = Vec::new();
        let mut declared: Option<usize> = None;
        loop {
            let offset = record.len() as u16;
            let resp = self
                .dispatcher
                .send(&EntityReadData::new(
                    table.kind.family(),
                    index,
                    offset,
                    chunk_len,
                ))
                .await?;
            let chunk = EntityChunkResponse::parse(&resp)?;
            let total = chunk.total_len as usize;

            match declared {
                None if total > table.max_size => {
                    return Err(corrupt(format!(
                        "declared length {} exceeds slot size {}",
                        total, table.max_size
                    )));
                }
                None => declared = Some(total),
                Some(expected) if expected != total => {
                    return Err(corrupt(format!(
                        "declared length changed from {} to {} at offset {}",
                        expected, total, offset
                    )));
                }
                Some(_) => {}
            }

            if chunk.data.len() > chunk_len as usize {
                return Err(corrupt(format!(
                    "chunk of {} bytes exceeds requested {}",
                    chunk.data.len(),
                    chunk_len
                )));
            }
            record.extend_from_slice(&chunk.data);

            if record.len() == total {
                return Ok(record);
            }
            if record.len() > total {
                return Err(corrupt(format!(
                    "received {} bytes for a {}-byte record",
                    record.len(),
                    total
                )));
            }
            if chunk.data.is_empty() {
                return Err(corrupt(format!(
                    "record ended at {} of {} bytes",
                    record.len(),
                    total
                )));
            }
        }
    }

    /// Write one record, chunk by chunk, each acknowledged before the next
    ///
    /// If any chunk fails the slot is re-read before returning, and the
    /// error is `PartialWrite` carrying what the firmware now holds.
    pub async fn write_slot(
        &self,
        kind: EntityKind,
        index: u8,
        record: &[u8],
    ) -> Result<(), KeyboardError> {
        let table = self.checked_table(kind, index)?;
        if record.len() > table.max_size {
            return Err(KeyboardError::RecordTooLarge {
                len: record.len(),
                max: table.max_size,
            });
        }
        if kind.is_secure() {
            self.gate.require_unlocked()?;
        }

        let chunk_len = self
            .dispatcher
            .request_capacity()
            .saturating_sub(EntityWriteHeader::SIZE)
            .clamp(1, u8::MAX as usize);
        let chunks: Vec<&[u8]> = if record.is_empty() {
            vec![record]
        } else {
            record.chunks(chunk_len).collect()
        };
        let total_chunks = chunks.len();

        let _sync = self.sync.lock().await;
        let mut offset = 0usize;
        for (applied, data) in chunks.into_iter().enumerate() {
            let chunk = EntityWriteChunk {
                header: EntityWriteHeader::new(
                    kind.family(),
                    index,
                    offset as u16,
                    record.len() as u16,
                    data.len() as u8,
                ),
                data,
            };
            if let Err(e) = self.dispatcher.send(&chunk).await {
                warn!(
                    "{} slot {}: chunk {} of {} failed: {}",
                    kind,
                    index,
                    applied + 1,
                    total_chunks,
                    e
                );
                return Err(self
                    .resync_after_failed_write(&table, index, applied, total_chunks, e)
                    .await);
            }
            offset += data.len();
        }

        debug!("{} slot {}: wrote {} bytes", kind, index, record.len());
        self.mirror.write().insert((kind, index), record.to_vec());
        Ok(())
    }

    async fn resync_after_failed_write(
        &self,
        table: &EntityTable,
        index: u8,
        applied: usize,
        total: usize,
        cause: TransportError,
    ) -> KeyboardError {
        let kind = table.kind;
        self.mirror.write().remove(&(kind, index));
        if cause == TransportError::Disconnected {
            return cause.into();
        }
        match self.read_slot_locked(table, index).await {
            Ok(resynced) => {
                info!(
                    "{} slot {} resynchronized after partial write ({} bytes)",
                    kind,
                    index,
                    resynced.len()
                );
                KeyboardError::PartialWrite {
                    applied,
                    total,
                    resynced,
                }
            }
            Err(e) => {
                warn!("{} slot {}: resync failed: {}", kind, index, e);
                cause.into()
            }
        }
    }

    /// Write the family's empty record; clearing twice is harmless
    pub async fn clear_slot(&self, kind: EntityKind, index: u8) -> Result<(), KeyboardError> {
        self.write_slot(kind, index, &kind.empty_record()).await
    }

    /// Read every slot of a family
    pub async fn list(&self, kind: EntityKind) -> Result<Vec<Vec<u8>>, KeyboardError> {
        let slots = self
            .table(kind)
            .map(|t| t.slots)
            .ok_or_else(|| KeyboardError::InvalidValue(format!("{kind} table not supported")))?;
        let mut records = Vec::with_capacity(slots as usize);
        for index in 0..slots {
            records.push(self.read_slot(kind, index).await?);
        }
        Ok(records)
    }

    /// Read and decode one slot
    pub async fn read<C: EntityCodec>(&self, index: u8) -> Result<C, KeyboardError> {
        let bytes = self.read_slot(C::KIND, index).await?;
        C::decode(&bytes)
    }

    /// Encode and write one slot
    pub async fn write<C: EntityCodec>(&self, index: u8, value: &C) -> Result<(), KeyboardError> {
        let bytes = value.encode()?;
        self.write_slot(C::KIND, index, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_parse() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.name().parse::<EntityKind>().unwrap(), kind);
        }
        assert_eq!("tap_dance".parse::<EntityKind>().unwrap(), EntityKind::TapDance);
        assert!("chord".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_empty_records_decode_empty() {
        assert!(Macro::decode(&EntityKind::Macro.empty_record()).unwrap().is_empty());
        assert!(Combo::decode(&EntityKind::Combo.empty_record()).unwrap().is_empty());
        assert!(TapDance::decode(&EntityKind::TapDance.empty_record())
            .unwrap()
            .is_empty());
        assert!(KeyOverride::decode(&EntityKind::KeyOverride.empty_record())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_only_macros_are_secure() {
        assert!(EntityKind::Macro.is_secure());
        assert!(!EntityKind::Combo.is_secure());
    }
}
