//! Type-safe command bodies and response parsers
//!
//! Request bodies are fixed-layout packet structs (zerocopy); responses are
//! parsed from the body the dispatcher returns (sequence and status already
//! stripped).

use std::fmt;

use crate::protocol::cmd;
use zerocopy::byteorder::little_endian::{U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

// =============================================================================
// Core Traits
// =============================================================================

/// A command that can be serialized to a request body
pub trait HidCommand {
    /// Command byte (e.g., 0x04 for GET_KEYCODE)
    const CMD: u8;

    /// Serialize to bytes (excluding command and sequence bytes)
    fn to_data(&self) -> Vec<u8>;
}

/// A response that can be parsed from a response body
pub trait HidResponse: Sized {
    /// Minimum body length required
    const MIN_LEN: usize;

    /// Parse from body bytes (length already validated)
    fn from_data(data: &[u8]) -> Result<Self, ParseError>;

    /// Parse with length validation
    fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < Self::MIN_LEN {
            return Err(ParseError::TooShort {
                expected: Self::MIN_LEN,
                got: data.len(),
            });
        }
        Self::from_data(data)
    }
}

/// Parse error for responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TooShort { expected: usize, got: usize },
    InvalidValue { field: &'static str, value: u32 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { expected, got } => {
                write!(
                    f,
                    "Response too short: expected {} bytes, got {}",
                    expected, got
                )
            }
            Self::InvalidValue { field, value } => {
                write!(f, "Invalid value for {}: 0x{:02X}", field, value)
            }
        }
    }
}

impl std::error::Error for ParseError {}

fn read_prefix<T: FromBytes + KnownLayout + Immutable>(data: &[u8]) -> Result<T, ParseError> {
    T::read_from_prefix(data)
        .map(|(value, _)| value)
        .map_err(|_| ParseError::TooShort {
            expected: std::mem::size_of::<T>(),
            got: data.len(),
        })
}

// =============================================================================
// Handshake
// =============================================================================

/// Body-less query (handshake, unlock, reset commands)
#[derive(Debug, Clone, Copy, Default)]
pub struct Bare<const C: u8>;

impl<const C: u8> HidCommand for Bare<C> {
    const CMD: u8 = C;
    fn to_data(&self) -> Vec<u8> {
        Vec::new()
    }
}

pub type QueryProtocolVersion = Bare<{ cmd::GET_PROTOCOL_VERSION }>;
pub type QueryKeyboardId = Bare<{ cmd::GET_KEYBOARD_ID }>;
pub type QueryMatrixInfo = Bare<{ cmd::GET_MATRIX_INFO }>;
pub type QueryUnlockStatus = Bare<{ cmd::UNLOCK_STATUS }>;

/// GET_PROTOCOL_VERSION response
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ProtocolVersionResponse {
    version: U16,
    pub capabilities: u8,
}

impl ProtocolVersionResponse {
    pub fn version(&self) -> u16 {
        self.version.get()
    }
}

impl HidResponse for ProtocolVersionResponse {
    const MIN_LEN: usize = 3;
    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        read_prefix(data)
    }
}

/// GET_KEYBOARD_ID response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardIdResponse {
    pub uid: u64,
}

impl HidResponse for KeyboardIdResponse {
    const MIN_LEN: usize = 8;
    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        let raw: U64 = read_prefix(data)?;
        Ok(Self { uid: raw.get() })
    }
}

/// GET_MATRIX_INFO response
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MatrixInfoResponse {
    pub layers: u8,
    pub rows: u8,
    pub cols: u8,
}

impl HidResponse for MatrixInfoResponse {
    const MIN_LEN: usize = 3;
    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        read_prefix(data)
    }
}

/// UNLOCK_STATUS response
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct UnlockStatusResponse {
    /// One of `protocol::unlock_state`
    pub state: u8,
    /// Firmware-defined progress counter (e.g. keys held so far)
    pub progress: u8,
}

impl HidResponse for UnlockStatusResponse {
    const MIN_LEN: usize = 2;
    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        read_prefix(data)
    }
}

// =============================================================================
// Keymap
// =============================================================================

/// GET_KEYCODE body
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct GetKeycodeData {
    pub layer: u8,
    pub row: u8,
    pub col: u8,
}

impl HidCommand for GetKeycodeData {
    const CMD: u8 = cmd::GET_KEYCODE;
    fn to_data(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// SET_KEYCODE body
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SetKeycodeData {
    pub layer: u8,
    pub row: u8,
    pub col: u8,
    keycode: U16,
}

impl SetKeycodeData {
    pub fn new(layer: u8, row: u8, col: u8, keycode: u16) -> Self {
        Self {
            layer,
            row,
            col,
            keycode: U16::new(keycode),
        }
    }
}

impl HidCommand for SetKeycodeData {
    const CMD: u8 = cmd::SET_KEYCODE;
    fn to_data(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// GET_KEYMAP_ROW body
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct GetKeymapRowData {
    pub layer: u8,
    pub row: u8,
    pub start_col: u8,
    pub count: u8,
}

impl HidCommand for GetKeymapRowData {
    const CMD: u8 = cmd::GET_KEYMAP_ROW;
    fn to_data(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Decode a run of little-endian keycodes
pub fn parse_keycodes(data: &[u8], count: usize) -> Result<Vec<u16>, ParseError> {
    if data.len() < count * 2 {
        return Err(ParseError::TooShort {
            expected: count * 2,
            got: data.len(),
        });
    }
    Ok(data[..count * 2]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

// =============================================================================
// Settings
// =============================================================================

/// SETTINGS_QUERY / SETTING_GET body
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SettingIdData {
    id: U16,
}

impl SettingIdData {
    pub fn new(id: u16) -> Self {
        Self { id: U16::new(id) }
    }
}

// =============================================================================
// Entity tables
// =============================================================================

/// ENTITY_INFO body
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct EntityInfoData {
    pub family: u8,
}

impl HidCommand for EntityInfoData {
    const CMD: u8 = cmd::ENTITY_INFO;
    fn to_data(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// ENTITY_INFO response
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct EntityInfoResponse {
    pub slot_count: u8,
    max_size: U16,
}

impl EntityInfoResponse {
    pub fn max_size(&self) -> usize {
        self.max_size.get() as usize
    }
}

impl HidResponse for EntityInfoResponse {
    const MIN_LEN: usize = 3;
    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        read_prefix(data)
    }
}

/// ENTITY_READ body
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct EntityReadData {
    pub family: u8,
    pub index: u8,
    offset: U16,
    pub max_len: u8,
}

impl EntityReadData {
    pub fn new(family: u8, index: u8, offset: u16, max_len: u8) -> Self {
        Self {
            family,
            index,
            offset: U16::new(offset),
            max_len,
        }
    }
}

impl HidCommand for EntityReadData {
    const CMD: u8 = cmd::ENTITY_READ;
    fn to_data(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// ENTITY_READ response: declared record length plus one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityChunkResponse {
    pub total_len: u16,
    pub data: Vec<u8>,
}

impl HidResponse for EntityChunkResponse {
    const MIN_LEN: usize = 3;
    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        let total_len = u16::from_le_bytes([data[0], data[1]]);
        let len = data[2] as usize;
        let chunk = data.get(3..3 + len).ok_or(ParseError::TooShort {
            expected: 3 + len,
            got: data.len(),
        })?;
        Ok(Self {
            total_len,
            data: chunk.to_vec(),
        })
    }
}

/// ENTITY_WRITE header; chunk bytes follow it in the body
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct EntityWriteHeader {
    pub family: u8,
    pub index: u8,
    offset: U16,
    total_len: U16,
    pub len: u8,
}

impl EntityWriteHeader {
    /// Header size on the wire
    pub const SIZE: usize = 7;

    pub fn new(family: u8, index: u8, offset: u16, total_len: u16, len: u8) -> Self {
        Self {
            family,
            index,
            offset: U16::new(offset),
            total_len: U16::new(total_len),
            len,
        }
    }

    pub fn offset(&self) -> u16 {
        self.offset.get()
    }

    pub fn total_len(&self) -> u16 {
        self.total_len.get()
    }

    /// Parse the header from a request body (firmware side)
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        read_prefix(data)
    }
}

/// One ENTITY_WRITE chunk
#[derive(Debug, Clone)]
pub struct EntityWriteChunk<'a> {
    pub header: EntityWriteHeader,
    pub data: &'a [u8],
}

impl HidCommand for EntityWriteChunk<'_> {
    const CMD: u8 = cmd::ENTITY_WRITE;
    fn to_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(EntityWriteHeader::SIZE + self.data.len());
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(self.data);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_keycode_layout() {
        assert_eq!(std::mem::size_of::<SetKeycodeData>(), 5);
        let pkt = SetKeycodeData::new(1, 2, 3, 0x7C00);
        assert_eq!(pkt.to_data(), vec![1, 2, 3, 0x00, 0x7C]);
        assert_eq!(SetKeycodeData::CMD, cmd::SET_KEYCODE);
    }

    #[test]
    fn test_entity_write_header_layout() {
        assert_eq!(
            std::mem::size_of::<EntityWriteHeader>(),
            EntityWriteHeader::SIZE
        );
        let chunk = EntityWriteChunk {
            header: EntityWriteHeader::new(0, 4, 0x0116, 300, 2),
            data: &[0xAA, 0xBB],
        };
        assert_eq!(
            chunk.to_data(),
            vec![0, 4, 0x16, 0x01, 0x2C, 0x01, 2, 0xAA, 0xBB]
        );

        let parsed = EntityWriteHeader::parse(&chunk.to_data()).unwrap();
        assert_eq!(parsed.offset(), 0x0116);
        assert_eq!(parsed.total_len(), 300);
    }

    #[test]
    fn test_entity_chunk_response() {
        let body = [5, 0, 3, 1, 2, 3, 0, 0];
        let resp = EntityChunkResponse::parse(&body).unwrap();
        assert_eq!(resp.total_len, 5);
        assert_eq!(resp.data, vec![1, 2, 3]);

        let truncated = [5, 0, 9, 1];
        assert!(EntityChunkResponse::parse(&truncated).is_err());
    }

    #[test]
    fn test_protocol_version_response() {
        let resp = ProtocolVersionResponse::parse(&[1, 0, 0x01, 0xFF]).unwrap();
        assert_eq!(resp.version(), 1);
        assert_eq!(resp.capabilities, 0x01);
        assert!(ProtocolVersionResponse::parse(&[1]).is_err());
    }

    #[test]
    fn test_keyboard_id_response() {
        let uid = 0xD4A3_6200_603E_3007u64;
        let resp = KeyboardIdResponse::parse(&uid.to_le_bytes()).unwrap();
        assert_eq!(resp.uid, uid);
    }

    #[test]
    fn test_parse_keycodes() {
        assert_eq!(
            parse_keycodes(&[0x04, 0x00, 0x01, 0x00, 0xFF], 2).unwrap(),
            vec![0x0004, 0x0001]
        );
        assert!(parse_keycodes(&[0x04], 1).is_err());
    }

    #[test]
    fn test_bare_command() {
        assert_eq!(QueryMatrixInfo::CMD, cmd::GET_MATRIX_INFO);
        assert!(QueryMatrixInfo::default().to_data().is_empty());
    }
}
