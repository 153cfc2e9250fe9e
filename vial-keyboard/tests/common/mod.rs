//! Simulated Vial firmware on top of the in-memory transport

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use vial_keyboard::{Keyboard, KeyboardConfig};
use vial_transport::mock::{parse_request, MockReply, MockRequest, MockTransport};
use vial_transport::protocol::{capability, cmd, family, status, unlock_state};
use vial_transport::{FrameCodec, Transport, TransportDeviceInfo, TransportError};

pub const MACRO_SLOTS: u8 = 4;
pub const MACRO_SIZE: u16 = 128;

/// Firmware-side state the tests can inspect and script
pub struct Firmware {
    pub version: u16,
    pub capabilities: u8,
    pub uid: u64,
    pub layers: u8,
    pub rows: u8,
    pub cols: u8,
    pub keymap: Vec<u16>,
    pub unlocked: bool,
    pub unlock_pending: bool,
    /// UNLOCK_STATUS answers after UNLOCK_BEGIN; the last one repeats
    pub unlock_script: VecDeque<u8>,
    pub settings: HashMap<u16, Vec<u8>>,
    /// Largest accepted value per setting
    pub setting_limits: HashMap<u16, u32>,
    pub tables: HashMap<u8, (u8, u16)>,
    pub records: HashMap<(u8, u8), Vec<u8>>,
    /// Reject ENTITY_WRITE chunks at this offset
    pub reject_write_at: Option<u16>,
    /// Never answer these commands
    pub silent_commands: Vec<u8>,
    /// Answer ENTITY_READ with a total that differs from the stored record
    pub lie_about_length: bool,
}

impl Default for Firmware {
    fn default() -> Self {
        let (layers, rows, cols) = (2, 3, 4);
        let keymap = (0..(layers as u16 * rows as u16 * cols as u16))
            .map(|i| 0x04 + i)
            .collect();
        let mut tables = HashMap::new();
        tables.insert(family::MACRO, (MACRO_SLOTS, MACRO_SIZE));
        tables.insert(family::COMBO, (8, 10));
        tables.insert(family::TAP_DANCE, (8, 10));
        tables.insert(family::KEY_OVERRIDE, (8, 10));
        let mut settings = HashMap::new();
        settings.insert(7, 200u16.to_le_bytes().to_vec());
        settings.insert(21, vec![0]);
        let mut setting_limits = HashMap::new();
        setting_limits.insert(7, 1000);
        Self {
            version: 1,
            capabilities: capability::ROW_READ,
            uid: 0x0123_4567_89AB_CDEF,
            layers,
            rows,
            cols,
            keymap,
            unlocked: false,
            unlock_pending: false,
            unlock_script: VecDeque::new(),
            settings,
            setting_limits,
            tables,
            records: HashMap::new(),
            reject_write_at: None,
            silent_commands: Vec::new(),
            lie_about_length: false,
        }
    }
}

fn u16_at(body: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([body[pos], body[pos + 1]])
}

impl Firmware {
    fn cell(&self, layer: u8, row: u8, col: u8) -> Option<usize> {
        if layer >= self.layers || row >= self.rows || col >= self.cols {
            return None;
        }
        Some((layer as usize * self.rows as usize + row as usize) * self.cols as usize + col as usize)
    }

    fn setting_width(id: u16) -> usize {
        vial_keyboard::settings::lookup(id)
            .map(|def| def.kind.width())
            .unwrap_or(1)
    }

    /// Ok(body) or Err(status)
    fn handle(&mut self, req: &MockRequest) -> Result<Vec<u8>, u8> {
        let b = &req.body;
        match req.command {
            cmd::GET_PROTOCOL_VERSION => {
                let mut out = self.version.to_le_bytes().to_vec();
                out.push(self.capabilities);
                Ok(out)
            }
            cmd::GET_KEYBOARD_ID => Ok(self.uid.to_le_bytes().to_vec()),
            cmd::GET_MATRIX_INFO => Ok(vec![self.layers, self.rows, self.cols]),
            cmd::GET_KEYCODE => {
                let idx = self.cell(b[0], b[1], b[2]).ok_or(status::OUT_OF_RANGE)?;
                Ok(self.keymap[idx].to_le_bytes().to_vec())
            }
            cmd::SET_KEYCODE => {
                let idx = self.cell(b[0], b[1], b[2]).ok_or(status::OUT_OF_RANGE)?;
                self.keymap[idx] = u16_at(b, 3);
                Ok(Vec::new())
            }
            cmd::GET_KEYMAP_ROW => {
                if self.capabilities & capability::ROW_READ == 0 {
                    return Err(status::UNKNOWN_COMMAND);
                }
                let (layer, row, start, count) = (b[0], b[1], b[2], b[3]);
                let mut out = Vec::new();
                for col in start..start + count {
                    let idx = self.cell(layer, row, col).ok_or(status::OUT_OF_RANGE)?;
                    out.extend_from_slice(&self.keymap[idx].to_le_bytes());
                }
                Ok(out)
            }
            cmd::RESET_KEYMAP => {
                self.keymap.iter_mut().for_each(|k| *k = 0);
                Ok(Vec::new())
            }
            cmd::BOOTLOADER_JUMP => Ok(Vec::new()),
            cmd::UNLOCK_BEGIN => {
                self.unlock_pending = true;
                Ok(Vec::new())
            }
            cmd::UNLOCK_STATUS => {
                let state = if self.unlocked {
                    unlock_state::CONFIRMED
                } else if !self.unlock_pending {
                    unlock_state::LOCKED
                } else if self.unlock_script.len() > 1 {
                    self.unlock_script.pop_front().unwrap_or(unlock_state::PENDING)
                } else {
                    self.unlock_script
                        .front()
                        .copied()
                        .unwrap_or(unlock_state::PENDING)
                };
                match state {
                    unlock_state::CONFIRMED => {
                        self.unlocked = true;
                        self.unlock_pending = false;
                    }
                    unlock_state::REJECTED => self.unlock_pending = false,
                    _ => {}
                }
                Ok(vec![state, 0])
            }
            cmd::LOCK => {
                self.unlocked = false;
                self.unlock_pending = false;
                Ok(Vec::new())
            }
            cmd::SETTINGS_QUERY => {
                let start = u16_at(b, 0);
                let mut ids: Vec<u16> = self.settings.keys().copied().filter(|&id| id >= start).collect();
                ids.sort_unstable();
                let mut out = Vec::new();
                for id in ids.into_iter().take(14) {
                    out.extend_from_slice(&id.to_le_bytes());
                }
                if out.len() < 28 {
                    out.extend_from_slice(&0xFFFFu16.to_le_bytes());
                }
                Ok(out)
            }
            cmd::SETTING_GET => {
                let id = u16_at(b, 0);
                self.settings.get(&id).cloned().ok_or(status::OUT_OF_RANGE)
            }
            cmd::SETTING_SET => {
                let id = u16_at(b, 0);
                if !self.settings.contains_key(&id) {
                    return Err(status::OUT_OF_RANGE);
                }
                let width = Self::setting_width(id);
                let value = b[2..2 + width].to_vec();
                let mut raw = [0u8; 4];
                raw[..width].copy_from_slice(&value);
                if let Some(&limit) = self.setting_limits.get(&id) {
                    if u32::from_le_bytes(raw) > limit {
                        return Err(status::REJECTED);
                    }
                }
                self.settings.insert(id, value);
                Ok(Vec::new())
            }
            cmd::SETTINGS_RESET => {
                self.settings.insert(7, 200u16.to_le_bytes().to_vec());
                Ok(Vec::new())
            }
            cmd::ENTITY_INFO => {
                let (slots, size) = self.tables.get(&b[0]).copied().ok_or(status::UNKNOWN_COMMAND)?;
                let mut out = vec![slots];
                out.extend_from_slice(&size.to_le_bytes());
                Ok(out)
            }
            cmd::ENTITY_READ => {
                let (fam, index, offset, max_len) = (b[0], b[1], u16_at(b, 2) as usize, b[4] as usize);
                let (slots, _) = self.tables.get(&fam).copied().ok_or(status::UNKNOWN_COMMAND)?;
                if index >= slots {
                    return Err(status::OUT_OF_RANGE);
                }
                let record = self.records.get(&(fam, index)).cloned().unwrap_or_default();
                let mut total = record.len() as u16;
                if self.lie_about_length {
                    total += 5;
                }
                let end = (offset + max_len).min(record.len());
                let data = if offset < record.len() { &record[offset..end] } else { &[][..] };
                let mut out = total.to_le_bytes().to_vec();
                out.push(data.len() as u8);
                out.extend_from_slice(data);
                Ok(out)
            }
            cmd::ENTITY_WRITE => {
                let (fam, index, offset, len) = (b[0], b[1], u16_at(b, 2), b[6] as usize);
                let (slots, size) = self.tables.get(&fam).copied().ok_or(status::UNKNOWN_COMMAND)?;
                if index >= slots || u16_at(b, 4) > size {
                    return Err(status::OUT_OF_RANGE);
                }
                if fam == family::MACRO && !self.unlocked {
                    return Err(status::REJECTED);
                }
                if self.reject_write_at == Some(offset) {
                    return Err(status::REJECTED);
                }
                let data = &b[7..7 + len];
                let record = self.records.entry((fam, index)).or_default();
                if offset == 0 {
                    record.clear();
                }
                if offset as usize != record.len() {
                    return Err(status::OUT_OF_RANGE);
                }
                record.extend_from_slice(data);
                Ok(Vec::new())
            }
            _ => Err(status::UNKNOWN_COMMAND),
        }
    }
}

/// A keyboard handle wired to a simulated firmware
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub firmware: Arc<Mutex<Firmware>>,
    codec: FrameCodec,
}

impl Harness {
    pub fn new(firmware: Firmware) -> Self {
        let codec = FrameCodec::default();
        let firmware = Arc::new(Mutex::new(firmware));
        let fw = firmware.clone();
        let transport = Arc::new(MockTransport::new(move |frame| {
            let Some(req) = parse_request(&codec, frame) else {
                return MockReply::Silent;
            };
            let mut fw = fw.lock();
            if fw.silent_commands.contains(&req.command) {
                return MockReply::Silent;
            }
            match fw.handle(&req) {
                Ok(body) => MockReply::ok(&codec, &req, &body),
                Err(code) => MockReply::status(&codec, &req, code),
            }
        }));
        Self {
            transport,
            firmware,
            codec,
        }
    }

    /// Connect without prefetching the keymap, so transaction counts start clean
    pub async fn connect(&self) -> Keyboard {
        self.connect_with(test_config()).await
    }

    pub async fn connect_with(&self, config: KeyboardConfig) -> Keyboard {
        Keyboard::connect(self.transport.clone(), config)
            .await
            .expect("connect")
    }

    /// Connect through a transport that yields before every read, so
    /// concurrent callers on one task interleave between transactions
    pub async fn connect_yielding(&self) -> Keyboard {
        let transport = Arc::new(YieldingTransport(self.transport.clone()));
        Keyboard::connect(transport, test_config())
            .await
            .expect("connect")
    }

    /// Frames sent so far
    pub fn sent(&self) -> usize {
        self.transport.sent_count()
    }

    /// Frames sent so far carrying `command`
    pub fn sent_of(&self, command: u8) -> usize {
        self.transport
            .sent_frames()
            .iter()
            .filter_map(|f| parse_request(&self.codec, f))
            .filter(|r| r.command == command)
            .count()
    }
}

/// No keymap prefetch, fast unlock polling
pub fn test_config() -> KeyboardConfig {
    KeyboardConfig {
        prefetch_keymap: false,
        unlock_poll_interval_ms: 5,
        unlock_window_ms: 2_000,
        ..KeyboardConfig::default()
    }
}

/// Connect and unlock
pub async fn unlocked_keyboard(harness: &Harness) -> Keyboard {
    harness
        .firmware
        .lock()
        .unlock_script
        .push_back(unlock_state::CONFIRMED);
    let keyboard = harness.connect().await;
    keyboard.begin_unlock().await.expect("unlock");
    keyboard
}

/// Hands control back to the scheduler before each read
pub struct YieldingTransport(Arc<MockTransport>);

#[async_trait]
impl Transport for YieldingTransport {
    async fn send_report(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.0.send_report(frame).await
    }

    async fn read_report(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        tokio::task::yield_now().await;
        self.0.read_report(timeout).await
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        self.0.device_info()
    }

    async fn is_connected(&self) -> bool {
        self.0.is_connected().await
    }
}
