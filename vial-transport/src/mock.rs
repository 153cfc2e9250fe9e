//! In-memory transport for simulations and tests
//!
//! A [`MockTransport`] hands every frame it is sent to a responder closure,
//! which plays the firmware and decides what (if anything) comes back.
//!
//! ```
//! use vial_transport::mock::{MockReply, MockTransport};
//! use vial_transport::FrameCodec;
//!
//! let codec = FrameCodec::default();
//! let transport = MockTransport::new(move |frame| {
//!     let req = vial_transport::mock::parse_request(&codec, frame).unwrap();
//!     MockReply::ok(&codec, &req, &[0x2A])
//! });
//! assert_eq!(transport.sent_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::codec::FrameCodec;
use crate::error::TransportError;
use crate::protocol::{status, REPORT_SIZE};
use crate::types::TransportDeviceInfo;
use crate::Transport;

/// What the simulated firmware does with one received frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Queue these frames for the host to read, in order
    Frames(Vec<Vec<u8>>),
    /// Accept the frame and never answer
    Silent,
    /// Drop off the bus
    Disconnect,
}

impl MockReply {
    /// Single OK response correlated to `req`
    pub fn ok(codec: &FrameCodec, req: &MockRequest, body: &[u8]) -> Self {
        Self::Frames(vec![response_frame(
            codec,
            req.command,
            req.seq,
            status::OK,
            body,
        )])
    }

    /// Single response with a non-OK status
    pub fn status(codec: &FrameCodec, req: &MockRequest, status: u8) -> Self {
        Self::Frames(vec![response_frame(codec, req.command, req.seq, status, &[])])
    }
}

/// A decoded host request as the firmware sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRequest {
    pub command: u8,
    pub seq: u8,
    /// Body after the sequence byte, padding included
    pub body: Vec<u8>,
}

/// Decode a host frame into command, sequence and body
pub fn parse_request(codec: &FrameCodec, frame: &[u8]) -> Option<MockRequest> {
    let (command, payload) = codec.decode(frame).ok()?;
    let (&seq, body) = payload.split_first()?;
    Some(MockRequest {
        command,
        seq,
        body: body.to_vec(),
    })
}

/// Build a firmware response frame
///
/// Bodies longer than the response capacity are truncated.
pub fn response_frame(codec: &FrameCodec, command: u8, seq: u8, status: u8, body: &[u8]) -> Vec<u8> {
    let room = codec.payload_capacity().saturating_sub(2);
    let mut payload = Vec::with_capacity(2 + body.len());
    payload.push(seq);
    payload.push(status);
    payload.extend_from_slice(&body[..body.len().min(room)]);
    codec
        .encode(command, &payload)
        .unwrap_or_else(|_| vec![0u8; codec.report_size()])
}

type Responder = Box<dyn FnMut(&[u8]) -> MockReply + Send>;

/// Scriptable in-memory [`Transport`]
pub struct MockTransport {
    info: TransportDeviceInfo,
    report_size: usize,
    responder: Mutex<Responder>,
    inbox: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
}

impl MockTransport {
    /// Create a mock whose firmware behaviour is `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> MockReply + Send + 'static,
    {
        Self {
            info: TransportDeviceInfo {
                vid: 0xFEED,
                pid: 0x0000,
                device_path: "mock".into(),
                serial: Some(crate::protocol::device::SERIAL_MAGIC.into()),
                product_name: Some("Mock Keyboard".into()),
                manufacturer: Some("Vial".into()),
            },
            report_size: REPORT_SIZE,
            responder: Mutex::new(Box::new(responder)),
            inbox: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Present reports of `report_size` bytes instead of the standard 32
    pub fn with_report_size(mut self, report_size: usize) -> Self {
        self.report_size = report_size;
        self
    }

    /// A mock that accepts everything and never answers
    pub fn silent() -> Self {
        Self::new(|_| MockReply::Silent)
    }

    /// Queue an unsolicited frame for the host to read
    pub fn push_frame(&self, frame: Vec<u8>) {
        self.inbox.lock().push_back(frame);
    }

    /// Simulate the device being unplugged
    pub fn unplug(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Number of frames the host has sent
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Copy of every frame the host has sent
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_report(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.sent.lock().push(frame.to_vec());

        let reply = {
            let mut responder = self.responder.lock();
            (*responder)(frame)
        };
        match reply {
            MockReply::Frames(frames) => self.inbox.lock().extend(frames),
            MockReply::Silent => {}
            MockReply::Disconnect => self.connected.store(false, Ordering::SeqCst),
        }
        Ok(())
    }

    async fn read_report(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if let Some(frame) = self.inbox.lock().pop_front() {
            return Ok(frame);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        tokio::time::sleep(timeout).await;
        Err(TransportError::Timeout)
    }

    fn report_size(&self) -> usize {
        self.report_size
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responder_sees_request() {
        let codec = FrameCodec::default();
        let transport = MockTransport::new(move |frame| {
            let req = parse_request(&codec, frame).unwrap();
            MockReply::ok(&codec, &req, &[req.body[0] + 1])
        });

        let frame = codec.encode(0x04, &[7, 41]).unwrap();
        transport.send_report(&frame).await.unwrap();
        let resp = transport
            .read_report(Duration::from_millis(10))
            .await
            .unwrap();

        let (echo, payload) = codec.decode(&resp).unwrap();
        assert_eq!(echo, 0x04);
        assert_eq!(&payload[..3], &[7, status::OK, 42]);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_read_times_out() {
        let transport = MockTransport::silent();
        let err = transport
            .read_report(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_unplugged_rejects_send() {
        let transport = MockTransport::silent();
        transport.unplug();
        assert!(!transport.is_connected().await);
        assert_eq!(
            transport.send_report(&[0u8; REPORT_SIZE]).await,
            Err(TransportError::Disconnected)
        );
    }
}
