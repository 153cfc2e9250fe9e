//! Transaction dispatcher
//!
//! `Dispatcher` wraps a raw [`Transport`] (which only moves individual
//! reports) and adds transaction semantics: one request in flight at a time,
//! sequence tagging, echo matching and a caller-visible deadline.
//!
//! ```text
//! request  payload: [seq] [body ...]
//! response payload: [seq] [status] [body ...]
//! ```
//!
//! Nothing is retried here. A timed-out or malformed exchange is surfaced to
//! the caller, since a repeated write may apply twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::codec::FrameCodec;
use crate::command::HidCommand;
use crate::error::TransportError;
use crate::protocol::{cmd, status, timing, REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN};
use crate::types::{ChecksumType, TransportDeviceInfo};
use crate::Transport;

/// Single-flight request/response layer over one transport
pub struct Dispatcher {
    inner: Arc<dyn Transport>,
    codec: FrameCodec,
    default_timeout: Duration,
    /// Serializes transactions; the guarded value is the next sequence byte.
    /// tokio's mutex is fair, so concurrent callers queue in arrival order.
    query_lock: tokio::sync::Mutex<u8>,
    connected: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher with the default transaction timeout
    pub fn new(inner: Arc<dyn Transport>, checksum: ChecksumType) -> Self {
        Self::with_timeout(
            inner,
            checksum,
            Duration::from_millis(timing::TRANSACTION_TIMEOUT_MS),
        )
    }

    /// Create a dispatcher with an explicit default timeout
    pub fn with_timeout(
        inner: Arc<dyn Transport>,
        checksum: ChecksumType,
        default_timeout: Duration,
    ) -> Self {
        let codec = FrameCodec::new(inner.report_size(), checksum);
        Self {
            inner,
            codec,
            default_timeout,
            query_lock: tokio::sync::Mutex::new(0),
            connected: AtomicBool::new(true),
        }
    }

    /// Largest request body one transaction can carry
    pub fn request_capacity(&self) -> usize {
        self.codec
            .payload_capacity()
            .saturating_sub(REQUEST_HEADER_LEN)
    }

    /// Largest response body one transaction can carry
    pub fn response_capacity(&self) -> usize {
        self.codec
            .payload_capacity()
            .saturating_sub(RESPONSE_HEADER_LEN)
    }

    pub fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }

    /// False once the transport has reported device loss
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Mark the handle dead; every later transaction fails with `Disconnected`
    pub fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!("Device {} disconnected", self.inner.device_info().display_name());
        }
    }

    /// Close the transport and mark the handle dead
    ///
    /// Waits for an in-flight transaction to finish first.
    pub async fn close(&self) -> Result<(), TransportError> {
        let _guard = self.query_lock.lock().await;
        self.connected.store(false, Ordering::SeqCst);
        self.inner.close().await
    }

    /// Run one transaction with the default timeout
    pub async fn query(&self, command: u8, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.execute(command, body, self.default_timeout).await
    }

    /// Run one typed command with the default timeout
    pub async fn send<C: HidCommand>(&self, command: &C) -> Result<Vec<u8>, TransportError> {
        self.query(C::CMD, &command.to_data()).await
    }

    /// Send one request and wait for its correlated response body
    ///
    /// The deadline starts once this transaction owns the transport, so time
    /// spent queued behind other callers does not count against it.
    pub async fn execute(
        &self,
        command: u8,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let capacity = self.request_capacity();
        if body.len() > capacity {
            return Err(TransportError::PayloadTooLarge {
                len: body.len(),
                capacity,
            });
        }

        let mut next_seq = self.query_lock.lock().await;
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let seq = *next_seq;
        *next_seq = seq.wrapping_add(1);

        let mut payload = Vec::with_capacity(REQUEST_HEADER_LEN + body.len());
        payload.push(seq);
        payload.extend_from_slice(body);
        let frame = self.codec.encode(command, &payload)?;

        debug!(
            "-> {} (0x{:02X}) seq={} body={:02X?}",
            cmd::name(command),
            command,
            seq,
            body
        );

        let deadline = Instant::now() + timeout;
        if let Err(e) = self.inner.send_report(&frame).await {
            if e == TransportError::Disconnected {
                self.mark_disconnected();
            }
            return Err(e);
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("{} seq={} timed out after {:?}", cmd::name(command), seq, timeout);
                return Err(TransportError::Timeout);
            }

            let read = tokio::time::timeout_at(deadline, self.inner.read_report(remaining)).await;
            let resp = match read {
                Err(_) | Ok(Err(TransportError::Timeout)) => continue,
                Ok(Err(TransportError::Disconnected)) => {
                    self.mark_disconnected();
                    return Err(TransportError::Disconnected);
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(resp)) => resp,
            };

            let (echo, resp_payload) = match self.codec.decode(&resp) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("{} seq={}: {}", cmd::name(command), seq, e);
                    return Err(e);
                }
            };

            if echo != command || resp_payload.first() != Some(&seq) {
                debug!(
                    "Discarding unsolicited frame: expected 0x{:02X}/seq {}, got 0x{:02X}/seq {}",
                    command,
                    seq,
                    echo,
                    resp_payload.first().copied().unwrap_or(0)
                );
                continue;
            }

            let status_byte = resp_payload.get(1).copied().unwrap_or(status::OK);
            if status_byte != status::OK {
                debug!(
                    "<- {} seq={} status={}",
                    cmd::name(command),
                    seq,
                    status::name(status_byte)
                );
                return Err(TransportError::RejectedByFirmware {
                    command,
                    status: status_byte,
                });
            }

            debug!("<- {} seq={} OK", cmd::name(command), seq);
            return Ok(resp_payload[RESPONSE_HEADER_LEN.min(resp_payload.len())..].to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{parse_request, response_frame, MockReply, MockTransport};

    fn echo_transport() -> Arc<MockTransport> {
        let codec = FrameCodec::default();
        Arc::new(MockTransport::new(move |frame| {
            let req = parse_request(&codec, frame).unwrap();
            MockReply::ok(&codec, &req, &req.body[..4])
        }))
    }

    #[tokio::test]
    async fn test_execute_returns_body() {
        let transport = echo_transport();
        let dispatcher = Dispatcher::new(transport.clone(), ChecksumType::Trailing);

        let body = dispatcher
            .query(cmd::GET_KEYCODE, &[1, 2, 3, 4])
            .await
            .unwrap();
        assert_eq!(&body[..4], &[1, 2, 3, 4]);
        assert_eq!(body.len(), dispatcher.response_capacity());
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_sequence_increments() {
        let transport = echo_transport();
        let dispatcher = Dispatcher::new(transport.clone(), ChecksumType::Trailing);
        let codec = FrameCodec::default();

        dispatcher.query(cmd::GET_KEYCODE, &[0; 4]).await.unwrap();
        dispatcher.query(cmd::GET_KEYCODE, &[0; 4]).await.unwrap();

        let seqs: Vec<u8> = transport
            .sent_frames()
            .iter()
            .map(|f| parse_request(&codec, f).unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_payload_too_large_never_sent() {
        let transport = echo_transport();
        let dispatcher = Dispatcher::new(transport.clone(), ChecksumType::Trailing);

        let err = dispatcher
            .query(cmd::ENTITY_WRITE, &[0u8; 30])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::PayloadTooLarge {
                len: 30,
                capacity: 29
            }
        );
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_exact_deadline() {
        let transport = Arc::new(MockTransport::silent());
        let dispatcher = Dispatcher::new(transport, ChecksumType::Trailing);

        let start = Instant::now();
        let err = dispatcher
            .execute(cmd::GET_KEYCODE, &[0; 3], Duration::from_millis(250))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_stale_frame_discarded() {
        let codec = FrameCodec::default();
        let transport = Arc::new(MockTransport::new(move |frame| {
            let req = parse_request(&codec, frame).unwrap();
            MockReply::Frames(vec![
                // Left over from an earlier, abandoned transaction
                response_frame(&codec, req.command, req.seq.wrapping_sub(1), status::OK, &[0xEE]),
                // Different command entirely
                response_frame(&codec, cmd::LOCK, req.seq, status::OK, &[0xDD]),
                response_frame(&codec, req.command, req.seq, status::OK, &[0x42]),
            ])
        }));
        let dispatcher = Dispatcher::new(transport, ChecksumType::Trailing);

        let body = dispatcher.query(cmd::SETTING_GET, &[1, 0]).await.unwrap();
        assert_eq!(body[0], 0x42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_not_matched_to_next_transaction() {
        let codec = FrameCodec::default();
        let transport = Arc::new(MockTransport::silent());
        let dispatcher = Dispatcher::new(transport.clone(), ChecksumType::Trailing);

        let err = dispatcher
            .query(cmd::SETTING_GET, &[1, 0])
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);

        // The answer to seq 0 arrives after its caller gave up
        transport.push_frame(response_frame(&codec, cmd::SETTING_GET, 0, status::OK, &[9]));

        let err = dispatcher
            .query(cmd::SETTING_GET, &[1, 0])
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_rejection_status() {
        let codec = FrameCodec::default();
        let transport = Arc::new(MockTransport::new(move |frame| {
            let req = parse_request(&codec, frame).unwrap();
            MockReply::status(&codec, &req, status::OUT_OF_RANGE)
        }));
        let dispatcher = Dispatcher::new(transport, ChecksumType::Trailing);

        let err = dispatcher
            .query(cmd::SETTING_SET, &[1, 0, 200])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::RejectedByFirmware {
                command: cmd::SETTING_SET,
                status: status::OUT_OF_RANGE
            }
        );
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_malformed_response_surfaced() {
        let transport = Arc::new(MockTransport::new(|_| MockReply::Frames(vec![vec![0u8; 12]])));
        let dispatcher = Dispatcher::new(transport, ChecksumType::Trailing);

        let err = dispatcher.query(cmd::GET_MATRIX_INFO, &[]).await.unwrap_err();
        assert!(matches!(err, TransportError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn test_wrong_report_size_endpoint() {
        let transport = Arc::new(
            MockTransport::new(|_| MockReply::Frames(vec![vec![0u8; crate::protocol::REPORT_SIZE]]))
                .with_report_size(64),
        );
        let dispatcher = Dispatcher::new(transport.clone(), ChecksumType::Trailing);
        assert_eq!(dispatcher.request_capacity(), 61);

        let err = dispatcher.query(cmd::GET_MATRIX_INFO, &[]).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::MalformedFrame("expected 64 bytes, got 32".into())
        );
        assert_eq!(transport.sent_frames()[0].len(), 64);
    }

    #[tokio::test]
    async fn test_disconnect_is_fatal() {
        let transport = Arc::new(MockTransport::new(|_| MockReply::Disconnect));
        let dispatcher = Dispatcher::new(transport.clone(), ChecksumType::Trailing);

        let err = dispatcher.query(cmd::LOCK, &[]).await.unwrap_err();
        assert_eq!(err, TransportError::Disconnected);
        assert!(!dispatcher.is_connected());

        let err = dispatcher.query(cmd::LOCK, &[]).await.unwrap_err();
        assert_eq!(err, TransportError::Disconnected);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_serialized() {
        let codec = FrameCodec::default();
        let transport = Arc::new(MockTransport::new(move |frame| {
            let req = parse_request(&codec, frame).unwrap();
            MockReply::ok(&codec, &req, &req.body[..1])
        }));
        let dispatcher = Arc::new(Dispatcher::new(transport.clone(), ChecksumType::Trailing));

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                let body = dispatcher.query(cmd::GET_KEYCODE, &[i, 0, 0]).await.unwrap();
                (i, body[0])
            }));
        }

        for handle in handles {
            let (asked, answered) = handle.await.unwrap();
            assert_eq!(asked, answered);
        }

        let mut seqs: Vec<u8> = transport
            .sent_frames()
            .iter()
            .map(|f| parse_request(&codec, f).unwrap().seq)
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..16).collect::<Vec<u8>>());
    }
}
