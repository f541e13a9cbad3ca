//! # UBX Session
//!
//! Request/response exchange with a receiver over a [`UbxTransport`].
//!
//! Every exchange is a blocking round trip. A request that expects an
//! acknowledgement moves through
//! `AwaitingAck -> {Acknowledged | Rejected | TimedOut}`; a timed-out
//! request is retried as a fresh frame, never resumed.

use super::frame::{UbxFrame, UbxParser};
use super::messages::{AckPayload, ACK_ACK, ACK_NAK, CLASS_ACK};
use crate::error::{FetcherError, Result};
use std::time::{Duration, Instant};

/// Receive chunk size used when draining a transport
const RECV_CHUNK: usize = 256;

/// Wait between empty receives (us)
const DEFAULT_POLL_INTERVAL_US: u32 = 1_000;

/// Byte stream to and from a receiver
#[cfg_attr(test, mockall::automock)]
pub trait UbxTransport: Send {
    /// Write a complete encoded frame
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever is available without blocking; `Ok(0)` means nothing
    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Block for at least `us` microseconds
    fn wait_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

impl<T: UbxTransport + ?Sized> UbxTransport for &mut T {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).recv(buffer)
    }

    fn wait_us(&mut self, us: u32) {
        (**self).wait_us(us)
    }
}

impl<T: UbxTransport + ?Sized> UbxTransport for Box<T> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).recv(buffer)
    }

    fn wait_us(&mut self, us: u32) {
        (**self).wait_us(us)
    }
}

/// Where an acknowledged request stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    AwaitingAck,
    Acknowledged,
    Rejected,
    TimedOut,
}

/// One request waiting for its ACK-ACK / ACK-NAK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAck {
    pub class: u8,
    pub id: u8,
    state: AckState,
}

impl PendingAck {
    pub fn new(class: u8, id: u8) -> Self {
        Self {
            class,
            id,
            state: AckState::AwaitingAck,
        }
    }

    pub fn state(&self) -> AckState {
        self.state
    }

    /// Feed a received frame; only acknowledgements naming this request
    /// change the state, and only while still awaiting
    pub fn on_frame(&mut self, frame: &UbxFrame) -> AckState {
        if self.state != AckState::AwaitingAck || frame.class != CLASS_ACK {
            return self.state;
        }
        let Ok(ack) = AckPayload::decode(&frame.payload) else {
            return self.state;
        };
        if ack.class_id != self.class || ack.msg_id != self.id {
            return self.state;
        }

        self.state = match frame.id {
            ACK_ACK => AckState::Acknowledged,
            ACK_NAK => AckState::Rejected,
            _ => self.state,
        };
        self.state
    }

    pub fn expire(&mut self) -> AckState {
        if self.state == AckState::AwaitingAck {
            self.state = AckState::TimedOut;
        }
        self.state
    }
}

/// Timeout and retry budget for acknowledged requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPolicy {
    /// Wait per attempt
    pub timeout: Duration,
    /// Re-sends after the first attempt
    pub retries: u32,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            retries: 3,
        }
    }
}

/// Framed exchange over a transport
#[derive(Debug)]
pub struct UbxSession<T: UbxTransport> {
    transport: T,
    parser: UbxParser,
    poll_interval_us: u32,
}

impl<T: UbxTransport> UbxSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            parser: UbxParser::new(),
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
        }
    }

    pub fn with_poll_interval(mut self, us: u32) -> Self {
        self.poll_interval_us = us;
        self
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Encode and transmit one frame
    pub fn send(&mut self, frame: &UbxFrame) -> Result<()> {
        self.transport.send(&frame.encode())
    }

    /// Next verified frame, or `None` once `deadline` passes with nothing
    /// complete. Frames failing their checksum are dropped.
    pub fn next_frame(&mut self, deadline: Instant) -> Result<Option<UbxFrame>> {
        let mut chunk = [0u8; RECV_CHUNK];
        loop {
            match self.parser.next_frame() {
                Some(Ok(frame)) => return Ok(Some(frame)),
                Some(Err(_)) => continue,
                None => {}
            }

            let n = self.transport.recv(&mut chunk)?;
            if n > 0 {
                self.parser.feed(&chunk[..n]);
                continue;
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.transport.wait_us(self.poll_interval_us);
        }
    }

    /// Wait for a frame of one type, discarding others
    ///
    /// # Errors
    ///
    /// `ProtocolTimeout` if none arrives within `timeout`
    pub fn await_frame(&mut self, class: u8, id: u8, timeout: Duration) -> Result<UbxFrame> {
        let deadline = Instant::now() + timeout;
        while let Some(frame) = self.next_frame(deadline)? {
            if frame.is_type(class, id) {
                return Ok(frame);
            }
        }
        Err(FetcherError::ProtocolTimeout { class, id })
    }

    /// Wait for the acknowledgement of `(class, id)`
    ///
    /// # Returns
    ///
    /// * `Acknowledged`, `Rejected` or `TimedOut`
    pub fn await_ack(&mut self, class: u8, id: u8, timeout: Duration) -> Result<AckState> {
        let deadline = Instant::now() + timeout;
        let mut pending = PendingAck::new(class, id);

        while let Some(frame) = self.next_frame(deadline)? {
            if pending.on_frame(&frame) != AckState::AwaitingAck {
                return Ok(pending.state());
            }
        }
        Ok(pending.expire())
    }

    /// Send `frame` and require an ACK-ACK for it
    ///
    /// # Errors
    ///
    /// * `Rejected` on ACK-NAK (not retried)
    /// * `ProtocolTimeout` when every attempt timed out
    /// * Transport errors as they occur
    pub fn send_with_ack(&mut self, frame: &UbxFrame, policy: AckPolicy) -> Result<()> {
        for _attempt in 0..=policy.retries {
            // A late reply to an abandoned attempt must not be matched
            self.parser.clear();
            self.send(frame)?;

            match self.await_ack(frame.class, frame.id, policy.timeout)? {
                AckState::Acknowledged => return Ok(()),
                AckState::Rejected => {
                    return Err(FetcherError::Rejected {
                        class: frame.class,
                        id: frame.id,
                    })
                }
                AckState::TimedOut | AckState::AwaitingAck => continue,
            }
        }

        Err(FetcherError::ProtocolTimeout {
            class: frame.class,
            id: frame.id,
        })
    }

    /// Read everything already buffered and return the newest frame of one
    /// type, if any
    pub fn drain_latest(&mut self, class: u8, id: u8) -> Result<Option<UbxFrame>> {
        let mut latest = None;
        while let Some(frame) = self.next_frame(Instant::now())? {
            if frame.is_type(class, id) {
                latest = Some(frame);
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ubx::messages::{CFG_VALSET, CLASS_CFG, CLASS_NAV, NAV_PVT, NAV_STATUS};
    use std::collections::VecDeque;

    /// Transport replaying scripted replies, one queue per sent frame
    #[derive(Default)]
    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
        inbox: VecDeque<u8>,
    }

    impl ScriptedTransport {
        fn reply(&mut self, bytes: &[u8]) {
            self.replies.push_back(bytes.to_vec());
        }
    }

    impl UbxTransport for ScriptedTransport {
        fn send(&mut self, data: &[u8]) -> Result<()> {
            self.sent.push(data.to_vec());
            if let Some(reply) = self.replies.pop_front() {
                self.inbox.extend(reply);
            }
            Ok(())
        }

        fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
            let n = buffer.len().min(self.inbox.len());
            for slot in buffer.iter_mut().take(n) {
                *slot = self.inbox.pop_front().unwrap_or(0xFF);
            }
            Ok(n)
        }

        fn wait_us(&mut self, _us: u32) {}
    }

    fn ack(class: u8, id: u8, acked: bool) -> Vec<u8> {
        AckPayload { class_id: class, msg_id: id }
            .to_frame(acked)
            .unwrap()
            .encode()
            .to_vec()
    }

    fn valset() -> UbxFrame {
        UbxFrame::new(CLASS_CFG, CFG_VALSET, vec![0x00, 0x01, 0x00, 0x00]).unwrap()
    }

    fn quick_policy(retries: u32) -> AckPolicy {
        AckPolicy {
            timeout: Duration::from_millis(5),
            retries,
        }
    }

    #[test]
    fn test_pending_ack_ignores_unrelated_frames() {
        let mut pending = PendingAck::new(CLASS_CFG, CFG_VALSET);

        let status = UbxFrame::poll(CLASS_NAV, NAV_STATUS);
        assert_eq!(pending.on_frame(&status), AckState::AwaitingAck);

        let other_ack = AckPayload { class_id: CLASS_CFG, msg_id: 0x04 }.to_frame(true).unwrap();
        assert_eq!(pending.on_frame(&other_ack), AckState::AwaitingAck);

        let ours = AckPayload { class_id: CLASS_CFG, msg_id: CFG_VALSET }.to_frame(false).unwrap();
        assert_eq!(pending.on_frame(&ours), AckState::Rejected);

        // Terminal states stick
        let late = AckPayload { class_id: CLASS_CFG, msg_id: CFG_VALSET }.to_frame(true).unwrap();
        assert_eq!(pending.on_frame(&late), AckState::Rejected);
        assert_eq!(pending.expire(), AckState::Rejected);
    }

    #[test]
    fn test_send_with_ack_acknowledged() {
        let mut transport = ScriptedTransport::default();
        let mut reply = UbxFrame::poll(CLASS_NAV, NAV_PVT).encode().to_vec();
        reply.extend_from_slice(&ack(CLASS_CFG, CFG_VALSET, true));
        transport.reply(&reply);

        let mut session = UbxSession::new(transport);
        session.send_with_ack(&valset(), quick_policy(0)).unwrap();

        let transport = session.into_transport();
        assert_eq!(transport.sent, vec![valset().encode().to_vec()]);
    }

    #[test]
    fn test_send_with_ack_nak_is_rejected() {
        let mut transport = ScriptedTransport::default();
        transport.reply(&ack(CLASS_CFG, CFG_VALSET, false));

        let mut session = UbxSession::new(transport);
        let result = session.send_with_ack(&valset(), quick_policy(3));

        assert!(matches!(result, Err(FetcherError::Rejected { class: 0x06, id: 0x8A })));
        assert_eq!(session.into_transport().sent.len(), 1);
    }

    #[test]
    fn test_send_with_ack_retries_after_timeout() {
        let mut transport = ScriptedTransport::default();
        transport.reply(&[]);
        transport.reply(&ack(CLASS_CFG, CFG_VALSET, true));

        let mut session = UbxSession::new(transport);
        session.send_with_ack(&valset(), quick_policy(1)).unwrap();

        assert_eq!(session.into_transport().sent.len(), 2);
    }

    #[test]
    fn test_send_with_ack_exhausts_retries() {
        let mut session = UbxSession::new(ScriptedTransport::default());
        let result = session.send_with_ack(&valset(), quick_policy(2));

        assert!(matches!(result, Err(FetcherError::ProtocolTimeout { class: 0x06, id: 0x8A })));
        assert_eq!(session.into_transport().sent.len(), 3);
    }

    #[test]
    fn test_retry_discards_partial_frame() {
        let mut transport = ScriptedTransport::default();
        // First attempt leaves half an ACK behind
        let full = ack(CLASS_CFG, CFG_VALSET, true);
        transport.reply(&full[..5]);
        transport.reply(&full);

        let mut session = UbxSession::new(transport);
        session.send_with_ack(&valset(), quick_policy(1)).unwrap();
    }

    #[test]
    fn test_await_frame_skips_corrupt_and_other_frames() {
        let mut transport = ScriptedTransport::default();
        let mut corrupt = UbxFrame::poll(CLASS_NAV, NAV_PVT).encode().to_vec();
        corrupt[7] ^= 0x01;
        transport.inbox.extend(corrupt);
        transport.inbox.extend(UbxFrame::poll(CLASS_NAV, NAV_STATUS).encode().to_vec());
        transport.inbox.extend(UbxFrame::poll(CLASS_NAV, NAV_PVT).encode().to_vec());

        let mut session = UbxSession::new(transport);
        let frame = session
            .await_frame(CLASS_NAV, NAV_PVT, Duration::from_millis(5))
            .unwrap();
        assert!(frame.is_type(CLASS_NAV, NAV_PVT));
    }

    #[test]
    fn test_await_ack_times_out() {
        let mut session = UbxSession::new(ScriptedTransport::default());
        let state = session
            .await_ack(CLASS_CFG, CFG_VALSET, Duration::from_millis(2))
            .unwrap();
        assert_eq!(state, AckState::TimedOut);
    }

    #[test]
    fn test_drain_latest_returns_newest() {
        let mut transport = ScriptedTransport::default();
        for payload in [[1u8], [2u8], [3u8]] {
            let frame = UbxFrame::new(CLASS_NAV, NAV_PVT, payload.to_vec()).unwrap();
            transport.inbox.extend(frame.encode().to_vec());
        }
        transport.inbox.extend(UbxFrame::poll(CLASS_NAV, NAV_STATUS).encode().to_vec());

        let mut session = UbxSession::new(transport);
        let latest = session.drain_latest(CLASS_NAV, NAV_PVT).unwrap().unwrap();
        assert_eq!(&latest.payload[..], &[3]);
        assert!(session.drain_latest(CLASS_NAV, NAV_PVT).unwrap().is_none());
    }

    #[test]
    fn test_transport_error_propagates() {
        let mut transport = MockUbxTransport::new();
        transport
            .expect_send()
            .returning(|_| Err(FetcherError::Serial("link down".to_string())));

        let mut session = UbxSession::new(transport);
        let result = session.send_with_ack(&valset(), quick_policy(3));
        assert!(matches!(result, Err(FetcherError::Serial(_))));
    }
}
