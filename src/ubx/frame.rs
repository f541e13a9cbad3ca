//! # UBX Frames
//!
//! Frame layout: `[0xB5 0x62][class][id][len: u16 LE][payload][ck_a][ck_b]`.
//! The Fletcher-8 checksum covers class, id, length and payload.

use crate::error::{FetcherError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const UBX_SYNC_1: u8 = 0xB5;
pub const UBX_SYNC_2: u8 = 0x62;

/// Sync(2) + class + id + length(2)
pub const UBX_HEADER_SIZE: usize = 6;
pub const UBX_CHECKSUM_SIZE: usize = 2;

/// Largest payload accepted in either direction
pub const UBX_MAX_PAYLOAD: usize = 1024;

/// Fletcher-8 checksum over `data`
///
/// # Examples
///
/// ```
/// use fetcher::ubx::frame::ubx_checksum;
///
/// // NAV-PVT poll request
/// assert_eq!(ubx_checksum(&[0x01, 0x07, 0x00, 0x00]), (0x08, 0x19));
/// ```
pub fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;

    for &byte in data {
        ck_a = ck_a.wrapping_add(byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }

    (ck_a, ck_b)
}

/// One UBX message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxFrame {
    pub class: u8,
    pub id: u8,
    pub payload: Bytes,
}

impl UbxFrame {
    /// Create a frame, rejecting payloads over [`UBX_MAX_PAYLOAD`]
    pub fn new(class: u8, id: u8, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > UBX_MAX_PAYLOAD {
            return Err(FetcherError::PayloadTooLarge {
                size: payload.len(),
                max: UBX_MAX_PAYLOAD,
            });
        }
        Ok(Self { class, id, payload })
    }

    /// Empty-payload poll request for a message
    pub fn poll(class: u8, id: u8) -> Self {
        Self {
            class,
            id,
            payload: Bytes::new(),
        }
    }

    pub fn is_type(&self, class: u8, id: u8) -> bool {
        self.class == class && self.id == id
    }

    /// Total bytes on the wire
    pub fn encoded_len(&self) -> usize {
        UBX_HEADER_SIZE + self.payload.len() + UBX_CHECKSUM_SIZE
    }

    /// Serialize with sync bytes and checksum
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(UBX_SYNC_1);
        buf.put_u8(UBX_SYNC_2);
        buf.put_u8(self.class);
        buf.put_u8(self.id);
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_slice(&self.payload);

        let (ck_a, ck_b) = ubx_checksum(&buf[2..]);
        buf.put_u8(ck_a);
        buf.put_u8(ck_b);
        buf
    }

    /// Decode one frame from the front of `bytes`
    ///
    /// # Returns
    ///
    /// * `Result<(UbxFrame, usize)>` - The frame and the number of bytes consumed
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Sync bytes are wrong (`MalformedFrame`)
    /// - The length field exceeds the bytes present (`MalformedFrame`)
    /// - The checksum fails (`ChecksumMismatch`)
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < UBX_HEADER_SIZE + UBX_CHECKSUM_SIZE {
            return Err(FetcherError::MalformedFrame(format!(
                "Frame too short: {} bytes",
                bytes.len()
            )));
        }

        if bytes[0] != UBX_SYNC_1 || bytes[1] != UBX_SYNC_2 {
            return Err(FetcherError::MalformedFrame(format!(
                "Invalid sync bytes: 0x{:02X} 0x{:02X}",
                bytes[0], bytes[1]
            )));
        }

        let mut header = &bytes[2..UBX_HEADER_SIZE];
        let class = header.get_u8();
        let id = header.get_u8();
        let length = header.get_u16_le() as usize;

        let total = UBX_HEADER_SIZE + length + UBX_CHECKSUM_SIZE;
        if length > UBX_MAX_PAYLOAD || bytes.len() < total {
            return Err(FetcherError::MalformedFrame(format!(
                "Length field {} exceeds {} available bytes",
                length,
                bytes.len() - UBX_HEADER_SIZE - UBX_CHECKSUM_SIZE
            )));
        }

        let (ck_a, ck_b) = ubx_checksum(&bytes[2..UBX_HEADER_SIZE + length]);
        let received = (bytes[total - 2], bytes[total - 1]);
        if (ck_a, ck_b) != received {
            return Err(FetcherError::ChecksumMismatch {
                expected: u16::from_be_bytes([ck_a, ck_b]),
                actual: u16::from_be_bytes([received.0, received.1]),
            });
        }

        let payload = Bytes::copy_from_slice(&bytes[UBX_HEADER_SIZE..UBX_HEADER_SIZE + length]);
        Ok((Self { class, id, payload }, total))
    }
}

/// Streaming frame extractor
///
/// Accepts arbitrary chunks of a receiver's output, skips anything that is
/// not UBX (NMEA sentences, idle 0xFF fill) and yields verified frames.
#[derive(Debug, Default)]
pub struct UbxParser {
    buffer: BytesMut,
}

impl UbxParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Next complete frame, if one is buffered
    ///
    /// A frame with a bad checksum is consumed and reported as
    /// `ChecksumMismatch`; parsing resumes after its first sync byte.
    pub fn next_frame(&mut self) -> Option<Result<UbxFrame>> {
        loop {
            self.skip_to_sync();
            if self.buffer.len() < UBX_HEADER_SIZE {
                return None;
            }

            let length = u16::from_le_bytes([self.buffer[4], self.buffer[5]]) as usize;
            if length > UBX_MAX_PAYLOAD {
                // Not a real header; resync past this sync byte
                self.buffer.advance(1);
                continue;
            }

            let total = UBX_HEADER_SIZE + length + UBX_CHECKSUM_SIZE;
            if self.buffer.len() < total {
                return None;
            }

            return match UbxFrame::decode(&self.buffer[..total]) {
                Ok((frame, consumed)) => {
                    self.buffer.advance(consumed);
                    Some(Ok(frame))
                }
                Err(e) => {
                    self.buffer.advance(1);
                    Some(Err(e))
                }
            };
        }
    }

    fn skip_to_sync(&mut self) {
        let start = self
            .buffer
            .windows(2)
            .position(|w| w[0] == UBX_SYNC_1 && w[1] == UBX_SYNC_2);

        match start {
            Some(offset) => self.buffer.advance(offset),
            None => {
                // Keep a trailing first sync byte, its partner may be next
                let keep = usize::from(self.buffer.last() == Some(&UBX_SYNC_1));
                let drop = self.buffer.len() - keep;
                self.buffer.advance(drop);
            }
        }
    }
}
