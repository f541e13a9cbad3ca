//! # UBX Protocol Module
//!
//! Binary protocol of u-blox GNSS receivers.
//!
//! This module handles:
//! - Frame encoding/decoding and stream resynchronisation ([`frame`])
//! - Configuration, acknowledgement and navigation payloads ([`messages`])
//! - ACK-correlated request/response exchange ([`session`])
//! - DDC and serial links ([`transport`])

pub mod frame;
pub mod messages;
pub mod session;
pub mod transport;

pub use frame::{ubx_checksum, UbxFrame, UbxParser};
pub use session::{AckPolicy, AckState, UbxSession, UbxTransport};
