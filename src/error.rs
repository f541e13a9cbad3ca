//! # Error Types
//!
//! Custom error types for Fetcher using `thiserror`.

use thiserror::Error;

/// Main error type for Fetcher
#[derive(Debug, Error)]
pub enum FetcherError {
    /// Device did not answer or identified itself as something else
    #[error("Device not found at address 0x{address:02X}: {reason}")]
    DeviceNotFound { address: u8, reason: String },

    /// Bus read/write/write-read failed
    #[error("Bus transaction failed: {0}")]
    BusTransactionFailed(String),

    /// CRC8, CRC4 or UBX checksum did not match
    #[error("Checksum mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Arena cannot satisfy an allocation
    #[error("Arena exhausted: requested {requested} bytes, {available} available")]
    OutOfArena { requested: usize, available: usize },

    /// Alignment is not a power of two
    #[error("Invalid alignment: {0}")]
    InvalidAlignment(usize),

    /// Arena handle issued before the last reset, or out of range
    #[error("Stale or invalid arena context")]
    StaleContext,

    /// No driver registered under this name
    #[error("Unknown sensor name: {0}")]
    UnknownSensorName(String),

    /// Sensor used before a successful open
    #[error("Sensor {0} has not been opened")]
    NotOpened(&'static str),

    /// Tag not in the sensor's tag list
    #[error("Sensor {sensor} does not provide tag {tag}")]
    UnsupportedTag { sensor: &'static str, tag: &'static str },

    /// Value type does not match the tag's declared type
    #[error("Data type mismatch for {tag}: expected {expected}, got {actual}")]
    DTypeMismatch {
        tag: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// Tagged record could not be decoded
    #[error("Malformed tagged record: {0}")]
    MalformedRecord(String),

    /// UBX frame could not be decoded
    #[error("Malformed UBX frame: {0}")]
    MalformedFrame(String),

    /// No response/ACK before the deadline
    #[error("Protocol timeout waiting for UBX 0x{class:02X}/0x{id:02X}")]
    ProtocolTimeout { class: u8, id: u8 },

    /// Receiver answered with ACK-NAK
    #[error("UBX 0x{class:02X}/0x{id:02X} rejected by receiver")]
    Rejected { class: u8, id: u8 },

    /// Payload exceeds a protocol size limit
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Configuration key and value size disagree
    #[error("Invalid configuration key 0x{key:08X}: {reason}")]
    InvalidConfigKey { key: u32, reason: String },

    /// GNSS receiver has no usable position yet
    #[error("No usable GNSS fix (fix type {0})")]
    NoUsableFix(u8),

    /// No serial device could be opened
    #[error("No serial port found (tried: {0})")]
    SerialPortNotFound(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Fetcher
pub type Result<T> = std::result::Result<T, FetcherError>;
