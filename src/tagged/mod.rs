//! # Tagged Data Module
//!
//! Self-describing sensor records written to the telemetry stream.
//!
//! This module handles:
//! - The closed tag and data type sets with their metadata
//! - Big-endian record encoding, independent of host byte order
//! - Record decoding for consumers and tests

pub mod protocol;
pub mod encoder;
pub mod decoder;

pub use protocol::{sensor_strtag, SensorTag, SensorTagData, SensorTagDType, SensorValue, Vec2d, Vec2dI32, Vec3d};
