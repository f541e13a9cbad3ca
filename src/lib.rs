//! # Fetcher Library
//!
//! Telemetry acquisition for I2C sensor boards and u-blox GNSS receivers.
//!
//! Sensor drivers share one interface ([`sensor::Sensor`]), keep their state
//! in a fixed [`arena::Arena`], are looked up by name in a static registry
//! ([`collectors`]) and emit big-endian tagged records ([`tagged`]). The GNSS
//! receiver is driven through the UBX protocol layer ([`ubx`]).

pub mod arena;
pub mod bus;
pub mod collectors;
pub mod config;
pub mod crc;
pub mod error;
pub mod sensor;
pub mod tagged;
pub mod telemetry;
pub mod ubx;
