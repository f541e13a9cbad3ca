//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{FetcherError, Result};
use crate::sensor::SensorPrecision;
use crate::ubx::session::AckPolicy;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    #[serde(default)]
    pub gnss: GnssConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// I2C bus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_bus_device")]
    pub device: String,
}

/// Output encoding of the record stream
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tagged binary records
    #[default]
    Binary,
    /// `Name: value unit` lines
    Text,
    /// One JSON object per record
    Jsonl,
}

/// Acquisition loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// File path, or `-` for stdout
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub format: OutputFormat,

    /// Extra arena bytes beyond the drivers' contexts
    #[serde(default)]
    pub arena_slack: usize,
}

/// One configured sensor
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub name: String,

    pub address: u8,

    #[serde(default)]
    pub precision: SensorPrecision,
}

/// GNSS receiver link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GnssConfig {
    /// Serial device; the receiver is reached over I2C when unset
    #[serde(default)]
    pub serial_port: Option<String>,

    #[serde(default = "default_gnss_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    #[serde(default = "default_ack_retries")]
    pub ack_retries: u32,

    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,

    #[serde(default = "default_restart_wait_ms")]
    pub restart_wait_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Daily-rotated log file; stderr when unset
    #[serde(default)]
    pub file: Option<String>,
}

// Default value functions
fn default_bus_device() -> String { "/dev/i2c-1".to_string() }

fn default_poll_interval_ms() -> u64 { 10 }
fn default_output() -> String { "-".to_string() }

fn default_gnss_baud_rate() -> u32 { 38400 }
fn default_ack_timeout_ms() -> u64 { 2000 }
fn default_ack_retries() -> u32 { 3 }
fn default_reset_settle_ms() -> u64 { 1000 }
fn default_restart_wait_ms() -> u64 { 500 }

fn default_log_level() -> String { "info".to_string() }

impl Default for BusConfig {
    fn default() -> Self {
        Self { device: default_bus_device() }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            output: default_output(),
            format: OutputFormat::default(),
            arena_slack: 0,
        }
    }
}

impl Default for GnssConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: default_gnss_baud_rate(),
            ack_timeout_ms: default_ack_timeout_ms(),
            ack_retries: default_ack_retries(),
            reset_settle_ms: default_reset_settle_ms(),
            restart_wait_ms: default_restart_wait_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl GnssConfig {
    pub fn ack_policy(&self) -> AckPolicy {
        AckPolicy {
            timeout: Duration::from_millis(self.ack_timeout_ms),
            retries: self.ack_retries,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> FetcherError {
    FetcherError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fetcher::config::Config;
    ///
    /// let config = Config::load("config/fetcher.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.poll_interval_ms)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.bus.device.is_empty() {
            return Err(invalid("bus device cannot be empty"));
        }

        if self.acquisition.poll_interval_ms == 0 || self.acquisition.poll_interval_ms > 60000 {
            return Err(invalid("poll_interval_ms must be between 1 and 60000"));
        }

        if self.acquisition.output.is_empty() {
            return Err(invalid("output cannot be empty (use '-' for stdout)"));
        }

        if self.sensors.is_empty() {
            return Err(invalid("at least one [[sensors]] entry is required"));
        }

        for (i, sensor) in self.sensors.iter().enumerate() {
            if sensor.name.is_empty() {
                return Err(invalid(format!("sensors[{}] name cannot be empty", i)));
            }
            if sensor.address > 0x7F {
                return Err(invalid(format!(
                    "sensors[{}] address 0x{:02X} is not a 7-bit I2C address",
                    i, sensor.address
                )));
            }
            let duplicate = self.sensors[..i]
                .iter()
                .any(|other| other.address == sensor.address && other.name.eq_ignore_ascii_case(&sensor.name));
            if duplicate {
                return Err(invalid(format!(
                    "sensors[{}] duplicates {} at 0x{:02X}",
                    i, sensor.name, sensor.address
                )));
            }
        }

        if ![9600, 38400, 115200, 230400, 460800].contains(&self.gnss.baud_rate) {
            return Err(invalid(
                "gnss baud_rate must be one of: 9600, 38400, 115200, 230400, 460800",
            ));
        }

        if self.gnss.serial_port.as_deref() == Some("") {
            return Err(invalid("gnss serial_port cannot be empty when set"));
        }

        if self.gnss.ack_timeout_ms == 0 || self.gnss.ack_timeout_ms > 10000 {
            return Err(invalid("ack_timeout_ms must be between 1 and 10000"));
        }

        if self.gnss.ack_retries > 10 {
            return Err(invalid("ack_retries must be at most 10"));
        }

        if self.gnss.reset_settle_ms > 10000 || self.gnss.restart_wait_ms > 10000 {
            return Err(invalid("reset_settle_ms and restart_wait_ms must be at most 10000"));
        }

        if self.logging.level.is_empty() {
            return Err(invalid("logging level cannot be empty"));
        }

        Ok(())
    }
}
