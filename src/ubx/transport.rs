//! # UBX Transports
//!
//! Byte links to a u-blox receiver.
//!
//! This module handles:
//! - DDC (u-blox I2C) framing over the shared sensor bus
//! - Serial UART links opened through `tokio_serial`

use super::session::UbxTransport;
use crate::bus::I2cBus;
use crate::error::{FetcherError, Result};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// High byte of the available-bytes counter (0xFE holds the low byte)
pub const DDC_BYTES_AVAILABLE_REG: u8 = 0xFD;

/// Data stream register
pub const DDC_STREAM_REG: u8 = 0xFF;

/// u-blox DDC over the sensor I2C bus
///
/// Borrowed per exchange; the bus stays owned by the acquisition loop.
pub struct DdcTransport<'a> {
    bus: &'a mut dyn I2cBus,
    address: u8,
}

impl<'a> DdcTransport<'a> {
    pub fn new(bus: &'a mut dyn I2cBus, address: u8) -> Self {
        Self { bus, address }
    }

    /// Bytes the receiver has queued for reading
    pub fn available(&mut self) -> Result<usize> {
        let mut count = [0u8; 2];
        self.bus
            .write_read(self.address, &[DDC_BYTES_AVAILABLE_REG], &mut count)?;
        Ok(u16::from_be_bytes(count) as usize)
    }
}

impl UbxTransport for DdcTransport<'_> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.bus.write(self.address, data)
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let n = self.available()?.min(buffer.len());
        if n == 0 {
            return Ok(0);
        }
        self.bus
            .write_read(self.address, &[DDC_STREAM_REG], &mut buffer[..n])?;
        Ok(n)
    }

    fn wait_us(&mut self, us: u32) {
        self.bus.delay_us(us);
    }
}

/// Factory UART1 rate of M10 receivers
pub const DEFAULT_GNSS_BAUD_RATE: u32 = 38_400;

/// Read timeout; keeps `recv` effectively non-blocking
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Serial device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/serial0", // Raspberry Pi primary UART
    "/dev/ttyACM0", // USB CDC (u-blox evaluation kits)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// GNSS receiver on a serial port
pub struct GnssSerial {
    port: Box<dyn tokio_serial::SerialPort>,
    device_path: String,
}

impl std::fmt::Debug for GnssSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GnssSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl GnssSerial {
    /// Open the receiver, trying the common device paths
    ///
    /// # Arguments
    ///
    /// * `baud_rate` - UART rate the receiver is configured for
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if no path could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fetcher::ubx::transport::{GnssSerial, DEFAULT_GNSS_BAUD_RATE};
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let serial = GnssSerial::open(DEFAULT_GNSS_BAUD_RATE)?;
    ///     println!("GNSS on {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open the receiver on the first path that works
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyAMA0"])
    /// * `baud_rate` - UART rate
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open GNSS serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened GNSS receiver at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(FetcherError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open one port as 8N1 without flow control
    fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn tokio_serial::SerialPort>> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(SERIAL_READ_TIMEOUT)
            .open()
            .map_err(|e| FetcherError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl UbxTransport for GnssSerial {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .map_err(|e| FetcherError::Serial(format!("Failed to write frame: {}", e)))?;
        self.port
            .flush()
            .map_err(|e| FetcherError::Serial(format!("Failed to flush serial port: {}", e)))
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(FetcherError::Serial(format!("Failed to read: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{I2cTransaction, MockI2c};

    #[test]
    fn test_ddc_recv_reads_available_bytes() {
        let mut bus = MockI2c::new();
        bus.push_read_data(&[0x00, 0x03]);
        bus.push_read_data(&[0xB5, 0x62, 0x05]);

        let mut ddc = DdcTransport::new(&mut bus, 0x42);
        let mut buffer = [0u8; 16];
        let n = ddc.recv(&mut buffer).unwrap();

        assert_eq!(n, 3);
        assert_eq!(&buffer[..3], &[0xB5, 0x62, 0x05]);
        assert_eq!(
            bus.transactions(),
            &[
                I2cTransaction::WriteRead { addr: 0x42, write_data: vec![0xFD], read_len: 2 },
                I2cTransaction::WriteRead { addr: 0x42, write_data: vec![0xFF], read_len: 3 },
            ]
        );
    }

    #[test]
    fn test_ddc_recv_clamps_to_buffer() {
        let mut bus = MockI2c::new();
        bus.push_read_data(&[0x01, 0x00]);
        bus.push_read_data(&[0xAA; 4]);

        let mut buffer = [0u8; 4];
        let n = DdcTransport::new(&mut bus, 0x42).recv(&mut buffer).unwrap();
        assert_eq!(n, 4);
    }

    #[test]
    fn test_ddc_recv_nothing_available() {
        let mut bus = MockI2c::new();
        bus.push_read_data(&[0x00, 0x00]);

        let mut buffer = [0u8; 8];
        assert_eq!(DdcTransport::new(&mut bus, 0x42).recv(&mut buffer).unwrap(), 0);
        assert_eq!(bus.transactions().len(), 1);
    }

    #[test]
    fn test_ddc_send_writes_frame() {
        let mut bus = MockI2c::new();
        DdcTransport::new(&mut bus, 0x42)
            .send(&[0xB5, 0x62, 0x01, 0x07, 0x00, 0x00, 0x08, 0x19])
            .unwrap();
        assert_eq!(
            bus.writes_to(0x42),
            vec![vec![0xB5, 0x62, 0x01, 0x07, 0x00, 0x00, 0x08, 0x19]]
        );
    }

    #[test]
    fn test_ddc_bus_failure_propagates() {
        let mut bus = MockI2c::new();
        let mut buffer = [0u8; 8];
        let result = DdcTransport::new(&mut bus, 0x42).recv(&mut buffer);
        assert!(matches!(result, Err(FetcherError::BusTransactionFailed(_))));
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = GnssSerial::open_with_paths(invalid_paths, DEFAULT_GNSS_BAUD_RATE);

        match result {
            Err(FetcherError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = GnssSerial::open_port("/dev/nonexistent_gnss_device_12345", DEFAULT_GNSS_BAUD_RATE);

        match result {
            Err(FetcherError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_gnss_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            Err(other) => panic!("Expected Serial error, got: {:?}", other),
            Ok(_) => panic!("Expected Serial error, got an open port"),
        }
    }

    #[test]
    #[ignore] // Run with: cargo test -- --ignored
    fn test_open_with_real_hardware() {
        match GnssSerial::open(DEFAULT_GNSS_BAUD_RATE) {
            Ok(serial) => println!("GNSS receiver at: {}", serial.device_path()),
            Err(e) => println!("No GNSS hardware detected: {}", e),
        }
    }
}
