//! # Sensor Bus
//!
//! The I2C bus as seen by sensor drivers.
//!
//! Drivers only talk to [`I2cBus`]. Any `embedded-hal` 1.0 I2C
//! implementation can be plugged in through [`HalBus`]; on Linux the
//! `linux-hal` feature provides [`open_linux_bus`] for `/dev/i2c-*`.
//!
//! All addresses are 7-bit (0x00..=0x7F). The bus has a single owner; no
//! concurrent transactions.

#[cfg(test)]
pub mod mock;

use crate::error::{FetcherError, Result};
use std::time::Duration;

/// Byte-level I2C transactions plus the blocking waits drivers need
/// between them
#[cfg_attr(test, mockall::automock)]
pub trait I2cBus: Send {
    /// START - ADDR(W) - DATA - STOP
    fn write(&mut self, address: u8, data: &[u8]) -> Result<()>;

    /// START - ADDR(R) - DATA - STOP
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<()>;

    /// Write then read with a repeated START (register reads)
    fn write_read(&mut self, address: u8, data: &[u8], buffer: &mut [u8]) -> Result<()>;

    /// Block for at least `us` microseconds (conversion and reset times)
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

/// Adapter from an `embedded-hal` I2C peripheral to [`I2cBus`]
#[derive(Debug)]
pub struct HalBus<T> {
    inner: T,
}

impl<T> HalBus<T> {
    /// Wrap an `embedded-hal` I2C peripheral
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Give the peripheral back
    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn bus_error<E: std::fmt::Debug>(action: &str, address: u8, e: E) -> FetcherError {
    FetcherError::BusTransactionFailed(format!("{} at 0x{:02X}: {:?}", action, address, e))
}

impl<T> I2cBus for HalBus<T>
where
    T: embedded_hal::i2c::I2c + Send,
{
    fn write(&mut self, address: u8, data: &[u8]) -> Result<()> {
        self.inner
            .write(address, data)
            .map_err(|e| bus_error("write", address, e))
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<()> {
        self.inner
            .read(address, buffer)
            .map_err(|e| bus_error("read", address, e))
    }

    fn write_read(&mut self, address: u8, data: &[u8], buffer: &mut [u8]) -> Result<()> {
        self.inner
            .write_read(address, data, buffer)
            .map_err(|e| bus_error("write_read", address, e))
    }
}

/// Linux I2C character device bus
#[cfg(feature = "linux-hal")]
pub type LinuxBus = HalBus<linux_embedded_hal::I2cdev>;

/// Open a Linux I2C bus (e.g. `/dev/i2c-1`)
///
/// # Errors
///
/// Returns `BusTransactionFailed` if the device node cannot be opened
#[cfg(feature = "linux-hal")]
pub fn open_linux_bus(device: &str) -> Result<LinuxBus> {
    let dev = linux_embedded_hal::I2cdev::new(device).map_err(|e| {
        FetcherError::BusTransactionFailed(format!("Failed to open {}: {}", device, e))
    })?;
    Ok(HalBus::new(dev))
}

/// Read `buffer.len()` bytes starting at register `reg`
pub fn read_register(bus: &mut dyn I2cBus, address: u8, reg: u8, buffer: &mut [u8]) -> Result<()> {
    bus.write_read(address, &[reg], buffer)
}

/// Write one register
pub fn write_register(bus: &mut dyn I2cBus, address: u8, reg: u8, value: u8) -> Result<()> {
    bus.write(address, &[reg, value])
}
