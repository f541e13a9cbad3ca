//! # SHT41 Humidity/Temperature Sensor
//!
//! Sensirion SHT4x over I2C (default address 0x44).
//!
//! Every response word is followed by a CRC-8 (poly 0x31, init 0xFF); a
//! reading with a bad CRC is discarded. One measurement yields both
//! temperature and humidity, and is served to one read of each tag.

use super::{SampleState, Sensor, SensorCore, SensorLocation, SensorPrecision};
use crate::arena::Arena;
use crate::bus::I2cBus;
use crate::crc::{calculate_crc8, SHT41_CRC_INIT, SHT41_CRC_TABLE};
use crate::error::{FetcherError, Result};
use crate::tagged::protocol::{SensorTag, SensorTagData, SensorValue};

pub const SHT41_NAME: &str = "SHT41";

/// Factory I2C address
pub const SHT41_DEFAULT_ADDRESS: u8 = 0x44;

const CMD_SOFT_RESET: u8 = 0x94;
const CMD_READ_SERIAL: u8 = 0x89;
const CMD_READ_LOW_PREC: u8 = 0xE0;
const CMD_READ_MED_PREC: u8 = 0xF6;
const CMD_READ_HIGH_PREC: u8 = 0xFD;

const RESET_WAIT_US: u32 = 1_000;
const SERIAL_WAIT_US: u32 = 10;

/// Two words, each followed by its CRC
const RESPONSE_LEN: usize = 6;

const TAGS: &[SensorTag] = &[SensorTag::Temperature, SensorTag::Humidity];

// Context layout (big-endian)
const CTX_SERIAL: usize = 0;
const CTX_TEMPERATURE: usize = 4;
const CTX_HUMIDITY: usize = 8;
const CTX_STATE: usize = 12;
const CTX_SIZE: usize = 16;

/// Measurement command and duration for a precision
fn measurement(precision: SensorPrecision) -> (u8, u32) {
    match precision {
        SensorPrecision::High => (CMD_READ_HIGH_PREC, 8_300),
        SensorPrecision::Med => (CMD_READ_MED_PREC, 4_500),
        SensorPrecision::Low => (CMD_READ_LOW_PREC, 1_600),
    }
}

/// Verify the CRC trailing a 2-byte word and return the word
fn checked_word(chunk: &[u8]) -> Result<u16> {
    let crc = calculate_crc8(&chunk[..2], &SHT41_CRC_TABLE, SHT41_CRC_INIT);
    if crc != chunk[2] {
        return Err(FetcherError::ChecksumMismatch {
            expected: crc as u16,
            actual: chunk[2] as u16,
        });
    }
    Ok(u16::from_be_bytes([chunk[0], chunk[1]]))
}

/// Convert raw ticks to degrees Celsius
pub fn ticks_to_celsius(ticks: u16) -> f32 {
    -45.0 + 175.0 * (ticks as f32 / 65535.0)
}

/// Convert raw ticks to %RH, clamped to 0..=100
pub fn ticks_to_humidity(ticks: u16) -> f32 {
    (-6.0 + 125.0 * (ticks as f32 / 65535.0)).clamp(0.0, 100.0)
}

/// SHT41 driver
pub struct Sht41 {
    core: SensorCore,
}

impl Sht41 {
    pub fn new(location: SensorLocation, precision: SensorPrecision) -> Self {
        Self {
            core: SensorCore::new(SHT41_NAME, TAGS, location, precision),
        }
    }

    pub fn collector(location: SensorLocation, precision: SensorPrecision) -> Box<dyn Sensor> {
        Box::new(Self::new(location, precision))
    }

    /// Serial number read at open
    pub fn serial_number(&self, arena: &Arena) -> Result<u32> {
        let ctx = arena.get(self.core.ctx()?)?;
        Ok(read_u32(ctx, CTX_SERIAL))
    }

    fn read_response(&self, bus: &mut dyn I2cBus) -> Result<(u16, u16)> {
        let mut response = [0u8; RESPONSE_LEN];
        bus.read(self.core.address(), &mut response)?;
        let first = checked_word(&response[0..3])?;
        let second = checked_word(&response[3..6])?;
        Ok((first, second))
    }

    fn measure(&self, bus: &mut dyn I2cBus) -> Result<(f32, f32)> {
        let (cmd, wait_us) = measurement(self.core.precision);
        bus.write(self.core.address(), &[cmd])?;
        bus.delay_us(wait_us);
        let (t_ticks, rh_ticks) = self.read_response(bus)?;
        Ok((ticks_to_celsius(t_ticks), ticks_to_humidity(rh_ticks)))
    }
}

fn read_u32(ctx: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([ctx[at], ctx[at + 1], ctx[at + 2], ctx[at + 3]])
}

fn read_f32(ctx: &[u8], at: usize) -> f32 {
    f32::from_bits(read_u32(ctx, at))
}

impl Sensor for Sht41 {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SensorCore {
        &mut self.core
    }

    fn ctx_size(&self) -> usize {
        CTX_SIZE
    }

    /// The SHT41 has no ID register; the serial-number exchange is the
    /// identification step, so a bus failure during it (or the reset before
    /// it) means no device answers. A CRC failure stays `ChecksumMismatch`.
    fn init(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena) -> Result<()> {
        let address = self.core.address();
        let absent = |e: FetcherError| match e {
            FetcherError::BusTransactionFailed(reason) => FetcherError::DeviceNotFound { address, reason },
            other => other,
        };
        bus.write(address, &[CMD_SOFT_RESET]).map_err(absent)?;
        bus.delay_us(RESET_WAIT_US);

        bus.write(address, &[CMD_READ_SERIAL]).map_err(absent)?;
        bus.delay_us(SERIAL_WAIT_US);
        let (high, low) = self.read_response(bus).map_err(absent)?;
        let serial = ((high as u32) << 16) | low as u32;

        let ctx = arena.get_mut(self.core.ctx()?)?;
        ctx[CTX_SERIAL..CTX_SERIAL + 4].copy_from_slice(&serial.to_be_bytes());
        Ok(())
    }

    fn read(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena, tag: SensorTag) -> Result<SensorTagData> {
        let handle = self.core.check_read(tag)?;

        let state = {
            let ctx = arena.get(handle)?;
            SampleState::from_bits(u16::from_be_bytes([ctx[CTX_STATE], ctx[CTX_STATE + 1]]))
        };
        let state = if state.can_serve(tag) {
            state
        } else {
            let (temperature, humidity) = self.measure(bus)?;
            let ctx = arena.get_mut(handle)?;
            ctx[CTX_TEMPERATURE..CTX_TEMPERATURE + 4].copy_from_slice(&temperature.to_bits().to_be_bytes());
            ctx[CTX_HUMIDITY..CTX_HUMIDITY + 4].copy_from_slice(&humidity.to_bits().to_be_bytes());
            SampleState::fresh()
        };

        let ctx = arena.get_mut(handle)?;
        let value = match tag {
            SensorTag::Temperature => read_f32(ctx, CTX_TEMPERATURE),
            _ => read_f32(ctx, CTX_HUMIDITY),
        };
        ctx[CTX_STATE..CTX_STATE + 2].copy_from_slice(&state.mark_served(tag).bits().to_be_bytes());

        SensorTagData::new(tag, SensorValue::Float(value))
    }
}
