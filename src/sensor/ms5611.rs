//! # MS5611 Barometric Pressure Sensor
//!
//! TE MS5611-01BA03 over I2C (address 0x76 or 0x77).
//!
//! At open the sensor is reset, its eight PROM words are read and checked
//! against the PROM CRC-4, and the current pressure is stored as the
//! ground reference for relative altitude. One conversion pair (D1, D2)
//! yields temperature, pressure and altitude together.

use super::{SampleState, Sensor, SensorCore, SensorLocation, SensorPrecision};
use crate::arena::Arena;
use crate::bus::I2cBus;
use crate::crc::crc4_ms5611;
use crate::error::{FetcherError, Result};
use crate::tagged::encoder::memcpy_be;
use crate::tagged::protocol::{SensorTag, SensorTagData, SensorValue};

pub const MS5611_NAME: &str = "MS5611";

/// Address with CSB pulled high
pub const MS5611_DEFAULT_ADDRESS: u8 = 0x77;

const CMD_RESET: u8 = 0x1E;
const CMD_PROM_READ: u8 = 0xA0;
const CMD_ADC_CONV: u8 = 0x40;
const CMD_ADC_READ: u8 = 0x00;

const DREG_PRESSURE: u8 = 0x00;
const DREG_TEMPERATURE: u8 = 0x10;

const RESET_WAIT_US: u32 = 10_000;

/// Universal gas constant (J/(mol K))
const R: f64 = 8.31432;
/// Standard gravity (m/s^2)
const G: f64 = 9.80665;
/// Molar mass of dry air (kg/mol)
const M: f64 = 0.0289644;
/// Reference temperature (K)
const T: f64 = 273.0;

const TAGS: &[SensorTag] = &[SensorTag::Temperature, SensorTag::Pressure, SensorTag::AltitudeRel];

// Context layout (big-endian)
const CTX_PROM: usize = 0;
const CTX_GROUND: usize = 16;
const CTX_TEMPERATURE: usize = 20;
const CTX_PRESSURE: usize = 24;
const CTX_ALTITUDE: usize = 28;
const CTX_STATE: usize = 32;
const CTX_SIZE: usize = 36;

/// ADC oversampling ratio, one per precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oversampling {
    Osr256,
    Osr1024,
    Osr4096,
}

impl Oversampling {
    fn code(self) -> u8 {
        match self {
            Self::Osr256 => 0x00,
            Self::Osr1024 => 0x04,
            Self::Osr4096 => 0x08,
        }
    }

    /// Maximum conversion time
    fn conversion_us(self) -> u32 {
        match self {
            Self::Osr256 => 900,
            Self::Osr1024 => 4_000,
            Self::Osr4096 => 10_000,
        }
    }

    pub fn for_precision(precision: SensorPrecision) -> Self {
        match precision {
            SensorPrecision::High => Self::Osr4096,
            SensorPrecision::Med => Self::Osr1024,
            SensorPrecision::Low => Self::Osr256,
        }
    }
}

/// Compensated temperature (C) and pressure (kPa) from raw conversions
///
/// `second_order` applies the low-temperature correction from the
/// datasheet below 20 C.
pub fn compensate(prom: &[u16; 8], d1: u32, d2: u32, second_order: bool) -> (f64, f64) {
    let c = |i: usize| prom[i] as f64;
    let d1 = d1 as f64;
    let d2 = d2 as f64;

    let dt = d2 - c(5) * 256.0;
    let mut off = c(2) * 65_536.0 + dt * c(4) / 128.0;
    let mut sens = c(1) * 32_768.0 + dt * c(3) / 256.0;
    let mut temp = 2000.0 + dt * c(6) / 8_388_608.0;

    if second_order && temp < 2000.0 {
        let t2 = dt * dt / 2_147_483_648.0;
        let mut off2 = 5.0 * (temp - 2000.0).powi(2) / 2.0;
        let mut sens2 = 5.0 * (temp - 2000.0).powi(2) / 4.0;
        if temp < -1500.0 {
            off2 += 7.0 * (temp + 1500.0).powi(2);
            sens2 += 11.0 * (temp + 1500.0).powi(2) / 2.0;
        }
        temp -= t2;
        off -= off2;
        sens -= sens2;
    }

    let pressure = ((d1 * sens / 2_097_152.0 - off) / 32_768.0) / 1000.0;
    (temp / 100.0, pressure)
}

/// Height (m) above the point where `ground_kpa` was measured
pub fn relative_altitude(pressure_kpa: f64, ground_kpa: f64) -> f64 {
    -((R * T) / (G * M)) * (pressure_kpa / ground_kpa).ln()
}

/// MS5611 driver
pub struct Ms5611 {
    core: SensorCore,
}

impl Ms5611 {
    pub fn new(location: SensorLocation, precision: SensorPrecision) -> Self {
        Self {
            core: SensorCore::new(MS5611_NAME, TAGS, location, precision),
        }
    }

    pub fn collector(location: SensorLocation, precision: SensorPrecision) -> Box<dyn Sensor> {
        Box::new(Self::new(location, precision))
    }

    fn read_prom(&self, bus: &mut dyn I2cBus) -> Result<[u16; 8]> {
        let mut prom = [0u16; 8];
        for (i, word) in prom.iter_mut().enumerate() {
            let mut raw = [0u8; 2];
            bus.write_read(self.core.address(), &[CMD_PROM_READ + 2 * i as u8], &mut raw)?;
            let mut native = [0u8; 2];
            memcpy_be(&mut native, &raw);
            *word = u16::from_ne_bytes(native);
        }

        let expected = crc4_ms5611(&prom);
        let actual = (prom[7] & 0x000F) as u8;
        if expected != actual {
            return Err(FetcherError::ChecksumMismatch {
                expected: expected as u16,
                actual: actual as u16,
            });
        }
        Ok(prom)
    }

    fn convert(&self, bus: &mut dyn I2cBus, dreg: u8, osr: Oversampling) -> Result<u32> {
        let address = self.core.address();
        bus.write(address, &[CMD_ADC_CONV + dreg + osr.code()])?;
        bus.delay_us(osr.conversion_us());
        let mut raw = [0u8; 3];
        bus.write_read(address, &[CMD_ADC_READ], &mut raw)?;
        Ok(u32::from_be_bytes([0, raw[0], raw[1], raw[2]]))
    }

    fn measure(&self, bus: &mut dyn I2cBus, prom: &[u16; 8], precision: SensorPrecision) -> Result<(f64, f64)> {
        let osr = Oversampling::for_precision(precision);
        let d1 = self.convert(bus, DREG_PRESSURE, osr)?;
        let d2 = self.convert(bus, DREG_TEMPERATURE, osr)?;
        Ok(compensate(prom, d1, d2, precision == SensorPrecision::High))
    }
}

fn load_prom(ctx: &[u8]) -> [u16; 8] {
    let mut prom = [0u16; 8];
    for (i, word) in prom.iter_mut().enumerate() {
        let at = CTX_PROM + 2 * i;
        *word = u16::from_be_bytes([ctx[at], ctx[at + 1]]);
    }
    prom
}

fn load_f32(ctx: &[u8], at: usize) -> f32 {
    f32::from_be_bytes([ctx[at], ctx[at + 1], ctx[at + 2], ctx[at + 3]])
}

fn store_f32(ctx: &mut [u8], at: usize, value: f32) {
    ctx[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

impl Sensor for Ms5611 {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SensorCore {
        &mut self.core
    }

    fn ctx_size(&self) -> usize {
        CTX_SIZE
    }

    fn init(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena) -> Result<()> {
        let address = self.core.address();
        bus.write(address, &[CMD_RESET]).map_err(|e| FetcherError::DeviceNotFound {
            address,
            reason: e.to_string(),
        })?;
        bus.delay_us(RESET_WAIT_US);

        let prom = self.read_prom(bus)?;
        // Ground reference always at full resolution
        let (_, ground) = self.measure(bus, &prom, SensorPrecision::High)?;

        let ctx = arena.get_mut(self.core.ctx()?)?;
        for (i, word) in prom.iter().enumerate() {
            let at = CTX_PROM + 2 * i;
            ctx[at..at + 2].copy_from_slice(&word.to_be_bytes());
        }
        store_f32(ctx, CTX_GROUND, ground as f32);
        Ok(())
    }

    fn read(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena, tag: SensorTag) -> Result<SensorTagData> {
        let handle = self.core.check_read(tag)?;

        let (state, prom, ground) = {
            let ctx = arena.get(handle)?;
            let state = SampleState::from_bits(u16::from_be_bytes([ctx[CTX_STATE], ctx[CTX_STATE + 1]]));
            (state, load_prom(ctx), load_f32(ctx, CTX_GROUND))
        };

        let state = if state.can_serve(tag) {
            state
        } else {
            let (temperature, pressure) = self.measure(bus, &prom, self.core.precision)?;
            let altitude = relative_altitude(pressure, ground as f64);
            let ctx = arena.get_mut(handle)?;
            store_f32(ctx, CTX_TEMPERATURE, temperature as f32);
            store_f32(ctx, CTX_PRESSURE, pressure as f32);
            store_f32(ctx, CTX_ALTITUDE, altitude as f32);
            SampleState::fresh()
        };

        let ctx = arena.get_mut(handle)?;
        let value = match tag {
            SensorTag::Temperature => load_f32(ctx, CTX_TEMPERATURE),
            SensorTag::Pressure => load_f32(ctx, CTX_PRESSURE),
            _ => load_f32(ctx, CTX_ALTITUDE),
        };
        ctx[CTX_STATE..CTX_STATE + 2].copy_from_slice(&state.mark_served(tag).bits().to_be_bytes());

        SensorTagData::new(tag, SensorValue::Float(value))
    }
}
