//! # PAC195X Power Monitor
//!
//! Microchip PAC195X family over I2C; wired here as a PAC1952-2 with two
//! sense channels.
//!
//! Each channel's bus voltage is reported as a `VOLTAGE` record carrying the
//! channel number as its ID. One measurement covers both channels; the
//! driver serves them in channel order and refreshes the voltage registers
//! for the next pass once the last channel has been read.

use super::{Sensor, SensorCore, SensorLocation, SensorPrecision};
use crate::arena::Arena;
use crate::bus::{read_register, I2cBus};
use crate::error::{FetcherError, Result};
use crate::tagged::protocol::{SensorTag, SensorTagData, SensorValue};

pub const PAC195X_NAME: &str = "PAC1952";

/// Address with the ADDRSEL resistor absent
pub const PAC195X_DEFAULT_ADDRESS: u8 = 0x10;

const REFRESH: u8 = 0x00;
const CTRL: u8 = 0x01;
const VBUSN: u8 = 0x07;
const REFRESH_V: u8 = 0x1F;
const MANUFACTURER_ID: u8 = 0xFE;

const MANUFACTURER_ID_VALUE: u8 = 0x54;

/// CHANNEL_N_OFF bits of the CTRL low byte (0 enables)
const CHANNEL1_OFF: u8 = 0x80;
const CHANNEL2_OFF: u8 = 0x40;

/// Accumulator data is valid this long after a refresh
const REFRESH_WAIT_US: u32 = 1000;

/// Full-scale bus voltage in volts (unipolar)
const VBUS_FSR: u32 = 32;

const CHANNELS: usize = 2;

/// One entry per channel; reads alternate between them
const TAGS: &[SensorTag] = &[SensorTag::Voltage, SensorTag::Voltage];

// Context layout: [vbus1: u16][vbus2: u16][next channel][reserved x3]
const CTX_VBUS: usize = 0;
const CTX_NEXT: usize = 4;
const CTX_SIZE: usize = 8;

/// Sampling mode bits (CTRL high nibble) for a precision
///
/// All modes use adaptive accumulation.
pub fn sample_mode(precision: SensorPrecision) -> u8 {
    match precision {
        SensorPrecision::High => 0x00, // 1024 SPS
        SensorPrecision::Med => 0x10,  // 256 SPS
        SensorPrecision::Low => 0x20,  // 64 SPS
    }
}

/// Convert a VBUS register value to millivolts
///
/// ```
/// use fetcher::sensor::pac195x::bus_millivolts;
///
/// assert_eq!(bus_millivolts(0x8000), 16_000);
/// assert_eq!(bus_millivolts(0xFFFF), 31_999);
/// ```
pub fn bus_millivolts(vbus: u16) -> i16 {
    // At most 31999, always in range
    ((VBUS_FSR * vbus as u32 * 1000) >> 16) as i16
}

/// PAC195X driver
pub struct Pac195x {
    core: SensorCore,
}

impl Pac195x {
    pub fn new(location: SensorLocation, precision: SensorPrecision) -> Self {
        Self {
            core: SensorCore::new(PAC195X_NAME, TAGS, location, precision),
        }
    }

    pub fn collector(location: SensorLocation, precision: SensorPrecision) -> Box<dyn Sensor> {
        Box::new(Self::new(location, precision))
    }

    fn set_sample_mode(&self, bus: &mut dyn I2cBus) -> Result<()> {
        let address = self.core.address();
        let mut ctrl = [0u8; 1];
        read_register(bus, address, CTRL, &mut ctrl)?;
        let value = (ctrl[0] & 0x0F) | sample_mode(self.core.precision);
        bus.write(address, &[CTRL, value])
    }

    fn enable_channels(&self, bus: &mut dyn I2cBus) -> Result<()> {
        let address = self.core.address();
        let mut ctrl = [0u8; 2];
        read_register(bus, address, CTRL, &mut ctrl)?;
        ctrl[1] &= !(CHANNEL1_OFF | CHANNEL2_OFF);
        bus.write(address, &[CTRL, ctrl[0], ctrl[1]])
    }

    fn read_vbus(&self, bus: &mut dyn I2cBus, channel: usize) -> Result<u16> {
        let mut raw = [0u8; 2];
        read_register(bus, self.core.address(), VBUSN + channel as u8, &mut raw)?;
        Ok(u16::from_be_bytes(raw))
    }
}

impl Sensor for Pac195x {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SensorCore {
        &mut self.core
    }

    fn ctx_size(&self) -> usize {
        CTX_SIZE
    }

    fn init(&mut self, bus: &mut dyn I2cBus, _arena: &mut Arena) -> Result<()> {
        let address = self.core.address();

        let mut id = [0u8; 1];
        read_register(bus, address, MANUFACTURER_ID, &mut id).map_err(|e| FetcherError::DeviceNotFound {
            address,
            reason: e.to_string(),
        })?;
        if id[0] != MANUFACTURER_ID_VALUE {
            return Err(FetcherError::DeviceNotFound {
                address,
                reason: format!(
                    "manufacturer ID 0x{:02X}, expected 0x{:02X}",
                    id[0], MANUFACTURER_ID_VALUE
                ),
            });
        }

        self.set_sample_mode(bus)?;
        self.enable_channels(bus)?;

        // Configuration only takes effect after a refresh
        bus.write(address, &[REFRESH])?;
        bus.delay_us(REFRESH_WAIT_US);
        Ok(())
    }

    fn read(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena, tag: SensorTag) -> Result<SensorTagData> {
        let handle = self.core.check_read(tag)?;

        let next = arena.get(handle)?[CTX_NEXT] as usize % CHANNELS;
        if next == 0 {
            let mut vbus = [0u16; CHANNELS];
            for (channel, value) in vbus.iter_mut().enumerate() {
                *value = self.read_vbus(bus, channel)?;
            }
            bus.write(self.core.address(), &[REFRESH_V])?;
            bus.delay_us(REFRESH_WAIT_US);

            let ctx = arena.get_mut(handle)?;
            for (channel, value) in vbus.iter().enumerate() {
                let at = CTX_VBUS + channel * 2;
                ctx[at..at + 2].copy_from_slice(&value.to_be_bytes());
            }
        }

        let ctx = arena.get_mut(handle)?;
        let at = CTX_VBUS + next * 2;
        let vbus = u16::from_be_bytes([ctx[at], ctx[at + 1]]);
        ctx[CTX_NEXT] = ((next + 1) % CHANNELS) as u8;

        SensorTagData::with_id(tag, next as u8 + 1, SensorValue::I16(bus_millivolts(vbus)))
    }
}
