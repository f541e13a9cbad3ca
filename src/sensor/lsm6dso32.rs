//! # LSM6DSO32 Inertial Measurement Unit
//!
//! ST LSM6DSO32 accelerometer and gyroscope over I2C (address 0x6A or
//! 0x6B).
//!
//! The accelerometer runs at ±32 g and the gyroscope at ±500 dps; the
//! output data rate follows the requested precision. The selected full
//! scales are kept in the context so raw counts can be converted on read.

use super::{Sensor, SensorCore, SensorLocation, SensorPrecision};
use crate::arena::Arena;
use crate::bus::{read_register, write_register, I2cBus};
use crate::error::{FetcherError, Result};
use crate::tagged::protocol::{SensorTag, SensorTagData, SensorValue, Vec3d};

pub const LSM6DSO32_NAME: &str = "LSM6DSO32";

/// Address with SA0 pulled low
pub const LSM6DSO32_DEFAULT_ADDRESS: u8 = 0x6A;

const WHO_AM_I: u8 = 0x0F;
const WHO_AM_I_VALUE: u8 = 0x6C;
const CTRL1_XL: u8 = 0x10;
const CTRL2_G: u8 = 0x11;
const CTRL3_C: u8 = 0x12;
const OUT_TEMP_L: u8 = 0x20;
const OUTX_L_G: u8 = 0x22;
const OUTX_L_A: u8 = 0x28;

const CTRL3_SW_RESET: u8 = 0x01;
const CTRL3_IF_INC: u8 = 0x04;
const CTRL3_BDU: u8 = 0x40;

const RESET_WAIT_US: u32 = 100;

/// Standard gravity (m/s^2)
const GRAVITY: f32 = 9.80665;

const TAGS: &[SensorTag] = &[SensorTag::Temperature, SensorTag::LinearAccelRel, SensorTag::AngularVel];

// Context layout: [accel range][gyro range][reserved x2]
const CTX_ACCEL: usize = 0;
const CTX_GYRO: usize = 1;
const CTX_SIZE: usize = 4;

/// Accelerometer full-scale range
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelRange {
    G4 = 0,
    G8 = 1,
    G16 = 2,
    G32 = 3,
}

impl AccelRange {
    /// FS_XL bits of CTRL1_XL
    fn bits(self) -> u8 {
        match self {
            Self::G4 => 0b00 << 2,
            Self::G32 => 0b01 << 2,
            Self::G8 => 0b10 << 2,
            Self::G16 => 0b11 << 2,
        }
    }

    /// mg per LSB
    pub fn sensitivity(self) -> f32 {
        match self {
            Self::G4 => 0.122,
            Self::G8 => 0.244,
            Self::G16 => 0.488,
            Self::G32 => 0.976,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        [Self::G4, Self::G8, Self::G16, Self::G32].get(value as usize).copied()
    }
}

/// Gyroscope full-scale range
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    Dps125 = 0,
    Dps250 = 1,
    Dps500 = 2,
    Dps1000 = 3,
    Dps2000 = 4,
}

impl GyroRange {
    /// FS_G and FS_125 bits of CTRL2_G
    fn bits(self) -> u8 {
        match self {
            Self::Dps125 => 1 << 1,
            Self::Dps250 => 0b00 << 2,
            Self::Dps500 => 0b01 << 2,
            Self::Dps1000 => 0b10 << 2,
            Self::Dps2000 => 0b11 << 2,
        }
    }

    /// mdps per LSB
    pub fn sensitivity(self) -> f32 {
        match self {
            Self::Dps125 => 4.375,
            Self::Dps250 => 8.75,
            Self::Dps500 => 17.5,
            Self::Dps1000 => 35.0,
            Self::Dps2000 => 70.0,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        [Self::Dps125, Self::Dps250, Self::Dps500, Self::Dps1000, Self::Dps2000]
            .get(value as usize)
            .copied()
    }
}

/// ODR bits shared by CTRL1_XL and CTRL2_G
fn output_data_rate(precision: SensorPrecision) -> u8 {
    match precision {
        SensorPrecision::High => 0xA0, // 6664 Hz
        SensorPrecision::Med => 0x70,  // 833 Hz
        SensorPrecision::Low => 0x40,  // 104 Hz
    }
}

/// Temperature in C from the raw OUT_TEMP word
pub fn raw_to_celsius(raw: i16) -> f32 {
    raw as f32 / 256.0 + 25.0
}

fn axes(raw: &[u8; 6]) -> [i16; 3] {
    [
        i16::from_le_bytes([raw[0], raw[1]]),
        i16::from_le_bytes([raw[2], raw[3]]),
        i16::from_le_bytes([raw[4], raw[5]]),
    ]
}

fn scaled(axes: [i16; 3], factor: f32) -> Vec3d {
    Vec3d {
        x: axes[0] as f32 * factor,
        y: axes[1] as f32 * factor,
        z: axes[2] as f32 * factor,
    }
}

/// LSM6DSO32 driver
pub struct Lsm6dso32 {
    core: SensorCore,
    accel_range: AccelRange,
    gyro_range: GyroRange,
}

impl Lsm6dso32 {
    pub fn new(location: SensorLocation, precision: SensorPrecision) -> Self {
        Self {
            core: SensorCore::new(LSM6DSO32_NAME, TAGS, location, precision),
            accel_range: AccelRange::G32,
            gyro_range: GyroRange::Dps500,
        }
    }

    pub fn collector(location: SensorLocation, precision: SensorPrecision) -> Box<dyn Sensor> {
        Box::new(Self::new(location, precision))
    }

    /// Ranges applied at the next open
    pub fn with_ranges(mut self, accel: AccelRange, gyro: GyroRange) -> Self {
        self.accel_range = accel;
        self.gyro_range = gyro;
        self
    }

    fn ranges(&self, arena: &Arena) -> Result<(AccelRange, GyroRange)> {
        let ctx = arena.get(self.core.ctx()?)?;
        let accel = AccelRange::from_u8(ctx[CTX_ACCEL]).ok_or(FetcherError::StaleContext)?;
        let gyro = GyroRange::from_u8(ctx[CTX_GYRO]).ok_or(FetcherError::StaleContext)?;
        Ok((accel, gyro))
    }

    fn read_axes(&self, bus: &mut dyn I2cBus, first_reg: u8) -> Result<[i16; 3]> {
        let mut raw = [0u8; 6];
        read_register(bus, self.core.address(), first_reg, &mut raw)?;
        Ok(axes(&raw))
    }
}

impl Sensor for Lsm6dso32 {
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

        let mut id = [0u8; 1];
        read_register(bus, address, WHO_AM_I, &mut id).map_err(|e| FetcherError::DeviceNotFound {
            address,
            reason: e.to_string(),
        })?;
        if id[0] != WHO_AM_I_VALUE {
            return Err(FetcherError::DeviceNotFound {
                address,
                reason: format!("WHO_AM_I returned 0x{:02X}, expected 0x{:02X}", id[0], WHO_AM_I_VALUE),
            });
        }

        write_register(bus, address, CTRL3_C, CTRL3_SW_RESET)?;
        bus.delay_us(RESET_WAIT_US);
        write_register(bus, address, CTRL3_C, CTRL3_BDU | CTRL3_IF_INC)?;

        let odr = output_data_rate(self.core.precision);
        write_register(bus, address, CTRL1_XL, odr | self.accel_range.bits())?;
        write_register(bus, address, CTRL2_G, odr | self.gyro_range.bits())?;

        let ctx = arena.get_mut(self.core.ctx()?)?;
        ctx[CTX_ACCEL] = self.accel_range as u8;
        ctx[CTX_GYRO] = self.gyro_range as u8;
        Ok(())
    }

    fn read(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena, tag: SensorTag) -> Result<SensorTagData> {
        self.core.check_read(tag)?;
        let (accel, gyro) = self.ranges(arena)?;

        let value = match tag {
            SensorTag::Temperature => {
                let mut raw = [0u8; 2];
                read_register(bus, self.core.address(), OUT_TEMP_L, &mut raw)?;
                SensorValue::Float(raw_to_celsius(i16::from_le_bytes(raw)))
            }
            SensorTag::LinearAccelRel => {
                let raw = self.read_axes(bus, OUTX_L_A)?;
                SensorValue::Vec3d(scaled(raw, accel.sensitivity() / 1000.0 * GRAVITY))
            }
            _ => {
                let raw = self.read_axes(bus, OUTX_L_G)?;
                SensorValue::Vec3d(scaled(raw, gyro.sensitivity() / 1000.0))
            }
        };

        SensorTagData::new(tag, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockI2c;
    use crate::bus::MockI2cBus;
    use crate::sensor::open_sensor;

    fn opened(bus: &mut MockI2c, arena: &mut Arena, precision: SensorPrecision) -> Box<dyn Sensor> {
        bus.push_read_data(&[WHO_AM_I_VALUE]);
        open_sensor(
            Lsm6dso32::collector,
            bus,
            SensorLocation::new(LSM6DSO32_DEFAULT_ADDRESS),
            precision,
            arena,
        )
        .unwrap()
    }

    fn vec3(data: SensorTagData) -> Vec3d {
        match data.value {
            SensorValue::Vec3d(v) => v,
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_open_configures_ranges_and_rate() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);
        let _imu = opened(&mut bus, &mut arena, SensorPrecision::High);

        assert_eq!(
            bus.writes_to(LSM6DSO32_DEFAULT_ADDRESS),
            vec![
                vec![WHO_AM_I],
                vec![CTRL3_C, CTRL3_SW_RESET],
                vec![CTRL3_C, 0x44],
                vec![CTRL1_XL, 0xA4],
                vec![CTRL2_G, 0xA4],
            ]
        );
    }

    #[test]
    fn test_open_low_precision_rate() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);
        let _imu = opened(&mut bus, &mut arena, SensorPrecision::Low);

        let writes = bus.writes_to(LSM6DSO32_DEFAULT_ADDRESS);
        assert_eq!(writes[3], vec![CTRL1_XL, 0x44]);
        assert_eq!(writes[4], vec![CTRL2_G, 0x44]);
    }

    #[test]
    fn test_wrong_identity_rejected() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);
        bus.push_read_data(&[0x69]);

        let result = open_sensor(
            Lsm6dso32::collector,
            &mut bus,
            SensorLocation::new(LSM6DSO32_DEFAULT_ADDRESS),
            SensorPrecision::High,
            &mut arena,
        );

        assert!(matches!(result, Err(FetcherError::DeviceNotFound { address: 0x6A, .. })));
    }

    #[test]
    fn test_read_temperature() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);
        let mut imu = opened(&mut bus, &mut arena, SensorPrecision::High);

        // 0x0200 / 256 + 25 = 27 C
        bus.push_read_data(&[0x00, 0x02]);
        let data = imu.read(&mut bus, &mut arena, SensorTag::Temperature).unwrap();
        assert_eq!(data.value, SensorValue::Float(27.0));
    }

    #[test]
    fn test_read_acceleration_scaled_to_si() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);
        let mut imu = opened(&mut bus, &mut arena, SensorPrecision::High);

        // 1025 LSB at 0.976 mg/LSB is ~1 g
        let x = 1025i16.to_le_bytes();
        let y = (-1025i16).to_le_bytes();
        bus.push_read_data(&[x[0], x[1], y[0], y[1], 0, 0]);
        let accel = vec3(imu.read(&mut bus, &mut arena, SensorTag::LinearAccelRel).unwrap());

        assert!((accel.x - 9.81).abs() < 0.01, "x {}", accel.x);
        assert!((accel.y + 9.81).abs() < 0.01, "y {}", accel.y);
        assert_eq!(accel.z, 0.0);
    }

    #[test]
    fn test_read_angular_velocity() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);
        let mut imu = opened(&mut bus, &mut arena, SensorPrecision::Med);

        // 1000 LSB at 17.5 mdps/LSB = 17.5 dps
        let z = 1000i16.to_le_bytes();
        bus.push_read_data(&[0, 0, 0, 0, z[0], z[1]]);
        let gyro = vec3(imu.read(&mut bus, &mut arena, SensorTag::AngularVel).unwrap());

        assert!((gyro.z - 17.5).abs() < 1e-4);
        assert_eq!(
            bus.transactions().last(),
            Some(&crate::bus::mock::I2cTransaction::WriteRead {
                addr: LSM6DSO32_DEFAULT_ADDRESS,
                write_data: vec![OUTX_L_G],
                read_len: 6,
            })
        );
    }

    #[test]
    fn test_bus_failure_propagates() {
        let mut bus = MockI2cBus::new();
        bus.expect_write_read()
            .returning(|_, _, _| Err(FetcherError::BusTransactionFailed("nack".to_string())));
        let mut arena = Arena::with_capacity(8);

        let result = open_sensor(
            Lsm6dso32::collector,
            &mut bus,
            SensorLocation::new(LSM6DSO32_DEFAULT_ADDRESS),
            SensorPrecision::High,
            &mut arena,
        );

        assert!(matches!(result, Err(FetcherError::DeviceNotFound { .. })));
    }
}
