//! # System Clock Sensor
//!
//! Milliseconds elapsed since the sensor was opened, as a `TIME` record.
//! No bus traffic.

use super::{Sensor, SensorCore, SensorLocation, SensorPrecision};
use crate::arena::Arena;
use crate::bus::I2cBus;
use crate::error::Result;
use crate::tagged::protocol::{SensorTag, SensorTagData, SensorValue};

pub const SYSCLOCK_NAME: &str = "SYSCLOCK";

const TAGS: &[SensorTag] = &[SensorTag::Time];

/// Start time, unix milliseconds (i64 BE)
const CTX_SIZE: usize = 8;

fn wall_clock_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Elapsed-time pseudo sensor
pub struct Sysclock {
    core: SensorCore,
    clock: fn() -> i64,
}

impl Sysclock {
    pub fn new(location: SensorLocation, precision: SensorPrecision) -> Self {
        Self::with_clock(location, precision, wall_clock_ms)
    }

    /// Use `clock` (unix milliseconds) instead of the wall clock
    pub fn with_clock(location: SensorLocation, precision: SensorPrecision, clock: fn() -> i64) -> Self {
        Self {
            core: SensorCore::new(SYSCLOCK_NAME, TAGS, location, precision),
            clock,
        }
    }

    pub fn collector(location: SensorLocation, precision: SensorPrecision) -> Box<dyn Sensor> {
        Box::new(Self::new(location, precision))
    }
}

impl Sensor for Sysclock {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SensorCore {
        &mut self.core
    }

    fn ctx_size(&self) -> usize {
        CTX_SIZE
    }

    fn ctx_align(&self) -> usize {
        8
    }

    fn init(&mut self, _bus: &mut dyn I2cBus, arena: &mut Arena) -> Result<()> {
        let ctx = self.core.ctx()?;
        let start = (self.clock)();
        arena.get_mut(ctx)?.copy_from_slice(&start.to_be_bytes());
        Ok(())
    }

    fn read(&mut self, _bus: &mut dyn I2cBus, arena: &mut Arena, tag: SensorTag) -> Result<SensorTagData> {
        let ctx = self.core.check_read(tag)?;
        let mut start = [0u8; CTX_SIZE];
        start.copy_from_slice(arena.get(ctx)?);
        let start = i64::from_be_bytes(start);

        // Wraps after ~49 days, like the U32 wire type
        let elapsed = (self.clock)().saturating_sub(start).max(0) as u32;
        SensorTagData::new(SensorTag::Time, SensorValue::U32(elapsed))
    }
}
