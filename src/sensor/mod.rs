//! # Sensor Module
//!
//! Uniform interface over every sensor driver.
//!
//! A driver is constructed by a collector entry, handed a slice of the
//! shared [`Arena`] for its private state, opened once and then read tag by
//! tag. Drivers keep no heap state of their own between reads: everything
//! that must survive is encoded into the arena context.
//!
//! This module handles:
//! - The [`Sensor`] trait and the state every driver shares ([`SensorCore`])
//! - Opening a sensor from a collector entry ([`open_sensor`])
//! - Per-sample bookkeeping for drivers that serve several tags from one
//!   measurement ([`SampleState`])

pub mod lsm6dso32;
pub mod m10spg;
pub mod ms5611;
pub mod pac195x;
pub mod sht41;
pub mod sysclock;

use crate::arena::{Arena, ArenaHandle};
use crate::bus::I2cBus;
use crate::error::{FetcherError, Result};
use crate::tagged::protocol::{sensor_strtag, SensorTag, SensorTagData};
use serde::Deserialize;

/// Requested accuracy/speed tradeoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorPrecision {
    #[default]
    High,
    Med,
    Low,
}

/// Where a sensor lives on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorLocation {
    address: u8,
}

impl SensorLocation {
    /// 7-bit address; the top bit is masked off
    pub fn new(address: u8) -> Self {
        Self { address: address & 0x7F }
    }

    pub fn address(&self) -> u8 {
        self.address
    }
}

/// Constructor stored in the collector registry
pub type Collector = fn(SensorLocation, SensorPrecision) -> Box<dyn Sensor>;

/// State common to every driver
#[derive(Debug, Clone)]
pub struct SensorCore {
    name: &'static str,
    tags: &'static [SensorTag],
    location: SensorLocation,
    precision: SensorPrecision,
    ctx: Option<ArenaHandle>,
    opened: bool,
}

impl SensorCore {
    pub fn new(
        name: &'static str,
        tags: &'static [SensorTag],
        location: SensorLocation,
        precision: SensorPrecision,
    ) -> Self {
        Self {
            name,
            tags,
            location,
            precision,
            ctx: None,
            opened: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.location.address()
    }

    /// Context handle, available once installed by [`open_sensor`]
    pub fn ctx(&self) -> Result<ArenaHandle> {
        self.ctx.ok_or(FetcherError::NotOpened(self.name))
    }

    /// Gate for `read`: the sensor is open and provides `tag`
    pub fn check_read(&self, tag: SensorTag) -> Result<ArenaHandle> {
        if !self.opened {
            return Err(FetcherError::NotOpened(self.name));
        }
        if !self.tags.contains(&tag) {
            return Err(FetcherError::UnsupportedTag {
                sensor: self.name,
                tag: sensor_strtag(tag),
            });
        }
        self.ctx()
    }
}

/// A sensor driver
///
/// Drivers implement `core`/`core_mut`, `ctx_size`, `init` and `read`; the
/// remaining capabilities are provided on top of [`SensorCore`].
pub trait Sensor: Send {
    fn core(&self) -> &SensorCore;

    fn core_mut(&mut self) -> &mut SensorCore;

    /// Bytes of private state the driver keeps in the arena
    fn ctx_size(&self) -> usize;

    /// Alignment of the private state
    fn ctx_align(&self) -> usize {
        4
    }

    /// Bring the device into a readable state
    ///
    /// Runs with the context already installed and zeroed.
    fn init(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena) -> Result<()>;

    /// Produce one reading for `tag`
    ///
    /// # Errors
    ///
    /// `NotOpened` before a successful open, `UnsupportedTag` for tags not
    /// in [`Sensor::tags`], plus any bus or checksum error of the driver.
    fn read(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena, tag: SensorTag) -> Result<SensorTagData>;

    fn name(&self) -> &'static str {
        self.core().name
    }

    fn tags(&self) -> &'static [SensorTag] {
        self.core().tags
    }

    fn location(&self) -> SensorLocation {
        self.core().location
    }

    fn precision(&self) -> SensorPrecision {
        self.core().precision
    }

    /// Drivers that pick the sampling setup per conversion (MS5611, SHT41)
    /// use the new precision from the next read; the others program it into
    /// the device and only apply it on the next `open`
    fn set_precision(&mut self, precision: SensorPrecision) {
        self.core_mut().precision = precision;
    }

    fn set_ctx(&mut self, ctx: ArenaHandle) {
        self.core_mut().ctx = Some(ctx);
    }

    fn is_open(&self) -> bool {
        self.core().opened
    }

    /// Run `init` and mark the sensor readable on success
    fn open(&mut self, bus: &mut dyn I2cBus, arena: &mut Arena) -> Result<()> {
        self.core_mut().opened = false;
        let ctx = self.core().ctx()?;
        arena.zero(ctx)?;
        self.init(bus, arena)?;
        self.core_mut().opened = true;
        Ok(())
    }

    /// Widest value this sensor can produce, in bytes
    fn max_dsize(&self) -> usize {
        self.tags()
            .iter()
            .map(|tag| tag.dtype().width())
            .max()
            .unwrap_or(0)
    }
}

/// Construct, place and open a sensor
///
/// The context is carved from `arena` before the device is touched. The
/// arena never frees, so a failed open still consumes its context bytes.
///
/// # Errors
///
/// `OutOfArena` if the context does not fit, otherwise whatever the
/// driver's `init` reports
pub fn open_sensor(
    collector: Collector,
    bus: &mut dyn I2cBus,
    location: SensorLocation,
    precision: SensorPrecision,
    arena: &mut Arena,
) -> Result<Box<dyn Sensor>> {
    place_and_open(collector(location, precision), bus, arena)
}

/// Place an already constructed sensor in `arena` and open it
///
/// Used for drivers needing more than a location and precision to build,
/// such as a GNSS receiver on its own serial link.
pub fn place_and_open(
    mut sensor: Box<dyn Sensor>,
    bus: &mut dyn I2cBus,
    arena: &mut Arena,
) -> Result<Box<dyn Sensor>> {
    let ctx = arena.allocate(sensor.ctx_size(), sensor.ctx_align())?;
    sensor.set_ctx(ctx);
    sensor.open(bus, arena)?;
    Ok(sensor)
}

/// Which tags of the current measurement have been handed out
///
/// Drivers that measure several quantities at once keep one sample in their
/// context and take a new measurement when a tag is requested twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleState(u16);

impl SampleState {
    const VALID: u16 = 0x8000;

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    /// State right after a measurement
    pub fn fresh() -> Self {
        Self(Self::VALID)
    }

    /// True if `tag` can still be served from the stored sample
    pub fn can_serve(self, tag: SensorTag) -> bool {
        self.0 & Self::VALID != 0 && self.0 & Self::bit(tag) == 0
    }

    pub fn mark_served(self, tag: SensorTag) -> Self {
        Self(self.0 | Self::bit(tag))
    }

    fn bit(tag: SensorTag) -> u16 {
        1 << (tag as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockI2c;
    use crate::tagged::protocol::SensorValue;

    /// Driver with no device behind it: counts reads in its context
    struct CountingSensor {
        core: SensorCore,
    }

    const COUNTING_TAGS: &[SensorTag] = &[SensorTag::Time, SensorTag::AngularVel];

    fn counting_collector(location: SensorLocation, precision: SensorPrecision) -> Box<dyn Sensor> {
        Box::new(CountingSensor {
            core: SensorCore::new("COUNTER", COUNTING_TAGS, location, precision),
        })
    }

    impl Sensor for CountingSensor {
        fn core(&self) -> &SensorCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut SensorCore {
            &mut self.core
        }

        fn ctx_size(&self) -> usize {
            4
        }

        fn init(&mut self, bus: &mut dyn I2cBus, _arena: &mut Arena) -> Result<()> {
            bus.write(self.core.address(), &[0x01])
        }

        fn read(&mut self, _bus: &mut dyn I2cBus, arena: &mut Arena, tag: SensorTag) -> Result<SensorTagData> {
            let ctx = self.core.check_read(tag)?;
            let slot = arena.get_mut(ctx)?;
            let count = u32::from_be_bytes([slot[0], slot[1], slot[2], slot[3]]) + 1;
            slot.copy_from_slice(&count.to_be_bytes());
            SensorTagData::new(SensorTag::Time, SensorValue::U32(count))
        }
    }

    #[test]
    fn test_open_sensor_installs_context() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);

        let mut sensor = open_sensor(
            counting_collector,
            &mut bus,
            SensorLocation::new(0x20),
            SensorPrecision::Med,
            &mut arena,
        )
        .unwrap();

        assert!(sensor.is_open());
        assert_eq!(sensor.name(), "COUNTER");
        assert_eq!(sensor.precision(), SensorPrecision::Med);
        assert_eq!(arena.used(), 4);
        assert_eq!(bus.writes_to(0x20), vec![vec![0x01]]);

        let first = sensor.read(&mut bus, &mut arena, SensorTag::Time).unwrap();
        let second = sensor.read(&mut bus, &mut arena, SensorTag::Time).unwrap();
        assert_eq!(first.value, SensorValue::U32(1));
        assert_eq!(second.value, SensorValue::U32(2));
    }

    #[test]
    fn test_open_sensor_out_of_arena() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(2);

        let result = open_sensor(
            counting_collector,
            &mut bus,
            SensorLocation::new(0x20),
            SensorPrecision::High,
            &mut arena,
        );

        assert!(matches!(result, Err(FetcherError::OutOfArena { .. })));
        assert!(bus.transactions().is_empty());
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);
        let mut sensor = counting_collector(SensorLocation::new(0x20), SensorPrecision::High);

        let result = sensor.read(&mut bus, &mut arena, SensorTag::Time);
        assert!(matches!(result, Err(FetcherError::NotOpened("COUNTER"))));
    }

    #[test]
    fn test_read_unsupported_tag() {
        let mut bus = MockI2c::new();
        let mut arena = Arena::with_capacity(8);
        let mut sensor = open_sensor(
            counting_collector,
            &mut bus,
            SensorLocation::new(0x20),
            SensorPrecision::High,
            &mut arena,
        )
        .unwrap();

        let result = sensor.read(&mut bus, &mut arena, SensorTag::Pressure);
        assert!(matches!(result, Err(FetcherError::UnsupportedTag { .. })));
    }

    #[test]
    fn test_max_dsize_is_widest_tag() {
        let sensor = counting_collector(SensorLocation::new(0x20), SensorPrecision::High);
        assert_eq!(sensor.max_dsize(), 12);
    }

    #[test]
    fn test_location_masks_to_seven_bits() {
        assert_eq!(SensorLocation::new(0xC4).address(), 0x44);
    }

    #[test]
    fn test_sample_state() {
        let empty = SampleState::default();
        assert!(!empty.can_serve(SensorTag::Temperature));

        let fresh = SampleState::fresh();
        assert!(fresh.can_serve(SensorTag::Temperature));

        let served = fresh.mark_served(SensorTag::Temperature);
        assert!(!served.can_serve(SensorTag::Temperature));
        assert!(served.can_serve(SensorTag::Humidity));
        assert_eq!(SampleState::from_bits(served.bits()), served);
    }
}
