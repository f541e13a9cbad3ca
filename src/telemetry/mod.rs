//! # Telemetry Module
//!
//! The acquisition loop: opens the configured sensors and streams their
//! readings to the output.
//!
//! This module handles:
//! - Resolving configured sensor names through the collector registry
//! - Sizing the arena for the opened drivers
//! - Reading every tag of every sensor once per poll
//! - Writing records through a [`TelemetrySink`]

pub mod sink;

pub use sink::{open_output, TelemetrySink};

use crate::arena::{align_up, Arena};
use crate::bus::I2cBus;
use crate::collectors::{collector_search, CollectorEntry};
use crate::config::{Config, GnssConfig, SensorConfig};
use crate::error::{FetcherError, Result};
use crate::sensor::m10spg::{M10spg, M10SPG_NAME};
use crate::sensor::{place_and_open, Sensor, SensorLocation};
use crate::ubx::transport::GnssSerial;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one pass over the sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollSummary {
    pub records: usize,
    pub failures: usize,
}

/// Opened sensors sharing one bus and one arena
pub struct Acquisition<B: I2cBus> {
    bus: B,
    arena: Arena,
    sensors: Vec<Box<dyn Sensor>>,
}

/// Construct the driver for one configured sensor
fn build_sensor(entry: &CollectorEntry, sensor: &SensorConfig, gnss: &GnssConfig) -> Result<Box<dyn Sensor>> {
    let location = SensorLocation::new(sensor.address);
    if entry.sensor_name != M10SPG_NAME {
        return Ok((entry.collector)(location, sensor.precision));
    }

    let receiver = match &gnss.serial_port {
        Some(path) => {
            let link = GnssSerial::open_with_paths(&[path.as_str()], gnss.baud_rate)?;
            M10spg::with_transport(location, sensor.precision, Box::new(link))
        }
        None => M10spg::new(location, sensor.precision),
    };
    Ok(Box::new(
        receiver
            .with_ack_policy(gnss.ack_policy())
            .with_settle(
                Duration::from_millis(gnss.reset_settle_ms),
                Duration::from_millis(gnss.restart_wait_ms),
            ),
    ))
}

/// Arena bytes needed to place `sensors` back to back
fn arena_size(sensors: &[Box<dyn Sensor>]) -> usize {
    sensors.iter().fold(0, |offset, sensor| {
        align_up(offset, sensor.ctx_align()) + sensor.ctx_size()
    })
}

impl<B: I2cBus> Acquisition<B> {
    /// Resolve, place and open every configured sensor
    ///
    /// Unknown names and sensors that fail to open are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `OutOfArena` if the contexts do not fit (a sizing bug)
    pub fn new(mut bus: B, config: &Config) -> Result<Self> {
        let mut candidates = Vec::with_capacity(config.sensors.len());
        for sensor in &config.sensors {
            let entry = match collector_search(&sensor.name) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping sensor: {}", e);
                    continue;
                }
            };
            match build_sensor(entry, sensor, &config.gnss) {
                Ok(driver) => candidates.push(driver),
                Err(e) => error!("Could not create {}: {}", sensor.name, e),
            }
        }

        let capacity = arena_size(&candidates) + config.acquisition.arena_slack;
        let mut arena = Arena::with_capacity(capacity);
        debug!("Arena sized to {} bytes for {} sensors", capacity, candidates.len());

        let mut sensors = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let name = candidate.name();
            let address = candidate.location().address();
            match place_and_open(candidate, &mut bus, &mut arena) {
                Ok(sensor) => {
                    info!("Opened {} at 0x{:02X}", name, address);
                    sensors.push(sensor);
                }
                Err(e @ FetcherError::OutOfArena { .. }) => return Err(e),
                Err(e) => error!("Could not open {} at 0x{:02X}: {}", name, address, e),
            }
        }

        if sensors.is_empty() {
            warn!("No sensors opened");
        }

        Ok(Self { bus, arena, sensors })
    }

    pub fn sensors(&self) -> &[Box<dyn Sensor>] {
        &self.sensors
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Read every tag of every sensor once
    ///
    /// A failed read is logged and the pass continues with the next tag.
    ///
    /// # Errors
    ///
    /// Only output errors are returned
    pub fn poll_once<W: Write>(&mut self, sink: &mut TelemetrySink<W>) -> Result<PollSummary> {
        let mut summary = PollSummary::default();

        for sensor in self.sensors.iter_mut() {
            for &tag in sensor.tags() {
                match sensor.read(&mut self.bus, &mut self.arena, tag) {
                    Ok(data) => {
                        sink.write(sensor.name(), &data)?;
                        summary.records += 1;
                    }
                    Err(e) => {
                        warn!("{} read failed for {:?}: {}", sensor.name(), tag, e);
                        summary.failures += 1;
                    }
                }
            }
        }

        sink.flush()?;
        Ok(summary)
    }
}

/// One pass of blocking bus I/O without stalling the other tasks
///
/// On a multi-thread runtime the worker hands its queue off for the
/// duration of the pass; a current-thread runtime has nowhere to move it,
/// so the pass runs inline there.
fn poll_blocking<B: I2cBus, W: Write>(
    acquisition: &mut Acquisition<B>,
    sink: &mut TelemetrySink<W>,
) -> Result<PollSummary> {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| acquisition.poll_once(sink)),
        _ => acquisition.poll_once(sink),
    }
}

/// Poll on a fixed period until `shutdown` completes
///
/// # Returns
///
/// * `Result<u64>` - Number of completed polls
pub async fn run<B, W, F>(
    acquisition: &mut Acquisition<B>,
    sink: &mut TelemetrySink<W>,
    period: Duration,
    shutdown: F,
) -> Result<u64>
where
    B: I2cBus,
    W: Write,
    F: Future<Output = ()>,
{
    let mut poll_interval = interval(period);
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut polls: u64 = 0;
    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                let summary = poll_blocking(acquisition, sink)?;
                polls += 1;
                debug!("Poll {}: {} records, {} failures", polls, summary.records, summary.failures);
            }

            _ = &mut shutdown => {
                info!("Shutting down after {} polls ({} records)", polls, sink.records());
                break;
            }
        }
    }

    sink.flush()?;
    Ok(polls)
}
