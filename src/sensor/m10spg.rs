//! # M10SPG GNSS Receiver
//!
//! u-blox MAX-M10S family, spoken to in UBX.
//!
//! The receiver is reached over DDC on the sensor bus (address 0x42) unless
//! another [`UbxTransport`] is injected with [`M10spg::with_transport`].
//! Opening resets the receiver, then configures it in the RAM layer:
//! airborne <4 g dynamics, BeiDou off, NMEA off on the active interface and
//! periodic NAV-PVT at a measurement period chosen by precision.
//!
//! Each NAV-PVT epoch is cached in the context and serves one read of each
//! tag; the next read after that fetches a new epoch.

use super::{SampleState, Sensor, SensorCore, SensorLocation, SensorPrecision};
use crate::arena::Arena;
use crate::bus::I2cBus;
use crate::error::{FetcherError, Result};
use crate::tagged::protocol::{SensorTag, SensorTagData, SensorValue, Vec2dI32};
use crate::ubx::frame::UbxFrame;
use crate::ubx::messages::{
    bbr_mask, keys, ConfigLayer, ConfigResetPayload, ConfigValue, GpsFixType, NavPvtPayload,
    ResetMode, UbxPayload, ValsetPayload, ALT_SCALE_TO_METERS, CLASS_NAV, DYNMODEL_AIR_4G,
    NAV_PVT,
};
use crate::ubx::session::{AckPolicy, UbxSession, UbxTransport};
use crate::ubx::transport::DdcTransport;
use std::time::Duration;

pub const M10SPG_NAME: &str = "M10SPG";

/// DDC address
pub const M10SPG_DEFAULT_ADDRESS: u8 = 0x42;

/// The receiver sends nothing after CFG-RST; wait this long before talking
const DEFAULT_RESET_SETTLE: Duration = Duration::from_secs(1);

/// Disabling a constellation restarts the GNSS subsystem
const DEFAULT_RESTART_WAIT: Duration = Duration::from_millis(500);

/// Upper bound on waiting for a polled NAV-PVT
const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(2);

const TAGS: &[SensorTag] = &[SensorTag::Coords, SensorTag::AltitudeSea];

// Context layout (big-endian)
const CTX_LAT: usize = 0;
const CTX_LON: usize = 4;
const CTX_HMSL: usize = 8;
const CTX_FIX_TYPE: usize = 12;
const CTX_FLAGS: usize = 13;
const CTX_STATE: usize = 14;
const CTX_SIZE: usize = 16;

/// Receiver port carrying the UBX traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnssInterface {
    I2c,
    Uart1,
}

/// Measurement period for a precision (ms)
pub fn measurement_period_ms(precision: SensorPrecision) -> u16 {
    match precision {
        SensorPrecision::High => 100,
        SensorPrecision::Med => 300,
        SensorPrecision::Low => 1000,
    }
}

/// CFG-VALSET applied at open
pub fn configuration(interface: GnssInterface, precision: SensorPrecision) -> Result<UbxFrame> {
    let mut valset = ValsetPayload::new(ConfigLayer::Ram);
    match interface {
        GnssInterface::I2c => {
            valset
                .push(keys::I2COUTPROT_NMEA, ConfigValue::L(false))?
                .push(keys::I2CINPROT_NMEA, ConfigValue::L(false))?;
        }
        GnssInterface::Uart1 => {
            valset.push(keys::UART1OUTPROT_NMEA, ConfigValue::L(false))?;
        }
    }
    valset
        .push(keys::NAVSPG_DYNMODEL, ConfigValue::U1(DYNMODEL_AIR_4G))?
        .push(keys::RATE_MEAS, ConfigValue::U2(measurement_period_ms(precision)))?
        .push(keys::SIGNAL_BDS_ENA, ConfigValue::L(false))?;

    let pvt_output = match interface {
        GnssInterface::I2c => keys::MSGOUT_UBX_NAV_PVT_I2C,
        GnssInterface::Uart1 => keys::MSGOUT_UBX_NAV_PVT_UART1,
    };
    valset.push(pvt_output, ConfigValue::U1(1))?;
    valset.to_frame()
}

/// Timings and frames of the open sequence
struct OpenPlan {
    reset: UbxFrame,
    valset: UbxFrame,
    policy: AckPolicy,
    reset_settle: Duration,
    restart_wait: Duration,
}

fn micros(duration: Duration) -> u32 {
    duration.as_micros().min(u32::MAX as u128) as u32
}

/// The CFG-RST write is the first contact; a bus failure there means no
/// receiver answers at `address`. Later failures propagate unchanged.
fn configure<T: UbxTransport>(session: &mut UbxSession<T>, plan: &OpenPlan, address: u8) -> Result<()> {
    session.send(&plan.reset).map_err(|e| match e {
        FetcherError::BusTransactionFailed(reason) => FetcherError::DeviceNotFound { address, reason },
        other => other,
    })?;
    session.transport_mut().wait_us(micros(plan.reset_settle));

    session.send_with_ack(&plan.valset, plan.policy)?;
    session.transport_mut().wait_us(micros(plan.restart_wait));
    Ok(())
}

/// Newest buffered NAV-PVT, polling for one if none is queued
fn latest_epoch<T: UbxTransport>(session: &mut UbxSession<T>, timeout: Duration) -> Result<NavPvtPayload> {
    let frame = match session.drain_latest(CLASS_NAV, NAV_PVT)? {
        Some(frame) => frame,
        None => {
            session.send(&UbxFrame::poll(CLASS_NAV, NAV_PVT))?;
            session.await_frame(CLASS_NAV, NAV_PVT, timeout)?
        }
    };
    NavPvtPayload::from_frame(&frame)
}

/// M10SPG driver
pub struct M10spg {
    core: SensorCore,
    link: Option<UbxSession<Box<dyn UbxTransport>>>,
    ack_policy: AckPolicy,
    reset_settle: Duration,
    restart_wait: Duration,
    fix_timeout: Duration,
}

impl M10spg {
    /// Receiver on the sensor bus (DDC)
    pub fn new(location: SensorLocation, precision: SensorPrecision) -> Self {
        Self {
            core: SensorCore::new(M10SPG_NAME, TAGS, location, precision),
            link: None,
            ack_policy: AckPolicy::default(),
            reset_settle: DEFAULT_RESET_SETTLE,
            restart_wait: DEFAULT_RESTART_WAIT,
            fix_timeout: DEFAULT_FIX_TIMEOUT,
        }
    }

    /// Receiver on its own link (UART1); the sensor bus is not used
    pub fn with_transport(
        location: SensorLocation,
        precision: SensorPrecision,
        transport: Box<dyn UbxTransport>,
    ) -> Self {
        Self {
            link: Some(UbxSession::new(transport)),
            ..Self::new(location, precision)
        }
    }

    pub fn collector(location: SensorLocation, precision: SensorPrecision) -> Box<dyn Sensor> {
        Box::new(Self::new(location, precision))
    }

    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    /// Waits after the reset and after configuration
    pub fn with_settle(mut self, reset_settle: Duration, restart_wait: Duration) -> Self {
        self.reset_settle = reset_settle;
        self.restart_wait = restart_wait;
        self
    }

    pub fn with_fix_timeout(mut self, timeout: Duration) -> Self {
        self.fix_timeout = timeout;
        self
    }

    pub fn interface(&self) -> GnssInterface {
        match self.link {
            Some(_) => GnssInterface::Uart1,
            None => GnssInterface::I2c,
        }
    }

    fn fetch_epoch(&mut self, bus: &mut dyn I2cBus) -> Result<NavPvtPayload> {
        let timeout = self.fix_timeout;
        match self.link.as_mut() {
            Some(session) => latest_epoch(session, timeout),
            None => {
                let mut session = UbxSession::new(DdcTransport::new(bus, self.core.address()));
                latest_epoch(&mut session, timeout)
            }
        }
    }
}

fn read_i32(ctx: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([ctx[at], ctx[at + 1], ctx[at + 2], ctx[at + 3]])
}

impl Sensor for M10spg {
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
        let plan = OpenPlan {
            reset: ConfigResetPayload::new(bbr_mask::HOT_START, ResetMode::SoftReset).to_frame()?,
            valset: configuration(self.interface(), self.core.precision)?,
            policy: self.ack_policy,
            reset_settle: self.reset_settle,
            restart_wait: self.restart_wait,
        };

        match self.link.as_mut() {
            Some(session) => configure(session, &plan, address),
            None => configure(&mut UbxSession::new(DdcTransport::new(bus, address)), &plan, address),
        }
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
            let pvt = self.fetch_epoch(bus)?;
            let ctx = arena.get_mut(handle)?;
            ctx[CTX_LAT..CTX_LAT + 4].copy_from_slice(&pvt.lat.to_be_bytes());
            ctx[CTX_LON..CTX_LON + 4].copy_from_slice(&pvt.lon.to_be_bytes());
            ctx[CTX_HMSL..CTX_HMSL + 4].copy_from_slice(&pvt.h_msl.to_be_bytes());
            ctx[CTX_FIX_TYPE] = pvt.fix_type;
            ctx[CTX_FLAGS] = pvt.flags;
            SampleState::fresh()
        };

        let ctx = arena.get_mut(handle)?;
        ctx[CTX_STATE..CTX_STATE + 2].copy_from_slice(&state.mark_served(tag).bits().to_be_bytes());

        let raw_fix = ctx[CTX_FIX_TYPE];
        let fix = GpsFixType::from_u8(raw_fix);
        let fix_ok = ctx[CTX_FLAGS] & NavPvtPayload::GNSS_FIX_OK != 0;

        match tag {
            SensorTag::Coords => {
                if !(fix_ok && fix.has_usable_position()) {
                    return Err(FetcherError::NoUsableFix(raw_fix));
                }
                let coords = Vec2dI32 {
                    x: read_i32(ctx, CTX_LAT),
                    y: read_i32(ctx, CTX_LON),
                };
                SensorTagData::new(tag, SensorValue::Vec2dI32(coords))
            }
            _ => {
                if !(fix_ok && fix == GpsFixType::Fix3d) {
                    return Err(FetcherError::NoUsableFix(raw_fix));
                }
                let altitude = read_i32(ctx, CTX_HMSL) as f64 / ALT_SCALE_TO_METERS;
                SensorTagData::new(tag, SensorValue::Float(altitude as f32))
            }
        }
    }
}
