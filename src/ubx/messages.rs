//! # UBX Message Definitions
//!
//! Class/id constants, configuration keys and the payloads exchanged with
//! u-blox M10 receivers. All multi-byte payload fields are little-endian.

use super::frame::UbxFrame;
use crate::error::{FetcherError, Result};
use bytes::{Buf, BufMut, BytesMut};

pub const CLASS_NAV: u8 = 0x01;
pub const CLASS_ACK: u8 = 0x05;
pub const CLASS_CFG: u8 = 0x06;
pub const CLASS_MON: u8 = 0x0A;

pub const NAV_POSLLH: u8 = 0x02;
pub const NAV_STATUS: u8 = 0x03;
pub const NAV_PVT: u8 = 0x07;
pub const NAV_VELNED: u8 = 0x12;
pub const NAV_TIMEUTC: u8 = 0x21;

pub const ACK_NAK: u8 = 0x00;
pub const ACK_ACK: u8 = 0x01;

pub const CFG_RST: u8 = 0x04;
pub const CFG_VALSET: u8 = 0x8A;

pub const MON_VER: u8 = 0x04;

/// Configuration keys (CFG-VALSET)
pub mod keys {
    pub const I2COUTPROT_NMEA: u32 = 0x1072_0002;
    pub const I2CINPROT_NMEA: u32 = 0x1071_0002;
    pub const UART1OUTPROT_NMEA: u32 = 0x1074_0002;
    pub const NAVSPG_DYNMODEL: u32 = 0x2011_0021;
    pub const SIGNAL_BDS_ENA: u32 = 0x1031_0022;
    pub const RATE_MEAS: u32 = 0x3021_0001;
    pub const MSGOUT_UBX_NAV_PVT_I2C: u32 = 0x2091_0006;
    pub const MSGOUT_UBX_NAV_PVT_UART1: u32 = 0x2091_0007;
}

/// Airborne with <4 g acceleration
pub const DYNMODEL_AIR_4G: u8 = 8;

/// Measurement period used when nothing else is requested (ms)
pub const NOMINAL_MEASUREMENT_RATE_MS: u16 = 300;

/// Largest accepted CFG-VALSET item area
pub const MAX_VALSET_ITEM_BYTES: usize = 128;

pub const LAT_SCALE_TO_DEGREES: f64 = 1e7;
pub const LON_SCALE_TO_DEGREES: f64 = 1e7;
pub const ALT_SCALE_TO_METERS: f64 = 1e3;

/// Fixed-size payload with a known class and id
pub trait UbxPayload: Sized {
    const CLASS: u8;
    const ID: u8;
    const LEN: usize;

    /// Decode from exactly `LEN` bytes (longer input is rejected too)
    fn decode(payload: &[u8]) -> Result<Self>;

    fn encode(&self, buf: &mut BytesMut);

    fn to_frame(&self) -> Result<UbxFrame> {
        let mut buf = BytesMut::with_capacity(Self::LEN);
        self.encode(&mut buf);
        UbxFrame::new(Self::CLASS, Self::ID, buf.freeze())
    }

    fn from_frame(frame: &UbxFrame) -> Result<Self> {
        if !frame.is_type(Self::CLASS, Self::ID) {
            return Err(FetcherError::MalformedFrame(format!(
                "Expected 0x{:02X}/0x{:02X}, got 0x{:02X}/0x{:02X}",
                Self::CLASS,
                Self::ID,
                frame.class,
                frame.id
            )));
        }
        Self::decode(&frame.payload)
    }
}

fn check_len(payload: &[u8], expected: usize, what: &str) -> Result<()> {
    if payload.len() != expected {
        return Err(FetcherError::MalformedFrame(format!(
            "{} payload must be {} bytes, got {}",
            what,
            expected,
            payload.len()
        )));
    }
    Ok(())
}

/// Layers a CFG-VALSET applies to
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    Ram = 0x01,
    Bbr = 0x02,
    Flash = 0x04,
}

/// Value of one configuration item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValue {
    L(bool),
    U1(u8),
    U2(u16),
    U4(u32),
}

impl ConfigValue {
    /// Size code carried in key bits 28..=30
    fn size_code(self) -> u32 {
        match self {
            Self::L(_) => 1,
            Self::U1(_) => 2,
            Self::U2(_) => 3,
            Self::U4(_) => 4,
        }
    }

    fn width(self) -> usize {
        match self {
            Self::L(_) | Self::U1(_) => 1,
            Self::U2(_) => 2,
            Self::U4(_) => 4,
        }
    }

    fn put(self, buf: &mut BytesMut) {
        match self {
            Self::L(v) => buf.put_u8(v as u8),
            Self::U1(v) => buf.put_u8(v),
            Self::U2(v) => buf.put_u16_le(v),
            Self::U4(v) => buf.put_u32_le(v),
        }
    }
}

/// CFG-VALSET builder
#[derive(Debug, Clone)]
pub struct ValsetPayload {
    layer: ConfigLayer,
    items: BytesMut,
}

impl ValsetPayload {
    pub fn new(layer: ConfigLayer) -> Self {
        Self {
            layer,
            items: BytesMut::new(),
        }
    }

    /// Append one key/value item
    ///
    /// # Errors
    ///
    /// * `InvalidConfigKey` if the key's size bits disagree with the value type
    /// * `PayloadTooLarge` if the items would exceed [`MAX_VALSET_ITEM_BYTES`];
    ///   the payload is left unchanged
    pub fn push(&mut self, key: u32, value: ConfigValue) -> Result<&mut Self> {
        let key_size = (key >> 28) & 0x07;
        if key_size != value.size_code() {
            return Err(FetcherError::InvalidConfigKey {
                key,
                reason: format!("size code {} does not fit {:?}", key_size, value),
            });
        }

        let size = self.items.len() + 4 + value.width();
        if size > MAX_VALSET_ITEM_BYTES {
            return Err(FetcherError::PayloadTooLarge {
                size,
                max: MAX_VALSET_ITEM_BYTES,
            });
        }

        self.items.put_u32_le(key);
        value.put(&mut self.items);
        Ok(self)
    }

    pub fn item_bytes(&self) -> usize {
        self.items.len()
    }

    pub fn to_frame(&self) -> Result<UbxFrame> {
        let mut buf = BytesMut::with_capacity(4 + self.items.len());
        buf.put_u8(0); // version
        buf.put_u8(self.layer as u8);
        buf.put_u16_le(0); // reserved
        buf.put_slice(&self.items);
        UbxFrame::new(CLASS_CFG, CFG_VALSET, buf.freeze())
    }
}

/// ACK-ACK / ACK-NAK payload: the message being answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPayload {
    pub class_id: u8,
    pub msg_id: u8,
}

impl AckPayload {
    pub const LEN: usize = 2;

    pub fn decode(payload: &[u8]) -> Result<Self> {
        check_len(payload, Self::LEN, "ACK")?;
        Ok(Self {
            class_id: payload[0],
            msg_id: payload[1],
        })
    }

    /// ACK-ACK (`acknowledged`) or ACK-NAK frame for this payload
    pub fn to_frame(&self, acknowledged: bool) -> Result<UbxFrame> {
        let id = if acknowledged { ACK_ACK } else { ACK_NAK };
        UbxFrame::new(CLASS_ACK, id, vec![self.class_id, self.msg_id])
    }
}

/// GNSS fix classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsFixType {
    NoFix,
    DeadReckoning,
    Fix2d,
    Fix3d,
    FixDeadReckoning,
    TimeOnly,
}

impl GpsFixType {
    /// Unknown values read as `NoFix`
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::DeadReckoning,
            2 => Self::Fix2d,
            3 => Self::Fix3d,
            4 => Self::FixDeadReckoning,
            5 => Self::TimeOnly,
            _ => Self::NoFix,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::NoFix => 0,
            Self::DeadReckoning => 1,
            Self::Fix2d => 2,
            Self::Fix3d => 3,
            Self::FixDeadReckoning => 4,
            Self::TimeOnly => 5,
        }
    }

    /// True if latitude/longitude are meaningful
    pub fn has_usable_position(self) -> bool {
        matches!(self, Self::Fix2d | Self::Fix3d | Self::FixDeadReckoning)
    }
}

/// NAV-STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavStatusPayload {
    pub i_tow: u32,
    pub gps_fix: u8,
    pub flags: u8,
    pub fix_stat: u8,
    pub flags2: u8,
    /// Time to first fix (ms)
    pub ttff: u32,
    /// Time since startup (ms)
    pub msss: u32,
}

impl NavStatusPayload {
    pub fn fix_type(&self) -> GpsFixType {
        GpsFixType::from_u8(self.gps_fix)
    }

    pub fn gps_fix_ok(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

impl UbxPayload for NavStatusPayload {
    const CLASS: u8 = CLASS_NAV;
    const ID: u8 = NAV_STATUS;
    const LEN: usize = 16;

    fn decode(payload: &[u8]) -> Result<Self> {
        check_len(payload, Self::LEN, "NAV-STATUS")?;
        let mut buf = payload;
        Ok(Self {
            i_tow: buf.get_u32_le(),
            gps_fix: buf.get_u8(),
            flags: buf.get_u8(),
            fix_stat: buf.get_u8(),
            flags2: buf.get_u8(),
            ttff: buf.get_u32_le(),
            msss: buf.get_u32_le(),
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.i_tow);
        buf.put_u8(self.gps_fix);
        buf.put_u8(self.flags);
        buf.put_u8(self.fix_stat);
        buf.put_u8(self.flags2);
        buf.put_u32_le(self.ttff);
        buf.put_u32_le(self.msss);
    }
}

/// NAV-POSLLH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavPositionPayload {
    pub i_tow: u32,
    /// 1e-7 deg
    pub lon: i32,
    /// 1e-7 deg
    pub lat: i32,
    /// Height above ellipsoid (mm)
    pub height: i32,
    /// Height above mean sea level (mm)
    pub h_msl: i32,
    pub h_acc: u32,
    pub v_acc: u32,
}

impl NavPositionPayload {
    pub fn latitude_deg(&self) -> f64 {
        self.lat as f64 / LAT_SCALE_TO_DEGREES
    }

    pub fn longitude_deg(&self) -> f64 {
        self.lon as f64 / LON_SCALE_TO_DEGREES
    }

    pub fn height_msl_m(&self) -> f64 {
        self.h_msl as f64 / ALT_SCALE_TO_METERS
    }
}

impl UbxPayload for NavPositionPayload {
    const CLASS: u8 = CLASS_NAV;
    const ID: u8 = NAV_POSLLH;
    const LEN: usize = 28;

    fn decode(payload: &[u8]) -> Result<Self> {
        check_len(payload, Self::LEN, "NAV-POSLLH")?;
        let mut buf = payload;
        Ok(Self {
            i_tow: buf.get_u32_le(),
            lon: buf.get_i32_le(),
            lat: buf.get_i32_le(),
            height: buf.get_i32_le(),
            h_msl: buf.get_i32_le(),
            h_acc: buf.get_u32_le(),
            v_acc: buf.get_u32_le(),
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.i_tow);
        buf.put_i32_le(self.lon);
        buf.put_i32_le(self.lat);
        buf.put_i32_le(self.height);
        buf.put_i32_le(self.h_msl);
        buf.put_u32_le(self.h_acc);
        buf.put_u32_le(self.v_acc);
    }
}

/// NAV-VELNED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavVelocityPayload {
    pub i_tow: u32,
    /// cm/s
    pub vel_n: i32,
    pub vel_e: i32,
    pub vel_d: i32,
    /// 3D speed (cm/s)
    pub speed: u32,
    /// Ground speed (cm/s)
    pub g_speed: u32,
    /// 1e-5 deg
    pub heading: i32,
    pub s_acc: u32,
    pub c_acc: u32,
}

impl NavVelocityPayload {
    pub fn ground_speed_mps(&self) -> f64 {
        self.g_speed as f64 / 100.0
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading as f64 / 1e5
    }
}

impl UbxPayload for NavVelocityPayload {
    const CLASS: u8 = CLASS_NAV;
    const ID: u8 = NAV_VELNED;
    const LEN: usize = 36;

    fn decode(payload: &[u8]) -> Result<Self> {
        check_len(payload, Self::LEN, "NAV-VELNED")?;
        let mut buf = payload;
        Ok(Self {
            i_tow: buf.get_u32_le(),
            vel_n: buf.get_i32_le(),
            vel_e: buf.get_i32_le(),
            vel_d: buf.get_i32_le(),
            speed: buf.get_u32_le(),
            g_speed: buf.get_u32_le(),
            heading: buf.get_i32_le(),
            s_acc: buf.get_u32_le(),
            c_acc: buf.get_u32_le(),
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.i_tow);
        buf.put_i32_le(self.vel_n);
        buf.put_i32_le(self.vel_e);
        buf.put_i32_le(self.vel_d);
        buf.put_u32_le(self.speed);
        buf.put_u32_le(self.g_speed);
        buf.put_i32_le(self.heading);
        buf.put_u32_le(self.s_acc);
        buf.put_u32_le(self.c_acc);
    }
}

/// NAV-TIMEUTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UtcPayload {
    pub i_tow: u32,
    /// Time accuracy estimate (ns)
    pub t_acc: u32,
    /// Fraction of second, -1e9..1e9 (ns)
    pub nano: i32,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    /// Bit 0 validTOW, bit 1 validWKN, bit 2 validUTC
    pub valid: u8,
}

impl UtcPayload {
    pub const VALID_TOW: u8 = 0x01;
    pub const VALID_WKN: u8 = 0x02;
    pub const VALID_UTC: u8 = 0x04;

    /// UTC time, if the receiver marks it valid
    pub fn to_datetime(&self) -> Option<chrono::NaiveDateTime> {
        if self.valid & Self::VALID_UTC == 0 {
            return None;
        }
        let base = chrono::NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_opt(self.hour as u32, self.min as u32, self.sec as u32)?;
        base.checked_add_signed(chrono::Duration::nanoseconds(self.nano as i64))
    }
}

impl UbxPayload for UtcPayload {
    const CLASS: u8 = CLASS_NAV;
    const ID: u8 = NAV_TIMEUTC;
    const LEN: usize = 20;

    fn decode(payload: &[u8]) -> Result<Self> {
        check_len(payload, Self::LEN, "NAV-TIMEUTC")?;
        let mut buf = payload;
        Ok(Self {
            i_tow: buf.get_u32_le(),
            t_acc: buf.get_u32_le(),
            nano: buf.get_i32_le(),
            year: buf.get_u16_le(),
            month: buf.get_u8(),
            day: buf.get_u8(),
            hour: buf.get_u8(),
            min: buf.get_u8(),
            sec: buf.get_u8(),
            valid: buf.get_u8(),
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.i_tow);
        buf.put_u32_le(self.t_acc);
        buf.put_i32_le(self.nano);
        buf.put_u16_le(self.year);
        buf.put_u8(self.month);
        buf.put_u8(self.day);
        buf.put_u8(self.hour);
        buf.put_u8(self.min);
        buf.put_u8(self.sec);
        buf.put_u8(self.valid);
    }
}

/// NAV-PVT navigation solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavPvtPayload {
    pub i_tow: u32,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub valid: u8,
    pub t_acc: u32,
    pub nano: i32,
    pub fix_type: u8,
    /// Bit 0 gnssFixOK
    pub flags: u8,
    pub flags2: u8,
    pub num_sv: u8,
    /// 1e-7 deg
    pub lon: i32,
    /// 1e-7 deg
    pub lat: i32,
    /// mm
    pub height: i32,
    /// mm
    pub h_msl: i32,
    pub h_acc: u32,
    pub v_acc: u32,
    /// mm/s
    pub vel_n: i32,
    pub vel_e: i32,
    pub vel_d: i32,
    pub g_speed: i32,
    /// 1e-5 deg
    pub head_mot: i32,
    pub s_acc: u32,
    pub head_acc: u32,
    /// 0.01
    pub p_dop: u16,
    pub flags3: u16,
    pub head_veh: i32,
    pub mag_dec: i16,
    pub mag_acc: u16,
}

impl NavPvtPayload {
    pub const GNSS_FIX_OK: u8 = 0x01;

    pub fn fix(&self) -> GpsFixType {
        GpsFixType::from_u8(self.fix_type)
    }

    pub fn gnss_fix_ok(&self) -> bool {
        self.flags & Self::GNSS_FIX_OK != 0
    }

    /// Valid fix with a usable horizontal position
    pub fn has_position(&self) -> bool {
        self.gnss_fix_ok() && self.fix().has_usable_position()
    }

    pub fn latitude_deg(&self) -> f64 {
        self.lat as f64 / LAT_SCALE_TO_DEGREES
    }

    pub fn longitude_deg(&self) -> f64 {
        self.lon as f64 / LON_SCALE_TO_DEGREES
    }

    pub fn height_msl_m(&self) -> f64 {
        self.h_msl as f64 / ALT_SCALE_TO_METERS
    }
}

impl UbxPayload for NavPvtPayload {
    const CLASS: u8 = CLASS_NAV;
    const ID: u8 = NAV_PVT;
    const LEN: usize = 92;

    fn decode(payload: &[u8]) -> Result<Self> {
        check_len(payload, Self::LEN, "NAV-PVT")?;
        let mut buf = payload;
        let pvt = Self {
            i_tow: buf.get_u32_le(),
            year: buf.get_u16_le(),
            month: buf.get_u8(),
            day: buf.get_u8(),
            hour: buf.get_u8(),
            min: buf.get_u8(),
            sec: buf.get_u8(),
            valid: buf.get_u8(),
            t_acc: buf.get_u32_le(),
            nano: buf.get_i32_le(),
            fix_type: buf.get_u8(),
            flags: buf.get_u8(),
            flags2: buf.get_u8(),
            num_sv: buf.get_u8(),
            lon: buf.get_i32_le(),
            lat: buf.get_i32_le(),
            height: buf.get_i32_le(),
            h_msl: buf.get_i32_le(),
            h_acc: buf.get_u32_le(),
            v_acc: buf.get_u32_le(),
            vel_n: buf.get_i32_le(),
            vel_e: buf.get_i32_le(),
            vel_d: buf.get_i32_le(),
            g_speed: buf.get_i32_le(),
            head_mot: buf.get_i32_le(),
            s_acc: buf.get_u32_le(),
            head_acc: buf.get_u32_le(),
            p_dop: buf.get_u16_le(),
            flags3: {
                let flags3 = buf.get_u16_le();
                buf.advance(4); // reserved
                flags3
            },
            head_veh: buf.get_i32_le(),
            mag_dec: buf.get_i16_le(),
            mag_acc: buf.get_u16_le(),
        };
        Ok(pvt)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.i_tow);
        buf.put_u16_le(self.year);
        buf.put_u8(self.month);
        buf.put_u8(self.day);
        buf.put_u8(self.hour);
        buf.put_u8(self.min);
        buf.put_u8(self.sec);
        buf.put_u8(self.valid);
        buf.put_u32_le(self.t_acc);
        buf.put_i32_le(self.nano);
        buf.put_u8(self.fix_type);
        buf.put_u8(self.flags);
        buf.put_u8(self.flags2);
        buf.put_u8(self.num_sv);
        buf.put_i32_le(self.lon);
        buf.put_i32_le(self.lat);
        buf.put_i32_le(self.height);
        buf.put_i32_le(self.h_msl);
        buf.put_u32_le(self.h_acc);
        buf.put_u32_le(self.v_acc);
        buf.put_i32_le(self.vel_n);
        buf.put_i32_le(self.vel_e);
        buf.put_i32_le(self.vel_d);
        buf.put_i32_le(self.g_speed);
        buf.put_i32_le(self.head_mot);
        buf.put_u32_le(self.s_acc);
        buf.put_u32_le(self.head_acc);
        buf.put_u16_le(self.p_dop);
        buf.put_u16_le(self.flags3);
        buf.put_u32_le(0); // reserved
        buf.put_i32_le(self.head_veh);
        buf.put_i16_le(self.mag_dec);
        buf.put_u16_le(self.mag_acc);
    }
}

/// CFG-RST reset type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Watchdog-triggered immediate hardware reset
    HardReset = 0x00,
    /// Controlled software reset
    SoftReset = 0x01,
    /// Controlled software reset of the GNSS part only
    SoftGnssReset = 0x02,
    /// Hardware reset after shutdown
    HardWdtReset = 0x04,
    StopGnss = 0x08,
    StartGnss = 0x09,
}

/// navBbrMask presets
pub mod bbr_mask {
    pub const HOT_START: u16 = 0x0000;
    pub const WARM_START: u16 = 0x0001;
    pub const COLD_START: u16 = 0xFFFF;
}

/// CFG-RST (never acknowledged by the receiver)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigResetPayload {
    pub nav_bbr_mask: u16,
    pub reset_mode: ResetMode,
}

impl ConfigResetPayload {
    pub fn new(nav_bbr_mask: u16, reset_mode: ResetMode) -> Self {
        Self {
            nav_bbr_mask,
            reset_mode,
        }
    }
}

impl UbxPayload for ConfigResetPayload {
    const CLASS: u8 = CLASS_CFG;
    const ID: u8 = CFG_RST;
    const LEN: usize = 4;

    fn decode(payload: &[u8]) -> Result<Self> {
        check_len(payload, Self::LEN, "CFG-RST")?;
        let mut buf = payload;
        let nav_bbr_mask = buf.get_u16_le();
        let reset_mode = match buf.get_u8() {
            0x00 => ResetMode::HardReset,
            0x01 => ResetMode::SoftReset,
            0x02 => ResetMode::SoftGnssReset,
            0x04 => ResetMode::HardWdtReset,
            0x08 => ResetMode::StopGnss,
            0x09 => ResetMode::StartGnss,
            other => {
                return Err(FetcherError::MalformedFrame(format!(
                    "Unknown reset mode 0x{:02X}",
                    other
                )))
            }
        };
        Ok(Self {
            nav_bbr_mask,
            reset_mode,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.nav_bbr_mask);
        buf.put_u8(self.reset_mode as u8);
        buf.put_u8(0); // reserved
    }
}
