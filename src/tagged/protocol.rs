//! # Tagged Record Types
//!
//! Closed set of physical quantities ([`SensorTag`]), their wire data types
//! ([`SensorTagDType`]) and the values carried in a record.
//!
//! Record layout on the wire: `[tag: u8][dtype: u8][value: big-endian]`.
//! Tags that carry a channel ID (see [`TagInfo::has_id`]) put it between
//! the dtype and the value: `[tag][dtype][id: u8][value]`.

use crate::error::{FetcherError, Result};
use serde::Serialize;
use std::fmt;

/// Bytes before the value in a tagged record
pub const TAGGED_HEADER_SIZE: usize = 2;

/// Physical quantity carried by a record
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorTag {
    Temperature = 0x0,
    Pressure = 0x1,
    Humidity = 0x2,
    Time = 0x3,
    AltitudeSea = 0x4,
    AltitudeRel = 0x5,
    AngularVel = 0x6,
    LinearAccelRel = 0x7,
    LinearAccelAbs = 0x8,
    /// Latitude/longitude, 1e-7 degree units
    Coords = 0x9,
    /// Bus voltage of one monitor channel
    Voltage = 0xA,
}

/// Wire data type of a record value
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorTagDType {
    Float = 0,
    U32 = 1,
    U16 = 2,
    U8 = 3,
    I32 = 4,
    I16 = 5,
    I8 = 6,
    Vec3d = 7,
    Vec2dI32 = 8,
    Vec2d = 9,
}

/// Fixed metadata of one tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagInfo {
    pub name: &'static str,
    pub unit: &'static str,
    pub dtype: SensorTagDType,
    /// Records of this tag carry a channel ID
    pub has_id: bool,
}

/// Every tag, in wire order
pub const ALL_TAGS: [SensorTag; 11] = [
    SensorTag::Temperature,
    SensorTag::Pressure,
    SensorTag::Humidity,
    SensorTag::Time,
    SensorTag::AltitudeSea,
    SensorTag::AltitudeRel,
    SensorTag::AngularVel,
    SensorTag::LinearAccelRel,
    SensorTag::LinearAccelAbs,
    SensorTag::Coords,
    SensorTag::Voltage,
];

impl SensorTag {
    /// Name, unit and value type of this tag
    pub const fn info(self) -> TagInfo {
        use SensorTagDType as D;
        let (name, unit, dtype) = match self {
            Self::Temperature => ("Temperature", "C", D::Float),
            Self::Pressure => ("Pressure", "kPa", D::Float),
            Self::Humidity => ("Humidity", "%RH", D::Float),
            Self::Time => ("Time", "ms", D::U32),
            Self::AltitudeSea => ("Altitude sea level", "m", D::Float),
            Self::AltitudeRel => ("Altitude rel", "m", D::Float),
            Self::AngularVel => ("Angular velocity", "dps", D::Vec3d),
            Self::LinearAccelRel => ("Relative linear acceleration", "m/s^2", D::Vec3d),
            Self::LinearAccelAbs => ("Absolute linear acceleration", "m/s^2", D::Vec3d),
            Self::Coords => ("Lat/Long", "0.1udeg", D::Vec2dI32),
            Self::Voltage => ("Voltage", "mV", D::I16),
        };
        let has_id = matches!(self, Self::Voltage);
        TagInfo { name, unit, dtype, has_id }
    }

    pub const fn dtype(self) -> SensorTagDType {
        self.info().dtype
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        ALL_TAGS.get(value as usize).copied()
    }
}

impl SensorTagDType {
    /// Encoded value width in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::Float | Self::U32 | Self::I32 => 4,
            Self::U16 | Self::I16 => 2,
            Self::U8 | Self::I8 => 1,
            Self::Vec3d => 12,
            Self::Vec2dI32 | Self::Vec2d => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "FLOAT",
            Self::U32 => "U32",
            Self::U16 => "U16",
            Self::U8 => "U8",
            Self::I32 => "I32",
            Self::I16 => "I16",
            Self::I8 => "I8",
            Self::Vec3d => "VEC3D",
            Self::Vec2dI32 => "VEC2D_I32",
            Self::Vec2d => "VEC2D",
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Float,
            1 => Self::U32,
            2 => Self::U16,
            3 => Self::U8,
            4 => Self::I32,
            5 => Self::I16,
            6 => Self::I8,
            7 => Self::Vec3d,
            8 => Self::Vec2dI32,
            9 => Self::Vec2d,
            _ => return None,
        })
    }
}

/// Human-readable tag name for diagnostics
pub fn sensor_strtag(tag: SensorTag) -> &'static str {
    tag.info().name
}

/// Three-axis float vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vec3d {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Two-axis float vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vec2d {
    pub x: f32,
    pub y: f32,
}

/// Two-axis integer vector (COORDS: x = latitude, y = longitude)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Vec2dI32 {
    pub x: i32,
    pub y: i32,
}

/// Value of one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Float(f32),
    U32(u32),
    U16(u16),
    U8(u8),
    I32(i32),
    I16(i16),
    I8(i8),
    Vec3d(Vec3d),
    Vec2dI32(Vec2dI32),
    Vec2d(Vec2d),
}

impl SensorValue {
    pub const fn dtype(&self) -> SensorTagDType {
        match self {
            Self::Float(_) => SensorTagDType::Float,
            Self::U32(_) => SensorTagDType::U32,
            Self::U16(_) => SensorTagDType::U16,
            Self::U8(_) => SensorTagDType::U8,
            Self::I32(_) => SensorTagDType::I32,
            Self::I16(_) => SensorTagDType::I16,
            Self::I8(_) => SensorTagDType::I8,
            Self::Vec3d(_) => SensorTagDType::Vec3d,
            Self::Vec2dI32(_) => SensorTagDType::Vec2dI32,
            Self::Vec2d(_) => SensorTagDType::Vec2d,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{:.4}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::U16(v) => write!(f, "{}", v),
            Self::U8(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::I8(v) => write!(f, "{}", v),
            Self::Vec3d(v) => write!(f, "({:.4}, {:.4}, {:.4})", v.x, v.y, v.z),
            Self::Vec2dI32(v) => write!(f, "({}, {})", v.x, v.y),
            Self::Vec2d(v) => write!(f, "({:.4}, {:.4})", v.x, v.y),
        }
    }
}

/// One reading: a tag and its value
///
/// `id` tells apart the channels of a multi-channel device; it is only
/// encoded for tags with [`TagInfo::has_id`] and is 0 otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorTagData {
    pub tag: SensorTag,
    pub id: u8,
    pub value: SensorValue,
}

impl SensorTagData {
    /// Pair a tag with a value of the tag's declared type
    ///
    /// # Errors
    ///
    /// Returns `DTypeMismatch` if the value type differs from the tag's
    pub fn new(tag: SensorTag, value: SensorValue) -> Result<Self> {
        Self::with_id(tag, 0, value)
    }

    /// Record for channel `id` of a multi-channel device
    pub fn with_id(tag: SensorTag, id: u8, value: SensorValue) -> Result<Self> {
        let id = if tag.info().has_id { id } else { 0 };
        let data = Self { tag, id, value };
        data.check_dtype()?;
        Ok(data)
    }

    /// Encoded size of this record including the header
    pub fn encoded_len(&self) -> usize {
        TAGGED_HEADER_SIZE + self.tag.info().has_id as usize + self.value.dtype().width()
    }

    pub(crate) fn check_dtype(&self) -> Result<()> {
        let expected = self.tag.dtype();
        let actual = self.value.dtype();
        if expected != actual {
            return Err(FetcherError::DTypeMismatch {
                tag: sensor_strtag(self.tag),
                expected: expected.name(),
                actual: actual.name(),
            });
        }
        Ok(())
    }
}

/// Text form `"<name>: <value> <unit>"`, prefixed with `"ID: <id> "` for
/// tags that carry a channel ID
impl fmt::Display for SensorTagData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.tag.info();
        if info.has_id {
            write!(f, "ID: {} ", self.id)?;
        }
        write!(f, "{}: {} {}", info.name, self.value, info.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_wire_values() {
        assert_eq!(SensorTag::Temperature as u8, 0x0);
        assert_eq!(SensorTag::Time as u8, 0x3);
        assert_eq!(SensorTag::LinearAccelAbs as u8, 0x8);
        assert_eq!(SensorTag::Coords as u8, 0x9);
        assert_eq!(SensorTag::Voltage as u8, 0xA);
        for (i, tag) in ALL_TAGS.iter().enumerate() {
            assert_eq!(*tag as usize, i);
            assert_eq!(SensorTag::from_u8(i as u8), Some(*tag));
        }
        assert_eq!(SensorTag::from_u8(0x0B), None);
    }

    #[test]
    fn test_dtype_round_trip_and_width() {
        for raw in 0..=9u8 {
            let dtype = SensorTagDType::from_u8(raw).unwrap();
            assert_eq!(dtype as u8, raw);
        }
        assert_eq!(SensorTagDType::from_u8(10), None);
        assert_eq!(SensorTagDType::Vec3d.width(), 12);
        assert_eq!(SensorTagDType::I8.width(), 1);
    }

    #[test]
    fn test_tag_metadata() {
        assert_eq!(sensor_strtag(SensorTag::Pressure), "Pressure");
        assert_eq!(SensorTag::Time.dtype(), SensorTagDType::U32);
        assert_eq!(SensorTag::AngularVel.info().unit, "dps");
        assert_eq!(SensorTag::Coords.dtype(), SensorTagDType::Vec2dI32);
        assert_eq!(SensorTag::Voltage.dtype(), SensorTagDType::I16);
        assert_eq!(SensorTag::Voltage.info().unit, "mV");
        assert!(SensorTag::Voltage.info().has_id);
        assert!(ALL_TAGS.iter().filter(|t| **t != SensorTag::Voltage).all(|t| !t.info().has_id));
    }

    #[test]
    fn test_dtype_mismatch_rejected() {
        let result = SensorTagData::new(SensorTag::Time, SensorValue::Float(1.0));
        assert!(matches!(result, Err(FetcherError::DTypeMismatch { .. })));
        assert!(SensorTagData::new(SensorTag::Time, SensorValue::U32(1)).is_ok());
    }

    #[test]
    fn test_text_form() {
        let data = SensorTagData::new(SensorTag::Pressure, SensorValue::Float(101.325)).unwrap();
        assert_eq!(data.to_string(), "Pressure: 101.3250 kPa");

        let data = SensorTagData::new(SensorTag::Time, SensorValue::U32(1500)).unwrap();
        assert_eq!(data.to_string(), "Time: 1500 ms");

        let data = SensorTagData::with_id(SensorTag::Voltage, 2, SensorValue::I16(3300)).unwrap();
        assert_eq!(data.to_string(), "ID: 2 Voltage: 3300 mV");
    }

    #[test]
    fn test_id_ignored_for_tags_without_id() {
        let data = SensorTagData::with_id(SensorTag::Time, 7, SensorValue::U32(1)).unwrap();
        assert_eq!(data.id, 0);
        assert_eq!(data.encoded_len(), 6);

        let data = SensorTagData::with_id(SensorTag::Voltage, 7, SensorValue::I16(1)).unwrap();
        assert_eq!(data.id, 7);
        assert_eq!(data.encoded_len(), 5);
    }
}
