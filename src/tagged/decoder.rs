//! # Tagged Record Decoder
//!
//! Parses `[tag][dtype][id?][value big-endian]` records back into
//! [`SensorTagData`].

use super::protocol::*;
use crate::error::{FetcherError, Result};
use bytes::Buf;

/// Decode one tagged record from the front of `bytes`
///
/// # Returns
///
/// * `Result<(SensorTagData, usize)>` - The record and the number of bytes consumed
///
/// # Errors
///
/// Returns error if:
/// - The tag or dtype byte is unknown
/// - The input is shorter than the record
/// - The dtype does not match the tag
pub fn decode_tagged(bytes: &[u8]) -> Result<(SensorTagData, usize)> {
    if bytes.len() < TAGGED_HEADER_SIZE {
        return Err(FetcherError::MalformedRecord(format!(
            "Record too short: {} bytes",
            bytes.len()
        )));
    }

    let tag = SensorTag::from_u8(bytes[0])
        .ok_or_else(|| FetcherError::MalformedRecord(format!("Unknown tag: 0x{:02X}", bytes[0])))?;
    let dtype = SensorTagDType::from_u8(bytes[1])
        .ok_or_else(|| FetcherError::MalformedRecord(format!("Unknown dtype: 0x{:02X}", bytes[1])))?;

    let value_at = TAGGED_HEADER_SIZE + tag.info().has_id as usize;
    let total = value_at + dtype.width();
    if bytes.len() < total {
        return Err(FetcherError::MalformedRecord(format!(
            "Record too short: expected {} bytes, got {}",
            total,
            bytes.len()
        )));
    }

    let id = if value_at > TAGGED_HEADER_SIZE { bytes[TAGGED_HEADER_SIZE] } else { 0 };
    let value = decode_value(dtype, &bytes[value_at..total]);
    let data = SensorTagData { tag, id, value };
    data.check_dtype()?;
    Ok((data, total))
}

/// Decode every record in a buffer of back-to-back records
pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<SensorTagData>> {
    let mut records = Vec::new();
    while !bytes.is_empty() {
        let (data, consumed) = decode_tagged(bytes)?;
        records.push(data);
        bytes = &bytes[consumed..];
    }
    Ok(records)
}

/// `value` must hold exactly `dtype.width()` bytes
fn decode_value(dtype: SensorTagDType, mut value: &[u8]) -> SensorValue {
    match dtype {
        SensorTagDType::Float => SensorValue::Float(value.get_f32()),
        SensorTagDType::U32 => SensorValue::U32(value.get_u32()),
        SensorTagDType::U16 => SensorValue::U16(value.get_u16()),
        SensorTagDType::U8 => SensorValue::U8(value.get_u8()),
        SensorTagDType::I32 => SensorValue::I32(value.get_i32()),
        SensorTagDType::I16 => SensorValue::I16(value.get_i16()),
        SensorTagDType::I8 => SensorValue::I8(value.get_i8()),
        SensorTagDType::Vec3d => SensorValue::Vec3d(Vec3d {
            x: value.get_f32(),
            y: value.get_f32(),
            z: value.get_f32(),
        }),
        SensorTagDType::Vec2dI32 => SensorValue::Vec2dI32(Vec2dI32 {
            x: value.get_i32(),
            y: value.get_i32(),
        }),
        SensorTagDType::Vec2d => SensorValue::Vec2d(Vec2d {
            x: value.get_f32(),
            y: value.get_f32(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagged::encoder::encode_tagged;
    use bytes::BytesMut;

    #[test]
    fn test_decode_vec3d_record() {
        let accel = SensorTagData::new(
            SensorTag::LinearAccelRel,
            SensorValue::Vec3d(Vec3d { x: 9.81, y: -0.25, z: 3.0 }),
        )
        .unwrap();
        let mut buf = BytesMut::new();
        encode_tagged(&accel, &mut buf).unwrap();

        let (decoded, consumed) = decode_tagged(&buf).unwrap();

        assert_eq!(consumed, 14);
        assert_eq!(decoded, accel);
    }

    #[test]
    fn test_decode_stream_of_records() {
        let records = [
            SensorTagData::new(SensorTag::Time, SensorValue::U32(42)).unwrap(),
            SensorTagData::new(
                SensorTag::Coords,
                SensorValue::Vec2dI32(Vec2dI32 { x: 473_977_420, y: 85_455_940 }),
            )
            .unwrap(),
            SensorTagData::new(SensorTag::Temperature, SensorValue::Float(21.5)).unwrap(),
        ];
        let mut buf = BytesMut::new();
        for record in &records {
            encode_tagged(record, &mut buf).unwrap();
        }

        assert_eq!(decode_all(&buf).unwrap(), records.to_vec());
    }

    #[test]
    fn test_decode_voltage_records_per_channel() {
        let bytes = [0x0A, 0x05, 0x01, 0x12, 0xC0, 0x0A, 0x05, 0x02, 0x0C, 0xE4];

        let records = decode_all(&bytes).unwrap();

        assert_eq!(
            records,
            vec![
                SensorTagData::with_id(SensorTag::Voltage, 1, SensorValue::I16(4800)).unwrap(),
                SensorTagData::with_id(SensorTag::Voltage, 2, SensorValue::I16(3300)).unwrap(),
            ]
        );
        // The ID byte is not part of the value
        assert!(matches!(decode_tagged(&bytes[..4]), Err(FetcherError::MalformedRecord(_))));
    }

    #[test]
    fn test_decode_truncated_record() {
        let bytes = [SensorTag::Time as u8, SensorTagDType::U32 as u8, 0x00, 0x01];
        assert!(matches!(decode_tagged(&bytes), Err(FetcherError::MalformedRecord(_))));
        assert!(matches!(decode_tagged(&bytes[..1]), Err(FetcherError::MalformedRecord(_))));
    }

    #[test]
    fn test_decode_unknown_tag() {
        let bytes = [0x7F, 0x00, 0, 0, 0, 0];
        assert!(matches!(decode_tagged(&bytes), Err(FetcherError::MalformedRecord(_))));
    }

    #[test]
    fn test_decode_dtype_mismatch() {
        // TIME declared as U16
        let bytes = [0x03, 0x02, 0x00, 0x10];
        assert!(matches!(decode_tagged(&bytes), Err(FetcherError::DTypeMismatch { .. })));
    }
}
