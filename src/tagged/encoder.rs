//! # Tagged Record Encoder
//!
//! Serializes [`SensorTagData`] as `[tag][dtype][value big-endian]`, with
//! the channel ID after the dtype for tags that carry one.

use super::protocol::*;
use crate::error::Result;
use bytes::{BufMut, BytesMut};
use std::io::Write;

/// Copy host-order bytes into big-endian order
///
/// On little-endian hosts the bytes are reversed, on big-endian hosts they
/// are copied unchanged. Applying it twice restores the input, so the same
/// function converts back to host order.
///
/// # Panics
///
/// Panics if `dest` is shorter than `src`.
///
/// # Examples
///
/// ```
/// use fetcher::tagged::encoder::memcpy_be;
///
/// let mut out = [0u8; 4];
/// memcpy_be(&mut out, &0x1122_3344u32.to_ne_bytes());
/// assert_eq!(out, [0x11, 0x22, 0x33, 0x44]);
/// ```
pub fn memcpy_be(dest: &mut [u8], src: &[u8]) {
    let dest = &mut dest[..src.len()];
    if cfg!(target_endian = "little") {
        for (d, s) in dest.iter_mut().zip(src.iter().rev()) {
            *d = *s;
        }
    } else {
        dest.copy_from_slice(src);
    }
}

fn put_be(buf: &mut BytesMut, native: &[u8]) {
    let mut scratch = [0u8; 4];
    memcpy_be(&mut scratch, native);
    buf.put_slice(&scratch[..native.len()]);
}

/// Append the big-endian value bytes (no header)
pub fn encode_value(value: &SensorValue, buf: &mut BytesMut) {
    match *value {
        SensorValue::Float(v) => put_be(buf, &v.to_ne_bytes()),
        SensorValue::U32(v) => put_be(buf, &v.to_ne_bytes()),
        SensorValue::U16(v) => put_be(buf, &v.to_ne_bytes()),
        SensorValue::U8(v) => buf.put_u8(v),
        SensorValue::I32(v) => put_be(buf, &v.to_ne_bytes()),
        SensorValue::I16(v) => put_be(buf, &v.to_ne_bytes()),
        SensorValue::I8(v) => buf.put_i8(v),
        SensorValue::Vec3d(v) => {
            for axis in [v.x, v.y, v.z] {
                put_be(buf, &axis.to_ne_bytes());
            }
        }
        SensorValue::Vec2dI32(v) => {
            put_be(buf, &v.x.to_ne_bytes());
            put_be(buf, &v.y.to_ne_bytes());
        }
        SensorValue::Vec2d(v) => {
            put_be(buf, &v.x.to_ne_bytes());
            put_be(buf, &v.y.to_ne_bytes());
        }
    }
}

/// Append one tagged record to `buf`
///
/// # Errors
///
/// Returns `DTypeMismatch` if the value type does not match the tag; nothing
/// is written in that case.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use fetcher::tagged::encoder::encode_tagged;
/// use fetcher::tagged::protocol::{SensorTag, SensorTagData, SensorValue};
///
/// let data = SensorTagData::new(SensorTag::Time, SensorValue::U32(1000)).unwrap();
/// let mut buf = BytesMut::new();
/// encode_tagged(&data, &mut buf).unwrap();
/// assert_eq!(&buf[..], &[0x03, 0x01, 0x00, 0x00, 0x03, 0xE8]);
/// ```
pub fn encode_tagged(data: &SensorTagData, buf: &mut BytesMut) -> Result<()> {
    data.check_dtype()?;
    buf.reserve(data.encoded_len());
    buf.put_u8(data.tag as u8);
    buf.put_u8(data.value.dtype() as u8);
    if data.tag.info().has_id {
        buf.put_u8(data.id);
    }
    encode_value(&data.value, buf);
    Ok(())
}

/// Write one tagged record to a byte stream
///
/// # Returns
///
/// * `Result<usize>` - Number of bytes written
pub fn write_tagged<W: Write + ?Sized>(stream: &mut W, data: &SensorTagData) -> Result<usize> {
    let mut buf = BytesMut::with_capacity(data.encoded_len());
    encode_tagged(data, &mut buf)?;
    stream.write_all(&buf)?;
    Ok(buf.len())
}
