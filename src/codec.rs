//! # Value Codec
//!
//! Conversion between typed [`ModbusValue`]s and the raw bytes carried in
//! register and coil PDUs.
//!
//! Register data is always register aligned: a value of type `T` occupies
//! `T.register_count() * 2` bytes. Multi-byte numerics honor the
//! [`ByteLayout`] (endian format plus reverse flag). Strings are copied as
//! raw bytes and never rearranged.
//!
//! Coil read responses pack bits LSB-first. Multi-coil write payloads built
//! here pack MSB-first within each byte.

use crate::bytes::ByteLayout;
use crate::constants::{COIL_OFF, COIL_ON};
use crate::error::{ModbusError, ModbusResult};
use crate::value::{DataType, ModbusValue};

// ============================================================================
// Decoding
// ============================================================================

/// Decode a value from register-aligned bytes.
///
/// ```rust
/// use modbus_batch::{decode_value, ByteLayout, DataType, ModbusValue};
///
/// let value = decode_value(&[0x00, 0x2A], DataType::UInt16, ByteLayout::default()).unwrap();
/// assert_eq!(value, ModbusValue::U16(42));
/// ```
pub fn decode_value(bytes: &[u8], data_type: DataType, layout: ByteLayout) -> ModbusResult<ModbusValue> {
    let needed = usize::from(data_type.register_count()) * 2;
    if bytes.len() < needed {
        return Err(ModbusError::invalid_data(format!(
            "{} needs {} bytes, got {}",
            data_type,
            needed,
            bytes.len()
        )));
    }
    let raw = &bytes[..needed];

    let value = match data_type {
        DataType::Bool => ModbusValue::Bool(word(raw, layout) != 0),
        DataType::Byte => ModbusValue::Byte((word(raw, layout) & 0xFF) as u8),
        DataType::Int16 => ModbusValue::I16(word(raw, layout) as i16),
        DataType::UInt16 => ModbusValue::U16(word(raw, layout)),
        DataType::Int32 => ModbusValue::I32(i32::from_be_bytes(array(raw, layout)?)),
        DataType::UInt32 => ModbusValue::U32(u32::from_be_bytes(array(raw, layout)?)),
        DataType::Float => ModbusValue::F32(f32::from_be_bytes(array(raw, layout)?)),
        DataType::Int64 => ModbusValue::I64(i64::from_be_bytes(array(raw, layout)?)),
        DataType::UInt64 => ModbusValue::U64(u64::from_be_bytes(array(raw, layout)?)),
        DataType::Double => ModbusValue::F64(f64::from_be_bytes(array(raw, layout)?)),
        DataType::String(len) => {
            let text = &raw[..usize::from(len)];
            let end = text.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
            ModbusValue::String(String::from_utf8_lossy(&text[..end]).into_owned())
        }
    };
    Ok(value)
}

fn word(raw: &[u8], layout: ByteLayout) -> u16 {
    let be = layout.from_wire(&raw[..2]);
    u16::from_be_bytes([be[0], be[1]])
}

fn array<const N: usize>(raw: &[u8], layout: ByteLayout) -> ModbusResult<[u8; N]> {
    layout
        .from_wire(&raw[..N])
        .try_into()
        .map_err(|_| ModbusError::invalid_data(format!("expected {N} bytes")))
}

/// Read one bit from a coil/discrete-input response payload (LSB-first).
pub fn decode_coil(bytes: &[u8], bit_offset: usize) -> Option<bool> {
    bytes
        .get(bit_offset / 8)
        .map(|byte| byte & (1 << (bit_offset % 8)) != 0)
}

/// Unpack `count` bits from a coil response payload.
pub fn unpack_coils(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count).filter_map(|i| decode_coil(bytes, i)).collect()
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a value as register-aligned wire bytes for `data_type`.
///
/// The value is first coerced to `data_type`; a value that does not fit
/// yields a conversion error.
pub fn encode_value(value: &ModbusValue, data_type: DataType, layout: ByteLayout) -> ModbusResult<Vec<u8>> {
    let coerced = coerce(value, data_type)?;
    let be: Vec<u8> = match coerced {
        ModbusValue::Bool(b) => vec![0, u8::from(b)],
        ModbusValue::Byte(v) => vec![0, v],
        ModbusValue::I16(v) => v.to_be_bytes().to_vec(),
        ModbusValue::U16(v) => v.to_be_bytes().to_vec(),
        ModbusValue::I32(v) => v.to_be_bytes().to_vec(),
        ModbusValue::U32(v) => v.to_be_bytes().to_vec(),
        ModbusValue::F32(v) => v.to_be_bytes().to_vec(),
        ModbusValue::I64(v) => v.to_be_bytes().to_vec(),
        ModbusValue::U64(v) => v.to_be_bytes().to_vec(),
        ModbusValue::F64(v) => v.to_be_bytes().to_vec(),
        ModbusValue::String(s) => {
            let mut raw = s.into_bytes();
            raw.resize(usize::from(data_type.register_count()) * 2, 0);
            return Ok(raw);
        }
    };
    Ok(layout.to_wire(be))
}

/// FC05 payload for a coil state.
#[inline]
pub fn coil_payload(on: bool) -> [u8; 2] {
    if on {
        COIL_ON
    } else {
        COIL_OFF
    }
}

/// Pack coil states for FC15, MSB-first within each byte.
pub fn pack_coils(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, &on) in values.iter().enumerate() {
        if on {
            packed[i / 8] |= 0x80 >> (i % 8);
        }
    }
    packed
}

/// Inverse of [`pack_coils`].
pub fn unpack_coils_msb(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .filter_map(|i| bytes.get(i / 8).map(|b| b & (0x80 >> (i % 8)) != 0))
        .collect()
}

// ============================================================================
// Coercion
// ============================================================================

/// Convert `value` into the variant matching `data_type`.
///
/// Integer conversions are range checked, floats convert to integers only
/// when they hold an exact integral value, strings parse as numbers.
pub fn coerce(value: &ModbusValue, data_type: DataType) -> ModbusResult<ModbusValue> {
    let mismatch = || {
        ModbusError::conversion(format!(
            "cannot convert {} '{}' to {}",
            value.type_name(),
            value,
            data_type
        ))
    };

    let coerced = match data_type {
        DataType::Bool => match value {
            ModbusValue::Bool(b) => ModbusValue::Bool(*b),
            other => match integral(other) {
                Some(0) => ModbusValue::Bool(false),
                Some(1) => ModbusValue::Bool(true),
                _ => return Err(mismatch()),
            },
        },
        DataType::Byte => ModbusValue::Byte(int_as(value).ok_or_else(mismatch)?),
        DataType::Int16 => ModbusValue::I16(int_as(value).ok_or_else(mismatch)?),
        DataType::UInt16 => ModbusValue::U16(int_as(value).ok_or_else(mismatch)?),
        DataType::Int32 => ModbusValue::I32(int_as(value).ok_or_else(mismatch)?),
        DataType::UInt32 => ModbusValue::U32(int_as(value).ok_or_else(mismatch)?),
        DataType::Int64 => ModbusValue::I64(int_as(value).ok_or_else(mismatch)?),
        DataType::UInt64 => ModbusValue::U64(int_as(value).ok_or_else(mismatch)?),
        DataType::Float => {
            let v = value.as_f64();
            if v.is_nan() && !matches!(value, ModbusValue::F32(_) | ModbusValue::F64(_)) {
                return Err(mismatch());
            }
            if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                return Err(mismatch());
            }
            ModbusValue::F32(v as f32)
        }
        DataType::Double => {
            let v = value.as_f64();
            if v.is_nan() && !matches!(value, ModbusValue::F32(_) | ModbusValue::F64(_)) {
                return Err(mismatch());
            }
            ModbusValue::F64(v)
        }
        DataType::String(len) => match value {
            ModbusValue::String(s) if s.len() <= usize::from(len) => ModbusValue::String(s.clone()),
            ModbusValue::String(s) => {
                return Err(ModbusError::conversion(format!(
                    "string of {} bytes exceeds {}",
                    s.len(),
                    data_type
                )))
            }
            _ => return Err(mismatch()),
        },
    };
    Ok(coerced)
}

fn integral(value: &ModbusValue) -> Option<i128> {
    match value {
        ModbusValue::Bool(b) => Some(i128::from(*b)),
        ModbusValue::Byte(v) => Some(i128::from(*v)),
        ModbusValue::U16(v) => Some(i128::from(*v)),
        ModbusValue::I16(v) => Some(i128::from(*v)),
        ModbusValue::U32(v) => Some(i128::from(*v)),
        ModbusValue::I32(v) => Some(i128::from(*v)),
        ModbusValue::U64(v) => Some(i128::from(*v)),
        ModbusValue::I64(v) => Some(i128::from(*v)),
        ModbusValue::F32(_) | ModbusValue::F64(_) => {
            let v = value.as_f64();
            (v.is_finite() && v.fract() == 0.0 && v.abs() < 1.0e19).then_some(v as i128)
        }
        ModbusValue::String(s) => s.trim().parse().ok(),
    }
}

fn int_as<T: TryFrom<i128>>(value: &ModbusValue) -> Option<T> {
    integral(value).and_then(|v| T::try_from(v).ok())
}
