//! # Data Types and Values
//!
//! [`DataType`] describes how a symbolic address is laid out on the device;
//! [`ModbusValue`] carries a decoded value. Both are closed sum types so
//! encode/decode paths are checked exhaustively.
//!
//! | Type | Bytes | Registers |
//! |------|-------|-----------|
//! | Bool, Byte | 1 | 1 |
//! | Int16, UInt16 | 2 | 1 |
//! | Int32, UInt32, Float | 4 | 2 |
//! | Int64, UInt64, Double | 8 | 4 |
//! | String(n) | n | ceil(n/2) |

use std::fmt;
use std::str::FromStr;

use crate::error::ModbusError;

/// Layout of a value on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    Int64,
    UInt64,
    Double,
    /// Fixed-width byte string of the given length.
    String(u16),
}

impl DataType {
    /// Payload length in bytes.
    pub fn length_bytes(&self) -> u32 {
        match self {
            DataType::Bool | DataType::Byte => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float => 4,
            DataType::Int64 | DataType::UInt64 | DataType::Double => 8,
            DataType::String(len) => u32::from(*len),
        }
    }

    /// Number of 16-bit registers the type occupies.
    pub fn register_count(&self) -> u16 {
        match self {
            DataType::Bool | DataType::Byte => 1,
            DataType::String(len) => len.div_ceil(2).max(1),
            other => (other.length_bytes() / 2) as u16,
        }
    }

    /// Canonical lower-case name, parseable by [`FromStr`].
    pub fn name(&self) -> String {
        match self {
            DataType::Bool => "bool".into(),
            DataType::Byte => "byte".into(),
            DataType::Int16 => "int16".into(),
            DataType::UInt16 => "uint16".into(),
            DataType::Int32 => "int32".into(),
            DataType::UInt32 => "uint32".into(),
            DataType::Float => "float".into(),
            DataType::Int64 => "int64".into(),
            DataType::UInt64 => "uint64".into(),
            DataType::Double => "double".into(),
            DataType::String(len) => format!("string:{len}"),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for DataType {
    type Err = ModbusError;

    /// Accepts canonical names plus common PLC aliases (`word`, `real`, `lreal`, ...).
    /// Strings take their byte length after a colon: `string:16`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some(len) = lower.strip_prefix("string:") {
            let len: u16 = len
                .trim()
                .parse()
                .map_err(|_| ModbusError::conversion(format!("invalid string length in '{s}'")))?;
            if len == 0 {
                return Err(ModbusError::conversion("string length must be positive"));
            }
            return Ok(DataType::String(len));
        }
        let ty = match lower.as_str() {
            "bool" | "boolean" | "bit" | "coil" => DataType::Bool,
            "byte" | "u8" | "uint8" => DataType::Byte,
            "int16" | "i16" | "short" => DataType::Int16,
            "uint16" | "u16" | "word" => DataType::UInt16,
            "int32" | "i32" | "long" | "dint" => DataType::Int32,
            "uint32" | "u32" | "dword" | "udint" => DataType::UInt32,
            "float" | "f32" | "float32" | "real" => DataType::Float,
            "int64" | "i64" | "longlong" | "lint" => DataType::Int64,
            "uint64" | "u64" | "qword" | "ulint" => DataType::UInt64,
            "double" | "f64" | "float64" | "lreal" => DataType::Double,
            _ => return Err(ModbusError::conversion(format!("unknown data type '{s}'"))),
        };
        Ok(ty)
    }
}

/// A decoded value.
///
/// ```rust
/// use modbus_batch::{DataType, ModbusValue};
///
/// let temp = ModbusValue::F32(25.5);
/// assert_eq!(temp.natural_type(), DataType::Float);
/// assert!((temp.as_f64() - 25.5).abs() < 0.001);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ModbusValue {
    Bool(bool),
    Byte(u8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    U64(u64),
    I64(i64),
    F64(f64),
    String(String),
}

impl ModbusValue {
    /// Numeric view of the value. Strings parse as a number or yield NaN.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            ModbusValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            ModbusValue::Byte(v) => f64::from(*v),
            ModbusValue::U16(v) => f64::from(*v),
            ModbusValue::I16(v) => f64::from(*v),
            ModbusValue::U32(v) => f64::from(*v),
            ModbusValue::I32(v) => f64::from(*v),
            ModbusValue::F32(v) => f64::from(*v),
            ModbusValue::U64(v) => *v as f64,
            ModbusValue::I64(v) => *v as f64,
            ModbusValue::F64(v) => *v,
            ModbusValue::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }

    /// The data type this value decodes from when no other type is requested.
    pub fn natural_type(&self) -> DataType {
        match self {
            ModbusValue::Bool(_) => DataType::Bool,
            ModbusValue::Byte(_) => DataType::Byte,
            ModbusValue::U16(_) => DataType::UInt16,
            ModbusValue::I16(_) => DataType::Int16,
            ModbusValue::U32(_) => DataType::UInt32,
            ModbusValue::I32(_) => DataType::Int32,
            ModbusValue::F32(_) => DataType::Float,
            ModbusValue::U64(_) => DataType::UInt64,
            ModbusValue::I64(_) => DataType::Int64,
            ModbusValue::F64(_) => DataType::Double,
            ModbusValue::String(s) => {
                DataType::String(u16::try_from(s.len().max(1)).unwrap_or(u16::MAX))
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            ModbusValue::String(s) => s.is_empty(),
            other => other.as_f64() == 0.0,
        }
    }

    /// Type name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ModbusValue::Bool(_) => "bool",
            ModbusValue::Byte(_) => "u8",
            ModbusValue::U16(_) => "u16",
            ModbusValue::I16(_) => "i16",
            ModbusValue::U32(_) => "u32",
            ModbusValue::I32(_) => "i32",
            ModbusValue::F32(_) => "f32",
            ModbusValue::U64(_) => "u64",
            ModbusValue::I64(_) => "i64",
            ModbusValue::F64(_) => "f64",
            ModbusValue::String(_) => "string",
        }
    }
}

impl fmt::Display for ModbusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModbusValue::Bool(v) => write!(f, "{}", v),
            ModbusValue::Byte(v) => write!(f, "{}", v),
            ModbusValue::U16(v) => write!(f, "{}", v),
            ModbusValue::I16(v) => write!(f, "{}", v),
            ModbusValue::U32(v) => write!(f, "{}", v),
            ModbusValue::I32(v) => write!(f, "{}", v),
            ModbusValue::F32(v) => write!(f, "{}", v),
            ModbusValue::U64(v) => write!(f, "{}", v),
            ModbusValue::I64(v) => write!(f, "{}", v),
            ModbusValue::F64(v) => write!(f, "{}", v),
            ModbusValue::String(v) => f.write_str(v),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ModbusValue {
                fn from(v: $ty) -> Self {
                    ModbusValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    u8 => Byte,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    u64 => U64,
    i64 => I64,
    f64 => F64,
    String => String,
}

impl From<&str> for ModbusValue {
    fn from(v: &str) -> Self {
        ModbusValue::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bytes() {
        assert_eq!(DataType::Bool.length_bytes(), 1);
        assert_eq!(DataType::Byte.length_bytes(), 1);
        assert_eq!(DataType::Int16.length_bytes(), 2);
        assert_eq!(DataType::UInt16.length_bytes(), 2);
        assert_eq!(DataType::Int32.length_bytes(), 4);
        assert_eq!(DataType::UInt32.length_bytes(), 4);
        assert_eq!(DataType::Float.length_bytes(), 4);
        assert_eq!(DataType::Int64.length_bytes(), 8);
        assert_eq!(DataType::UInt64.length_bytes(), 8);
        assert_eq!(DataType::Double.length_bytes(), 8);
        assert_eq!(DataType::String(11).length_bytes(), 11);
    }

    #[test]
    fn test_register_count() {
        assert_eq!(DataType::Bool.register_count(), 1);
        assert_eq!(DataType::UInt16.register_count(), 1);
        assert_eq!(DataType::Float.register_count(), 2);
        assert_eq!(DataType::Double.register_count(), 4);
        assert_eq!(DataType::String(5).register_count(), 3);
    }

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("uint16".parse::<DataType>().unwrap(), DataType::UInt16);
        assert_eq!("WORD".parse::<DataType>().unwrap(), DataType::UInt16);
        assert_eq!("real".parse::<DataType>().unwrap(), DataType::Float);
        assert_eq!("lreal".parse::<DataType>().unwrap(), DataType::Double);
        assert_eq!("string:8".parse::<DataType>().unwrap(), DataType::String(8));
        assert!("string:0".parse::<DataType>().is_err());
        assert!("decimal".parse::<DataType>().is_err());
    }

    #[test]
    fn test_name_round_trips() {
        for ty in [
            DataType::Bool,
            DataType::Int64,
            DataType::Double,
            DataType::String(3),
        ] {
            assert_eq!(ty.name().parse::<DataType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_as_f64() {
        assert_eq!(ModbusValue::Bool(true).as_f64(), 1.0);
        assert_eq!(ModbusValue::Byte(7).as_f64(), 7.0);
        assert_eq!(ModbusValue::I16(-50).as_f64(), -50.0);
        assert!((ModbusValue::F32(3.14).as_f64() - 3.14).abs() < 0.001);
        assert_eq!(ModbusValue::from("12.5").as_f64(), 12.5);
        assert!(ModbusValue::from("n/a").as_f64().is_nan());
    }

    #[test]
    fn test_natural_type() {
        assert_eq!(ModbusValue::U32(1).natural_type(), DataType::UInt32);
        assert_eq!(ModbusValue::from("abc").natural_type(), DataType::String(3));
        assert_eq!(ModbusValue::from(true).natural_type(), DataType::Bool);
    }

    #[test]
    fn test_is_zero_and_display() {
        assert!(ModbusValue::U16(0).is_zero());
        assert!(!ModbusValue::F64(0.5).is_zero());
        assert_eq!(format!("{}", ModbusValue::I16(-1234)), "-1234");
        assert_eq!(format!("{}", ModbusValue::from("pump")), "pump");
    }
}
