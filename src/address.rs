//! # Address Model
//!
//! Symbolic addresses have the form `station;function;address`:
//!
//! ```text
//! 1;3;100          holding register 100 on station 1
//! s=2;x=4;0x10     keyed fields and hex numbers are accepted
//! {1;1;7,pump}     containers {..} [..] (..) keep the field before the first comma
//! ```
//!
//! The function field selects the register type (1/5/15 coil, 2 discrete
//! input, 3/6/16 holding register, 4 input register). The effective function
//! code is then re-inferred from the data type and access direction, so
//! `1;3;100` parsed for a Float write resolves to FC16.

use std::fmt;

use crate::constants::{
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER,
};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::infer_function_code;
use crate::value::DataType;

/// Station id reserved for gateways addressing the device itself.
const GATEWAY_STATION: u8 = 255;

/// Modbus data table addressed by a function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterType {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl RegisterType {
    /// Register type a function code operates on.
    pub fn from_function_code(fc: u8) -> Option<Self> {
        match fc {
            FC_READ_COILS | FC_WRITE_SINGLE_COIL | FC_WRITE_MULTIPLE_COILS => Some(Self::Coil),
            FC_READ_DISCRETE_INPUTS => Some(Self::DiscreteInput),
            FC_READ_HOLDING_REGISTERS | FC_WRITE_SINGLE_REGISTER | FC_WRITE_MULTIPLE_REGISTERS => {
                Some(Self::HoldingRegister)
            }
            FC_READ_INPUT_REGISTERS => Some(Self::InputRegister),
            _ => None,
        }
    }

    /// Single-bit tables.
    #[inline]
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Coil | Self::HoldingRegister)
    }

    /// Data type assumed when the caller gives none.
    pub fn default_data_type(&self) -> DataType {
        if self.is_bit() {
            DataType::Bool
        } else {
            DataType::UInt16
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Coil => "coil",
            Self::DiscreteInput => "discrete input",
            Self::HoldingRegister => "holding register",
            Self::InputRegister => "input register",
        };
        f.write_str(name)
    }
}

/// A parsed symbolic address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// The string as supplied by the caller.
    pub original_address: String,
    pub station: u8,
    /// Effective function code for the requested access.
    pub function_code: u8,
    pub address: u16,
    pub length_bytes: u32,
    pub data_type: DataType,
}

impl AddressInfo {
    pub fn register_type(&self) -> RegisterType {
        // function_code is always one produced by infer_function_code
        RegisterType::from_function_code(self.function_code).unwrap_or(RegisterType::HoldingRegister)
    }

    /// Protocol units occupied: registers for word tables, bits for coil tables.
    pub fn unit_span(&self) -> u32 {
        if self.register_type().is_bit() {
            self.length_bytes
        } else {
            u32::from(self.data_type.register_count())
        }
    }

    /// Exclusive end in protocol units.
    pub fn end(&self) -> u32 {
        u32::from(self.address) + self.unit_span()
    }

    /// Fields that identify the access, excluding the original spelling.
    pub fn key(&self) -> (u8, u8, u16, DataType) {
        (self.station, self.function_code, self.address, self.data_type)
    }
}

impl fmt::Display for AddressInfo {
    /// Canonical `station;function;address` form, parseable by [`parse_address`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.station, self.function_code, self.address)
    }
}

/// Parse a symbolic address.
///
/// ```rust
/// use modbus_batch::{parse_address, DataType};
///
/// let info = parse_address("1;3;100", Some(DataType::Float), false).unwrap();
/// assert_eq!((info.station, info.function_code, info.address), (1, 3, 100));
/// assert_eq!(info.length_bytes, 4);
///
/// let write = parse_address("1;3;100", Some(DataType::Float), true).unwrap();
/// assert_eq!(write.function_code, 0x10);
/// ```
pub fn parse_address(
    address: &str,
    data_type: Option<DataType>,
    is_write: bool,
) -> ModbusResult<AddressInfo> {
    let invalid = |reason: String| ModbusError::invalid_address(address, reason);

    let body = unwrap_container(address.trim());
    let fields: Vec<&str> = body.split(';').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(invalid(format!(
            "expected station;function;address, got {} field(s)",
            fields.len()
        )));
    }

    let station = parse_number(fields[0], &["s", "station"])
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| invalid(format!("invalid station '{}'", fields[0])))?;
    if station == 0 || (station > 247 && station != GATEWAY_STATION) {
        return Err(invalid(format!("station {} outside 1..=247", station)));
    }

    let fc = parse_number(fields[1], &["x", "f", "fc", "function"])
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| invalid(format!("invalid function code '{}'", fields[1])))?;
    let register_type = RegisterType::from_function_code(fc)
        .ok_or_else(|| invalid(format!("unknown function code {}", fc)))?;

    let offset = parse_number(fields[2], &["a", "addr", "address"])
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| invalid(format!("invalid register address '{}'", fields[2])))?;

    let data_type = data_type.unwrap_or_else(|| register_type.default_data_type());
    if register_type.is_bit() && data_type != DataType::Bool {
        return Err(invalid(format!(
            "{} addresses carry bool, not {}",
            register_type, data_type
        )));
    }

    let function_code = infer_function_code(data_type, is_write, register_type)
        .map_err(|_| invalid(format!("cannot write to {}", register_type)))?;

    let info = AddressInfo {
        original_address: address.to_string(),
        station,
        function_code,
        address: offset,
        length_bytes: data_type.length_bytes(),
        data_type,
    };
    if info.end() > 0x1_0000 {
        return Err(invalid(format!(
            "{} at {} runs past the end of the address space",
            data_type, offset
        )));
    }
    Ok(info)
}

fn unwrap_container(s: &str) -> &str {
    let inner = [('{', '}'), ('[', ']'), ('(', ')')]
        .iter()
        .find_map(|(open, close)| s.strip_prefix(*open).and_then(|r| r.strip_suffix(*close)))
        .unwrap_or(s);
    inner.split(',').next().unwrap_or(inner).trim()
}

/// Decimal or `0x` hex, optionally prefixed by one of `keys` and `=`.
fn parse_number(field: &str, keys: &[&str]) -> Option<u32> {
    let value = match field.split_once('=') {
        Some((key, value)) => {
            let key = key.trim().to_ascii_lowercase();
            if !keys.contains(&key.as_str()) {
                return None;
            }
            value.trim()
        }
        None => field,
    };
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
