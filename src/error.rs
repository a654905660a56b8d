//! Error types for the Modbus stack
//!
//! Every fallible operation returns [`ModbusResult`]. Variants are detailed
//! enough for diagnostics; [`ModbusError::kind`] collapses them onto the
//! coarse taxonomy callers branch on.
//!
//! ```text
//! ErrorKind
//! ├── ConnectionError      Connection, Timeout, Io
//! ├── ChecksumError        Checksum
//! ├── DeviceException(c)   DeviceException
//! ├── InvalidAddress       InvalidAddress
//! ├── ConversionError      Conversion
//! └── ProtocolViolation    Protocol, InvalidFunction, InvalidData, Configuration, BatchWrite
//! ```

use std::io;

use thiserror::Error;

use crate::constants::{
    EXCEPTION_ACKNOWLEDGE, EXCEPTION_GATEWAY_PATH_UNAVAILABLE, EXCEPTION_GATEWAY_TARGET_FAILED,
    EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION,
    EXCEPTION_MEMORY_PARITY_ERROR, EXCEPTION_SERVER_DEVICE_BUSY, EXCEPTION_SERVER_DEVICE_FAILURE,
};

/// Result alias used throughout the crate.
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeout, refused connection, link down.
    ConnectionError,
    /// CRC16 or LRC mismatch.
    ChecksumError,
    /// Negative acknowledgement from the device, with its exception code.
    DeviceException(u8),
    /// Malformed symbolic address or illegal operation for the register type.
    InvalidAddress,
    /// Value does not fit the requested data type.
    ConversionError,
    /// Malformed, oversized or unexpected frame.
    ProtocolViolation,
}

/// Checksum scheme that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Crc16,
    Lrc,
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumKind::Crc16 => write!(f, "CRC16"),
            ChecksumKind::Lrc => write!(f, "LRC"),
        }
    }
}

/// Error type for all Modbus operations.
#[derive(Debug, Error)]
pub enum ModbusError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("{kind} mismatch: expected {expected:04X}, got {actual:04X}")]
    Checksum {
        kind: ChecksumKind,
        expected: u16,
        actual: u16,
    },

    #[error("Device exception: function=0x{function:02X}, code=0x{code:02X} ({message})")]
    DeviceException {
        function: u8,
        code: u8,
        message: String,
    },

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Conversion error: {message}")]
    Conversion { message: String },

    #[error("Protocol violation: {message}")]
    Protocol { message: String },

    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Some or all addresses of a batch write failed. Each failure is kept
    /// as `(address, message)`.
    #[error("Batch write: {succeeded} succeeded, {} failed", failures.len())]
    BatchWrite {
        succeeded: usize,
        failures: Vec<(String, String)>,
    },
}

impl ModbusError {
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn conversion<S: Into<String>>(message: S) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    pub fn invalid_address<A: Into<String>, R: Into<String>>(address: A, reason: R) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Build a device exception from the raw function and exception code.
    pub fn device_exception(function: u8, code: u8) -> Self {
        Self::DeviceException {
            function: function & 0x7F,
            code,
            message: exception_description(code).to_string(),
        }
    }

    /// Project onto the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::Io { .. } => {
                ErrorKind::ConnectionError
            }
            Self::Checksum { .. } => ErrorKind::ChecksumError,
            Self::DeviceException { code, .. } => ErrorKind::DeviceException(*code),
            Self::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            Self::Conversion { .. } => ErrorKind::ConversionError,
            Self::Protocol { .. }
            | Self::InvalidFunction { .. }
            | Self::InvalidData { .. }
            | Self::Configuration { .. }
            | Self::BatchWrite { .. } => ErrorKind::ProtocolViolation,
        }
    }

    /// Whether the transport may retry the failed operation.
    ///
    /// Checksum failures and device exceptions describe a complete but bad
    /// exchange and are surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Io { .. }
        )
    }

    /// Whether the stream should be considered broken after this error.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Io { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Modbus exception code, if the device returned one.
    pub fn error_code(&self) -> Option<u8> {
        match self {
            Self::DeviceException { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<io::Error> for ModbusError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Self::timeout(err.to_string(), 0)
            }
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::connection(err.to_string()),
            _ => Self::io(err.to_string()),
        }
    }
}

/// Human readable description of a Modbus exception code.
pub fn exception_description(code: u8) -> &'static str {
    match code {
        EXCEPTION_ILLEGAL_FUNCTION => "Illegal function",
        EXCEPTION_ILLEGAL_DATA_ADDRESS => "Illegal data address",
        EXCEPTION_ILLEGAL_DATA_VALUE => "Illegal data value",
        EXCEPTION_SERVER_DEVICE_FAILURE => "Server device failure",
        EXCEPTION_ACKNOWLEDGE => "Acknowledge",
        EXCEPTION_SERVER_DEVICE_BUSY => "Server device busy",
        EXCEPTION_MEMORY_PARITY_ERROR => "Memory parity error",
        EXCEPTION_GATEWAY_PATH_UNAVAILABLE => "Gateway path unavailable",
        EXCEPTION_GATEWAY_TARGET_FAILED => "Gateway target device failed to respond",
        _ => "Unknown exception",
    }
}
