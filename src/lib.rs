//! # modbus_batch
//!
//! Modbus client stack for TCP, RTU and ASCII with batch reads that
//! coalesce scattered points into as few requests as possible.
//!
//! ## Layers
//!
//! | Layer | Module | Role |
//! |-------|--------|------|
//! | Stream | [`stream`] | Byte channel (TCP socket, serial port) |
//! | Transport | [`transport`] | Single-flight exchange, retries, reconnects, statistics |
//! | Framing | [`frame`] | MBAP, CRC16 and LRC framing behind one [`FrameCodec`] |
//! | Addressing | [`address`] | `station;function;address` strings to typed points |
//! | Optimizer | [`optimizer`] | Contiguous block coalescing under an efficiency floor |
//! | Client | [`client`] | Function code primitives and batch orchestration |
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_batch::{ClientConfig, DataType, FrameCodec, ModbusClient, ModbusResult, StreamTimeouts};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let client = ModbusClient::tcp("127.0.0.1:502", StreamTimeouts::default(), ClientConfig::new(FrameCodec::Tcp));
//!
//!     let registers = client.read_holding_registers(1, 0, 10).await?;
//!     println!("registers: {:?}", registers);
//!
//!     let temperature = client.read("1;3;100", DataType::Float).await.into_result()?;
//!     println!("temperature: {}", temperature);
//!
//!     client.close().await
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Error taxonomy and result alias
pub mod error;

/// Protocol constants and default settings
pub mod constants;

/// Stack-allocated PDU
pub mod pdu;

/// Request and response framing for TCP, RTU and ASCII
pub mod frame;

/// Byte channels the transport runs over
pub mod stream;

/// Retrying, single-flight request/response exchange
pub mod transport;

/// Function code primitives and batch orchestration
pub mod client;

/// Result envelope carrying frame traces
pub mod outcome;

/// Hex formatting and timers
pub mod utils;

/// Callback logging
pub mod logging;

// ============================================================================
// Data modules
// ============================================================================

/// Typed values
pub mod value;

/// Word and byte order for multi-register values
pub mod bytes;

/// Value encoding and decoding
pub mod codec;

/// Symbolic address parsing
pub mod address;

/// Read block coalescing
pub mod optimizer;

/// Per-device request ceilings
pub mod device_limits;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime ===
pub use tokio;

// === Client API ===
pub use client::{BatchValues, ClientConfig, ModbusClient};

// === Error handling ===
pub use error::{ErrorKind, ModbusError, ModbusResult};

// === Core types ===
pub use address::{parse_address, AddressInfo, RegisterType};
pub use bytes::{ByteLayout, EndianFormat};
pub use codec::{decode_value, encode_value};
pub use frame::{FrameCodec, RequestFrame, ResponseFrame};
pub use outcome::{ExchangeResult, Outcome, Trace};
pub use value::{DataType, ModbusValue};

// === Batch optimization ===
pub use device_limits::DeviceLimits;
pub use optimizer::{optimize, AddressBlock, BlockOptimizer, OptimizationPlan};

// === Transport ===
pub use stream::{StreamResource, StreamTimeouts, TcpResource};
pub use transport::{ConnectionMode, MessageTransport, TransportConfig, TransportStats};

// === Protocol limits ===
pub use constants::{
    DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS, MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS,
    MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};

// === Logging ===
pub use logging::{CallbackLogger, LogCallback, LogLevel, LoggingMode};

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};

#[doc(hidden)]
pub use utils::{format_hex, OperationTimer};

#[cfg(feature = "rtu")]
pub use stream::{SerialResource, SerialSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name and version.
pub fn info() -> String {
    format!("modbus_batch v{} - Modbus TCP/RTU/ASCII with batch reads", VERSION)
}
