//! # Modbus Client
//!
//! [`ModbusClient`] is one exchange core for every framing. The framing is
//! a [`FrameCodec`] value chosen in [`ClientConfig`], and the byte channel
//! is any [`StreamResource`].
//!
//! Two API levels sit on top of the transport:
//!
//! | Level | Methods |
//! |-------|---------|
//! | Function code | `read_coils` (0x01), `read_discrete_inputs` (0x02), `read_holding_registers` (0x03), `read_input_registers` (0x04), `write_single_coil` (0x05), `write_single_register` (0x06), `write_multiple_coils` (0x0F), `write_multiple_registers` (0x10) |
//! | Symbolic | `read`, `write`, `batch_read`, `batch_write` |
//!
//! Batch reads parse every address, coalesce them into blocks with the
//! [`BlockOptimizer`], issue one read per block and scatter typed values
//! back out. Batch writes never coalesce; each address is written on its
//! own and failures are reported per address.
//!
//! Every client operation holds the batch lock for its whole duration, so
//! two concurrent batches never interleave their blocks.
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use modbus_batch::{ClientConfig, DataType, FrameCodec, ModbusClient, StreamTimeouts};
//!
//! #[tokio::main]
//! async fn main() -> modbus_batch::ModbusResult<()> {
//!     let client = ModbusClient::tcp("127.0.0.1:502", StreamTimeouts::default(), ClientConfig::new(FrameCodec::Tcp));
//!
//!     let mut points = HashMap::new();
//!     points.insert("1;3;100".to_string(), DataType::UInt16);
//!     points.insert("1;3;102".to_string(), DataType::Float);
//!
//!     let values = client.batch_read(&points).await.into_result()?;
//!     for (address, (data_type, value)) in &values {
//!         println!("{address} ({data_type}): {value:?}");
//!     }
//!     client.close().await
//! }
//! ```

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::address::{parse_address, AddressInfo};
use crate::bytes::{ByteLayout, EndianFormat};
use crate::codec::{coerce, decode_coil, decode_value, encode_value, unpack_coils};
use crate::constants::{
    DEFAULT_MIN_EFFICIENCY, FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER,
};
use crate::device_limits::DeviceLimits;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{FrameCodec, RequestFrame, ResponseFrame};
use crate::logging::CallbackLogger;
use crate::optimizer::{AddressBlock, BlockKey, BlockOptimizer};
use crate::outcome::{Outcome, Trace};
use crate::stream::{StreamResource, StreamTimeouts, TcpResource};
use crate::transport::{MessageTransport, TransportConfig, TransportStats};
use crate::value::{DataType, ModbusValue};

#[cfg(feature = "rtu")]
use crate::stream::{SerialResource, SerialSettings};

/// Values returned by [`ModbusClient::batch_read`], keyed by the address
/// string as supplied. `None` marks an address whose block could not be read.
pub type BatchValues = HashMap<String, (DataType, Option<ModbusValue>)>;

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub format: FrameCodec,
    pub endian: EndianFormat,
    /// Reverse every multi-byte value after the endian arrangement.
    pub reverse_bytes: bool,
    pub min_efficiency: f64,
    pub limits: DeviceLimits,
    pub transport: TransportConfig,
    pub logger: Option<CallbackLogger>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(FrameCodec::Tcp)
    }
}

impl ClientConfig {
    pub fn new(format: FrameCodec) -> Self {
        Self {
            format,
            endian: EndianFormat::default(),
            reverse_bytes: false,
            min_efficiency: DEFAULT_MIN_EFFICIENCY,
            limits: DeviceLimits::default(),
            transport: TransportConfig::default(),
            logger: None,
        }
    }

    pub fn with_endian(mut self, endian: EndianFormat) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_reverse_bytes(mut self, reverse: bool) -> Self {
        self.reverse_bytes = reverse;
        self
    }

    pub fn with_min_efficiency(mut self, min_efficiency: f64) -> Self {
        self.min_efficiency = min_efficiency;
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_logger(mut self, logger: CallbackLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn layout(&self) -> ByteLayout {
        ByteLayout::new(self.endian, self.reverse_bytes)
    }
}

/// Modbus client over one stream.
pub struct ModbusClient<S: StreamResource> {
    transport: MessageTransport<S>,
    config: ClientConfig,
    batch_lock: Mutex<()>,
}

impl ModbusClient<TcpResource> {
    /// Client for `address` (`host:port`). Connects on first use.
    pub fn tcp(address: impl Into<String>, timeouts: StreamTimeouts, config: ClientConfig) -> Self {
        Self::new(TcpResource::new(address, timeouts), config)
    }
}

#[cfg(feature = "rtu")]
impl ModbusClient<SerialResource> {
    /// Client on a serial line. Opens the port on first use.
    pub fn serial(settings: SerialSettings, timeouts: StreamTimeouts, config: ClientConfig) -> Self {
        Self::new(SerialResource::new(settings, timeouts), config)
    }
}

impl<S: StreamResource> ModbusClient<S> {
    pub fn new(stream: S, config: ClientConfig) -> Self {
        let mut transport = MessageTransport::new(stream, config.format, config.transport.clone());
        if let Some(logger) = &config.logger {
            transport = transport.with_logger(logger.clone());
        }
        Self {
            transport,
            config,
            batch_lock: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &MessageTransport<S> {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn connect(&self) -> ModbusResult<()> {
        self.transport.connect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Close the stream. Safe to call more than once.
    pub async fn close(&self) -> ModbusResult<()> {
        let _batch = self.batch_lock.lock().await;
        self.transport.close().await
    }

    pub async fn stats(&self) -> TransportStats {
        self.transport.stats().await
    }

    /// Exchange a prepared request.
    pub async fn execute(&self, request: &RequestFrame) -> Outcome<ResponseFrame> {
        let _batch = self.batch_lock.lock().await;
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: &RequestFrame) -> Outcome<ResponseFrame> {
        if request.is_write() {
            self.transport.unicast_write(request).await
        } else {
            self.transport.unicast_read(request).await
        }
    }

    async fn pause_between_requests(&self) {
        if let Some(delay) = self.config.limits.inter_request_delay() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_quantity(&self, function_code: u8, quantity: u16) -> ModbusResult<()> {
        if self.config.limits.fits(function_code, quantity) {
            Ok(())
        } else {
            Err(ModbusError::invalid_data(format!(
                "quantity {} outside 1..={} for FC{:02X}",
                quantity,
                self.config.limits.max_block_units(function_code),
                function_code
            )))
        }
    }

    // ========================================================================
    // Function code primitives
    // ========================================================================

    async fn read_data(&self, station: u8, function_code: u8, address: u16, quantity: u16) -> ModbusResult<Vec<u8>> {
        self.check_quantity(function_code, quantity)?;
        let request = RequestFrame::read(station, function_code, address, quantity);
        let response = self.execute(&request).await.into_result()?;
        Ok(response.values().to_vec())
    }

    async fn write_request(&self, request: RequestFrame) -> ModbusResult<()> {
        self.check_quantity(request.function_code, request.count)?;
        self.execute(&request).await.into_result().map(|_| ())
    }

    /// FC01.
    pub async fn read_coils(&self, station: u8, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        let data = self.read_data(station, FC_READ_COILS, address, quantity).await?;
        Ok(unpack_coils(&data, usize::from(quantity)))
    }

    /// FC02.
    pub async fn read_discrete_inputs(&self, station: u8, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        let data = self.read_data(station, FC_READ_DISCRETE_INPUTS, address, quantity).await?;
        Ok(unpack_coils(&data, usize::from(quantity)))
    }

    /// FC03.
    pub async fn read_holding_registers(&self, station: u8, address: u16, quantity: u16) -> ModbusResult<Vec<u16>> {
        let data = self.read_data(station, FC_READ_HOLDING_REGISTERS, address, quantity).await?;
        Ok(to_registers(&data))
    }

    /// FC04.
    pub async fn read_input_registers(&self, station: u8, address: u16, quantity: u16) -> ModbusResult<Vec<u16>> {
        let data = self.read_data(station, FC_READ_INPUT_REGISTERS, address, quantity).await?;
        Ok(to_registers(&data))
    }

    /// FC05. The wire value is `FF 00` for on and `00 00` for off.
    pub async fn write_single_coil(&self, station: u8, address: u16, on: bool) -> ModbusResult<()> {
        self.write_request(RequestFrame::write_single_coil(station, address, on))
            .await
    }

    /// FC06.
    pub async fn write_single_register(&self, station: u8, address: u16, value: u16) -> ModbusResult<()> {
        self.write_request(RequestFrame::write_single_register(station, address, value))
            .await
    }

    /// FC15. Coil states are packed MSB-first within each byte.
    pub async fn write_multiple_coils(&self, station: u8, address: u16, values: &[bool]) -> ModbusResult<()> {
        self.write_request(RequestFrame::write_multiple_coils(station, address, values)?)
            .await
    }

    /// FC16.
    pub async fn write_multiple_registers(&self, station: u8, address: u16, values: &[u16]) -> ModbusResult<()> {
        let bytes = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_request(RequestFrame::write_multiple_registers(station, address, bytes)?)
            .await
    }

    // ========================================================================
    // Symbolic access
    // ========================================================================

    /// Read one typed value.
    pub async fn read(&self, address: &str, data_type: DataType) -> Outcome<ModbusValue> {
        let info = match parse_address(address, Some(data_type), false) {
            Ok(info) => info,
            Err(e) => return Outcome::failure(e, Trace::new()),
        };
        let count = info.unit_span() as u16;
        if let Err(e) = self.check_quantity(info.function_code, count) {
            return Outcome::failure(e, Trace::new());
        }
        let request = RequestFrame::read(info.station, info.function_code, info.address, count);

        let _batch = self.batch_lock.lock().await;
        self.transport
            .unicast_read(&request)
            .await
            .and_then(|response| {
                Outcome::from_result(self.decode_member(&info, response.values(), 0), Trace::new())
            })
    }

    /// Write one typed value.
    pub async fn write(&self, address: &str, data_type: DataType, value: &ModbusValue) -> Outcome<()> {
        let _batch = self.batch_lock.lock().await;
        self.write_one(address, data_type, value).await
    }

    async fn write_one(&self, address: &str, data_type: DataType, value: &ModbusValue) -> Outcome<()> {
        let request = match parse_address(address, Some(data_type), true)
            .and_then(|info| self.write_request_for(&info, value))
        {
            Ok(request) => request,
            Err(e) => return Outcome::failure(e, Trace::new()),
        };
        if let Err(e) = self.check_quantity(request.function_code, request.count) {
            return Outcome::failure(e, Trace::new());
        }
        self.transport.unicast_write(&request).await.map(|_| ())
    }

    /// Build the write request for one parsed address.
    fn write_request_for(&self, info: &AddressInfo, value: &ModbusValue) -> ModbusResult<RequestFrame> {
        match info.function_code {
            FC_WRITE_SINGLE_COIL => match coerce(value, DataType::Bool)? {
                ModbusValue::Bool(on) => Ok(RequestFrame::write_single_coil(info.station, info.address, on)),
                other => Err(ModbusError::conversion(format!("expected bool, got {}", other))),
            },
            FC_WRITE_SINGLE_REGISTER => {
                let bytes = encode_value(value, info.data_type, self.config.layout())?;
                let word = bytes
                    .get(..2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .ok_or_else(|| ModbusError::conversion("encoded value shorter than a register"))?;
                Ok(RequestFrame::write_single_register(info.station, info.address, word))
            }
            FC_WRITE_MULTIPLE_REGISTERS => {
                let bytes = encode_value(value, info.data_type, self.config.layout())?;
                RequestFrame::write_multiple_registers(info.station, info.address, bytes)
            }
            other => Err(ModbusError::invalid_function(other)),
        }
    }

    /// Decode `member` starting at `offset` of a read payload: a bit offset
    /// for coil tables, a byte offset for register tables.
    fn decode_member(&self, member: &AddressInfo, data: &[u8], offset: usize) -> ModbusResult<ModbusValue> {
        let short = || {
            ModbusError::protocol(format!(
                "{} lies outside the {} returned bytes",
                member.original_address,
                data.len()
            ))
        };
        if member.register_type().is_bit() {
            return decode_coil(data, offset).map(ModbusValue::Bool).ok_or_else(short);
        }
        let len = usize::from(member.data_type.register_count()) * 2;
        let raw = data.get(offset..offset + len).ok_or_else(short)?;
        decode_value(raw, member.data_type, self.config.layout())
    }

    // ========================================================================
    // Batch orchestration
    // ========================================================================

    /// Read many typed values with as few requests as the optimizer allows.
    ///
    /// Invalid addresses are left out of the result and named in the
    /// message. Addresses whose block failed map to `None`. The outcome
    /// fails only when no block could be read.
    pub async fn batch_read(&self, addresses: &HashMap<String, DataType>) -> Outcome<BatchValues> {
        let _batch = self.batch_lock.lock().await;

        let mut keys: Vec<&String> = addresses.keys().collect();
        keys.sort();

        let mut messages = Vec::new();
        let mut parse_error = None;
        let mut infos = Vec::with_capacity(keys.len());
        for key in keys {
            match parse_address(key, Some(addresses[key]), false) {
                Ok(info) => infos.push(info),
                Err(e) => {
                    warn!("skipping {}: {}", key, e);
                    messages.push(e.to_string());
                    parse_error.get_or_insert(e);
                }
            }
        }

        let plan = BlockOptimizer::new(self.config.min_efficiency)
            .with_limits(self.config.limits)
            .plan(&infos);
        debug!(
            "batch read: {} address(es) in {} block(s)",
            infos.len(),
            plan.blocks.len()
        );

        let mut trace = Trace::new();
        let mut block_data: HashMap<BlockKey, Vec<u8>> = HashMap::new();
        let mut block_error = None;
        for (i, block) in plan.blocks.iter().enumerate() {
            if i > 0 {
                self.pause_between_requests().await;
            }
            let (result, message, block_trace) = self
                .transport
                .unicast_read(&block.to_request())
                .await
                .into_parts();
            trace = trace.concat(block_trace);
            match result {
                Ok(response) => {
                    block_data.insert(block.key(), response.values().to_vec());
                }
                Err(e) => {
                    messages.push(format!("{}: {}", describe_block(block), message));
                    block_error.get_or_insert(e);
                }
            }
        }

        let mut values = BatchValues::new();
        for block in &plan.blocks {
            let data = block_data.get(&block.key());
            for member in &block.members {
                let value = data.and_then(|d| {
                    self.decode_member(member, d, block.member_offset(member))
                        .map_err(|e| messages.push(e.to_string()))
                        .ok()
                });
                values.insert(member.original_address.clone(), (member.data_type, value));
            }
        }
        for member in plan.oversized {
            messages.push(format!(
                "{} exceeds the block size limit",
                member.original_address
            ));
            values.insert(member.original_address, (member.data_type, None));
        }

        let message = messages.join("; ");
        if block_data.is_empty() {
            if let Some(e) = block_error.or(parse_error) {
                return Outcome::failure(e, trace).with_message(message);
            }
        }
        Outcome::success(values, trace).with_message(message)
    }

    /// Write many typed values, one request per address.
    ///
    /// Succeeds only when every address was written. Otherwise the error is
    /// [`ModbusError::BatchWrite`] listing each failed address; a non-zero
    /// `succeeded` marks a partial failure.
    pub async fn batch_write(&self, values: &HashMap<String, (DataType, ModbusValue)>) -> Outcome<()> {
        let _batch = self.batch_lock.lock().await;

        let mut keys: Vec<&String> = values.keys().collect();
        keys.sort();

        let mut trace = Trace::new();
        let mut succeeded = 0;
        let mut failures = Vec::new();
        for (i, key) in keys.into_iter().enumerate() {
            if i > 0 {
                self.pause_between_requests().await;
            }
            let (data_type, value) = &values[key];
            let (result, message, write_trace) = self.write_one(key, *data_type, value).await.into_parts();
            trace = trace.concat(write_trace);
            match result {
                Ok(()) => succeeded += 1,
                Err(_) => {
                    warn!("write {} failed: {}", key, message);
                    failures.push((key.clone(), message));
                }
            }
        }

        if failures.is_empty() {
            return Outcome::success((), trace).with_message(format!("{} written", succeeded));
        }
        let scope = if succeeded > 0 { "partial failure" } else { "all writes failed" };
        let detail = failures
            .iter()
            .map(|(address, message)| format!("{}: {}", address, message))
            .collect::<Vec<_>>()
            .join("; ");
        let message = format!("{}: {}", scope, detail);
        Outcome::failure(ModbusError::BatchWrite { succeeded, failures }, trace).with_message(message)
    }
}

fn describe_block(block: &AddressBlock) -> String {
    format!(
        "block {};{};{}+{}",
        block.station, block.function_code, block.start_address, block.total_length
    )
}

fn to_registers(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect()
}
