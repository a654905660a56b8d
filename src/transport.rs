//! # Message Transport
//!
//! [`MessageTransport`] turns a [`StreamResource`] into a request/response
//! exchange.
//!
//! - One async mutex guards the stream, the transaction counter, the
//!   statistics and the reconnect bookkeeping. Every public operation holds
//!   it for its whole duration, so at most one exchange is in flight.
//! - Send and receive each retry up to `retries` times on connection-class
//!   failures, pausing `wait_to_retry` between attempts. A retry repeats the
//!   same operation on the same bytes; no new frame is built.
//! - Checksum errors, device exceptions and protocol violations are never
//!   retried.
//! - In short-lived mode every exchange runs inside its own
//!   connect, operate, disconnect cycle, still under the lock. These planned
//!   disconnects are not link losses and reconnect regardless of
//!   `auto_reconnect`.
//! - A failed exchange other than a device exception may leave reply bytes
//!   unread. The stream is disconnected afterwards so a late reply can never
//!   be taken for the answer to the next request.
//!
//! Responses are matched to requests by order alone. The TCP transaction id
//! is validated but never used to reorder.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_RETRIES;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{next_transaction_id, FrameCodec, RequestFrame, ResponseFrame};
use crate::logging::CallbackLogger;
use crate::outcome::{Outcome, Trace};
use crate::stream::StreamResource;
use crate::utils::{format_hex, OperationTimer};

/// Lifetime of the stream relative to exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Connect once and keep the stream open.
    #[default]
    LongLived,
    /// Connect and disconnect around every exchange.
    ShortLived,
}

/// Retry and reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Extra attempts after the first failure of a send or receive.
    pub retries: u32,
    pub wait_to_retry: Duration,
    pub connection_mode: ConnectionMode,
    /// Reconnect a dropped stream before the next operation.
    pub auto_reconnect: bool,
    /// Connect attempts per operation in long-lived mode.
    pub long_connection_reconnect_attempts: u32,
    /// Connect attempts per operation in short-lived mode.
    pub short_connection_reconnect_attempts: u32,
    /// Minimum spacing between connect attempts.
    pub reconnect_cooldown: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            wait_to_retry: Duration::ZERO,
            connection_mode: ConnectionMode::LongLived,
            auto_reconnect: true,
            long_connection_reconnect_attempts: 3,
            short_connection_reconnect_attempts: 1,
            reconnect_cooldown: Duration::ZERO,
        }
    }
}

impl TransportConfig {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_wait_to_retry(mut self, wait: Duration) -> Self {
        self.wait_to_retry = wait;
        self
    }

    pub fn with_connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.connection_mode = mode;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_long_connection_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.long_connection_reconnect_attempts = attempts;
        self
    }

    pub fn with_short_connection_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.short_connection_reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.reconnect_cooldown = cooldown;
        self
    }

    /// Connect attempts allowed for one operation in the configured mode.
    pub fn reconnect_ceiling(&self) -> u32 {
        let attempts = match self.connection_mode {
            ConnectionMode::LongLived => self.long_connection_reconnect_attempts,
            ConnectionMode::ShortLived => self.short_connection_reconnect_attempts,
        };
        attempts.max(1)
    }
}

/// Transport counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub reconnects: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Mean time from send to decoded response.
    pub avg_response_time_ms: f64,
}

impl TransportStats {
    fn record_response_time(&mut self, elapsed_ms: f64) {
        let n = self.responses_received as f64;
        if n <= 1.0 {
            self.avg_response_time_ms = elapsed_ms;
        } else {
            self.avg_response_time_ms += (elapsed_ms - self.avg_response_time_ms) / n;
        }
    }
}

struct TransportState<S> {
    stream: S,
    transaction_id: u16,
    stats: TransportStats,
    last_connect_attempt: Option<Instant>,
    /// The stream is believed open.
    live: bool,
    /// The link failed while open; cleared by the next successful connect.
    link_lost: bool,
    closed: bool,
}

/// Single-flight request/response exchange over one stream.
pub struct MessageTransport<S: StreamResource> {
    state: Mutex<TransportState<S>>,
    codec: FrameCodec,
    config: TransportConfig,
    logger: Option<CallbackLogger>,
}

impl<S: StreamResource> MessageTransport<S> {
    pub fn new(stream: S, codec: FrameCodec, config: TransportConfig) -> Self {
        let live = stream.is_connected();
        Self {
            state: Mutex::new(TransportState {
                stream,
                transaction_id: 0,
                stats: TransportStats::default(),
                last_connect_attempt: None,
                live,
                link_lost: false,
                closed: false,
            }),
            codec,
            config,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: CallbackLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub async fn stats(&self) -> TransportStats {
        self.state.lock().await.stats.clone()
    }

    pub async fn is_connected(&self) -> bool {
        let state = self.state.lock().await;
        !state.closed && state.stream.is_connected()
    }

    /// Open the stream ahead of the first exchange.
    pub async fn connect(&self) -> ModbusResult<()> {
        let mut state = self.state.lock().await;
        self.ensure_open(&state)?;
        self.ensure_connected(&mut state).await
    }

    /// Send raw bytes with retry.
    pub async fn send_request(&self, frame: &[u8]) -> ModbusResult<()> {
        let mut state = self.state.lock().await;
        self.ensure_open(&state)?;
        self.send_with_retry(&mut state, frame).await
    }

    /// Fill `buffer[offset..offset + length]` from the stream with retry.
    pub async fn receive_response(
        &self,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
    ) -> ModbusResult<()> {
        if offset + length > buffer.len() {
            return Err(ModbusError::invalid_data(format!(
                "receive range {}..{} exceeds buffer of {}",
                offset,
                offset + length,
                buffer.len()
            )));
        }
        let mut state = self.state.lock().await;
        self.ensure_open(&state)?;
        self.receive_with_retry(&mut state, buffer, offset, length).await
    }

    /// Exchange a read request.
    pub async fn unicast_read(&self, request: &RequestFrame) -> Outcome<ResponseFrame> {
        if request.is_write() {
            return Outcome::failure(
                ModbusError::protocol(format!(
                    "function 0x{:02X} is not a read",
                    request.function_code
                )),
                Trace::new(),
            );
        }
        self.unicast(request).await
    }

    /// Exchange a write request.
    pub async fn unicast_write(&self, request: &RequestFrame) -> Outcome<ResponseFrame> {
        if !request.is_write() {
            return Outcome::failure(
                ModbusError::protocol(format!(
                    "function 0x{:02X} is not a write",
                    request.function_code
                )),
                Trace::new(),
            );
        }
        self.unicast(request).await
    }

    /// Disconnect the stream. Later calls are no-ops and later exchanges fail.
    pub async fn close(&self) -> ModbusResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.live = false;
        info!("closing transport to {}", state.stream.peer());
        state.stream.disconnect().await
    }

    async fn unicast(&self, request: &RequestFrame) -> Outcome<ResponseFrame> {
        let mut state = self.state.lock().await;
        if let Err(e) = self.ensure_open(&state) {
            return Outcome::failure(e, Trace::new());
        }

        let tx = next_transaction_id(state.transaction_id);
        state.transaction_id = tx;
        let frame = match self.codec.encode_request(request, tx) {
            Ok(frame) => frame,
            Err(e) => return Outcome::failure(e, Trace::new()),
        };
        let trace = Trace::new().with_request(format_hex(&frame));
        debug!("{} TX: {}", self.codec.name(), format_hex(&frame));
        if let Some(logger) = &self.logger {
            logger.log_request(request, &frame);
        }

        let timer = OperationTimer::start("exchange");
        let exchanged = self.exchange(&mut state, request, &frame).await;

        let raw = match exchanged {
            Ok(raw) => raw,
            Err(e) => {
                state.stats.errors += 1;
                warn!("{} exchange with station {} failed: {}", self.codec.name(), request.station, e);
                self.settle(&mut state, Some(&e)).await;
                return Outcome::failure(e, trace);
            }
        };

        let trace = trace.with_response(format_hex(&raw));
        debug!("{} RX: {}", self.codec.name(), format_hex(&raw));
        let decoded = self.codec.decode_response(&raw, request, tx);
        if let Some(logger) = &self.logger {
            match &decoded {
                Ok(response) => logger.log_response(response.station, response.function_code, &raw),
                Err(_) => logger.log_response(request.station, request.function_code, &raw),
            }
        }

        match decoded {
            Ok(response) => {
                state.stats.responses_received += 1;
                state.stats.record_response_time(timer.elapsed_ms());
                self.settle(&mut state, None).await;
                Outcome::success(response, trace)
            }
            Err(e) => {
                state.stats.errors += 1;
                self.settle(&mut state, Some(&e)).await;
                Outcome::failure(e, trace)
            }
        }
    }

    /// Planned disconnect after an exchange: always in short-lived mode,
    /// and after any failure except a device exception, which is a complete
    /// well-formed reply.
    async fn settle(&self, state: &mut TransportState<S>, failure: Option<&ModbusError>) {
        let out_of_sync = failure.is_some_and(|e| e.error_code().is_none());
        let short_lived = self.config.connection_mode == ConnectionMode::ShortLived;
        if !(short_lived || out_of_sync) || !state.stream.is_connected() {
            return;
        }
        if out_of_sync {
            debug!("dropping unread input from {}", state.stream.peer());
        }
        state.live = false;
        if let Err(e) = state.stream.disconnect().await {
            debug!("planned disconnect of {} failed: {}", state.stream.peer(), e);
        }
    }

    /// Send `frame` and read exactly one response frame.
    async fn exchange(
        &self,
        state: &mut TransportState<S>,
        request: &RequestFrame,
        frame: &[u8],
    ) -> ModbusResult<Vec<u8>> {
        self.send_with_retry(state, frame).await?;

        let header_len = self.codec.response_header_len();
        let mut buffer = vec![0u8; header_len];
        self.receive_with_retry(state, &mut buffer, 0, header_len).await?;

        let remaining = self.codec.response_remaining_len(&buffer, request)?;
        buffer.resize(header_len + remaining, 0);
        self.receive_with_retry(state, &mut buffer, header_len, remaining)
            .await?;
        Ok(buffer)
    }

    fn ensure_open(&self, state: &TransportState<S>) -> ModbusResult<()> {
        if state.closed {
            Err(ModbusError::connection("transport closed"))
        } else {
            Ok(())
        }
    }

    async fn ensure_connected(&self, state: &mut TransportState<S>) -> ModbusResult<()> {
        if state.stream.is_connected() {
            return Ok(());
        }
        if state.link_lost && !self.config.auto_reconnect {
            return Err(ModbusError::connection(format!(
                "{} disconnected and auto reconnect is off",
                state.stream.peer()
            )));
        }

        let ceiling = self.config.reconnect_ceiling();
        let mut last_error = None;
        for attempt in 1..=ceiling {
            if let Some(last) = state.last_connect_attempt {
                let since = last.elapsed();
                if since < self.config.reconnect_cooldown {
                    tokio::time::sleep(self.config.reconnect_cooldown - since).await;
                }
            }
            state.last_connect_attempt = Some(Instant::now());

            match state.stream.connect().await {
                Ok(()) => {
                    if state.link_lost {
                        state.stats.reconnects += 1;
                        info!("reconnected to {}", state.stream.peer());
                    }
                    state.link_lost = false;
                    state.live = true;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "connect to {} failed ({}/{}): {}",
                        state.stream.peer(),
                        attempt,
                        ceiling,
                        e
                    );
                    if e.is_timeout() {
                        state.stats.timeouts += 1;
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ModbusError::connection("not connected")))
    }

    async fn send_with_retry(&self, state: &mut TransportState<S>, frame: &[u8]) -> ModbusResult<()> {
        let attempts = self.config.retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.ensure_connected(state).await {
                Ok(()) => state.stream.send(frame).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    state.stats.requests_sent += 1;
                    state.stats.bytes_sent += frame.len() as u64;
                    return Ok(());
                }
                Err(e) => {
                    self.note_failure(state, &e).await;
                    if !e.is_retryable() || attempt >= attempts {
                        return Err(e);
                    }
                    state.stats.retries += 1;
                    warn!("send attempt {}/{} failed: {}", attempt, attempts, e);
                    self.pause().await;
                }
            }
        }
    }

    async fn receive_with_retry(
        &self,
        state: &mut TransportState<S>,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
    ) -> ModbusResult<()> {
        let end = offset + length;
        let mut filled = offset;
        let attempts = self.config.retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match fill(&mut state.stream, buffer, &mut filled, end).await {
                Ok(()) => {
                    state.stats.bytes_received += length as u64;
                    return Ok(());
                }
                Err(e) => {
                    self.note_failure(state, &e).await;
                    if !e.is_retryable() || attempt >= attempts {
                        return Err(e);
                    }
                    state.stats.retries += 1;
                    warn!("receive attempt {}/{} failed: {}", attempt, attempts, e);
                    self.pause().await;
                }
            }
        }
    }

    async fn note_failure(&self, state: &mut TransportState<S>, error: &ModbusError) {
        if error.is_timeout() {
            state.stats.timeouts += 1;
        }
        if error.is_link_failure() {
            if state.live {
                state.link_lost = true;
                state.live = false;
            }
            if state.stream.is_connected() {
                let _ = state.stream.disconnect().await;
            }
        }
    }

    async fn pause(&self) {
        if !self.config.wait_to_retry.is_zero() {
            tokio::time::sleep(self.config.wait_to_retry).await;
        }
    }
}

/// Read until `buffer[..end]` is full, advancing `filled`.
async fn fill<S: StreamResource>(
    stream: &mut S,
    buffer: &mut [u8],
    filled: &mut usize,
    end: usize,
) -> ModbusResult<()> {
    while *filled < end {
        let n = stream.receive(&mut buffer[*filled..end]).await?;
        if n == 0 {
            return Err(ModbusError::connection("stream closed while reading"));
        }
        *filled += n;
    }
    Ok(())
}
