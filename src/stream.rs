//! # Stream Resources
//!
//! A [`StreamResource`] is an owned, half-duplex byte channel: a TCP socket
//! or a serial port. It knows nothing about Modbus framing. Each direction
//! and the connect step carry their own timeout.
//!
//! [`MessageTransport`](crate::transport::MessageTransport) owns exactly one
//! resource and serializes every exchange on it.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::constants::DEFAULT_TIMEOUT_MS;
use crate::error::{ModbusError, ModbusResult};

/// Byte channel consumed by the transport.
pub trait StreamResource: Send {
    /// Open the channel. Connecting an open channel is a no-op.
    fn connect(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Close the channel. Closing a closed channel is a no-op.
    fn disconnect(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    fn is_connected(&self) -> bool;

    /// Write all of `data`.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Read at least one byte into `buffer` and return the count.
    fn receive(&mut self, buffer: &mut [u8]) -> impl Future<Output = ModbusResult<usize>> + Send;

    /// Peer description for log lines.
    fn peer(&self) -> String {
        String::from("stream")
    }
}

/// Per-step timeouts of a stream resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTimeouts {
    pub connect: Duration,
    pub send: Duration,
    pub receive: Duration,
}

impl Default for StreamTimeouts {
    fn default() -> Self {
        let t = Duration::from_millis(DEFAULT_TIMEOUT_MS);
        Self {
            connect: t,
            send: t,
            receive: t,
        }
    }
}

impl StreamTimeouts {
    /// Same timeout for every step.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: timeout,
            send: timeout,
            receive: timeout,
        }
    }

    pub fn with_connect(mut self, timeout: Duration) -> Self {
        self.connect = timeout;
        self
    }

    pub fn with_send(mut self, timeout: Duration) -> Self {
        self.send = timeout;
        self
    }

    pub fn with_receive(mut self, timeout: Duration) -> Self {
        self.receive = timeout;
        self
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// TCP
// ============================================================================

/// TCP socket resource.
#[derive(Debug)]
pub struct TcpResource {
    address: String,
    timeouts: StreamTimeouts,
    stream: Option<TcpStream>,
}

impl TcpResource {
    /// Resource for `address` (`host:port`). Nothing is opened until
    /// [`StreamResource::connect`].
    pub fn new(address: impl Into<String>, timeouts: StreamTimeouts) -> Self {
        Self {
            address: address.into(),
            timeouts,
            stream: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl StreamResource for TcpResource {
    async fn connect(&mut self) -> ModbusResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = timeout(self.timeouts.connect, TcpStream::connect(&self.address))
            .await
            .map_err(|_| ModbusError::timeout(format!("connect {}", self.address), millis(self.timeouts.connect)))?
            .map_err(|e| ModbusError::connection(format!("failed to connect to {}: {}", self.address, e)))?;
        stream.set_nodelay(true)?;
        info!("connected to {}", self.address);
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> ModbusResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("disconnected from {}", self.address);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> ModbusResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ModbusError::connection("TCP stream not connected"))?;
        let result = match timeout(self.timeouts.send, stream.write_all(data)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ModbusError::from(e)),
            Err(_) => Err(ModbusError::timeout("send", millis(self.timeouts.send))),
        };
        if result.as_ref().is_err_and(ModbusError::is_link_failure) {
            self.stream = None;
        }
        result
    }

    async fn receive(&mut self, buffer: &mut [u8]) -> ModbusResult<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ModbusError::connection("TCP stream not connected"))?;
        let result = match timeout(self.timeouts.receive, stream.read(buffer)).await {
            Ok(Ok(0)) if !buffer.is_empty() => {
                Err(ModbusError::connection("connection closed by peer"))
            }
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(ModbusError::from(e)),
            Err(_) => Err(ModbusError::timeout("receive", millis(self.timeouts.receive))),
        };
        if result.as_ref().is_err_and(ModbusError::is_link_failure) {
            self.stream = None;
        }
        result
    }

    fn peer(&self) -> String {
        self.address.clone()
    }
}

// ============================================================================
// Serial
// ============================================================================

/// Serial line settings.
#[cfg(feature = "rtu")]
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
}

#[cfg(feature = "rtu")]
impl SerialSettings {
    /// 8N1 at `baud_rate`, the usual RTU line.
    pub fn rtu(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
        }
    }

    /// 7E1 at `baud_rate`, the usual ASCII line.
    pub fn ascii(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Seven,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::Even,
        }
    }

    /// 3.5 character times at 11 bits per character.
    pub fn frame_gap(&self) -> Duration {
        let char_time_us = 11_000_000 / u64::from(self.baud_rate.max(1));
        Duration::from_micros(char_time_us * 35 / 10)
    }
}

/// Serial port resource.
#[cfg(feature = "rtu")]
pub struct SerialResource {
    settings: SerialSettings,
    timeouts: StreamTimeouts,
    port: Option<tokio_serial::SerialStream>,
}

#[cfg(feature = "rtu")]
impl SerialResource {
    pub fn new(settings: SerialSettings, timeouts: StreamTimeouts) -> Self {
        Self {
            settings,
            timeouts,
            port: None,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[cfg(feature = "rtu")]
impl StreamResource for SerialResource {
    async fn connect(&mut self) -> ModbusResult<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let builder = tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .timeout(self.timeouts.receive);
        let port = tokio_serial::SerialStream::open(&builder).map_err(|e| {
            ModbusError::connection(format!(
                "failed to open serial port {}: {}",
                self.settings.port, e
            ))
        })?;
        info!(
            "opened {} at {} baud",
            self.settings.port, self.settings.baud_rate
        );
        self.port = Some(port);
        Ok(())
    }

    async fn disconnect(&mut self) -> ModbusResult<()> {
        // Dropping the stream releases the port.
        if self.port.take().is_some() {
            debug!("closed {}", self.settings.port);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> ModbusResult<()> {
        tokio::time::sleep(self.settings.frame_gap()).await;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| ModbusError::connection("serial port not open"))?;
        let write = async {
            port.write_all(data).await?;
            port.flush().await
        };
        match timeout(self.timeouts.send, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ModbusError::from(e)),
            Err(_) => Err(ModbusError::timeout("send", millis(self.timeouts.send))),
        }
    }

    async fn receive(&mut self, buffer: &mut [u8]) -> ModbusResult<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| ModbusError::connection("serial port not open"))?;
        match timeout(self.timeouts.receive, port.read(buffer)).await {
            Ok(Ok(0)) if !buffer.is_empty() => Err(ModbusError::io("serial port returned no data")),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(ModbusError::from(e)),
            Err(_) => Err(ModbusError::timeout("receive", millis(self.timeouts.receive))),
        }
    }

    fn peer(&self) -> String {
        self.settings.port.clone()
    }
}

// ============================================================================
// Scripted stream for unit tests
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

    pub(crate) enum Step {
        Reply(Vec<u8>),
        Fail(ModbusError),
    }

    #[derive(Default)]
    pub(crate) struct Script {
        pub connected: bool,
        /// Connect attempts that fail before one succeeds.
        pub connect_failures: usize,
        pub steps: VecDeque<Step>,
        pub responder: Option<Responder>,
        pending: VecDeque<u8>,
        pub sent: Vec<Vec<u8>>,
        pub connect_attempts: usize,
        pub disconnects: usize,
        pub receives: usize,
        in_flight: bool,
        /// Sends issued while a previous reply was still unread.
        pub overlaps: usize,
    }

    /// In-memory stream driven by queued steps or a responder closure.
    #[derive(Clone)]
    pub(crate) struct ScriptedStream {
        pub script: Arc<Mutex<Script>>,
    }

    impl ScriptedStream {
        pub fn connected() -> Self {
            let script = Script {
                connected: true,
                ..Script::default()
            };
            Self {
                script: Arc::new(Mutex::new(script)),
            }
        }

        pub fn disconnected() -> Self {
            Self {
                script: Arc::new(Mutex::new(Script::default())),
            }
        }

        /// Answer every sent frame with `respond(frame)`.
        pub fn responding<F>(respond: F) -> Self
        where
            F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
        {
            let stream = Self::connected();
            stream.script.lock().unwrap().responder = Some(Box::new(respond));
            stream
        }

        pub fn reply(&self, bytes: Vec<u8>) -> &Self {
            self.script.lock().unwrap().steps.push_back(Step::Reply(bytes));
            self
        }

        pub fn fail(&self, error: ModbusError) -> &Self {
            self.script.lock().unwrap().steps.push_back(Step::Fail(error));
            self
        }

        /// Bytes arriving on the open connection outside any scripted
        /// step. Lost if the stream is closed.
        pub fn deliver(&self, bytes: Vec<u8>) {
            let mut s = self.script.lock().unwrap();
            if s.connected {
                s.pending.extend(bytes);
            }
        }

        pub fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
            f(&mut self.script.lock().unwrap())
        }
    }

    impl StreamResource for ScriptedStream {
        async fn connect(&mut self) -> ModbusResult<()> {
            let mut s = self.script.lock().unwrap();
            s.connect_attempts += 1;
            if s.connect_failures > 0 {
                s.connect_failures -= 1;
                return Err(ModbusError::connection("connection refused"));
            }
            s.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) -> ModbusResult<()> {
            let mut s = self.script.lock().unwrap();
            if s.connected {
                s.connected = false;
                s.disconnects += 1;
            }
            s.pending.clear();
            s.in_flight = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.script.lock().unwrap().connected
        }

        async fn send(&mut self, data: &[u8]) -> ModbusResult<()> {
            let mut s = self.script.lock().unwrap();
            if !s.connected {
                return Err(ModbusError::connection("not connected"));
            }
            if s.in_flight {
                s.overlaps += 1;
            }
            s.sent.push(data.to_vec());
            let reply = s.responder.as_mut().and_then(|r| r(data));
            if let Some(reply) = reply {
                s.pending.extend(reply);
                s.in_flight = true;
            }
            Ok(())
        }

        async fn receive(&mut self, buffer: &mut [u8]) -> ModbusResult<usize> {
            let mut s = self.script.lock().unwrap();
            s.receives += 1;
            if s.pending.is_empty() {
                match s.steps.pop_front() {
                    Some(Step::Reply(bytes)) => s.pending.extend(bytes),
                    Some(Step::Fail(error)) => return Err(error),
                    None => return Err(ModbusError::timeout("receive", 100)),
                }
            }
            let n = buffer.len().min(s.pending.len());
            for (slot, byte) in buffer.iter_mut().zip(s.pending.drain(..n)) {
                *slot = byte;
            }
            if s.pending.is_empty() {
                s.in_flight = false;
            }
            Ok(n)
        }
    }
}
