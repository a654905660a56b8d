//! # Logging
//!
//! The crate logs through `tracing`. Applications that route diagnostics
//! elsewhere inject a [`CallbackLogger`]; the transport then reports every
//! request and response frame to it.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use modbus_batch::{CallbackLogger, LogLevel, LoggingMode};
//!
//! let lines = Arc::new(Mutex::new(Vec::new()));
//! let sink = lines.clone();
//! let logger = CallbackLogger::with_callback(move |_level: LogLevel, msg: &str| {
//!     sink.lock().unwrap().push(msg.to_string());
//! })
//! .with_mode(LoggingMode::Compact);
//!
//! logger.info("connected");
//! assert_eq!(lines.lock().unwrap().len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::frame::RequestFrame;
use crate::utils::format_hex;

/// Severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        };
        f.write_str(name)
    }
}

/// How much frame detail is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    /// Frame logging off. Plain messages still pass through.
    Disabled,
    /// One short line per frame.
    #[default]
    Compact,
    /// Timestamped lines with decoded header fields and full hex.
    Detailed,
}

pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Logger sink with an optional user callback.
#[derive(Clone, Default)]
pub struct CallbackLogger {
    callback: Option<LogCallback>,
    mode: LoggingMode,
    min_level: Option<LogLevel>,
}

impl fmt::Debug for CallbackLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackLogger")
            .field("callback", &self.callback.is_some())
            .field("mode", &self.mode)
            .field("min_level", &self.min_level)
            .finish()
    }
}

impl CallbackLogger {
    pub fn new(callback: Option<LogCallback>, mode: LoggingMode) -> Self {
        Self {
            callback,
            mode,
            min_level: None,
        }
    }

    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        Self::new(Some(Arc::new(callback)), LoggingMode::default())
    }

    /// Forward to `tracing` only, without frame logging.
    pub fn disabled() -> Self {
        Self::new(None, LoggingMode::Disabled)
    }

    pub fn with_mode(mut self, mode: LoggingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Drop messages less severe than `level`.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if self.min_level.is_some_and(|min| level > min) {
            return;
        }
        match &self.callback {
            Some(callback) => {
                if self.mode == LoggingMode::Detailed {
                    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    callback(level, &format!("{} [{}] {}", stamp, level, message));
                } else {
                    callback(level, message);
                }
            }
            None => match level {
                LogLevel::Error => tracing::error!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Trace => tracing::trace!("{}", message),
            },
        }
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Report an outgoing frame.
    pub fn log_request(&self, request: &RequestFrame, frame: &[u8]) {
        match self.mode {
            LoggingMode::Disabled => {}
            LoggingMode::Compact => self.debug(&format!("TX {}", format_hex(frame))),
            LoggingMode::Detailed => self.debug(&format!(
                "TX station={} fc=0x{:02X} address={} count={} len={} [{}]",
                request.station,
                request.function_code,
                request.address,
                request.count,
                frame.len(),
                format_hex(frame)
            )),
        }
    }

    /// Report an incoming frame.
    pub fn log_response(&self, station: u8, function_code: u8, frame: &[u8]) {
        match self.mode {
            LoggingMode::Disabled => {}
            LoggingMode::Compact => self.debug(&format!("RX {}", format_hex(frame))),
            LoggingMode::Detailed => self.debug(&format!(
                "RX station={} fc=0x{:02X} len={} [{}]",
                station,
                function_code,
                frame.len(),
                format_hex(frame)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capture(mode: LoggingMode) -> (CallbackLogger, Arc<Mutex<Vec<(LogLevel, String)>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let logger = CallbackLogger::with_callback(move |level, msg| {
            sink.lock().unwrap().push((level, msg.to_string()));
        })
        .with_mode(mode);
        (logger, lines)
    }

    #[test]
    fn test_compact_frame_logging() {
        let (logger, lines) = capture(LoggingMode::Compact);
        let request = RequestFrame::read(1, 0x03, 100, 1);
        logger.log_request(&request, &[0x01, 0x03, 0x00, 0x64, 0x00, 0x01]);
        logger.log_response(1, 0x03, &[0x01, 0x03, 0x02, 0x00, 0x2A]);
        let lines = lines.lock().unwrap();
        assert_eq!(lines[0], (LogLevel::Debug, "TX 01 03 00 64 00 01".to_string()));
        assert_eq!(lines[1].1, "RX 01 03 02 00 2A");
    }

    #[test]
    fn test_detailed_mode_adds_fields() {
        let (logger, lines) = capture(LoggingMode::Detailed);
        logger.log_request(&RequestFrame::read(7, 0x04, 10, 2), &[0x07]);
        let lines = lines.lock().unwrap();
        assert!(lines[0].1.contains("station=7 fc=0x04 address=10 count=2"));
        assert!(lines[0].1.contains("[DEBUG]"));
    }

    #[test]
    fn test_disabled_mode_drops_frames() {
        let (logger, lines) = capture(LoggingMode::Disabled);
        logger.log_request(&RequestFrame::read(1, 0x03, 0, 1), &[0x01]);
        logger.warn("still here");
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, LogLevel::Warn);
    }

    #[test]
    fn test_min_level_filters() {
        let (logger, lines) = capture(LoggingMode::Compact);
        let logger = logger.with_min_level(LogLevel::Warn);
        logger.debug("noise");
        logger.info("noise");
        logger.error("kept");
        assert_eq!(lines.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_without_callback_does_not_panic() {
        let logger = CallbackLogger::default();
        logger.info("to tracing");
        logger.log_request(&RequestFrame::read(1, 0x03, 0, 1), &[0x01]);
    }
}
