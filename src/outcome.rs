//! # Outcomes
//!
//! Every exchange-level operation returns an [`Outcome`]: the typed result,
//! a human-readable message, and the raw hex frames that produced it.
//! Outcomes are combined with [`Outcome::map`] and [`Outcome::and_then`];
//! traces from each layer are concatenated, never overwritten.

use crate::error::{ModbusError, ModbusResult};

/// Hex dumps of the frames sent and received while producing a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub requests: Vec<String>,
    pub responses: Vec<String>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, hex: impl Into<String>) -> Self {
        self.requests.push(hex.into());
        self
    }

    pub fn with_response(mut self, hex: impl Into<String>) -> Self {
        self.responses.push(hex.into());
        self
    }

    /// `self` followed by `other`.
    pub fn concat(mut self, other: Trace) -> Self {
        self.requests.extend(other.requests);
        self.responses.extend(other.responses);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.responses.is_empty()
    }
}

/// A result plus its diagnostic message and frame trace.
#[derive(Debug)]
pub struct Outcome<T> {
    pub result: ModbusResult<T>,
    pub message: String,
    pub trace: Trace,
}

impl<T> Outcome<T> {
    pub fn success(value: T, trace: Trace) -> Self {
        Self {
            result: Ok(value),
            message: String::new(),
            trace,
        }
    }

    /// Failed outcome whose message is the error's display text.
    pub fn failure(error: ModbusError, trace: Trace) -> Self {
        Self {
            message: error.to_string(),
            result: Err(error),
            trace,
        }
    }

    pub fn from_result(result: ModbusResult<T>, trace: Trace) -> Self {
        match result {
            Ok(value) => Self::success(value, trace),
            Err(error) => Self::failure(error, trace),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Prepend earlier frames to this outcome's trace.
    pub fn after(mut self, earlier: Trace) -> Self {
        self.trace = earlier.concat(self.trace);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ModbusError> {
        self.result.as_ref().err()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            result: self.result.map(f),
            message: self.message,
            trace: self.trace,
        }
    }

    /// Chain a dependent step. A failure short-circuits; otherwise the
    /// step's trace is appended and its message joined to this one.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self.result {
            Err(error) => Outcome {
                result: Err(error),
                message: self.message,
                trace: self.trace,
            },
            Ok(value) => {
                let next = f(value);
                Outcome {
                    result: next.result,
                    message: join_messages(self.message, next.message),
                    trace: self.trace.concat(next.trace),
                }
            }
        }
    }

    pub fn into_result(self) -> ModbusResult<T> {
        self.result
    }

    pub fn into_parts(self) -> (ModbusResult<T>, String, Trace) {
        (self.result, self.message, self.trace)
    }

    /// Flat, value-free view of the outcome.
    pub fn summary(&self) -> ExchangeResult {
        ExchangeResult {
            success: self.is_success(),
            message: self.message.clone(),
            error_code: self.error().and_then(ModbusError::error_code),
            raw_request_trace: self.trace.requests.clone(),
            raw_response_trace: self.trace.responses.clone(),
        }
    }
}

fn join_messages(first: String, second: String) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second,
        (_, true) => first,
        _ => format!("{}; {}", first, second),
    }
}

/// Summary of an exchange for callers that only need status and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeResult {
    pub success: bool,
    pub message: String,
    /// Device exception code, when the device answered with one.
    pub error_code: Option<u8>,
    pub raw_request_trace: Vec<String>,
    pub raw_response_trace: Vec<String>,
}
