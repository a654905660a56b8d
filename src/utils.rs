//! Hex formatting and timing helpers.

use std::time::{Duration, Instant};

/// Space separated upper-case hex, e.g. `01 03 00 64`.
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Measures one operation.
#[derive(Debug)]
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x01, 0x03, 0x00, 0x64]), "01 03 00 64");
        assert_eq!(format_hex(&[]), "");
        assert_eq!(format_hex(&[0xAB]), "AB");
    }

    #[test]
    fn test_timer_is_monotonic() {
        let timer = OperationTimer::start("read");
        assert_eq!(timer.operation(), "read");
        assert!(timer.elapsed_ms() >= 0.0);
    }
}
