//! # Device Limits
//!
//! Per-device ceilings on how many units one request may carry, plus the
//! pause a slow device needs between consecutive requests.
//!
//! The protocol maxima are 125 registers (FC03/04), 123 registers (FC16),
//! 2000 coils (FC01/02) and 1968 coils (FC15). Many field devices accept
//! less; the block optimizer and the write path both consult these values.

use std::time::Duration;

use crate::constants::{
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};

/// Request-size ceilings for one device.
///
/// ```rust
/// use modbus_batch::DeviceLimits;
///
/// let limits = DeviceLimits::new()
///     .with_max_read_registers(50)
///     .with_inter_request_delay_ms(10);
///
/// assert_eq!(limits.max_block_units(0x03), 50);
/// assert_eq!(limits.max_block_units(0x01), 2000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_read_registers: u16,
    pub max_write_registers: u16,
    pub max_read_coils: u16,
    pub max_write_coils: u16,
    /// Pause between consecutive block exchanges, in milliseconds.
    pub inter_request_delay_ms: u64,
}

impl DeviceLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower ceilings for older devices: 50 registers, 500 coils, 10ms pause.
    pub fn conservative() -> Self {
        Self {
            max_read_registers: 50,
            max_write_registers: 50,
            max_read_coils: 500,
            max_write_coils: 500,
            inter_request_delay_ms: 10,
        }
    }

    pub fn with_max_read_registers(mut self, count: u16) -> Self {
        self.max_read_registers = count.min(MAX_READ_REGISTERS);
        self
    }

    pub fn with_max_write_registers(mut self, count: u16) -> Self {
        self.max_write_registers = count.min(MAX_WRITE_REGISTERS);
        self
    }

    pub fn with_max_read_coils(mut self, count: u16) -> Self {
        self.max_read_coils = count.min(MAX_READ_COILS);
        self
    }

    pub fn with_max_write_coils(mut self, count: u16) -> Self {
        self.max_write_coils = count.min(MAX_WRITE_COILS);
        self
    }

    pub fn with_inter_request_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_request_delay_ms = delay_ms;
        self
    }

    /// Ceiling in protocol units for one request with `function_code`.
    ///
    /// Single-write functions always carry exactly one unit.
    pub fn max_block_units(&self, function_code: u8) -> u16 {
        match function_code {
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => self.max_read_registers,
            FC_WRITE_MULTIPLE_REGISTERS => self.max_write_registers,
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS => self.max_read_coils,
            FC_WRITE_MULTIPLE_COILS => self.max_write_coils,
            FC_WRITE_SINGLE_COIL | FC_WRITE_SINGLE_REGISTER => 1,
            _ => self.max_read_registers,
        }
    }

    /// Whether `count` units fit in one request with `function_code`.
    pub fn fits(&self, function_code: u8, count: u16) -> bool {
        count >= 1 && count <= self.max_block_units(function_code)
    }

    pub fn inter_request_delay(&self) -> Option<Duration> {
        (self.inter_request_delay_ms > 0).then(|| Duration::from_millis(self.inter_request_delay_ms))
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_read_registers: MAX_READ_REGISTERS,
            max_write_registers: MAX_WRITE_REGISTERS,
            max_read_coils: MAX_READ_COILS,
            max_write_coils: MAX_WRITE_COILS,
            inter_request_delay_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_maxima_by_default() {
        let limits = DeviceLimits::default();
        assert_eq!(limits.max_block_units(0x03), 125);
        assert_eq!(limits.max_block_units(0x04), 125);
        assert_eq!(limits.max_block_units(0x10), 123);
        assert_eq!(limits.max_block_units(0x01), 2000);
        assert_eq!(limits.max_block_units(0x02), 2000);
        assert_eq!(limits.max_block_units(0x0F), 1968);
        assert_eq!(limits.max_block_units(0x05), 1);
        assert_eq!(limits.max_block_units(0x06), 1);
        assert!(limits.inter_request_delay().is_none());
    }

    #[test]
    fn test_conservative() {
        let limits = DeviceLimits::conservative();
        assert_eq!(limits.max_block_units(0x03), 50);
        assert_eq!(limits.max_block_units(0x0F), 500);
        assert_eq!(limits.inter_request_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_builders_clamp_to_protocol() {
        let limits = DeviceLimits::new()
            .with_max_read_registers(500)
            .with_max_write_coils(60)
            .with_inter_request_delay_ms(5);
        assert_eq!(limits.max_read_registers, 125);
        assert_eq!(limits.max_write_coils, 60);
        assert_eq!(limits.inter_request_delay_ms, 5);
    }

    #[test]
    fn test_fits() {
        let limits = DeviceLimits::new().with_max_write_registers(80);
        assert!(limits.fits(0x10, 80));
        assert!(!limits.fits(0x10, 81));
        assert!(!limits.fits(0x03, 0));
        assert!(limits.fits(0x06, 1));
        assert!(!limits.fits(0x06, 2));
    }
}
