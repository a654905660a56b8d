//! Protocol constants
//!
//! Frame sizes, per-function quantity ceilings, function codes and exception
//! codes. Quantity ceilings follow from the 253 byte PDU limit of the serial
//! line ADU (256 bytes minus station and CRC).

// ============================================================================
// Framing
// ============================================================================

/// MBAP header: transaction id(2) + protocol id(2) + length(2) + unit id(1).
pub const MBAP_HEADER_LEN: usize = 7;

/// Bytes of the MBAP header that precede the length-counted region.
pub const MBAP_LENGTH_PREFIX: usize = 6;

/// Largest PDU (function code + data).
pub const MAX_PDU_SIZE: usize = 253;

/// Largest value of the MBAP length field (unit id + PDU).
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Modbus TCP protocol identifier.
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Transaction ids wrap at this modulus.
pub const TRANSACTION_ID_MODULUS: u16 = 255;

/// CRC16 trailer length on RTU frames.
pub const CRC_LEN: usize = 2;

/// Smallest well-formed RTU response: station + function + code + CRC.
pub const RTU_MIN_FRAME_LEN: usize = 5;

/// ASCII frame start character.
pub const ASCII_START: u8 = b':';

/// ASCII frame terminator.
pub const ASCII_END: [u8; 2] = [b'\r', b'\n'];

/// Largest frame any of the three framings can produce (ASCII, hex doubled).
pub const MAX_FRAME_SIZE: usize = 1 + (2 + MAX_PDU_SIZE) * 2 + 2;

// ============================================================================
// Quantity ceilings
// ============================================================================

/// FC03/FC04: 1 + 1 + 2N <= 253.
pub const MAX_READ_REGISTERS: u16 = 125;

/// FC16: 1 + 2 + 2 + 1 + 2N <= 253.
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// FC01/FC02: 1 + 1 + ceil(N/8) <= 253, rounded down to 2000.
pub const MAX_READ_COILS: u16 = 2000;

/// FC15: 1 + 2 + 2 + 1 + ceil(N/8) <= 253, capped at 0x7B0.
pub const MAX_WRITE_COILS: u16 = 1968;

// ============================================================================
// Function codes
// ============================================================================

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Bit set on the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// FC05 payload for ON.
pub const COIL_ON: [u8; 2] = [0xFF, 0x00];

/// FC05 payload for OFF.
pub const COIL_OFF: [u8; 2] = [0x00, 0x00];

// ============================================================================
// Exception codes
// ============================================================================

pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

// ============================================================================
// Defaults
// ============================================================================

/// Retries after the first attempt of a send or receive.
pub const DEFAULT_RETRIES: u32 = 1;

/// Minimum efficiency ratio for a coalesced block.
pub const DEFAULT_MIN_EFFICIENCY: f64 = 0.7;

/// Default connect/send/receive timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Modbus TCP default port.
pub const DEFAULT_TCP_PORT: u16 = 502;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_limits_fit_pdu() {
        assert!(1 + 1 + (MAX_READ_REGISTERS as usize * 2) <= MAX_PDU_SIZE);
        assert!(1 + 2 + 2 + 1 + (MAX_WRITE_REGISTERS as usize * 2) <= MAX_PDU_SIZE);
    }

    #[test]
    fn test_coil_limits_fit_pdu() {
        assert!(1 + 1 + (MAX_READ_COILS as usize).div_ceil(8) <= MAX_PDU_SIZE);
        assert!(1 + 2 + 2 + 1 + (MAX_WRITE_COILS as usize).div_ceil(8) <= MAX_PDU_SIZE);
    }

    #[test]
    fn test_frame_constants() {
        assert_eq!(MAX_MBAP_LENGTH, 254);
        assert_eq!(MBAP_HEADER_LEN, MBAP_LENGTH_PREFIX + 1);
        assert_eq!(MAX_FRAME_SIZE, 513);
    }
}
