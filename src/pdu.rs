//! Stack-allocated PDU buffer and builders
//!
//! A PDU is the function code plus its data, identical across TCP, RTU and
//! ASCII. Framing is added by [`crate::frame`].

use tracing::trace;

use crate::constants::{
    EXCEPTION_FLAG, FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MAX_PDU_SIZE, MAX_READ_COILS,
    MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};

/// PDU with a fixed-size stack buffer.
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Copy a received PDU, rejecting anything larger than the protocol allows.
    pub fn from_slice(data: &[u8]) -> ModbusResult<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::protocol(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();
        Ok(pdu)
    }

    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::protocol("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push a big-endian u16.
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        self.extend(&value.to_be_bytes())
    }

    #[inline]
    pub fn extend(&mut self, data: &[u8]) -> ModbusResult<()> {
        if self.len + data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::protocol(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        (self.len > 0).then(|| self.data[0])
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .is_some_and(|fc| fc & EXCEPTION_FLAG != 0)
    }

    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        (self.is_exception() && self.len > 1).then(|| self.data[1])
    }

    pub fn function_code_description(fc: u8) -> &'static str {
        match fc & !EXCEPTION_FLAG {
            FC_READ_COILS => "Read Coils",
            FC_READ_DISCRETE_INPUTS => "Read Discrete Inputs",
            FC_READ_HOLDING_REGISTERS => "Read Holding Registers",
            FC_READ_INPUT_REGISTERS => "Read Input Registers",
            FC_WRITE_SINGLE_COIL => "Write Single Coil",
            FC_WRITE_SINGLE_REGISTER => "Write Single Register",
            FC_WRITE_MULTIPLE_COILS => "Write Multiple Coils",
            FC_WRITE_MULTIPLE_REGISTERS => "Write Multiple Registers",
            _ => "Unknown Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent PDU builder.
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    #[inline]
    pub fn function_code(mut self, fc: u8) -> ModbusResult<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    #[inline]
    pub fn address(mut self, addr: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(addr)?;
        Ok(self)
    }

    #[inline]
    pub fn quantity(mut self, qty: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(qty)?;
        Ok(self)
    }

    #[inline]
    pub fn byte(mut self, b: u8) -> ModbusResult<Self> {
        self.pdu.push(b)?;
        Ok(self)
    }

    #[inline]
    pub fn data(mut self, data: &[u8]) -> ModbusResult<Self> {
        self.pdu.extend(data)?;
        Ok(self)
    }

    #[inline]
    pub fn build(self) -> ModbusPdu {
        if let Some(fc) = self.pdu.function_code() {
            trace!(
                "PDU built: FC={:02X} ({}), len={}",
                fc,
                ModbusPdu::function_code_description(fc),
                self.pdu.len()
            );
        }
        self.pdu
    }

    /// FC01-04 request.
    pub fn build_read_request(fc: u8, start_address: u16, quantity: u16) -> ModbusResult<ModbusPdu> {
        let max = match fc {
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS => MAX_READ_COILS,
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => MAX_READ_REGISTERS,
            _ => return Err(ModbusError::invalid_function(fc)),
        };
        check_quantity(fc, start_address, quantity, max)?;
        Ok(PduBuilder::new()
            .function_code(fc)?
            .address(start_address)?
            .quantity(quantity)?
            .build())
    }

    /// FC05/FC06 request. `value` is the two data bytes exactly as sent.
    pub fn build_write_single(fc: u8, address: u16, value: [u8; 2]) -> ModbusResult<ModbusPdu> {
        match fc {
            FC_WRITE_SINGLE_COIL => {
                if value != [0xFF, 0x00] && value != [0x00, 0x00] {
                    return Err(ModbusError::invalid_data(format!(
                        "single coil value must be FF00 or 0000, got {:02X}{:02X}",
                        value[0], value[1]
                    )));
                }
            }
            FC_WRITE_SINGLE_REGISTER => {}
            _ => return Err(ModbusError::invalid_function(fc)),
        }
        Ok(PduBuilder::new()
            .function_code(fc)?
            .address(address)?
            .data(&value)?
            .build())
    }

    /// FC15/FC16 request. `payload` is the packed coil bytes or register bytes.
    pub fn build_write_multiple(
        fc: u8,
        address: u16,
        quantity: u16,
        payload: &[u8],
    ) -> ModbusResult<ModbusPdu> {
        let (max, expected_len) = match fc {
            FC_WRITE_MULTIPLE_COILS => (MAX_WRITE_COILS, usize::from(quantity).div_ceil(8)),
            FC_WRITE_MULTIPLE_REGISTERS => (MAX_WRITE_REGISTERS, usize::from(quantity) * 2),
            _ => return Err(ModbusError::invalid_function(fc)),
        };
        check_quantity(fc, address, quantity, max)?;
        if payload.len() != expected_len {
            return Err(ModbusError::invalid_data(format!(
                "FC{:02X} quantity {} needs {} payload bytes, got {}",
                fc,
                quantity,
                expected_len,
                payload.len()
            )));
        }
        Ok(PduBuilder::new()
            .function_code(fc)?
            .address(address)?
            .quantity(quantity)?
            .byte(expected_len as u8)?
            .data(payload)?
            .build())
    }

    /// FC01-04 response carrying `data` after the byte count.
    pub fn build_read_response(fc: u8, data: &[u8]) -> ModbusResult<ModbusPdu> {
        let byte_count = u8::try_from(data.len())
            .map_err(|_| ModbusError::protocol("read response data exceeds 255 bytes"))?;
        Ok(PduBuilder::new()
            .function_code(fc)?
            .byte(byte_count)?
            .data(data)?
            .build())
    }

    /// Exception response for `fc`.
    pub fn build_exception(fc: u8, code: u8) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(fc | EXCEPTION_FLAG)?
            .byte(code)?
            .build())
    }
}

fn check_quantity(fc: u8, address: u16, quantity: u16, max: u16) -> ModbusResult<()> {
    if quantity == 0 || quantity > max {
        return Err(ModbusError::protocol(format!(
            "FC{:02X} quantity {} outside 1..={}",
            fc, quantity, max
        )));
    }
    if u32::from(address) + u32::from(quantity) > 0x1_0000 {
        return Err(ModbusError::protocol(format!(
            "FC{:02X} range {}+{} exceeds address space",
            fc, address, quantity
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_basic_operations() {
        let mut pdu = ModbusPdu::new();
        assert!(pdu.is_empty());
        pdu.push(0x03).unwrap();
        pdu.push_u16(0x0100).unwrap();
        pdu.push_u16(0x000A).unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x01, 0x00, 0x00, 0x0A]);
        assert!(!pdu.is_exception());
    }

    #[test]
    fn test_pdu_overflow_is_rejected() {
        let mut pdu = ModbusPdu::new();
        pdu.extend(&[0u8; MAX_PDU_SIZE]).unwrap();
        assert!(pdu.push(1).is_err());
        assert!(ModbusPdu::from_slice(&[0u8; MAX_PDU_SIZE + 1]).is_err());
    }

    #[test]
    fn test_read_request() {
        let pdu = PduBuilder::build_read_request(0x03, 100, 1).unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x00, 0x64, 0x00, 0x01]);
    }

    #[test]
    fn test_read_request_limits() {
        assert!(PduBuilder::build_read_request(0x03, 0, 125).is_ok());
        assert!(PduBuilder::build_read_request(0x03, 0, 126).is_err());
        assert!(PduBuilder::build_read_request(0x01, 0, 2000).is_ok());
        assert!(PduBuilder::build_read_request(0x01, 0, 2001).is_err());
        assert!(PduBuilder::build_read_request(0x04, 0xFFFF, 2).is_err());
        assert!(PduBuilder::build_read_request(0x05, 0, 1).is_err());
    }

    #[test]
    fn test_write_single_coil() {
        let pdu = PduBuilder::build_write_single(0x05, 5, [0xFF, 0x00]).unwrap();
        assert_eq!(pdu.as_slice(), &[0x05, 0x00, 0x05, 0xFF, 0x00]);
        assert!(PduBuilder::build_write_single(0x05, 5, [0x00, 0x01]).is_err());
    }

    #[test]
    fn test_write_multiple_registers() {
        let pdu =
            PduBuilder::build_write_multiple(0x10, 1, 2, &[0x00, 0x0A, 0x01, 0x02]).unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
        assert!(PduBuilder::build_write_multiple(0x10, 1, 2, &[0x00]).is_err());
        assert!(PduBuilder::build_write_multiple(0x10, 0, 124, &[0u8; 248]).is_err());
    }

    #[test]
    fn test_exception_response() {
        let pdu = PduBuilder::build_exception(0x03, 0x02).unwrap();
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));
        assert_eq!(ModbusPdu::function_code_description(0x83), "Read Holding Registers");
    }
}
