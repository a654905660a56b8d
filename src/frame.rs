//! # Frame Codec
//!
//! Pure encode/decode of the three Modbus wire framings around a common
//! PDU:
//!
//! | Framing | Layout | Integrity |
//! |---------|--------|-----------|
//! | TCP | `TxId(2) ProtoId(2)=0 Len(2) Unit(1) FC PDU...` | none (TCP) |
//! | RTU | `Station FC PDU... CRCLo CRCHi` | CRC16, seed 0xFFFF, poly 0xA001 |
//! | ASCII | `':' hex(Station FC PDU... LRC) CR LF` | LRC, two's complement of byte sum |
//!
//! `Len` counts from the unit id to the end of the PDU. Exception responses
//! carry the request function code with bit 0x80 set followed by one
//! exception code byte; they decode to [`ModbusError::DeviceException`].
//!
//! The codec also sizes responses so a transport can read exactly one frame:
//! read [`FrameCodec::response_header_len`] bytes, then
//! [`FrameCodec::response_remaining_len`] more.

use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_MODBUS};

use crate::address::RegisterType;
use crate::codec::{coil_payload, pack_coils};
use crate::constants::{
    ASCII_END, ASCII_START, CRC_LEN, EXCEPTION_FLAG, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MAX_MBAP_LENGTH,
    MAX_PDU_SIZE, MBAP_HEADER_LEN, MBAP_LENGTH_PREFIX, MODBUS_PROTOCOL_ID, TRANSACTION_ID_MODULUS,
};
use crate::error::{ChecksumKind, ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};
use crate::value::DataType;

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

// ============================================================================
// Checksums and hex
// ============================================================================

/// Modbus CRC16 of `data`.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Check the trailing little-endian CRC16 of an RTU frame.
pub fn validate_crc16(frame: &[u8]) -> bool {
    if frame.len() < CRC_LEN + 1 {
        return false;
    }
    let (body, tail) = frame.split_at(frame.len() - CRC_LEN);
    crc16(body) == u16::from_le_bytes([tail[0], tail[1]])
}

/// Modbus LRC of `data`.
#[inline]
pub fn lrc(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)).wrapping_neg()
}

/// Check that the last byte of `raw` is the LRC of the bytes before it.
pub fn validate_lrc(raw: &[u8]) -> bool {
    match raw.split_last() {
        Some((last, body)) => lrc(body) == *last,
        None => false,
    }
}

/// Upper-case ASCII hex of `data`.
pub fn to_ascii_hex(data: &[u8]) -> Vec<u8> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(data.len() * 2);
    for byte in data {
        out.push(DIGITS[usize::from(byte >> 4)]);
        out.push(DIGITS[usize::from(byte & 0x0F)]);
    }
    out
}

/// Decode ASCII hex, accepting either case.
pub fn from_ascii_hex(ascii: &[u8]) -> ModbusResult<Vec<u8>> {
    if ascii.len() % 2 != 0 {
        return Err(ModbusError::protocol(format!(
            "odd ASCII hex length {}",
            ascii.len()
        )));
    }
    ascii
        .chunks_exact(2)
        .map(|pair| Ok((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(c: u8) -> ModbusResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(ModbusError::protocol(format!(
            "invalid ASCII hex character 0x{c:02X}"
        ))),
    }
}

/// Next MBAP transaction id. Ids wrap mod 255.
#[inline]
pub fn next_transaction_id(current: u16) -> u16 {
    (current + 1) % TRANSACTION_ID_MODULUS
}

// ============================================================================
// Function code inference
// ============================================================================

/// Choose the function code for an access.
///
/// | Register type | Read | Write |
/// |---------------|------|-------|
/// | Coil | 0x01 | 0x05 single bit, 0x0F otherwise |
/// | DiscreteInput | 0x02 | rejected |
/// | HoldingRegister | 0x03 | 0x06 when <= 2 bytes, 0x10 otherwise |
/// | InputRegister | 0x04 | rejected |
pub fn infer_function_code(
    data_type: DataType,
    is_write: bool,
    register_type: RegisterType,
) -> ModbusResult<u8> {
    let code = match (register_type, is_write) {
        (RegisterType::Coil, false) => FC_READ_COILS,
        (RegisterType::Coil, true) => {
            if data_type == DataType::Bool {
                FC_WRITE_SINGLE_COIL
            } else {
                FC_WRITE_MULTIPLE_COILS
            }
        }
        (RegisterType::DiscreteInput, false) => FC_READ_DISCRETE_INPUTS,
        (RegisterType::HoldingRegister, false) => FC_READ_HOLDING_REGISTERS,
        (RegisterType::HoldingRegister, true) => {
            if data_type.length_bytes() <= 2 {
                FC_WRITE_SINGLE_REGISTER
            } else {
                FC_WRITE_MULTIPLE_REGISTERS
            }
        }
        (RegisterType::InputRegister, false) => FC_READ_INPUT_REGISTERS,
        (RegisterType::DiscreteInput | RegisterType::InputRegister, true) => {
            return Err(ModbusError::invalid_address(
                register_type.to_string(),
                "register type is read-only",
            ))
        }
    };
    Ok(code)
}

/// Whether `fc` is one of the supported write functions.
#[inline]
pub fn is_write_function(fc: u8) -> bool {
    matches!(
        fc,
        FC_WRITE_SINGLE_COIL
            | FC_WRITE_SINGLE_REGISTER
            | FC_WRITE_MULTIPLE_COILS
            | FC_WRITE_MULTIPLE_REGISTERS
    )
}

/// Whether `fc` is one of the supported read functions.
#[inline]
pub fn is_read_function(fc: u8) -> bool {
    matches!(fc, FC_READ_COILS..=FC_READ_INPUT_REGISTERS)
}

// ============================================================================
// Frames
// ============================================================================

/// One request, independent of framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub station: u8,
    pub function_code: u8,
    pub address: u16,
    /// Coils or registers addressed.
    pub count: u16,
    /// Write data exactly as sent: FC05/06 value bytes, FC15 packed coils, FC16 register bytes.
    pub payload: Vec<u8>,
}

impl RequestFrame {
    pub fn read(station: u8, function_code: u8, address: u16, count: u16) -> Self {
        Self {
            station,
            function_code,
            address,
            count,
            payload: Vec::new(),
        }
    }

    pub fn write_single_coil(station: u8, address: u16, on: bool) -> Self {
        Self {
            station,
            function_code: FC_WRITE_SINGLE_COIL,
            address,
            count: 1,
            payload: coil_payload(on).to_vec(),
        }
    }

    pub fn write_single_register(station: u8, address: u16, value: u16) -> Self {
        Self {
            station,
            function_code: FC_WRITE_SINGLE_REGISTER,
            address,
            count: 1,
            payload: value.to_be_bytes().to_vec(),
        }
    }

    pub fn write_multiple_coils(station: u8, address: u16, values: &[bool]) -> ModbusResult<Self> {
        let count = u16::try_from(values.len())
            .map_err(|_| ModbusError::invalid_data("too many coils"))?;
        Ok(Self {
            station,
            function_code: FC_WRITE_MULTIPLE_COILS,
            address,
            count,
            payload: pack_coils(values),
        })
    }

    /// FC16 from raw register bytes (two per register).
    pub fn write_multiple_registers(station: u8, address: u16, bytes: Vec<u8>) -> ModbusResult<Self> {
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return Err(ModbusError::invalid_data(format!(
                "register payload must be a positive even length, got {}",
                bytes.len()
            )));
        }
        let count = u16::try_from(bytes.len() / 2)
            .map_err(|_| ModbusError::invalid_data("too many registers"))?;
        Ok(Self {
            station,
            function_code: FC_WRITE_MULTIPLE_REGISTERS,
            address,
            count,
            payload: bytes,
        })
    }

    pub fn is_write(&self) -> bool {
        is_write_function(self.function_code)
    }

    /// Build the request PDU, validating direction, quantity and payload shape.
    pub fn to_pdu(&self) -> ModbusResult<ModbusPdu> {
        match self.function_code {
            FC_READ_COILS..=FC_READ_INPUT_REGISTERS => {
                PduBuilder::build_read_request(self.function_code, self.address, self.count)
            }
            FC_WRITE_SINGLE_COIL | FC_WRITE_SINGLE_REGISTER => {
                let value: [u8; 2] = self.payload.as_slice().try_into().map_err(|_| {
                    ModbusError::invalid_data(format!(
                        "FC{:02X} needs 2 payload bytes, got {}",
                        self.function_code,
                        self.payload.len()
                    ))
                })?;
                PduBuilder::build_write_single(self.function_code, self.address, value)
            }
            FC_WRITE_MULTIPLE_COILS | FC_WRITE_MULTIPLE_REGISTERS => PduBuilder::build_write_multiple(
                self.function_code,
                self.address,
                self.count,
                &self.payload,
            ),
            other => Err(ModbusError::invalid_function(other)),
        }
    }

    /// Length of a normal response PDU body (after the function code).
    pub fn expected_response_body_len(&self) -> ModbusResult<usize> {
        match self.function_code {
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS => Ok(1 + usize::from(self.count).div_ceil(8)),
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
                Ok(1 + usize::from(self.count) * 2)
            }
            FC_WRITE_SINGLE_COIL
            | FC_WRITE_SINGLE_REGISTER
            | FC_WRITE_MULTIPLE_COILS
            | FC_WRITE_MULTIPLE_REGISTERS => Ok(4),
            other => Err(ModbusError::invalid_function(other)),
        }
    }
}

/// A validated, non-exception response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub station: u8,
    pub function_code: u8,
    pub transaction_id: Option<u16>,
    /// PDU bytes after the function code.
    pub data: Vec<u8>,
}

impl ResponseFrame {
    /// Data bytes of a read response, without the byte count.
    pub fn values(&self) -> &[u8] {
        if is_read_function(self.function_code) && !self.data.is_empty() {
            &self.data[1..]
        } else {
            &[]
        }
    }
}

struct RawFrame {
    station: u8,
    transaction_id: Option<u16>,
    pdu: Vec<u8>,
}

// ============================================================================
// Codec
// ============================================================================

/// Wire framing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameCodec {
    Tcp,
    Rtu,
    Ascii,
}

impl FrameCodec {
    pub fn name(&self) -> &'static str {
        match self {
            FrameCodec::Tcp => "TCP",
            FrameCodec::Rtu => "RTU",
            FrameCodec::Ascii => "ASCII",
        }
    }

    /// Encode a request. `transaction_id` is only used by TCP.
    ///
    /// ```rust
    /// use modbus_batch::{FrameCodec, RequestFrame};
    ///
    /// let frame = FrameCodec::Rtu
    ///     .encode_request(&RequestFrame::read(1, 0x03, 100, 1), 0)
    ///     .unwrap();
    /// assert_eq!(&frame[..6], &[0x01, 0x03, 0x00, 0x64, 0x00, 0x01]);
    /// ```
    pub fn encode_request(&self, request: &RequestFrame, transaction_id: u16) -> ModbusResult<Bytes> {
        let pdu = request.to_pdu()?;
        self.wrap(request.station, pdu.as_slice(), transaction_id)
    }

    /// Encode a response PDU. Used by device simulators and fuzzing.
    pub fn encode_response(&self, station: u8, pdu: &[u8], transaction_id: u16) -> ModbusResult<Bytes> {
        self.wrap(station, pdu, transaction_id)
    }

    /// Decode and validate a response to `request`.
    ///
    /// Order of checks: framing and checksum, transaction id, station,
    /// exception flag, function code, then payload shape.
    pub fn decode_response(
        &self,
        frame: &[u8],
        request: &RequestFrame,
        transaction_id: u16,
    ) -> ModbusResult<ResponseFrame> {
        let raw = self.unwrap(frame)?;

        if let Some(received) = raw.transaction_id {
            if received != transaction_id {
                return Err(ModbusError::protocol(format!(
                    "transaction id mismatch: expected {}, got {}",
                    transaction_id, received
                )));
            }
        }
        if raw.station != request.station {
            return Err(ModbusError::protocol(format!(
                "station mismatch: expected {}, got {}",
                request.station, raw.station
            )));
        }

        let fc = raw.pdu[0];
        if fc & EXCEPTION_FLAG != 0 {
            if raw.pdu.len() < 2 {
                return Err(ModbusError::protocol("exception response without code"));
            }
            return Err(ModbusError::device_exception(fc, raw.pdu[1]));
        }
        if fc != request.function_code {
            return Err(ModbusError::protocol(format!(
                "unexpected function code: expected 0x{:02X}, got 0x{:02X}",
                request.function_code, fc
            )));
        }

        let data = raw.pdu[1..].to_vec();
        validate_body(request, &data)?;

        Ok(ResponseFrame {
            station: raw.station,
            function_code: fc,
            transaction_id: raw.transaction_id,
            data,
        })
    }

    /// Decode a request frame. Returns the request and its TCP transaction id.
    pub fn decode_request(&self, frame: &[u8]) -> ModbusResult<(RequestFrame, Option<u16>)> {
        let raw = self.unwrap(frame)?;
        let pdu = &raw.pdu;
        let fc = pdu[0];
        let field = |at: usize| -> ModbusResult<u16> {
            pdu.get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| ModbusError::protocol("truncated request PDU"))
        };
        let address = field(1)?;
        let request = match fc {
            FC_READ_COILS..=FC_READ_INPUT_REGISTERS => {
                RequestFrame::read(raw.station, fc, address, field(3)?)
            }
            FC_WRITE_SINGLE_COIL | FC_WRITE_SINGLE_REGISTER => RequestFrame {
                station: raw.station,
                function_code: fc,
                address,
                count: 1,
                payload: pdu[3..].to_vec(),
            },
            FC_WRITE_MULTIPLE_COILS | FC_WRITE_MULTIPLE_REGISTERS => {
                let count = field(3)?;
                let byte_count = usize::from(
                    *pdu.get(5)
                        .ok_or_else(|| ModbusError::protocol("truncated request PDU"))?,
                );
                if pdu.len() != 6 + byte_count {
                    return Err(ModbusError::protocol("request byte count mismatch"));
                }
                RequestFrame {
                    station: raw.station,
                    function_code: fc,
                    address,
                    count,
                    payload: pdu[6..].to_vec(),
                }
            }
            other => return Err(ModbusError::invalid_function(other)),
        };
        // Re-validate shape through the PDU builder.
        request.to_pdu()?;
        Ok((request, raw.transaction_id))
    }

    /// Bytes to read before the response length is known.
    pub fn response_header_len(&self) -> usize {
        match self {
            FrameCodec::Tcp => MBAP_HEADER_LEN + 1,
            FrameCodec::Rtu => 2,
            FrameCodec::Ascii => 1 + 4,
        }
    }

    /// Bytes still to read after the header to complete the response.
    pub fn response_remaining_len(&self, header: &[u8], request: &RequestFrame) -> ModbusResult<usize> {
        if header.len() < self.response_header_len() {
            return Err(ModbusError::protocol(format!(
                "{} header needs {} bytes, got {}",
                self.name(),
                self.response_header_len(),
                header.len()
            )));
        }
        match self {
            FrameCodec::Tcp => {
                let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
                if !(2..=MAX_MBAP_LENGTH).contains(&length) {
                    return Err(ModbusError::protocol(format!(
                        "invalid MBAP length {}",
                        length
                    )));
                }
                Ok(MBAP_LENGTH_PREFIX + length - self.response_header_len())
            }
            FrameCodec::Rtu => {
                if header[1] & EXCEPTION_FLAG != 0 {
                    Ok(1 + CRC_LEN)
                } else {
                    Ok(request.expected_response_body_len()? + CRC_LEN)
                }
            }
            FrameCodec::Ascii => {
                if header[0] != ASCII_START {
                    return Err(ModbusError::protocol("missing ASCII start character"));
                }
                let fc = from_ascii_hex(&header[3..5])?[0];
                let body = if fc & EXCEPTION_FLAG != 0 {
                    1
                } else {
                    request.expected_response_body_len()?
                };
                // body + LRC, hex encoded, then CRLF
                Ok((body + 1) * 2 + ASCII_END.len())
            }
        }
    }

    fn wrap(&self, station: u8, pdu: &[u8], transaction_id: u16) -> ModbusResult<Bytes> {
        if pdu.is_empty() || pdu.len() > MAX_PDU_SIZE {
            return Err(ModbusError::protocol(format!(
                "PDU length {} outside 1..={}",
                pdu.len(),
                MAX_PDU_SIZE
            )));
        }
        let frame = match self {
            FrameCodec::Tcp => {
                let mut buf = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
                buf.put_u16(transaction_id);
                buf.put_u16(MODBUS_PROTOCOL_ID);
                buf.put_u16((pdu.len() + 1) as u16);
                buf.put_u8(station);
                buf.put_slice(pdu);
                buf
            }
            FrameCodec::Rtu => {
                let mut buf = BytesMut::with_capacity(1 + pdu.len() + CRC_LEN);
                buf.put_u8(station);
                buf.put_slice(pdu);
                let crc = crc16(&buf);
                buf.put_u16_le(crc);
                buf
            }
            FrameCodec::Ascii => {
                let mut raw = Vec::with_capacity(pdu.len() + 2);
                raw.push(station);
                raw.extend_from_slice(pdu);
                raw.push(lrc(&raw));
                let mut buf = BytesMut::with_capacity(1 + raw.len() * 2 + ASCII_END.len());
                buf.put_u8(ASCII_START);
                buf.put_slice(&to_ascii_hex(&raw));
                buf.put_slice(&ASCII_END);
                buf
            }
        };
        Ok(frame.freeze())
    }

    fn unwrap(&self, frame: &[u8]) -> ModbusResult<RawFrame> {
        match self {
            FrameCodec::Tcp => {
                if frame.len() < MBAP_HEADER_LEN + 1 {
                    return Err(ModbusError::protocol(format!(
                        "TCP frame too short: {} bytes",
                        frame.len()
                    )));
                }
                let transaction_id = u16::from_be_bytes([frame[0], frame[1]]);
                let protocol_id = u16::from_be_bytes([frame[2], frame[3]]);
                if protocol_id != MODBUS_PROTOCOL_ID {
                    return Err(ModbusError::protocol(format!(
                        "invalid protocol id {}",
                        protocol_id
                    )));
                }
                let length = usize::from(u16::from_be_bytes([frame[4], frame[5]]));
                if length > MAX_MBAP_LENGTH || length != frame.len() - MBAP_LENGTH_PREFIX {
                    return Err(ModbusError::protocol(format!(
                        "MBAP length {} does not match frame of {} bytes",
                        length,
                        frame.len()
                    )));
                }
                Ok(RawFrame {
                    station: frame[6],
                    transaction_id: Some(transaction_id),
                    pdu: frame[MBAP_HEADER_LEN..].to_vec(),
                })
            }
            FrameCodec::Rtu => {
                if frame.len() < 2 + CRC_LEN {
                    return Err(ModbusError::protocol(format!(
                        "RTU frame too short: {} bytes",
                        frame.len()
                    )));
                }
                if frame.len() > 1 + MAX_PDU_SIZE + CRC_LEN {
                    return Err(ModbusError::protocol("RTU frame too large"));
                }
                let (body, tail) = frame.split_at(frame.len() - CRC_LEN);
                let expected = crc16(body);
                let actual = u16::from_le_bytes([tail[0], tail[1]]);
                if expected != actual {
                    return Err(ModbusError::Checksum {
                        kind: ChecksumKind::Crc16,
                        expected,
                        actual,
                    });
                }
                Ok(RawFrame {
                    station: body[0],
                    transaction_id: None,
                    pdu: body[1..].to_vec(),
                })
            }
            FrameCodec::Ascii => {
                if frame.len() < 1 + 6 + ASCII_END.len() {
                    return Err(ModbusError::protocol(format!(
                        "ASCII frame too short: {} bytes",
                        frame.len()
                    )));
                }
                if frame[0] != ASCII_START {
                    return Err(ModbusError::protocol("missing ASCII start character"));
                }
                if !frame.ends_with(&ASCII_END) {
                    return Err(ModbusError::protocol("missing ASCII CRLF terminator"));
                }
                let raw = from_ascii_hex(&frame[1..frame.len() - ASCII_END.len()])?;
                if raw.len() > 1 + MAX_PDU_SIZE + 1 {
                    return Err(ModbusError::protocol("ASCII frame too large"));
                }
                let (last, body) = raw
                    .split_last()
                    .ok_or_else(|| ModbusError::protocol("empty ASCII frame"))?;
                let expected = lrc(body);
                if expected != *last {
                    return Err(ModbusError::Checksum {
                        kind: ChecksumKind::Lrc,
                        expected: u16::from(expected),
                        actual: u16::from(*last),
                    });
                }
                Ok(RawFrame {
                    station: body[0],
                    transaction_id: None,
                    pdu: body[1..].to_vec(),
                })
            }
        }
    }
}

impl std::fmt::Display for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn validate_body(request: &RequestFrame, data: &[u8]) -> ModbusResult<()> {
    let expected = request.expected_response_body_len()?;
    if data.len() != expected {
        return Err(ModbusError::protocol(format!(
            "FC{:02X} response body is {} bytes, expected {}",
            request.function_code,
            data.len(),
            expected
        )));
    }
    if is_read_function(request.function_code) {
        if usize::from(data[0]) != expected - 1 {
            return Err(ModbusError::protocol(format!(
                "byte count {} does not match {} requested",
                data[0], request.count
            )));
        }
        return Ok(());
    }

    let echoed_address = u16::from_be_bytes([data[0], data[1]]);
    if echoed_address != request.address {
        return Err(ModbusError::protocol(format!(
            "write echo address {} differs from {}",
            echoed_address, request.address
        )));
    }
    let echoed = &data[2..4];
    let matches = match request.function_code {
        FC_WRITE_SINGLE_COIL | FC_WRITE_SINGLE_REGISTER => echoed == request.payload.as_slice(),
        _ => echoed == request.count.to_be_bytes(),
    };
    if !matches {
        return Err(ModbusError::protocol(format!(
            "write echo {:02X}{:02X} does not match request",
            echoed[0], echoed[1]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn rtu(bytes: &[u8]) -> Vec<u8> {
        let mut frame = bytes.to_vec();
        frame.extend_from_slice(&crc16(bytes).to_le_bytes());
        frame
    }

    #[test]
    fn test_crc16_known_value() {
        // 01 03 00 00 00 0A -> C5 CD
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xCDC5);
        assert!(validate_crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]));
        assert!(!validate_crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCC]));
    }

    #[test]
    fn test_lrc_known_value() {
        // 01 03 00 00 00 0A -> F2
        assert_eq!(lrc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xF2);
        assert!(validate_lrc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xF2]));
        assert!(!validate_lrc(&[]));
    }

    #[test]
    fn test_ascii_hex() {
        assert_eq!(to_ascii_hex(&[0x01, 0xAF]), b"01AF".to_vec());
        assert_eq!(from_ascii_hex(b"01af").unwrap(), vec![0x01, 0xAF]);
        assert!(from_ascii_hex(b"0").is_err());
        assert!(from_ascii_hex(b"0G").is_err());
    }

    #[test]
    fn test_transaction_id_wraps_mod_255() {
        assert_eq!(next_transaction_id(0), 1);
        assert_eq!(next_transaction_id(253), 254);
        assert_eq!(next_transaction_id(254), 0);
    }

    #[test]
    fn test_rtu_simple_read_scenario() {
        let request = RequestFrame::read(1, 0x03, 100, 1);
        let frame = FrameCodec::Rtu.encode_request(&request, 0).unwrap();
        assert_eq!(&frame[..], rtu(&[0x01, 0x03, 0x00, 0x64, 0x00, 0x01]).as_slice());

        let response = rtu(&[0x01, 0x03, 0x02, 0x00, 0x2A]);
        let decoded = FrameCodec::Rtu.decode_response(&response, &request, 0).unwrap();
        assert_eq!(decoded.values(), &[0x00, 0x2A]);
    }

    #[test]
    fn test_tcp_mbap_layout() {
        let request = RequestFrame::read(0x11, 0x04, 0x0008, 2);
        let frame = FrameCodec::Tcp.encode_request(&request, 7).unwrap();
        assert_eq!(
            &frame[..],
            &[0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x11, 0x04, 0x00, 0x08, 0x00, 0x02]
        );
    }

    #[test]
    fn test_tcp_decode_checks_transaction_and_protocol() {
        let request = RequestFrame::read(1, 0x03, 0, 1);
        let good = [0x00, 0x05, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x12, 0x34];
        let decoded = FrameCodec::Tcp.decode_response(&good, &request, 5).unwrap();
        assert_eq!(decoded.transaction_id, Some(5));
        assert_eq!(decoded.values(), &[0x12, 0x34]);

        assert!(FrameCodec::Tcp.decode_response(&good, &request, 6).is_err());

        let mut bad_proto = good;
        bad_proto[3] = 1;
        assert!(FrameCodec::Tcp.decode_response(&bad_proto, &request, 5).is_err());

        let mut bad_len = good;
        bad_len[5] = 9;
        assert!(FrameCodec::Tcp.decode_response(&bad_len, &request, 5).is_err());
    }

    #[test]
    fn test_ascii_encode_layout() {
        let request = RequestFrame::read(1, 0x03, 0, 10);
        let frame = FrameCodec::Ascii.encode_request(&request, 0).unwrap();
        assert_eq!(&frame[..], b":01030000000AF2\r\n");
    }

    #[test]
    fn test_ascii_decode_and_lrc_failure() {
        let request = RequestFrame::read(1, 0x03, 0, 1);
        let response = FrameCodec::Ascii
            .encode_response(1, &[0x03, 0x02, 0x00, 0x07], 0)
            .unwrap();
        let decoded = FrameCodec::Ascii.decode_response(&response, &request, 0).unwrap();
        assert_eq!(decoded.values(), &[0x00, 0x07]);

        let mut corrupted = response.to_vec();
        corrupted[8] = b'9';
        let err = FrameCodec::Ascii
            .decode_response(&corrupted, &request, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumError);

        let mut no_crlf = response.to_vec();
        no_crlf.pop();
        no_crlf.push(b'X');
        assert!(FrameCodec::Ascii.decode_response(&no_crlf, &request, 0).is_err());
    }

    #[test]
    fn test_exception_response_is_device_exception() {
        let request = RequestFrame::read(1, 0x03, 0, 1);
        let response = rtu(&[0x01, 0x83, 0x02]);
        let err = FrameCodec::Rtu.decode_response(&response, &request, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceException(2));
    }

    #[test]
    fn test_crc_mismatch_is_checksum_error() {
        let request = RequestFrame::read(1, 0x03, 100, 1);
        let mut response = rtu(&[0x01, 0x03, 0x02, 0x00, 0x2A]);
        response[4] ^= 0x01;
        let err = FrameCodec::Rtu.decode_response(&response, &request, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumError);
    }

    #[test]
    fn test_response_validation() {
        let request = RequestFrame::read(1, 0x03, 100, 2);
        // wrong station
        let wrong_station = rtu(&[0x02, 0x03, 0x04, 0, 1, 0, 2]);
        assert!(FrameCodec::Rtu.decode_response(&wrong_station, &request, 0).is_err());
        // wrong function
        let wrong_fc = rtu(&[0x01, 0x04, 0x04, 0, 1, 0, 2]);
        assert!(FrameCodec::Rtu.decode_response(&wrong_fc, &request, 0).is_err());
        // short data
        let short = rtu(&[0x01, 0x03, 0x02, 0, 1]);
        assert!(FrameCodec::Rtu.decode_response(&short, &request, 0).is_err());
    }

    #[test]
    fn test_write_echo_validation() {
        let request = RequestFrame::write_single_coil(1, 5, true);
        let frame = FrameCodec::Rtu.encode_request(&request, 0).unwrap();
        assert_eq!(&frame[..6], &[0x01, 0x05, 0x00, 0x05, 0xFF, 0x00]);

        let echo = frame.to_vec();
        assert!(FrameCodec::Rtu.decode_response(&echo, &request, 0).is_ok());

        let wrong = rtu(&[0x01, 0x05, 0x00, 0x05, 0x00, 0x00]);
        assert!(FrameCodec::Rtu.decode_response(&wrong, &request, 0).is_err());
    }

    #[test]
    fn test_single_coil_off_payload() {
        let request = RequestFrame::write_single_coil(1, 5, false);
        assert_eq!(request.payload, vec![0x00, 0x00]);
    }

    #[test]
    fn test_request_round_trip_through_server_side() {
        let request = RequestFrame::write_multiple_coils(3, 20, &[true, false, true]).unwrap();
        for codec in [FrameCodec::Tcp, FrameCodec::Rtu, FrameCodec::Ascii] {
            let frame = codec.encode_request(&request, 9).unwrap();
            let (decoded, tx) = codec.decode_request(&frame).unwrap();
            assert_eq!(decoded, request);
            assert_eq!(tx.is_some(), codec == FrameCodec::Tcp);
        }
    }

    #[test]
    fn test_response_sizing() {
        let request = RequestFrame::read(1, 0x03, 0, 3);
        // RTU normal: station fc | count + 6 data + crc
        assert_eq!(FrameCodec::Rtu.response_header_len(), 2);
        assert_eq!(
            FrameCodec::Rtu.response_remaining_len(&[0x01, 0x03], &request).unwrap(),
            1 + 6 + 2
        );
        // RTU exception
        assert_eq!(
            FrameCodec::Rtu.response_remaining_len(&[0x01, 0x83], &request).unwrap(),
            3
        );
        // TCP from length field
        let header = [0, 1, 0, 0, 0, 9, 1, 3];
        assert_eq!(FrameCodec::Tcp.response_remaining_len(&header, &request).unwrap(), 7);
        // ASCII normal and exception
        assert_eq!(
            FrameCodec::Ascii.response_remaining_len(b":0103", &request).unwrap(),
            (7 + 1) * 2 + 2
        );
        assert_eq!(
            FrameCodec::Ascii.response_remaining_len(b":0183", &request).unwrap(),
            6
        );
        // coil read
        let coils = RequestFrame::read(1, 0x01, 0, 10);
        assert_eq!(coils.expected_response_body_len().unwrap(), 3);
    }

    #[test]
    fn test_infer_function_code_table() {
        use RegisterType::*;
        assert_eq!(infer_function_code(DataType::Bool, false, Coil).unwrap(), 0x01);
        assert_eq!(infer_function_code(DataType::Bool, true, Coil).unwrap(), 0x05);
        assert_eq!(infer_function_code(DataType::Byte, true, Coil).unwrap(), 0x0F);
        assert_eq!(infer_function_code(DataType::Bool, false, DiscreteInput).unwrap(), 0x02);
        assert_eq!(infer_function_code(DataType::UInt16, false, HoldingRegister).unwrap(), 0x03);
        assert_eq!(infer_function_code(DataType::UInt16, true, HoldingRegister).unwrap(), 0x06);
        assert_eq!(infer_function_code(DataType::Byte, true, HoldingRegister).unwrap(), 0x06);
        assert_eq!(infer_function_code(DataType::Float, true, HoldingRegister).unwrap(), 0x10);
        assert_eq!(infer_function_code(DataType::Int16, false, InputRegister).unwrap(), 0x04);

        let err = infer_function_code(DataType::UInt16, true, InputRegister).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAddress);
        assert!(infer_function_code(DataType::Bool, true, DiscreteInput).is_err());
    }

    #[test]
    fn test_encode_rejects_invalid_requests() {
        let oversized = RequestFrame::read(1, 0x03, 0, 126);
        assert!(FrameCodec::Rtu.encode_request(&oversized, 0).is_err());
        let bad_fc = RequestFrame::read(1, 0x2B, 0, 1);
        assert!(FrameCodec::Tcp.encode_request(&bad_fc, 0).is_err());
    }
}
