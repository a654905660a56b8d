//! Simulated Modbus device shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use modbus_batch::codec::unpack_coils_msb;
use modbus_batch::{FrameCodec, ModbusError, ModbusResult, RequestFrame, StreamResource};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Register addresses at or above this answer with "illegal data address".
pub const UNMAPPED_FROM: u16 = 60_000;

/// Data tables of a simulated device.
#[derive(Debug, Default)]
pub struct Bank {
    pub registers: HashMap<u16, u16>,
    pub coils: HashMap<u16, bool>,
}

impl Bank {
    pub fn shared() -> Arc<Mutex<Bank>> {
        Arc::new(Mutex::new(Bank::default()))
    }

    pub fn with_registers(values: &[(u16, u16)]) -> Arc<Mutex<Bank>> {
        let bank = Self::shared();
        bank.lock().unwrap().registers.extend(values.iter().copied());
        bank
    }

    /// Execute one request and return the response PDU.
    pub fn handle(&mut self, request: &RequestFrame) -> Vec<u8> {
        let fc = request.function_code;
        if u32::from(request.address) + u32::from(request.count) > u32::from(UNMAPPED_FROM) {
            return vec![fc | 0x80, 0x02];
        }
        let echo = |tail: &[u8]| -> Vec<u8> {
            let mut pdu = vec![fc];
            pdu.extend_from_slice(&request.address.to_be_bytes());
            pdu.extend_from_slice(tail);
            pdu
        };
        match fc {
            0x01 | 0x02 => {
                let states: Vec<bool> = (0..request.count)
                    .map(|i| self.coils.get(&(request.address + i)).copied().unwrap_or(false))
                    .collect();
                // Read responses pack LSB-first.
                let mut packed = vec![0u8; states.len().div_ceil(8)];
                for (i, on) in states.iter().enumerate() {
                    if *on {
                        packed[i / 8] |= 1 << (i % 8);
                    }
                }
                let mut pdu = vec![fc, packed.len() as u8];
                pdu.extend(packed);
                pdu
            }
            0x03 | 0x04 => {
                let mut pdu = vec![fc, (request.count * 2) as u8];
                for i in 0..request.count {
                    let value = self.registers.get(&(request.address + i)).copied().unwrap_or(0);
                    pdu.extend_from_slice(&value.to_be_bytes());
                }
                pdu
            }
            0x05 => {
                self.coils.insert(request.address, request.payload[0] == 0xFF);
                echo(&request.payload)
            }
            0x06 => {
                let value = u16::from_be_bytes([request.payload[0], request.payload[1]]);
                self.registers.insert(request.address, value);
                echo(&request.payload)
            }
            0x0F => {
                let states = unpack_coils_msb(&request.payload, usize::from(request.count));
                for (i, on) in states.into_iter().enumerate() {
                    self.coils.insert(request.address + i as u16, on);
                }
                echo(&request.count.to_be_bytes())
            }
            0x10 => {
                for (i, pair) in request.payload.chunks_exact(2).enumerate() {
                    self.registers
                        .insert(request.address + i as u16, u16::from_be_bytes([pair[0], pair[1]]));
                }
                echo(&request.count.to_be_bytes())
            }
            _ => vec![fc | 0x80, 0x01],
        }
    }
}

/// In-memory device answering each complete frame it is sent.
pub struct SimulatedDevice {
    codec: FrameCodec,
    bank: Arc<Mutex<Bank>>,
    connected: bool,
    silent: bool,
    pending: VecDeque<u8>,
    pub sends: Arc<AtomicUsize>,
    pub receives: Arc<AtomicUsize>,
}

impl SimulatedDevice {
    pub fn new(codec: FrameCodec, bank: Arc<Mutex<Bank>>) -> Self {
        Self {
            codec,
            bank,
            connected: false,
            silent: false,
            pending: VecDeque::new(),
            sends: Arc::new(AtomicUsize::new(0)),
            receives: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A device that never answers; every receive times out.
    pub fn silent(codec: FrameCodec) -> Self {
        Self {
            silent: true,
            ..Self::new(codec, Bank::shared())
        }
    }
}

impl StreamResource for SimulatedDevice {
    async fn connect(&mut self) -> ModbusResult<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> ModbusResult<()> {
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, data: &[u8]) -> ModbusResult<()> {
        if !self.connected {
            return Err(ModbusError::connection("device offline"));
        }
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.silent {
            return Ok(());
        }
        let (request, tx) = self.codec.decode_request(data)?;
        let pdu = self.bank.lock().unwrap().handle(&request);
        let frame = self.codec.encode_response(request.station, &pdu, tx.unwrap_or(0))?;
        self.pending.extend(frame.iter().copied());
        Ok(())
    }

    async fn receive(&mut self, buffer: &mut [u8]) -> ModbusResult<usize> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        if self.pending.is_empty() {
            return Err(ModbusError::timeout("receive", 50));
        }
        // Hand out at most 3 bytes per read to exercise reassembly.
        let n = buffer.len().min(self.pending.len()).min(3);
        for (slot, byte) in buffer.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn peer(&self) -> String {
        format!("simulated {}", self.codec.name())
    }
}

/// Serve the bank over Modbus TCP on an ephemeral local port.
pub async fn serve_tcp(bank: Arc<Mutex<Bank>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let bank = bank.clone();
            tokio::spawn(async move {
                loop {
                    let mut header = [0u8; 6];
                    if socket.read_exact(&mut header).await.is_err() {
                        return;
                    }
                    let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
                    let mut rest = vec![0u8; length];
                    if socket.read_exact(&mut rest).await.is_err() {
                        return;
                    }
                    let frame = [header.to_vec(), rest].concat();
                    let Ok((request, tx)) = FrameCodec::Tcp.decode_request(&frame) else {
                        return;
                    };
                    let pdu = bank.lock().unwrap().handle(&request);
                    let Ok(reply) = FrameCodec::Tcp.encode_response(request.station, &pdu, tx.unwrap_or(0)) else {
                        return;
                    };
                    if socket.write_all(&reply).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

