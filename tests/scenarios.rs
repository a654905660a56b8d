//! End-to-end scenarios against a simulated device.

mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{serve_tcp, Bank, SimulatedDevice};
use modbus_batch::frame::crc16;
use modbus_batch::{
    ClientConfig, DataType, EndianFormat, ErrorKind, FrameCodec, MessageTransport, ModbusClient,
    ModbusValue, RequestFrame, StreamTimeouts, TransportConfig,
};

const CODECS: [FrameCodec; 3] = [FrameCodec::Tcp, FrameCodec::Rtu, FrameCodec::Ascii];

fn simulated(codec: FrameCodec, bank: Arc<std::sync::Mutex<Bank>>) -> ModbusClient<SimulatedDevice> {
    ModbusClient::new(SimulatedDevice::new(codec, bank), ClientConfig::new(codec))
}

#[test]
fn simple_read_frames() {
    let request = RequestFrame::read(1, 0x03, 100, 1);
    let frame = FrameCodec::Rtu.encode_request(&request, 0).unwrap();
    let crc = crc16(&[0x01, 0x03, 0x00, 0x64, 0x00, 0x01]).to_le_bytes();
    assert_eq!(frame.as_ref(), &[0x01, 0x03, 0x00, 0x64, 0x00, 0x01, crc[0], crc[1]]);

    let body = [0x01, 0x03, 0x02, 0x00, 0x2A];
    let mut response = body.to_vec();
    response.extend_from_slice(&crc16(&body).to_le_bytes());
    let decoded = FrameCodec::Rtu.decode_response(&response, &request, 0).unwrap();
    assert_eq!(decoded.values(), &[0x00, 0x2A]);
}

#[tokio::test]
async fn simple_read_through_every_framing() {
    for codec in CODECS {
        let client = simulated(codec, Bank::with_registers(&[(100, 42)]));
        let outcome = client.read("1;3;100", DataType::UInt16).await;
        assert_eq!(outcome.value(), Some(&ModbusValue::U16(42)), "{}", codec.name());
        assert_eq!(outcome.trace.requests.len(), 1);
        assert_eq!(outcome.trace.responses.len(), 1);
    }
}

#[tokio::test]
async fn exception_response_is_distinguishable() {
    for codec in CODECS {
        let client = simulated(codec, Bank::shared());
        let outcome = client.read("1;3;60000", DataType::UInt16).await;
        let error = outcome.error().unwrap();
        assert_eq!(error.kind(), ErrorKind::DeviceException(2), "{}", codec.name());
        assert_eq!(error.error_code(), Some(2));
        assert_eq!(outcome.summary().error_code, Some(2));
        assert_eq!(client.stats().await.retries, 0);
    }
}

#[tokio::test]
async fn retry_exhaustion_makes_three_attempts() {
    let device = SimulatedDevice::silent(FrameCodec::Rtu);
    let receives = device.receives.clone();
    let sends = device.sends.clone();
    let transport = MessageTransport::new(
        device,
        FrameCodec::Rtu,
        TransportConfig::default().with_retries(2),
    );

    let outcome = transport
        .unicast_read(&RequestFrame::read(1, 0x03, 0, 1))
        .await;

    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::ConnectionError);
    assert!(outcome.error().unwrap().is_timeout());
    assert_eq!(receives.load(Ordering::SeqCst), 3);
    assert_eq!(sends.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.trace.requests.len(), 1);
    assert!(outcome.trace.responses.is_empty());
}

#[tokio::test]
async fn single_coil_write_payload() {
    let bank = Bank::shared();
    let client = simulated(FrameCodec::Rtu, bank.clone());
    client.write_single_coil(1, 5, true).await.unwrap();
    assert!(bank.lock().unwrap().coils[&5]);
    client.write_single_coil(1, 5, false).await.unwrap();
    assert!(!bank.lock().unwrap().coils[&5]);

    let on = RequestFrame::write_single_coil(1, 5, true);
    assert_eq!(on.payload, vec![0xFF, 0x00]);
    let off = RequestFrame::write_single_coil(1, 5, false);
    assert_eq!(off.payload, vec![0x00, 0x00]);
}

#[tokio::test]
async fn batch_read_coalesces_across_framings() {
    for codec in CODECS {
        let bank = Bank::with_registers(&[(100, 1), (101, 2), (102, 3), (105, 5)]);
        let device = SimulatedDevice::new(codec, bank);
        let sends = device.sends.clone();
        let client = ModbusClient::new(device, ClientConfig::new(codec));

        let addresses: HashMap<String, DataType> = [100, 101, 102, 105]
            .iter()
            .map(|a| (format!("1;3;{}", a), DataType::UInt16))
            .collect();
        let values = client.batch_read(&addresses).await.into_result().unwrap();

        assert_eq!(values.len(), 4);
        assert_eq!(values["1;3;105"].1, Some(ModbusValue::U16(5)));
        assert_eq!(sends.load(Ordering::SeqCst), 2, "{}", codec.name());
    }
}

#[tokio::test]
async fn batch_write_then_read_back() {
    let bank = Bank::shared();
    let config = ClientConfig::new(FrameCodec::Ascii).with_endian(EndianFormat::Dcba);
    let client = ModbusClient::new(SimulatedDevice::new(FrameCodec::Ascii, bank), config);

    let mut writes = HashMap::new();
    writes.insert("1;3;10".to_string(), (DataType::Double, ModbusValue::F64(-12.25)));
    writes.insert("1;3;20".to_string(), (DataType::String(6), ModbusValue::String("pump".into())));
    writes.insert("1;1;0".to_string(), (DataType::Bool, ModbusValue::Bool(true)));
    let written = client.batch_write(&writes).await;
    assert!(written.is_success(), "{}", written.message);

    let reads: HashMap<String, DataType> = writes.iter().map(|(a, (t, _))| (a.clone(), *t)).collect();
    let values = client.batch_read(&reads).await.into_result().unwrap();
    for (address, (_, expected)) in &writes {
        assert_eq!(values[address].1.as_ref(), Some(expected), "{}", address);
    }
}

#[tokio::test]
async fn tcp_client_against_socket_server() {
    let addr = serve_tcp(Bank::with_registers(&[(0, 7), (1, 8)])).await;
    let client = ModbusClient::tcp(
        addr.to_string(),
        StreamTimeouts::uniform(Duration::from_secs(2)),
        ClientConfig::new(FrameCodec::Tcp),
    );

    assert_eq!(client.read_holding_registers(1, 0, 2).await.unwrap(), vec![7, 8]);
    client.write_multiple_registers(1, 2, &[9, 10]).await.unwrap();
    assert_eq!(client.read_input_registers(1, 2, 2).await.unwrap(), vec![9, 10]);
    client.write_multiple_coils(1, 0, &[true, true, false]).await.unwrap();
    assert_eq!(client.read_coils(1, 0, 3).await.unwrap(), vec![true, true, false]);

    let stats = client.stats().await;
    assert_eq!(stats.requests_sent, 5);
    assert_eq!(stats.responses_received, 5);
    client.close().await.unwrap();
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn concurrent_batches_share_one_client() {
    let bank = Bank::with_registers(&[(0, 1), (40, 2)]);
    let client = Arc::new(simulated(FrameCodec::Rtu, bank));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let addresses: HashMap<String, DataType> = [
                ("1;3;0".to_string(), DataType::UInt16),
                ("1;3;40".to_string(), DataType::UInt16),
            ]
            .into_iter()
            .collect();
            client.batch_read(&addresses).await.into_result()
        }));
    }
    for task in tasks {
        let values = task.await.unwrap().unwrap();
        assert_eq!(values["1;3;0"].1, Some(ModbusValue::U16(1)));
        assert_eq!(values["1;3;40"].1, Some(ModbusValue::U16(2)));
    }
    assert_eq!(client.stats().await.requests_sent, 16);
}
