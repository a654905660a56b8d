#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use modbus_batch::{FrameCodec, RequestFrame};

#[derive(Debug, Arbitrary)]
struct Input {
    codec: u8,
    station: u8,
    function_code: u8,
    address: u16,
    count: u16,
    transaction_id: u16,
    frame: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let codec = match input.codec % 3 {
        0 => FrameCodec::Tcp,
        1 => FrameCodec::Rtu,
        _ => FrameCodec::Ascii,
    };
    let request = RequestFrame::read(
        input.station,
        input.function_code,
        input.address,
        input.count,
    );

    // Arbitrary bytes must decode to a response or an error, never panic.
    if let Ok(response) = codec.decode_response(&input.frame, &request, input.transaction_id) {
        assert_eq!(response.station, request.station);
        assert_eq!(response.function_code, request.function_code);
        let _ = response.values();
    }
    let _ = codec.response_remaining_len(&input.frame, &request);
});
