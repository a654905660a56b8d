#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_batch::FrameCodec;

fuzz_target!(|data: &[u8]| {
    for codec in [FrameCodec::Tcp, FrameCodec::Rtu, FrameCodec::Ascii] {
        if let Ok((request, tx)) = codec.decode_request(data) {
            // A request that decodes must encode again.
            let encoded = codec
                .encode_request(&request, tx.unwrap_or(0))
                .expect("decoded request re-encodes");
            let (again, _) = codec
                .decode_request(&encoded)
                .expect("re-encoded request decodes");
            assert_eq!(again, request);
        }
    }
});
