#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_batch::{parse_address, DataType};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for is_write in [false, true] {
        if let Ok(info) = parse_address(text, None, is_write) {
            // The canonical form parses to the same point.
            let again = parse_address(&info.to_string(), Some(info.data_type), is_write)
                .expect("canonical address reparses");
            assert_eq!(again.key(), info.key());
            assert!(info.end() <= 65_536);
        }
        let _ = parse_address(text, Some(DataType::Float), is_write);
    }
});
