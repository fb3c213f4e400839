#![no_main]

use libfuzzer_sys::fuzz_target;
use streamlog_storage::{decode_stream, encode_stream, StreamConfig, StreamId};

fuzz_target!(|data: &[u8]| {
    // The CRC makes most random inputs fail early; anything that does load
    // must behave like a normal stream.
    if let Ok(mut stream) = decode_stream(data, StreamConfig::default()) {
        let _ = stream.range(StreamId::MIN, StreamId::MAX, true, None);
        let _ = encode_stream(&stream);
        let _ = stream.trim(stream.len() / 2, false);
        let _ = stream.append(&[("k", "v")], None);
    }
});
