#![no_main]

use libfuzzer_sys::fuzz_target;
use streamlog_core::{Node, StreamId, SystemAllocator};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must either decode into a node that passes validation,
    // or fail with an error. Never panic.
    let key = StreamId::new(1, 0);
    if let Ok(node) = Node::decode(key, data, &SystemAllocator) {
        let _ = node.records();
        let _ = node.last_id();
        let _ = node.master_fields();

        // Walking backwards must visit as many records as walking forwards
        let mut reverse = 0u64;
        let mut pos = node.last_record().ok().flatten();
        while let Some(p) = pos {
            reverse += 1;
            pos = node.prev_record(p).ok().flatten();
        }
        let header = node.header().expect("validated node has a header");
        assert_eq!(reverse, header.entries());

        let _ = node.compact(&SystemAllocator);
    }
});
