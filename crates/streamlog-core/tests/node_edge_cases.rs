//! Edge-case tests for the node codec, stream IDs, and the packed element format.

use bytes::Bytes;
use proptest::prelude::*;
use streamlog_core::pack::{self, Cursor, Element};
use streamlog_core::{BoundedAllocator, Error, Node, RecordFlags, StreamId, SystemAllocator};

fn id(ms: u64, seq: u64) -> StreamId {
    StreamId::new(ms, seq)
}

// ---------------------------------------------------------------
// Stream IDs
// ---------------------------------------------------------------

#[test]
fn stream_id_orders_by_ms_then_seq() {
    assert!(id(1, 99) < id(2, 0));
    assert!(id(2, 0) < id(2, 1));
    assert!(StreamId::MIN < id(0, 1));
    assert!(id(u64::MAX, u64::MAX - 1) < StreamId::MAX);
}

#[test]
fn stream_id_encoding_sorts_like_ids() {
    let ids = [id(0, 0), id(0, 1), id(1, 0), id(255, 7), id(256, 0), StreamId::MAX];
    for pair in ids.windows(2) {
        assert!(pair[0].encode() < pair[1].encode());
    }
}

#[test]
fn stream_id_display_and_parse() {
    let parsed: StreamId = "1700000000000-3".parse().unwrap();
    assert_eq!(parsed, id(1_700_000_000_000, 3));
    assert_eq!(parsed.to_string(), "1700000000000-3");
    assert_eq!("42".parse::<StreamId>().unwrap(), id(42, 0));
    assert!("1-2-3".parse::<StreamId>().is_err());
    assert!("abc".parse::<StreamId>().is_err());
}

#[test]
fn stream_id_next_respects_clock_and_exhaustion() {
    assert_eq!(id(5, 3).next(10), Some(id(10, 0)));
    assert_eq!(id(5, 3).next(5), Some(id(5, 4)));
    // A clock behind the last ID never moves IDs backwards
    assert_eq!(id(5, 3).next(1), Some(id(5, 4)));
    assert_eq!(id(5, u64::MAX).next(5), Some(id(6, 0)));
    assert_eq!(StreamId::MAX.next(u64::MAX), None);
}

// ---------------------------------------------------------------
// Node construction and dictionary compression
// ---------------------------------------------------------------

#[test]
fn node_of_identical_schemas_is_compact() {
    let mut node = Node::new(id(1, 0), &[("sensor", "a"), ("reading", "1")], &SystemAllocator).unwrap();
    for seq in 1..50u64 {
        let reading = seq.to_string();
        let flags = node
            .append(id(1, seq), &[("sensor", "a"), ("reading", reading.as_str())], &SystemAllocator)
            .unwrap();
        assert_eq!(flags, RecordFlags::SAME_FIELDS);
    }

    let records = node.records().unwrap();
    assert_eq!(records.len(), 50);
    assert_eq!(records[49].get(b"reading").unwrap(), &Bytes::from_static(b"49"));
    // Field names are stored once, in the master entry
    let occurrences = node
        .as_bytes()
        .windows(b"sensor".len())
        .filter(|w| *w == b"sensor")
        .count();
    assert_eq!(occurrences, 1);
}

#[test]
fn node_with_zero_field_records() {
    let empty: [(&str, &str); 0] = [];
    let mut node = Node::new(id(1, 0), &empty, &SystemAllocator).unwrap();
    assert_eq!(
        node.append(id(1, 1), &empty, &SystemAllocator).unwrap(),
        RecordFlags::SAME_FIELDS
    );
    assert_eq!(
        node.append(id(1, 2), &[("a", "b")], &SystemAllocator).unwrap(),
        RecordFlags::NONE
    );

    let records = node.records().unwrap();
    assert!(records[0].fields.is_empty());
    assert!(records[1].fields.is_empty());
    assert_eq!(records[2].fields.len(), 1);
    node.validate().unwrap();
}

#[test]
fn node_binary_payloads_roundtrip() {
    let value = vec![0u8, 255, 0, 10, 13];
    let fields = vec![(Bytes::from_static(b"\0key"), Bytes::from(value.clone()))];
    let node = Node::new(id(9, 9), &fields, &SystemAllocator).unwrap();
    let records = node.records().unwrap();
    assert_eq!(records[0].fields, fields);
    assert_eq!(records[0].id, id(9, 9));
}

#[test]
fn node_large_deltas() {
    let mut node = Node::new(id(0, u64::MAX - 1), &[("f", "v")], &SystemAllocator).unwrap();
    node.append(id(0, u64::MAX), &[("f", "v")], &SystemAllocator).unwrap();
    node.append(id(u64::MAX / 2, 0), &[("f", "v")], &SystemAllocator).unwrap();
    node.append(id(u64::MAX, 0), &[("f", "v")], &SystemAllocator).unwrap();

    let ids: Vec<_> = node.records().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(
        ids,
        vec![id(0, u64::MAX - 1), id(0, u64::MAX), id(u64::MAX / 2, 0), id(u64::MAX, 0)]
    );
    node.validate().unwrap();
}

// ---------------------------------------------------------------
// Corruption
// ---------------------------------------------------------------

#[test]
fn decode_rejects_empty_and_garbage() {
    assert!(Node::decode(id(1, 0), &[], &SystemAllocator).is_err());
    assert!(Node::decode(id(1, 0), &[0xFF; 32], &SystemAllocator).is_err());
}

#[test]
fn decode_rejects_counter_mismatch() {
    let mut node = Node::new(id(1, 0), &[("f", "v")], &SystemAllocator).unwrap();
    node.append(id(1, 1), &[("f", "v")], &SystemAllocator).unwrap();

    // Rewrite the valid counter from 2 to 3
    let body = node.as_bytes();
    let mut cursor = Cursor::new(body, 0);
    cursor.next().unwrap();
    let mut damaged = Vec::new();
    pack::put_int(&mut damaged, 3);
    damaged.extend_from_slice(&body[cursor.position()..]);

    let err = Node::decode(id(1, 0), &damaged, &SystemAllocator).unwrap_err();
    assert!(matches!(err, Error::CorruptNode(_)));
}

#[test]
fn decode_rejects_unknown_flags() {
    let node = Node::new(id(1, 0), &[("f", "v")], &SystemAllocator).unwrap();
    let header = node.header().unwrap();
    let mut bytes = node.as_bytes().to_vec();
    // Flags element: tag 0, zigzag(2) = 4, back-length 2
    assert_eq!(&bytes[header.first_record..header.first_record + 3], &[0, 4, 2]);
    bytes[header.first_record + 1] = 8;
    assert!(Node::decode(id(1, 0), &bytes, &SystemAllocator).is_err());
}

#[test]
fn decode_failure_returns_reserved_memory() {
    let alloc = BoundedAllocator::new(1024);
    assert!(Node::decode(id(1, 0), &[0xFF; 64], &alloc).is_err());
    assert_eq!(alloc.used(), 0);
}

#[test]
fn cursor_reads_master_terminator() {
    let node = Node::new(id(1, 0), &[("f", "v")], &SystemAllocator).unwrap();
    let header = node.header().unwrap();
    let mut cursor = node.cursor(header.first_record);
    assert!(cursor.prev().unwrap());
    assert_eq!(cursor.read().unwrap(), Element::Int(0));
}

// ---------------------------------------------------------------
// Properties
// ---------------------------------------------------------------

proptest! {
    #[test]
    fn node_walks_agree_after_deletes(
        records in prop::collection::vec(
            prop::collection::vec(
                (prop::collection::vec(any::<u8>(), 0..6), prop::collection::vec(any::<u8>(), 0..200)),
                0..4,
            ),
            1..30,
        ),
        doomed in prop::collection::vec(any::<bool>(), 30),
    ) {
        let mut node = Node::new(id(1, 0), &records[0], &SystemAllocator).unwrap();
        for (i, fields) in records.iter().enumerate().skip(1) {
            node.append(id(1, i as u64), fields, &SystemAllocator).unwrap();
        }

        let header = node.header().unwrap();
        let mut positions = Vec::new();
        let mut pos = header.first_record;
        while pos < node.byte_len() {
            positions.push(pos);
            pos = node.read_record(pos, &header).unwrap().next;
        }
        prop_assert_eq!(positions.len(), records.len());

        // Counters stay below 32 and keep a one-byte encoding, so offsets hold
        for (i, pos) in positions.iter().enumerate() {
            if doomed[i] {
                node.mark_deleted(*pos, &SystemAllocator).unwrap();
            }
        }
        prop_assert!(node.validate().is_ok());

        let live: Vec<u64> = node.records().unwrap().iter().map(|r| r.id.seq).collect();
        let expected: Vec<u64> = (0..records.len()).filter(|i| !doomed[*i]).map(|i| i as u64).collect();
        prop_assert_eq!(live, expected);

        let decoded = Node::decode(node.key(), &node.encode(), &SystemAllocator).unwrap();
        prop_assert_eq!(decoded, node);
    }
}
