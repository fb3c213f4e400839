//! Stream Snapshots
//!
//! A snapshot is a self-contained binary image of a stream: its node chain,
//! counters and consumer groups. Node bodies are copied verbatim (optionally
//! LZ4-compressed), so loading a snapshot never re-appends records.
//!
//! ## Snapshot Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (36 bytes)                                           │
//! │ - Magic bytes: "SLOG" (4 bytes)                            │
//! │ - Version: 1 (2 bytes)                                      │
//! │ - Compression: None/Lz4 (2 bytes)                          │
//! │ - Length (8 bytes)                                          │
//! │ - Last ID (16 bytes)                                        │
//! │ - Node count (4 bytes)                                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Nodes                                                       │
//! │ - Key (16 bytes)                                            │
//! │ - Body length (4 bytes)                                     │
//! │ - Body (packed node, compressed if enabled)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Groups                                                      │
//! │ - Group count (4 bytes)                                     │
//! │ - For each group:                                           │
//! │   * Name, last delivered ID                                 │
//! │   * PEL: count, then (ID, delivery time, count, consumer)   │
//! │   * Consumers: count, then (name, seen time)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                            │
//! │ - CRC32 checksum (4 bytes)                                  │
//! │ - Magic bytes: "SLOG" again (4 bytes)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Integers are big-endian. Strings are a 4-byte length followed by UTF-8.
//! Consumer PELs are not stored: they are rebuilt from the group PEL.
//!
//! Decoding validates everything before handing back a stream: magic, version,
//! checksum, each node's structure, node ordering, the stored length, and
//! that every NACK belongs to a listed consumer.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use streamlog_core::id::STREAM_ID_LEN;
use streamlog_core::{Compression, Node, NodeAllocator, StreamId, SystemAllocator};
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::StreamConfig;
use crate::consumer::{ConsumerGroup, Nack};
use crate::error::Result;
use crate::stream::Stream;

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"SLOG";
pub const SNAPSHOT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 8 + STREAM_ID_LEN + 4;
pub const FOOTER_SIZE: usize = 4 + 4;

fn invalid(msg: impl Into<String>) -> streamlog_core::Error {
    streamlog_core::Error::InvalidSnapshot(msg.into())
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn len_u32(len: usize, what: &str) -> Result<u32> {
    Ok(u32::try_from(len).map_err(|_| invalid(format!("{what} too large: {len}")))?)
}

/// Serialize a stream, using the stream's configured node compression.
pub fn encode_stream(stream: &Stream) -> Result<Bytes> {
    let compression = stream.config.snapshot_compression;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + FOOTER_SIZE);

    buf.put_slice(&SNAPSHOT_MAGIC);
    buf.put_u16(SNAPSHOT_VERSION);
    buf.put_u16(compression as u16);
    buf.put_u64(stream.length);
    buf.put_slice(&stream.last_id.encode());
    buf.put_u32(len_u32(stream.nodes.len(), "node count")?);

    for node in stream.nodes.iter() {
        let body = compression.compress(node.as_bytes());
        buf.put_slice(&node.key().encode());
        buf.put_u32(len_u32(body.len(), "node body")?);
        buf.put_slice(&body);
    }

    let groups: Vec<(&str, &ConsumerGroup)> = stream.groups().collect();
    buf.put_u32(len_u32(groups.len(), "group count")?);
    for (name, group) in groups {
        put_str(&mut buf, name);
        buf.put_slice(&group.last_delivered_id().encode());

        buf.put_u32(len_u32(group.pending().len(), "pending entries")?);
        for (id, nack) in group.pending() {
            buf.put_slice(&id.encode());
            buf.put_u64(nack.delivery_time);
            buf.put_u64(nack.delivery_count);
            put_str(&mut buf, &nack.consumer);
        }

        let consumers: Vec<_> = group.consumers().collect();
        buf.put_u32(len_u32(consumers.len(), "consumer count")?);
        for consumer in consumers {
            put_str(&mut buf, consumer.name());
            buf.put_u64(consumer.seen_time());
        }
    }

    let crc = crc32fast::hash(&buf[..]);
    buf.put_u32(crc);
    buf.put_slice(&SNAPSHOT_MAGIC);

    info!(
        nodes = stream.nodes.len(),
        length = stream.length,
        bytes = buf.len(),
        compression = ?compression,
        "Encoded stream snapshot"
    );
    Ok(buf.freeze())
}

/// Load a snapshot with the system allocator and clock.
pub fn decode_stream(data: &[u8], config: StreamConfig) -> Result<Stream> {
    decode_stream_with(data, config, Arc::new(SystemAllocator), Arc::new(SystemClock))
}

/// Load a snapshot into a stream that uses `alloc` and `clock`.
pub fn decode_stream_with(
    data: &[u8],
    config: StreamConfig,
    alloc: Arc<dyn NodeAllocator>,
    clock: Arc<dyn Clock>,
) -> Result<Stream> {
    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(streamlog_core::Error::UnexpectedEof.into());
    }
    if data[..4] != SNAPSHOT_MAGIC {
        return Err(streamlog_core::Error::InvalidMagic.into());
    }

    let footer_start = data.len() - FOOTER_SIZE;
    let mut footer = &data[footer_start..];
    let stored_crc = footer.get_u32();
    if footer[..] != SNAPSHOT_MAGIC {
        return Err(streamlog_core::Error::InvalidMagic.into());
    }
    if stored_crc != crc32fast::hash(&data[..footer_start]) {
        return Err(streamlog_core::Error::CrcMismatch.into());
    }

    let mut reader = Reader {
        buf: &data[4..footer_start],
    };
    let version = reader.u16()?;
    if version != SNAPSHOT_VERSION {
        return Err(streamlog_core::Error::UnsupportedVersion(version).into());
    }
    let compression = Compression::try_from(reader.u16()?)?;
    let length = reader.u64()?;
    let last_id = reader.id()?;

    // Nodes are charged to `alloc` as they load; dropping the partial stream
    // on error hands them back.
    let mut stream = Stream::with_parts(config, alloc, clock);
    stream.last_id = last_id;

    let node_count = reader.u32()?;
    let mut live = 0u64;
    let mut prev_last: Option<StreamId> = None;
    for _ in 0..node_count {
        let key = reader.id()?;
        if prev_last.is_some_and(|prev| key <= prev) {
            return Err(invalid(format!("node {key} out of order")).into());
        }
        let body_len = reader.u32()? as usize;
        let body = compression.decompress(reader.take(body_len)?)?;
        let node = Node::decode(key, &body, stream.alloc.as_ref())?;
        let valid = node.valid_count()?;
        let node_last = node.last_id()?;
        stream.nodes.insert(node);

        if valid == 0 {
            return Err(invalid(format!("node {key} has no live records")).into());
        }
        if node_last.is_some_and(|last| last > last_id) {
            return Err(invalid(format!("node {key} holds IDs past the last ID {last_id}")).into());
        }
        live += valid;
        prev_last = node_last;
    }
    if live != length {
        return Err(invalid(format!(
            "header length {length} does not match {live} live records"
        ))
        .into());
    }
    stream.length = length;

    let group_count = reader.u32()?;
    for _ in 0..group_count {
        let name = reader.string()?;
        let last_delivered = reader.id()?;

        let pel_count = reader.u32()?;
        let mut pel = BTreeMap::new();
        for _ in 0..pel_count {
            let id = reader.id()?;
            let nack = Nack {
                delivery_time: reader.u64()?,
                delivery_count: reader.u64()?,
                consumer: reader.string()?,
            };
            if pel.insert(id, nack).is_some() {
                return Err(invalid(format!("duplicate pending entry {id} in {name}")).into());
            }
        }

        let consumer_count = reader.u32()?;
        let mut consumers = Vec::new();
        for _ in 0..consumer_count {
            consumers.push((reader.string()?, reader.u64()?));
        }

        let group = ConsumerGroup::restore(last_delivered, pel, consumers).map_err(invalid)?;
        let groups = stream.groups.get_or_insert_with(BTreeMap::new);
        if groups.insert(name.clone(), group).is_some() {
            return Err(invalid(format!("duplicate group {name}")).into());
        }
    }

    if !reader.buf.is_empty() {
        return Err(invalid(format!("{} trailing bytes", reader.buf.len())).into());
    }

    info!(
        nodes = stream.nodes.len(),
        length = stream.length,
        groups = group_count,
        "Decoded stream snapshot"
    );
    Ok(stream)
}

/// Bounds-checked big-endian reads over the snapshot body.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn ensure(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(streamlog_core::Error::UnexpectedEof.into());
        }
        Ok(())
    }

    fn u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn id(&mut self) -> Result<StreamId> {
        Ok(StreamId::decode(self.take(STREAM_ID_LEN)?)?)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| invalid(e.to_string()).into())
    }
}
