//! The Stream: node chain, append engine and point deletes
//!
//! ## What is a Stream?
//!
//! A stream is an append-only log of records, each identified by a
//! [`StreamId`] that is strictly greater than every ID before it. Records are
//! packed into [`Node`]s, and nodes are kept in a [`NodeIndex`] keyed by the ID
//! of their first record.
//!
//! ```text
//!  NodeIndex
//!  ┌──────────┐   ┌──────────┐   ┌──────────┐
//!  │ 1000-0   │ → │ 1000-100 │ → │ 1003-0   │ ◄── tail: appends land here
//!  │ 100 recs │   │ 100 recs │   │ 17 recs  │
//!  └──────────┘   └──────────┘   └──────────┘
//!    ▲
//!    └── trim removes whole nodes from here, then soft-deletes
//! ```
//!
//! ## Appending
//!
//! A record goes into the tail node unless there is none, or the tail is over
//! `node_max_bytes` or holds more than `node_max_entries` live records. In those
//! cases a fresh node is started, keyed by the new ID and using the new record's
//! field names as its dictionary.
//!
//! Node growth is reserved through the stream's [`NodeAllocator`] before any
//! byte is written, so an allocation failure leaves the stream unchanged.
//!
//! ## Thread Safety
//!
//! `Stream` is a plain owned value with a single writer. Iterators borrow it
//! mutably, so nothing else can touch the stream while one is alive.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use streamlog_core::{Node, NodeAllocator, Record, StreamId, SystemAllocator};
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::StreamConfig;
use crate::consumer::ConsumerGroup;
use crate::error::{Error, Result};
use crate::index::NodeIndex;

/// An append-only log of records with consumer groups.
#[derive(Debug)]
pub struct Stream {
    pub(crate) nodes: NodeIndex,
    pub(crate) length: u64,
    pub(crate) last_id: StreamId,
    pub(crate) groups: Option<BTreeMap<String, ConsumerGroup>>,
    pub(crate) config: StreamConfig,
    pub(crate) alloc: Arc<dyn NodeAllocator>,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Summary returned by [`Stream::info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub length: u64,
    pub nodes: usize,
    pub last_id: StreamId,
    pub first_entry: Option<Record>,
    pub last_entry: Option<Record>,
    pub groups: usize,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream {
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemAllocator), Arc::new(SystemClock))
    }

    /// Stream whose node memory and ID clock come from the caller.
    pub fn with_parts(
        config: StreamConfig,
        alloc: Arc<dyn NodeAllocator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            nodes: NodeIndex::new(),
            length: 0,
            last_id: StreamId::MIN,
            groups: None,
            config,
            alloc,
            clock,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of live records.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Greatest ID ever appended. Survives trims and deletes.
    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &NodeIndex {
        &self.nodes
    }

    /// ID of the oldest live record.
    pub fn first_id(&self) -> Result<Option<StreamId>> {
        Ok(self.first_entry()?.map(|record| record.id))
    }

    fn first_entry(&self) -> Result<Option<Record>> {
        self.records(StreamId::MIN, StreamId::MAX, false)
            .next()
            .transpose()
    }

    fn last_entry(&self) -> Result<Option<Record>> {
        self.records(StreamId::MIN, StreamId::MAX, true)
            .next()
            .transpose()
    }

    pub fn info(&self) -> Result<StreamInfo> {
        Ok(StreamInfo {
            length: self.length,
            nodes: self.nodes.len(),
            last_id: self.last_id,
            first_entry: self.first_entry()?,
            last_entry: self.last_entry()?,
            groups: self.groups.as_ref().map_or(0, BTreeMap::len),
        })
    }

    fn tail_is_full(&self, tail: &Node) -> Result<bool> {
        if self.config.node_max_bytes != 0 && tail.byte_len() > self.config.node_max_bytes {
            return Ok(true);
        }
        if self.config.node_max_entries != 0 {
            return Ok(tail.valid_count()? > self.config.node_max_entries);
        }
        Ok(false)
    }

    /// Append a record and return its ID.
    ///
    /// With `explicit_id` the record gets exactly that ID, which must be greater
    /// than [`Stream::last_id`]. Otherwise the ID is derived from the clock.
    pub fn append<F, V>(&mut self, fields: &[(F, V)], explicit_id: Option<StreamId>) -> Result<StreamId>
    where
        F: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let id = match explicit_id {
            Some(id) if id <= self.last_id => {
                return Err(Error::InvalidId {
                    id,
                    last: self.last_id,
                })
            }
            Some(id) => id,
            None => self
                .last_id
                .next(self.clock.now_ms())
                .ok_or(Error::IdExhausted)?,
        };

        let reuse_tail = match self.nodes.last() {
            Some(tail) => !self.tail_is_full(tail)?,
            None => false,
        };

        let alloc = self.alloc.as_ref();
        let appended = if reuse_tail {
            match self.nodes.last_mut() {
                Some(tail) => tail.append(id, fields, alloc).map(|_| ()),
                None => Ok(()),
            }
        } else {
            Node::new(id, fields, alloc).map(|node| {
                debug!(node = %id, fields = fields.len(), "Started new node");
                self.nodes.insert(node);
            })
        };

        if let Err(err) = appended {
            let err = Error::from(err);
            if let Error::AllocationFailure(reason) = &err {
                warn!(id = %id, reason = %reason, "Append refused by node allocator");
            }
            return Err(err);
        }

        self.length += 1;
        self.last_id = id;
        trace!(id = %id, fields = fields.len(), "Appended record");
        Ok(id)
    }

    /// Delete the record with exactly this ID. Returns whether it existed.
    pub fn delete(&mut self, id: StreamId) -> Result<bool> {
        let mut iter = self.iter(id, id, false);
        let found = match iter.advance()? {
            Some((found, _)) => {
                iter.remove_current(found)?;
                true
            }
            None => false,
        };
        iter.stop();
        Ok(found)
    }

    /// Delete every listed ID that exists. Returns how many were deleted.
    pub fn delete_many(&mut self, ids: &[StreamId]) -> Result<u64> {
        let mut deleted = 0;
        for id in ids {
            if self.delete(*id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Soft-delete the record at `pos` in node `key`, dropping the node once
    /// nothing live is left in it.
    pub(crate) fn remove_at(&mut self, key: StreamId, pos: usize) -> Result<bool> {
        let alloc = self.alloc.as_ref();
        let node = self.nodes.get_mut(&key).ok_or_else(|| missing_node(key))?;
        if !node.mark_deleted(pos, alloc)? {
            return Ok(false);
        }
        self.length -= 1;

        if node.valid_count()? == 0 {
            self.drop_node(key);
        } else {
            self.maybe_compact(key)?;
        }
        Ok(true)
    }

    /// Remove a node from the chain and hand its memory back.
    pub(crate) fn drop_node(&mut self, key: StreamId) -> Option<Node> {
        let node = self.nodes.remove(&key)?;
        self.alloc.release(node.capacity());
        debug!(node = %key, "Removed node");
        Some(node)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        for node in self.nodes.iter() {
            self.alloc.release(node.capacity());
        }
    }
}

pub(crate) fn missing_node(key: StreamId) -> Error {
    Error::Codec(streamlog_core::Error::CorruptNode(format!(
        "node {key} missing from index"
    )))
}
