//! Node Compaction
//!
//! Soft deletion leaves deleted records in place: the node keeps its size and
//! the iterator keeps stepping over them. Compaction rebuilds a node with only
//! its live records, under the same key and dictionary.
//!
//! ## Compaction Strategy
//!
//! A node is rewritten once it is both large enough to bother and dirty enough
//! to pay off:
//!
//! ```text
//! valid + deleted > min_entries  &&  deleted > valid * max_deleted_ratio
//! ```
//!
//! Compaction is off by default. When enabled, trim and record removal run it
//! on every node they touch; [`Stream::compact_nodes`] sweeps the whole chain
//! on demand regardless of the `enabled` flag.

use serde::{Deserialize, Serialize};
use streamlog_core::{NodeHeader, StreamId};
use tracing::debug;

use crate::error::Result;
use crate::stream::Stream;

/// When a node is worth rebuilding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionPolicy {
    /// Run compaction on nodes touched by trim and removal (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Nodes with this many records or fewer are never compacted (default: 10)
    #[serde(default = "default_min_entries")]
    pub min_entries: u64,

    /// Deleted-to-valid ratio above which a node is compacted (default: 0.5)
    #[serde(default = "default_max_deleted_ratio")]
    pub max_deleted_ratio: f64,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_entries: default_min_entries(),
            max_deleted_ratio: default_max_deleted_ratio(),
        }
    }
}

fn default_min_entries() -> u64 {
    10
}

fn default_max_deleted_ratio() -> f64 {
    0.5
}

impl CompactionPolicy {
    pub fn should_compact(&self, header: &NodeHeader) -> bool {
        header.entries() > self.min_entries
            && header.deleted as f64 > header.valid as f64 * self.max_deleted_ratio
    }
}

/// Result of a compaction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionStats {
    pub nodes_compacted: u64,
    pub records_dropped: u64,
    pub bytes_reclaimed: u64,
}

impl Stream {
    /// Compact every node the policy selects, ignoring `enabled`.
    pub fn compact_nodes(&mut self) -> Result<CompactionStats> {
        let keys: Vec<StreamId> = self.nodes.keys().collect();
        let mut stats = CompactionStats::default();
        for key in keys {
            if let Some(node_stats) = self.compact_node(key)? {
                stats.nodes_compacted += 1;
                stats.records_dropped += node_stats.records_dropped;
                stats.bytes_reclaimed += node_stats.bytes_reclaimed;
            }
        }
        Ok(stats)
    }

    /// Compact the node at `key` if the policy selects it.
    pub(crate) fn compact_node(&mut self, key: StreamId) -> Result<Option<CompactionStats>> {
        let Some(node) = self.nodes.get(&key) else {
            return Ok(None);
        };
        let header = node.header()?;
        if !self.config.compaction.should_compact(&header) {
            return Ok(None);
        }

        let before_len = node.byte_len();
        let before_capacity = node.capacity();
        let Some(compacted) = node.compact(self.alloc.as_ref())? else {
            return Ok(None);
        };
        let stats = CompactionStats {
            nodes_compacted: 1,
            records_dropped: header.deleted,
            bytes_reclaimed: before_len.saturating_sub(compacted.byte_len()) as u64,
        };

        self.nodes.insert(compacted);
        self.alloc.release(before_capacity);

        debug!(
            node = %key,
            dropped = header.deleted,
            reclaimed = stats.bytes_reclaimed,
            "Compacted node"
        );
        Ok(Some(stats))
    }

    /// Run compaction on `key` when the configured policy is enabled.
    pub(crate) fn maybe_compact(&mut self, key: StreamId) -> Result<()> {
        if self.config.compaction.enabled {
            self.compact_node(key)?;
        }
        Ok(())
    }
}
