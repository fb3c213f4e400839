//! Stream Configuration
//!
//! This module defines the knobs that shape a stream's node chain.
//!
//! ## StreamConfig
//!
//! - **node_max_bytes**: Start a new node once the tail is larger than this (default: 4KB)
//! - **node_max_entries**: Start a new node once the tail holds more records than this (default: 100)
//! - **compaction**: When and whether to rebuild nodes full of deleted records
//! - **snapshot_compression**: Compression applied to node bodies in snapshots (default: none)
//!
//! A limit of `0` disables that check.
//!
//! ## Usage
//!
//! ```ignore
//! use streamlog_storage::{StreamConfig, Stream};
//!
//! // Small nodes, so trims release memory in finer steps
//! let config = StreamConfig {
//!     node_max_entries: 16,
//!     ..Default::default()
//! };
//! let stream = Stream::with_config(config);
//! ```

use serde::{Deserialize, Serialize};
use streamlog_core::Compression;

use crate::compaction::CompactionPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Maximum tail node size in bytes before a new node is started (default: 4KB)
    #[serde(default = "default_node_max_bytes")]
    pub node_max_bytes: usize,

    /// Maximum records in the tail node before a new node is started (default: 100)
    #[serde(default = "default_node_max_entries")]
    pub node_max_entries: u64,

    /// Node compaction policy (disabled by default)
    #[serde(default)]
    pub compaction: CompactionPolicy,

    /// Compression for node bodies written to snapshots
    #[serde(default)]
    pub snapshot_compression: Compression,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            node_max_bytes: default_node_max_bytes(),
            node_max_entries: default_node_max_entries(),
            compaction: CompactionPolicy::default(),
            snapshot_compression: Compression::None,
        }
    }
}

fn default_node_max_bytes() -> usize {
    4096 // 4KB
}

fn default_node_max_entries() -> u64 {
    100
}
