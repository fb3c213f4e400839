//! Streamlog Storage Layer
//!
//! This crate implements the stream engine: an append-only, strictly ordered
//! log of field/value records with trimming, range reads and consumer groups.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐
//! │  Producers  │
//! └──────┬──────┘
//!        │ append(fields)
//!        ▼
//! ┌─────────────────┐        ┌─────────────────────┐
//! │ Stream          │ ◄────► │ NodeIndex           │
//! │ - ID generation │        │ BTreeMap<key, Node> │
//! │ - Trim          │        └─────────────────────┘
//! │ - Groups / PEL  │
//! └────────┬────────┘
//!          │ iter / range
//!          ▼
//! ┌─────────────────┐
//! │ StreamIterator  │
//! │ - Seeks nodes   │
//! │ - Walks records │
//! │ - Deletes       │
//! └────────┬────────┘
//!          │ records
//!          ▼
//! ┌─────────────┐
//! │  Consumers  │
//! └─────────────┘
//! ```
//!
//! ## Main Components
//!
//! ### Stream
//! Owns the node chain, the live record count, the last ID ever handed out and
//! the consumer groups. Appends go to the tail node until it fills up.
//!
//! ### StreamIterator / Records
//! Walk an inclusive ID range forwards or backwards. `StreamIterator` can
//! soft-delete the record it is positioned on.
//!
//! ### Consumer Groups
//! Track delivered but unacknowledged records per group and per consumer.
//!
//! ### Snapshots
//! Binary image of a stream with CRC32 footer, optional LZ4 node bodies.
//!
//! ## Usage Example
//!
//! ```ignore
//! use streamlog_storage::{Stream, StreamId};
//!
//! let mut stream = Stream::new();
//! let id = stream.append(&[("sensor", "alpha"), ("reading", "21.5")], None)?;
//!
//! for record in stream.range(StreamId::MIN, StreamId::MAX, false, Some(10))? {
//!     println!("{} {:?}", record.id, record.fields);
//! }
//!
//! stream.trim(1000, true)?;
//! ```

pub mod clock;
pub mod compaction;
pub mod config;
pub mod consumer;
pub mod error;
pub mod index;
pub mod iter;
pub mod snapshot;
pub mod stream;
pub mod trim;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compaction::{CompactionPolicy, CompactionStats};
pub use config::StreamConfig;
pub use consumer::{Consumer, ConsumerGroup, Nack, PendingSummary};
pub use error::{Error, Result};
pub use index::NodeIndex;
pub use iter::{Records, StreamIterator};
pub use snapshot::{decode_stream, decode_stream_with, encode_stream};
pub use stream::{Stream, StreamInfo};

pub use streamlog_core::{
    BoundedAllocator, Compression, NodeAllocator, Record, StreamId, SystemAllocator,
};
