pub mod alloc;
pub mod compression;
pub mod error;
pub mod id;
pub mod node;
pub mod pack;
pub mod record;
pub mod varint;

pub use alloc::{BoundedAllocator, NodeAllocator, SystemAllocator};
pub use compression::Compression;
pub use error::{Error, Result};
pub use id::StreamId;
pub use node::{Node, NodeHeader, RecordFlags, RecordView};
pub use record::Record;
