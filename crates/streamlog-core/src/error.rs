//! Error Types for the streamlog codec
//!
//! This module defines the errors raised while encoding, decoding and navigating
//! packed stream nodes and snapshots.
//!
//! ## Error Categories
//!
//! ### Buffer Errors
//! - `UnexpectedEof`: An element or varint runs past the end of the buffer
//! - `VarintOverflow`: A varint encodes more than 64 bits
//!
//! ### Node Integrity Errors
//! - `CorruptNode`: A packed node violates its own layout (bad back-length,
//!   wrong element type, record length mismatch, counters out of sync)
//! - `InvalidIdWidth`: A stored stream ID is not exactly 16 bytes
//!
//! ### Snapshot Errors
//! - `InvalidMagic`, `UnsupportedVersion`, `InvalidCompression`, `CrcMismatch`,
//!   `Decompression`, `InvalidSnapshot`
//!
//! ### Resource Errors
//! - `AllocationFailure`: The node allocator refused to grow a buffer. The node
//!   being mutated is left exactly as it was.
//!
//! Corruption errors on a node that already passed validation mean the stream is
//! no longer trustworthy. Callers abort the operation and never retry it.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unexpected end of buffer")]
    UnexpectedEof,

    #[error("Varint too large")]
    VarintOverflow,

    #[error("Invalid stream ID width: expected 16 bytes, got {0}")]
    InvalidIdWidth(usize),

    #[error("Invalid stream ID: {0}")]
    ParseId(String),

    #[error("Corrupt node: {0}")]
    CorruptNode(String),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(u16),

    #[error("CRC mismatch")]
    CrcMismatch,

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptNode(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
