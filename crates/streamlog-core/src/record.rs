//! Record Data Structure
//!
//! An owned, decoded stream record: its ID and the ordered field/value pairs it
//! was appended with. Inside a node the same record is packed (and possibly
//! field-compressed); `Record` is what callers get back from range reads.
//!
//! Field names and values are opaque bytes. Empty and NUL-containing payloads
//! are legal and round-trip exactly.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::StreamId;

/// A single record in the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// ID of this record
    pub id: StreamId,

    /// Field/value pairs in insertion order
    pub fields: Vec<(Bytes, Bytes)>,
}

impl Record {
    pub fn new(id: StreamId, fields: Vec<(Bytes, Bytes)>) -> Self {
        Self { id, fields }
    }

    /// Value of the first field named `name`.
    pub fn get(&self, name: &[u8]) -> Option<&Bytes> {
        self.fields
            .iter()
            .find(|(field, _)| field.as_ref() == name)
            .map(|(_, value)| value)
    }

    /// Estimate the payload size of this record in bytes
    pub fn estimated_size(&self) -> usize {
        16 + // id
        self.fields
            .iter()
            .map(|(f, v)| f.len() + v.len())
            .sum::<usize>()
    }
}
