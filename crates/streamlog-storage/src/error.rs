//! Storage Error Types
//!
//! This module defines all error types that can occur during stream operations.
//!
//! ## Error Categories
//!
//! ### Append Errors
//! - `InvalidId`: An explicit ID was not greater than the stream's last ID
//! - `IdExhausted`: The stream already holds the maximum ID, nothing can follow
//! - `AllocationFailure`: The node allocator refused to grow a buffer
//!
//! ### Consumer Group Errors
//! - `DuplicateGroup`: A group with that name already exists
//! - `GroupNotFound`: No group with that name
//! - `ConsumerNotFound`: No consumer with that name in the group
//!
//! ### Iterator Errors
//! - `FieldsExhausted`: `read_field` called more often than the record has fields
//! - `NoCurrentRecord`: A field read or removal without a yielded record
//!
//! ### Codec Errors
//! - `Codec`: Node or snapshot bytes failed to decode (see `streamlog_core::Error`)
//!
//! ## Usage
//!
//! All stream operations return `Result<T>` which is aliased to
//! `Result<T, Error>`. This allows clean error propagation with `?`.

use streamlog_core::StreamId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("ID {id} is equal or smaller than the stream's last ID {last}")]
    InvalidId { id: StreamId, last: StreamId },

    #[error("stream has reached the maximum ID, no further IDs can be generated")]
    IdExhausted,

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("consumer group already exists: {0}")]
    DuplicateGroup(String),

    #[error("consumer group not found: {0}")]
    GroupNotFound(String),

    #[error("consumer not found: {group}/{consumer}")]
    ConsumerNotFound { group: String, consumer: String },

    #[error("all fields of the current record have been read")]
    FieldsExhausted,

    #[error("iterator has no current record")]
    NoCurrentRecord,

    #[error("codec error: {0}")]
    Codec(streamlog_core::Error),
}

impl From<streamlog_core::Error> for Error {
    fn from(err: streamlog_core::Error) -> Self {
        match err {
            // Callers handle refused growth the same way whichever layer hit it
            streamlog_core::Error::AllocationFailure(msg) => Error::AllocationFailure(msg),
            other => Error::Codec(other),
        }
    }
}
