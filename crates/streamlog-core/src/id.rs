//! Stream Identifiers
//!
//! A `StreamId` is the logical position of a record in a stream: a
//! `(ms, seq)` pair where `ms` is a millisecond timestamp and `seq`
//! disambiguates records created within the same millisecond.
//!
//! ## Ordering
//! IDs compare by `ms` first, then `seq`. The derived `Ord` relies on the field
//! order below, so `ms` must stay the first field.
//!
//! ## Fixed-width Encoding
//! The 16-byte big-endian form (`ms` then `seq`) sorts byte-lexicographically in
//! exactly the same order as the numeric comparison. It is used for node keys
//! in snapshots.
//!
//! ## ID Generation
//! ```text
//! last = 1700000000000-4
//! now  = 1700000000000   →  1700000000000-5   (same ms: bump seq)
//! now  = 1700000000003   →  1700000000003-0   (time moved: reset seq)
//! now  = 1699999999000   →  1700000000000-5   (clock went back: never regress)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Width of the encoded form.
pub const STREAM_ID_LEN: usize = 16;

/// Composite (time, sequence) identifier of a stream record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StreamId {
    /// Milliseconds component
    pub ms: u64,

    /// Sequence within the millisecond
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Big-endian 16-byte form, sortable as raw bytes.
    pub fn encode(&self) -> [u8; STREAM_ID_LEN] {
        let mut buf = [0u8; STREAM_ID_LEN];
        buf[..8].copy_from_slice(&self.ms.to_be_bytes());
        buf[8..].copy_from_slice(&self.seq.to_be_bytes());
        buf
    }

    /// Inverse of [`StreamId::encode`]. Any width other than 16 bytes is corrupt.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != STREAM_ID_LEN {
            return Err(Error::InvalidIdWidth(buf.len()));
        }
        let mut ms = [0u8; 8];
        let mut seq = [0u8; 8];
        ms.copy_from_slice(&buf[..8]);
        seq.copy_from_slice(&buf[8..]);
        Ok(Self {
            ms: u64::from_be_bytes(ms),
            seq: u64::from_be_bytes(seq),
        })
    }

    /// The smallest ID strictly greater than this one.
    pub fn incr(&self) -> Option<Self> {
        if self.seq < u64::MAX {
            Some(Self::new(self.ms, self.seq + 1))
        } else if self.ms < u64::MAX {
            Some(Self::new(self.ms + 1, 0))
        } else {
            None
        }
    }

    /// The largest ID strictly smaller than this one.
    pub fn decr(&self) -> Option<Self> {
        if self.seq > 0 {
            Some(Self::new(self.ms, self.seq - 1))
        } else if self.ms > 0 {
            Some(Self::new(self.ms - 1, u64::MAX))
        } else {
            None
        }
    }

    /// Generate the ID following `self` given the current wall clock.
    ///
    /// Time never goes backwards: a clock reading at or behind `self.ms`
    /// keeps `self.ms` and bumps the sequence. Returns `None` once the ID
    /// space is exhausted.
    pub fn next(&self, wallclock_ms: u64) -> Option<Self> {
        if wallclock_ms > self.ms {
            Some(Self::new(wallclock_ms, 0))
        } else {
            self.incr()
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// Parses `"<ms>-<seq>"`, or a bare `"<ms>"` meaning sequence 0.
impl FromStr for StreamId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|e| Error::ParseId(format!("{s:?}: {e}")))
        };
        match s.split_once('-') {
            Some((ms, seq)) => Ok(Self::new(parse(ms)?, parse(seq)?)),
            None => Ok(Self::new(parse(s)?, 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_ms_then_seq() {
        let a = StreamId::new(5, 100);
        let b = StreamId::new(6, 0);
        let c = StreamId::new(6, 1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
        assert!(StreamId::MIN < a && c < StreamId::MAX);
    }

    #[test]
    fn test_encoding_sorts_like_ids() {
        let ids = [
            StreamId::new(0, 1),
            StreamId::new(0, u64::MAX),
            StreamId::new(1, 0),
            StreamId::new(256, 3),
            StreamId::new(u64::MAX, 0),
        ];
        for pair in ids.windows(2) {
            assert!(pair[0].encode() < pair[1].encode());
            assert_eq!(StreamId::decode(&pair[0].encode()).unwrap(), pair[0]);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_width() {
        assert_eq!(StreamId::decode(&[0u8; 15]), Err(Error::InvalidIdWidth(15)));
        assert_eq!(StreamId::decode(&[0u8; 17]), Err(Error::InvalidIdWidth(17)));
    }

    #[test]
    fn test_next_id() {
        let last = StreamId::new(1000, 4);
        assert_eq!(last.next(1000), Some(StreamId::new(1000, 5)));
        assert_eq!(last.next(1003), Some(StreamId::new(1003, 0)));
        assert_eq!(last.next(10), Some(StreamId::new(1000, 5)));
    }

    #[test]
    fn test_next_id_sequence_overflow() {
        let last = StreamId::new(7, u64::MAX);
        assert_eq!(last.next(7), Some(StreamId::new(8, 0)));
        assert_eq!(StreamId::MAX.next(0), None);
        assert_eq!(StreamId::MIN.decr(), None);
        assert_eq!(StreamId::new(8, 0).decr(), Some(last));
    }

    #[test]
    fn test_display_and_parse() {
        let id = StreamId::new(1_700_000_000_000, 12);
        assert_eq!(id.to_string(), "1700000000000-12");
        assert_eq!("1700000000000-12".parse::<StreamId>().unwrap(), id);
        assert_eq!("42".parse::<StreamId>().unwrap(), StreamId::new(42, 0));
        assert!("42-".parse::<StreamId>().is_err());
        assert!("abc".parse::<StreamId>().is_err());
    }
}
