//! Trimming
//!
//! Caps a stream at `maxlen` live records by removing the oldest ones.
//!
//! Whole nodes are dropped from the head while doing so still leaves at least
//! `maxlen` records. What remains is either left alone (`approximate`), which
//! may keep a few records more than asked for, or soft-deleted record by
//! record from the head node until the stream is exactly `maxlen` long.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::stream::{missing_node, Stream};

impl Stream {
    /// Trim the stream to `maxlen` live records. Returns how many were removed.
    pub fn trim(&mut self, maxlen: u64, approximate: bool) -> Result<u64> {
        if self.length <= maxlen {
            return Ok(0);
        }

        let mut removed = 0;
        while self.length > maxlen {
            let Some(head) = self.nodes.first() else {
                break;
            };
            let key = head.key();
            let valid = head.valid_count()?;

            if self.length - valid >= maxlen {
                self.drop_node(key);
                self.length -= valid;
                removed += valid;
                debug!(node = %key, removed = valid, "Trimmed whole node");
                continue;
            }

            if approximate {
                break;
            }

            let excess = self.length - maxlen;
            let alloc = self.alloc.as_ref();
            let node = self.nodes.get_mut(&key).ok_or_else(|| missing_node(key))?;
            let flagged = match node.delete_oldest(excess, alloc) {
                Ok(flagged) => flagged,
                Err(err) => {
                    let err = Error::from(err);
                    if let Error::AllocationFailure(reason) = &err {
                        warn!(node = %key, reason = %reason, "Trim refused by node allocator");
                    }
                    return Err(err);
                }
            };
            self.length -= flagged;
            removed += flagged;
            debug!(node = %key, removed = flagged, "Soft-deleted head records");

            self.maybe_compact(key)?;
            break;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StreamConfig;
    use crate::stream::Stream;
    use streamlog_core::StreamId;

    fn filled(count: u64, node_max_entries: u64) -> Stream {
        let mut stream = Stream::with_config(StreamConfig {
            node_max_entries,
            ..Default::default()
        });
        for i in 1..=count {
            stream
                .append(&[("n", i.to_string())], Some(StreamId::new(i, 0)))
                .unwrap();
        }
        stream
    }

    fn first_ms(stream: &Stream) -> u64 {
        stream.first_id().unwrap().unwrap().ms
    }

    #[test]
    fn test_noop_when_short_enough() {
        let mut stream = filled(5, 2);
        assert_eq!(stream.trim(5, false).unwrap(), 0);
        assert_eq!(stream.trim(100, true).unwrap(), 0);
        assert_eq!(stream.len(), 5);
    }

    #[test]
    fn test_exact_trim() {
        // Nodes of three records: [1,2,3] [4,5,6] [7,8,9] [10]
        let mut stream = filled(10, 2);
        assert_eq!(stream.trim(5, false).unwrap(), 5);
        assert_eq!(stream.len(), 5);
        assert_eq!(first_ms(&stream), 6);
        // First node dropped whole, second soft-deleted in part
        assert_eq!(stream.node_count(), 3);
        assert_eq!(stream.nodes().first().unwrap().deleted_count().unwrap(), 2);
    }

    #[test]
    fn test_approximate_trim_keeps_whole_nodes() {
        let mut stream = filled(10, 2);
        assert_eq!(stream.trim(5, true).unwrap(), 3);
        assert_eq!(stream.len(), 7);
        assert_eq!(first_ms(&stream), 4);

        // Nothing more to drop without cutting into a node
        assert_eq!(stream.trim(5, true).unwrap(), 0);
    }

    #[test]
    fn test_trim_to_zero() {
        let mut stream = filled(10, 2);
        assert_eq!(stream.trim(0, true).unwrap(), 10);
        assert!(stream.is_empty());
        assert_eq!(stream.node_count(), 0);
        assert_eq!(stream.last_id(), StreamId::new(10, 0));
    }

    #[test]
    fn test_repeated_exact_trims_skip_deleted_records() {
        let mut stream = filled(20, 0);
        assert_eq!(stream.trim(15, false).unwrap(), 5);
        assert_eq!(stream.trim(12, false).unwrap(), 3);
        assert_eq!(first_ms(&stream), 9);
        let node = stream.nodes().first().unwrap();
        assert_eq!(node.deleted_count().unwrap(), 8);
        assert_eq!(node.valid_count().unwrap(), 12);
    }
}
