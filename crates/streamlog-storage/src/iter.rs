//! Range Iteration
//!
//! Records are visited in ID order (or reverse ID order) within an inclusive
//! `[start, end]` range. Use [`StreamId::MIN`] and [`StreamId::MAX`] for open
//! ends.
//!
//! ## State Machine
//!
//! ```text
//!  BeforeStart ──seek──► Positioned(node, offset) ──bound passed──► Exhausted
//!                          │        ▲
//!                          └────────┘
//!                       next record / next node
//! ```
//!
//! - Forward iteration seeks the node with the greatest key `<= start` (or
//!   the first node) and reads records left to right.
//! - Reverse iteration seeks the node with the greatest key `<= end` and walks
//!   right to left using each record's trailing length.
//! - Crossing a node boundary re-seeks the index for the neighbouring node.
//!
//! Two front ends share the same walker:
//!
//! - [`StreamIterator`] borrows the stream mutably. It yields `(id, field_count)`
//!   and hands out fields one at a time with [`StreamIterator::read_field`]. It
//!   can delete the record it is on with [`StreamIterator::remove_current`].
//! - [`Records`] borrows the stream immutably and yields owned [`Record`]s.

use bytes::Bytes;
use streamlog_core::{Node, NodeHeader, Record, RecordView, StreamId};

use crate::error::{Error, Result};
use crate::index::NodeIndex;
use crate::stream::{missing_node, Stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeStart,
    /// `next` is the offset of the next record to look at in node `key`,
    /// or `None` once the node is used up.
    Positioned { key: StreamId, next: Option<usize> },
    Exhausted,
}

/// A record the walker stopped on.
#[derive(Debug, Clone, Copy)]
struct Hit {
    key: StreamId,
    header: NodeHeader,
    view: RecordView,
}

/// Direction-aware cursor over the node chain. Holds no borrow, so callers
/// can mutate the stream between steps.
#[derive(Debug, Clone)]
struct Walker {
    start: StreamId,
    end: StreamId,
    reverse: bool,
    state: State,
}

impl Walker {
    fn new(start: StreamId, end: StreamId, reverse: bool) -> Self {
        let state = if start > end {
            State::Exhausted
        } else {
            State::BeforeStart
        };
        Self {
            start,
            end,
            reverse,
            state,
        }
    }

    fn enter(&self, node: &Node) -> Result<State> {
        let next = if self.reverse {
            node.last_record()?
        } else {
            node.first_record(&node.header()?)
        };
        Ok(State::Positioned {
            key: node.key(),
            next,
        })
    }

    fn seek(&self, nodes: &NodeIndex) -> Result<State> {
        let node = if self.reverse {
            nodes.floor(self.end)
        } else {
            nodes.floor(self.start).or_else(|| nodes.first())
        };
        match node {
            Some(node) => self.enter(node),
            None => Ok(State::Exhausted),
        }
    }

    fn neighbour(&self, nodes: &NodeIndex, key: StreamId) -> Result<State> {
        let node = if self.reverse {
            nodes.predecessor(key)
        } else {
            nodes.successor(key)
        };
        match node {
            Some(node) => self.enter(node),
            None => Ok(State::Exhausted),
        }
    }

    fn advance(&mut self, nodes: &NodeIndex) -> Result<Option<Hit>> {
        loop {
            let (key, pos) = match self.state {
                State::Exhausted => return Ok(None),
                State::BeforeStart => {
                    self.state = self.seek(nodes)?;
                    continue;
                }
                State::Positioned { key, next: None } => {
                    self.state = self.neighbour(nodes, key)?;
                    continue;
                }
                State::Positioned {
                    key,
                    next: Some(pos),
                } => (key, pos),
            };

            let node = nodes.get(&key).ok_or_else(|| missing_node(key))?;
            let header = node.header()?;
            let view = node.read_record(pos, &header)?;
            let next = if self.reverse {
                node.prev_record(pos)?
            } else {
                (view.next < node.byte_len()).then_some(view.next)
            };
            self.state = State::Positioned { key, next };

            if view.flags.is_deleted() {
                continue;
            }
            let (past_bound, before_bound) = if self.reverse {
                (view.id < self.start, view.id > self.end)
            } else {
                (view.id > self.end, view.id < self.start)
            };
            if past_bound {
                self.state = State::Exhausted;
                return Ok(None);
            }
            if before_bound {
                continue;
            }
            return Ok(Some(Hit { key, header, view }));
        }
    }

    /// Restart so that the next step lands just past `id`.
    fn restart_from(&mut self, id: StreamId) {
        if self.reverse {
            self.end = id;
        } else {
            self.start = id;
        }
        self.state = State::BeforeStart;
    }
}

/// Field read position within the current record.
#[derive(Debug, Clone, Copy)]
struct Current {
    hit: Hit,
    fields_read: usize,
    master_pos: usize,
    value_pos: usize,
}

/// Mutable range iterator with delete-during-iterate.
///
/// ```ignore
/// let mut iter = stream.iter(StreamId::MIN, StreamId::MAX, false);
/// while let Some((id, fields)) = iter.advance()? {
///     for _ in 0..fields {
///         let (field, value) = iter.read_field()?;
///         if field == b"expired" {
///             iter.remove_current(id)?;
///             break;
///         }
///     }
/// }
/// ```
#[derive(Debug)]
pub struct StreamIterator<'a> {
    stream: &'a mut Stream,
    walker: Walker,
    current: Option<Current>,
}

impl<'a> StreamIterator<'a> {
    pub fn new(stream: &'a mut Stream, start: StreamId, end: StreamId, reverse: bool) -> Self {
        Self {
            stream,
            walker: Walker::new(start, end, reverse),
            current: None,
        }
    }

    /// Move to the next live record in range, returning its ID and number of
    /// fields, or `None` when the range is exhausted.
    pub fn advance(&mut self) -> Result<Option<(StreamId, usize)>> {
        self.current = None;
        let Some(hit) = self.walker.advance(&self.stream.nodes)? else {
            return Ok(None);
        };
        self.current = Some(Current {
            hit,
            fields_read: 0,
            master_pos: hit.header.master_fields,
            value_pos: hit.view.body,
        });
        Ok(Some((hit.view.id, hit.view.field_count)))
    }

    /// Next field/value pair of the current record. Compressed records get
    /// their names from the node dictionary.
    pub fn read_field(&mut self) -> Result<(&[u8], &[u8])> {
        let current = self.current.as_mut().ok_or(Error::NoCurrentRecord)?;
        if current.fields_read == current.hit.view.field_count {
            return Err(Error::FieldsExhausted);
        }
        let node = self
            .stream
            .nodes
            .get(&current.hit.key)
            .ok_or_else(|| missing_node(current.hit.key))?;

        let field = if current.hit.view.flags.has_same_fields() {
            let mut cursor = node.cursor(current.master_pos);
            let name = cursor.read_bytes()?;
            cursor.next()?;
            current.master_pos = cursor.position();
            name
        } else {
            let mut cursor = node.cursor(current.value_pos);
            let name = cursor.read_bytes()?;
            cursor.next()?;
            current.value_pos = cursor.position();
            name
        };

        let mut cursor = node.cursor(current.value_pos);
        let value = cursor.read_bytes()?;
        cursor.next()?;
        current.value_pos = cursor.position();
        current.fields_read += 1;

        Ok((field, value))
    }

    /// Delete the record last returned by [`StreamIterator::advance`], whose
    /// ID is `id`. Iteration continues with the record after it.
    pub fn remove_current(&mut self, id: StreamId) -> Result<()> {
        let current = match self.current {
            Some(current) if current.hit.view.id == id => current,
            _ => return Err(Error::NoCurrentRecord),
        };
        self.current = None;
        self.stream
            .remove_at(current.hit.key, current.hit.view.start)?;
        self.walker.restart_from(id);
        Ok(())
    }

    /// Release the iterator.
    pub fn stop(self) {}
}

/// Read-only range iterator yielding owned records.
#[derive(Debug)]
pub struct Records<'a> {
    nodes: &'a NodeIndex,
    walker: Walker,
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let hit = match self.walker.advance(self.nodes) {
            Ok(hit) => hit?,
            Err(e) => {
                self.walker.state = State::Exhausted;
                return Some(Err(e));
            }
        };
        let record = self
            .nodes
            .get(&hit.key)
            .ok_or_else(|| missing_node(hit.key))
            .and_then(|node| Ok(node.fields(&hit.view, &hit.header)?))
            .map(|pairs| {
                let fields = pairs
                    .into_iter()
                    .map(|(f, v)| (Bytes::copy_from_slice(f), Bytes::copy_from_slice(v)))
                    .collect();
                Record::new(hit.view.id, fields)
            });
        Some(record)
    }
}

impl Stream {
    /// Iterator that can read field by field and delete as it goes.
    pub fn iter(&mut self, start: StreamId, end: StreamId, reverse: bool) -> StreamIterator<'_> {
        StreamIterator::new(self, start, end, reverse)
    }

    /// Owned records in `[start, end]`, in ID order or reversed.
    pub fn records(&self, start: StreamId, end: StreamId, reverse: bool) -> Records<'_> {
        Records {
            nodes: &self.nodes,
            walker: Walker::new(start, end, reverse),
        }
    }

    /// Up to `count` records in `[start, end]`.
    pub fn range(
        &self,
        start: StreamId,
        end: StreamId,
        reverse: bool,
        count: Option<usize>,
    ) -> Result<Vec<Record>> {
        self.records(start, end, reverse)
            .take(count.unwrap_or(usize::MAX))
            .collect()
    }
}
