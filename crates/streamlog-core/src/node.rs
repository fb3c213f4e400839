//! Packed Stream Nodes
//!
//! A node holds a contiguous run of records in one packed buffer, preceded by a
//! *master entry* that doubles as a field-name dictionary.
//!
//! ## Layout
//!
//! ```text
//! Master entry:
//! ┌───────┬─────────┬────────────┬─────────┬─────┬─────────┬───┐
//! │ valid │ deleted │ num-fields │ field_1 │ ... │ field_N │ 0 │
//! └───────┴─────────┴────────────┴─────────┴─────┴─────────┴───┘
//!
//! Record (full):
//! ┌───────┬──────────┬───────────┬────────────┬─────────┬─────────┬─────┬────────┐
//! │ flags │ ms-delta │ seq-delta │ num-fields │ field_1 │ value_1 │ ... │ length │
//! └───────┴──────────┴───────────┴────────────┴─────────┴─────────┴─────┴────────┘
//!
//! Record (SAMEFIELDS):
//! ┌───────┬──────────┬───────────┬─────────┬─────┬─────────┬────────┐
//! │ flags │ ms-delta │ seq-delta │ value_1 │ ... │ value_N │ length │
//! └───────┴──────────┴───────────┴─────────┴─────┴─────────┴────────┘
//! ```
//!
//! Every box is one element (see [`crate::pack`]). IDs are stored as deltas from
//! the node key, which is the ID of the first record ever written to the node.
//!
//! `length` counts the elements of the record *before* it: 3 fixed elements plus
//! one per value, plus `1 + N` when field names are present. Walking backwards
//! from a record's start, the preceding element is either the previous record's
//! `length` or the master terminator `0`, so the reverse walk needs no index.
//!
//! ## Soft Deletion
//! Deleting a record flips its DELETED flag in place and moves one unit from
//! `valid` to `deleted`. Nothing is shifted, so live cursors to other records
//! stay meaningful. [`Node::compact`] rebuilds a node without its deleted
//! records when the caller decides it is worth it.

use std::ops::BitOr;

use bytes::Bytes;

use crate::alloc::NodeAllocator;
use crate::pack::{self, Cursor};
use crate::{Error, Record, Result, StreamId};

/// Per-record flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RecordFlags(u8);

impl RecordFlags {
    pub const NONE: RecordFlags = RecordFlags(0);
    pub const DELETED: RecordFlags = RecordFlags(1 << 0);
    pub const SAME_FIELDS: RecordFlags = RecordFlags(1 << 1);

    const ALL: u8 = Self::DELETED.0 | Self::SAME_FIELDS.0;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: i64) -> Result<Self> {
        u8::try_from(bits)
            .ok()
            .filter(|bits| bits & !Self::ALL == 0)
            .map(RecordFlags)
            .ok_or_else(|| Error::corrupt(format!("unknown record flags {bits:#x}")))
    }

    pub fn contains(self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_deleted(self) -> bool {
        self.contains(Self::DELETED)
    }

    pub fn has_same_fields(self) -> bool {
        self.contains(Self::SAME_FIELDS)
    }
}

impl BitOr for RecordFlags {
    type Output = RecordFlags;

    fn bitor(self, rhs: RecordFlags) -> RecordFlags {
        RecordFlags(self.0 | rhs.0)
    }
}

/// Decoded master entry plus the offsets needed to navigate past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub valid: u64,
    pub deleted: u64,
    pub master_field_count: usize,
    /// Offset of the first master field name
    pub master_fields: usize,
    /// Offset just past the `valid` and `deleted` counters
    pub counters_end: usize,
    /// Offset of the first record (or the buffer length if there is none)
    pub first_record: usize,
}

impl NodeHeader {
    pub fn entries(&self) -> u64 {
        self.valid + self.deleted
    }
}

/// Location and shape of one record inside a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordView {
    pub flags: RecordFlags,
    pub id: StreamId,
    pub field_count: usize,
    /// Offset of the flags element
    pub start: usize,
    /// Offset of the first field name, or first value for SAMEFIELDS records
    pub body: usize,
    /// Offset of the element following the trailing length
    pub next: usize,
}

/// Number of elements a record occupies before its trailing length.
fn record_span(flags: RecordFlags, field_count: usize) -> usize {
    if flags.has_same_fields() {
        field_count.saturating_add(3)
    } else {
        field_count.saturating_mul(2).saturating_add(4)
    }
}

fn as_count(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::corrupt(format!("negative {what} {value}")))
}

/// A packed run of records keyed by the ID of its first record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    key: StreamId,
    buf: Vec<u8>,
}

impl Node {
    /// Start a node whose dictionary and first record come from `fields`.
    pub fn new<F, V>(id: StreamId, fields: &[(F, V)], alloc: &dyn NodeAllocator) -> Result<Self>
    where
        F: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut scratch = Vec::new();
        pack::put_int(&mut scratch, 1);
        pack::put_int(&mut scratch, 0);
        pack::put_int(&mut scratch, fields.len() as i64);
        for (field, _) in fields {
            pack::put_bytes(&mut scratch, field.as_ref());
        }
        pack::put_int(&mut scratch, 0);
        // The first record trivially matches the dictionary it defines
        encode_record(&mut scratch, id, id, fields, RecordFlags::SAME_FIELDS);

        let mut buf = Vec::new();
        alloc.reserve(&mut buf, scratch.len())?;
        buf.extend_from_slice(&scratch);

        Ok(Self { key: id, buf })
    }

    /// Rebuild a node from its packed form, validating every record.
    pub fn decode(key: StreamId, data: &[u8], alloc: &dyn NodeAllocator) -> Result<Self> {
        let mut buf = Vec::new();
        alloc.reserve(&mut buf, data.len())?;
        buf.extend_from_slice(data);

        let node = Self { key, buf };
        if let Err(e) = node.validate() {
            alloc.release(node.capacity());
            return Err(e);
        }
        Ok(node)
    }

    /// Packed form, suitable for [`Node::decode`].
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    pub fn key(&self) -> StreamId {
        self.key
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn cursor(&self, pos: usize) -> Cursor<'_> {
        Cursor::new(&self.buf, pos)
    }

    pub fn header(&self) -> Result<NodeHeader> {
        let mut cursor = self.cursor(0);
        let valid = as_count(cursor.read_int()?, "valid count")?;
        cursor.next()?;
        let deleted = as_count(cursor.read_int()?, "deleted count")?;
        cursor.next()?;
        let counters_end = cursor.position();
        let master_field_count = as_count(cursor.read_int()?, "master field count")? as usize;
        cursor.next()?;
        let master_fields = cursor.position();
        cursor.skip(master_field_count)?;
        if cursor.read_int()? != 0 {
            return Err(Error::corrupt("master entry terminator missing"));
        }
        cursor.next()?;

        Ok(NodeHeader {
            valid,
            deleted,
            master_field_count,
            master_fields,
            counters_end,
            first_record: cursor.position(),
        })
    }

    pub fn valid_count(&self) -> Result<u64> {
        self.header().map(|h| h.valid)
    }

    pub fn deleted_count(&self) -> Result<u64> {
        self.header().map(|h| h.deleted)
    }

    /// Master dictionary field names, in order.
    pub fn master_fields(&self) -> Result<Vec<&[u8]>> {
        let header = self.header()?;
        let mut cursor = self.cursor(header.master_fields);
        let mut names = Vec::with_capacity(header.master_field_count);
        for _ in 0..header.master_field_count {
            names.push(cursor.read_bytes()?);
            cursor.next()?;
        }
        Ok(names)
    }

    fn matches_master<F, V>(&self, header: &NodeHeader, fields: &[(F, V)]) -> Result<bool>
    where
        F: AsRef<[u8]>,
    {
        if fields.len() != header.master_field_count {
            return Ok(false);
        }
        let mut cursor = self.cursor(header.master_fields);
        for (field, _) in fields {
            if cursor.read_bytes()? != field.as_ref() {
                return Ok(false);
            }
            cursor.next()?;
        }
        Ok(true)
    }

    /// Append a record. The caller guarantees `id` is greater than every ID
    /// already in the node. Returns the flags the record was written with.
    pub fn append<F, V>(
        &mut self,
        id: StreamId,
        fields: &[(F, V)],
        alloc: &dyn NodeAllocator,
    ) -> Result<RecordFlags>
    where
        F: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let header = self.header()?;
        let flags = if self.matches_master(&header, fields)? {
            RecordFlags::SAME_FIELDS
        } else {
            RecordFlags::NONE
        };

        let mut record = Vec::new();
        encode_record(&mut record, self.key, id, fields, flags);

        let mut counters = Vec::new();
        pack::put_int(&mut counters, (header.valid + 1) as i64);
        pack::put_int(&mut counters, header.deleted as i64);

        let growth = record.len() + counters.len().saturating_sub(header.counters_end);
        alloc.reserve(&mut self.buf, growth)?;

        self.buf.splice(0..header.counters_end, counters);
        self.buf.extend_from_slice(&record);
        Ok(flags)
    }

    /// Parse the record whose flags element sits at `pos`.
    ///
    /// This is the one place that knows how many elements a record spans;
    /// `view.next` is where the following record starts.
    pub fn read_record(&self, pos: usize, header: &NodeHeader) -> Result<RecordView> {
        let mut cursor = self.cursor(pos);
        let flags = RecordFlags::from_bits(cursor.read_int()?)?;
        cursor.next()?;
        let ms_delta = cursor.read_int()?;
        cursor.next()?;
        let seq_delta = cursor.read_int()?;
        cursor.next()?;

        let id = StreamId::new(
            self.key.ms.wrapping_add(ms_delta as u64),
            self.key.seq.wrapping_add(seq_delta as u64),
        );

        let field_count = if flags.has_same_fields() {
            header.master_field_count
        } else {
            let count = as_count(cursor.read_int()?, "field count")? as usize;
            cursor.next()?;
            count
        };

        let body = cursor.position();
        let values = if flags.has_same_fields() {
            field_count
        } else {
            field_count.saturating_mul(2)
        };
        cursor.skip(values)?;

        let span = cursor.read_int()?;
        if span != record_span(flags, field_count) as i64 {
            return Err(Error::corrupt(format!(
                "record at offset {} spans {} elements, trailing length says {}",
                pos,
                record_span(flags, field_count),
                span
            )));
        }
        cursor.next()?;

        Ok(RecordView {
            flags,
            id,
            field_count,
            start: pos,
            body,
            next: cursor.position(),
        })
    }

    /// Offset of the first record, if the node holds any.
    pub fn first_record(&self, header: &NodeHeader) -> Option<usize> {
        (header.first_record < self.buf.len()).then_some(header.first_record)
    }

    /// Offset of the last record, if the node holds any.
    pub fn last_record(&self) -> Result<Option<usize>> {
        self.prev_record(self.buf.len())
    }

    /// Offset of the record preceding the one starting at `pos` (or preceding
    /// the end of the buffer), found through the trailing length fields.
    pub fn prev_record(&self, pos: usize) -> Result<Option<usize>> {
        let mut cursor = self.cursor(pos);
        if !cursor.prev()? {
            return Err(Error::corrupt("record offset at start of node"));
        }
        let span = cursor.read_int()?;
        if span == 0 {
            // Master entry terminator
            return Ok(None);
        }
        let span = usize::try_from(span)
            .map_err(|_| Error::corrupt(format!("negative record length {span}")))?;
        cursor.rewind(span)?;
        Ok(Some(cursor.position()))
    }

    /// Field/value pairs of a record, substituting dictionary names for
    /// SAMEFIELDS records.
    pub fn fields(&self, view: &RecordView, header: &NodeHeader) -> Result<Vec<(&[u8], &[u8])>> {
        let mut master = self.cursor(header.master_fields);
        let mut cursor = self.cursor(view.body);
        let mut pairs = Vec::with_capacity(view.field_count);
        for _ in 0..view.field_count {
            let field = if view.flags.has_same_fields() {
                let name = master.read_bytes()?;
                master.next()?;
                name
            } else {
                let name = cursor.read_bytes()?;
                cursor.next()?;
                name
            };
            let value = cursor.read_bytes()?;
            cursor.next()?;
            pairs.push((field, value));
        }
        Ok(pairs)
    }

    /// Owned copies of every live record, oldest first.
    pub fn records(&self) -> Result<Vec<Record>> {
        let header = self.header()?;
        let mut records = Vec::with_capacity(header.valid as usize);
        let mut pos = header.first_record;
        while pos < self.buf.len() {
            let view = self.read_record(pos, &header)?;
            if !view.flags.is_deleted() {
                let fields = self
                    .fields(&view, &header)?
                    .into_iter()
                    .map(|(f, v)| (Bytes::copy_from_slice(f), Bytes::copy_from_slice(v)))
                    .collect();
                records.push(Record::new(view.id, fields));
            }
            pos = view.next;
        }
        Ok(records)
    }

    /// ID of the newest record, deleted or not.
    pub fn last_id(&self) -> Result<Option<StreamId>> {
        let header = self.header()?;
        match self.last_record()? {
            Some(pos) => Ok(Some(self.read_record(pos, &header)?.id)),
            None => Ok(None),
        }
    }

    /// Rewrite the `valid` and `deleted` counters.
    ///
    /// Returns how far everything after the counters moved.
    fn set_counts(&mut self, valid: u64, deleted: u64, alloc: &dyn NodeAllocator) -> Result<isize> {
        let counters_end = self.header()?.counters_end;
        let mut counters = Vec::with_capacity(pack::int_len(valid as i64) * 2);
        pack::put_int(&mut counters, valid as i64);
        pack::put_int(&mut counters, deleted as i64);

        let shift = counters.len() as isize - counters_end as isize;
        alloc.reserve(&mut self.buf, counters.len().saturating_sub(counters_end))?;
        self.buf.splice(0..counters_end, counters);
        Ok(shift)
    }

    /// Set the DELETED flag on the record at `pos` without touching counters.
    /// Returns `false` if it was already deleted.
    fn set_deleted_flag(&mut self, pos: usize) -> Result<bool> {
        let cursor = self.cursor(pos);
        let flags = RecordFlags::from_bits(cursor.read_int()?)?;
        if flags.is_deleted() {
            return Ok(false);
        }
        let end = cursor.element_end()?;

        let mut element = Vec::with_capacity(end - pos);
        pack::put_int(&mut element, (flags | RecordFlags::DELETED).bits() as i64);
        if element.len() != end - pos {
            // Flag values stay below 64, so their encoding never changes size
            return Err(Error::corrupt(format!(
                "flags element at offset {pos} has unexpected width"
            )));
        }
        self.buf[pos..end].copy_from_slice(&element);
        Ok(true)
    }

    /// Soft-delete the record starting at `pos`, updating the master counters.
    /// Returns `false` (and changes nothing) if it was already deleted.
    pub fn mark_deleted(&mut self, pos: usize, alloc: &dyn NodeAllocator) -> Result<bool> {
        let header = self.header()?;
        let view = self.read_record(pos, &header)?;
        if view.flags.is_deleted() {
            return Ok(false);
        }
        if header.valid == 0 {
            return Err(Error::corrupt("live record in node with zero valid count"));
        }

        let shift = self.set_counts(header.valid - 1, header.deleted + 1, alloc)?;
        let moved = pos
            .checked_add_signed(shift)
            .ok_or_else(|| Error::corrupt("record offset moved out of range"))?;
        self.set_deleted_flag(moved)
    }

    /// Soft-delete the `count` oldest live records. Returns how many were
    /// flagged, which is `count` capped at the number of live records.
    pub fn delete_oldest(&mut self, count: u64, alloc: &dyn NodeAllocator) -> Result<u64> {
        let header = self.header()?;
        let count = count.min(header.valid);
        if count == 0 {
            return Ok(0);
        }

        // Counters first: the only step that can fail on allocation
        self.set_counts(header.valid - count, header.deleted + count, alloc)?;
        let header = self.header()?;

        let mut flagged = 0;
        let mut pos = header.first_record;
        while flagged < count && pos < self.buf.len() {
            let view = self.read_record(pos, &header)?;
            if self.set_deleted_flag(pos)? {
                flagged += 1;
            }
            pos = view.next;
        }

        if flagged != count {
            return Err(Error::corrupt(format!(
                "valid count promised {count} live records, found {flagged}"
            )));
        }
        Ok(flagged)
    }

    /// Copy of this node without its deleted records, keeping key and
    /// dictionary. `None` when nothing live remains.
    pub fn compact(&self, alloc: &dyn NodeAllocator) -> Result<Option<Node>> {
        let header = self.header()?;
        if header.valid == 0 {
            return Ok(None);
        }

        let mut scratch = Vec::with_capacity(self.buf.len());
        pack::put_int(&mut scratch, header.valid as i64);
        pack::put_int(&mut scratch, 0);
        scratch.extend_from_slice(&self.buf[header.counters_end..header.first_record]);

        let mut pos = header.first_record;
        while pos < self.buf.len() {
            let view = self.read_record(pos, &header)?;
            if !view.flags.is_deleted() {
                scratch.extend_from_slice(&self.buf[view.start..view.next]);
            }
            pos = view.next;
        }

        let mut buf = Vec::new();
        alloc.reserve(&mut buf, scratch.len())?;
        buf.extend_from_slice(&scratch);
        Ok(Some(Node { key: self.key, buf }))
    }

    /// Check every structural invariant: counters, record shapes, trailing
    /// lengths (both directions) and ID order.
    pub fn validate(&self) -> Result<()> {
        let header = self.header()?;
        let mut valid = 0u64;
        let mut deleted = 0u64;
        let mut last: Option<StreamId> = None;
        let mut pos = header.first_record;

        while pos < self.buf.len() {
            let view = self.read_record(pos, &header)?;
            if view.id < self.key || last.is_some_and(|prev| view.id <= prev) {
                return Err(Error::corrupt(format!(
                    "record {} out of order in node {}",
                    view.id, self.key
                )));
            }
            if self.prev_record(view.next)? != Some(pos) {
                return Err(Error::corrupt(format!(
                    "reverse walk does not land on record {}",
                    view.id
                )));
            }
            self.fields(&view, &header)?;

            if view.flags.is_deleted() {
                deleted += 1;
            } else {
                valid += 1;
            }
            last = Some(view.id);
            pos = view.next;
        }

        if valid != header.valid || deleted != header.deleted {
            return Err(Error::corrupt(format!(
                "counters say {}/{} valid/deleted, records say {}/{}",
                header.valid, header.deleted, valid, deleted
            )));
        }
        if valid + deleted == 0 {
            return Err(Error::corrupt("node holds no records"));
        }
        Ok(())
    }
}

fn encode_record<F, V>(
    buf: &mut Vec<u8>,
    master: StreamId,
    id: StreamId,
    fields: &[(F, V)],
    flags: RecordFlags,
) where
    F: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let same = flags.has_same_fields();
    pack::put_int(buf, flags.bits() as i64);
    pack::put_int(buf, id.ms.wrapping_sub(master.ms) as i64);
    pack::put_int(buf, id.seq.wrapping_sub(master.seq) as i64);
    if !same {
        pack::put_int(buf, fields.len() as i64);
    }
    for (field, value) in fields {
        if !same {
            pack::put_bytes(buf, field.as_ref());
        }
        pack::put_bytes(buf, value.as_ref());
    }
    pack::put_int(buf, record_span(flags, fields.len()) as i64);
}
