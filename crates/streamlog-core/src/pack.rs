//! Packed Elements and the Node Cursor
//!
//! A node buffer is a flat sequence of *elements*. Every element is either an
//! integer or a byte string, and is laid out as:
//!
//! ```text
//! ┌───────────┬──────────────────────┬──────────────────────┐
//! │ tag       │ payload              │ back-length          │
//! │ (varint)  │ int: zigzag varint   │ size of tag+payload, │
//! │ 0 = int   │ bytes: raw bytes     │ reversed varint      │
//! │ 2n+1 = n  │                      │                      │
//! │   bytes   │                      │                      │
//! └───────────┴──────────────────────┴──────────────────────┘
//! ```
//!
//! The tag makes every element self-describing left to right; the back-length
//! makes it self-describing right to left. [`Cursor`] is the only code that
//! knows this layout: the append, trim and iteration paths all move through a
//! node with `next`/`prev` on a cursor.

use bytes::BufMut;

use crate::varint::{
    decode_backlen, decode_varint, decode_varint_u64, encode_backlen, encode_varint,
    encode_varint_u64, varint_len, zigzag_encode,
};
use crate::{Error, Result};

const TAG_INT: u64 = 0;

/// A decoded element, borrowing byte strings from the node buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element<'a> {
    Int(i64),
    Bytes(&'a [u8]),
}

/// Append an integer element.
pub fn put_int(buf: &mut Vec<u8>, value: i64) {
    let start = buf.len();
    encode_varint_u64(buf, TAG_INT);
    encode_varint(buf, value);
    let body = buf.len() - start;
    encode_backlen(buf, body as u64);
}

/// Append a byte-string element.
pub fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    let start = buf.len();
    encode_varint_u64(buf, ((bytes.len() as u64) << 1) | 1);
    buf.put_slice(bytes);
    let body = buf.len() - start;
    encode_backlen(buf, body as u64);
}

/// Encoded size of an integer element, back-length included.
pub fn int_len(value: i64) -> usize {
    element_len(varint_len(TAG_INT) + varint_len(zigzag_encode(value)))
}

/// Encoded size of a byte-string element of `len` bytes, back-length included.
pub fn bytes_len(len: usize) -> usize {
    element_len(varint_len(((len as u64) << 1) | 1) + len)
}

fn element_len(body: usize) -> usize {
    body + varint_len(body as u64)
}

/// Position within a packed buffer, always at the start of an element or at
/// the end of the buffer.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Decode the element under the cursor together with its tag+payload size.
    fn decode(&self) -> Result<(Element<'a>, usize)> {
        if self.at_end() {
            return Err(Error::UnexpectedEof);
        }

        let mut rest: &'a [u8] = &self.buf[self.pos..];
        let before = rest.len();
        let tag = decode_varint_u64(&mut rest)?;

        let element = if tag == TAG_INT {
            Element::Int(decode_varint(&mut rest)?)
        } else if tag & 1 == 1 {
            let len = usize::try_from(tag >> 1).map_err(|_| Error::UnexpectedEof)?;
            if rest.len() < len {
                return Err(Error::UnexpectedEof);
            }
            let (data, tail) = rest.split_at(len);
            rest = tail;
            Element::Bytes(data)
        } else {
            return Err(Error::corrupt(format!(
                "unknown element tag {} at offset {}",
                tag, self.pos
            )));
        };

        Ok((element, before - rest.len()))
    }

    pub fn read(&self) -> Result<Element<'a>> {
        self.decode().map(|(element, _)| element)
    }

    pub fn read_int(&self) -> Result<i64> {
        match self.read()? {
            Element::Int(value) => Ok(value),
            Element::Bytes(_) => Err(Error::corrupt(format!(
                "expected integer element at offset {}",
                self.pos
            ))),
        }
    }

    pub fn read_bytes(&self) -> Result<&'a [u8]> {
        match self.read()? {
            Element::Bytes(data) => Ok(data),
            Element::Int(_) => Err(Error::corrupt(format!(
                "expected byte-string element at offset {}",
                self.pos
            ))),
        }
    }

    /// Step over the current element. The stored back-length must agree with
    /// the forward size, otherwise reverse traversal would desynchronise.
    pub fn next(&mut self) -> Result<()> {
        let (_, body) = self.decode()?;
        let stop = self.pos + body + varint_len(body as u64);
        if stop > self.buf.len() {
            return Err(Error::UnexpectedEof);
        }
        let (stored, _) = decode_backlen(self.buf, stop)?;
        if stored != body as u64 {
            return Err(Error::corrupt(format!(
                "back-length {} does not match element size {} at offset {}",
                stored, body, self.pos
            )));
        }
        self.pos = stop;
        Ok(())
    }

    /// Step back to the preceding element. Returns `false` at the buffer start.
    pub fn prev(&mut self) -> Result<bool> {
        if self.pos == 0 {
            return Ok(false);
        }
        let (body, used) = decode_backlen(self.buf, self.pos)?;
        let start = usize::try_from(body)
            .ok()
            .and_then(|body| self.pos.checked_sub(used + body))
            .ok_or_else(|| {
                Error::corrupt(format!("back-length at offset {} points before start", self.pos))
            })?;
        self.pos = start;
        Ok(true)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.next()?;
        }
        Ok(())
    }

    pub fn rewind(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            if !self.prev()? {
                return Err(Error::corrupt("rewound past the start of the node"));
            }
        }
        Ok(())
    }

    /// Offset just past the current element.
    pub fn element_end(&self) -> Result<usize> {
        let mut probe = *self;
        probe.next()?;
        Ok(probe.pos)
    }
}
