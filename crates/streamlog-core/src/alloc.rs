//! Node Buffer Allocation
//!
//! Node buffers only ever grow through a [`NodeAllocator`]. The allocator is
//! handed to the stream at construction time, so an embedding store can meter
//! or cap the memory its streams use.
//!
//! Every node mutation asks the allocator for the *whole* growth it needs before
//! writing a single byte. A refusal therefore leaves the node exactly as it was.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Error, Result};

/// Grows and releases node buffers.
pub trait NodeAllocator: Send + Sync + fmt::Debug {
    /// Ensure `buf` can take `additional` more bytes without reallocating.
    fn reserve(&self, buf: &mut Vec<u8>, additional: usize) -> Result<()>;

    /// A buffer of `capacity` bytes is being dropped.
    fn release(&self, capacity: usize);
}

/// Allocator backed by the global heap; only fails if the heap does.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl NodeAllocator for SystemAllocator {
    fn reserve(&self, buf: &mut Vec<u8>, additional: usize) -> Result<()> {
        buf.try_reserve(additional)
            .map_err(|e| Error::AllocationFailure(e.to_string()))
    }

    fn release(&self, _capacity: usize) {}
}

/// Allocator with a hard cap on the total capacity of live node buffers.
#[derive(Debug)]
pub struct BoundedAllocator {
    limit: usize,
    used: AtomicUsize,
}

impl BoundedAllocator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Bytes currently charged to live buffers.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl NodeAllocator for BoundedAllocator {
    fn reserve(&self, buf: &mut Vec<u8>, additional: usize) -> Result<()> {
        let wanted = buf.len().saturating_add(additional);
        if wanted <= buf.capacity() {
            return Ok(());
        }

        let growth = wanted - buf.capacity();
        let used = self.used();
        if used.saturating_add(growth) > self.limit {
            return Err(Error::AllocationFailure(format!(
                "node memory limit reached: {} + {} > {} bytes",
                used, growth, self.limit
            )));
        }

        let before = buf.capacity();
        buf.try_reserve_exact(additional)
            .map_err(|e| Error::AllocationFailure(e.to_string()))?;
        self.used
            .fetch_add(buf.capacity() - before, Ordering::Relaxed);
        Ok(())
    }

    fn release(&self, capacity: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_sub(capacity))
            });
    }
}
