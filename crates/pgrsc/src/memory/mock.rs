//! Allocator double that counts calls.

use crate::error::{Error, Result};
use crate::memory::{ChunkAllocator, ChunkKind, PoolStats, ReadMemory, WriteMemory};
use crate::paging::SizeClass;

/// Wraps another allocator and records how often it was asked to
/// allocate or free.
pub struct CountingAllocator<A> {
    inner: A,
    pub allocations: usize,
    pub frees: usize,
    /// Allocations allowed before every further request runs out of memory
    pub budget: Option<usize>,
}

impl<A: ChunkAllocator> CountingAllocator<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            allocations: 0,
            frees: 0,
            budget: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.allocations + self.frees
    }
}

impl<A: ChunkAllocator> ReadMemory for CountingAllocator<A> {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.inner.read_bytes(address, size)
    }
}

impl<A: ChunkAllocator> WriteMemory for CountingAllocator<A> {
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        self.inner.write_bytes(address, bytes)
    }
}

impl<A: ChunkAllocator> ChunkAllocator for CountingAllocator<A> {
    fn allocate(&mut self, size_class: SizeClass, kind: ChunkKind) -> Result<u64> {
        self.allocations += 1;
        if let Some(budget) = self.budget {
            if budget == 0 {
                return Err(Error::OutOfMemory { kind, size_class });
            }
            self.budget = Some(budget - 1);
        }
        self.inner.allocate(size_class, kind)
    }

    fn free(&mut self, address: u64, size_class: SizeClass, kind: ChunkKind) -> Result<()> {
        self.frees += 1;
        self.inner.free(address, size_class, kind)
    }

    fn stats(&self, kind: ChunkKind) -> PoolStats {
        self.inner.stats(kind)
    }
}
