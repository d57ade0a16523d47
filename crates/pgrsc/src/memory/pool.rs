//! A single chunk pool.
//!
//! A pool owns the address range `[base, base + capacity)` and hands out
//! size-class chunks from it. Placement is first-fit in ascending address
//! order, so the same sequence of requests against the same pool state
//! always yields the same addresses.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::{ChunkKind, PoolStats};
use crate::paging::{SIZE_CLASS_COUNT, SizeClass};

struct Chunk {
    size_class: SizeClass,
    data: Box<[u8]>,
}

impl Chunk {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

pub struct ChunkPool {
    kind: ChunkKind,
    base: u64,
    capacity: u64,
    /// Live chunks keyed by start address
    chunks: BTreeMap<u64, Chunk>,
}

impl ChunkPool {
    /// Create an empty pool. `base` must be aligned to the base chunk size;
    /// [`crate::HeapConfig::validate`] checks this before pools are built.
    pub fn new(kind: ChunkKind, base: u64, capacity: u64) -> Self {
        Self {
            kind,
            base,
            capacity,
            chunks: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn end(&self) -> u64 {
        self.base + self.capacity
    }

    /// Whether `address` falls inside this pool's address range
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn allocate(&mut self, size_class: SizeClass) -> Result<u64> {
        let size = size_class.bytes();
        let out_of_memory = || Error::OutOfMemory {
            kind: self.kind,
            size_class,
        };

        let mut cursor = self.base;
        for (&address, chunk) in &self.chunks {
            if address - cursor >= size {
                break;
            }
            cursor = address + chunk.len();
        }

        let end = cursor.checked_add(size).ok_or_else(out_of_memory)?;
        if end > self.end() {
            debug!(
                "{} pool exhausted: {} requested, {} free",
                self.kind,
                size_class,
                crate::format_bytes(self.capacity.saturating_sub(self.allocated_bytes()))
            );
            return Err(out_of_memory());
        }

        let data = vec![0u8; size as usize].into_boxed_slice();
        self.chunks.insert(cursor, Chunk { size_class, data });
        debug!("Allocated {} {} chunk at 0x{:X}", self.kind, size_class, cursor);
        Ok(cursor)
    }

    pub fn free(&mut self, address: u64, size_class: SizeClass) -> Result<()> {
        let reason = match self.chunks.get(&address) {
            None => "address is not the start of a live chunk".to_string(),
            Some(chunk) if chunk.size_class != size_class => format!(
                "size class mismatch (allocated as {}, freed as {})",
                chunk.size_class, size_class
            ),
            Some(_) => {
                self.chunks.remove(&address);
                debug!("Freed {} {} chunk at 0x{:X}", self.kind, size_class, address);
                return Ok(());
            }
        };

        warn!("Rejected free of {} chunk at 0x{:X}: {}", self.kind, address, reason);
        Err(Error::InvalidFree {
            address,
            kind: self.kind,
            reason,
        })
    }

    pub fn is_allocated(&self, address: u64) -> bool {
        self.chunks.contains_key(&address)
    }

    /// Find the chunk holding `[address, address + size)`, returning its
    /// start address.
    fn locate(&self, address: u64, size: usize) -> Result<u64> {
        let unmapped = || Error::UnmappedAddress { address, size };
        let (&start, chunk) = self
            .chunks
            .range(..=address)
            .next_back()
            .ok_or_else(unmapped)?;
        let end = address.checked_add(size as u64).ok_or_else(unmapped)?;
        if end > start + chunk.len() {
            return Err(unmapped());
        }
        Ok(start)
    }

    pub fn read(&self, address: u64, size: usize) -> Result<&[u8]> {
        let start = self.locate(address, size)?;
        let offset = (address - start) as usize;
        Ok(&self.chunks[&start].data[offset..offset + size])
    }

    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        let start = self.locate(address, bytes.len())?;
        let offset = (address - start) as usize;
        if let Some(chunk) = self.chunks.get_mut(&start) {
            chunk.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn allocated_bytes(&self) -> u64 {
        self.chunks.values().map(Chunk::len).sum()
    }

    pub fn stats(&self) -> PoolStats {
        let mut chunks_by_class = [0usize; SIZE_CLASS_COUNT];
        for chunk in self.chunks.values() {
            chunks_by_class[chunk.size_class.index()] += 1;
        }

        PoolStats {
            kind: self.kind,
            base: self.base,
            capacity: self.capacity,
            chunk_count: self.chunks.len(),
            allocated_bytes: self.allocated_bytes(),
            chunks_by_class,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::BASE_CHUNK_SIZE;

    const BASE: u64 = 0x10_0000_0000;

    fn class(n: u8) -> SizeClass {
        SizeClass::new(n).unwrap()
    }

    fn pool(chunks: u64) -> ChunkPool {
        ChunkPool::new(ChunkKind::Virtual, BASE, chunks * BASE_CHUNK_SIZE)
    }

    #[test]
    fn test_allocate_first_fit_is_ascending() {
        let mut pool = pool(8);
        let a = pool.allocate(class(0)).unwrap();
        let b = pool.allocate(class(1)).unwrap();
        let c = pool.allocate(class(0)).unwrap();

        assert_eq!(a, BASE);
        assert_eq!(b, BASE + BASE_CHUNK_SIZE);
        assert_eq!(c, BASE + 3 * BASE_CHUNK_SIZE);
    }

    #[test]
    fn test_allocate_reuses_gaps() {
        let mut pool = pool(8);
        let a = pool.allocate(class(0)).unwrap();
        let _b = pool.allocate(class(0)).unwrap();
        pool.free(a, class(0)).unwrap();

        // A class-1 chunk does not fit in the 8 KiB hole at the start.
        let c = pool.allocate(class(1)).unwrap();
        assert_eq!(c, BASE + 2 * BASE_CHUNK_SIZE);

        // A class-0 chunk does.
        let d = pool.allocate(class(0)).unwrap();
        assert_eq!(d, BASE);
    }

    #[test]
    fn test_allocate_out_of_memory() {
        let mut pool = pool(2);
        pool.allocate(class(0)).unwrap();

        let err = pool.allocate(class(1)).unwrap_err();
        assert!(err.is_out_of_memory());

        // The failed request leaves room for one more small chunk.
        assert!(pool.allocate(class(0)).is_ok());
        assert!(pool.allocate(class(0)).is_err());
    }

    #[test]
    fn test_allocation_is_zeroed() {
        let mut pool = pool(1);
        let a = pool.allocate(class(0)).unwrap();
        pool.write(a, &[0xAA; 16]).unwrap();
        pool.free(a, class(0)).unwrap();

        let b = pool.allocate(class(0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.read(b, 16).unwrap(), &[0u8; 16]);
    }

    #[test]
    fn test_free_rejects_unknown_and_mismatched() {
        let mut pool = pool(4);
        let a = pool.allocate(class(1)).unwrap();

        assert!(matches!(
            pool.free(a + 0x10, class(1)),
            Err(Error::InvalidFree { .. })
        ));
        assert!(matches!(
            pool.free(a, class(0)),
            Err(Error::InvalidFree { .. })
        ));
        // Rejected frees leave the chunk alive.
        assert!(pool.is_allocated(a));

        pool.free(a, class(1)).unwrap();
        assert!(matches!(
            pool.free(a, class(1)),
            Err(Error::InvalidFree { .. })
        ));
    }

    #[test]
    fn test_access_must_stay_inside_one_chunk() {
        let mut pool = pool(4);
        let a = pool.allocate(class(0)).unwrap();
        let _b = pool.allocate(class(0)).unwrap();

        assert!(pool.read(a + BASE_CHUNK_SIZE - 8, 8).is_ok());
        // Straddles two adjacent chunks.
        assert!(matches!(
            pool.read(a + BASE_CHUNK_SIZE - 4, 8),
            Err(Error::UnmappedAddress { .. })
        ));
        assert!(pool.read(BASE - 8, 4).is_err());
        assert!(pool.write(BASE + 3 * BASE_CHUNK_SIZE, &[1]).is_err());
    }

    #[test]
    fn test_stats_by_class() {
        let mut pool = pool(8);
        pool.allocate(class(0)).unwrap();
        pool.allocate(class(0)).unwrap();
        pool.allocate(class(2)).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.chunks_of(class(0)), 2);
        assert_eq!(stats.chunks_of(class(2)), 1);
        assert_eq!(stats.allocated_bytes, 6 * BASE_CHUNK_SIZE);
        assert_eq!(stats.free_bytes(), 2 * BASE_CHUNK_SIZE);
    }
}
