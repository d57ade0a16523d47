//! Process-wide chunk heap.
//!
//! The heap owns the virtual and physical pools behind one mutex.
//! [`ChunkHeap::lock`] hands out a [`HeapGuard`], which is the
//! [`ChunkAllocator`] that load, destroy and defragment operations run
//! against. Holding one guard for a whole operation keeps partially freed
//! or partially placed chunk sets invisible to other threads.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::config::HeapConfig;
use crate::error::{Error, Result};
use crate::memory::{ChunkAllocator, ChunkKind, ChunkPool, PoolStats, ReadMemory, WriteMemory};
use crate::paging::SizeClass;

struct Pools {
    virtual_pool: ChunkPool,
    physical_pool: ChunkPool,
}

impl Pools {
    fn pool(&self, kind: ChunkKind) -> &ChunkPool {
        match kind {
            ChunkKind::Virtual => &self.virtual_pool,
            ChunkKind::Physical => &self.physical_pool,
        }
    }

    fn pool_mut(&mut self, kind: ChunkKind) -> &mut ChunkPool {
        match kind {
            ChunkKind::Virtual => &mut self.virtual_pool,
            ChunkKind::Physical => &mut self.physical_pool,
        }
    }

    /// Pool whose address range contains `address`
    fn route(&self, address: u64) -> Option<&ChunkPool> {
        [&self.virtual_pool, &self.physical_pool]
            .into_iter()
            .find(|pool| pool.contains(address))
    }
}

pub struct ChunkHeap {
    config: HeapConfig,
    pools: Mutex<Pools>,
}

impl ChunkHeap {
    pub fn new(config: HeapConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Creating chunk heap: virtual 0x{:X}+0x{:X}, physical 0x{:X}+0x{:X}",
            config.virtual_base,
            config.virtual_capacity,
            config.physical_base,
            config.physical_capacity
        );

        let pools = Pools {
            virtual_pool: ChunkPool::new(
                ChunkKind::Virtual,
                config.virtual_base,
                config.virtual_capacity,
            ),
            physical_pool: ChunkPool::new(
                ChunkKind::Physical,
                config.physical_base,
                config.physical_capacity,
            ),
        };

        Ok(Self {
            config,
            pools: Mutex::new(pools),
        })
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Lock both pools.
    ///
    /// Every pool operation updates bookkeeping in one step, so a guard
    /// recovered from a poisoned mutex still sees consistent pools.
    pub fn lock(&self) -> HeapGuard<'_> {
        let pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        HeapGuard { pools }
    }

    /// Occupancy of one pool, taking the lock briefly
    pub fn stats(&self, kind: ChunkKind) -> PoolStats {
        self.lock().stats(kind)
    }
}

/// Exclusive access to the chunk heap.
pub struct HeapGuard<'a> {
    pools: MutexGuard<'a, Pools>,
}

impl HeapGuard<'_> {
    /// Whether a chunk of `kind` starts at `address`
    pub fn is_allocated(&self, address: u64, kind: ChunkKind) -> bool {
        self.pools.pool(kind).is_allocated(address)
    }
}

impl ReadMemory for HeapGuard<'_> {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let pool = self
            .pools
            .route(address)
            .ok_or(Error::UnmappedAddress { address, size })?;
        Ok(pool.read(address, size)?.to_vec())
    }
}

impl WriteMemory for HeapGuard<'_> {
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        let kind = self
            .pools
            .route(address)
            .map(ChunkPool::kind)
            .ok_or(Error::UnmappedAddress {
                address,
                size: bytes.len(),
            })?;
        self.pools.pool_mut(kind).write(address, bytes)
    }
}

impl ChunkAllocator for HeapGuard<'_> {
    fn allocate(&mut self, size_class: SizeClass, kind: ChunkKind) -> Result<u64> {
        self.pools.pool_mut(kind).allocate(size_class)
    }

    fn free(&mut self, address: u64, size_class: SizeClass, kind: ChunkKind) -> Result<()> {
        self.pools.pool_mut(kind).free(address, size_class)
    }

    fn stats(&self, kind: ChunkKind) -> PoolStats {
        self.pools.pool(kind).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::BASE_CHUNK_SIZE;
    use std::sync::Arc;
    use std::thread;

    fn small_heap() -> ChunkHeap {
        let config = HeapConfig::builder()
            .virtual_capacity(64 * BASE_CHUNK_SIZE)
            .physical_capacity(64 * BASE_CHUNK_SIZE)
            .build();
        ChunkHeap::new(config).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = HeapConfig::builder().virtual_capacity(0).build();
        assert!(matches!(ChunkHeap::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_pools_are_independent() {
        let heap = small_heap();
        let mut guard = heap.lock();

        let v = guard.allocate(SizeClass::MIN, ChunkKind::Virtual).unwrap();
        let p = guard.allocate(SizeClass::MIN, ChunkKind::Physical).unwrap();
        assert_eq!(v, heap.config().virtual_base);
        assert_eq!(p, heap.config().physical_base);

        // Freeing through the wrong pool is rejected.
        assert!(matches!(
            guard.free(v, SizeClass::MIN, ChunkKind::Physical),
            Err(Error::InvalidFree { .. })
        ));
        assert!(guard.is_allocated(v, ChunkKind::Virtual));
    }

    #[test]
    fn test_memory_routes_by_address() {
        let heap = small_heap();
        let mut guard = heap.lock();

        let v = guard.allocate(SizeClass::MIN, ChunkKind::Virtual).unwrap();
        let p = guard.allocate(SizeClass::MIN, ChunkKind::Physical).unwrap();

        guard.write_u64(v + 8, 0xDEAD_BEEF).unwrap();
        guard.write_u32(p, 0x1234_5678).unwrap();

        assert_eq!(guard.read_u64(v + 8).unwrap(), 0xDEAD_BEEF);
        assert_eq!(guard.read_u32(p).unwrap(), 0x1234_5678);
        assert_eq!(guard.read_u16(p + 2).unwrap(), 0x1234);
        assert!(guard.read_u8(0x10).is_err());
    }

    #[test]
    fn test_read_c_string() {
        let heap = small_heap();
        let mut guard = heap.lock();
        let v = guard.allocate(SizeClass::MIN, ChunkKind::Virtual).unwrap();

        guard.write_bytes(v, b"checker\0garbage").unwrap();
        assert_eq!(guard.read_c_string(v).unwrap(), "checker");
    }

    #[test]
    fn test_concurrent_allocation() {
        let heap = Arc::new(small_heap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let heap = Arc::clone(&heap);
                thread::spawn(move || {
                    (0..8)
                        .map(|_| {
                            heap.lock()
                                .allocate(SizeClass::MIN, ChunkKind::Virtual)
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut addresses: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        addresses.sort_unstable();
        addresses.dedup();

        assert_eq!(addresses.len(), 32);
        assert_eq!(heap.stats(ChunkKind::Virtual).chunk_count, 32);
    }
}
