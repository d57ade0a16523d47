//! Chunk memory.
//!
//! Chunks come from two independent pools:
//!
//! - **Virtual**: relocatable object-graph bytes, which may contain pointers
//! - **Physical**: raw payloads (pixel buffers and the like), never pointers
//!
//! Both pools live in one [`ChunkHeap`]; all access goes through the
//! [`ReadMemory`]/[`WriteMemory`] traits so loaded objects are read and
//! patched by address.

mod heap;
mod pool;
mod reader;
mod sparse;
mod stats;

#[cfg(test)]
pub mod mock;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::error::Result;
use crate::paging::SizeClass;

pub use heap::{ChunkHeap, HeapGuard};
pub use pool::ChunkPool;
pub use reader::{MAX_STRING_LEN, ReadMemory, WriteMemory};
pub use sparse::SparseMemory;
pub use stats::{PoolStats, format_bytes};

#[cfg(test)]
pub use mock::CountingAllocator;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    #[strum(serialize = "virtual")]
    Virtual,
    #[strum(serialize = "physical")]
    Physical,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Allocator for size-class chunks.
///
/// Implementations also expose the memory of the chunks they hand out.
/// Freeing an address that is not a live chunk of the given size class and
/// kind must fail with [`crate::Error::InvalidFree`] and leave the pool
/// untouched.
pub trait ChunkAllocator: WriteMemory {
    fn allocate(&mut self, size_class: SizeClass, kind: ChunkKind) -> Result<u64>;

    fn free(&mut self, address: u64, size_class: SizeClass, kind: ChunkKind) -> Result<()>;

    fn stats(&self, kind: ChunkKind) -> PoolStats;
}
