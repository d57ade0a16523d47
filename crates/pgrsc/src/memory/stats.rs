use serde::Serialize;

use crate::memory::ChunkKind;
use crate::paging::{SIZE_CLASS_COUNT, SizeClass};

/// Occupancy snapshot of one chunk pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub kind: ChunkKind,
    pub base: u64,
    pub capacity: u64,
    pub chunk_count: usize,
    pub allocated_bytes: u64,
    /// Live chunk count per size class, indexed by class
    pub chunks_by_class: [usize; SIZE_CLASS_COUNT],
}

impl PoolStats {
    pub fn chunks_of(&self, size_class: SizeClass) -> usize {
        self.chunks_by_class[size_class.index()]
    }

    pub fn free_bytes(&self) -> u64 {
        self.capacity.saturating_sub(self.allocated_bytes)
    }
}

/// Format a byte count with an appropriate unit: `512 Bytes`, `1.21 KB`,
/// `1.21 MB` or `1.21 GB`.
pub fn format_bytes(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    let size_f = size as f64;
    if size < KB {
        format!("{} Bytes", size)
    } else if size < MB {
        format!("{:.2} KB", size_f / KB as f64)
    } else if size < GB {
        format!("{:.2} MB", size_f / MB as f64)
    } else {
        format!("{:.2} GB", size_f / GB as f64)
    }
}
