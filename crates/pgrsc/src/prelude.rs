//! Prelude module for convenient imports
//!
//! ```ignore
//! use pgrsc::prelude::*;
//! ```
//!
//! Brings the heap, the paging entry points, the texture types and the
//! error types into scope.

// Heap and memory access
pub use crate::config::HeapConfig;
pub use crate::memory::{ChunkAllocator, ChunkHeap, ChunkKind, ReadMemory, WriteMemory};

// Error handling
pub use crate::error::{Error, Result};

// Paging
pub use crate::paging::{
    MiniMap, Paged, PagedObject, ResourceCompiler, ResourceMap, SizeClass, defragment_resource,
    destroy_resource, export_resource, load_resource,
};

// Resource files
pub use crate::format::{ResourceHeader, ResourceImage};

// Typed resources
pub use crate::texture::{Texture, TextureDictionary, TextureFormat};
