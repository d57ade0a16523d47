//! Paged resources.
//!
//! An object graph is stored as a handful of size-class chunks. Pointers
//! inside the chunks are serialized as source addresses; loading places
//! the chunks anywhere in the heap and rewrites those pointers through the
//! [`ResourceMap`]. The loaded object keeps only a [`MiniMap`] of the chunks
//! it owns.

mod address;
mod compiler;
mod loader;
mod map;
mod mini_map;
mod object;
mod resource;
mod size_class;

pub use address::{ADDRESS_MASK, PackedAddress, SIZE_CLASS_MASK};
pub use compiler::ResourceCompiler;
pub use loader::{defragment_resource, destroy_resource, export_resource, load_image, load_resource};
pub use map::{ChunkDescriptor, MAX_CHUNKS, PHYSICAL_BASE, ResourceMap, VIRTUAL_BASE};
pub use mini_map::MiniMap;
pub use object::{HandleIndexable, PagedObject};
pub use resource::{Direction, Paged, Resource};
pub use size_class::{BASE_CHUNK_SIZE, SIZE_CLASS_COUNT, SizeClass};
