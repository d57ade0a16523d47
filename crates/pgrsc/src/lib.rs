//! Paged resource memory model.
//!
//! Object graphs are serialized into a few size-class chunks, written to a
//! resource file, and loaded back at arbitrary heap addresses with every
//! internal pointer fixed up. Loaded objects remember their chunks in a
//! compact [`paging::MiniMap`] so they can be destroyed chunk by chunk,
//! moved by defragmentation, or exported again.
//!
//! Memory is an explicit address space owned by a [`memory::ChunkHeap`];
//! everything is read and written through the [`memory::ReadMemory`] and
//! [`memory::WriteMemory`] traits.

pub mod config;
pub mod error;
pub mod format;
pub mod memory;
pub mod paging;
pub mod prelude;
pub mod texture;

pub use config::{HeapConfig, HeapConfigBuilder};
pub use error::{Error, Result};
pub use memory::format_bytes;
