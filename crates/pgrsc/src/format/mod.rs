//! On-disk resource images.
//!
//! ```text
//! 0x00  magic "RSC7"
//! 0x04  version (u32)
//! 0x08  flags (u32), bit 0 = deflate payload
//! 0x0C  virtual chunk count (u16)
//! 0x0E  physical chunk count (u16)
//! 0x10  chunk table: size class (u8), 3 reserved bytes, file offset (u32)
//! ```
//!
//! File offsets are absolute offsets into the uncompressed image. When the
//! payload is compressed, everything after the chunk table is one raw
//! deflate stream.

mod header;
mod image;

pub use header::{
    ChunkEntry, ENTRY_SIZE, FLAG_COMPRESSED, HEADER_SIZE, MAGIC, ResourceHeader, VERSION,
};
pub use image::ResourceImage;
