//! Loading and releasing whole resources.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::format::ResourceImage;
use crate::memory::{ChunkAllocator, ReadMemory};
use crate::paging::object::{place_chunks, release_chunks};
use crate::paging::{Direction, MiniMap, Paged, PagedObject, Resource};

/// Parse a resource file and bring its root object to life.
pub fn load_resource<T: Paged, A: ChunkAllocator + ?Sized>(
    bytes: &[u8],
    alloc: &mut A,
) -> Result<PagedObject<T>> {
    let image = ResourceImage::parse(bytes).inspect_err(|e| {
        warn!("Rejected resource file ({} bytes): {}", bytes.len(), e);
    })?;
    load_image(&image, alloc)
}

/// Place every chunk of `image`, copy its bytes, and fix the graph up.
///
/// Virtual chunks are allocated first, then physical chunks, each in map
/// order. Nothing is left allocated if any step fails.
pub fn load_image<T: Paged, A: ChunkAllocator + ?Sized>(
    image: &ResourceImage,
    alloc: &mut A,
) -> Result<PagedObject<T>> {
    let mut map = image.map().clone();
    let mut placed = Vec::with_capacity(map.len());

    let result = place_chunks(&mut map, image.chunks(), alloc, &mut placed).and_then(|()| {
        let root = map
            .main_chunk()
            .map(|chunk| chunk.destination)
            .ok_or_else(|| Error::corrupt("resource has no virtual chunk"))?;
        let mut rsc = Resource::new(&map, &mut *alloc, Direction::Load);
        rsc.place_object::<T>(root)?;
        let fixups = rsc.fixup_count();
        Ok((root, fixups, MiniMap::build(&map)?))
    });

    match result {
        Ok((root, fixups, mini)) => {
            info!(
                "Loaded resource at 0x{:X}: {} virtual + {} physical chunks, {} pointers fixed",
                root,
                mini.virtual_chunk_count(),
                mini.physical_chunk_count(),
                fixups
            );
            Ok(PagedObject::from_loaded(root, mini))
        }
        Err(e) => {
            warn!(
                "Loading resource failed after {} of {} chunks: {}",
                placed.len(),
                map.len(),
                e
            );
            release_chunks(alloc, &placed);
            Err(e)
        }
    }
}

pub fn destroy_resource<T, A: ChunkAllocator + ?Sized>(
    object: PagedObject<T>,
    alloc: &mut A,
) -> Result<()> {
    object.destroy(alloc)
}

pub fn defragment_resource<T: Paged, A: ChunkAllocator + ?Sized>(
    object: PagedObject<T>,
    alloc: &mut A,
) -> Result<PagedObject<T>> {
    object.defragment(alloc)
}

/// Serialize a live or plain object back into resource file bytes.
pub fn export_resource<T: Paged, M: ReadMemory + ?Sized>(
    object: &PagedObject<T>,
    memory: &M,
    compress: bool,
) -> Result<Vec<u8>> {
    object.export(memory)?.to_bytes(compress)
}
