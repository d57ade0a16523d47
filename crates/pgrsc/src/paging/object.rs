//! Paged object handles.
//!
//! A [`PagedObject`] is either an ordinary heap value or an instance that
//! lives in allocator chunks. Loaded instances are only ever released
//! through [`PagedObject::destroy`] or replaced by
//! [`PagedObject::defragment`]; both consume the handle, so a destroyed
//! object cannot be reached again through it.

use std::marker::PhantomData;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::format::ResourceImage;
use crate::memory::{ChunkAllocator, ChunkKind, ReadMemory, SparseMemory, WriteMemory};
use crate::paging::{
    ChunkDescriptor, Direction, MiniMap, Paged, Resource, ResourceCompiler, ResourceMap, SizeClass,
};

/// Types that carry a slot index into an external handle table.
pub trait HandleIndexable: Paged {
    /// Offset of the `u32` handle index inside a live instance
    const HANDLE_INDEX_OFFSET: u64;

    fn handle_index(&self) -> u32;

    fn set_handle_index(&mut self, index: u32);
}

enum Inner<T> {
    Plain(Box<T>),
    Loaded {
        root: u64,
        map: MiniMap,
        _type: PhantomData<fn() -> T>,
    },
}

pub struct PagedObject<T> {
    inner: Inner<T>,
}

impl<T> std::fmt::Debug for PagedObject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Inner::Plain(_) => f.write_str("PagedObject::Plain"),
            Inner::Loaded { root, map, .. } => f
                .debug_struct("PagedObject::Loaded")
                .field("root", &format_args!("0x{:X}", root))
                .field("chunks", &map.chunk_count())
                .finish(),
        }
    }
}

impl<T> PagedObject<T> {
    /// Wrap an ordinary value. It has no map and owns no chunks.
    pub fn new(value: T) -> Self {
        Self {
            inner: Inner::Plain(Box::new(value)),
        }
    }

    /// Take ownership of an instance already placed at `root` whose chunks
    /// are listed by `map`.
    pub fn from_loaded(root: u64, map: MiniMap) -> Self {
        Self {
            inner: Inner::Loaded {
                root,
                map,
                _type: PhantomData,
            },
        }
    }

    pub fn has_map(&self) -> bool {
        matches!(self.inner, Inner::Loaded { .. })
    }

    pub fn root_address(&self) -> Option<u64> {
        match &self.inner {
            Inner::Plain(_) => None,
            Inner::Loaded { root, .. } => Some(*root),
        }
    }

    pub fn mini_map(&self) -> Option<&MiniMap> {
        match &self.inner {
            Inner::Plain(_) => None,
            Inner::Loaded { map, .. } => Some(map),
        }
    }

    /// Full map of the chunks this object owns, or `None` for plain values.
    pub fn regenerate_map(&self) -> Option<ResourceMap> {
        self.mini_map().map(MiniMap::regenerate)
    }

    pub fn as_plain(&self) -> Option<&T> {
        match &self.inner {
            Inner::Plain(value) => Some(value),
            Inner::Loaded { .. } => None,
        }
    }

    pub fn as_plain_mut(&mut self) -> Option<&mut T> {
        match &mut self.inner {
            Inner::Plain(value) => Some(value),
            Inner::Loaded { .. } => None,
        }
    }

    /// Release the object.
    ///
    /// Plain values are dropped without touching the allocator. Loaded
    /// instances free physical chunks first, then virtual chunks in reverse
    /// so the main chunk goes last. Every chunk is attempted; the first
    /// failure is returned.
    pub fn destroy<A: ChunkAllocator + ?Sized>(self, alloc: &mut A) -> Result<()> {
        let (root, map) = match self.inner {
            Inner::Plain(_) => return Ok(()),
            Inner::Loaded { root, map, .. } => (root, map),
        };

        let chunks = destroy_order(&map.regenerate());
        let mut first_error = None;
        for (address, size_class, kind) in &chunks {
            if let Err(e) = alloc.free(*address, *size_class, *kind) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => {
                info!(
                    "Destroyed paged object at 0x{:X} ({} chunks, {})",
                    root,
                    chunks.len(),
                    crate::format_bytes(map.total_size())
                );
                Ok(())
            }
            Some(e) => {
                warn!("Destroying paged object at 0x{:X} failed: {}", root, e);
                Err(e)
            }
        }
    }
}

impl<T: Paged> PagedObject<T> {
    /// Read the object back into an owned value.
    pub fn read<M: ReadMemory + ?Sized>(&self, memory: &M) -> Result<T>
    where
        T: Clone,
    {
        match &self.inner {
            Inner::Plain(value) => Ok((**value).clone()),
            Inner::Loaded { root, .. } => {
                match memory.read_bytes(*root, T::SIZE as usize) {
                    Err(Error::UnmappedAddress { .. }) => {
                        return Err(Error::UseAfterDestroy { address: *root });
                    }
                    Err(e) => return Err(e),
                    Ok(_) => {}
                }
                T::read(memory, *root)
            }
        }
    }

    /// Move a loaded instance into freshly allocated chunks.
    ///
    /// The chunk bytes are snapshotted, every chunk is freed, and the
    /// snapshot is placed again in allocation order and fixed up with the
    /// old live addresses as sources. With a first-fit allocator this
    /// compacts the object towards the start of each pool.
    ///
    /// On failure the object is gone: whatever was allocated for the new
    /// placement is freed again before the error is returned.
    pub fn defragment<A: ChunkAllocator + ?Sized>(self, alloc: &mut A) -> Result<Self> {
        let (old_root, map) = match self.inner {
            Inner::Plain(value) => return Ok(Self::new(*value)),
            Inner::Loaded { root, map, .. } => (root, map),
        };

        let old = map.regenerate();
        let snapshot = old
            .chunks()
            .iter()
            .map(|chunk| alloc.read_bytes(chunk.destination, chunk.size() as usize))
            .collect::<Result<Vec<_>>>()?;

        PagedObject::<T>::from_loaded(old_root, map).destroy(alloc)?;

        let mut moved = old.rebased();
        let mut placed = Vec::with_capacity(moved.len());
        let result = place_chunks(&mut moved, &snapshot, alloc, &mut placed).and_then(|()| {
            let new_root = moved
                .translate(old_root)
                .ok_or_else(|| Error::corrupt("root is outside of its own chunks"))?;
            Resource::new(&moved, &mut *alloc, Direction::Load).place_object::<T>(new_root)?;
            let mini = MiniMap::build(&moved)?;
            Ok((new_root, mini))
        });

        match result {
            Ok((new_root, mini)) => {
                let relocated = moved
                    .chunks()
                    .iter()
                    .filter(|chunk| chunk.source != chunk.destination)
                    .count();
                info!(
                    "Defragmented paged object 0x{:X} -> 0x{:X} ({} of {} chunks moved)",
                    old_root,
                    new_root,
                    relocated,
                    moved.len()
                );
                Ok(Self::from_loaded(new_root, mini))
            }
            Err(e) => {
                warn!("Defragmenting paged object at 0x{:X} failed: {}", old_root, e);
                release_chunks(alloc, &placed);
                Err(e)
            }
        }
    }

    /// Produce a resource image of the object with every pointer in
    /// source form.
    ///
    /// Plain values are compiled. Loaded instances are copied out of
    /// `memory` and their pointers translated back on the copy; live memory
    /// is not modified.
    pub fn export<M: ReadMemory + ?Sized>(&self, memory: &M) -> Result<ResourceImage> {
        let (root, mini) = match &self.inner {
            Inner::Plain(value) => return ResourceCompiler::compile(&**value),
            Inner::Loaded { root, map, .. } => (*root, map),
        };

        let mut map = mini.regenerate();
        map.assign_sources();

        let mut copy = SparseMemory::new();
        for chunk in map.chunks() {
            let data = memory.read_bytes(chunk.destination, chunk.size() as usize)?;
            copy.insert(chunk.destination, data)?;
        }

        let mut rsc = Resource::new(&map, &mut copy, Direction::Export);
        rsc.place_object::<T>(root)?;
        debug!(
            "Exported paged object at 0x{:X}: {} pointers reversed",
            root,
            rsc.fixup_count()
        );

        let chunks = map
            .chunks()
            .iter()
            .map(|chunk| {
                copy.take_region(chunk.destination)
                    .ok_or_else(|| Error::corrupt("exported chunk went missing"))
            })
            .collect::<Result<Vec<_>>>()?;
        ResourceImage::new(&map, chunks)
    }
}

impl<T: HandleIndexable> PagedObject<T> {
    pub fn handle_index<M: ReadMemory + ?Sized>(&self, memory: &M) -> Result<u32> {
        match &self.inner {
            Inner::Plain(value) => Ok(value.handle_index()),
            Inner::Loaded { root, .. } => memory.read_u32(root + T::HANDLE_INDEX_OFFSET),
        }
    }

    pub fn set_handle_index<M: WriteMemory + ?Sized>(&mut self, memory: &mut M, index: u32) -> Result<()> {
        match &mut self.inner {
            Inner::Plain(value) => {
                value.set_handle_index(index);
                Ok(())
            }
            Inner::Loaded { root, .. } => memory.write_u32(*root + T::HANDLE_INDEX_OFFSET, index),
        }
    }
}

/// Physical chunks in map order, then virtual chunks in reverse.
fn destroy_order(map: &ResourceMap) -> Vec<(u64, SizeClass, ChunkKind)> {
    let entry = |chunk: &ChunkDescriptor| (chunk.destination, chunk.size_class, chunk.kind);
    let physical = map
        .chunks()
        .iter()
        .filter(|chunk| chunk.kind == ChunkKind::Physical)
        .map(entry);
    let virtual_chunks = map
        .chunks()
        .iter()
        .rev()
        .filter(|chunk| chunk.kind == ChunkKind::Virtual)
        .map(entry);
    physical.chain(virtual_chunks).collect()
}

/// Allocate a destination for every chunk of `map` in map order and copy
/// its bytes in. Allocated chunks are recorded in `placed` as they succeed.
pub(crate) fn place_chunks<A: ChunkAllocator + ?Sized>(
    map: &mut ResourceMap,
    data: &[impl AsRef<[u8]>],
    alloc: &mut A,
    placed: &mut Vec<(u64, SizeClass, ChunkKind)>,
) -> Result<()> {
    for (chunk, bytes) in map.chunks_mut().iter_mut().zip(data) {
        let address = alloc.allocate(chunk.size_class, chunk.kind)?;
        placed.push((address, chunk.size_class, chunk.kind));
        chunk.destination = address;
        alloc.write_bytes(address, bytes.as_ref())?;
        debug!(
            "Placed {} chunk 0x{:X} at 0x{:X} ({})",
            chunk.kind, chunk.source, address, chunk.size_class
        );
    }
    Ok(())
}

/// Free chunks allocated by a placement that did not complete.
pub(crate) fn release_chunks<A: ChunkAllocator + ?Sized>(
    alloc: &mut A,
    placed: &[(u64, SizeClass, ChunkKind)],
) {
    for &(address, size_class, kind) in placed.iter().rev() {
        if let Err(e) = alloc.free(address, size_class, kind) {
            warn!("Failed to release chunk at 0x{:X}: {}", address, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;
    use crate::memory::{ChunkHeap, CountingAllocator};

    #[derive(Debug, Clone, PartialEq)]
    struct Blob {
        label: String,
        slot: u32,
        data: Vec<u8>,
    }

    impl Paged for Blob {
        const SIZE: u64 = 0x20;

        fn place<M: WriteMemory + ?Sized>(rsc: &mut Resource<'_, M>, address: u64) -> Result<()> {
            let len = rsc.memory().read_u32(address + 0x10)? as u64;
            rsc.fixup_data(address, ChunkKind::Virtual, 1)?;
            rsc.fixup_data(address + 0x08, ChunkKind::Physical, len)?;
            Ok(())
        }

        fn read<M: ReadMemory + ?Sized>(memory: &M, address: u64) -> Result<Self> {
            let label = memory.read_c_string(memory.read_u64(address)?)?;
            let len = memory.read_u32(address + 0x10)? as usize;
            let data = memory.read_bytes(memory.read_u64(address + 0x08)?, len)?;
            let slot = memory.read_u32(address + 0x14)?;
            Ok(Self { label, slot, data })
        }

        fn compile(&self, compiler: &mut ResourceCompiler) -> Result<u64> {
            let at = compiler.alloc_virtual(Self::SIZE, 16)?;
            let label = compiler.add_string(&self.label)?;
            let data = compiler.add_physical_data(&self.data)?;
            compiler.write_u64(at, label)?;
            compiler.write_u64(at + 0x08, data)?;
            compiler.write_u32(at + 0x10, self.data.len() as u32)?;
            compiler.write_u32(at + 0x14, self.slot)?;
            Ok(at)
        }
    }

    impl HandleIndexable for Blob {
        const HANDLE_INDEX_OFFSET: u64 = 0x14;

        fn handle_index(&self) -> u32 {
            self.slot
        }

        fn set_handle_index(&mut self, index: u32) {
            self.slot = index;
        }
    }

    fn blob() -> Blob {
        Blob {
            label: "blob".to_string(),
            slot: 7,
            data: vec![0xC3; 0x3000],
        }
    }

    fn heap() -> ChunkHeap {
        let config = HeapConfig::builder()
            .virtual_pool(0x10_0000_0000, 0x10_0000)
            .physical_pool(0x20_0000_0000, 0x10_0000)
            .build();
        ChunkHeap::new(config).unwrap()
    }

    fn load(alloc: &mut impl ChunkAllocator) -> PagedObject<Blob> {
        let image = ResourceCompiler::compile(&blob()).unwrap();
        let mut map = image.map().clone();
        let mut placed = Vec::new();
        place_chunks(&mut map, image.chunks(), alloc, &mut placed).unwrap();
        let root = map.main_chunk().unwrap().destination;
        Resource::new(&map, alloc, Direction::Load)
            .place_object::<Blob>(root)
            .unwrap();
        PagedObject::from_loaded(root, MiniMap::build(&map).unwrap())
    }

    #[test]
    fn test_plain_object_makes_no_allocator_calls() {
        let heap = heap();
        let mut alloc = CountingAllocator::new(heap.lock());

        let object = PagedObject::new(blob());
        assert!(!object.has_map());
        assert!(object.regenerate_map().is_none());
        assert_eq!(object.read(&alloc).unwrap(), blob());

        let object = object.defragment(&mut alloc).unwrap();
        object.destroy(&mut alloc).unwrap();
        assert_eq!(alloc.calls(), 0);
    }

    #[test]
    fn test_destroy_frees_every_chunk_once() {
        let heap = heap();
        let mut guard = heap.lock();
        let object = load(&mut guard);
        assert!(object.has_map());
        assert_eq!(object.read(&guard).unwrap(), blob());

        let map = object.regenerate_map().unwrap();
        assert_eq!(map.virtual_count(), 1);
        assert_eq!(map.physical_count(), 1);

        let mut alloc = CountingAllocator::new(guard);
        object.destroy(&mut alloc).unwrap();
        assert_eq!(alloc.frees, 2);
        assert_eq!(alloc.stats(ChunkKind::Virtual).chunk_count, 0);
        assert_eq!(alloc.stats(ChunkKind::Physical).chunk_count, 0);

        for chunk in map.chunks() {
            let err = alloc.free(chunk.destination, chunk.size_class, chunk.kind).unwrap_err();
            assert!(matches!(err, Error::InvalidFree { .. }));
        }
    }

    #[test]
    fn test_stale_handle_is_use_after_destroy() {
        let heap = heap();
        let mut guard = heap.lock();
        let object = load(&mut guard);
        let root = object.root_address().unwrap();
        let stale = PagedObject::<Blob>::from_loaded(root, object.mini_map().unwrap().clone());

        object.destroy(&mut guard).unwrap();
        assert!(matches!(
            stale.read(&guard),
            Err(Error::UseAfterDestroy { address }) if address == root
        ));
    }

    #[test]
    fn test_defragment_compacts_and_keeps_graph() {
        let heap = heap();
        let mut guard = heap.lock();

        // Leave a hole at the start of both pools.
        let hole_v = guard.allocate(SizeClass::MIN, ChunkKind::Virtual).unwrap();
        let hole_p = guard.allocate(SizeClass::new(1).unwrap(), ChunkKind::Physical).unwrap();
        let object = load(&mut guard);
        let before = object.root_address().unwrap();
        guard.free(hole_v, SizeClass::MIN, ChunkKind::Virtual).unwrap();
        guard.free(hole_p, SizeClass::new(1).unwrap(), ChunkKind::Physical).unwrap();

        let object = object.defragment(&mut guard).unwrap();
        let after = object.root_address().unwrap();
        assert!(after < before);
        assert_eq!(after, hole_v);
        assert_eq!(object.read(&guard).unwrap(), blob());
        assert_eq!(guard.stats(ChunkKind::Virtual).chunk_count, 1);
        assert_eq!(guard.stats(ChunkKind::Physical).chunk_count, 1);
    }

    #[test]
    fn test_failed_defragment_releases_new_chunks() {
        let heap = heap();
        let mut alloc = CountingAllocator::new(heap.lock());
        let object = load(&mut alloc);

        // Room for the virtual chunk only.
        alloc.budget = Some(1);
        let err = object.defragment(&mut alloc).unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(alloc.allocations, 4);
        assert_eq!(alloc.frees, 3);
        assert_eq!(alloc.stats(ChunkKind::Virtual).chunk_count, 0);
        assert_eq!(alloc.stats(ChunkKind::Physical).chunk_count, 0);
    }

    #[test]
    fn test_export_leaves_live_memory_untouched() {
        let heap = heap();
        let mut guard = heap.lock();
        let object = load(&mut guard);
        let root = object.root_address().unwrap();
        let live = guard.read_bytes(root, 0x20).unwrap();

        let image = object.export(&guard).unwrap();
        assert_eq!(guard.read_bytes(root, 0x20).unwrap(), live);
        assert_eq!(image, ResourceCompiler::compile(&blob()).unwrap());
    }

    #[test]
    fn test_handle_index() {
        let heap = heap();
        let mut guard = heap.lock();
        let mut object = load(&mut guard);
        assert_eq!(object.handle_index(&guard).unwrap(), 7);
        object.set_handle_index(&mut guard, 42).unwrap();
        assert_eq!(object.read(&guard).unwrap().slot, 42);

        let mut plain = PagedObject::new(blob());
        plain.set_handle_index(&mut guard, 3).unwrap();
        assert_eq!(plain.handle_index(&guard).unwrap(), 3);
    }
}
