//! Pointer fixup.
//!
//! A [`Resource`] walks an object graph from its root, rewriting every
//! pointer field it is told about. Types describe their own pointer fields
//! through [`Paged::place`]; the engine only knows how to translate one
//! pointer and how to avoid visiting an object twice.
//!
//! The same walk serves three purposes:
//!
//! - **Load**: pointers hold source addresses, translated to destinations
//! - **Defragment**: the map is [`ResourceMap::rebased`], so old live
//!   addresses act as sources
//! - **Export**: pointers hold live addresses, translated back to sources
//!   in a detached copy of the chunks

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{ChunkKind, ReadMemory, WriteMemory};
use crate::paging::{ResourceCompiler, ResourceMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Load,
    Export,
}

/// A type whose instances can live in paged chunks.
///
/// `SIZE` is the byte size of the instance in a virtual chunk. Instances
/// are always 16-byte aligned.
pub trait Paged: Sized {
    const SIZE: u64;

    /// Fix every pointer field of the instance at `address` and place the
    /// objects they point to.
    fn place<M: WriteMemory + ?Sized>(rsc: &mut Resource<'_, M>, address: u64) -> Result<()>;

    /// Read a live instance back into an owned value.
    fn read<M: ReadMemory + ?Sized>(memory: &M, address: u64) -> Result<Self>;

    /// Lay the value out in the compiler's chunks, returning its source
    /// address. The instance must be allocated before anything it owns.
    fn compile(&self, compiler: &mut ResourceCompiler) -> Result<u64>;
}

pub struct Resource<'a, M: WriteMemory + ?Sized> {
    map: &'a ResourceMap,
    memory: &'a mut M,
    direction: Direction,
    placed: HashSet<u64>,
    arrays: HashSet<u64>,
    fixups: usize,
}

impl<'a, M: WriteMemory + ?Sized> Resource<'a, M> {
    pub fn new(map: &'a ResourceMap, memory: &'a mut M, direction: Direction) -> Self {
        Self {
            map,
            memory,
            direction,
            placed: HashSet::new(),
            arrays: HashSet::new(),
            fixups: 0,
        }
    }

    pub fn memory(&self) -> &M {
        self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        self.memory
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of pointer fields rewritten so far
    pub fn fixup_count(&self) -> usize {
        self.fixups
    }

    /// Rewrite the pointer stored at `field`.
    ///
    /// Returns the address the pointee's bytes currently reside at, or
    /// `None` for a null pointer. A pointer outside every chunk of the map
    /// fails with [`Error::CorruptFormat`] and leaves the field untouched.
    pub fn fixup(&mut self, field: u64) -> Result<Option<u64>> {
        let pointer = self.memory.read_u64(field)?;
        if pointer == 0 {
            return Ok(None);
        }

        let translated = match self.direction {
            Direction::Load => self.map.translate(pointer),
            Direction::Export => self.map.translate_back(pointer),
        };
        let Some(translated) = translated else {
            return Err(Error::corrupt(format!(
                "pointer 0x{:X} at 0x{:X} is outside of every chunk",
                pointer, field
            )));
        };

        self.memory.write_u64(field, translated)?;
        self.fixups += 1;

        Ok(Some(match self.direction {
            Direction::Load => translated,
            Direction::Export => pointer,
        }))
    }

    /// Fix a pointer to raw data of `len` bytes that must lie inside one
    /// chunk of `kind`.
    pub fn fixup_data(&mut self, field: u64, kind: ChunkKind, len: u64) -> Result<Option<u64>> {
        let resident = self.fixup(field)?;
        if let Some(address) = resident {
            self.check_resident(address, len, kind)?;
        }
        Ok(resident)
    }

    /// Fix a pointer to a `T` and place the object it points to.
    pub fn place<T: Paged>(&mut self, field: u64) -> Result<Option<u64>> {
        let resident = self.fixup(field)?;
        if let Some(address) = resident {
            self.place_object::<T>(address)?;
        }
        Ok(resident)
    }

    /// Place the object at `address` unless this pass already did.
    pub fn place_object<T: Paged>(&mut self, address: u64) -> Result<()> {
        if !self.placed.insert(address) {
            return Ok(());
        }
        if address & 0xF != 0 {
            return Err(Error::corrupt(format!(
                "object at 0x{:X} is not 16-byte aligned",
                address
            )));
        }
        self.check_resident(address, T::SIZE, ChunkKind::Virtual)?;
        T::place(self, address)
    }

    /// Fix a pointer to an array of `count` pointers to `T`, then place
    /// every element.
    pub fn place_array<T: Paged>(&mut self, field: u64, count: usize) -> Result<Option<u64>> {
        let resident = self.fixup(field)?;
        let Some(array) = resident else {
            if count > 0 {
                return Err(Error::corrupt(format!(
                    "null array at 0x{:X} with {} elements",
                    field, count
                )));
            }
            return Ok(None);
        };

        self.check_resident(array, count as u64 * 8, ChunkKind::Virtual)?;
        if !self.arrays.insert(array) {
            return Ok(resident);
        }
        for index in 0..count as u64 {
            self.place::<T>(array + index * 8)?;
        }
        debug!("Placed array at 0x{:X} ({} elements)", array, count);
        Ok(resident)
    }

    fn check_resident(&self, address: u64, len: u64, kind: ChunkKind) -> Result<()> {
        let chunk = self.map.chunk_at_destination(address).ok_or_else(|| {
            Error::corrupt(format!("address 0x{:X} is outside of every chunk", address))
        })?;
        if chunk.kind != kind {
            return Err(Error::corrupt(format!(
                "address 0x{:X} is in a {} chunk, expected {}",
                address, chunk.kind, kind
            )));
        }
        if address + len > chunk.destination + chunk.size() {
            return Err(Error::corrupt(format!(
                "{} bytes at 0x{:X} cross the end of their chunk",
                len, address
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;
    use crate::memory::{ChunkAllocator, ChunkHeap};
    use crate::paging::{PHYSICAL_BASE, SizeClass, VIRTUAL_BASE};

    /// Two pointers: one to a sibling node, one to a physical payload.
    #[derive(Debug, Clone, PartialEq)]
    struct Node {
        next: Option<Box<Node>>,
        payload: Vec<u8>,
    }

    impl Paged for Node {
        const SIZE: u64 = 0x20;

        fn place<M: WriteMemory + ?Sized>(rsc: &mut Resource<'_, M>, address: u64) -> Result<()> {
            let len = rsc.memory().read_u32(address + 0x10)? as u64;
            rsc.place::<Node>(address)?;
            rsc.fixup_data(address + 0x08, ChunkKind::Physical, len)?;
            Ok(())
        }

        fn read<M: ReadMemory + ?Sized>(memory: &M, address: u64) -> Result<Self> {
            let next = match memory.read_u64(address)? {
                0 => None,
                pointer => Some(Box::new(Node::read(memory, pointer)?)),
            };
            let len = memory.read_u32(address + 0x10)? as usize;
            let payload = match memory.read_u64(address + 0x08)? {
                0 => Vec::new(),
                pointer => memory.read_bytes(pointer, len)?,
            };
            Ok(Self { next, payload })
        }

        fn compile(&self, compiler: &mut ResourceCompiler) -> Result<u64> {
            let at = compiler.alloc_virtual(Self::SIZE, 16)?;
            let next = match &self.next {
                Some(next) => next.compile(compiler)?,
                None => 0,
            };
            let payload = if self.payload.is_empty() {
                0
            } else {
                compiler.add_physical_data(&self.payload)?
            };
            compiler.write_u64(at, next)?;
            compiler.write_u64(at + 0x08, payload)?;
            compiler.write_u32(at + 0x10, self.payload.len() as u32)?;
            Ok(at)
        }
    }

    fn heap() -> ChunkHeap {
        let config = HeapConfig::builder()
            .virtual_pool(0x10_0000_0000, 0x10_0000)
            .physical_pool(0x20_0000_0000, 0x10_0000)
            .build();
        ChunkHeap::new(config).unwrap()
    }

    /// One virtual and one physical chunk, placed and written by hand.
    fn placed_pair(memory: &mut impl ChunkAllocator) -> ResourceMap {
        let class = SizeClass::MIN;
        let mut map = ResourceMap::from_size_classes(&[class], &[class]).unwrap();
        map.chunks_mut()[0].destination = memory.allocate(class, ChunkKind::Virtual).unwrap();
        map.chunks_mut()[1].destination = memory.allocate(class, ChunkKind::Physical).unwrap();
        map
    }

    #[test]
    fn test_fixup_virtual_pointer_to_physical_chunk() {
        let heap = heap();
        let mut guard = heap.lock();
        let map = placed_pair(&mut guard);
        let root = map.chunks()[0].destination;
        let pixels = map.chunks()[1].destination;

        guard.write_u64(root + 0x08, PHYSICAL_BASE + 0x100).unwrap();
        guard.write_u32(root + 0x10, 4).unwrap();

        let mut rsc = Resource::new(&map, &mut guard, Direction::Load);
        rsc.place_object::<Node>(root).unwrap();
        assert_eq!(rsc.fixup_count(), 1);

        assert_eq!(guard.read_u64(root + 0x08).unwrap(), pixels + 0x100);
        assert_eq!(guard.read_u64(root).unwrap(), 0);
    }

    #[test]
    fn test_unresolved_pointer_is_corrupt_and_untouched() {
        let heap = heap();
        let mut guard = heap.lock();
        let map = placed_pair(&mut guard);
        let root = map.chunks()[0].destination;

        guard.write_u64(root, 0x7000_0000).unwrap();

        let mut rsc = Resource::new(&map, &mut guard, Direction::Load);
        let err = rsc.place_object::<Node>(root).unwrap_err();
        assert!(err.is_corrupt());
        assert_eq!(rsc.fixup_count(), 0);
        assert_eq!(guard.read_u64(root).unwrap(), 0x7000_0000);
    }

    #[test]
    fn test_object_pointer_into_physical_chunk_is_corrupt() {
        let heap = heap();
        let mut guard = heap.lock();
        let map = placed_pair(&mut guard);
        let root = map.chunks()[0].destination;

        guard.write_u64(root, PHYSICAL_BASE).unwrap();

        let mut rsc = Resource::new(&map, &mut guard, Direction::Load);
        assert!(rsc.place_object::<Node>(root).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_cycle_is_placed_once() {
        let heap = heap();
        let mut guard = heap.lock();
        let map = placed_pair(&mut guard);
        let root = map.chunks()[0].destination;

        // root -> second -> root
        guard.write_u64(root, VIRTUAL_BASE + 0x20).unwrap();
        guard.write_u64(root + 0x20, VIRTUAL_BASE).unwrap();

        let mut rsc = Resource::new(&map, &mut guard, Direction::Load);
        rsc.place_object::<Node>(root).unwrap();
        assert_eq!(rsc.fixup_count(), 2);

        assert_eq!(guard.read_u64(root).unwrap(), root + 0x20);
        assert_eq!(guard.read_u64(root + 0x20).unwrap(), root);
    }

    #[test]
    fn test_export_reverses_load() {
        let heap = heap();
        let mut guard = heap.lock();
        let map = placed_pair(&mut guard);
        let root = map.chunks()[0].destination;

        guard.write_u64(root, VIRTUAL_BASE + 0x40).unwrap();
        guard.write_u64(root + 0x08, PHYSICAL_BASE).unwrap();
        guard.write_u32(root + 0x10, 0x10).unwrap();
        let before = guard.read_bytes(root, 0x60).unwrap();

        Resource::new(&map, &mut guard, Direction::Load)
            .place_object::<Node>(root)
            .unwrap();
        assert_ne!(guard.read_bytes(root, 0x60).unwrap(), before);

        Resource::new(&map, &mut guard, Direction::Export)
            .place_object::<Node>(root)
            .unwrap();
        assert_eq!(guard.read_bytes(root, 0x60).unwrap(), before);
    }

    #[test]
    fn test_null_array_with_elements_is_corrupt() {
        let heap = heap();
        let mut guard = heap.lock();
        let map = placed_pair(&mut guard);
        let root = map.chunks()[0].destination;

        let mut rsc = Resource::new(&map, &mut guard, Direction::Load);
        assert_eq!(rsc.place_array::<Node>(root, 0).unwrap(), None);
        assert!(rsc.place_array::<Node>(root, 3).unwrap_err().is_corrupt());
    }
}
