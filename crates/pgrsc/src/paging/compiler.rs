//! Resource compiler.
//!
//! Lays a plain object graph out into virtual and physical chunks, using
//! source addresses throughout, and produces a [`ResourceImage`]. Each
//! kind is filled one chunk at a time: an allocation goes into the current
//! chunk when it fits, otherwise a new chunk is opened that is large enough
//! for it.

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::ResourceImage;
use crate::memory::{ChunkKind, ReadMemory, SparseMemory, WriteMemory};
use crate::paging::{MAX_CHUNKS, PHYSICAL_BASE, Paged, ResourceMap, SizeClass, VIRTUAL_BASE};

#[derive(Debug)]
struct Segment {
    kind: ChunkKind,
    next_chunk: u64,
    chunks: Vec<(u64, SizeClass)>,
    cursor: u64,
}

impl Segment {
    fn new(kind: ChunkKind, base: u64) -> Self {
        Self {
            kind,
            next_chunk: base,
            chunks: Vec::new(),
            cursor: base,
        }
    }

    /// Room left in the current chunk after aligning the cursor
    fn fits(&self, size: u64, align: u64) -> Option<u64> {
        let (start, class) = self.chunks.last()?;
        let at = self.cursor.next_multiple_of(align);
        (at + size <= start + class.bytes()).then_some(at)
    }
}

pub struct ResourceCompiler {
    virtual_segment: Segment,
    physical_segment: Segment,
    min_size_class: SizeClass,
    memory: SparseMemory,
}

impl Default for ResourceCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCompiler {
    pub fn new() -> Self {
        Self {
            virtual_segment: Segment::new(ChunkKind::Virtual, VIRTUAL_BASE),
            physical_segment: Segment::new(ChunkKind::Physical, PHYSICAL_BASE),
            min_size_class: SizeClass::MIN,
            memory: SparseMemory::new(),
        }
    }

    /// Never open chunks smaller than `size_class`.
    pub fn with_min_size_class(mut self, size_class: SizeClass) -> Self {
        self.min_size_class = size_class;
        self
    }

    /// Compile a whole graph. The root ends up at offset 0 of the first
    /// virtual chunk.
    pub fn compile<T: Paged>(value: &T) -> Result<ResourceImage> {
        Self::new().compile_root(value)
    }

    pub fn compile_root<T: Paged>(mut self, value: &T) -> Result<ResourceImage> {
        let root = value.compile(&mut self)?;
        if root != VIRTUAL_BASE {
            return Err(Error::corrupt(format!(
                "root compiled at 0x{:X} instead of the start of the main chunk",
                root
            )));
        }
        self.into_image()
    }

    pub fn alloc_virtual(&mut self, size: u64, align: u64) -> Result<u64> {
        self.alloc(ChunkKind::Virtual, size, align)
    }

    pub fn alloc_physical(&mut self, size: u64, align: u64) -> Result<u64> {
        self.alloc(ChunkKind::Physical, size, align)
    }

    /// Copy a NUL-terminated string into a virtual chunk.
    pub fn add_string(&mut self, value: &str) -> Result<u64> {
        let at = self.alloc_virtual(value.len() as u64 + 1, 1)?;
        self.memory.write_bytes(at, value.as_bytes())?;
        Ok(at)
    }

    /// Copy raw payload bytes into a physical chunk.
    pub fn add_physical_data(&mut self, data: &[u8]) -> Result<u64> {
        let at = self.alloc_physical(data.len() as u64, 16)?;
        self.memory.write_bytes(at, data)?;
        Ok(at)
    }

    pub fn chunk_count(&self) -> usize {
        self.virtual_segment.chunks.len() + self.physical_segment.chunks.len()
    }

    fn alloc(&mut self, kind: ChunkKind, size: u64, align: u64) -> Result<u64> {
        let size = size.max(1);
        let align = align.max(1);
        let chunk_count = self.chunk_count();
        let min_size_class = self.min_size_class;
        let segment = match kind {
            ChunkKind::Virtual => &mut self.virtual_segment,
            ChunkKind::Physical => &mut self.physical_segment,
        };

        let at = match segment.fits(size, align) {
            Some(at) => at,
            None => {
                if chunk_count >= MAX_CHUNKS {
                    return Err(Error::corrupt(format!(
                        "resource needs more than {} chunks",
                        MAX_CHUNKS
                    )));
                }
                let size_class = SizeClass::for_size(size)
                    .ok_or_else(|| {
                        Error::corrupt(format!("allocation of {} bytes exceeds every size class", size))
                    })?
                    .max(min_size_class);
                let start = segment.next_chunk;
                segment.chunks.push((start, size_class));
                segment.next_chunk += size_class.bytes();
                self.memory
                    .insert(start, vec![0; size_class.bytes() as usize])?;
                debug!(
                    "Opened {} chunk #{} at 0x{:X} ({})",
                    segment.kind,
                    segment.chunks.len() - 1,
                    start,
                    size_class
                );
                start
            }
        };
        segment.cursor = at + size;
        Ok(at)
    }

    /// Finish compilation and hand out the chunk bytes.
    pub fn into_image(mut self) -> Result<ResourceImage> {
        let classes = |segment: &Segment| -> Vec<SizeClass> {
            segment.chunks.iter().map(|&(_, class)| class).collect()
        };
        let map = ResourceMap::from_size_classes(
            &classes(&self.virtual_segment),
            &classes(&self.physical_segment),
        )?;

        let mut chunks = Vec::with_capacity(map.len());
        for chunk in map.chunks() {
            let data = self.memory.take_region(chunk.source).ok_or_else(|| {
                Error::corrupt(format!("chunk at 0x{:X} was never written", chunk.source))
            })?;
            chunks.push(data);
        }
        ResourceImage::new(&map, chunks)
    }
}

impl ReadMemory for ResourceCompiler {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.memory.read_bytes(address, size)
    }
}

impl WriteMemory for ResourceCompiler {
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        self.memory.write_bytes(address, bytes)
    }
}
