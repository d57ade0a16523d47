//! Resource map.
//!
//! The map lists every chunk of one resource: where its bytes came from
//! (source, the file-relative address space pointers are serialized in) and
//! where they were placed (destination, a live heap address). Virtual
//! chunks always precede physical chunks.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::memory::ChunkKind;
use crate::paging::SizeClass;

/// Start of the source address space for virtual chunks.
pub const VIRTUAL_BASE: u64 = 0x5000_0000;

/// Start of the source address space for physical chunks.
pub const PHYSICAL_BASE: u64 = 0x6000_0000;

/// Maximum number of chunks one resource may use.
pub const MAX_CHUNKS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkDescriptor {
    pub source: u64,
    pub destination: u64,
    pub size_class: SizeClass,
    pub kind: ChunkKind,
}

impl ChunkDescriptor {
    pub fn size(&self) -> u64 {
        self.size_class.bytes()
    }

    fn source_offset(&self, address: u64) -> Option<u64> {
        address
            .checked_sub(self.source)
            .filter(|&offset| offset < self.size())
    }

    fn destination_offset(&self, address: u64) -> Option<u64> {
        address
            .checked_sub(self.destination)
            .filter(|&offset| offset < self.size())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceMap {
    chunks: Vec<ChunkDescriptor>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map of a resource from its chunk size classes.
    ///
    /// Source addresses are assigned back to back per kind, starting at
    /// [`VIRTUAL_BASE`] and [`PHYSICAL_BASE`]. Destinations are left zero
    /// until the chunks are placed.
    pub fn from_size_classes(virtual_chunks: &[SizeClass], physical_chunks: &[SizeClass]) -> Result<Self> {
        let mut map = Self::new();
        let chunks = virtual_chunks
            .iter()
            .map(|&class| (class, ChunkKind::Virtual))
            .chain(physical_chunks.iter().map(|&class| (class, ChunkKind::Physical)));

        for (size_class, kind) in chunks {
            map.push(ChunkDescriptor {
                source: 0,
                destination: 0,
                size_class,
                kind,
            })?;
        }
        map.assign_sources();
        Ok(map)
    }

    /// Wrap descriptors that are already known to be well ordered.
    pub(crate) fn from_chunks(chunks: Vec<ChunkDescriptor>) -> Self {
        Self { chunks }
    }

    /// Append a chunk, keeping virtual chunks ahead of physical ones.
    pub fn push(&mut self, chunk: ChunkDescriptor) -> Result<()> {
        if self.chunks.len() >= MAX_CHUNKS {
            return Err(Error::corrupt(format!(
                "resource uses more than {} chunks",
                MAX_CHUNKS
            )));
        }
        if chunk.kind == ChunkKind::Virtual && self.physical_count() > 0 {
            return Err(Error::corrupt(
                "virtual chunk listed after a physical chunk",
            ));
        }
        self.chunks.push(chunk);
        Ok(())
    }

    /// Recompute source addresses from chunk order and size classes.
    pub fn assign_sources(&mut self) {
        let mut next_virtual = VIRTUAL_BASE;
        let mut next_physical = PHYSICAL_BASE;
        for chunk in &mut self.chunks {
            let next = match chunk.kind {
                ChunkKind::Virtual => &mut next_virtual,
                ChunkKind::Physical => &mut next_physical,
            };
            chunk.source = *next;
            *next += chunk.size();
        }
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    pub(crate) fn chunks_mut(&mut self) -> &mut [ChunkDescriptor] {
        &mut self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn virtual_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| chunk.kind == ChunkKind::Virtual)
            .count()
    }

    pub fn physical_count(&self) -> usize {
        self.chunks.len() - self.virtual_count()
    }

    /// Index of the chunk holding the root object: the first virtual chunk.
    pub fn main_chunk_index(&self) -> Option<usize> {
        self.chunks
            .iter()
            .position(|chunk| chunk.kind == ChunkKind::Virtual)
    }

    pub fn main_chunk(&self) -> Option<&ChunkDescriptor> {
        self.main_chunk_index().map(|index| &self.chunks[index])
    }

    /// Total bytes covered by every chunk
    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(ChunkDescriptor::size).sum()
    }

    /// Translate a source address to the matching destination address.
    pub fn translate(&self, address: u64) -> Option<u64> {
        self.chunks.iter().find_map(|chunk| {
            chunk
                .source_offset(address)
                .map(|offset| chunk.destination + offset)
        })
    }

    /// Chunk whose destination range contains `address`
    pub fn chunk_at_destination(&self, address: u64) -> Option<&ChunkDescriptor> {
        self.chunks
            .iter()
            .find(|chunk| chunk.destination_offset(address).is_some())
    }

    /// Translate a destination address back to its source address.
    pub fn translate_back(&self, address: u64) -> Option<u64> {
        self.chunks.iter().find_map(|chunk| {
            chunk
                .destination_offset(address)
                .map(|offset| chunk.source + offset)
        })
    }

    /// Copy of this map whose sources are the current destinations.
    ///
    /// Live pointers hold destination addresses, so this is the map that
    /// lets already placed chunks be loaded again somewhere else.
    pub fn rebased(&self) -> Self {
        let chunks = self
            .chunks
            .iter()
            .map(|chunk| ChunkDescriptor {
                source: chunk.destination,
                destination: 0,
                ..*chunk
            })
            .collect();
        Self { chunks }
    }

    /// Whether both maps place the same chunks in the same order, ignoring
    /// source addresses.
    pub fn is_destination_equivalent(&self, other: &ResourceMap) -> bool {
        self.chunks.len() == other.chunks.len()
            && self.chunks.iter().zip(&other.chunks).all(|(a, b)| {
                a.destination == b.destination && a.size_class == b.size_class && a.kind == b.kind
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(n: u8) -> SizeClass {
        SizeClass::new(n).unwrap()
    }

    #[test]
    fn test_from_size_classes_assigns_sources() {
        let map = ResourceMap::from_size_classes(&[class(0), class(1)], &[class(2), class(0)]).unwrap();

        let sources: Vec<u64> = map.chunks().iter().map(|c| c.source).collect();
        assert_eq!(
            sources,
            vec![
                VIRTUAL_BASE,
                VIRTUAL_BASE + 0x2000,
                PHYSICAL_BASE,
                PHYSICAL_BASE + 0x8000,
            ]
        );
        assert_eq!(map.virtual_count(), 2);
        assert_eq!(map.physical_count(), 2);
        assert_eq!(map.main_chunk_index(), Some(0));
        assert_eq!(map.total_size(), 0x2000 + 0x4000 + 0x8000 + 0x2000);
    }

    #[test]
    fn test_push_rejects_virtual_after_physical() {
        let mut map = ResourceMap::from_size_classes(&[class(0)], &[class(0)]).unwrap();
        let result = map.push(ChunkDescriptor {
            source: 0,
            destination: 0,
            size_class: class(0),
            kind: ChunkKind::Virtual,
        });
        assert!(result.unwrap_err().is_corrupt());
    }

    #[test]
    fn test_push_rejects_too_many_chunks() {
        let classes = vec![class(0); MAX_CHUNKS];
        assert!(ResourceMap::from_size_classes(&classes, &[]).is_ok());

        let result = ResourceMap::from_size_classes(&classes, &[class(0)]);
        assert!(result.unwrap_err().is_corrupt());
    }

    #[test]
    fn test_translate_both_directions() {
        let mut map = ResourceMap::from_size_classes(&[class(0)], &[class(1)]).unwrap();
        map.chunks_mut()[0].destination = 0x10_0000_0000;
        map.chunks_mut()[1].destination = 0x20_0000_0000;

        assert_eq!(map.translate(VIRTUAL_BASE + 0x40), Some(0x10_0000_0040));
        assert_eq!(map.translate(PHYSICAL_BASE + 0x3FFF), Some(0x20_0000_3FFF));
        // One past the end of the physical chunk is not inside it.
        assert_eq!(map.translate(PHYSICAL_BASE + 0x4000), None);
        assert_eq!(map.translate(0x1234), None);

        assert_eq!(map.translate_back(0x10_0000_0040), Some(VIRTUAL_BASE + 0x40));
        assert_eq!(map.translate_back(0x30_0000_0000), None);
    }

    #[test]
    fn test_rebased_uses_destinations_as_sources() {
        let mut map = ResourceMap::from_size_classes(&[class(0)], &[]).unwrap();
        map.chunks_mut()[0].destination = 0x10_0000_2000;

        let rebased = map.rebased();
        assert_eq!(rebased.chunks()[0].source, 0x10_0000_2000);
        assert_eq!(rebased.chunks()[0].destination, 0);
        assert_eq!(rebased.translate(0x10_0000_2010), Some(0x10));
    }
}
