//! Mini map.
//!
//! A loaded object keeps this compact summary of its chunks for its whole
//! lifetime instead of the full [`ResourceMap`]. Only destination
//! addresses and size classes survive; source addresses are irrelevant once
//! pointers have been fixed up.

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::ChunkKind;
use crate::paging::{ChunkDescriptor, MAX_CHUNKS, PackedAddress, ResourceMap, SizeClass};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiniMap {
    virtual_chunk_count: u8,
    physical_chunk_count: u8,
    main_chunk_index: u8,
    /// Set for maps built at runtime rather than from a compiled resource.
    /// Only compiled maps own their chunks.
    is_dynamic: bool,
    address_and_shift: Vec<PackedAddress>,
}

impl MiniMap {
    pub fn build(map: &ResourceMap) -> Result<Self> {
        if map.len() > MAX_CHUNKS {
            return Err(Error::corrupt(format!(
                "resource map has {} chunks, at most {} are supported",
                map.len(),
                MAX_CHUNKS
            )));
        }
        let main_chunk_index = map
            .main_chunk_index()
            .ok_or_else(|| Error::corrupt("resource map has no virtual chunk"))?;

        let address_and_shift = map
            .chunks()
            .iter()
            .map(|chunk| PackedAddress::encode(chunk.destination, chunk.size_class))
            .collect::<Result<Vec<_>>>()?;

        let mini = Self {
            virtual_chunk_count: map.virtual_count() as u8,
            physical_chunk_count: map.physical_count() as u8,
            main_chunk_index: main_chunk_index as u8,
            is_dynamic: false,
            address_and_shift,
        };
        debug!(
            "Built mini map: {} virtual, {} physical chunks",
            mini.virtual_chunk_count, mini.physical_chunk_count
        );
        Ok(mini)
    }

    /// Rebuild a full resource map. Sources are synthesized as zero.
    pub fn regenerate(&self) -> ResourceMap {
        let chunks = self
            .chunks()
            .map(|(kind, address, size_class)| ChunkDescriptor {
                source: 0,
                destination: address,
                size_class,
                kind,
            })
            .collect();
        ResourceMap::from_chunks(chunks)
    }

    /// Whether this map was built from a compiled resource
    pub fn is_compiled(&self) -> bool {
        !self.is_dynamic
    }

    pub fn virtual_chunk_count(&self) -> u8 {
        self.virtual_chunk_count
    }

    pub fn physical_chunk_count(&self) -> u8 {
        self.physical_chunk_count
    }

    pub fn chunk_count(&self) -> usize {
        self.address_and_shift.len()
    }

    pub fn main_chunk_index(&self) -> u8 {
        self.main_chunk_index
    }

    pub fn main_chunk(&self) -> PackedAddress {
        self.address_and_shift[self.main_chunk_index as usize]
    }

    pub fn packed(&self) -> &[PackedAddress] {
        &self.address_and_shift
    }

    /// Every recorded chunk as `(kind, address, size class)`, in map order.
    pub fn chunks(&self) -> impl Iterator<Item = (ChunkKind, u64, SizeClass)> + '_ {
        let virtual_count = self.virtual_chunk_count as usize;
        self.address_and_shift
            .iter()
            .enumerate()
            .map(move |(index, packed)| {
                let kind = if index < virtual_count {
                    ChunkKind::Virtual
                } else {
                    ChunkKind::Physical
                };
                (kind, packed.address(), packed.size_class())
            })
    }

    /// Bytes owned by the object, main chunk included
    pub fn total_size(&self) -> u64 {
        self.address_and_shift
            .iter()
            .map(|packed| packed.size_class().bytes())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn placed_map(virtual_classes: &[u8], physical_classes: &[u8]) -> ResourceMap {
        let to_classes = |raw: &[u8]| -> Vec<SizeClass> {
            raw.iter().map(|&n| SizeClass::new(n).unwrap()).collect()
        };
        let mut map =
            ResourceMap::from_size_classes(&to_classes(virtual_classes), &to_classes(physical_classes))
                .unwrap();

        let mut next = 0x10_0000_0000u64;
        for chunk in map.chunks_mut() {
            chunk.destination = next;
            next += chunk.size();
        }
        map
    }

    #[test]
    fn test_build_counts_and_main_chunk() {
        let map = placed_map(&[0, 1], &[2]);
        let mini = MiniMap::build(&map).unwrap();

        assert_eq!(mini.virtual_chunk_count(), 2);
        assert_eq!(mini.physical_chunk_count(), 1);
        assert_eq!(mini.main_chunk_index(), 0);
        assert_eq!(mini.main_chunk().address(), 0x10_0000_0000);
        assert!(mini.is_compiled());
        assert_eq!(mini.total_size(), map.total_size());
    }

    #[test]
    fn test_build_rejects_map_without_virtual_chunk() {
        let map = placed_map(&[], &[0]);
        assert!(MiniMap::build(&map).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_build_rejects_misaligned_destination() {
        let mut map = placed_map(&[0], &[]);
        map.chunks_mut()[0].destination = 0x10_0000_0008;
        assert!(matches!(
            MiniMap::build(&map),
            Err(Error::MisalignedAddress(0x10_0000_0008))
        ));
    }

    #[test]
    fn test_regenerate_zeroes_sources() {
        let map = placed_map(&[0], &[0]);
        let regenerated = MiniMap::build(&map).unwrap().regenerate();

        assert!(regenerated.chunks().iter().all(|chunk| chunk.source == 0));
        assert_eq!(regenerated.chunks()[1].kind, ChunkKind::Physical);
    }

    proptest! {
        #[test]
        fn regenerate_is_destination_equivalent(
            virtual_classes in prop::collection::vec(0u8..6, 1..12),
            physical_classes in prop::collection::vec(0u8..6, 0..12),
        ) {
            let map = placed_map(&virtual_classes, &physical_classes);
            let regenerated = MiniMap::build(&map).unwrap().regenerate();

            prop_assert!(regenerated.is_destination_equivalent(&map));
            prop_assert_eq!(regenerated.virtual_count(), map.virtual_count());
            prop_assert_eq!(regenerated.physical_count(), map.physical_count());
        }
    }
}
