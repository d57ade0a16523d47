//! Detached chunk memory.
//!
//! A set of byte regions keyed by start address, used wherever chunk bytes
//! need to be addressed outside of a [`super::ChunkHeap`]: while compiling
//! a resource (source addresses) and while exporting a loaded one (live
//! addresses, patched on a copy).

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::memory::{ReadMemory, WriteMemory};

#[derive(Debug, Clone, Default)]
pub struct SparseMemory {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region. Regions may not overlap.
    pub fn insert(&mut self, address: u64, data: Vec<u8>) -> Result<()> {
        let end = address + data.len() as u64;
        let overlaps_previous = self
            .regions
            .range(..=address)
            .next_back()
            .is_some_and(|(&start, region)| start + region.len() as u64 > address);
        let overlaps_next = self
            .regions
            .range(address..)
            .next()
            .is_some_and(|(&start, _)| start < end);

        if overlaps_previous || overlaps_next {
            return Err(Error::corrupt(format!(
                "region at 0x{:X} overlaps an existing region",
                address
            )));
        }
        self.regions.insert(address, data);
        Ok(())
    }

    /// Bytes of the region starting exactly at `address`
    pub fn region(&self, address: u64) -> Option<&[u8]> {
        self.regions.get(&address).map(Vec::as_slice)
    }

    pub fn take_region(&mut self, address: u64) -> Option<Vec<u8>> {
        self.regions.remove(&address)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn locate(&self, address: u64, size: usize) -> Result<(u64, usize)> {
        let unmapped = || Error::UnmappedAddress { address, size };
        let (&start, region) = self
            .regions
            .range(..=address)
            .next_back()
            .ok_or_else(unmapped)?;
        let offset = (address - start) as usize;
        if offset.checked_add(size).is_none_or(|end| end > region.len()) {
            return Err(unmapped());
        }
        Ok((start, offset))
    }
}

impl ReadMemory for SparseMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let (start, offset) = self.locate(address, size)?;
        Ok(self.regions[&start][offset..offset + size].to_vec())
    }
}

impl WriteMemory for SparseMemory {
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        let (start, offset) = self.locate(address, bytes.len())?;
        if let Some(region) = self.regions.get_mut(&start) {
            region[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_overlap() {
        let mut memory = SparseMemory::new();
        memory.insert(0x1000, vec![0; 0x100]).unwrap();

        assert!(memory.insert(0x10F0, vec![0; 0x20]).is_err());
        assert!(memory.insert(0x0FF0, vec![0; 0x20]).is_err());
        assert!(memory.insert(0x1000, vec![0; 1]).is_err());
        memory.insert(0x1100, vec![0; 0x10]).unwrap();
        memory.insert(0x0F00, vec![0; 0x100]).unwrap();
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn test_read_write_within_region() {
        let mut memory = SparseMemory::new();
        memory.insert(0x5000_0000, vec![0; 0x40]).unwrap();

        memory.write_u64(0x5000_0010, 0x6000_0000).unwrap();
        assert_eq!(memory.read_u64(0x5000_0010).unwrap(), 0x6000_0000);
        assert!(memory.read_u64(0x5000_003C).is_err());
        assert!(memory.write_u8(0x5000_0040, 1).is_err());
        assert_eq!(memory.region(0x5000_0000).unwrap()[0x10], 0x00);
        assert_eq!(memory.region(0x5000_0000).unwrap()[0x13], 0x60);
    }
}
