use serde::Serialize;

use crate::error::{Error, Result};
use crate::paging::{MAX_CHUNKS, ResourceMap, SizeClass};

pub const MAGIC: [u8; 4] = *b"RSC7";
pub const VERSION: u32 = 2;

/// Everything after the chunk table is a raw deflate stream.
pub const FLAG_COMPRESSED: u32 = 1;

pub const HEADER_SIZE: usize = 0x10;
pub const ENTRY_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkEntry {
    pub size_class: SizeClass,
    /// Absolute offset into the uncompressed image
    pub file_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHeader {
    pub version: u32,
    pub flags: u32,
    pub virtual_count: u16,
    pub physical_count: u16,
    pub entries: Vec<ChunkEntry>,
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl ResourceHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::corrupt(format!(
                "file is {} bytes, shorter than the header",
                bytes.len()
            )));
        }
        if bytes[0..4] != MAGIC {
            return Err(Error::corrupt(format!("bad magic {:02X?}", &bytes[0..4])));
        }

        let version = u32_at(bytes, 0x04);
        if version != VERSION {
            return Err(Error::corrupt(format!("unsupported version {}", version)));
        }
        let flags = u32_at(bytes, 0x08);
        if flags & !FLAG_COMPRESSED != 0 {
            return Err(Error::corrupt(format!("unknown flags 0x{:X}", flags)));
        }

        let virtual_count = u16_at(bytes, 0x0C);
        let physical_count = u16_at(bytes, 0x0E);
        let count = virtual_count as usize + physical_count as usize;
        if virtual_count == 0 {
            return Err(Error::corrupt("resource has no virtual chunk"));
        }
        if count > MAX_CHUNKS {
            return Err(Error::corrupt(format!(
                "resource has {} chunks, at most {} are supported",
                count, MAX_CHUNKS
            )));
        }

        let table_end = HEADER_SIZE + count * ENTRY_SIZE;
        if bytes.len() < table_end {
            return Err(Error::corrupt("chunk table is truncated"));
        }

        let entries = (0..count)
            .map(|index| {
                let offset = HEADER_SIZE + index * ENTRY_SIZE;
                let raw_class = bytes[offset];
                if bytes[offset + 1..offset + 4] != [0; 3] {
                    return Err(Error::corrupt(format!(
                        "chunk entry {} has non-zero reserved bytes",
                        index
                    )));
                }
                let size_class = SizeClass::new(raw_class).map_err(|_| {
                    Error::corrupt(format!("chunk entry {} has size class {}", index, raw_class))
                })?;
                Ok(ChunkEntry {
                    size_class,
                    file_offset: u32_at(bytes, offset + 4),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version,
            flags,
            virtual_count,
            physical_count,
            entries,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.virtual_count.to_le_bytes());
        out.extend_from_slice(&self.physical_count.to_le_bytes());
        for entry in &self.entries {
            out.push(entry.size_class.raw());
            out.extend_from_slice(&[0; 3]);
            out.extend_from_slice(&entry.file_offset.to_le_bytes());
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    /// Offset of the first byte after the chunk table
    pub fn table_end(&self) -> usize {
        HEADER_SIZE + self.entries.len() * ENTRY_SIZE
    }

    /// Map with source addresses assigned and no destinations yet.
    pub fn resource_map(&self) -> Result<ResourceMap> {
        let (virtual_entries, physical_entries) = self.entries.split_at(self.virtual_count as usize);
        let classes = |entries: &[ChunkEntry]| -> Vec<SizeClass> {
            entries.iter().map(|entry| entry.size_class).collect()
        };
        ResourceMap::from_size_classes(&classes(virtual_entries), &classes(physical_entries))
    }
}
