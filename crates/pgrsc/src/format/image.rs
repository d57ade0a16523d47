use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{ChunkEntry, ENTRY_SIZE, FLAG_COMPRESSED, HEADER_SIZE, ResourceHeader, VERSION};
use crate::paging::{MAX_CHUNKS, ResourceMap};

/// The chunks of one resource, in map order, detached from any heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceImage {
    map: ResourceMap,
    chunks: Vec<Vec<u8>>,
}

impl ResourceImage {
    /// Pair chunk bytes with the size classes of `map`. Sources are
    /// reassigned from chunk order and destinations are dropped.
    pub fn new(map: &ResourceMap, chunks: Vec<Vec<u8>>) -> Result<Self> {
        if map.main_chunk_index() != Some(0) {
            return Err(Error::corrupt("resource has no virtual chunk"));
        }
        if map.len() > MAX_CHUNKS {
            return Err(Error::corrupt(format!(
                "resource has {} chunks, at most {} are supported",
                map.len(),
                MAX_CHUNKS
            )));
        }
        if chunks.len() != map.len() {
            return Err(Error::corrupt(format!(
                "{} chunk payloads for {} chunks",
                chunks.len(),
                map.len()
            )));
        }
        for (index, (chunk, data)) in map.chunks().iter().zip(&chunks).enumerate() {
            if data.len() as u64 != chunk.size() {
                return Err(Error::corrupt(format!(
                    "chunk {} holds {} bytes, its size class needs {}",
                    index,
                    data.len(),
                    chunk.size()
                )));
            }
        }

        let mut map = map.rebased();
        map.assign_sources();
        Ok(Self { map, chunks })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = ResourceHeader::parse(bytes)?;
        let table_end = header.table_end();
        let map = header.resource_map()?;

        // Every payload must sit after the table and must not overlap another.
        let mut ranges: Vec<(usize, usize)> = header
            .entries
            .iter()
            .zip(map.chunks())
            .map(|(entry, chunk)| {
                let start = entry.file_offset as usize;
                (start, start + chunk.size() as usize)
            })
            .collect();
        ranges.sort_unstable();
        if let Some(&(first, _)) = ranges.first() {
            if first < table_end {
                return Err(Error::corrupt(format!(
                    "chunk payload at 0x{:X} overlaps the header",
                    first
                )));
            }
        }
        for pair in ranges.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(Error::corrupt(format!(
                    "chunk payloads at 0x{:X} and 0x{:X} overlap",
                    pair[0].0, pair[1].0
                )));
            }
        }
        let image_end = ranges.last().map_or(table_end, |&(_, end)| end);

        let payload = if header.is_compressed() {
            // Header offsets are untrusted; grow with the stream instead of
            // reserving up front.
            let mut inflated = Vec::new();
            DeflateDecoder::new(&bytes[table_end..])
                .take((image_end - table_end) as u64)
                .read_to_end(&mut inflated)
                .map_err(|e| Error::corrupt(format!("deflate stream: {}", e)))?;
            debug!("Inflated {} payload bytes", inflated.len());
            inflated
        } else if bytes.len() < image_end {
            return Err(Error::corrupt(format!(
                "payload ends at 0x{:X}, chunks need 0x{:X}",
                bytes.len(),
                image_end
            )));
        } else {
            bytes[table_end..image_end].to_vec()
        };
        if payload.len() < image_end - table_end {
            return Err(Error::corrupt(format!(
                "payload ends at 0x{:X}, chunks need 0x{:X}",
                table_end + payload.len(),
                image_end
            )));
        }

        let chunks = header
            .entries
            .iter()
            .zip(map.chunks())
            .map(|(entry, chunk)| {
                let start = entry.file_offset as usize - table_end;
                payload[start..start + chunk.size() as usize].to_vec()
            })
            .collect();

        Ok(Self { map, chunks })
    }

    /// Header for a contiguous layout of the chunks after the table.
    pub fn header(&self, compress: bool) -> Result<ResourceHeader> {
        let mut offset = (HEADER_SIZE + self.chunks.len() * ENTRY_SIZE) as u64;
        let mut entries = Vec::with_capacity(self.chunks.len());
        for chunk in self.map.chunks() {
            let file_offset = u32::try_from(offset)
                .map_err(|_| Error::corrupt("resource image exceeds 4 GiB"))?;
            entries.push(ChunkEntry {
                size_class: chunk.size_class,
                file_offset,
            });
            offset += chunk.size();
        }

        Ok(ResourceHeader {
            version: VERSION,
            flags: if compress { FLAG_COMPRESSED } else { 0 },
            virtual_count: self.map.virtual_count() as u16,
            physical_count: self.map.physical_count() as u16,
            entries,
        })
    }

    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>> {
        let header = self.header(compress)?;
        let mut out = Vec::new();
        header.write(&mut out);

        if compress {
            let mut encoder = DeflateEncoder::new(out, Compression::default());
            for chunk in &self.chunks {
                encoder.write_all(chunk)?;
            }
            out = encoder.finish()?;
        } else {
            for chunk in &self.chunks {
                out.extend_from_slice(chunk);
            }
        }
        debug!(
            "Wrote resource image: {} chunks, {} bytes{}",
            self.chunks.len(),
            out.len(),
            if compress { " (compressed)" } else { "" }
        );
        Ok(out)
    }

    pub fn map(&self) -> &ResourceMap {
        &self.map
    }

    pub fn chunk_data(&self, index: usize) -> &[u8] {
        &self.chunks[index]
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }
}
