//! Hexdump command: raw bytes of one chunk of a resource file.
//!
//! Lines are labelled with source addresses, the address space that
//! serialized pointers refer to.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use pgrsc::format::ResourceImage;

use super::hex_utils::{hexdump_lines, parse_hex};

pub fn run(file: &Path, chunk: usize, offset: &str, size: usize, ascii: bool) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let image = ResourceImage::parse(&bytes)?;

    let Some(descriptor) = image.map().chunks().get(chunk) else {
        bail!(
            "Chunk {} does not exist, the resource has {} chunks",
            chunk,
            image.map().len()
        );
    };
    let data = image.chunk_data(chunk);
    let offset = parse_hex(offset)? as usize;
    if offset >= data.len() {
        bail!("Offset 0x{:X} is past the end of the chunk (0x{:X})", offset, data.len());
    }
    let end = offset.saturating_add(size).min(data.len());

    println!(
        "Chunk #{} ({} {}) at 0x{:X}, bytes 0x{:X}..0x{:X}:",
        chunk, descriptor.kind, descriptor.size_class, descriptor.source, offset, end
    );
    println!();
    for line in hexdump_lines(&data[offset..end], descriptor.source + offset as u64, ascii) {
        println!("{}", line);
    }

    Ok(())
}
