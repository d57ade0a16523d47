//! Inspect command: header and chunk table of a resource file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pgrsc::format::{ResourceHeader, ResourceImage};
use pgrsc::format_bytes;

pub fn run(file: &Path, json: bool) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let header = ResourceHeader::parse(&bytes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&header)?);
        return Ok(());
    }

    let map = header.resource_map()?;
    println!("File:     {} ({})", file.display(), format_bytes(bytes.len() as u64));
    println!("Version:  {}", header.version);
    println!(
        "Flags:    0x{:X}{}",
        header.flags,
        if header.is_compressed() { " (deflate)" } else { "" }
    );
    println!(
        "Chunks:   {} virtual, {} physical",
        header.virtual_count, header.physical_count
    );
    println!();
    println!("  #    kind      class  size        offset      source");

    for (index, (entry, chunk)) in header.entries.iter().zip(map.chunks()).enumerate() {
        println!(
            "  {:<4} {:<9} {:<6} {:<11} 0x{:<9X} 0x{:X}",
            index,
            chunk.kind,
            entry.size_class.raw(),
            format_bytes(chunk.size()),
            entry.file_offset,
            chunk.source
        );
    }
    println!();
    println!("Total:    {}", format_bytes(map.total_size()));

    match ResourceImage::parse(&bytes) {
        Ok(_) => println!("Payload:  ok"),
        Err(e) => println!("Payload:  {}", e),
    }

    Ok(())
}
