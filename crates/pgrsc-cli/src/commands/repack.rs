//! Repack command: load a resource and export it again.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pgrsc::format_bytes;
use pgrsc::memory::ChunkHeap;
use pgrsc::paging::{PagedObject, destroy_resource, export_resource, load_resource};
use pgrsc::texture::TextureDictionary;
use pgrsc::HeapConfig;

pub fn run(input: &Path, output: &Path, compress: bool, config: HeapConfig) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let heap = ChunkHeap::new(config)?;
    let mut guard = heap.lock();

    let object: PagedObject<TextureDictionary> = load_resource(&bytes, &mut guard)?;
    let exported = export_resource(&object, &guard, compress)?;
    destroy_resource(object, &mut guard)?;

    fs::write(output, &exported)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Repacked {} ({}) -> {} ({})",
        input.display(),
        format_bytes(bytes.len() as u64),
        output.display(),
        format_bytes(exported.len() as u64)
    );

    Ok(())
}
