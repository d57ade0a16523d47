//! Load command: place a texture dictionary and report the heap.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pgrsc::format_bytes;
use pgrsc::memory::ChunkHeap;
use pgrsc::paging::{PagedObject, load_resource};
use pgrsc::texture::TextureDictionary;
use pgrsc::HeapConfig;

use super::{print_heap, print_mini_map};

pub fn run(file: &Path, config: HeapConfig) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let heap = ChunkHeap::new(config)?;
    let mut guard = heap.lock();

    let object: PagedObject<TextureDictionary> = load_resource(&bytes, &mut guard)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let root = object.root_address().unwrap_or_default();
    println!("Loaded {} at 0x{:X}", file.display(), root);
    println!();

    if let Some(map) = object.mini_map() {
        print_mini_map(map);
        println!();
    }
    print_heap(&guard);
    println!();

    let dictionary = object.read(&guard)?;
    println!("Textures: {}", dictionary.len());
    for (key, texture) in dictionary.iter() {
        println!(
            "  0x{:08X}  {:<24} {:>5}x{:<5} {:<8} {:>2} mips  {}",
            key,
            texture.name,
            texture.width,
            texture.height,
            texture.format,
            texture.mip_levels,
            format_bytes(texture.pixels.len() as u64)
        );
    }

    object.destroy(&mut guard)?;
    println!();
    println!("Destroyed");
    print_heap(&guard);

    Ok(())
}
