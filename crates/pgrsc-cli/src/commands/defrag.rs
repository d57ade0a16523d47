//! Defrag command: fragment the heap, then defragment a dictionary.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pgrsc::HeapConfig;
use pgrsc::memory::ChunkHeap;
use pgrsc::paging::{
    PagedObject, defragment_resource, destroy_resource, load_resource,
};
use pgrsc::texture::TextureDictionary;

use super::print_heap;

pub fn run(file: &Path, spacers: usize, config: HeapConfig) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let heap = ChunkHeap::new(config)?;
    let mut guard = heap.lock();

    // Copies loaded first leave holes ahead of the target once destroyed.
    let mut placeholders = Vec::with_capacity(spacers);
    for _ in 0..spacers {
        let spacer: PagedObject<TextureDictionary> = load_resource(&bytes, &mut guard)?;
        placeholders.push(spacer);
    }
    let object: PagedObject<TextureDictionary> = load_resource(&bytes, &mut guard)?;
    for spacer in placeholders {
        destroy_resource(spacer, &mut guard)?;
    }

    let before = object.regenerate_map().unwrap_or_default();
    let expected = object.read(&guard)?;
    println!("Before:");
    print_heap(&guard);

    let object = defragment_resource(object, &mut guard)?;
    let after = object.regenerate_map().unwrap_or_default();

    println!();
    println!("Moves:");
    for (index, (old, new)) in before.chunks().iter().zip(after.chunks()).enumerate() {
        let marker = if old.destination == new.destination { " " } else { "*" };
        println!(
            "  {} #{:<3} {:<8} 0x{:X} -> 0x{:X}  {}",
            marker, index, old.kind, old.destination, new.destination, old.size_class
        );
    }

    println!();
    println!("After:");
    print_heap(&guard);

    let intact = object.read(&guard)? == expected;
    println!();
    println!("Graph intact: {}", if intact { "yes" } else { "NO" });

    destroy_resource(object, &mut guard)?;
    Ok(())
}
