//! CLI command implementations.

pub mod defrag;
pub mod hex_utils;
pub mod hexdump;
pub mod inspect;
pub mod load;
pub mod repack;
pub mod sample;

use pgrsc::memory::{ChunkKind, PoolStats};
use pgrsc::paging::MiniMap;
use pgrsc::format_bytes;

/// Print one line per chunk of a loaded object.
fn print_mini_map(map: &MiniMap) {
    println!(
        "Mini map: {} virtual, {} physical, main chunk #{}{}",
        map.virtual_chunk_count(),
        map.physical_chunk_count(),
        map.main_chunk_index(),
        if map.is_compiled() { "" } else { " (dynamic)" }
    );
    for (index, (kind, address, size_class)) in map.chunks().enumerate() {
        println!("  #{:<3} {:<8} 0x{:X}  {}", index, kind, address, size_class);
    }
    println!("  Total: {}", format_bytes(map.total_size()));
}

fn print_pool_stats(stats: &PoolStats) {
    println!(
        "{:<8} pool: {} chunks, {} used, {} free",
        stats.kind,
        stats.chunk_count,
        format_bytes(stats.allocated_bytes),
        format_bytes(stats.free_bytes())
    );
    let by_class: Vec<String> = stats
        .chunks_by_class
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(class, count)| format!("class {}: {}", class, count))
        .collect();
    if !by_class.is_empty() {
        println!("         {}", by_class.join(", "));
    }
}

fn print_heap<A: pgrsc::memory::ChunkAllocator + ?Sized>(alloc: &A) {
    print_pool_stats(&alloc.stats(ChunkKind::Virtual));
    print_pool_stats(&alloc.stats(ChunkKind::Physical));
}
