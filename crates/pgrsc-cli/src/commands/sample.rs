//! Sample command: compile a texture dictionary to a resource file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pgrsc::format_bytes;
use pgrsc::paging::ResourceCompiler;
use pgrsc::texture::{Texture, TextureDictionary, TextureFormat};

const FORMATS: [TextureFormat; 4] = [
    TextureFormat::Dxt1,
    TextureFormat::Dxt5,
    TextureFormat::A8R8G8B8,
    TextureFormat::Bc7,
];

/// Build `count` square textures of `size` pixels with full mip chains.
pub fn sample_dictionary(count: usize, size: u16) -> Result<TextureDictionary> {
    let mip_levels = Texture::max_mip_levels(size, size);
    (0..count)
        .map(|index| {
            let format = FORMATS[index % FORMATS.len()];
            let name = format!("sample_{:02}_{}", index, format.as_str().to_lowercase());
            Texture::filled(name, size, size, format, mip_levels, index as u8)
                .map_err(anyhow::Error::from)
        })
        .collect()
}

pub fn run(output: &Path, count: usize, size: u16, compress: bool) -> Result<()> {
    let dictionary = sample_dictionary(count, size)?;
    let image = ResourceCompiler::compile(&dictionary)?;
    let bytes = image.to_bytes(compress)?;

    fs::write(output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote {} textures to {} ({}, {} virtual + {} physical chunks)",
        dictionary.len(),
        output.display(),
        format_bytes(bytes.len() as u64),
        image.map().virtual_count(),
        image.map().physical_count()
    );

    Ok(())
}
