use serde::Serialize;

use crate::error::{Error, Result};
use crate::memory::{ChunkKind, ReadMemory, WriteMemory};
use crate::paging::{Paged, Resource, ResourceCompiler};
use crate::texture::Texture;

/// Jenkins one-at-a-time hash of a lowercased name, the dictionary key.
pub fn joaat(name: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in name.bytes() {
        hash = hash.wrapping_add(byte.to_ascii_lowercase() as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

mod offsets {
    pub const KEYS: u64 = 0x00;
    pub const TEXTURES: u64 = 0x08;
    pub const COUNT: u64 = 0x10;
}

/// Textures keyed by name hash, kept sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextureDictionary {
    entries: Vec<(u32, Texture)>,
}

impl TextureDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a texture under the hash of its name, returning the texture
    /// it replaces.
    pub fn insert(&mut self, texture: Texture) -> Option<Texture> {
        let key = joaat(&texture.name);
        match self.entries.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(index) => Some(std::mem::replace(&mut self.entries[index].1, texture)),
            Err(index) => {
                self.entries.insert(index, (key, texture));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Texture> {
        self.get_by_key(joaat(name))
    }

    pub fn get_by_key(&self, key: u32) -> Option<&Texture> {
        self.entries
            .binary_search_by_key(&key, |(k, _)| *k)
            .ok()
            .map(|index| &self.entries[index].1)
    }

    pub fn remove(&mut self, name: &str) -> Option<Texture> {
        let key = joaat(name);
        self.entries
            .binary_search_by_key(&key, |(k, _)| *k)
            .ok()
            .map(|index| self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Texture)> {
        self.entries.iter().map(|(key, texture)| (*key, texture))
    }
}

impl FromIterator<Texture> for TextureDictionary {
    fn from_iter<I: IntoIterator<Item = Texture>>(iter: I) -> Self {
        let mut dictionary = Self::new();
        for texture in iter {
            dictionary.insert(texture);
        }
        dictionary
    }
}

impl Paged for TextureDictionary {
    const SIZE: u64 = 0x20;

    fn place<M: WriteMemory + ?Sized>(rsc: &mut Resource<'_, M>, address: u64) -> Result<()> {
        let count = rsc.memory().read_u32(address + offsets::COUNT)? as u64;
        let keys = rsc.fixup_data(address + offsets::KEYS, ChunkKind::Virtual, count * 4)?;
        if keys.is_none() && count > 0 {
            return Err(Error::corrupt(format!(
                "texture dictionary at 0x{:X} has {} entries and no keys",
                address, count
            )));
        }
        let textures = rsc.place_array::<Texture>(address + offsets::TEXTURES, count as usize)?;
        let (Some(keys), Some(textures)) = (keys, textures) else {
            return Ok(());
        };

        let mut previous = None;
        for index in 0..count {
            let key = rsc.memory().read_u32(keys + index * 4)?;
            if previous.is_some_and(|previous| previous >= key) {
                return Err(Error::corrupt(format!(
                    "texture dictionary keys are not sorted at entry {}",
                    index
                )));
            }
            previous = Some(key);
            if rsc.memory().read_u64(textures + index * 8)? == 0 {
                return Err(Error::corrupt(format!(
                    "texture dictionary entry {} is null",
                    index
                )));
            }
        }
        Ok(())
    }

    fn read<M: ReadMemory + ?Sized>(memory: &M, address: u64) -> Result<Self> {
        let count = memory.read_u32(address + offsets::COUNT)? as u64;
        if count == 0 {
            return Ok(Self::new());
        }
        let keys = memory.read_u64(address + offsets::KEYS)?;
        let textures = memory.read_u64(address + offsets::TEXTURES)?;

        let mut entries: Vec<(u32, Texture)> = Vec::with_capacity(count as usize);
        for index in 0..count {
            let key = memory.read_u32(keys + index * 4)?;
            if entries.last().is_some_and(|(previous, _)| *previous >= key) {
                return Err(Error::corrupt(format!(
                    "texture dictionary keys are not sorted at entry {}",
                    index
                )));
            }
            let pointer = memory.read_u64(textures + index * 8)?;
            if pointer == 0 {
                return Err(Error::corrupt(format!(
                    "texture dictionary entry {} is null",
                    index
                )));
            }
            entries.push((key, Texture::read(memory, pointer)?));
        }
        Ok(Self { entries })
    }

    fn compile(&self, compiler: &mut ResourceCompiler) -> Result<u64> {
        let at = compiler.alloc_virtual(Self::SIZE, 16)?;
        let count = self.entries.len() as u64;
        if count == 0 {
            return Ok(at);
        }

        let keys = compiler.alloc_virtual(count * 4, 16)?;
        let textures = compiler.alloc_virtual(count * 8, 16)?;
        for (index, (key, texture)) in self.entries.iter().enumerate() {
            let index = index as u64;
            let pointer = texture.compile(compiler)?;
            compiler.write_u32(keys + index * 4, *key)?;
            compiler.write_u64(textures + index * 8, pointer)?;
        }

        compiler.write_u64(at + offsets::KEYS, keys)?;
        compiler.write_u64(at + offsets::TEXTURES, textures)?;
        compiler.write_u32(at + offsets::COUNT, count as u32)?;
        Ok(at)
    }
}
