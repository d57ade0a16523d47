use serde::Serialize;

use crate::error::{Error, Result};
use crate::memory::{ChunkKind, ReadMemory, WriteMemory};
use crate::paging::{HandleIndexable, Paged, Resource, ResourceCompiler};
use crate::texture::TextureFormat;

/// Live layout of a texture header in a virtual chunk
pub mod offsets {
    pub const NAME: u64 = 0x00;
    pub const PIXELS: u64 = 0x08;
    pub const WIDTH: u64 = 0x10;
    pub const HEIGHT: u64 = 0x12;
    pub const DEPTH: u64 = 0x14;
    pub const MIP_LEVELS: u64 = 0x16;
    pub const FLAGS: u64 = 0x17;
    pub const FORMAT: u64 = 0x18;
    pub const STRIDE: u64 = 0x1C;
    pub const HANDLE_INDEX: u64 = 0x20;
    pub const DATA_SIZE: u64 = 0x24;
}

/// Texture header plus its pixel payload.
///
/// The header lives in a virtual chunk, the pixels in a physical chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Texture {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub mip_levels: u8,
    pub flags: u8,
    pub format: TextureFormat,
    pub handle_index: u32,
    #[serde(skip)]
    pub pixels: Vec<u8>,
}

impl Texture {
    pub fn new(
        name: impl Into<String>,
        width: u16,
        height: u16,
        format: TextureFormat,
        mip_levels: u8,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let texture = Self {
            name: name.into(),
            width,
            height,
            depth: 1,
            mip_levels,
            flags: 0,
            format,
            handle_index: 0,
            pixels,
        };
        texture.validate()?;
        Ok(texture)
    }

    /// Texture whose every pixel byte is `fill`.
    pub fn filled(
        name: impl Into<String>,
        width: u16,
        height: u16,
        format: TextureFormat,
        mip_levels: u8,
        fill: u8,
    ) -> Result<Self> {
        let size = format.data_size(width as u32, height as u32, 1, mip_levels as u32);
        Self::new(name, width, height, format, mip_levels, vec![fill; size as usize])
    }

    /// Longest possible mip chain for the given dimensions
    pub fn max_mip_levels(width: u16, height: u16) -> u8 {
        (16 - width.max(height).max(1).leading_zeros()) as u8
    }

    pub fn stride(&self) -> u32 {
        self.format.pitch(self.width as u32) as u32
    }

    pub fn data_size(&self) -> u64 {
        self.format.data_size(
            self.width as u32,
            self.height as u32,
            self.depth as u32,
            self.mip_levels as u32,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(Error::InvalidTexture(format!(
                "{}: {}x{}x{} has a zero dimension",
                self.name, self.width, self.height, self.depth
            )));
        }
        let max_mips = Self::max_mip_levels(self.width, self.height);
        if self.mip_levels == 0 || self.mip_levels > max_mips {
            return Err(Error::InvalidTexture(format!(
                "{}: {} mip levels, expected 1..={}",
                self.name, self.mip_levels, max_mips
            )));
        }
        if self.pixels.len() as u64 != self.data_size() {
            return Err(Error::InvalidTexture(format!(
                "{}: {} bytes of pixel data, {} {}x{} with {} mips needs {}",
                self.name,
                self.pixels.len(),
                self.format,
                self.width,
                self.height,
                self.mip_levels,
                self.data_size()
            )));
        }
        Ok(())
    }
}

impl Paged for Texture {
    const SIZE: u64 = 0x30;

    fn place<M: WriteMemory + ?Sized>(rsc: &mut Resource<'_, M>, address: u64) -> Result<()> {
        let data_size = rsc.memory().read_u32(address + offsets::DATA_SIZE)? as u64;
        rsc.fixup_data(address + offsets::NAME, ChunkKind::Virtual, 1)?;
        rsc.fixup_data(address + offsets::PIXELS, ChunkKind::Physical, data_size)?;
        Ok(())
    }

    fn read<M: ReadMemory + ?Sized>(memory: &M, address: u64) -> Result<Self> {
        let name = match memory.read_u64(address + offsets::NAME)? {
            0 => String::new(),
            pointer => memory.read_c_string(pointer)?,
        };
        let format = TextureFormat::try_from(memory.read_u32(address + offsets::FORMAT)?)?;
        let data_size = memory.read_u32(address + offsets::DATA_SIZE)? as usize;
        let pixels = match memory.read_u64(address + offsets::PIXELS)? {
            0 if data_size == 0 => Vec::new(),
            0 => {
                return Err(Error::InvalidTexture(format!(
                    "{}: {} bytes of pixel data behind a null pointer",
                    name, data_size
                )));
            }
            pointer => memory.read_bytes(pointer, data_size)?,
        };

        let texture = Self {
            name,
            width: memory.read_u16(address + offsets::WIDTH)?,
            height: memory.read_u16(address + offsets::HEIGHT)?,
            depth: memory.read_u16(address + offsets::DEPTH)?,
            mip_levels: memory.read_u8(address + offsets::MIP_LEVELS)?,
            flags: memory.read_u8(address + offsets::FLAGS)?,
            format,
            handle_index: memory.read_u32(address + offsets::HANDLE_INDEX)?,
            pixels,
        };
        texture.validate()?;
        Ok(texture)
    }

    fn compile(&self, compiler: &mut ResourceCompiler) -> Result<u64> {
        self.validate()?;
        let data_size = u32::try_from(self.pixels.len()).map_err(|_| {
            Error::InvalidTexture(format!("{}: pixel data exceeds 4 GiB", self.name))
        })?;

        let at = compiler.alloc_virtual(Self::SIZE, 16)?;
        let name = compiler.add_string(&self.name)?;
        let pixels = compiler.add_physical_data(&self.pixels)?;

        compiler.write_u64(at + offsets::NAME, name)?;
        compiler.write_u64(at + offsets::PIXELS, pixels)?;
        compiler.write_u16(at + offsets::WIDTH, self.width)?;
        compiler.write_u16(at + offsets::HEIGHT, self.height)?;
        compiler.write_u16(at + offsets::DEPTH, self.depth)?;
        compiler.write_u8(at + offsets::MIP_LEVELS, self.mip_levels)?;
        compiler.write_u8(at + offsets::FLAGS, self.flags)?;
        compiler.write_u32(at + offsets::FORMAT, self.format.code())?;
        compiler.write_u32(at + offsets::STRIDE, self.stride())?;
        compiler.write_u32(at + offsets::HANDLE_INDEX, self.handle_index)?;
        compiler.write_u32(at + offsets::DATA_SIZE, data_size)?;
        Ok(at)
    }
}

impl HandleIndexable for Texture {
    const HANDLE_INDEX_OFFSET: u64 = offsets::HANDLE_INDEX;

    fn handle_index(&self) -> u32 {
        self.handle_index
    }

    fn set_handle_index(&mut self, index: u32) {
        self.handle_index = index;
    }
}
