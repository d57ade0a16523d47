use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::error::{Error, Result};

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Pixel formats by their legacy format code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr, Display,
)]
#[repr(u32)]
pub enum TextureFormat {
    #[strum(serialize = "A8R8G8B8")]
    A8R8G8B8 = 21,
    #[strum(serialize = "DXT1")]
    Dxt1 = fourcc(b"DXT1"),
    #[strum(serialize = "DXT3")]
    Dxt3 = fourcc(b"DXT3"),
    #[strum(serialize = "DXT5")]
    Dxt5 = fourcc(b"DXT5"),
    #[strum(serialize = "ATI1")]
    Ati1 = fourcc(b"ATI1"),
    #[strum(serialize = "ATI2")]
    Ati2 = fourcc(b"ATI2"),
    #[strum(serialize = "BC7")]
    Bc7 = fourcc(b"BC7 "),
}

impl TryFrom<u32> for TextureFormat {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        const DXT1: u32 = fourcc(b"DXT1");
        const DXT3: u32 = fourcc(b"DXT3");
        const DXT5: u32 = fourcc(b"DXT5");
        const ATI1: u32 = fourcc(b"ATI1");
        const ATI2: u32 = fourcc(b"ATI2");
        const BC7: u32 = fourcc(b"BC7 ");

        match value {
            21 => Ok(Self::A8R8G8B8),
            DXT1 => Ok(Self::Dxt1),
            DXT3 => Ok(Self::Dxt3),
            DXT5 => Ok(Self::Dxt5),
            ATI1 => Ok(Self::Ati1),
            ATI2 => Ok(Self::Ati2),
            BC7 => Ok(Self::Bc7),
            _ => Err(Error::InvalidTexture(format!(
                "unknown format code 0x{:08X}",
                value
            ))),
        }
    }
}

impl TextureFormat {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether the format stores 4x4 pixel blocks
    pub fn is_block_compressed(self) -> bool {
        !matches!(self, Self::A8R8G8B8)
    }

    /// Bytes per 4x4 block, or per pixel for uncompressed formats
    pub fn unit_bytes(self) -> u64 {
        match self {
            Self::A8R8G8B8 => 4,
            Self::Dxt1 | Self::Ati1 => 8,
            Self::Dxt3 | Self::Dxt5 | Self::Ati2 | Self::Bc7 => 16,
        }
    }

    /// Bytes in one row of pixels (or blocks)
    pub fn pitch(self, width: u32) -> u64 {
        if self.is_block_compressed() {
            (width as u64).div_ceil(4).max(1) * self.unit_bytes()
        } else {
            width as u64 * self.unit_bytes()
        }
    }

    pub fn surface_size(self, width: u32, height: u32) -> u64 {
        let rows = if self.is_block_compressed() {
            (height as u64).div_ceil(4).max(1)
        } else {
            height as u64
        };
        self.pitch(width) * rows
    }

    /// Size of a full mip chain, `depth` slices deep.
    pub fn data_size(self, width: u32, height: u32, depth: u32, mip_levels: u32) -> u64 {
        (0..mip_levels)
            .map(|level| {
                let mip_width = width.checked_shr(level).unwrap_or(0).max(1);
                let mip_height = height.checked_shr(level).unwrap_or(0).max(1);
                self.surface_size(mip_width, mip_height)
            })
            .sum::<u64>()
            * depth as u64
    }
}
