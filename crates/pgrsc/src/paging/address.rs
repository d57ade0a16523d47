//! Packed chunk address.
//!
//! A loaded chunk is remembered as a single 64-bit word: the destination
//! address in the high bits and the chunk's size class in the low bits.
//! Chunk addresses are at least 16-byte aligned, so the low four bits of
//! the address are always free to carry the size class.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paging::SizeClass;

/// Low 4 bits: size class.
pub const SIZE_CLASS_MASK: u64 = 0xF;

/// High 60 bits: chunk address.
pub const ADDRESS_MASK: u64 = !SIZE_CLASS_MASK;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackedAddress(u64);

impl PackedAddress {
    pub fn encode(address: u64, size_class: SizeClass) -> Result<Self> {
        if address & SIZE_CLASS_MASK != 0 {
            return Err(Error::MisalignedAddress(address));
        }
        Ok(Self((address & ADDRESS_MASK) | size_class.raw() as u64))
    }

    /// Reinterpret a raw word. Never fails; a word that did not come from
    /// [`PackedAddress::encode`] decodes to whatever its bits say.
    pub fn from_raw(word: u64) -> Self {
        Self(word)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn address(self) -> u64 {
        self.0 & ADDRESS_MASK
    }

    pub fn size_class(self) -> SizeClass {
        // Four bits always fit a size class.
        SizeClass::new((self.0 & SIZE_CLASS_MASK) as u8).unwrap_or(SizeClass::MIN)
    }

    pub fn decode(self) -> (u64, SizeClass) {
        (self.address(), self.size_class())
    }
}

impl fmt::Display for PackedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{}", self.address(), self.size_class().raw())
    }
}
