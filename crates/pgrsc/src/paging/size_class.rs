//! Chunk size classes.
//!
//! A size class is a 4-bit code. The byte size of a chunk of class `n`
//! is [`BASE_CHUNK_SIZE`] shifted left by `n`, so every chunk size is a
//! power of two and a multiple of the base size.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Size of a class-0 chunk (8 KiB).
pub const BASE_CHUNK_SIZE: u64 = 0x2000;

/// Number of distinct size classes (4 bits).
pub const SIZE_CLASS_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SizeClass(u8);

impl SizeClass {
    pub const MIN: SizeClass = SizeClass(0);
    pub const MAX: SizeClass = SizeClass(SIZE_CLASS_COUNT as u8 - 1);

    pub fn new(class: u8) -> Result<Self> {
        if (class as usize) < SIZE_CLASS_COUNT {
            Ok(Self(class))
        } else {
            Err(Error::InvalidSizeClass(class))
        }
    }

    /// Smallest class whose chunk can hold `size` bytes, if any.
    pub fn for_size(size: u64) -> Option<Self> {
        (0..SIZE_CLASS_COUNT as u8)
            .map(Self)
            .find(|class| class.bytes() >= size)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    /// Chunk size in bytes.
    pub fn bytes(self) -> u64 {
        BASE_CHUNK_SIZE << self.0
    }

    /// Iterate over every size class, smallest first.
    pub fn all() -> impl Iterator<Item = SizeClass> {
        (0..SIZE_CLASS_COUNT as u8).map(Self)
    }
}

impl TryFrom<u8> for SizeClass {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SizeClass> for u8 {
    fn from(class: SizeClass) -> Self {
        class.0
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {} ({})", self.0, crate::format_bytes(self.bytes()))
    }
}
