use thiserror::Error;

use crate::memory::ChunkKind;
use crate::paging::SizeClass;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Corrupt resource format: {0}")]
    CorruptFormat(String),

    #[error("Out of {kind} memory: no room for a {size_class} chunk")]
    OutOfMemory { kind: ChunkKind, size_class: SizeClass },

    #[error("Invalid free of {kind} chunk at {address:#x}: {reason}")]
    InvalidFree {
        address: u64,
        kind: ChunkKind,
        reason: String,
    },

    #[error("Paged object at {address:#x} was already destroyed")]
    UseAfterDestroy { address: u64 },

    #[error("Address {0:#x} is not aligned to 16 bytes")]
    MisalignedAddress(u64),

    #[error("Access of {size} bytes at {address:#x} is outside of any allocated chunk")]
    UnmappedAddress { address: u64, size: usize },

    #[error("Invalid size class: {0}")]
    InvalidSizeClass(u8),

    #[error("Invalid heap configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid texture: {0}")]
    InvalidTexture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for building a [`Error::CorruptFormat`] from anything printable.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Error::CorruptFormat(message.into())
    }

    /// Check if this error means the resource bytes cannot be trusted
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::CorruptFormat(_))
    }

    /// Check if this error came from pool exhaustion
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory { .. })
    }
}
