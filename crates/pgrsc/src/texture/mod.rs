//! Texture resources.
//!
//! A [`Texture`] is a small header in a virtual chunk pointing at its name
//! and at a pixel buffer in a physical chunk. A [`TextureDictionary`] is a
//! sorted key array plus an array of texture pointers.

mod dictionary;
mod format;
mod image;

pub use dictionary::{TextureDictionary, joaat};
pub use format::TextureFormat;
pub use image::{Texture, offsets};
