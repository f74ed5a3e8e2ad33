//! Various utilities

pub mod align;
pub mod bitset;
pub mod format;
pub mod to_vk;
