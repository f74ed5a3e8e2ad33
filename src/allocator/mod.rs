//! The allocator module exposes a couple interesting parts of the API
//! <br>
//! <br>
//! # Allocator traits
//! These are defined in [`traits`], and can be implemented to supply a custom allocator through a custom
//! [`Device`](crate::Device) implementation.
//! # Default allocator
//! A default allocator based on the `gpu_allocator` crate is implemented here. [`AshDevice`](crate::AshDevice) uses it.

pub mod default_allocator;
pub mod memory_type;
pub mod traits;
