//! Core types shared by the whole crate: the error type, the device capability trait and its `ash` implementation,
//! and graph configuration.

pub mod config;
pub mod device;
pub mod error;
pub mod traits;
