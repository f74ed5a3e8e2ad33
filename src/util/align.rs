//! Utilities for aligning memory

use std::ops::{Add, Rem, Sub};

/// Align a size to a required alignment. Does not align the base address.
/// Values that are already aligned are returned unchanged.
pub fn align<T: Add<T, Output = T> + Sub<T, Output = T> + Rem<T, Output = T> + PartialEq + Default + Copy>(
    value: T,
    alignment: T,
) -> T {
    if alignment == T::default() {
        return value;
    }
    let unaligned_size = value % alignment;
    if unaligned_size == T::default() {
        return value;
    }
    let padding = alignment - unaligned_size;
    value + padding
}
