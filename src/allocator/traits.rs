use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;

/// Allocates the backing memory of managed resources. Allocations are freed when they are dropped.
pub trait Allocator: Clone + Send + Sync {
    type Allocation: Allocation;

    fn allocate(&mut self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation>;
    fn free(&mut self, allocation: Self::Allocation) -> Result<()>;
}

pub trait Allocation {
    /// # Safety
    /// The memory must not be freed, and only the range `offset()..offset() + size` of it belongs to this allocation.
    unsafe fn memory(&self) -> vk::DeviceMemory;
    fn offset(&self) -> vk::DeviceSize;
    /// Pointer to the start of this allocation, if it lives in host visible memory.
    fn mapped_ptr(&self) -> Option<NonNull<c_void>>;
}
