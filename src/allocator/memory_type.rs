//! Exposes different memory types that determine where memory allocations should live.

/// The memory type of an allocation indicates where it should live.
/// Give this to an [`Allocator`](crate::Allocator) to let it decide
/// where your allocation should live.
///
/// See also: [`Allocator::allocate()`](crate::Allocator::allocate())
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryType {
    /// Store the allocation in GPU only accessible memory - typically this is the faster GPU resource and this should be
    /// where most of the allocations live.
    GpuOnly,
    /// Lazily allocated GPU memory, only usable for transient attachments. On tiled GPUs these may never be
    /// backed by physical memory at all.
    GpuLazy,
    /// Memory useful for uploading data to the GPU and potentially for constant buffers.
    CpuToGpu,
    /// Memory useful for CPU readback of data.
    GpuToCpu,
}

impl From<MemoryType> for gpu_allocator::MemoryLocation {
    fn from(value: MemoryType) -> Self {
        match value {
            // gpu-allocator has no lazily allocated location, device local memory is always valid for transient attachments.
            MemoryType::GpuOnly | MemoryType::GpuLazy => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryType::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryType::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
        }
    }
}
