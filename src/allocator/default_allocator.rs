//! Contains a default allocator type based on the [`gpu_allocator`] crate, used by [`AshDevice`](crate::AshDevice).

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;

use crate::allocator::memory_type::MemoryType;
use crate::allocator::traits::{self, Allocator};
use crate::Error;

/// The default allocator. This calls into the `gpu_allocator` crate.
/// It's important to note that this allocator is `Clone`, `Send` and `Sync`. All its internal state is safely
/// wrapped inside an `Arc<Mutex<T>>`, so every compiled graph can hold on to a copy.
///
/// See also: [`Allocator`](traits::Allocator), [`Allocation`](traits::Allocation)
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct DefaultAllocator {
    #[derivative(Debug = "ignore")]
    alloc: Arc<Mutex<vk_alloc::Allocator>>,
}

/// Allocation returned from the default allocator. The memory is returned to the allocator when this is dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Allocation {
    // These are wrapped in `Option`s so we can "move" out of them in `Drop`.
    allocator: Option<DefaultAllocator>,
    allocation: Option<vk_alloc::Allocation>,
}

impl DefaultAllocator {
    /// Create a new default allocator.
    /// # Errors
    /// * May fail if creating the internal `gpu_allocator` fails.
    pub fn new(instance: &ash::Instance, device: &ash::Device, physical_device: vk::PhysicalDevice) -> Result<Self> {
        Ok(Self {
            alloc: Arc::new(Mutex::new(vk_alloc::Allocator::new(&vk_alloc::AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
            })?)),
        })
    }

    fn free_impl(&mut self, allocation: &mut <Self as Allocator>::Allocation) -> Result<()> {
        let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
        if let Some(allocation) = allocation.allocation.take() {
            alloc.free(allocation)?;
        }
        Ok(())
    }
}

impl Allocator for DefaultAllocator {
    type Allocation = Allocation;

    /// Allocates raw memory of a specific memory type. The given name is used for internal tracking and
    /// debug logging.
    /// # Errors
    /// * May fail if the device is out of memory
    /// * May fail if invalid [`vk::MemoryRequirements`] were passed in.
    fn allocate(&mut self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation> {
        let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
        let allocation = alloc.allocate(&vk_alloc::AllocationCreateDesc {
            name,
            requirements: *requirements,
            location: gpu_allocator::MemoryLocation::from(ty),
            // Backing blocks hold optimal images next to buffers, the compiler already separates them by bufferImageGranularity.
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        Ok(Allocation {
            allocator: Some(self.clone()),
            allocation: Some(allocation),
        })
    }

    /// Explicitly free memory owned by this allocator. Dropping the allocation does the same.
    fn free(&mut self, mut allocation: Self::Allocation) -> Result<()> {
        self.free_impl(&mut allocation)
    }
}

impl traits::Allocation for Allocation {
    unsafe fn memory(&self) -> vk::DeviceMemory {
        self.allocation
            .as_ref()
            .map(|allocation| allocation.memory())
            .unwrap_or_default()
    }

    fn offset(&self) -> vk::DeviceSize {
        self.allocation.as_ref().map(|allocation| allocation.offset()).unwrap_or_default()
    }

    /// This pointer already points into the exact memory region of the suballocation, so no offset must be applied.
    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.allocation.as_ref().and_then(|allocation| allocation.mapped_ptr())
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(mut allocator) = self.allocator.take() {
            if let Err(err) = allocator.free_impl(self) {
                error!("Failed to free allocation: {err}");
            }
        }
    }
}
