//! The [`Device`](crate::Device) implementation backed by `ash` and `gpu-allocator`.

use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::allocator::default_allocator::DefaultAllocator;
use crate::core::traits::{Device, DeviceLimits};

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    properties: vk::PhysicalDeviceProperties,
    has_lazy_memory: bool,
    allocator: DefaultAllocator,
}

/// Wrapper around a `VkDevice` created by the caller. Internal state is wrapped in an `Arc<DeviceInner>`, so this is safe
/// to clone. The wrapped device is not destroyed when the last clone is dropped, the caller stays responsible for it.
#[derive(Debug, Clone)]
pub struct AshDevice {
    inner: Arc<DeviceInner>,
}

impl AshDevice {
    /// Wrap an existing device. This creates the [`DefaultAllocator`] used for all graph owned memory.
    /// # Errors
    /// * Fails if the allocator could not be created.
    pub fn new(instance: &ash::Instance, device: ash::Device, physical_device: vk::PhysicalDevice) -> Result<Self> {
        // SAFETY: The caller passed in a valid instance and physical device.
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let has_lazy_memory = memory.memory_types[..memory.memory_type_count as usize]
            .iter()
            .any(|ty| ty.property_flags.contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED));
        if has_lazy_memory {
            warn!("Device exposes lazily allocated memory, but the default allocator cannot allocate from it. Transient attachments use device local memory.");
        }
        let allocator = DefaultAllocator::new(instance, &device, physical_device)?;
        Ok(Self {
            inner: Arc::new(DeviceInner {
                handle: device,
                properties,
                has_lazy_memory,
                allocator,
            }),
        })
    }

    /// Get unsafe access to the underlying `VkDevice` handle.
    /// # Safety
    /// * The caller should not call `vkDestroyDevice` on this while the graph is alive.
    pub unsafe fn handle(&self) -> ash::Device {
        self.inner.handle.clone()
    }

    /// Get the device properties
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.inner.properties
    }

    /// Whether the physical device has a lazily allocated memory type, even if it is not used.
    pub fn has_lazy_memory(&self) -> bool {
        self.inner.has_lazy_memory
    }
}

impl Deref for AshDevice {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.inner.handle
    }
}

impl Device for AshDevice {
    type Allocator = DefaultAllocator;

    fn allocator(&self) -> Self::Allocator {
        self.inner.allocator.clone()
    }

    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            buffer_image_granularity: self.inner.properties.limits.buffer_image_granularity,
            lazily_allocated: false,
        }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> Result<vk::Image> {
        Ok(unsafe { self.inner.handle.create_image(info, None)? })
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.inner.handle.destroy_image(image, None) }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> Result<vk::Buffer> {
        Ok(unsafe { self.inner.handle.create_buffer(info, None)? })
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.inner.handle.destroy_buffer(buffer, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.inner.handle.get_image_memory_requirements(image) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.inner.handle.get_buffer_memory_requirements(buffer) }
    }

    unsafe fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()> {
        Ok(self.inner.handle.bind_image_memory(image, memory, offset)?)
    }

    unsafe fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()> {
        Ok(self.inner.handle.bind_buffer_memory(buffer, memory, offset)?)
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> Result<vk::ImageView> {
        Ok(unsafe { self.inner.handle.create_image_view(info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.inner.handle.destroy_image_view(view, None) }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo2) -> Result<vk::RenderPass> {
        Ok(unsafe { self.inner.handle.create_render_pass2(info, None)? })
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.inner.handle.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> Result<vk::Framebuffer> {
        Ok(unsafe { self.inner.handle.create_framebuffer(info, None)? })
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.inner.handle.destroy_framebuffer(framebuffer, None) }
    }

    fn create_descriptor_set_layout(&self, info: &vk::DescriptorSetLayoutCreateInfo) -> Result<vk::DescriptorSetLayout> {
        Ok(unsafe { self.inner.handle.create_descriptor_set_layout(info, None)? })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.inner.handle.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> Result<vk::DescriptorPool> {
        Ok(unsafe { self.inner.handle.create_descriptor_pool(info, None)? })
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.inner.handle.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo) -> Result<Vec<vk::DescriptorSet>> {
        Ok(unsafe { self.inner.handle.allocate_descriptor_sets(info)? })
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.inner.handle.update_descriptor_sets(writes, &[]) }
    }
}
