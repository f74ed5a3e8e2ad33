//! Defines the capability traits the compiler consumes from the native object layer.

use anyhow::Result;
use ash::vk;

use crate::allocator::traits::Allocator;

/// Device properties that influence memory placement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceLimits {
    /// `bufferImageGranularity`: linear and optimal resources closer than this must not share a page.
    pub buffer_image_granularity: vk::DeviceSize,
    /// Whether a lazily allocated memory type exists and can be allocated from.
    pub lazily_allocated: bool,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            buffer_image_granularity: 1,
            lazily_allocated: false,
        }
    }
}

/// Everything the compiler needs from a Vulkan device. The compiler never calls into Vulkan directly,
/// all objects it owns are created and destroyed through this trait.
///
/// [`AshDevice`](crate::AshDevice) implements this on top of `ash` and `gpu-allocator`.
pub trait Device: Clone {
    type Allocator: Allocator;

    /// The allocator used for the backing memory of managed resources.
    fn allocator(&self) -> Self::Allocator;
    fn limits(&self) -> DeviceLimits;

    fn create_image(&self, info: &vk::ImageCreateInfo) -> Result<vk::Image>;
    fn destroy_image(&self, image: vk::Image);
    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> Result<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    /// # Safety
    /// `memory` must be valid and `offset` must satisfy the memory requirements of `image`.
    unsafe fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()>;
    /// # Safety
    /// `memory` must be valid and `offset` must satisfy the memory requirements of `buffer`.
    unsafe fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()>;

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> Result<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo2) -> Result<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    /// Framebuffers are always created imageless.
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_descriptor_set_layout(&self, info: &vk::DescriptorSetLayoutCreateInfo) -> Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> Result<vk::DescriptorPool>;
    /// Destroying a pool frees every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo) -> Result<Vec<vk::DescriptorSet>>;
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);
}
