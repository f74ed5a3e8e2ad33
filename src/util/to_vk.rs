//! Utility traits to convert objects into their corresponding vulkan types

use ash::vk;

/// Convert an object into a vulkan type
pub trait IntoVulkanType {
    /// Output Vulkan type
    type Output;

    /// Consume self and return a vulkan type
    fn into_vulkan(self) -> Self::Output;
}

/// Synchronization2 stages that do not fit in the legacy 32-bit flags are mapped onto the legacy stage containing them.
impl IntoVulkanType for vk::PipelineStageFlags2 {
    type Output = vk::PipelineStageFlags;

    fn into_vulkan(self) -> Self::Output {
        let mut legacy = vk::PipelineStageFlags::from_raw((self.as_raw() & 0xFFFF_FFFF) as u32);
        if self.intersects(vk::PipelineStageFlags2::INDEX_INPUT | vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT) {
            legacy |= vk::PipelineStageFlags::VERTEX_INPUT;
        }
        if self.intersects(
            vk::PipelineStageFlags2::COPY
                | vk::PipelineStageFlags2::BLIT
                | vk::PipelineStageFlags2::RESOLVE
                | vk::PipelineStageFlags2::CLEAR,
        ) {
            legacy |= vk::PipelineStageFlags::TRANSFER;
        }
        if self.intersects(vk::PipelineStageFlags2::PRE_RASTERIZATION_SHADERS) {
            legacy |= vk::PipelineStageFlags::VERTEX_SHADER;
        }
        legacy
    }
}

impl IntoVulkanType for vk::AccessFlags2 {
    type Output = vk::AccessFlags;

    fn into_vulkan(self) -> Self::Output {
        let mut legacy = vk::AccessFlags::from_raw((self.as_raw() & 0xFFFF_FFFF) as u32);
        if self.intersects(vk::AccessFlags2::SHADER_SAMPLED_READ | vk::AccessFlags2::SHADER_STORAGE_READ) {
            legacy |= vk::AccessFlags::SHADER_READ;
        }
        if self.intersects(vk::AccessFlags2::SHADER_STORAGE_WRITE) {
            legacy |= vk::AccessFlags::SHADER_WRITE;
        }
        legacy
    }
}
