use ash::vk;

/// The ways a pass can access a resource. Each usage maps to a fixed access mask, image layout and
/// creation usage flag. Pipeline stages are declared separately on the input, [`Usage::default_stages()`]
/// gives a sensible default.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Usage {
    /// Color attachment that is written without reading its previous contents.
    ColorAttachmentW,
    /// Color attachment that is blended onto its previous contents.
    ColorAttachmentRW,
    /// Read-only depth attachment, e.g. depth testing without depth writes.
    DepthAttachmentR,
    DepthAttachmentRW,
    InputAttachment,
    SampledImage,
    StorageImageR,
    StorageImageW,
    StorageImageRW,
    TransferImageSrc,
    TransferImageDst,
    UniformBuffer,
    StorageBufferR,
    StorageBufferW,
    StorageBufferRW,
    VertexBuffer,
    IndexBuffer,
    DrawIndirectBuffer,
    TransferBufferSrc,
    TransferBufferDst,
}

impl Usage {
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            Usage::ColorAttachmentW
                | Usage::ColorAttachmentRW
                | Usage::DepthAttachmentR
                | Usage::DepthAttachmentRW
                | Usage::InputAttachment
                | Usage::SampledImage
                | Usage::StorageImageR
                | Usage::StorageImageW
                | Usage::StorageImageRW
                | Usage::TransferImageSrc
                | Usage::TransferImageDst
        )
    }

    /// Whether this usage writes to the resource, producing a new value.
    pub fn is_write(&self) -> bool {
        !self.write_access().is_empty()
    }

    pub fn is_read_only(&self) -> bool {
        !self.is_write()
    }

    /// Whether the previous contents of the resource are observed by this usage.
    pub fn reads_previous(&self) -> bool {
        !self.read_access().is_empty()
    }

    /// Color and depth attachments. Input attachments are handled separately, since they are also descriptors.
    pub fn is_attachment(&self) -> bool {
        matches!(
            self,
            Usage::ColorAttachmentW | Usage::ColorAttachmentRW | Usage::DepthAttachmentR | Usage::DepthAttachmentRW
        )
    }

    pub fn is_color_attachment(&self) -> bool {
        matches!(self, Usage::ColorAttachmentW | Usage::ColorAttachmentRW)
    }

    pub fn is_depth_attachment(&self) -> bool {
        matches!(self, Usage::DepthAttachmentR | Usage::DepthAttachmentRW)
    }

    /// Any usage that is bound to a render pass attachment slot.
    pub fn is_render_pass_attachment(&self) -> bool {
        self.is_attachment() || *self == Usage::InputAttachment
    }

    pub fn read_access(&self) -> vk::AccessFlags2 {
        match self {
            Usage::ColorAttachmentW => vk::AccessFlags2::NONE,
            Usage::ColorAttachmentRW => vk::AccessFlags2::COLOR_ATTACHMENT_READ,
            Usage::DepthAttachmentR | Usage::DepthAttachmentRW => vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
            Usage::InputAttachment => vk::AccessFlags2::INPUT_ATTACHMENT_READ,
            Usage::SampledImage => vk::AccessFlags2::SHADER_SAMPLED_READ,
            Usage::StorageImageR | Usage::StorageImageRW => vk::AccessFlags2::SHADER_STORAGE_READ,
            Usage::StorageImageW => vk::AccessFlags2::NONE,
            Usage::TransferImageSrc => vk::AccessFlags2::TRANSFER_READ,
            Usage::TransferImageDst => vk::AccessFlags2::NONE,
            Usage::UniformBuffer => vk::AccessFlags2::UNIFORM_READ,
            Usage::StorageBufferR | Usage::StorageBufferRW => vk::AccessFlags2::SHADER_STORAGE_READ,
            Usage::StorageBufferW => vk::AccessFlags2::NONE,
            Usage::VertexBuffer => vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
            Usage::IndexBuffer => vk::AccessFlags2::INDEX_READ,
            Usage::DrawIndirectBuffer => vk::AccessFlags2::INDIRECT_COMMAND_READ,
            Usage::TransferBufferSrc => vk::AccessFlags2::TRANSFER_READ,
            Usage::TransferBufferDst => vk::AccessFlags2::NONE,
        }
    }

    pub fn write_access(&self) -> vk::AccessFlags2 {
        match self {
            Usage::ColorAttachmentW | Usage::ColorAttachmentRW => vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            Usage::DepthAttachmentRW => vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Usage::StorageImageW | Usage::StorageImageRW => vk::AccessFlags2::SHADER_STORAGE_WRITE,
            Usage::TransferImageDst => vk::AccessFlags2::TRANSFER_WRITE,
            Usage::StorageBufferW | Usage::StorageBufferRW => vk::AccessFlags2::SHADER_STORAGE_WRITE,
            Usage::TransferBufferDst => vk::AccessFlags2::TRANSFER_WRITE,
            _ => vk::AccessFlags2::NONE,
        }
    }

    /// Get the access flags for this usage.
    pub fn access(&self) -> vk::AccessFlags2 {
        self.read_access() | self.write_access()
    }

    /// Layout an image must be in for this usage. Buffers report `UNDEFINED`.
    pub fn layout(&self) -> vk::ImageLayout {
        match self {
            Usage::ColorAttachmentW | Usage::ColorAttachmentRW => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Usage::DepthAttachmentR => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Usage::DepthAttachmentRW => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Usage::InputAttachment | Usage::SampledImage => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Usage::StorageImageR | Usage::StorageImageW | Usage::StorageImageRW => vk::ImageLayout::GENERAL,
            Usage::TransferImageSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Usage::TransferImageDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            _ => vk::ImageLayout::UNDEFINED,
        }
    }

    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        match self {
            Usage::ColorAttachmentW | Usage::ColorAttachmentRW => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            Usage::DepthAttachmentR | Usage::DepthAttachmentRW => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            Usage::InputAttachment => vk::ImageUsageFlags::INPUT_ATTACHMENT,
            Usage::SampledImage => vk::ImageUsageFlags::SAMPLED,
            Usage::StorageImageR | Usage::StorageImageW | Usage::StorageImageRW => vk::ImageUsageFlags::STORAGE,
            Usage::TransferImageSrc => vk::ImageUsageFlags::TRANSFER_SRC,
            Usage::TransferImageDst => vk::ImageUsageFlags::TRANSFER_DST,
            _ => vk::ImageUsageFlags::empty(),
        }
    }

    pub fn buffer_usage(&self) -> vk::BufferUsageFlags {
        match self {
            Usage::UniformBuffer => vk::BufferUsageFlags::UNIFORM_BUFFER,
            Usage::StorageBufferR | Usage::StorageBufferW | Usage::StorageBufferRW => vk::BufferUsageFlags::STORAGE_BUFFER,
            Usage::VertexBuffer => vk::BufferUsageFlags::VERTEX_BUFFER,
            Usage::IndexBuffer => vk::BufferUsageFlags::INDEX_BUFFER,
            Usage::DrawIndirectBuffer => vk::BufferUsageFlags::INDIRECT_BUFFER,
            Usage::TransferBufferSrc => vk::BufferUsageFlags::TRANSFER_SRC,
            Usage::TransferBufferDst => vk::BufferUsageFlags::TRANSFER_DST,
            _ => vk::BufferUsageFlags::empty(),
        }
    }

    pub fn default_stages(&self) -> vk::PipelineStageFlags2 {
        match self {
            Usage::ColorAttachmentW | Usage::ColorAttachmentRW => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            // Depth loads happen in early fragment tests, stores in late fragment tests.
            Usage::DepthAttachmentR | Usage::DepthAttachmentRW => {
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
            }
            Usage::InputAttachment => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            Usage::SampledImage | Usage::UniformBuffer => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            Usage::StorageImageR
            | Usage::StorageImageW
            | Usage::StorageImageRW
            | Usage::StorageBufferR
            | Usage::StorageBufferW
            | Usage::StorageBufferRW => vk::PipelineStageFlags2::COMPUTE_SHADER,
            Usage::TransferImageSrc | Usage::TransferImageDst | Usage::TransferBufferSrc | Usage::TransferBufferDst => {
                vk::PipelineStageFlags2::TRANSFER
            }
            Usage::VertexBuffer | Usage::IndexBuffer => vk::PipelineStageFlags2::VERTEX_INPUT,
            Usage::DrawIndirectBuffer => vk::PipelineStageFlags2::DRAW_INDIRECT,
        }
    }

    /// Descriptor type used when this usage is bound through a descriptor set.
    pub fn descriptor_type(&self) -> Option<vk::DescriptorType> {
        match self {
            Usage::InputAttachment => Some(vk::DescriptorType::INPUT_ATTACHMENT),
            Usage::SampledImage => Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            Usage::StorageImageR | Usage::StorageImageW | Usage::StorageImageRW => Some(vk::DescriptorType::STORAGE_IMAGE),
            Usage::UniformBuffer => Some(vk::DescriptorType::UNIFORM_BUFFER),
            Usage::StorageBufferR | Usage::StorageBufferW | Usage::StorageBufferRW => Some(vk::DescriptorType::STORAGE_BUFFER),
            _ => None,
        }
    }
}
