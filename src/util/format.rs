use ash::vk;

/// Properties of image formats the compiler needs to build views and barriers.
pub trait FormatAspect {
    fn aspect(&self) -> vk::ImageAspectFlags;

    fn is_depth(&self) -> bool {
        self.aspect().contains(vk::ImageAspectFlags::DEPTH)
    }

    fn has_stencil(&self) -> bool {
        self.aspect().contains(vk::ImageAspectFlags::STENCIL)
    }
}

impl FormatAspect for vk::Format {
    fn aspect(&self) -> vk::ImageAspectFlags {
        match *self {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => vk::ImageAspectFlags::DEPTH,
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}
