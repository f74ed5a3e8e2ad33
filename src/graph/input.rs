use anyhow::Result;
use ash::vk;

use crate::graph::alias::Alias;
use crate::graph::usage::Usage;
use crate::Error;

/// Upper bound on color attachment locations and input attachment indices.
pub const MAX_ATTACHMENTS: u32 = 32;

/// Descriptor binding of an input, in the descriptor set the graph builds for its pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    /// Immutable sampler, only used for sampled images.
    pub sampler: Option<vk::Sampler>,
}

/// Binds one pass to one value of a resource.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Input {
    pub alias: Alias,
    pub usage: Usage,
    pub stages: vk::PipelineStageFlags2,
    pub descriptor: Option<DescriptorBinding>,
    /// Color attachment location, or input attachment index.
    pub attachment: Option<u32>,
    #[derivative(Debug = "ignore")]
    pub clear: Option<vk::ClearValue>,
}

impl Input {
    /// Create an input with the default stages of its usage.
    pub fn new(alias: Alias, usage: Usage) -> Self {
        Self {
            alias,
            usage,
            stages: usage.default_stages(),
            descriptor: None,
            attachment: None,
            clear: None,
        }
    }

    pub fn stages(mut self, stages: vk::PipelineStageFlags2) -> Self {
        self.stages = stages;
        self
    }

    pub fn descriptor(mut self, binding: u32, sampler: Option<vk::Sampler>) -> Self {
        self.descriptor = Some(DescriptorBinding {
            binding,
            sampler,
        });
        self
    }

    pub fn attachment(mut self, index: u32) -> Self {
        self.attachment = Some(index);
        self
    }

    pub fn clear(mut self, value: vk::ClearValue) -> Self {
        self.clear = Some(value);
        self
    }

    /// Checks done before the input is added to a pass.
    pub(crate) fn validate(&self, graphics: bool) -> Result<()> {
        if self.usage.is_render_pass_attachment() && !graphics {
            return Err(Error::NoRenderpass.into());
        }
        match self.attachment {
            Some(index) if index >= MAX_ATTACHMENTS => Err(Error::InvalidAttachment(index).into()),
            _ => Ok(()),
        }
    }
}
