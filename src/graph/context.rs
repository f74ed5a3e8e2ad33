//! Contexts handed to user callbacks while a compiled graph is recorded.

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::command_buffer::CommandRecorder;
use crate::graph::key::{GlobalKey, Key};

/// Read access to the compiled plan, resolved for one frame.
pub(crate) trait PlanLookup {
    fn input_id(&self, pass: usize, input: Key) -> Option<usize>;
    fn image(&self, input: usize) -> Result<vk::Image>;
    fn image_view(&self, input: usize) -> Result<vk::ImageView>;
    fn image_layout(&self, input: usize) -> vk::ImageLayout;
    fn buffer(&self, input: usize) -> Result<vk::Buffer>;
    fn mapped_ptr(&self, input: usize) -> Result<NonNull<c_void>>;
    fn descriptor_set(&self, pass: usize) -> Option<vk::DescriptorSet>;
    fn descriptor_set_layout(&self, pass: usize) -> Option<vk::DescriptorSetLayout>;
    fn render_pass(&self, pass: usize) -> Option<(vk::RenderPass, u32)>;
    fn render_area(&self, pass: usize) -> Option<vk::Rect2D>;
}

/// Handed to a [`PassExecutor`](crate::PassExecutor) when its pass is recorded.
///
/// All physical resources are looked up through the keys of the inputs the pass declared. For double buffered
/// resources the lookup already selects the copy that belongs to the current frame.
pub struct PassContext<'a> {
    pub(crate) cmd: &'a mut dyn CommandRecorder,
    pub(crate) key: &'a GlobalKey,
    pub(crate) pass: usize,
    pub(crate) frame: u64,
    pub(crate) plan: &'a dyn PlanLookup,
}

impl<'a> PassContext<'a> {
    /// The command buffer being recorded.
    pub fn cmd(&mut self) -> &mut dyn CommandRecorder {
        &mut *self.cmd
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd.handle()
    }

    /// Key of the pass being recorded.
    pub fn key(&self) -> &GlobalKey {
        self.key
    }

    /// Index of the frame being recorded.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn input(&self, input: Key) -> Result<usize> {
        self.plan
            .input_id(self.pass, input)
            .ok_or_else(|| crate::Error::InputNotFound(self.key.clone(), input).into())
    }

    pub fn image(&self, input: Key) -> Result<vk::Image> {
        self.plan.image(self.input(input)?)
    }

    /// Image view over exactly the sub-range of the resource the input refers to.
    pub fn image_view(&self, input: Key) -> Result<vk::ImageView> {
        self.plan.image_view(self.input(input)?)
    }

    /// Layout the image of this input is in while the pass executes.
    pub fn image_layout(&self, input: Key) -> Result<vk::ImageLayout> {
        Ok(self.plan.image_layout(self.input(input)?))
    }

    pub fn buffer(&self, input: Key) -> Result<vk::Buffer> {
        self.plan.buffer(self.input(input)?)
    }

    /// Pointer to the start of a host mapped buffer.
    /// # Errors
    /// * Fails if the buffer was not declared with a [`MapType`](crate::MapType) other than `None`.
    pub fn mapped_ptr(&self, input: Key) -> Result<NonNull<c_void>> {
        self.plan.mapped_ptr(self.input(input)?)
    }

    /// The descriptor set holding every descriptor input of this pass, for the current frame.
    pub fn descriptor_set(&self) -> Option<vk::DescriptorSet> {
        self.plan.descriptor_set(self.pass)
    }

    pub fn descriptor_set_layout(&self) -> Option<vk::DescriptorSetLayout> {
        self.plan.descriptor_set_layout(self.pass)
    }

    /// The render pass and subpass index this pass executes in. `None` for non-graphics passes.
    pub fn render_pass(&self) -> Option<(vk::RenderPass, u32)> {
        self.plan.render_pass(self.pass)
    }

    pub fn render_area(&self) -> Option<vk::Rect2D> {
        self.plan.render_area(self.pass)
    }
}

/// Handed to the initialization callback of a last frame resource. The resource is in
/// `TRANSFER_DST_OPTIMAL` layout and accessible from the transfer stage.
pub struct InitContext<'a> {
    pub(crate) cmd: &'a mut dyn CommandRecorder,
    pub(crate) image: Option<(vk::Image, vk::ImageSubresourceRange)>,
    pub(crate) buffer: Option<(vk::Buffer, vk::DeviceSize)>,
}

impl<'a> InitContext<'a> {
    pub fn cmd(&mut self) -> &mut dyn CommandRecorder {
        &mut *self.cmd
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd.handle()
    }

    /// Image and the sub-range that belongs to the resource. `None` for buffers.
    pub fn image(&self) -> Option<(vk::Image, vk::ImageSubresourceRange)> {
        self.image
    }

    /// Buffer and its size. `None` for images.
    pub fn buffer(&self) -> Option<(vk::Buffer, vk::DeviceSize)> {
        self.buffer
    }
}
