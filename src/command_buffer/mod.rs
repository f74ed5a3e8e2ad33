//! The commands a compiled graph records into a caller-owned command buffer.
//!
//! The graph itself only ever records barriers, render pass boundaries and debug labels. Everything else is
//! recorded by pass executors, through the command buffer handle or through the recorder directly.
//!
//! # Recorders
//! Recording goes through the [`CommandRecorder`] trait, so that graphs can be recorded into anything that can
//! accept these commands. [`AshCommandBuffer`] records into a `VkCommandBuffer` through `ash`.

use std::ffi::CString;

use ash::vk;

/// Sink for the commands recorded by a compiled graph.
pub trait CommandRecorder {
    /// The `VkCommandBuffer` being recorded into.
    fn handle(&self) -> vk::CommandBuffer;

    fn pipeline_barrier_2(&mut self, dependency: &vk::DependencyInfo);
    fn begin_render_pass(&mut self, info: &vk::RenderPassBeginInfo, contents: vk::SubpassContents);
    fn next_subpass(&mut self, contents: vk::SubpassContents);
    fn end_render_pass(&mut self);

    /// Open a debug label. Does nothing unless the recorder supports debug utils.
    fn begin_label(&mut self, _name: &str, _color: [f32; 4]) {}

    fn end_label(&mut self) {}
}

/// Records into a `VkCommandBuffer` in the recording state.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct AshCommandBuffer {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    #[derivative(Debug = "ignore")]
    debug_utils: Option<ash::extensions::ext::DebugUtils>,
    handle: vk::CommandBuffer,
}

impl AshCommandBuffer {
    /// Wrap a command buffer that is in the recording state.
    pub fn new(device: ash::Device, handle: vk::CommandBuffer) -> Self {
        Self {
            device,
            debug_utils: None,
            handle,
        }
    }

    /// Emit debug labels through `VK_EXT_debug_utils`.
    pub fn with_debug_utils(mut self, debug_utils: ash::extensions::ext::DebugUtils) -> Self {
        self.debug_utils = Some(debug_utils);
        self
    }
}

impl CommandRecorder for AshCommandBuffer {
    fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    fn pipeline_barrier_2(&mut self, dependency: &vk::DependencyInfo) {
        unsafe { self.device.cmd_pipeline_barrier2(self.handle, dependency) }
    }

    fn begin_render_pass(&mut self, info: &vk::RenderPassBeginInfo, contents: vk::SubpassContents) {
        unsafe { self.device.cmd_begin_render_pass(self.handle, info, contents) }
    }

    fn next_subpass(&mut self, contents: vk::SubpassContents) {
        unsafe { self.device.cmd_next_subpass(self.handle, contents) }
    }

    fn end_render_pass(&mut self) {
        unsafe { self.device.cmd_end_render_pass(self.handle) }
    }

    fn begin_label(&mut self, name: &str, color: [f32; 4]) {
        let Some(debug) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let label = vk::DebugUtilsLabelEXT {
            s_type: vk::StructureType::DEBUG_UTILS_LABEL_EXT,
            p_next: std::ptr::null(),
            p_label_name: name.as_ptr(),
            color,
        };
        unsafe { debug.cmd_begin_debug_utils_label(self.handle, &label) }
    }

    fn end_label(&mut self) {
        if let Some(debug) = &self.debug_utils {
            unsafe { debug.cmd_end_debug_utils_label(self.handle) }
        }
    }
}
