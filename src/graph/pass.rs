//! This module mainly exposes the [`PassBuilder`] struct, used for correctly defining passes in a
//! [`RenderGraph`](crate::RenderGraph).
//!
//! There are a few different kinds of passes. Graphics passes may declare attachments and are recorded inside a render pass,
//! possibly sharing it with neighbouring graphics passes as subpasses. Compute and transfer passes are recorded outside of
//! render passes. Pass groups do not execute anything, they own their own pass and resource pools and are used to
//! build composite passes.
//!
//! Each pass declares its inputs, and can optionally specify a closure to be executed when the pass is recorded to a
//! command buffer. Inputs are keyed, so the executor can look up the physical resource behind each of them.
//!
//! # Example
//!
//! In this example we define two passes: one that renders to an offscreen image, and one that samples this image
//! while rendering to the swapchain.
//! ```ignore
//! use vkrg::prelude::*;
//!
//! let offscreen_pass = PassBuilder::graphics()
//!     // Add a single color attachment that will be cleared to red.
//!     .clear_color_attachment_input(Key::new("out"), 0, Alias::image("offscreen"), ClearColor::Float([1.0, 0.0, 0.0, 1.0]))?
//!     .build();
//!
//! let sample_pass = PassBuilder::graphics()
//!     .add_color_attachment_input(Key::new("out"), 0, Alias::image("swapchain"), Usage::ColorAttachmentW)?
//!     // Sample the image the offscreen pass wrote through its `out` input.
//!     .add_descriptor_input(
//!         Key::new("scene"),
//!         0,
//!         Alias::image_output("offscreen", Key::new("out")),
//!         Usage::SampledImage,
//!         vk::PipelineStageFlags2::FRAGMENT_SHADER,
//!         Some(sampler),
//!     )?
//!     .execute_fn(|ctx| {
//!         let set = ctx.descriptor_set();
//!         // Bind a pipeline and the descriptor set, then draw a fullscreen triangle.
//!         Ok(())
//!     })
//!     .build();
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use ash::vk;

use crate::graph::alias::Alias;
use crate::graph::context::PassContext;
use crate::graph::input::Input;
use crate::graph::key::Key;
use crate::graph::pool::Pool;
use crate::graph::resource::Resource;
use crate::graph::usage::Usage;
use crate::util::to_vk::IntoVulkanType;
use crate::Error;

/// Defines a pass executor that can be called when the pass is recorded.
pub trait PassExecutor {
    /// Record this pass to a command buffer.
    fn execute(&mut self, ctx: &mut PassContext) -> Result<()>;
}

impl<F> PassExecutor for F
where
    F: FnMut(&mut PassContext) -> Result<()>,
{
    /// Record this pass to a command buffer by calling the given function.
    fn execute(&mut self, ctx: &mut PassContext) -> Result<()> {
        self(ctx)
    }
}

/// Executors are shared with the compiled plan, which keeps calling them until the next successful compile.
pub(crate) type SharedPassFn = Rc<RefCell<dyn PassExecutor>>;

pub(crate) fn share_executor(exec: impl PassExecutor + 'static) -> SharedPassFn {
    Rc::new(RefCell::new(exec))
}

/// An empty pass executor that does nothing
pub struct EmptyPassExecutor;

impl EmptyPassExecutor {
    /// Creates an empty pass executor
    pub fn new() -> Self {
        Self {}
    }

    /// Create a new empty pass executor in a [`Box`]
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self::new())
    }
}

impl Default for EmptyPassExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PassExecutor for EmptyPassExecutor {
    fn execute(&mut self, _ctx: &mut PassContext) -> Result<()> {
        Ok(())
    }
}

/// Render area of a graphics pass.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RenderArea {
    pub extent: vk::Extent2D,
    pub layers: u32,
}

impl RenderArea {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: vk::Extent2D {
                width,
                height,
            },
            layers: 1,
        }
    }
}

impl IntoVulkanType for RenderArea {
    type Output = vk::Rect2D;

    fn into_vulkan(self) -> Self::Output {
        vk::Rect2D {
            offset: vk::Offset2D {
                x: 0,
                y: 0,
            },
            extent: self.extent,
        }
    }
}

/// A non-executing container of passes, with its own pass and resource pools.
#[derive(Debug, Default)]
pub struct PassGroup {
    pub(crate) passes: Pool<Pass>,
    pub(crate) resources: Pool<Resource>,
}

impl PassGroup {
    pub fn passes(&self) -> &Pool<Pass> {
        &self.passes
    }

    pub fn resources(&self) -> &Pool<Resource> {
        &self.resources
    }
}

#[derive(Debug)]
pub enum PassKind {
    /// Render area override. If `None`, the render area is derived from the attachments.
    Graphics(Option<RenderArea>),
    Compute,
    Transfer,
    Group(PassGroup),
}

/// Represents one pass in a render graph. You can obtain one using a [`PassBuilder`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Pass {
    pub(crate) kind: PassKind,
    pub(crate) inputs: Pool<Input>,
    pub(crate) color: Option<[f32; 4]>,
    #[derivative(Debug = "ignore")]
    pub(crate) execute: SharedPassFn,
}

impl Pass {
    pub fn kind(&self) -> &PassKind {
        &self.kind
    }

    pub fn inputs(&self) -> &Pool<Input> {
        &self.inputs
    }

    pub fn is_graphics(&self) -> bool {
        matches!(self.kind, PassKind::Graphics(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, PassKind::Group(_))
    }

    pub(crate) fn group(&self) -> Option<&PassGroup> {
        match &self.kind {
            PassKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub(crate) fn group_mut(&mut self) -> Option<&mut PassGroup> {
        match &mut self.kind {
            PassKind::Group(group) => Some(group),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub enum ClearColor {
    Float([f32; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
}

#[derive(Copy, Clone, Default, Debug)]
pub struct ClearDepthStencil {
    pub depth: f32,
    pub stencil: u32,
}

impl IntoVulkanType for ClearColor {
    type Output = vk::ClearValue;

    fn into_vulkan(self) -> Self::Output {
        let color = match self {
            ClearColor::Float(values) => vk::ClearColorValue {
                float32: values,
            },
            ClearColor::Int(values) => vk::ClearColorValue {
                int32: values,
            },
            ClearColor::Uint(values) => vk::ClearColorValue {
                uint32: values,
            },
        };
        vk::ClearValue {
            color,
        }
    }
}

impl IntoVulkanType for ClearDepthStencil {
    type Output = vk::ClearValue;

    fn into_vulkan(self) -> Self::Output {
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: self.depth,
                stencil: self.stencil,
            },
        }
    }
}

/// Used to create [`Pass`] objects correctly.
/// # Example
/// See the [`pass`](crate::graph::pass) module level documentation.
pub struct PassBuilder {
    inner: Pass,
}

impl PassBuilder {
    fn with_kind(kind: PassKind) -> Self {
        PassBuilder {
            inner: Pass {
                kind,
                inputs: Pool::new(),
                color: None,
                execute: share_executor(EmptyPassExecutor::new()),
            },
        }
    }

    /// Create a new graphics pass. This constructor is required for passes that render to any attachments.
    pub fn graphics() -> Self {
        Self::with_kind(PassKind::Graphics(None))
    }

    /// Create a new pass for compute work. Does not support commands that are located inside a render pass.
    pub fn compute() -> Self {
        Self::with_kind(PassKind::Compute)
    }

    /// Create a new pass for copies, blits and clears.
    pub fn transfer() -> Self {
        Self::with_kind(PassKind::Transfer)
    }

    /// Create a new pass group. Passes and resources in the group are addressed through the key of the group.
    pub fn group() -> PassGroupBuilder {
        PassGroupBuilder {
            inner: PassGroup::default(),
        }
    }

    /// Set the color of this pass. This can show up in graphics debuggers like RenderDoc.
    #[cfg(feature = "debug-markers")]
    pub fn color(mut self, color: [f32; 4]) -> Self {
        self.inner.color = Some(color);
        self
    }

    /// Override the render area of a graphics pass. Has no effect on other passes.
    pub fn render_area(mut self, area: RenderArea) -> Self {
        if let PassKind::Graphics(render_area) = &mut self.inner.kind {
            *render_area = Some(area);
        }
        self
    }

    /// Add a fully specified input.
    /// # Errors
    /// * Fails if the input uses an attachment usage and this pass was not created using [`PassBuilder::graphics()`]
    /// * Fails if the attachment location is not below [`MAX_ATTACHMENTS`](crate::graph::input::MAX_ATTACHMENTS)
    pub fn input(mut self, key: Key, input: Input) -> Result<Self> {
        input.validate(self.inner.is_graphics())?;
        self.inner.inputs.insert(key, input);
        Ok(self)
    }

    /// Declare that the resource behind `alias` is accessed with `usage` in the given pipeline stages.
    /// Use this for resources that are bound by the executor itself, like vertex buffers.
    pub fn add_input(self, key: Key, alias: Alias, usage: Usage, stages: vk::PipelineStageFlags2) -> Result<Self> {
        self.input(key, Input::new(alias, usage).stages(stages))
    }

    /// Declare an input that is bound through the descriptor set of this pass, at `binding`.
    /// `sampler` is used as immutable sampler for sampled images.
    pub fn add_descriptor_input(
        self,
        key: Key,
        binding: u32,
        alias: Alias,
        usage: Usage,
        stages: vk::PipelineStageFlags2,
        sampler: Option<vk::Sampler>,
    ) -> Result<Self> {
        if usage.descriptor_type().is_none() {
            return Err(Error::InvalidUsage(usage).into());
        }
        self.input(key, Input::new(alias, usage).stages(stages).descriptor(binding, sampler))
    }

    /// Adds a color attachment at the given location.
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::graphics()`]
    /// * Fails if `usage` is not a color attachment usage.
    pub fn add_color_attachment_input(self, key: Key, location: u32, alias: Alias, usage: Usage) -> Result<Self> {
        if !usage.is_color_attachment() {
            return Err(Error::InvalidUsage(usage).into());
        }
        self.input(key, Input::new(alias, usage).attachment(location))
    }

    /// Clear a color attachment with the specified clear color
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::graphics()`]
    pub fn clear_color_attachment_input(self, key: Key, location: u32, alias: Alias, color: ClearColor) -> Result<Self> {
        self.input(
            key,
            Input::new(alias, Usage::ColorAttachmentW)
                .attachment(location)
                .clear(color.into_vulkan()),
        )
    }

    /// Adds an input attachment, readable in the fragment shader through `binding` of the pass descriptor set.
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::graphics()`]
    pub fn add_input_attachment_input(self, key: Key, index: u32, binding: u32, alias: Alias) -> Result<Self> {
        self.input(
            key,
            Input::new(alias, Usage::InputAttachment)
                .attachment(index)
                .descriptor(binding, None),
        )
    }

    /// Sets the depth attachment of this pass.
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::graphics()`]
    /// * Fails if `usage` is not a depth attachment usage.
    pub fn set_depth_attachment_input(self, key: Key, alias: Alias, usage: Usage) -> Result<Self> {
        if !usage.is_depth_attachment() {
            return Err(Error::InvalidUsage(usage).into());
        }
        self.input(key, Input::new(alias, usage))
    }

    /// Clear the depth attachment with the specified clear values
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::graphics()`]
    pub fn clear_depth_attachment_input(self, key: Key, alias: Alias, clear: ClearDepthStencil) -> Result<Self> {
        self.input(key, Input::new(alias, Usage::DepthAttachmentRW).clear(clear.into_vulkan()))
    }

    /// Reserve an input slot that will be filled later through [`RenderGraph::fill_input()`](crate::RenderGraph::fill_input).
    pub fn reserve_input(mut self, key: Key) -> Self {
        self.inner.inputs.reserve(key);
        self
    }

    /// Set the executor to be called when recording this pass.
    pub fn executor(mut self, exec: impl PassExecutor + 'static) -> Self {
        self.inner.execute = share_executor(exec);
        self
    }

    /// Set the executor to be called when recording this pass. This method can be used to deduce types
    /// when a closure is used as a pass executor.
    pub fn execute_fn<F>(mut self, exec: F) -> Self
    where
        F: FnMut(&mut PassContext) -> Result<()> + 'static, {
        self.inner.execute = share_executor(exec);
        self
    }

    /// Obtain a built [`Pass`] object.
    pub fn build(self) -> Pass {
        self.inner
    }
}

/// Used to create pass groups.
/// # Example
/// ```ignore
/// use vkrg::prelude::*;
///
/// // A two tap blur. The intermediate image lives inside the group, and is addressed as `blur/temp`.
/// let blur = PassBuilder::group()
///     .resource(Key::new("temp"), ManagedImage::new(vk::Format::R8G8B8A8_UNORM, ImageSize::canvas()))
///     .pass(Key::with_id("tap", 0), horizontal)
///     .pass(Key::with_id("tap", 1), vertical)
///     .build();
/// ```
pub struct PassGroupBuilder {
    inner: PassGroup,
}

impl PassGroupBuilder {
    pub fn pass(mut self, key: Key, pass: Pass) -> Self {
        self.inner.passes.insert(key, pass);
        self
    }

    pub fn resource(mut self, key: Key, resource: impl Into<Resource>) -> Self {
        self.inner.resources.insert(key, resource.into());
        self
    }

    pub fn reserve_pass(mut self, key: Key) -> Self {
        self.inner.passes.reserve(key);
        self
    }

    pub fn reserve_resource(mut self, key: Key) -> Self {
        self.inner.resources.reserve(key);
        self
    }

    pub fn build(self) -> Pass {
        Pass {
            kind: PassKind::Group(self.inner),
            inputs: Pool::new(),
            color: None,
            execute: share_executor(EmptyPassExecutor::new()),
        }
    }
}
