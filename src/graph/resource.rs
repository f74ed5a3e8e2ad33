//! Resources are the images and buffers tracked by a render graph.
//!
//! There are four classes of resources:
//! - **Managed** resources are created and owned by the graph. Their memory may be shared with other managed resources
//!   that are never alive at the same time.
//! - **Combined** images do not own anything. They are a view over a list of child images, stacked either as array layers
//!   or as a mip chain. The children are allocated together as one image.
//! - **External** resources wrap a handle owned by the caller, for example a swapchain image. The caller describes the state
//!   the resource is in when the frame starts and the state it must be left in when the frame ends.
//! - **Last frame** resources read whatever value another resource held at the end of the previous frame.
//!   The resource they point to is double buffered.
//!
//! # Example
//! ```
//! use vkrg::prelude::*;
//!
//! // A color target that follows the canvas size.
//! let color = ManagedImage::new(vk::Format::R8G8B8A8_UNORM, ImageSize::canvas());
//! // A 6-layer cubemap.
//! let cube = ManagedImage::new(vk::Format::R16G16B16A16_SFLOAT, ImageSize::fixed(512, 512).layers(6));
//! // A readback buffer.
//! let readback = ManagedBuffer::new(BufferSize::Fixed(1024)).map_type(MapType::Random);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use ash::vk;

use crate::graph::alias::Alias;
use crate::graph::context::InitContext;

/// Type of a resource in the render graph.
#[derive(Debug, Default, Copy, Clone, Hash, PartialEq, Eq)]
pub enum ResourceType {
    /// Image resource
    #[default]
    Image,
    /// Buffer resource
    Buffer,
}

/// Ownership class of a resource.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum ResourceClass {
    Managed,
    Combined,
    External,
    LastFrame,
}

/// Size of one sub-range of an image: the extent of its first mip level, a layer range and a mip range.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubImageSize {
    pub extent: vk::Extent2D,
    pub layers: u32,
    pub base_mip: u32,
    pub mips: u32,
}

impl SubImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: vk::Extent2D {
                width,
                height,
            },
            layers: 1,
            base_mip: 0,
            mips: 1,
        }
    }

    /// The size with no layers or mips, which merges with anything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.layers == 0 || self.mips == 0
    }

    /// Merge two sub-images into the smallest image containing both.
    ///
    /// Images with the same extent and mip range are stacked as layers. Images with the same extent and layer count
    /// whose mip ranges follow each other are concatenated into one mip chain. Returns `None` if neither applies.
    pub fn merge(&self, other: &SubImageSize) -> Option<SubImageSize> {
        if self.is_empty() {
            return Some(*other);
        }
        if other.is_empty() {
            return Some(*self);
        }
        if self.extent != other.extent {
            return None;
        }
        if self.mips == other.mips && self.base_mip == other.base_mip {
            return Some(SubImageSize {
                layers: self.layers + other.layers,
                ..*self
            });
        }
        if self.layers == other.layers && self.base_mip + self.mips == other.base_mip {
            return Some(SubImageSize {
                mips: self.mips + other.mips,
                ..*self
            });
        }
        None
    }

    /// Extent of the first mip level in this range.
    pub fn base_extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: (self.extent.width >> self.base_mip).max(1),
            height: (self.extent.height >> self.base_mip).max(1),
        }
    }

    /// Sets the layer count.
    pub fn layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    /// Sets the mip range.
    pub fn mips(mut self, base_mip: u32, mips: u32) -> Self {
        self.base_mip = base_mip;
        self.mips = mips;
        self
    }
}

/// Size of a managed image, either fixed or computed from the canvas size.
#[derive(Derivative)]
#[derivative(Debug)]
pub enum ImageSize {
    Fixed(SubImageSize),
    Canvas(#[derivative(Debug = "ignore")] Box<dyn Fn(vk::Extent2D) -> SubImageSize>),
}

impl ImageSize {
    pub fn fixed(width: u32, height: u32) -> FixedImageSize {
        FixedImageSize(SubImageSize::new(width, height))
    }

    /// An image with the size of the canvas, one layer and one mip.
    pub fn canvas() -> Self {
        ImageSize::Canvas(Box::new(|canvas| SubImageSize::new(canvas.width, canvas.height)))
    }

    /// An image sized by a function of the canvas size.
    pub fn canvas_fn(f: impl Fn(vk::Extent2D) -> SubImageSize + 'static) -> Self {
        ImageSize::Canvas(Box::new(f))
    }

    pub fn evaluate(&self, canvas: vk::Extent2D) -> SubImageSize {
        match self {
            ImageSize::Fixed(size) => *size,
            ImageSize::Canvas(f) => f(canvas),
        }
    }
}

/// Helper to build a fixed [`ImageSize`].
#[derive(Debug, Copy, Clone)]
pub struct FixedImageSize(SubImageSize);

impl FixedImageSize {
    pub fn layers(self, layers: u32) -> Self {
        Self(self.0.layers(layers))
    }

    pub fn mips(self, base_mip: u32, mips: u32) -> Self {
        Self(self.0.mips(base_mip, mips))
    }
}

impl From<FixedImageSize> for ImageSize {
    fn from(value: FixedImageSize) -> Self {
        ImageSize::Fixed(value.0)
    }
}

impl From<SubImageSize> for ImageSize {
    fn from(value: SubImageSize) -> Self {
        ImageSize::Fixed(value)
    }
}

/// Size of a managed buffer in bytes, either fixed or computed from the canvas size.
#[derive(Derivative)]
#[derivative(Debug)]
pub enum BufferSize {
    Fixed(vk::DeviceSize),
    Canvas(#[derivative(Debug = "ignore")] Box<dyn Fn(vk::Extent2D) -> vk::DeviceSize>),
}

impl BufferSize {
    pub fn canvas_fn(f: impl Fn(vk::Extent2D) -> vk::DeviceSize + 'static) -> Self {
        BufferSize::Canvas(Box::new(f))
    }

    pub fn evaluate(&self, canvas: vk::Extent2D) -> vk::DeviceSize {
        match self {
            BufferSize::Fixed(size) => *size,
            BufferSize::Canvas(f) => f(canvas),
        }
    }
}

/// How the host accesses a managed buffer.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MapType {
    /// Not host visible.
    #[default]
    None,
    /// Host visible and cached, suitable for readback.
    Random,
    /// Host visible and write combined, suitable for uploads written front to back.
    SequentialWrite,
}

/// Stage, access and layout of an external resource at a frame boundary.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ExternalState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    /// Ignored for buffers.
    pub layout: vk::ImageLayout,
}

impl ExternalState {
    pub fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self {
            stage,
            access,
            layout,
        }
    }

    /// State of a swapchain image after it was acquired.
    pub fn acquired() -> Self {
        Self::new(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED)
    }

    /// State a swapchain image must be in to be presented.
    pub fn present() -> Self {
        Self::new(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::PRESENT_SRC_KHR)
    }
}

/// Callback recording the initial contents of a last frame resource, before its first frame.
pub type LastFrameInitFn = Box<dyn FnMut(&mut InitContext) -> Result<()>>;

pub(crate) type SharedInitFn = Rc<RefCell<LastFrameInitFn>>;

pub(crate) fn share_init(init: LastFrameInitFn) -> SharedInitFn {
    Rc::new(RefCell::new(init))
}

#[derive(Debug)]
pub struct ManagedImage {
    pub format: vk::Format,
    pub size: ImageSize,
    pub persistent: bool,
}

impl ManagedImage {
    pub fn new(format: vk::Format, size: impl Into<ImageSize>) -> Self {
        Self {
            format,
            size: size.into(),
            persistent: false,
        }
    }

    /// A persistent image keeps its contents between frames and never shares memory.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

#[derive(Debug)]
pub struct ManagedBuffer {
    pub size: BufferSize,
    pub map_type: MapType,
    pub persistent: bool,
}

impl ManagedBuffer {
    pub fn new(size: BufferSize) -> Self {
        Self {
            size,
            map_type: MapType::None,
            persistent: false,
        }
    }

    pub fn map_type(mut self, map_type: MapType) -> Self {
        self.map_type = map_type;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

/// View over a list of sibling images, merged into a single image.
#[derive(Debug, Default)]
pub struct CombinedImage {
    pub children: Vec<Alias>,
}

impl CombinedImage {
    pub fn new(children: impl IntoIterator<Item = Alias>) -> Self {
        Self {
            children: children.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExternalImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub layers: u32,
    pub usage: vk::ImageUsageFlags,
    pub src: ExternalState,
    pub dst: ExternalState,
}

#[derive(Debug, Clone)]
pub struct ExternalBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    pub src: ExternalState,
    pub dst: ExternalState,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct LastFrameImage {
    pub pointed: Alias,
    #[derivative(Debug = "ignore")]
    pub(crate) init: Option<SharedInitFn>,
}

impl LastFrameImage {
    /// Reads the value `pointed` held at the end of the previous frame.
    pub fn new(pointed: Alias) -> Self {
        Self {
            pointed,
            init: None,
        }
    }

    /// Record the contents the image holds before the first frame. The image is in `TRANSFER_DST_OPTIMAL` layout.
    pub fn init(mut self, f: impl FnMut(&mut InitContext) -> Result<()> + 'static) -> Self {
        self.init = Some(share_init(Box::new(f)));
        self
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct LastFrameBuffer {
    pub pointed: Alias,
    #[derivative(Debug = "ignore")]
    pub(crate) init: Option<SharedInitFn>,
}

impl LastFrameBuffer {
    pub fn new(pointed: Alias) -> Self {
        Self {
            pointed,
            init: None,
        }
    }

    pub fn init(mut self, f: impl FnMut(&mut InitContext) -> Result<()> + 'static) -> Self {
        self.init = Some(share_init(Box::new(f)));
        self
    }
}

/// A resource declared in a render graph.
#[derive(Debug)]
pub enum Resource {
    ManagedImage(ManagedImage),
    ManagedBuffer(ManagedBuffer),
    CombinedImage(CombinedImage),
    ExternalImage(ExternalImage),
    ExternalBuffer(ExternalBuffer),
    LastFrameImage(LastFrameImage),
    LastFrameBuffer(LastFrameBuffer),
}

impl Resource {
    pub fn ty(&self) -> ResourceType {
        match self {
            Resource::ManagedImage(_)
            | Resource::CombinedImage(_)
            | Resource::ExternalImage(_)
            | Resource::LastFrameImage(_) => ResourceType::Image,
            Resource::ManagedBuffer(_) | Resource::ExternalBuffer(_) | Resource::LastFrameBuffer(_) => ResourceType::Buffer,
        }
    }

    pub fn class(&self) -> ResourceClass {
        match self {
            Resource::ManagedImage(_) | Resource::ManagedBuffer(_) => ResourceClass::Managed,
            Resource::CombinedImage(_) => ResourceClass::Combined,
            Resource::ExternalImage(_) | Resource::ExternalBuffer(_) => ResourceClass::External,
            Resource::LastFrameImage(_) | Resource::LastFrameBuffer(_) => ResourceClass::LastFrame,
        }
    }

    /// The alias a last frame resource points to.
    pub fn pointed(&self) -> Option<&Alias> {
        match self {
            Resource::LastFrameImage(image) => Some(&image.pointed),
            Resource::LastFrameBuffer(buffer) => Some(&buffer.pointed),
            _ => None,
        }
    }

    pub(crate) fn init_fn(&self) -> Option<&SharedInitFn> {
        match self {
            Resource::LastFrameImage(image) => image.init.as_ref(),
            Resource::LastFrameBuffer(buffer) => buffer.init.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn has_init(&self) -> bool {
        match self {
            Resource::LastFrameImage(image) => image.init.is_some(),
            Resource::LastFrameBuffer(buffer) => buffer.init.is_some(),
            _ => false,
        }
    }

    /// Whether the contents of this resource must survive until the next frame.
    pub fn is_persistent(&self) -> bool {
        match self {
            Resource::ManagedImage(image) => image.persistent,
            Resource::ManagedBuffer(buffer) => buffer.persistent,
            _ => false,
        }
    }

    pub fn map_type(&self) -> MapType {
        match self {
            Resource::ManagedBuffer(buffer) => buffer.map_type,
            _ => MapType::None,
        }
    }

    /// Frame boundary states of an external resource.
    pub fn external_state(&self) -> Option<(ExternalState, ExternalState)> {
        match self {
            Resource::ExternalImage(image) => Some((image.src, image.dst)),
            Resource::ExternalBuffer(buffer) => Some((buffer.src, buffer.dst)),
            _ => None,
        }
    }
}

macro_rules! resource_from {
    ($ty:ident) => {
        impl From<$ty> for Resource {
            fn from(value: $ty) -> Self {
                Resource::$ty(value)
            }
        }
    };
}

resource_from!(ManagedImage);
resource_from!(ManagedBuffer);
resource_from!(CombinedImage);
resource_from!(ExternalImage);
resource_from!(ExternalBuffer);
resource_from!(LastFrameImage);
resource_from!(LastFrameBuffer);
