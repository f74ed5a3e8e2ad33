pub use ash::vk;

pub use crate::core::config::{GraphConfig, GraphConfigBuilder};
pub use crate::core::device::AshDevice;
pub use crate::core::error::Error;
pub use crate::core::traits::{Device, DeviceLimits};

pub use crate::allocator::default_allocator::DefaultAllocator;
pub use crate::allocator::memory_type::MemoryType;
pub use crate::allocator::traits::*;

pub use crate::command_buffer::{AshCommandBuffer, CommandRecorder};

pub use crate::compiler::allocation::AllocationClass;
pub use crate::compiler::dependency::GraphViz;

pub use crate::graph::alias::{Alias, AliasSource};
pub use crate::graph::context::{InitContext, PassContext};
pub use crate::graph::event::{CompilePhase, GraphEvent};
pub use crate::graph::input::{DescriptorBinding, Input, MAX_ATTACHMENTS};
pub use crate::graph::key::{GlobalKey, Key};
pub use crate::graph::pass::{
    ClearColor, ClearDepthStencil, EmptyPassExecutor, Pass, PassBuilder, PassExecutor, PassGroupBuilder, PassKind, RenderArea,
};
pub use crate::graph::render_graph::{GraphDesc, RenderGraph};
pub use crate::graph::resource::{
    BufferSize, CombinedImage, ExternalBuffer, ExternalImage, ExternalState, ImageSize, LastFrameBuffer, LastFrameImage,
    ManagedBuffer, ManagedImage, MapType, Resource, ResourceClass, ResourceType, SubImageSize,
};
pub use crate::graph::usage::Usage;
