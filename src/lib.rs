//! Vulkan render graph compiler
//!
//! vkrg takes a declarative description of a frame: passes that read and write images and buffers with specific
//! usages. It compiles this description once per structural change into an executable plan. The plan contains the
//! pass order, the grouping of graphics passes into render passes and subpasses, the memory backing every resource
//! (letting resources that are never alive at the same time share memory) and every barrier and layout transition
//! between passes. The plan is then recorded into a command buffer every frame.
//!
//! To get started
//! ```
//! // Import types under a namespace.
//! use vkrg::prelude as rg;
//!
//! // Or, if you dont care about using the types under a namespace
//! use vkrg::prelude::*;
//! ```
//!
//! # Example
//!
//! The graph does not own a Vulkan device. It creates and destroys everything through the [`Device`] trait, which is
//! implemented for `ash` by [`AshDevice`].
//! ```ignore
//! use vkrg::prelude::*;
//!
//! let device = AshDevice::new(&instance, device, physical_device)?;
//! let mut graph = RenderGraph::new(device, GraphConfigBuilder::new().canvas(1920, 1080).build());
//! ```
//! Declare resources and passes, and the values the frame must produce.
//! ```ignore
//! graph.create_resource("depth", ManagedImage::new(vk::Format::D32_SFLOAT, ImageSize::canvas()))?;
//! graph.create_resource("swapchain", swapchain_image)?;
//! graph.create_pass(
//!     "main",
//!     PassBuilder::graphics()
//!         .clear_depth_attachment_input(Key::new("depth"), Alias::image("depth"), ClearDepthStencil::default())?
//!         .add_color_attachment_input(Key::new("out"), 0, Alias::image("swapchain"), Usage::ColorAttachmentW)?
//!         .execute_fn(|ctx| {
//!             // Record draw calls
//!             Ok(())
//!         })
//!         .build(),
//! )?;
//! graph.add_result(Key::new("present"), Alias::image_output("main", Key::new("out")));
//! ```
//! Compile once, and record every frame. Changing the graph marks the affected compiler phases dirty, and the next
//! compile only reruns those.
//! ```ignore
//! graph.compile()?;
//! loop {
//!     graph.set_external_image("swapchain", acquired_image)?;
//!     graph.compile()?;
//!     graph.cmd_execute(&mut AshCommandBuffer::new(device.clone(), cmd), frame)?;
//! }
//! ```
//! For further information, check out the following modules
//! - [`graph`] for declaring render graphs.
//! - [`compiler`] for the compiler phases and the plan they produce.
//! - [`command_buffer`] for the commands a plan records.
//! - [`allocator`] for the memory allocator interface.
//! - [`core`] for the device interface, configuration and the error type.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod allocator;
pub mod command_buffer;
pub mod compiler;
pub mod core;
pub mod graph;
pub mod util;
