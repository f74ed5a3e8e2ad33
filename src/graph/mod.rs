//! The graph module holds everything needed to declare a render graph.
//!
//! A render graph is declared as a set of pools. The root pools hold [`Pass`](pass::Pass)es and
//! [`Resource`](resource::Resource)s, and pass groups hold pools of their own, so everything in the graph is named by a
//! path of keys, a [`GlobalKey`](key::GlobalKey). Passes declare [`Input`](input::Input)s, each binding the pass to one
//! value of a resource through an [`Alias`](alias::Alias) with a [`Usage`](usage::Usage).
//!
//! Values chain passes together. A pass that reads what another pass wrote names the output of the writing input,
//! not the resource itself. The compiler follows these chains backwards from the results of the graph, so passes that
//! do not contribute to any result are never recorded.
//!
//! Through the [`GraphViz`](crate::GraphViz) trait, it's possible to export a graphviz-compatible dot file to display the
//! compiled pass graph.
//!
//! # Example
//!
//! ```ignore
//! use vkrg::prelude::*;
//!
//! let mut graph = RenderGraph::new(device, GraphConfig::default());
//! graph.create_resource("color", ManagedImage::new(vk::Format::R8G8B8A8_UNORM, ImageSize::canvas()))?;
//! graph.create_pass(
//!     "draw",
//!     PassBuilder::graphics()
//!         .clear_color_attachment_input(Key::new("out"), 0, Alias::image("color"), ClearColor::Float([0.0; 4]))?
//!         .build(),
//! )?;
//! graph.add_result(Key::new("color"), Alias::image_output("draw", Key::new("out")));
//! graph.compile()?;
//! println!("{}", graph.dependency().unwrap().dot()?);
//! ```
//!
//! For more complex passes, see the [`pass`] module documentation.
//!
//! # Recording
//!
//! A compiled graph is recorded with [`RenderGraph::cmd_execute()`](crate::RenderGraph::cmd_execute), once per frame.
//! The frame index selects the copy of double buffered resources, which back [`LastFrameImage`](resource::LastFrameImage)
//! and [`LastFrameBuffer`](resource::LastFrameBuffer) resources.

pub mod alias;
pub mod context;
pub mod event;
pub mod input;
pub mod key;
pub mod pass;
pub mod pool;
pub mod render_graph;
pub mod resource;
pub mod usage;
