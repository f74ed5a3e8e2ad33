use anyhow::Result;
use ash::vk::Handle;

use vkrg::prelude::*;

mod framework;

use framework::*;

/// `first` writes `a`, `second` reads `a` and writes `b`, `third` reads `b` and writes `c`.
fn chain(graph: &mut RenderGraph<MockDevice>) -> Result<()> {
    for key in ["a", "b", "c"] {
        graph.create_resource(key, color_image(64, 64))?;
    }
    graph.create_pass("first", compute_pass(&[], Alias::image("a"))?)?;
    graph.create_pass("second", compute_pass(&[Alias::image_output("first", "out")], Alias::image("b"))?)?;
    graph.create_pass("third", compute_pass(&[Alias::image_output("second", "out")], Alias::image("c"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("third", "out"));
    Ok(())
}

fn phys(graph: &RenderGraph<MockDevice>, key: &'static str) -> usize {
    let resource = graph.collection().unwrap().resource_id(&key.into()).unwrap();
    graph.dependency().unwrap().phys_id_of(resource).unwrap()
}

#[test]
fn disjoint_resources_share_memory() -> Result<()> {
    init_logger();
    let (device, mut graph) = default_graph();
    chain(&mut graph)?;
    graph.compile()?;

    let (a, b, c) = (phys(&graph, "a"), phys(&graph, "b"), phys(&graph, "c"));
    let allocation = graph.allocation().unwrap();
    assert_eq!(allocation.class(a), AllocationClass::Reusable);
    assert!(allocation.is_aliased(a, c));
    assert!(!allocation.is_aliased(a, b));
    assert!(!allocation.is_aliased(b, c));
    assert_eq!(allocation.placement(a, 0), allocation.placement(c, 0));
    assert_eq!(allocation.memory_count(), 1);

    // Overlapping memory is only handed to resources that are never alive at the same time.
    let dependency = graph.dependency().unwrap();
    for x in 0..dependency.phys_count() {
        for y in 0..dependency.phys_count() {
            if allocation.is_aliased(x, y) {
                assert!(dependency.may_alias(x, y), "{x} and {y} overlap");
            }
        }
    }

    let state = device.state();
    let image_a = graph.image("a", 0)?;
    let image_c = graph.image("c", 0)?;
    assert_ne!(image_a, image_c);
    assert_eq!(state.bindings[&image_a.as_raw()], state.bindings[&image_c.as_raw()]);
    Ok(())
}

#[test]
fn results_keep_their_memory_until_the_end_of_the_frame() -> Result<()> {
    let (_, mut graph) = default_graph();
    chain(&mut graph)?;
    graph.add_result(Key::new("first"), Alias::image_output("first", "out"));
    graph.compile()?;

    let (a, c) = (phys(&graph, "a"), phys(&graph, "c"));
    let allocation = graph.allocation().unwrap();
    assert_eq!(allocation.class(a), AllocationClass::Reusable);
    assert!(!allocation.is_aliased(a, c));
    assert_ne!(allocation.placement(a, 0), allocation.placement(c, 0));
    assert!(graph.command().unwrap().validations().is_empty());

    // Only the final resource of a chain can take over the memory of earlier ones.
    graph.remove_result(Key::new("first"))?;
    graph.compile()?;
    let (a, c) = (phys(&graph, "a"), phys(&graph, "c"));
    assert!(graph.allocation().unwrap().is_aliased(a, c));
    Ok(())
}

#[test]
fn aliased_resources_are_synchronized() -> Result<()> {
    let (_, mut graph) = default_graph();
    chain(&mut graph)?;
    graph.compile()?;

    let c = graph.collection().unwrap().resource_id(&"c".into()).unwrap();
    let third = graph.collection().unwrap().pass_id(&"third".into()).unwrap();
    let command = graph.command().unwrap();
    assert_eq!(command.validations().len(), 1);
    assert_eq!(command.validations()[0].resource, c);

    let group = graph.schedule().unwrap().group_of(third).unwrap();
    let (src, dst) = command.groups()[group].barriers.memory.unwrap();
    assert!(src.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    assert!(dst.access.contains(vk::AccessFlags2::SHADER_STORAGE_WRITE));

    // The transition of `c` waits for the last reads of `a` even in the first frame.
    let mut cmd = MockCommandRecorder::new();
    graph.cmd_execute(&mut cmd, 0)?;
    let barriers = cmd.image_barriers(graph.image("c", 0)?);
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(barriers[0].new_layout, vk::ImageLayout::GENERAL);
    assert!(barriers[0].src_stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    Ok(())
}

#[test]
fn aliasing_can_be_disabled() -> Result<()> {
    let (_, mut graph) = make_graph(GraphConfigBuilder::new().canvas(64, 64).aliasing(false).build());
    chain(&mut graph)?;
    graph.compile()?;

    let (a, c) = (phys(&graph, "a"), phys(&graph, "c"));
    assert!(!graph.allocation().unwrap().is_aliased(a, c));
    assert!(graph.command().unwrap().validations().is_empty());
    Ok(())
}

#[test]
fn persistent_resources_are_not_shared() -> Result<()> {
    let (_, mut graph) = default_graph();
    chain(&mut graph)?;
    graph.set_persistence("c", true)?;
    graph.compile()?;

    let (a, c) = (phys(&graph, "a"), phys(&graph, "c"));
    let allocation = graph.allocation().unwrap();
    assert_eq!(allocation.class(c), AllocationClass::Persistent);
    assert!(!allocation.is_aliased(a, c));
    assert_eq!(allocation.memory_count(), 2);

    // Only the memory layout changes.
    graph.set_persistence("c", false)?;
    let compiled = graph.compile()?;
    assert_eq!(compiled, CompilePhase::ALLOCATION | CompilePhase::DESCRIPTOR | CompilePhase::COMMAND);
    let (a, c) = (phys(&graph, "a"), phys(&graph, "c"));
    assert!(graph.allocation().unwrap().is_aliased(a, c));
    Ok(())
}

#[test]
fn mapped_buffers_expose_host_memory() -> Result<()> {
    let (device, mut graph) = default_graph();
    graph.create_resource("image", color_image(16, 16))?;
    graph.create_resource(
        "readback",
        ManagedBuffer::new(BufferSize::Fixed(1024)).map_type(MapType::Random),
    )?;
    graph.create_resource("upload", ManagedBuffer::new(BufferSize::Fixed(64)).map_type(MapType::SequentialWrite))?;
    graph.create_pass(
        "copy",
        PassBuilder::transfer()
            .add_input(
                Key::new("src"),
                Alias::buffer("upload"),
                Usage::TransferBufferSrc,
                vk::PipelineStageFlags2::TRANSFER,
            )?
            .add_input(Key::new("image"), Alias::image("image"), Usage::TransferImageSrc, vk::PipelineStageFlags2::TRANSFER)?
            .add_input(
                Key::new("dst"),
                Alias::buffer("readback"),
                Usage::TransferBufferDst,
                vk::PipelineStageFlags2::TRANSFER,
            )?
            .build(),
    )?;
    graph.add_result(Key::new("readback"), Alias::buffer_output("copy", "dst"));
    graph.compile()?;

    let (readback, upload) = (phys(&graph, "readback"), phys(&graph, "upload"));
    let allocation = graph.allocation().unwrap();
    assert_eq!(allocation.class(readback), AllocationClass::MappedRandom);
    assert_eq!(allocation.class(upload), AllocationClass::MappedSequential);
    let memory = allocation.placement(readback, 0).unwrap().memory;
    assert_eq!(allocation.memory_type(memory), Some(MemoryType::GpuToCpu));

    let ptr = graph.mapped_ptr("readback", 0)?;
    // SAFETY: The mock backs host visible memory with a host allocation of at least the buffer size.
    unsafe {
        ptr.as_ptr().cast::<u8>().write_bytes(0xAB, 1024);
    }
    assert_eq!(graph.mapped_ptr("readback", 1)?, ptr);
    assert!(graph.mapped_ptr("upload", 0).is_ok());

    let err = graph.mapped_ptr("image", 0).unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::UnmappableResource(key) if key == &GlobalKey::from("image")));

    let buffer = graph.buffer("readback", 0)?;
    assert!(device.state().live.contains(&buffer.as_raw()));
    Ok(())
}

#[test]
fn attachment_only_images_use_lazy_memory() -> Result<()> {
    let device = MockDevice::with_limits(DeviceLimits {
        buffer_image_granularity: 1,
        lazily_allocated: true,
    });
    let mut graph = RenderGraph::new(device.clone(), GraphConfigBuilder::new().canvas(64, 64).build());
    graph.create_resource("depth", ManagedImage::new(vk::Format::D32_SFLOAT, ImageSize::canvas()))?;
    graph.create_resource("color", ManagedImage::new(COLOR_FORMAT, ImageSize::canvas()))?;
    graph.create_pass(
        "draw",
        PassBuilder::graphics()
            .clear_depth_attachment_input(
                Key::new("depth"),
                Alias::image("depth"),
                ClearDepthStencil {
                    depth: 1.0,
                    stencil: 0,
                },
            )?
            .add_color_attachment_input(Key::new("out"), 0, Alias::image("color"), Usage::ColorAttachmentW)?
            .build(),
    )?;
    graph.create_resource("final", color_image(64, 64))?;
    graph.create_pass("post", compute_pass(&[Alias::image_output("draw", "out")], Alias::image("final"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("post", "out"));
    graph.compile()?;

    let (depth, color) = (phys(&graph, "depth"), phys(&graph, "color"));
    let allocation = graph.allocation().unwrap();
    assert_eq!(allocation.class(depth), AllocationClass::Transient);
    let memory = allocation.placement(depth, 0).unwrap().memory;
    assert_eq!(allocation.memory_type(memory), Some(MemoryType::GpuLazy));
    // Sampled after the render pass, so it needs real memory.
    assert_eq!(allocation.class(color), AllocationClass::Reusable);
    Ok(())
}

#[test]
fn last_frame_resources_are_double_buffered() -> Result<()> {
    let (device, mut graph) = default_graph();
    graph.create_resource("history", color_image(16, 16))?;
    graph.create_resource("prev", LastFrameImage::new(Alias::image_output("accumulate", "out")))?;
    graph.create_pass(
        "accumulate",
        compute_pass(&[Alias::image("prev")], Alias::image("history"))?,
    )?;
    graph.add_result(Key::new("out"), Alias::image_output("accumulate", "out"));
    graph.compile()?;

    let history = phys(&graph, "history");
    let allocation = graph.allocation().unwrap();
    assert_eq!(allocation.class(history), AllocationClass::LastFrame);
    assert_eq!(allocation.copies(history), 2);
    assert_ne!(allocation.placement(history, 0), allocation.placement(history, 1));
    assert_eq!(device.state().images_created, 2);

    for frame in 0..4 {
        let current = graph.image("history", frame)?;
        assert_eq!(graph.image("prev", frame + 1)?, current);
        assert_ne!(graph.image("prev", frame)?, current);
        assert_eq!(graph.image_view("prev", frame + 1)?, graph.image_view("history", frame)?);
    }
    Ok(())
}

#[test]
fn external_resources_are_not_allocated() -> Result<()> {
    let (device, mut graph) = default_graph();
    graph.create_resource("swapchain", swapchain(64, 64))?;
    graph.create_pass("draw", compute_pass(&[], Alias::image("swapchain"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("draw", "out"));
    graph.compile()?;

    let swapchain = phys(&graph, "swapchain");
    let allocation = graph.allocation().unwrap();
    assert_eq!(allocation.class(swapchain), AllocationClass::External);
    assert_eq!(allocation.copies(swapchain), 0);
    assert_eq!(allocation.memory_count(), 0);
    assert_eq!(device.state().images_created, 0);
    assert_eq!(graph.image("swapchain", 3)?, vk::Image::from_raw(SWAPCHAIN_IMAGE));
    assert_eq!(graph.image_view("swapchain", 3)?, vk::ImageView::from_raw(SWAPCHAIN_VIEW));
    Ok(())
}
