use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use vkrg::prelude::*;

mod framework;

use framework::*;

/// A compute pass writing `image` and a graphics pass sampling it through its descriptor set.
fn blur(graph: &mut RenderGraph<MockDevice>, log: &Rc<RefCell<Vec<&'static str>>>) -> Result<()> {
    graph.create_resource("image", color_image(64, 64))?;
    graph.create_resource("target", color_image(64, 64))?;
    graph.create_pass(
        "generate",
        PassBuilder::compute()
            .add_input(Key::new("out"), Alias::image("image"), Usage::StorageImageW, vk::PipelineStageFlags2::COMPUTE_SHADER)?
            .executor(log_executor(log, "generate"))
            .build(),
    )?;
    graph.create_pass(
        "blur",
        PassBuilder::graphics()
            .add_descriptor_input(
                Key::new("source"),
                0,
                Alias::image_output("generate", "out"),
                Usage::SampledImage,
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                None,
            )?
            .add_color_attachment_input(Key::new("out"), 0, Alias::image("target"), Usage::ColorAttachmentW)?
            .executor(log_executor(log, "blur"))
            .build(),
    )?;
    graph.add_result(Key::new("out"), Alias::image_output("blur", "out"));
    Ok(())
}

#[test]
fn compile_runs_only_dirty_phases() -> Result<()> {
    init_logger();
    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    assert_eq!(graph.dirty(), CompilePhase::all());
    assert_eq!(graph.compile()?, CompilePhase::all());
    assert!(graph.dirty().is_empty());

    assert!(graph.compile()?.is_empty());
    assert!(graph.last_compiled().is_empty());

    // Recompiling unchanged declarations produces the same plan.
    let schedule = graph.schedule().unwrap();
    let (barriers, groups) = (schedule.barriers().to_vec(), schedule.groups().to_vec());
    let placements = |graph: &RenderGraph<MockDevice>| {
        let allocation = graph.allocation().unwrap();
        (0..graph.dependency().unwrap().phys_count())
            .map(|phys| allocation.placement(phys, 0))
            .collect::<Vec<_>>()
    };
    let before = placements(&graph);
    let validations = graph.command().unwrap().validations().to_vec();
    graph.add_result(Key::new("out"), Alias::image_output("blur", "out"));
    assert!(graph.compile()?.contains(CompilePhase::DEPENDENCY | CompilePhase::ALLOCATION | CompilePhase::COMMAND));
    let schedule = graph.schedule().unwrap();
    assert_eq!(schedule.barriers(), barriers.as_slice());
    assert_eq!(schedule.groups(), groups.as_slice());
    assert_eq!(placements(&graph), before);
    assert_eq!(graph.command().unwrap().validations(), validations.as_slice());

    // Replacing the executor does not touch the plan.
    graph.set_executor("blur", EmptyPassExecutor::new())?;
    assert!(graph.dirty().is_empty());
    Ok(())
}

#[test]
fn result_changes_keep_the_collection() -> Result<()> {
    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    graph.compile()?;

    // Only `generate` contributes afterwards.
    assert!(graph.toggle_result(Key::new("image"), Alias::image_output("generate", "out")));
    assert!(!graph.toggle_result(Key::new("out"), Alias::image_output("blur", "out")));
    let compiled = graph.compile()?;
    assert!(compiled.contains(CompilePhase::DEPENDENCY));
    assert!(!compiled.contains(CompilePhase::COLLECTION));
    assert_eq!(graph.last_compiled(), compiled);

    let blur = graph.collection().unwrap().pass_id(&"blur".into()).unwrap();
    assert_eq!(graph.schedule().unwrap().group_of(blur), None);
    assert_eq!(graph.render_pass("blur")?, None);

    let mut cmd = MockCommandRecorder::new();
    graph.cmd_execute(&mut cmd, 0)?;
    assert_eq!(*log.borrow(), ["generate"]);
    Ok(())
}

#[test]
fn failed_compiles_keep_the_previous_plan() -> Result<()> {
    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    graph.compile()?;
    let render_pass = graph.render_pass("blur")?;

    graph.create_resource("other", color_image(8, 8))?;
    graph.create_pass("broken", compute_pass(&[Alias::image("missing")], Alias::image("other"))?)?;
    graph.add_result(Key::new("broken"), Alias::image_output("broken", "out"));
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::ResourceNotFound(key) if key == &GlobalKey::from("missing")));
    assert!(graph.dirty().contains(CompilePhase::COLLECTION));

    // The last good plan is still recorded.
    assert_eq!(graph.render_pass("blur")?, render_pass);
    let mut cmd = MockCommandRecorder::new();
    graph.cmd_execute(&mut cmd, 0)?;
    assert_eq!(*log.borrow(), ["generate", "blur"]);

    graph.remove_pass("broken")?;
    graph.remove_result(Key::new("broken"))?;
    assert_eq!(graph.compile()?, CompilePhase::all());
    Ok(())
}

#[test]
fn removed_passes_are_recorded_until_the_next_compile() -> Result<()> {
    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    graph.compile()?;

    let generate = graph.remove_pass("generate")?;
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::PassNotFound(key) if key == &GlobalKey::from("generate")));

    let mut cmd = MockCommandRecorder::new();
    graph.cmd_execute(&mut cmd, 0)?;
    graph.cmd_execute(&mut cmd, 1)?;
    assert_eq!(*log.borrow(), ["generate", "blur", "generate", "blur"]);

    // Putting the pass back restores the graph.
    graph.create_pass("generate", generate.unwrap())?;
    graph.compile()?;
    log.borrow_mut().clear();
    graph.cmd_execute(&mut cmd, 2)?;
    assert_eq!(*log.borrow(), ["generate", "blur"]);
    Ok(())
}

#[test]
fn reserved_slots_must_be_filled() -> Result<()> {
    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;

    graph.reserve_resource("later")?;
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::NullResource(key) if key == &GlobalKey::from("later")));
    graph.fill_resource("later", color_image(8, 8))?;

    graph.reserve_pass("pending")?;
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::NullPass(key) if key == &GlobalKey::from("pending")));
    graph.fill_pass("pending", compute_pass(&[], Alias::image("later"))?)?;

    graph.create_pass("partial", PassBuilder::compute().reserve_input(Key::new("in")).build())?;
    let err = graph.compile().unwrap_err();
    assert!(
        matches!(vkrg_error(&err), Error::NullInput(pass, input) if pass == &GlobalKey::from("partial") && *input == Key::new("in"))
    );
    graph.fill_input("partial", Key::new("in"), Input::new(Alias::image("later"), Usage::SampledImage))?;
    graph.compile()?;

    let err = graph.fill_resource("unknown", color_image(8, 8)).unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::ResourceNotFound(_)));
    Ok(())
}

#[test]
fn attachments_need_a_graphics_pass() -> Result<()> {
    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    let err = graph
        .set_input(
            "generate",
            Key::new("color"),
            Input::new(Alias::image("target"), Usage::ColorAttachmentW),
        )
        .unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::NoRenderpass));

    let err = PassBuilder::compute()
        .add_color_attachment_input(Key::new("color"), 0, Alias::image("target"), Usage::ColorAttachmentW)
        .err()
        .unwrap();
    assert!(matches!(vkrg_error(&err), Error::NoRenderpass));

    let err = PassBuilder::graphics()
        .add_descriptor_input(
            Key::new("vertices"),
            0,
            Alias::buffer("vertices"),
            Usage::VertexBuffer,
            vk::PipelineStageFlags2::VERTEX_SHADER,
            None,
        )
        .err()
        .unwrap();
    assert!(matches!(vkrg_error(&err), Error::InvalidUsage(Usage::VertexBuffer)));
    Ok(())
}

#[test]
fn attachment_and_binding_indices_are_checked() -> Result<()> {
    let err = PassBuilder::graphics()
        .add_color_attachment_input(Key::new("out"), u32::MAX, Alias::image("target"), Usage::ColorAttachmentW)
        .err()
        .unwrap();
    assert!(matches!(vkrg_error(&err), Error::InvalidAttachment(u32::MAX)));

    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    let err = graph
        .set_input(
            "blur",
            Key::new("extra"),
            Input::new(Alias::image("target"), Usage::ColorAttachmentW).attachment(MAX_ATTACHMENTS),
        )
        .unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::InvalidAttachment(MAX_ATTACHMENTS)));

    // `source` already sits at binding 0.
    let second = Input::new(Alias::image_output("generate", "out"), Usage::SampledImage);
    graph.set_input("blur", Key::new("second"), second.clone().descriptor(0, None))?;
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::DuplicateBinding(key, 0) if key == &GlobalKey::from("blur")));

    graph.set_input("blur", Key::new("second"), second.descriptor(1, None))?;
    graph.compile()?;
    assert!(graph.descriptor_set_layout("blur")?.is_some());
    Ok(())
}

#[test]
fn queries_need_a_compiled_graph() -> Result<()> {
    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;

    let err = graph.image("image", 0).unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::NotCompiled));
    let mut cmd = MockCommandRecorder::new();
    let err = graph.cmd_execute(&mut cmd, 0).unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::NotCompiled));
    assert!(cmd.commands.is_empty());

    graph.compile()?;
    let err = graph.image("nothing", 0).unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::ResourceNotFound(_)));
    let err = graph.render_pass("nothing").unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::PassNotFound(_)));
    Ok(())
}

#[test]
fn descriptor_sets_alternate_between_frames() -> Result<()> {
    let (device, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    graph.compile()?;

    assert!(graph.descriptor_set_layout("blur")?.is_some());
    assert_eq!(graph.descriptor_set_layout("generate")?, None);
    assert_eq!(graph.descriptor_set("generate", 0)?, None);

    let even = graph.descriptor_set("blur", 0)?.unwrap();
    let odd = graph.descriptor_set("blur", 1)?.unwrap();
    assert_ne!(even, odd);
    assert_eq!(graph.descriptor_set("blur", 2)?, Some(even));
    assert_eq!(device.state().descriptor_pools_created, 1);
    assert_eq!(device.state().descriptor_writes, 2);

    // A new allocation rewrites both sets.
    graph.set_image_size("image", ImageSize::fixed(32, 32))?;
    let compiled = graph.compile()?;
    assert!(compiled.contains(CompilePhase::ALLOCATION | CompilePhase::DESCRIPTOR));
    assert_eq!(device.state().descriptor_writes, 4);
    Ok(())
}

#[test]
fn pass_context_exposes_inputs() -> Result<()> {
    let (_, mut graph) = default_graph();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    graph.compile()?;

    let expected = (graph.image_view("image", 0)?, graph.descriptor_set("blur", 0)?, graph.render_pass("blur")?);
    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    graph.set_executor("blur", move |ctx: &mut PassContext| -> Result<()> {
        *sink.borrow_mut() = Some((
            ctx.image_view(Key::new("source"))?,
            ctx.image_layout(Key::new("source"))?,
            ctx.descriptor_set(),
            ctx.render_pass(),
            ctx.render_area(),
        ));
        Ok(())
    })?;

    let mut cmd = MockCommandRecorder::new();
    graph.cmd_execute(&mut cmd, 0)?;
    let (view, layout, set, render_pass, area) = seen.borrow_mut().take().unwrap();
    assert_eq!((view, set, render_pass), expected);
    assert_eq!(layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(area.map(|area| area.extent), Some(vk::Extent2D { width: 64, height: 64 }));
    Ok(())
}

#[test]
fn dropping_the_graph_releases_everything() -> Result<()> {
    let (device, mut graph) = default_graph();
    let allocator = device.mock_allocator();
    let log = Rc::new(RefCell::new(Vec::new()));
    blur(&mut graph, &log)?;
    graph.compile()?;
    assert!(device.live_objects() > 0);
    assert!(allocator.live() > 0);

    // Replaced phases are destroyed right away.
    graph.set_canvas_size(128, 128);
    graph.set_image_size("target", ImageSize::fixed(128, 128))?;
    graph.compile()?;
    assert_eq!(allocator.allocated(), 2);
    assert_eq!(allocator.live(), 1);

    drop(graph);
    assert_eq!(device.live_objects(), 0);
    assert_eq!(allocator.live(), 0);
    Ok(())
}
