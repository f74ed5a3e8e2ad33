use std::fs::File;
use std::io::Write;

use anyhow::Result;
use layout::backends::svg::SVGWriter;
use layout::gv;
use layout::gv::GraphBuilder;

use vkrg::prelude::*;

mod framework;

use framework::*;

/// Render the pass graph to an svg, to check that the dot output is well formed.
fn display_dot(graph: &RenderGraph<MockDevice>, name: &str) -> Result<()> {
    let dot = graph.dependency().ok_or(Error::NotCompiled)?.dot()?;
    let mut parser = gv::DotParser::new(&dot);
    let g = match parser.process() {
        Ok(g) => g,
        Err(e) => {
            parser.print_error();
            panic!("dot render error: {e}");
        }
    };
    let mut svg = SVGWriter::new();
    let mut builder = GraphBuilder::new();
    builder.visit_graph(&g);
    let mut vg = builder.get();
    vg.do_it(false, false, false, &mut svg);
    let svg = svg.finalize();
    let path = std::env::temp_dir().join(format!("vkrg-{name}.svg"));
    File::create(path)?.write_all(svg.as_bytes())?;
    Ok(())
}

#[test]
fn declaration_order_breaks_ties() -> Result<()> {
    let (_, mut graph) = default_graph();
    for key in ["c", "a", "b"] {
        graph.create_resource(key, color_image(16, 16))?;
        graph.create_pass(key, compute_pass(&[], Alias::image(key))?)?;
    }
    // Results are added in a different order than the passes were declared.
    graph.add_result(Key::new("a"), Alias::image_output("a", "out"));
    graph.add_result(Key::new("b"), Alias::image_output("b", "out"));
    graph.add_result(Key::new("c"), Alias::image_output("c", "out"));
    graph.compile()?;

    let collection = graph.collection().unwrap();
    let order: Vec<String> = graph
        .dependency()
        .unwrap()
        .topo_order()
        .iter()
        .map(|pass| collection.pass_key(*pass).to_string())
        .collect();
    assert_eq!(order, ["c", "a", "b"]);
    Ok(())
}

#[test]
fn producers_run_before_consumers() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("first", color_image(16, 16))?;
    graph.create_resource("second", color_image(16, 16))?;
    // The consumer is declared before the pass it depends on.
    graph.create_pass("consumer", compute_pass(&[Alias::image_output("producer", "out")], Alias::image("second"))?)?;
    graph.create_pass("producer", compute_pass(&[], Alias::image("first"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("consumer", "out"));
    graph.compile()?;

    let collection = graph.collection().unwrap();
    let dependency = graph.dependency().unwrap();
    let producer = collection.pass_id(&"producer".into()).unwrap();
    let consumer = collection.pass_id(&"consumer".into()).unwrap();
    assert_eq!(dependency.topo_order(), &[producer, consumer]);
    assert!(dependency.pass_precedes(producer, consumer));
    assert!(!dependency.pass_precedes(consumer, producer));
    display_dot(&graph, "producers_run_before_consumers")?;
    Ok(())
}

#[test]
fn passes_not_contributing_to_results_are_culled() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("used", color_image(16, 16))?;
    graph.create_resource("unused", color_image(16, 16))?;
    graph.create_pass("used", compute_pass(&[], Alias::image("used"))?)?;
    graph.create_pass("unused", compute_pass(&[], Alias::image("unused"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("used", "out"));
    graph.compile()?;

    let collection = graph.collection().unwrap();
    let dependency = graph.dependency().unwrap();
    let unused = collection.pass_id(&"unused".into()).unwrap();
    let unused_image = collection.resource_id(&"unused".into()).unwrap();
    assert!(!dependency.is_visited(unused));
    assert_eq!(dependency.topo_order().len(), 1);
    assert!(!dependency.is_touched(unused_image));
    assert_eq!(dependency.phys_id_of(unused_image), None);
    Ok(())
}

#[test]
fn readers_run_before_the_next_writer() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("image", color_image(16, 16))?;
    graph.create_resource("copy", color_image(16, 16))?;
    graph.create_pass("write", compute_pass(&[], Alias::image("image"))?)?;
    graph.create_pass("read", compute_pass(&[Alias::image_output("write", "out")], Alias::image("copy"))?)?;
    // Overwrites the value `read` consumes, so it has to wait for it.
    graph.create_pass("overwrite", compute_pass(&[], Alias::image_output("write", "out"))?)?;
    graph.add_result(Key::new("copy"), Alias::image_output("read", "out"));
    graph.add_result(Key::new("image"), Alias::image_output("overwrite", "out"));
    graph.compile()?;

    let collection = graph.collection().unwrap();
    let dependency = graph.dependency().unwrap();
    let read = collection.pass_id(&"read".into()).unwrap();
    let overwrite = collection.pass_id(&"overwrite".into()).unwrap();
    assert!(dependency.pass_precedes(read, overwrite));
    Ok(())
}

#[test]
fn cycles_are_rejected() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("x", color_image(16, 16))?;
    graph.create_resource("y", color_image(16, 16))?;
    graph.create_pass("a", compute_pass(&[Alias::image_output("b", "out")], Alias::image("x"))?)?;
    graph.create_pass("b", compute_pass(&[Alias::image_output("a", "out")], Alias::image("y"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("a", "out"));

    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::PassNotDAG(_)), "{err}");
    assert!(graph.dependency().is_none());
    Ok(())
}

#[test]
fn second_writer_of_a_value_is_rejected() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("image", color_image(16, 16))?;
    graph.create_pass("first", compute_pass(&[], Alias::image("image"))?)?;
    graph.create_pass("second", compute_pass(&[], Alias::image("image"))?)?;
    graph.add_result(Key::new("first"), Alias::image_output("first", "out"));
    graph.add_result(Key::new("second"), Alias::image_output("second", "out"));

    let err = graph.compile().unwrap_err();
    match vkrg_error(&err) {
        Error::MultipleWrite(key) => assert_eq!(key, &GlobalKey::from("image")),
        other => panic!("unexpected error {other}"),
    }
    Ok(())
}

#[test]
fn last_frame_resources_are_read_only() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("image", color_image(16, 16))?;
    graph.create_resource("prev", LastFrameImage::new(Alias::image_output("draw", "out")))?;
    graph.create_pass("draw", compute_pass(&[], Alias::image("image"))?)?;
    graph.create_pass("bad", compute_pass(&[], Alias::image("prev"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("bad", "out"));

    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::WriteToLastFrame(key) if key == &GlobalKey::from("prev")));
    Ok(())
}

#[test]
fn aliases_must_match_their_target() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("image", color_image(16, 16))?;
    graph.create_resource("other", color_image(16, 16))?;
    graph.create_pass("read", compute_pass(&[Alias::image("image")], Alias::image("other"))?)?;
    // `in` of `read` is read-only and has no output.
    graph.create_pass("bad", compute_pass(&[Alias::image_output("read", Key::with_id("in", 0))], Alias::image("other"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("bad", "out"));
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::AliasNoMatch(_)), "{err}");

    // A buffer alias naming an image.
    graph.remove_result(Key::new("out"))?;
    graph.create_pass(
        "bad_type",
        PassBuilder::compute()
            .add_input(Key::new("out"), Alias::buffer("image"), Usage::StorageBufferW, vk::PipelineStageFlags2::COMPUTE_SHADER)?
            .build(),
    )?;
    graph.add_result(Key::new("out"), Alias::buffer_output("bad_type", "out"));
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::AliasNoMatch(_)), "{err}");
    Ok(())
}

#[test]
fn missing_objects_are_reported() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_pass("draw", compute_pass(&[], Alias::image("missing"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("draw", "out"));
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::ResourceNotFound(key) if key == &GlobalKey::from("missing")));

    graph.create_resource("missing", color_image(16, 16))?;
    graph.add_result(Key::new("out"), Alias::image_output("nowhere", "out"));
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::PassNotFound(_)), "{err}");
    Ok(())
}

#[test]
fn resources_form_a_forest() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("shared", color_image(16, 16))?;
    graph.create_resource("out", color_image(16, 16))?;
    graph.create_resource("first", CombinedImage::new([Alias::image("shared")]))?;
    graph.create_resource("second", CombinedImage::new([Alias::image("shared")]))?;
    graph.create_pass("read", compute_pass(&[Alias::image("first"), Alias::image("second")], Alias::image("out"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("read", "out"));

    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::ResourceNotTree(key) if key == &GlobalKey::from("shared")));
    Ok(())
}

#[test]
fn external_and_last_frame_resources_have_no_parent() -> Result<()> {
    let (_, mut graph) = default_graph();
    graph.create_resource("image", color_image(16, 16))?;
    graph.create_resource("out", color_image(16, 16))?;
    graph.create_resource("prev", LastFrameImage::new(Alias::image("image")))?;
    graph.create_resource("combined", CombinedImage::new([Alias::image("prev")]))?;
    graph.create_pass("read", compute_pass(&[Alias::image("combined")], Alias::image("out"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("read", "out"));
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::ResourceLFParent(key) if key == &GlobalKey::from("prev")));

    graph.create_resource(
        "swapchain",
        ExternalImage {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            format: COLOR_FORMAT,
            extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            layers: 1,
            usage: vk::ImageUsageFlags::SAMPLED,
            src: ExternalState::acquired(),
            dst: ExternalState::present(),
        },
    )?;
    graph.create_resource("combined", CombinedImage::new([Alias::image("swapchain")]))?;
    let err = graph.compile().unwrap_err();
    assert!(matches!(vkrg_error(&err), Error::ResourceExtParent(key) if key == &GlobalKey::from("swapchain")));
    Ok(())
}

#[test]
fn resources_used_at_disjoint_times_may_alias() -> Result<()> {
    let (_, mut graph) = default_graph();
    for key in ["a", "b", "c"] {
        graph.create_resource(key, color_image(16, 16))?;
    }
    graph.create_pass("first", compute_pass(&[], Alias::image("a"))?)?;
    graph.create_pass("second", compute_pass(&[Alias::image_output("first", "out")], Alias::image("b"))?)?;
    graph.create_pass("third", compute_pass(&[Alias::image_output("second", "out")], Alias::image("c"))?)?;
    graph.add_result(Key::new("out"), Alias::image_output("third", "out"));
    graph.compile()?;

    let collection = graph.collection().unwrap();
    let dependency = graph.dependency().unwrap();
    let phys = |key: &'static str| {
        dependency
            .phys_id_of(collection.resource_id(&key.into()).unwrap())
            .unwrap()
    };
    let (a, b, c) = (phys("a"), phys("b"), phys("c"));
    assert!(dependency.resource_precedes(a, c));
    assert!(dependency.may_alias(a, c));
    assert!(!dependency.may_alias(a, b));
    assert!(!dependency.may_alias(b, c));
    display_dot(&graph, "resources_used_at_disjoint_times_may_alias")?;
    Ok(())
}

#[test]
fn pass_groups_are_flattened() -> Result<()> {
    let (_, mut graph) = default_graph();
    let blur = GlobalKey::from("blur");
    graph.create_resource("out", color_image(16, 16))?;
    let group = PassBuilder::group()
        .resource(Key::new("tmp"), color_image(16, 16))
        .pass(Key::new("horizontal"), compute_pass(&[], Alias::image(blur.child("tmp")))?)
        .pass(
            Key::new("vertical"),
            compute_pass(&[Alias::image_output(blur.child("horizontal"), "out")], Alias::image("out"))?,
        )
        .build();
    graph.create_pass("blur", group)?;
    graph.add_result(Key::new("out"), Alias::image_output(blur.child("vertical"), "out"));
    graph.compile()?;

    let collection = graph.collection().unwrap();
    assert_eq!(collection.pass_count(), 2);
    let horizontal = collection.pass_id(&blur.child("horizontal")).unwrap();
    let vertical = collection.pass_id(&blur.child("vertical")).unwrap();
    assert!(collection.resource_id(&blur.child("tmp")).is_some());
    assert_eq!(graph.dependency().unwrap().topo_order(), &[horizontal, vertical]);
    Ok(())
}
