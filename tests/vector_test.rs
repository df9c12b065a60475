use std::rc::Rc;

use scene_ngin::{
    Pattern, RenderError, RenderQueue, Renderable, VectorContext,
    objects::vector::{DisplayCommand, RecordingBackend, TessellatingBackend},
    render::OVERLAY_QUEUE,
};

use crate::common::test_utils::{TestScene, floats};

mod common;

#[test]
fn hints_select_backends() {
    let scene = TestScene::new();
    for (hint, expected) in [
        ("cairo", "cairo"),
        ("opengl", "opengl"),
        ("opengl-fixed", "opengl-fixed"),
    ] {
        let ctx = scene.ctx.create_vector_context("v", Some(hint), 8, 8).unwrap();
        assert_eq!(ctx.backend_name(), expected);
    }
    let recording = scene.ctx.create_vector_context("v", Some("cairo"), 8, 8).unwrap();
    assert!(recording.with_backend(|b| b.as_any().is::<RecordingBackend>()));
    let gl = scene.ctx.create_vector_context("v", Some("opengl"), 8, 8).unwrap();
    assert!(gl.with_backend(|b| b.as_any().is::<TessellatingBackend>()));
}

#[test]
fn unknown_hint_is_fatal() {
    let scene = TestScene::new();
    match scene.ctx.create_vector_context("v", Some("skia"), 8, 8) {
        Err(RenderError::UnknownVectorBackend { hint }) => assert_eq!(hint, "skia"),
        Err(other) => panic!("unexpected {other:?}"),
        Ok(_) => panic!("`skia` is not a registered backend"),
    }
}

#[test]
fn custom_backends_can_be_registered() {
    let scene = TestScene::new();
    scene
        .ctx
        .register_vector_backend("skia", |w, h| Ok(Box::new(RecordingBackend::new(w, h))));
    let ctx = scene.ctx.create_vector_context("v", Some("skia"), 8, 8).unwrap();
    // the backend reports its own name
    assert_eq!(ctx.backend_name(), "cairo");
}

#[test]
fn recording_contexts_attach_a_surface() {
    let mut scene = TestScene::new();
    let node = scene.plain_node("hud", None);
    let vector = Rc::new(scene.ctx.create_vector_context("overlay", Some("cairo"), 64, 32).unwrap());

    let definition = scene.graph.attach_object(node, vector.clone()).unwrap();

    assert_eq!(definition.textures.len(), 1);
    let surface = scene.device.texture(definition.textures[0]).unwrap();
    assert_eq!((surface.width, surface.height), (64, 32));
    assert_eq!(vector.queue(), OVERLAY_QUEUE);

    vector.set_source(
        Pattern::linear(0.0, 0.0, 64.0, 0.0)
            .add_color_stop(0.0, [1.0, 0.0, 0.0, 1.0])
            .add_color_stop(1.0, [0.0, 0.0, 1.0, 1.0]),
    );
    vector.arc(32.0, 16.0, 8.0, 0.0, std::f32::consts::TAU);
    vector.fill().unwrap();
    vector.flush().unwrap();
    vector.with_backend(|backend| {
        let recording = backend.as_any().downcast_ref::<RecordingBackend>().unwrap();
        assert!(matches!(
            &recording.presented()[0],
            DisplayCommand::Fill { source: Pattern::LinearGradient { stops, .. }, .. } if stops.len() == 2
        ));
    });
}

fn draw_square(ctx: &VectorContext) {
    ctx.set_source_rgba(0.0, 1.0, 0.0, 1.0);
    ctx.rectangle(0.0, 0.0, 10.0, 10.0);
    ctx.fill().unwrap();
    ctx.flush().unwrap();
}

#[test]
fn tessellated_geometry_reaches_the_device() {
    let mut scene = TestScene::new();
    let node = scene.plain_node("hud", None);
    let vector = Rc::new(scene.ctx.create_vector_context("overlay", Some("opengl"), 64, 64).unwrap());
    scene.graph.attach_object(node, vector.clone()).unwrap();

    draw_square(&vector);

    vector.with_backend(|backend| {
        let gl = backend.as_any().downcast_ref::<TessellatingBackend>().unwrap();
        let fills = gl.fill_geometry();
        assert_eq!(fills.vertex_count(), 4);
        let positions = fills.attributes()[0].borrow().handle().unwrap();
        let colours = fills.attributes()[1].borrow().handle().unwrap();
        assert_eq!(
            floats(&scene.device.buffer_contents(positions).unwrap()),
            [0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]
        );
        assert_eq!(
            floats(&scene.device.buffer_contents(colours).unwrap())[..4],
            [0.0, 1.0, 0.0, 1.0]
        );
        let indices = fills.index_handle().unwrap();
        assert_eq!(scene.device.buffer_contents(indices).unwrap().len(), 6 * 4);
    });

    let mut queue = RenderQueue::new();
    scene.graph.render_scene(&mut queue).unwrap();
    assert_eq!(queue.queue(OVERLAY_QUEUE).len(), 1);
}

#[test]
fn fixed_function_reports_colour_per_batch() {
    let mut scene = TestScene::new();
    let node = scene.plain_node("hud", None);
    let vector = Rc::new(
        scene
            .ctx
            .create_vector_context("overlay", Some("opengl-fixed"), 64, 64)
            .unwrap(),
    );
    let definition = scene.graph.attach_object(node, vector.clone()).unwrap();
    // one position channel each for fills and strokes, no index buffer yet
    assert_eq!(definition.buffers.len(), 2);

    draw_square(&vector);

    vector.with_backend(|backend| {
        let gl = backend.as_any().downcast_ref::<TessellatingBackend>().unwrap();
        assert_eq!(gl.fill_geometry().attributes().len(), 1);
        assert_eq!(gl.fill_batches().len(), 1);
        assert_eq!(gl.fill_batches()[0].colour, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(gl.fill_batches()[0].count, 6);
    });
}
