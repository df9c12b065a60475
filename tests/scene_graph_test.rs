use std::{cell::RefCell, collections::HashSet, rc::Rc, time::Duration};

use scene_ngin::{
    Camera, HeadlessDevice, Light, LightProperties, NodeBehaviour, RenderError, RenderQueue,
    RenderTarget, Renderable, TraversalMode,
    cgmath::{Deg, Quaternion, Rotation3, Vector3},
    data_structures::scene_graph::PlainNode,
};

use crate::common::test_utils::{TestScene, triangle};

mod common;

#[test]
fn fresh_graph_gets_one_plain_child() {
    let mut scene = TestScene::new();
    let root = scene.graph.root();
    assert!(scene.graph.children(root).is_empty());

    let node = scene.graph.create_node("", &serde_json::json!({})).unwrap();
    assert_eq!(scene.graph.node(node).unwrap().kind(), "");
    assert!(
        scene
            .graph
            .node(node)
            .unwrap()
            .behaviour()
            .as_any()
            .is::<PlainNode>()
    );
    scene.graph.attach_node(Some(root), node).unwrap();

    assert_eq!(scene.graph.len(), 2);
    assert_eq!(scene.graph.pre_order(), vec![root, node]);
}

#[test]
fn every_node_has_one_parent_and_is_visited_once() {
    let mut scene = TestScene::new();
    let mut ids = Vec::new();
    for i in 0..20usize {
        let parent = (i > 0).then(|| ids[(i * 7) % i]);
        ids.push(scene.plain_node(&format!("n{i}"), parent));
    }

    let order = scene.graph.pre_order();
    assert_eq!(order.len(), 21);
    assert_eq!(order.iter().collect::<HashSet<_>>().len(), 21);
    assert_eq!(order[0], scene.graph.root());
    for id in &ids {
        let parent = scene.graph.parent(*id).unwrap();
        let siblings = scene.graph.children(parent);
        assert_eq!(siblings.iter().filter(|s| *s == id).count(), 1);
        // parents come first
        let at = |x| order.iter().position(|o| *o == x).unwrap();
        assert!(at(parent) < at(*id));
    }
}

#[test]
fn attaching_under_a_missing_parent_fails() {
    let mut scene = TestScene::new();
    let detached = scene
        .graph
        .create_node("", &serde_json::json!({ "name": "floating" }))
        .unwrap();
    let child = scene.graph.create_node("", &serde_json::json!({})).unwrap();

    match scene.graph.attach_node(Some(detached), child) {
        Err(RenderError::ParentNotFound { graph, parent }) => {
            assert_eq!(graph, "main");
            assert_eq!(parent, "floating");
        }
        other => panic!("unexpected {other:?}"),
    }

    let gone = scene.plain_node("gone", None);
    scene.graph.remove_node(gone).unwrap();
    assert!(matches!(
        scene.graph.attach_node(Some(gone), child),
        Err(RenderError::ParentNotFound { .. })
    ));
    assert!(!scene.graph.is_attached(child));
}

#[test]
fn unknown_node_kind_is_fatal() {
    let mut scene = TestScene::new();
    match scene.graph.create_node("teapot", &serde_json::json!({})) {
        Err(RenderError::UnknownNodeKind { kind }) => assert_eq!(kind, "teapot"),
        other => panic!("unexpected {other:?}"),
    }
}

struct Marker(Rc<RefCell<Vec<String>>>);

impl NodeBehaviour for Marker {
    fn node_attached(&mut self, parent: &str) {
        self.0.borrow_mut().push(parent.to_string());
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[test]
fn registered_kinds_get_the_attach_hook() {
    let mut scene = TestScene::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    scene
        .ctx
        .register_node_kind("marker", move |_| Ok(Box::new(Marker(Rc::clone(&sink)))));

    let world = scene.plain_node("world", None);
    let marker = scene.graph.create_node("marker", &serde_json::json!({})).unwrap();
    assert_eq!(scene.graph.node(marker).unwrap().name(), "marker");
    assert!(seen.borrow().is_empty());

    scene.graph.attach_node(Some(world), marker).unwrap();
    assert_eq!(*seen.borrow(), vec!["world".to_string()]);
}

#[test]
fn light_slots_replace() {
    let mut scene = TestScene::new();
    let node = scene.plain_node("lit", None);
    let a = Rc::new(Light::new("a", LightProperties::default()));
    let b = Rc::new(Light::new("b", LightProperties::default()));

    assert!(scene.graph.attach_light(node, 3, a).unwrap().is_none());
    let replaced = scene.graph.attach_light(node, 3, Rc::clone(&b)).unwrap();

    assert_eq!(replaced.unwrap().name(), "a");
    let lights = scene.graph.node(node).unwrap().lights();
    assert_eq!(lights.len(), 1);
    assert!(Rc::ptr_eq(&lights[&3], &b));
}

#[test]
fn shared_lights_are_bound_once() {
    let mut scene = TestScene::new();
    let left = scene.plain_node("left", None);
    let right = scene.plain_node("right", None);
    let sun = Rc::new(Light::new("sun", LightProperties::default()));

    scene.graph.attach_light(left, 0, Rc::clone(&sun)).unwrap();
    let created = scene.device.stats().buffers_created;
    scene.graph.attach_light(right, 0, Rc::clone(&sun)).unwrap();

    assert_eq!(scene.device.stats().buffers_created, created);
    assert_eq!(Rc::strong_count(&sun), 3);
}

#[test]
fn attaching_needs_a_current_device() {
    let mut scene = TestScene::new();
    let node = scene.plain_node("n", None);
    scene.ctx.clear_current_device();

    match scene.graph.attach_object(node, triangle("tri")) {
        Err(RenderError::NoCurrentDevice { object }) => assert_eq!(object, "tri"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        scene.graph.attach_camera(node, Rc::new(Camera::new("eye"))),
        Err(RenderError::NoCurrentDevice { .. })
    ));
    assert!(scene.graph.node(node).unwrap().objects().is_empty());
    assert!(scene.graph.node(node).unwrap().camera().is_none());
}

#[test]
fn detached_nodes_take_no_renderables() {
    let mut scene = TestScene::new();
    let floating = scene
        .graph
        .create_node("", &serde_json::json!({ "name": "floating" }))
        .unwrap();
    let tri = triangle("tri");

    assert!(matches!(
        scene.graph.attach_object(floating, tri.clone()),
        Err(RenderError::NodeNotFound { .. })
    ));
    assert!(matches!(
        scene.graph.attach_light(floating, 0, Rc::new(Light::new("sun", LightProperties::default()))),
        Err(RenderError::NodeNotFound { .. })
    ));
    assert!(tri.definition().is_none());
    assert_eq!(scene.device.stats().buffers_created, 0);

    scene.graph.attach_node(None, floating).unwrap();
    scene.graph.attach_object(floating, tri).unwrap();
    assert_eq!(scene.graph.node(floating).unwrap().objects().len(), 1);
}

#[test]
fn objects_stay_on_their_first_device() {
    let mut scene = TestScene::new();
    let first = scene.plain_node("first", None);
    let second = scene.plain_node("second", None);
    let tri = triangle("tri");
    scene.graph.attach_object(first, tri.clone()).unwrap();

    scene.ctx.set_current_device(HeadlessDevice::shared("other"));
    assert!(matches!(
        scene.graph.attach_object(second, tri),
        Err(RenderError::DeviceMismatch { .. })
    ));
}

fn camera_seen_by(object: &Rc<scene_ngin::SceneObject>) -> Option<String> {
    object
        .scene_params()
        .camera
        .map(|camera| camera.name().to_string())
}

fn sibling_scene(traversal: TraversalMode) -> (TestScene, Rc<scene_ngin::SceneObject>, Rc<scene_ngin::SceneObject>) {
    let mut scene = TestScene::with_traversal(traversal);
    let n1 = scene.plain_node("n1", None);
    let n2 = scene.plain_node("n2", None);
    let o1 = triangle("o1");
    let o2 = triangle("o2");
    scene.graph.attach_camera(n1, Rc::new(Camera::new("c1"))).unwrap();
    scene.graph.attach_object(n1, o1.clone()).unwrap();
    scene.graph.attach_object(n2, o2.clone()).unwrap();
    (scene, o1, o2)
}

#[test]
fn accumulating_traversal_leaks_camera_to_later_siblings() {
    let (scene, o1, o2) = sibling_scene(TraversalMode::Accumulate);
    let mut queue = RenderQueue::new();
    scene.graph.render_scene(&mut queue).unwrap();

    assert_eq!(queue.names(), ["o1", "o2"]);
    assert_eq!(camera_seen_by(&o1).as_deref(), Some("c1"));
    assert_eq!(camera_seen_by(&o2).as_deref(), Some("c1"));
}

#[test]
fn scoped_traversal_keeps_siblings_apart() {
    let (scene, o1, o2) = sibling_scene(TraversalMode::Scoped);
    let mut queue = RenderQueue::new();
    scene.graph.render_scene(&mut queue).unwrap();

    assert_eq!(camera_seen_by(&o1).as_deref(), Some("c1"));
    assert_eq!(camera_seen_by(&o2), None);
}

#[test]
fn children_inherit_and_override_lights() {
    let mut scene = TestScene::new();
    let parent = scene.plain_node("parent", None);
    let child = scene.plain_node("child", Some(parent));
    for (node, slot, name) in [(parent, 0, "a"), (child, 0, "b"), (child, 1, "c"), (parent, 2, "d")] {
        scene
            .graph
            .attach_light(node, slot, Rc::new(Light::new(name, LightProperties::default())))
            .unwrap();
    }
    let outer = triangle("outer");
    let inner = triangle("inner");
    scene.graph.attach_object(parent, outer.clone()).unwrap();
    scene.graph.attach_object(child, inner.clone()).unwrap();

    scene.graph.render_scene(&mut RenderQueue::new()).unwrap();

    let names = |o: &Rc<scene_ngin::SceneObject>| {
        o.scene_params()
            .lights
            .iter()
            .map(|(slot, l)| (*slot, l.name().to_string()))
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&outer), [(0, "a".to_string()), (2, "d".to_string())]);
    assert_eq!(
        names(&inner),
        [(0, "b".to_string()), (1, "c".to_string()), (2, "d".to_string())]
    );
}

#[test]
fn render_targets_are_cleared_every_frame() {
    let mut scene = TestScene::new();
    let node = scene.plain_node("offscreen", None);
    let target = Rc::new(RenderTarget::new("rt", 16, 16, [0.2, 0.3, 0.4, 1.0]));
    scene.graph.attach_render_target(node, Rc::clone(&target)).unwrap();
    let tri = triangle("tri");
    scene.graph.attach_object(node, tri.clone()).unwrap();
    let framebuffer = target.definition().unwrap().framebuffer.unwrap();

    for _ in 0..2 {
        scene.graph.render_scene(&mut RenderQueue::new()).unwrap();
    }

    assert_eq!(
        scene.device.clears(),
        vec![(framebuffer, [0.2, 0.3, 0.4, 1.0]); 2]
    );
    let seen = tri.scene_params().render_target.unwrap();
    assert!(Rc::ptr_eq(&seen, &target));
    assert_eq!(scene.device.stats().live_textures(), 2);
}

#[test]
fn queues_follow_traversal_and_order_keys() {
    let mut scene = TestScene::new();
    let a = scene.plain_node("a", None);
    let b = scene.plain_node("b", Some(a));
    let hud = Rc::new(
        scene
            .ctx
            .create_vector_context("hud", None, 32, 32)
            .unwrap(),
    );
    scene.graph.attach_object(a, hud).unwrap();
    scene.graph.attach_object(a, triangle("late")).unwrap();
    let early = triangle("early");
    early.set_order(-1);
    scene.graph.attach_object(b, early).unwrap();
    scene.graph.attach_camera(a, Rc::new(Camera::new("eye"))).unwrap();

    let mut queue = RenderQueue::new();
    scene.graph.render_scene(&mut queue).unwrap();
    assert_eq!(queue.names(), ["late", "early", "hud"]);
    queue.sort();
    assert_eq!(queue.names(), ["early", "late", "hud"]);
}

#[test]
fn rotating_nodes_spin_their_objects() {
    let mut scene = TestScene::new();
    let spinner = scene
        .graph
        .create_node("rotating", &serde_json::json!({ "axis": [0.0, 0.0, 1.0], "speed": 90.0 }))
        .unwrap();
    scene.graph.attach_node(None, spinner).unwrap();
    let tri = triangle("tri");
    scene.graph.attach_object(spinner, tri.clone()).unwrap();

    scene.graph.process(Duration::from_secs(1)).unwrap();

    let expected = Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), Deg(90.0));
    let actual = tri.transform().rotation;
    assert!((actual.s - expected.s).abs() < 1e-5);
    assert!((actual.v.z - expected.v.z).abs() < 1e-5);
}

#[test]
fn removed_nodes_leave_the_tree() {
    let mut scene = TestScene::new();
    let node = scene.plain_node("doomed", None);
    scene.graph.attach_object(node, triangle("tri")).unwrap();
    assert_eq!(scene.device.stats().live_buffers(), 3);

    scene.graph.remove_node(node).unwrap();
    assert!(scene.graph.find_by_name("doomed").is_none());
    assert_eq!(scene.graph.len(), 1);
}
