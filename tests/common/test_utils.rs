use std::rc::Rc;

use scene_ngin::{
    AttributeRole, AttributeSet, Context, DrawMode, HeadlessDevice, RenderConfig, SceneGraph,
    SceneObject, TraversalMode, render::GEOMETRY_QUEUE,
};

/// A graph named "main" whose context renders into a fresh headless device.
pub(crate) struct TestScene {
    pub ctx: Rc<Context>,
    pub device: Rc<HeadlessDevice>,
    pub graph: SceneGraph,
}

impl TestScene {
    pub fn new() -> Self {
        Self::with_traversal(TraversalMode::Scoped)
    }

    pub fn with_traversal(traversal: TraversalMode) -> Self {
        let ctx = Rc::new(Context::new(RenderConfig {
            traversal,
            ..Default::default()
        }));
        let device = HeadlessDevice::shared("headless");
        ctx.set_current_device(device.clone());
        let graph = SceneGraph::new("main", Rc::clone(&ctx));
        Self { ctx, device, graph }
    }

    /// Create a plain node named `name` and put it under `parent` (root if `None`).
    pub fn plain_node(
        &mut self,
        name: &str,
        parent: Option<scene_ngin::NodeId>,
    ) -> scene_ngin::NodeId {
        let id = self
            .graph
            .create_node("", &serde_json::json!({ "name": name }))
            .unwrap();
        self.graph.attach_node(parent, id).unwrap();
        id
    }
}

/// One indexed triangle with positions only.
pub(crate) fn triangle(name: &str) -> Rc<SceneObject> {
    let mut set = AttributeSet::new(DrawMode::Triangles, true, true, false);
    let positions = set
        .add_attribute_description::<f32>(AttributeRole::Position, 3, false, 0, 0, 0)
        .unwrap();
    positions
        .borrow_mut()
        .update(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
        .unwrap();
    set.update_indices_u16(&[0, 1, 2]).unwrap();
    Rc::new(SceneObject::new(name, GEOMETRY_QUEUE, set))
}

pub(crate) fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
