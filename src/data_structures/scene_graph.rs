//! Scene graph and hierarchical scene organization.
//!
//! A [`SceneGraph`] owns every [`SceneNode`] in an arena; nodes are addressed
//! by the [`NodeId`] handed out by [`SceneGraph::create_node`]. Creating a
//! node does not place it in the tree, [`SceneGraph::attach_node`] does. The
//! root exists from construction on and cannot be removed.
//!
//! Nodes carry renderables (shared through `Rc`, a light may sit in several
//! nodes), a slot map of lights, an optional camera and an optional render
//! target. Attaching any of these binds it to the context's current display
//! device right away.
//!
//! Per-kind behaviour lives in a [`NodeBehaviour`]; node kinds are looked up
//! by name in the [`Context`] registry.

use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    rc::Rc,
    time::Duration,
};

use cgmath::Vector3;
use indextree::{Arena, NodeEdge, NodeId};
use instant::Instant;
use serde::Deserialize;

use crate::{
    config::TraversalMode,
    context::Context,
    device::DisplayDeviceDefinition,
    error::RenderError,
    objects::{
        Renderable, camera::Camera, light::Light, render_target::RenderTarget,
        scene_object::SceneObject,
    },
    render::RenderManager,
};

/// Free-form construction data handed to node and object factories.
pub type NodeData = serde_json::Value;

/// What a traversal passes down to the objects it queues.
#[derive(Clone, Default)]
pub struct SceneNodeParams {
    pub camera: Option<Rc<Camera>>,
    pub lights: BTreeMap<u32, Rc<Light>>,
    pub render_target: Option<Rc<RenderTarget>>,
}

impl fmt::Debug for SceneNodeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneNodeParams")
            .field("camera", &self.camera.as_ref().map(|c| c.name().to_string()))
            .field(
                "lights",
                &self
                    .lights
                    .iter()
                    .map(|(slot, l)| (*slot, l.name().to_string()))
                    .collect::<Vec<_>>(),
            )
            .field(
                "render_target",
                &self.render_target.as_ref().map(|t| t.name().to_string()),
            )
            .finish()
    }
}

/// Per-kind node logic.
pub trait NodeBehaviour {
    /// Per-frame update, separate from rendering.
    fn process(&mut self, _objects: &[Rc<dyn Renderable>], _dt: Duration) -> Result<(), RenderError> {
        Ok(())
    }

    /// Called once the node got a parent.
    fn node_attached(&mut self, _parent: &str) {}

    fn as_any(&self) -> &dyn Any;
}

/// Behaviour of nodes created with an empty kind.
#[derive(Debug, Default)]
pub struct PlainNode;

impl NodeBehaviour for PlainNode {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn default_axis() -> [f32; 3] {
    [0.0, 1.0, 0.0]
}

fn default_speed() -> f32 {
    45.0
}

#[derive(Debug, Deserialize)]
struct RotatingData {
    #[serde(default = "default_axis")]
    axis: [f32; 3],
    #[serde(default = "default_speed")]
    speed: f32,
}

/// Spins every [`SceneObject`] on its node, `speed` degrees per second.
///
/// Registered as `"rotating"`; data keys are `axis` (default `[0, 1, 0]`)
/// and `speed` (default `45`).
#[derive(Debug)]
pub struct RotatingNode {
    pub axis: Vector3<f32>,
    pub speed: f32,
    parent: Option<String>,
}

impl RotatingNode {
    pub const KIND: &'static str = "rotating";

    pub fn from_data(data: &NodeData) -> Result<Self, RenderError> {
        let data = if data.is_null() {
            serde_json::json!({})
        } else {
            data.clone()
        };
        let data: RotatingData =
            serde_json::from_value(data).map_err(|e| RenderError::InvalidNodeData {
                kind: Self::KIND.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            axis: data.axis.into(),
            speed: data.speed,
            parent: None,
        })
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

impl NodeBehaviour for RotatingNode {
    fn process(&mut self, objects: &[Rc<dyn Renderable>], dt: Duration) -> Result<(), RenderError> {
        let angle = cgmath::Deg(self.speed * dt.as_secs_f32());
        for object in objects {
            if let Some(object) = object.as_any().downcast_ref::<SceneObject>() {
                object.update_transform(|t| t.rotate(self.axis, angle))?;
            }
        }
        Ok(())
    }

    fn node_attached(&mut self, parent: &str) {
        self.parent = Some(parent.to_string());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct SceneNode {
    name: String,
    kind: String,
    objects: Vec<Rc<dyn Renderable>>,
    lights: BTreeMap<u32, Rc<Light>>,
    camera: Option<Rc<Camera>>,
    render_target: Option<Rc<RenderTarget>>,
    behaviour: Box<dyn NodeBehaviour>,
}

impl SceneNode {
    pub fn new(name: &str, kind: &str, behaviour: Box<dyn NodeBehaviour>) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            objects: Vec::new(),
            lights: BTreeMap::new(),
            camera: None,
            render_target: None,
            behaviour,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn objects(&self) -> &[Rc<dyn Renderable>] {
        &self.objects
    }

    pub fn lights(&self) -> &BTreeMap<u32, Rc<Light>> {
        &self.lights
    }

    pub fn light(&self, slot: u32) -> Option<&Rc<Light>> {
        self.lights.get(&slot)
    }

    pub fn camera(&self) -> Option<&Rc<Camera>> {
        self.camera.as_ref()
    }

    pub fn render_target(&self) -> Option<&Rc<RenderTarget>> {
        self.render_target.as_ref()
    }

    pub fn behaviour(&self) -> &dyn NodeBehaviour {
        self.behaviour.as_ref()
    }

    /// Merge this node into `params` and queue its objects.
    ///
    /// An owned camera or render target overrides the inherited one, owned
    /// lights override inherited lights in the same slot. An owned render
    /// target is cleared before anything of this node is queued.
    pub fn render_node(
        &self,
        manager: &mut dyn RenderManager,
        params: &mut SceneNodeParams,
    ) -> Result<(), RenderError> {
        if let Some(camera) = &self.camera {
            params.camera = Some(Rc::clone(camera));
        }
        for (slot, light) in &self.lights {
            params.lights.insert(*slot, Rc::clone(light));
        }
        if let Some(target) = &self.render_target {
            params.render_target = Some(Rc::clone(target));
            log::trace!("`{}` clears `{}`", self.name, target.name());
            target.clear()?;
        }
        for object in &self.objects {
            object.set_scene_params(params);
            manager.add_renderable_to_queue(object.queue(), object.order(), Rc::clone(object));
        }
        Ok(())
    }

    pub fn process(&mut self, dt: Duration) -> Result<(), RenderError> {
        self.behaviour.process(&self.objects, dt)
    }
}

impl fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("objects", &self.objects.iter().map(|o| o.name()).collect::<Vec<_>>())
            .field("lights", &self.lights.keys().collect::<Vec<_>>())
            .field("camera", &self.camera.as_ref().map(|c| c.name()))
            .field("render_target", &self.render_target.as_ref().map(|t| t.name()))
            .finish()
    }
}

pub struct SceneGraph {
    name: String,
    context: Rc<Context>,
    arena: Arena<SceneNode>,
    root: NodeId,
    last_update: Option<Instant>,
}

impl SceneGraph {
    pub fn new(name: &str, context: Rc<Context>) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(SceneNode::new("root", "", Box::new(PlainNode)));
        log::debug!("created scene graph `{}`", name);
        Self {
            name: name.to_string(),
            context,
            arena,
            root,
            last_update: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.context
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Create a detached node.
    ///
    /// An empty `kind` makes a plain node, anything else is looked up in the
    /// context's node registry. The node is named after `data["name"]`, or
    /// after its kind when that key is missing.
    pub fn create_node(&mut self, kind: &str, data: &NodeData) -> Result<NodeId, RenderError> {
        let behaviour: Box<dyn NodeBehaviour> = if kind.is_empty() {
            Box::new(PlainNode)
        } else {
            self.context.create_node_behaviour(kind, data)?
        };
        let name = data
            .get("name")
            .and_then(NodeData::as_str)
            .unwrap_or(if kind.is_empty() { "node" } else { kind });
        let id = self.arena.new_node(SceneNode::new(name, kind, behaviour));
        log::debug!("`{}`: created node `{}` ({:?})", self.name, name, id);
        Ok(id)
    }

    /// Insert `child` under `parent`, or under the root when `parent` is `None`.
    pub fn attach_node(&mut self, parent: Option<NodeId>, child: NodeId) -> Result<(), RenderError> {
        let parent = parent.unwrap_or(self.root);
        if self.node(child).is_none() {
            return Err(self.not_found(child));
        }
        if !self.is_attached(parent) {
            return Err(RenderError::ParentNotFound {
                graph: self.name.clone(),
                parent: self
                    .node(parent)
                    .map(|n| n.name().to_string())
                    .unwrap_or_else(|| format!("{parent:?}")),
            });
        }
        if child == self.root || self.parent(child).is_some() {
            return Err(self.already_attached(child));
        }
        parent
            .checked_append(child, &mut self.arena)
            .map_err(|_| self.already_attached(child))?;

        let parent_name = self.arena[parent].get().name.clone();
        let node = self.arena[child].get_mut();
        node.behaviour.node_attached(&parent_name);
        log::debug!("`{}`: attached `{}` under `{}`", self.name, node.name, parent_name);
        Ok(())
    }

    /// Bind `object` to the current device and add it to `node`.
    pub fn attach_object(
        &mut self,
        node: NodeId,
        object: Rc<dyn Renderable>,
    ) -> Result<DisplayDeviceDefinition, RenderError> {
        let definition = self.bind(node, object.as_ref())?;
        self.node_entry(node)?.objects.push(object);
        Ok(definition)
    }

    /// Put `light` into `slot`, returning the light it replaced.
    pub fn attach_light(
        &mut self,
        node: NodeId,
        slot: u32,
        light: Rc<Light>,
    ) -> Result<Option<Rc<Light>>, RenderError> {
        self.bind(node, light.as_ref())?;
        Ok(self.node_entry(node)?.lights.insert(slot, light))
    }

    pub fn attach_camera(
        &mut self,
        node: NodeId,
        camera: Rc<Camera>,
    ) -> Result<Option<Rc<Camera>>, RenderError> {
        self.bind(node, camera.as_ref())?;
        Ok(self.node_entry(node)?.camera.replace(camera))
    }

    pub fn attach_render_target(
        &mut self,
        node: NodeId,
        target: Rc<RenderTarget>,
    ) -> Result<Option<Rc<RenderTarget>>, RenderError> {
        self.bind(node, target.as_ref())?;
        Ok(self.node_entry(node)?.render_target.replace(target))
    }

    fn bind(
        &self,
        node: NodeId,
        renderable: &dyn Renderable,
    ) -> Result<DisplayDeviceDefinition, RenderError> {
        if !self.is_attached(node) {
            return Err(self.not_found(node));
        }
        let device = self.context.require_device(renderable.name())?;
        renderable.attach(&device)
    }

    /// Queue everything reachable from the root, in pre-order.
    pub fn render_scene(&self, manager: &mut dyn RenderManager) -> Result<(), RenderError> {
        match self.context.config().traversal {
            TraversalMode::Scoped => {
                let mut stack: Vec<SceneNodeParams> = Vec::new();
                for edge in self.root.traverse(&self.arena) {
                    match edge {
                        NodeEdge::Start(id) => {
                            let mut params = stack.last().cloned().unwrap_or_default();
                            self.arena[id].get().render_node(manager, &mut params)?;
                            stack.push(params);
                        }
                        NodeEdge::End(_) => {
                            stack.pop();
                        }
                    }
                }
            }
            TraversalMode::Accumulate => {
                let mut params = SceneNodeParams::default();
                for id in self.root.descendants(&self.arena) {
                    self.arena[id].get().render_node(manager, &mut params)?;
                }
            }
        }
        Ok(())
    }

    /// Run every node's per-frame update, in pre-order.
    pub fn process(&mut self, dt: Duration) -> Result<(), RenderError> {
        for id in self.pre_order() {
            self.arena[id].get_mut().process(dt)?;
        }
        Ok(())
    }

    /// [`process`](Self::process) with the time elapsed since the last call.
    pub fn update(&mut self) -> Result<(), RenderError> {
        let now = Instant::now();
        let dt = self
            .last_update
            .map(|last| now.duration_since(last))
            .unwrap_or_default();
        self.last_update = Some(now);
        self.process(dt)
    }

    /// Drop `node` and its subtree. Returns how many nodes went away.
    pub fn remove_node(&mut self, node: NodeId) -> Result<usize, RenderError> {
        if node == self.root {
            return Err(RenderError::RootRemoval {
                graph: self.name.clone(),
            });
        }
        if self.node(node).is_none() {
            return Err(self.not_found(node));
        }
        let removed = node.descendants(&self.arena).count();
        node.remove_subtree(&mut self.arena);
        log::debug!("`{}`: removed {} node(s)", self.name, removed);
        Ok(removed)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.arena
            .get(id)
            .filter(|n| !n.is_removed())
            .map(indextree::Node::get)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.arena
            .get_mut(id)
            .filter(|n| !n.is_removed())
            .map(indextree::Node::get_mut)
    }

    fn node_entry(&mut self, id: NodeId) -> Result<&mut SceneNode, RenderError> {
        let err = self.not_found(id);
        self.node_mut(id).ok_or(err)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena
            .get(id)
            .filter(|n| !n.is_removed())
            .and_then(indextree::Node::parent)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        if self.node(id).is_none() {
            return Vec::new();
        }
        id.children(&self.arena).collect()
    }

    /// Nodes reachable from the root, parents before children.
    pub fn pre_order(&self) -> Vec<NodeId> {
        self.root.descendants(&self.arena).collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.root
            .descendants(&self.arena)
            .find(|id| self.arena[*id].get().name == name)
    }

    /// Number of nodes in the tree, root included.
    pub fn len(&self) -> usize {
        self.root.descendants(&self.arena).count()
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).is_some() && id.ancestors(&self.arena).any(|a| a == self.root)
    }

    fn not_found(&self, id: NodeId) -> RenderError {
        RenderError::NodeNotFound {
            graph: self.name.clone(),
            node: format!("{id:?}"),
        }
    }

    fn already_attached(&self, id: NodeId) -> RenderError {
        RenderError::NodeAlreadyAttached {
            graph: self.name.clone(),
            node: self
                .node(id)
                .map(|n| n.name().to_string())
                .unwrap_or_else(|| format!("{id:?}")),
        }
    }
}

impl fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneGraph")
            .field("name", &self.name)
            .field("nodes", &self.len())
            .finish()
    }
}
