//! Declarative scene construction.
//!
//! A [`SceneDescription`] lists nodes in creation order. Each node names its
//! parent (an earlier node, or the root when omitted) and may carry a camera,
//! a render target, lights and objects. Objects are created through the
//! context's object registry, so anything registered there can be used.
//!
//! ```toml
//! name = "main"
//!
//! [[nodes]]
//! name = "world"
//! kind = "rotating"
//! data = { speed = 30.0 }
//! camera = "eye"
//!
//! [[nodes.lights]]
//! slot = 0
//! name = "sun"
//! kind = "directional"
//!
//! [[nodes]]
//! name = "hud"
//! parent = "world"
//!
//! [[nodes.objects]]
//! kind = "vector"
//! data = { name = "overlay", backend = "opengl", width = 128, height = 64 }
//! ```

use std::{collections::HashMap, path::Path, rc::Rc};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::{
    context::Context,
    data_structures::scene_graph::{NodeData, SceneGraph},
    error::RenderError,
    objects::{
        camera::Camera,
        light::{Light, LightKind, LightProperties},
        render_target::RenderTarget,
    },
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    pub parent: Option<String>,
    #[serde(default)]
    pub data: NodeData,
    pub camera: Option<String>,
    pub render_target: Option<RenderTargetDescription>,
    #[serde(default)]
    pub lights: Vec<LightDescription>,
    #[serde(default)]
    pub objects: Vec<ObjectDescription>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderTargetDescription {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub clear_colour: Option<[f64; 4]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKindDescription {
    Directional,
    Point,
    Spot,
}

impl From<LightKindDescription> for LightKind {
    fn from(kind: LightKindDescription) -> Self {
        match kind {
            LightKindDescription::Directional => LightKind::Directional,
            LightKindDescription::Point => LightKind::Point,
            LightKindDescription::Spot => LightKind::Spot,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightDescription {
    pub slot: u32,
    pub name: String,
    pub kind: Option<LightKindDescription>,
    pub position: Option<[f32; 3]>,
    pub color: Option<[f32; 3]>,
    pub intensity: Option<f32>,
}

impl LightDescription {
    fn properties(&self) -> LightProperties {
        let defaults = LightProperties::default();
        LightProperties {
            kind: self.kind.map(LightKind::from).unwrap_or(defaults.kind),
            position: self.position.unwrap_or(defaults.position),
            color: self.color.unwrap_or(defaults.color),
            intensity: self.intensity.unwrap_or(defaults.intensity),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescription {
    pub kind: String,
    #[serde(default)]
    pub data: NodeData,
}

impl SceneDescription {
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("failed to parse scene description")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scene description {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("in scene description {}", path.display()))
    }

    /// Create the graph and everything in it.
    ///
    /// Cameras, lights, render targets and objects are attached as they are
    /// met, so `ctx` needs a current display device unless the description
    /// only contains bare nodes.
    pub fn build(&self, ctx: &Rc<Context>) -> Result<SceneGraph, RenderError> {
        let mut graph = SceneGraph::new(&self.name, Rc::clone(ctx));
        let mut by_name = HashMap::new();
        for node in &self.nodes {
            let parent = match node.parent.as_deref() {
                None => None,
                Some(parent) => Some(*by_name.get(parent).ok_or_else(|| {
                    RenderError::ParentNotFound {
                        graph: self.name.clone(),
                        parent: parent.to_string(),
                    }
                })?),
            };
            let id = graph.create_node(&node.kind, &node.named_data())?;
            graph.attach_node(parent, id)?;

            if let Some(camera) = &node.camera {
                graph.attach_camera(id, Rc::new(Camera::new(camera)))?;
            }
            if let Some(target) = &node.render_target {
                let clear_colour = target.clear_colour.unwrap_or(ctx.config().clear_colour);
                graph.attach_render_target(
                    id,
                    Rc::new(RenderTarget::new(&target.name, target.width, target.height, clear_colour)),
                )?;
            }
            for light in &node.lights {
                graph.attach_light(id, light.slot, Rc::new(Light::new(&light.name, light.properties())))?;
            }
            for object in &node.objects {
                let object = ctx.create_object(&object.kind, &object.data)?;
                graph.attach_object(id, object)?;
            }
            if by_name.insert(node.name.clone(), id).is_some() {
                log::warn!(
                    "`{}`: node name `{}` used twice, children resolve to the later one",
                    self.name,
                    node.name
                );
            }
        }
        log::info!("built scene `{}` with {} node(s)", self.name, graph.len());
        Ok(graph)
    }
}

impl NodeDescription {
    fn named_data(&self) -> NodeData {
        let mut data = match &self.data {
            NodeData::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        data.insert("name".to_string(), NodeData::String(self.name.clone()));
        NodeData::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_tables() {
        let description = SceneDescription::from_toml_str(
            r#"
            name = "main"

            [[nodes]]
            name = "world"
            kind = "rotating"
            data = { speed = 30.0 }

            [[nodes.lights]]
            slot = 2
            name = "sun"
            kind = "directional"

            [[nodes]]
            name = "hud"
            parent = "world"

            [[nodes.objects]]
            kind = "vector"
            data = { name = "overlay", width = 32, height = 16 }
            "#,
        )
        .unwrap();

        assert_eq!(description.nodes.len(), 2);
        assert_eq!(description.nodes[0].data["speed"], 30.0);
        assert_eq!(description.nodes[0].lights[0].kind, Some(LightKindDescription::Directional));
        assert_eq!(description.nodes[1].parent.as_deref(), Some("world"));
        assert_eq!(description.nodes[1].objects[0].data["width"], 32);
        assert!(description.nodes[1].data.is_null());
    }

    #[test]
    fn node_name_is_merged_into_data() {
        let node = NodeDescription {
            name: "a".to_string(),
            data: serde_json::json!({ "speed": 1 }),
            ..Default::default()
        };
        assert_eq!(node.named_data(), serde_json::json!({ "speed": 1, "name": "a" }));
    }
}
