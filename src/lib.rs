//! scene-ngin
//!
//! A display-backend-agnostic scene layer for flow-style engines. Drawables
//! are described abstractly, placed into a hierarchical scene graph and bound
//! to a concrete display device exactly once. Every frame the graph is walked
//! in pre-order and its objects are handed to a render manager, bucketed by
//! queue and sorted by order key.
//!
//! High-level modules
//! - `config`: runtime configuration loaded from TOML
//! - `context`: registries for node kinds, object kinds and vector backends plus the current display device
//! - `data_structures`: vertex attributes, attribute sets, transforms and the scene graph
//! - `device`: the display device contract, a headless device and a wgpu device
//! - `error`: the precondition errors every fallible call returns
//! - `objects`: cameras, lights, render targets, geometry and vector graphics contexts
//! - `render`: render queues
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod error;
pub mod objects;
pub mod render;

// Re-exports commonly used types for convenience in downstream code.
pub use config::{RenderConfig, TraversalMode};
pub use context::Context;
pub use data_structures::{
    attribute::{AttributeBuffer, AttributeDescriptor, AttributeRole, ScalarType},
    attribute_set::{AttributeSet, DrawMode, IndexBuffer},
    instance::Instance,
    scene_description::SceneDescription,
    scene_graph::{NodeBehaviour, NodeData, SceneGraph, SceneNode, SceneNodeParams},
};
pub use device::{DisplayDevice, DisplayDeviceDefinition, HeadlessDevice, gpu::WgpuDevice};
pub use error::RenderError;
pub use indextree::NodeId;
pub use objects::{
    Renderable,
    camera::Camera,
    light::{Light, LightKind, LightProperties},
    render_target::RenderTarget,
    scene_object::SceneObject,
    vector::{Pattern, VectorBackend, VectorContext},
};
pub use render::{RenderManager, RenderQueue};
pub use cgmath;
