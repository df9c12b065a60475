//! Runtime configuration.
//!
//! [`RenderConfig`] is read once at startup (usually from a TOML file) and
//! handed to [`Context::new`](crate::context::Context::new). All fields have
//! defaults so an empty file is a valid configuration.

use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::render::GEOMETRY_QUEUE;

/// How [`SceneNodeParams`](crate::data_structures::scene_graph::SceneNodeParams)
/// flow through a scene traversal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    /// Each node starts from its parent's parameters. Siblings never see each
    /// other's camera, lights or render target.
    #[default]
    Scoped,
    /// A single accumulator is threaded through the whole pre-order walk, so a
    /// camera set on one subtree stays active for every node visited after it.
    Accumulate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Backend hint used when a vector context is created without one.
    pub vector_backend: String,
    pub traversal: TraversalMode,
    /// Queue for scene objects that don't pick one explicitly.
    pub default_queue: u32,
    /// Clear colour for render targets created without an explicit colour.
    pub clear_colour: [f64; 4],
    /// Default hardware hint for new attribute sets.
    pub hardware_hint: bool,
    /// `env_logger` filter, ignored when `RUST_LOG` is set.
    pub log_filter: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vector_backend: "cairo".to_string(),
            traversal: TraversalMode::default(),
            default_queue: GEOMETRY_QUEUE,
            clear_colour: [0.0, 0.0, 0.0, 1.0],
            hardware_hint: true,
            log_filter: "info".to_string(),
        }
    }
}

impl RenderConfig {
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("failed to parse render configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read render configuration {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("in render configuration {}", path.display()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize render configuration")
    }
}
