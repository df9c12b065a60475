//! Engine data structures: vertex attributes, transforms and scene graphs.
//!
//! - `attribute` holds typed vertex channels and their descriptors
//! - `attribute_set` groups channels and an index buffer into drawable geometry
//! - `instance` holds per-object transformation data
//! - `scene_graph` enables hierarchical scene organization
//! - `scene_description` builds scene graphs from TOML

pub mod attribute;
pub mod attribute_set;
pub mod instance;
pub mod scene_description;
pub mod scene_graph;
