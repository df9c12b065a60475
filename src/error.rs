//! Errors raised by the scene graph, attribute buffers and the attach protocol.
//!
//! Every variant is a precondition violation: it means the caller wired the
//! scene up incorrectly, not that something transient went wrong. Nothing in
//! this crate retries; callers are expected to abort the current path with `?`.

use crate::device::DeviceId;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("parent node `{parent}` is not part of scene graph `{graph}`")]
    ParentNotFound { graph: String, parent: String },

    #[error("node {node} is not in the tree of scene graph `{graph}`")]
    NodeNotFound { graph: String, node: String },

    #[error("the root of scene graph `{graph}` cannot be removed")]
    RootRemoval { graph: String },

    #[error("node `{node}` already has a parent in scene graph `{graph}`")]
    NodeAlreadyAttached { graph: String, node: String },

    #[error("no node kind named `{kind}` has been registered")]
    UnknownNodeKind { kind: String },

    #[error("no object kind named `{kind}` has been registered")]
    UnknownObjectKind { kind: String },

    #[error("invalid data for `{kind}`: {reason}")]
    InvalidNodeData { kind: String, reason: String },

    #[error("index update on attribute set that was created with indexed = false")]
    NotIndexed,

    #[error("sub-range update at byte offset {offset} before `{buffer}` was uploaded to a device")]
    BufferNotAllocated { buffer: String, offset: usize },

    #[error(
        "update of `{buffer}` at byte offset {offset} with {size} bytes exceeds the {allocated} bytes allocated"
    )]
    RangeOutOfBounds {
        buffer: String,
        offset: usize,
        size: usize,
        allocated: usize,
    },

    #[error("no current display device is set, cannot attach `{object}`")]
    NoCurrentDevice { object: String },

    #[error("`{object}` is already attached to device {attached}, refusing to attach to device {requested}")]
    DeviceMismatch {
        object: String,
        attached: DeviceId,
        requested: DeviceId,
    },

    #[error("`{object}` has not been attached to a display device")]
    NotAttached { object: String },

    #[error("unrecognized vector backend hint `{hint}`")]
    UnknownVectorBackend { hint: String },

    #[error("display device error: {0}")]
    Backend(String),
}
