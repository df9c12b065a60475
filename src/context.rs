//! The application-owned context every scene graph is built against.
//!
//! A [`Context`] holds the configuration, the current display device and the
//! three name-keyed registries: node kinds, object kinds and vector backends.
//! Registries are filled once at startup (the built-in entries are registered
//! by [`Context::new`]) and read whenever a graph, object or vector context is
//! constructed. Registering a name twice replaces the earlier entry.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use serde::Deserialize;

use crate::{
    config::RenderConfig,
    data_structures::scene_graph::{NodeBehaviour, NodeData, RotatingNode},
    device::DisplayDevice,
    error::RenderError,
    objects::{
        Renderable,
        vector::{RecordingBackend, TessellatingBackend, VectorBackend, VectorContext},
    },
};

pub type NodeFactory = Rc<dyn Fn(&NodeData) -> Result<Box<dyn NodeBehaviour>, RenderError>>;
pub type ObjectFactory = Rc<dyn Fn(&Context, &NodeData) -> Result<Rc<dyn Renderable>, RenderError>>;
pub type VectorBackendFactory = Rc<dyn Fn(u32, u32) -> Result<Box<dyn VectorBackend>, RenderError>>;

pub struct Context {
    config: RenderConfig,
    device: RefCell<Option<Rc<dyn DisplayDevice>>>,
    node_kinds: RefCell<HashMap<String, NodeFactory>>,
    object_kinds: RefCell<HashMap<String, ObjectFactory>>,
    vector_backends: RefCell<HashMap<String, VectorBackendFactory>>,
}

fn register<F: ?Sized>(registry: &RefCell<HashMap<String, Rc<F>>>, what: &str, name: &str, factory: Rc<F>) {
    if registry
        .borrow_mut()
        .insert(name.to_string(), factory)
        .is_some()
    {
        log::warn!("{} `{}` registered twice, the last registration wins", what, name);
    }
}

fn names<F: ?Sized>(registry: &RefCell<HashMap<String, Rc<F>>>) -> Vec<String> {
    let mut names: Vec<String> = registry.borrow().keys().cloned().collect();
    names.sort();
    names
}

#[derive(Deserialize)]
struct VectorObjectData {
    name: Option<String>,
    backend: Option<String>,
    #[serde(default = "default_extent")]
    width: u32,
    #[serde(default = "default_extent")]
    height: u32,
    #[serde(default)]
    order: i32,
}

fn default_extent() -> u32 {
    256
}

impl Context {
    pub fn new(config: RenderConfig) -> Self {
        let ctx = Self {
            config,
            device: RefCell::new(None),
            node_kinds: RefCell::default(),
            object_kinds: RefCell::default(),
            vector_backends: RefCell::default(),
        };
        ctx.register_builtins();
        ctx
    }

    pub fn with_defaults() -> Self {
        Self::new(RenderConfig::default())
    }

    fn register_builtins(&self) {
        self.register_node_kind(RotatingNode::KIND, |data| {
            Ok(Box::new(RotatingNode::from_data(data)?))
        });
        self.register_object_kind("vector", |ctx, data| {
            let data = if data.is_null() {
                serde_json::json!({})
            } else {
                data.clone()
            };
            let data: VectorObjectData =
                serde_json::from_value(data).map_err(|e| RenderError::InvalidNodeData {
                    kind: "vector".to_string(),
                    reason: e.to_string(),
                })?;
            let name = data.name.as_deref().unwrap_or("vector");
            let context =
                ctx.create_vector_context(name, data.backend.as_deref(), data.width, data.height)?;
            context.set_order(data.order);
            Ok(Rc::new(context))
        });
        self.register_vector_backend("cairo", |width, height| {
            Ok(Box::new(RecordingBackend::new(width, height)))
        });
        self.register_vector_backend("opengl", |_, _| Ok(Box::new(TessellatingBackend::new(false)?)));
        self.register_vector_backend("opengl-fixed", |_, _| {
            Ok(Box::new(TessellatingBackend::new(true)?))
        });
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Install `device` as the target of every following attach.
    /// Returns the device it replaced.
    pub fn set_current_device(&self, device: Rc<dyn DisplayDevice>) -> Option<Rc<dyn DisplayDevice>> {
        log::info!("current display device is now `{}` ({})", device.name(), device.id());
        self.device.borrow_mut().replace(device)
    }

    pub fn clear_current_device(&self) -> Option<Rc<dyn DisplayDevice>> {
        self.device.borrow_mut().take()
    }

    pub fn current_device(&self) -> Option<Rc<dyn DisplayDevice>> {
        self.device.borrow().clone()
    }

    /// The current device, or [`RenderError::NoCurrentDevice`] naming `object`.
    pub fn require_device(&self, object: &str) -> Result<Rc<dyn DisplayDevice>, RenderError> {
        self.current_device()
            .ok_or_else(|| RenderError::NoCurrentDevice {
                object: object.to_string(),
            })
    }

    pub fn register_node_kind(
        &self,
        kind: &str,
        factory: impl Fn(&NodeData) -> Result<Box<dyn NodeBehaviour>, RenderError> + 'static,
    ) {
        let factory: NodeFactory = Rc::new(factory);
        register(&self.node_kinds, "node kind", kind, factory);
    }

    pub fn node_kinds(&self) -> Vec<String> {
        names(&self.node_kinds)
    }

    pub fn create_node_behaviour(
        &self,
        kind: &str,
        data: &NodeData,
    ) -> Result<Box<dyn NodeBehaviour>, RenderError> {
        // cloned out so factories may use the context themselves
        let factory = self.node_kinds.borrow().get(kind).cloned();
        let factory = factory.ok_or_else(|| RenderError::UnknownNodeKind {
            kind: kind.to_string(),
        })?;
        factory(data)
    }

    pub fn register_object_kind(
        &self,
        kind: &str,
        factory: impl Fn(&Context, &NodeData) -> Result<Rc<dyn Renderable>, RenderError> + 'static,
    ) {
        let factory: ObjectFactory = Rc::new(factory);
        register(&self.object_kinds, "object kind", kind, factory);
    }

    pub fn object_kinds(&self) -> Vec<String> {
        names(&self.object_kinds)
    }

    pub fn create_object(&self, kind: &str, data: &NodeData) -> Result<Rc<dyn Renderable>, RenderError> {
        let factory = self.object_kinds.borrow().get(kind).cloned();
        let factory = factory.ok_or_else(|| RenderError::UnknownObjectKind {
            kind: kind.to_string(),
        })?;
        factory(self, data)
    }

    pub fn register_vector_backend(
        &self,
        hint: &str,
        factory: impl Fn(u32, u32) -> Result<Box<dyn VectorBackend>, RenderError> + 'static,
    ) {
        let factory: VectorBackendFactory = Rc::new(factory);
        register(&self.vector_backends, "vector backend", hint, factory);
    }

    pub fn vector_backends(&self) -> Vec<String> {
        names(&self.vector_backends)
    }

    pub fn create_vector_backend(
        &self,
        hint: &str,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VectorBackend>, RenderError> {
        let factory = self.vector_backends.borrow().get(hint).cloned();
        let factory = factory.ok_or_else(|| RenderError::UnknownVectorBackend {
            hint: hint.to_string(),
        })?;
        factory(width, height)
    }

    /// Create a vector context drawing through the backend named `hint`,
    /// falling back to the configured default backend.
    pub fn create_vector_context(
        &self,
        name: &str,
        hint: Option<&str>,
        width: u32,
        height: u32,
    ) -> Result<VectorContext, RenderError> {
        let hint = hint.unwrap_or(&self.config.vector_backend);
        let backend = self.create_vector_backend(hint, width, height)?;
        log::debug!("vector context `{}` uses the `{}` backend", name, backend.name());
        Ok(VectorContext::new(name, width, height, backend))
    }

    /// Set up `env_logger` with the configured filter, `RUST_LOG` wins.
    pub fn init_logging(&self) {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let env = env_logger::Env::default().default_filter_or(self.config.log_filter.as_str());
            if let Err(e) = env_logger::Builder::from_env(env).try_init() {
                println!("Warning: Could not initialize logger: {}", e);
            };
        }

        #[cfg(target_arch = "wasm32")]
        {
            if let Err(e) = console_log::init_with_level(log::Level::Info) {
                println!("Warning: Could not initialize logger: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_structures::scene_graph::PlainNode, device::HeadlessDevice};

    #[test]
    fn builtins_are_registered() {
        let ctx = Context::with_defaults();
        assert_eq!(ctx.node_kinds(), ["rotating"]);
        assert_eq!(ctx.object_kinds(), ["vector"]);
        assert_eq!(ctx.vector_backends(), ["cairo", "opengl", "opengl-fixed"]);
    }

    #[test]
    fn last_registration_wins() {
        let ctx = Context::with_defaults();
        ctx.register_node_kind("rotating", |_| Ok(Box::new(PlainNode)));
        let behaviour = ctx
            .create_node_behaviour("rotating", &serde_json::Value::Null)
            .unwrap();
        assert!(behaviour.as_any().is::<PlainNode>());
    }

    #[test]
    fn unknown_names_are_errors() {
        let ctx = Context::with_defaults();
        assert!(matches!(
            ctx.create_node_behaviour("spinning", &serde_json::Value::Null),
            Err(RenderError::UnknownNodeKind { .. })
        ));
        assert!(matches!(
            ctx.create_object("mesh", &serde_json::Value::Null),
            Err(RenderError::UnknownObjectKind { .. })
        ));
        assert!(matches!(
            ctx.create_vector_context("hud", Some("direct2d"), 4, 4),
            Err(RenderError::UnknownVectorBackend { hint }) if hint == "direct2d"
        ));
    }

    #[test]
    fn current_device_is_required() {
        let ctx = Context::with_defaults();
        assert!(matches!(
            ctx.require_device("camera"),
            Err(RenderError::NoCurrentDevice { object }) if object == "camera"
        ));
        let device = HeadlessDevice::shared("one");
        assert!(ctx.set_current_device(device.clone()).is_none());
        assert_eq!(ctx.require_device("camera").unwrap().id(), device.id());
    }

    #[test]
    fn vector_objects_default_to_configured_backend() {
        let ctx = Context::with_defaults();
        let object = ctx
            .create_object("vector", &serde_json::json!({ "name": "hud", "order": 3 }))
            .unwrap();
        let vector = object.as_any().downcast_ref::<VectorContext>().unwrap();
        assert_eq!(vector.backend_name(), "cairo");
        assert_eq!(vector.size(), (256, 256));
        assert_eq!(object.order(), 3);
    }
}
