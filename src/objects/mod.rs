//! Things that can be attached to scene nodes and queued for rendering.
//!
//! Every drawable kind implements [`Renderable`]: it belongs to a render queue,
//! has an order key inside that queue, and acquires backend resources through
//! [`Renderable::attach`]. Objects are shared between nodes via `Rc`, so all
//! mutation after construction goes through interior mutability.
//!
//! # Attach protocol
//!
//! An object starts unattached. The first `attach(device)` allocates its
//! resources and stores the resulting [`DisplayDeviceDefinition`]. Attaching to
//! the same device again returns the stored definition without allocating;
//! attaching to a different device fails with
//! [`RenderError::DeviceMismatch`]. Resources are released when the object is
//! dropped.

use std::{any::Any, cell::RefCell, rc::Rc};

use crate::{
    data_structures::scene_graph::SceneNodeParams,
    device::{DeviceId, DisplayDevice, DisplayDeviceDefinition},
    error::RenderError,
};

pub mod camera;
pub mod light;
pub mod render_target;
pub mod scene_object;
pub mod vector;

pub trait Renderable {
    fn name(&self) -> &str;

    /// Which render bucket the object goes into.
    fn queue(&self) -> u32;

    /// Sort key inside the queue.
    fn order(&self) -> i32;

    fn attach(&self, device: &Rc<dyn DisplayDevice>) -> Result<DisplayDeviceDefinition, RenderError>;

    /// The definition stored by the first successful attach.
    fn definition(&self) -> Option<DisplayDeviceDefinition>;

    /// Called by the traversal right before the object is queued.
    fn set_scene_params(&self, params: &SceneNodeParams);

    fn scene_params(&self) -> SceneNodeParams;

    fn as_any(&self) -> &dyn Any;
}

struct Bound<R> {
    device: Rc<dyn DisplayDevice>,
    definition: DisplayDeviceDefinition,
    resources: R,
}

/// Attach state shared by all renderable kinds; `R` holds whatever backend
/// resources the kind owns once attached.
pub struct Attachment<R> {
    bound: RefCell<Option<Bound<R>>>,
}

impl<R> Default for Attachment<R> {
    fn default() -> Self {
        Self {
            bound: RefCell::new(None),
        }
    }
}

impl<R> Attachment<R> {
    /// Run `acquire` on the first attach to `device`, return the stored
    /// definition on every later attach to the same device.
    pub fn attach_with(
        &self,
        owner: &str,
        device: &Rc<dyn DisplayDevice>,
        acquire: impl FnOnce(&Rc<dyn DisplayDevice>) -> Result<(DisplayDeviceDefinition, R), RenderError>,
    ) -> Result<DisplayDeviceDefinition, RenderError> {
        if let Some(bound) = self.bound.borrow().as_ref() {
            let attached = bound.device.id();
            if attached != device.id() {
                return Err(RenderError::DeviceMismatch {
                    object: owner.to_string(),
                    attached,
                    requested: device.id(),
                });
            }
            return Ok(bound.definition.clone());
        }
        let (definition, resources) = acquire(device)?;
        log::debug!("attached `{}` to {}", owner, device.name());
        *self.bound.borrow_mut() = Some(Bound {
            device: Rc::clone(device),
            definition: definition.clone(),
            resources,
        });
        Ok(definition)
    }

    pub fn definition(&self) -> Option<DisplayDeviceDefinition> {
        self.bound.borrow().as_ref().map(|b| b.definition.clone())
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        self.bound.borrow().as_ref().map(|b| b.device.id())
    }

    pub fn is_attached(&self) -> bool {
        self.bound.borrow().is_some()
    }

    /// Access the resources if attached.
    pub fn with_resources<T>(&self, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.bound
            .borrow_mut()
            .as_mut()
            .map(|bound| f(&mut bound.resources))
    }
}
