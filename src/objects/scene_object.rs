use std::{
    any::Any,
    cell::{Cell, Ref, RefCell, RefMut},
    rc::Rc,
};

use crate::{
    data_structures::{
        attribute_set::AttributeSet, instance::Instance, scene_graph::SceneNodeParams,
    },
    device::{BufferUsage, DeviceBuffer, DisplayDevice, DisplayDeviceDefinition},
    error::RenderError,
    objects::{Attachment, Renderable},
};

/// A piece of geometry placed in the scene.
///
/// Attaching binds the geometry's channels and index buffer and allocates a
/// uniform holding the object's transform. The definition is a snapshot of
/// the handles at attach time; a channel that later grows past its allocation
/// gets a fresh handle that can be read from the [`AttributeSet`].
pub struct SceneObject {
    name: String,
    queue: u32,
    order: Cell<i32>,
    geometry: RefCell<AttributeSet>,
    transform: RefCell<Instance>,
    params: RefCell<SceneNodeParams>,
    attachment: Attachment<DeviceBuffer>,
}

impl SceneObject {
    pub fn new(name: &str, queue: u32, geometry: AttributeSet) -> Self {
        Self {
            name: name.to_string(),
            queue,
            order: Cell::new(0),
            geometry: RefCell::new(geometry),
            transform: RefCell::new(Instance::new()),
            params: RefCell::default(),
            attachment: Attachment::default(),
        }
    }

    pub fn with_order(self, order: i32) -> Self {
        self.order.set(order);
        self
    }

    pub fn set_order(&self, order: i32) {
        self.order.set(order);
    }

    pub fn geometry(&self) -> Ref<'_, AttributeSet> {
        self.geometry.borrow()
    }

    pub fn geometry_mut(&self) -> RefMut<'_, AttributeSet> {
        self.geometry.borrow_mut()
    }

    pub fn transform(&self) -> Instance {
        *self.transform.borrow()
    }

    pub fn set_transform(&self, transform: Instance) -> Result<(), RenderError> {
        *self.transform.borrow_mut() = transform;
        self.upload_transform()
    }

    pub fn update_transform(&self, mutation: impl FnOnce(&mut Instance)) -> Result<(), RenderError> {
        mutation(&mut self.transform.borrow_mut());
        self.upload_transform()
    }

    fn upload_transform(&self) -> Result<(), RenderError> {
        let raw = self.transform().to_raw();
        self.attachment
            .with_resources(|buffer| buffer.write(0, bytemuck::bytes_of(&raw)))
            .unwrap_or(Ok(()))
    }
}

impl Renderable for SceneObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue(&self) -> u32 {
        self.queue
    }

    fn order(&self) -> i32 {
        self.order.get()
    }

    fn attach(&self, device: &Rc<dyn DisplayDevice>) -> Result<DisplayDeviceDefinition, RenderError> {
        self.attachment.attach_with(&self.name, device, |device| {
            let geometry = self.geometry.borrow_mut().bind(device)?;
            let uniform = DeviceBuffer::with_contents(
                device,
                &format!("{} Instance Buffer", self.name),
                BufferUsage::Uniform,
                bytemuck::bytes_of(&self.transform().to_raw()),
            )?;
            let definition = DisplayDeviceDefinition::new(device.id())
                .with_buffers(geometry)
                .with_buffer(uniform.handle());
            Ok((definition, uniform))
        })
    }

    fn definition(&self) -> Option<DisplayDeviceDefinition> {
        self.attachment.definition()
    }

    fn set_scene_params(&self, params: &SceneNodeParams) {
        *self.params.borrow_mut() = params.clone();
    }

    fn scene_params(&self) -> SceneNodeParams {
        self.params.borrow().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::{attribute::AttributeRole, attribute_set::DrawMode},
        device::HeadlessDevice,
        render::GEOMETRY_QUEUE,
    };

    fn triangle() -> SceneObject {
        let mut set = AttributeSet::new(DrawMode::Triangles, true, true, false);
        let positions = set
            .add_attribute_description::<f32>(AttributeRole::Position, 3, false, 0, 0, 0)
            .unwrap();
        positions
            .borrow_mut()
            .update(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
            .unwrap();
        set.update_indices_u16(&[0, 1, 2]).unwrap();
        SceneObject::new("triangle", GEOMETRY_QUEUE, set)
    }

    #[test]
    fn attach_twice_allocates_once() {
        let headless = HeadlessDevice::shared("test");
        let device: Rc<dyn DisplayDevice> = headless.clone();
        let object = triangle();

        let first = object.attach(&device).unwrap();
        let created = headless.stats().buffers_created;
        let second = object.attach(&device).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.buffers.len(), 3);
        assert_eq!(headless.stats().buffers_created, created);
    }

    #[test]
    fn transform_changes_reach_the_device() {
        let headless = HeadlessDevice::shared("test");
        let device: Rc<dyn DisplayDevice> = headless.clone();
        let object = triangle();
        let definition = object.attach(&device).unwrap();
        let uniform = *definition.buffers.last().unwrap();

        object
            .update_transform(|t| t.position = cgmath::Vector3::new(4.0, 5.0, 6.0))
            .unwrap();

        let bytes = headless.buffer_contents(uniform).unwrap();
        // column major, translation is the fourth column
        let translation: Vec<f32> = bytes[48..60]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(translation, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn dropping_releases_everything() {
        let headless = HeadlessDevice::shared("test");
        let device: Rc<dyn DisplayDevice> = headless.clone();
        let object = triangle();
        object.attach(&device).unwrap();
        assert_eq!(headless.stats().live_buffers(), 3);
        drop(object);
        assert_eq!(headless.stats().live_buffers(), 0);
    }
}
