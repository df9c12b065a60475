use std::{any::Any, cell::RefCell, rc::Rc};

use crate::{
    data_structures::scene_graph::SceneNodeParams,
    device::{BufferUsage, DeviceBuffer, DisplayDevice, DisplayDeviceDefinition},
    error::RenderError,
    objects::{Attachment, Renderable},
    render::BACKGROUND_QUEUE,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

impl LightKind {
    fn as_raw(self) -> u32 {
        match self {
            LightKind::Directional => 0,
            LightKind::Point => 1,
            LightKind::Spot => 2,
        }
    }
}

// position + kind and colour + intensity are 16 bytes each, no padding needed
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    position: [f32; 3],
    kind: u32,
    color: [f32; 3],
    intensity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightProperties {
    pub kind: LightKind,
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Default for LightProperties {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            position: [8.0, 80.0, 50.0],
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
        }
    }
}

/// A light that can be placed into a node's light slots.
pub struct Light {
    name: String,
    properties: RefCell<LightProperties>,
    params: RefCell<SceneNodeParams>,
    attachment: Attachment<DeviceBuffer>,
}

impl Light {
    pub fn new(name: &str, properties: LightProperties) -> Self {
        Self {
            name: name.to_string(),
            properties: RefCell::new(properties),
            params: RefCell::default(),
            attachment: Attachment::default(),
        }
    }

    pub fn properties(&self) -> LightProperties {
        *self.properties.borrow()
    }

    pub fn uniform(&self) -> LightUniform {
        let p = self.properties();
        LightUniform {
            position: p.position,
            kind: p.kind.as_raw(),
            color: p.color,
            intensity: p.intensity,
        }
    }

    pub fn set_properties(&self, properties: LightProperties) -> Result<(), RenderError> {
        *self.properties.borrow_mut() = properties;
        let uniform = self.uniform();
        self.attachment
            .with_resources(|buffer| buffer.write(0, bytemuck::bytes_of(&uniform)))
            .unwrap_or(Ok(()))
    }
}

impl Renderable for Light {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue(&self) -> u32 {
        BACKGROUND_QUEUE
    }

    fn order(&self) -> i32 {
        0
    }

    fn attach(&self, device: &Rc<dyn DisplayDevice>) -> Result<DisplayDeviceDefinition, RenderError> {
        self.attachment.attach_with(&self.name, device, |device| {
            let buffer = DeviceBuffer::with_contents(
                device,
                &format!("{} Light Buffer", self.name),
                BufferUsage::Uniform,
                bytemuck::bytes_of(&self.uniform()),
            )?;
            let definition = DisplayDeviceDefinition::new(device.id()).with_buffer(buffer.handle());
            Ok((definition, buffer))
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
