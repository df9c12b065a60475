use std::{any::Any, cell::RefCell, rc::Rc};

use cgmath::{Matrix4, One};

use crate::{
    data_structures::scene_graph::SceneNodeParams,
    device::{BufferUsage, DeviceBuffer, DisplayDevice, DisplayDeviceDefinition},
    error::RenderError,
    objects::{Attachment, Renderable},
    render::BACKGROUND_QUEUE,
};

/// What ends up in the camera's uniform buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}

/// A camera node attachment.
///
/// View and projection matrices are computed by the caller; the camera only
/// stores them and keeps the device uniform up to date.
pub struct Camera {
    name: String,
    view: RefCell<Matrix4<f32>>,
    projection: RefCell<Matrix4<f32>>,
    params: RefCell<SceneNodeParams>,
    attachment: Attachment<DeviceBuffer>,
}

impl Camera {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            view: RefCell::new(Matrix4::one()),
            projection: RefCell::new(Matrix4::one()),
            params: RefCell::default(),
            attachment: Attachment::default(),
        }
    }

    pub fn view(&self) -> Matrix4<f32> {
        *self.view.borrow()
    }

    pub fn projection(&self) -> Matrix4<f32> {
        *self.projection.borrow()
    }

    pub fn uniform(&self) -> CameraUniform {
        let view = self.view();
        CameraUniform {
            view_proj: (self.projection() * view).into(),
            view: view.into(),
        }
    }

    /// Replace both matrices and re-upload if attached.
    pub fn set_view_projection(
        &self,
        view: Matrix4<f32>,
        projection: Matrix4<f32>,
    ) -> Result<(), RenderError> {
        *self.view.borrow_mut() = view;
        *self.projection.borrow_mut() = projection;
        let uniform = self.uniform();
        self.attachment
            .with_resources(|buffer| buffer.write(0, bytemuck::bytes_of(&uniform)))
            .unwrap_or(Ok(()))
    }
}

impl Renderable for Camera {
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
            let uniform = self.uniform();
            let buffer = DeviceBuffer::with_contents(
                device,
                &format!("{} Camera Buffer", self.name),
                BufferUsage::Uniform,
                bytemuck::bytes_of(&uniform),
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
