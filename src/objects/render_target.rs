use std::{any::Any, cell::RefCell, rc::Rc};

use crate::{
    data_structures::scene_graph::SceneNodeParams,
    device::{
        DeviceFramebuffer, DeviceTexture, DisplayDevice, DisplayDeviceDefinition,
        TextureDescription, TextureFormat,
    },
    error::RenderError,
    objects::{Attachment, Renderable},
    render::BACKGROUND_QUEUE,
};

/// An off-screen destination a node's subtree renders into.
///
/// Attaching allocates a colour texture, a depth texture and a framebuffer.
/// The owning node clears it every time the node is rendered.
pub struct RenderTarget {
    name: String,
    width: u32,
    height: u32,
    clear_colour: RefCell<[f64; 4]>,
    params: RefCell<SceneNodeParams>,
    attachment: Attachment<DeviceFramebuffer>,
}

impl RenderTarget {
    pub fn new(name: &str, width: u32, height: u32, clear_colour: [f64; 4]) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            clear_colour: RefCell::new(clear_colour),
            params: RefCell::default(),
            attachment: Attachment::default(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn clear_colour(&self) -> [f64; 4] {
        *self.clear_colour.borrow()
    }

    pub fn set_clear_colour(&self, colour: [f64; 4]) {
        *self.clear_colour.borrow_mut() = colour;
    }

    pub fn clear(&self) -> Result<(), RenderError> {
        let colour = self.clear_colour();
        self.attachment
            .with_resources(|framebuffer| framebuffer.clear(colour))
            .ok_or_else(|| RenderError::NotAttached {
                object: self.name.clone(),
            })?
    }
}

impl Renderable for RenderTarget {
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
            let colour = DeviceTexture::new(
                device,
                &TextureDescription {
                    label: format!("{} colour", self.name),
                    width: self.width,
                    height: self.height,
                    format: TextureFormat::Rgba8,
                },
            )?;
            let depth = DeviceTexture::new(
                device,
                &TextureDescription {
                    label: format!("{} depth", self.name),
                    width: self.width,
                    height: self.height,
                    format: TextureFormat::Depth32Float,
                },
            )?;
            let framebuffer = DeviceFramebuffer::new(device, colour, Some(depth))?;
            let definition = DisplayDeviceDefinition {
                device: device.id(),
                buffers: Vec::new(),
                textures: framebuffer.textures().collect(),
                framebuffer: Some(framebuffer.handle()),
            };
            Ok((definition, framebuffer))
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
