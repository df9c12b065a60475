//! Hardware display device backed by wgpu.
//!
//! Handles given out by [`WgpuDevice`] index into tables of real wgpu objects.
//! Each buffer keeps a CPU shadow copy so that writes which are not aligned to
//! [`wgpu::COPY_BUFFER_ALIGNMENT`] can be widened before they reach the queue.

use std::{cell::RefCell, collections::HashMap};

use crate::{
    device::{
        BufferHandle, BufferUsage, DeviceId, DisplayDevice, FramebufferHandle, TextureDescription,
        TextureFormat, TextureHandle,
    },
    error::RenderError,
};

const ALIGN: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

fn align_down(value: usize) -> usize {
    value - value % ALIGN
}

fn align_up(value: usize) -> usize {
    value.div_ceil(ALIGN) * ALIGN
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    shadow: Vec<u8>,
}

struct GpuFramebuffer {
    colour: TextureHandle,
    depth: Option<TextureHandle>,
}

#[derive(Default)]
struct Tables {
    next_handle: u64,
    buffers: HashMap<BufferHandle, GpuBuffer>,
    textures: HashMap<TextureHandle, (wgpu::Texture, wgpu::TextureView)>,
    framebuffers: HashMap<FramebufferHandle, GpuFramebuffer>,
}

impl Tables {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

pub struct WgpuDevice {
    id: DeviceId,
    name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    tables: RefCell<Tables>,
}

impl WgpuDevice {
    /// Wrap a device and queue the application already owns.
    pub fn new(name: &str, device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            id: DeviceId::next(),
            name: name.to_string(),
            device,
            queue,
            tables: RefCell::new(Tables::default()),
        }
    }

    /// Request an adapter without a surface and open a device on it.
    pub async fn headless(name: &str) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("opening wgpu device on {:?}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(name),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                ..Default::default()
            })
            .await?;
        Ok(Self::new(name, device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Run `f` with the wgpu buffer behind `handle`, e.g. to bind it in a pass.
    pub fn with_buffer<R>(&self, handle: BufferHandle, f: impl FnOnce(&wgpu::Buffer) -> R) -> Option<R> {
        self.tables.borrow().buffers.get(&handle).map(|b| f(&b.buffer))
    }

    fn usages(usage: BufferUsage) -> wgpu::BufferUsages {
        let usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        usage | wgpu::BufferUsages::COPY_DST
    }

    fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }
}

impl DisplayDevice for WgpuDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn create_buffer(
        &self,
        label: &str,
        usage: BufferUsage,
        size: usize,
    ) -> Result<BufferHandle, RenderError> {
        // zero sized buffers can't be bound, keep at least one aligned word
        let padded = align_up(size.max(ALIGN));
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded as wgpu::BufferAddress,
            usage: Self::usages(usage),
            mapped_at_creation: false,
        });
        let mut tables = self.tables.borrow_mut();
        let handle = BufferHandle(tables.next_handle());
        tables.buffers.insert(
            handle,
            GpuBuffer {
                buffer,
                shadow: vec![0; padded],
            },
        );
        Ok(handle)
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), RenderError> {
        let mut tables = self.tables.borrow_mut();
        let Some(gpu) = tables.buffers.get_mut(&buffer) else {
            return Err(RenderError::Backend(format!(
                "{}: write to unknown buffer {:?}",
                self.name, buffer
            )));
        };
        let end = offset.saturating_add(bytes.len());
        if end > gpu.shadow.len() {
            return Err(RenderError::Backend(format!(
                "{}: write of {}..{} past the end of buffer {:?}",
                self.name, offset, end, buffer
            )));
        }
        gpu.shadow[offset..end].copy_from_slice(bytes);
        let start = align_down(offset);
        let end = align_up(end).min(gpu.shadow.len());
        if start < end {
            self.queue.write_buffer(
                &gpu.buffer,
                start as wgpu::BufferAddress,
                &gpu.shadow[start..end],
            );
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if let Some(gpu) = self.tables.borrow_mut().buffers.remove(&buffer) {
            gpu.buffer.destroy();
        }
    }

    fn create_texture(&self, desc: &TextureDescription) -> Result<TextureHandle, RenderError> {
        let format = Self::texture_format(desc.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut tables = self.tables.borrow_mut();
        let handle = TextureHandle(tables.next_handle());
        tables.textures.insert(handle, (texture, view));
        Ok(handle)
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        if let Some((texture, _)) = self.tables.borrow_mut().textures.remove(&texture) {
            texture.destroy();
        }
    }

    fn create_framebuffer(
        &self,
        colour: TextureHandle,
        depth: Option<TextureHandle>,
    ) -> Result<FramebufferHandle, RenderError> {
        let mut tables = self.tables.borrow_mut();
        if !tables.textures.contains_key(&colour) {
            return Err(RenderError::Backend(format!(
                "{}: framebuffer colour attachment {:?} does not exist",
                self.name, colour
            )));
        }
        let handle = FramebufferHandle(tables.next_handle());
        tables
            .framebuffers
            .insert(handle, GpuFramebuffer { colour, depth });
        Ok(handle)
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.tables.borrow_mut().framebuffers.remove(&framebuffer);
    }

    fn clear(&self, framebuffer: FramebufferHandle, colour: [f64; 4]) -> Result<(), RenderError> {
        let tables = self.tables.borrow();
        let fb = tables.framebuffers.get(&framebuffer).ok_or_else(|| {
            RenderError::Backend(format!(
                "{}: clear of unknown framebuffer {:?}",
                self.name, framebuffer
            ))
        })?;
        let view = |texture: TextureHandle| tables.textures.get(&texture).map(|(_, view)| view);
        let colour_view = view(fb.colour).ok_or_else(|| {
            RenderError::Backend(format!(
                "{}: colour attachment {:?} of framebuffer {:?} is gone",
                self.name, fb.colour, framebuffer
            ))
        })?;
        let depth_view = fb.depth.and_then(view);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear Encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: colour_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: colour[0],
                            g: colour[1],
                            b: colour[2],
                            a: colour[3],
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: depth_view.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                ..Default::default()
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
