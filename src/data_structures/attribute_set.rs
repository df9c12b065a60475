//! Geometry units: attribute channels, an optional index buffer and a draw mode.
//!
//! An [`AttributeSet`] is what a geometry drawable hands to a backend. It owns
//! any number of channels with different element types (through
//! [`AnyAttributeBuffer`]) and, if it was created as indexed, exactly one live
//! index buffer of 8, 16 or 32 bit width.

use std::{cell::RefCell, rc::Rc};

use crate::{
    data_structures::attribute::{AnyAttributeBuffer, AttributeBuffer, AttributeRole, Scalar},
    device::{BufferHandle, BufferUsage, DeviceBuffer, DisplayDevice},
    error::RenderError,
};

/// Shared handle to a typed channel; keep it to update the channel later.
pub type AttributeHandle<T> = Rc<RefCell<AttributeBuffer<T>>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl DrawMode {
    /// wgpu has no loops or fans; those need to be converted first.
    pub fn to_wgpu(self) -> Option<wgpu::PrimitiveTopology> {
        match self {
            DrawMode::Points => Some(wgpu::PrimitiveTopology::PointList),
            DrawMode::Lines => Some(wgpu::PrimitiveTopology::LineList),
            DrawMode::LineStrip => Some(wgpu::PrimitiveTopology::LineStrip),
            DrawMode::Triangles => Some(wgpu::PrimitiveTopology::TriangleList),
            DrawMode::TriangleStrip => Some(wgpu::PrimitiveTopology::TriangleStrip),
            DrawMode::LineLoop | DrawMode::TriangleFan => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    /// Width of one index in bytes.
    pub fn width(&self) -> usize {
        match self {
            IndexBuffer::U8(_) => 1,
            IndexBuffer::U16(_) => 2,
            IndexBuffer::U32(_) => 4,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U8(v) => v.len(),
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexBuffer::U8(v) => v,
            IndexBuffer::U16(v) => bytemuck::cast_slice(v),
            IndexBuffer::U32(v) => bytemuck::cast_slice(v),
        }
    }

    /// wgpu has no 8 bit indices.
    pub fn index_format(&self) -> Option<wgpu::IndexFormat> {
        match self {
            IndexBuffer::U8(_) => None,
            IndexBuffer::U16(_) => Some(wgpu::IndexFormat::Uint16),
            IndexBuffer::U32(_) => Some(wgpu::IndexFormat::Uint32),
        }
    }
}

/// A vertex buffer layout that owns its attributes, see [`Self::as_wgpu`].
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedVertexLayout {
    pub array_stride: wgpu::BufferAddress,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl OwnedVertexLayout {
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

struct Indices {
    data: IndexBuffer,
    storage: Option<DeviceBuffer>,
}

pub struct AttributeSet {
    attributes: Vec<Rc<RefCell<dyn AnyAttributeBuffer>>>,
    indices: Option<Indices>,
    draw_mode: DrawMode,
    hardware_hint: bool,
    indexed: bool,
    instanced: bool,
    device: Option<Rc<dyn DisplayDevice>>,
}

impl AttributeSet {
    pub fn new(draw_mode: DrawMode, hardware_hint: bool, indexed: bool, instanced: bool) -> Self {
        Self {
            attributes: Vec::new(),
            indices: None,
            draw_mode,
            hardware_hint,
            indexed,
            instanced,
            device: None,
        }
    }

    /// Create and register a new channel.
    ///
    /// If the set is already bound to a device the channel is bound right away.
    pub fn add_attribute_description<T: Scalar>(
        &mut self,
        role: AttributeRole,
        count: u32,
        normalized: bool,
        stride: u32,
        offset: u32,
        divisor: u32,
    ) -> Result<AttributeHandle<T>, RenderError> {
        let label = format!("attribute {} ({:?})", self.attributes.len(), role);
        let buffer = Rc::new(RefCell::new(AttributeBuffer::<T>::new(
            &label, role, count, normalized, stride, offset, divisor,
        )));
        if let Some(device) = &self.device {
            buffer.borrow_mut().bind(device)?;
        }
        self.attributes.push(buffer.clone());
        Ok(buffer)
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    pub fn set_draw_mode(&mut self, draw_mode: DrawMode) {
        self.draw_mode = draw_mode;
    }

    pub fn hardware_hint(&self) -> bool {
        self.hardware_hint
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_instanced(&self) -> bool {
        self.instanced
    }

    pub fn attributes(&self) -> &[Rc<RefCell<dyn AnyAttributeBuffer>>] {
        &self.attributes
    }

    pub fn update_indices_u8(&mut self, indices: &[u8]) -> Result<(), RenderError> {
        self.replace_indices(IndexBuffer::U8(indices.to_vec()))
    }

    pub fn update_indices_u16(&mut self, indices: &[u16]) -> Result<(), RenderError> {
        self.replace_indices(IndexBuffer::U16(indices.to_vec()))
    }

    pub fn update_indices_u32(&mut self, indices: &[u32]) -> Result<(), RenderError> {
        self.replace_indices(IndexBuffer::U32(indices.to_vec()))
    }

    pub fn indices(&self) -> Option<&IndexBuffer> {
        self.indices.as_ref().map(|i| &i.data)
    }

    pub fn index_width(&self) -> Option<usize> {
        self.indices().map(IndexBuffer::width)
    }

    pub fn index_handle(&self) -> Option<BufferHandle> {
        self.indices
            .as_ref()
            .and_then(|i| i.storage.as_ref())
            .map(DeviceBuffer::handle)
    }

    fn replace_indices(&mut self, data: IndexBuffer) -> Result<(), RenderError> {
        if !self.indexed {
            return Err(RenderError::NotIndexed);
        }
        if let Some(current) = self
            .indices
            .as_mut()
            .filter(|current| current.data.width() == data.width())
        {
            if let Some(storage) = &mut current.storage {
                storage.upload(data.as_bytes())?;
            }
            current.data = data;
            return Ok(());
        }
        // a different width replaces the index buffer entirely
        let storage = match &self.device {
            Some(device) => Some(DeviceBuffer::with_contents(
                device,
                "indices",
                BufferUsage::Index,
                data.as_bytes(),
            )?),
            None => None,
        };
        self.indices = Some(Indices { data, storage });
        Ok(())
    }

    /// Number of vertices, taken from the shortest per-vertex channel.
    pub fn vertex_count(&self) -> usize {
        self.count_where(|divisor| divisor == 0)
    }

    /// Number of instances the per-instance channels provide data for.
    pub fn instance_count(&self) -> usize {
        if !self.instanced {
            return 1;
        }
        self.attributes
            .iter()
            .filter_map(|a| {
                let a = a.borrow();
                let desc = a.descriptor();
                let divisor = desc.divisor() as usize;
                let per_instance = desc.scalars_per_vertex() as usize;
                (divisor > 0).then(|| a.element_count() / per_instance * divisor)
            })
            .min()
            .unwrap_or(1)
    }

    fn count_where(&self, keep: impl Fn(u32) -> bool) -> usize {
        self.attributes
            .iter()
            .filter_map(|a| {
                let a = a.borrow();
                let desc = a.descriptor();
                let per_vertex = desc.scalars_per_vertex() as usize;
                keep(desc.divisor()).then(|| a.element_count() / per_vertex)
            })
            .min()
            .unwrap_or(0)
    }

    /// One wgpu layout per channel. Channels wgpu cannot express are skipped
    /// with a warning.
    pub fn vertex_layouts(&self) -> Vec<OwnedVertexLayout> {
        self.attributes
            .iter()
            .enumerate()
            .filter_map(|(location, attribute)| {
                let attribute = attribute.borrow();
                let desc = attribute.descriptor();
                let Some(format) = desc.vertex_format() else {
                    log::warn!(
                        "`{}` ({:?} x{}) has no wgpu vertex format",
                        attribute.label(),
                        desc.scalar_type(),
                        desc.count()
                    );
                    return None;
                };
                Some(OwnedVertexLayout {
                    array_stride: desc.effective_stride() as wgpu::BufferAddress,
                    step_mode: if desc.is_instanced() {
                        wgpu::VertexStepMode::Instance
                    } else {
                        wgpu::VertexStepMode::Vertex
                    },
                    attributes: vec![wgpu::VertexAttribute {
                        format,
                        offset: desc.offset() as wgpu::BufferAddress,
                        shader_location: location as u32,
                    }],
                })
            })
            .collect()
    }

    /// Upload every channel and the index buffer to `device`.
    ///
    /// Returns the handles in channel order followed by the index buffer.
    pub fn bind(&mut self, device: &Rc<dyn DisplayDevice>) -> Result<Vec<BufferHandle>, RenderError> {
        let mut handles = Vec::with_capacity(self.attributes.len() + 1);
        for attribute in &self.attributes {
            handles.push(attribute.borrow_mut().bind(device)?);
        }
        if let Some(indices) = &mut self.indices {
            if indices.storage.is_none() {
                indices.storage = Some(DeviceBuffer::with_contents(
                    device,
                    "indices",
                    BufferUsage::Index,
                    indices.data.as_bytes(),
                )?);
            }
        }
        handles.extend(self.index_handle());
        self.device = Some(Rc::clone(device));
        Ok(handles)
    }
}
