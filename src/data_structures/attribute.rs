//! Typed vertex attribute channels.
//!
//! An [`AttributeBuffer<T>`] owns the CPU side of one vertex channel together
//! with the [`AttributeDescriptor`] that tells a backend how to read it. Once
//! bound to a [`DisplayDevice`] the buffer also owns a [`DeviceBuffer`] and
//! keeps it in sync on every update.
//!
//! # Update paths
//!
//! - [`AttributeBuffer::update`] copies the caller's slice
//! - [`AttributeBuffer::update_owned`] takes the caller's `Vec` without copying
//! - [`AttributeBuffer::update_range`] patches part of an uploaded buffer
//!
//! Full updates only reallocate device storage when the new payload is larger
//! than what is allocated; shrinking or same-size updates write in place.

use std::{any::Any, fmt::Debug, rc::Rc};

use bytemuck::{Pod, Zeroable};

use crate::{
    device::{BufferHandle, BufferUsage, DeviceBuffer, DeviceId, DisplayDevice},
    error::RenderError,
};

/// Element type of one attribute component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Half,
    Float,
    Double,
    /// 16.16 signed fixed point.
    Fixed,
    Short,
    UnsignedShort,
    Byte,
    UnsignedByte,
    Int,
    UnsignedInt,
    Int2_10_10_10Rev,
    UnsignedInt2_10_10_10Rev,
    UnsignedInt10F11F11FRev,
}

impl ScalarType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            ScalarType::Bool | ScalarType::Byte | ScalarType::UnsignedByte => 1,
            ScalarType::Half | ScalarType::Short | ScalarType::UnsignedShort => 2,
            ScalarType::Float
            | ScalarType::Fixed
            | ScalarType::Int
            | ScalarType::UnsignedInt
            | ScalarType::Int2_10_10_10Rev
            | ScalarType::UnsignedInt2_10_10_10Rev
            | ScalarType::UnsignedInt10F11F11FRev => 4,
            ScalarType::Double => 8,
        }
    }

    /// Packed formats carry a whole vector in one element.
    pub fn is_packed(self) -> bool {
        matches!(
            self,
            ScalarType::Int2_10_10_10Rev
                | ScalarType::UnsignedInt2_10_10_10Rev
                | ScalarType::UnsignedInt10F11F11FRev
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AttributeRole {
    Position,
    Color,
    Texture,
    Normal,
    #[default]
    Unknown,
}

/// How one vertex channel is laid out in memory.
///
/// `stride` and `offset` are in bytes; a stride of 0 means tightly packed.
/// `divisor` is 0 for per-vertex data and `n` for data that advances once
/// every `n` instances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeDescriptor {
    role: AttributeRole,
    scalar_type: ScalarType,
    count: u32,
    normalized: bool,
    stride: u32,
    offset: u32,
    divisor: u32,
}

impl AttributeDescriptor {
    pub fn new(
        role: AttributeRole,
        scalar_type: ScalarType,
        count: u32,
        normalized: bool,
        stride: u32,
        offset: u32,
        divisor: u32,
    ) -> Self {
        Self {
            role,
            scalar_type,
            count,
            normalized,
            stride,
            offset,
            divisor,
        }
    }

    pub fn role(&self) -> AttributeRole {
        self.role
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn normalized(&self) -> bool {
        self.normalized
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn divisor(&self) -> u32 {
        self.divisor
    }

    pub fn is_instanced(&self) -> bool {
        self.divisor > 0
    }

    /// Scalars stored per vertex. Packed formats hold all components in one.
    pub fn scalars_per_vertex(&self) -> u32 {
        if self.scalar_type.is_packed() {
            1
        } else {
            self.count.max(1)
        }
    }

    /// Bytes occupied by one vertex worth of this channel.
    pub fn element_size(&self) -> u32 {
        self.scalars_per_vertex() * self.scalar_type.size_in_bytes() as u32
    }

    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.element_size()
        } else {
            self.stride
        }
    }

    /// The offset is the only field that may change after construction; it
    /// is patched when channels get repacked into one buffer.
    pub fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// The matching wgpu vertex format, if wgpu can express this channel.
    pub fn vertex_format(&self) -> Option<wgpu::VertexFormat> {
        use wgpu::VertexFormat as F;
        let format = match (self.scalar_type, self.count, self.normalized) {
            (ScalarType::Float, 1, _) => F::Float32,
            (ScalarType::Float, 2, _) => F::Float32x2,
            (ScalarType::Float, 3, _) => F::Float32x3,
            (ScalarType::Float, 4, _) => F::Float32x4,
            (ScalarType::Double, 1, _) => F::Float64,
            (ScalarType::Double, 2, _) => F::Float64x2,
            (ScalarType::Double, 3, _) => F::Float64x3,
            (ScalarType::Double, 4, _) => F::Float64x4,
            (ScalarType::Half, 2, _) => F::Float16x2,
            (ScalarType::Half, 4, _) => F::Float16x4,
            (ScalarType::UnsignedInt, 1, _) => F::Uint32,
            (ScalarType::UnsignedInt, 2, _) => F::Uint32x2,
            (ScalarType::UnsignedInt, 3, _) => F::Uint32x3,
            (ScalarType::UnsignedInt, 4, _) => F::Uint32x4,
            (ScalarType::Int, 1, _) => F::Sint32,
            (ScalarType::Int, 2, _) => F::Sint32x2,
            (ScalarType::Int, 3, _) => F::Sint32x3,
            (ScalarType::Int, 4, _) => F::Sint32x4,
            (ScalarType::UnsignedByte, 2, false) => F::Uint8x2,
            (ScalarType::UnsignedByte, 4, false) => F::Uint8x4,
            (ScalarType::UnsignedByte, 2, true) => F::Unorm8x2,
            (ScalarType::UnsignedByte, 4, true) => F::Unorm8x4,
            (ScalarType::Byte, 2, false) => F::Sint8x2,
            (ScalarType::Byte, 4, false) => F::Sint8x4,
            (ScalarType::Byte, 2, true) => F::Snorm8x2,
            (ScalarType::Byte, 4, true) => F::Snorm8x4,
            (ScalarType::UnsignedShort, 2, false) => F::Uint16x2,
            (ScalarType::UnsignedShort, 4, false) => F::Uint16x4,
            (ScalarType::UnsignedShort, 2, true) => F::Unorm16x2,
            (ScalarType::UnsignedShort, 4, true) => F::Unorm16x4,
            (ScalarType::Short, 2, false) => F::Sint16x2,
            (ScalarType::Short, 4, false) => F::Sint16x4,
            (ScalarType::Short, 2, true) => F::Snorm16x2,
            (ScalarType::Short, 4, true) => F::Snorm16x4,
            (ScalarType::UnsignedInt2_10_10_10Rev, 4, true) => F::Unorm10_10_10_2,
            _ => return None,
        };
        Some(format)
    }
}

/// Rust element types that can live in an [`AttributeBuffer`].
pub trait Scalar: Pod + Debug + PartialEq + 'static {
    const SCALAR_TYPE: ScalarType;
}

macro_rules! impl_scalar {
    ($($ty:ty => $scalar:ident),* $(,)?) => {
        $(impl Scalar for $ty {
            const SCALAR_TYPE: ScalarType = ScalarType::$scalar;
        })*
    };
}

impl_scalar!(
    f32 => Float,
    f64 => Double,
    half::f16 => Half,
    i8 => Byte,
    u8 => UnsignedByte,
    i16 => Short,
    u16 => UnsignedShort,
    i32 => Int,
    u32 => UnsignedInt,
);

/// A boolean stored as one byte (`bool` itself is not `Pod`).
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Bool8(pub u8);

impl From<bool> for Bool8 {
    fn from(value: bool) -> Self {
        Self(value as u8)
    }
}

/// 16.16 signed fixed point.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Fixed(pub i32);

impl Fixed {
    pub fn from_f32(value: f32) -> Self {
        Self((value * 65536.0).round() as i32)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / 65536.0
    }
}

/// Four signed components packed as 2:10:10:10, `x` in the low bits.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Int2_10_10_10Rev(pub u32);

impl Int2_10_10_10Rev {
    pub fn pack(x: i16, y: i16, z: i16, w: i8) -> Self {
        let ten = |v: i16| (v as u32) & 0x3ff;
        Self(ten(x) | (ten(y) << 10) | (ten(z) << 20) | (((w as u32) & 0x3) << 30))
    }
}

/// Four unsigned components packed as 2:10:10:10, `x` in the low bits.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct UnsignedInt2_10_10_10Rev(pub u32);

impl UnsignedInt2_10_10_10Rev {
    pub fn pack(x: u16, y: u16, z: u16, w: u8) -> Self {
        let ten = |v: u16| (v as u32) & 0x3ff;
        Self(ten(x) | (ten(y) << 10) | (ten(z) << 20) | (((w as u32) & 0x3) << 30))
    }

    pub fn unpack(self) -> [u32; 4] {
        [
            self.0 & 0x3ff,
            (self.0 >> 10) & 0x3ff,
            (self.0 >> 20) & 0x3ff,
            self.0 >> 30,
        ]
    }
}

/// Three unsigned floats packed as 11:11:10 (no sign bit, 5 bit exponent).
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct UnsignedInt10F11F11FRev(pub u32);

impl UnsignedInt10F11F11FRev {
    pub fn pack(r: f32, g: f32, b: f32) -> Self {
        Self(small_float(r, 6) | (small_float(g, 6) << 11) | (small_float(b, 5) << 22))
    }
}

/// Truncate a non-negative f32 to an unsigned float with a 5 bit exponent and
/// `mantissa` bits of mantissa. Negative and NaN inputs become zero.
fn small_float(value: f32, mantissa: u32) -> u32 {
    if !(value > 0.0) {
        return 0;
    }
    let bits = value.to_bits();
    let exponent = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let max = (0x1f << mantissa) - 1;
    if exponent >= 0x1f {
        return max;
    }
    if exponent <= 0 {
        return 0;
    }
    ((exponent as u32) << mantissa) | ((bits & 0x7f_ffff) >> (23 - mantissa))
}

impl_scalar!(
    Bool8 => Bool,
    Fixed => Fixed,
    Int2_10_10_10Rev => Int2_10_10_10Rev,
    UnsignedInt2_10_10_10Rev => UnsignedInt2_10_10_10Rev,
    UnsignedInt10F11F11FRev => UnsignedInt10F11F11FRev,
);

/// One typed vertex channel.
pub struct AttributeBuffer<T: Scalar> {
    label: String,
    descriptor: AttributeDescriptor,
    data: Vec<T>,
    storage: Option<DeviceBuffer>,
}

impl<T: Scalar> AttributeBuffer<T> {
    pub fn new(
        label: &str,
        role: AttributeRole,
        count: u32,
        normalized: bool,
        stride: u32,
        offset: u32,
        divisor: u32,
    ) -> Self {
        Self {
            label: label.to_string(),
            descriptor: AttributeDescriptor::new(
                role,
                T::SCALAR_TYPE,
                count,
                normalized,
                stride,
                offset,
                divisor,
            ),
            data: Vec::new(),
            storage: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn set_offset(&mut self, offset: u32) {
        self.descriptor.set_offset(offset);
    }

    /// Replace the contents with a copy of `data`.
    pub fn update(&mut self, data: &[T]) -> Result<(), RenderError> {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.upload()
    }

    /// Replace the contents by taking ownership of `data`.
    pub fn update_owned(&mut self, data: Vec<T>) -> Result<(), RenderError> {
        self.data = data;
        self.upload()
    }

    /// Overwrite the elements starting at `first`.
    ///
    /// The buffer must have been uploaded before and the range must fit into
    /// the storage allocated on the device.
    pub fn update_range(&mut self, first: usize, data: &[T]) -> Result<(), RenderError> {
        // saturated offsets always fail the bounds check below
        let offset = first.saturating_mul(size_of::<T>());
        let size = std::mem::size_of_val(data);
        let Some(storage) = &self.storage else {
            return Err(RenderError::BufferNotAllocated {
                buffer: self.label.clone(),
                offset,
            });
        };
        let past_storage = offset
            .checked_add(size)
            .is_none_or(|end| end > storage.capacity());
        let past_data = first
            .checked_add(data.len())
            .is_none_or(|end| end > self.data.len());
        if past_storage || past_data {
            return Err(RenderError::RangeOutOfBounds {
                buffer: self.label.clone(),
                offset,
                size,
                allocated: storage.capacity().min(self.data.len() * size_of::<T>()),
            });
        }
        self.data[first..first + data.len()].copy_from_slice(data);
        storage.write(offset, bytemuck::cast_slice(data))
    }

    /// Allocate device storage and upload the current contents.
    ///
    /// Binding again to the same device is a no-op.
    pub fn bind(&mut self, device: &Rc<dyn DisplayDevice>) -> Result<BufferHandle, RenderError> {
        if let Some(storage) = &self.storage {
            let attached = storage.device().id();
            if attached != device.id() {
                return Err(RenderError::DeviceMismatch {
                    object: self.label.clone(),
                    attached,
                    requested: device.id(),
                });
            }
            return Ok(storage.handle());
        }
        let storage = DeviceBuffer::with_contents(
            device,
            &self.label,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&self.data),
        )?;
        log::debug!(
            "bound attribute `{}` ({} bytes) to {}",
            self.label,
            storage.capacity(),
            device.name()
        );
        let handle = storage.handle();
        self.storage = Some(storage);
        Ok(handle)
    }

    /// Release the device storage; the CPU copy stays.
    pub fn unbind(&mut self) {
        self.storage = None;
    }

    pub fn handle(&self) -> Option<BufferHandle> {
        self.storage.as_ref().map(DeviceBuffer::handle)
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        self.storage.as_ref().map(|s| s.device().id())
    }

    pub fn allocated_bytes(&self) -> usize {
        self.storage.as_ref().map_or(0, DeviceBuffer::capacity)
    }

    fn upload(&mut self) -> Result<(), RenderError> {
        if let Some(storage) = &mut self.storage {
            storage.upload(bytemuck::cast_slice(&self.data))?;
        }
        Ok(())
    }
}

/// Type erased view on an [`AttributeBuffer`], so one set can hold channels
/// of different element types.
pub trait AnyAttributeBuffer {
    fn label(&self) -> &str;
    fn descriptor(&self) -> &AttributeDescriptor;
    fn set_offset(&mut self, offset: u32);
    fn element_count(&self) -> usize;
    fn bind(&mut self, device: &Rc<dyn DisplayDevice>) -> Result<BufferHandle, RenderError>;
    fn handle(&self) -> Option<BufferHandle>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Scalar> AnyAttributeBuffer for AttributeBuffer<T> {
    fn label(&self) -> &str {
        &self.label
    }

    fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    fn set_offset(&mut self, offset: u32) {
        AttributeBuffer::set_offset(self, offset);
    }

    fn element_count(&self) -> usize {
        self.data.len()
    }

    fn bind(&mut self, device: &Rc<dyn DisplayDevice>) -> Result<BufferHandle, RenderError> {
        AttributeBuffer::bind(self, device)
    }

    fn handle(&self) -> Option<BufferHandle> {
        AttributeBuffer::handle(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
