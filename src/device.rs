//! Display devices and the resources they hand out.
//!
//! A [`DisplayDevice`] is the concrete backend the scene is bound to. The rest
//! of the crate only talks to it through this trait: it creates buffers,
//! textures and framebuffers, receives uploads and clears, and identifies
//! itself with a process-unique [`DeviceId`].
//!
//! # Key types
//!
//! - [`DisplayDeviceDefinition`] describes the handles a renderable acquired
//!   when it was attached
//! - [`DeviceBuffer`], [`DeviceTexture`] and [`DeviceFramebuffer`] own one
//!   backend resource each and release it when dropped
//! - [`HeadlessDevice`] keeps everything on the CPU; it is what tests and
//!   tools without a GPU attach to
//! - [`gpu::WgpuDevice`] is the hardware backend

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::error::RenderError;

pub mod gpu;

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Hand out an id no other device in this process has.
    pub fn next() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Depth32Float,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDescription {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Backend resources held by one attached renderable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayDeviceDefinition {
    pub device: DeviceId,
    pub buffers: Vec<BufferHandle>,
    pub textures: Vec<TextureHandle>,
    pub framebuffer: Option<FramebufferHandle>,
}

impl DisplayDeviceDefinition {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            buffers: Vec::new(),
            textures: Vec::new(),
            framebuffer: None,
        }
    }

    pub fn with_buffer(mut self, buffer: BufferHandle) -> Self {
        self.buffers.push(buffer);
        self
    }

    pub fn with_buffers(mut self, buffers: impl IntoIterator<Item = BufferHandle>) -> Self {
        self.buffers.extend(buffers);
        self
    }

    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.textures.push(texture);
        self
    }

    pub fn with_framebuffer(mut self, framebuffer: FramebufferHandle) -> Self {
        self.framebuffer = Some(framebuffer);
        self
    }
}

/// A concrete rendering backend.
///
/// Calls are synchronous from the scene's point of view even if the backend
/// queues work for later. Devices are shared through `Rc<dyn DisplayDevice>`
/// and therefore use interior mutability for their bookkeeping.
pub trait DisplayDevice {
    fn id(&self) -> DeviceId;

    fn name(&self) -> &str;

    fn create_buffer(
        &self,
        label: &str,
        usage: BufferUsage,
        size: usize,
    ) -> Result<BufferHandle, RenderError>;

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), RenderError>;

    fn destroy_buffer(&self, buffer: BufferHandle);

    fn create_texture(&self, desc: &TextureDescription) -> Result<TextureHandle, RenderError>;

    fn destroy_texture(&self, texture: TextureHandle);

    fn create_framebuffer(
        &self,
        colour: TextureHandle,
        depth: Option<TextureHandle>,
    ) -> Result<FramebufferHandle, RenderError>;

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    fn clear(&self, framebuffer: FramebufferHandle, colour: [f64; 4]) -> Result<(), RenderError>;
}

/// One device buffer, released when dropped.
pub struct DeviceBuffer {
    device: Rc<dyn DisplayDevice>,
    handle: BufferHandle,
    capacity: usize,
    usage: BufferUsage,
    label: String,
}

impl DeviceBuffer {
    /// Allocate exactly `bytes.len()` bytes and upload `bytes`.
    pub fn with_contents(
        device: &Rc<dyn DisplayDevice>,
        label: &str,
        usage: BufferUsage,
        bytes: &[u8],
    ) -> Result<Self, RenderError> {
        let handle = device.create_buffer(label, usage, bytes.len())?;
        let buffer = Self {
            device: Rc::clone(device),
            handle,
            capacity: bytes.len(),
            usage,
            label: label.to_string(),
        };
        if !bytes.is_empty() {
            buffer.device.write_buffer(handle, 0, bytes)?;
        }
        Ok(buffer)
    }

    /// Replace the whole content.
    ///
    /// Storage is only reallocated when `bytes` does not fit into what was
    /// allocated before. Returns `true` if a new handle was created.
    pub fn upload(&mut self, bytes: &[u8]) -> Result<bool, RenderError> {
        if bytes.len() > self.capacity {
            let handle = self
                .device
                .create_buffer(&self.label, self.usage, bytes.len())?;
            self.device.destroy_buffer(self.handle);
            log::debug!(
                "reallocated `{}`: {} -> {} bytes",
                self.label,
                self.capacity,
                bytes.len()
            );
            self.handle = handle;
            self.capacity = bytes.len();
            self.device.write_buffer(handle, 0, bytes)?;
            return Ok(true);
        }
        if !bytes.is_empty() {
            self.device.write_buffer(self.handle, 0, bytes)?;
        }
        Ok(false)
    }

    /// Overwrite `bytes.len()` bytes starting at `offset`.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), RenderError> {
        if offset
            .checked_add(bytes.len())
            .is_none_or(|end| end > self.capacity)
        {
            return Err(RenderError::RangeOutOfBounds {
                buffer: self.label.clone(),
                offset,
                size: bytes.len(),
                allocated: self.capacity,
            });
        }
        self.device.write_buffer(self.handle, offset, bytes)
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn device(&self) -> &Rc<dyn DisplayDevice> {
        &self.device
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.handle);
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device.id())
            .field("handle", &self.handle)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// One device texture, released when dropped.
pub struct DeviceTexture {
    device: Rc<dyn DisplayDevice>,
    handle: TextureHandle,
}

impl DeviceTexture {
    pub fn new(
        device: &Rc<dyn DisplayDevice>,
        desc: &TextureDescription,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            handle: device.create_texture(desc)?,
            device: Rc::clone(device),
        })
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }
}

impl Drop for DeviceTexture {
    fn drop(&mut self) {
        self.device.destroy_texture(self.handle);
    }
}

/// A framebuffer together with the textures it renders into.
pub struct DeviceFramebuffer {
    device: Rc<dyn DisplayDevice>,
    handle: FramebufferHandle,
    colour: DeviceTexture,
    depth: Option<DeviceTexture>,
}

impl DeviceFramebuffer {
    pub fn new(
        device: &Rc<dyn DisplayDevice>,
        colour: DeviceTexture,
        depth: Option<DeviceTexture>,
    ) -> Result<Self, RenderError> {
        let handle =
            device.create_framebuffer(colour.handle(), depth.as_ref().map(DeviceTexture::handle))?;
        Ok(Self {
            device: Rc::clone(device),
            handle,
            colour,
            depth,
        })
    }

    pub fn handle(&self) -> FramebufferHandle {
        self.handle
    }

    pub fn textures(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        std::iter::once(self.colour.handle()).chain(self.depth.as_ref().map(DeviceTexture::handle))
    }

    pub fn clear(&self, colour: [f64; 4]) -> Result<(), RenderError> {
        self.device.clear(self.handle, colour)
    }
}

impl Drop for DeviceFramebuffer {
    // textures are dropped after this runs, so the framebuffer goes first
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.handle);
    }
}

/// Allocation counters of a [`HeadlessDevice`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub buffers_created: usize,
    pub buffers_destroyed: usize,
    pub buffer_writes: usize,
    pub textures_created: usize,
    pub textures_destroyed: usize,
    pub framebuffers_created: usize,
    pub framebuffers_destroyed: usize,
}

impl DeviceStats {
    pub fn live_buffers(&self) -> usize {
        self.buffers_created - self.buffers_destroyed
    }

    pub fn live_textures(&self) -> usize {
        self.textures_created - self.textures_destroyed
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers_created - self.framebuffers_destroyed
    }
}

#[derive(Default)]
struct HeadlessState {
    next_handle: u64,
    buffers: HashMap<BufferHandle, (BufferUsage, Vec<u8>)>,
    textures: HashMap<TextureHandle, TextureDescription>,
    framebuffers: HashMap<FramebufferHandle, (TextureHandle, Option<TextureHandle>)>,
    clears: Vec<(FramebufferHandle, [f64; 4])>,
    stats: DeviceStats,
}

impl HeadlessState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// A display device that keeps every resource in CPU memory.
///
/// Buffer contents can be read back, and allocation counters make
/// reallocations and leaks observable.
pub struct HeadlessDevice {
    id: DeviceId,
    name: String,
    state: RefCell<HeadlessState>,
}

impl HeadlessDevice {
    pub fn new(name: &str) -> Self {
        Self {
            id: DeviceId::next(),
            name: name.to_string(),
            state: RefCell::new(HeadlessState::default()),
        }
    }

    /// Convenience for the common `Rc<dyn DisplayDevice>` use.
    pub fn shared(name: &str) -> Rc<Self> {
        Rc::new(Self::new(name))
    }

    pub fn stats(&self) -> DeviceStats {
        self.state.borrow().stats
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .buffers
            .get(&buffer)
            .map(|(_, bytes)| bytes.clone())
    }

    pub fn buffer_usage(&self, buffer: BufferHandle) -> Option<BufferUsage> {
        self.state.borrow().buffers.get(&buffer).map(|(usage, _)| *usage)
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<TextureDescription> {
        self.state.borrow().textures.get(&texture).cloned()
    }

    pub fn clears(&self) -> Vec<(FramebufferHandle, [f64; 4])> {
        self.state.borrow().clears.clone()
    }
}

impl DisplayDevice for HeadlessDevice {
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
        let mut state = self.state.borrow_mut();
        let handle = BufferHandle(state.next_handle());
        state.buffers.insert(handle, (usage, vec![0; size]));
        state.stats.buffers_created += 1;
        log::trace!("{}: created buffer {:?} `{}` ({} bytes)", self.name, handle, label, size);
        Ok(handle)
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        let Some((_, storage)) = state.buffers.get_mut(&buffer) else {
            return Err(RenderError::Backend(format!(
                "{}: write to unknown buffer {:?}",
                self.name, buffer
            )));
        };
        let end = offset.saturating_add(bytes.len());
        if end > storage.len() {
            return Err(RenderError::Backend(format!(
                "{}: write of {}..{} past the end of buffer {:?} ({} bytes)",
                self.name,
                offset,
                end,
                buffer,
                storage.len()
            )));
        }
        storage[offset..end].copy_from_slice(bytes);
        state.stats.buffer_writes += 1;
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.borrow_mut();
        if state.buffers.remove(&buffer).is_some() {
            state.stats.buffers_destroyed += 1;
        } else {
            log::warn!("{}: double release of buffer {:?}", self.name, buffer);
        }
    }

    fn create_texture(&self, desc: &TextureDescription) -> Result<TextureHandle, RenderError> {
        let mut state = self.state.borrow_mut();
        let handle = TextureHandle(state.next_handle());
        state.textures.insert(handle, desc.clone());
        state.stats.textures_created += 1;
        Ok(handle)
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut state = self.state.borrow_mut();
        if state.textures.remove(&texture).is_some() {
            state.stats.textures_destroyed += 1;
        }
    }

    fn create_framebuffer(
        &self,
        colour: TextureHandle,
        depth: Option<TextureHandle>,
    ) -> Result<FramebufferHandle, RenderError> {
        let mut state = self.state.borrow_mut();
        let known = state.textures.contains_key(&colour)
            && depth.is_none_or(|depth| state.textures.contains_key(&depth));
        if !known {
            return Err(RenderError::Backend(format!(
                "{}: framebuffer references an unknown texture",
                self.name
            )));
        }
        let handle = FramebufferHandle(state.next_handle());
        state.framebuffers.insert(handle, (colour, depth));
        state.stats.framebuffers_created += 1;
        Ok(handle)
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        let mut state = self.state.borrow_mut();
        if state.framebuffers.remove(&framebuffer).is_some() {
            state.stats.framebuffers_destroyed += 1;
        }
    }

    fn clear(&self, framebuffer: FramebufferHandle, colour: [f64; 4]) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        if !state.framebuffers.contains_key(&framebuffer) {
            return Err(RenderError::Backend(format!(
                "{}: clear of unknown framebuffer {:?}",
                self.name, framebuffer
            )));
        }
        state.clears.push((framebuffer, colour));
        Ok(())
    }
}
