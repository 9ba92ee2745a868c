//! GPU resources.
//!
//! Passes reference buffers, textures and render targets without owning
//! them. The [`ResourceRegistry`] owns the backend objects and hands out
//! generation-checked handles ([`BufferHandle`], [`TextureHandle`],
//! [`RenderTargetHandle`]): a handle whose resource was destroyed simply
//! stops resolving, and [`ResourceRegistry::is_valid`] reports it.
//!
//! Dynamic buffers own one backend instance per frame slot so that the host
//! can write the instance of the slot it is about to record while the device
//! still reads the others.

use slotmap::SlotMap;

use crate::backend::Backend;
use crate::error::GraphicsError;
use crate::graph::{RenderTarget, ResourceRef};
use crate::types::{
    BufferDescriptor, BufferKind, Extent2d, QueueAffinity, RenderTargetDescriptor,
    RenderTargetKind, TextureDescriptor, TextureFormat, TextureUsage,
};

slotmap::new_key_type! {
    /// Handle to a buffer owned by the renderer.
    pub struct BufferHandle;
    /// Handle to a texture owned by the renderer.
    pub struct TextureHandle;
    /// Handle to a render target owned by the renderer.
    pub struct RenderTargetHandle;
    /// Identifier of a registered presentation surface.
    pub struct SurfaceId;
}

struct BufferEntry<B: Backend> {
    descriptor: BufferDescriptor,
    /// One instance for static buffers, one per frame slot for dynamic ones.
    instances: Vec<B::Buffer>,
}

struct TextureEntry<B: Backend> {
    descriptor: TextureDescriptor,
    texture: B::Texture,
}

/// Where the images of a render target live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetStorage {
    /// Textures owned by the registry.
    Offscreen {
        color: Option<TextureHandle>,
        depth: Option<TextureHandle>,
    },
    /// Images of a presentation surface.
    Surface(SurfaceId),
}

struct RenderTargetEntry {
    target: RenderTarget,
    storage: RenderTargetStorage,
    extent: Extent2d,
}

/// Owner of every buffer, texture and render target.
pub struct ResourceRegistry<B: Backend> {
    buffers: SlotMap<BufferHandle, BufferEntry<B>>,
    textures: SlotMap<TextureHandle, TextureEntry<B>>,
    render_targets: SlotMap<RenderTargetHandle, RenderTargetEntry>,
    frames_in_flight: usize,
}

impl<B: Backend> ResourceRegistry<B> {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            render_targets: SlotMap::with_key(),
            frames_in_flight,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    // --- Buffers -----------------------------------------------------------

    /// Create a buffer; dynamic buffers get one instance per frame slot.
    pub fn create_buffer(
        &mut self,
        backend: &mut B,
        descriptor: &BufferDescriptor,
    ) -> Result<BufferHandle, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size must be greater than zero".into(),
            ));
        }

        let count = match descriptor.kind {
            BufferKind::Static => 1,
            BufferKind::Dynamic => self.frames_in_flight,
        };
        let mut instances = Vec::with_capacity(count);
        for _ in 0..count {
            match backend.create_buffer(descriptor) {
                Ok(buffer) => instances.push(buffer),
                Err(e) => {
                    for buffer in instances {
                        backend.destroy_buffer(buffer);
                    }
                    return Err(e);
                }
            }
        }

        Ok(self.buffers.insert(BufferEntry {
            descriptor: descriptor.clone(),
            instances,
        }))
    }

    /// Write into the instance of `handle` used by frame slot `slot`.
    pub fn write_buffer(
        &mut self,
        backend: &mut B,
        handle: BufferHandle,
        slot: usize,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let entry = self
            .buffers
            .get(handle)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("buffer {handle:?}")))?;

        let end = offset.checked_add(data.len() as u64);
        if end.is_none_or(|end| end > entry.descriptor.size) {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {offset} exceeds buffer size {}",
                data.len(),
                entry.descriptor.size
            )));
        }

        let instance = &entry.instances[slot % entry.instances.len()];
        backend.write_buffer(instance, offset, data)
    }

    /// Backend instance of `handle` for frame slot `slot`.
    pub fn buffer(&self, handle: BufferHandle, slot: usize) -> Option<&B::Buffer> {
        self.buffers
            .get(handle)
            .map(|entry| &entry.instances[slot % entry.instances.len()])
    }

    pub fn buffer_descriptor(&self, handle: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(handle).map(|entry| &entry.descriptor)
    }

    pub fn destroy_buffer(
        &mut self,
        backend: &mut B,
        handle: BufferHandle,
    ) -> Result<(), GraphicsError> {
        let entry = self
            .buffers
            .remove(handle)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("buffer {handle:?}")))?;
        for buffer in entry.instances {
            backend.destroy_buffer(buffer);
        }
        Ok(())
    }

    // --- Textures ----------------------------------------------------------

    pub fn create_texture(
        &mut self,
        backend: &mut B,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, GraphicsError> {
        if descriptor.extent.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "texture extent must be non-zero".into(),
            ));
        }
        let texture = backend.create_texture(descriptor)?;
        Ok(self.textures.insert(TextureEntry {
            descriptor: descriptor.clone(),
            texture,
        }))
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&B::Texture> {
        self.textures.get(handle).map(|entry| &entry.texture)
    }

    pub fn texture_descriptor(&self, handle: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(handle).map(|entry| &entry.descriptor)
    }

    pub fn destroy_texture(
        &mut self,
        backend: &mut B,
        handle: TextureHandle,
    ) -> Result<(), GraphicsError> {
        if self
            .render_targets
            .values()
            .any(|rt| rt.owns_texture(handle))
        {
            return Err(GraphicsError::InvalidParameter(
                "texture is owned by a render target; destroy the render target instead".into(),
            ));
        }
        let entry = self
            .textures
            .remove(handle)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("texture {handle:?}")))?;
        backend.destroy_texture(entry.texture);
        Ok(())
    }

    // --- Render targets ----------------------------------------------------

    /// Create an offscreen render target with its own color and/or depth
    /// textures.
    pub fn create_render_target(
        &mut self,
        backend: &mut B,
        descriptor: &RenderTargetDescriptor,
    ) -> Result<RenderTarget, GraphicsError> {
        if descriptor.kind.uses_color() && descriptor.color_format.is_depth_stencil() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{:?} is not a color format",
                descriptor.color_format
            )));
        }
        if descriptor.kind.uses_depth() && !descriptor.depth_format.is_depth_stencil() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{:?} is not a depth format",
                descriptor.depth_format
            )));
        }

        let label = descriptor.label.as_deref().unwrap_or("render target");
        let color = if descriptor.kind.uses_color() {
            let texture = TextureDescriptor::new_2d(
                descriptor.extent.width,
                descriptor.extent.height,
                descriptor.color_format,
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            )
            .with_label(format!("{label} color"));
            Some(self.create_texture(backend, &texture)?)
        } else {
            None
        };

        let depth = if descriptor.kind.uses_depth() {
            let texture = TextureDescriptor::new_2d(
                descriptor.extent.width,
                descriptor.extent.height,
                descriptor.depth_format,
                TextureUsage::RENDER_ATTACHMENT,
            )
            .with_label(format!("{label} depth"));
            match self.create_texture(backend, &texture) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    if let Some(color) = color.and_then(|h| self.textures.remove(h)) {
                        backend.destroy_texture(color.texture);
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        let handle = self.render_targets.insert_with_key(|handle| RenderTargetEntry {
            target: RenderTarget {
                handle,
                kind: descriptor.kind,
                color_format: descriptor.color_format,
                depth_format: descriptor.depth_format,
                surface: None,
            },
            storage: RenderTargetStorage::Offscreen { color, depth },
            extent: descriptor.extent,
        });
        Ok(self.render_targets[handle].target)
    }

    /// Register the color-only render target backed by a presentation
    /// surface.
    pub fn register_surface_target(
        &mut self,
        surface: SurfaceId,
        format: TextureFormat,
        extent: Extent2d,
    ) -> RenderTarget {
        let handle = self.render_targets.insert_with_key(|handle| RenderTargetEntry {
            target: RenderTarget {
                handle,
                kind: RenderTargetKind::Color,
                color_format: format,
                depth_format: TextureFormat::Depth32Float,
                surface: Some(surface),
            },
            storage: RenderTargetStorage::Surface(surface),
            extent,
        });
        self.render_targets[handle].target
    }

    /// Drop the render targets backed by `surface`.
    pub fn remove_surface_targets(&mut self, surface: SurfaceId) {
        self.render_targets
            .retain(|_, rt| rt.storage != RenderTargetStorage::Surface(surface));
    }

    pub fn render_target(&self, handle: RenderTargetHandle) -> Option<RenderTarget> {
        self.render_targets.get(handle).map(|rt| rt.target)
    }

    pub fn render_target_storage(&self, handle: RenderTargetHandle) -> Option<RenderTargetStorage> {
        self.render_targets.get(handle).map(|rt| rt.storage)
    }

    /// Extent of an offscreen render target. Surface-backed targets follow
    /// their surface and report the size they were registered with.
    pub fn render_target_extent(&self, handle: RenderTargetHandle) -> Option<Extent2d> {
        self.render_targets.get(handle).map(|rt| rt.extent)
    }

    /// Color texture of an offscreen render target, for sampling in a later
    /// pass.
    pub fn render_target_color(&self, handle: RenderTargetHandle) -> Option<TextureHandle> {
        match self.render_targets.get(handle)?.storage {
            RenderTargetStorage::Offscreen { color, .. } => color,
            RenderTargetStorage::Surface(_) => None,
        }
    }

    pub fn destroy_render_target(
        &mut self,
        backend: &mut B,
        handle: RenderTargetHandle,
    ) -> Result<(), GraphicsError> {
        let storage = self
            .render_target_storage(handle)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("render target {handle:?}")))?;
        let RenderTargetStorage::Offscreen { color, depth } = storage else {
            return Err(GraphicsError::InvalidParameter(
                "swapchain render targets are removed with their swapchain".into(),
            ));
        };

        self.render_targets.remove(handle);
        for texture in [color, depth].into_iter().flatten() {
            if let Some(texture) = self.textures.remove(texture) {
                backend.destroy_texture(texture.texture);
            }
        }
        Ok(())
    }

    // --- Queries -----------------------------------------------------------

    /// Whether a resource referenced by a pass still exists.
    pub fn is_valid(&self, resource: ResourceRef) -> bool {
        match resource {
            ResourceRef::Buffer(handle) => self.buffers.contains_key(handle),
            ResourceRef::Texture(handle) => self.textures.contains_key(handle),
        }
    }

    pub fn is_render_target_valid(&self, handle: RenderTargetHandle) -> bool {
        self.render_targets.contains_key(handle)
    }

    /// Queue a resource was created for.
    pub fn queue_affinity(&self, resource: ResourceRef) -> Option<QueueAffinity> {
        match resource {
            ResourceRef::Buffer(handle) => self.buffers.get(handle).map(|e| e.descriptor.queue),
            ResourceRef::Texture(handle) => self.textures.get(handle).map(|e| e.descriptor.queue),
        }
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn render_target_count(&self) -> usize {
        self.render_targets.len()
    }

    /// Destroy everything. The device must be idle.
    pub fn destroy_all(&mut self, backend: &mut B) {
        self.render_targets.clear();
        for (_, entry) in self.textures.drain() {
            backend.destroy_texture(entry.texture);
        }
        for (_, entry) in self.buffers.drain() {
            for buffer in entry.instances {
                backend.destroy_buffer(buffer);
            }
        }
    }
}

impl RenderTargetEntry {
    fn owns_texture(&self, handle: TextureHandle) -> bool {
        match self.storage {
            RenderTargetStorage::Offscreen { color, depth } => {
                color == Some(handle) || depth == Some(handle)
            }
            RenderTargetStorage::Surface(_) => false,
        }
    }
}

static_assertions::assert_impl_all!(BufferHandle: Send, Sync);
static_assertions::assert_impl_all!(TextureHandle: Send, Sync);
static_assertions::assert_impl_all!(RenderTargetHandle: Send, Sync);
static_assertions::assert_impl_all!(SurfaceId: Send, Sync);
