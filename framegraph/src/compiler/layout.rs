//! Binding layouts and attachment formats derived from a pass declaration.

use crate::error::GraphicsError;
use crate::backend::Backend;
use crate::graph::{AccessDirection, Attachment, ResourceAccess, ResourceRef};
use crate::resources::ResourceRegistry;
use crate::types::{BufferUsage, ShaderStages, TextureFormat};

/// How a resource is exposed to shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Read-only buffer created with [`BufferUsage::UNIFORM`].
    UniformBuffer,
    /// Any other buffer.
    StorageBuffer,
    /// Texture read through a sampler.
    SampledTexture,
    /// Texture written (or read-written) as a storage image.
    StorageTexture,
}

/// One binding of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingSlot {
    /// Binding index within set 0.
    pub binding: u32,
    pub kind: BindingKind,
    pub stages: ShaderStages,
}

/// Resource-binding layout of a pass: one binding per declared access, in
/// declaration order, all in set 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindingLayout {
    slots: Vec<BindingSlot>,
}

impl BindingLayout {
    /// Derive the layout from a pass's accesses.
    ///
    /// Fails with [`GraphicsError::InvalidHandle`] when an access refers to a
    /// destroyed resource.
    pub fn from_accesses<B: Backend>(
        accesses: &[ResourceAccess],
        resources: &ResourceRegistry<B>,
    ) -> Result<Self, GraphicsError> {
        let mut slots = Vec::with_capacity(accesses.len());
        for (binding, access) in accesses.iter().enumerate() {
            let kind = match access.resource {
                ResourceRef::Buffer(handle) => {
                    let descriptor = resources.buffer_descriptor(handle).ok_or_else(|| {
                        GraphicsError::InvalidHandle(format!("buffer {handle:?}"))
                    })?;
                    if access.direction == AccessDirection::Read
                        && descriptor.usage.contains(BufferUsage::UNIFORM)
                    {
                        BindingKind::UniformBuffer
                    } else {
                        BindingKind::StorageBuffer
                    }
                }
                ResourceRef::Texture(handle) => {
                    if resources.texture(handle).is_none() {
                        return Err(GraphicsError::InvalidHandle(format!("texture {handle:?}")));
                    }
                    if access.direction == AccessDirection::Read {
                        BindingKind::SampledTexture
                    } else {
                        BindingKind::StorageTexture
                    }
                }
            };
            slots.push(BindingSlot {
                binding: binding as u32,
                kind,
                stages: access.stages,
            });
        }
        Ok(Self { slots })
    }

    pub fn slots(&self) -> &[BindingSlot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Attachment formats a graphics pipeline is built against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AttachmentFormats {
    /// One format per color attachment, in declaration order.
    pub colors: Vec<TextureFormat>,
    /// Depth format, taken from the first attachment that has depth.
    pub depth: Option<TextureFormat>,
}

impl AttachmentFormats {
    pub fn from_attachments(attachments: &[Attachment]) -> Self {
        let colors = attachments
            .iter()
            .filter(|a| a.target.kind().uses_color())
            .map(|a| a.target.color_format())
            .collect();
        let depth = attachments
            .iter()
            .find(|a| a.target.kind().uses_depth())
            .map(|a| a.target.depth_format());
        Self { colors, depth }
    }
}
