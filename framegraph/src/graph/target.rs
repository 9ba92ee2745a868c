//! Render target attachments for graphics passes.

use std::hash::{Hash, Hasher};

use crate::resources::{RenderTargetHandle, SurfaceId};
use crate::types::{ClearValue, RenderTargetKind, TextureFormat};

/// Operation to perform when loading an attachment at the start of a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    /// Clear the attachment with a specified value.
    Clear(ClearValue),
    /// Load the existing contents of the attachment.
    Load,
}

impl LoadOp {
    /// Create a clear operation with a color value.
    pub fn clear_color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Clear(ClearValue::color(r, g, b, a))
    }

    /// Whether this is a clear; the clear value itself is not structural.
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear(_))
    }
}

impl Default for LoadOp {
    fn default() -> Self {
        Self::Clear(ClearValue::BLACK)
    }
}

/// Cheap, copyable view of a registered render target.
///
/// Obtained from the renderer when a render target or a swapchain is
/// created. Carries everything graph validation and compilation need, so the
/// graph itself never has to look anything up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    pub(crate) handle: RenderTargetHandle,
    pub(crate) kind: RenderTargetKind,
    pub(crate) color_format: TextureFormat,
    pub(crate) depth_format: TextureFormat,
    pub(crate) surface: Option<SurfaceId>,
}

impl RenderTarget {
    pub fn handle(&self) -> RenderTargetHandle {
        self.handle
    }

    pub fn kind(&self) -> RenderTargetKind {
        self.kind
    }

    pub fn color_format(&self) -> TextureFormat {
        self.color_format
    }

    pub fn depth_format(&self) -> TextureFormat {
        self.depth_format
    }

    /// The presentation surface backing this target, if any.
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    /// Whether this target is backed by a presentation surface.
    pub fn is_surface(&self) -> bool {
        self.surface.is_some()
    }
}

/// A render target bound to a graphics pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    /// Target to render into.
    pub target: RenderTarget,
    /// What happens to the color contents at pass begin. Depth is always
    /// cleared to 1.0 on clear.
    pub load: LoadOp,
}

impl Attachment {
    /// Attachment that clears to `clear` at pass begin.
    pub fn clear(target: RenderTarget, clear: ClearValue) -> Self {
        Self {
            target,
            load: LoadOp::Clear(clear),
        }
    }

    /// Attachment that keeps existing contents.
    pub fn load(target: RenderTarget) -> Self {
        Self {
            target,
            load: LoadOp::Load,
        }
    }

    /// Feed identity and structure (never the clear value) to `state`.
    pub(crate) fn hash_content<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
        self.load.is_clear().hash(state);
    }
}

static_assertions::assert_impl_all!(RenderTarget: Send, Sync);
static_assertions::assert_impl_all!(Attachment: Send, Sync);
