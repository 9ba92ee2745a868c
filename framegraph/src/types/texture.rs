//! Texture and render-target types and descriptors.

use bitflags::bitflags;

use super::{Extent2d, QueueAffinity};

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 32-bit red channel, float.
    R32Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth, float.
    Depth32Float,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32Float)
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8)
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied to.
        const COPY_DST = 1 << 0;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 1;
        /// Texture can be used as a storage texture.
        const STORAGE_BINDING = 1 << 2;
        /// Texture can be used as a render attachment.
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub extent: Extent2d,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
    /// Queue that owns the texture.
    pub queue: QueueAffinity,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            extent: Extent2d::new(width, height),
            format,
            usage,
            queue: QueueAffinity::Graphics,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the owning queue.
    pub fn with_queue(mut self, queue: QueueAffinity) -> Self {
        self.queue = queue;
        self
    }
}

/// Which attachments a render target provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTargetKind {
    /// Color only.
    #[default]
    Color,
    /// Depth only.
    Depth,
    /// Color plus depth.
    ColorAndDepth,
}

impl RenderTargetKind {
    /// Whether the target has a color attachment.
    pub fn uses_color(self) -> bool {
        matches!(self, Self::Color | Self::ColorAndDepth)
    }

    /// Whether the target has a depth attachment.
    pub fn uses_depth(self) -> bool {
        matches!(self, Self::Depth | Self::ColorAndDepth)
    }
}

/// Descriptor for an offscreen render target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargetDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Attachments provided.
    pub kind: RenderTargetKind,
    /// Color format (ignored for depth-only targets).
    pub color_format: TextureFormat,
    /// Depth format (ignored for color-only targets).
    pub depth_format: TextureFormat,
    /// Size in pixels.
    pub extent: Extent2d,
}

impl RenderTargetDescriptor {
    /// Create a render target descriptor with default formats.
    pub fn new(kind: RenderTargetKind, width: u32, height: u32) -> Self {
        Self {
            label: None,
            kind,
            color_format: TextureFormat::Rgba8Unorm,
            depth_format: TextureFormat::Depth32Float,
            extent: Extent2d::new(width, height),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the color format.
    pub fn with_color_format(mut self, format: TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    /// Set the depth format.
    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats() {
        assert!(TextureFormat::Depth32Float.is_depth_stencil());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
        assert!(!TextureFormat::Bgra8UnormSrgb.is_depth_stencil());
    }

    #[test]
    fn test_render_target_kind() {
        assert!(RenderTargetKind::ColorAndDepth.uses_color());
        assert!(RenderTargetKind::ColorAndDepth.uses_depth());
        assert!(!RenderTargetKind::Depth.uses_color());
        assert!(!RenderTargetKind::Color.uses_depth());
    }
}
