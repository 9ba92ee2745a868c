//! Common types shared across the frame graph.

use bitflags::bitflags;

// ============================================================================
// Queues
// ============================================================================

/// The hardware command queue a pass (or resource) is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum QueueAffinity {
    /// Graphics queue (rasterization, also able to present).
    #[default]
    Graphics,
    /// Asynchronous compute queue.
    Compute,
}

impl QueueAffinity {
    /// All queues, in the order used for per-queue arrays.
    pub const ALL: [QueueAffinity; 2] = [QueueAffinity::Graphics, QueueAffinity::Compute];

    /// Index into per-queue arrays.
    pub fn index(self) -> usize {
        match self {
            Self::Graphics => 0,
            Self::Compute => 1,
        }
    }

    /// Single-queue mask for this affinity.
    pub fn mask(self) -> QueueMask {
        match self {
            Self::Graphics => QueueMask::GRAPHICS,
            Self::Compute => QueueMask::COMPUTE,
        }
    }

    /// Human readable queue name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Graphics => "graphics",
            Self::Compute => "compute",
        }
    }
}

bitflags! {
    /// Set of queues touched by a batch or a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueMask: u8 {
        /// The graphics queue.
        const GRAPHICS = 1 << 0;
        /// The compute queue.
        const COMPUTE = 1 << 1;
    }
}

impl QueueMask {
    /// Whether the mask contains the given queue.
    pub fn uses(self, queue: QueueAffinity) -> bool {
        self.contains(queue.mask())
    }

    /// Iterate the queues in this mask, graphics first.
    pub fn queues(self) -> impl Iterator<Item = QueueAffinity> {
        QueueAffinity::ALL
            .into_iter()
            .filter(move |queue| self.uses(*queue))
    }
}

/// Fixed-size map keyed by [`QueueAffinity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerQueue<T>(pub [T; 2]);

impl<T> PerQueue<T> {
    /// Build a map by evaluating `f` for each queue.
    pub fn from_fn(mut f: impl FnMut(QueueAffinity) -> T) -> Self {
        Self([f(QueueAffinity::Graphics), f(QueueAffinity::Compute)])
    }

    /// Value for `queue`.
    pub fn get(&self, queue: QueueAffinity) -> &T {
        &self.0[queue.index()]
    }

    /// Mutable value for `queue`.
    pub fn get_mut(&mut self, queue: QueueAffinity) -> &mut T {
        &mut self.0[queue.index()]
    }

    /// Iterate `(queue, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (QueueAffinity, &T)> {
        QueueAffinity::ALL.into_iter().zip(self.0.iter())
    }
}

// ============================================================================
// Shader stages
// ============================================================================

/// A single programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Compute shader.
    Compute,
}

impl ShaderStage {
    /// Stage mask with only this stage set.
    pub fn flag(self) -> ShaderStages {
        match self {
            Self::Vertex => ShaderStages::VERTEX,
            Self::Fragment => ShaderStages::FRAGMENT,
            Self::Compute => ShaderStages::COMPUTE,
        }
    }
}

bitflags! {
    /// Set of shader stages that can see a binding or push-constant range.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
        /// Compute stage.
        const COMPUTE = 1 << 2;
        /// Every graphics stage.
        const GRAPHICS_ALL = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

// ============================================================================
// Extent / clear values
// ============================================================================

/// 2D size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create an extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero (nothing can be rendered).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Clear value for a render-target attachment.
///
/// Clear values are cosmetic: they never participate in graph hashing, so
/// changing them frame to frame does not trigger recompilation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA color.
    Color([f32; 4]),
    /// Depth and stencil.
    DepthStencil {
        /// Depth value.
        depth: f32,
        /// Stencil value.
        stencil: u32,
    },
}

impl ClearValue {
    /// Opaque black.
    pub const BLACK: ClearValue = ClearValue::Color([0.0, 0.0, 0.0, 1.0]);

    /// Far-plane depth clear (`1.0`, stencil 0).
    pub const DEPTH_ONE: ClearValue = ClearValue::DepthStencil {
        depth: 1.0,
        stencil: 0,
    };

    /// Color clear from components.
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color([r, g, b, a])
    }
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_mask_iteration() {
        let mask = QueueMask::GRAPHICS | QueueMask::COMPUTE;
        let queues: Vec<_> = mask.queues().collect();
        assert_eq!(queues, vec![QueueAffinity::Graphics, QueueAffinity::Compute]);

        let compute_only: Vec<_> = QueueMask::COMPUTE.queues().collect();
        assert_eq!(compute_only, vec![QueueAffinity::Compute]);
        assert!(QueueMask::empty().queues().next().is_none());
    }

    #[test]
    fn test_per_queue() {
        let mut map = PerQueue::from_fn(|q| q.index() * 10);
        assert_eq!(*map.get(QueueAffinity::Compute), 10);
        *map.get_mut(QueueAffinity::Graphics) = 7;
        assert_eq!(*map.get(QueueAffinity::Graphics), 7);
    }

    #[test]
    fn test_shader_stage_flags() {
        assert!(ShaderStages::GRAPHICS_ALL.contains(ShaderStage::Vertex.flag()));
        assert!(ShaderStages::GRAPHICS_ALL.contains(ShaderStage::Fragment.flag()));
        assert!(!ShaderStages::GRAPHICS_ALL.contains(ShaderStage::Compute.flag()));
    }

    #[test]
    fn test_extent_empty() {
        assert!(Extent2d::new(0, 720).is_empty());
        assert!(!Extent2d::new(1280, 720).is_empty());
    }
}
