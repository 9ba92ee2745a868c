//! Buffer types and descriptors.

use bitflags::bitflags;

use super::QueueAffinity;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 4;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// How many device instances back a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferKind {
    /// Written once at creation, read-only afterwards. One instance.
    #[default]
    Static,
    /// Rewritten by the host every frame. One instance per frame slot, so the
    /// host only ever writes the instance the device is not reading.
    Dynamic,
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Static or per-frame-slot.
    pub kind: BufferKind,
    /// Queue that owns the buffer.
    pub queue: QueueAffinity,
}

impl BufferDescriptor {
    /// Create a new static buffer descriptor owned by the graphics queue.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            kind: BufferKind::Static,
            queue: QueueAffinity::Graphics,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Mark the buffer as dynamic (one instance per frame slot).
    pub fn dynamic(mut self) -> Self {
        self.kind = BufferKind::Dynamic;
        self
    }

    /// Set the owning queue.
    pub fn with_queue(mut self, queue: QueueAffinity) -> Self {
        self.queue = queue;
        self
    }
}

/// Index element type for indexed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    #[default]
    Uint32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_descriptor_builder() {
        let desc = BufferDescriptor::new(256, BufferUsage::UNIFORM)
            .with_label("camera")
            .dynamic()
            .with_queue(QueueAffinity::Compute);
        assert_eq!(desc.label.as_deref(), Some("camera"));
        assert_eq!(desc.kind, BufferKind::Dynamic);
        assert_eq!(desc.queue, QueueAffinity::Compute);
    }

    #[test]
    fn test_buffer_descriptor_defaults() {
        let desc = BufferDescriptor::new(64, BufferUsage::VERTEX);
        assert_eq!(desc.kind, BufferKind::Static);
        assert_eq!(desc.queue, QueueAffinity::Graphics);
    }
}
