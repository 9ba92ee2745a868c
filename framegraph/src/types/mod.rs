//! Common types and descriptors for frame graph resources.
//!
//! This module contains queue identifiers, format enums, usage flags, and
//! descriptor structs used throughout the crate.

mod buffer;
mod common;
mod texture;
mod vertex;

pub use buffer::{BufferDescriptor, BufferKind, BufferUsage, IndexFormat};
pub use common::{
    ClearValue, Extent2d, PerQueue, QueueAffinity, QueueMask, ShaderStage, ShaderStages,
};
pub use texture::{
    RenderTargetDescriptor, RenderTargetKind, TextureDescriptor, TextureFormat, TextureUsage,
};
pub use vertex::{VertexAttribute, VertexFormat, VertexInputRate, VertexStream};
