//! # RedLilium Frame Graph
//!
//! Render-graph compiler and multi-queue frame synchronization for the
//! RedLilium engine.
//!
//! ## Overview
//!
//! An application describes each frame as a [`RenderGraph`]: an ordered list
//! of named graphics and compute passes, each with a pipeline description,
//! the resources it reads and writes, its render targets and a recording
//! callback. The [`Renderer`] then:
//!
//! - compiles the graph into queue batches, pipelines and binding tables,
//!   caching the result until the graph's structure changes ([`compiler`])
//! - keeps up to `frames_in_flight` frames on the device, one fence per queue
//!   per frame slot ([`pipeline`])
//! - chains batches across the graphics and compute queues with ping-pong
//!   semaphores ([`scheduler`])
//! - acquires, recreates and presents window surfaces ([`swapchain`])
//! - replays the passes into command buffers ([`executor`])
//!
//! The GPU is reached through the [`Backend`] trait. [`DummyBackend`] is a
//! headless implementation used by the tests; `VulkanBackend` is built with
//! the `vulkan-backend` feature.
//!
//! ## Example
//!
//! ```
//! use redlilium_framegraph::{
//!     AccessDirection, BufferDescriptor, BufferUsage, DummyBackend, PassSpecification,
//!     PipelineDescription, RenderGraph, Renderer, RendererConfig, ShaderBinary, ShaderStage,
//!     ShaderStages,
//! };
//!
//! let mut renderer = Renderer::new(DummyBackend::new(), RendererConfig::default())?;
//! let particles = renderer.create_buffer(&BufferDescriptor::new(4096, BufferUsage::STORAGE))?;
//!
//! let simulate = PipelineDescription::compute()
//!     .with_shader(ShaderBinary::new(ShaderStage::Compute, "main", vec![0x0723_0203]));
//!
//! let mut graph = RenderGraph::new();
//! graph.add_pass(
//!     "simulate",
//!     PassSpecification::compute(simulate)
//!         .with_buffer(particles, AccessDirection::ReadWrite, ShaderStages::COMPUTE)
//!         .with_commands(|ctx| ctx.dispatch(64, 1, 1)),
//! );
//! renderer.render(graph)?;
//! assert_eq!(renderer.frame_count(), 1);
//! # Ok::<(), redlilium_framegraph::GraphicsError>(())
//! ```

pub mod backend;
pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pipeline;
pub mod profiling;
pub mod renderer;
pub mod resources;
pub mod scheduler;
pub mod swapchain;
pub mod types;

#[cfg(test)]
mod test_util;

// Re-export main types for convenience
pub use backend::{Backend, DefaultBackend, DummyBackend};
#[cfg(feature = "vulkan-backend")]
pub use backend::VulkanBackend;
pub use compiler::{Batch, CompiledFrame, CompiledPass, CompilerStats, GraphCompiler};
pub use config::{MAX_FRAMES_IN_FLIGHT, RendererConfig};
pub use error::GraphicsError;
pub use executor::PassContext;
pub use graph::{
    AccessDirection, Attachment, CullMode, LoadOp, PassRejection, PassSpecification,
    PipelineDescription, PipelineKind, PrimitiveTopology, RenderContext, RenderGraph,
    RenderTarget, ShaderBinary,
};
pub use pipeline::FramePipeline;
pub use renderer::Renderer;
pub use resources::{BufferHandle, RenderTargetHandle, SurfaceId, TextureHandle};
pub use scheduler::{SubmissionPlanner, SyncPair};
pub use swapchain::{AcquireResult, PresentMode, PresentationManager, Window};
pub use types::{
    BufferDescriptor, BufferKind, BufferUsage, ClearValue, Extent2d, IndexFormat, QueueAffinity,
    QueueMask, RenderTargetDescriptor, RenderTargetKind, ShaderStage, ShaderStages,
    TextureDescriptor, TextureFormat, TextureUsage, VertexFormat, VertexStream,
};

/// Frame graph library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the frame graph subsystem.
///
/// Logs the library version and starts the profiler client when the
/// `profiling` feature is enabled.
pub fn init() {
    profiling::start();
    log::info!("RedLilium Frame Graph v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_render_graph_creation() {
        let graph = RenderGraph::new();
        assert!(graph.passes().is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }
}
