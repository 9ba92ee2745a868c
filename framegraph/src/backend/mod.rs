//! GPU backend abstraction layer.
//!
//! The frame graph talks to the GPU through a single [`Backend`] trait,
//! implemented once per GPU API and chosen at build time. There is no
//! runtime dispatch between APIs: [`DefaultBackend`] names the one compiled
//! into this build.
//!
//! # Available Backends
//!
//! - `dummy` (default): headless backend that simulates queues, fences and
//!   surfaces, and records every call for inspection
//! - `vulkan-backend`: native Vulkan backend using ash (dynamic rendering,
//!   synchronization2, gpu-allocator)
//!
//! # Architecture
//!
//! Each backend provides:
//! - Resource creation (buffers, textures)
//! - Synchronization primitives (fences, binary semaphores)
//! - Pipeline and binding-table objects for compiled passes
//! - Command recording, queue submission
//! - Presentation surfaces (acquire, recreate, present)
//!
//! All handle types except buffers and textures are `Copy` identifiers; their
//! lifetime is managed explicitly through the matching `destroy_*` call.

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::fmt;

use crate::compiler::{AttachmentFormats, BindingLayout};
use crate::error::GraphicsError;
use crate::graph::{LoadOp, PipelineDescription};
use crate::swapchain::{PresentMode, Window};
use crate::types::{
    BufferDescriptor, Extent2d, IndexFormat, QueueAffinity, ShaderStages, TextureDescriptor,
    TextureFormat,
};

pub use dummy::DummyBackend;

#[cfg(feature = "vulkan-backend")]
pub use vulkan::VulkanBackend;

/// The backend compiled into this build.
#[cfg(feature = "vulkan-backend")]
pub type DefaultBackend = vulkan::VulkanBackend;

/// The backend compiled into this build.
#[cfg(not(feature = "vulkan-backend"))]
pub type DefaultBackend = dummy::DummyBackend;

// ============================================================================
// Submission and presentation descriptors
// ============================================================================

/// Pipeline point at which a semaphore wait blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitStage {
    /// Before writing color attachments (swapchain image acquisition).
    ColorAttachmentOutput,
    /// Before any command of the submission.
    AllCommands,
}

/// A semaphore wait attached to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreWait<S> {
    /// Semaphore to wait on.
    pub semaphore: S,
    /// Stage that blocks.
    pub stage: WaitStage,
}

/// One queue submission.
#[derive(Debug)]
pub struct Submission<'a, B: Backend> {
    /// Queue to submit to.
    pub queue: QueueAffinity,
    /// Recorded command buffers, executed in order.
    pub command_buffers: &'a [B::CommandBuffer],
    /// Semaphores waited on before execution.
    pub waits: &'a [SemaphoreWait<B::Semaphore>],
    /// Semaphores signaled on completion.
    pub signals: &'a [B::Semaphore],
    /// Fence signaled on completion.
    pub fence: Option<B::Fence>,
}

/// Result of acquiring a presentation image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is (or will be, once the semaphore signals) ready.
    Acquired(u32),
    /// Acquired, but the surface no longer matches the window exactly.
    Suboptimal(u32),
    /// The surface must be recreated before it can be used.
    OutOfDate,
}

/// Result of presenting one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented.
    Presented,
    /// Presented, but the surface should be recreated.
    Suboptimal,
    /// Not presented; the surface must be recreated.
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the surface should be rebuilt before its next use.
    pub fn needs_recreation(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// One surface image to present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentRequest<S> {
    /// Surface to present.
    pub surface: S,
    /// Image acquired this frame.
    pub image_index: u32,
}

/// Properties of a (re)created presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Format of the presentable images.
    pub format: TextureFormat,
    /// Size of the presentable images.
    pub extent: Extent2d,
    /// Number of images in rotation.
    pub image_count: u32,
}

// ============================================================================
// Recording descriptors
// ============================================================================

/// A resource bound into a binding table.
#[derive(Debug)]
pub enum BoundResource<'a, B: Backend> {
    /// A buffer instance.
    Buffer(&'a B::Buffer),
    /// A texture.
    Texture(&'a B::Texture),
}

/// The image behind a rendering attachment.
#[derive(Debug)]
pub enum AttachmentImage<'a, B: Backend> {
    /// An offscreen texture.
    Texture(&'a B::Texture),
    /// The image acquired from a presentation surface this frame.
    Surface {
        /// The surface.
        surface: B::Surface,
        /// Acquired image index.
        image_index: u32,
    },
}

/// A single color or depth attachment for dynamic rendering.
#[derive(Debug)]
pub struct RenderingAttachment<'a, B: Backend> {
    /// Image to render into.
    pub image: AttachmentImage<'a, B>,
    /// Load behavior; depth attachments clear to 1.0 when this is a clear.
    pub load: LoadOp,
}

/// Attachments and extent for one graphics pass.
#[derive(Debug)]
pub struct RenderingInfo<'a, B: Backend> {
    /// Render area (viewport and scissor cover it fully).
    pub extent: Extent2d,
    /// Color attachments in declaration order.
    pub colors: Vec<RenderingAttachment<'a, B>>,
    /// Optional depth attachment.
    pub depth: Option<RenderingAttachment<'a, B>>,
}

// ============================================================================
// Backend trait
// ============================================================================

/// A GPU API implementation.
///
/// Methods take `&mut self`: the host side of the frame graph is single
/// threaded, so backends need no internal locking for their own state.
pub trait Backend: Sized + 'static {
    /// Device buffer.
    type Buffer: fmt::Debug;
    /// Device texture.
    type Texture: fmt::Debug;
    /// Host-observable completion signal.
    type Fence: Copy + Eq + fmt::Debug;
    /// Device-only binary semaphore.
    type Semaphore: Copy + Eq + fmt::Debug;
    /// Pipeline object.
    type Pipeline: Copy + fmt::Debug;
    /// Binding table (descriptor set) for one pass and frame slot.
    type BindingTable: Copy + fmt::Debug;
    /// Command buffer.
    type CommandBuffer: Copy + fmt::Debug;
    /// Presentation surface together with its image rotation.
    type Surface: Copy + Eq + fmt::Debug;

    /// Human readable backend name.
    fn name(&self) -> &'static str;

    // --- Resources ---------------------------------------------------------

    /// Create a buffer.
    fn create_buffer(&mut self, descriptor: &BufferDescriptor)
    -> Result<Self::Buffer, GraphicsError>;

    /// Write `data` into a host-visible buffer at `offset`.
    fn write_buffer(
        &mut self,
        buffer: &Self::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError>;

    /// Destroy a buffer. The device must no longer use it.
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// Create a texture.
    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<Self::Texture, GraphicsError>;

    /// Destroy a texture. The device must no longer use it.
    fn destroy_texture(&mut self, texture: Self::Texture);

    // --- Synchronization ---------------------------------------------------

    /// Create a fence.
    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence, GraphicsError>;

    /// Destroy a fence.
    fn destroy_fence(&mut self, fence: Self::Fence);

    /// Block until every fence is signaled. Unbounded.
    fn wait_for_fences(&mut self, fences: &[Self::Fence]) -> Result<(), GraphicsError>;

    /// Return fences to the unsignaled state.
    fn reset_fences(&mut self, fences: &[Self::Fence]) -> Result<(), GraphicsError>;

    /// Non-blocking fence query.
    fn is_fence_signaled(&self, fence: Self::Fence) -> Result<bool, GraphicsError>;

    /// Create a binary semaphore.
    fn create_semaphore(&mut self) -> Result<Self::Semaphore, GraphicsError>;

    /// Destroy a semaphore.
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);

    /// Block until every queue is drained.
    fn wait_idle(&mut self) -> Result<(), GraphicsError>;

    // --- Compiled objects --------------------------------------------------

    /// Instantiate a pipeline for a pass.
    fn create_pipeline(
        &mut self,
        description: &PipelineDescription,
        layout: &BindingLayout,
        formats: &AttachmentFormats,
    ) -> Result<Self::Pipeline, GraphicsError>;

    /// Destroy a pipeline.
    fn destroy_pipeline(&mut self, pipeline: Self::Pipeline);

    /// Allocate and fill a binding table; `resources[i]` goes to binding `i`.
    fn create_binding_table(
        &mut self,
        pipeline: Self::Pipeline,
        layout: &BindingLayout,
        resources: &[BoundResource<'_, Self>],
    ) -> Result<Self::BindingTable, GraphicsError>;

    /// Release a binding table.
    fn destroy_binding_table(&mut self, table: Self::BindingTable);

    // --- Recording ---------------------------------------------------------

    /// Allocate a command buffer for `queue`.
    fn create_command_buffer(
        &mut self,
        queue: QueueAffinity,
    ) -> Result<Self::CommandBuffer, GraphicsError>;

    /// Free a command buffer.
    fn destroy_command_buffer(&mut self, command_buffer: Self::CommandBuffer);

    /// Reset and begin recording.
    fn begin_commands(&mut self, command_buffer: Self::CommandBuffer) -> Result<(), GraphicsError>;

    /// Finish recording.
    fn end_commands(&mut self, command_buffer: Self::CommandBuffer) -> Result<(), GraphicsError>;

    /// Full memory dependency between two passes recorded into one buffer.
    fn pass_barrier(&mut self, command_buffer: Self::CommandBuffer);

    /// Begin dynamic rendering into the given attachments.
    fn begin_rendering(
        &mut self,
        command_buffer: Self::CommandBuffer,
        info: &RenderingInfo<'_, Self>,
    );

    /// End dynamic rendering; surface images become presentable.
    fn end_rendering(
        &mut self,
        command_buffer: Self::CommandBuffer,
        info: &RenderingInfo<'_, Self>,
    );

    /// Bind a pipeline.
    fn bind_pipeline(&mut self, command_buffer: Self::CommandBuffer, pipeline: Self::Pipeline);

    /// Bind a binding table for `pipeline`.
    fn bind_binding_table(
        &mut self,
        command_buffer: Self::CommandBuffer,
        pipeline: Self::Pipeline,
        table: Self::BindingTable,
    );

    /// Bind vertex buffers to stream slots `0..buffers.len()`.
    fn bind_vertex_buffers(
        &mut self,
        command_buffer: Self::CommandBuffer,
        buffers: &[&Self::Buffer],
    );

    /// Bind an index buffer.
    fn bind_index_buffer(
        &mut self,
        command_buffer: Self::CommandBuffer,
        buffer: &Self::Buffer,
        format: IndexFormat,
    );

    /// Upload push constants.
    fn push_constants(
        &mut self,
        command_buffer: Self::CommandBuffer,
        pipeline: Self::Pipeline,
        stages: ShaderStages,
        data: &[u8],
    );

    /// Non-indexed draw.
    fn draw(
        &mut self,
        command_buffer: Self::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    /// Indexed draw.
    fn draw_indexed(
        &mut self,
        command_buffer: Self::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Compute dispatch.
    fn dispatch(&mut self, command_buffer: Self::CommandBuffer, x: u32, y: u32, z: u32);

    /// Submit recorded work to a queue.
    fn submit(&mut self, submission: &Submission<'_, Self>) -> Result<(), GraphicsError>;

    // --- Presentation ------------------------------------------------------

    /// Create a surface and its image rotation for `window`.
    fn create_surface(
        &mut self,
        window: &dyn Window,
        present_mode: PresentMode,
    ) -> Result<(Self::Surface, SurfaceInfo), GraphicsError>;

    /// Tear down and rebuild the image rotation at `extent`.
    fn recreate_surface(
        &mut self,
        surface: Self::Surface,
        extent: Extent2d,
    ) -> Result<SurfaceInfo, GraphicsError>;

    /// Destroy a surface. The device must no longer use it.
    fn destroy_surface(&mut self, surface: Self::Surface);

    /// Request the next image; `signal` fires when it is ready for rendering.
    fn acquire_next_image(
        &mut self,
        surface: Self::Surface,
        signal: Self::Semaphore,
    ) -> Result<AcquireOutcome, GraphicsError>;

    /// Present every request in one call, after all `waits` are signaled.
    ///
    /// Returns one outcome per request, in order.
    fn present(
        &mut self,
        requests: &[PresentRequest<Self::Surface>],
        waits: &[Self::Semaphore],
    ) -> Result<Vec<PresentOutcome>, GraphicsError>;
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "vulkan-backend")
}
