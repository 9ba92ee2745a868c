//! The capability object handed to pass recording callbacks.

use crate::resources::BufferHandle;
use crate::types::{IndexFormat, QueueAffinity, ShaderStages};

/// Draw, dispatch and bind operations scoped to a single pass.
///
/// An implementation is only alive for the duration of one callback
/// invocation: the pass's pipeline and binding table are already bound when
/// the callback runs, and the object cannot be kept past it. Misuse (drawing
/// in a compute pass, indexed draws without an index buffer, stale handles)
/// is logged as a warning and the call is ignored.
pub trait RenderContext {
    /// Queue the pass is recorded on.
    fn queue(&self) -> QueueAffinity;

    /// Index of the frame slot being recorded.
    fn frame_slot(&self) -> usize;

    /// Bind vertex buffers to consecutive stream slots starting at 0.
    fn bind_vertex_buffers(&mut self, buffers: &[BufferHandle]);

    /// Bind the index buffer for subsequent indexed draws.
    fn bind_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    /// Upload push constants visible to `stages`.
    fn push_constants(&mut self, stages: ShaderStages, data: &[u8]);

    /// Non-indexed draw.
    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    /// Indexed draw.
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Compute dispatch.
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}

/// Command-recording callback of a pass.
pub type RecordFn = Box<dyn FnMut(&mut dyn RenderContext)>;
