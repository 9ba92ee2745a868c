//! The [`RenderContext`] handed to pass callbacks.

use crate::backend::Backend;
use crate::compiler::CompiledPass;
use crate::graph::RenderContext;
use crate::resources::{BufferHandle, ResourceRegistry};
use crate::types::{IndexFormat, QueueAffinity, ShaderStages};

/// Recording capability for a single pass.
///
/// Borrowed from the execution engine for one callback invocation only.
/// Calls that make no sense for the pass are logged and dropped instead of
/// reaching the backend.
pub struct PassContext<'a, B: Backend> {
    backend: &'a mut B,
    resources: &'a ResourceRegistry<B>,
    pass: &'a CompiledPass<B>,
    command_buffer: B::CommandBuffer,
    slot: usize,
    vertex_buffers_bound: bool,
    index_buffer_bound: bool,
}

impl<'a, B: Backend> PassContext<'a, B> {
    pub(crate) fn new(
        backend: &'a mut B,
        resources: &'a ResourceRegistry<B>,
        pass: &'a CompiledPass<B>,
        command_buffer: B::CommandBuffer,
        slot: usize,
    ) -> Self {
        Self {
            backend,
            resources,
            pass,
            command_buffer,
            slot,
            vertex_buffers_bound: false,
            index_buffer_bound: false,
        }
    }

    fn require_queue(&self, queue: QueueAffinity, operation: &str) -> bool {
        if self.pass.queue() == queue {
            return true;
        }
        log::warn!(
            "Pass '{}': {operation} is not allowed on the {} queue, ignored",
            self.pass.name(),
            self.pass.queue().name()
        );
        false
    }

    fn vertex_input_ready(&self) -> bool {
        if self.pass.description().vertex_streams().is_empty() || self.vertex_buffers_bound {
            return true;
        }
        log::warn!(
            "Pass '{}': draw without vertex buffers on a pipeline with vertex streams, ignored",
            self.pass.name()
        );
        false
    }
}

impl<B: Backend> RenderContext for PassContext<'_, B> {
    fn queue(&self) -> QueueAffinity {
        self.pass.queue()
    }

    fn frame_slot(&self) -> usize {
        self.slot
    }

    fn bind_vertex_buffers(&mut self, buffers: &[BufferHandle]) {
        if !self.require_queue(QueueAffinity::Graphics, "binding vertex buffers") {
            return;
        }
        let mut resolved = Vec::with_capacity(buffers.len());
        for &handle in buffers {
            match self.resources.buffer(handle, self.slot) {
                Some(buffer) => resolved.push(buffer),
                None => {
                    log::warn!(
                        "Pass '{}': stale vertex buffer {handle:?}, ignored",
                        self.pass.name()
                    );
                    return;
                }
            }
        }
        self.backend.bind_vertex_buffers(self.command_buffer, &resolved);
        self.vertex_buffers_bound = !resolved.is_empty();
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        if !self.require_queue(QueueAffinity::Graphics, "binding an index buffer") {
            return;
        }
        let Some(resolved) = self.resources.buffer(buffer, self.slot) else {
            log::warn!(
                "Pass '{}': stale index buffer {buffer:?}, ignored",
                self.pass.name()
            );
            return;
        };
        self.backend
            .bind_index_buffer(self.command_buffer, resolved, format);
        self.index_buffer_bound = true;
    }

    fn push_constants(&mut self, stages: ShaderStages, data: &[u8]) {
        let declared = self.pass.description().push_constant_size(stages) as usize;
        if data.len() > declared {
            log::warn!(
                "Pass '{}': {} push-constant bytes exceed {declared} declared for {stages:?}",
                self.pass.name(),
                data.len()
            );
            return;
        }
        self.backend
            .push_constants(self.command_buffer, self.pass.pipeline(), stages, data);
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        if !self.require_queue(QueueAffinity::Graphics, "draw") || !self.vertex_input_ready() {
            return;
        }
        self.backend.draw(
            self.command_buffer,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        );
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        if !self.require_queue(QueueAffinity::Graphics, "indexed draw") {
            return;
        }
        if !self.index_buffer_bound {
            log::warn!(
                "Pass '{}': indexed draw without an index buffer, ignored",
                self.pass.name()
            );
            return;
        }
        if !self.vertex_input_ready() {
            return;
        }
        self.backend.draw_indexed(
            self.command_buffer,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        );
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if !self.require_queue(QueueAffinity::Compute, "dispatch") {
            return;
        }
        self.backend.dispatch(self.command_buffer, x, y, z);
    }
}
