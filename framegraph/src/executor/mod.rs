//! Execution engine: replays a compiled frame into command buffers.
//!
//! For every batch the engine opens a recording scope on the batch's queue,
//! records each pass (pipeline, binding table, the application callback),
//! closes the scope and submits it with the waits and signals planned by the
//! [`SubmissionPlanner`](crate::scheduler::SubmissionPlanner).
//!
//! # Recording scopes
//!
//! Each frame slot owns one scope per batch. A scope moves through
//!
//! ```text
//! Idle ──begin──► Recording ──end+submit──► Submitted ──fence signaled──► Idle
//! ```
//!
//! and refuses to begin again while `Submitted`: its command buffer may
//! still be executing. Scopes of a slot return to `Idle` when the frame
//! pipeline has waited on that slot's fences.
//!
//! # Pass replay
//!
//! Passes of a batch run in declaration order with a full memory barrier
//! between consecutive passes. A pass that renders into a surface which is
//! unavailable this frame (minimized window, unrecoverable out-of-date) is
//! skipped; the rest of the frame still runs.

mod context;

use crate::backend::{
    AttachmentImage, Backend, RenderingAttachment, RenderingInfo, Submission,
};
use crate::compiler::{CompiledFrame, CompiledPass};
use crate::error::GraphicsError;
use crate::graph::{Attachment, RenderGraph};
use crate::resources::{RenderTargetStorage, ResourceRegistry, SurfaceId};
use crate::scheduler::FramePlan;
use crate::swapchain::PresentationManager;
use crate::types::{Extent2d, QueueAffinity};

pub use context::PassContext;

/// State of a recording scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Idle,
    Recording,
    Submitted,
}

/// A command buffer with its lifecycle state.
#[derive(Debug)]
pub struct RecordingScope<B: Backend> {
    command_buffer: B::CommandBuffer,
    queue: QueueAffinity,
    state: ScopeState,
}

impl<B: Backend> RecordingScope<B> {
    fn new(backend: &mut B, queue: QueueAffinity) -> Result<Self, GraphicsError> {
        Ok(Self {
            command_buffer: backend.create_command_buffer(queue)?,
            queue,
            state: ScopeState::Idle,
        })
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn queue(&self) -> QueueAffinity {
        self.queue
    }

    pub fn command_buffer(&self) -> B::CommandBuffer {
        self.command_buffer
    }

    /// Idle → Recording.
    pub fn begin(&mut self, backend: &mut B) -> Result<(), GraphicsError> {
        if self.state != ScopeState::Idle {
            return Err(GraphicsError::Internal(format!(
                "recording scope on the {} queue begun while {:?}",
                self.queue.name(),
                self.state
            )));
        }
        backend.begin_commands(self.command_buffer)?;
        self.state = ScopeState::Recording;
        Ok(())
    }

    /// Close the recording. The scope stays `Recording` until submitted.
    pub fn end(&mut self, backend: &mut B) -> Result<(), GraphicsError> {
        if self.state != ScopeState::Recording {
            return Err(GraphicsError::Internal(format!(
                "recording scope ended while {:?}",
                self.state
            )));
        }
        backend.end_commands(self.command_buffer)
    }

    /// Recording → Submitted.
    pub fn mark_submitted(&mut self) {
        self.state = ScopeState::Submitted;
    }

    /// Submitted → Idle, once the slot's fences were waited on.
    pub fn retire(&mut self) {
        if self.state == ScopeState::Submitted {
            self.state = ScopeState::Idle;
        }
    }
}

/// Per-frame-slot recording scopes and the replay loop.
pub struct ExecutionEngine<B: Backend> {
    /// `scopes[slot][batch]`.
    scopes: Vec<Vec<RecordingScope<B>>>,
}

impl<B: Backend> ExecutionEngine<B> {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            scopes: (0..frames_in_flight).map(|_| Vec::new()).collect(),
        }
    }

    /// Return the scopes of `slot` to `Idle`. Call after the slot's fences
    /// were waited on.
    pub fn retire_slot(&mut self, slot: usize) {
        for scope in &mut self.scopes[slot] {
            scope.retire();
        }
    }

    /// Scopes of `slot`, by batch index.
    pub fn scopes(&self, slot: usize) -> &[RecordingScope<B>] {
        &self.scopes[slot]
    }

    /// Make sure `slot` has an idle scope on the right queue for every batch.
    fn prepare_scopes(
        &mut self,
        backend: &mut B,
        slot: usize,
        frame: &CompiledFrame<B>,
    ) -> Result<(), GraphicsError> {
        let scopes = &mut self.scopes[slot];
        for (index, batch) in frame.batches().iter().enumerate() {
            match scopes.get(index) {
                Some(scope) if scope.queue == batch.queue() => {}
                Some(scope) if scope.state != ScopeState::Idle => {
                    return Err(GraphicsError::Internal(format!(
                        "scope {index} of slot {slot} reused while {:?}",
                        scope.state
                    )));
                }
                Some(_) => {
                    let fresh = RecordingScope::new(backend, batch.queue())?;
                    let old = std::mem::replace(&mut scopes[index], fresh);
                    backend.destroy_command_buffer(old.command_buffer);
                }
                None => scopes.push(RecordingScope::new(backend, batch.queue())?),
            }
        }
        Ok(())
    }

    /// Record and submit every batch of `frame` for frame slot `slot`.
    ///
    /// `available` lists the surfaces that acquired an image this frame.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        backend: &mut B,
        resources: &ResourceRegistry<B>,
        surfaces: &PresentationManager<B>,
        frame: &CompiledFrame<B>,
        graph: &mut RenderGraph,
        slot: usize,
        plan: &FramePlan<B>,
        available: &[SurfaceId],
    ) -> Result<(), GraphicsError> {
        if graph.len() != frame.passes().len() {
            return Err(GraphicsError::Internal(format!(
                "graph has {} passes, compiled frame has {}",
                graph.len(),
                frame.passes().len()
            )));
        }

        self.prepare_scopes(backend, slot, frame)?;

        for (index, batch) in frame.batches().iter().enumerate() {
            let scope = &mut self.scopes[slot][index];
            scope.begin(backend)?;
            let command_buffer = scope.command_buffer;

            let mut recorded = 0usize;
            for pass_index in batch.passes() {
                let compiled = &frame.passes()[pass_index];
                if let Some(surface) = compiled
                    .surfaces()
                    .iter()
                    .find(|s| !available.contains(*s))
                {
                    log::debug!(
                        "Skipping pass '{}': surface {surface:?} unavailable this frame",
                        compiled.name()
                    );
                    continue;
                }

                if recorded > 0 {
                    backend.pass_barrier(command_buffer);
                }
                let named = &mut graph.passes_mut()[pass_index];
                let attachments = named.spec().attachments().to_vec();
                record_pass(
                    backend,
                    resources,
                    surfaces,
                    compiled,
                    &attachments,
                    command_buffer,
                    slot,
                    |ctx| named.spec_mut().record(ctx),
                )?;
                recorded += 1;
            }

            scope.end(backend)?;

            let sync = plan.batches.get(index).ok_or_else(|| {
                GraphicsError::Internal(format!("no synchronization planned for batch {index}"))
            })?;
            backend.submit(&Submission {
                queue: batch.queue(),
                command_buffers: &[command_buffer],
                waits: &sync.waits,
                signals: &sync.signals,
                fence: sync.fence,
            })?;
            scope.mark_submitted();

            log::trace!(
                "Submitted batch {index} on the {} queue ({recorded} passes)",
                batch.queue().name()
            );
        }

        Ok(())
    }

    /// Free every command buffer. The device must be idle.
    pub fn destroy(&mut self, backend: &mut B) {
        for slot in &mut self.scopes {
            for scope in slot.drain(..) {
                backend.destroy_command_buffer(scope.command_buffer);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn record_pass<B: Backend>(
    backend: &mut B,
    resources: &ResourceRegistry<B>,
    surfaces: &PresentationManager<B>,
    compiled: &CompiledPass<B>,
    attachments: &[Attachment],
    command_buffer: B::CommandBuffer,
    slot: usize,
    record: impl FnOnce(&mut PassContext<'_, B>),
) -> Result<(), GraphicsError> {
    let rendering = match compiled.queue() {
        QueueAffinity::Graphics => {
            Some(rendering_info(resources, surfaces, compiled.name(), attachments)?)
        }
        QueueAffinity::Compute => None,
    };

    if let Some(info) = &rendering {
        backend.begin_rendering(command_buffer, info);
    }
    backend.bind_pipeline(command_buffer, compiled.pipeline());
    if let Some(table) = compiled.binding_table(slot) {
        backend.bind_binding_table(command_buffer, compiled.pipeline(), table);
    }

    {
        let mut ctx = PassContext::new(backend, resources, compiled, command_buffer, slot);
        record(&mut ctx);
    }

    if let Some(info) = &rendering {
        backend.end_rendering(command_buffer, info);
    }
    Ok(())
}

/// Resolve a graphics pass's attachments to backend images.
///
/// Colors come from every attachment that has color; depth comes from the
/// first attachment that has depth. The render area is the extent of the
/// first attachment.
fn rendering_info<'a, B: Backend>(
    resources: &'a ResourceRegistry<B>,
    surfaces: &PresentationManager<B>,
    pass: &str,
    attachments: &[Attachment],
) -> Result<RenderingInfo<'a, B>, GraphicsError> {
    let mut info = RenderingInfo {
        extent: Extent2d::default(),
        colors: Vec::new(),
        depth: None,
    };

    for (index, attachment) in attachments.iter().enumerate() {
        let handle = attachment.target.handle();
        let missing =
            || GraphicsError::InvalidHandle(format!("render target {handle:?} of pass '{pass}'"));
        let storage = resources.render_target_storage(handle).ok_or_else(missing)?;

        let (extent, color, depth) = match storage {
            RenderTargetStorage::Surface(surface) => {
                let extent = surfaces.extent(surface).ok_or_else(missing)?;
                let backend_surface = surfaces.backend_surface(surface).ok_or_else(missing)?;
                let image_index = surfaces.image_index(surface).ok_or_else(missing)?;
                let image = AttachmentImage::Surface {
                    surface: backend_surface,
                    image_index,
                };
                (extent, Some(image), None)
            }
            RenderTargetStorage::Offscreen { color, depth } => {
                let extent = resources.render_target_extent(handle).ok_or_else(missing)?;
                let color = color
                    .and_then(|t| resources.texture(t))
                    .map(AttachmentImage::Texture);
                let depth = depth
                    .and_then(|t| resources.texture(t))
                    .map(AttachmentImage::Texture);
                (extent, color, depth)
            }
        };

        if index == 0 {
            info.extent = extent;
        }
        if let Some(image) = color {
            info.colors.push(RenderingAttachment {
                image,
                load: attachment.load,
            });
        }
        if info.depth.is_none()
            && let Some(image) = depth
        {
            info.depth = Some(RenderingAttachment {
                image,
                load: attachment.load,
            });
        }
    }

    Ok(info)
}

#[cfg(test)]
mod tests;
