//! Pass specifications.
//!
//! A [`PassSpecification`] is one unit of GPU work: the queue it runs on, its
//! pipeline, the resources it touches, the render targets it writes (graphics
//! only) and the callback that records its commands.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::resources::{BufferHandle, TextureHandle};
use crate::types::{ClearValue, QueueAffinity, ShaderStage, ShaderStages};

use super::context::{RecordFn, RenderContext};
use super::pipeline::{PipelineDescription, PipelineKind};
use super::target::{Attachment, RenderTarget};

// ============================================================================
// Resource access
// ============================================================================

/// Direction of a resource access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessDirection {
    /// The pass only reads.
    Read,
    /// The pass only writes.
    Write,
    /// The pass reads and writes.
    ReadWrite,
}

impl AccessDirection {
    /// Whether the pass consumes the resource.
    pub fn is_input(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether the pass produces the resource.
    pub fn is_output(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A GPU resource referenced (not owned) by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    /// A buffer.
    Buffer(BufferHandle),
    /// A texture.
    Texture(TextureHandle),
}

/// One resource a pass touches, and from which shader stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceAccess {
    /// The resource.
    pub resource: ResourceRef,
    /// Read, write or both.
    pub direction: AccessDirection,
    /// Stages that see the binding.
    pub stages: ShaderStages,
}

// ============================================================================
// Rejection reasons
// ============================================================================

/// Why a pass was refused when added to a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassRejection {
    /// A pass with this name already exists in the graph.
    DuplicateName,
    /// No command-recording callback was set.
    MissingCommands,
    /// A graphics pass declared no render target.
    NoRenderTarget,
    /// A compute pass declared a render target.
    RenderTargetOnComputePass,
    /// Render targets of different kinds were mixed in one pass.
    RenderTargetKindMismatch,
    /// The pipeline kind does not match the pass queue.
    PipelineKindMismatch {
        /// Queue the pass was declared for.
        queue: QueueAffinity,
        /// Kind of the supplied pipeline.
        pipeline: PipelineKind,
    },
    /// A graphics pipeline must have exactly one vertex stage.
    VertexStageCount(usize),
    /// A compute pipeline has no compute stage.
    MissingComputeStage,
}

impl fmt::Display for PassRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName => write!(f, "a pass with this name already exists"),
            Self::MissingCommands => write!(f, "no command callback set"),
            Self::NoRenderTarget => write!(f, "graphics pass has no render target"),
            Self::RenderTargetOnComputePass => {
                write!(f, "render targets cannot be attached to a compute pass")
            }
            Self::RenderTargetKindMismatch => write!(f, "render target kinds do not match"),
            Self::PipelineKindMismatch { queue, pipeline } => write!(
                f,
                "{pipeline:?} pipeline cannot run on the {} queue",
                queue.name()
            ),
            Self::VertexStageCount(count) => {
                write!(f, "expected exactly one vertex stage, found {count}")
            }
            Self::MissingComputeStage => write!(f, "compute pipeline has no compute stage"),
        }
    }
}

// ============================================================================
// Pass specification
// ============================================================================

/// One unit of GPU work within a [`RenderGraph`](super::RenderGraph).
pub struct PassSpecification {
    queue: QueueAffinity,
    pipeline: PipelineDescription,
    accesses: Vec<ResourceAccess>,
    attachments: Vec<Attachment>,
    record: Option<RecordFn>,
}

impl PassSpecification {
    /// Start a graphics pass using `pipeline`.
    pub fn graphics(pipeline: PipelineDescription) -> Self {
        Self::new(QueueAffinity::Graphics, pipeline)
    }

    /// Start a compute pass using `pipeline`.
    pub fn compute(pipeline: PipelineDescription) -> Self {
        Self::new(QueueAffinity::Compute, pipeline)
    }

    fn new(queue: QueueAffinity, pipeline: PipelineDescription) -> Self {
        Self {
            queue,
            pipeline,
            accesses: Vec::new(),
            attachments: Vec::new(),
            record: None,
        }
    }

    /// Declare a buffer access.
    pub fn with_buffer(
        mut self,
        buffer: BufferHandle,
        direction: AccessDirection,
        stages: ShaderStages,
    ) -> Self {
        self.accesses.push(ResourceAccess {
            resource: ResourceRef::Buffer(buffer),
            direction,
            stages,
        });
        self
    }

    /// Declare a texture access.
    pub fn with_texture(
        mut self,
        texture: TextureHandle,
        direction: AccessDirection,
        stages: ShaderStages,
    ) -> Self {
        self.accesses.push(ResourceAccess {
            resource: ResourceRef::Texture(texture),
            direction,
            stages,
        });
        self
    }

    /// Attach a render target that is cleared to `clear` at pass begin.
    pub fn with_render_target(mut self, target: RenderTarget, clear: ClearValue) -> Self {
        self.attachments.push(Attachment::clear(target, clear));
        self
    }

    /// Attach a render target whose contents are kept.
    pub fn with_loaded_render_target(mut self, target: RenderTarget) -> Self {
        self.attachments.push(Attachment::load(target));
        self
    }

    /// Set the command-recording callback.
    pub fn with_commands(mut self, record: impl FnMut(&mut dyn RenderContext) + 'static) -> Self {
        self.record = Some(Box::new(record));
        self
    }

    pub fn queue(&self) -> QueueAffinity {
        self.queue
    }

    pub fn pipeline(&self) -> &PipelineDescription {
        &self.pipeline
    }

    pub fn accesses(&self) -> &[ResourceAccess] {
        &self.accesses
    }

    /// Resources read by the pass (read or read-write).
    pub fn inputs(&self) -> impl Iterator<Item = &ResourceAccess> {
        self.accesses.iter().filter(|a| a.direction.is_input())
    }

    /// Resources written by the pass (write or read-write).
    pub fn outputs(&self) -> impl Iterator<Item = &ResourceAccess> {
        self.accesses.iter().filter(|a| a.direction.is_output())
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Whether a recording callback is set.
    pub fn has_commands(&self) -> bool {
        self.record.is_some()
    }

    /// Invoke the recording callback, if any.
    pub(crate) fn record(&mut self, ctx: &mut dyn RenderContext) {
        if let Some(record) = self.record.as_mut() {
            record(ctx);
        }
    }

    /// Check that the pass is complete and self-consistent.
    ///
    /// Name uniqueness is checked by the graph, not here.
    pub fn validate(&self) -> Result<(), PassRejection> {
        if self.record.is_none() {
            return Err(PassRejection::MissingCommands);
        }

        let expected = match self.queue {
            QueueAffinity::Graphics => PipelineKind::Graphics,
            QueueAffinity::Compute => PipelineKind::Compute,
        };
        if self.pipeline.kind() != expected {
            return Err(PassRejection::PipelineKindMismatch {
                queue: self.queue,
                pipeline: self.pipeline.kind(),
            });
        }

        match self.queue {
            QueueAffinity::Graphics => {
                if self.attachments.is_empty() {
                    return Err(PassRejection::NoRenderTarget);
                }
                let kind = self.attachments[0].target.kind();
                if self.attachments.iter().any(|a| a.target.kind() != kind) {
                    return Err(PassRejection::RenderTargetKindMismatch);
                }
                let vertex_stages = self.pipeline.vertex_stage_count();
                if vertex_stages != 1 {
                    return Err(PassRejection::VertexStageCount(vertex_stages));
                }
            }
            QueueAffinity::Compute => {
                if !self.attachments.is_empty() {
                    return Err(PassRejection::RenderTargetOnComputePass);
                }
                if self.pipeline.shader(ShaderStage::Compute).is_none() {
                    return Err(PassRejection::MissingComputeStage);
                }
            }
        }

        Ok(())
    }

    /// Feed the structure of this pass to `state`.
    ///
    /// The callback and the clear values are deliberately left out.
    pub(crate) fn hash_content<H: Hasher>(&self, state: &mut H) {
        self.queue.hash(state);
        self.pipeline.hash_content(state);

        self.accesses.len().hash(state);
        for access in &self.accesses {
            access.hash(state);
        }

        self.attachments.len().hash(state);
        for attachment in &self.attachments {
            attachment.hash_content(state);
        }
    }
}

impl fmt::Debug for PassSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassSpecification")
            .field("queue", &self.queue)
            .field("pipeline", &self.pipeline.kind())
            .field("accesses", &self.accesses.len())
            .field("attachments", &self.attachments.len())
            .field("has_commands", &self.record.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(ResourceAccess: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{TestHandles, compute_pipeline, graphics_pipeline, render_target};
    use crate::types::RenderTargetKind;

    #[test]
    fn test_inputs_and_outputs_split() {
        let handles = TestHandles::new();
        let pass = PassSpecification::compute(compute_pipeline())
            .with_buffer(handles.buffers[0], AccessDirection::Read, ShaderStages::COMPUTE)
            .with_buffer(handles.buffers[1], AccessDirection::Write, ShaderStages::COMPUTE)
            .with_texture(handles.textures[0], AccessDirection::ReadWrite, ShaderStages::COMPUTE);

        assert_eq!(pass.inputs().count(), 2);
        assert_eq!(pass.outputs().count(), 2);
    }

    #[test]
    fn test_valid_graphics_pass() {
        let target = render_target(RenderTargetKind::Color, false);
        let pass = PassSpecification::graphics(graphics_pipeline())
            .with_render_target(target, ClearValue::BLACK)
            .with_commands(|_| {});
        assert_eq!(pass.validate(), Ok(()));
    }

    #[test]
    fn test_missing_commands_rejected() {
        let target = render_target(RenderTargetKind::Color, false);
        let pass = PassSpecification::graphics(graphics_pipeline())
            .with_render_target(target, ClearValue::BLACK);
        assert_eq!(pass.validate(), Err(PassRejection::MissingCommands));
    }

    #[test]
    fn test_graphics_without_target_rejected() {
        let pass = PassSpecification::graphics(graphics_pipeline()).with_commands(|_| {});
        assert_eq!(pass.validate(), Err(PassRejection::NoRenderTarget));
    }

    #[test]
    fn test_compute_with_target_rejected() {
        let target = render_target(RenderTargetKind::Color, false);
        let pass = PassSpecification::compute(compute_pipeline())
            .with_render_target(target, ClearValue::BLACK)
            .with_commands(|_| {});
        assert_eq!(pass.validate(), Err(PassRejection::RenderTargetOnComputePass));
    }

    #[test]
    fn test_mixed_target_kinds_rejected() {
        let pass = PassSpecification::graphics(graphics_pipeline())
            .with_render_target(
                render_target(RenderTargetKind::Color, false),
                ClearValue::BLACK,
            )
            .with_render_target(
                render_target(RenderTargetKind::Depth, false),
                ClearValue::DEPTH_ONE,
            )
            .with_commands(|_| {});
        assert_eq!(pass.validate(), Err(PassRejection::RenderTargetKindMismatch));
    }

    #[test]
    fn test_pipeline_kind_mismatch_rejected() {
        let pass = PassSpecification::compute(graphics_pipeline()).with_commands(|_| {});
        assert!(matches!(
            pass.validate(),
            Err(PassRejection::PipelineKindMismatch { .. })
        ));
    }

    #[test]
    fn test_graphics_without_vertex_stage_rejected() {
        let target = render_target(RenderTargetKind::Color, false);
        let pass = PassSpecification::graphics(PipelineDescription::graphics())
            .with_render_target(target, ClearValue::BLACK)
            .with_commands(|_| {});
        assert_eq!(pass.validate(), Err(PassRejection::VertexStageCount(0)));
    }

    #[test]
    fn test_compute_without_compute_stage_rejected() {
        let pass = PassSpecification::compute(PipelineDescription::compute()).with_commands(|_| {});
        assert_eq!(pass.validate(), Err(PassRejection::MissingComputeStage));
    }

    #[test]
    fn test_rejection_display() {
        assert_eq!(
            PassRejection::VertexStageCount(2).to_string(),
            "expected exactly one vertex stage, found 2"
        );
    }
}
