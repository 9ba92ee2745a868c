//! Pipeline descriptions.
//!
//! A [`PipelineDescription`] is plain data: shader binaries keyed by stage,
//! push-constant ranges, vertex streams and a little fixed-function state.
//! The compiler turns it into a backend pipeline object. Builder methods
//! refuse inconsistent input with a warning and leave the description
//! unchanged.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::types::{ShaderStage, ShaderStages, VertexStream};

use super::hash::ContentHasher;

/// Kind of pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineKind {
    /// Vertex/fragment rasterization pipeline.
    #[default]
    Graphics,
    /// Compute pipeline.
    Compute,
}

/// Backend-ready shader code for one stage.
///
/// Produced by the shader compilation collaborator; the code is SPIR-V words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBinary {
    /// Stage this binary runs at.
    pub stage: ShaderStage,
    /// Entry point name.
    pub entry_point: String,
    /// Compiled code.
    pub code: Arc<[u32]>,
}

impl ShaderBinary {
    /// Create a shader binary.
    pub fn new(
        stage: ShaderStage,
        entry_point: impl Into<String>,
        code: impl Into<Arc<[u32]>>,
    ) -> Self {
        Self {
            stage,
            entry_point: entry_point.into(),
            code: code.into(),
        }
    }
}

/// A push-constant range visible to a set of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Stages that see the range.
    pub stages: ShaderStages,
    /// Size in bytes.
    pub size: u32,
}

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Separate triangles.
    #[default]
    TriangleList,
    /// Triangle strip.
    TriangleStrip,
    /// Separate lines.
    LineList,
    /// Points.
    PointList,
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling.
    #[default]
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
}

/// Shader stages plus fixed-function state for one pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineDescription {
    kind: PipelineKind,
    shaders: Vec<ShaderBinary>,
    push_constants: Vec<PushConstantRange>,
    vertex_streams: Vec<VertexStream>,
    topology: PrimitiveTopology,
    cull_mode: CullMode,
    depth_test: bool,
}

impl PipelineDescription {
    /// Start an empty graphics pipeline.
    pub fn graphics() -> Self {
        Self {
            kind: PipelineKind::Graphics,
            ..Self::default()
        }
    }

    /// Start an empty compute pipeline.
    pub fn compute() -> Self {
        Self {
            kind: PipelineKind::Compute,
            ..Self::default()
        }
    }

    /// Add (or replace) the shader for a stage.
    ///
    /// Graphics stages are refused on compute pipelines and vice versa.
    pub fn with_shader(mut self, shader: ShaderBinary) -> Self {
        let is_compute_stage = shader.stage == ShaderStage::Compute;
        if (self.kind == PipelineKind::Compute) != is_compute_stage {
            log::warn!(
                "Cannot add {:?} shader to a {:?} pipeline",
                shader.stage,
                self.kind
            );
            return self;
        }

        match self.shaders.iter_mut().find(|s| s.stage == shader.stage) {
            Some(existing) => *existing = shader,
            None => self.shaders.push(shader),
        }
        self
    }

    /// Declare a push-constant range.
    ///
    /// Refused when any of `stages` already has a range.
    pub fn with_push_constants(mut self, stages: ShaderStages, size: u32) -> Self {
        if self
            .push_constants
            .iter()
            .any(|range| range.stages.intersects(stages))
        {
            log::warn!(
                "Cannot add push constant range for {stages:?}, a stage was previously declared"
            );
            return self;
        }
        self.push_constants.push(PushConstantRange { stages, size });
        self
    }

    /// Declare a vertex input stream. Only valid on graphics pipelines.
    pub fn with_vertex_stream(mut self, stream: VertexStream) -> Self {
        if self.kind != PipelineKind::Graphics {
            log::warn!("Vertex input streams are only valid on graphics pipelines");
            return self;
        }
        self.vertex_streams.push(stream);
        self
    }

    /// Set the primitive topology.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the cull mode.
    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Enable or disable depth testing and writing.
    pub fn with_depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn shaders(&self) -> &[ShaderBinary] {
        &self.shaders
    }

    /// Shader for `stage`, if declared.
    pub fn shader(&self, stage: ShaderStage) -> Option<&ShaderBinary> {
        self.shaders.iter().find(|s| s.stage == stage)
    }

    /// Number of declared stages that can run vertex work.
    pub fn vertex_stage_count(&self) -> usize {
        self.shaders
            .iter()
            .filter(|s| s.stage == ShaderStage::Vertex)
            .count()
    }

    pub fn push_constants(&self) -> &[PushConstantRange] {
        &self.push_constants
    }

    /// Total push-constant bytes visible to any stage in `stages`.
    pub fn push_constant_size(&self, stages: ShaderStages) -> u32 {
        self.push_constants
            .iter()
            .filter(|range| range.stages.intersects(stages))
            .map(|range| range.size)
            .max()
            .unwrap_or(0)
    }

    pub fn vertex_streams(&self) -> &[VertexStream] {
        &self.vertex_streams
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }

    pub fn depth_test(&self) -> bool {
        self.depth_test
    }

    /// Feed the structural content of this pipeline to `state`.
    pub fn hash_content<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.shaders.len().hash(state);
        for shader in &self.shaders {
            shader.stage.hash(state);
            shader.entry_point.hash(state);
            shader.code.hash(state);
        }
        self.push_constants.hash(state);
        self.vertex_streams.hash(state);
        self.topology.hash(state);
        self.cull_mode.hash(state);
        self.depth_test.hash(state);
    }

    /// 64-bit content hash of this pipeline.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        self.hash_content(&mut hasher);
        hasher.finish()
    }
}

static_assertions::assert_impl_all!(PipelineDescription: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VertexFormat;

    fn vertex_shader() -> ShaderBinary {
        ShaderBinary::new(ShaderStage::Vertex, "vs_main", vec![0x0723_0203, 1, 2])
    }

    fn fragment_shader() -> ShaderBinary {
        ShaderBinary::new(ShaderStage::Fragment, "fs_main", vec![0x0723_0203, 3])
    }

    #[test]
    fn test_graphics_pipeline_builder() {
        let pipeline = PipelineDescription::graphics()
            .with_shader(vertex_shader())
            .with_shader(fragment_shader())
            .with_push_constants(ShaderStages::VERTEX, 64);

        assert_eq!(pipeline.kind(), PipelineKind::Graphics);
        assert_eq!(pipeline.shaders().len(), 2);
        assert_eq!(pipeline.vertex_stage_count(), 1);
        assert_eq!(pipeline.push_constant_size(ShaderStages::VERTEX), 64);
        assert_eq!(pipeline.push_constant_size(ShaderStages::FRAGMENT), 0);
    }

    #[test]
    fn test_shader_replaced_per_stage() {
        let replacement = ShaderBinary::new(ShaderStage::Vertex, "other", vec![9]);
        let pipeline = PipelineDescription::graphics()
            .with_shader(vertex_shader())
            .with_shader(replacement.clone());
        assert_eq!(pipeline.shaders().len(), 1);
        assert_eq!(pipeline.shader(ShaderStage::Vertex), Some(&replacement));
    }

    #[test]
    fn test_compute_pipeline_refuses_graphics_stage() {
        let pipeline = PipelineDescription::compute().with_shader(vertex_shader());
        assert!(pipeline.shaders().is_empty());
    }

    #[test]
    fn test_graphics_pipeline_refuses_compute_stage() {
        let pipeline = PipelineDescription::graphics().with_shader(ShaderBinary::new(
            ShaderStage::Compute,
            "cs_main",
            vec![1],
        ));
        assert!(pipeline.shaders().is_empty());
    }

    #[test]
    fn test_overlapping_push_constants_refused() {
        let pipeline = PipelineDescription::graphics()
            .with_push_constants(ShaderStages::GRAPHICS_ALL, 16)
            .with_push_constants(ShaderStages::FRAGMENT, 32);
        assert_eq!(pipeline.push_constants().len(), 1);
    }

    #[test]
    fn test_vertex_stream_refused_on_compute() {
        let pipeline =
            PipelineDescription::compute().with_vertex_stream(VertexStream::per_vertex(12));
        assert!(pipeline.vertex_streams().is_empty());
    }

    #[test]
    fn test_hash_stable() {
        let pipeline = PipelineDescription::graphics()
            .with_shader(vertex_shader())
            .with_shader(fragment_shader());
        assert_eq!(pipeline.content_hash(), pipeline.content_hash());
        assert_eq!(pipeline.content_hash(), pipeline.clone().content_hash());
    }

    #[test]
    fn test_hash_sees_every_structural_field() {
        let base = PipelineDescription::graphics()
            .with_shader(vertex_shader())
            .with_shader(fragment_shader());
        let base_hash = base.content_hash();

        let variants = [
            base.clone().with_push_constants(ShaderStages::VERTEX, 16),
            base.clone().with_vertex_stream(
                VertexStream::per_vertex(12).with_attribute(0, VertexFormat::Float32x3, 0),
            ),
            base.clone().with_topology(PrimitiveTopology::LineList),
            base.clone().with_cull_mode(CullMode::Back),
            base.clone().with_depth_test(true),
            base.clone().with_shader(ShaderBinary::new(
                ShaderStage::Fragment,
                "fs_other",
                vec![0x0723_0203, 3],
            )),
            base.clone().with_shader(ShaderBinary::new(
                ShaderStage::Fragment,
                "fs_main",
                vec![0x0723_0203, 4],
            )),
            PipelineDescription::graphics().with_shader(vertex_shader()),
        ];

        for variant in &variants {
            assert_ne!(variant.content_hash(), base_hash, "{variant:?}");
        }
    }
}
