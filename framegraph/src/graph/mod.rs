//! Render graph model.
//!
//! A [`RenderGraph`] is the declarative, content-addressable description of
//! one frame: an insertion-ordered list of uniquely named
//! [`PassSpecification`]s. The application rebuilds it every frame (it is
//! cheap, pure data) and hands it to
//! [`Renderer::render`](crate::Renderer::render).
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Frame | [`FramePipeline`](crate::pipeline::FramePipeline) | Frame slots, host throttling |
//! | Compiled | [`CompiledFrame`](crate::compiler::CompiledFrame) | Batches, pipelines, binding tables |
//! | **Graph** | [`RenderGraph`] | Passes in declaration order (this module) |
//! | Pass | [`PassSpecification`] | Single unit of GPU work |
//!
//! # Validation
//!
//! Validation happens when a pass is *added*, never at compile time. A pass
//! that is incomplete (no callback, a graphics pass with no render target,
//! ...) or whose name is already taken is dropped with a single warning and
//! the graph is left untouched.
//!
//! # Hashing
//!
//! [`RenderGraph::content_hash`] covers pass identity, queue affinity,
//! pipeline structure, resource accesses and render-target structure. It
//! excludes recording callbacks and clear colors, so a graph that only
//! changes those reuses the compiled frame of the previous one.
//!
//! # Example
//!
//! ```ignore
//! use redlilium_framegraph::{ClearValue, PassSpecification, RenderGraph};
//!
//! let mut graph = RenderGraph::new();
//! graph.add_pass(
//!     "main",
//!     PassSpecification::graphics(pipeline)
//!         .with_render_target(swapchain_target, ClearValue::BLACK)
//!         .with_commands(|ctx| ctx.draw(3, 1, 0, 0)),
//! );
//! renderer.render(graph)?;
//! ```

mod context;
pub mod hash;
mod pass;
mod pipeline;
mod target;

use std::hash::{Hash, Hasher};

pub use context::{RecordFn, RenderContext};
pub use hash::ContentHasher;
pub use pass::{AccessDirection, PassRejection, PassSpecification, ResourceAccess, ResourceRef};
pub use pipeline::{
    CullMode, PipelineDescription, PipelineKind, PrimitiveTopology, PushConstantRange,
    ShaderBinary,
};
pub use target::{Attachment, LoadOp, RenderTarget};

/// A pass together with its unique name.
#[derive(Debug)]
pub struct NamedPass {
    name: String,
    spec: PassSpecification,
}

impl NamedPass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &PassSpecification {
        &self.spec
    }

    pub(crate) fn spec_mut(&mut self) -> &mut PassSpecification {
        &mut self.spec
    }
}

/// The render graph describes one frame's GPU work.
///
/// # Construction
///
/// ```ignore
/// let mut graph = RenderGraph::new();
/// graph
///     .add_pass("simulate", PassSpecification::compute(sim).with_commands(...))
///     .add_pass("draw", PassSpecification::graphics(draw).with_commands(...));
/// ```
#[derive(Debug, Default)]
pub struct RenderGraph {
    /// Passes in insertion order. Names are unique.
    passes: Vec<NamedPass>,
}

impl RenderGraph {
    /// Create a new empty render graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pass, builder style.
    ///
    /// A pass that fails validation, or whose name is already used, is not
    /// added: one warning is logged and the graph is unchanged.
    pub fn add_pass(&mut self, name: impl Into<String>, spec: PassSpecification) -> &mut Self {
        let name = name.into();
        if let Err(reason) = self.try_add_pass(name.clone(), spec) {
            log::warn!("Could not add pass '{name}': {reason}");
        }
        self
    }

    /// Add a pass, returning the rejection reason instead of logging it.
    pub fn try_add_pass(
        &mut self,
        name: impl Into<String>,
        spec: PassSpecification,
    ) -> Result<(), PassRejection> {
        let name = name.into();
        if self.contains(&name) {
            return Err(PassRejection::DuplicateName);
        }
        spec.validate()?;
        self.passes.push(NamedPass { name, spec });
        Ok(())
    }

    /// Number of passes in the graph.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Whether the graph has no passes. Empty graphs are never submitted.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Whether a pass named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.passes.iter().any(|p| p.name == name)
    }

    /// Pass named `name`.
    pub fn get(&self, name: &str) -> Option<&PassSpecification> {
        self.passes.iter().find(|p| p.name == name).map(|p| &p.spec)
    }

    /// Passes in insertion order.
    pub fn passes(&self) -> &[NamedPass] {
        &self.passes
    }

    pub(crate) fn passes_mut(&mut self) -> &mut [NamedPass] {
        &mut self.passes
    }

    /// Pass names in insertion order.
    pub fn pass_names(&self) -> impl Iterator<Item = &str> {
        self.passes.iter().map(|p| p.name.as_str())
    }

    /// 64-bit content hash of the graph.
    ///
    /// Per-pass hashes are folded order-independently. Each pass hash also
    /// covers the pass position, so reordering passes changes the result and
    /// forces a recompile: compiled batches follow declaration order.
    pub fn content_hash(&self) -> u64 {
        let mut acc = hash::combine_unordered(hash::FNV_OFFSET_BASIS, self.passes.len() as u64);
        for (index, pass) in self.passes.iter().enumerate() {
            acc = hash::combine_unordered(acc, Self::pass_hash(index, pass));
        }
        acc
    }

    fn pass_hash(index: usize, pass: &NamedPass) -> u64 {
        let mut hasher = ContentHasher::new();
        index.hash(&mut hasher);
        pass.name.hash(&mut hasher);
        pass.spec.hash_content(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{
        TestHandles, capture_logs, compute_pipeline, graphics_pipeline, render_target,
    };
    use crate::types::{ClearValue, RenderTargetKind, ShaderStages};

    fn draw_pass(target: RenderTarget, clear: ClearValue) -> PassSpecification {
        PassSpecification::graphics(graphics_pipeline())
            .with_render_target(target, clear)
            .with_commands(|ctx| ctx.draw(3, 1, 0, 0))
    }

    #[test]
    fn test_empty_graph() {
        let graph = RenderGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_add_pass_keeps_insertion_order() {
        let target = render_target(RenderTargetKind::Color, false);
        let mut graph = RenderGraph::new();
        graph
            .add_pass("b", draw_pass(target, ClearValue::BLACK))
            .add_pass("a", draw_pass(target, ClearValue::BLACK))
            .add_pass("c", draw_pass(target, ClearValue::BLACK));

        let names: Vec<_> = graph.pass_names().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(graph.get("a").is_some());
        assert!(graph.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let target = render_target(RenderTargetKind::Color, false);
        let mut graph = RenderGraph::new();
        graph.add_pass("main", draw_pass(target, ClearValue::BLACK));
        let result = graph.try_add_pass("main", draw_pass(target, ClearValue::BLACK));
        assert_eq!(result, Err(PassRejection::DuplicateName));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_graphics_pass_without_target_emits_one_warning() {
        let target = render_target(RenderTargetKind::Color, false);
        let mut graph = RenderGraph::new();
        graph.add_pass("main", draw_pass(target, ClearValue::BLACK));

        let logs = capture_logs(|| {
            graph.add_pass(
                "broken",
                PassSpecification::graphics(graphics_pipeline()).with_commands(|_| {}),
            );
        });

        assert_eq!(graph.len(), 1);
        let warnings: Vec<_> = logs
            .iter()
            .filter(|(level, _)| *level == log::Level::Warn)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].1.contains("broken"));
    }

    #[test]
    fn test_hash_stable_without_mutation() {
        let target = render_target(RenderTargetKind::Color, false);
        let mut graph = RenderGraph::new();
        graph.add_pass("main", draw_pass(target, ClearValue::BLACK));
        assert_eq!(graph.content_hash(), graph.content_hash());
    }

    #[test]
    fn test_hash_ignores_clear_color_and_callback() {
        let target = render_target(RenderTargetKind::Color, false);

        let mut a = RenderGraph::new();
        a.add_pass("main", draw_pass(target, ClearValue::BLACK));

        let mut b = RenderGraph::new();
        b.add_pass(
            "main",
            PassSpecification::graphics(graphics_pipeline())
                .with_render_target(target, ClearValue::color(1.0, 0.0, 0.5, 1.0))
                .with_commands(|ctx| ctx.draw(6, 2, 0, 0)),
        );

        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_hash_sees_structural_changes() {
        let handles = TestHandles::new();
        let target = render_target(RenderTargetKind::Color, false);

        let compute = |direction| {
            PassSpecification::compute(compute_pipeline())
                .with_buffer(handles.buffers[0], direction, ShaderStages::COMPUTE)
                .with_commands(|ctx| ctx.dispatch(1, 1, 1))
        };

        let mut base = RenderGraph::new();
        base.add_pass("sim", compute(AccessDirection::Write));
        let base_hash = base.content_hash();

        // Pass count.
        let mut more = RenderGraph::new();
        more.add_pass("sim", compute(AccessDirection::Write))
            .add_pass("draw", draw_pass(target, ClearValue::BLACK));
        assert_ne!(more.content_hash(), base_hash);

        // Access direction.
        let mut direction = RenderGraph::new();
        direction.add_pass("sim", compute(AccessDirection::ReadWrite));
        assert_ne!(direction.content_hash(), base_hash);

        // Accessed resource.
        let mut other_buffer = RenderGraph::new();
        other_buffer.add_pass(
            "sim",
            PassSpecification::compute(compute_pipeline())
                .with_buffer(handles.buffers[1], AccessDirection::Write, ShaderStages::COMPUTE)
                .with_commands(|_| {}),
        );
        assert_ne!(other_buffer.content_hash(), base_hash);

        // Pass name.
        let mut renamed = RenderGraph::new();
        renamed.add_pass("simulate", compute(AccessDirection::Write));
        assert_ne!(renamed.content_hash(), base_hash);
    }

    #[test]
    fn test_hash_sees_queue_affinity() {
        let handles = TestHandles::new();
        let target = render_target(RenderTargetKind::Color, false);

        let mut graphics = RenderGraph::new();
        graphics.add_pass(
            "work",
            PassSpecification::graphics(graphics_pipeline())
                .with_buffer(handles.buffers[0], AccessDirection::Read, ShaderStages::VERTEX)
                .with_render_target(target, ClearValue::BLACK)
                .with_commands(|_| {}),
        );

        let mut compute = RenderGraph::new();
        compute.add_pass(
            "work",
            PassSpecification::compute(compute_pipeline())
                .with_buffer(handles.buffers[0], AccessDirection::Read, ShaderStages::VERTEX)
                .with_commands(|_| {}),
        );

        assert_ne!(graphics.content_hash(), compute.content_hash());
    }

    #[test]
    fn test_hash_sees_render_target_structure() {
        let color = render_target(RenderTargetKind::Color, false);
        let other_color = render_target(RenderTargetKind::Color, false);

        let mut base = RenderGraph::new();
        base.add_pass("main", draw_pass(color, ClearValue::BLACK));

        let mut other_target = RenderGraph::new();
        other_target.add_pass("main", draw_pass(other_color, ClearValue::BLACK));
        assert_ne!(base.content_hash(), other_target.content_hash());

        let mut loaded = RenderGraph::new();
        loaded.add_pass(
            "main",
            PassSpecification::graphics(graphics_pipeline())
                .with_loaded_render_target(color)
                .with_commands(|_| {}),
        );
        assert_ne!(base.content_hash(), loaded.content_hash());
    }

    #[test]
    fn test_hash_sees_pass_order() {
        let target = render_target(RenderTargetKind::Color, false);

        let mut ab = RenderGraph::new();
        ab.add_pass("a", draw_pass(target, ClearValue::BLACK))
            .add_pass("b", draw_pass(target, ClearValue::BLACK));

        let mut ba = RenderGraph::new();
        ba.add_pass("b", draw_pass(target, ClearValue::BLACK))
            .add_pass("a", draw_pass(target, ClearValue::BLACK));

        assert_ne!(ab.content_hash(), ba.content_hash());
    }
}
