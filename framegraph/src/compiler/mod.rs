//! Render graph compilation.
//!
//! The [`GraphCompiler`] turns a [`RenderGraph`] into a [`CompiledFrame`]:
//! per-pass pipeline objects and binding tables (one per frame slot), plus
//! the ordered list of [`Batch`]es the execution engine submits.
//!
//! # Caching
//!
//! Compilation is keyed by [`RenderGraph::content_hash`]. When the incoming
//! graph hashes equal to the cached one, the cached frame is returned as is
//! (the same [`Arc`]), with no GPU work at all. Otherwise the device is
//! drained, the previous frame is destroyed in full and a new one is built
//! from scratch. There is no partial invalidation: binding tables come from
//! shared pools and a diff would have to reason about which of them the
//! device may still read.
//!
//! # Batching
//!
//! Passes run in declaration order. A new batch starts whenever the queue
//! affinity changes from one pass to the next, so every batch runs on
//! exactly one queue:
//!
//! ```text
//! passes:   [C] [C] [G] [G] [C]
//! batches:  |  0  | |  1  | |2|
//! ```
//!
//! A graph whose passes all share a queue compiles to a single batch.
//!
//! The compiler assumes every pass already passed build-time validation; it
//! only fails on stale resource handles and on backend object creation.

mod layout;

use std::ops::Range;
use std::sync::Arc;

use crate::backend::{Backend, BoundResource};
use crate::error::GraphicsError;
use crate::graph::{
    PassSpecification, PipelineDescription, RenderGraph, RenderTarget, ResourceRef,
};
use crate::resources::{ResourceRegistry, SurfaceId};
use crate::types::{QueueAffinity, QueueMask};

pub use layout::{AttachmentFormats, BindingKind, BindingLayout, BindingSlot};

// ============================================================================
// Compiled artifacts
// ============================================================================

/// A pass with its backend objects.
#[derive(Debug)]
pub struct CompiledPass<B: Backend> {
    name: String,
    queue: QueueAffinity,
    description: PipelineDescription,
    layout: BindingLayout,
    pipeline: B::Pipeline,
    /// Indexed by frame slot; empty when the layout has no bindings.
    binding_tables: Vec<B::BindingTable>,
    targets: Vec<RenderTarget>,
    surfaces: Vec<SurfaceId>,
}

impl<B: Backend> CompiledPass<B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> QueueAffinity {
        self.queue
    }

    pub fn description(&self) -> &PipelineDescription {
        &self.description
    }

    pub fn layout(&self) -> &BindingLayout {
        &self.layout
    }

    pub fn pipeline(&self) -> B::Pipeline {
        self.pipeline
    }

    /// Binding table for frame slot `slot`, if the pass binds anything.
    pub fn binding_table(&self, slot: usize) -> Option<B::BindingTable> {
        self.binding_tables.get(slot).copied()
    }

    /// Render targets in attachment order.
    pub fn targets(&self) -> &[RenderTarget] {
        &self.targets
    }

    /// Presentation surfaces this pass writes.
    pub fn surfaces(&self) -> &[SurfaceId] {
        &self.surfaces
    }
}

/// A maximal run of consecutive passes on one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    passes: Range<usize>,
    queue: QueueAffinity,
    surfaces: Vec<SurfaceId>,
}

impl Batch {
    /// Indices into [`CompiledFrame::passes`].
    pub fn passes(&self) -> Range<usize> {
        self.passes.clone()
    }

    pub fn queue(&self) -> QueueAffinity {
        self.queue
    }

    /// Queues this batch submits to.
    pub fn queues(&self) -> QueueMask {
        self.queue.mask()
    }

    pub fn uses_graphics_queue(&self) -> bool {
        self.queues().uses(QueueAffinity::Graphics)
    }

    pub fn uses_compute_queue(&self) -> bool {
        self.queues().uses(QueueAffinity::Compute)
    }

    /// Presentation surfaces written by passes of this batch.
    pub fn surfaces(&self) -> &[SurfaceId] {
        &self.surfaces
    }

    pub fn writes_surface(&self, surface: SurfaceId) -> bool {
        self.surfaces.contains(&surface)
    }
}

/// Cached compilation result of one render graph structure.
#[derive(Debug)]
pub struct CompiledFrame<B: Backend> {
    hash: u64,
    passes: Vec<CompiledPass<B>>,
    batches: Vec<Batch>,
    surfaces: Vec<SurfaceId>,
}

impl<B: Backend> CompiledFrame<B> {
    /// Content hash of the graph this frame was built from.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn passes(&self) -> &[CompiledPass<B>] {
        &self.passes
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Surfaces implicated by any pass, in first-use order.
    pub fn surfaces(&self) -> &[SurfaceId] {
        &self.surfaces
    }

    /// Whether some pass writing `surface` touches only surfaces for which
    /// `usable` holds.
    pub fn has_runnable_writer(
        &self,
        surface: SurfaceId,
        usable: impl Fn(SurfaceId) -> bool,
    ) -> bool {
        self.passes.iter().any(|pass| {
            pass.surfaces().contains(&surface) && pass.surfaces().iter().all(|&s| usable(s))
        })
    }

    /// Union of the queues used by all batches.
    pub fn queues(&self) -> QueueMask {
        self.batches
            .iter()
            .fold(QueueMask::empty(), |acc, batch| acc | batch.queues())
    }

    /// Index of the first batch that writes `surface`.
    pub fn first_batch_writing(&self, surface: SurfaceId) -> Option<usize> {
        self.batches.iter().position(|b| b.writes_surface(surface))
    }

    /// Destroy every backend object. The device must no longer use them.
    fn destroy(&self, backend: &mut B) {
        for pass in &self.passes {
            pass.destroy(backend);
        }
    }
}

impl<B: Backend> CompiledPass<B> {
    fn destroy(&self, backend: &mut B) {
        for table in &self.binding_tables {
            backend.destroy_binding_table(*table);
        }
        backend.destroy_pipeline(self.pipeline);
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compilation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerStats {
    /// Full (re)compilations performed.
    pub compilations: u64,
    /// Calls answered from the cache.
    pub cache_hits: u64,
}

/// Compiles render graphs and caches the last result.
pub struct GraphCompiler<B: Backend> {
    cached: Option<Arc<CompiledFrame<B>>>,
    stats: CompilerStats,
}

impl<B: Backend> Default for GraphCompiler<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> GraphCompiler<B> {
    pub fn new() -> Self {
        Self {
            cached: None,
            stats: CompilerStats::default(),
        }
    }

    pub fn stats(&self) -> CompilerStats {
        self.stats
    }

    /// The cached frame, if any.
    pub fn cached(&self) -> Option<&Arc<CompiledFrame<B>>> {
        self.cached.as_ref()
    }

    /// Compile `graph`, reusing the cached frame when the structure is
    /// unchanged.
    ///
    /// A frame handed out earlier must not be used once a later call
    /// returned a different one: its backend objects are destroyed.
    pub fn compile(
        &mut self,
        backend: &mut B,
        resources: &ResourceRegistry<B>,
        graph: &RenderGraph,
    ) -> Result<Arc<CompiledFrame<B>>, GraphicsError> {
        if graph.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "cannot compile an empty render graph".into(),
            ));
        }

        let hash = graph.content_hash();
        if let Some(cached) = &self.cached
            && cached.hash == hash
        {
            self.stats.cache_hits += 1;
            return Ok(Arc::clone(cached));
        }

        self.release(backend)?;

        let frame = Arc::new(build_frame(backend, resources, graph, hash)?);
        self.stats.compilations += 1;
        log::info!(
            "Compiled render graph {hash:#018x}: {} passes in {} batches",
            frame.passes.len(),
            frame.batches.len()
        );

        self.cached = Some(Arc::clone(&frame));
        Ok(frame)
    }

    /// Drain the device and destroy the cached frame.
    pub fn release(&mut self, backend: &mut B) -> Result<(), GraphicsError> {
        if let Some(previous) = self.cached.take() {
            backend.wait_idle()?;
            previous.destroy(backend);
            log::debug!("Released compiled frame {:#018x}", previous.hash);
        }
        Ok(())
    }
}

fn build_frame<B: Backend>(
    backend: &mut B,
    resources: &ResourceRegistry<B>,
    graph: &RenderGraph,
    hash: u64,
) -> Result<CompiledFrame<B>, GraphicsError> {
    let mut frame = CompiledFrame {
        hash,
        passes: Vec::with_capacity(graph.len()),
        batches: Vec::new(),
        surfaces: Vec::new(),
    };

    for named in graph.passes() {
        let pass = match compile_pass(backend, resources, named.name(), named.spec()) {
            Ok(pass) => pass,
            Err(e) => {
                frame.destroy(backend);
                return Err(e);
            }
        };

        let index = frame.passes.len();
        match frame.batches.last_mut() {
            Some(batch) if batch.queue == pass.queue => batch.passes.end = index + 1,
            _ => frame.batches.push(Batch {
                passes: index..index + 1,
                queue: pass.queue,
                surfaces: Vec::new(),
            }),
        }

        if let Some(batch) = frame.batches.last_mut() {
            for &surface in &pass.surfaces {
                if !batch.surfaces.contains(&surface) {
                    batch.surfaces.push(surface);
                }
                if !frame.surfaces.contains(&surface) {
                    frame.surfaces.push(surface);
                }
            }
        }

        frame.passes.push(pass);
    }

    Ok(frame)
}

fn compile_pass<B: Backend>(
    backend: &mut B,
    resources: &ResourceRegistry<B>,
    name: &str,
    spec: &PassSpecification,
) -> Result<CompiledPass<B>, GraphicsError> {
    for attachment in spec.attachments() {
        let handle = attachment.target.handle();
        if !resources.is_render_target_valid(handle) {
            return Err(GraphicsError::InvalidHandle(format!(
                "render target {handle:?} of pass '{name}'"
            )));
        }
    }

    let layout = BindingLayout::from_accesses(spec.accesses(), resources)?;
    let formats = AttachmentFormats::from_attachments(spec.attachments());
    let pipeline = backend.create_pipeline(spec.pipeline(), &layout, &formats)?;

    let mut pass = CompiledPass {
        name: name.to_owned(),
        queue: spec.queue(),
        description: spec.pipeline().clone(),
        layout,
        pipeline,
        binding_tables: Vec::new(),
        targets: spec.attachments().iter().map(|a| a.target).collect(),
        surfaces: Vec::new(),
    };
    for target in &pass.targets {
        if let Some(surface) = target.surface()
            && !pass.surfaces.contains(&surface)
        {
            pass.surfaces.push(surface);
        }
    }

    if !pass.layout.is_empty() {
        for slot in 0..resources.frames_in_flight() {
            let bound: Option<Vec<_>> = spec
                .accesses()
                .iter()
                .map(|access| match access.resource {
                    ResourceRef::Buffer(h) => resources.buffer(h, slot).map(BoundResource::Buffer),
                    ResourceRef::Texture(h) => resources.texture(h).map(BoundResource::Texture),
                })
                .collect();
            // Layout derivation already checked every handle.
            let Some(bound) = bound else {
                pass.destroy(backend);
                return Err(GraphicsError::Internal(format!(
                    "resource of pass '{name}' vanished during compilation"
                )));
            };

            match backend.create_binding_table(pass.pipeline, &pass.layout, &bound) {
                Ok(table) => pass.binding_tables.push(table),
                Err(e) => {
                    pass.destroy(backend);
                    return Err(e);
                }
            }
        }
    }

    Ok(pass)
}

static_assertions::assert_impl_all!(CompilerStats: Send, Sync);
static_assertions::assert_impl_all!(Batch: Send, Sync);
