use std::sync::Arc;

use super::*;
use crate::backend::dummy::{DummyBackend, DummyEvent, DummyImage};
use crate::compiler::GraphCompiler;
use crate::graph::{AccessDirection, LoadOp, PassSpecification, RenderTarget};
use crate::pipeline::FramePipeline;
use crate::resources::BufferHandle;
use crate::scheduler::{AcquireWait, SubmissionPlanner};
use crate::swapchain::{AcquireResult, PresentMode};
use crate::test_util::{
    TestWindow, capture_logs, compute_pipeline, graphics_pipeline, warning_count,
};
use crate::types::{
    BufferDescriptor, BufferUsage, ClearValue, IndexFormat, RenderTargetDescriptor,
    RenderTargetKind, ShaderStages, VertexFormat, VertexStream,
};

struct Harness {
    backend: DummyBackend,
    resources: ResourceRegistry<DummyBackend>,
    surfaces: PresentationManager<DummyBackend>,
    compiler: GraphCompiler<DummyBackend>,
    planner: SubmissionPlanner<DummyBackend>,
    frames: FramePipeline<DummyBackend>,
    engine: ExecutionEngine<DummyBackend>,
}

impl Harness {
    fn new() -> Self {
        let mut backend = DummyBackend::new();
        let planner = SubmissionPlanner::new(&mut backend).unwrap();
        let frames = FramePipeline::new(&mut backend, 2).unwrap();
        Self {
            backend,
            resources: ResourceRegistry::new(2),
            surfaces: PresentationManager::new(PresentMode::Fifo, 2),
            compiler: GraphCompiler::new(),
            planner,
            frames,
            engine: ExecutionEngine::new(2),
        }
    }

    fn target(&mut self, kind: RenderTargetKind) -> RenderTarget {
        self.resources
            .create_render_target(&mut self.backend, &RenderTargetDescriptor::new(kind, 64, 32))
            .unwrap()
    }

    fn buffer(&mut self, usage: BufferUsage) -> BufferHandle {
        self.resources
            .create_buffer(&mut self.backend, &BufferDescriptor::new(256, usage))
            .unwrap()
    }

    fn swapchain(&mut self) -> (SurfaceId, RenderTarget) {
        let id = self
            .surfaces
            .create(&mut self.backend, TestWindow::shared(640, 480))
            .unwrap();
        let target = self.resources.register_surface_target(
            id,
            self.surfaces.format(id).unwrap(),
            self.surfaces.extent(id).unwrap(),
        );
        (id, target)
    }

    /// Run one frame without presenting; `acquire` lists the surfaces to
    /// acquire before recording.
    fn run(&mut self, graph: &mut RenderGraph, acquire: &[SurfaceId]) -> Result<(), GraphicsError> {
        let frame = self
            .compiler
            .compile(&mut self.backend, &self.resources, graph)?;
        let slot = self.frames.begin_frame(&mut self.backend)?;
        self.engine.retire_slot(slot);

        let mut available = Vec::new();
        let mut waits = Vec::new();
        for &id in acquire {
            if let AcquireResult::Image(_) =
                self.surfaces.acquire_next(&mut self.backend, id, slot)?
            {
                available.push(id);
                waits.push(AcquireWait {
                    batch: frame.first_batch_writing(id).unwrap_or(0),
                    semaphore: self.surfaces.acquire_semaphore(id, slot).unwrap(),
                });
            }
        }

        let fences = self.frames.fences(slot);
        let plan = self.planner.plan(frame.batches(), &waits, &fences, false)?;
        self.engine.execute(
            &mut self.backend,
            &self.resources,
            &self.surfaces,
            &frame,
            graph,
            slot,
            &plan,
            &available,
        )?;
        self.frames.end_frame(slot, frame.queues());
        Ok(())
    }
}

fn count(events: &[DummyEvent], pred: impl Fn(&DummyEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[test]
fn test_scope_refuses_begin_while_submitted() {
    let mut backend = DummyBackend::new();
    let mut scope = RecordingScope::new(&mut backend, QueueAffinity::Graphics).unwrap();
    assert_eq!(scope.state(), ScopeState::Idle);

    scope.begin(&mut backend).unwrap();
    assert!(scope.begin(&mut backend).is_err());
    scope.end(&mut backend).unwrap();
    scope.mark_submitted();
    assert_eq!(scope.state(), ScopeState::Submitted);
    assert!(scope.begin(&mut backend).is_err());

    scope.retire();
    assert_eq!(scope.state(), ScopeState::Idle);
    assert!(scope.begin(&mut backend).is_ok());
}

#[test]
fn test_end_requires_recording() {
    let mut backend = DummyBackend::new();
    let mut scope = RecordingScope::new(&mut backend, QueueAffinity::Compute).unwrap();
    assert!(scope.end(&mut backend).is_err());
}

#[test]
fn test_passes_recorded_in_order_with_barriers() {
    let mut h = Harness::new();
    let target = h.target(RenderTargetKind::Color);

    let mut graph = RenderGraph::new();
    for (i, vertices) in [3u32, 6, 9].into_iter().enumerate() {
        graph.add_pass(
            format!("draw{i}"),
            PassSpecification::graphics(graphics_pipeline())
                .with_render_target(target, ClearValue::BLACK)
                .with_commands(move |ctx| ctx.draw(vertices, 1, 0, 0)),
        );
    }
    h.run(&mut graph, &[]).unwrap();

    let events = h.backend.events();
    let draws: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            DummyEvent::Draw { vertex_count, .. } => Some(*vertex_count),
            _ => None,
        })
        .collect();
    assert_eq!(draws, vec![3, 6, 9]);
    assert_eq!(count(events, |e| matches!(e, DummyEvent::PassBarrier(_))), 2);
    assert_eq!(count(events, |e| matches!(e, DummyEvent::BeginRendering { .. })), 3);
    assert_eq!(h.backend.submit_count(), 1);
}

#[test]
fn test_each_batch_submits_on_its_queue() {
    let mut h = Harness::new();
    let target = h.target(RenderTargetKind::Color);
    let particles = h.buffer(BufferUsage::STORAGE | BufferUsage::VERTEX);

    let mut graph = RenderGraph::new();
    graph
        .add_pass(
            "simulate",
            PassSpecification::compute(compute_pipeline())
                .with_buffer(particles, AccessDirection::ReadWrite, ShaderStages::COMPUTE)
                .with_commands(|ctx| ctx.dispatch(4, 1, 1)),
        )
        .add_pass(
            "draw",
            PassSpecification::graphics(graphics_pipeline())
                .with_render_target(target, ClearValue::BLACK)
                .with_commands(move |ctx| {
                    ctx.bind_vertex_buffers(&[particles]);
                    ctx.draw(1024, 1, 0, 0);
                }),
        );
    h.run(&mut graph, &[]).unwrap();

    let queues: Vec<QueueAffinity> = h
        .backend
        .events()
        .iter()
        .filter_map(|e| match e {
            DummyEvent::Submit { queue, .. } => Some(*queue),
            _ => None,
        })
        .collect();
    assert_eq!(queues, vec![QueueAffinity::Compute, QueueAffinity::Graphics]);
    assert_eq!(h.backend.dispatch_count(), 1);
    assert_eq!(h.backend.draw_count(), 1);

    // Compute passes never open a rendering scope.
    assert_eq!(
        count(h.backend.events(), |e| matches!(e, DummyEvent::BeginRendering { .. })),
        1
    );
}

#[test]
fn test_unavailable_surface_pass_skipped() {
    let mut h = Harness::new();
    let (surface, swapchain_target) = h.swapchain();
    let data = h.buffer(BufferUsage::STORAGE);

    let mut graph = RenderGraph::new();
    graph
        .add_pass(
            "simulate",
            PassSpecification::compute(compute_pipeline())
                .with_buffer(data, AccessDirection::Write, ShaderStages::COMPUTE)
                .with_commands(|ctx| ctx.dispatch(1, 1, 1)),
        )
        .add_pass(
            "present",
            PassSpecification::graphics(graphics_pipeline())
                .with_render_target(swapchain_target, ClearValue::BLACK)
                .with_commands(|ctx| ctx.draw(3, 1, 0, 0)),
        );

    // The surface is not acquired, so it is unavailable.
    h.run(&mut graph, &[]).unwrap();
    assert!(h.surfaces.contains(surface));
    assert_eq!(h.backend.dispatch_count(), 1);
    assert_eq!(h.backend.draw_count(), 0);
    // The graphics batch is still submitted, empty, to keep the chain intact.
    assert_eq!(h.backend.submit_count(), 2);
}

#[test]
fn test_acquired_surface_rendered() {
    let mut h = Harness::new();
    let (surface, swapchain_target) = h.swapchain();

    let mut graph = RenderGraph::new();
    graph.add_pass(
        "present",
        PassSpecification::graphics(graphics_pipeline())
            .with_render_target(swapchain_target, ClearValue::color(0.1, 0.2, 0.3, 1.0))
            .with_commands(|ctx| ctx.draw(3, 1, 0, 0)),
    );
    h.run(&mut graph, &[surface]).unwrap();

    let backend_surface = h.surfaces.backend_surface(surface).unwrap();
    let rendering = h
        .backend
        .events()
        .iter()
        .find_map(|e| match e {
            DummyEvent::BeginRendering { extent, colors, depth, .. } => {
                Some((*extent, colors.clone(), *depth))
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(rendering.0, h.surfaces.extent(surface).unwrap());
    assert_eq!(
        rendering.1,
        vec![(
            DummyImage::Surface(backend_surface, 0),
            LoadOp::clear_color(0.1, 0.2, 0.3, 1.0)
        )]
    );
    assert_eq!(rendering.2, None);
    assert_eq!(h.backend.draw_count(), 1);
}

#[test]
fn test_depth_and_load_ops_recorded() {
    let mut h = Harness::new();
    let color_depth = h.target(RenderTargetKind::ColorAndDepth);
    let overlay = h.target(RenderTargetKind::ColorAndDepth);

    let mut graph = RenderGraph::new();
    graph.add_pass(
        "scene",
        PassSpecification::graphics(graphics_pipeline().with_depth_test(true))
            .with_render_target(color_depth, ClearValue::BLACK)
            .with_loaded_render_target(overlay)
            .with_commands(|_| {}),
    );
    h.run(&mut graph, &[]).unwrap();

    let (extent, colors, depth) = h
        .backend
        .events()
        .iter()
        .find_map(|e| match e {
            DummyEvent::BeginRendering { extent, colors, depth, .. } => {
                Some((*extent, colors.clone(), *depth))
            }
            _ => None,
        })
        .unwrap();

    assert_eq!((extent.width, extent.height), (64, 32));
    assert_eq!(colors.len(), 2);
    assert_eq!(colors[0].1, LoadOp::Clear(ClearValue::BLACK));
    assert_eq!(colors[1].1, LoadOp::Load);
    let (depth_image, depth_load) = depth.unwrap();
    assert!(matches!(depth_image, DummyImage::Texture(_)));
    assert!(depth_load.is_clear());
}

#[test]
fn test_clear_color_change_reaches_backend_without_recompile() {
    let mut h = Harness::new();
    let target = h.target(RenderTargetKind::Color);

    for shade in [0.25f32, 0.75] {
        let mut graph = RenderGraph::new();
        graph.add_pass(
            "clear",
            PassSpecification::graphics(graphics_pipeline())
                .with_render_target(target, ClearValue::color(shade, shade, shade, 1.0))
                .with_commands(|_| {}),
        );
        h.backend.clear_events();
        h.run(&mut graph, &[]).unwrap();

        let load = h
            .backend
            .events()
            .iter()
            .find_map(|e| match e {
                DummyEvent::BeginRendering { colors, .. } => Some(colors[0].1),
                _ => None,
            })
            .unwrap();
        assert_eq!(load, LoadOp::clear_color(shade, shade, shade, 1.0));
    }
    assert_eq!(h.compiler.stats().compilations, 1);
}

#[test]
fn test_misuse_is_warned_and_ignored() {
    let mut h = Harness::new();
    let target = h.target(RenderTargetKind::Color);
    let data = h.buffer(BufferUsage::STORAGE);

    let mut graph = RenderGraph::new();
    graph
        .add_pass(
            "compute",
            PassSpecification::compute(compute_pipeline())
                .with_buffer(data, AccessDirection::Write, ShaderStages::COMPUTE)
                .with_commands(move |ctx| {
                    ctx.draw(3, 1, 0, 0);
                    ctx.bind_index_buffer(data, IndexFormat::Uint16);
                }),
        )
        .add_pass(
            "graphics",
            PassSpecification::graphics(graphics_pipeline())
                .with_render_target(target, ClearValue::BLACK)
                .with_commands(|ctx| {
                    ctx.dispatch(1, 1, 1);
                    ctx.draw_indexed(6, 1, 0, 0, 0);
                    ctx.push_constants(ShaderStages::VERTEX, &[0u8; 16]);
                }),
        );

    let logs = capture_logs(|| h.run(&mut graph, &[]).unwrap());
    assert_eq!(warning_count(&logs), 5);
    assert!(logs.iter().any(|(_, msg)| msg.contains("'compute'")));
    assert!(logs.iter().any(|(_, msg)| msg.contains("'graphics'")));
    assert_eq!(h.backend.draw_count(), 0);
    assert_eq!(h.backend.dispatch_count(), 0);
    assert_eq!(
        count(h.backend.events(), |e| matches!(
            e,
            DummyEvent::PushConstants { .. } | DummyEvent::BindIndexBuffer { .. }
        )),
        0
    );
}

#[test]
fn test_vertex_streams_require_vertex_buffers() {
    let mut h = Harness::new();
    let target = h.target(RenderTargetKind::Color);
    let vertices = h.buffer(BufferUsage::VERTEX);
    let indices = h.buffer(BufferUsage::INDEX);

    let pipeline = graphics_pipeline()
        .with_vertex_stream(
            VertexStream::per_vertex(12).with_attribute(0, VertexFormat::Float32x3, 0),
        )
        .with_push_constants(ShaderStages::VERTEX, 64);

    let mut graph = RenderGraph::new();
    graph.add_pass(
        "mesh",
        PassSpecification::graphics(pipeline)
            .with_render_target(target, ClearValue::BLACK)
            .with_commands(move |ctx| {
                // Ignored: no vertex buffers yet.
                ctx.draw(3, 1, 0, 0);
                ctx.bind_vertex_buffers(&[vertices]);
                ctx.bind_index_buffer(indices, IndexFormat::Uint32);
                ctx.push_constants(ShaderStages::VERTEX, &[0u8; 64]);
                ctx.draw_indexed(36, 2, 0, 0, 0);
            }),
    );

    let logs = capture_logs(|| h.run(&mut graph, &[]).unwrap());
    assert_eq!(warning_count(&logs), 1);
    assert_eq!(h.backend.draw_count(), 1);

    let events = h.backend.events();
    assert!(events.iter().any(|e| matches!(
        e,
        DummyEvent::DrawIndexed {
            index_count: 36,
            instance_count: 2,
            ..
        }
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, DummyEvent::PushConstants { size: 64, .. })));
}

#[test]
fn test_stale_vertex_buffer_ignored() {
    let mut h = Harness::new();
    let target = h.target(RenderTargetKind::Color);
    let doomed = h.buffer(BufferUsage::VERTEX);
    h.resources.destroy_buffer(&mut h.backend, doomed).unwrap();

    let mut graph = RenderGraph::new();
    graph.add_pass(
        "draw",
        PassSpecification::graphics(graphics_pipeline())
            .with_render_target(target, ClearValue::BLACK)
            .with_commands(move |ctx| ctx.bind_vertex_buffers(&[doomed])),
    );

    let logs = capture_logs(|| h.run(&mut graph, &[]).unwrap());
    assert_eq!(warning_count(&logs), 1);
    assert!(!h
        .backend
        .events()
        .iter()
        .any(|e| matches!(e, DummyEvent::BindVertexBuffers { .. })));
}

#[test]
fn test_context_reports_queue_and_slot() {
    let mut h = Harness::new();
    let data = h.buffer(BufferUsage::STORAGE);
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut graph = RenderGraph::new();
    let sink = Arc::clone(&seen);
    graph.add_pass(
        "probe",
        PassSpecification::compute(compute_pipeline())
            .with_buffer(data, AccessDirection::Read, ShaderStages::COMPUTE)
            .with_commands(move |ctx| {
                sink.lock().unwrap().push((ctx.queue(), ctx.frame_slot()));
            }),
    );

    for _ in 0..3 {
        h.run(&mut graph, &[]).unwrap();
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (QueueAffinity::Compute, 0),
            (QueueAffinity::Compute, 1),
            (QueueAffinity::Compute, 0),
        ]
    );
}

#[test]
fn test_scopes_retired_after_slot_reuse() {
    let mut h = Harness::new();
    let target = h.target(RenderTargetKind::Color);

    let mut graph = RenderGraph::new();
    graph.add_pass(
        "draw",
        PassSpecification::graphics(graphics_pipeline())
            .with_render_target(target, ClearValue::BLACK)
            .with_commands(|_| {}),
    );

    for _ in 0..4 {
        h.run(&mut graph, &[]).unwrap();
    }
    assert_eq!(h.engine.scopes(0).len(), 1);
    assert_eq!(h.engine.scopes(0)[0].state(), ScopeState::Submitted);

    h.frames.wait_idle(&mut h.backend).unwrap();
    h.engine.destroy(&mut h.backend);
    assert!(h.engine.scopes(0).is_empty());
}

#[test]
fn test_pass_count_mismatch_is_internal_error() {
    let mut h = Harness::new();
    let target = h.target(RenderTargetKind::Color);

    let mut graph = RenderGraph::new();
    graph.add_pass(
        "draw",
        PassSpecification::graphics(graphics_pipeline())
            .with_render_target(target, ClearValue::BLACK)
            .with_commands(|_| {}),
    );
    let frame = h
        .compiler
        .compile(&mut h.backend, &h.resources, &graph)
        .unwrap();
    let plan = h
        .planner
        .plan(frame.batches(), &[], &h.frames.fences(0), false)
        .unwrap();

    let mut empty = RenderGraph::new();
    let result = h.engine.execute(
        &mut h.backend,
        &h.resources,
        &h.surfaces,
        &frame,
        &mut empty,
        0,
        &plan,
        &[],
    );
    assert!(matches!(result, Err(GraphicsError::Internal(_))));
}
