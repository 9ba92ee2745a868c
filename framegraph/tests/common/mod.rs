//! Shared helpers for the frame graph integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use raw_window_handle::{HandleError, RawDisplayHandle, RawWindowHandle};
use redlilium_framegraph::backend::dummy::{CompletionMode, DummyBackend, DummyEvent};
use redlilium_framegraph::{
    AccessDirection, BufferDescriptor, BufferHandle, BufferUsage, ClearValue, Extent2d,
    PassSpecification, PipelineDescription, RenderGraph, RenderTarget, Renderer, RendererConfig,
    ShaderBinary, ShaderStage, ShaderStages, Window,
};

/// Install `env_logger` once for the whole test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A window the tests can resize and minimize.
pub struct TestWindow {
    state: Mutex<(Extent2d, bool)>,
}

impl TestWindow {
    pub fn shared(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new((Extent2d::new(width, height), false)),
        })
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.state.lock().unwrap().0 = Extent2d::new(width, height);
    }

    pub fn set_minimized(&self, minimized: bool) {
        self.state.lock().unwrap().1 = minimized;
    }
}

impl Window for TestWindow {
    fn extent(&self) -> Extent2d {
        self.state.lock().unwrap().0
    }

    fn is_minimized(&self) -> bool {
        self.state.lock().unwrap().1
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), HandleError> {
        Err(HandleError::Unavailable)
    }
}

pub fn renderer() -> Renderer<DummyBackend> {
    renderer_with(CompletionMode::Immediate, 2)
}

pub fn renderer_with(mode: CompletionMode, frames_in_flight: usize) -> Renderer<DummyBackend> {
    init_logging();
    let config = RendererConfig::new()
        .with_frames_in_flight(frames_in_flight)
        .with_validation(false);
    Renderer::new(DummyBackend::with_completion(mode), config).unwrap()
}

pub fn graphics_pipeline() -> PipelineDescription {
    PipelineDescription::graphics()
        .with_shader(ShaderBinary::new(ShaderStage::Vertex, "vs_main", vec![0x0723_0203, 10]))
        .with_shader(ShaderBinary::new(ShaderStage::Fragment, "fs_main", vec![0x0723_0203, 11]))
}

pub fn compute_pipeline() -> PipelineDescription {
    PipelineDescription::compute().with_shader(ShaderBinary::new(
        ShaderStage::Compute,
        "cs_main",
        vec![0x0723_0203, 12],
    ))
}

pub fn storage_buffer(renderer: &mut Renderer<DummyBackend>) -> BufferHandle {
    renderer
        .create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))
        .unwrap()
}

/// A graphics pass drawing a triangle into `target`.
pub fn draw_pass(target: RenderTarget, clear: ClearValue) -> PassSpecification {
    PassSpecification::graphics(graphics_pipeline())
        .with_render_target(target, clear)
        .with_commands(|ctx| ctx.draw(3, 1, 0, 0))
}

/// A compute pass updating `buffer`.
pub fn simulate_pass(buffer: BufferHandle) -> PassSpecification {
    PassSpecification::compute(compute_pipeline())
        .with_buffer(buffer, AccessDirection::ReadWrite, ShaderStages::COMPUTE)
        .with_commands(|ctx| ctx.dispatch(16, 1, 1))
}

pub fn compute_graph(buffer: BufferHandle) -> RenderGraph {
    let mut graph = RenderGraph::new();
    graph.add_pass("simulate", simulate_pass(buffer));
    graph
}

/// Indices into the event log of every submission.
pub fn submit_positions(events: &[DummyEvent]) -> Vec<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, DummyEvent::Submit { .. }))
        .map(|(i, _)| i)
        .collect()
}
