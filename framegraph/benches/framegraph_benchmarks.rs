use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use redlilium_framegraph::{
    AccessDirection, BufferDescriptor, BufferHandle, BufferUsage, ClearValue, DummyBackend,
    PassSpecification, PipelineDescription, RenderGraph, RenderTarget, RenderTargetDescriptor,
    RenderTargetKind, Renderer, RendererConfig, ShaderBinary, ShaderStage, ShaderStages,
};

fn graphics_pipeline() -> PipelineDescription {
    PipelineDescription::graphics()
        .with_shader(ShaderBinary::new(ShaderStage::Vertex, "vs_main", vec![0x0723_0203, 1]))
        .with_shader(ShaderBinary::new(ShaderStage::Fragment, "fs_main", vec![0x0723_0203, 2]))
}

fn compute_pipeline() -> PipelineDescription {
    PipelineDescription::compute().with_shader(ShaderBinary::new(
        ShaderStage::Compute,
        "cs_main",
        vec![0x0723_0203, 3],
    ))
}

struct Scene {
    renderer: Renderer<DummyBackend>,
    buffers: Vec<BufferHandle>,
    target: RenderTarget,
}

impl Scene {
    fn new(buffer_count: usize) -> Self {
        let config = RendererConfig::new().with_validation(false);
        let mut renderer = Renderer::new(DummyBackend::new(), config).unwrap();
        let buffers = (0..buffer_count)
            .map(|_| {
                renderer
                    .create_buffer(&BufferDescriptor::new(4096, BufferUsage::STORAGE))
                    .unwrap()
            })
            .collect();
        let target = renderer
            .create_render_target(&RenderTargetDescriptor::new(RenderTargetKind::Color, 1280, 720))
            .unwrap();
        Self {
            renderer,
            buffers,
            target,
        }
    }

    /// Alternating compute and graphics passes over the scene's buffers.
    fn graph(&self, passes: usize, clear: ClearValue) -> RenderGraph {
        let mut graph = RenderGraph::new();
        for i in 0..passes {
            let buffer = self.buffers[i % self.buffers.len()];
            if i % 2 == 0 {
                graph.add_pass(
                    format!("simulate_{i}"),
                    PassSpecification::compute(compute_pipeline())
                        .with_buffer(buffer, AccessDirection::ReadWrite, ShaderStages::COMPUTE)
                        .with_commands(|ctx| ctx.dispatch(64, 1, 1)),
                );
            } else {
                graph.add_pass(
                    format!("draw_{i}"),
                    PassSpecification::graphics(graphics_pipeline())
                        .with_buffer(buffer, AccessDirection::Read, ShaderStages::VERTEX)
                        .with_render_target(self.target, clear)
                        .with_commands(|ctx| ctx.draw(3, 1, 0, 0)),
                );
            }
        }
        graph
    }
}

// ---------------------------------------------------------------------------
// Graph hashing
// ---------------------------------------------------------------------------

fn bench_content_hash(c: &mut Criterion) {
    let scene = Scene::new(4);
    let mut group = c.benchmark_group("render_graph_content_hash");
    for passes in [4, 16, 64] {
        let graph = scene.graph(passes, ClearValue::BLACK);
        group.bench_with_input(BenchmarkId::from_parameter(passes), &graph, |b, graph| {
            b.iter(|| black_box(graph.content_hash()));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Full frames on the dummy backend
// ---------------------------------------------------------------------------

fn bench_render_cached(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_cached_frame");
    for passes in [4, 16] {
        let mut scene = Scene::new(4);
        group.bench_function(BenchmarkId::from_parameter(passes), |b| {
            b.iter(|| {
                let graph = scene.graph(passes, ClearValue::BLACK);
                scene.renderer.render(graph).unwrap();
                scene.renderer.backend_mut().clear_events();
            });
        });
    }
    group.finish();
}

fn bench_render_recompile(c: &mut Criterion) {
    let mut scene = Scene::new(4);
    let mut passes = 8;
    c.bench_function("render_recompile_every_frame", |b| {
        b.iter(|| {
            // Alternating pass counts defeats the compile cache.
            passes = if passes == 8 { 9 } else { 8 };
            let graph = scene.graph(passes, ClearValue::BLACK);
            scene.renderer.render(graph).unwrap();
            scene.renderer.backend_mut().clear_events();
        });
    });
}

criterion_group!(
    benches,
    bench_content_hash,
    bench_render_cached,
    bench_render_recompile
);
criterion_main!(benches);
