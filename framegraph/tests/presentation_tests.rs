//! Presentation tests: minimized windows, surface recreation and multiple
//! swapchains.

mod common;

use common::{TestWindow, draw_pass, renderer, simulate_pass, storage_buffer};
use redlilium_framegraph::backend::dummy::DummyEvent;
use redlilium_framegraph::backend::{AcquireOutcome, PresentOutcome};
use redlilium_framegraph::{ClearValue, Extent2d, RenderGraph};

#[test]
fn minimized_window_skips_surface_but_runs_offscreen_work() {
    let mut renderer = renderer();
    let window = TestWindow::shared(640, 480);
    let target = renderer.create_swapchain(window.clone()).unwrap();
    let buffer = storage_buffer(&mut renderer);

    let graph = || {
        let mut graph = RenderGraph::new();
        graph.add_pass("simulate", simulate_pass(buffer));
        graph.add_pass("present", draw_pass(target, ClearValue::BLACK));
        graph
    };

    window.set_minimized(true);
    renderer.render(graph()).unwrap();
    {
        let backend = renderer.backend();
        assert_eq!(backend.acquire_count(), 0);
        assert_eq!(backend.present_count(), 0);
        assert_eq!(backend.dispatch_count(), 1);
        assert_eq!(backend.draw_count(), 0);
    }
    assert_eq!(renderer.frame_count(), 1);

    window.set_minimized(false);
    renderer.render(graph()).unwrap();
    let backend = renderer.backend();
    assert_eq!(backend.acquire_count(), 1);
    assert_eq!(backend.present_count(), 1);
    assert_eq!(backend.draw_count(), 1);
}

#[test]
fn out_of_date_acquire_recreates_at_window_size() {
    let mut renderer = renderer();
    let window = TestWindow::shared(640, 480);
    let target = renderer.create_swapchain(window.clone()).unwrap();
    let surface = renderer.backend().first_surface().unwrap();

    window.resize(1024, 768);
    renderer
        .backend_mut()
        .script_acquire(surface, [AcquireOutcome::OutOfDate]);

    let mut graph = RenderGraph::new();
    graph.add_pass("present", draw_pass(target, ClearValue::BLACK));
    renderer.render(graph).unwrap();

    let backend = renderer.backend();
    assert_eq!(backend.recreate_count(), 1);
    assert_eq!(backend.acquire_count(), 2);
    assert_eq!(backend.present_count(), 1);
    assert_eq!(renderer.swapchain_extent(0), Some(Extent2d::new(1024, 768)));
}

#[test]
fn suboptimal_present_recreates_on_next_frame() {
    let mut renderer = renderer();
    let window = TestWindow::shared(320, 200);
    let target = renderer.create_swapchain(window).unwrap();
    let surface = renderer.backend().first_surface().unwrap();
    renderer
        .backend_mut()
        .script_present(surface, [PresentOutcome::Suboptimal]);

    let graph = || {
        let mut graph = RenderGraph::new();
        graph.add_pass("present", draw_pass(target, ClearValue::BLACK));
        graph
    };

    renderer.render(graph()).unwrap();
    assert_eq!(renderer.backend().recreate_count(), 0);

    renderer.render(graph()).unwrap();
    let events = renderer.backend().events();
    let recreate = events
        .iter()
        .position(|e| matches!(e, DummyEvent::RecreateSurface { .. }))
        .unwrap();
    let last_acquire = events
        .iter()
        .rposition(|e| matches!(e, DummyEvent::Acquire { .. }))
        .unwrap();
    assert!(recreate < last_acquire);
    assert_eq!(renderer.backend().present_count(), 2);
}

#[test]
fn two_windows_present_in_one_call() {
    let mut renderer = renderer();
    let left = renderer.create_swapchain(TestWindow::shared(400, 300)).unwrap();
    let right = renderer.create_swapchain(TestWindow::shared(400, 300)).unwrap();

    let mut graph = RenderGraph::new();
    graph.add_pass("left", draw_pass(left, ClearValue::BLACK));
    graph.add_pass("right", draw_pass(right, ClearValue::BLACK));
    renderer.render(graph).unwrap();

    let presents: Vec<_> = renderer
        .backend()
        .events()
        .iter()
        .filter_map(|e| match e {
            DummyEvent::Present { images, waits } => Some((images.len(), waits.len())),
            _ => None,
        })
        .collect();
    assert_eq!(presents, [(2, 1)]);
    assert_eq!(renderer.backend().acquire_count(), 2);
}

#[test]
fn removed_swapchain_invalidates_its_target() {
    let mut renderer = renderer();
    let target = renderer.create_swapchain(TestWindow::shared(200, 200)).unwrap();

    let mut graph = RenderGraph::new();
    graph.add_pass("present", draw_pass(target, ClearValue::BLACK));
    renderer.render(graph).unwrap();

    renderer.remove_swapchain(0).unwrap();
    assert_eq!(renderer.backend().live_surfaces(), 0);

    let mut graph = RenderGraph::new();
    graph.add_pass("present", draw_pass(target, ClearValue::BLACK));
    assert!(renderer.render(graph).is_err());
    assert!(!renderer.is_halted());
}

#[test]
fn visible_surface_is_not_presented_when_its_only_pass_is_skipped() {
    let mut renderer = renderer();
    let visible = renderer.create_swapchain(TestWindow::shared(300, 200)).unwrap();
    let hidden_window = TestWindow::shared(300, 200);
    let hidden = renderer.create_swapchain(hidden_window.clone()).unwrap();
    hidden_window.set_minimized(true);

    let mirrored = || {
        let mut graph = RenderGraph::new();
        graph.add_pass(
            "mirror",
            draw_pass(visible, ClearValue::BLACK).with_render_target(hidden, ClearValue::BLACK),
        );
        graph
    };

    renderer.render(mirrored()).unwrap();
    {
        let backend = renderer.backend();
        assert_eq!(backend.acquire_count(), 0);
        assert_eq!(backend.draw_count(), 0);
        assert_eq!(backend.present_count(), 0);
    }

    // A second pass writing only the visible surface makes it worth acquiring.
    let mut graph = mirrored();
    graph.add_pass("overlay", draw_pass(visible, ClearValue::BLACK));
    renderer.render(graph).unwrap();

    let backend = renderer.backend();
    assert_eq!(backend.acquire_count(), 1);
    assert_eq!(backend.draw_count(), 1);
    assert_eq!(backend.present_count(), 1);
    let begins = backend
        .events()
        .iter()
        .filter(|e| matches!(e, DummyEvent::BeginRendering { .. }))
        .count();
    assert_eq!(begins, 1);

    hidden_window.set_minimized(false);
    renderer.render(mirrored()).unwrap();
    assert_eq!(renderer.backend().acquire_count(), 3);
    assert_eq!(renderer.backend().present_count(), 2);
}

#[test]
fn surface_left_without_writers_after_failed_acquire_is_recreated() {
    let mut renderer = renderer();
    let first = renderer.create_swapchain(TestWindow::shared(300, 200)).unwrap();
    let second = renderer.create_swapchain(TestWindow::shared(300, 200)).unwrap();
    let second_surface = renderer
        .backend()
        .events()
        .iter()
        .filter_map(|e| match e {
            DummyEvent::CreateSurface(surface) => Some(*surface),
            _ => None,
        })
        .last()
        .unwrap();
    renderer.backend_mut().script_acquire(
        second_surface,
        [AcquireOutcome::OutOfDate, AcquireOutcome::OutOfDate],
    );

    let mut graph = RenderGraph::new();
    graph.add_pass(
        "mirror",
        draw_pass(first, ClearValue::BLACK).with_render_target(second, ClearValue::BLACK),
    );
    renderer.render(graph).unwrap();

    let backend = renderer.backend();
    assert_eq!(backend.draw_count(), 0);
    assert_eq!(backend.present_count(), 0);
    // One recreate for the out-of-date surface, none yet for the abandoned one.
    assert_eq!(backend.recreate_count(), 1);

    let mut graph = RenderGraph::new();
    graph.add_pass(
        "mirror",
        draw_pass(first, ClearValue::BLACK).with_render_target(second, ClearValue::BLACK),
    );
    renderer.render(graph).unwrap();
    let backend = renderer.backend();
    assert_eq!(backend.draw_count(), 1);
    assert_eq!(backend.present_count(), 1);
    assert_eq!(backend.recreate_count(), 3);
}
