//! Helpers shared by the unit tests of this crate.

use std::cell::{Cell, RefCell};
use std::sync::{Arc, Mutex, Once};

use raw_window_handle::{HandleError, RawDisplayHandle, RawWindowHandle};
use slotmap::SlotMap;

use crate::graph::{PipelineDescription, RenderTarget, ShaderBinary};
use crate::resources::{BufferHandle, RenderTargetHandle, SurfaceId, TextureHandle};
use crate::swapchain::Window;
use crate::types::{Extent2d, RenderTargetKind, ShaderStage, TextureFormat};

// ============================================================================
// Log capture
// ============================================================================

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if CAPTURING.with(Cell::get) {
            CAPTURED.with(|c| {
                c.borrow_mut()
                    .push((record.level(), record.args().to_string()))
            });
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INSTALL: Once = Once::new();

/// Run `f` and return every record it logged on this thread.
pub(crate) fn capture_logs(f: impl FnOnce()) -> Vec<(log::Level, String)> {
    INSTALL.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });

    CAPTURED.with(|c| c.borrow_mut().clear());
    CAPTURING.with(|c| c.set(true));
    f();
    CAPTURING.with(|c| c.set(false));
    CAPTURED.with(|c| std::mem::take(&mut *c.borrow_mut()))
}

/// Number of warnings in captured records.
pub(crate) fn warning_count(logs: &[(log::Level, String)]) -> usize {
    logs.iter().filter(|(level, _)| *level == log::Level::Warn).count()
}

// ============================================================================
// Pipelines and handles
// ============================================================================

/// Minimal valid graphics pipeline (vertex + fragment).
pub(crate) fn graphics_pipeline() -> PipelineDescription {
    PipelineDescription::graphics()
        .with_shader(ShaderBinary::new(ShaderStage::Vertex, "vs_main", vec![0x0723_0203, 1]))
        .with_shader(ShaderBinary::new(ShaderStage::Fragment, "fs_main", vec![0x0723_0203, 2]))
}

/// Minimal valid compute pipeline.
pub(crate) fn compute_pipeline() -> PipelineDescription {
    PipelineDescription::compute().with_shader(ShaderBinary::new(
        ShaderStage::Compute,
        "cs_main",
        vec![0x0723_0203, 3],
    ))
}

/// Distinct handles that resolve to nothing; enough for graph-level tests.
pub(crate) struct TestHandles {
    pub buffers: Vec<BufferHandle>,
    pub textures: Vec<TextureHandle>,
}

impl TestHandles {
    pub fn new() -> Self {
        let mut buffers = SlotMap::<BufferHandle, ()>::with_key();
        let mut textures = SlotMap::<TextureHandle, ()>::with_key();
        Self {
            buffers: (0..4).map(|_| buffers.insert(())).collect(),
            textures: (0..4).map(|_| textures.insert(())).collect(),
        }
    }
}

thread_local! {
    static TARGET_KEYS: RefCell<SlotMap<RenderTargetHandle, ()>> =
        RefCell::new(SlotMap::with_key());
    static SURFACE_KEYS: RefCell<SlotMap<SurfaceId, ()>> = RefCell::new(SlotMap::with_key());
}

/// A render target with a handle no earlier call returned.
pub(crate) fn render_target(kind: RenderTargetKind, is_surface: bool) -> RenderTarget {
    RenderTarget {
        handle: TARGET_KEYS.with(|keys| keys.borrow_mut().insert(())),
        kind,
        color_format: TextureFormat::Rgba8Unorm,
        depth_format: TextureFormat::Depth32Float,
        surface: is_surface.then(|| SURFACE_KEYS.with(|keys| keys.borrow_mut().insert(()))),
    }
}

// ============================================================================
// Window
// ============================================================================

/// Window whose size and minimized state tests can change at will.
pub(crate) struct TestWindow {
    state: Mutex<(Extent2d, bool)>,
}

impl TestWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new((Extent2d::new(width, height), false)),
        }
    }

    pub fn shared(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self::new(width, height))
    }

    pub fn resize(&self, width: u32, height: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.0 = Extent2d::new(width, height);
        }
    }

    pub fn set_minimized(&self, minimized: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.1 = minimized;
        }
    }
}

impl Window for TestWindow {
    fn extent(&self) -> Extent2d {
        self.state.lock().map(|s| s.0).unwrap_or_default()
    }

    fn is_minimized(&self) -> bool {
        self.state.lock().map(|s| s.1).unwrap_or(true)
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), HandleError> {
        Err(HandleError::Unavailable)
    }
}

mod tests {
    use super::*;

    #[test]
    fn test_render_targets_are_distinct() {
        let a = render_target(RenderTargetKind::Color, true);
        let b = render_target(RenderTargetKind::Color, true);
        assert_ne!(a.handle, b.handle);
        assert_ne!(a.surface, b.surface);
    }
}
