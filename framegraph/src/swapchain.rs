//! Presentation surfaces.
//!
//! The [`PresentationManager`] owns every registered swapchain: the backend
//! surface, one "image acquired" semaphore per frame slot, and the
//! bookkeeping needed to survive window resizes and minimization.
//!
//! # Acquire / present protocol
//!
//! ```text
//! acquire_next(surface, slot)
//!   ├─ window minimized ─────────────► Unavailable (surface skipped this frame)
//!   ├─ recreation pending ───────────► recreate at window size, then acquire
//!   └─ acquire
//!        ├─ Acquired / Suboptimal ───► Image(i)  (suboptimal: recreate next frame)
//!        └─ OutOfDate ───────────────► recreate, retry once, else Unavailable
//!
//! present(active surfaces)          one combined call
//!   └─ OutOfDate / Suboptimal ──────► recreation scheduled for the next frame
//! ```
//!
//! Neither path ever surfaces an error for transient conditions; only
//! backend failures (device loss, allocation failure) are returned.

use std::sync::Arc;

use raw_window_handle::{
    HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use slotmap::SlotMap;

use crate::backend::{AcquireOutcome, Backend, PresentRequest, SurfaceInfo};
use crate::error::GraphicsError;
use crate::resources::SurfaceId;
use crate::types::{Extent2d, TextureFormat};

/// Presentation mode for the swapchain.
///
/// Controls how frames are synchronized with the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// No synchronization. May cause tearing but has lowest latency.
    Immediate,
    /// Triple buffering. Low latency without tearing.
    #[default]
    Mailbox,
    /// VSync enabled. No tearing, but may have higher latency. Always supported.
    Fifo,
    /// VSync with relaxed timing. May tear if a frame is late.
    FifoRelaxed,
}

/// The windowing collaborator, as seen by the presentation manager.
pub trait Window {
    /// Current drawable size in pixels.
    fn extent(&self) -> Extent2d;

    /// Whether the window is minimized (nothing can be presented).
    fn is_minimized(&self) -> bool;

    /// Platform handles used to create a GPU surface.
    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), HandleError>;
}

impl Window for winit::window::Window {
    fn extent(&self) -> Extent2d {
        let size = self.inner_size();
        Extent2d::new(size.width, size.height)
    }

    fn is_minimized(&self) -> bool {
        // Not every platform reports minimization; a zero-sized window is
        // treated the same way.
        self.is_minimized().unwrap_or(false) || Window::extent(self).is_empty()
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), HandleError> {
        let display = self.display_handle()?.as_raw();
        let window = self.window_handle()?.as_raw();
        Ok((display, window))
    }
}

/// Result of [`PresentationManager::acquire_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// Image index acquired for this frame.
    Image(u32),
    /// The surface cannot be rendered this frame (minimized, or still out of
    /// date after one recreation).
    Unavailable,
}

/// One registered swapchain.
struct PresentationSurface<B: Backend> {
    window: Arc<dyn Window>,
    surface: B::Surface,
    info: SurfaceInfo,
    /// "Image acquired" semaphore per frame slot.
    acquired: Vec<B::Semaphore>,
    /// Image acquired this frame, if any.
    image_index: Option<u32>,
    /// Set when a present or acquire reported the surface stale.
    needs_recreation: bool,
}

/// Owner of all presentation surfaces.
pub struct PresentationManager<B: Backend> {
    surfaces: SlotMap<SurfaceId, PresentationSurface<B>>,
    /// Registration order; `remove(index)` indexes into this.
    order: Vec<SurfaceId>,
    present_mode: PresentMode,
    frames_in_flight: usize,
}

impl<B: Backend> PresentationManager<B> {
    /// Create an empty manager.
    pub fn new(present_mode: PresentMode, frames_in_flight: usize) -> Self {
        Self {
            surfaces: SlotMap::with_key(),
            order: Vec::new(),
            present_mode,
            frames_in_flight,
        }
    }

    /// Register a swapchain for `window`.
    pub fn create(
        &mut self,
        backend: &mut B,
        window: Arc<dyn Window>,
    ) -> Result<SurfaceId, GraphicsError> {
        let (surface, info) = backend.create_surface(window.as_ref(), self.present_mode)?;

        let mut acquired = Vec::with_capacity(self.frames_in_flight);
        for _ in 0..self.frames_in_flight {
            match backend.create_semaphore() {
                Ok(semaphore) => acquired.push(semaphore),
                Err(e) => {
                    for semaphore in acquired {
                        backend.destroy_semaphore(semaphore);
                    }
                    backend.destroy_surface(surface);
                    return Err(e);
                }
            }
        }

        let id = self.surfaces.insert(PresentationSurface {
            window,
            surface,
            info,
            acquired,
            image_index: None,
            needs_recreation: false,
        });
        self.order.push(id);

        log::info!(
            "Created swapchain {} ({}x{}, {:?}, {} images)",
            self.order.len() - 1,
            info.extent.width,
            info.extent.height,
            info.format,
            info.image_count
        );
        Ok(id)
    }

    /// Unregister the swapchain at `index` (registration order).
    ///
    /// The caller must make sure the device no longer uses it.
    pub fn remove(&mut self, backend: &mut B, index: usize) -> Result<SurfaceId, GraphicsError> {
        if index >= self.order.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "swapchain index {index} out of range ({})",
                self.order.len()
            )));
        }

        let id = self.order.remove(index);
        if let Some(entry) = self.surfaces.remove(id) {
            Self::destroy_entry(backend, entry);
        }
        log::info!("Removed swapchain {index}");
        Ok(id)
    }

    /// Destroy every surface. The device must be idle.
    pub fn destroy_all(&mut self, backend: &mut B) {
        self.order.clear();
        for (_, entry) in self.surfaces.drain() {
            Self::destroy_entry(backend, entry);
        }
    }

    fn destroy_entry(backend: &mut B, entry: PresentationSurface<B>) {
        for semaphore in entry.acquired {
            backend.destroy_semaphore(semaphore);
        }
        backend.destroy_surface(entry.surface);
    }

    /// Number of registered swapchains.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Surface id of the swapchain at `index`.
    pub fn id_at(&self, index: usize) -> Option<SurfaceId> {
        self.order.get(index).copied()
    }

    /// Whether `id` refers to a registered swapchain.
    pub fn contains(&self, id: SurfaceId) -> bool {
        self.surfaces.contains_key(id)
    }

    /// Current image size of `id`.
    pub fn extent(&self, id: SurfaceId) -> Option<Extent2d> {
        self.surfaces.get(id).map(|s| s.info.extent)
    }

    /// Image format of `id`.
    pub fn format(&self, id: SurfaceId) -> Option<TextureFormat> {
        self.surfaces.get(id).map(|s| s.info.format)
    }

    /// Backend surface of `id`.
    pub fn backend_surface(&self, id: SurfaceId) -> Option<B::Surface> {
        self.surfaces.get(id).map(|s| s.surface)
    }

    /// Image acquired for `id` this frame.
    pub fn image_index(&self, id: SurfaceId) -> Option<u32> {
        self.surfaces.get(id).and_then(|s| s.image_index)
    }

    /// "Image acquired" semaphore of `id` for frame slot `slot`.
    pub fn acquire_semaphore(&self, id: SurfaceId, slot: usize) -> Option<B::Semaphore> {
        self.surfaces
            .get(id)
            .and_then(|s| s.acquired.get(slot).copied())
    }

    /// Whether `id` will be rebuilt before its next acquire.
    pub fn needs_recreation(&self, id: SurfaceId) -> bool {
        self.surfaces.get(id).is_some_and(|s| s.needs_recreation)
    }

    /// Whether `id` can be acquired at all: its window is visible and has a
    /// drawable area.
    pub fn is_presentable(&self, id: SurfaceId) -> bool {
        self.surfaces
            .get(id)
            .is_some_and(|s| !s.window.is_minimized() && !s.window.extent().is_empty())
    }

    /// Give up on the image acquired for `id` this frame.
    ///
    /// The image is not presented. The swapchain is rebuilt before the next
    /// acquire, which retires it.
    pub fn abandon_image(&mut self, id: SurfaceId) {
        if let Some(entry) = self.surfaces.get_mut(id) {
            entry.image_index = None;
            entry.needs_recreation = true;
        }
    }

    /// Acquire the next image of `id` for frame slot `slot`.
    ///
    /// On success the slot's acquire semaphore will be signaled by the
    /// device once the image is ready.
    pub fn acquire_next(
        &mut self,
        backend: &mut B,
        id: SurfaceId,
        slot: usize,
    ) -> Result<AcquireResult, GraphicsError> {
        let entry = self
            .surfaces
            .get_mut(id)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("surface {id:?}")))?;
        entry.image_index = None;

        if entry.window.is_minimized() || entry.window.extent().is_empty() {
            log::debug!("Surface {id:?} minimized, skipping this frame");
            return Ok(AcquireResult::Unavailable);
        }

        if entry.needs_recreation {
            Self::recreate(backend, id, entry)?;
        }

        let semaphore = entry.acquired[slot];
        for attempt in 0..2 {
            match backend.acquire_next_image(entry.surface, semaphore)? {
                AcquireOutcome::Acquired(index) => {
                    entry.image_index = Some(index);
                    return Ok(AcquireResult::Image(index));
                }
                AcquireOutcome::Suboptimal(index) => {
                    entry.image_index = Some(index);
                    entry.needs_recreation = true;
                    return Ok(AcquireResult::Image(index));
                }
                AcquireOutcome::OutOfDate if attempt == 0 => {
                    Self::recreate(backend, id, entry)?;
                }
                AcquireOutcome::OutOfDate => {}
            }
        }

        log::warn!("Surface {id:?} still out of date after recreation, skipping this frame");
        entry.needs_recreation = true;
        Ok(AcquireResult::Unavailable)
    }

    fn recreate(
        backend: &mut B,
        id: SurfaceId,
        entry: &mut PresentationSurface<B>,
    ) -> Result<(), GraphicsError> {
        let extent = entry.window.extent();
        entry.info = backend.recreate_surface(entry.surface, extent)?;
        entry.needs_recreation = false;
        log::debug!(
            "Recreated surface {id:?} at {}x{}",
            entry.info.extent.width,
            entry.info.extent.height
        );
        Ok(())
    }

    /// Present every surface in `ids` that acquired an image, in one call.
    ///
    /// Stale surfaces reported by the present are rebuilt on their next
    /// acquire, never synchronously here.
    pub fn present(
        &mut self,
        backend: &mut B,
        ids: &[SurfaceId],
        waits: &[B::Semaphore],
    ) -> Result<usize, GraphicsError> {
        let mut presented = Vec::with_capacity(ids.len());
        let mut requests = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(entry) = self.surfaces.get_mut(id)
                && let Some(image_index) = entry.image_index.take()
            {
                presented.push(id);
                requests.push(PresentRequest {
                    surface: entry.surface,
                    image_index,
                });
            }
        }

        if requests.is_empty() {
            return Ok(0);
        }

        let outcomes = backend.present(&requests, waits)?;
        for (id, outcome) in presented.iter().zip(outcomes) {
            if outcome.needs_recreation()
                && let Some(entry) = self.surfaces.get_mut(*id)
            {
                log::debug!("Surface {id:?} reported {outcome:?}, recreating next frame");
                entry.needs_recreation = true;
            }
        }

        log::trace!("Presented {} surface(s)", requests.len());
        Ok(requests.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, DummyEvent};
    use crate::backend::PresentOutcome;
    use crate::test_util::TestWindow;

    fn manager_with_window(
        backend: &mut DummyBackend,
        window: &Arc<TestWindow>,
    ) -> (PresentationManager<DummyBackend>, SurfaceId) {
        let mut manager = PresentationManager::new(PresentMode::Mailbox, 2);
        let id = manager.create(backend, window.clone()).unwrap();
        (manager, id)
    }

    #[test]
    fn test_create_and_remove() {
        let mut backend = DummyBackend::new();
        let window = Arc::new(TestWindow::new(800, 600));
        let (mut manager, id) = manager_with_window(&mut backend, &window);

        assert_eq!(manager.len(), 1);
        assert_eq!(manager.id_at(0), Some(id));
        assert_eq!(manager.extent(id), Some(Extent2d::new(800, 600)));
        assert!(manager.acquire_semaphore(id, 1).is_some());
        assert!(manager.acquire_semaphore(id, 2).is_none());

        assert!(manager.remove(&mut backend, 1).is_err());
        assert_eq!(manager.remove(&mut backend, 0).unwrap(), id);
        assert!(manager.is_empty());
        assert!(!manager.contains(id));
    }

    #[test]
    fn test_acquire_image() {
        let mut backend = DummyBackend::new();
        let window = Arc::new(TestWindow::new(800, 600));
        let (mut manager, id) = manager_with_window(&mut backend, &window);

        let result = manager.acquire_next(&mut backend, id, 0).unwrap();
        assert!(matches!(result, AcquireResult::Image(_)));
        assert!(manager.image_index(id).is_some());
        assert_eq!(backend.acquire_count(), 1);
    }

    #[test]
    fn test_minimized_window_is_unavailable_without_acquire() {
        let mut backend = DummyBackend::new();
        let window = Arc::new(TestWindow::new(800, 600));
        let (mut manager, id) = manager_with_window(&mut backend, &window);

        window.set_minimized(true);
        let result = manager.acquire_next(&mut backend, id, 0).unwrap();
        assert_eq!(result, AcquireResult::Unavailable);
        assert_eq!(backend.acquire_count(), 0);

        // Nothing acquired, so nothing is presented.
        assert_eq!(manager.present(&mut backend, &[id], &[]).unwrap(), 0);
        assert_eq!(backend.present_count(), 0);
    }

    #[test]
    fn test_out_of_date_recreates_and_retries_once() {
        let mut backend = DummyBackend::new();
        let window = Arc::new(TestWindow::new(800, 600));
        let (mut manager, id) = manager_with_window(&mut backend, &window);
        let surface = manager.backend_surface(id).unwrap();

        window.resize(1024, 768);
        backend.script_acquire(surface, [AcquireOutcome::OutOfDate]);

        let result = manager.acquire_next(&mut backend, id, 0).unwrap();
        assert!(matches!(result, AcquireResult::Image(_)));
        assert_eq!(manager.extent(id), Some(Extent2d::new(1024, 768)));
        assert_eq!(backend.acquire_count(), 2);
        assert!(backend
            .events()
            .iter()
            .any(|e| matches!(e, DummyEvent::RecreateSurface { .. })));
    }

    #[test]
    fn test_persistently_out_of_date_is_unavailable() {
        let mut backend = DummyBackend::new();
        let window = Arc::new(TestWindow::new(800, 600));
        let (mut manager, id) = manager_with_window(&mut backend, &window);
        let surface = manager.backend_surface(id).unwrap();

        backend.script_acquire(surface, [AcquireOutcome::OutOfDate, AcquireOutcome::OutOfDate]);
        let result = manager.acquire_next(&mut backend, id, 0).unwrap();
        assert_eq!(result, AcquireResult::Unavailable);
        assert_eq!(backend.acquire_count(), 2);
        assert!(manager.needs_recreation(id));
    }

    #[test]
    fn test_present_out_of_date_defers_recreation() {
        let mut backend = DummyBackend::new();
        let window = Arc::new(TestWindow::new(800, 600));
        let (mut manager, id) = manager_with_window(&mut backend, &window);
        let surface = manager.backend_surface(id).unwrap();

        manager.acquire_next(&mut backend, id, 0).unwrap();
        backend.script_present(surface, [PresentOutcome::OutOfDate]);
        assert_eq!(manager.present(&mut backend, &[id], &[]).unwrap(), 1);

        // Scheduled, not performed synchronously.
        assert!(manager.needs_recreation(id));
        assert_eq!(backend.recreate_count(), 0);

        window.resize(640, 480);
        manager.acquire_next(&mut backend, id, 1).unwrap();
        assert_eq!(backend.recreate_count(), 1);
        assert!(!manager.needs_recreation(id));
        assert_eq!(manager.extent(id), Some(Extent2d::new(640, 480)));
    }

    #[test]
    fn test_present_is_one_combined_call() {
        let mut backend = DummyBackend::new();
        let first = Arc::new(TestWindow::new(800, 600));
        let second = Arc::new(TestWindow::new(640, 480));
        let mut manager = PresentationManager::new(PresentMode::Fifo, 2);
        let a = manager.create(&mut backend, first).unwrap();
        let b = manager.create(&mut backend, second).unwrap();

        manager.acquire_next(&mut backend, a, 0).unwrap();
        manager.acquire_next(&mut backend, b, 0).unwrap();
        assert_eq!(manager.present(&mut backend, &[a, b], &[]).unwrap(), 2);
        assert_eq!(backend.present_count(), 1);
    }
}
