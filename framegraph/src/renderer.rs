//! The renderer: one object owning the device, resources and frame state.
//!
//! [`Renderer`] ties the pieces together. Each call to [`Renderer::render`]
//! runs one frame:
//!
//! ```text
//! compile (cached) ─► begin_frame (fence wait) ─► acquire surfaces
//!        ─► plan waits/signals ─► record + submit batches ─► present ─► end_frame
//! ```
//!
//! # Failure model
//!
//! Caller mistakes (stale handles, bad parameters) come back as errors and
//! leave the renderer usable. Anything else is fatal: it is logged once, and
//! from then on every call returns [`GraphicsError::Halted`].

use std::sync::Arc;

use crate::backend::Backend;
use crate::compiler::{CompiledFrame, CompilerStats, GraphCompiler};
use crate::config::RendererConfig;
use crate::error::GraphicsError;
use crate::executor::ExecutionEngine;
use crate::graph::{RenderGraph, RenderTarget};
use crate::pipeline::FramePipeline;
use crate::resources::{BufferHandle, ResourceRegistry, SurfaceId, TextureHandle};
use crate::scheduler::{AcquireWait, SubmissionPlanner};
use crate::swapchain::{AcquireResult, PresentationManager, Window};
use crate::types::{
    BufferDescriptor, BufferKind, Extent2d, RenderTargetDescriptor, TextureDescriptor,
};
use crate::{frame_mark, profile_plot, profile_scope};

/// Owns a backend and everything needed to render frames with it.
///
/// # Example
///
/// ```
/// use redlilium_framegraph::{DummyBackend, Renderer, RendererConfig};
///
/// let renderer = Renderer::new(DummyBackend::new(), RendererConfig::default())?;
/// assert_eq!(renderer.frame_count(), 0);
/// # Ok::<(), redlilium_framegraph::GraphicsError>(())
/// ```
pub struct Renderer<B: Backend> {
    backend: B,
    config: RendererConfig,
    resources: ResourceRegistry<B>,
    compiler: GraphCompiler<B>,
    frames: FramePipeline<B>,
    planner: SubmissionPlanner<B>,
    executor: ExecutionEngine<B>,
    surfaces: PresentationManager<B>,
    /// Surface render targets in swapchain registration order.
    swapchain_targets: Vec<RenderTarget>,
    frame_count: u64,
    halted: bool,
    shut_down: bool,
}

impl<B: Backend> Renderer<B> {
    /// Build a renderer on `backend`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an invalid configuration, or the
    /// backend's error if fences or semaphores cannot be created.
    pub fn new(mut backend: B, config: RendererConfig) -> Result<Self, GraphicsError> {
        config.validate()?;

        let mut frames = FramePipeline::new(&mut backend, config.frames_in_flight)?;
        let planner = match SubmissionPlanner::new(&mut backend) {
            Ok(planner) => planner,
            Err(e) => {
                frames.destroy(&mut backend);
                return Err(e);
            }
        };

        log::info!(
            "Renderer initialized on {} ({} frames in flight, {:?})",
            backend.name(),
            config.frames_in_flight,
            config.present_mode
        );

        Ok(Self {
            resources: ResourceRegistry::new(config.frames_in_flight),
            compiler: GraphCompiler::new(),
            executor: ExecutionEngine::new(config.frames_in_flight),
            surfaces: PresentationManager::new(config.present_mode, config.frames_in_flight),
            swapchain_targets: Vec::new(),
            frames,
            planner,
            backend,
            config,
            frame_count: 0,
            halted: false,
            shut_down: false,
        })
    }

    // --- Frames --------------------------------------------------------------

    /// Compile (or reuse), record, submit and present one frame.
    ///
    /// An empty graph is a no-op. Passes that render into a surface that has
    /// no image this frame (minimized window) are skipped; the rest of the
    /// frame still runs.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` when the graph references a destroyed resource; the
    /// frame is dropped and the renderer stays usable. Any fatal error halts
    /// the renderer.
    pub fn render(&mut self, mut graph: RenderGraph) -> Result<(), GraphicsError> {
        self.ensure_running()?;
        if graph.is_empty() {
            log::warn!("Render graph has no passes, nothing to render");
            return Ok(());
        }

        profile_scope!("render");
        let result = self.render_frame(&mut graph);
        self.check(result)?;

        self.frame_count += 1;
        frame_mark!();
        Ok(())
    }

    fn render_frame(&mut self, graph: &mut RenderGraph) -> Result<(), GraphicsError> {
        let frame = {
            profile_scope!("compile");
            self.compiler
                .compile(&mut self.backend, &self.resources, graph)?
        };
        profile_plot!("batches", frame.batches().len());

        let slot = self.frames.begin_frame(&mut self.backend)?;
        self.executor.retire_slot(slot);

        let (available, acquired) = self.acquire_surfaces(&frame, slot)?;
        let presents = !available.is_empty();

        let plan = {
            profile_scope!("plan");
            let fences = self.frames.fences(slot);
            self.planner
                .plan(frame.batches(), &acquired, &fences, presents)?
        };

        {
            profile_scope!("record");
            self.executor.execute(
                &mut self.backend,
                &self.resources,
                &self.surfaces,
                &frame,
                graph,
                slot,
                &plan,
                &available,
            )?;
        }

        if presents {
            profile_scope!("present");
            self.surfaces
                .present(&mut self.backend, &available, &plan.present_waits)?;
        }

        self.frames.end_frame(slot, frame.queues());
        Ok(())
    }

    /// Acquire an image for every surface the frame will render into.
    ///
    /// A surface is only acquired when at least one pass writing it can run,
    /// meaning every surface that pass touches is presentable. Returns the
    /// surfaces to present, and the semaphore wait each acquired surface adds
    /// to its first writing batch.
    fn acquire_surfaces(
        &mut self,
        frame: &CompiledFrame<B>,
        slot: usize,
    ) -> Result<(Vec<SurfaceId>, Vec<AcquireWait<B::Semaphore>>), GraphicsError>
    {
        let presentable: Vec<SurfaceId> = frame
            .surfaces()
            .iter()
            .copied()
            .filter(|&id| self.surfaces.is_presentable(id))
            .collect();

        let mut available = Vec::with_capacity(presentable.len());
        let mut acquired = Vec::with_capacity(presentable.len());

        for &surface in &presentable {
            if !frame.has_runnable_writer(surface, |s| presentable.contains(&s)) {
                log::debug!("Surface {surface:?} has no pass that can run, not acquiring");
                continue;
            }
            if let AcquireResult::Unavailable =
                self.surfaces.acquire_next(&mut self.backend, surface, slot)?
            {
                continue;
            }
            let semaphore = self.surfaces.acquire_semaphore(surface, slot);
            let batch = frame.first_batch_writing(surface);
            let (Some(semaphore), Some(batch)) = (semaphore, batch) else {
                return Err(GraphicsError::Internal(format!(
                    "surface {surface:?} acquired without a semaphore or writing batch"
                )));
            };
            available.push(surface);
            acquired.push(AcquireWait { batch, semaphore });
        }

        // A surface that failed to acquire can leave another surface with no
        // pass to run. Its acquire semaphore is still waited on, but the image
        // is not presented.
        let orphans: Vec<SurfaceId> = available
            .iter()
            .copied()
            .filter(|&id| !frame.has_runnable_writer(id, |s| available.contains(&s)))
            .collect();
        for id in orphans {
            log::debug!("Surface {id:?} lost its only writers this frame, not presenting");
            self.surfaces.abandon_image(id);
            available.retain(|&s| s != id);
        }

        Ok((available, acquired))
    }

    /// Number of frames rendered.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn compiler_stats(&self) -> CompilerStats {
        self.compiler.stats()
    }

    /// The frame compiled last, if the cache holds one.
    pub fn compiled_frame(&self) -> Option<&Arc<CompiledFrame<B>>> {
        self.compiler.cached()
    }

    /// Block until the device has finished all submitted work.
    pub fn wait_idle(&mut self) -> Result<(), GraphicsError> {
        self.ensure_running()?;
        let result = self
            .frames
            .wait_idle(&mut self.backend)
            .and_then(|()| self.backend.wait_idle());
        self.check(result)
    }

    // --- Swapchains ----------------------------------------------------------

    /// Register a swapchain for `window` and return its render target.
    pub fn create_swapchain(
        &mut self,
        window: Arc<dyn Window>,
    ) -> Result<RenderTarget, GraphicsError> {
        self.ensure_running()?;
        let result = self.surfaces.create(&mut self.backend, window);
        let id = self.check(result)?;

        let (Some(format), Some(extent)) = (self.surfaces.format(id), self.surfaces.extent(id))
        else {
            return self.check(Err(GraphicsError::Internal(format!(
                "swapchain {id:?} vanished"
            ))));
        };
        let target = self.resources.register_surface_target(id, format, extent);
        self.swapchain_targets.push(target);
        Ok(target)
    }

    /// Remove the swapchain at `index` (registration order).
    ///
    /// Waits for the device to go idle first. The cached compiled frame is
    /// dropped, so a graph still referencing the swapchain's render target
    /// fails with `InvalidHandle` on the next render.
    pub fn remove_swapchain(&mut self, index: usize) -> Result<(), GraphicsError> {
        self.ensure_running()?;
        if index >= self.swapchain_targets.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "swapchain index {index} out of range ({})",
                self.swapchain_targets.len()
            )));
        }

        let result = self.drain_and_release();
        self.check(result)?;

        let result = self.surfaces.remove(&mut self.backend, index);
        let id = self.check(result)?;
        self.resources.remove_surface_targets(id);
        self.swapchain_targets.remove(index);
        Ok(())
    }

    /// Number of registered swapchains.
    pub fn swapchain_count(&self) -> usize {
        self.swapchain_targets.len()
    }

    /// Render target of the swapchain at `index`.
    pub fn swapchain_target(&self, index: usize) -> Option<RenderTarget> {
        self.swapchain_targets.get(index).copied()
    }

    /// Current image size of the swapchain at `index`.
    pub fn swapchain_extent(&self, index: usize) -> Option<Extent2d> {
        self.surfaces
            .id_at(index)
            .and_then(|id| self.surfaces.extent(id))
    }

    // --- Resources -----------------------------------------------------------

    /// Create a buffer. Dynamic buffers get one instance per frame slot.
    pub fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
    ) -> Result<BufferHandle, GraphicsError> {
        self.ensure_running()?;
        let result = self.resources.create_buffer(&mut self.backend, descriptor);
        self.check(result)
    }

    /// Write `data` into `buffer` at `offset`.
    ///
    /// For a dynamic buffer this writes the instance of the frame slot the
    /// next [`render`](Self::render) records, after that slot's previous
    /// work has completed. A static buffer is shared by every slot, so the
    /// write waits for the device to finish all frames in flight.
    pub fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.ensure_running()?;
        let kind = self
            .resources
            .buffer_descriptor(buffer)
            .map(|d| d.kind)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("buffer {buffer:?}")))?;

        let slot = self.frames.current_slot();
        let drained = match kind {
            BufferKind::Dynamic => self.frames.wait_slot(&mut self.backend, slot),
            BufferKind::Static => self.frames.wait_idle(&mut self.backend),
        };
        self.check(drained)?;

        let result = self
            .resources
            .write_buffer(&mut self.backend, buffer, slot, offset, data);
        self.check(result)
    }

    pub fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, GraphicsError> {
        self.ensure_running()?;
        let result = self.resources.create_texture(&mut self.backend, descriptor);
        self.check(result)
    }

    /// Create an offscreen render target.
    pub fn create_render_target(
        &mut self,
        descriptor: &RenderTargetDescriptor,
    ) -> Result<RenderTarget, GraphicsError> {
        self.ensure_running()?;
        let result = self
            .resources
            .create_render_target(&mut self.backend, descriptor);
        self.check(result)
    }

    /// Destroy a buffer once the device no longer uses it.
    ///
    /// The cached compiled frame is dropped with it: its binding tables may
    /// reference the buffer.
    pub fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), GraphicsError> {
        self.ensure_running()?;
        let result = self
            .drain_and_release()
            .and_then(|()| self.resources.destroy_buffer(&mut self.backend, buffer));
        self.check(result)
    }

    /// Destroy a texture once the device no longer uses it.
    pub fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), GraphicsError> {
        self.ensure_running()?;
        let result = self
            .drain_and_release()
            .and_then(|()| self.resources.destroy_texture(&mut self.backend, texture));
        self.check(result)
    }

    /// Destroy an offscreen render target and its textures.
    pub fn destroy_render_target(&mut self, target: RenderTarget) -> Result<(), GraphicsError> {
        self.ensure_running()?;
        let result = self.drain_and_release().and_then(|()| {
            self.resources
                .destroy_render_target(&mut self.backend, target.handle())
        });
        self.check(result)
    }

    /// Resource registry, for handle queries.
    pub fn resources(&self) -> &ResourceRegistry<B> {
        &self.resources
    }

    // --- State ---------------------------------------------------------------

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Whether a fatal error stopped the renderer.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Wait for the device, then destroy every object the renderer owns.
    ///
    /// Runs on drop; calling it earlier leaves a halted renderer whose
    /// backend can still be inspected.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.halted = true;

        if let Err(e) = self.frames.wait_idle(&mut self.backend) {
            log::error!("Failed to wait for in-flight frames on shutdown: {e}");
        }
        if let Err(e) = self.backend.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {e}");
        }
        if let Err(e) = self.compiler.release(&mut self.backend) {
            log::error!("Failed to release the compiled frame on shutdown: {e}");
        }
        self.executor.destroy(&mut self.backend);
        self.surfaces.destroy_all(&mut self.backend);
        self.swapchain_targets.clear();
        self.frames.destroy(&mut self.backend);
        self.planner.destroy(&mut self.backend);
        self.resources.destroy_all(&mut self.backend);
        log::info!("Renderer shut down after {} frames", self.frame_count);
    }

    fn ensure_running(&self) -> Result<(), GraphicsError> {
        if self.halted {
            Err(GraphicsError::Halted)
        } else {
            Ok(())
        }
    }

    /// Halt on fatal errors; pass everything through.
    fn check<T>(&mut self, result: Result<T, GraphicsError>) -> Result<T, GraphicsError> {
        if let Err(error) = &result
            && error.is_fatal()
            && !self.halted
        {
            log::error!("Fatal graphics error, renderer halted: {error}");
            self.halted = true;
        }
        result
    }

    /// Wait for all frames, then drop the compiled frame.
    fn drain_and_release(&mut self) -> Result<(), GraphicsError> {
        self.frames.wait_idle(&mut self.backend)?;
        self.compiler.release(&mut self.backend)
    }
}

impl<B: Backend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
