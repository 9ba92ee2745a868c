//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out integer
//! handles, keeps just enough state to enforce the rules a real driver
//! enforces (binary semaphores are signaled at most once before being waited
//! on, fences are unsignaled when submitted, waited fences were actually
//! submitted) and records every call as a [`DummyEvent`] for inspection.
//!
//! Two completion models are available:
//! - [`CompletionMode::Immediate`]: submitted work completes at once.
//! - [`CompletionMode::Lazy`]: fences only signal when waited on, in
//!   submission order. This models a device running as far behind the host
//!   as it is allowed to, and [`DummyBackend::max_pending_fences`] reports
//!   how much unfinished work the host ever had outstanding.
//!
//! Surfaces can be scripted to report out-of-date or suboptimal results,
//! and submissions or pipeline creation can be made to fail.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::compiler::{AttachmentFormats, BindingLayout};
use crate::error::GraphicsError;
use crate::graph::{LoadOp, PipelineDescription, PipelineKind};
use crate::swapchain::{PresentMode, Window};
use crate::types::{
    BufferDescriptor, Extent2d, IndexFormat, QueueAffinity, ShaderStages, TextureDescriptor,
    TextureFormat,
};

use super::{
    AcquireOutcome, AttachmentImage, Backend, BoundResource, PresentOutcome, PresentRequest,
    RenderingInfo, SemaphoreWait, Submission, SurfaceInfo,
};

/// Number of images in every dummy surface.
pub const DUMMY_SURFACE_IMAGES: u32 = 3;

macro_rules! dummy_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

dummy_handle! {
    /// Dummy fence.
    DummyFence;
    /// Dummy binary semaphore.
    DummySemaphore;
    /// Dummy pipeline.
    DummyPipeline;
    /// Dummy binding table.
    DummyBindingTable;
    /// Dummy command buffer.
    DummyCommandBuffer;
    /// Dummy presentation surface.
    DummySurface;
}

/// Dummy buffer; contents live on the host.
#[derive(Debug)]
pub struct DummyBuffer {
    pub id: u32,
    data: Mutex<Vec<u8>>,
}

impl DummyBuffer {
    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

/// Dummy texture.
#[derive(Debug)]
pub struct DummyTexture {
    pub id: u32,
    pub format: TextureFormat,
    pub extent: Extent2d,
}

/// When submitted work completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Work completes as soon as it is submitted.
    #[default]
    Immediate,
    /// Work completes when the host waits for it, in submission order.
    Lazy,
}

/// Image written by a rendering scope, as recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyImage {
    Texture(u32),
    Surface(DummySurface, u32),
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum DummyEvent {
    CreatePipeline {
        pipeline: DummyPipeline,
        kind: PipelineKind,
        bindings: usize,
        color_formats: Vec<TextureFormat>,
    },
    DestroyPipeline(DummyPipeline),
    CreateBindingTable(DummyBindingTable),
    DestroyBindingTable(DummyBindingTable),
    BeginCommands(DummyCommandBuffer),
    EndCommands(DummyCommandBuffer),
    PassBarrier(DummyCommandBuffer),
    BeginRendering {
        command_buffer: DummyCommandBuffer,
        extent: Extent2d,
        colors: Vec<(DummyImage, LoadOp)>,
        depth: Option<(DummyImage, LoadOp)>,
    },
    EndRendering(DummyCommandBuffer),
    BindPipeline {
        command_buffer: DummyCommandBuffer,
        pipeline: DummyPipeline,
    },
    BindBindingTable {
        command_buffer: DummyCommandBuffer,
        table: DummyBindingTable,
    },
    BindVertexBuffers {
        command_buffer: DummyCommandBuffer,
        buffers: Vec<u32>,
    },
    BindIndexBuffer {
        command_buffer: DummyCommandBuffer,
        buffer: u32,
        format: IndexFormat,
    },
    PushConstants {
        command_buffer: DummyCommandBuffer,
        stages: ShaderStages,
        size: usize,
    },
    Draw {
        command_buffer: DummyCommandBuffer,
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        command_buffer: DummyCommandBuffer,
        index_count: u32,
        instance_count: u32,
    },
    Dispatch {
        command_buffer: DummyCommandBuffer,
        groups: [u32; 3],
    },
    Submit {
        queue: QueueAffinity,
        command_buffers: Vec<DummyCommandBuffer>,
        waits: Vec<SemaphoreWait<DummySemaphore>>,
        signals: Vec<DummySemaphore>,
        fence: Option<DummyFence>,
    },
    WaitFences(Vec<DummyFence>),
    ResetFences(Vec<DummyFence>),
    WaitIdle,
    CreateSurface(DummySurface),
    RecreateSurface {
        surface: DummySurface,
        extent: Extent2d,
    },
    DestroySurface(DummySurface),
    Acquire {
        surface: DummySurface,
        semaphore: DummySemaphore,
        outcome: AcquireOutcome,
    },
    Present {
        images: Vec<(DummySurface, u32)>,
        waits: Vec<DummySemaphore>,
    },
}

#[derive(Debug)]
struct SurfaceState {
    extent: Extent2d,
    next_image: u32,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    #[default]
    Unsignaled,
    Pending,
    Signaled,
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    mode: CompletionMode,
    next_id: u32,
    events: Vec<DummyEvent>,

    buffers: HashSet<u32>,
    textures: HashSet<u32>,
    fences: HashMap<DummyFence, FenceState>,
    /// Fences submitted but not yet signaled, oldest first.
    pending: VecDeque<DummyFence>,
    max_pending: usize,
    semaphores: HashMap<DummySemaphore, bool>,
    pipelines: HashSet<DummyPipeline>,
    binding_tables: HashMap<DummyBindingTable, Vec<u32>>,
    command_buffers: HashMap<DummyCommandBuffer, QueueAffinity>,
    surfaces: HashMap<DummySurface, SurfaceState>,

    fail_next_submit: bool,
    pipelines_before_failure: Option<usize>,
}

impl DummyBackend {
    /// Create a new dummy backend that completes work immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dummy backend with the given completion model.
    pub fn with_completion(mode: CompletionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    // --- Inspection ----------------------------------------------------------

    /// Every recorded call, oldest first.
    pub fn events(&self) -> &[DummyEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn count(&self, pred: impl Fn(&DummyEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Recorded submissions, oldest first.
    pub fn submissions(&self) -> Vec<&DummyEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, DummyEvent::Submit { .. }))
            .collect()
    }

    pub fn submit_count(&self) -> usize {
        self.count(|e| matches!(e, DummyEvent::Submit { .. }))
    }

    pub fn acquire_count(&self) -> usize {
        self.count(|e| matches!(e, DummyEvent::Acquire { .. }))
    }

    pub fn present_count(&self) -> usize {
        self.count(|e| matches!(e, DummyEvent::Present { .. }))
    }

    pub fn recreate_count(&self) -> usize {
        self.count(|e| matches!(e, DummyEvent::RecreateSurface { .. }))
    }

    pub fn draw_count(&self) -> usize {
        self.count(|e| matches!(e, DummyEvent::Draw { .. } | DummyEvent::DrawIndexed { .. }))
    }

    pub fn dispatch_count(&self) -> usize {
        self.count(|e| matches!(e, DummyEvent::Dispatch { .. }))
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn live_binding_tables(&self) -> usize {
        self.binding_tables.len()
    }

    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }

    pub fn live_semaphores(&self) -> usize {
        self.semaphores.len()
    }

    pub fn live_command_buffers(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    /// Buffer ids bound into `table`, by binding index.
    pub fn binding_table_buffers(&self, table: DummyBindingTable) -> Vec<u32> {
        self.binding_tables.get(&table).cloned().unwrap_or_default()
    }

    /// Fences submitted and not yet signaled.
    pub fn pending_fences(&self) -> usize {
        self.pending.len()
    }

    /// Highest number of simultaneously pending fences observed.
    pub fn max_pending_fences(&self) -> usize {
        self.max_pending
    }

    // --- Scripting -----------------------------------------------------------

    /// Queue acquire results for `surface`, consumed one per acquire.
    pub fn script_acquire(
        &mut self,
        surface: DummySurface,
        outcomes: impl IntoIterator<Item = AcquireOutcome>,
    ) {
        if let Some(state) = self.surfaces.get_mut(&surface) {
            state.acquire_script.extend(outcomes);
        }
    }

    /// Queue present results for `surface`, consumed one per present.
    pub fn script_present(
        &mut self,
        surface: DummySurface,
        outcomes: impl IntoIterator<Item = PresentOutcome>,
    ) {
        if let Some(state) = self.surfaces.get_mut(&surface) {
            state.present_script.extend(outcomes);
        }
    }

    /// Make the next submission fail.
    pub fn fail_next_submit(&mut self) {
        self.fail_next_submit = true;
    }

    /// Let `count` more pipelines be created, then fail.
    pub fn fail_pipeline_creation_after(&mut self, count: usize) {
        self.pipelines_before_failure = Some(count);
    }

    /// Any surface, for tests that only register one.
    pub fn first_surface(&self) -> Option<DummySurface> {
        self.surfaces.keys().min().copied()
    }

    // --- Internal checks -----------------------------------------------------

    fn signal_semaphore(&mut self, semaphore: DummySemaphore) -> Result<(), GraphicsError> {
        match self.semaphores.get_mut(&semaphore) {
            Some(signaled) if !*signaled => {
                *signaled = true;
                Ok(())
            }
            Some(_) => Err(GraphicsError::Internal(format!(
                "{semaphore:?} signaled twice without a wait"
            ))),
            None => Err(GraphicsError::InvalidHandle(format!("{semaphore:?}"))),
        }
    }

    fn consume_semaphore(&mut self, semaphore: DummySemaphore) -> Result<(), GraphicsError> {
        match self.semaphores.get_mut(&semaphore) {
            Some(signaled) if *signaled => {
                *signaled = false;
                Ok(())
            }
            Some(_) => Err(GraphicsError::Internal(format!(
                "wait on {semaphore:?} which has no pending signal"
            ))),
            None => Err(GraphicsError::InvalidHandle(format!("{semaphore:?}"))),
        }
    }

    fn signal_oldest_until(&mut self, fence: DummyFence) {
        while let Some(oldest) = self.pending.pop_front() {
            self.fences.insert(oldest, FenceState::Signaled);
            if oldest == fence {
                break;
            }
        }
    }

    fn image_of(image: &AttachmentImage<'_, Self>) -> DummyImage {
        match image {
            AttachmentImage::Texture(texture) => DummyImage::Texture(texture.id),
            AttachmentImage::Surface {
                surface,
                image_index,
            } => DummyImage::Surface(*surface, *image_index),
        }
    }
}

impl Backend for DummyBackend {
    type Buffer = DummyBuffer;
    type Texture = DummyTexture;
    type Fence = DummyFence;
    type Semaphore = DummySemaphore;
    type Pipeline = DummyPipeline;
    type BindingTable = DummyBindingTable;
    type CommandBuffer = DummyCommandBuffer;
    type Surface = DummySurface;

    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
    ) -> Result<DummyBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let id = self.next_id();
        self.buffers.insert(id);
        Ok(DummyBuffer {
            id,
            data: Mutex::new(vec![0; descriptor.size as usize]),
        })
    }

    fn write_buffer(
        &mut self,
        buffer: &DummyBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let mut contents = buffer
            .data
            .lock()
            .map_err(|_| GraphicsError::Internal("buffer contents poisoned".into()))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "write [{start}, {end}) past buffer end {}",
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: DummyBuffer) {
        self.buffers.remove(&buffer.id);
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<DummyTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{})",
            descriptor.label,
            descriptor.extent.width,
            descriptor.extent.height
        );
        let id = self.next_id();
        self.textures.insert(id);
        Ok(DummyTexture {
            id,
            format: descriptor.format,
            extent: descriptor.extent,
        })
    }

    fn destroy_texture(&mut self, texture: DummyTexture) {
        self.textures.remove(&texture.id);
    }

    fn create_fence(&mut self, signaled: bool) -> Result<DummyFence, GraphicsError> {
        let fence = DummyFence(self.next_id());
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.fences.insert(fence, state);
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: DummyFence) {
        self.fences.remove(&fence);
        self.pending.retain(|f| *f != fence);
    }

    fn wait_for_fences(&mut self, fences: &[DummyFence]) -> Result<(), GraphicsError> {
        self.events.push(DummyEvent::WaitFences(fences.to_vec()));
        for &fence in fences {
            match self.fences.get(&fence).copied() {
                Some(FenceState::Signaled) => {}
                Some(FenceState::Pending) => self.signal_oldest_until(fence),
                Some(FenceState::Unsignaled) => {
                    return Err(GraphicsError::Internal(format!(
                        "waiting on {fence:?} which was never submitted"
                    )));
                }
                None => return Err(GraphicsError::InvalidHandle(format!("{fence:?}"))),
            }
        }
        Ok(())
    }

    fn reset_fences(&mut self, fences: &[DummyFence]) -> Result<(), GraphicsError> {
        self.events.push(DummyEvent::ResetFences(fences.to_vec()));
        for fence in fences {
            match self.fences.get_mut(fence) {
                Some(FenceState::Pending) => {
                    return Err(GraphicsError::Internal(format!(
                        "resetting {fence:?} while the device still uses it"
                    )));
                }
                Some(state) => *state = FenceState::Unsignaled,
                None => return Err(GraphicsError::InvalidHandle(format!("{fence:?}"))),
            }
        }
        Ok(())
    }

    fn is_fence_signaled(&self, fence: DummyFence) -> Result<bool, GraphicsError> {
        self.fences
            .get(&fence)
            .map(|state| *state == FenceState::Signaled)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{fence:?}")))
    }

    fn create_semaphore(&mut self) -> Result<DummySemaphore, GraphicsError> {
        let semaphore = DummySemaphore(self.next_id());
        self.semaphores.insert(semaphore, false);
        Ok(semaphore)
    }

    fn destroy_semaphore(&mut self, semaphore: DummySemaphore) {
        self.semaphores.remove(&semaphore);
    }

    fn wait_idle(&mut self) -> Result<(), GraphicsError> {
        self.events.push(DummyEvent::WaitIdle);
        while let Some(fence) = self.pending.pop_front() {
            self.fences.insert(fence, FenceState::Signaled);
        }
        Ok(())
    }

    fn create_pipeline(
        &mut self,
        description: &PipelineDescription,
        layout: &BindingLayout,
        formats: &AttachmentFormats,
    ) -> Result<DummyPipeline, GraphicsError> {
        if let Some(remaining) = self.pipelines_before_failure.as_mut() {
            if *remaining == 0 {
                self.pipelines_before_failure = None;
                return Err(GraphicsError::ResourceCreationFailed(
                    "injected pipeline creation failure".into(),
                ));
            }
            *remaining -= 1;
        }

        let pipeline = DummyPipeline(self.next_id());
        self.pipelines.insert(pipeline);
        self.events.push(DummyEvent::CreatePipeline {
            pipeline,
            kind: description.kind(),
            bindings: layout.len(),
            color_formats: formats.colors.clone(),
        });
        Ok(pipeline)
    }

    fn destroy_pipeline(&mut self, pipeline: DummyPipeline) {
        self.pipelines.remove(&pipeline);
        self.events.push(DummyEvent::DestroyPipeline(pipeline));
    }

    fn create_binding_table(
        &mut self,
        pipeline: DummyPipeline,
        layout: &BindingLayout,
        resources: &[BoundResource<'_, Self>],
    ) -> Result<DummyBindingTable, GraphicsError> {
        if !self.pipelines.contains(&pipeline) {
            return Err(GraphicsError::InvalidHandle(format!("{pipeline:?}")));
        }
        if resources.len() != layout.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} resources for a layout of {} bindings",
                resources.len(),
                layout.len()
            )));
        }

        let table = DummyBindingTable(self.next_id());
        let buffers = resources
            .iter()
            .filter_map(|r| match r {
                BoundResource::Buffer(buffer) => Some(buffer.id),
                BoundResource::Texture(_) => None,
            })
            .collect();
        self.binding_tables.insert(table, buffers);
        self.events.push(DummyEvent::CreateBindingTable(table));
        Ok(table)
    }

    fn destroy_binding_table(&mut self, table: DummyBindingTable) {
        self.binding_tables.remove(&table);
        self.events.push(DummyEvent::DestroyBindingTable(table));
    }

    fn create_command_buffer(
        &mut self,
        queue: QueueAffinity,
    ) -> Result<DummyCommandBuffer, GraphicsError> {
        let command_buffer = DummyCommandBuffer(self.next_id());
        self.command_buffers.insert(command_buffer, queue);
        Ok(command_buffer)
    }

    fn destroy_command_buffer(&mut self, command_buffer: DummyCommandBuffer) {
        self.command_buffers.remove(&command_buffer);
    }

    fn begin_commands(&mut self, command_buffer: DummyCommandBuffer) -> Result<(), GraphicsError> {
        if !self.command_buffers.contains_key(&command_buffer) {
            return Err(GraphicsError::InvalidHandle(format!("{command_buffer:?}")));
        }
        self.events.push(DummyEvent::BeginCommands(command_buffer));
        Ok(())
    }

    fn end_commands(&mut self, command_buffer: DummyCommandBuffer) -> Result<(), GraphicsError> {
        self.events.push(DummyEvent::EndCommands(command_buffer));
        Ok(())
    }

    fn pass_barrier(&mut self, command_buffer: DummyCommandBuffer) {
        self.events.push(DummyEvent::PassBarrier(command_buffer));
    }

    fn begin_rendering(
        &mut self,
        command_buffer: DummyCommandBuffer,
        info: &RenderingInfo<'_, Self>,
    ) {
        self.events.push(DummyEvent::BeginRendering {
            command_buffer,
            extent: info.extent,
            colors: info
                .colors
                .iter()
                .map(|a| (Self::image_of(&a.image), a.load))
                .collect(),
            depth: info
                .depth
                .as_ref()
                .map(|a| (Self::image_of(&a.image), a.load)),
        });
    }

    fn end_rendering(
        &mut self,
        command_buffer: DummyCommandBuffer,
        _info: &RenderingInfo<'_, Self>,
    ) {
        self.events.push(DummyEvent::EndRendering(command_buffer));
    }

    fn bind_pipeline(&mut self, command_buffer: DummyCommandBuffer, pipeline: DummyPipeline) {
        self.events.push(DummyEvent::BindPipeline {
            command_buffer,
            pipeline,
        });
    }

    fn bind_binding_table(
        &mut self,
        command_buffer: DummyCommandBuffer,
        _pipeline: DummyPipeline,
        table: DummyBindingTable,
    ) {
        self.events.push(DummyEvent::BindBindingTable {
            command_buffer,
            table,
        });
    }

    fn bind_vertex_buffers(
        &mut self,
        command_buffer: DummyCommandBuffer,
        buffers: &[&DummyBuffer],
    ) {
        self.events.push(DummyEvent::BindVertexBuffers {
            command_buffer,
            buffers: buffers.iter().map(|b| b.id).collect(),
        });
    }

    fn bind_index_buffer(
        &mut self,
        command_buffer: DummyCommandBuffer,
        buffer: &DummyBuffer,
        format: IndexFormat,
    ) {
        self.events.push(DummyEvent::BindIndexBuffer {
            command_buffer,
            buffer: buffer.id,
            format,
        });
    }

    fn push_constants(
        &mut self,
        command_buffer: DummyCommandBuffer,
        _pipeline: DummyPipeline,
        stages: ShaderStages,
        data: &[u8],
    ) {
        self.events.push(DummyEvent::PushConstants {
            command_buffer,
            stages,
            size: data.len(),
        });
    }

    fn draw(
        &mut self,
        command_buffer: DummyCommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.events.push(DummyEvent::Draw {
            command_buffer,
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(
        &mut self,
        command_buffer: DummyCommandBuffer,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.events.push(DummyEvent::DrawIndexed {
            command_buffer,
            index_count,
            instance_count,
        });
    }

    fn dispatch(&mut self, command_buffer: DummyCommandBuffer, x: u32, y: u32, z: u32) {
        self.events.push(DummyEvent::Dispatch {
            command_buffer,
            groups: [x, y, z],
        });
    }

    fn submit(&mut self, submission: &Submission<'_, Self>) -> Result<(), GraphicsError> {
        if std::mem::take(&mut self.fail_next_submit) {
            return Err(GraphicsError::SubmissionFailed(format!(
                "injected failure on the {} queue",
                submission.queue.name()
            )));
        }

        for command_buffer in submission.command_buffers {
            match self.command_buffers.get(command_buffer) {
                Some(queue) if *queue == submission.queue => {}
                Some(queue) => {
                    return Err(GraphicsError::Internal(format!(
                        "{command_buffer:?} belongs to the {} queue",
                        queue.name()
                    )));
                }
                None => return Err(GraphicsError::InvalidHandle(format!("{command_buffer:?}"))),
            }
        }
        for wait in submission.waits {
            self.consume_semaphore(wait.semaphore)?;
        }
        for &signal in submission.signals {
            self.signal_semaphore(signal)?;
        }

        if let Some(fence) = submission.fence {
            match self.fences.get(&fence).copied() {
                Some(FenceState::Unsignaled) => {}
                Some(state) => {
                    return Err(GraphicsError::Internal(format!(
                        "submitting with {fence:?} in state {state:?}"
                    )));
                }
                None => return Err(GraphicsError::InvalidHandle(format!("{fence:?}"))),
            }
            match self.mode {
                CompletionMode::Immediate => {
                    self.fences.insert(fence, FenceState::Signaled);
                }
                CompletionMode::Lazy => {
                    self.fences.insert(fence, FenceState::Pending);
                    self.pending.push_back(fence);
                    self.max_pending = self.max_pending.max(self.pending.len());
                }
            }
        }

        log::trace!(
            "DummyBackend: submit to {} queue ({} waits, {} signals)",
            submission.queue.name(),
            submission.waits.len(),
            submission.signals.len()
        );
        self.events.push(DummyEvent::Submit {
            queue: submission.queue,
            command_buffers: submission.command_buffers.to_vec(),
            waits: submission.waits.to_vec(),
            signals: submission.signals.to_vec(),
            fence: submission.fence,
        });
        Ok(())
    }

    fn create_surface(
        &mut self,
        window: &dyn Window,
        present_mode: PresentMode,
    ) -> Result<(DummySurface, SurfaceInfo), GraphicsError> {
        let surface = DummySurface(self.next_id());
        let extent = window.extent();
        self.surfaces.insert(
            surface,
            SurfaceState {
                extent,
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
            },
        );
        log::trace!("DummyBackend: creating surface {surface:?} ({present_mode:?})");
        self.events.push(DummyEvent::CreateSurface(surface));
        Ok((
            surface,
            SurfaceInfo {
                format: TextureFormat::Bgra8UnormSrgb,
                extent,
                image_count: DUMMY_SURFACE_IMAGES,
            },
        ))
    }

    fn recreate_surface(
        &mut self,
        surface: DummySurface,
        extent: Extent2d,
    ) -> Result<SurfaceInfo, GraphicsError> {
        let state = self
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{surface:?}")))?;
        state.extent = extent;
        state.next_image = 0;
        self.events.push(DummyEvent::RecreateSurface { surface, extent });
        Ok(SurfaceInfo {
            format: TextureFormat::Bgra8UnormSrgb,
            extent,
            image_count: DUMMY_SURFACE_IMAGES,
        })
    }

    fn destroy_surface(&mut self, surface: DummySurface) {
        self.surfaces.remove(&surface);
        self.events.push(DummyEvent::DestroySurface(surface));
    }

    fn acquire_next_image(
        &mut self,
        surface: DummySurface,
        signal: DummySemaphore,
    ) -> Result<AcquireOutcome, GraphicsError> {
        let state = self
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{surface:?}")))?;
        let outcome = state.acquire_script.pop_front().unwrap_or_else(|| {
            let index = state.next_image;
            state.next_image = (state.next_image + 1) % DUMMY_SURFACE_IMAGES;
            AcquireOutcome::Acquired(index)
        });

        if !matches!(outcome, AcquireOutcome::OutOfDate) {
            self.signal_semaphore(signal)?;
        }
        self.events.push(DummyEvent::Acquire {
            surface,
            semaphore: signal,
            outcome,
        });
        Ok(outcome)
    }

    fn present(
        &mut self,
        requests: &[PresentRequest<DummySurface>],
        waits: &[DummySemaphore],
    ) -> Result<Vec<PresentOutcome>, GraphicsError> {
        for &wait in waits {
            self.consume_semaphore(wait)?;
        }

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let state = self
                .surfaces
                .get_mut(&request.surface)
                .ok_or_else(|| GraphicsError::InvalidHandle(format!("{:?}", request.surface)))?;
            outcomes.push(
                state
                    .present_script
                    .pop_front()
                    .unwrap_or(PresentOutcome::Presented),
            );
        }

        self.events.push(DummyEvent::Present {
            images: requests.iter().map(|r| (r.surface, r.image_index)).collect(),
            waits: waits.to_vec(),
        });
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WaitStage;

    #[test]
    fn test_dummy_backend_name() {
        assert_eq!(DummyBackend::new().name(), "Dummy Backend");
    }

    #[test]
    fn test_immediate_mode_signals_on_submit() {
        let mut backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        let cb = backend.create_command_buffer(QueueAffinity::Graphics).unwrap();
        backend
            .submit(&Submission {
                queue: QueueAffinity::Graphics,
                command_buffers: &[cb],
                waits: &[],
                signals: &[],
                fence: Some(fence),
            })
            .unwrap();
        assert!(backend.is_fence_signaled(fence).unwrap());
    }

    #[test]
    fn test_lazy_mode_signals_in_submission_order() {
        let mut backend = DummyBackend::with_completion(CompletionMode::Lazy);
        let fences: Vec<_> = (0..3).map(|_| backend.create_fence(false).unwrap()).collect();
        let cb = backend.create_command_buffer(QueueAffinity::Graphics).unwrap();
        for &fence in &fences {
            backend
                .submit(&Submission {
                    queue: QueueAffinity::Graphics,
                    command_buffers: &[cb],
                    waits: &[],
                    signals: &[],
                    fence: Some(fence),
                })
                .unwrap();
        }
        assert_eq!(backend.max_pending_fences(), 3);

        backend.wait_for_fences(&[fences[1]]).unwrap();
        assert!(backend.is_fence_signaled(fences[0]).unwrap());
        assert!(backend.is_fence_signaled(fences[1]).unwrap());
        assert!(!backend.is_fence_signaled(fences[2]).unwrap());
        assert_eq!(backend.pending_fences(), 1);
    }

    #[test]
    fn test_waiting_on_unsubmitted_fence_fails() {
        let mut backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        assert!(backend.wait_for_fences(&[fence]).is_err());
    }

    #[test]
    fn test_semaphore_double_signal_fails() {
        let mut backend = DummyBackend::new();
        let semaphore = backend.create_semaphore().unwrap();
        let cb = backend.create_command_buffer(QueueAffinity::Compute).unwrap();
        let submit = |backend: &mut DummyBackend| {
            backend.submit(&Submission {
                queue: QueueAffinity::Compute,
                command_buffers: &[cb],
                waits: &[],
                signals: &[semaphore],
                fence: None,
            })
        };
        submit(&mut backend).unwrap();
        assert!(submit(&mut backend).is_err());
    }

    #[test]
    fn test_wait_without_signal_fails() {
        let mut backend = DummyBackend::new();
        let semaphore = backend.create_semaphore().unwrap();
        let cb = backend.create_command_buffer(QueueAffinity::Graphics).unwrap();
        let result = backend.submit(&Submission {
            queue: QueueAffinity::Graphics,
            command_buffers: &[cb],
            waits: &[SemaphoreWait {
                semaphore,
                stage: WaitStage::AllCommands,
            }],
            signals: &[],
            fence: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_submit_to_wrong_queue_fails() {
        let mut backend = DummyBackend::new();
        let cb = backend.create_command_buffer(QueueAffinity::Compute).unwrap();
        let result = backend.submit(&Submission {
            queue: QueueAffinity::Graphics,
            command_buffers: &[cb],
            waits: &[],
            signals: &[],
            fence: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_injected_submit_failure_is_one_shot() {
        let mut backend = DummyBackend::new();
        let cb = backend.create_command_buffer(QueueAffinity::Graphics).unwrap();
        backend.fail_next_submit();
        let submission = Submission {
            queue: QueueAffinity::Graphics,
            command_buffers: &[cb],
            waits: &[],
            signals: &[],
            fence: None,
        };
        assert!(matches!(
            backend.submit(&submission),
            Err(GraphicsError::SubmissionFailed(_))
        ));
        assert!(backend.submit(&submission).is_ok());
    }
}
