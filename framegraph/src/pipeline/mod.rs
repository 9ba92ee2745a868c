//! Frame pipeline for managing multiple frames in flight.
//!
//! [`FramePipeline`] is the host side of frame synchronization: it owns the
//! frame slots and their completion fences, and it is the only place where
//! the host blocks on the device during steady-state rendering.
//!
//! # Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          FramePipeline                                  │
//! │  N frame slots, one fence per queue per slot. begin_frame blocks until  │
//! │  the slot's previous work is done, end_frame records what was used.     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                        SubmissionPlanner                                │
//! │  Device-side ordering inside a frame: SyncPair semaphores between       │
//! │  batches, acquire waits, the present signal.                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                         ExecutionEngine                                 │
//! │  Records every batch into a per-slot command buffer and submits it.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Synchronization Model
//!
//! | Level | Primitive | Purpose |
//! |-------|-----------|---------|
//! | Pass → Pass | Barriers | Memory dependency inside one command buffer |
//! | Batch → Batch | Semaphores | Device-side ordering across queues |
//! | Frame → Frame | Fences | Host throttling, frame-slot resource reuse |
//!
//! # Frame Overlap
//!
//! With 2 frames in flight:
//!
//! ```text
//! Frame 0: [host record] [submit] ─────────────────────────────────────────►
//!                                  [device frame 0] ───────────────────────►
//! Frame 1:               [host record] [submit] ───────────────────────────►
//!                                               [device frame 1] ──────────►
//! Frame 2:                             [wait slot 0] [host record] [submit]►
//! ```
//!
//! `begin_frame` for frame `f` returns only after every fence frame `f - N`
//! submitted is signaled, so at most `N` frames of work are ever
//! outstanding. The wait is unbounded: a frame never "times out", only a
//! device error ends it.
//!
//! # Choosing Frames in Flight
//!
//! | Count | Behavior |
//! |-------|----------|
//! | 1 | Host waits for the device every frame. |
//! | 2 | Host records N+1 while the device renders N. |
//! | 3 | More overlap, one more frame of input latency. |
//!
//! Every dynamic buffer and every binding table exists once per slot, so
//! the count also multiplies their memory.

use crate::backend::Backend;
use crate::error::GraphicsError;
use crate::types::{PerQueue, QueueMask};

/// Manages multiple frames in flight for host/device parallelism.
///
/// ```text
/// frames_in_flight = 2
///
/// Slot 0: [Frame 0] ──► [Frame 2] ──► [Frame 4] ──►
/// Slot 1: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
/// ```
///
/// Not thread-safe; owned by the renderer.
pub struct FramePipeline<B: Backend> {
    /// One fence per queue for every slot.
    fences: Vec<PerQueue<B::Fence>>,
    /// Queues whose fence was submitted in each slot and not yet waited on.
    pending: Vec<QueueMask>,
    current_slot: usize,
    frames_in_flight: usize,
    /// Frames begun so far.
    frame_count: u64,
}

impl<B: Backend> FramePipeline<B> {
    /// Create a frame pipeline with `frames_in_flight` slots.
    pub fn new(backend: &mut B, frames_in_flight: usize) -> Result<Self, GraphicsError> {
        if frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(
                "frames_in_flight must be at least 1".into(),
            ));
        }

        let mut fences: Vec<PerQueue<B::Fence>> = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            let graphics = backend.create_fence(false);
            let compute = backend.create_fence(false);
            match (graphics, compute) {
                (Ok(graphics), Ok(compute)) => fences.push(PerQueue([graphics, compute])),
                (graphics, compute) => {
                    for fence in [graphics, compute].into_iter().flatten() {
                        backend.destroy_fence(fence);
                    }
                    for slot in fences {
                        for (_, fence) in slot.iter() {
                            backend.destroy_fence(*fence);
                        }
                    }
                    return Err(GraphicsError::ResourceCreationFailed(
                        "failed to create frame fences".into(),
                    ));
                }
            }
        }

        Ok(Self {
            fences,
            pending: vec![QueueMask::empty(); frames_in_flight],
            current_slot: 0,
            frames_in_flight,
            frame_count: 0,
        })
    }

    /// Begin a new frame and return its slot.
    ///
    /// Blocks until the work submitted the last time this slot was used is
    /// complete, then resets those fences for reuse.
    pub fn begin_frame(&mut self, backend: &mut B) -> Result<usize, GraphicsError> {
        let slot = self.current_slot;
        self.wait_slot(backend, slot)?;

        self.frame_count += 1;
        log::trace!("Begin frame {} (slot {slot})", self.frame_count);
        Ok(slot)
    }

    /// Block until the work last submitted in `slot` is complete.
    ///
    /// Afterwards the slot's per-frame resources may be written by the host.
    pub fn wait_slot(&mut self, backend: &mut B, slot: usize) -> Result<(), GraphicsError> {
        let pending = self.pending[slot];
        if pending.is_empty() {
            return Ok(());
        }

        let fences: Vec<B::Fence> = pending
            .queues()
            .map(|queue| *self.fences[slot].get(queue))
            .collect();
        backend.wait_for_fences(&fences)?;
        backend.reset_fences(&fences)?;
        self.pending[slot] = QueueMask::empty();
        Ok(())
    }

    /// End the frame recorded in `slot`.
    ///
    /// `used` names the queues whose fence was attached to a submission;
    /// only those are waited on when the slot comes around again.
    pub fn end_frame(&mut self, slot: usize, used: QueueMask) {
        log::trace!("End frame {} (slot {slot}, queues {used:?})", self.frame_count);
        self.pending[slot] = used;
        self.current_slot = (slot + 1) % self.frames_in_flight;
    }

    /// Fences of `slot`, one per queue.
    pub fn fences(&self, slot: usize) -> PerQueue<B::Fence> {
        self.fences[slot]
    }

    /// Wait for all in-flight work to complete.
    pub fn wait_idle(&mut self, backend: &mut B) -> Result<(), GraphicsError> {
        log::trace!("Waiting for GPU idle ({} slots)", self.frames_in_flight);
        for slot in 0..self.frames_in_flight {
            self.wait_slot(backend, slot)?;
        }
        Ok(())
    }

    /// Destroy the fences. The device must be idle.
    pub fn destroy(&mut self, backend: &mut B) {
        for slot in self.fences.drain(..) {
            for (_, fence) in slot.iter() {
                backend.destroy_fence(*fence);
            }
        }
        self.pending.clear();
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot the next [`begin_frame`](Self::begin_frame) will return.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Total number of frames begun.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Number of slots with work the host has not waited on.
    pub fn frames_outstanding(&self) -> usize {
        self.pending.iter().filter(|mask| !mask.is_empty()).count()
    }
}
