//! Device-side ordering of the batches of one frame.
//!
//! The [`SubmissionPlanner`] decides, for every batch of a compiled frame,
//! which semaphores its submission waits on, which it signals and which
//! fence it carries. The host side (frame slots, fences) lives in
//! [`FramePipeline`](crate::pipeline::FramePipeline).
//!
//! # Protocol
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Frame | [`FramePipeline`](crate::pipeline::FramePipeline) | Host throttling |
//! | **Batch** | [`SubmissionPlanner`] | Semaphore chain between batches (this module) |
//! | Queue | [`SyncPair`] | Ping-pong semaphores per queue |
//!
//! ```text
//!            acquire(surface)
//!                  │ (color-output stage)
//!                  ▼
//! batch 0 ──sig C0──► batch 1 ──sig G0──► batch 2 ──sig C1──► present
//! (compute)          (graphics)          (compute)
//!  fence?             fence G             fence C
//! ```
//!
//! - Batch *i* signals the current semaphore of its queue's [`SyncPair`]
//!   and flips the parity. The terminal batch signals only when the frame
//!   presents; the present call waits on that signal.
//! - Batch *i + 1* waits on everything batch *i* signaled. The chain is
//!   linear, so the terminal signal also implies every earlier batch is done.
//! - Each active surface's "image acquired" semaphore is waited on by the
//!   first batch that writes the surface, at the color-output stage.
//! - The fence of a queue goes to the last batch submitted to that queue;
//!   queues execute their submissions in order.

mod sync;

pub use sync::SyncPair;

use crate::backend::{Backend, SemaphoreWait, WaitStage};
use crate::compiler::Batch;
use crate::error::GraphicsError;
use crate::types::{PerQueue, QueueAffinity};

/// Wait/signal/fence assignment of one batch submission.
#[derive(Debug)]
pub struct BatchSync<B: Backend> {
    pub waits: Vec<SemaphoreWait<B::Semaphore>>,
    pub signals: Vec<B::Semaphore>,
    pub fence: Option<B::Fence>,
}

/// Synchronization plan of a whole frame.
#[derive(Debug)]
pub struct FramePlan<B: Backend> {
    /// Indexed like the compiled frame's batches.
    pub batches: Vec<BatchSync<B>>,
    /// Semaphores the present call waits on; empty when nothing presents.
    pub present_waits: Vec<B::Semaphore>,
}

/// "Image acquired" semaphore and the batch that must wait for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireWait<S> {
    pub batch: usize,
    pub semaphore: S,
}

/// Owner of the per-queue [`SyncPair`]s.
pub struct SubmissionPlanner<B: Backend> {
    pairs: Option<PerQueue<SyncPair<B::Semaphore>>>,
}

impl<B: Backend> SubmissionPlanner<B> {
    pub fn new(backend: &mut B) -> Result<Self, GraphicsError> {
        let graphics = SyncPair::create(backend)?;
        let compute = match SyncPair::create(backend) {
            Ok(pair) => pair,
            Err(e) => {
                graphics.destroy(backend);
                return Err(e);
            }
        };
        Ok(Self {
            pairs: Some(PerQueue([graphics, compute])),
        })
    }

    /// Current state of the pair of `queue`.
    pub fn pair(&self, queue: QueueAffinity) -> Option<&SyncPair<B::Semaphore>> {
        self.pairs.as_ref().map(|pairs| pairs.get(queue))
    }

    /// Plan the submissions of one frame.
    ///
    /// Advances the parity of every queue that signals.
    pub fn plan(
        &mut self,
        batches: &[Batch],
        acquired: &[AcquireWait<B::Semaphore>],
        fences: &PerQueue<B::Fence>,
        presents: bool,
    ) -> Result<FramePlan<B>, GraphicsError> {
        let pairs = self
            .pairs
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("submission planner destroyed".into()))?;

        let last_on_queue = PerQueue::from_fn(|queue| {
            batches.iter().rposition(|batch| batch.queue() == queue)
        });

        let mut planned = Vec::with_capacity(batches.len());
        let mut previous: Vec<B::Semaphore> = Vec::new();

        for (index, batch) in batches.iter().enumerate() {
            let mut waits: Vec<_> = previous
                .drain(..)
                .map(|semaphore| SemaphoreWait {
                    semaphore,
                    stage: WaitStage::AllCommands,
                })
                .collect();
            waits.extend(
                acquired
                    .iter()
                    .filter(|a| a.batch == index)
                    .map(|a| SemaphoreWait {
                        semaphore: a.semaphore,
                        stage: WaitStage::ColorAttachmentOutput,
                    }),
            );

            let terminal = index + 1 == batches.len();
            let signals = if !terminal || presents {
                batch
                    .queues()
                    .queues()
                    .map(|queue| pairs.get_mut(queue).signal())
                    .collect()
            } else {
                Vec::new()
            };

            let fence = (*last_on_queue.get(batch.queue()) == Some(index))
                .then(|| *fences.get(batch.queue()));

            previous.clone_from(&signals);
            planned.push(BatchSync {
                waits,
                signals,
                fence,
            });
        }

        Ok(FramePlan {
            batches: planned,
            present_waits: if presents { previous } else { Vec::new() },
        })
    }

    /// Destroy the semaphores. The device must be idle.
    pub fn destroy(&mut self, backend: &mut B) {
        if let Some(pairs) = self.pairs.take() {
            let PerQueue([graphics, compute]) = pairs;
            graphics.destroy(backend);
            compute.destroy(backend);
        }
    }
}
