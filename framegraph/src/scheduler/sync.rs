//! Ping-pong semaphore pairs.

use crate::backend::Backend;
use crate::error::GraphicsError;

/// Two binary semaphores for one queue, selected by a parity bit.
///
/// Every signal uses the semaphore of the current parity and then flips it,
/// so consecutive signals on the same queue never reuse a semaphore whose
/// previous signal the device may not have consumed yet.
#[derive(Debug, Clone, Copy)]
pub struct SyncPair<S> {
    semaphores: [S; 2],
    parity: usize,
}

impl<S: Copy> SyncPair<S> {
    /// Create a pair from two semaphores, starting at parity 0.
    pub fn new(first: S, second: S) -> Self {
        Self {
            semaphores: [first, second],
            parity: 0,
        }
    }

    /// Create both semaphores on `backend`.
    pub fn create<B: Backend<Semaphore = S>>(backend: &mut B) -> Result<Self, GraphicsError> {
        let first = backend.create_semaphore()?;
        match backend.create_semaphore() {
            Ok(second) => Ok(Self::new(first, second)),
            Err(e) => {
                backend.destroy_semaphore(first);
                Err(e)
            }
        }
    }

    /// Semaphore the next signal will use.
    pub fn current(&self) -> S {
        self.semaphores[self.parity]
    }

    pub fn parity(&self) -> usize {
        self.parity
    }

    /// Take the current semaphore for a signal and flip the parity.
    pub fn signal(&mut self) -> S {
        let semaphore = self.current();
        self.parity ^= 1;
        semaphore
    }

    /// Destroy both semaphores.
    pub fn destroy<B: Backend<Semaphore = S>>(self, backend: &mut B) {
        for semaphore in self.semaphores {
            backend.destroy_semaphore(semaphore);
        }
    }
}
