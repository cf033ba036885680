//! Single-bit generation latch.

use std::sync::atomic::{AtomicU32, Ordering};

/// Multi-waiter start signal, toggled once per iteration.
///
/// Waiters block on a futex keyed to the generation bit equalling their
/// private `expected` value and flip that value locally after each wake.
/// Because the bit is single-valued, a spurious wake cannot advance a
/// waiter past an iteration boundary.
pub struct GenLatch {
    state: AtomicU32,
}

impl GenLatch {
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// Block until the generation bit moves past `expected`.
    pub fn wait(&self, expected: u32) {
        while self.state.load(Ordering::Acquire) == expected {
            atomic_wait::wait(&self.state, expected);
        }
    }

    /// Flip the generation bit and wake every waiter.
    pub fn toggle(&self) {
        self.state.fetch_xor(1, Ordering::Release);
        atomic_wait::wake_all(&self.state);
    }
}

impl Default for GenLatch {
    fn default() -> Self {
        Self::new()
    }
}
