//! Low-overhead synchronization primitives for the step loop.

mod latch;
mod oneshot;

pub use latch::GenLatch;
pub use oneshot::{oneshot, OneShotReceiver, OneShotSender};
