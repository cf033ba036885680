//! Single-producer single-consumer one-shot payload latch.
//!
//! A full future is overkill for handing one scene asset from a loader
//! thread to the engine: this is a payload slot plus a three-state
//! atomic. The producer writes the payload then releases FILLED; the
//! consumer acquires FILLED, moves the payload out, and stores CONSUMED.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const EMPTY: u32 = 0;
const FILLED: u32 = 1;
const CONSUMED: u32 = 2;

struct Channel<T> {
    state: AtomicU32,
    slot: UnsafeCell<Option<T>>,
}

// The state machine serializes every access to `slot`: the producer
// writes only in EMPTY, the consumer reads only in FILLED.
unsafe impl<T: Send> Send for Channel<T> {}
unsafe impl<T: Send> Sync for Channel<T> {}

pub struct OneShotSender<T>(Arc<Channel<T>>);

pub struct OneShotReceiver<T>(Arc<Channel<T>>);

/// Create a connected sender/receiver pair.
pub fn oneshot<T>() -> (OneShotSender<T>, OneShotReceiver<T>) {
    let channel = Arc::new(Channel {
        state: AtomicU32::new(EMPTY),
        slot: UnsafeCell::new(None),
    });
    (OneShotSender(Arc::clone(&channel)), OneShotReceiver(channel))
}

impl<T> OneShotSender<T> {
    /// Publish the payload and wake a blocked receiver.
    pub fn send(self, value: T) {
        unsafe {
            *self.0.slot.get() = Some(value);
        }
        self.0.state.store(FILLED, Ordering::Release);
        atomic_wait::wake_all(&self.0.state);
    }
}

impl<T> OneShotReceiver<T> {
    /// Move the payload out if the producer has published it.
    pub fn try_take(&mut self) -> Option<T> {
        if self.0.state.load(Ordering::Acquire) != FILLED {
            return None;
        }
        let value = unsafe { (*self.0.slot.get()).take() };
        self.0.state.store(CONSUMED, Ordering::Relaxed);
        value
    }

    /// Block until the payload arrives.
    pub fn take_blocking(mut self) -> T {
        loop {
            if let Some(value) = self.try_take() {
                return value;
            }
            atomic_wait::wait(&self.0.state, EMPTY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_try_take_before_and_after_send() {
        let (tx, mut rx) = oneshot();
        assert!(rx.try_take().is_none());
        tx.send(41);
        assert_eq!(rx.try_take(), Some(41));
        assert_eq!(rx.try_take(), None);
    }

    #[test]
    fn test_blocking_take_across_threads() {
        let (tx, rx) = oneshot();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            tx.send(String::from("scene"));
        });
        assert_eq!(rx.take_blocking(), "scene");
        producer.join().unwrap();
    }
}
