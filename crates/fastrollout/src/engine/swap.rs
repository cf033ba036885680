//! Per-active-slot scene replacement.
//!
//! Each active-scene slot owns a swapper that keeps a replacement scene
//! warming up: select a scene from the inactive pool, load it in the
//! background, then let workers rebind their environments one by one as
//! episodes finish. Only the engine's caller thread drives the state
//! machine (`start_swap` / `pre_step` / `post_step`); workers touch just
//! the shared side: the active-scene id, the ready asset, and the
//! outstanding-acknowledgement count.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::Rng;

use super::loader::BackgroundLoader;
use crate::sync::OneShotReceiver;

/// Worker-visible half of a swapper.
pub(crate) struct SwapShared<S> {
    /// Scene currently bound to this slot
    current: AtomicU32,
    /// Replacement asset, present only in the Ready/Draining states
    ready: Mutex<Option<Arc<S>>>,
    /// Environments that have not yet rebound to the replacement
    outstanding: AtomicU32,
}

impl<S> SwapShared<S> {
    fn new(scene: u32) -> Self {
        Self {
            current: AtomicU32::new(scene),
            ready: Mutex::new(None),
            outstanding: AtomicU32::new(0),
        }
    }

    pub fn current_scene(&self) -> u32 {
        self.current.load(Ordering::Relaxed)
    }

    /// The replacement asset, when the swapper is Ready or Draining.
    pub fn ready_scene(&self) -> Option<Arc<S>> {
        self.ready.lock().unwrap().clone()
    }

    pub fn has_ready(&self) -> bool {
        self.ready.lock().unwrap().is_some()
    }

    /// Record that one environment rebound to the replacement.
    pub fn ack_swap(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Caller-thread controller for one active-scene slot.
pub(crate) struct SceneSwapper<S: Send + Sync + 'static> {
    slot: usize,
    shared: Arc<SwapShared<S>>,
    loader: BackgroundLoader<S>,
    pending: Option<OneShotReceiver<Arc<S>>>,
    envs_per_scene: u32,
}

impl<S: Send + Sync + 'static> SceneSwapper<S> {
    pub fn new(
        slot: usize,
        initial_scene: u32,
        loader: BackgroundLoader<S>,
        envs_per_scene: u32,
    ) -> Self {
        Self {
            slot,
            shared: Arc::new(SwapShared::new(initial_scene)),
            loader,
            pending: None,
            envs_per_scene,
        }
    }

    pub fn shared(&self) -> Arc<SwapShared<S>> {
        Arc::clone(&self.shared)
    }

    pub fn loader(&self) -> &BackgroundLoader<S> {
        &self.loader
    }

    /// Idle -> Loading: rotate a scene in from the inactive pool and
    /// start loading it. A no-op when every scene is already active.
    pub fn start_swap(
        &mut self,
        mesh_path_of: impl Fn(u32) -> std::path::PathBuf,
        active: &mut [u32],
        inactive: &mut [u32],
        rng: &mut StdRng,
    ) {
        debug_assert!(self.pending.is_none() && !self.shared.has_ready());
        if inactive.is_empty() {
            return;
        }

        let pick = rng.gen_range(0..inactive.len());
        std::mem::swap(&mut inactive[pick], &mut active[self.slot]);
        let scene = active[self.slot];
        self.shared.current.store(scene, Ordering::Release);
        tracing::debug!(slot = self.slot, scene, "scene swap started");
        self.pending = Some(self.loader.request(mesh_path_of(scene)));
    }

    /// Loading -> Ready: adopt a completed load and open the per-env
    /// acknowledgement window.
    pub fn pre_step(&mut self) {
        if let Some(receiver) = self.pending.as_mut() {
            if let Some(asset) = receiver.try_take() {
                *self.shared.ready.lock().unwrap() = Some(asset);
                self.shared
                    .outstanding
                    .store(self.envs_per_scene, Ordering::Release);
                self.pending = None;
            }
        }
    }

    /// Ready -> Idle -> Loading: once every environment has rebound,
    /// release the asset and immediately begin prefetching the next
    /// replacement.
    pub fn post_step(
        &mut self,
        mesh_path_of: impl Fn(u32) -> std::path::PathBuf,
        active: &mut [u32],
        inactive: &mut [u32],
        rng: &mut StdRng,
    ) {
        {
            let mut ready = self.shared.ready.lock().unwrap();
            if ready.is_none() || self.shared.outstanding.load(Ordering::Acquire) != 0 {
                return;
            }
            *ready = None;
        }
        tracing::debug!(slot = self.slot, "scene swap drained");
        self.start_swap(mesh_path_of, active, inactive, rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loader::BackgroundLoader;
    use crate::render::{HeadlessLoader, HeadlessScene};
    use rand::SeedableRng;
    use std::path::PathBuf;
    use std::time::Duration;

    fn mesh_path(scene: u32) -> PathBuf {
        PathBuf::from(format!("scene_{scene}.glb"))
    }

    #[test]
    fn test_swap_lifecycle() {
        let loader =
            BackgroundLoader::<HeadlessScene>::spawn(HeadlessLoader, None, Duration::ZERO);
        let mut swapper = SceneSwapper::new(0, 0, loader, 2);
        let shared = swapper.shared();

        let mut active = vec![0u32];
        let mut inactive = vec![1u32, 2];
        let mut rng = StdRng::seed_from_u64(3);

        swapper.start_swap(mesh_path, &mut active, &mut inactive, &mut rng);
        let target = active[0];
        assert_ne!(target, 0);
        assert_eq!(shared.current_scene(), target);
        // Partition stays a permutation of the full scene set.
        let mut all: Vec<u32> = active.iter().chain(inactive.iter()).copied().collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2]);

        // Loading -> Ready once the loader thread finishes.
        while !shared.has_ready() {
            swapper.pre_step();
            std::thread::yield_now();
        }
        assert_eq!(shared.outstanding.load(Ordering::Relaxed), 2);

        // Draining: with acks pending, post_step holds the asset.
        swapper.post_step(mesh_path, &mut active, &mut inactive, &mut rng);
        assert!(shared.has_ready());

        shared.ack_swap();
        shared.ack_swap();
        swapper.post_step(mesh_path, &mut active, &mut inactive, &mut rng);

        // Asset released and the next prefetch already issued.
        assert!(!shared.has_ready());
        assert!(swapper.pending.is_some());
    }

    #[test]
    fn test_single_scene_never_swaps() {
        let loader =
            BackgroundLoader::<HeadlessScene>::spawn(HeadlessLoader, None, Duration::ZERO);
        let mut swapper = SceneSwapper::new(0, 0, loader, 1);

        let mut active = vec![0u32];
        let mut inactive: Vec<u32> = vec![];
        let mut rng = StdRng::seed_from_u64(0);

        swapper.start_swap(mesh_path, &mut active, &mut inactive, &mut rng);
        assert!(swapper.pending.is_none());
        assert_eq!(swapper.shared().current_scene(), 0);
    }
}
