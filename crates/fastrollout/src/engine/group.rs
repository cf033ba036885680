//! Environment bank sharing one render batch.
//!
//! A group owns contiguous, env-indexed arrays: render-env handles,
//! agent states, scene-binding trackers, and the result channel the
//! training loop reads between steps. Workers mutate these arrays in
//! parallel, but every index is claimed by exactly one worker per
//! iteration through the engine's work counter, so slots never alias.

use std::cell::UnsafeCell;
use std::sync::Arc;

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::swap::{SceneSwapper, SwapShared};
use crate::dataset::Dataset;
use crate::render::{RenderBackend, CAMERA_FAR, CAMERA_FOV, CAMERA_NEAR};
use crate::sim::{AgentSim, ResultSlots, StepInfo};

/// Snapshot of the active-scene id an environment was built against.
///
/// The env is consistent while the snapshot matches the slot's current
/// scene; a mismatch is the signal to rebind after the next episode.
pub(crate) struct SceneTracker<S> {
    shared: Arc<SwapShared<S>>,
    current: u32,
}

impl<S> SceneTracker<S> {
    fn new(shared: Arc<SwapShared<S>>) -> Self {
        let current = shared.current_scene();
        Self { shared, current }
    }

    pub fn is_consistent(&self) -> bool {
        self.shared.current_scene() == self.current
    }

    pub fn refresh(&mut self) {
        self.current = self.shared.current_scene();
    }

    pub fn scene(&self) -> u32 {
        self.current
    }
}

/// Contiguous output buffers shared with the consumer.
///
/// Written through raw per-env slots during an iteration; read as flat
/// views between iterations. Never reallocated.
struct ResultChannel {
    rewards: Box<[UnsafeCell<f32>]>,
    masks: Box<[UnsafeCell<u8>]>,
    infos: Box<[UnsafeCell<StepInfo>]>,
    /// (rho, -phi) pairs, two floats per env
    polars: Box<[UnsafeCell<f32>]>,
}

unsafe impl Sync for ResultChannel {}

fn zeroed<T: Default>(len: usize) -> Box<[UnsafeCell<T>]> {
    (0..len).map(|_| UnsafeCell::new(T::default())).collect()
}

impl ResultChannel {
    fn new(num_envs: usize) -> Self {
        Self {
            rewards: zeroed(num_envs),
            masks: zeroed(num_envs),
            infos: zeroed(num_envs),
            polars: zeroed(num_envs * 2),
        }
    }

    fn slots(&self, env: usize) -> ResultSlots {
        ResultSlots::new(
            self.rewards[env].get(),
            self.masks[env].get(),
            self.infos[env].get(),
            self.polars[env * 2].get(),
        )
    }
}

/// `UnsafeCell<T>` is `repr(transparent)`, so an env-indexed cell array
/// reads back as a plain slice once the iteration has drained.
fn cells_as_slice<T>(cells: &[UnsafeCell<T>]) -> &[T] {
    unsafe { std::slice::from_raw_parts(cells.as_ptr().cast::<T>(), cells.len()) }
}

/// A bank of environments rendered together in one GPU batch.
pub struct EnvironmentGroup<B: RenderBackend> {
    envs_per_scene: u32,
    render_envs: Box<[UnsafeCell<B::Env>]>,
    agents: Box<[UnsafeCell<AgentSim>]>,
    trackers: Box<[UnsafeCell<SceneTracker<B::Scene>>]>,
    slots: Vec<Arc<SwapShared<B::Scene>>>,
    channel: ResultChannel,
}

// Workers access disjoint env indices; see the module docs.
unsafe impl<B: RenderBackend> Sync for EnvironmentGroup<B> {}

impl<B: RenderBackend> EnvironmentGroup<B> {
    /// Eagerly instantiate `envs_per_scene` environments per slot,
    /// loading each slot's initial scene through its own loader.
    pub(crate) fn new(
        backend: &B,
        dataset: &Dataset,
        swappers: &[SceneSwapper<B::Scene>],
        envs_per_scene: u32,
        seed: u64,
        env_offset: u32,
    ) -> Self {
        let num_envs = swappers.len() * envs_per_scene as usize;
        let channel = ResultChannel::new(num_envs);

        let mut render_envs = Vec::with_capacity(num_envs);
        let mut agents = Vec::with_capacity(num_envs);
        let mut trackers = Vec::with_capacity(num_envs);
        let mut slots = Vec::with_capacity(swappers.len());

        for swapper in swappers {
            let shared = swapper.shared();
            let scene = shared.current_scene();
            let asset = swapper
                .loader()
                .load_blocking(dataset.mesh_path(scene).to_owned());
            let span = dataset.episode_span(scene);

            for _ in 0..envs_per_scene {
                let env_idx = render_envs.len();
                render_envs.push(UnsafeCell::new(backend.make_env(
                    &asset,
                    CAMERA_FOV,
                    CAMERA_NEAR,
                    CAMERA_FAR,
                )));
                agents.push(UnsafeCell::new(AgentSim::new(
                    scene,
                    span,
                    channel.slots(env_idx),
                    StdRng::seed_from_u64(seed.wrapping_add((env_offset as usize + env_idx) as u64)),
                )));
                trackers.push(UnsafeCell::new(SceneTracker::new(Arc::clone(&shared))));
            }
            slots.push(shared);
        }

        Self {
            envs_per_scene,
            render_envs: render_envs.into_boxed_slice(),
            agents: agents.into_boxed_slice(),
            trackers: trackers.into_boxed_slice(),
            slots,
            channel,
        }
    }

    pub fn num_envs(&self) -> u32 {
        self.render_envs.len() as u32
    }

    fn scene_slot(&self, env: u32) -> &Arc<SwapShared<B::Scene>> {
        &self.slots[(env / self.envs_per_scene) as usize]
    }

    /// # Safety
    /// `env` must be exclusively claimed by the calling worker for the
    /// current iteration.
    pub(crate) unsafe fn agent_mut(&self, env: u32) -> &mut AgentSim {
        &mut *self.agents[env as usize].get()
    }

    /// # Safety
    /// Same claim requirement as [`Self::agent_mut`].
    pub(crate) unsafe fn render_env_mut(&self, env: u32) -> &mut B::Env {
        &mut *self.render_envs[env as usize].get()
    }

    /// Whether `env` should rebind: its slot holds a Ready replacement
    /// and the env's binding snapshot is stale.
    ///
    /// # Safety
    /// Same claim requirement as [`Self::agent_mut`].
    pub(crate) unsafe fn swap_ready(&self, env: u32) -> bool {
        let tracker = &*self.trackers[env as usize].get();
        !tracker.is_consistent() && self.scene_slot(env).has_ready()
    }

    /// Rebind `env` to its slot's Ready scene: fresh render env, agent
    /// retargeted to the new episode subsequence, binding refreshed, and
    /// the swap acknowledged.
    ///
    /// # Safety
    /// Same claim requirement as [`Self::agent_mut`]; the slot must hold
    /// a Ready asset.
    pub(crate) unsafe fn swap_env(&self, env: u32, backend: &B, dataset: &Dataset) {
        let slot = self.scene_slot(env);
        let asset = slot
            .ready_scene()
            .expect("swap_env called without a ready scene");

        let tracker = &mut *self.trackers[env as usize].get();
        tracker.refresh();
        let scene = tracker.scene();

        *self.render_envs[env as usize].get() =
            backend.make_env(&asset, CAMERA_FOV, CAMERA_NEAR, CAMERA_FAR);
        (*self.agents[env as usize].get()).retarget(scene, dataset.episode_span(scene));

        slot.ack_swap();
    }

    /// Render-env handles for batch submission. Caller thread only,
    /// between iterations.
    pub(crate) fn render_envs(&self) -> &[B::Env] {
        cells_as_slice(&self.render_envs)
    }

    /// Scene id each env is currently bound to. Caller thread only.
    pub fn env_scenes(&self) -> Vec<u32> {
        self.trackers
            .iter()
            .map(|cell| unsafe { (*cell.get()).scene() })
            .collect()
    }

    pub fn rewards(&self) -> &[f32] {
        cells_as_slice(&self.channel.rewards)
    }

    pub fn masks(&self) -> &[u8] {
        cells_as_slice(&self.channel.masks)
    }

    pub fn infos(&self) -> &[StepInfo] {
        cells_as_slice(&self.channel.infos)
    }

    /// Polar goal pairs as an `(num_envs, 2)` view.
    pub fn polars(&self) -> ArrayView2<'_, f32> {
        let flat = cells_as_slice(&self.channel.polars);
        ArrayView2::from_shape((self.render_envs.len(), 2), flat)
            .expect("polar buffer shape is fixed at construction")
    }
}
