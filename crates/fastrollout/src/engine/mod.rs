//! Rollout engine: worker pool, iteration barriers, scene-swap pipeline,
//! and the public step API.
//!
//! One iteration: the caller publishes actions and flips the generation
//! latch; workers (the caller included) pull env indices off a shared
//! counter and advance them, writing into the result channel; the last
//! finisher is observed through a second counter; the caller then
//! submits the render batch. Scene swaps ride along: environments whose
//! episode just ended rebind to a Ready replacement scene before
//! resetting.

mod affinity;
mod group;
mod loader;
mod swap;

pub use group::EnvironmentGroup;

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RolloutConfig;
use crate::dataset::Dataset;
use crate::nav::{PathFinder, PathFinderSet};
use crate::render::{RenderBackend, RenderConfig};
use crate::sim::{SimAction, StepInfo};
use crate::sync::GenLatch;
use crate::{Result, RolloutError};

use loader::{BackgroundLoader, LOAD_SPACING};
use swap::SceneSwapper;

/// Action vector for one group, published by the caller before the latch
/// toggle and read by workers after it.
struct ActionBuffer(Box<[UnsafeCell<i64>]>);

unsafe impl Sync for ActionBuffer {}

impl ActionBuffer {
    fn new(len: usize) -> Self {
        Self((0..len).map(|_| UnsafeCell::new(0)).collect())
    }

    /// Caller thread only, before the iteration starts.
    fn publish(&self, actions: &[i64]) {
        for (cell, &action) in self.0.iter().zip(actions) {
            unsafe {
                *cell.get() = action;
            }
        }
    }

    /// # Safety
    /// Only valid during an iteration, after the latch acquire.
    unsafe fn get(&self, env: u32) -> i64 {
        *self.0[env as usize].get()
    }
}

/// State shared between the caller and the worker pool.
struct Shared<B: RenderBackend> {
    dataset: Arc<Dataset>,
    groups: Vec<EnvironmentGroup<B>>,
    actions: Vec<ActionBuffer>,
    backend: B,

    latch: GenLatch,
    /// Work counter: next env index to claim
    next_env: AtomicU32,
    /// Drain counter: counts to num_workers + 1
    finished: AtomicU32,
    active_group: AtomicU32,
    sim_reset: AtomicBool,
    exit: AtomicBool,

    num_workers: u32,
    envs_per_group: u32,
}

/// The multi-threaded rollout engine.
///
/// Generic over the render backend and the navmesh pathfinder; see
/// [`HeadlessBackend`](crate::render::HeadlessBackend) and
/// [`PlanePathFinder`](crate::nav::PlanePathFinder) for the GPU-free
/// versions used in benches and tests.
pub struct RolloutGenerator<B: RenderBackend, P: PathFinder> {
    swappers: Vec<SceneSwapper<B::Scene>>,
    shared: Arc<Shared<B>>,

    active: Vec<u32>,
    inactive: Vec<u32>,
    rng: StdRng,
    caller_finders: PathFinderSet<P>,

    workers: Vec<JoinHandle<()>>,
    in_flight: Option<u32>,
    scenes_per_group: u32,
}

impl<B: RenderBackend, P: PathFinder> RolloutGenerator<B, P> {
    pub fn new(config: RolloutConfig) -> Result<Self> {
        config.validate()?;
        let num_workers = config.resolve_workers()?;
        let num_groups = config.num_groups();
        let envs_per_group = config.envs_per_group();
        let envs_per_scene = config.envs_per_scene();
        let scenes_per_group = config.scenes_per_group();

        let backend = B::new(&RenderConfig {
            gpu_id: config.gpu_id,
            batch_size: envs_per_group,
            resolution: config.resolution,
            color: config.color,
            depth: config.depth,
            double_buffered: config.double_buffered,
        })?;

        let dataset = Arc::new(Dataset::load(
            &config.dataset_path,
            &config.asset_path,
            B::MESH_EXT,
        )?);
        if (dataset.num_scenes() as u32) < config.num_active_scenes {
            return Err(RolloutError::Config(format!(
                "dataset has {} scenes but {} active scenes were requested",
                dataset.num_scenes(),
                config.num_active_scenes
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let (active, inactive) =
            select_active_scenes(dataset.num_scenes() as u32, config.num_active_scenes, &mut rng);

        let plan = affinity::plan(
            num_workers as usize,
            config.num_active_scenes as usize,
            config.pin_threads,
        );
        affinity::pin(plan.caller);

        let mut swappers = Vec::with_capacity(active.len());
        for (slot, &scene) in active.iter().enumerate() {
            let loader =
                BackgroundLoader::spawn(backend.make_loader()?, plan.loaders[slot], LOAD_SPACING);
            swappers.push(SceneSwapper::new(slot, scene, loader, envs_per_scene));
        }

        let mut groups = Vec::with_capacity(num_groups as usize);
        for g in 0..num_groups {
            let lo = (g * scenes_per_group) as usize;
            let hi = lo + scenes_per_group as usize;
            groups.push(EnvironmentGroup::new(
                &backend,
                &dataset,
                &swappers[lo..hi],
                envs_per_scene,
                config.seed,
                g * envs_per_group,
            ));
        }

        let shared = Arc::new(Shared {
            dataset: Arc::clone(&dataset),
            groups,
            actions: (0..num_groups)
                .map(|_| ActionBuffer::new(envs_per_group as usize))
                .collect(),
            backend,
            latch: GenLatch::new(),
            next_env: AtomicU32::new(0),
            // Construction counts as a drained iteration.
            finished: AtomicU32::new(num_workers + 1),
            active_group: AtomicU32::new(0),
            sim_reset: AtomicBool::new(false),
            exit: AtomicBool::new(false),
            num_workers,
            envs_per_group,
        });

        let workers = (0..num_workers)
            .map(|w| {
                let shared = Arc::clone(&shared);
                let core = plan.workers[w as usize];
                std::thread::Builder::new()
                    .name(format!("rollout-{w}"))
                    .spawn(move || worker_loop::<B, P>(shared, core))
                    .expect("failed to spawn rollout worker")
            })
            .collect();

        let mut engine = Self {
            swappers,
            shared,
            active,
            inactive,
            rng,
            caller_finders: PathFinderSet::new(dataset),
            workers,
            in_flight: None,
            scenes_per_group,
        };

        // Keep the pipeline prefetching from the start.
        let mesh_paths = engine.mesh_path_fn();
        for swapper in &mut engine.swappers {
            swapper.start_swap(&mesh_paths, &mut engine.active, &mut engine.inactive, &mut engine.rng);
        }

        tracing::info!(
            envs = config.num_envs,
            active_scenes = config.num_active_scenes,
            workers = num_workers,
            groups = num_groups,
            "rollout engine ready"
        );

        Ok(engine)
    }

    fn mesh_path_fn(&self) -> impl Fn(u32) -> std::path::PathBuf {
        let dataset = Arc::clone(&self.shared.dataset);
        move |scene| dataset.mesh_path(scene).to_owned()
    }

    /// Reset every environment in `group` and render the first frame.
    pub fn reset(&mut self, group: u32) {
        self.begin_iteration(group, true, None);
        self.finish_iteration(group);
        self.render(group);
    }

    /// Convenience wrapper: `step_start` + `step_end` + `render`.
    pub fn step(&mut self, group: u32, actions: &[i64]) {
        self.step_start(group, actions);
        self.step_end(group);
        self.render(group);
    }

    /// Publish actions and release the worker pool on `group`.
    pub fn step_start(&mut self, group: u32, actions: &[i64]) {
        assert_eq!(
            actions.len() as u32,
            self.shared.envs_per_group,
            "action vector length must equal envs per group"
        );
        self.begin_iteration(group, false, Some(actions));
    }

    /// Join the iteration as worker #0, drain it, and run the swap
    /// bookkeeping for `group`'s scene slots.
    pub fn step_end(&mut self, group: u32) {
        assert_eq!(
            self.in_flight,
            Some(group),
            "step_end group does not match step_start"
        );
        self.finish_iteration(group);
    }

    /// Submit `group`'s render batch. Non-blocking.
    pub fn render(&self, group: u32) {
        assert!(self.in_flight.is_none(), "render during an open iteration");
        let g = &self.shared.groups[group as usize];
        self.shared.backend.render(group, g.render_envs());
    }

    /// Block until `group`'s last submitted frame completed on the GPU.
    pub fn wait_for_frame(&self, group: u32) {
        self.shared.backend.wait_for_frame(group);
    }

    fn begin_iteration(&mut self, group: u32, sim_reset: bool, actions: Option<&[i64]>) {
        assert!(
            self.in_flight.is_none(),
            "step_start while a previous iteration is in flight"
        );
        assert!(
            (group as usize) < self.shared.groups.len(),
            "group index out of range"
        );
        assert_eq!(
            self.shared.finished.load(Ordering::Acquire),
            self.shared.num_workers + 1,
            "previous iteration not drained"
        );

        if let Some(actions) = actions {
            self.shared.actions[group as usize].publish(actions);
        }

        // Adopt any replacement scenes that finished loading.
        let lo = (group * self.scenes_per_group) as usize;
        let hi = lo + self.scenes_per_group as usize;
        for swapper in &mut self.swappers[lo..hi] {
            swapper.pre_step();
        }

        self.shared.active_group.store(group, Ordering::Relaxed);
        self.shared.sim_reset.store(sim_reset, Ordering::Relaxed);
        self.shared.next_env.store(0, Ordering::Relaxed);
        self.shared.finished.store(0, Ordering::Relaxed);
        fence(Ordering::Release);

        self.shared.latch.toggle();
        self.in_flight = Some(group);
    }

    fn finish_iteration(&mut self, group: u32) {
        run_iteration(&self.shared, &mut self.caller_finders);
        self.shared.finished.fetch_add(1, Ordering::AcqRel);

        let target = self.shared.num_workers + 1;
        while self.shared.finished.load(Ordering::Acquire) < target {
            std::hint::spin_loop();
        }
        fence(Ordering::Acquire);

        // Retire drained swaps and immediately prefetch replacements.
        let mesh_paths = self.mesh_path_fn();
        let lo = (group * self.scenes_per_group) as usize;
        let hi = lo + self.scenes_per_group as usize;
        for swapper in &mut self.swappers[lo..hi] {
            swapper.post_step(&mesh_paths, &mut self.active, &mut self.inactive, &mut self.rng);
        }

        self.in_flight = None;
    }

    pub fn num_groups(&self) -> u32 {
        self.shared.groups.len() as u32
    }

    pub fn envs_per_group(&self) -> u32 {
        self.shared.envs_per_group
    }

    pub fn num_workers(&self) -> u32 {
        self.shared.num_workers
    }

    /// Scene ids currently active, slot-ordered.
    pub fn active_scenes(&self) -> &[u32] {
        &self.active
    }

    /// Scene ids currently rotated out.
    pub fn inactive_scenes(&self) -> &[u32] {
        &self.inactive
    }

    pub fn group(&self, group: u32) -> &EnvironmentGroup<B> {
        &self.shared.groups[group as usize]
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    pub fn rewards(&self, group: u32) -> &[f32] {
        self.shared.groups[group as usize].rewards()
    }

    pub fn masks(&self, group: u32) -> &[u8] {
        self.shared.groups[group as usize].masks()
    }

    pub fn infos(&self, group: u32) -> &[StepInfo] {
        self.shared.groups[group as usize].infos()
    }

    pub fn polars(&self, group: u32) -> ArrayView2<'_, f32> {
        self.shared.groups[group as usize].polars()
    }

    /// Opaque device pointer to the group's color output.
    pub fn color_buffer(&self, group: u32) -> *mut c_void {
        self.shared.backend.color_buffer(group)
    }

    /// Opaque device pointer to the group's depth output.
    pub fn depth_buffer(&self, group: u32) -> *mut c_void {
        self.shared.backend.depth_buffer(group)
    }

    /// Opaque semaphore signalled at frame completion.
    pub fn frame_semaphore(&self, group: u32) -> *mut c_void {
        self.shared.backend.frame_semaphore(group)
    }
}

impl<B: RenderBackend, P: PathFinder> Drop for RolloutGenerator<B, P> {
    fn drop(&mut self) {
        self.shared.exit.store(true, Ordering::Release);
        self.shared.latch.toggle();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        // Swappers (and their loader threads) drop next, then the shared
        // state: groups before the backend.
    }
}

fn worker_loop<B: RenderBackend, P: PathFinder>(
    shared: Arc<Shared<B>>,
    core: Option<core_affinity::CoreId>,
) {
    affinity::pin(core);
    let mut finders = PathFinderSet::<P>::new(Arc::clone(&shared.dataset));
    let mut expected = 0;
    loop {
        shared.latch.wait(expected);
        expected ^= 1;
        if shared.exit.load(Ordering::Acquire) {
            return;
        }
        run_iteration(&shared, &mut finders);
        shared.finished.fetch_add(1, Ordering::AcqRel);
    }
}

/// Claim env indices off the work counter until the iteration drains.
fn run_iteration<B: RenderBackend, P: PathFinder>(
    shared: &Shared<B>,
    finders: &mut PathFinderSet<P>,
) {
    let group_idx = shared.active_group.load(Ordering::Relaxed) as usize;
    let group = &shared.groups[group_idx];
    let actions = &shared.actions[group_idx];
    let sim_reset = shared.sim_reset.load(Ordering::Relaxed);

    loop {
        let env = shared.next_env.fetch_add(1, Ordering::Relaxed);
        if env >= shared.envs_per_group {
            break;
        }
        // Safety: the fetch-add above hands out each index exactly once
        // per iteration.
        unsafe {
            step_env(shared, group, actions, env, sim_reset, finders);
        }
    }
}

/// # Safety
/// `env` must be exclusively claimed for this iteration.
unsafe fn step_env<B: RenderBackend, P: PathFinder>(
    shared: &Shared<B>,
    group: &EnvironmentGroup<B>,
    actions: &ActionBuffer,
    env: u32,
    sim_reset: bool,
    finders: &mut PathFinderSet<P>,
) {
    if sim_reset {
        let agent = group.agent_mut(env);
        let pathfinder = finders.get(agent.scene());
        agent.reset(&shared.dataset, pathfinder, group.render_env_mut(env));
        return;
    }

    let action = SimAction::from_raw(actions.get(env));
    let done = {
        let agent = group.agent_mut(env);
        let pathfinder = finders.get(agent.scene());
        agent.step(action, pathfinder, group.render_env_mut(env))
    };
    if !done {
        return;
    }

    if group.swap_ready(env) {
        group.swap_env(env, &shared.backend, &shared.dataset);
    }
    let agent = group.agent_mut(env);
    let pathfinder = finders.get(agent.scene());
    agent.reset(&shared.dataset, pathfinder, group.render_env_mut(env));
}

/// Reservoir-style selection of `num_active` scene ids; the remainder
/// populate the inactive pool.
fn select_active_scenes(
    num_scenes: u32,
    num_active: u32,
    rng: &mut StdRng,
) -> (Vec<u32>, Vec<u32>) {
    let mut active = Vec::with_capacity(num_active as usize);
    let mut inactive = Vec::with_capacity((num_scenes - num_active) as usize);
    for scene in 0..num_scenes {
        let remaining = (num_scenes - scene) as f32;
        let needed = num_active - active.len() as u32;
        if needed > 0 && rng.gen::<f32>() * remaining < needed as f32 {
            active.push(scene);
        } else {
            inactive.push(scene);
        }
    }
    (active, inactive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservoir_selection_counts() {
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (active, inactive) = select_active_scenes(17, 5, &mut rng);
            assert_eq!(active.len(), 5);
            assert_eq!(inactive.len(), 12);

            let mut all: Vec<u32> = active.iter().chain(inactive.iter()).copied().collect();
            all.sort();
            assert_eq!(all, (0..17).collect::<Vec<u32>>());
        }
    }

    #[test]
    fn test_reservoir_selection_is_seed_deterministic() {
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        assert_eq!(
            select_active_scenes(10, 4, &mut a),
            select_active_scenes(10, 4, &mut b)
        );
    }
}
