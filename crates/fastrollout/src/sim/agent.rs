//! Agent state machine: reset, step, reward, observation.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::Rng;

use super::{
    ResultSlots, SimAction, StepInfo, EYE_HEIGHT, FORWARD_STEP, MAX_STEPS, SLACK_REWARD,
    SUCCESS_DISTANCE, SUCCESS_REWARD, TURN_ANGLE, UP,
};
use crate::dataset::Dataset;
use crate::nav::{NavPoint, PathFinder};
use crate::render::RenderEnv;

/// One environment's simulation state.
///
/// All buffers are sized at construction; `reset` and `step` never
/// allocate.
pub struct AgentSim {
    scene: u32,
    first_episode: u32,
    num_episodes: u32,
    outputs: ResultSlots,
    rng: StdRng,

    position: Vec3,
    rotation: Quat,
    goal: Vec3,
    nav_position: NavPoint,
    nav_goal: NavPoint,

    initial_distance: f32,
    prev_distance: f32,
    travel_distance: f32,
    step: u32,
}

impl AgentSim {
    pub(crate) fn new(
        scene: u32,
        episode_span: (u32, u32),
        outputs: ResultSlots,
        rng: StdRng,
    ) -> Self {
        Self {
            scene,
            first_episode: episode_span.0,
            num_episodes: episode_span.1,
            outputs,
            rng,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            goal: Vec3::ZERO,
            nav_position: NavPoint::default(),
            nav_goal: NavPoint::default(),
            initial_distance: 0.0,
            prev_distance: 0.0,
            travel_distance: 0.0,
            step: 1,
        }
    }

    /// Scene this agent currently samples episodes from.
    pub fn scene(&self) -> u32 {
        self.scene
    }

    pub fn step_count(&self) -> u32 {
        self.step
    }

    pub fn travel_distance(&self) -> f32 {
        self.travel_distance
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Point this agent at a new scene's episode subsequence after a
    /// swap. The RNG stream carries over; `reset` re-arms the rest.
    pub(crate) fn retarget(&mut self, scene: u32, episode_span: (u32, u32)) {
        self.scene = scene;
        self.first_episode = episode_span.0;
        self.num_episodes = episode_span.1;
    }

    /// Begin a fresh episode drawn uniformly (with replacement) from the
    /// scene's subsequence.
    pub fn reset<P: PathFinder, E: RenderEnv>(
        &mut self,
        dataset: &Dataset,
        pathfinder: &mut P,
        env: &mut E,
    ) {
        self.step = 1;

        let pick = self.first_episode + self.rng.gen_range(0..self.num_episodes);
        let episode = dataset.episode(pick);
        self.position = episode.start_position;
        self.rotation = episode.start_rotation;
        self.goal = episode.goal;
        self.nav_goal = pathfinder.snap_point(self.goal);
        self.nav_position = pathfinder.snap_point(self.position);

        self.travel_distance = 0.0;
        self.initial_distance = pathfinder.geodesic_distance(&self.nav_position, &self.nav_goal);
        self.prev_distance = self.initial_distance;

        self.update_observation(env);
    }

    /// Advance one action; returns whether the episode ended.
    pub fn step<P: PathFinder, E: RenderEnv>(
        &mut self,
        action: SimAction,
        pathfinder: &mut P,
        env: &mut E,
    ) -> bool {
        let mut done = self.step >= MAX_STEPS;
        let mut reward = -SLACK_REWARD;
        let mut success = 0.0f32;
        let distance_to_goal;

        match action {
            SimAction::Stop => {
                done = true;
                distance_to_goal =
                    pathfinder.geodesic_distance(&self.nav_position, &self.nav_goal);
                if distance_to_goal < SUCCESS_DISTANCE {
                    success = 1.0;
                }
            }
            SimAction::Forward => {
                let prev_position = self.position;
                let target = self.position + self.rotation * (Vec3::NEG_Z * FORWARD_STEP);
                self.nav_position = pathfinder.try_step(&self.nav_position, target);
                self.position = self.nav_position.position();
                self.update_observation(env);

                distance_to_goal =
                    pathfinder.geodesic_distance(&self.nav_position, &self.nav_goal);
                reward += self.prev_distance - distance_to_goal;
                self.travel_distance += (self.position - prev_position).length();
                self.prev_distance = distance_to_goal;
            }
            SimAction::TurnLeft | SimAction::TurnRight => {
                let angle = if action == SimAction::TurnLeft {
                    TURN_ANGLE
                } else {
                    -TURN_ANGLE
                };
                self.rotation = (self.rotation * Quat::from_axis_angle(UP, angle)).normalize();
                self.update_observation(env);
                distance_to_goal = self.prev_distance;
            }
        }

        // A degenerate episode can snap its start onto its goal; with no
        // travel either, the path-length ratio is 0/0. Score it as a
        // plain success so spl and the reward stay finite.
        let denom = self.initial_distance.max(self.travel_distance);
        let spl = if denom > 0.0 {
            success * self.initial_distance / denom
        } else {
            success
        };
        reward += SUCCESS_REWARD * spl;

        if !done {
            self.step += 1;
        }

        let info = StepInfo {
            success,
            spl,
            distance_to_goal,
        };
        self.outputs.write(reward, if done { 0 } else { 1 }, info);

        done
    }

    /// Publish the camera view matrix and the polar goal vector.
    fn update_observation<E: RenderEnv>(&mut self, env: &mut E) {
        let inv_rot = Mat3::from_quat(self.rotation.inverse());
        let eye = self.position + UP * EYE_HEIGHT;
        let mut view = Mat4::from_mat3(inv_rot);
        view.w_axis = (inv_rot * -eye).extend(1.0);
        env.set_camera_view(view);

        let to_goal = inv_rot * (self.goal - self.position);
        let rho = Vec2::new(to_goal.x, to_goal.z).length();
        let phi = to_goal.x.atan2(-to_goal.z);
        self.outputs.write_polar(rho, -phi);
    }
}
