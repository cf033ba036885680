//! Per-environment agent simulation.

mod agent;

pub use agent::AgentSim;

use glam::Vec3;

/// Episode step budget, counting the terminal action.
pub const MAX_STEPS: u32 = 500;
/// Stop within this geodesic distance of the goal to succeed.
pub const SUCCESS_DISTANCE: f32 = 0.2;
/// Per-step time penalty.
pub const SLACK_REWARD: f32 = 1e-2;
/// Reward scale for a successful stop, weighted by SPL.
pub const SUCCESS_REWARD: f32 = 2.5;
/// Forward translation along camera -Z, in meters.
pub const FORWARD_STEP: f32 = 0.25;
/// Turn increment about world-up, 10 degrees.
pub const TURN_ANGLE: f32 = std::f32::consts::PI / 18.0;
/// World-up axis.
pub const UP: Vec3 = Vec3::Y;
/// Camera eye sits this far above the agent position, along world-up.
pub const EYE_HEIGHT: f32 = 1.25;

/// Discrete action alphabet. Unknown codes are fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimAction {
    Stop,
    Forward,
    TurnLeft,
    TurnRight,
}

impl SimAction {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => SimAction::Stop,
            1 => SimAction::Forward,
            2 => SimAction::TurnLeft,
            3 => SimAction::TurnRight,
            other => panic!("unknown action code: {other}"),
        }
    }
}

/// Per-step episode metrics, exposed to the consumer bit-for-bit.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepInfo {
    /// 1.0 when the episode ended within [`SUCCESS_DISTANCE`] of the goal
    pub success: f32,
    /// Success weighted by path length, in [0, 1]
    pub spl: f32,
    pub distance_to_goal: f32,
}

/// Raw pointers into one environment's result-channel slot.
///
/// The pointed-to storage lives in the owning group's result channel and
/// outlives the agent; each env's slot is written by exactly one worker
/// per iteration.
pub struct ResultSlots {
    reward: *mut f32,
    mask: *mut u8,
    info: *mut StepInfo,
    polar: *mut f32,
}

unsafe impl Send for ResultSlots {}

impl ResultSlots {
    pub(crate) fn new(reward: *mut f32, mask: *mut u8, info: *mut StepInfo, polar: *mut f32) -> Self {
        Self {
            reward,
            mask,
            info,
            polar,
        }
    }

    pub(crate) fn write(&mut self, reward: f32, mask: u8, info: StepInfo) {
        unsafe {
            *self.reward = reward;
            *self.mask = mask;
            *self.info = info;
        }
    }

    pub(crate) fn write_polar(&mut self, rho: f32, phi: f32) {
        unsafe {
            *self.polar = rho;
            *self.polar.add(1) = phi;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_codes() {
        assert_eq!(SimAction::from_raw(0), SimAction::Stop);
        assert_eq!(SimAction::from_raw(1), SimAction::Forward);
        assert_eq!(SimAction::from_raw(2), SimAction::TurnLeft);
        assert_eq!(SimAction::from_raw(3), SimAction::TurnRight);
    }

    #[test]
    #[should_panic(expected = "unknown action code")]
    fn test_unknown_action_is_fatal() {
        SimAction::from_raw(4);
    }
}
