//! Engine configuration.

use std::path::PathBuf;

use crate::{Result, RolloutError};

/// Configuration for a [`RolloutGenerator`](crate::engine::RolloutGenerator).
///
/// The engine is constructed once per process; every field is validated
/// up front and violations are fatal.
#[derive(Clone, Debug)]
pub struct RolloutConfig {
    /// Directory containing `*.json.gz` episode files
    pub dataset_path: PathBuf,
    /// Directory that scene ids resolve against
    pub asset_path: PathBuf,
    /// Total environments across all groups
    pub num_envs: u32,
    /// Scenes resident at any time; must divide `num_envs`
    pub num_active_scenes: u32,
    /// Worker threads; -1 selects `max(cores - 1, 1)`
    pub num_workers: i32,
    /// GPU ordinal handed to the render backend
    pub gpu_id: i32,
    /// Render resolution as [height, width]
    pub resolution: [u32; 2],
    /// Render a color output
    pub color: bool,
    /// Render a depth output
    pub depth: bool,
    /// Two environment groups, overlapping render with simulation
    pub double_buffered: bool,
    /// Seed for scene selection and episode sampling
    pub seed: u64,
    /// Pin caller, workers, and loaders to cores (best effort)
    pub pin_threads: bool,
}

impl RolloutConfig {
    pub fn new(dataset_path: impl Into<PathBuf>, asset_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            asset_path: asset_path.into(),
            num_envs: 32,
            num_active_scenes: 4,
            num_workers: -1,
            gpu_id: 0,
            resolution: [256, 256],
            color: true,
            depth: true,
            double_buffered: false,
            seed: 0,
            pin_threads: false,
        }
    }

    pub fn with_envs(mut self, num_envs: u32) -> Self {
        self.num_envs = num_envs;
        self
    }

    pub fn with_active_scenes(mut self, num_active_scenes: u32) -> Self {
        self.num_active_scenes = num_active_scenes;
        self
    }

    pub fn with_workers(mut self, num_workers: i32) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_gpu(mut self, gpu_id: i32) -> Self {
        self.gpu_id = gpu_id;
        self
    }

    pub fn with_resolution(mut self, resolution: [u32; 2]) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_outputs(mut self, color: bool, depth: bool) -> Self {
        self.color = color;
        self.depth = depth;
        self
    }

    pub fn with_double_buffered(mut self, double_buffered: bool) -> Self {
        self.double_buffered = double_buffered;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_pinning(mut self, pin_threads: bool) -> Self {
        self.pin_threads = pin_threads;
        self
    }

    /// Number of environment groups (2 when double buffered)
    pub fn num_groups(&self) -> u32 {
        if self.double_buffered {
            2
        } else {
            1
        }
    }

    pub fn envs_per_group(&self) -> u32 {
        self.num_envs / self.num_groups()
    }

    pub fn envs_per_scene(&self) -> u32 {
        self.num_envs / self.num_active_scenes
    }

    pub fn scenes_per_group(&self) -> u32 {
        self.num_active_scenes / self.num_groups()
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_envs == 0 {
            return Err(RolloutError::Config("num_envs must be > 0".into()));
        }
        if self.num_active_scenes == 0 {
            return Err(RolloutError::Config("num_active_scenes must be > 0".into()));
        }
        if self.num_envs % self.num_active_scenes != 0 {
            return Err(RolloutError::Config(format!(
                "num_envs ({}) must be divisible by num_active_scenes ({})",
                self.num_envs, self.num_active_scenes
            )));
        }
        let groups = self.num_groups();
        if self.num_envs % groups != 0 {
            return Err(RolloutError::Config(format!(
                "num_envs ({}) must be divisible by the group count ({groups})",
                self.num_envs
            )));
        }
        if self.num_active_scenes % groups != 0 {
            return Err(RolloutError::Config(format!(
                "num_active_scenes ({}) must be divisible by the group count ({groups})",
                self.num_active_scenes
            )));
        }
        if self.num_workers == 0 {
            return Err(RolloutError::Config(
                "num_workers must be positive or -1 for auto".into(),
            ));
        }
        if self.resolution[0] == 0 || self.resolution[1] == 0 {
            return Err(RolloutError::Config("render resolution must be non-zero".into()));
        }
        Ok(())
    }

    /// Resolve `num_workers`, mapping -1 to `max(cores - 1, 1)`.
    pub fn resolve_workers(&self) -> Result<u32> {
        match self.num_workers {
            -1 => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                Ok(cores.saturating_sub(1).max(1) as u32)
            }
            n if n > 0 => Ok(n as u32),
            n => Err(RolloutError::Config(format!("invalid worker count: {n}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RolloutConfig {
        RolloutConfig::new("/tmp/dataset", "/tmp/assets")
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_divisibility_checks() {
        let cfg = base().with_envs(10).with_active_scenes(4);
        assert!(cfg.validate().is_err());

        let cfg = base().with_envs(12).with_active_scenes(4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_double_buffered_divisibility() {
        // 6 envs over 3 scenes is fine single buffered but the scene
        // count cannot be split across two groups.
        let cfg = base()
            .with_envs(6)
            .with_active_scenes(3)
            .with_double_buffered(true);
        assert!(cfg.validate().is_err());

        let cfg = base()
            .with_envs(8)
            .with_active_scenes(4)
            .with_double_buffered(true);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.num_groups(), 2);
        assert_eq!(cfg.envs_per_group(), 4);
        assert_eq!(cfg.scenes_per_group(), 2);
        assert_eq!(cfg.envs_per_scene(), 2);
    }

    #[test]
    fn test_worker_resolution() {
        assert!(base().with_workers(0).validate().is_err());
        assert_eq!(base().with_workers(3).resolve_workers().unwrap(), 3);
        assert!(base().with_workers(-1).resolve_workers().unwrap() >= 1);
    }
}
