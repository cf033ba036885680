//! # fastrollout
//!
//! A batched rollout generator for point-goal navigation agents in 3D
//! scenes.
//!
//! ## Overview
//!
//! fastrollout provides:
//! - A fixed worker pool stepping thousands of agents per iteration with
//!   a futex-based generation latch and a shared work counter
//! - A scene-swap pipeline that replaces active scenes behind the render
//!   without stalling the step loop
//! - Per-environment simulation (reset, step, reward, polar-goal
//!   observation) against an external navigation mesh
//! - Flat result buffers (reward, mask, step info, polar goal) shared
//!   with the training loop without copies
//!
//! The GPU batch renderer and the navigation-mesh library are external:
//! the engine talks to them through the [`render::RenderBackend`] and
//! [`nav::PathFinder`] traits. Headless implementations of both ship in
//! this crate for benchmarks and tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fastrollout::prelude::*;
//!
//! let config = RolloutConfig::new("data/episodes", "data/assets")
//!     .with_envs(64)
//!     .with_active_scenes(4)
//!     .with_seed(7);
//! let mut engine =
//!     RolloutGenerator::<HeadlessBackend, PlanePathFinder>::new(config)?;
//!
//! engine.reset(0);
//! let actions = vec![1i64; 64];
//! engine.step(0, &actions);
//! let rewards = engine.rewards(0);
//! ```

pub mod config;
pub mod dataset;
pub mod engine;
pub mod nav;
pub mod render;
pub mod sim;
pub mod sync;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::RolloutConfig;
    pub use crate::dataset::Dataset;
    pub use crate::engine::RolloutGenerator;
    pub use crate::nav::{NavPoint, PathFinder, PlanePathFinder};
    pub use crate::render::{HeadlessBackend, RenderBackend};
    pub use crate::sim::{SimAction, StepInfo};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("navmesh error: {0}")]
    Navmesh(String),

    #[error("render backend error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RolloutError>;
