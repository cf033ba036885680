//! Interfaces to the external GPU batch renderer.
//!
//! The engine never talks to a GPU directly; it drives whatever sits
//! behind [`RenderBackend`]: scene assets produced by an asset loader,
//! per-environment render handles, and batched, non-blocking frame
//! submission. [`HeadlessBackend`] is the no-GPU implementation used by
//! benches and the test suites.

mod headless;

pub use headless::{HeadlessBackend, HeadlessEnv, HeadlessLoader, HeadlessScene};

use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;

use glam::Mat4;

use crate::Result;

/// Vertical field of view for agent cameras, in degrees.
pub const CAMERA_FOV: f32 = 90.0;
pub const CAMERA_NEAR: f32 = 0.1;
pub const CAMERA_FAR: f32 = 1000.0;

/// Parameters handed to the backend at construction.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub gpu_id: i32,
    /// Environments per render batch (one group)
    pub batch_size: u32,
    /// [height, width]
    pub resolution: [u32; 2],
    pub color: bool,
    pub depth: bool,
    pub double_buffered: bool,
}

/// One environment's slot in the render batch.
pub trait RenderEnv: Send + 'static {
    /// Publish the world-to-camera matrix for the next frame.
    fn set_camera_view(&mut self, view: Mat4);
}

/// Converts a mesh file into a GPU-resident scene asset.
pub trait SceneLoader: Send + 'static {
    type Scene;

    fn load_scene(&mut self, path: &Path) -> Result<Self::Scene>;
}

/// The batch renderer, shared by the caller and the worker pool.
pub trait RenderBackend: Send + Sync + Sized + 'static {
    type Scene: Send + Sync + 'static;
    type Env: RenderEnv;
    type Loader: SceneLoader<Scene = Self::Scene>;

    /// File extension of mesh assets this backend renders.
    const MESH_EXT: &'static str;

    fn new(config: &RenderConfig) -> Result<Self>;

    /// A loader instance for a background loader thread.
    fn make_loader(&self) -> Result<Self::Loader>;

    fn make_env(&self, scene: &Arc<Self::Scene>, fov: f32, near: f32, far: f32) -> Self::Env;

    /// Submit a render batch for `group`. Non-blocking.
    fn render(&self, group: u32, envs: &[Self::Env]);

    /// Block until `group`'s most recent batch has finished on the GPU.
    fn wait_for_frame(&self, group: u32);

    /// Opaque device pointer to the group's color output, if any.
    fn color_buffer(&self, group: u32) -> *mut c_void;

    /// Opaque device pointer to the group's depth output, if any.
    fn depth_buffer(&self, group: u32) -> *mut c_void;

    /// Opaque semaphore signalled at frame completion.
    fn frame_semaphore(&self, group: u32) -> *mut c_void;
}
