//! Headless render backend: no GPU, no file IO.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::Mat4;

use super::{RenderBackend, RenderConfig, RenderEnv, SceneLoader};
use crate::Result;

/// Scene asset stand-in; remembers only where it came from.
#[derive(Debug)]
pub struct HeadlessScene {
    path: PathBuf,
}

impl HeadlessScene {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Render-env stand-in; records the last published camera view.
#[derive(Debug, Default)]
pub struct HeadlessEnv {
    view: Mat4,
}

impl HeadlessEnv {
    pub fn camera_view(&self) -> Mat4 {
        self.view
    }
}

impl RenderEnv for HeadlessEnv {
    fn set_camera_view(&mut self, view: Mat4) {
        self.view = view;
    }
}

pub struct HeadlessLoader;

impl SceneLoader for HeadlessLoader {
    type Scene = HeadlessScene;

    fn load_scene(&mut self, path: &Path) -> Result<HeadlessScene> {
        Ok(HeadlessScene {
            path: path.to_owned(),
        })
    }
}

/// A renderer that swallows batches and counts frames per group.
pub struct HeadlessBackend {
    frames: Vec<AtomicU64>,
}

impl HeadlessBackend {
    /// Frames submitted for `group` so far.
    pub fn frames_submitted(&self, group: u32) -> u64 {
        self.frames[group as usize].load(Ordering::Relaxed)
    }
}

impl RenderBackend for HeadlessBackend {
    type Scene = HeadlessScene;
    type Env = HeadlessEnv;
    type Loader = HeadlessLoader;

    const MESH_EXT: &'static str = "glb";

    fn new(config: &RenderConfig) -> Result<Self> {
        let groups = if config.double_buffered { 2 } else { 1 };
        Ok(Self {
            frames: (0..groups).map(|_| AtomicU64::new(0)).collect(),
        })
    }

    fn make_loader(&self) -> Result<HeadlessLoader> {
        Ok(HeadlessLoader)
    }

    fn make_env(&self, _scene: &Arc<HeadlessScene>, _fov: f32, _near: f32, _far: f32) -> HeadlessEnv {
        HeadlessEnv::default()
    }

    fn render(&self, group: u32, _envs: &[HeadlessEnv]) {
        self.frames[group as usize].fetch_add(1, Ordering::Relaxed);
    }

    fn wait_for_frame(&self, _group: u32) {}

    fn color_buffer(&self, _group: u32) -> *mut c_void {
        std::ptr::null_mut()
    }

    fn depth_buffer(&self, _group: u32) -> *mut c_void {
        std::ptr::null_mut()
    }

    fn frame_semaphore(&self, _group: u32) -> *mut c_void {
        std::ptr::null_mut()
    }
}
