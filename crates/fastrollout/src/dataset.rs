//! Episode dataset loading and scene lookup.
//!
//! A dataset directory holds one gzip-compressed JSON file per scene.
//! Files are decompressed and parsed in parallel, then merged in sorted
//! file order so the scene layout is reproducible across runs.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use glam::{Quat, Vec3};
use rayon::prelude::*;
use serde::Deserialize;

use crate::{Result, RolloutError};

const DATA_SUFFIX: &str = ".json.gz";

/// A (start pose, goal) pair anchored to one scene.
#[derive(Clone, Copy, Debug)]
pub struct Episode {
    pub start_position: Vec3,
    pub start_rotation: Quat,
    pub goal: Vec3,
}

/// Scene metadata: its episode span and resolved asset paths.
#[derive(Clone, Debug)]
pub struct SceneRecord {
    pub first_episode: u32,
    pub num_episodes: u32,
    pub mesh_path: PathBuf,
    pub navmesh_path: PathBuf,
}

/// Immutable episode store, indexed by scene. Shared by every thread.
#[derive(Debug)]
pub struct Dataset {
    episodes: Vec<Episode>,
    scenes: Vec<SceneRecord>,
}

#[derive(Deserialize)]
struct JsonGoal {
    position: [f32; 3],
}

#[derive(Deserialize)]
struct JsonEpisode {
    scene_id: String,
    start_position: [f32; 3],
    /// Quaternion as [x, y, z, w]
    start_rotation: [f32; 4],
    goals: Vec<JsonGoal>,
}

#[derive(Deserialize)]
struct JsonFile {
    episodes: Vec<JsonEpisode>,
}

impl Dataset {
    /// Load every `*.json.gz` file under `dataset_dir`.
    ///
    /// `mesh_ext` is the render backend's preferred asset extension; the
    /// navmesh path always swaps the scene-id extension for `navmesh`.
    /// Asset paths resolve relative to `asset_dir`.
    pub fn load(dataset_dir: &Path, asset_dir: &Path, mesh_ext: &str) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dataset_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(DATA_SUFFIX))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(RolloutError::Dataset(format!(
                "no {DATA_SUFFIX} files in {}",
                dataset_dir.display()
            )));
        }

        let parsed: Vec<(String, Vec<Episode>)> = files
            .par_iter()
            .map(|path| load_scene_file(path))
            .collect::<Result<_>>()?;

        let mut episodes = Vec::new();
        let mut scenes = Vec::new();
        for (scene_id, scene_episodes) in parsed {
            if scene_episodes.is_empty() {
                continue;
            }
            let dot = scene_id.rfind('.').ok_or_else(|| {
                RolloutError::Dataset(format!("invalid scene id: {scene_id}"))
            })?;
            let stem = &scene_id[..dot];
            scenes.push(SceneRecord {
                first_episode: episodes.len() as u32,
                num_episodes: scene_episodes.len() as u32,
                mesh_path: asset_dir.join(format!("{stem}.{mesh_ext}")),
                navmesh_path: asset_dir.join(format!("{stem}.navmesh")),
            });
            episodes.extend(scene_episodes);
        }

        tracing::info!(
            scenes = scenes.len(),
            episodes = episodes.len(),
            "dataset loaded"
        );

        Ok(Self { episodes, scenes })
    }

    pub fn num_scenes(&self) -> usize {
        self.scenes.len()
    }

    pub fn num_episodes(&self) -> usize {
        self.episodes.len()
    }

    pub fn episode(&self, idx: u32) -> &Episode {
        &self.episodes[idx as usize]
    }

    /// The episode subsequence belonging to `scene`.
    pub fn episodes(&self, scene: u32) -> &[Episode] {
        let record = &self.scenes[scene as usize];
        let first = record.first_episode as usize;
        &self.episodes[first..first + record.num_episodes as usize]
    }

    /// (first episode index, episode count) for `scene`.
    pub fn episode_span(&self, scene: u32) -> (u32, u32) {
        let record = &self.scenes[scene as usize];
        (record.first_episode, record.num_episodes)
    }

    pub fn mesh_path(&self, scene: u32) -> &Path {
        &self.scenes[scene as usize].mesh_path
    }

    pub fn navmesh_path(&self, scene: u32) -> &Path {
        &self.scenes[scene as usize].navmesh_path
    }

    /// Test constructor bypassing the on-disk format.
    #[cfg(test)]
    pub(crate) fn synthetic(per_scene: Vec<Vec<Episode>>) -> std::sync::Arc<Self> {
        let mut episodes = Vec::new();
        let mut scenes = Vec::new();
        for (idx, scene_episodes) in per_scene.into_iter().enumerate() {
            scenes.push(SceneRecord {
                first_episode: episodes.len() as u32,
                num_episodes: scene_episodes.len() as u32,
                mesh_path: PathBuf::from(format!("scene_{idx}.glb")),
                navmesh_path: PathBuf::from(format!("scene_{idx}.navmesh")),
            });
            episodes.extend(scene_episodes);
        }
        std::sync::Arc::new(Self { episodes, scenes })
    }
}

fn load_scene_file(path: &Path) -> Result<(String, Vec<Episode>)> {
    let file = File::open(path)?;
    let mut raw = String::new();
    GzDecoder::new(file).read_to_string(&mut raw)?;
    let parsed: JsonFile = serde_json::from_str(&raw)?;

    let mut scene_id = String::new();
    let mut episodes = Vec::with_capacity(parsed.episodes.len());
    for episode in parsed.episodes {
        if scene_id.is_empty() {
            scene_id = episode.scene_id.clone();
        } else if scene_id != episode.scene_id {
            return Err(RolloutError::Dataset(format!(
                "{}: episode file mixes scenes {scene_id} and {}",
                path.display(),
                episode.scene_id
            )));
        }

        let goal = episode.goals.first().ok_or_else(|| {
            RolloutError::Dataset(format!("{}: episode without goals", path.display()))
        })?;
        let [x, y, z, w] = episode.start_rotation;
        episodes.push(Episode {
            start_position: Vec3::from_array(episode.start_position),
            start_rotation: Quat::from_xyzw(x, y, z, w),
            goal: Vec3::from_array(goal.position),
        });
    }

    Ok((scene_id, episodes))
}
