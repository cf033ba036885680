//! Fixture datasets written to a scratch directory.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;

/// One episode: start position, start rotation (xyzw), goal position.
pub type EpisodeSpec = ([f32; 3], [f32; 4], [f32; 3]);

pub const IDENTITY: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

pub struct Fixture {
    pub dir: PathBuf,
}

impl Fixture {
    /// Write one `.json.gz` file per scene under a fresh scratch dir.
    pub fn new(scenes: &[(&str, &[EpisodeSpec])]) -> Self {
        let dir = std::env::temp_dir().join(format!("fastrollout_it_{}", rand::random::<u32>()));
        std::fs::create_dir_all(&dir).unwrap();

        for (name, episodes) in scenes {
            let entries: Vec<_> = episodes
                .iter()
                .map(|(start, rotation, goal)| {
                    json!({
                        "scene_id": format!("{name}.ply"),
                        "start_position": start,
                        "start_rotation": rotation,
                        "goals": [{"position": goal}],
                    })
                })
                .collect();
            let body = json!({ "episodes": entries }).to_string();

            let file = File::create(dir.join(format!("{name}.json.gz"))).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(body.as_bytes()).unwrap();
            encoder.finish().unwrap();
        }

        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
