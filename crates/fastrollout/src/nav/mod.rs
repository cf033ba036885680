//! Navigation-mesh query interface.
//!
//! The external navmesh library answers snap-to-surface and
//! shortest-path queries through the [`PathFinder`] trait. Query state
//! is scratch-mutating and not thread safe, so every thread owns its own
//! instances (see [`PathFinderSet`]).

mod plane;

pub use plane::PlanePathFinder;

use std::path::Path;
use std::sync::Arc;

use glam::Vec3;

use crate::dataset::Dataset;
use crate::Result;

/// A point snapped onto the walkable surface of a navmesh.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NavPoint {
    position: Vec3,
}

impl NavPoint {
    pub fn new(position: Vec3) -> Self {
        Self { position }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

/// Thin handle over the external navmesh library.
pub trait PathFinder: Sized + 'static {
    /// Load the mesh behind this finder. Failure is fatal upstream.
    fn from_file(path: &Path) -> Result<Self>;

    /// Snap a world-space point onto the walkable surface.
    fn snap_point(&mut self, point: Vec3) -> NavPoint;

    /// Shortest-path length between two snapped points. Returns whatever
    /// the library reports when no path exists.
    fn geodesic_distance(&mut self, start: &NavPoint, end: &NavPoint) -> f32;

    /// Attempt a straight-line move from `from` toward `target`,
    /// returning the (possibly shortened) reachable point.
    fn try_step(&mut self, from: &NavPoint, target: Vec3) -> NavPoint;
}

/// One pathfinder per dataset scene, owned by a single thread.
///
/// Instances are built on the first query for their scene and reused for
/// the lifetime of the thread.
pub struct PathFinderSet<P> {
    dataset: Arc<Dataset>,
    finders: Vec<Option<P>>,
}

impl<P: PathFinder> PathFinderSet<P> {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        let finders = (0..dataset.num_scenes()).map(|_| None).collect();
        Self { dataset, finders }
    }

    pub fn get(&mut self, scene: u32) -> &mut P {
        let slot = &mut self.finders[scene as usize];
        if slot.is_none() {
            let path = self.dataset.navmesh_path(scene);
            match P::from_file(path) {
                Ok(finder) => *slot = Some(finder),
                Err(err) => {
                    tracing::error!(path = %path.display(), %err, "navmesh load failed");
                    panic!("failed to load navmesh {}: {err}", path.display());
                }
            }
        }
        slot.as_mut().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Episode;
    use glam::Quat;

    #[test]
    fn test_pathfinder_set_builds_lazily() {
        let episode = Episode {
            start_position: Vec3::ZERO,
            start_rotation: Quat::IDENTITY,
            goal: Vec3::X,
        };
        let dataset = Dataset::synthetic(vec![vec![episode], vec![episode]]);
        let mut set = PathFinderSet::<PlanePathFinder>::new(dataset);

        let a = set.get(1);
        let snapped = a.snap_point(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(snapped.position(), Vec3::new(1.0, 0.0, 3.0));
        assert!(set.finders[0].is_none());
        set.get(0);
        assert!(set.finders[0].is_some());
    }
}
