//! Open-ground-plane pathfinder for headless runs and tests.

use std::path::Path;

use glam::Vec3;

use super::{NavPoint, PathFinder};
use crate::Result;

/// Unbounded flat walkable plane at y = 0.
///
/// Snapping projects onto the plane, every straight-line move succeeds,
/// and geodesic distance degenerates to Euclidean distance.
pub struct PlanePathFinder;

impl PathFinder for PlanePathFinder {
    fn from_file(_path: &Path) -> Result<Self> {
        // The plane carries no data; the navmesh path is ignored.
        Ok(Self)
    }

    fn snap_point(&mut self, point: Vec3) -> NavPoint {
        NavPoint::new(Vec3::new(point.x, 0.0, point.z))
    }

    fn geodesic_distance(&mut self, start: &NavPoint, end: &NavPoint) -> f32 {
        (end.position() - start.position()).length()
    }

    fn try_step(&mut self, _from: &NavPoint, target: Vec3) -> NavPoint {
        self.snap_point(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_queries() {
        let mut nav = PlanePathFinder;
        let a = nav.snap_point(Vec3::new(0.0, 1.5, 0.0));
        let b = nav.snap_point(Vec3::new(3.0, -2.0, 4.0));
        assert_eq!(a.position().y, 0.0);
        assert_eq!(nav.geodesic_distance(&a, &b), 5.0);

        let stepped = nav.try_step(&a, Vec3::new(1.0, 9.0, 0.0));
        assert_eq!(stepped.position(), Vec3::new(1.0, 0.0, 0.0));
    }
}
