use glam::Vec2;

use crate::{LineCheck, ObstacleField, Terrain};

/// An ordered list of planar waypoints and a cursor on the one being driven to.
///
/// The cursor only moves forward. Waypoints are never changed once the path exists.
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointPath {
    points: Vec<Vec2>,
    index: usize,
}

impl WaypointPath {
    /// Creates a path with the cursor on the first point.
    pub fn new(points: Vec<Vec2>) -> Self {
        Self { points, index: 0 }
    }

    /// All waypoints, starting with the start position.
    #[inline]
    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    /// Index of the waypoint being driven to.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Index of the final waypoint.
    #[inline]
    pub fn last_index(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// The waypoint being driven to, `None` once the path is done.
    #[inline]
    pub fn current(&self) -> Option<Vec2> {
        self.points.get(self.index).copied()
    }

    /// Whether the cursor is on the final waypoint.
    #[inline]
    pub fn is_on_last(&self) -> bool {
        self.index == self.last_index()
    }

    /// Whether the cursor moved past the final waypoint.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.index > self.last_index()
    }

    /// Moves the cursor onto the final waypoint.
    pub fn jump_to_last(&mut self) {
        self.index = self.last_index();
    }

    /// The farthest waypoint, at least two ahead, reachable in a straight line from the
    /// current one. Falls back to the next waypoint.
    pub fn shortcut(&self, field: &mut ObstacleField, terrain: &dyn Terrain) -> usize {
        let Some(from) = self.current() else {
            return self.index + 1;
        };
        for candidate in (self.index + 2..self.points.len()).rev() {
            if field.test_line(terrain, from, self.points[candidate], LineCheck::Plain) {
                return candidate;
            }
        }
        self.index + 1
    }

    /// Advances the cursor to the [shortcut](Self::shortcut) target. Returns whether the
    /// path is done.
    pub fn advance(&mut self, field: &mut ObstacleField, terrain: &dyn Terrain) -> bool {
        self.index = self.shortcut(field, terrain);
        self.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlatTerrain, MoverKind, MoverProfile, ObstacleFieldBuilder};

    fn field() -> ObstacleField {
        ObstacleFieldBuilder {
            cell_size: 1.0,
            world_extent: 200.0,
            terrain_margin: 10,
            rules: MoverProfile::new(MoverKind::Wheeled).terrain,
        }
        .build()
        .unwrap()
    }

    /// A zig-zag around a block at (10.5, 0.5).
    fn zig_zag() -> WaypointPath {
        WaypointPath::new(vec![
            Vec2::new(0.5, 0.5),
            Vec2::new(5.5, 5.5),
            Vec2::new(10.5, 6.5),
            Vec2::new(15.5, 5.5),
            Vec2::new(20.5, 0.5),
        ])
    }

    #[test]
    fn skips_to_the_farthest_visible_waypoint() {
        let mut field = field();
        let terrain = FlatTerrain::default();
        field.set_circle(Vec2::new(10.5, 0.5), 2.0);
        let mut path = zig_zag();

        // (0.5, 0.5) -> (15.5, 5.5) clears the block, the last point does not.
        assert_eq!(path.shortcut(&mut field, &terrain), 3);
        assert!(!path.advance(&mut field, &terrain));
        assert_eq!(path.index(), 3);
        assert!(!path.advance(&mut field, &terrain));
        assert!(path.is_on_last());
        assert!(path.advance(&mut field, &terrain));
        assert_eq!(path.current(), None);
    }

    #[test]
    fn falls_back_to_the_next_waypoint() {
        let mut field = field();
        let terrain = FlatTerrain::default();
        field.set_circle(Vec2::new(10.5, 3.5), 4.0);
        let mut path = zig_zag();
        path.advance(&mut field, &terrain);
        assert_eq!(path.index(), 1);
        assert_eq!(path.points().len(), 5);
    }

    #[test]
    fn never_touches_the_waypoints() {
        let mut field = field();
        let terrain = FlatTerrain::default();
        let mut path = zig_zag();
        let before = path.points().to_vec();
        path.advance(&mut field, &terrain);
        assert_eq!(path.index(), 4);
        assert_eq!(path.points(), before.as_slice());
    }
}
