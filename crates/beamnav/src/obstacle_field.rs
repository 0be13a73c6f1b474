//! The [`ObstacleField`] is a two-plane bit grid over world space.
//!
//! The [`Plane::Blocking`] plane holds cells the mover cannot enter. The [`Plane::Scratch`]
//! plane holds corridor marks left by the beam search while it validates legs.

use glam::{IVec2, Vec2, Vec3};
use thiserror::Error;

use crate::{
    Cell, Terrain, TerrainRules,
    math::{floor_cell, planar},
};

/// One of the two bit planes of an [`ObstacleField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    /// Cells blocked by terrain or objects.
    Blocking,
    /// Corridor marks of the current search.
    Scratch,
}

impl Plane {
    #[inline]
    fn index(self) -> usize {
        match self {
            Plane::Blocking => 0,
            Plane::Scratch => 1,
        }
    }
}

/// An inclusive rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    /// Lowest cell, inclusive.
    pub min: Cell,
    /// Highest cell, inclusive.
    pub max: Cell,
}

impl CellRect {
    /// Whether the rectangle contains the cell.
    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        cell.cmpge(self.min).all() && cell.cmple(self.max).all()
    }

    /// The smallest rectangle containing both.
    #[inline]
    pub fn union(&self, other: &CellRect) -> CellRect {
        CellRect {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Rasterized obstacles around one mover, for one navigation request.
///
/// Build with [`ObstacleFieldBuilder`].
#[derive(Debug, Clone)]
pub struct ObstacleField {
    /// Width and depth of one cell.
    cell_size: f32,
    /// World coordinate of the lower edge of cell 0 on both axes.
    origin: f32,
    /// Number of cells along each axis.
    size: i32,
    /// Cells rasterized around a queried cell outside of the known rectangle.
    terrain_margin: i32,
    /// Floor accepted by the mover.
    rules: TerrainRules,
    /// One bit per cell and plane.
    planes: [Vec<u64>; 2],
    /// Cells whose terrain is already rasterized.
    known: Option<CellRect>,
    /// Number of cells whose terrain was sampled so far.
    terrain_samples: usize,
}

impl ObstacleField {
    /// Width and depth of one cell.
    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of cells along each axis.
    #[inline]
    pub fn size(&self) -> i32 {
        self.size
    }

    /// The rectangle whose terrain is rasterized, `None` while it is empty.
    #[inline]
    pub fn known_rect(&self) -> Option<CellRect> {
        self.known
    }

    /// How many cells had their terrain sampled since the field was opened.
    #[inline]
    pub fn terrain_samples(&self) -> usize {
        self.terrain_samples
    }

    /// The terrain acceptance this field rasterizes with.
    #[inline]
    pub fn rules(&self) -> TerrainRules {
        self.rules
    }

    #[inline]
    pub(crate) fn set_known_rect(&mut self, rect: CellRect) {
        self.known = Some(rect);
    }

    #[inline]
    pub(crate) fn count_terrain_sample(&mut self) {
        self.terrain_samples += 1;
    }

    /// Clears both planes and forgets the rasterized terrain.
    pub fn clear(&mut self) {
        for plane in &mut self.planes {
            plane.fill(0);
        }
        self.known = None;
        self.terrain_samples = 0;
    }

    /// Clears the scratch plane only.
    pub fn clear_scratch(&mut self) {
        self.planes[Plane::Scratch.index()].fill(0);
    }

    /// The cell containing a planar world position.
    #[inline]
    pub fn cell_at(&self, point: Vec2) -> Cell {
        IVec2::new(
            floor_cell(point.x, self.origin, self.cell_size),
            floor_cell(point.y, self.origin, self.cell_size),
        )
    }

    /// The planar world position of a cell's center.
    #[inline]
    pub fn cell_center(&self, cell: Cell) -> Vec2 {
        (cell.as_vec2() + 0.5) * self.cell_size + self.origin
    }

    /// Whether the cell lies on the grid.
    #[inline]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.size && cell.y < self.size
    }

    #[inline]
    fn bit(&self, cell: Cell) -> (usize, u64) {
        let index = cell.x as usize + cell.y as usize * self.size as usize;
        (index / 64, 1 << (index % 64))
    }

    /// Whether a cell is set, rasterizing the terrain around it first if needed.
    ///
    /// Cells off the grid count as set.
    pub fn test_dot(&mut self, terrain: &dyn Terrain, plane: Plane, cell: Cell) -> bool {
        if !self.in_bounds(cell) {
            return true;
        }
        if !self.known.is_some_and(|known| known.contains(cell)) {
            let margin = IVec2::splat(self.terrain_margin);
            self.rasterize_terrain(terrain, cell - margin, cell + margin);
        }
        self.is_set(plane, cell)
    }

    /// Whether a cell is set, without rasterizing anything. Cells off the grid count as set.
    #[inline]
    pub fn is_set(&self, plane: Plane, cell: Cell) -> bool {
        if !self.in_bounds(cell) {
            return true;
        }
        let (word, mask) = self.bit(cell);
        self.planes[plane.index()][word] & mask != 0
    }

    /// Sets a cell. Does nothing for cells off the grid.
    #[inline]
    pub fn set_dot(&mut self, plane: Plane, cell: Cell) {
        if !self.in_bounds(cell) {
            return;
        }
        let (word, mask) = self.bit(cell);
        self.planes[plane.index()][word] |= mask;
    }

    /// Clears a cell. Does nothing for cells off the grid.
    #[inline]
    pub fn clear_dot(&mut self, plane: Plane, cell: Cell) {
        if !self.in_bounds(cell) {
            return;
        }
        let (word, mask) = self.bit(cell);
        self.planes[plane.index()][word] &= !mask;
    }

    /// Blocks a disk of cells around a world position.
    pub fn set_circle(&mut self, center: Vec2, radius: f32) {
        for cell in disk(self.cell_at(center), radius / self.cell_size) {
            self.set_dot(Plane::Blocking, cell);
        }
    }

    /// Unblocks a disk of cells around a world position.
    pub fn clear_circle(&mut self, center: Vec2, radius: f32) {
        for cell in disk(self.cell_at(center), radius / self.cell_size) {
            self.clear_dot(Plane::Blocking, cell);
        }
    }

    /// Extends the rasterized terrain to cover the rectangle spanned by two world positions,
    /// plus the terrain margin.
    pub fn rasterize_terrain_between(&mut self, terrain: &dyn Terrain, a: Vec3, b: Vec3) {
        let margin = IVec2::splat(self.terrain_margin);
        let a = self.cell_at(planar(a));
        let b = self.cell_at(planar(b));
        self.rasterize_terrain(terrain, a.min(b) - margin, a.max(b) + margin);
    }
}

/// Cells whose distance to `center`, in cells, is at most `radius`.
fn disk(center: Cell, radius: f32) -> impl Iterator<Item = Cell> {
    let reach = radius.max(0.0) as i32;
    (-reach..=reach)
        .flat_map(move |z| (-reach..=reach).map(move |x| IVec2::new(x, z)))
        .filter(move |offset| offset.as_vec2().length() <= radius)
        .map(move |offset| center + offset)
}

/// A builder for [`ObstacleField`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleFieldBuilder {
    /// Width and depth of one cell. `[Limit: > 0]`
    pub cell_size: f32,
    /// Width and depth of the square world, centered on the origin. `[Limit: multiple of cell_size]`
    pub world_extent: f32,
    /// Cells rasterized around a queried cell outside of the known rectangle.
    pub terrain_margin: i32,
    /// Floor accepted by the mover.
    pub rules: TerrainRules,
}

impl ObstacleFieldBuilder {
    /// The largest number of cells along one axis.
    pub const MAX_SIZE: i32 = 1 << 14;

    /// Allocates an empty field.
    pub fn build(self) -> Result<ObstacleField, ObstacleFieldBuilderError> {
        if self.cell_size.is_nan() || self.cell_size <= 0.0 {
            return Err(ObstacleFieldBuilderError::InvalidCellSize {
                cell_size: self.cell_size,
            });
        }
        let cells = self.world_extent / self.cell_size;
        if cells.is_nan() || cells < 1.0 || (cells - cells.round()).abs() > 1e-3 {
            return Err(ObstacleFieldBuilderError::ExtentNotMultipleOfCellSize {
                world_extent: self.world_extent,
                cell_size: self.cell_size,
            });
        }
        let size = cells.round();
        if size > Self::MAX_SIZE as f32 {
            return Err(ObstacleFieldBuilderError::TooManyCells {
                size: size as u64,
                max: Self::MAX_SIZE,
            });
        }
        let size = size as i32;
        let words = (size as usize * size as usize).div_ceil(64);
        Ok(ObstacleField {
            cell_size: self.cell_size,
            origin: -self.world_extent * 0.5,
            size,
            terrain_margin: self.terrain_margin.max(0),
            rules: self.rules,
            planes: [vec![0; words], vec![0; words]],
            known: None,
            terrain_samples: 0,
        })
    }
}

/// Errors that can occur when building an [`ObstacleField`] with [`ObstacleFieldBuilder::build`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObstacleFieldBuilderError {
    /// The cell size is zero, negative or not a number.
    #[error("cell size must be positive, got {cell_size}")]
    InvalidCellSize {
        /// The rejected cell size.
        cell_size: f32,
    },
    /// The world extent does not split into whole cells.
    #[error("world extent {world_extent} is not a positive multiple of the cell size {cell_size}")]
    ExtentNotMultipleOfCellSize {
        /// The rejected world extent.
        world_extent: f32,
        /// The cell size it was checked against.
        cell_size: f32,
    },
    /// The grid would be too large.
    #[error("grid of {size}x{size} cells exceeds the maximum of {max}x{max}")]
    TooManyCells {
        /// Cells along one axis.
        size: u64,
        /// Maximum cells along one axis.
        max: i32,
    },
}

#[cfg(test)]
mod tests {
    use std::cell::Cell as Counter;

    use super::*;
    use crate::FlatTerrain;

    fn rules() -> TerrainRules {
        TerrainRules {
            slope_limit: 20.0_f32.to_radians(),
            submersible: false,
            flying: false,
        }
    }

    fn field() -> ObstacleField {
        ObstacleFieldBuilder {
            cell_size: 5.0,
            world_extent: 100.0,
            terrain_margin: 2,
            rules: rules(),
        }
        .build()
        .unwrap()
    }

    /// Flat terrain that counts how often it is sampled.
    struct CountingTerrain {
        samples: Counter<usize>,
    }

    impl Terrain for CountingTerrain {
        fn floor_level(&self, _point: Vec2) -> f32 {
            0.0
        }

        fn fine_slope(&self, _point: Vec2) -> f32 {
            self.samples.set(self.samples.get() + 1);
            0.0
        }

        fn flying_max_height(&self) -> f32 {
            100.0
        }

        fn water_level(&self) -> f32 {
            -10.0
        }
    }

    #[test]
    fn rejects_bad_dimensions() {
        let mut builder = ObstacleFieldBuilder {
            cell_size: 0.0,
            world_extent: 100.0,
            terrain_margin: 2,
            rules: rules(),
        };
        assert!(matches!(
            builder.build(),
            Err(ObstacleFieldBuilderError::InvalidCellSize { .. })
        ));
        builder.cell_size = 3.0;
        assert!(matches!(
            builder.build(),
            Err(ObstacleFieldBuilderError::ExtentNotMultipleOfCellSize { .. })
        ));
        builder.cell_size = 0.5;
        builder.world_extent = 10000.0;
        assert!(matches!(
            builder.build(),
            Err(ObstacleFieldBuilderError::TooManyCells { .. })
        ));
    }

    #[test]
    fn maps_world_positions_to_cells() {
        let field = field();
        assert_eq!(field.size(), 20);
        assert_eq!(field.cell_at(Vec2::new(-50.0, -50.0)), IVec2::new(0, 0));
        assert_eq!(field.cell_at(Vec2::new(0.0, 0.0)), IVec2::new(10, 10));
        assert_eq!(field.cell_at(Vec2::new(-0.1, 4.9)), IVec2::new(9, 10));
        assert_eq!(field.cell_at(Vec2::new(-50.1, 0.0)), IVec2::new(-1, 10));
        assert_eq!(field.cell_center(IVec2::new(10, 10)), Vec2::new(2.5, 2.5));
    }

    #[test]
    fn dots_off_the_grid_are_ignored_and_blocked() {
        let mut field = field();
        let terrain = FlatTerrain::default();
        field.set_dot(Plane::Blocking, IVec2::new(-1, 3));
        field.clear_dot(Plane::Blocking, IVec2::new(20, 3));
        assert!(field.test_dot(&terrain, Plane::Blocking, IVec2::new(-1, 3)));
        assert!(field.test_dot(&terrain, Plane::Scratch, IVec2::new(3, 20)));
    }

    #[test]
    fn planes_are_independent() {
        let mut field = field();
        let terrain = FlatTerrain::default();
        let cell = IVec2::new(4, 7);
        field.set_dot(Plane::Scratch, cell);
        assert!(field.test_dot(&terrain, Plane::Scratch, cell));
        assert!(!field.test_dot(&terrain, Plane::Blocking, cell));
        field.clear_scratch();
        assert!(!field.test_dot(&terrain, Plane::Scratch, cell));
    }

    #[test]
    fn circles_cover_a_disk_of_cells() {
        let mut field = field();
        field.set_circle(Vec2::new(2.5, 2.5), 10.0);
        let center = IVec2::new(10, 10);
        assert!(field.is_set(Plane::Blocking, center));
        assert!(field.is_set(Plane::Blocking, center + IVec2::new(2, 0)));
        assert!(field.is_set(Plane::Blocking, center + IVec2::new(1, 1)));
        assert!(!field.is_set(Plane::Blocking, center + IVec2::new(2, 1)));
        assert!(!field.is_set(Plane::Blocking, center + IVec2::new(3, 0)));

        field.clear_circle(Vec2::new(2.5, 2.5), 5.0);
        assert!(!field.is_set(Plane::Blocking, center));
        assert!(!field.is_set(Plane::Blocking, center + IVec2::new(0, 1)));
        assert!(field.is_set(Plane::Blocking, center + IVec2::new(1, 1)));
    }

    #[test]
    fn disks_are_round_and_clipped_at_the_edge() {
        let cells: Vec<Cell> = disk(IVec2::ZERO, 1.5).collect();
        assert_eq!(cells.len(), 9);
        assert_eq!(disk(IVec2::new(4, 4), 0.0).collect::<Vec<_>>(), [IVec2::new(4, 4)]);
        assert_eq!(disk(IVec2::ZERO, -1.0).count(), 0);

        let mut field = field();
        field.set_circle(Vec2::new(-47.5, -47.5), 10.0);
        assert!(field.is_set(Plane::Blocking, IVec2::new(0, 0)));
        assert!(field.is_set(Plane::Blocking, IVec2::new(2, 0)));
        field.clear_circle(Vec2::new(-47.5, -47.5), 10.0);
        assert!(!field.is_set(Plane::Blocking, IVec2::new(0, 0)));
    }

    #[test]
    fn terrain_is_rasterized_once_per_cell() {
        let mut field = field();
        let terrain = CountingTerrain {
            samples: Counter::new(0),
        };
        let cell = IVec2::new(10, 10);
        assert!(!field.test_dot(&terrain, Plane::Blocking, cell));
        let first = terrain.samples.get();
        assert_eq!(first, 25);
        assert_eq!(
            field.known_rect(),
            Some(CellRect {
                min: IVec2::new(8, 8),
                max: IVec2::new(12, 12)
            })
        );

        for _ in 0..3 {
            assert!(!field.test_dot(&terrain, Plane::Blocking, cell + IVec2::new(1, -2)));
        }
        assert_eq!(terrain.samples.get(), first);
        assert_eq!(field.terrain_samples(), first);
    }

    #[test]
    fn known_rect_only_grows() {
        let mut field = field();
        let terrain = FlatTerrain::default();
        field.test_dot(&terrain, Plane::Blocking, IVec2::new(3, 3));
        field.test_dot(&terrain, Plane::Blocking, IVec2::new(15, 4));
        let known = field.known_rect().unwrap();
        assert_eq!(known.min, IVec2::new(1, 1));
        assert_eq!(known.max, IVec2::new(17, 6));

        field.rasterize_terrain_between(&terrain, Vec3::ZERO, Vec3::ZERO);
        let grown = field.known_rect().unwrap();
        assert_eq!(grown.min, IVec2::new(1, 1));
        assert_eq!(grown.max, IVec2::new(17, 12));
    }
}
