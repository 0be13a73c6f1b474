//! Rasterization of terrain and objects into an [`ObstacleField`].

use glam::IVec2;

use crate::{
    Cell, CellRect, ObjectKey, ObjectKind, ObstacleField, Plane, Terrain, TerrainRules, World,
    math::planar,
};

/// Vertical half-height of the band in which objects block a mover. `[Units: wu]`
const OBJECT_BAND: f32 = 8.0;
/// Lightning rods are thinner than their collision sphere suggests. `[Units: wu]`
const LIGHTNING_ROD_SHRINK: f32 = 2.0;

/// Describes which objects block a mover, for [`ObstacleField::rasterize_objects`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectRasterization {
    /// The mover itself, never an obstacle to itself.
    pub mover: Option<ObjectKey>,
    /// The object being approached, if it is to be reached rather than avoided.
    pub target: Option<ObjectKey>,
    /// Collision radius of the mover.
    pub mover_radius: f32,
    /// Extra clearance around every obstacle.
    pub safety_margin: f32,
    /// Cruise altitude above the floor for flying movers, `None` for movers on the ground.
    pub altitude: Option<f32>,
}

impl ObstacleField {
    /// Rasterizes the terrain inside `[min, max]` that is not known yet.
    ///
    /// The known rectangle grows to the bounding box of itself and the request, so any
    /// cell between the two is rasterized as well.
    pub(crate) fn rasterize_terrain(&mut self, terrain: &dyn Terrain, min: Cell, max: Cell) {
        let grid_max = IVec2::splat(self.size() - 1);
        let requested = CellRect {
            min: min.min(max).clamp(IVec2::ZERO, grid_max),
            max: max.max(min).clamp(IVec2::ZERO, grid_max),
        };
        let previous = self.known_rect();
        let target = previous.map_or(requested, |known| known.union(&requested));
        if previous == Some(target) {
            return;
        }

        let rules = self.rules();
        for z in target.min.y..=target.max.y {
            for x in target.min.x..=target.max.x {
                let cell = IVec2::new(x, z);
                if previous.is_some_and(|known| known.contains(cell)) {
                    continue;
                }
                self.rasterize_terrain_cell(terrain, rules, cell);
            }
        }
        self.set_known_rect(target);
    }

    fn rasterize_terrain_cell(&mut self, terrain: &dyn Terrain, rules: TerrainRules, cell: Cell) {
        let point = self.cell_center(cell);
        self.count_terrain_sample();

        if rules.flying {
            let floor = terrain.floor_level(point);
            if floor >= terrain.flying_max_height() - TerrainRules::CEILING_CLEARANCE {
                self.set_dot(Plane::Blocking, cell);
            }
            return;
        }

        if !rules.submersible {
            let floor = terrain.floor_level(point);
            if floor < terrain.water_level() - TerrainRules::WATER_DEPTH_TOLERANCE {
                // One extra cell of dilation around deep water.
                self.set_circle(point, self.cell_size());
                return;
            }
        }

        if terrain.fine_slope(point) > rules.slope_limit {
            self.set_dot(Plane::Blocking, cell);
        }
    }

    /// Blocks a disk around every collision sphere that stands in the mover's way.
    ///
    /// Skips the mover itself, the approached target, and objects that are inactive or
    /// carried by someone. Only spheres reaching into the vertical band of the mover count:
    /// flyers check a band around their cruise altitude, ground movers everything that is
    /// not floating above the band.
    pub fn rasterize_objects(
        &mut self,
        world: &World,
        terrain: &dyn Terrain,
        rasterization: &ObjectRasterization,
    ) {
        for (key, object) in world {
            if Some(key) == rasterization.mover || Some(key) == rasterization.target {
                continue;
            }
            if !object.active || object.is_transported() {
                continue;
            }

            let floor = terrain.floor_level(planar(object.position));
            let band_center = floor + rasterization.altitude.unwrap_or(0.0);

            for sphere in &object.crash_spheres {
                let bottom = sphere.center.y - sphere.radius;
                let top = sphere.center.y + sphere.radius;
                if bottom > band_center + OBJECT_BAND {
                    continue;
                }
                if rasterization.altitude.is_some() && top < band_center - OBJECT_BAND {
                    continue;
                }

                let mut radius = sphere.radius;
                if object.kind == ObjectKind::LightningRod {
                    radius -= LIGHTNING_ROD_SHRINK;
                }
                self.set_circle(
                    planar(sphere.center),
                    radius + rasterization.mover_radius + rasterization.safety_margin,
                );
            }
        }
    }
}
