use glam::{Vec2, Vec3};

/// Read access to the terrain a mover drives on.
///
/// Positions are planar `(x, z)` unless stated otherwise.
pub trait Terrain {
    /// Height of the floor at a point.
    fn floor_level(&self, point: Vec2) -> f32;

    /// Steepness of the floor at a point. `[Units: Radians]`
    fn fine_slope(&self, point: Vec2) -> f32;

    /// Highest altitude anything can fly at.
    fn flying_max_height(&self) -> f32;

    /// Height of the water surface.
    fn water_level(&self) -> f32;

    /// Height of a world position above the floor under it.
    fn height_to_floor(&self, position: Vec3) -> f32 {
        position.y - self.floor_level(Vec2::new(position.x, position.z))
    }
}

/// A level plane, for tests and headless runs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct FlatTerrain {
    /// Height of the floor everywhere.
    pub floor: f32,
    /// Height of the water surface.
    pub water_level: f32,
    /// Flying ceiling.
    pub flying_max_height: f32,
}

impl Default for FlatTerrain {
    fn default() -> Self {
        Self {
            floor: 0.0,
            water_level: -100.0,
            flying_max_height: 280.0,
        }
    }
}

impl Terrain for FlatTerrain {
    fn floor_level(&self, _point: Vec2) -> f32 {
        self.floor
    }

    fn fine_slope(&self, _point: Vec2) -> f32 {
        0.0
    }

    fn flying_max_height(&self) -> f32 {
        self.flying_max_height
    }

    fn water_level(&self) -> f32 {
        self.water_level
    }
}
