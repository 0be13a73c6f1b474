use crate::LeakPolicy;
#[cfg(feature = "bevy_reflect")]
use bevy_reflect::prelude::*;

/// Tuning of a [`GotoTask`](crate::GotoTask). The [`Default`] values are the ones the
/// movers were balanced against.
///
/// Distances are in world units (wu), grid sizes in cells. The obstacle grid is a square
/// centered on the world origin, `world_extent` wide, with cells of `cell_size`.
///
/// > Note:
/// >
/// > The beam search explores `1 + 2 * subdivisions` branches per node. Raising
/// > `subdivisions` finds paths through tighter gaps but multiplies the work done per frame
/// > until `iteration_budget` is reached.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
#[cfg_attr(
    all(feature = "serialize", feature = "bevy_reflect"),
    reflect(Serialize, Deserialize)
)]
pub struct GotoConfig {
    /// The width and depth of one obstacle cell. `[Limit: > 0] [Units: wu]`
    pub cell_size: f32,

    /// The width and depth of the square world covered by the obstacle grid. `[Limit: > 0] [Units: wu]`
    ///
    /// Must be a whole multiple of [`GotoConfig::cell_size`]. Cells outside of it count as blocked.
    pub world_extent: f32,

    /// Number of cells rasterized around a queried cell that lies outside of the
    /// already rasterized rectangle. `[Limit: >= 0] [Units: cells]`
    pub terrain_margin: i32,

    /// Divides the straight-line distance to get the search step. `[Limit: > 0]`
    pub beam_accuracy: f32,

    /// Smallest search step, as a multiple of the cell size. `[Limit: > 0] [Units: cells]`
    pub min_step_cells: f32,

    /// Largest search step. `[Limit: >= min step] [Units: wu]`
    pub max_step: f32,

    /// Largest deviation from the direct heading tried at each search node. `[Limit: 0 < value < π] [Units: Radians]`
    pub half_spread: f32,

    /// Number of angular steps between the direct heading and [`GotoConfig::half_spread`], per side. `[Limit: > 0]`
    pub subdivisions: u16,

    /// Branches evaluated per frame before the search yields. `[Limit: > 0]`
    pub iteration_budget: u32,

    /// Capacity of the waypoint path, including the start and the final point. `[Limit: >= 3]`
    pub max_waypoints: usize,

    /// Added to the sum of obstacle and mover radius when rasterizing objects. `[Limit: >= 0] [Units: wu]`
    pub safety_margin: f32,

    /// Radius cleared around the mover before its first search frame. `[Limit: >= 0] [Units: cells]`
    pub start_clearance_cells: f32,

    /// A mover covering less than this in [`GotoConfig::watchdog_time`] while commanded forward is stuck. `[Units: wu]`
    pub watchdog_distance: f32,

    /// How long a mover may be stuck before the path is planned again. `[Units: s]`
    pub watchdog_time: f32,

    /// Flyers asked to go farther than this at ground level cruise at [`GotoConfig::default_altitude`] instead. `[Units: wu]`
    pub fly_ground_distance: f32,

    /// Cruise altitude above the floor for long flights. `[Units: wu]`
    pub default_altitude: f32,

    /// Beam requests closer than this fall back to turn-and-retry collision recovery. `[Units: wu]`
    pub min_beam_distance: f32,

    /// Pause after a collision before turning away. `[Units: s]`
    pub collision_wait: f32,

    /// Distance driven after the first recovery turn. `[Units: wu]`
    pub first_recovery_distance: f32,

    /// Distance driven after the second recovery turn. `[Units: wu]`
    pub second_recovery_distance: f32,

    /// Distances kept from objects a mover approaches to pick something up.
    pub take: TakeDistances,

    /// How a mover that starts overlapping an obstacle gets clear of it.
    pub leak: LeakPolicy,
}

impl Default for GotoConfig {
    fn default() -> Self {
        Self {
            cell_size: 5.0,
            world_extent: 3200.0,
            terrain_margin: 10,
            beam_accuracy: 5.0,
            min_step_cells: 2.1,
            max_step: 20.0,
            half_spread: 165.0_f32.to_radians(),
            subdivisions: 22,
            iteration_budget: 200,
            max_waypoints: 500,
            safety_margin: 1.5,
            start_clearance_cells: 1.8,
            watchdog_distance: 1.0,
            watchdog_time: 1.0,
            fly_ground_distance: 80.0,
            default_altitude: 50.0,
            min_beam_distance: 10.0,
            collision_wait: 1.0,
            first_recovery_distance: 5.0,
            second_recovery_distance: 10.0,
            take: TakeDistances::default(),
            leak: LeakPolicy::default(),
        }
    }
}

impl GotoConfig {
    /// The step length used by a search over `distance`.
    pub fn search_step(&self, distance: f32) -> f32 {
        let min_step = self.cell_size * self.min_step_cells;
        (distance / self.beam_accuracy)
            .min(self.max_step)
            .max(min_step)
    }

    /// Angle between two neighboring search branches.
    #[inline]
    pub fn branch_angle(&self) -> f32 {
        self.half_spread / self.subdivisions as f32
    }
}

/// Distances kept from objects a mover means to take something from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
pub struct TakeDistances {
    /// Distance between a mover and what it grabs with its arm. `[Units: wu]`
    pub arm: f32,
    /// Extra distance for buildings whose slot sits on their far side. `[Units: wu]`
    pub other_arm: f32,
}

impl Default for TakeDistances {
    fn default() -> Self {
        Self {
            arm: 6.0,
            other_arm: 1.5,
        }
    }
}
