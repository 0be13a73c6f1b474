#![doc = include_str!("../../../readme.md")]

mod config;
mod kinematic;
mod leak;
mod line_of_sight;
pub(crate) mod math;
mod obstacle_field;
mod path;
mod profile;
mod rasterize;
mod search;
mod steering;
mod target;
mod task;
mod terrain;
mod world;

pub use config::{GotoConfig, TakeDistances};
pub use kinematic::KinematicMover;
pub use leak::{LeakManeuver, LeakPolicy, LeakReaction, LeakRule, leak_search};
pub use line_of_sight::LineCheck;
pub use math::{Cell, heading_to, heading_vector, planar};
pub use obstacle_field::{
    CellRect, ObstacleField, ObstacleFieldBuilder, ObstacleFieldBuilderError, Plane,
};
pub use path::WaypointPath;
pub use profile::{Capabilities, MoverKind, MoverProfile, RepulsionMargin, TerrainRules};
pub use rasterize::ObjectRasterization;
pub use search::{BeamSearch, SearchError, SearchFrame, SearchProgress};
pub use steering::{RepulsionQuery, compute_repulsion, compute_vertical_repulsion};
pub use target::{Approach, HotPoint, adjust_building, adjust_target, hot_point, search_target};
pub use task::{
    CrashMode, FrameContext, GoalMode, GotoError, GotoTask, Phase, Progress, RecoveryLeg,
};
pub use terrain::{FlatTerrain, Terrain};
pub use world::{CrashSphere, Mover, ObjectKey, ObjectKind, World, WorldObject};
