//! Runs a goto scenario described in a JSON file and logs what the mover does.
//!
//! ```sh
//! RUST_LOG=beamnav=debug cargo run -p headless_scene -- scenes/headless/assets/detour.json
//! ```

use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use beamnav::{
    CrashMode, FlatTerrain, FrameContext, GoalMode, GotoConfig, GotoTask, KinematicMover,
    MoverKind, ObjectKind, Progress, World, WorldObject,
};
use glam::Vec3;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("scenes/headless/assets/detour.json"));
    let file = fs::read_to_string(&path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&file)
        .with_context(|| format!("failed to parse scenario {}", path.display()))?;
    info!("Loaded {}: {}", path.display(), scenario.description);

    run(scenario)
}

fn run(scenario: Scenario) -> Result<()> {
    let mut world = World::with_key();
    for object in &scenario.objects {
        let mut world_object =
            WorldObject::new(object.kind, object.position).with_rotation(object.rotation_y);
        for sphere in &object.spheres {
            world_object = world_object.with_sphere(sphere.offset, sphere.radius);
        }
        world.insert(world_object);
    }

    let mut mover = KinematicMover::new(scenario.mover.kind, scenario.mover.position);
    mover.rotation_y = scenario.mover.rotation_y;
    mover.radius = scenario.mover.radius;

    let terrain = scenario.terrain;
    let mut task = GotoTask::new(scenario.config, None);
    task.start(
        &mut FrameContext {
            mover: &mut mover,
            world: &world,
            terrain: &terrain,
        },
        scenario.goal,
        scenario.altitude,
        scenario.goal_mode,
        scenario.crash_mode,
    )?;

    let mut phase = task.phase();
    for frame in 0..scenario.max_frames {
        let mut ctx = FrameContext {
            mover: &mut mover,
            world: &world,
            terrain: &terrain,
        };
        task.event_process(&mut ctx, scenario.dt);
        mover.step(scenario.dt, &terrain);
        let mut ctx = FrameContext {
            mover: &mut mover,
            world: &world,
            terrain: &terrain,
        };
        match task.is_ended(&mut ctx) {
            Ok(Progress::Continue) => {
                if task.phase() != phase {
                    phase = task.phase();
                    info!(frame, position = ?mover.position, "Entered {phase:?}");
                }
            }
            Ok(Progress::Stop) => {
                info!(
                    frame,
                    position = ?mover.position,
                    "Arrived {} away from the goal",
                    mover.position.distance(scenario.goal)
                );
                return Ok(());
            }
            Err(error) => {
                warn!(frame, position = ?mover.position, "Gave up: {error}");
                return Err(error.into());
            }
        }
    }
    bail!(
        "still moving after {} frames, at {}",
        scenario.max_frames,
        mover.position
    )
}

#[derive(Debug, Deserialize)]
struct Scenario {
    description: String,
    #[serde(default)]
    terrain: FlatTerrain,
    #[serde(default)]
    config: GotoConfig,
    mover: MoverData,
    #[serde(default)]
    objects: Vec<ObjectData>,
    goal: Vec3,
    #[serde(default)]
    altitude: f32,
    #[serde(default)]
    goal_mode: Option<GoalMode>,
    #[serde(default)]
    crash_mode: Option<CrashMode>,
    dt: f32,
    max_frames: usize,
}

#[derive(Debug, Deserialize)]
struct MoverData {
    kind: MoverKind,
    position: Vec3,
    #[serde(default)]
    rotation_y: f32,
    radius: f32,
}

#[derive(Debug, Deserialize)]
struct ObjectData {
    kind: ObjectKind,
    position: Vec3,
    #[serde(default)]
    rotation_y: f32,
    #[serde(default)]
    spheres: Vec<SphereData>,
}

#[derive(Debug, Deserialize)]
struct SphereData {
    offset: Vec3,
    radius: f32,
}
