//! Whole requests driven frame by frame against a kinematic mover.

use std::f32::consts::{FRAC_PI_2, PI};

use beamnav::{
    CrashMode, FlatTerrain, FrameContext, GotoConfig, GotoError, GotoTask, KinematicMover,
    Mover, MoverKind, ObjectKind, Phase, Progress, RecoveryLeg, World, WorldObject, heading_vector,
};
use glam::{Vec2, Vec3};

const DT: f32 = 0.05;

struct Scene {
    mover: KinematicMover,
    world: World,
    terrain: FlatTerrain,
    task: GotoTask,
}

impl Scene {
    fn new(kind: MoverKind, position: Vec3) -> Self {
        Self::with_config(kind, position, GotoConfig::default())
    }

    fn with_config(kind: MoverKind, position: Vec3, config: GotoConfig) -> Self {
        let mut mover = KinematicMover::new(kind, position);
        mover.radius = 1.0;
        Self {
            mover,
            world: World::with_key(),
            terrain: FlatTerrain::default(),
            task: GotoTask::new(config, None),
        }
    }

    fn start(
        &mut self,
        goal: Vec3,
        altitude: f32,
        crash_mode: Option<CrashMode>,
    ) -> Result<(), GotoError> {
        let mut ctx = FrameContext {
            mover: &mut self.mover,
            world: &self.world,
            terrain: &self.terrain,
        };
        self.task.start(&mut ctx, goal, altitude, None, crash_mode)
    }

    /// Runs one frame: task, then physics, then the poll.
    fn frame(&mut self) -> Result<Progress, GotoError> {
        let mut ctx = FrameContext {
            mover: &mut self.mover,
            world: &self.world,
            terrain: &self.terrain,
        };
        self.task.event_process(&mut ctx, DT);
        self.mover.step(DT, &self.terrain);
        let mut ctx = FrameContext {
            mover: &mut self.mover,
            world: &self.world,
            terrain: &self.terrain,
        };
        self.task.is_ended(&mut ctx)
    }

    /// Runs frames until the request ends, recording every phase it goes through.
    #[track_caller]
    fn run(&mut self, max_frames: usize) -> (Result<Progress, GotoError>, Vec<Phase>) {
        let mut phases: Vec<Phase> = self.task.phase().into_iter().collect();
        for _ in 0..max_frames {
            let outcome = self.frame();
            if let Some(phase) = self.task.phase() {
                if phases.last() != Some(&phase) {
                    phases.push(phase);
                }
            }
            if outcome != Ok(Progress::Continue) {
                return (outcome, phases);
            }
        }
        panic!("request did not end within {max_frames} frames, phases: {phases:?}");
    }

    /// Runs frames until the task enters `phase`.
    #[track_caller]
    fn run_until(&mut self, phase: Phase, max_frames: usize) {
        for _ in 0..max_frames {
            assert_eq!(self.frame(), Ok(Progress::Continue));
            if self.task.phase() == Some(phase) {
                return;
            }
        }
        panic!("never reached {phase:?} within {max_frames} frames");
    }
}

/// Whether two headings point the same way, within a few degrees.
fn same_heading(a: f32, b: f32) -> bool {
    heading_vector(a).dot(heading_vector(b)) > 0.99
}

#[test]
fn empty_field_goes_straight_to_the_goal() {
    let mut scene = Scene::new(MoverKind::Wheeled, Vec3::ZERO);
    scene.start(Vec3::new(100.0, 0.0, 0.0), 0.0, None).unwrap();
    assert_eq!(scene.task.phase(), Some(Phase::Search));

    assert_eq!(scene.frame(), Ok(Progress::Continue));
    let path = scene.task.path().expect("the search should finish in one frame");
    assert_eq!(path.points(), &[Vec2::ZERO, Vec2::new(100.0, 0.0)]);

    let (outcome, phases) = scene.run(1000);
    assert_eq!(outcome, Ok(Progress::Stop));
    assert_eq!(phases.last(), Some(&Phase::Travel));
    assert!(scene.mover.position.distance(Vec3::new(100.0, 0.0, 0.0)) < 1.0);
    assert_eq!(scene.task.phase(), None, "the request is over once reported");
    assert_eq!(scene.frame(), Err(GotoError::NoActiveRequest));
}

#[test]
fn occupied_destination_fails_right_away() {
    let mut scene = Scene::new(MoverKind::Wheeled, Vec3::ZERO);
    scene.world.insert(
        WorldObject::new(
            ObjectKind::Mover(MoverKind::Tracked),
            Vec3::new(50.0, 0.0, 0.0),
        )
        .with_sphere(Vec3::ZERO, 3.0),
    );

    let result = scene.start(Vec3::new(50.0, 0.0, 0.0), 0.0, None);
    assert_eq!(result, Err(GotoError::DestinationOccupied));
    assert!(scene.task.is_active());

    // Reported once more by the poll, without moving, then the task is idle.
    assert_eq!(scene.frame(), Err(GotoError::DestinationOccupied));
    assert_eq!(scene.mover.position, Vec3::ZERO);
    assert!(!scene.task.is_active());
    assert_eq!(scene.frame(), Err(GotoError::NoActiveRequest));
}

#[test]
fn enclosed_goal_is_impossible() {
    let config = GotoConfig {
        world_extent: 100.0,
        ..GotoConfig::default()
    };
    let goal = Vec3::new(27.5, 0.0, 2.5);
    let mut scene = Scene::with_config(MoverKind::Wheeled, Vec3::new(-37.5, 0.0, 2.5), config);
    for i in 0..12 {
        let angle = i as f32 * std::f32::consts::TAU / 12.0;
        let offset = Vec3::new(angle.cos(), 0.0, angle.sin()) * 15.0;
        scene.world.insert(
            WorldObject::new(ObjectKind::Other, goal + offset).with_sphere(Vec3::ZERO, 6.0),
        );
    }

    scene.start(goal, 0.0, None).unwrap();
    let (outcome, phases) = scene.run(10_000);
    assert_eq!(outcome, Err(GotoError::Impossible));
    assert_eq!(phases, vec![Phase::Search]);
    assert_eq!(scene.mover.position, Vec3::new(-37.5, 0.0, 2.5));
}

#[test]
fn stuck_mover_plans_again_once_per_episode() {
    let mut scene = Scene::new(MoverKind::Wheeled, Vec3::ZERO);
    scene.mover.max_speed = 0.0;
    scene.start(Vec3::new(100.0, 0.0, 0.0), 0.0, None).unwrap();

    let mut travelled = false;
    for _ in 0..100 {
        assert_eq!(scene.frame(), Ok(Progress::Continue));
        match scene.task.phase() {
            Some(Phase::Travel) => travelled = true,
            Some(Phase::Search) if travelled => break,
            _ => {}
        }
    }
    assert!(travelled);
    assert_eq!(scene.task.phase(), Some(Phase::Search));
    assert_eq!(scene.task.replans(), 1);
    assert_eq!(scene.task.watchdog_timer(), 0.0);
    assert_eq!(scene.mover.linear_speed(), 0.0);
}

#[test]
fn flyers_climb_cruise_and_land() {
    let mut scene = Scene::new(MoverKind::Flying, Vec3::ZERO);
    scene.start(Vec3::new(200.0, 0.0, 0.0), 0.0, None).unwrap();
    assert_eq!(scene.task.altitude(), Some(50.0));

    let mut highest = 0.0_f32;
    let mut phases = vec![];
    let mut outcome = Ok(Progress::Continue);
    for _ in 0..5000 {
        outcome = scene.frame();
        highest = highest.max(scene.mover.position.y);
        if let Some(phase) = scene.task.phase() {
            if phases.last() != Some(&phase) {
                phases.push(phase);
            }
        }
        if outcome != Ok(Progress::Continue) {
            break;
        }
    }

    assert_eq!(outcome, Ok(Progress::Stop));
    assert!(highest >= 29.0, "only climbed to {highest}");
    assert!(phases.contains(&Phase::Ascend));
    assert!(phases.contains(&Phase::Descend));
    assert!(scene.mover.position.y <= 0.01);
    let planar = Vec2::new(scene.mover.position.x, scene.mover.position.z);
    assert!(planar.distance(Vec2::new(200.0, 0.0)) < 2.0);
}

#[test]
fn hot_reactors_land_and_wait_before_flying_on() {
    let mut scene = Scene::new(MoverKind::Flying, Vec3::ZERO);
    let goal = Vec3::new(300.0, 0.0, 0.0);
    scene.start(goal, 0.0, None).unwrap();
    scene.run_until(Phase::Travel, 500);
    for _ in 0..20 {
        assert_eq!(scene.frame(), Ok(Progress::Continue));
    }
    assert!(scene.mover.position.y > 25.0);
    let waypoint = scene.task.path().unwrap().index();

    scene.mover.reactor = Some(0.05);
    assert_eq!(scene.frame(), Ok(Progress::Continue));
    assert_eq!(scene.task.phase(), Some(Phase::WaitClearance));
    assert_eq!(scene.mover.linear_speed(), 0.0);
    assert_eq!(scene.mover.vertical_speed(), -1.0);

    // Cooling down: on the ground until the reactor is full again.
    scene.mover.reactor = Some(0.5);
    for _ in 0..100 {
        assert_eq!(scene.frame(), Ok(Progress::Continue));
        assert_eq!(scene.task.phase(), Some(Phase::WaitClearance));
    }
    assert!(scene.mover.is_landed());
    let parked = scene.mover.position;

    scene.mover.reactor = Some(1.0);
    assert_eq!(scene.frame(), Ok(Progress::Continue));
    assert_eq!(scene.task.phase(), Some(Phase::Ascend));
    scene.run_until(Phase::Travel, 500);
    assert!(scene.mover.position.y > 25.0);
    assert_eq!(scene.task.path().unwrap().index(), waypoint);

    let (outcome, _) = scene.run(5000);
    assert_eq!(outcome, Ok(Progress::Stop));
    assert!(scene.mover.position.x > parked.x);
    let planar = Vec2::new(scene.mover.position.x, scene.mover.position.z);
    assert!(planar.distance(Vec2::new(goal.x, goal.z)) < 2.0);
}

#[test]
fn aliens_race_through_their_goal() {
    let mut scene = Scene::new(MoverKind::Ant, Vec3::ZERO);
    scene.start(Vec3::new(50.0, 0.0, 0.0), 0.0, None).unwrap();
    assert_eq!(scene.task.phase(), Some(Phase::Advance));

    let (outcome, _) = scene.run(1000);
    assert_eq!(outcome, Ok(Progress::Stop));
    assert!((scene.mover.position.x - 50.0).abs() < 10.0);
}

#[test]
fn halting_movers_give_up_on_collision() {
    let mut scene = Scene::new(MoverKind::Ant, Vec3::ZERO);
    scene.start(Vec3::new(50.0, 0.0, 0.0), 0.0, None).unwrap();
    scene.mover.collide();
    assert_eq!(scene.frame(), Err(GotoError::CollisionHalt));
    assert_eq!(scene.mover.linear_speed(), 0.0);
}

#[test]
fn collisions_are_recovered_by_turning_away() {
    let mut scene = Scene::new(MoverKind::Human, Vec3::ZERO);
    scene
        .start(Vec3::new(60.0, 0.0, 0.0), 0.0, Some(CrashMode::TurnRight))
        .unwrap();
    assert_eq!(scene.frame(), Ok(Progress::Continue));
    scene.mover.collide();

    let (outcome, phases) = scene.run(2000);
    assert_eq!(outcome, Ok(Progress::Stop));
    assert_eq!(
        phases[..5],
        [
            Phase::Advance,
            Phase::CollisionWait(RecoveryLeg::First),
            Phase::CollisionTurn(RecoveryLeg::First),
            Phase::CollisionAdvance(RecoveryLeg::First),
            Phase::Advance,
        ]
    );
    assert_eq!(scene.task.retries(), 0);
}

#[test]
fn cargo_is_faced_after_arrival() {
    let mut scene = Scene::new(MoverKind::Wheeled, Vec3::ZERO);
    let ore = Vec3::new(60.0, 0.0, 20.0);
    scene
        .world
        .insert(WorldObject::new(ObjectKind::Cargo, ore).with_sphere(Vec3::ZERO, 1.0));

    scene.start(ore, 0.0, None).unwrap();
    let (outcome, _) = scene.run(2000);
    assert_eq!(outcome, Ok(Progress::Stop));

    let position = Vec2::new(scene.mover.position.x, scene.mover.position.z);
    let to_ore = Vec2::new(ore.x, ore.z) - position;
    let heading = heading_vector(scene.mover.rotation_y);
    assert!(heading.dot(to_ore.normalize()) > 0.99);
    assert!(to_ore.length() < 12.0, "stopped {} away", to_ore.length());
}

/// Bumps the mover once it starts advancing, then again on its first recovery leg, and
/// checks both turns. Returns the scene sitting in `Advance` after the second leg.
#[track_caller]
fn recover_twice(crash_mode: CrashMode, first_turn: f32, second_turn: f32) -> Scene {
    let mut scene = Scene::new(MoverKind::Human, Vec3::ZERO);
    scene
        .start(Vec3::new(60.0, 0.0, 0.0), 0.0, Some(crash_mode))
        .unwrap();
    assert_eq!(scene.frame(), Ok(Progress::Continue));
    scene.mover.collide();

    scene.run_until(Phase::CollisionTurn(RecoveryLeg::First), 100);
    let before = scene.mover.rotation_y;
    scene.run_until(Phase::CollisionAdvance(RecoveryLeg::First), 500);
    assert!(same_heading(scene.mover.rotation_y, before + first_turn));
    scene.mover.collide();

    scene.run_until(Phase::CollisionWait(RecoveryLeg::Second), 10);
    scene.run_until(Phase::CollisionTurn(RecoveryLeg::Second), 100);
    let before = scene.mover.rotation_y;
    scene.run_until(Phase::CollisionAdvance(RecoveryLeg::Second), 500);
    assert!(same_heading(scene.mover.rotation_y, before + second_turn));
    assert_eq!(scene.task.retries(), 0);

    scene.run_until(Phase::Advance, 500);
    assert_eq!(scene.task.retries(), 1);
    scene
}

#[test]
fn alternating_recovery_turns_right_then_all_the_way_around() {
    let mut scene = recover_twice(CrashMode::AlternateRightLeft, FRAC_PI_2, -PI);
    let (outcome, _) = scene.run(2000);
    assert_eq!(outcome, Ok(Progress::Stop));
}

#[test]
fn left_turning_recovery_turns_left_both_times() {
    let mut scene = recover_twice(CrashMode::TurnLeft, -FRAC_PI_2, -FRAC_PI_2);
    let (outcome, _) = scene.run(2000);
    assert_eq!(outcome, Ok(Progress::Stop));
}
