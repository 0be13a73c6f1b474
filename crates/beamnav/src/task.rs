//! The navigation state machine driving a mover to a goal.
//!
//! A [`GotoTask`] is started once per goal, then every frame the caller runs
//! [`GotoTask::event_process`] to emit motor commands and polls [`GotoTask::is_ended`] for the
//! outcome.
//!
//! Movers that plan (crash mode [`CrashMode::Beam`]) go through
//! `Leak → Search → WaitClearance → Ascend → Travel → Descend → TurnToTarget → FinalMove`.
//! All others drive straight at the goal with local steering, recovering from collisions with
//! a fixed turn-and-retry pattern.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Vec2, Vec3};
use thiserror::Error;

use crate::{
    Approach, BeamSearch, GotoConfig, LeakManeuver, LeakReaction, Mover, MoverProfile, ObjectKey,
    ObjectKind, ObjectRasterization, ObstacleField, ObstacleFieldBuilder,
    ObstacleFieldBuilderError, Plane, RepulsionQuery, SearchError, SearchProgress, Terrain,
    WaypointPath, World, adjust_building, adjust_target, compute_repulsion,
    compute_vertical_repulsion, leak_search,
    math::{direction, distance_projected, heading_to, norm_angle, planar},
    search_target,
};

/// Objects closer than this to a requested goal are taken as the goal object. `[Units: wu]`
const TARGET_MARGIN: f32 = 1.0;
/// Final distance kept from objects approached by a planning mover. `[Units: wu]`
const BEAM_TAKE_DISTANCE: f32 = 4.0;
/// Goal radius when planning towards the base. `[Units: wu]`
const SPACESHIP_GOAL_RADIUS: f32 = 12.0;
/// A flyer climbs to this much below its cruise altitude before travelling. `[Units: wu]`
const ASCEND_SLACK: f32 = 20.0;
/// How far ahead a cruising flyer looks for rising terrain, at full speed. `[Units: wu]`
const ALTITUDE_LOOKAHEAD: f32 = 20.0;
/// Reactor range under which a jet flyer has to land and cool down.
const OVERHEAT_RANGE: f32 = 0.1;

/// What the mover does once it is close to the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum GoalMode {
    /// Stop precisely on the goal.
    Stop,
    /// Race at the goal and stop as soon as it starts getting farther away.
    Express,
}

/// How the mover reacts to collisions, and whether it plans at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CrashMode {
    /// Give up on the first collision.
    Halt,
    /// Turn right after a collision, both times.
    TurnRight,
    /// Turn left after a collision, both times.
    TurnLeft,
    /// Turn right, then all the way around to the left.
    AlternateRightLeft,
    /// Turn left, then all the way around to the right.
    AlternateLeftRight,
    /// Plan a path with the beam search and follow it.
    Beam,
}

/// Which of the two collision recovery legs a mover is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryLeg {
    /// After a collision while advancing.
    First,
    /// After a collision during the first recovery leg.
    Second,
}

/// Phase of a [`GotoTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Getting clear of an obstacle the mover started out overlapping.
    Leak,
    /// Running the beam search, possibly over several frames.
    Search,
    /// Waiting for the reactor of a jet flyer to cool down.
    WaitClearance,
    /// Climbing to cruise altitude.
    Ascend,
    /// Following the waypoint path.
    Travel,
    /// Landing at the end of the path.
    Descend,
    /// Driving straight at the goal.
    Advance,
    /// Standing still after a collision.
    CollisionWait(RecoveryLeg),
    /// Turning away after a collision.
    CollisionTurn(RecoveryLeg),
    /// Driving away after a collision.
    CollisionAdvance(RecoveryLeg),
    /// Landing on the goal.
    Land,
    /// Turning to face the goal object.
    TurnToTarget,
    /// Driving the last stretch onto the goal object.
    FinalMove,
}

/// Result of [`GotoTask::is_ended`] when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still on the way.
    Continue,
    /// The goal is reached.
    Stop,
}

/// Errors that end a navigation request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GotoError {
    /// The beam search tried every branch without reaching the goal.
    #[error("no path to the goal exists")]
    Impossible,
    /// The path would need more waypoints than allowed.
    #[error("the path needs more than {max} waypoints")]
    TooManyWaypoints {
        /// The waypoint capacity.
        max: usize,
    },
    /// The goal cell was blocked when the request started.
    #[error("the destination is occupied")]
    DestinationOccupied,
    /// The mover collided while its crash mode was [`CrashMode::Halt`].
    #[error("the mover collided and is set to halt on collisions")]
    CollisionHalt,
    /// There is no request to make progress on.
    #[error("no navigation request is active")]
    NoActiveRequest,
    /// The configured grid is invalid.
    #[error(transparent)]
    InvalidGrid(#[from] ObstacleFieldBuilderError),
}

impl From<SearchError> for GotoError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::Impossible => Self::Impossible,
            SearchError::TooManyWaypoints { max } => Self::TooManyWaypoints { max },
        }
    }
}

/// What a [`GotoTask`] works with during one call.
pub struct FrameContext<'a> {
    /// The mover being driven.
    pub mover: &'a mut dyn Mover,
    /// Snapshot of every object in the world, stable for the duration of the call.
    pub world: &'a World,
    /// The terrain.
    pub terrain: &'a dyn Terrain,
}

/// Drives one mover to a goal, one frame at a time.
#[derive(Debug, Clone)]
pub struct GotoTask {
    config: GotoConfig,
    mover_key: Option<ObjectKey>,
    request: Option<Request>,
}

impl GotoTask {
    /// Creates an idle task. `mover_key` is the mover's own entry in the [`World`], if it has one,
    /// so it is not treated as an obstacle to itself.
    pub fn new(config: GotoConfig, mover_key: Option<ObjectKey>) -> Self {
        Self {
            config,
            mover_key,
            request: None,
        }
    }

    /// The tuning this task runs with.
    #[inline]
    pub fn config(&self) -> &GotoConfig {
        &self.config
    }

    /// Whether a request is in progress.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.request.is_some()
    }

    /// The current phase, `None` when idle.
    pub fn phase(&self) -> Option<Phase> {
        self.request.as_ref().map(|request| request.phase)
    }

    /// Where the mover is headed after target adjustment.
    pub fn goal(&self) -> Option<Vec3> {
        self.request.as_ref().map(|request| request.goal)
    }

    /// The current cruise altitude, 0 for ground level.
    pub fn altitude(&self) -> Option<f32> {
        self.request.as_ref().map(|request| request.altitude)
    }

    /// The path being followed, once the search found one.
    pub fn path(&self) -> Option<&WaypointPath> {
        self.request.as_ref().and_then(|request| request.path.as_ref())
    }

    /// The obstacle field of the current request.
    pub fn field(&self) -> Option<&ObstacleField> {
        self.request.as_ref().and_then(|request| request.field.as_ref())
    }

    /// How long the mover has been stuck while travelling.
    pub fn watchdog_timer(&self) -> f32 {
        self.request
            .as_ref()
            .map_or(0.0, |request| request.watchdog_timer)
    }

    /// How many times the path was planned again because the mover got stuck.
    pub fn replans(&self) -> u32 {
        self.request.as_ref().map_or(0, |request| request.replans)
    }

    /// How many collision recoveries were completed.
    pub fn retries(&self) -> u32 {
        self.request.as_ref().map_or(0, |request| request.retries)
    }

    /// Starts a new request, replacing any prior one.
    ///
    /// `altitude` is the cruise height of flyers above the floor, 0 to stay low. Without an
    /// explicit mode, crawling aliens race in [`GoalMode::Express`], aliens halt on collisions
    /// and everything else plans with [`CrashMode::Beam`].
    ///
    /// When the goal lies within a unit of an object, the object is the real goal: the mover
    /// heads for a spot in front of it and turns to face it on arrival.
    ///
    /// # Errors
    ///
    /// Planning movers fail with [`GotoError::DestinationOccupied`] when the goal cell is
    /// blocked, and with [`GotoError::InvalidGrid`] when the configured grid is invalid. The
    /// next [`GotoTask::is_ended`] reports the same error once, then the task is idle.
    pub fn start(
        &mut self,
        ctx: &mut FrameContext,
        goal: Vec3,
        altitude: f32,
        goal_mode: Option<GoalMode>,
        crash_mode: Option<CrashMode>,
    ) -> Result<(), GotoError> {
        self.request = None;
        let profile = MoverProfile::new(ctx.mover.kind());
        let goal_mode = goal_mode.unwrap_or(if profile.prefers_express() {
            GoalMode::Express
        } else {
            GoalMode::Stop
        });
        let mut crash_mode = crash_mode.unwrap_or(if profile.is_alien() {
            CrashMode::Halt
        } else {
            CrashMode::Beam
        });

        let position = ctx.mover.position();
        if crash_mode == CrashMode::Beam
            && distance_projected(position, goal) < self.config.min_beam_distance
        {
            crash_mode = CrashMode::AlternateRightLeft;
        }

        let mut request = Request::new(profile, goal, altitude, goal_mode, crash_mode);
        ctx.mover.clear_collision();
        let take = self.config.take;
        let target = search_target(ctx.world, goal, TARGET_MARGIN)
            .and_then(|key| ctx.world.get(key).map(|object| (key, object)));

        if crash_mode != CrashMode::Beam {
            if let Some((_, object)) = target.filter(|_| !profile.is_approximate()) {
                request.goal = match adjust_building(
                    ctx.world,
                    &profile,
                    object.position,
                    TARGET_MARGIN,
                    0.0,
                    take,
                ) {
                    Some((position, _)) => position,
                    None => match adjust_target(object, &profile, position, 0.0, take) {
                        Approach::AnySide { position } | Approach::Single { position, .. } => {
                            position
                        }
                    },
                };
                request.take = true;
            }
        } else {
            if let Some((key, object)) = target {
                match adjust_building(
                    ctx.world,
                    &profile,
                    object.position,
                    TARGET_MARGIN,
                    BEAM_TAKE_DISTANCE,
                    take,
                ) {
                    Some((position, final_move)) => {
                        request.goal = position;
                        request.final_move = final_move;
                    }
                    None => match adjust_target(
                        object,
                        &profile,
                        position,
                        BEAM_TAKE_DISTANCE,
                        take,
                    ) {
                        Approach::AnySide { position } => {
                            request.goal = position;
                            request.cargo = Some((key, object.kind));
                        }
                        Approach::Single {
                            position,
                            final_distance,
                        } => {
                            request.goal = position;
                            request.final_move = final_distance;
                        }
                    },
                }
                request.take = true;
            }

            if profile.is_flying()
                && request.altitude == 0.0
                && distance_projected(position, request.goal) > self.config.fly_ground_distance
            {
                request.altitude = self.config.default_altitude;
            }

            let mut ready = request.begin_beam(&self.config, self.mover_key, ctx);
            if ready.is_ok() {
                ready = request.check_destination(ctx.terrain);
            }
            if let Err(error) = ready {
                tracing::debug!(goal = ?request.goal, %error, "goto cannot start");
                ctx.mover.set_linear_speed(0.0);
                ctx.mover.set_turn_speed(0.0);
                request.pending = Some(error.clone());
                self.request = Some(request);
                return Err(error);
            }
        }

        tracing::debug!(
            goal = ?request.goal,
            altitude = request.altitude,
            ?goal_mode,
            ?crash_mode,
            phase = ?request.phase,
            "goto started"
        );
        self.request = Some(request);
        Ok(())
    }

    /// Advances the request by one frame of `dt` seconds, setting the mover's motors.
    ///
    /// Does nothing when idle or when an outcome is waiting to be picked up by
    /// [`GotoTask::is_ended`].
    pub fn event_process(&mut self, ctx: &mut FrameContext, dt: f32) {
        let Some(request) = self.request.as_mut() else {
            return;
        };
        if ctx.mover.is_fixed() {
            ctx.mover.set_linear_speed(0.0);
            ctx.mover.set_turn_speed(0.0);
            return;
        }
        if request.pending.is_some() {
            return;
        }
        request.frame(&self.config, self.mover_key, ctx, dt);
    }

    /// Polls the request's outcome.
    ///
    /// Terminal outcomes, a [`Progress::Stop`] or an error, are reported once. The task is
    /// idle afterwards and needs a new [`GotoTask::start`].
    ///
    /// # Errors
    ///
    /// Any [`GotoError`] that ended the request, or [`GotoError::NoActiveRequest`] when idle.
    pub fn is_ended(&mut self, ctx: &mut FrameContext) -> Result<Progress, GotoError> {
        let Some(request) = self.request.as_mut() else {
            return Err(GotoError::NoActiveRequest);
        };
        let outcome = request.poll(&self.config, ctx);
        match &outcome {
            Ok(Progress::Continue) => {}
            Ok(Progress::Stop) => {
                tracing::debug!(position = ?ctx.mover.position(), "goto reached its goal");
                self.request = None;
            }
            Err(error) => {
                tracing::debug!(%error, "goto failed");
                ctx.mover.set_linear_speed(0.0);
                ctx.mover.set_turn_speed(0.0);
                self.request = None;
            }
        }
        outcome
    }

    /// Cancels the request, stopping every motor and releasing the obstacle field.
    pub fn abort(&mut self, ctx: &mut FrameContext) {
        ctx.mover.set_linear_speed(0.0);
        ctx.mover.set_vertical_speed(0.0);
        ctx.mover.set_turn_speed(0.0);
        if self.request.take().is_some() {
            tracing::debug!("goto aborted");
        }
    }
}

#[derive(Debug, Clone)]
struct Request {
    profile: MoverProfile,
    /// Where the mover heads, after target adjustment.
    goal: Vec3,
    /// The goal as requested, faced on arrival.
    goal_object: Vec3,
    altitude: f32,
    goal_mode: GoalMode,
    crash_mode: CrashMode,
    /// Whether to turn to the goal object on arrival.
    take: bool,
    /// Loose cargo being approached from any side, searched with a goal radius.
    cargo: Option<(ObjectKey, ObjectKind)>,
    final_move: f32,
    phase: Phase,
    /// Time spent in the current wait phase.
    timer: f32,
    /// Heading to turn to.
    angle: f32,
    /// Where the current recovery leg or final move started.
    anchor: Vec3,
    final_distance: f32,
    time_limit: f32,
    last_distance: f32,
    leak: Option<LeakManeuver>,
    leak_time: f32,
    leak_delay: f32,
    field: Option<ObstacleField>,
    search: Option<BeamSearch>,
    path: Option<WaypointPath>,
    watchdog_position: Vec3,
    watchdog_timer: f32,
    replans: u32,
    retries: u32,
    /// A failure waiting to be reported by `is_ended`.
    pending: Option<GotoError>,
}

impl Request {
    fn new(
        profile: MoverProfile,
        goal: Vec3,
        altitude: f32,
        goal_mode: GoalMode,
        crash_mode: CrashMode,
    ) -> Self {
        Self {
            profile,
            goal,
            goal_object: goal,
            altitude,
            goal_mode,
            crash_mode,
            take: false,
            cargo: None,
            final_move: 0.0,
            phase: Phase::Advance,
            timer: 0.0,
            angle: 0.0,
            anchor: Vec3::ZERO,
            final_distance: 0.0,
            time_limit: 0.0,
            last_distance: f32::INFINITY,
            leak: None,
            leak_time: 0.0,
            leak_delay: 0.0,
            field: None,
            search: None,
            path: None,
            watchdog_position: Vec3::ZERO,
            watchdog_timer: 0.0,
            replans: 0,
            retries: 0,
            pending: None,
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "goto phase change");
            self.phase = phase;
        }
    }

    fn flies_high(&self) -> bool {
        self.profile.is_flying() && self.altitude > 0.0
    }

    fn overheated(&self, mover: &dyn Mover, below: f32) -> bool {
        self.altitude != 0.0
            && self.profile.has_jet()
            && mover.reactor_range().is_some_and(|range| range < below)
    }

    /// Rebuilds the obstacle field and either leaks or starts searching.
    fn begin_beam(
        &mut self,
        config: &GotoConfig,
        mover_key: Option<ObjectKey>,
        ctx: &mut FrameContext,
    ) -> Result<(), GotoError> {
        let field = match self.field.take() {
            Some(mut field) => {
                field.clear();
                field
            }
            None => ObstacleFieldBuilder {
                cell_size: config.cell_size,
                world_extent: config.world_extent,
                terrain_margin: config.terrain_margin,
                rules: self.profile.terrain,
            }
            .build()?,
        };
        let field = self.field.insert(field);

        let position = ctx.mover.position();
        let sphere = ctx.mover.crash_sphere();
        field.rasterize_objects(
            ctx.world,
            ctx.terrain,
            &ObjectRasterization {
                mover: mover_key,
                target: self.cargo.map(|(key, _)| key),
                mover_radius: sphere.radius,
                safety_margin: config.safety_margin,
                altitude: (self.altitude > 0.0).then_some(self.altitude),
            },
        );
        field.rasterize_terrain_between(ctx.terrain, position, self.goal);

        self.search = None;
        self.path = None;
        match leak_search(
            ctx.world,
            mover_key,
            sphere,
            ctx.mover.is_landed(),
            &config.leak,
        ) {
            Some(leak) => {
                tracing::warn!(
                    obstacle = ?leak.kind,
                    distance = leak.rule.distance,
                    "mover overlaps an obstacle, leaking before the search"
                );
                self.leak_time = 0.0;
                self.leak_delay = ctx
                    .mover
                    .travel_time(leak.rule.distance, leak.rule.direction());
                self.leak = Some(leak);
                self.set_phase(Phase::Leak);
            }
            None => {
                ctx.mover.set_linear_speed(0.0);
                ctx.mover.set_turn_speed(0.0);
                self.set_phase(Phase::Search);
            }
        }
        Ok(())
    }

    /// Fails when the goal cell is blocked, unless the goal is loose cargo.
    fn check_destination(&mut self, terrain: &dyn Terrain) -> Result<(), GotoError> {
        if self.cargo.is_some() {
            return Ok(());
        }
        let Some(field) = self.field.as_mut() else {
            return Ok(());
        };
        let cell = field.cell_at(planar(self.goal));
        if field.test_dot(terrain, Plane::Blocking, cell) {
            return Err(GotoError::DestinationOccupied);
        }
        Ok(())
    }

    fn frame(
        &mut self,
        config: &GotoConfig,
        mover_key: Option<ObjectKey>,
        ctx: &mut FrameContext,
        dt: f32,
    ) {
        match self.phase {
            Phase::Leak => return self.leak_frame(ctx, dt),
            Phase::Search => return self.search_frame(config, ctx),
            Phase::WaitClearance => return,
            Phase::Ascend => return ctx.mover.set_vertical_speed(1.0),
            Phase::Travel => return self.travel_frame(config, mover_key, ctx, dt),
            Phase::Descend | Phase::Land => return ctx.mover.set_vertical_speed(-0.5),
            _ => {}
        }

        if self.goal_mode == GoalMode::Express {
            return self.express_frame(ctx);
        }

        if self.phase != Phase::TurnToTarget && self.flies_high() {
            self.hover_frame(mover_key, ctx);
        }

        match self.phase {
            Phase::Advance => self.advance_frame(mover_key, ctx),
            Phase::TurnToTarget | Phase::CollisionTurn(_) => {
                let turn = direction(ctx.mover.rotation_y(), self.angle).clamp(-1.0, 1.0);
                ctx.mover.set_turn_speed(turn);
            }
            Phase::CollisionWait(_) => {
                self.timer += dt;
                ctx.mover.set_linear_speed(0.0);
                ctx.mover.set_turn_speed(0.0);
            }
            Phase::CollisionAdvance(leg) => {
                if ctx.mover.has_collided() {
                    ctx.mover.clear_collision();
                    self.timer = 0.0;
                    let next = match leg {
                        RecoveryLeg::First => RecoveryLeg::Second,
                        RecoveryLeg::Second => RecoveryLeg::First,
                    };
                    self.set_phase(Phase::CollisionWait(next));
                    return;
                }
                ctx.mover.set_linear_speed(0.5);
            }
            Phase::FinalMove => {
                self.time_limit -= dt;
                ctx.mover.set_linear_speed(1.0);
            }
            _ => {}
        }
    }

    fn leak_frame(&mut self, ctx: &mut FrameContext, dt: f32) {
        self.leak_time += dt;
        let Some(leak) = self.leak else {
            return;
        };
        let position = planar(ctx.mover.position());
        let towards = direction(
            ctx.mover.rotation_y(),
            heading_to(position, planar(leak.obstacle)),
        );
        let mut turn = towards.clamp(-1.0, 1.0);
        let linear = if towards.abs() > FRAC_PI_2 {
            // Obstacle behind: drive on and keep turning it further behind.
            turn = -turn;
            1.0
        } else {
            -1.0
        };
        let (linear, turn) = match leak.rule.reaction {
            LeakReaction::Disengage => (linear, turn),
            LeakReaction::Recede => (-1.0, 0.0),
        };
        ctx.mover.set_turn_speed(turn);
        ctx.mover.set_linear_speed(linear);
    }

    fn search_frame(&mut self, config: &GotoConfig, ctx: &mut FrameContext) {
        let Some(field) = self.field.as_mut() else {
            return;
        };
        let position = ctx.mover.position();
        let search = match self.search.as_mut() {
            Some(search) => search,
            None => {
                field.clear_circle(
                    planar(position),
                    field.cell_size() * config.start_clearance_cells,
                );
                let (goal, radius) = match self.cargo {
                    None => (self.goal, 0.0),
                    Some((_, ObjectKind::SpaceShip)) => (self.goal_object, SPACESHIP_GOAL_RADIUS),
                    Some(_) => (self.goal_object, config.take.arm + 2.0),
                };
                self.search.insert(BeamSearch::new(
                    planar(position),
                    planar(goal),
                    radius,
                    config,
                ))
            }
        };

        match search.search(field, ctx.terrain) {
            Ok(SearchProgress::Continue) => {}
            Ok(SearchProgress::Found(path)) => {
                tracing::debug!(
                    waypoints = path.points().len(),
                    iterations = search.iterations(),
                    "beam search found a path"
                );
                self.search = None;
                self.path = Some(path);
                self.watchdog_position = position;
                self.watchdog_timer = 0.0;
                let next = if ctx.mover.is_landed() {
                    Phase::WaitClearance
                } else {
                    Phase::Travel
                };
                self.set_phase(next);
            }
            Err(error) => {
                tracing::debug!(%error, iterations = search.iterations(), "beam search failed");
                self.search = None;
                self.pending = Some(error.into());
            }
        }
    }

    fn travel_frame(
        &mut self,
        config: &GotoConfig,
        mover_key: Option<ObjectKey>,
        ctx: &mut FrameContext,
        dt: f32,
    ) {
        if ctx.mover.has_collided() {
            ctx.mover.clear_collision();
        }
        let Some(path) = self.path.as_ref() else {
            return;
        };
        let Some(target) = path.current() else {
            return;
        };
        let on_last = path.is_on_last();
        let position = ctx.mover.position();

        if self.profile.is_flying() && self.altitude == 0.0 {
            let vertical = if ctx.mover.is_landed() { 0.0 } else { -1.0 };
            ctx.mover.set_vertical_speed(vertical);
        }
        if self.flies_high() {
            self.hold_altitude(ctx, target, position);
        }

        let distance = planar(position).distance(target);
        let mut turn = if distance > 0.0 {
            let heading = heading_to(planar(position), target);
            (direction(ctx.mover.rotation_y(), heading) * 2.0).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        if distance < 4.0 {
            turn *= distance / 4.0;
        }

        let mut linear = if on_last {
            approach_speed(distance, ctx.mover.braking_distance())
        } else {
            1.0
        };
        linear *= 1.0 - 0.7 * turn.abs();
        if turn.abs() >= 0.2 {
            // Turn on the spot first.
            linear = 0.0;
        }

        if distance_projected(position, self.watchdog_position) < config.watchdog_distance
            && linear != 0.0
        {
            self.watchdog_timer += dt;
        } else {
            self.watchdog_timer = 0.0;
            self.watchdog_position = position;
        }

        if self.watchdog_timer >= config.watchdog_time {
            tracing::warn!(
                position = ?position,
                stuck_for = self.watchdog_timer,
                "mover is stuck, planning again"
            );
            ctx.mover.set_linear_speed(0.0);
            ctx.mover.set_turn_speed(0.0);
            self.watchdog_timer = 0.0;
            self.replans += 1;
            if let Err(error) = self.begin_beam(config, mover_key, ctx) {
                self.pending = Some(error);
            }
            return;
        }

        ctx.mover.set_turn_speed(turn);
        ctx.mover.set_linear_speed(linear);
    }

    /// Keeps a cruising flyer at its altitude over the terrain under it and ahead of it.
    fn hold_altitude(&self, ctx: &mut FrameContext, target: Vec2, position: Vec3) {
        let here = planar(position);
        let terrain = ctx.terrain;
        let mut height = terrain.height_to_floor(Vec3::new(target.x, position.y, target.y));
        let distance = here.distance(target);
        if distance != 0.0 {
            let ahead =
                here + (target - here) * ctx.mover.speed_ratio() * ALTITUDE_LOOKAHEAD / distance;
            height = height.min(terrain.height_to_floor(Vec3::new(ahead.x, position.y, ahead.y)));
        }

        let mut vertical = 0.0;
        if height < self.altitude - 1.0 {
            vertical = (0.2 + (self.altitude - 1.0 - height) * 0.1).min(1.0);
        }
        if height > self.altitude + 1.0 {
            vertical = -0.2;
        }
        ctx.mover.set_vertical_speed(vertical);
    }

    fn express_frame(&mut self, ctx: &mut FrameContext) {
        if self.crash_mode == CrashMode::Halt && ctx.mover.has_collided() {
            ctx.mover.clear_collision();
            self.pending = Some(GotoError::CollisionHalt);
            return;
        }

        let position = ctx.mover.position();
        if self.altitude > 0.0 {
            let height = ctx.terrain.height_to_floor(position);
            let vertical = if height < self.altitude {
                0.1
            } else if height > self.altitude {
                -0.2
            } else {
                0.0
            };
            ctx.mover.set_vertical_speed(vertical);
        }

        let heading = heading_to(planar(position), planar(self.goal));
        let turn = direction(ctx.mover.rotation_y(), heading).clamp(-1.0, 1.0);
        ctx.mover.set_turn_speed(turn);
        ctx.mover.set_linear_speed(1.0);
    }

    /// Altitude control of a flyer driving straight at its goal. It sinks towards the goal
    /// over the last 40 units and is pushed off spheres above and below.
    fn hover_frame(&mut self, mover_key: Option<ObjectKey>, ctx: &mut FrameContext) {
        let position = ctx.mover.position();
        let distance = distance_projected(self.goal, position);
        let factor = ((distance - 20.0) / 20.0).clamp(0.0, 1.0);
        let height = ctx.terrain.height_to_floor(position);

        let mut vertical = 0.0;
        if height < (self.altitude - 0.5) * factor && factor == 1.0 {
            vertical = 0.1;
        }
        if height > self.altitude * factor {
            vertical = -0.2;
        }
        let sphere = ctx.mover.crash_sphere();
        vertical += compute_vertical_repulsion(ctx.world, mover_key, sphere) * 0.2;
        ctx.mover.set_vertical_speed(vertical);
    }

    fn advance_frame(&mut self, mover_key: Option<ObjectKey>, ctx: &mut FrameContext) {
        if ctx.mover.has_collided() {
            ctx.mover.clear_collision();
            self.timer = 0.0;
            self.set_phase(Phase::CollisionWait(RecoveryLeg::First));
            return;
        }

        let position = ctx.mover.position();
        let offset = planar(self.goal) - planar(position);
        let distance = offset.length();
        let mut heading = offset.normalize_or_zero();
        let repulsion = compute_repulsion(
            ctx.world,
            &RepulsionQuery {
                mover: mover_key,
                profile: &self.profile,
                sphere: ctx.mover.crash_sphere(),
                goal: self.goal,
                landed: ctx.mover.is_landed(),
                braking_distance: ctx.mover.braking_distance(),
            },
        );
        heading += repulsion * 2.0;

        let turn = direction(ctx.mover.rotation_y(), heading_to(Vec2::ZERO, heading))
            .clamp(-1.0, 1.0);
        let mut linear = approach_speed(distance, ctx.mover.braking_distance());
        linear *= 1.0 - 0.7 * turn.abs();
        if distance < 20.0 && turn.abs() >= 0.5 {
            linear = 0.0;
        }
        ctx.mover.set_turn_speed(turn);
        ctx.mover.set_linear_speed(linear);
    }

    /// Checks for the end of the current phase, moving on to the next ones as far as they are
    /// already done.
    fn poll(&mut self, config: &GotoConfig, ctx: &mut FrameContext) -> Result<Progress, GotoError> {
        if let Some(error) = self.pending.clone() {
            return Err(error);
        }
        let position = ctx.mover.position();
        let landed = ctx.mover.is_landed();

        match self.phase {
            Phase::Leak => {
                if self.leak_time >= self.leak_delay {
                    ctx.mover.set_linear_speed(0.0);
                    ctx.mover.set_turn_speed(0.0);
                    self.leak = None;
                    self.search = None;
                    self.set_phase(Phase::Search);
                }
                return Ok(Progress::Continue);
            }
            Phase::Search => return Ok(Progress::Continue),
            _ => {}
        }

        if self.phase == Phase::WaitClearance {
            if self.overheated(ctx.mover, 1.0) {
                return Ok(Progress::Continue);
            }
            self.set_phase(Phase::Ascend);
        }

        if self.phase == Phase::Ascend {
            if self.flies_high() {
                let floor = ctx.terrain.floor_level(planar(position));
                let cruise = (floor + self.altitude - ASCEND_SLACK)
                    .min(ctx.terrain.flying_max_height());
                if position.y < cruise - 1.0 {
                    return Ok(Progress::Continue);
                }
                ctx.mover.set_vertical_speed(0.0);
            }
            self.set_phase(Phase::Travel);
        }

        if self.phase == Phase::Travel {
            if self.overheated(ctx.mover, OVERHEAT_RANGE) {
                tracing::debug!("reactor overheated, landing to cool down");
                ctx.mover.set_linear_speed(0.0);
                ctx.mover.set_turn_speed(0.0);
                ctx.mover.set_vertical_speed(-1.0);
                self.set_phase(Phase::WaitClearance);
                return Ok(Progress::Continue);
            }

            if let (Some(path), Some(field)) = (self.path.as_mut(), self.field.as_mut()) {
                let mut limit = if landed {
                    1.0
                } else if path.is_on_last() {
                    2.0
                } else {
                    4.0
                };
                if self.profile.is_approximate() {
                    limit = 2.0;
                }
                if let Some(target) = path.current() {
                    if (position.x - target.x).abs() < limit
                        && (position.z - target.y).abs() < limit
                    {
                        ctx.mover.set_linear_speed(0.0);
                        ctx.mover.set_turn_speed(0.0);
                        if path.advance(field, ctx.terrain) {
                            self.set_phase(Phase::Descend);
                        } else {
                            tracing::trace!(index = path.index(), "next waypoint");
                        }
                    }
                }
            }
        }

        if self.phase == Phase::Descend {
            if self.flies_high() {
                if !landed {
                    return Ok(Progress::Continue);
                }
                // Landed: finish the last stretch on the ground.
                ctx.mover.set_vertical_speed(0.0);
                self.altitude = 0.0;
                if let Some(path) = self.path.as_mut() {
                    path.jump_to_last();
                }
                self.set_phase(Phase::Travel);
                return Ok(Progress::Continue);
            }
            if !self.take {
                ctx.mover.set_linear_speed(0.0);
                ctx.mover.set_turn_speed(0.0);
                return Ok(Progress::Stop);
            }
            self.angle = heading_to(planar(position), planar(self.goal_object));
            self.set_phase(Phase::TurnToTarget);
        }

        if self.goal_mode == GoalMode::Express {
            let distance = distance_projected(self.goal, position);
            let margin = if self.profile.is_flying() { 20.0 } else { 10.0 };
            if distance < margin && distance > self.last_distance {
                return Ok(Progress::Stop);
            }
            self.last_distance = distance;
        }

        if self.phase == Phase::Advance {
            let mut limit = if landed { 0.1 } else { 1.0 };
            if self.profile.is_approximate() {
                limit = 2.0;
            }
            if (position.x - self.goal.x).abs() < limit && (position.z - self.goal.z).abs() < limit
            {
                ctx.mover.set_linear_speed(0.0);
                ctx.mover.set_turn_speed(0.0);
                self.set_phase(Phase::Land);
            }
        }

        if self.phase == Phase::Land {
            if self.flies_high() {
                if !landed {
                    return Ok(Progress::Continue);
                }
                ctx.mover.set_vertical_speed(0.0);
            }
            if !self.take {
                return Ok(Progress::Stop);
            }
            self.angle = heading_to(planar(position), planar(self.goal_object));
            self.set_phase(Phase::TurnToTarget);
        }

        if self.phase == Phase::TurnToTarget {
            let limit = if self.profile.is_approximate() { 0.1 } else { 0.02 };
            if direction(ctx.mover.rotation_y(), self.angle).abs() < limit {
                ctx.mover.set_turn_speed(0.0);
                if self.final_move == 0.0 {
                    return Ok(Progress::Stop);
                }
                self.anchor = position;
                self.final_distance = ctx.mover.travel_length(self.final_move);
                self.time_limit =
                    (ctx.mover.travel_time(self.final_move.abs(), 1.0) * 1.5).max(0.5);
                self.set_phase(Phase::FinalMove);
            }
        }

        if self.phase == Phase::CollisionWait(RecoveryLeg::First) {
            if self.crash_mode == CrashMode::Halt {
                ctx.mover.set_linear_speed(0.0);
                ctx.mover.set_turn_speed(0.0);
                return Err(GotoError::CollisionHalt);
            }
            if self.timer >= config.collision_wait {
                let turn = match self.crash_mode {
                    CrashMode::AlternateRightLeft | CrashMode::TurnRight => FRAC_PI_2,
                    _ => -FRAC_PI_2,
                };
                self.angle = norm_angle(ctx.mover.rotation_y() + turn);
                self.set_phase(Phase::CollisionTurn(RecoveryLeg::First));
            }
        }

        if self.phase == Phase::CollisionTurn(RecoveryLeg::First) {
            self.finish_recovery_turn(ctx, RecoveryLeg::First);
        }

        if self.phase == Phase::CollisionAdvance(RecoveryLeg::First)
            && position.distance(self.anchor) >= config.first_recovery_distance
        {
            self.set_phase(Phase::Advance);
        }

        if self.phase == Phase::CollisionWait(RecoveryLeg::Second)
            && self.timer >= config.collision_wait
        {
            let turn = match self.crash_mode {
                CrashMode::AlternateRightLeft => -PI,
                CrashMode::AlternateLeftRight => PI,
                CrashMode::TurnRight => FRAC_PI_2,
                CrashMode::TurnLeft => -FRAC_PI_2,
                CrashMode::Halt | CrashMode::Beam => 0.0,
            };
            self.angle = norm_angle(ctx.mover.rotation_y() + turn);
            self.set_phase(Phase::CollisionTurn(RecoveryLeg::Second));
        }

        if self.phase == Phase::CollisionTurn(RecoveryLeg::Second) {
            self.finish_recovery_turn(ctx, RecoveryLeg::Second);
        }

        if self.phase == Phase::CollisionAdvance(RecoveryLeg::Second)
            && position.distance(self.anchor) >= config.second_recovery_distance
        {
            self.retries += 1;
            self.set_phase(Phase::Advance);
        }

        if self.phase == Phase::FinalMove {
            if self.time_limit <= 0.0 {
                ctx.mover.set_linear_speed(0.0);
                return Ok(Progress::Stop);
            }
            if position.distance(self.anchor) < self.final_distance {
                return Ok(Progress::Continue);
            }
            ctx.mover.set_linear_speed(0.0);
            return Ok(Progress::Stop);
        }

        Ok(Progress::Continue)
    }

    fn finish_recovery_turn(&mut self, ctx: &mut FrameContext, leg: RecoveryLeg) {
        if direction(ctx.mover.rotation_y(), self.angle).abs() < 0.1 {
            ctx.mover.set_turn_speed(0.0);
            self.anchor = ctx.mover.position();
            self.set_phase(Phase::CollisionAdvance(leg));
        }
    }
}

/// Forward command slowing down over the last one and a half braking distances.
fn approach_speed(distance: f32, braking_distance: f32) -> f32 {
    let braking = braking_distance * 1.5;
    if braking <= 0.0 {
        return 1.0;
    }
    (distance / braking).min(1.0)
}
