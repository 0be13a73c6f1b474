//! A minimal [`Mover`] that integrates its motor commands directly into its pose.

use glam::Vec3;

use crate::{
    CrashSphere, Mover, MoverKind, MoverProfile, Terrain,
    math::{heading_vector, norm_angle, planar},
};

/// Height above the floor under which a flyer counts as landed. `[Units: wu]`
const LANDED_TOLERANCE: f32 = 0.01;

/// A mover without inertia, for tests and headless runs.
///
/// Motor commands are applied as a fraction of the top speeds on the next [`step`](Self::step).
/// Ground movers stick to the floor, flyers are kept between the floor and the flying ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicMover {
    /// What kind of mover this is.
    pub kind: MoverKind,
    /// Position of the mover's origin.
    pub position: Vec3,
    /// Heading of the mover. `[Units: Radians]`
    pub rotation_y: f32,
    /// Radius of the mover's crash sphere. `[Units: wu]`
    pub radius: f32,
    /// Forward speed at full motor. `[Units: wu/s]`
    pub max_speed: f32,
    /// Turning speed at full motor. `[Units: Radians/s]`
    pub turn_rate: f32,
    /// Vertical speed of flyers at full motor. `[Units: wu/s]`
    pub climb_rate: f32,
    /// Reported braking distance. `[Units: wu]`
    pub braking_distance: f32,
    /// Whether the mover is held in place.
    pub fixed: bool,
    /// Reactor range of jet flyers, in `[0, 1]`.
    pub reactor: Option<f32>,
    linear: f32,
    vertical: f32,
    turn: f32,
    landed: bool,
    collided: bool,
}

impl KinematicMover {
    /// A mover of `kind` standing at `position`, facing +x.
    pub fn new(kind: MoverKind, position: Vec3) -> Self {
        let profile = MoverProfile::new(kind);
        Self {
            kind,
            position,
            rotation_y: 0.0,
            radius: 2.0,
            max_speed: 30.0,
            turn_rate: 2.0,
            climb_rate: 20.0,
            braking_distance: 2.0,
            fixed: false,
            reactor: profile.has_jet().then_some(1.0),
            linear: 0.0,
            vertical: 0.0,
            turn: 0.0,
            landed: true,
            collided: false,
        }
    }

    /// The forward motor command.
    #[inline]
    pub fn linear_speed(&self) -> f32 {
        self.linear
    }

    /// The vertical motor command.
    #[inline]
    pub fn vertical_speed(&self) -> f32 {
        self.vertical
    }

    /// The turning motor command.
    #[inline]
    pub fn turn_speed(&self) -> f32 {
        self.turn
    }

    /// Raises the collision flag, as if the mover just bumped into something.
    pub fn collide(&mut self) {
        self.collided = true;
    }

    /// Applies the motor commands for `dt` seconds.
    pub fn step(&mut self, dt: f32, terrain: &dyn Terrain) {
        if self.fixed {
            return;
        }
        self.rotation_y = norm_angle(self.rotation_y + self.turn * self.turn_rate * dt);
        let forward = heading_vector(self.rotation_y) * self.linear * self.max_speed * dt;
        self.position.x += forward.x;
        self.position.z += forward.y;

        let floor = terrain.floor_level(planar(self.position));
        if MoverProfile::new(self.kind).is_flying() {
            let ceiling = terrain.flying_max_height().max(floor);
            self.position.y =
                (self.position.y + self.vertical * self.climb_rate * dt).clamp(floor, ceiling);
            self.landed = self.position.y <= floor + LANDED_TOLERANCE;
        } else {
            self.position.y = floor;
            self.landed = true;
        }
    }
}

impl Mover for KinematicMover {
    fn kind(&self) -> MoverKind {
        self.kind
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn rotation_y(&self) -> f32 {
        self.rotation_y
    }

    fn crash_sphere(&self) -> CrashSphere {
        CrashSphere::new(self.position, self.radius)
    }

    fn set_linear_speed(&mut self, speed: f32) {
        self.linear = speed.clamp(-1.0, 1.0);
    }

    fn set_vertical_speed(&mut self, speed: f32) {
        self.vertical = speed.clamp(-1.0, 1.0);
    }

    fn set_turn_speed(&mut self, speed: f32) {
        self.turn = speed.clamp(-1.0, 1.0);
    }

    fn is_landed(&self) -> bool {
        self.landed
    }

    fn has_collided(&self) -> bool {
        self.collided
    }

    fn clear_collision(&mut self) {
        self.collided = false;
    }

    fn is_fixed(&self) -> bool {
        self.fixed
    }

    fn reactor_range(&self) -> Option<f32> {
        self.reactor
    }

    fn braking_distance(&self) -> f32 {
        self.braking_distance
    }

    fn travel_time(&self, distance: f32, _direction: f32) -> f32 {
        if self.max_speed > 0.0 {
            distance.abs() / self.max_speed
        } else {
            0.0
        }
    }

    fn speed_ratio(&self) -> f32 {
        self.linear.abs()
    }
}
