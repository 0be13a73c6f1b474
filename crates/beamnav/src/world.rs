//! The world snapshot the navigation reads, and the mover it drives.

#[cfg(feature = "bevy_reflect")]
use bevy_reflect::prelude::*;
use glam::{Vec2, Vec3};
use slotmap::SlotMap;

use crate::MoverKind;

slotmap::new_key_type! {
    /// A stable handle to an object in a [`World`].
    pub struct ObjectKey;
}

/// All objects known to the navigation, addressed by [`ObjectKey`].
///
/// The navigation only reads it. Whoever owns it may change it between frames.
pub type World = SlotMap<ObjectKey, WorldObject>;

/// A collision sphere in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CrashSphere {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere.
    pub radius: f32,
}

impl CrashSphere {
    /// Creates a sphere.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Whether the vertical extents of both spheres overlap.
    #[inline]
    pub fn overlaps_vertically(&self, other: &CrashSphere) -> bool {
        self.center.y - self.radius <= other.center.y + other.radius
            && self.center.y + self.radius >= other.center.y - other.radius
    }
}

/// What an object is, as far as approaching and avoiding it goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
pub enum ObjectKind {
    /// Extracts ore and drops it on its hot point.
    Derrick,
    /// Turns ore into metal.
    Converter,
    /// Research center.
    ResearchCenter,
    /// Power cell factory.
    PowerPlant,
    /// Defense tower.
    DefenseTower,
    /// Laboratory.
    Laboratory,
    /// Nuclear power plant.
    NuclearPlant,
    /// Vehicle factory. Movers caught inside it back out.
    Factory,
    /// Recharging station.
    PowerStation,
    /// Repair center.
    RepairCenter,
    /// Lightning conductor. Only flyers use its hot point.
    LightningRod,
    /// The space ship. Approached from any side.
    SpaceShip,
    /// Something that can be picked up and carried.
    Cargo,
    /// A wrecked vehicle that can be recovered.
    Wreck,
    /// Vegetation.
    Plant,
    /// A mushroom.
    Mushroom,
    /// A bomb lying on the ground.
    Bomb,
    /// Anything that moves on its own.
    Mover(MoverKind),
    /// Anything else.
    Other,
}

/// One entry of the [`World`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldObject {
    /// What the object is.
    pub kind: ObjectKind,
    /// Position of the object's origin.
    pub position: Vec3,
    /// Heading of the object. Its local x-axis points along it.
    pub rotation_y: f32,
    /// Collision spheres, in world space.
    pub crash_spheres: Vec<CrashSphere>,
    /// Inactive objects take no part in the simulation.
    pub active: bool,
    /// Undetectable objects are invisible to the leak check.
    pub detectable: bool,
    /// Position of the power slot in the object's local ground frame, if it has one.
    pub power_slot: Option<Vec2>,
    transported_by: Option<ObjectKey>,
    cargo: Option<ObjectKey>,
    power_cell: Option<ObjectKey>,
}

impl WorldObject {
    /// Creates an active, detectable object without collision spheres.
    pub fn new(kind: ObjectKind, position: Vec3) -> Self {
        Self {
            kind,
            position,
            rotation_y: 0.0,
            crash_spheres: Vec::new(),
            active: true,
            detectable: true,
            power_slot: None,
            transported_by: None,
            cargo: None,
            power_cell: None,
        }
    }

    /// Adds a collision sphere relative to the object's position.
    pub fn with_sphere(mut self, offset: Vec3, radius: f32) -> Self {
        self.crash_spheres
            .push(CrashSphere::new(self.position + offset, radius));
        self
    }

    /// Sets the heading.
    pub fn with_rotation(mut self, rotation_y: f32) -> Self {
        self.rotation_y = rotation_y;
        self
    }

    /// Sets the power slot position.
    pub fn with_power_slot(mut self, slot: Vec2) -> Self {
        self.power_slot = Some(slot);
        self
    }

    /// The object carrying this one, if any.
    #[inline]
    pub fn transporter(&self) -> Option<ObjectKey> {
        self.transported_by
    }

    /// Whether another object carries this one.
    #[inline]
    pub fn is_transported(&self) -> bool {
        self.transported_by.is_some()
    }

    /// The object this one carries, if any.
    #[inline]
    pub fn cargo(&self) -> Option<ObjectKey> {
        self.cargo
    }

    /// The power cell plugged into this object, if any.
    #[inline]
    pub fn power_cell(&self) -> Option<ObjectKey> {
        self.power_cell
    }

    /// Sets or clears the object carrying this one.
    pub fn set_transporter(&mut self, transporter: Option<ObjectKey>) {
        self.transported_by = transporter;
    }

    /// Sets or clears the carried object.
    pub fn set_cargo(&mut self, cargo: Option<ObjectKey>) {
        self.cargo = cargo;
    }

    /// Sets or clears the power cell.
    pub fn set_power_cell(&mut self, power_cell: Option<ObjectKey>) {
        self.power_cell = power_cell;
    }
}

/// Read access to the mover's physics, and its motors.
///
/// Motor speeds are normalized to `[-1, 1]`. A positive turn speed increases the heading.
pub trait Mover {
    /// What kind of mover this is.
    fn kind(&self) -> MoverKind;

    /// Position of the mover's origin.
    fn position(&self) -> Vec3;

    /// Heading of the mover.
    fn rotation_y(&self) -> f32;

    /// The mover's main collision sphere.
    fn crash_sphere(&self) -> CrashSphere;

    /// Sets the forward motor. Negative drives backwards.
    fn set_linear_speed(&mut self, speed: f32);

    /// Sets the vertical motor of flyers. Positive climbs.
    fn set_vertical_speed(&mut self, speed: f32);

    /// Sets the turning motor.
    fn set_turn_speed(&mut self, speed: f32);

    /// Whether the mover stands on the floor.
    fn is_landed(&self) -> bool;

    /// Whether the mover hit something since the flag was last cleared.
    fn has_collided(&self) -> bool;

    /// Clears the collision flag.
    fn clear_collision(&mut self);

    /// Whether something holds the mover in place.
    fn is_fixed(&self) -> bool {
        false
    }

    /// Remaining reactor range of jet flyers in `[0, 1]`. `None` for movers without a reactor.
    fn reactor_range(&self) -> Option<f32> {
        None
    }

    /// Distance the mover needs to stop from full speed.
    fn braking_distance(&self) -> f32;

    /// Time needed to drive `distance`, forwards if `direction` is positive.
    fn travel_time(&self, distance: f32, direction: f32) -> f32;

    /// Distance actually covered when commanded to drive `distance`.
    fn travel_length(&self, distance: f32) -> f32 {
        distance
    }

    /// Current forward speed over top speed.
    fn speed_ratio(&self) -> f32;
}
