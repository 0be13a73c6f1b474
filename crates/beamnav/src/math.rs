//! Angle helpers and the world-to-cell mapping shared by the grid code.
//!
//! Headings follow the clockwise convention of the mover physics: a mover with
//! heading `a` faces the planar direction `(cos a, -sin a)`.

use std::f32::consts::{PI, TAU};

use glam::{IVec2, Vec2, Vec3};

/// Integer coordinates of a cell in an [`ObstacleField`](crate::ObstacleField).
pub type Cell = IVec2;

/// Projects a world position onto the ground plane, keeping `(x, z)`.
#[inline]
pub fn planar(position: Vec3) -> Vec2 {
    Vec2::new(position.x, position.z)
}

/// Planar distance between two world positions, ignoring height.
#[inline]
pub(crate) fn distance_projected(a: Vec3, b: Vec3) -> f32 {
    planar(a).distance(planar(b))
}

/// Maps a world coordinate onto the grid by explicit floor division.
///
/// `origin` is the world coordinate of the lower edge of cell 0. A coordinate lying
/// exactly on a cell edge belongs to the cell on its positive side.
#[inline]
pub(crate) fn floor_cell(coordinate: f32, origin: f32, cell_size: f32) -> i32 {
    ((coordinate - origin) / cell_size).floor() as i32
}

/// Normalizes an angle into `[0, 2π)`.
#[inline]
pub(crate) fn norm_angle(angle: f32) -> f32 {
    let angle = angle.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if angle >= TAU { 0.0 } else { angle }
}

/// Angle of the vector `(x, y)` in `[0, 2π)`. The zero vector has angle 0.
#[inline]
pub(crate) fn rotate_angle(x: f32, y: f32) -> f32 {
    if x == 0.0 && y == 0.0 {
        return 0.0;
    }
    norm_angle(y.atan2(x))
}

/// Signed smallest rotation turning heading `from` onto heading `to`, in `(-π, π]`.
#[inline]
pub(crate) fn direction(from: f32, to: f32) -> f32 {
    let mut from = norm_angle(from);
    let mut to = norm_angle(to);
    if from - to > PI {
        to += TAU;
    }
    if from - to < -PI {
        from += TAU;
    }
    to - from
}

/// Heading a mover needs to face `to` when standing on `from`.
#[inline]
pub fn heading_to(from: Vec2, to: Vec2) -> f32 {
    let delta = to - from;
    rotate_angle(delta.x, -delta.y)
}

/// Planar unit vector a mover with the given heading faces.
#[inline]
pub fn heading_vector(heading: f32) -> Vec2 {
    Vec2::new(heading.cos(), -heading.sin())
}

/// Transforms a point from an object's local ground frame into the world.
///
/// The local x-axis is the object's facing direction.
#[inline]
pub(crate) fn local_to_world(origin: Vec3, heading: f32, local: Vec2) -> Vec3 {
    let forward = heading_vector(heading);
    let side = Vec2::new(heading.sin(), heading.cos());
    let offset = forward * local.x + side * local.y;
    Vec3::new(origin.x + offset.x, origin.y, origin.z + offset.y)
}
