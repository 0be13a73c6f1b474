//! Local steering for movers that drive straight at their goal.
//!
//! Every nearby collision sphere between the mover and its goal pushes the mover away,
//! with a strength falling off towards the edge of the sphere's influence radius.

use glam::{Vec2, Vec3};

use crate::{CrashSphere, MoverKind, MoverProfile, ObjectKey, ObjectKind, World, math::planar};

/// Strength of the push at the center of an obstacle, per unit of distance.
const REPULSION_GAIN: f32 = 0.2;
/// Obstacles this close to the goal are what the mover is heading for. `[Units: wu]`
const GOAL_TOLERANCE: f32 = 1.0;
/// Falloff exponent of the vertical repulsion of flyers.
const VERTICAL_EXPONENT: f32 = 1.5;

/// The mover asking for a steering correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepulsionQuery<'a> {
    /// The mover itself, skipped when scanning the world.
    pub mover: Option<ObjectKey>,
    /// The mover's profile.
    pub profile: &'a MoverProfile,
    /// The mover's main collision sphere.
    pub sphere: CrashSphere,
    /// Where the mover is going.
    pub goal: Vec3,
    /// Whether the mover stands on the floor.
    pub landed: bool,
    /// The mover's braking distance.
    pub braking_distance: f32,
}

/// Planar push away from obstacles between the mover and its goal, at most 1 long.
///
/// Obstacles farther from the mover than the goal, and obstacles sitting on the goal, are
/// ignored. Aliens walk over loose items, and nothing avoids or is avoided by worms.
pub fn compute_repulsion(world: &World, query: &RepulsionQuery) -> Vec2 {
    let profile = query.profile;
    if profile.burrows() {
        return Vec2::ZERO;
    }
    let mover = query.sphere;
    let goal_distance = mover.center.distance(query.goal);
    let margin = profile.margin(query.landed, query.braking_distance);
    let exponent = profile.repulsion_exponent;

    let mut push = Vec2::ZERO;
    for (key, object) in world {
        if Some(key) == query.mover || !object.active || object.is_transported() {
            continue;
        }
        if object.kind == ObjectKind::Mover(MoverKind::Worm) {
            continue;
        }
        if profile.is_alien() && is_loose_item(object.kind) {
            continue;
        }
        let margin = match profile.same_kind_margin {
            Some(same) if object.kind == ObjectKind::Mover(profile.kind) => same,
            _ => margin,
        };

        for sphere in &object.crash_spheres {
            if !sphere.overlaps_vertically(&mover) {
                continue;
            }
            if sphere.center.distance(query.goal) <= GOAL_TOLERANCE {
                continue;
            }
            let reach = sphere.radius + mover.radius + margin;
            let distance = planar(sphere.center).distance(planar(mover.center));
            if distance > goal_distance || distance > reach {
                continue;
            }
            let falloff = REPULSION_GAIN - REPULSION_GAIN * (distance / reach).powf(exponent);
            push += (planar(mover.center) - planar(sphere.center)) * falloff;
        }
    }
    push.clamp_length_max(1.0)
}

/// Vertical push of a flyer away from the spheres below or above it, in `[-1, 1]`.
pub fn compute_vertical_repulsion(
    world: &World,
    mover: Option<ObjectKey>,
    sphere: CrashSphere,
) -> f32 {
    let mut push = 0.0;
    for (key, object) in world {
        if Some(key) == mover || !object.active || object.is_transported() {
            continue;
        }
        if object.kind == ObjectKind::Mover(MoverKind::Worm) {
            continue;
        }
        for other in &object.crash_spheres {
            let reach = other.radius + sphere.radius;
            let distance = planar(other.center).distance(planar(sphere.center));
            if distance > reach {
                continue;
            }
            let falloff =
                REPULSION_GAIN - REPULSION_GAIN * (distance / reach).powf(VERTICAL_EXPONENT);
            push += (sphere.center.y - other.center.y) * falloff;
        }
    }
    push.clamp(-1.0, 1.0)
}

fn is_loose_item(kind: ObjectKind) -> bool {
    matches!(
        kind,
        ObjectKind::Cargo | ObjectKind::Bomb | ObjectKind::Plant | ObjectKind::Mushroom
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::WorldObject;

    fn query<'a>(profile: &'a MoverProfile, goal: Vec3) -> RepulsionQuery<'a> {
        RepulsionQuery {
            mover: None,
            profile,
            sphere: CrashSphere::new(Vec3::ZERO, 1.0),
            goal,
            landed: true,
            braking_distance: 2.0,
        }
    }

    fn world_with(kind: ObjectKind, position: Vec3, radius: f32) -> World {
        let mut world = World::with_key();
        world.insert(WorldObject::new(kind, position).with_sphere(Vec3::ZERO, radius));
        world
    }

    #[test]
    fn pushes_away_from_obstacles_ahead() {
        let profile = MoverProfile::new(MoverKind::Wheeled);
        let world = world_with(ObjectKind::Other, Vec3::new(3.0, 0.0, 0.0), 1.0);
        let push = compute_repulsion(&world, &query(&profile, Vec3::new(20.0, 0.0, 0.0)));
        // Reach 1 + 1 + 5 = 7, so the falloff is 0.2 - 0.2 * (3/7)^1.5.
        let expected = -3.0 * (0.2 - 0.2 * (3.0_f32 / 7.0).powf(1.5));
        assert_relative_eq!(push.x, expected, epsilon = 1e-5);
        assert_relative_eq!(push.y, 0.0);
    }

    #[test]
    fn ignores_obstacles_beyond_the_goal_or_on_it() {
        let profile = MoverProfile::new(MoverKind::Wheeled);
        let beyond = world_with(ObjectKind::Other, Vec3::new(4.0, 0.0, 0.0), 1.0);
        let push = compute_repulsion(&beyond, &query(&profile, Vec3::new(3.0, 0.0, 0.0)));
        assert_eq!(push, Vec2::ZERO);

        let on_goal = world_with(ObjectKind::Other, Vec3::new(3.0, 0.0, 0.5), 1.0);
        let push = compute_repulsion(&on_goal, &query(&profile, Vec3::new(3.0, 0.0, 0.0)));
        assert_eq!(push, Vec2::ZERO);
    }

    #[test]
    fn aliens_walk_over_loose_items() {
        let cargo = world_with(ObjectKind::Cargo, Vec3::new(0.0, 0.0, 3.0), 1.0);
        let goal = Vec3::new(0.0, 0.0, 20.0);
        let ant = MoverProfile::new(MoverKind::Ant);
        assert_eq!(compute_repulsion(&cargo, &query(&ant, goal)), Vec2::ZERO);
        let tracks = MoverProfile::new(MoverKind::Tracked);
        assert!(compute_repulsion(&cargo, &query(&tracks, goal)).y < 0.0);
    }

    #[test]
    fn worms_neither_avoid_nor_get_avoided() {
        let goal = Vec3::new(20.0, 0.0, 0.0);
        let rock = world_with(ObjectKind::Other, Vec3::new(3.0, 0.0, 0.0), 1.0);
        let worm = MoverProfile::new(MoverKind::Worm);
        assert_eq!(compute_repulsion(&rock, &query(&worm, goal)), Vec2::ZERO);

        let worm_ahead = world_with(
            ObjectKind::Mover(MoverKind::Worm),
            Vec3::new(3.0, 0.0, 0.0),
            1.0,
        );
        let wheels = MoverProfile::new(MoverKind::Wheeled);
        assert_eq!(compute_repulsion(&worm_ahead, &query(&wheels, goal)), Vec2::ZERO);
    }

    #[test]
    fn push_is_at_most_one_long() {
        let profile = MoverProfile::new(MoverKind::Wheeled);
        let mut world = World::with_key();
        for z in [-0.5, 0.0, 0.5] {
            world.insert(
                WorldObject::new(ObjectKind::Other, Vec3::new(5.0, 0.0, z))
                    .with_sphere(Vec3::ZERO, 6.0),
            );
        }
        let push = compute_repulsion(&world, &query(&profile, Vec3::new(50.0, 0.0, 0.0)));
        assert_relative_eq!(push.length(), 1.0, epsilon = 1e-5);
        assert!(push.x < 0.0);
    }

    #[test]
    fn flyers_are_pushed_up_over_what_is_below() {
        let world = world_with(ObjectKind::Other, Vec3::new(1.0, 0.0, 0.0), 3.0);
        let sphere = CrashSphere::new(Vec3::new(0.0, 4.0, 0.0), 2.0);
        let push = compute_vertical_repulsion(&world, None, sphere);
        assert!(push > 0.0);
        assert!(push <= 1.0);

        let far = CrashSphere::new(Vec3::new(10.0, 4.0, 0.0), 2.0);
        assert_eq!(compute_vertical_repulsion(&world, None, far), 0.0);
    }
}
