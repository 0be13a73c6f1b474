//! Getting clear of an obstacle the mover starts out overlapping.

#[cfg(feature = "bevy_reflect")]
use bevy_reflect::prelude::*;
use glam::Vec3;

use crate::{CrashSphere, ObjectKey, ObjectKind, World, math::distance_projected};

/// How a mover gets away from an obstacle it overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
pub enum LeakReaction {
    /// Turn so the obstacle is behind and drive away, or back off if it is in front.
    Disengage,
    /// Back straight out.
    Recede,
}

/// One entry of a [`LeakPolicy`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
pub struct LeakRule {
    /// How far to drive. `[Units: wu]`
    pub distance: f32,
    /// How to drive.
    pub reaction: LeakReaction,
}

impl LeakRule {
    /// Direction of travel for [`Mover::travel_time`](crate::Mover::travel_time).
    #[inline]
    pub fn direction(&self) -> f32 {
        match self.reaction {
            LeakReaction::Disengage => 1.0,
            LeakReaction::Recede => -1.0,
        }
    }
}

/// Per obstacle kind rules for getting clear of an overlapped obstacle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
pub struct LeakPolicy {
    /// Obstacles closer than the sum of both radii plus this count as overlapped. `[Units: wu]`
    pub clearance: f32,
    /// Rule for obstacles without an override.
    pub default: LeakRule,
    /// Rules for specific obstacle kinds.
    pub overrides: Vec<(ObjectKind, LeakRule)>,
}

impl Default for LeakPolicy {
    fn default() -> Self {
        Self {
            clearance: 4.0,
            default: LeakRule {
                distance: 4.0,
                reaction: LeakReaction::Disengage,
            },
            overrides: vec![(
                ObjectKind::Factory,
                LeakRule {
                    distance: 16.0,
                    reaction: LeakReaction::Recede,
                },
            )],
        }
    }
}

impl LeakPolicy {
    /// The rule applying to an obstacle kind.
    pub fn rule_for(&self, kind: ObjectKind) -> LeakRule {
        self.overrides
            .iter()
            .find(|(overridden, _)| *overridden == kind)
            .map_or(self.default, |(_, rule)| *rule)
    }
}

/// A pending leak maneuver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakManeuver {
    /// Center of the overlapped collision sphere.
    pub obstacle: Vec3,
    /// The obstacle's kind.
    pub kind: ObjectKind,
    /// How to get clear.
    pub rule: LeakRule,
}

/// Finds the obstacle a grounded mover overlaps, if any.
///
/// Only the collision sphere nearest to the mover is considered.
pub fn leak_search(
    world: &World,
    mover: Option<ObjectKey>,
    sphere: CrashSphere,
    landed: bool,
    policy: &LeakPolicy,
) -> Option<LeakManeuver> {
    if !landed {
        return None;
    }

    let mut nearest: Option<(f32, CrashSphere, ObjectKind)> = None;
    for (key, object) in world {
        if Some(key) == mover || !object.active || !object.detectable || object.is_transported()
        {
            continue;
        }
        for other in &object.crash_spheres {
            let distance = distance_projected(sphere.center, other.center);
            if nearest.is_none_or(|(best, _, _)| distance < best) {
                nearest = Some((distance, *other, object.kind));
            }
        }
    }

    let (distance, obstacle, kind) = nearest?;
    if distance > sphere.radius + obstacle.radius + policy.clearance {
        return None;
    }
    Some(LeakManeuver {
        obstacle: obstacle.center,
        kind,
        rule: policy.rule_for(kind),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorldObject;

    fn sphere() -> CrashSphere {
        CrashSphere::new(Vec3::ZERO, 2.0)
    }

    #[test]
    fn nothing_nearby_means_no_leak() {
        let mut world = World::with_key();
        world.insert(
            WorldObject::new(ObjectKind::Other, Vec3::new(9.0, 0.0, 0.0))
                .with_sphere(Vec3::ZERO, 2.0),
        );
        let policy = LeakPolicy::default();
        assert_eq!(leak_search(&world, None, sphere(), true, &policy), None);
    }

    #[test]
    fn overlapping_obstacles_are_disengaged_from() {
        let mut world = World::with_key();
        world.insert(
            WorldObject::new(ObjectKind::Other, Vec3::new(7.0, 0.0, 0.0))
                .with_sphere(Vec3::ZERO, 2.0),
        );
        world.insert(
            WorldObject::new(ObjectKind::Other, Vec3::new(0.0, 0.0, 7.5))
                .with_sphere(Vec3::ZERO, 2.0),
        );
        let policy = LeakPolicy::default();
        let maneuver = leak_search(&world, None, sphere(), true, &policy).unwrap();
        assert_eq!(maneuver.obstacle, Vec3::new(7.0, 0.0, 0.0));
        assert_eq!(maneuver.rule.reaction, LeakReaction::Disengage);
        assert_eq!(maneuver.rule.direction(), 1.0);
    }

    #[test]
    fn factories_are_backed_out_of() {
        let mut world = World::with_key();
        world.insert(
            WorldObject::new(ObjectKind::Factory, Vec3::new(3.0, 0.0, 0.0))
                .with_sphere(Vec3::ZERO, 8.0),
        );
        let maneuver = leak_search(&world, None, sphere(), true, &LeakPolicy::default()).unwrap();
        assert_eq!(maneuver.kind, ObjectKind::Factory);
        assert_eq!(maneuver.rule.reaction, LeakReaction::Recede);
        assert_eq!(maneuver.rule.distance, 16.0);
    }

    #[test]
    fn flyers_and_hidden_objects_do_not_leak() {
        let mut world = World::with_key();
        let mut hidden = WorldObject::new(ObjectKind::Other, Vec3::new(1.0, 0.0, 0.0))
            .with_sphere(Vec3::ZERO, 2.0);
        hidden.detectable = false;
        world.insert(hidden);
        let policy = LeakPolicy::default();
        assert_eq!(leak_search(&world, None, sphere(), true, &policy), None);

        world.insert(
            WorldObject::new(ObjectKind::Other, Vec3::new(1.0, 0.0, 0.0))
                .with_sphere(Vec3::ZERO, 2.0),
        );
        assert!(leak_search(&world, None, sphere(), true, &policy).is_some());
        assert_eq!(leak_search(&world, None, sphere(), false, &policy), None);
    }
}
