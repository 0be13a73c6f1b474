//! Choosing where exactly to drive when the goal is an object.
//!
//! Buildings are approached at their hot point, a spot in front of the slot where they
//! take or hand out cargo. Loose cargo is approached from whichever side the mover
//! comes from. Vehicles are approached in front of their power slot.

use glam::{Vec2, Vec3};

use crate::{
    MoverKind, MoverProfile, ObjectKey, ObjectKind, TakeDistances, World, WorldObject,
    math::{distance_projected, local_to_world},
};

/// A building's hot point, see [`hot_point`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotPoint {
    /// Where to stand, in world space.
    pub position: Vec3,
    /// Extra distance to drive forward once there and facing the building.
    pub extra: f32,
}

/// How to approach a target object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Approach {
    /// From any side: the object is cargo lying on the ground.
    AnySide {
        /// Where to stop.
        position: Vec3,
    },
    /// From one specific spot, then drive `final_distance` forward.
    Single {
        /// Where to stop.
        position: Vec3,
        /// Distance to drive forward after turning to the object.
        final_distance: f32,
    },
}

/// The active, free standing object closest to `point` within `margin`.
///
/// On ties, the object visited last wins. Objects stacked on others are typically
/// inserted after what they stand on, so this prefers the item on top.
pub fn search_target(world: &World, point: Vec3, margin: f32) -> Option<ObjectKey> {
    let mut best = None;
    let mut best_distance = f32::INFINITY;
    for (key, object) in world {
        if !object.active || object.is_transported() {
            continue;
        }
        let distance = distance_projected(point, object.position);
        if distance <= margin && distance <= best_distance {
            best_distance = distance;
            best = Some(key);
        }
    }
    best
}

/// The hot point of a building, if it has one.
///
/// With `take` unset, this is the spot where the building takes or drops items. With
/// `take` set, it moves back along the building's facing by the take distance plus
/// `distance`, and [`HotPoint::extra`] tells how far to drive forward afterwards.
pub fn hot_point(
    object: &WorldObject,
    mover: &MoverProfile,
    take: bool,
    distance: f32,
    take_distances: TakeDistances,
) -> Option<HotPoint> {
    let TakeDistances { arm, other_arm } = take_distances;

    // Slot offset along the building's x-axis, extra distance, approach offset, and
    // whether the extra distance also moves the approach spot back.
    let (slot, extra, approach, keeps_extra) = match object.kind {
        ObjectKind::Derrick => (8.0, 4.0, arm, true),
        ObjectKind::Converter => (0.0, 4.0, arm, true),
        ObjectKind::ResearchCenter => (10.0, 2.5, arm + other_arm, true),
        ObjectKind::PowerPlant => (6.0, 6.0, arm + other_arm, false),
        ObjectKind::DefenseTower => (5.0, 4.0, arm + other_arm, true),
        ObjectKind::Laboratory => (6.0, 6.0, arm + other_arm, false),
        ObjectKind::NuclearPlant => (22.0, 4.0, arm + other_arm, true),
        ObjectKind::Factory => (4.0, 6.0, arm, true),
        ObjectKind::PowerStation | ObjectKind::RepairCenter => (4.0, 4.0, 0.0, false),
        ObjectKind::LightningRod if mover.is_flying() => (0.0, 20.0, 0.0, true),
        _ => return None,
    };

    let extra = if take && distance != 0.0 { extra } else { 0.0 };
    let mut local_x = slot;
    if take {
        local_x += approach + distance;
        if keeps_extra {
            local_x += extra;
        }
    }
    Some(HotPoint {
        position: local_to_world(object.position, object.rotation_y, Vec2::new(local_x, 0.0)),
        extra,
    })
}

/// If `point` lies on the hot point of a building, the spot to approach that building from
/// and the final distance to drive.
pub fn adjust_building(
    world: &World,
    mover: &MoverProfile,
    point: Vec3,
    margin: f32,
    distance: f32,
    take_distances: TakeDistances,
) -> Option<(Vec3, f32)> {
    world
        .values()
        .filter(|object| object.active && !object.is_transported())
        .find(|object| {
            hot_point(object, mover, false, 0.0, take_distances)
                .is_some_and(|hot| distance_projected(point, hot.position) <= margin)
        })
        .and_then(|building| hot_point(building, mover, true, distance, take_distances))
        .map(|hot| (hot.position, distance + hot.extra))
}

/// Where to go to reach `target`, standing `distance` away from its slot.
pub fn adjust_target(
    target: &WorldObject,
    mover: &MoverProfile,
    mover_position: Vec3,
    distance: f32,
    take_distances: TakeDistances,
) -> Approach {
    if matches!(mover.kind, MoverKind::Wasp | MoverKind::Worm) {
        return Approach::Single {
            position: target.position,
            final_distance: distance,
        };
    }

    if matches!(
        target.kind,
        ObjectKind::Cargo | ObjectKind::Wreck | ObjectKind::SpaceShip
    ) {
        let offset = mover_position - target.position;
        let length = offset.length();
        let position = if length > 0.0 {
            target.position + offset * (take_distances.arm + distance) / length
        } else {
            target.position
        };
        return Approach::AnySide { position };
    }

    if let (ObjectKind::Mover(kind), Some(slot)) = (target.kind, target.power_slot) {
        if MoverProfile::new(kind)
            .capabilities
            .contains(crate::Capabilities::VEHICLE)
        {
            let local = Vec2::new(
                slot.x - (take_distances.arm + take_distances.other_arm + distance),
                slot.y,
            );
            return Approach::Single {
                position: local_to_world(target.position, target.rotation_y, local),
                final_distance: distance,
            };
        }
    }

    if let Some(hot) = hot_point(target, mover, true, distance, take_distances) {
        return Approach::Single {
            position: hot.position,
            final_distance: distance + hot.extra,
        };
    }

    Approach::Single {
        position: target.position,
        final_distance: 0.0,
    }
}
