//! Per-kind traversal parameters of a mover.

#[cfg(feature = "bevy_reflect")]
use bevy_reflect::prelude::*;
use bitflags::bitflags;

/// The kinds of mover the navigation engine knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
pub enum MoverKind {
    /// Wheeled vehicle.
    Wheeled,
    /// Vehicle on caterpillar tracks.
    Tracked,
    /// Large tracked worker vehicle.
    HeavyTracked,
    /// Tracked vehicle that keeps driving under water.
    Amphibious,
    /// Vehicle on insect legs.
    Legged,
    /// Jet-powered flying vehicle.
    Flying,
    /// A person on foot.
    Human,
    /// Alien ant.
    Ant,
    /// Alien spider.
    Spider,
    /// Alien wasp.
    Wasp,
    /// Alien worm. Burrows, so it ignores obstacles.
    Worm,
    /// Alien queen.
    AlienQueen,
}

bitflags! {
    /// Capabilities of a mover, resolved once from its [`MoverKind`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct Capabilities: u8 {
        /// Can leave the ground.
        const FLYING = 1 << 0;
        /// Can drive under water.
        const SUBMERSIBLE = 1 << 1;
        /// Arrives with a looser tolerance.
        const APPROXIMATE = 1 << 2;
        /// Alien creature: ignores loose items when steering and stops on collision.
        const ALIEN = 1 << 3;
        /// Flies with a reactor that can overheat.
        const JET = 1 << 4;
        /// Carries a power slot and can be serviced.
        const VEHICLE = 1 << 5;
    }
}

/// Extra clearance kept by the local steering around obstacles.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RepulsionMargin {
    /// 1.1 times the braking distance of the mover.
    BrakingDistance,
    /// A fixed margin, larger while airborne.
    Fixed {
        /// Margin while on the ground. `[Units: wu]`
        grounded: f32,
        /// Margin while in the air. `[Units: wu]`
        airborne: f32,
    },
}

/// Terrain acceptance of a mover, used when rasterizing the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TerrainRules {
    /// Steepest floor a ground mover can climb. `[Units: Radians]`
    pub slope_limit: f32,
    /// Can drive under water.
    pub submersible: bool,
    /// Flies over the terrain: only the flying ceiling blocks it.
    pub flying: bool,
}

impl TerrainRules {
    /// Floor this far below the water level is too deep for non-submersible movers. `[Units: wu]`
    pub const WATER_DEPTH_TOLERANCE: f32 = 2.0;
    /// Floor this close to the flying ceiling blocks flyers. `[Units: wu]`
    pub const CEILING_CLEARANCE: f32 = 5.0;
}

/// Derived, read-only traversal parameters of one mover kind.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct MoverProfile {
    /// The kind this profile was derived from.
    pub kind: MoverKind,
    /// What the mover can do.
    pub capabilities: Capabilities,
    /// Which floor the mover accepts.
    pub terrain: TerrainRules,
    /// Clearance of the local steering.
    pub repulsion_margin: RepulsionMargin,
    /// Replaces the repulsion margin between two movers of this same kind.
    pub same_kind_margin: Option<f32>,
    /// Falloff exponent of the local steering. Higher keeps full strength closer to the edge.
    pub repulsion_exponent: f32,
}

impl MoverProfile {
    /// Derives the profile of a mover kind.
    pub fn new(kind: MoverKind) -> Self {
        use MoverKind::*;

        let capabilities = match kind {
            Wheeled | Tracked | Legged => Capabilities::VEHICLE,
            HeavyTracked => Capabilities::VEHICLE | Capabilities::APPROXIMATE,
            Amphibious => Capabilities::VEHICLE | Capabilities::SUBMERSIBLE,
            Flying => Capabilities::VEHICLE | Capabilities::FLYING | Capabilities::JET,
            Human => Capabilities::APPROXIMATE,
            Ant | Spider | Wasp | Worm | AlienQueen => {
                Capabilities::ALIEN | Capabilities::APPROXIMATE
            }
        };
        let slope_limit_degrees: f32 = match kind {
            Tracked | HeavyTracked | Amphibious => 35.0,
            Flying => 15.0,
            Legged => 60.0,
            _ => 20.0,
        };
        let repulsion_margin = match kind {
            Wheeled => RepulsionMargin::Fixed {
                grounded: 5.0,
                airborne: 5.0,
            },
            Tracked | Legged => RepulsionMargin::Fixed {
                grounded: 4.0,
                airborne: 4.0,
            },
            Flying => RepulsionMargin::Fixed {
                grounded: 5.0,
                airborne: 10.0,
            },
            Wasp => RepulsionMargin::Fixed {
                grounded: 3.0,
                airborne: 5.0,
            },
            _ => RepulsionMargin::BrakingDistance,
        };
        let repulsion_exponent = match repulsion_margin {
            RepulsionMargin::Fixed { .. } => 1.5,
            RepulsionMargin::BrakingDistance => 2.0,
        };

        Self {
            kind,
            capabilities,
            terrain: TerrainRules {
                slope_limit: slope_limit_degrees.to_radians(),
                submersible: capabilities.contains(Capabilities::SUBMERSIBLE),
                flying: capabilities.contains(Capabilities::FLYING),
            },
            repulsion_margin,
            same_kind_margin: (kind == Wasp).then_some(2.0),
            repulsion_exponent,
        }
    }

    /// Whether the mover can leave the ground.
    #[inline]
    pub fn is_flying(&self) -> bool {
        self.capabilities.contains(Capabilities::FLYING)
    }

    /// Whether the mover is an alien creature.
    #[inline]
    pub fn is_alien(&self) -> bool {
        self.capabilities.contains(Capabilities::ALIEN)
    }

    /// Whether the mover arrives with a looser tolerance.
    #[inline]
    pub fn is_approximate(&self) -> bool {
        self.capabilities.contains(Capabilities::APPROXIMATE)
    }

    /// Whether the mover has a reactor that can overheat.
    #[inline]
    pub fn has_jet(&self) -> bool {
        self.capabilities.contains(Capabilities::JET)
    }

    /// Whether the mover ignores every obstacle.
    #[inline]
    pub fn burrows(&self) -> bool {
        self.kind == MoverKind::Worm
    }

    /// Crawling aliens race at their goal instead of stopping on it.
    #[inline]
    pub fn prefers_express(&self) -> bool {
        self.is_alien() && self.kind != MoverKind::Wasp
    }

    /// Steering margin around obstacles, given whether the mover is on the ground.
    pub fn margin(&self, landed: bool, braking_distance: f32) -> f32 {
        match self.repulsion_margin {
            RepulsionMargin::BrakingDistance => braking_distance * 1.1,
            RepulsionMargin::Fixed { grounded, airborne } => {
                if landed {
                    grounded
                } else {
                    airborne
                }
            }
        }
    }
}

impl From<MoverKind> for MoverProfile {
    fn from(kind: MoverKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn slope_limits_depend_on_the_drive() {
        let slope = |kind| MoverProfile::new(kind).terrain.slope_limit.to_degrees();
        assert_relative_eq!(slope(MoverKind::Wheeled), 20.0, epsilon = 1e-4);
        assert_relative_eq!(slope(MoverKind::Tracked), 35.0, epsilon = 1e-4);
        assert_relative_eq!(slope(MoverKind::Legged), 60.0, epsilon = 1e-4);
        assert_relative_eq!(slope(MoverKind::Flying), 15.0, epsilon = 1e-4);
    }

    #[test]
    fn only_amphibious_movers_submerge() {
        assert!(MoverProfile::new(MoverKind::Amphibious).terrain.submersible);
        assert!(!MoverProfile::new(MoverKind::Tracked).terrain.submersible);
    }

    #[test]
    fn flyers_keep_more_room_in_the_air() {
        let profile = MoverProfile::new(MoverKind::Flying);
        assert_relative_eq!(profile.margin(true, 3.0), 5.0);
        assert_relative_eq!(profile.margin(false, 3.0), 10.0);
    }

    #[test]
    fn humans_use_their_braking_distance() {
        let profile = MoverProfile::new(MoverKind::Human);
        assert_relative_eq!(profile.margin(true, 2.0), 2.2, epsilon = 1e-6);
        assert_relative_eq!(profile.repulsion_exponent, 2.0);
    }

    #[test]
    fn wasps_are_aliens_that_do_not_race() {
        let profile = MoverProfile::new(MoverKind::Wasp);
        assert!(profile.is_alien());
        assert!(!profile.prefers_express());
        assert_eq!(profile.same_kind_margin, Some(2.0));
        assert!(MoverProfile::new(MoverKind::Ant).prefers_express());
    }
}
