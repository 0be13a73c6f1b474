use std::f32::consts::SQRT_2;

use glam::Vec2;

use crate::{ObstacleField, Plane, Terrain};

/// How [`ObstacleField::test_line`] validates a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineCheck {
    /// Only the blocking plane is tested.
    Plain,
    /// Also marks the segment into the scratch plane, and rejects it if it runs into a
    /// corridor marked by an earlier leg.
    ///
    /// Marking starts `cell_size * √2 / sin(branch_angle)` from the segment's start, where
    /// neighboring branches are more than a cell apart.
    Corridor {
        /// Angle between two neighboring search branches. `[Units: Radians]`
        branch_angle: f32,
    },
}

impl ObstacleField {
    /// Whether a mover can go straight from `start` to `end`.
    ///
    /// Samples the segment every half cell. The last sample is `end` itself.
    pub fn test_line(
        &mut self,
        terrain: &dyn Terrain,
        start: Vec2,
        end: Vec2,
        check: LineCheck,
    ) -> bool {
        let distance = start.distance(end);
        if distance == 0.0 {
            return true;
        }
        let step = self.cell_size() * 0.5;
        let increment = (end - start) * step / distance;
        let samples = ((distance / step) as usize).max(1);

        let corridor_start = match check {
            LineCheck::Plain => None,
            LineCheck::Corridor { branch_angle } => {
                Some(self.cell_size() * SQRT_2 / branch_angle.sin())
            }
        };
        let mut last_marked = None;
        if corridor_start.is_some() {
            let cell = self.cell_at(start);
            self.set_dot(Plane::Scratch, cell);
            last_marked = Some(cell);
        }

        let mut position = start;
        for i in 0..samples {
            position = if i == samples - 1 {
                end
            } else {
                position + increment
            };
            let cell = self.cell_at(position);

            if let Some(corridor_start) = corridor_start {
                if i > 2
                    && last_marked != Some(cell)
                    && self.test_dot(terrain, Plane::Scratch, cell)
                {
                    return false;
                }
                if step * (i + 1) as f32 > corridor_start && i + 2 < samples {
                    self.set_dot(Plane::Scratch, cell);
                    last_marked = Some(cell);
                }
            }

            if self.test_dot(terrain, Plane::Blocking, cell) {
                return false;
            }
        }
        true
    }
}
