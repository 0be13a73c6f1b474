//! Resumable beam search for a waypoint path.
//!
//! The search is a depth-first walk over a fan of candidate legs. Every node first tries
//! the leg pointing straight at the goal, then legs deviating by growing angles to
//! alternating sides. The walk is kept on an explicit stack of [`SearchFrame`]s so it can
//! stop after a fixed number of branches and pick up exactly where it left off on the
//! next frame.

use std::collections::HashSet;

use glam::Vec2;
use thiserror::Error;

use crate::{Cell, GotoConfig, LineCheck, ObstacleField, Terrain, WaypointPath};

/// One node of the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchFrame {
    /// Where the node stands.
    pub position: Vec2,
    /// Index of the next branch to try from here.
    pub next_branch: u16,
}

/// Outcome of a [`BeamSearch::search`] call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchProgress {
    /// A path was found.
    Found(WaypointPath),
    /// The iteration budget ran out. Call again to resume.
    Continue,
}

/// Ways a [`BeamSearch`] can fail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    /// Every branch was tried without reaching the goal.
    #[error("no path to the goal exists")]
    Impossible,
    /// The path would need more waypoints than allowed.
    #[error("the path needs more than {max} waypoints")]
    TooManyWaypoints {
        /// The waypoint capacity.
        max: usize,
    },
}

/// A resumable search from a start to a goal through an [`ObstacleField`].
#[derive(Debug, Clone)]
pub struct BeamSearch {
    start: Vec2,
    goal: Vec2,
    goal_radius: f32,
    step: f32,
    branch_angle: f32,
    branch_count: u16,
    iteration_budget: u32,
    max_waypoints: usize,
    stack: Vec<SearchFrame>,
    /// Cells already holding a node. Only prunes early: corridor marks reject most of these
    /// cells anyway, but the end of a leg is left unmarked, and this skips the line test.
    visited: HashSet<Cell>,
    started: bool,
    iterations: u64,
}

impl BeamSearch {
    /// Prepares a search. `goal_radius` is how close to the goal the path has to end, 0 to
    /// end on the goal itself.
    pub fn new(start: Vec2, goal: Vec2, goal_radius: f32, config: &GotoConfig) -> Self {
        Self {
            start,
            goal,
            goal_radius: goal_radius.max(0.0),
            step: config.search_step(start.distance(goal)),
            branch_angle: config.branch_angle(),
            branch_count: 1 + 2 * config.subdivisions,
            iteration_budget: config.iteration_budget.max(1),
            max_waypoints: config.max_waypoints.max(3),
            stack: Vec::new(),
            visited: HashSet::new(),
            started: false,
            iterations: 0,
        }
    }

    /// Length of each leg.
    #[inline]
    pub fn step(&self) -> f32 {
        self.step
    }

    /// The nodes on the current branch, from the start.
    #[inline]
    pub fn frames(&self) -> &[SearchFrame] {
        &self.stack
    }

    /// Branches evaluated over all calls so far.
    #[inline]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Searches until a path is found, the search fails, or the iteration budget is spent.
    ///
    /// Once it returned anything but [`SearchProgress::Continue`], the search is finished and
    /// must not be polled again.
    pub fn search(
        &mut self,
        field: &mut ObstacleField,
        terrain: &dyn Terrain,
    ) -> Result<SearchProgress, SearchError> {
        if !self.started {
            self.started = true;
            self.stack.push(SearchFrame {
                position: self.start,
                next_branch: 0,
            });
            self.visited.insert(field.cell_at(self.start));
            // Straight shot from the start, before any fanning out.
            let end = self.approach_point(self.start);
            if field.test_line(terrain, self.start, end, LineCheck::Plain) {
                return Ok(SearchProgress::Found(WaypointPath::new(vec![self.start, end])));
            }
        }

        let mut budget = self.iteration_budget;
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Err(SearchError::Impossible);
            };
            if frame.next_branch >= self.branch_count {
                self.stack.pop();
                continue;
            }
            if budget == 0 {
                tracing::trace!(
                    depth = self.stack.len(),
                    iterations = self.iterations,
                    "beam search yielding"
                );
                return Ok(SearchProgress::Continue);
            }
            budget -= 1;
            self.iterations += 1;

            let branch = frame.next_branch;
            frame.next_branch += 1;
            let position = frame.position;
            let candidate = beam_point(position, self.goal, self.branch_offset(branch), self.step);

            let cell = field.cell_at(candidate);
            if self.visited.contains(&cell) {
                continue;
            }
            let leg = LineCheck::Corridor {
                branch_angle: self.branch_angle,
            };
            if !field.test_line(terrain, position, candidate, leg) {
                continue;
            }
            // Start, this node and the final point have to fit.
            if self.stack.len() + 2 > self.max_waypoints {
                return Err(SearchError::TooManyWaypoints {
                    max: self.max_waypoints,
                });
            }

            self.visited.insert(cell);
            self.stack.push(SearchFrame {
                position: candidate,
                next_branch: 0,
            });

            if candidate.distance(self.goal) - self.goal_radius <= self.step {
                let end = self.approach_point(candidate);
                if field.test_line(terrain, candidate, end, LineCheck::Plain) {
                    let mut points: Vec<Vec2> =
                        self.stack.iter().map(|frame| frame.position).collect();
                    points.push(end);
                    return Ok(SearchProgress::Found(WaypointPath::new(points)));
                }
            }
        }
    }

    /// Angle of a branch relative to the heading towards the goal.
    ///
    /// Branch 0 points at the goal, then odd branches deviate to the positive side and even
    /// ones to the negative side, one step further every two branches.
    fn branch_offset(&self, branch: u16) -> f32 {
        if branch == 0 {
            return 0.0;
        }
        let magnitude = branch.div_ceil(2) as f32 * self.branch_angle;
        if branch % 2 == 1 { magnitude } else { -magnitude }
    }

    /// Where a path from `from` ends: on the goal, or `goal_radius` short of it.
    fn approach_point(&self, from: Vec2) -> Vec2 {
        if self.goal_radius == 0.0 {
            return self.goal;
        }
        let remaining = from.distance(self.goal) - self.goal_radius;
        if remaining <= 0.0 {
            return from;
        }
        beam_point(from, self.goal, 0.0, remaining)
    }
}

/// The point `step` away from `from`, turned by `angle` from the direction towards `goal`.
fn beam_point(from: Vec2, goal: Vec2, angle: f32, step: f32) -> Vec2 {
    let delta = goal - from;
    let heading = if delta == Vec2::ZERO {
        0.0
    } else {
        delta.y.atan2(delta.x)
    };
    from + Vec2::from_angle(heading + angle) * step
}
