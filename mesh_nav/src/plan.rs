//! # Plan
//!
//! This module defines the waypoint plan produced by the planner and consumed
//! incrementally by the controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use crate::pose::Pose;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An ordered sequence of waypoint poses. Insertion order is traversal order,
/// reading start to goal.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Plan {
    poses: Vec<Pose>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Plan {
    pub fn new(poses: Vec<Pose>) -> Self {
        Self { poses }
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Pose> {
        self.poses.get(index)
    }

    pub fn last(&self) -> Option<&Pose> {
        self.poses.last()
    }

    /// Drop the first waypoint of a raw plan.
    ///
    /// The first pose of a freshly planned path duplicates the agent's start
    /// pose and is removed before the plan is accepted for tracking. Returns
    /// `None` if nothing would remain.
    pub fn strip_start(mut self) -> Option<Self> {
        if self.poses.len() < 2 {
            return None;
        }
        self.poses.remove(0);
        Some(self)
    }

    /// The length of the whole plan in meters, as the sum of the segment
    /// lengths between successive waypoints.
    pub fn total_length_m(&self) -> f64 {
        self.length_to_index_m(self.poses.len().saturating_sub(1))
    }

    /// The length in meters along the plan from the first waypoint up to the
    /// waypoint at `index`.
    pub fn length_to_index_m(&self, index: usize) -> f64 {
        let end = index.min(self.poses.len().saturating_sub(1));
        let mut length_m = 0.0;
        for i in 1..=end {
            length_m += (self.poses[i].position_m - self.poses[i - 1].position_m).norm();
        }
        length_m
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
