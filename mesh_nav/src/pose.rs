//! # Pose
//!
//! This module defines the pose type used by both the planner and the
//! controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose (position and attitude) of the agent, or of a waypoint, in the
/// map frame.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Default)]
pub struct Pose {
    /// The position in the map frame
    pub position_m: Vector3<f64>,

    /// The attitude in the map frame. This quaternion rotates the body frame
    /// forward axis (+X) into the map frame.
    pub attitude_q: UnitQuaternion<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(position_m: Vector3<f64>, attitude_q: UnitQuaternion<f64>) -> Self {
        Self {
            position_m,
            attitude_q,
        }
    }

    /// Return the unit vector pointing in the direction the pose is facing.
    pub fn forward(&self) -> Vector3<f64> {
        self.attitude_q * Vector3::x()
    }
}
