//! # Mesh navigation
//!
//! This library plans and follows cost-aware shortest paths across arbitrary
//! triangulated surfaces, for driving a mobile agent over non-planar terrain.
//!
//! Two subsystems share the same mesh query primitives:
//! - The [`planner::CvpPlanner`] computes a geodesic-with-cost distance field
//!   over the mesh by continuous wavefront propagation, derives a steering
//!   vector field from it, and extracts a waypoint plan by walking the field.
//! - The [`controller::MeshController`] re-localises the agent on the mesh
//!   every control cycle, tracks progress along the accepted plan, looks
//!   ahead along it, and shapes heading and position error into velocity
//!   commands through either a nonlinear law or a PID law.
//!
//! The mesh itself is an external collaborator consumed behind the
//! [`mesh::MeshMap`] trait; the host navigation runtime drives both
//! subsystems through the [`Planner`] and [`Controller`] traits and owns all
//! timing and threading.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Trajectory controller - keeps the agent on the planned path
pub mod controller;

/// Mesh interface and shared geometry primitives
pub mod mesh;

/// Planner and controller parameters
pub mod params;

/// Defines the waypoint plan type
pub mod plan;

/// Wavefront planner - produces waypoint plans over the mesh
pub mod planner;

/// Defines the pose type
pub mod pose;

#[cfg(test)]
pub(crate) mod test_mesh;

// ---------------------------------------------------------------------------
// REEXPORTS
// ---------------------------------------------------------------------------

pub use controller::{ControlError, ControlOutput, ControlReport, MeshController, VelocityCommand};
pub use mesh::{EdgeHandle, FaceHandle, MeshMap, VertexHandle};
pub use params::{ControllerParams, PlannerParams, SteeringLawKind};
pub use plan::Plan;
pub use planner::{CancelFlag, CvpPlanner, PlanError};
pub use pose::Pose;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Capability interface of a path planner, as consumed by the host
/// navigation runtime.
///
/// The host owns invocation timing and threading: one planning call runs to
/// completion (or cancellation) before the next may start.
pub trait Planner {
    /// Plan a path from `start` to `goal`, locating both within
    /// `tolerance_m` of the mesh surface.
    fn make_plan(&mut self, start: &Pose, goal: &Pose, tolerance_m: f64)
        -> Result<Plan, PlanError>;

    /// Request cooperative cancellation of an in-flight call. Returns
    /// whether cancellation is supported.
    fn cancel(&self) -> bool;
}

/// Capability interface of a trajectory controller, as consumed by the host
/// navigation runtime.
pub trait Controller {
    /// Accept a new plan for tracking, replacing any previous one.
    fn set_plan(&mut self, plan: Plan) -> Result<(), ControlError>;

    /// Compute the velocity command for one control cycle from the current
    /// pose, the currently commanded velocity, and the time elapsed since
    /// the previous cycle.
    fn compute_velocity(
        &mut self,
        pose: &Pose,
        velocity: &VelocityCommand,
        dt_s: f64,
    ) -> Result<ControlOutput, ControlError>;

    /// Whether the tracked reference waypoint is within the given distance
    /// of the goal. The heading tolerance check is the host's.
    fn is_goal_reached(&mut self, dist_tolerance_m: f64) -> bool;

    /// Request cooperative cancellation. Returns whether cancellation is
    /// supported.
    fn cancel(&self) -> bool;
}
