//! Planner and controller parameters
//!
//! Both parameter structs are immutable snapshots: the host may replace them
//! between invocations via the `set_params` methods, and each invocation
//! reads a single consistent snapshot.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the wavefront planner
#[derive(Deserialize, Debug, Clone)]
pub struct PlannerParams {
    /// Ceiling on per-vertex traversal cost. Vertices whose cost exceeds
    /// this still receive a distance value for field continuity but are
    /// never expanded through.
    pub cost_limit: f64,

    /// Step width of the vector field trace in meters
    pub step_width_m: f64,

    /// Cap on the number of faces visited by a local containing-face search
    pub max_local_search_faces: usize,
}

/// Selects the velocity shaping strategy of the controller.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SteeringLawKind {
    /// Shaping-curve heuristic law
    Nonlinear,

    /// Independent distance/heading PID loops
    Pid,
}

/// Parameters for the trajectory controller
#[derive(Deserialize, Debug, Clone)]
pub struct ControllerParams {
    /// The active steering law
    pub steering_law: SteeringLawKind,

    /// If true the reference steering direction is sampled from the mesh's
    /// vector field layer instead of the planned path
    pub use_mesh_gradient: bool,

    /// Maximum linear velocity in m/s
    pub max_lin_velocity_ms: f64,

    /// Maximum angular velocity in rad/s
    pub max_ang_velocity_rads: f64,

    /// Distance in meters over which velocity eases in after the start and
    /// out before the goal
    pub fading_distance_m: f64,

    /// Distance from the reference waypoint beyond which the agent is
    /// considered off the plan. The boundary is inclusive: exactly at the
    /// threshold is still on the plan.
    pub off_plan_threshold_m: f64,

    /// Mixing weight of the look-ahead result into the immediate velocity,
    /// in [0, 1]. Zero disables the look-ahead contribution.
    pub lookahead_blend_weight: f64,

    /// Ceiling on interpolated traversal cost, above which a look-ahead step
    /// is flagged lethal
    pub cost_limit: f64,

    /// Plane tolerance in meters for containing-face queries
    pub face_search_tolerance_m: f64,

    /// Cap on the number of faces visited by a local containing-face search
    pub max_local_search_faces: usize,

    /// Distance loop proportional gain
    pub prop_dis_gain: f64,

    /// Distance loop integral gain
    pub int_dis_gain: f64,

    /// Distance loop derivative gain
    pub deriv_dis_gain: f64,

    /// Heading loop proportional gain
    pub prop_dir_gain: f64,

    /// Heading loop integral gain
    pub int_dir_gain: f64,

    /// Heading loop derivative gain
    pub deriv_dir_gain: f64,

    /// Time step in seconds used by the integral and derivative terms
    pub int_time_step_s: f64,

    /// Saturation limit on the accumulated integral error of each loop
    pub integral_limit: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            cost_limit: 1.0,
            step_width_m: 0.03,
            max_local_search_faces: 40,
        }
    }
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            steering_law: SteeringLawKind::Nonlinear,
            use_mesh_gradient: false,
            max_lin_velocity_ms: 0.2,
            max_ang_velocity_rads: 0.5,
            fading_distance_m: 0.5,
            off_plan_threshold_m: 0.5,
            lookahead_blend_weight: 0.3,
            cost_limit: 1.0,
            face_search_tolerance_m: 0.2,
            max_local_search_faces: 40,
            prop_dis_gain: 0.5,
            int_dis_gain: 0.01,
            deriv_dis_gain: 0.1,
            prop_dir_gain: 0.5,
            int_dir_gain: 0.01,
            deriv_dir_gain: 0.1,
            int_time_step_s: 0.1,
            integral_limit: 1.0,
        }
    }
}
