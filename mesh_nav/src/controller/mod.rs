//! # Mesh trajectory controller
//!
//! The controller keeps the agent on a planned path across the mesh. Each
//! control cycle it re-localises the agent's containing face, advances a
//! progress pointer along the plan with a bounded bidirectional search,
//! samples the path ahead of the agent proportionally to its speed, and
//! converts heading and position error into an angular/linear velocity pair
//! through the active steering law. Velocity eases in after the start and
//! out before the goal through a fading factor.
//!
//! The controller is a state machine: it is uninitialised until a plan is
//! accepted, tracks while cycling, and terminates in either a goal-reached
//! or a failed state. A new plan resets it to tracking.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub(crate) mod steering;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// Internal
use crate::mesh::{angle_between, cost_at_position, FaceHandle, FaceLocator, MeshMap};
use crate::params::{ControllerParams, SteeringLawKind};
use crate::plan::Plan;
use crate::pose::Pose;
use crate::Controller;
use steering::{blend, nonlinear_law, turn_direction, PidLaw};
use util::maths::lin_ramp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Cap on the number of plan waypoints sampled ahead of the agent.
const MAX_LOOKAHEAD_STEPS: f64 = 50.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An angular/linear velocity demand for the agent.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Linear velocity along the agent's forward axis in m/s
    pub linear_ms: f64,

    /// Angular velocity about the surface normal in rad/s
    pub angular_rads: f64,
}

/// Diagnostic quantities of one control cycle.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct ControlReport {
    /// Angle between the agent's heading and the reference direction
    pub heading_error_rad: f64,

    /// Averaged signed heading delta over the look-ahead window, if the
    /// look-ahead produced a result this cycle
    pub ahead_heading_error_rad: Option<f64>,

    /// Averaged traversal cost over the look-ahead window
    pub ahead_cost: Option<f64>,

    /// Index of the first lethal look-ahead step, if one was seen
    pub first_lethal_step: Option<usize>,

    /// The velocity fading factor applied this cycle
    pub fading_factor: f64,
}

/// The output of one control cycle.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct ControlOutput {
    pub cmd: VelocityCommand,
    pub report: ControlReport,
}

/// Mesh-relative trajectory controller.
pub struct MeshController<M> {
    mesh: Arc<M>,
    params: ControllerParams,

    /// Executing mode
    mode: ControllerMode,

    /// The accepted plan. The first raw waypoint has already been dropped.
    plan: Option<Plan>,

    /// The goal pose, copied from the accepted plan's last waypoint
    goal: Option<Pose>,

    /// The face containing the agent, once localised
    current_face: Option<FaceHandle>,

    /// Progress pointer into the plan
    plan_index: usize,

    /// Linear velocity commanded on the previous cycle
    last_linear_ms: f64,

    /// Total plan length, computed lazily on first use
    total_length_m: Option<f64>,

    /// PID loops of the PID steering law. Accumulators reset on a new plan.
    law: PidLaw,
}

/// Result of the look-ahead scan.
#[derive(Debug, Copy, Clone)]
struct LookAhead {
    /// Mean signed heading delta over the resolved steps
    avg_heading_rad: f64,

    /// Mean traversal cost over the resolved steps
    avg_cost: f64,

    /// First step flagged lethal, if any
    first_lethal_step: Option<usize>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Failure outcomes of a control cycle.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// No plan is loaded, or the given plan was empty.
    #[error("No plan has been set")]
    EmptyPath,

    /// The agent strayed beyond the off-plan threshold. The caller should
    /// replan.
    #[error("The agent is {0:.3} m from the reference waypoint, beyond the off-plan threshold")]
    OffPlan(f64),

    /// The cycle could not be completed.
    #[error("Control failure: {0}")]
    Failure(String),

    /// The controller is in a failed state and needs a new plan.
    #[error("The controller is not initialized, a new plan must be set")]
    NotInitialized,
}

/// The possible modes of execution of the controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ControllerMode {
    Uninitialized,
    Tracking,
    GoalReached,
    Failed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<M: MeshMap> MeshController<M> {
    /// Initialise the controller over the given mesh.
    pub fn new(mesh: Arc<M>, params: ControllerParams) -> Self {
        let law = PidLaw::new(&params);
        Self {
            mesh,
            params,
            mode: ControllerMode::Uninitialized,
            plan: None,
            goal: None,
            current_face: None,
            plan_index: 0,
            last_linear_ms: 0.0,
            total_length_m: None,
            law,
        }
    }

    /// Replace the parameter snapshot used by subsequent cycles.
    ///
    /// The PID loops are rebuilt with the new gains; their accumulated state
    /// is discarded.
    pub fn set_params(&mut self, params: ControllerParams) {
        self.law = PidLaw::new(&params);
        self.params = params;
    }

    /// The linear velocity commanded on the previous cycle.
    pub fn last_linear_velocity_ms(&self) -> f64 {
        self.last_linear_ms
    }

    /// The velocity fading factor for the given progress along the plan.
    ///
    /// Eases in over the fading distance after the start (with a small
    /// nonzero floor at zero distance so the agent can start moving at all)
    /// and out towards zero over the fading distance before the goal; unity
    /// in the interior.
    fn fading_factor(&self, travelled_m: f64, total_m: f64) -> f64 {
        let fading_m = self.params.fading_distance_m;

        if travelled_m < fading_m {
            if travelled_m == 0.0 {
                return self.params.max_lin_velocity_ms / 10.0;
            }
            travelled_m / fading_m
        } else if (total_m - travelled_m) < fading_m {
            (total_m - travelled_m) / fading_m
        } else {
            1.0
        }
    }

    /// Sample the plan ahead of the progress pointer, walking the containing
    /// face forward waypoint by waypoint.
    ///
    /// The number of sampled steps scales with the current speed, zero at
    /// standstill. Steps whose cost cannot be resolved are excluded from the
    /// averages; a step at or above the cost ceiling is flagged lethal but
    /// does not abort the scan. Returns `None` when nothing was sampled or
    /// every step was missed.
    fn look_ahead(
        &self,
        plan: &Plan,
        seed_face: FaceHandle,
        pose: &Pose,
        linear_velocity_ms: f64,
        dt_s: f64,
    ) -> Option<LookAhead> {
        let max_travelled_m = linear_velocity_ms.abs() * dt_s;
        let max_by_max_vel_m = self.params.max_lin_velocity_ms * dt_s;
        if max_by_max_vel_m <= 0.0 {
            return None;
        }

        // More look-ahead the closer the agent is to full speed
        let steps = lin_ramp(MAX_LOOKAHEAD_STEPS, 2.0 * max_by_max_vel_m, max_travelled_m) as usize;
        if steps == 0 {
            return None;
        }

        let locator = FaceLocator::new(self.params.max_local_search_faces);
        let heading = pose.forward();

        let mut ahead_face = seed_face;
        let mut sampled = steps;
        let mut missed = 0;
        let mut first_lethal_step = None;
        let mut accum_cost = 0.0;
        let mut accum_turn = 0.0;

        for i in 0..steps {
            let waypoint = match plan.get(self.plan_index + i) {
                Some(w) => *w,
                // The look-ahead extends past the end of the plan
                None => {
                    sampled = i;
                    break;
                }
            };

            let face = match locator.locate(
                &*self.mesh,
                Some(ahead_face),
                &waypoint.position_m,
                self.params.face_search_tolerance_m,
            ) {
                Some(f) => f,
                None => {
                    missed += 1;
                    continue;
                }
            };
            ahead_face = face;

            match cost_at_position(&*self.mesh, face, &waypoint.position_m) {
                Some(cost) if cost >= self.params.cost_limit => {
                    if first_lethal_step.is_none() {
                        debug!("Lethal waypoint {} steps ahead", i);
                        first_lethal_step = Some(i);
                    }
                }
                Some(cost) => {
                    let wp_heading = waypoint.forward();
                    let turn = angle_between(&heading, &wp_heading)
                        * turn_direction(&heading, &wp_heading, &self.mesh.face_normal(face));
                    accum_cost += cost;
                    accum_turn += turn;
                }
                None => missed += 1,
            }
        }

        if sampled == 0 || sampled == missed {
            return None;
        }

        let resolved = (sampled - missed) as f64;
        Some(LookAhead {
            avg_heading_rad: accum_turn / resolved,
            avg_cost: accum_cost / resolved,
            first_lethal_step,
        })
    }
}

impl<M: MeshMap> Controller for MeshController<M> {
    /// Accept a new plan for tracking.
    ///
    /// The first waypoint of the raw plan duplicates the agent's start pose
    /// and is dropped before storage. All tracking state, including the PID
    /// accumulators, is reset.
    fn set_plan(&mut self, plan: Plan) -> Result<(), ControlError> {
        let plan = plan.strip_start().ok_or(ControlError::EmptyPath)?;

        self.goal = plan.last().copied();
        self.plan = Some(plan);
        self.plan_index = 0;
        self.current_face = None;
        self.total_length_m = None;
        self.last_linear_ms = 0.0;
        self.law.reset();
        self.mode = ControllerMode::Tracking;

        Ok(())
    }

    /// Compute the velocity command for one control cycle.
    ///
    /// `velocity` is the currently commanded velocity and `dt_s` the time
    /// elapsed since the previous cycle; both are supplied by the host.
    fn compute_velocity(
        &mut self,
        pose: &Pose,
        velocity: &VelocityCommand,
        dt_s: f64,
    ) -> Result<ControlOutput, ControlError> {
        // Mode gate: only the tracking mode produces commands
        let plan = match self.mode {
            ControllerMode::Uninitialized => return Err(ControlError::EmptyPath),
            ControllerMode::Failed => return Err(ControlError::NotInitialized),
            // At the goal the agent is commanded to rest
            ControllerMode::GoalReached => return Ok(ControlOutput::default()),
            ControllerMode::Tracking => match self.plan {
                Some(ref p) => p.clone(),
                None => return Err(ControlError::EmptyPath),
            },
        };

        // Localise on the mesh: local search seeded at the previous face,
        // with a single global fallback
        let locator = FaceLocator::new(self.params.max_local_search_faces);
        let current_face = match locator.locate(
            &*self.mesh,
            self.current_face,
            &pose.position_m,
            self.params.face_search_tolerance_m,
        ) {
            Some(f) => f,
            None => {
                self.mode = ControllerMode::Failed;
                return Err(ControlError::Failure(
                    "could not locate the agent on the mesh".into(),
                ));
            }
        };
        self.current_face = Some(current_face);

        // Advance the progress pointer within the travel window
        let max_travel_m = velocity.linear_ms.abs() * dt_s;
        self.plan_index = nearest_plan_index(&plan, self.plan_index, &pose.position_m, max_travel_m);
        let reference = plan.poses()[self.plan_index];

        // Off-plan check. The boundary is inclusive: exactly at the
        // threshold is still on the plan.
        let off_dist_m = (pose.position_m - reference.position_m).norm();
        if off_dist_m > self.params.off_plan_threshold_m {
            return Err(ControlError::OffPlan(off_dist_m));
        }

        // Reference steering direction: the mesh's vector field layer if
        // requested and available, otherwise the waypoint's path direction
        let plan_dir = if self.params.use_mesh_gradient {
            match self.mesh.steering_direction(current_face, &pose.position_m) {
                Some(d) => d,
                None => {
                    debug!("Mesh carries no vector field layer, using the plan direction");
                    reference.forward()
                }
            }
        } else {
            reference.forward()
        };

        let heading = pose.forward();
        let face_normal = self.mesh.face_normal(current_face);
        let heading_error_rad = angle_between(&heading, &plan_dir);
        let turn_sign = turn_direction(&heading, &plan_dir, &face_normal);

        // Immediate steering from the active law
        let immediate = match self.params.steering_law {
            SteeringLawKind::Nonlinear => {
                let cost = cost_at_position(&*self.mesh, current_face, &pose.position_m);
                nonlinear_law(&self.params, heading_error_rad, turn_sign, cost)
            }
            SteeringLawKind::Pid => {
                self.law
                    .compute(off_dist_m, heading_error_rad, turn_sign, &self.params)
            }
        };

        // Look-ahead steering from the averaged (heading, cost) pair, shaped
        // through the same curves for either law
        let ahead = self.look_ahead(&plan, current_face, pose, velocity.linear_ms, dt_s);
        let ahead_output = ahead.map(|la| {
            nonlinear_law(
                &self.params,
                la.avg_heading_rad.abs(),
                la.avg_heading_rad.signum(),
                Some(la.avg_cost),
            )
        });

        let blended = blend(immediate, ahead_output, self.params.lookahead_blend_weight);

        // Ease velocity in near the start and out near the goal
        let total_m = match self.total_length_m {
            Some(t) => t,
            None => {
                let t = plan.total_length_m();
                self.total_length_m = Some(t);
                t
            }
        };
        let travelled_m = plan.length_to_index_m(self.plan_index);
        let fading = self.fading_factor(travelled_m, total_m);

        let cmd = VelocityCommand {
            linear_ms: blended.linear_ms * fading,
            angular_rads: blended.angular_rads,
        };
        self.last_linear_ms = cmd.linear_ms;

        Ok(ControlOutput {
            cmd,
            report: ControlReport {
                heading_error_rad,
                ahead_heading_error_rad: ahead.map(|la| la.avg_heading_rad),
                ahead_cost: ahead.map(|la| la.avg_cost),
                first_lethal_step: ahead.and_then(|la| la.first_lethal_step),
                fading_factor: fading,
            },
        })
    }

    /// Whether the reference waypoint has come within tolerance of the goal.
    ///
    /// Heading tolerance is checked by the host; this only considers
    /// distance. On success the controller enters its terminal goal-reached
    /// mode until a new plan is set.
    fn is_goal_reached(&mut self, dist_tolerance_m: f64) -> bool {
        let (plan, goal) = match (&self.plan, &self.goal) {
            (Some(p), Some(g)) => (p, g),
            _ => return false,
        };
        let reference = match plan.get(self.plan_index) {
            Some(r) => r,
            None => return false,
        };

        if (reference.position_m - goal.position_m).norm() <= dist_tolerance_m {
            self.mode = ControllerMode::GoalReached;
            true
        } else {
            false
        }
    }

    /// Cancellation is not supported mid-cycle; a cycle always runs to
    /// completion.
    fn cancel(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Find the plan waypoint nearest to the agent, searching forward and
/// backward from the current progress pointer.
///
/// Each direction keeps scanning while the waypoints remain further away
/// than the distance the agent can have travelled since the previous cycle,
/// which tolerates fast motion and corrects localisation noise without
/// letting the pointer run away.
fn nearest_plan_index(
    plan: &Plan,
    from: usize,
    position: &Vector3<f64>,
    max_travel_m: f64,
) -> usize {
    let poses = plan.poses();
    let mut best = from;
    let mut min_dist = f64::MAX;

    // Forward scan
    let mut index = from;
    loop {
        let dist = (poses[index].position_m - position).norm();
        if dist < min_dist {
            min_dist = dist;
            best = index;
        }
        index += 1;
        if dist <= max_travel_m || index >= poses.len() {
            break;
        }
    }

    // Backward scan
    let mut index = from;
    loop {
        let dist = (poses[index].position_m - position).norm();
        if dist < min_dist {
            min_dist = dist;
            best = index;
        }
        if index == 0 || dist <= max_travel_m {
            break;
        }
        index -= 1;
    }

    best
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
