//! # Steering laws
//!
//! The two interchangeable velocity shaping strategies of the controller: a
//! nonlinear heuristic law built from shaping curves, and a PID law with
//! independent distance and heading loops. Both produce an angular/linear
//! velocity pair from the current heading error and local traversal cost, and
//! both accept the look-ahead's averaged result through the same blending.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;
use serde::Serialize;

// Internal
use crate::params::ControllerParams;
use util::maths::{gauss_bell, lin_ramp};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Heading error magnitude below which the local traversal cost penalises
/// the linear velocity. Above this the agent is turning hard anyway.
const COST_PENALTY_MAX_ANGLE_RAD: f64 = 0.6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An angular/linear velocity pair produced by a steering law, before fading
/// is applied.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub(crate) struct SteeringOutput {
    pub angular_rads: f64,
    pub linear_ms: f64,
}

/// A single PID loop with a clamped integral accumulator.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Derivative gain
    k_d: f64,

    /// Time step used for the integral and derivative terms
    time_step_s: f64,

    /// Saturation limit on the integral accumulation
    integral_limit: f64,

    /// The integral accumulation
    integral: f64,

    /// Previous error
    prev_error: Option<f64>,
}

/// The PID steering law: independent distance and heading loops.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PidLaw {
    /// Distance error controller
    dis_ctrl: PidController,

    /// Heading error controller
    dir_ctrl: PidController,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    pub fn new(k_p: f64, k_i: f64, k_d: f64, time_step_s: f64, integral_limit: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            time_step_s,
            integral_limit,
            integral: 0.0,
            prev_error: None,
        }
    }

    /// Clear the accumulated state. Called whenever a new plan is accepted,
    /// so the windup of one traverse cannot bleed into the next.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// Get the value of the controller for the given error.
    pub fn update(&mut self, error: f64) -> f64 {
        self.integral = (self.integral + error * self.time_step_s)
            .clamp(-self.integral_limit, self.integral_limit);

        // Without a previous error there is no derivative; assuming one
        // would spike the output on the first cycle of a plan
        let deriv = match self.prev_error {
            Some(prev) => (error - prev) / self.time_step_s,
            None => 0.0,
        };

        self.prev_error = Some(error);

        self.k_p * error + self.k_i * self.integral + self.k_d * deriv
    }

    #[cfg(test)]
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

impl PidLaw {
    pub fn new(params: &ControllerParams) -> Self {
        Self {
            dis_ctrl: PidController::new(
                params.prop_dis_gain,
                params.int_dis_gain,
                params.deriv_dis_gain,
                params.int_time_step_s,
                params.integral_limit,
            ),
            dir_ctrl: PidController::new(
                params.prop_dir_gain,
                params.int_dir_gain,
                params.deriv_dir_gain,
                params.int_time_step_s,
                params.integral_limit,
            ),
        }
    }

    pub fn reset(&mut self) {
        self.dis_ctrl.reset();
        self.dir_ctrl.reset();
    }

    /// Run both loops for one cycle.
    ///
    /// The heading loop's usage of the angular budget attenuates the distance
    /// loop's output, so the agent slows down while turning hard.
    pub fn compute(
        &mut self,
        distance_error_m: f64,
        heading_error_rad: f64,
        turn_sign: f64,
        params: &ControllerParams,
    ) -> SteeringOutput {
        let linear = self.dis_ctrl.update(distance_error_m);
        let angular = self.dir_ctrl.update(heading_error_rad) * turn_sign;

        let angular = angular.clamp(-params.max_ang_velocity_rads, params.max_ang_velocity_rads);

        let attenuation = angular.abs() / params.max_ang_velocity_rads;
        let linear =
            (linear - attenuation * linear).clamp(0.0, params.max_lin_velocity_ms);

        SteeringOutput {
            angular_rads: angular,
            linear_ms: linear,
        }
    }

    #[cfg(test)]
    pub fn integrals(&self) -> (f64, f64) {
        (self.dis_ctrl.integral(), self.dir_ctrl.integral())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The nonlinear shaping law.
///
/// Angular velocity ramps linearly with the heading error magnitude up to the
/// maximum angular speed. Linear velocity follows a bell over the heading
/// error, reduced by a ramp of the local traversal cost while the heading
/// error is small. A lethal (non-finite) or unresolved cost applies no
/// penalty; it is handled upstream.
pub(crate) fn nonlinear_law(
    params: &ControllerParams,
    heading_error_rad: f64,
    turn_sign: f64,
    cost: Option<f64>,
) -> SteeringOutput {
    let heading_error_rad = heading_error_rad.abs();

    let angular = turn_sign
        * lin_ramp(
            params.max_ang_velocity_rads,
            2.0 * std::f64::consts::PI,
            heading_error_rad,
        );

    let mut linear = gauss_bell(
        params.max_lin_velocity_ms,
        2.0 * std::f64::consts::PI,
        heading_error_rad,
    );

    if heading_error_rad < COST_PENALTY_MAX_ANGLE_RAD {
        if let Some(cost) = cost {
            if cost.is_finite() {
                linear -= lin_ramp(params.max_lin_velocity_ms / 10.0, 2.0, cost);
                linear = linear.clamp(0.0, params.max_lin_velocity_ms);
            }
        }
    }

    SteeringOutput {
        angular_rads: angular,
        linear_ms: linear,
    }
}

/// Sign of the turn required to rotate `heading` onto `target`, resolved
/// about the face normal: positive for a turn to the left of the surface,
/// negative for a turn to the right.
pub(crate) fn turn_direction(
    heading: &Vector3<f64>,
    target: &Vector3<f64>,
    face_normal: &Vector3<f64>,
) -> f64 {
    if face_normal.dot(&heading.cross(target)) < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Convex blend of the immediate steering output with the look-ahead's
/// output. With no look-ahead available the immediate output passes through.
pub(crate) fn blend(
    immediate: SteeringOutput,
    ahead: Option<SteeringOutput>,
    weight: f64,
) -> SteeringOutput {
    match ahead {
        Some(ahead) => SteeringOutput {
            angular_rads: (1.0 - weight) * immediate.angular_rads + weight * ahead.angular_rads,
            linear_ms: (1.0 - weight) * immediate.linear_ms + weight * ahead.linear_ms,
        },
        None => immediate,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nonlinear_law_shapes() {
        let params = ControllerParams::default();

        // Aligned heading, no cost: full speed ahead, no turning
        let out = nonlinear_law(&params, 0.0, 1.0, Some(0.0));
        assert_relative_eq!(out.angular_rads, 0.0);
        assert_relative_eq!(out.linear_ms, params.max_lin_velocity_ms);

        // Large heading error: hard turn, slow advance
        let out = nonlinear_law(&params, 2.5, -1.0, Some(0.0));
        assert!(out.angular_rads < 0.0);
        assert!(out.linear_ms < 0.1 * params.max_lin_velocity_ms);

        // Cost penalises linear velocity when roughly aligned
        let clean = nonlinear_law(&params, 0.1, 1.0, Some(0.0));
        let costly = nonlinear_law(&params, 0.1, 1.0, Some(0.8));
        assert!(costly.linear_ms < clean.linear_ms);

        // Beyond the gate angle the cost is ignored
        let far = nonlinear_law(&params, 1.0, 1.0, Some(0.8));
        let far_clean = nonlinear_law(&params, 1.0, 1.0, Some(0.0));
        assert_relative_eq!(far.linear_ms, far_clean.linear_ms);

        // Lethal cost applies no penalty here
        let lethal = nonlinear_law(&params, 0.1, 1.0, Some(f64::INFINITY));
        assert_relative_eq!(lethal.linear_ms, clean.linear_ms);
    }

    #[test]
    fn test_turn_direction() {
        let heading = Vector3::new(1.0, 0.0, 0.0);
        let up = Vector3::new(0.0, 0.0, 1.0);

        // Target to the left: positive (counter-clockwise about the normal)
        assert_eq!(turn_direction(&heading, &Vector3::new(0.0, 1.0, 0.0), &up), 1.0);

        // Target to the right: negative
        assert_eq!(
            turn_direction(&heading, &Vector3::new(0.0, -1.0, 0.0), &up),
            -1.0
        );

        // On a face oriented the other way the sense flips
        assert_eq!(
            turn_direction(&heading, &Vector3::new(0.0, 1.0, 0.0), &(-up)),
            -1.0
        );
    }

    #[test]
    fn test_pid_integral_clamped_and_reset() {
        let params = ControllerParams::default();
        let mut law = PidLaw::new(&params);

        // Drive a constant large error: the integral must saturate at the
        // limit instead of winding up forever
        for _ in 0..10_000 {
            law.compute(100.0, 1.0, 1.0, &params);
        }
        let (dis_integral, _) = law.integrals();
        assert_relative_eq!(dis_integral, params.integral_limit);

        law.reset();
        assert_eq!(law.integrals(), (0.0, 0.0));
    }

    #[test]
    fn test_pid_attenuates_linear_when_turning() {
        let params = ControllerParams::default();

        let mut law = PidLaw::new(&params);
        let straight = law.compute(1.0, 0.0, 1.0, &params);

        let mut law = PidLaw::new(&params);
        let turning = law.compute(1.0, 3.0, 1.0, &params);

        assert!(turning.angular_rads > 0.0);
        assert!(turning.linear_ms < straight.linear_ms);
    }

    #[test]
    fn test_blend() {
        let immediate = SteeringOutput {
            angular_rads: 1.0,
            linear_ms: 0.2,
        };
        let ahead = SteeringOutput {
            angular_rads: 0.0,
            linear_ms: 0.1,
        };

        let mixed = blend(immediate, Some(ahead), 0.5);
        assert_relative_eq!(mixed.angular_rads, 0.5);
        assert_relative_eq!(mixed.linear_ms, 0.15, epsilon = 1e-12);

        // Without look-ahead the immediate result passes through unchanged
        let passthrough = blend(immediate, None, 0.5);
        assert_relative_eq!(passthrough.angular_rads, 1.0);
    }
}
