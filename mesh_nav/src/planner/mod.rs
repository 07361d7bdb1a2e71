//! # Wavefront planner
//!
//! The planner computes a cost-aware geodesic distance field over the mesh by
//! continuous wavefront propagation, derives a steering vector field from it,
//! and extracts a waypoint plan by walking that field from the start to the
//! goal.
//!
//! One planning invocation runs to completion (or cancellation) before
//! returning; the host is responsible for serialising calls. All propagation
//! state is rebuilt per call, the retained copy only feeds the diagnostic
//! accessors.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub(crate) mod vector_field;
pub(crate) mod wavefront;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use nalgebra::Vector3;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Internal
use crate::mesh::{orientation_from_direction, FaceHandle, FaceLocator, MeshMap, VertexHandle};
use crate::params::PlannerParams;
use crate::plan::Plan;
use crate::pose::Pose;
use crate::Planner;
use wavefront::PropagationContext;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between the planner and the host.
///
/// The host clones the flag out of the planner and may set it from another
/// thread; the planner observes it at bounded intervals (once per popped
/// vertex during propagation, once per step during tracing) and returns
/// [`PlanError::Canceled`] promptly. Cancellation is not preemptive: a single
/// triangle update is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

/// Continuous vector field planner over a triangle mesh.
pub struct CvpPlanner<M> {
    mesh: Arc<M>,
    params: PlannerParams,
    cancel: CancelFlag,

    /// Field state of the most recent planning call, for diagnostics
    last_field: Option<PropagationContext>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Failure outcomes of a planning call.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// No face containing the start position was found within tolerance.
    #[error("No containing face was found for the start position")]
    InvalidStart,

    /// No face containing the goal position was found within tolerance.
    #[error("No containing face was found for the goal position")]
    InvalidGoal,

    /// The distance field or the trace could not connect start and goal.
    #[error("No path to the goal could be found: {0}")]
    NoPathFound(String),

    /// The cancellation flag was observed during the sweep or the trace.
    #[error("Planning was canceled")]
    Canceled,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl<M: MeshMap> CvpPlanner<M> {
    /// Initialise the planner over the given mesh.
    pub fn new(mesh: Arc<M>, params: PlannerParams) -> Self {
        Self {
            mesh,
            params,
            cancel: CancelFlag::new(),
            last_field: None,
        }
    }

    /// Replace the parameter snapshot used by subsequent calls.
    pub fn set_params(&mut self, params: PlannerParams) {
        self.params = params;
    }

    /// A clone of the cancellation flag, for the host to set from elsewhere.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// The potential field of the most recent planning call.
    pub fn potential(&self) -> Option<&HashMap<VertexHandle, f64>> {
        self.last_field.as_ref().map(|ctx| &ctx.distances)
    }

    /// The steering vector field of the most recent planning call.
    pub fn vector_field(&self) -> Option<&HashMap<VertexHandle, Vector3<f64>>> {
        self.last_field.as_ref().map(|ctx| &ctx.vector_map)
    }

    /// Build the trivial plan for a start and goal sharing one face.
    fn direct_plan(&self, start: &Pose, goal: &Pose, face: FaceHandle) -> Plan {
        let direction = goal.position_m - start.position_m;
        let attitude = orientation_from_direction(&direction, &self.mesh.face_normal(face))
            .unwrap_or(start.attitude_q);

        Plan::new(vec![
            Pose::new(start.position_m, attitude),
            Pose::new(goal.position_m, attitude),
        ])
    }

    /// Convert a traced `(point, face)` sequence into oriented waypoints.
    ///
    /// Each waypoint faces its successor, with the up axis taken from the
    /// local face normal; the final waypoint reuses the last orientation.
    fn points_to_plan(&self, points: &[(Vector3<f64>, FaceHandle)]) -> Plan {
        let mut poses = Vec::with_capacity(points.len());
        let mut last_attitude = nalgebra::UnitQuaternion::identity();

        for (i, (position, face)) in points.iter().enumerate() {
            let attitude = match points.get(i + 1) {
                Some((next, _)) => {
                    orientation_from_direction(&(next - position), &self.mesh.face_normal(*face))
                        .unwrap_or(last_attitude)
                }
                None => last_attitude,
            };
            last_attitude = attitude;
            poses.push(Pose::new(*position, attitude));
        }

        Plan::new(poses)
    }
}

impl<M: MeshMap> Planner for CvpPlanner<M> {
    /// Plan a path from `start` to `goal`.
    ///
    /// `tolerance_m` bounds the distance from each query position to the
    /// plane of its containing face.
    fn make_plan(&mut self, start: &Pose, goal: &Pose, tolerance_m: f64) -> Result<Plan, PlanError> {
        self.cancel.clear();

        let locator = FaceLocator::new(self.params.max_local_search_faces);

        let start_face = locator
            .global_search(&*self.mesh, &start.position_m, tolerance_m)
            .ok_or(PlanError::InvalidStart)?;
        let goal_face = locator
            .global_search(&*self.mesh, &goal.position_m, tolerance_m)
            .ok_or(PlanError::InvalidGoal)?;

        // Start and goal in one face: no propagation needed, the path
        // degenerates to a direct segment
        if start_face == goal_face {
            info!("Start and goal share a face, returning direct plan");
            return Ok(self.direct_plan(start, goal, start_face));
        }

        let mut ctx = wavefront::propagate(
            &*self.mesh,
            &self.params,
            &self.cancel,
            &goal.position_m,
            goal_face,
            start_face,
        )?;

        vector_field::compute_vector_map(&*self.mesh, &mut ctx);

        if !ctx.face_reached(&*self.mesh, start_face) {
            self.last_field = Some(ctx);
            return Err(PlanError::NoPathFound(
                "the wave front exhausted the queue before reaching the start".into(),
            ));
        }

        let traced = vector_field::trace_path(
            &*self.mesh,
            &ctx,
            &self.params,
            &self.cancel,
            &start.position_m,
            start_face,
            &goal.position_m,
            goal_face,
        );

        self.last_field = Some(ctx);
        let points = traced?;

        info!("Planned a path of {} waypoints", points.len());

        Ok(self.points_to_plan(&points))
    }

    /// Request cancellation of an in-flight planning call.
    fn cancel(&self) -> bool {
        self.cancel.set();
        true
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
