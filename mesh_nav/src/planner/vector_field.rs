//! # Vector field tracing
//!
//! Turns the potential field produced by the wavefront sweep into a per-vertex
//! steering field, and samples a path by walking that field in fixed-width
//! steps from the start to the goal.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::Vector3;
use std::collections::{HashMap, HashSet, VecDeque};

// Internal
use super::wavefront::PropagationContext;
use super::{CancelFlag, PlanError};
use crate::mesh::{
    barycentric_coords, barycentric_inside, project_onto_plane, rotate_about_axis, FaceHandle,
    MeshMap, VertexHandle,
};
use crate::params::PlannerParams;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Derive the steering vector field from the propagated distance field.
///
/// For every vertex with a valid predecessor and cutting face, the straight
/// direction to the predecessor is rotated about the cutting face's normal by
/// the stored turn angle and normalised. Unreached vertices (predecessor is
/// self) keep whatever seed entry they may already have.
pub(crate) fn compute_vector_map<M: MeshMap>(mesh: &M, ctx: &mut PropagationContext) {
    for vertex in mesh.vertex_handles() {
        let pred = match ctx.predecessors.get(&vertex) {
            Some(&p) => p,
            None => continue,
        };
        if pred == vertex {
            continue;
        }

        let face = match ctx.cutting_faces.get(&vertex) {
            Some(&f) => f,
            None => continue,
        };
        let angle = ctx.turn_angles.get(&vertex).copied().unwrap_or(0.0);

        let straight = mesh.vertex_position(pred) - mesh.vertex_position(vertex);
        let rotated = rotate_about_axis(&straight, &mesh.face_normal(face), angle);

        if rotated.norm() > f64::EPSILON {
            ctx.vector_map.insert(vertex, rotated.normalize());
        }
    }
}

/// Step a position forward along the interpolated vector field by one step
/// width, switching faces when the position leaves the current triangle.
///
/// The candidate face is found by the same bounded neighbour expansion used
/// for face location: starting from the current face, each candidate is
/// tested by projecting the position onto its plane and checking barycentric
/// containment, and the interpolated field direction at the contained
/// position provides the step. Returns `None` if no candidate face contains
/// the position or the field is not defined over it (dead end).
pub(crate) fn step_along_field<M: MeshMap>(
    mesh: &M,
    vector_map: &HashMap<VertexHandle, Vector3<f64>>,
    position: &Vector3<f64>,
    face: FaceHandle,
    step_width_m: f64,
    max_visited_faces: usize,
) -> Option<(Vector3<f64>, FaceHandle)> {
    let mut queue = VecDeque::new();
    let mut enqueued = HashSet::new();
    queue.push_back(face);
    enqueued.insert(face);

    let mut visited = 0;
    while let Some(candidate) = queue.pop_front() {
        if visited >= max_visited_faces {
            return None;
        }
        visited += 1;

        let [va, vb, vc] = mesh.vertices_of_face(candidate);
        let a = mesh.vertex_position(va);
        let b = mesh.vertex_position(vb);
        let c = mesh.vertex_position(vc);

        // Project onto the candidate's plane and test containment there. A
        // candidate is only usable if the field is defined at all three of
        // its corners; otherwise the expansion keeps looking.
        let projected = project_onto_plane(position, &a, &mesh.face_normal(candidate));

        if let Some((u, v)) = barycentric_coords(&projected, &a, &b, &c) {
            if barycentric_inside(u, v) {
                if let (Some(fa), Some(fb), Some(fc)) = (
                    vector_map.get(&va),
                    vector_map.get(&vb),
                    vector_map.get(&vc),
                ) {
                    let w = 1.0 - u - v;
                    let direction = fa * u + fb * v + fc * w;
                    if direction.norm() > f64::EPSILON {
                        let next = projected + direction.normalize() * step_width_m;
                        return Some((next, candidate));
                    }
                }
            }
        }

        // Expand through neighbours of neighbours, in case the position
        // overstepped a small face or the peak of a vertex fan
        for neighbour in mesh.face_neighbours(candidate) {
            if enqueued.insert(neighbour) {
                queue.push_back(neighbour);
            }
        }
    }

    None
}

/// Walk the steering field from the start point to within one step width of
/// the goal point, collecting the stepped positions and their faces.
///
/// The returned sequence reads start to goal and includes both endpoints.
pub(crate) fn trace_path<M: MeshMap>(
    mesh: &M,
    ctx: &PropagationContext,
    params: &PlannerParams,
    cancel: &CancelFlag,
    start_point: &Vector3<f64>,
    start_face: FaceHandle,
    goal_point: &Vector3<f64>,
    goal_face: FaceHandle,
) -> Result<Vec<(Vector3<f64>, FaceHandle)>, PlanError> {
    let mut points = vec![(*start_point, start_face)];

    let mut position = *start_point;
    let mut face = start_face;

    while (position - goal_point).norm() > params.step_width_m {
        if cancel.is_set() {
            warn!("Vector field tracing has been canceled");
            return Err(PlanError::Canceled);
        }

        match step_along_field(
            mesh,
            &ctx.vector_map,
            &position,
            face,
            params.step_width_m,
            params.max_local_search_faces,
        ) {
            Some((next, next_face)) => {
                position = next;
                face = next_face;
                points.push((position, face));
            }
            None => {
                warn!("Could not find a valid path while tracing towards the goal");
                return Err(PlanError::NoPathFound(
                    "vector field trace dead-ended before reaching the goal".into(),
                ));
            }
        }
    }

    points.push((*goal_point, goal_face));

    Ok(points)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
