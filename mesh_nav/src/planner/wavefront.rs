//! # Wavefront propagation
//!
//! Computes the cost-aware geodesic distance from a goal region to every
//! reachable vertex of the mesh, by sweeping a continuous-Dijkstra wavefront
//! outward from the goal face. Unlike an edge-graph Dijkstra, each triangle
//! update unfolds the triangle into the plane and measures the straight
//! distance across its interior, so the field does not overestimate across
//! faces.
//!
//! Alongside the distance, each accepted update records the predecessor
//! vertex, the cutting face (the triangle on the correct side of the
//! predecessor edge) and a signed turn angle. Together these are enough for
//! the tracer to reconstruct a steering direction at every vertex.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::Vector3;
use ordered_float::NotNan;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

// Internal
use super::{CancelFlag, PlanError};
use crate::mesh::{FaceHandle, MeshMap, VertexHandle};
use crate::params::PlannerParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// All per-invocation state of a propagation sweep.
///
/// A context is constructed fresh at the start of every planning call, so no
/// propagation state can leak between calls. The planner keeps the last
/// context around after the call for the diagnostic field accessors.
#[derive(Debug, Default)]
pub(crate) struct PropagationContext {
    /// Distance from the goal region per vertex. Initialised to infinity.
    pub distances: HashMap<VertexHandle, f64>,

    /// Predecessor per vertex. A vertex whose predecessor is itself is
    /// unreached.
    pub predecessors: HashMap<VertexHandle, VertexHandle>,

    /// The face each vertex's shortest path arrived through
    pub cutting_faces: HashMap<VertexHandle, FaceHandle>,

    /// Signed deviation of the steering direction from the straight
    /// vertex-to-predecessor line, per vertex
    pub turn_angles: HashMap<VertexHandle, f64>,

    /// Steering direction per vertex, derived after the sweep
    pub vector_map: HashMap<VertexHandle, Vector3<f64>>,

    /// Vertices whose distance is final
    fixed: HashSet<VertexHandle>,

    /// Min-priority queue over candidate distances. Decrease-key is done
    /// lazily by duplicate insertion; stale entries are skipped on pop.
    queue: BinaryHeap<Reverse<(NotNan<f64>, VertexHandle)>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PropagationContext {
    /// Create a fresh context with every vertex at infinite distance and
    /// being its own predecessor.
    fn new<M: MeshMap>(mesh: &M) -> Self {
        let mut ctx = Self::default();
        for vertex in mesh.vertex_handles() {
            ctx.distances.insert(vertex, f64::INFINITY);
            ctx.predecessors.insert(vertex, vertex);
        }
        ctx
    }

    /// Current best distance of a vertex.
    pub fn distance(&self, vertex: VertexHandle) -> f64 {
        self.distances.get(&vertex).copied().unwrap_or(f64::INFINITY)
    }

    /// Whether any vertex of the face has been reached by the wavefront.
    pub fn face_reached<M: MeshMap>(&self, mesh: &M, face: FaceHandle) -> bool {
        mesh.vertices_of_face(face)
            .iter()
            .any(|&v| self.predecessors.get(&v) != Some(&v))
    }

    fn push(&mut self, vertex: VertexHandle, distance: f64) {
        if let Ok(key) = NotNan::new(distance) {
            self.queue.push(Reverse((key, vertex)));
        }
    }

    fn is_fixed(&self, vertex: VertexHandle) -> bool {
        self.fixed.contains(&vertex)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Sweep a wavefront outward from `goal_point` (contained in `goal_face`)
/// until the queue empties, the start face is entirely fixed, or the
/// cancellation flag is observed.
///
/// The cancellation flag is checked once per popped vertex, so cancellation
/// latency is bounded by a single neighbour expansion.
pub(crate) fn propagate<M: MeshMap>(
    mesh: &M,
    params: &PlannerParams,
    cancel: &CancelFlag,
    goal_point: &Vector3<f64>,
    goal_face: FaceHandle,
    start_face: FaceHandle,
) -> Result<PropagationContext, PlanError> {
    let mut ctx = PropagationContext::new(mesh);

    // Seed the wavefront at the goal face. The seed directions point from
    // each vertex straight at the goal point; they stand in for the derived
    // field at the three vertices the trace terminates between.
    for &vertex in mesh.vertices_of_face(goal_face).iter() {
        let diff = goal_point - mesh.vertex_position(vertex);
        let dist = diff.norm();
        ctx.distances.insert(vertex, dist);
        ctx.vector_map.insert(vertex, diff);
        ctx.cutting_faces.insert(vertex, goal_face);
        ctx.fixed.insert(vertex);
        ctx.push(vertex, dist);
    }

    info!("Starting wave front propagation");

    'sweep: while let Some(Reverse((key, vertex))) = ctx.queue.pop() {
        if cancel.is_set() {
            warn!("Wave front propagation has been canceled");
            return Err(PlanError::Canceled);
        }

        // Stale entry from a lazy decrease-key, already superseded
        if key.into_inner() > ctx.distance(vertex) {
            continue;
        }

        ctx.fixed.insert(vertex);

        for neighbour in mesh.vertex_neighbours(vertex) {
            if !mesh.vertex_valid(neighbour) {
                continue;
            }

            for face in mesh.faces_of_vertex(neighbour) {
                let [a, b, c] = mesh.vertices_of_face(face);

                if !mesh.vertex_valid(a) || !mesh.vertex_valid(b) || !mesh.vertex_valid(c) {
                    continue;
                }

                // A triangle update needs exactly one free vertex; rotate the
                // triple so the free vertex comes last
                let update = match (ctx.is_fixed(a), ctx.is_fixed(b), ctx.is_fixed(c)) {
                    (true, true, true) => {
                        if face == start_face {
                            // The wavefront has swept back over the start
                            info!("Wave front reached the start face");
                            break 'sweep;
                        }
                        continue;
                    }
                    (true, true, false) => wave_front_update(mesh, params.cost_limit, &mut ctx, a, b, c),
                    (true, false, true) => wave_front_update(mesh, params.cost_limit, &mut ctx, c, a, b),
                    (false, true, true) => wave_front_update(mesh, params.cost_limit, &mut ctx, b, c, a),
                    _ => continue,
                };

                if let Some((free_vertex, new_dist)) = update {
                    ctx.push(free_vertex, new_dist);
                }
            }
        }
    }

    if cancel.is_set() {
        warn!("Wave front propagation has been canceled");
        return Err(PlanError::Canceled);
    }

    info!("Finished wave front propagation");

    Ok(ctx)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Attempt a triangle update of the free vertex `v3` from the fixed vertices
/// `v1` and `v2`.
///
/// The triangle is unfolded into the plane: a virtual source position is
/// reconstructed from the two known distances and the edge lengths, and the
/// candidate distance at `v3` is the straight distance from that source. On
/// acceptance the predecessor, cutting face and turn angle of `v3` are
/// recorded.
///
/// Returns the vertex and its new distance when the update was accepted and
/// the vertex is traversable (cost within the ceiling) and should therefore
/// be queued. Lethal vertices still receive their distance, for continuity
/// of the field, but are not expanded through.
fn wave_front_update<M: MeshMap>(
    mesh: &M,
    cost_limit: f64,
    ctx: &mut PropagationContext,
    v1: VertexHandle,
    v2: VertexHandle,
    v3: VertexHandle,
) -> Option<(VertexHandle, f64)> {
    let u1 = ctx.distance(v1);
    let u2 = ctx.distance(v2);
    let u3 = ctx.distance(v3);

    let c = mesh.edge_length(mesh.edge_between(v1, v2)?);
    let b = mesh.edge_length(mesh.edge_between(v1, v3)?);
    let a = mesh.edge_length(mesh.edge_between(v2, v3)?);

    let f0 = mesh.face_between(v1, v2, v3)?;

    let a_sq = a * a;
    let b_sq = b * b;
    let c_sq = c * c;
    let u1_sq = u1 * u1;
    let u2_sq = u2 * u2;

    // Heron-style radicands, clamped at zero so float round-off on a
    // near-degenerate triangle cannot produce a NaN
    let cap_a = ((-u1 + u2 + c) * (u1 - u2 + c) * (u1 + u2 - c) * (u1 + u2 + c))
        .max(0.0)
        .sqrt();
    let cap_b = ((-a + b + c) * (a - b + c) * (a + b - c) * (a + b + c))
        .max(0.0)
        .sqrt();

    // Unfolded source position in edge coordinates along v1->v2
    let sx = (c_sq + u1_sq - u2_sq) / (2.0 * c);
    let sy = -cap_a / (2.0 * c);

    // Unfolded position of v3 over the same edge
    let p = (-a_sq + b_sq + c_sq) / (2.0 * c);
    let hc = cap_b / (2.0 * c);

    let dx = p - sx;
    let dy = (cap_a + cap_b) / (2.0 * c);

    let u3_tmp = (dx * dx + dy * dy).sqrt();

    if !u3_tmp.is_finite() || u3_tmp >= u3 {
        return None;
    }

    ctx.distances.insert(v3, u3_tmp);
    let u3_sq = u3_tmp * u3_tmp;

    // The predecessor is whichever fixed vertex lies on the near side of the
    // unfolded source; the half-plane scalar s decides which of the two
    // faces incident to the predecessor edge cuts the steering direction
    let (pred, s, gamma) = if u1 < u2 {
        let s = sy * p - sx * hc;
        let arg = ((u3_sq + b_sq - sx * sx - sy * sy) / (2.0 * u3_tmp * b)).clamp(-1.0, 1.0);
        (v1, s, -arg.acos())
    } else {
        let s = sx * hc - hc * c + sy * c - sy * p;
        let arg = ((a_sq + u3_sq + 2.0 * sx * c - sx * sx - c_sq - sy * sy)
            / (2.0 * a * u3_tmp))
            .clamp(-1.0, 1.0);
        (v2, s, arg.acos())
    };

    ctx.predecessors.insert(v3, pred);

    let pred_edge = mesh.edge_between(pred, v3)?;

    let mut angle = gamma;
    let f1 = match mesh.faces_of_edge(pred_edge) {
        [Some(fa), Some(fb)] => {
            if fa != f0 {
                fa
            } else {
                fb
            }
        }
        // Contour edge: the steering direction lies on the edge itself
        _ => {
            angle = 0.0;
            f0
        }
    };

    if s > 0.0 {
        ctx.cutting_faces.insert(v3, f1);
        ctx.turn_angles.insert(v3, angle);
    } else if s < 0.0 {
        ctx.cutting_faces.insert(v3, f0);
        ctx.turn_angles.insert(v3, -angle);
    } else {
        // The direction lies exactly on the predecessor edge
        ctx.cutting_faces.insert(v3, f0);
        ctx.turn_angles.insert(v3, 0.0);
    }

    if mesh.vertex_cost(v3) <= cost_limit {
        Some((v3, u3_tmp))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
