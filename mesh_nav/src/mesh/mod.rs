//! # Mesh interface
//!
//! This module defines the read-only interface onto the triangle mesh the
//! agent navigates over, along with the geometric primitives shared by the
//! planner and the controller (barycentric coordinates, plane projection and
//! orientation construction).
//!
//! The mesh itself (topology, per-vertex cost layer, validity mask) is owned
//! by an external collaborator and consumed here behind the [`MeshMap`]
//! trait. Handles are opaque indices with no ownership semantics.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod locate;
pub use locate::FaceLocator;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix3, Rotation3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Slack applied to barycentric containment checks, so that points lying
/// numerically on a shared edge are claimed by at least one of the two faces.
const BARY_EPS: f64 = 1e-10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Opaque identifier of a mesh vertex.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VertexHandle(pub u32);

/// Opaque identifier of a mesh edge.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EdgeHandle(pub u32);

/// Opaque identifier of a mesh face (triangle).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FaceHandle(pub u32);

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Read-only queries onto a triangulated surface annotated with per-vertex
/// traversal cost and per-edge length.
///
/// All adjacency queries must be consistent with each other, e.g. every face
/// returned by [`MeshMap::faces_of_vertex`] must contain that vertex.
pub trait MeshMap {
    /// All vertex handles of the mesh.
    fn vertex_handles(&self) -> Vec<VertexHandle>;

    /// All face handles of the mesh.
    fn face_handles(&self) -> Vec<FaceHandle>;

    /// The 3D position of a vertex.
    fn vertex_position(&self, vertex: VertexHandle) -> Vector3<f64>;

    /// The unit normal of a face.
    fn face_normal(&self, face: FaceHandle) -> Vector3<f64>;

    /// The three vertices of a face, in consistent winding order.
    fn vertices_of_face(&self, face: FaceHandle) -> [VertexHandle; 3];

    /// All faces incident to a vertex.
    fn faces_of_vertex(&self, vertex: VertexHandle) -> Vec<FaceHandle>;

    /// All vertices sharing an edge with a vertex.
    fn vertex_neighbours(&self, vertex: VertexHandle) -> Vec<VertexHandle>;

    /// All faces sharing an edge with a face.
    fn face_neighbours(&self, face: FaceHandle) -> Vec<FaceHandle>;

    /// The edge connecting two vertices, if they are connected.
    fn edge_between(&self, a: VertexHandle, b: VertexHandle) -> Option<EdgeHandle>;

    /// The one or two faces incident to an edge. A boundary edge has a single
    /// incident face.
    fn faces_of_edge(&self, edge: EdgeHandle) -> [Option<FaceHandle>; 2];

    /// The face spanned by the three vertices, if one exists.
    fn face_between(
        &self,
        a: VertexHandle,
        b: VertexHandle,
        c: VertexHandle,
    ) -> Option<FaceHandle>;

    /// The length of an edge in meters.
    fn edge_length(&self, edge: EdgeHandle) -> f64;

    /// The intrinsic traversal cost of a vertex.
    fn vertex_cost(&self, vertex: VertexHandle) -> f64;

    /// Whether the vertex carries valid data. Invalid vertices are excluded
    /// from propagation entirely.
    fn vertex_valid(&self, vertex: VertexHandle) -> bool;

    /// The steering direction at a position inside the given face, if the
    /// mesh carries a vector field layer.
    ///
    /// The host may install the planner's vector field on the mesh to make
    /// the controller's mesh-gradient mode available; by default there is no
    /// such layer.
    fn steering_direction(
        &self,
        _face: FaceHandle,
        _position: &Vector3<f64>,
    ) -> Option<Vector3<f64>> {
        None
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Compute the barycentric coordinates `(u, v)` of a point with respect to
/// the triangle `(a, b, c)`, where `u` weights `a` and `v` weights `b`. The
/// weight of `c` is implicitly `1 - u - v`.
///
/// Returns `None` for a degenerate triangle. The point is assumed to lie in
/// the triangle's plane; project it first if it may not.
pub fn barycentric_coords(
    point: &Vector3<f64>,
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
) -> Option<(f64, f64)> {
    let ab = b - a;
    let ac = c - a;
    let ap = point - a;

    let d00 = ab.dot(&ab);
    let d01 = ab.dot(&ac);
    let d11 = ac.dot(&ac);
    let d20 = ap.dot(&ab);
    let d21 = ap.dot(&ac);

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < f64::EPSILON {
        return None;
    }

    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    let u = 1.0 - v - w;

    Some((u, v))
}

/// Whether barycentric coordinates `(u, v)` describe a point inside the
/// triangle, i.e. `u, v >= 0` and `u + v <= 1`.
pub fn barycentric_inside(u: f64, v: f64) -> bool {
    u >= -BARY_EPS && v >= -BARY_EPS && u + v <= 1.0 + BARY_EPS
}

/// Orthogonally project a point onto the plane through `plane_point` with
/// unit normal `normal`.
pub fn project_onto_plane(
    point: &Vector3<f64>,
    plane_point: &Vector3<f64>,
    normal: &Vector3<f64>,
) -> Vector3<f64> {
    point - normal * (point - plane_point).dot(normal)
}

/// Rotate a vector about the given axis by `angle_rad` (right hand rule).
pub fn rotate_about_axis(
    vector: &Vector3<f64>,
    axis: &Vector3<f64>,
    angle_rad: f64,
) -> Vector3<f64> {
    UnitQuaternion::from_axis_angle(&Unit::new_normalize(*axis), angle_rad) * vector
}

/// The unsigned angle between two vectors in radians, in `[0, pi]`.
///
/// The cosine is clamped into `[-1, 1]` before the arccosine so that float
/// round-off on near-parallel vectors cannot produce a NaN.
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let norms = a.norm() * b.norm();
    if norms < f64::EPSILON {
        return 0.0;
    }
    (a.dot(b) / norms).clamp(-1.0, 1.0).acos()
}

/// Build an orientation whose forward axis (+X) points along `direction` and
/// whose up axis (+Z) is aligned with the face normal.
///
/// Returns `None` if the direction is degenerate (zero length or parallel to
/// the normal).
pub fn orientation_from_direction(
    direction: &Vector3<f64>,
    normal: &Vector3<f64>,
) -> Option<UnitQuaternion<f64>> {
    if direction.norm() < f64::EPSILON {
        return None;
    }

    let x_axis = direction.normalize();
    let y_axis = normal.cross(&x_axis);
    if y_axis.norm() < f64::EPSILON {
        return None;
    }
    let y_axis = y_axis.normalize();

    // Re-derive the up axis so the triad is orthonormal even when the
    // direction is not exactly in the face plane
    let z_axis = x_axis.cross(&y_axis);

    let rot = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x_axis, y_axis, z_axis]));
    Some(UnitQuaternion::from_rotation_matrix(&rot))
}

/// Interpolate the per-vertex traversal cost at a position inside a face.
///
/// Returns `None` if the position cannot be expressed in the face (degenerate
/// geometry). Lethal vertex costs propagate through the interpolation as
/// infinities.
pub fn cost_at_position<M: MeshMap>(
    mesh: &M,
    face: FaceHandle,
    position: &Vector3<f64>,
) -> Option<f64> {
    let [va, vb, vc] = mesh.vertices_of_face(face);
    let a = mesh.vertex_position(va);
    let b = mesh.vertex_position(vb);
    let c = mesh.vertex_position(vc);

    let projected = project_onto_plane(position, &a, &mesh.face_normal(face));
    let (u, v) = barycentric_coords(&projected, &a, &b, &c)?;
    let w = 1.0 - u - v;

    Some(u * mesh.vertex_cost(va) + v * mesh.vertex_cost(vb) + w * mesh.vertex_cost(vc))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_barycentric_coords() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(1.0, 0.0, 0.0);
        let c = Vector3::new(0.0, 1.0, 0.0);

        // Vertices map onto the corners of the coordinate simplex
        let (u, v) = barycentric_coords(&a, &a, &b, &c).unwrap();
        assert_relative_eq!(u, 1.0, epsilon = 1e-12);
        assert_relative_eq!(v, 0.0, epsilon = 1e-12);
        assert!(barycentric_inside(u, v));

        // Centroid
        let centroid = (a + b + c) / 3.0;
        let (u, v) = barycentric_coords(&centroid, &a, &b, &c).unwrap();
        assert_relative_eq!(u, 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(v, 1.0 / 3.0, epsilon = 1e-12);
        assert!(barycentric_inside(u, v));

        // A point well outside
        let (u, v) = barycentric_coords(&Vector3::new(2.0, 2.0, 0.0), &a, &b, &c).unwrap();
        assert!(!barycentric_inside(u, v));

        // Degenerate triangle
        assert!(barycentric_coords(&a, &a, &a, &c).is_none());
    }

    #[test]
    fn test_project_onto_plane() {
        let plane_point = Vector3::new(0.0, 0.0, 1.0);
        let normal = Vector3::new(0.0, 0.0, 1.0);

        let projected = project_onto_plane(&Vector3::new(3.0, -2.0, 7.0), &plane_point, &normal);
        assert_relative_eq!(projected.x, 3.0);
        assert_relative_eq!(projected.y, -2.0);
        assert_relative_eq!(projected.z, 1.0);
    }

    #[test]
    fn test_rotate_about_axis() {
        let rotated = rotate_about_axis(
            &Vector3::new(1.0, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 2.0),
            std::f64::consts::FRAC_PI_2,
        );
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(rotated.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_between_clamps() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(angle_between(&a, &a), 0.0);
        assert_relative_eq!(
            angle_between(&a, &Vector3::new(-1.0, 0.0, 0.0)),
            std::f64::consts::PI
        );
        assert_relative_eq!(
            angle_between(&a, &Vector3::new(0.0, 2.0, 0.0)),
            std::f64::consts::FRAC_PI_2
        );
    }

    #[test]
    fn test_orientation_from_direction() {
        let q = orientation_from_direction(
            &Vector3::new(0.0, 1.0, 0.0),
            &Vector3::new(0.0, 0.0, 1.0),
        )
        .unwrap();

        let fwd = q * Vector3::x();
        assert_relative_eq!(fwd.y, 1.0, epsilon = 1e-12);

        // Degenerate direction
        assert!(orientation_from_direction(
            &Vector3::zeros(),
            &Vector3::new(0.0, 0.0, 1.0)
        )
        .is_none());
    }
}
