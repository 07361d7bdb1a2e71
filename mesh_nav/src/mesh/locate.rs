//! # Face location
//!
//! Point-in-triangle searches over the mesh. Two strategies are provided: a
//! whole-mesh scan, and a bounded breadth-first expansion outward from a seed
//! face for the common case where the previous containing face is known.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;
use std::collections::{HashSet, VecDeque};

// Internal
use super::{barycentric_coords, barycentric_inside, project_onto_plane, FaceHandle, MeshMap};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Containing-face search over a mesh.
#[derive(Debug, Copy, Clone)]
pub struct FaceLocator {
    /// Cap on the number of faces visited during a local search
    max_visited_faces: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FaceLocator {
    pub fn new(max_visited_faces: usize) -> Self {
        Self { max_visited_faces }
    }

    /// Whether the face contains the point.
    ///
    /// The point is projected onto the face plane first; it is only contained
    /// if its distance to the plane is within `tolerance_m` and the projected
    /// point passes the barycentric test.
    pub fn face_contains<M: MeshMap>(
        mesh: &M,
        face: FaceHandle,
        point: &Vector3<f64>,
        tolerance_m: f64,
    ) -> bool {
        let [va, vb, vc] = mesh.vertices_of_face(face);
        let a = mesh.vertex_position(va);
        let b = mesh.vertex_position(vb);
        let c = mesh.vertex_position(vc);
        let normal = mesh.face_normal(face);

        if (point - a).dot(&normal).abs() > tolerance_m {
            return false;
        }

        let projected = project_onto_plane(point, &a, &normal);
        match barycentric_coords(&projected, &a, &b, &c) {
            Some((u, v)) => barycentric_inside(u, v),
            None => false,
        }
    }

    /// Scan the whole mesh for the face containing the point.
    pub fn global_search<M: MeshMap>(
        &self,
        mesh: &M,
        point: &Vector3<f64>,
        tolerance_m: f64,
    ) -> Option<FaceHandle> {
        mesh.face_handles()
            .into_iter()
            .find(|&face| Self::face_contains(mesh, face, point, tolerance_m))
    }

    /// Expand outward from the seed face through face adjacency, testing
    /// containment at each visited face.
    ///
    /// The search gives up once `max_visited_faces` faces have been tested,
    /// which bounds the work for points far outside the mesh or degenerate
    /// geometry at a vertex fan.
    pub fn local_search<M: MeshMap>(
        &self,
        mesh: &M,
        seed: FaceHandle,
        point: &Vector3<f64>,
        tolerance_m: f64,
    ) -> Option<FaceHandle> {
        let mut queue = VecDeque::new();
        let mut enqueued = HashSet::new();
        queue.push_back(seed);
        enqueued.insert(seed);

        let mut visited = 0;
        while let Some(face) = queue.pop_front() {
            if visited >= self.max_visited_faces {
                return None;
            }
            visited += 1;

            if Self::face_contains(mesh, face, point, tolerance_m) {
                return Some(face);
            }

            // Enqueue neighbours of neighbours too, so that small faces or a
            // vertex fan overstepped by the point do not dead-end the search
            for neighbour in mesh.face_neighbours(face) {
                if enqueued.insert(neighbour) {
                    queue.push_back(neighbour);
                }
            }
        }

        None
    }

    /// Two-phase search: a bounded local search from the seed face if one is
    /// known, falling back to a single global scan.
    pub fn locate<M: MeshMap>(
        &self,
        mesh: &M,
        seed: Option<FaceHandle>,
        point: &Vector3<f64>,
        tolerance_m: f64,
    ) -> Option<FaceHandle> {
        if let Some(seed) = seed {
            if let Some(face) = self.local_search(mesh, seed, point, tolerance_m) {
                return Some(face);
            }
        }
        self.global_search(mesh, point, tolerance_m)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_mesh::TestMesh;

    #[test]
    fn test_global_search() {
        let mesh = TestMesh::grid(4, 4, 1.0);
        let locator = FaceLocator::new(40);

        let face = locator
            .global_search(&mesh, &Vector3::new(0.3, 0.2, 0.0), 0.2)
            .unwrap();
        assert!(FaceLocator::face_contains(
            &mesh,
            face,
            &Vector3::new(0.3, 0.2, 0.0),
            0.2
        ));

        // A point far off the mesh is not found
        assert!(locator
            .global_search(&mesh, &Vector3::new(100.0, 100.0, 0.0), 0.2)
            .is_none());

        // A point above the mesh beyond the plane tolerance is not found
        assert!(locator
            .global_search(&mesh, &Vector3::new(0.3, 0.2, 1.0), 0.2)
            .is_none());
    }

    #[test]
    fn test_local_search_walks_to_point() {
        let mesh = TestMesh::grid(4, 4, 1.0);
        let locator = FaceLocator::new(40);
        let point = Vector3::new(2.5, 2.2, 0.0);

        let seed = locator
            .global_search(&mesh, &Vector3::new(0.3, 0.2, 0.0), 0.2)
            .unwrap();
        let found = locator.local_search(&mesh, seed, &point, 0.2).unwrap();
        assert!(FaceLocator::face_contains(&mesh, found, &point, 0.2));
    }

    #[test]
    fn test_local_search_respects_cap() {
        let mesh = TestMesh::grid(10, 10, 1.0);
        // With a single visit allowed only the seed face itself is tested
        let locator = FaceLocator::new(1);

        let seed = FaceLocator::new(40)
            .global_search(&mesh, &Vector3::new(0.3, 0.2, 0.0), 0.2)
            .unwrap();
        assert!(locator
            .local_search(&mesh, seed, &Vector3::new(8.5, 8.2, 0.0), 0.2)
            .is_none());

        // The two-phase locate falls back to the global scan and succeeds
        let found = locator
            .locate(&mesh, Some(seed), &Vector3::new(8.5, 8.2, 0.0), 0.2)
            .unwrap();
        assert!(FaceLocator::face_contains(
            &mesh,
            found,
            &Vector3::new(8.5, 8.2, 0.0),
            0.2
        ));
    }
}
