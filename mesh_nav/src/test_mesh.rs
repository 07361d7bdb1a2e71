//! Fixture meshes for the test suites.
//!
//! A small indexed triangle mesh with welded topology, enough to exercise
//! the planner and controller against [`MeshMap`] without an external mesh
//! provider.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;
use std::cell::RefCell;
use std::collections::HashMap;

// Internal
use crate::mesh::{EdgeHandle, FaceHandle, MeshMap, VertexHandle};
use crate::planner::CancelFlag;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An indexed triangle mesh with precomputed adjacency.
pub(crate) struct TestMesh {
    positions: Vec<Vector3<f64>>,
    faces: Vec<[u32; 3]>,
    costs: Vec<f64>,
    valid: Vec<bool>,

    edges: Vec<(u32, u32)>,
    edge_lookup: HashMap<(u32, u32), u32>,
    edge_faces: Vec<[Option<u32>; 2]>,
    vertex_faces: Vec<Vec<u32>>,
    vertex_neighbours: Vec<Vec<u32>>,
}

/// Wrapper mesh that sets a cancellation flag on the first neighbour query,
/// simulating a cancel request arriving mid-sweep.
pub(crate) struct CancelingMesh {
    inner: TestMesh,
    flag: RefCell<Option<CancelFlag>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TestMesh {
    pub fn new(positions: Vec<[f64; 3]>, faces: Vec<[u32; 3]>) -> Self {
        let positions: Vec<Vector3<f64>> = positions
            .into_iter()
            .map(|p| Vector3::new(p[0], p[1], p[2]))
            .collect();
        let num_vertices = positions.len();

        let mut edges = Vec::new();
        let mut edge_lookup = HashMap::new();
        let mut edge_faces: Vec<[Option<u32>; 2]> = Vec::new();
        let mut vertex_faces = vec![Vec::new(); num_vertices];
        let mut vertex_neighbours: Vec<Vec<u32>> = vec![Vec::new(); num_vertices];

        for (fi, face) in faces.iter().enumerate() {
            for k in 0..3 {
                let a = face[k];
                let b = face[(k + 1) % 3];
                let key = (a.min(b), a.max(b));

                let ei = *edge_lookup.entry(key).or_insert_with(|| {
                    edges.push(key);
                    edge_faces.push([None, None]);
                    (edges.len() - 1) as u32
                });

                let slots = &mut edge_faces[ei as usize];
                if slots[0].is_none() {
                    slots[0] = Some(fi as u32);
                } else if slots[1].is_none() {
                    slots[1] = Some(fi as u32);
                }

                vertex_faces[a as usize].push(fi as u32);
                if !vertex_neighbours[a as usize].contains(&b) {
                    vertex_neighbours[a as usize].push(b);
                }
                if !vertex_neighbours[b as usize].contains(&a) {
                    vertex_neighbours[b as usize].push(a);
                }
            }
        }

        // Each face was pushed once per corner, deduplicate
        for list in vertex_faces.iter_mut() {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            costs: vec![0.0; num_vertices],
            valid: vec![true; num_vertices],
            positions,
            faces,
            edges,
            edge_lookup,
            edge_faces,
            vertex_faces,
            vertex_neighbours,
        }
    }

    /// A flat triangulated grid of `nx` by `ny` vertices in the z = 0 plane.
    /// Vertex `(x, y)` has index `y * nx + x`.
    pub fn grid(nx: u32, ny: u32, spacing: f64) -> Self {
        let mut positions = Vec::new();
        for y in 0..ny {
            for x in 0..nx {
                positions.push([x as f64 * spacing, y as f64 * spacing, 0.0]);
            }
        }

        let mut faces = Vec::new();
        for y in 0..ny - 1 {
            for x in 0..nx - 1 {
                let v00 = y * nx + x;
                let v10 = y * nx + x + 1;
                let v01 = (y + 1) * nx + x;
                let v11 = (y + 1) * nx + x + 1;
                faces.push([v00, v10, v01]);
                faces.push([v10, v11, v01]);
            }
        }

        Self::new(positions, faces)
    }

    pub fn set_cost(&mut self, vertex: VertexHandle, cost: f64) {
        self.costs[vertex.0 as usize] = cost;
    }

    pub fn set_valid(&mut self, vertex: VertexHandle, valid: bool) {
        self.valid[vertex.0 as usize] = valid;
    }
}

impl MeshMap for TestMesh {
    fn vertex_handles(&self) -> Vec<VertexHandle> {
        (0..self.positions.len() as u32).map(VertexHandle).collect()
    }

    fn face_handles(&self) -> Vec<FaceHandle> {
        (0..self.faces.len() as u32).map(FaceHandle).collect()
    }

    fn vertex_position(&self, vertex: VertexHandle) -> Vector3<f64> {
        self.positions[vertex.0 as usize]
    }

    fn face_normal(&self, face: FaceHandle) -> Vector3<f64> {
        let [a, b, c] = self.faces[face.0 as usize];
        let pa = self.positions[a as usize];
        let pb = self.positions[b as usize];
        let pc = self.positions[c as usize];
        (pb - pa).cross(&(pc - pa)).normalize()
    }

    fn vertices_of_face(&self, face: FaceHandle) -> [VertexHandle; 3] {
        let [a, b, c] = self.faces[face.0 as usize];
        [VertexHandle(a), VertexHandle(b), VertexHandle(c)]
    }

    fn faces_of_vertex(&self, vertex: VertexHandle) -> Vec<FaceHandle> {
        self.vertex_faces[vertex.0 as usize]
            .iter()
            .map(|&f| FaceHandle(f))
            .collect()
    }

    fn vertex_neighbours(&self, vertex: VertexHandle) -> Vec<VertexHandle> {
        self.vertex_neighbours[vertex.0 as usize]
            .iter()
            .map(|&v| VertexHandle(v))
            .collect()
    }

    fn face_neighbours(&self, face: FaceHandle) -> Vec<FaceHandle> {
        let mut neighbours = Vec::new();
        let [a, b, c] = self.faces[face.0 as usize];
        for &(va, vb) in &[(a, b), (b, c), (c, a)] {
            let key = (va.min(vb), va.max(vb));
            if let Some(&ei) = self.edge_lookup.get(&key) {
                for slot in self.edge_faces[ei as usize].iter().flatten() {
                    if *slot != face.0 {
                        neighbours.push(FaceHandle(*slot));
                    }
                }
            }
        }
        neighbours
    }

    fn edge_between(&self, a: VertexHandle, b: VertexHandle) -> Option<EdgeHandle> {
        let key = (a.0.min(b.0), a.0.max(b.0));
        self.edge_lookup.get(&key).map(|&e| EdgeHandle(e))
    }

    fn faces_of_edge(&self, edge: EdgeHandle) -> [Option<FaceHandle>; 2] {
        let [f0, f1] = self.edge_faces[edge.0 as usize];
        [f0.map(FaceHandle), f1.map(FaceHandle)]
    }

    fn face_between(
        &self,
        a: VertexHandle,
        b: VertexHandle,
        c: VertexHandle,
    ) -> Option<FaceHandle> {
        let mut wanted = [a.0, b.0, c.0];
        wanted.sort_unstable();
        for &fi in &self.vertex_faces[a.0 as usize] {
            let mut verts = self.faces[fi as usize];
            verts.sort_unstable();
            if verts == wanted {
                return Some(FaceHandle(fi));
            }
        }
        None
    }

    fn edge_length(&self, edge: EdgeHandle) -> f64 {
        let (a, b) = self.edges[edge.0 as usize];
        (self.positions[a as usize] - self.positions[b as usize]).norm()
    }

    fn vertex_cost(&self, vertex: VertexHandle) -> f64 {
        self.costs[vertex.0 as usize]
    }

    fn vertex_valid(&self, vertex: VertexHandle) -> bool {
        self.valid[vertex.0 as usize]
    }
}

impl CancelingMesh {
    pub fn new(inner: TestMesh) -> Self {
        Self {
            inner,
            flag: RefCell::new(None),
        }
    }

    /// Arm the wrapper with the flag to set once expansion begins.
    pub fn arm(&self, flag: CancelFlag) {
        *self.flag.borrow_mut() = Some(flag);
    }
}

impl MeshMap for CancelingMesh {
    fn vertex_handles(&self) -> Vec<VertexHandle> {
        self.inner.vertex_handles()
    }

    fn face_handles(&self) -> Vec<FaceHandle> {
        self.inner.face_handles()
    }

    fn vertex_position(&self, vertex: VertexHandle) -> Vector3<f64> {
        self.inner.vertex_position(vertex)
    }

    fn face_normal(&self, face: FaceHandle) -> Vector3<f64> {
        self.inner.face_normal(face)
    }

    fn vertices_of_face(&self, face: FaceHandle) -> [VertexHandle; 3] {
        self.inner.vertices_of_face(face)
    }

    fn faces_of_vertex(&self, vertex: VertexHandle) -> Vec<FaceHandle> {
        self.inner.faces_of_vertex(vertex)
    }

    fn vertex_neighbours(&self, vertex: VertexHandle) -> Vec<VertexHandle> {
        // The cancel request "arrives" during the first expansion
        if let Some(flag) = &*self.flag.borrow() {
            flag.set();
        }
        self.inner.vertex_neighbours(vertex)
    }

    fn face_neighbours(&self, face: FaceHandle) -> Vec<FaceHandle> {
        self.inner.face_neighbours(face)
    }

    fn edge_between(&self, a: VertexHandle, b: VertexHandle) -> Option<EdgeHandle> {
        self.inner.edge_between(a, b)
    }

    fn faces_of_edge(&self, edge: EdgeHandle) -> [Option<FaceHandle>; 2] {
        self.inner.faces_of_edge(edge)
    }

    fn face_between(
        &self,
        a: VertexHandle,
        b: VertexHandle,
        c: VertexHandle,
    ) -> Option<FaceHandle> {
        self.inner.face_between(a, b, c)
    }

    fn edge_length(&self, edge: EdgeHandle) -> f64 {
        self.inner.edge_length(edge)
    }

    fn vertex_cost(&self, vertex: VertexHandle) -> f64 {
        self.inner.vertex_cost(vertex)
    }

    fn vertex_valid(&self, vertex: VertexHandle) -> bool {
        self.inner.vertex_valid(vertex)
    }
}
