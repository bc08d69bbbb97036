// Half-edge topology store for the simulation mesh
//
// Vertices, directed half-edges and triangular faces live in flat arenas
// addressed by u32 handles. All "pointer" relations (origin, pair, next,
// face) are handle fields; INVALID marks the absence of a relation.
// Records are tombstoned on removal, indices are never reused.

use crate::diffusion::DiffusionTensor;
use crate::geometry::{self, Point3D, Vector3D};
use std::collections::HashMap;

/// Index into the vertex arena.
pub type VertexId = u32;
/// Index into the half-edge arena.
pub type HalfEdgeId = u32;
/// Index into the face arena.
pub type FaceId = u32;

/// Sentinel value for "no element".
pub const INVALID: u32 = u32::MAX;

/// A mesh vertex.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Point3D,
    /// One outgoing half-edge.
    pub half_edge: HalfEdgeId,
    /// Area of the dual cell owned by this vertex; denominator of the
    /// discrete Laplacian. Written by the coefficient compiler.
    pub dual_area: f64,
    pub boundary: bool,
    /// Per-morphogen scalar weights, only meaningful on open boundaries.
    pub boundary_weights: Vec<f64>,
    /// Parent endpoints when this vertex was created by an edge split,
    /// used for attribute interpolation (UVs, concentrations).
    pub lineage: Option<(VertexId, VertexId)>,
    pub alive: bool,
}

/// A directed half-edge.
#[derive(Debug, Clone)]
pub struct HalfEdge {
    pub origin: VertexId,
    pub dest: VertexId,
    /// Opposite-direction half-edge along the same undirected edge.
    pub pair: HalfEdgeId,
    /// Next half-edge around the owning face (or around the boundary loop).
    pub next: HalfEdgeId,
    /// Owning face; INVALID for boundary half-edges.
    pub face: FaceId,
    /// Interior angle at the origin vertex, within the owning face.
    pub angle: f64,
    pub boundary: bool,
    /// Per-morphogen flux coefficient for Laplacian evaluation.
    /// Written by the coefficient compiler.
    pub flux: Vec<f64>,
    pub alive: bool,
}

/// A triangular face.
#[derive(Debug, Clone)]
pub struct Face {
    /// One half-edge on the boundary of this face.
    pub half_edge: HalfEdgeId,
    pub normal: Vector3D,
    pub area: f64,
    /// Circumcenter, or barycenter when the circumcenter falls outside.
    pub center: Point3D,
    /// Per-morphogen anisotropic diffusion tensor.
    pub tensors: Vec<DiffusionTensor>,
    pub alive: bool,
}

/// Half-edge mesh with arena storage and hashed directed-edge lookup.
pub struct HalfEdgeMesh {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<HalfEdge>,
    pub faces: Vec<Face>,
    edge_lookup: HashMap<u64, HalfEdgeId>,
    morphogen_count: usize,
    /// Bumped on every topology change; consumers compare generations to
    /// detect that derived buffers must be rebuilt.
    generation: u64,
}

fn edge_key(v0: VertexId, v1: VertexId) -> u64 {
    ((v0 as u64) << 32) | v1 as u64
}

impl HalfEdgeMesh {
    pub fn new(morphogen_count: usize) -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            faces: Vec::new(),
            edge_lookup: HashMap::new(),
            morphogen_count,
            generation: 0,
        }
    }

    pub fn morphogen_count(&self) -> usize {
        self.morphogen_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.iter().filter(|f| f.alive).count()
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    pub fn create_vertex(&mut self, position: Point3D) -> VertexId {
        let id = self.vertices.len() as VertexId;
        self.vertices.push(Vertex {
            position,
            half_edge: INVALID,
            dual_area: 0.0,
            boundary: false,
            boundary_weights: vec![1.0; self.morphogen_count],
            lineage: None,
            alive: true,
        });
        self.generation += 1;
        id
    }

    /// Create the directed edge v0 -> v1.
    /// Creating a directed edge that already exists is a caller bug.
    pub fn create_edge(&mut self, v0: VertexId, v1: VertexId) -> HalfEdgeId {
        assert!(
            !self.edge_exists(v0, v1),
            "duplicate directed edge {} -> {}",
            v0,
            v1
        );
        assert_ne!(v0, v1, "degenerate edge at vertex {}", v0);

        let id = self.edges.len() as HalfEdgeId;
        self.edges.push(HalfEdge {
            origin: v0,
            dest: v1,
            pair: INVALID,
            next: INVALID,
            face: INVALID,
            angle: 0.0,
            boundary: false,
            flux: vec![0.0; self.morphogen_count],
            alive: true,
        });
        self.edge_lookup.insert(edge_key(v0, v1), id);

        // Wire the pair if the opposite direction already exists
        if let Some(&rev) = self.edge_lookup.get(&edge_key(v1, v0)) {
            self.edges[id as usize].pair = rev;
            self.edges[rev as usize].pair = id;
        }

        if self.vertices[v0 as usize].half_edge == INVALID {
            self.vertices[v0 as usize].half_edge = id;
        }
        self.generation += 1;
        id
    }

    /// Create a triangular face from three existing half-edges forming a
    /// cycle. Rewires next/face pointers and computes the face geometry.
    pub fn create_face(&mut self, e01: HalfEdgeId, e12: HalfEdgeId, e20: HalfEdgeId) -> FaceId {
        for &(a, b) in &[(e01, e12), (e12, e20), (e20, e01)] {
            assert_eq!(
                self.edges[a as usize].dest,
                self.edges[b as usize].origin,
                "face edges do not form a cycle"
            );
            assert_eq!(
                self.edges[a as usize].face,
                INVALID,
                "half-edge {} already owned by a face",
                a
            );
        }

        let id = self.faces.len() as FaceId;
        self.faces.push(Face {
            half_edge: e01,
            normal: Vector3D::zeros(),
            area: 0.0,
            center: Point3D::origin(),
            tensors: vec![DiffusionTensor::default(); self.morphogen_count],
            alive: true,
        });

        self.edges[e01 as usize].next = e12;
        self.edges[e12 as usize].next = e20;
        self.edges[e20 as usize].next = e01;
        for &e in &[e01, e12, e20] {
            self.edges[e as usize].face = id;
        }

        self.refresh_face_geometry(id);
        self.generation += 1;
        id
    }

    // ------------------------------------------------------------------
    // Lookup and accessors
    // ------------------------------------------------------------------

    pub fn edge_exists(&self, v0: VertexId, v1: VertexId) -> bool {
        self.edge_lookup.contains_key(&edge_key(v0, v1))
    }

    pub fn get_edge(&self, v0: VertexId, v1: VertexId) -> Option<HalfEdgeId> {
        self.edge_lookup.get(&edge_key(v0, v1)).copied()
    }

    pub fn position(&self, v: VertexId) -> Point3D {
        self.vertices[v as usize].position
    }

    pub fn edge_length(&self, e: HalfEdgeId) -> f64 {
        let edge = &self.edges[e as usize];
        (self.position(edge.dest) - self.position(edge.origin)).norm()
    }

    /// The three half-edges of a face, starting at its anchor edge.
    pub fn face_edges(&self, f: FaceId) -> [HalfEdgeId; 3] {
        let e0 = self.faces[f as usize].half_edge;
        let e1 = self.edges[e0 as usize].next;
        let e2 = self.edges[e1 as usize].next;
        [e0, e1, e2]
    }

    /// The three corner vertices of a face, in winding order.
    pub fn face_vertices(&self, f: FaceId) -> [VertexId; 3] {
        let [e0, e1, e2] = self.face_edges(f);
        [
            self.edges[e0 as usize].origin,
            self.edges[e1 as usize].origin,
            self.edges[e2 as usize].origin,
        ]
    }

    /// Longest half-edge of a face.
    pub fn longest_edge(&self, f: FaceId) -> HalfEdgeId {
        let [e0, e1, e2] = self.face_edges(f);
        let mut best = e0;
        let mut best_len = self.edge_length(e0);
        for &e in &[e1, e2] {
            let len = self.edge_length(e);
            if len > best_len {
                best = e;
                best_len = len;
            }
        }
        best
    }

    /// All outgoing half-edges of a vertex, by circulation where possible.
    pub fn outgoing_edges(&self, v: VertexId) -> Vec<HalfEdgeId> {
        let start = self.vertices[v as usize].half_edge;
        if start == INVALID {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut e = start;
        loop {
            out.push(e);
            let pair = self.edges[e as usize].pair;
            if pair == INVALID {
                // Boundary not yet synthesized; fall back to a full scan
                return self.scan_outgoing(v);
            }
            e = self.edges[pair as usize].next;
            if e == INVALID {
                return self.scan_outgoing(v);
            }
            if e == start {
                break;
            }
            if out.len() > self.edges.len() {
                panic!("half-edge circulation at vertex {} does not close", v);
            }
        }
        out
    }

    fn scan_outgoing(&self, v: VertexId) -> Vec<HalfEdgeId> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.alive && e.origin == v)
            .map(|(i, _)| i as HalfEdgeId)
            .collect()
    }

    /// Faces incident to a vertex.
    pub fn incident_faces(&self, v: VertexId) -> Vec<FaceId> {
        let mut out = Vec::new();
        for e in self.outgoing_edges(v) {
            let f = self.edges[e as usize].face;
            if f != INVALID && !out.contains(&f) {
                out.push(f);
            }
        }
        out
    }

    /// Area-weighted vertex normal from incident faces.
    pub fn vertex_normal(&self, v: VertexId) -> Vector3D {
        let mut n = Vector3D::zeros();
        for f in self.incident_faces(v) {
            let face = &self.faces[f as usize];
            n += face.normal * face.area;
        }
        let norm = n.norm();
        if norm < 1e-12 || !norm.is_finite() {
            Vector3D::new(0.0, 0.0, 1.0)
        } else {
            n / norm
        }
    }

    pub fn total_area(&self) -> f64 {
        self.faces.iter().filter(|f| f.alive).map(|f| f.area).sum()
    }

    // ------------------------------------------------------------------
    // Neighbor queries
    // ------------------------------------------------------------------

    /// Vertices within `order` edge hops of `v` (excluding `v` itself),
    /// by breadth-first expansion.
    pub fn neighbors_by_hops(&self, v: VertexId, order: usize) -> Vec<VertexId> {
        let mut visited = vec![false; self.vertices.len()];
        visited[v as usize] = true;
        let mut frontier = vec![v];
        let mut out = Vec::new();

        for _ in 0..order {
            let mut next = Vec::new();
            for &u in &frontier {
                for e in self.outgoing_edges(u) {
                    let w = self.edges[e as usize].dest;
                    if !visited[w as usize] {
                        visited[w as usize] = true;
                        out.push(w);
                        next.push(w);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }

    /// Vertices within Euclidean `radius` of `v` (including `v`), by
    /// breadth-first expansion bounded by the radius.
    pub fn neighbors_in_radius(&self, v: VertexId, radius: f64) -> Vec<VertexId> {
        let center = self.position(v);
        let mut visited = vec![false; self.vertices.len()];
        visited[v as usize] = true;
        let mut frontier = vec![v];
        let mut out = vec![v];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &u in &frontier {
                for e in self.outgoing_edges(u) {
                    let w = self.edges[e as usize].dest;
                    if visited[w as usize] {
                        continue;
                    }
                    visited[w as usize] = true;
                    if (self.position(w) - center).norm() <= radius {
                        out.push(w);
                        next.push(w);
                    }
                }
            }
            frontier = next;
        }
        out
    }

    // ------------------------------------------------------------------
    // Geometry refresh
    // ------------------------------------------------------------------

    /// Recompute angle/area/normal/center for one face.
    pub fn refresh_face_geometry(&mut self, f: FaceId) {
        let [e0, e1, e2] = self.face_edges(f);
        let [a, b, c] = self.face_vertices(f);
        let (pa, pb, pc) = (self.position(a), self.position(b), self.position(c));

        self.edges[e0 as usize].angle = geometry::interior_angle(&pa, &pb, &pc);
        self.edges[e1 as usize].angle = geometry::interior_angle(&pb, &pc, &pa);
        self.edges[e2 as usize].angle = geometry::interior_angle(&pc, &pa, &pb);

        let face = &mut self.faces[f as usize];
        face.area = geometry::triangle_area(&pa, &pb, &pc);
        face.normal = geometry::triangle_normal(&pa, &pb, &pc);
        face.center = geometry::face_center(&pa, &pb, &pc);
    }

    /// Recompute geometry for every live face. Called after any growth pass
    /// that moves vertex positions.
    pub fn refresh_all_faces(&mut self) {
        for f in 0..self.faces.len() {
            if self.faces[f].alive {
                self.refresh_face_geometry(f as FaceId);
            }
        }
    }

    // ------------------------------------------------------------------
    // Splitting
    // ------------------------------------------------------------------

    fn alloc_edge(&mut self, origin: VertexId, dest: VertexId) -> HalfEdgeId {
        let id = self.edges.len() as HalfEdgeId;
        self.edges.push(HalfEdge {
            origin,
            dest,
            pair: INVALID,
            next: INVALID,
            face: INVALID,
            angle: 0.0,
            boundary: false,
            flux: vec![0.0; self.morphogen_count],
            alive: true,
        });
        self.edge_lookup.insert(edge_key(origin, dest), id);
        id
    }

    /// Split face `f` across its half-edge `e` and the opposite vertex,
    /// producing one new vertex (unless `shared_mid` carries the midpoint
    /// created by the symmetric split of the neighboring face), three new
    /// half-edges and one new face.
    ///
    /// An interior split leaves the two sub-edges unpaired until the
    /// neighboring face is split with the same midpoint; the subdivision
    /// engine guarantees that symmetric split happens immediately after.
    /// A boundary split rewires the surrounding boundary loop itself.
    pub fn split_face_at(
        &mut self,
        f: FaceId,
        e: HalfEdgeId,
        shared_mid: Option<VertexId>,
    ) -> (VertexId, FaceId) {
        assert_eq!(self.edges[e as usize].face, f, "edge {} not owned by face {}", e, f);

        let en = self.edges[e as usize].next; // b -> c
        let enn = self.edges[en as usize].next; // c -> a
        debug_assert_eq!(self.edges[enn as usize].next, e);

        let a = self.edges[e as usize].origin;
        let b = self.edges[e as usize].dest;
        let c = self.edges[en as usize].dest;
        let old_pair = self.edges[e as usize].pair;
        let split_boundary = old_pair != INVALID && self.edges[old_pair as usize].boundary;

        // Midpoint vertex
        let m = match shared_mid {
            Some(m) => m,
            None => {
                let pos = geometry::midpoint(&self.position(a), &self.position(b));
                let m = self.create_vertex(pos);
                self.vertices[m as usize].lineage = Some((a, b));
                m
            }
        };

        // Re-key the shortened edge: (a, b) becomes (a, m)
        self.edge_lookup.remove(&edge_key(a, b));
        self.edge_lookup.insert(edge_key(a, m), e);
        self.edges[e as usize].dest = m;
        self.edges[e as usize].pair = INVALID;

        let e_mb = self.alloc_edge(m, b);
        let e_mc = self.alloc_edge(m, c);
        let e_cm = self.alloc_edge(c, m);

        // f keeps (a -> m, m -> c, c -> a)
        self.edges[e as usize].next = e_mc;
        self.edges[e_mc as usize].next = enn;
        self.edges[e_mc as usize].face = f;
        self.faces[f as usize].half_edge = e;

        // New face takes (m -> b, b -> c, c -> m), inheriting the parent's
        // diffusion tensors.
        let f2 = self.faces.len() as FaceId;
        self.faces.push(Face {
            half_edge: e_mb,
            normal: Vector3D::zeros(),
            area: 0.0,
            center: Point3D::origin(),
            tensors: self.faces[f as usize].tensors.clone(),
            alive: true,
        });
        self.edges[e_mb as usize].next = en;
        self.edges[en as usize].next = e_cm;
        self.edges[e_cm as usize].next = e_mb;
        self.edges[e_mb as usize].face = f2;
        self.edges[en as usize].face = f2;
        self.edges[e_cm as usize].face = f2;

        // The new interior diagonal pairs with itself
        self.edges[e_mc as usize].pair = e_cm;
        self.edges[e_cm as usize].pair = e_mc;

        self.vertices[m as usize].half_edge = e_mb;

        if split_boundary {
            // Split the boundary half-edge (b -> a) into (b -> m, m -> a)
            // and relink the boundary loop.
            let pb = old_pair;
            let pb_next = self.edges[pb as usize].next;

            self.edge_lookup.remove(&edge_key(b, a));
            self.edge_lookup.insert(edge_key(b, m), pb);
            self.edges[pb as usize].dest = m;

            let hb = self.alloc_edge(m, a);
            self.edges[hb as usize].boundary = true;
            self.edges[pb as usize].next = hb;
            self.edges[hb as usize].next = pb_next;

            self.edges[e as usize].pair = hb;
            self.edges[hb as usize].pair = e;
            self.edges[e_mb as usize].pair = pb;
            self.edges[pb as usize].pair = e_mb;

            self.vertices[m as usize].boundary = true;
        } else {
            // Wire cross pairs against the neighbor's sub-edges when they
            // already exist (the second of the two symmetric splits).
            if let Some(&rev) = self.edge_lookup.get(&edge_key(m, a)) {
                self.edges[e as usize].pair = rev;
                self.edges[rev as usize].pair = e;
            }
            if let Some(&rev) = self.edge_lookup.get(&edge_key(b, m)) {
                self.edges[e_mb as usize].pair = rev;
                self.edges[rev as usize].pair = e_mb;
            }
        }

        self.refresh_face_geometry(f);
        self.refresh_face_geometry(f2);
        self.generation += 1;
        (m, f2)
    }

    /// Split the undirected edge under `e` at its midpoint. The owning face
    /// is bisected; for an interior edge the face across the pair is
    /// bisected symmetrically onto the same midpoint, and for a boundary
    /// edge the surrounding boundary loop is rewired instead. Accepts either
    /// half of the edge. Returns the midpoint vertex.
    pub fn split_edge(&mut self, e: HalfEdgeId) -> VertexId {
        assert!(self.edges[e as usize].alive, "split of dead edge {}", e);
        // A boundary half-edge carries no face; operate on its interior side
        let e = if self.edges[e as usize].face != INVALID {
            e
        } else {
            self.edges[e as usize].pair
        };
        let f = self.edges[e as usize].face;
        let pair = self.edges[e as usize].pair;
        let neighbor = if pair != INVALID && !self.edges[pair as usize].boundary {
            self.edges[pair as usize].face
        } else {
            INVALID
        };

        let (mid, _) = self.split_face_at(f, e, None);
        if neighbor != INVALID {
            self.split_face_at(neighbor, pair, Some(mid));
        }
        mid
    }

    // ------------------------------------------------------------------
    // Boundary synthesis
    // ------------------------------------------------------------------

    /// For every half-edge lacking a pair, create an opposite boundary
    /// half-edge, then link the boundary loop. A boundary vertex with more
    /// than one outgoing boundary edge is non-manifold and fatal.
    pub fn close_boundary(&mut self) {
        let mut created = Vec::new();
        for e in 0..self.edges.len() {
            if self.edges[e].alive && self.edges[e].pair == INVALID {
                let (o, d) = (self.edges[e].origin, self.edges[e].dest);
                let hb = self.alloc_edge(d, o);
                self.edges[hb as usize].boundary = true;
                self.edges[hb as usize].pair = e as HalfEdgeId;
                self.edges[e].pair = hb;
                created.push(hb);
                self.vertices[o as usize].boundary = true;
                self.vertices[d as usize].boundary = true;
            }
        }

        if created.is_empty() {
            return;
        }

        // Link the boundary loop: each boundary edge's next starts at its
        // destination. More than one candidate means a non-manifold boundary.
        let mut by_origin: HashMap<VertexId, Vec<HalfEdgeId>> = HashMap::new();
        for &hb in &created {
            by_origin
                .entry(self.edges[hb as usize].origin)
                .or_default()
                .push(hb);
        }
        for &hb in &created {
            let dest = self.edges[hb as usize].dest;
            let candidates = by_origin.get(&dest).map(|v| v.as_slice()).unwrap_or(&[]);
            assert_eq!(
                candidates.len(),
                1,
                "non-manifold boundary at vertex {} ({} outgoing boundary edges)",
                dest,
                candidates.len()
            );
            self.edges[hb as usize].next = candidates[0];
        }

        log::debug!(
            "closed boundary: {} boundary half-edges synthesized",
            created.len()
        );
        self.generation += 1;
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Internal consistency check; violations are fatal.
    /// Cheap enough for tests, intended for debug builds.
    pub fn validate(&self) {
        for (i, e) in self.edges.iter().enumerate() {
            if !e.alive {
                continue;
            }
            let id = i as HalfEdgeId;
            assert_ne!(e.pair, INVALID, "edge {} has no pair", i);
            assert_ne!(e.next, INVALID, "edge {} has no next", i);
            let pair = &self.edges[e.pair as usize];
            assert_eq!(pair.pair, id, "pair of edge {} does not point back", i);
            assert_eq!(pair.origin, e.dest, "pair of edge {} origin mismatch", i);
            assert_eq!(pair.dest, e.origin, "pair of edge {} dest mismatch", i);
            assert!(
                e.face == INVALID || e.face != pair.face,
                "edge {} shares a face with its pair",
                i
            );

            if e.face != INVALID {
                // next^3 returns to the edge within a triangular face
                let n1 = e.next;
                let n2 = self.edges[n1 as usize].next;
                let n3 = self.edges[n2 as usize].next;
                assert_eq!(n3, id, "edge {} next^3 does not close", i);
                assert_eq!(self.edges[n1 as usize].face, e.face);
                assert_eq!(self.edges[n2 as usize].face, e.face);
                assert_eq!(
                    self.edges[n1 as usize].origin, e.dest,
                    "edge {} next does not continue at dest",
                    i
                );
            }
        }

        for (i, f) in self.faces.iter().enumerate() {
            if !f.alive {
                continue;
            }
            assert_eq!(
                self.edges[f.half_edge as usize].face, i as FaceId,
                "face {} anchor edge does not point back",
                i
            );
            assert_eq!(f.tensors.len(), self.morphogen_count);
        }

        for (i, v) in self.vertices.iter().enumerate() {
            if !v.alive {
                continue;
            }
            if v.half_edge != INVALID {
                assert_eq!(
                    self.edges[v.half_edge as usize].origin, i as VertexId,
                    "vertex {} anchor edge does not originate there",
                    i
                );
            }
        }
    }

    #[cfg(debug_assertions)]
    pub fn debug_validate(&self) {
        self.validate();
    }

    #[cfg(not(debug_assertions))]
    pub fn debug_validate(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders;

    #[test]
    fn test_single_triangle_construction() {
        let mesh = builders::equilateral_triangle(2);
        mesh.validate();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
        // 3 interior + 3 boundary half-edges
        assert_eq!(mesh.edge_count(), 6);
        assert!(mesh.vertices.iter().all(|v| v.boundary));
    }

    #[test]
    fn test_edge_lookup() {
        let mesh = builders::equilateral_triangle(1);
        assert!(mesh.edge_exists(0, 1));
        // Boundary synthesis created the reverse directions too
        assert!(mesh.edge_exists(1, 0));
        let e = mesh.get_edge(0, 1).unwrap();
        assert_eq!(mesh.edges[e as usize].origin, 0);
        assert_eq!(mesh.edges[e as usize].dest, 1);
    }

    #[test]
    #[should_panic(expected = "duplicate directed edge")]
    fn test_duplicate_edge_is_fatal() {
        let mut mesh = HalfEdgeMesh::new(1);
        let v0 = mesh.create_vertex(Point3D::new(0.0, 0.0, 0.0));
        let v1 = mesh.create_vertex(Point3D::new(1.0, 0.0, 0.0));
        mesh.create_edge(v0, v1);
        mesh.create_edge(v0, v1);
    }

    #[test]
    fn test_closed_mesh_euler_characteristic() {
        let mesh = builders::octahedron(2);
        mesh.validate();

        let v = mesh.vertex_count() as i64;
        let e = (mesh.edge_count() / 2) as i64;
        let f = mesh.face_count() as i64;
        assert_eq!(v - e + f, 2);
        assert!(mesh.vertices.iter().all(|v| !v.boundary));
    }

    #[test]
    fn test_euler_invariant_under_subdivision() {
        let mut mesh = builders::octahedron(2);
        crate::subdivision::subdivide_face(&mut mesh, 0);
        crate::subdivision::subdivide_face(&mut mesh, 3);
        mesh.validate();

        let v = mesh.vertex_count() as i64;
        let e = (mesh.edge_count() / 2) as i64;
        let f = mesh.face_count() as i64;
        assert_eq!(v - e + f, 2);
    }

    #[test]
    fn test_split_edge_interior() {
        let mut mesh = builders::square_patch(2, 1.0, 1);
        // The diagonal is shared by both triangles of the quad
        let e = mesh.get_edge(0, 3).unwrap();
        let area = mesh.total_area();

        let mid = mesh.split_edge(e);
        mesh.validate();

        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.face_count(), 4);
        assert!((mesh.total_area() - area).abs() < 1e-12);
        assert!((mesh.position(mid) - Point3D::new(0.5, 0.5, 0.0)).norm() < 1e-12);
        assert_eq!(mesh.vertices[mid as usize].lineage, Some((0, 3)));
        assert!(!mesh.vertices[mid as usize].boundary);
    }

    #[test]
    fn test_split_edge_boundary() {
        let mut mesh = builders::equilateral_triangle(1);
        let e = mesh.get_edge(0, 1).unwrap();
        let area = mesh.total_area();

        let mid = mesh.split_edge(e);
        mesh.validate();

        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert!((mesh.total_area() - area).abs() < 1e-12);
        assert!(mesh.vertices[mid as usize].boundary);
    }

    #[test]
    fn test_split_edge_accepts_either_half() {
        let mut mesh = builders::equilateral_triangle(1);
        // The reverse direction is the synthesized boundary half-edge
        let e = mesh.get_edge(1, 0).unwrap();
        assert!(mesh.edges[e as usize].boundary);

        let mid = mesh.split_edge(e);
        mesh.validate();
        assert_eq!(mesh.vertices[mid as usize].lineage, Some((0, 1)));
    }

    #[test]
    fn test_neighbors_by_hops() {
        let mesh = builders::square_patch(3, 1.0, 2);
        // Corner vertex of a 3x3 patch: two direct grid neighbors plus the
        // diagonal of its quad
        let direct = mesh.neighbors_by_hops(0, 1);
        assert!(!direct.is_empty());
        let wider = mesh.neighbors_by_hops(0, 2);
        assert!(wider.len() > direct.len());
        assert!(!wider.contains(&0));
    }

    #[test]
    fn test_neighbors_in_radius() {
        let mesh = builders::square_patch(3, 1.0, 2);
        let near = mesh.neighbors_in_radius(4, 1.05);
        // Center vertex of a 3x3 grid: itself + 4 axis neighbors + possibly
        // diagonal triangulation neighbors at sqrt(2) > 1.05
        assert!(near.contains(&4));
        assert_eq!(near.len(), 5);

        let all = mesh.neighbors_in_radius(4, 10.0);
        assert_eq!(all.len(), mesh.vertex_count());
    }

    #[test]
    fn test_face_geometry() {
        let mesh = builders::equilateral_triangle(1);
        let face = &mesh.faces[0];
        let expected_area = 3.0_f64.sqrt() / 4.0;
        assert!((face.area - expected_area).abs() < 1e-12);
        assert!((face.normal.norm() - 1.0).abs() < 1e-12);

        // All interior angles are 60 degrees
        for e in mesh.face_edges(0) {
            assert!((mesh.edges[e as usize].angle - 60.0_f64.to_radians()).abs() < 1e-10);
        }
    }

    #[test]
    fn test_vertex_normal_planar() {
        let mesh = builders::square_patch(3, 1.0, 1);
        let n = mesh.vertex_normal(4);
        assert!((n - Vector3D::new(0.0, 0.0, 1.0)).norm() < 1e-10);
    }
}
