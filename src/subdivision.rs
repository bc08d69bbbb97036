// Adaptive longest-edge (Rivara) bisection
//
// A face is always split across its longest edge. When the neighbor across
// that edge would be split along a non-longest edge, the neighbor is
// subdivided first; the propagation strictly shrinks the set of
// non-conforming edges, so it terminates. The recursion is kept as an
// explicit stack with a defensive depth bound.

use crate::topology::{FaceId, HalfEdgeMesh, INVALID};

/// Upper bound on conformity propagation depth. Exceeding it means the mesh
/// is corrupt (the propagation provably terminates on a valid mesh).
pub const MAX_CONFORMITY_DEPTH: usize = 512;

/// Subdivide `face` by longest-edge bisection, recursively subdividing
/// neighbors as needed to keep the mesh conforming.
///
/// Returns the number of face splits performed.
pub fn subdivide_face(mesh: &mut HalfEdgeMesh, face: FaceId) -> usize {
    let mut stack = vec![face];
    let mut splits = 0;

    while let Some(&f) = stack.last() {
        assert!(
            stack.len() <= MAX_CONFORMITY_DEPTH,
            "longest-edge conformity propagation exceeded depth {}",
            MAX_CONFORMITY_DEPTH
        );

        let e = mesh.longest_edge(f);
        let pair = mesh.edges[e as usize].pair;
        let neighbor = if pair != INVALID && !mesh.edges[pair as usize].boundary {
            mesh.edges[pair as usize].face
        } else {
            INVALID
        };

        if neighbor != INVALID && mesh.longest_edge(neighbor) != pair {
            // Neighbor would be split along a non-longest edge; make it
            // conforming first.
            stack.push(neighbor);
            continue;
        }

        // Paired bisection across the longest edge: both incident faces
        // split onto the shared midpoint; a boundary edge splits one face
        // and rewires the boundary loop.
        mesh.split_edge(e);
        splits += if neighbor != INVALID { 2 } else { 1 };

        stack.pop();
    }

    splits
}

/// Split every face whose area exceeds `max_area`, repeating until no face
/// does. Each candidate's area is re-checked immediately before splitting,
/// since an earlier propagation may already have shrunk it.
pub fn refine_oversized(mesh: &mut HalfEdgeMesh, max_area: f64) -> usize {
    let mut total = 0;
    loop {
        let before = total;
        let mut i = 0;
        // The face arena grows during the scan; new faces are re-checked too.
        while i < mesh.faces.len() {
            let f = i as FaceId;
            i += 1;
            if mesh.faces[f as usize].alive && mesh.faces[f as usize].area > max_area {
                total += subdivide_face(mesh, f);
            }
        }
        if total == before {
            break;
        }
    }
    if total > 0 {
        log::debug!(
            "refined mesh: {} splits, {} vertices, {} faces",
            total,
            mesh.vertex_count(),
            mesh.face_count()
        );
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders;
    use crate::geometry::Point3D;
    use crate::topology::HalfEdgeMesh;

    #[test]
    fn test_split_conserves_area() {
        let mut mesh = builders::equilateral_triangle(1);
        let before = mesh.faces[0].area;

        subdivide_face(&mut mesh, 0);
        mesh.validate();

        let after: f64 = mesh.total_area();
        assert!((after - before).abs() < 1e-12);
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_interior_split_conserves_area() {
        let mut mesh = builders::square_patch(3, 1.0, 1);
        let before = mesh.total_area();

        subdivide_face(&mut mesh, 0);
        mesh.validate();

        assert!((mesh.total_area() - before).abs() < 1e-12);
    }

    #[test]
    fn test_children_inherit_tensors() {
        let mut mesh = builders::equilateral_triangle(1);
        mesh.faces[0].tensors[0].rate_low = 0.25;
        mesh.faces[0].tensors[0].rate_high = 4.0;

        subdivide_face(&mut mesh, 0);

        for f in &mesh.faces {
            assert_eq!(f.tensors[0].rate_low, 0.25);
            assert_eq!(f.tensors[0].rate_high, 4.0);
        }
    }

    #[test]
    fn test_new_vertex_records_lineage() {
        let mut mesh = builders::equilateral_triangle(1);
        let longest = mesh.longest_edge(0);
        let a = mesh.edges[longest as usize].origin;
        let b = mesh.edges[longest as usize].dest;

        subdivide_face(&mut mesh, 0);

        let m = &mesh.vertices[3];
        assert_eq!(m.lineage, Some((a, b)));
        assert!(m.boundary);
    }

    #[test]
    fn test_nonconforming_neighbor_triggers_one_recursive_split() {
        // Two triangles sharing an edge that is the longest edge of the
        // first but not of the second: splitting the first must first
        // subdivide the neighbor once.
        let mut mesh = HalfEdgeMesh::new(1);
        let a = mesh.create_vertex(Point3D::new(0.0, 0.0, 0.0));
        let b = mesh.create_vertex(Point3D::new(2.0, 0.0, 0.0));
        let c = mesh.create_vertex(Point3D::new(1.0, 1.2, 0.0));
        // d placed so that in triangle (b, a, d) the shared edge (b, a) of
        // length 2 is shorter than edge (a, d)
        let d = mesh.create_vertex(Point3D::new(2.2, -2.4, 0.0));

        let e_ab = mesh.create_edge(a, b);
        let e_bc = mesh.create_edge(b, c);
        let e_ca = mesh.create_edge(c, a);
        let f0 = mesh.create_face(e_ab, e_bc, e_ca);

        let e_ba = mesh.create_edge(b, a);
        let e_ad = mesh.create_edge(a, d);
        let e_db = mesh.create_edge(d, b);
        let f1 = mesh.create_face(e_ba, e_ad, e_db);
        mesh.close_boundary();
        mesh.validate();

        // Sanity: (a, b) is f0's longest edge but not f1's
        assert_eq!(mesh.longest_edge(f0), e_ab);
        assert_ne!(mesh.longest_edge(f1), e_ba);

        let faces_before = mesh.face_count();
        let splits = subdivide_face(&mut mesh, f0);
        mesh.validate();

        // One recursive neighbor split (f1 across its own longest edge,
        // paired with the boundary) plus the paired split across (a, b).
        assert_eq!(splits, 3);
        assert_eq!(mesh.face_count(), faces_before + 3);
    }

    #[test]
    fn test_refine_oversized_reaches_threshold() {
        let mut mesh = builders::square_patch(2, 4.0, 1);
        let max_area = 1.0;
        refine_oversized(&mut mesh, max_area);
        mesh.validate();

        for f in mesh.faces.iter().filter(|f| f.alive) {
            assert!(f.area <= max_area + 1e-12);
        }
    }
}
