// Seed mesh constructors
//
// Small canonical meshes used to start simulations and to exercise the
// topology and diffusion code. All faces are wound counter-clockwise when
// viewed from the outward normal; open meshes get their boundary loop
// synthesized before being returned.

use crate::geometry::Point3D;
use crate::topology::{HalfEdgeMesh, VertexId};

fn add_triangle(mesh: &mut HalfEdgeMesh, a: VertexId, b: VertexId, c: VertexId) {
    let e0 = mesh.create_edge(a, b);
    let e1 = mesh.create_edge(b, c);
    let e2 = mesh.create_edge(c, a);
    mesh.create_face(e0, e1, e2);
}

/// Single equilateral triangle with unit side length in the XY plane.
pub fn equilateral_triangle(morphogen_count: usize) -> HalfEdgeMesh {
    let mut mesh = HalfEdgeMesh::new(morphogen_count);
    let v0 = mesh.create_vertex(Point3D::new(0.0, 0.0, 0.0));
    let v1 = mesh.create_vertex(Point3D::new(1.0, 0.0, 0.0));
    let v2 = mesh.create_vertex(Point3D::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0));
    add_triangle(&mut mesh, v0, v1, v2);
    mesh.close_boundary();
    mesh
}

/// Flat `n x n` vertex grid in the XY plane, row-major vertex indexing
/// (`row * n + col`), each quad triangulated along its lower-left to
/// upper-right diagonal.
pub fn square_patch(n: usize, spacing: f64, morphogen_count: usize) -> HalfEdgeMesh {
    assert!(n >= 2, "square patch needs at least a 2x2 grid");
    let mut mesh = HalfEdgeMesh::new(morphogen_count);

    for r in 0..n {
        for c in 0..n {
            mesh.create_vertex(Point3D::new(c as f64 * spacing, r as f64 * spacing, 0.0));
        }
    }

    for r in 0..n - 1 {
        for c in 0..n - 1 {
            let v00 = (r * n + c) as VertexId;
            let v01 = v00 + 1;
            let v10 = v00 + n as VertexId;
            let v11 = v10 + 1;
            add_triangle(&mut mesh, v00, v01, v11);
            add_triangle(&mut mesh, v00, v11, v10);
        }
    }

    mesh.close_boundary();
    mesh
}

/// Closed unit octahedron centered at the origin.
pub fn octahedron(morphogen_count: usize) -> HalfEdgeMesh {
    let mut mesh = HalfEdgeMesh::new(morphogen_count);
    let px = mesh.create_vertex(Point3D::new(1.0, 0.0, 0.0));
    let nx = mesh.create_vertex(Point3D::new(-1.0, 0.0, 0.0));
    let py = mesh.create_vertex(Point3D::new(0.0, 1.0, 0.0));
    let ny = mesh.create_vertex(Point3D::new(0.0, -1.0, 0.0));
    let pz = mesh.create_vertex(Point3D::new(0.0, 0.0, 1.0));
    let nz = mesh.create_vertex(Point3D::new(0.0, 0.0, -1.0));

    for &(a, b, c) in &[
        (px, py, pz),
        (py, nx, pz),
        (nx, ny, pz),
        (ny, px, pz),
        (py, px, nz),
        (nx, py, nz),
        (ny, nx, nz),
        (px, ny, nz),
    ] {
        add_triangle(&mut mesh, a, b, c);
    }

    // Closed surface; close_boundary finds nothing to synthesize
    mesh.close_boundary();
    mesh
}
