// Anisotropic diffusion-coefficient compiler
//
// Derives, per face and per morphogen, a local anisotropic tensor (two
// orthogonal principal rates plus an orientation vector) and precomputes
// the discrete flux coefficient on every half-edge and the dual-cell area
// at every vertex. The discrete Laplacian at vertex i is then
//
//     (sum over edges i -> j of flux(e) * (value(j) - value(i))) / dual_area(i)
//
// With an isotropic unit tensor the flux coefficient reduces exactly to the
// cotangent weight (cot alpha + cot beta) / 2.

use crate::cells::CellStore;
use crate::geometry::{self, Vector3D};
use crate::topology::{FaceId, HalfEdgeId, HalfEdgeMesh, INVALID};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-face, per-morphogen anisotropic diffusivity: two principal rates and
/// the orientation of the low-rate axis. The high-rate axis is the in-plane
/// perpendicular.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffusionTensor {
    pub rate_low: f64,
    pub rate_high: f64,
    /// Low-rate axis; need not be unit length or exactly in-plane, it is
    /// projected onto the face plane at compile time.
    pub direction: Vector3D,
}

impl Default for DiffusionTensor {
    fn default() -> Self {
        Self {
            rate_low: 1.0,
            rate_high: 1.0,
            direction: Vector3D::new(1.0, 0.0, 0.0),
        }
    }
}

/// How the dual-cell area at each vertex is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DualAreaMode {
    /// One third of each incident face's area. Fast, the default.
    ThirdArea,

    /// Signed quadrilateral bounded by the vertex, the two adjacent edge
    /// midpoints and the face center (circumcenter when interior, else
    /// barycenter). More precise for irregular triangulations.
    Circumcentric,
}

/// Interactive prepattern override: substitute one principal diffusion rate
/// with a power-law remap of another morphogen's local average
/// concentration. Evaluated per face at compile time, never baked into the
/// stored tensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Prepattern {
    /// Morphogen whose tensor is overridden.
    pub target_morphogen: usize,
    /// Morphogen whose concentration drives the override.
    pub source_morphogen: usize,
    /// Replace the high rate when true, the low rate otherwise.
    pub replace_high: bool,
    pub scale: f64,
    pub exponent: f64,
}

impl Prepattern {
    fn remap(&self, average: f64) -> f64 {
        self.scale * average.max(0.0).powf(self.exponent)
    }
}

/// Configuration for coefficient compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoefficientConfig {
    pub dual_area_mode: DualAreaMode,
    pub prepatterns: Vec<Prepattern>,
}

impl Default for DualAreaMode {
    fn default() -> Self {
        DualAreaMode::ThirdArea
    }
}

/// Effective per-face rates after prepattern substitution.
#[derive(Clone, Copy)]
struct EffectiveTensor {
    rate_low: f64,
    rate_high: f64,
    direction: Vector3D,
}

/// Full recompilation pass: dual areas, then per-half-edge flux
/// coefficients for every morphogen. Always a full pass, never incremental.
/// Triggered on topology change, tensor edits or prepattern toggles.
pub fn compile_coefficients(mesh: &mut HalfEdgeMesh, config: &CoefficientConfig, cells: &CellStore) {
    compute_dual_areas(mesh, config.dual_area_mode);

    let morphogens = mesh.morphogen_count();
    let effective = effective_tensors(mesh, config, cells);

    // Read-only flux evaluation over all half-edges, then write back.
    let flux: Vec<Vec<f64>> = (0..mesh.edges.len())
        .into_par_iter()
        .map(|e| edge_flux(mesh, e as HalfEdgeId, &effective, morphogens))
        .collect();

    for (e, coeffs) in flux.into_iter().enumerate() {
        mesh.edges[e].flux = coeffs;
    }

    log::debug!(
        "compiled flux coefficients: {} half-edges, {} morphogens",
        mesh.edges.len(),
        morphogens
    );
}

fn effective_tensors(
    mesh: &HalfEdgeMesh,
    config: &CoefficientConfig,
    cells: &CellStore,
) -> Vec<Vec<EffectiveTensor>> {
    let morphogens = mesh.morphogen_count();
    (0..mesh.faces.len())
        .map(|f| {
            let face = &mesh.faces[f];
            let mut row: Vec<EffectiveTensor> = face
                .tensors
                .iter()
                .map(|t| EffectiveTensor {
                    rate_low: t.rate_low,
                    rate_high: t.rate_high,
                    direction: t.direction,
                })
                .collect();

            if !face.alive {
                return row;
            }

            for pre in &config.prepatterns {
                if pre.target_morphogen >= morphogens || pre.source_morphogen >= morphogens {
                    continue;
                }
                let verts = mesh.face_vertices(f as FaceId);
                let avg = verts
                    .iter()
                    .map(|&v| cells.value(v as usize, pre.source_morphogen))
                    .sum::<f64>()
                    / 3.0;
                let rate = pre.remap(avg);
                if !rate.is_finite() {
                    continue;
                }
                let t = &mut row[pre.target_morphogen];
                if pre.replace_high {
                    t.rate_high = rate;
                } else {
                    t.rate_low = rate;
                }
            }
            row
        })
        .collect()
}

/// Flux coefficients for one directed half-edge: per morphogen, the sum of
/// the contributions of the one or two faces sharing the undirected edge.
fn edge_flux(
    mesh: &HalfEdgeMesh,
    e: HalfEdgeId,
    effective: &[Vec<EffectiveTensor>],
    morphogens: usize,
) -> Vec<f64> {
    let mut out = vec![0.0; morphogens];
    let edge = &mesh.edges[e as usize];
    if !edge.alive || edge.boundary {
        return out;
    }

    let origin = edge.origin;
    let dir = mesh.position(edge.dest) - mesh.position(origin);
    let len = dir.norm();
    debug_assert!(len > 0.0, "zero-length edge {}", e);
    let unit = dir / len;

    for &h in &[e, edge.pair] {
        if h == INVALID {
            continue;
        }
        let f = mesh.edges[h as usize].face;
        if f == INVALID {
            continue;
        }
        // Interior angle opposite the edge: stored at the origin of the
        // half-edge two steps ahead within the face.
        let opposite = mesh.edges[mesh.edges[h as usize].next as usize].next;
        let cot = 1.0 / mesh.edges[opposite as usize].angle.tan();
        if !cot.is_finite() {
            continue;
        }

        let normal = mesh.faces[f as usize].normal;
        for m in 0..morphogens {
            let tensor = &effective[f as usize][m];
            let diffusivity = directional_diffusivity(tensor, &normal, &unit);
            out[m] += diffusivity * cot / 2.0;
        }
    }

    // Boundary vertices damp outgoing flux by their per-morphogen weight.
    let vert = &mesh.vertices[origin as usize];
    if vert.boundary {
        for m in 0..morphogens {
            out[m] *= vert.boundary_weights[m];
        }
    }

    out
}

/// Directional diffusivity along `edge_dir`, from the tensor expressed in
/// the 90-degree-rotated basis aligned with the face normal and the
/// diffusion orientation.
fn directional_diffusivity(tensor: &EffectiveTensor, normal: &Vector3D, edge_dir: &Vector3D) -> f64 {
    // Project the low-rate axis into the face plane
    let mut low_axis = tensor.direction - normal * normal.dot(&tensor.direction);
    let norm = low_axis.norm();
    if norm < 1e-12 || !norm.is_finite() {
        // Orientation degenerate w.r.t. this face: treat as isotropic with
        // the mean rate.
        return (tensor.rate_low + tensor.rate_high) / 2.0;
    }
    low_axis /= norm;
    let high_axis = normal.cross(&low_axis);

    let cl = edge_dir.dot(&low_axis);
    let ch = edge_dir.dot(&high_axis);
    // The out-of-plane component of edge_dir carries no diffusivity; for
    // edges in the face plane cl^2 + ch^2 == 1.
    let denom = cl * cl + ch * ch;
    if denom < 1e-12 {
        return (tensor.rate_low + tensor.rate_high) / 2.0;
    }
    (tensor.rate_low * cl * cl + tensor.rate_high * ch * ch) / denom
}

/// Dual-cell areas at every vertex.
pub fn compute_dual_areas(mesh: &mut HalfEdgeMesh, mode: DualAreaMode) {
    let mut areas = vec![0.0; mesh.vertices.len()];

    for f in 0..mesh.faces.len() {
        if !mesh.faces[f].alive {
            continue;
        }
        match mode {
            DualAreaMode::ThirdArea => {
                let share = mesh.faces[f].area / 3.0;
                for v in mesh.face_vertices(f as FaceId) {
                    areas[v as usize] += share;
                }
            }
            DualAreaMode::Circumcentric => {
                let center = mesh.faces[f].center;
                let normal = mesh.faces[f].normal;
                for h in mesh.face_edges(f as FaceId) {
                    let edge = &mesh.edges[h as usize];
                    let v = edge.origin;
                    let p = mesh.position(v);
                    let next_dest = mesh.edges[edge.next as usize].dest;
                    let m1 = geometry::midpoint(&p, &mesh.position(edge.dest));
                    let m2 = geometry::midpoint(&mesh.position(next_dest), &p);
                    // Signed quadrilateral (v, m1, center, m2) as two
                    // signed triangles; a center outside the triangle
                    // contributes negative slivers that cancel.
                    areas[v as usize] += geometry::signed_triangle_area(&p, &m1, &center, &normal)
                        + geometry::signed_triangle_area(&p, &center, &m2, &normal);
                }
            }
        }
    }

    for (v, vert) in mesh.vertices.iter_mut().enumerate() {
        if vert.alive {
            debug_assert!(areas[v] > 0.0 || vert.half_edge == INVALID, "zero dual area at vertex {}", v);
            vert.dual_area = areas[v];
        }
    }
}

/// Discrete Laplacian of morphogen `m` at vertex `v`, evaluated against the
/// supplied read buffer.
pub fn laplacian(mesh: &HalfEdgeMesh, v: u32, m: usize, read: &[f64]) -> f64 {
    let morphogens = mesh.morphogen_count();
    let center = read[v as usize * morphogens + m];
    let mut sum = 0.0;
    for e in mesh.outgoing_edges(v) {
        let edge = &mesh.edges[e as usize];
        let neighbor = read[edge.dest as usize * morphogens + m];
        sum += edge.flux[m] * (neighbor - center);
    }
    sum / mesh.vertices[v as usize].dual_area
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders;
    use crate::cells::CellStore;

    fn compiled(mut mesh: HalfEdgeMesh, mode: DualAreaMode) -> (HalfEdgeMesh, CellStore) {
        let cells = CellStore::new(mesh.vertex_count(), mesh.morphogen_count());
        let config = CoefficientConfig {
            dual_area_mode: mode,
            prepatterns: Vec::new(),
        };
        compile_coefficients(&mut mesh, &config, &cells);
        (mesh, cells)
    }

    #[test]
    fn test_isotropic_flux_reduces_to_cotangent_weights() {
        let (mesh, _) = compiled(builders::square_patch(3, 1.0, 1), DualAreaMode::ThirdArea);

        for (i, edge) in mesh.edges.iter().enumerate() {
            if edge.boundary || !edge.alive {
                continue;
            }
            if mesh.vertices[edge.origin as usize].boundary {
                continue;
            }
            // Expected cotangent weight from raw positions
            let mut expected = 0.0;
            for &h in &[i as u32, edge.pair] {
                let he = &mesh.edges[h as usize];
                if he.face == INVALID {
                    continue;
                }
                let opposite = mesh.edges[mesh.edges[h as usize].next as usize].next;
                let apex = mesh.edges[opposite as usize].origin;
                expected += geometry::cotangent(
                    &mesh.position(he.origin),
                    &mesh.position(he.dest),
                    &mesh.position(apex),
                ) / 2.0;
            }
            assert!(
                (edge.flux[0] - expected).abs() < 1e-10,
                "edge {}: flux {} vs cotangent {}",
                i,
                edge.flux[0],
                expected
            );
        }
    }

    #[test]
    fn test_uniform_field_has_zero_laplacian() {
        // Single equilateral triangle, isotropic unit tensor on both
        // morphogens, uniform concentration 1
        let (mesh, mut cells) = compiled(builders::equilateral_triangle(2), DualAreaMode::ThirdArea);
        for v in 0..3 {
            for m in 0..2 {
                cells.set_value(v, m, 1.0);
            }
        }

        for v in 0..3u32 {
            for m in 0..2 {
                let lap = laplacian(&mesh, v, m, cells.read());
                assert!(lap.abs() < 1e-12, "vertex {} morphogen {}: {}", v, m, lap);
            }
        }
    }

    #[test]
    fn test_laplacian_is_conservative_on_closed_mesh() {
        let (mesh, mut cells) = compiled(builders::octahedron(1), DualAreaMode::ThirdArea);
        // Arbitrary non-uniform field
        for v in 0..mesh.vertex_count() {
            cells.set_value(v, 0, (v as f64 * 0.37).sin() + 1.5);
        }

        let total: f64 = (0..mesh.vertex_count() as u32)
            .map(|v| {
                mesh.vertices[v as usize].dual_area * laplacian(&mesh, v, 0, cells.read())
            })
            .sum();
        assert!(total.abs() < 1e-10, "flux does not cancel: {}", total);
    }

    #[test]
    fn test_third_area_dual_areas() {
        let (mesh, _) = compiled(builders::equilateral_triangle(1), DualAreaMode::ThirdArea);
        let face_area = 3.0_f64.sqrt() / 4.0;
        for v in &mesh.vertices {
            assert!((v.dual_area - face_area / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_circumcentric_dual_areas_cover_mesh() {
        let (mesh, _) = compiled(builders::square_patch(4, 1.0, 1), DualAreaMode::Circumcentric);
        let total: f64 = mesh.vertices.iter().map(|v| v.dual_area).sum();
        assert!((total - mesh.total_area()).abs() < 1e-9);
    }

    #[test]
    fn test_anisotropic_tensor_scales_flux() {
        let mut mesh = builders::square_patch(3, 1.0, 1);
        // Fast diffusion along y, slow along x, on every face
        for f in &mut mesh.faces {
            f.tensors[0] = DiffusionTensor {
                rate_low: 0.1,
                rate_high: 10.0,
                direction: Vector3D::new(1.0, 0.0, 0.0),
            };
        }
        let cells = CellStore::new(mesh.vertex_count(), 1);
        compile_coefficients(&mut mesh, &CoefficientConfig::default(), &cells);

        // An x-aligned interior edge sees mostly the low rate, a y-aligned
        // one mostly the high rate.
        let ex = mesh.get_edge(3, 4).unwrap();
        let ey = mesh.get_edge(1, 4).unwrap();
        assert!(mesh.edges[ey as usize].flux[0].abs() > mesh.edges[ex as usize].flux[0].abs());
    }

    #[test]
    fn test_prepattern_overrides_rate() {
        let mut mesh = builders::equilateral_triangle(2);
        let mut cells = CellStore::new(3, 2);
        for v in 0..3 {
            cells.set_value(v, 1, 4.0);
        }
        let config = CoefficientConfig {
            dual_area_mode: DualAreaMode::ThirdArea,
            prepatterns: vec![Prepattern {
                target_morphogen: 0,
                source_morphogen: 1,
                replace_high: false,
                scale: 2.0,
                exponent: 0.5,
            }],
        };
        compile_coefficients(&mut mesh, &config, &cells);

        // remap(4.0) = 2 * sqrt(4) = 4 substitutes the low rate. The edge
        // (0, 1) runs along the default low axis (+x), so its flux on the
        // overridden morphogen quadruples relative to the untouched one.
        let e = mesh.get_edge(0, 1).unwrap();
        let base = mesh.edges[e as usize].flux[1];
        let boosted = mesh.edges[e as usize].flux[0];
        assert!(base.abs() > 0.0);
        assert!((boosted - 4.0 * base).abs() < 1e-10);
    }
}
