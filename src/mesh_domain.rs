// Unstructured-mesh simulation domain
//
// Couples the half-edge mesh with the cell store, the parameter partition
// and the coefficient compiler behind the Domain contract. Growth moves
// vertex positions, subdivision keeps cell sizes bounded, and every
// topology change triggers a full coefficient recompilation.

use crate::backend::KernelTables;
use crate::cells::CellStore;
use crate::diffusion::{self, CoefficientConfig, DiffusionTensor};
use crate::domain::{Domain, GrowthMode, PaintTarget, RaycastHit};
use crate::geometry::{self, Point3D, Ray, Vector3D};
use crate::params::{ParamOverrides, ParamPartition, ReactionParams};
use crate::state_io::SavedState;
use crate::subdivision;
use crate::thread_pool::{CellWriter, WorkItem};
use crate::topology::{FaceId, HalfEdgeMesh, VertexId};
use rayon::prelude::*;

pub struct MeshDomain {
    mesh: HalfEdgeMesh,
    cells: CellStore,
    partition: ParamPartition,
    coeff_config: CoefficientConfig,
    growth_mode: GrowthMode,
    /// Patch coordinates per vertex, used by animated growth and kept
    /// interpolated across subdivisions.
    uv: Vec<(f64, f64)>,
    selection: Vec<bool>,
}

impl MeshDomain {
    pub fn new(mut mesh: HalfEdgeMesh, params: ReactionParams, coeff_config: CoefficientConfig) -> Self {
        let cells = CellStore::new(mesh.vertex_count(), mesh.morphogen_count());
        let partition = ParamPartition::new(params, mesh.vertex_count());
        diffusion::compile_coefficients(&mut mesh, &coeff_config, &cells);

        let uv = initial_uv(&mesh);
        let selection = vec![false; mesh.vertex_count()];
        Self {
            mesh,
            cells,
            partition,
            coeff_config,
            growth_mode: GrowthMode::Percentage,
            uv,
            selection,
        }
    }

    pub fn mesh(&self) -> &HalfEdgeMesh {
        &self.mesh
    }

    pub fn set_growth_mode(&mut self, mode: GrowthMode) {
        self.growth_mode = mode;
    }

    pub fn coeff_config(&self) -> &CoefficientConfig {
        &self.coeff_config
    }

    pub fn set_coeff_config(&mut self, config: CoefficientConfig) {
        self.coeff_config = config;
        self.rebuild_coefficients();
    }

    /// Scale the outgoing diffusive flux of every open-boundary vertex for
    /// one morphogen. 1.0 is an ordinary edge; 0.0 seals the boundary for
    /// that morphogen.
    pub fn set_boundary_weight(&mut self, morphogen: usize, weight: f64) {
        for v in &mut self.mesh.vertices {
            if v.boundary {
                v.boundary_weights[morphogen] = weight;
            }
        }
        self.rebuild_coefficients();
    }

    pub fn selection(&self) -> &[bool] {
        &self.selection
    }

    /// Indices of the currently selected vertices.
    pub fn selected_vertices(&self) -> Vec<u32> {
        self.selection
            .iter()
            .enumerate()
            .filter(|(_, &s)| s)
            .map(|(v, _)| v as u32)
            .collect()
    }

    fn apply_growth(&mut self, growth: Vector3D, step_count: u64) {
        match &self.growth_mode {
            GrowthMode::Animation(pair) => {
                let pair = pair.clone();
                for v in 0..self.mesh.vertex_count() {
                    let (u, w) = self.uv[v];
                    self.mesh.vertices[v].position = pair.evaluate(u, w, step_count);
                }
            }
            GrowthMode::Linear(increment) => {
                let area = self.mesh.total_area();
                if area <= 0.0 {
                    return;
                }
                let factor = ((area + increment) / area).sqrt();
                for v in &mut self.mesh.vertices {
                    v.position = Point3D::from(v.position.coords * factor);
                }
            }
            GrowthMode::Percentage => {
                let scale = Vector3D::new(1.0 + growth.x, 1.0 + growth.y, 1.0 + growth.z);
                for v in &mut self.mesh.vertices {
                    v.position = Point3D::new(
                        v.position.x * scale.x,
                        v.position.y * scale.y,
                        v.position.z * scale.z,
                    );
                }
            }
            GrowthMode::Morphogen => {
                let normals: Vec<Vector3D> = (0..self.mesh.vertex_count() as VertexId)
                    .map(|v| self.mesh.vertex_normal(v))
                    .collect();
                for v in 0..self.mesh.vertex_count() {
                    let c0 = self.cells.value(v, 0);
                    let c1 = if self.mesh.morphogen_count() > 1 {
                        self.cells.value(v, 1)
                    } else {
                        0.0
                    };
                    let displacement = growth.x * c0 - growth.y * c1;
                    if !displacement.is_finite() {
                        log::warn!("skipping non-finite displacement at vertex {}", v);
                        continue;
                    }
                    self.mesh.vertices[v].position += normals[v] * displacement;
                }
            }
        }
    }

    /// Bring the per-vertex side tables in line with the mesh after
    /// subdivision created new vertices. Each new vertex inherits the
    /// average state of its two parent endpoints.
    fn sync_new_vertices(&mut self, old_count: usize) {
        let new_count = self.mesh.vertex_count();
        self.cells.resize(new_count);
        self.selection.resize(new_count, false);
        let morphogens = self.mesh.morphogen_count();

        for v in old_count..new_count {
            let lineage = self.mesh.vertices[v].lineage;
            let parent = lineage.map(|(a, _)| a);
            self.partition.add_vertex(v as u32, parent);

            match lineage {
                Some((a, b)) => {
                    for m in 0..morphogens {
                        let avg = (self.cells.value(a as usize, m)
                            + self.cells.value(b as usize, m))
                            / 2.0;
                        self.cells.set_value(v, m, avg);
                    }
                    let (ua, va) = self.uv[a as usize];
                    let (ub, vb) = self.uv[b as usize];
                    self.uv.push(((ua + ub) / 2.0, (va + vb) / 2.0));
                }
                None => self.uv.push((0.0, 0.0)),
            }
        }

        self.partition.debug_assert_cover(new_count);
    }
}

/// Patch coordinates from the normalized XY bounding box of the seed mesh.
fn initial_uv(mesh: &HalfEdgeMesh) -> Vec<(f64, f64)> {
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in &mesh.vertices {
        min_x = min_x.min(v.position.x);
        max_x = max_x.max(v.position.x);
        min_y = min_y.min(v.position.y);
        max_y = max_y.max(v.position.y);
    }
    let span_x = (max_x - min_x).max(1e-12);
    let span_y = (max_y - min_y).max(1e-12);
    mesh.vertices
        .iter()
        .map(|v| {
            (
                (v.position.x - min_x) / span_x,
                (v.position.y - min_y) / span_y,
            )
        })
        .collect()
}

/// Gradient of a linear field over one face.
fn face_gradient(
    mesh: &HalfEdgeMesh,
    f: FaceId,
    morphogen: usize,
    read: &[f64],
) -> Vector3D {
    let [v0, v1, v2] = mesh.face_vertices(f);
    let (p0, p1, p2) = (mesh.position(v0), mesh.position(v1), mesh.position(v2));
    let face = &mesh.faces[f as usize];
    let area2 = 2.0 * face.area;
    if area2 < 1e-12 {
        return Vector3D::zeros();
    }

    let m = mesh.morphogen_count();
    let u0 = read[v0 as usize * m + morphogen];
    let u1 = read[v1 as usize * m + morphogen];
    let u2 = read[v2 as usize * m + morphogen];

    let n = face.normal;
    (n.cross(&(p2 - p1)) * u0 + n.cross(&(p0 - p2)) * u1 + n.cross(&(p1 - p0)) * u2) / area2
}

impl Domain for MeshDomain {
    fn vertex_count(&self) -> usize {
        self.mesh.vertex_count()
    }

    fn morphogen_count(&self) -> usize {
        self.mesh.morphogen_count()
    }

    fn generation(&self) -> u64 {
        self.mesh.generation()
    }

    fn laplacian(&self, vertex: usize, morphogen: usize, read: &[f64]) -> f64 {
        diffusion::laplacian(&self.mesh, vertex as u32, morphogen, read)
    }

    fn gradient(&self, vertex: usize, morphogen: usize, read: &[f64]) -> Vector3D {
        let mut sum = Vector3D::zeros();
        let mut weight = 0.0;
        for f in self.mesh.incident_faces(vertex as VertexId) {
            let g = face_gradient(&self.mesh, f, morphogen, read);
            if !g.iter().all(|c| c.is_finite()) {
                continue;
            }
            let area = self.mesh.faces[f as usize].area;
            sum += g * area;
            weight += area;
        }
        if weight > 0.0 {
            sum / weight
        } else {
            Vector3D::zeros()
        }
    }

    fn neighbors(&self, vertex: usize, order: usize) -> Vec<usize> {
        self.mesh
            .neighbors_by_hops(vertex as VertexId, order)
            .into_iter()
            .map(|v| v as usize)
            .collect()
    }

    fn is_boundary(&self, vertex: usize) -> bool {
        self.mesh.vertices[vertex].boundary
    }

    fn grow_and_subdivide(
        &mut self,
        growth: Vector3D,
        max_cell_area: f64,
        subdivision_enabled: bool,
        step_count: u64,
    ) -> bool {
        let old_count = self.mesh.vertex_count();
        self.apply_growth(growth, step_count);
        self.mesh.refresh_all_faces();

        if subdivision_enabled {
            let splits = subdivision::refine_oversized(&mut self.mesh, max_cell_area);
            if splits > 0 {
                log::info!(
                    "subdivision: {} splits, {} vertices",
                    splits,
                    self.mesh.vertex_count()
                );
            }
        }

        let changed = self.mesh.vertex_count() != old_count;
        if changed {
            self.sync_new_vertices(old_count);
        }
        self.rebuild_coefficients();
        changed
    }

    fn paint(&mut self, vertex: usize, position: Point3D, radius: f64, target: &PaintTarget) {
        let brushed: Vec<VertexId> = self
            .mesh
            .neighbors_in_radius(vertex as VertexId, 2.0 * radius)
            .into_iter()
            .filter(|&v| (self.mesh.position(v) - position).norm() <= radius)
            .collect();

        match *target {
            PaintTarget::Concentration { morphogen, value, fix } => {
                for &v in &brushed {
                    self.cells.set_value(v as usize, morphogen, value);
                    self.cells.set_fixed(v as usize, morphogen, fix);
                }
            }
            PaintTarget::Tangent { morphogen, direction } => {
                let faces = brushed_faces(&self.mesh, &brushed);
                for f in faces {
                    self.mesh.faces[f as usize].tensors[morphogen].direction = direction;
                }
                self.rebuild_coefficients();
            }
            PaintTarget::Rates { morphogen, rate_low, rate_high } => {
                let faces = brushed_faces(&self.mesh, &brushed);
                for f in faces {
                    let tensor = &mut self.mesh.faces[f as usize].tensors[morphogen];
                    tensor.rate_low = rate_low;
                    tensor.rate_high = rate_high;
                }
                self.rebuild_coefficients();
            }
            PaintTarget::Selection { select } => {
                for &v in &brushed {
                    self.selection[v as usize] = select;
                }
            }
        }
    }

    fn raycast(&self, origin: Point3D, direction: Vector3D) -> Option<RaycastHit> {
        let ray = Ray { origin, direction };
        let hit = (0..self.mesh.faces.len())
            .into_par_iter()
            .filter(|&f| self.mesh.faces[f].alive)
            .filter_map(|f| {
                let [v0, v1, v2] = self.mesh.face_vertices(f as FaceId);
                geometry::ray_triangle_intersect(
                    &ray,
                    &self.mesh.position(v0),
                    &self.mesh.position(v1),
                    &self.mesh.position(v2),
                )
                .map(|t| (f as FaceId, t))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))?;

        let (face, t) = hit;
        let point = origin + direction * t;
        let vertex = self
            .mesh
            .face_vertices(face)
            .into_iter()
            .min_by(|&a, &b| {
                (self.mesh.position(a) - point)
                    .norm()
                    .total_cmp(&(self.mesh.position(b) - point).norm())
            })?;
        Some(RaycastHit {
            vertex: vertex as usize,
            distance: t,
        })
    }

    fn cells(&self) -> &CellStore {
        &self.cells
    }

    fn cells_mut(&mut self) -> &mut CellStore {
        &mut self.cells
    }

    fn partition(&self) -> &ParamPartition {
        &self.partition
    }

    fn update_params(&mut self, targets: &[u32], overrides: &ParamOverrides) -> bool {
        self.partition.update_params(targets, overrides)
    }

    fn rebuild_coefficients(&mut self) {
        diffusion::compile_coefficients(&mut self.mesh, &self.coeff_config, &self.cells);
    }

    fn step_region(&self, items: &[WorkItem], read: &[f64], writer: &CellWriter) {
        let morphogens = self.mesh.morphogen_count();
        let mut laps = vec![0.0; morphogens];
        let mut out = vec![0.0; morphogens];
        let fixed = self.cells.fixed_flags();

        for item in items {
            for &v in &item.indices {
                let base = v as usize * morphogens;
                let concentrations = &read[base..base + morphogens];
                for m in 0..morphogens {
                    laps[m] = diffusion::laplacian(&self.mesh, v, m, read);
                }
                item.params.react(concentrations, &laps, &mut out);
                for m in 0..morphogens {
                    let value = if fixed[base + m] {
                        concentrations[m]
                    } else {
                        out[m]
                    };
                    // Disjoint write sets per worker
                    unsafe { writer.write(base + m, value) };
                }
            }
        }
    }

    fn kernel_tables(&self) -> KernelTables {
        KernelTables::from_mesh(&self.mesh, &self.partition, &self.cells)
    }

    fn tensor_rows(&self) -> Vec<Vec<DiffusionTensor>> {
        self.mesh
            .faces
            .iter()
            .filter(|f| f.alive)
            .map(|f| f.tensors.clone())
            .collect()
    }

    fn apply_state(&mut self, state: &SavedState) -> crate::Result<()> {
        if state.morphogen_count != self.mesh.morphogen_count() {
            return Err(crate::Error::Domain(format!(
                "state carries {} morphogens, domain has {}",
                state.morphogen_count,
                self.mesh.morphogen_count()
            )));
        }
        if state.vertex_count != self.mesh.vertex_count() {
            return Err(crate::Error::Domain(format!(
                "state carries {} vertices, mesh has {}",
                state.vertex_count,
                self.mesh.vertex_count()
            )));
        }
        let live_faces: Vec<FaceId> = (0..self.mesh.faces.len() as FaceId)
            .filter(|&f| self.mesh.faces[f as usize].alive)
            .collect();
        if state.face_count != live_faces.len() {
            return Err(crate::Error::Domain(format!(
                "state carries {} faces, mesh has {}",
                state.face_count,
                live_faces.len()
            )));
        }

        // All checks passed; apply atomically.
        self.cells.load(&state.concentrations);
        for (row, &f) in state.tensors.iter().zip(&live_faces) {
            self.mesh.faces[f as usize].tensors = row.clone();
        }
        self.rebuild_coefficients();
        Ok(())
    }
}

fn brushed_faces(mesh: &HalfEdgeMesh, brushed: &[VertexId]) -> Vec<FaceId> {
    let mut out = Vec::new();
    for &v in brushed {
        for f in mesh.incident_faces(v) {
            if !out.contains(&f) {
                out.push(f);
            }
        }
    }
    out
}
