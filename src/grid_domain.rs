// Regular-grid simulation domain
//
// Structured counterpart of the mesh domain: vertices on a fixed
// `width x height` lattice in the XY plane, 4-connected, with the 5-point
// stencil Laplacian. No subdivision and no per-face tensors; growth
// rescales the lattice spacing.

use crate::backend::KernelTables;
use crate::cells::CellStore;
use crate::diffusion::DiffusionTensor;
use crate::domain::{Domain, PaintTarget, RaycastHit};
use crate::geometry::{Point3D, Vector3D};
use crate::params::{ParamOverrides, ParamPartition, ReactionParams};
use crate::state_io::SavedState;
use crate::thread_pool::{CellWriter, WorkItem};

pub struct GridDomain {
    width: usize,
    height: usize,
    spacing: f64,
    morphogen_count: usize,
    cells: CellStore,
    partition: ParamPartition,
    selection: Vec<bool>,
    generation: u64,
}

impl GridDomain {
    pub fn new(width: usize, height: usize, spacing: f64, morphogen_count: usize, params: ReactionParams) -> Self {
        assert!(width >= 2 && height >= 2, "grid needs at least 2x2 vertices");
        let count = width * height;
        Self {
            width,
            height,
            spacing,
            morphogen_count,
            cells: CellStore::new(count, morphogen_count),
            partition: ParamPartition::new(params, count),
            selection: vec![false; count],
            generation: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    #[inline]
    fn coords(&self, vertex: usize) -> (usize, usize) {
        (vertex % self.width, vertex / self.width)
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn position(&self, vertex: usize) -> Point3D {
        let (x, y) = self.coords(vertex);
        Point3D::new(x as f64 * self.spacing, y as f64 * self.spacing, 0.0)
    }

    /// 4-connected neighbors of a vertex.
    fn adjacent(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        let (x, y) = self.coords(vertex);
        [
            (x > 0).then(|| self.index(x - 1, y)),
            (x + 1 < self.width).then(|| self.index(x + 1, y)),
            (y > 0).then(|| self.index(x, y - 1)),
            (y + 1 < self.height).then(|| self.index(x, y + 1)),
        ]
        .into_iter()
        .flatten()
    }
}

impl Domain for GridDomain {
    fn vertex_count(&self) -> usize {
        self.width * self.height
    }

    fn morphogen_count(&self) -> usize {
        self.morphogen_count
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn laplacian(&self, vertex: usize, morphogen: usize, read: &[f64]) -> f64 {
        let m = self.morphogen_count;
        let center = read[vertex * m + morphogen];
        let h2 = self.spacing * self.spacing;
        self.adjacent(vertex)
            .map(|j| read[j * m + morphogen] - center)
            .sum::<f64>()
            / h2
    }

    fn gradient(&self, vertex: usize, morphogen: usize, read: &[f64]) -> Vector3D {
        let m = self.morphogen_count;
        let (x, y) = self.coords(vertex);
        let value = |x: usize, y: usize| read[self.index(x, y) * m + morphogen];

        // Central differences, one-sided at the grid edges
        let (xl, xr) = (x.saturating_sub(1), (x + 1).min(self.width - 1));
        let (yl, yr) = (y.saturating_sub(1), (y + 1).min(self.height - 1));
        let dx = (value(xr, y) - value(xl, y)) / ((xr - xl) as f64 * self.spacing);
        let dy = (value(x, yr) - value(x, yl)) / ((yr - yl) as f64 * self.spacing);
        Vector3D::new(dx, dy, 0.0)
    }

    fn neighbors(&self, vertex: usize, order: usize) -> Vec<usize> {
        let mut visited = vec![false; self.vertex_count()];
        visited[vertex] = true;
        let mut frontier = vec![vertex];
        let mut out = Vec::new();

        for _ in 0..order {
            let mut next = Vec::new();
            for &u in &frontier {
                for w in self.adjacent(u) {
                    if !visited[w] {
                        visited[w] = true;
                        out.push(w);
                        next.push(w);
                    }
                }
            }
            frontier = next;
        }
        out
    }

    fn is_boundary(&self, vertex: usize) -> bool {
        let (x, y) = self.coords(vertex);
        x == 0 || y == 0 || x == self.width - 1 || y == self.height - 1
    }

    fn grow_and_subdivide(
        &mut self,
        growth: Vector3D,
        _max_cell_area: f64,
        _subdivision_enabled: bool,
        _step_count: u64,
    ) -> bool {
        // The lattice never refines; growth uniformly rescales the spacing.
        let scale = 1.0 + growth.x;
        if scale.is_finite() && scale > 0.0 {
            self.spacing *= scale;
        }
        false
    }

    fn paint(&mut self, _vertex: usize, position: Point3D, radius: f64, target: &PaintTarget) {
        let brushed: Vec<usize> = (0..self.vertex_count())
            .filter(|&v| (self.position(v) - position).norm() <= radius)
            .collect();

        match *target {
            PaintTarget::Concentration { morphogen, value, fix } => {
                for &v in &brushed {
                    self.cells.set_value(v, morphogen, value);
                    self.cells.set_fixed(v, morphogen, fix);
                }
            }
            PaintTarget::Selection { select } => {
                for &v in &brushed {
                    self.selection[v] = select;
                }
            }
            // No per-cell tensors on the lattice
            PaintTarget::Tangent { .. } | PaintTarget::Rates { .. } => {
                log::warn!("tensor painting ignored on a grid domain");
            }
        }
    }

    fn raycast(&self, origin: Point3D, direction: Vector3D) -> Option<RaycastHit> {
        // Intersect with the z = 0 lattice plane
        if direction.z.abs() < 1e-12 {
            return None;
        }
        let t = -origin.z / direction.z;
        if t <= 0.0 {
            return None;
        }
        let hit = origin + direction * t;
        let x = (hit.x / self.spacing).round();
        let y = (hit.y / self.spacing).round();
        if x < 0.0 || y < 0.0 || x >= self.width as f64 || y >= self.height as f64 {
            return None;
        }
        Some(RaycastHit {
            vertex: self.index(x as usize, y as usize),
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
        // The stencil is position-independent; nothing to precompute.
    }

    fn step_region(&self, items: &[WorkItem], read: &[f64], writer: &CellWriter) {
        let m = self.morphogen_count;
        let mut laps = vec![0.0; m];
        let mut out = vec![0.0; m];
        let fixed = self.cells.fixed_flags();

        for item in items {
            for &v in &item.indices {
                let base = v as usize * m;
                let concentrations = &read[base..base + m];
                for morphogen in 0..m {
                    laps[morphogen] = self.laplacian(v as usize, morphogen, read);
                }
                item.params.react(concentrations, &laps, &mut out);
                for morphogen in 0..m {
                    let value = if fixed[base + morphogen] {
                        concentrations[morphogen]
                    } else {
                        out[morphogen]
                    };
                    // Disjoint write sets per worker
                    unsafe { writer.write(base + morphogen, value) };
                }
            }
        }
    }

    fn kernel_tables(&self) -> KernelTables {
        let count = self.vertex_count();
        let h2 = self.spacing * self.spacing;

        let mut neighbor_start = Vec::with_capacity(count + 1);
        let mut neighbor_vertex = Vec::new();
        let mut flux = Vec::new();
        neighbor_start.push(0);
        for v in 0..count {
            for j in self.adjacent(v) {
                neighbor_vertex.push(j as u32);
                // flux / dual_area == 1 / spacing^2 recovers the stencil
                flux.extend(std::iter::repeat(1.0).take(self.morphogen_count));
            }
            neighbor_start.push(neighbor_vertex.len() as u32);
        }

        let params = (0..count as u32)
            .map(|v| *self.partition.params_for(v))
            .collect();

        KernelTables {
            vertex_count: count,
            morphogen_count: self.morphogen_count,
            neighbor_start,
            neighbor_vertex,
            flux,
            dual_area: vec![h2; count],
            params,
            fixed: self.cells.fixed_flags().to_vec(),
        }
    }

    fn tensor_rows(&self) -> Vec<Vec<DiffusionTensor>> {
        Vec::new()
    }

    fn apply_state(&mut self, state: &SavedState) -> crate::Result<()> {
        if state.morphogen_count != self.morphogen_count {
            return Err(crate::Error::Domain(format!(
                "state carries {} morphogens, domain has {}",
                state.morphogen_count, self.morphogen_count
            )));
        }
        if state.vertex_count != self.vertex_count() {
            return Err(crate::Error::Domain(format!(
                "state carries {} vertices, grid has {}",
                state.vertex_count,
                self.vertex_count()
            )));
        }
        self.cells.load(&state.concentrations);
        Ok(())
    }
}
