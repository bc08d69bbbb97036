// Uniform simulation-domain contract
//
// The orchestrator is generic over this trait and never downcasts; the
// unstructured mesh and the regular grid both implement it.

use crate::cells::CellStore;
use crate::diffusion::DiffusionTensor;
use crate::geometry::{Point3D, Vector3D};
use crate::params::{ParamOverrides, ParamPartition};
use crate::spline::PatchPair;
use crate::state_io::SavedState;
use crate::thread_pool::{CellWriter, WorkItem};

/// How the domain deforms during a growth tick.
#[derive(Debug, Clone)]
pub enum GrowthMode {
    /// Interpolate vertex positions between two keyframed B-spline patch
    /// shapes using precomputed per-vertex UV coordinates.
    Animation(Box<PatchPair>),

    /// Uniformly scale all positions so the total area increases by a
    /// fixed increment.
    Linear(f64),

    /// Scale positions componentwise by `1 + growth`.
    Percentage,

    /// Displace each vertex along its normal by
    /// `growth.x * c0 - growth.y * c1`, skipping non-finite results.
    Morphogen,
}

/// What interactive painting mutates.
#[derive(Debug, Clone, Copy)]
pub enum PaintTarget {
    /// Deposit concentration of one morphogen, optionally pinning it
    /// (Dirichlet).
    Concentration {
        morphogen: usize,
        value: f64,
        fix: bool,
    },
    /// Reorient the low-rate diffusion axis of faces under the brush.
    Tangent { morphogen: usize, direction: Vector3D },
    /// Rewrite the two principal diffusion rates of faces under the brush.
    Rates {
        morphogen: usize,
        rate_low: f64,
        rate_high: f64,
    },
    /// Toggle the selection flag of vertices under the brush.
    Selection { select: bool },
}

/// Result of a point query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Nearest vertex of the hit cell.
    pub vertex: usize,
    /// Ray parameter of the hit.
    pub distance: f64,
}

/// Contract between the simulation layer and a concrete domain.
pub trait Domain: Send + Sync {
    fn vertex_count(&self) -> usize;

    fn morphogen_count(&self) -> usize;

    /// Monotonic counter bumped by every topology change; the orchestrator
    /// compares generations to decide when derived buffers must be rebuilt.
    fn generation(&self) -> u64;

    /// Discrete Laplacian of one morphogen at one vertex, evaluated
    /// against the supplied read buffer.
    fn laplacian(&self, vertex: usize, morphogen: usize, read: &[f64]) -> f64;

    /// Concentration gradient of one morphogen at one vertex. Non-finite
    /// face contributions are filtered.
    fn gradient(&self, vertex: usize, morphogen: usize, read: &[f64]) -> Vector3D;

    /// Vertices within `order` hops.
    fn neighbors(&self, vertex: usize, order: usize) -> Vec<usize>;

    fn is_boundary(&self, vertex: usize) -> bool;

    /// Apply one growth tick and, when enabled, subdivide cells exceeding
    /// `max_cell_area`. Returns whether the topology changed (requiring
    /// the caller to rebuild work lists and device buffers).
    fn grow_and_subdivide(
        &mut self,
        growth: Vector3D,
        max_cell_area: f64,
        subdivision_enabled: bool,
        step_count: u64,
    ) -> bool;

    /// Interactive painting around `vertex`, bounded by the Euclidean
    /// `radius`. Always targets the CPU-resident buffer.
    fn paint(&mut self, vertex: usize, position: Point3D, radius: f64, target: &PaintTarget);

    /// Resolve pointer input to a domain location.
    fn raycast(&self, origin: Point3D, direction: Vector3D) -> Option<RaycastHit>;

    fn cells(&self) -> &CellStore;

    fn cells_mut(&mut self) -> &mut CellStore;

    fn partition(&self) -> &ParamPartition;

    /// Reassign the parameter set governing `targets`; returns whether a
    /// new distinct set was created.
    fn update_params(&mut self, targets: &[u32], overrides: &ParamOverrides) -> bool;

    /// Full recompute of topology-derived quantities (dual areas, flux
    /// coefficients).
    fn rebuild_coefficients(&mut self);

    /// Execute one worker's share of a CPU step: for every index in
    /// `items`, evaluate the update kernel against `read` and store the
    /// result through `writer`.
    ///
    /// The index sets of concurrently executing workers are disjoint by
    /// construction of the work partition.
    fn step_region(&self, items: &[WorkItem], read: &[f64], writer: &CellWriter);

    /// Flattened copies of the per-vertex kernel inputs for an external
    /// compute backend.
    fn kernel_tables(&self) -> crate::backend::KernelTables;

    /// Per-cell diffusion tensors for state persistence; empty for domains
    /// without per-face tensors.
    fn tensor_rows(&self) -> Vec<Vec<DiffusionTensor>>;

    /// Apply a loaded state: resize derived buffers to the header counts,
    /// populate them and trigger a full recompute. Must not partially
    /// apply on failure.
    fn apply_state(&mut self, state: &SavedState) -> crate::Result<()>;

    /// Flip the read/write roles of the cell buffers.
    fn swap(&mut self) {
        self.cells_mut().swap();
    }
}
