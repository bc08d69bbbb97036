// External compute backend contract and CPU reference implementation
//
// A backend steps the reaction-diffusion kernel against flattened copies of
// the per-vertex inputs (CSR neighbor tables, flux coefficients, dual
// areas, parameters). The orchestrator owns the consistency protocol: it
// tracks which side holds the authoritative concentrations and which host
// edits a device must receive before its next dispatch.

use crate::cells::CellStore;
use crate::params::{ParamPartition, ReactionParams};
use crate::topology::HalfEdgeMesh;
use std::collections::{BTreeMap, BTreeSet};

/// Flattened per-vertex kernel inputs, laid out for upload to a device.
///
/// Neighbor adjacency is CSR: the outgoing edges of vertex `v` occupy
/// entries `neighbor_start[v] .. neighbor_start[v + 1]`, and entry `i`
/// carries `morphogen_count` flux coefficients at `flux[i * morphogen_count ..]`.
#[derive(Debug, Clone, Default)]
pub struct KernelTables {
    pub vertex_count: usize,
    pub morphogen_count: usize,
    pub neighbor_start: Vec<u32>,
    pub neighbor_vertex: Vec<u32>,
    pub flux: Vec<f64>,
    pub dual_area: Vec<f64>,
    /// Parameter set governing each vertex.
    pub params: Vec<ReactionParams>,
    /// Dirichlet flags, vertex-major and morphogen-minor.
    pub fixed: Vec<bool>,
}

impl KernelTables {
    /// Flatten a compiled mesh and its parameter partition.
    pub fn from_mesh(mesh: &HalfEdgeMesh, partition: &ParamPartition, cells: &CellStore) -> Self {
        let vertex_count = mesh.vertex_count();
        let morphogens = mesh.morphogen_count();

        let mut neighbor_start = Vec::with_capacity(vertex_count + 1);
        let mut neighbor_vertex = Vec::new();
        let mut flux = Vec::new();
        let mut dual_area = Vec::with_capacity(vertex_count);

        neighbor_start.push(0);
        for v in 0..vertex_count as u32 {
            for e in mesh.outgoing_edges(v) {
                let edge = &mesh.edges[e as usize];
                neighbor_vertex.push(edge.dest);
                flux.extend_from_slice(&edge.flux);
            }
            neighbor_start.push(neighbor_vertex.len() as u32);
            dual_area.push(mesh.vertices[v as usize].dual_area);
        }

        let params = (0..vertex_count as u32)
            .map(|v| *partition.params_for(v))
            .collect();

        Self {
            vertex_count,
            morphogen_count: morphogens,
            neighbor_start,
            neighbor_vertex,
            flux,
            dual_area,
            params,
            fixed: cells.fixed_flags().to_vec(),
        }
    }
}

/// Host-editable attribute classes tracked by the consistency protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyAttr {
    /// Concentration values edited on the host (painting, state loads).
    Concentrations,
    /// Dirichlet flags.
    FixedFlags,
    /// Reaction parameter assignment.
    Params,
    /// Flux coefficients or dual areas (tensor edits, prepattern toggles).
    Coefficients,
}

/// Which side holds the authoritative concentrations, and which host edits
/// the device has not seen yet. Only the orchestrator mutates this.
#[derive(Debug, Default)]
pub struct SyncState {
    /// A device backend is driving the stepping.
    pub gpu_active: bool,
    /// The device has stepped past the host copy; read-backs must pull
    /// before exposing concentrations.
    pub ram_stale: bool,
    /// Host edits the device has not received, per attribute, with the
    /// touched vertex indices.
    dirty: BTreeMap<DirtyAttr, BTreeSet<u32>>,
}

impl SyncState {
    pub fn mark_dirty(&mut self, attr: DirtyAttr, vertices: impl IntoIterator<Item = u32>) {
        self.dirty.entry(attr).or_default().extend(vertices);
    }

    pub fn is_dirty(&self, attr: DirtyAttr) -> bool {
        self.dirty.get(&attr).is_some_and(|s| !s.is_empty())
    }

    pub fn any_dirty(&self) -> bool {
        self.dirty.values().any(|s| !s.is_empty())
    }

    /// Drain the pending edits once they have been pushed to the device.
    pub fn take_dirty(&mut self) -> BTreeMap<DirtyAttr, BTreeSet<u32>> {
        std::mem::take(&mut self.dirty)
    }
}

/// A device capable of stepping the kernel against uploaded tables.
///
/// The orchestrator guarantees the call order: `create_buffers` after every
/// topology change, `push_to_device` before the first dispatch after any
/// host edit, `pull_to_host` before any host-side read of stepped results.
pub trait ComputeBackend: Send {
    /// (Re)allocate device buffers for the given tables. Invalidates any
    /// previously uploaded concentrations.
    fn create_buffers(&mut self, tables: &KernelTables) -> crate::Result<()>;

    /// Upload host concentrations into the device's read buffer.
    fn push_to_device(&mut self, read: &[f64]) -> crate::Result<()>;

    /// Upload refreshed fixed flags without touching concentrations.
    fn push_fixed_flags(&mut self, fixed: &[bool]) -> crate::Result<()>;

    /// Execute one kernel step and flip the device's buffer roles.
    fn dispatch_step(&mut self) -> crate::Result<()>;

    /// Download the device's current read buffer.
    fn pull_to_host(&self, out: &mut [f64]) -> crate::Result<()>;
}

/// Backend that runs the exact host formulas on flattened tables. Serves as
/// the conformance reference for device implementations and as the fallback
/// when no device is available.
#[derive(Default)]
pub struct CpuReferenceBackend {
    tables: KernelTables,
    buffers: [Vec<f64>; 2],
    current: usize,
}

impl CpuReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComputeBackend for CpuReferenceBackend {
    fn create_buffers(&mut self, tables: &KernelTables) -> crate::Result<()> {
        let len = tables.vertex_count * tables.morphogen_count;
        self.tables = tables.clone();
        self.buffers = [vec![0.0; len], vec![0.0; len]];
        self.current = 0;
        Ok(())
    }

    fn push_to_device(&mut self, read: &[f64]) -> crate::Result<()> {
        if read.len() != self.buffers[self.current].len() {
            return Err(crate::Error::Domain(format!(
                "backend buffer length {} does not match host buffer {}",
                self.buffers[self.current].len(),
                read.len()
            )));
        }
        self.buffers[self.current].copy_from_slice(read);
        Ok(())
    }

    fn push_fixed_flags(&mut self, fixed: &[bool]) -> crate::Result<()> {
        if fixed.len() != self.tables.fixed.len() {
            return Err(crate::Error::Domain(
                "fixed flag length mismatch".to_string(),
            ));
        }
        self.tables.fixed.copy_from_slice(fixed);
        Ok(())
    }

    fn dispatch_step(&mut self) -> crate::Result<()> {
        let mut write = std::mem::take(&mut self.buffers[1 - self.current]);
        let t = &self.tables;
        let m = t.morphogen_count;
        let read = &self.buffers[self.current];

        let mut laps = vec![0.0; m];
        let mut out = vec![0.0; m];
        for v in 0..t.vertex_count {
            let base = v * m;
            let concentrations = &read[base..base + m];

            for morphogen in 0..m {
                let mut sum = 0.0;
                for i in t.neighbor_start[v] as usize..t.neighbor_start[v + 1] as usize {
                    let j = t.neighbor_vertex[i] as usize;
                    sum += t.flux[i * m + morphogen]
                        * (read[j * m + morphogen] - concentrations[morphogen]);
                }
                laps[morphogen] = sum / t.dual_area[v];
            }

            t.params[v].react(concentrations, &laps, &mut out);
            for morphogen in 0..m {
                write[base + morphogen] = if t.fixed[base + morphogen] {
                    concentrations[morphogen]
                } else {
                    out[morphogen]
                };
            }
        }

        self.buffers[1 - self.current] = write;
        self.current = 1 - self.current;
        Ok(())
    }

    fn pull_to_host(&self, out: &mut [f64]) -> crate::Result<()> {
        if out.len() != self.buffers[self.current].len() {
            return Err(crate::Error::Domain(
                "pull buffer length mismatch".to_string(),
            ));
        }
        out.copy_from_slice(&self.buffers[self.current]);
        Ok(())
    }
}
