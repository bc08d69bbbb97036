// Reaction parameter sets and the vertex partition that assigns them
//
// Every vertex is governed by exactly one parameter set; the partition maps
// parameter sets to disjoint sorted index sets whose union covers the full
// vertex range. Empty entries are pruned.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Named reaction constants governing a group of vertices.
///
/// The kinetics are Gray-Scott style on the first two morphogens:
///   a' = Da * lap(a) - a*b^2 + feed * (1 - a)
///   b' = Db * lap(b) + a*b^2 - (feed + kill) * b
/// Additional morphogens diffuse with `Db` and decay linearly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactionParams {
    pub feed: f64,
    pub kill: f64,
    /// Uniform diffusion multiplier for morphogen 0; the anisotropic shape
    /// of diffusion comes from the per-face tensors.
    pub diffusion_a: f64,
    /// Uniform diffusion multiplier for morphogen 1 and above.
    pub diffusion_b: f64,
    /// Linear decay applied to morphogens beyond the first two.
    pub decay: f64,
    pub time_step: f64,
}

impl Default for ReactionParams {
    fn default() -> Self {
        Self {
            feed: 0.055,
            kill: 0.062,
            diffusion_a: 1.0,
            diffusion_b: 0.5,
            decay: 0.01,
            time_step: 1.0,
        }
    }
}

impl ReactionParams {
    /// Exact value identity, suitable for hashing and partition matching.
    fn key(&self) -> [OrderedFloat<f64>; 6] {
        [
            OrderedFloat(self.feed),
            OrderedFloat(self.kill),
            OrderedFloat(self.diffusion_a),
            OrderedFloat(self.diffusion_b),
            OrderedFloat(self.decay),
            OrderedFloat(self.time_step),
        ]
    }

    pub fn same_values(&self, other: &ReactionParams) -> bool {
        self.key() == other.key()
    }

    /// One explicit-Euler update of a single vertex. `concentrations` and
    /// `laplacians` hold one entry per morphogen; results land in `out`.
    pub fn react(&self, concentrations: &[f64], laplacians: &[f64], out: &mut [f64]) {
        let dt = self.time_step;
        match concentrations.len() {
            0 => {}
            1 => {
                let a = concentrations[0];
                out[0] = a + dt * (self.diffusion_a * laplacians[0] - self.decay * a);
            }
            _ => {
                let a = concentrations[0];
                let b = concentrations[1];
                let reaction = a * b * b;
                out[0] = a + dt * (self.diffusion_a * laplacians[0] - reaction + self.feed * (1.0 - a));
                out[1] =
                    b + dt * (self.diffusion_b * laplacians[1] + reaction - (self.feed + self.kill) * b);
                for m in 2..concentrations.len() {
                    let c = concentrations[m];
                    out[m] = c + dt * (self.diffusion_b * laplacians[m] - self.decay * c);
                }
            }
        }
    }
}

/// Per-field overrides merged onto an existing parameter set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ParamOverrides {
    pub feed: Option<f64>,
    pub kill: Option<f64>,
    pub diffusion_a: Option<f64>,
    pub diffusion_b: Option<f64>,
    pub decay: Option<f64>,
    pub time_step: Option<f64>,
}

impl ParamOverrides {
    pub fn apply(&self, base: &ReactionParams) -> ReactionParams {
        ReactionParams {
            feed: self.feed.unwrap_or(base.feed),
            kill: self.kill.unwrap_or(base.kill),
            diffusion_a: self.diffusion_a.unwrap_or(base.diffusion_a),
            diffusion_b: self.diffusion_b.unwrap_or(base.diffusion_b),
            decay: self.decay.unwrap_or(base.decay),
            time_step: self.time_step.unwrap_or(base.time_step),
        }
    }
}

/// A parameter set together with the sorted vertex indices it governs.
#[derive(Debug, Clone)]
pub struct ParamRegion {
    pub params: ReactionParams,
    pub indices: Vec<u32>,
}

/// Partition of the full vertex index range into parameter regions.
#[derive(Debug, Clone)]
pub struct ParamPartition {
    pub regions: Vec<ParamRegion>,
}

impl ParamPartition {
    /// All vertices start under one parameter set.
    pub fn new(params: ReactionParams, vertex_count: usize) -> Self {
        Self {
            regions: vec![ParamRegion {
                params,
                indices: (0..vertex_count as u32).collect(),
            }],
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.regions.iter().map(|r| r.indices.len()).sum()
    }

    fn region_of(&self, vertex: u32) -> Option<usize> {
        self.regions
            .iter()
            .position(|r| r.indices.binary_search(&vertex).is_ok())
    }

    /// Parameter set currently governing `vertex`.
    pub fn params_for(&self, vertex: u32) -> &ReactionParams {
        let r = self
            .region_of(vertex)
            .unwrap_or_else(|| panic!("vertex {} not covered by the partition", vertex));
        &self.regions[r].params
    }

    /// Reassign the parameter set of `targets`: each index is removed from
    /// its region, its parameters merged with `overrides`, and the result
    /// inserted into a matching region (by exact value equality) or a newly
    /// created one. Empty regions are pruned.
    ///
    /// Returns whether a new distinct parameter set was created.
    pub fn update_params(&mut self, targets: &[u32], overrides: &ParamOverrides) -> bool {
        let mut created_new = false;

        for &t in targets {
            let from = match self.region_of(t) {
                Some(r) => r,
                None => panic!("vertex {} not covered by the partition", t),
            };
            let merged = overrides.apply(&self.regions[from].params);

            if self.regions[from].params.same_values(&merged) {
                continue; // Already governed by the merged set
            }

            if let Ok(pos) = self.regions[from].indices.binary_search(&t) {
                self.regions[from].indices.remove(pos);
            }

            match self
                .regions
                .iter()
                .position(|r| r.params.same_values(&merged))
            {
                Some(to) => {
                    if let Err(pos) = self.regions[to].indices.binary_search(&t) {
                        self.regions[to].indices.insert(pos, t);
                    }
                }
                None => {
                    self.regions.push(ParamRegion {
                        params: merged,
                        indices: vec![t],
                    });
                    created_new = true;
                }
            }
        }

        self.regions.retain(|r| !r.indices.is_empty());
        created_new
    }

    /// Register vertices created by subdivision; each inherits the region
    /// of its parent vertex.
    pub fn add_vertex(&mut self, vertex: u32, parent: Option<u32>) {
        let region = parent
            .and_then(|p| self.region_of(p))
            .unwrap_or(0);
        let indices = &mut self.regions[region].indices;
        if let Err(pos) = indices.binary_search(&vertex) {
            indices.insert(pos, vertex);
        }
    }

    /// Debug check: the union of all regions covers [0, vertex_count)
    /// exactly once.
    pub fn debug_assert_cover(&self, vertex_count: usize) {
        if cfg!(debug_assertions) {
            let mut seen = vec![false; vertex_count];
            for r in &self.regions {
                for &i in &r.indices {
                    assert!(!seen[i as usize], "vertex {} covered twice", i);
                    seen[i as usize] = true;
                }
            }
            assert!(
                seen.iter().all(|&s| s),
                "partition does not cover the full vertex range"
            );
        }
    }
}
