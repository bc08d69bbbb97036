// Simulation orchestrator
//
// Owns the domain, the worker pool and the optional compute backend, and
// drives the step loop: kernel dispatch, buffer swap, periodic growth and
// the host/device consistency protocol. Host edits while a device is
// stepping are recorded as dirty attributes and pushed before the next
// dispatch; device results are pulled before any host-side read.

use crate::backend::{ComputeBackend, DirtyAttr, SyncState};
use crate::domain::{Domain, PaintTarget, RaycastHit};
use crate::geometry::{Point3D, Vector3D};
use crate::params::ParamOverrides;
use crate::state_io::{self, SavedState};
use crate::thread_pool::{compute_thread_work, CellWriter, ThreadPool, ThreadWork};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Paused,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Steps between growth ticks; zero disables growth entirely.
    pub growth_interval: u64,
    /// Growth argument handed to the domain; its meaning depends on the
    /// domain's growth mode.
    pub growth: Vector3D,
    /// Cells larger than this are subdivided after growth.
    pub max_cell_area: f64,
    pub subdivision_enabled: bool,
    /// Step on the attached device backend instead of the CPU pool.
    pub use_gpu: bool,
    /// Worker thread count; `None` selects the hardware concurrency.
    pub workers: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            growth_interval: 0,
            growth: Vector3D::new(0.001, 0.001, 0.0),
            max_cell_area: 1.0,
            subdivision_enabled: true,
            use_gpu: false,
            workers: None,
        }
    }
}

pub struct Simulation<D: Domain, B: ComputeBackend> {
    domain: D,
    backend: Option<B>,
    config: SimulationConfig,
    pool: ThreadPool,
    thread_work: Vec<ThreadWork>,
    step_count: u64,
    run_state: RunState,
    sync: SyncState,
}

impl<D: Domain, B: ComputeBackend> Simulation<D, B> {
    pub fn new(domain: D, config: SimulationConfig) -> Self {
        let pool = ThreadPool::new(config.workers.unwrap_or(0));
        let thread_work = compute_thread_work(domain.partition(), domain.vertex_count(), pool.size());
        log::info!(
            "simulation: {} vertices, {} morphogens, {} workers",
            domain.vertex_count(),
            domain.morphogen_count(),
            pool.size()
        );
        Self {
            domain,
            backend: None,
            config,
            pool,
            thread_work,
            step_count: 0,
            run_state: RunState::Paused,
            sync: SyncState::default(),
        }
    }

    /// Attach a device backend and upload the current state to it.
    pub fn attach_backend(&mut self, mut backend: B) -> crate::Result<()> {
        backend.create_buffers(&self.domain.kernel_tables())?;
        backend.push_to_device(self.domain.cells().read())?;
        self.backend = Some(backend);
        self.sync.gpu_active = self.config.use_gpu;
        Ok(())
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn set_run_state(&mut self, state: RunState) {
        self.run_state = state;
    }

    /// Step once if running.
    pub fn tick(&mut self) -> crate::Result<()> {
        if self.run_state == RunState::Running {
            self.step()?;
        }
        Ok(())
    }

    /// Execute one simulation step, then a growth tick when due.
    pub fn step(&mut self) -> crate::Result<()> {
        if self.sync.gpu_active && self.backend.is_some() {
            self.step_device()?;
        } else {
            self.step_cpu();
        }
        self.step_count += 1;

        if self.config.growth_interval > 0 && self.step_count % self.config.growth_interval == 0 {
            self.growth_tick()?;
        }
        Ok(())
    }

    fn step_cpu(&mut self) {
        let mut write = self.domain.cells_mut().take_write();
        {
            let writer = CellWriter::new(&mut write);
            let domain = &self.domain;
            let work = &self.thread_work;
            let read = domain.cells().read();

            self.pool.scope(|scope| {
                for items in work.iter().filter(|w| !w.is_empty()) {
                    let writer = &writer;
                    scope.execute(move || domain.step_region(items, read, writer));
                }
            });
        }
        self.domain.cells_mut().put_write(write);
        self.domain.swap();
    }

    fn step_device(&mut self) -> crate::Result<()> {
        let backend = self.backend.as_mut().expect("device step without backend");

        if self.sync.any_dirty() {
            // Host edits always target the authoritative read buffer; a
            // full push covers every dirty attribute at once.
            let dirty = self.sync.take_dirty();
            backend.push_to_device(self.domain.cells().read())?;
            if dirty.contains_key(&DirtyAttr::FixedFlags) {
                backend.push_fixed_flags(self.domain.cells().fixed_flags())?;
            }
            if dirty.contains_key(&DirtyAttr::Params) || dirty.contains_key(&DirtyAttr::Coefficients)
            {
                backend.create_buffers(&self.domain.kernel_tables())?;
                backend.push_to_device(self.domain.cells().read())?;
            }
        }

        backend.dispatch_step()?;
        self.sync.ram_stale = true;
        Ok(())
    }

    /// Pull device results into the host buffers if they are stale.
    pub fn sync_to_host(&mut self) -> crate::Result<()> {
        if !self.sync.ram_stale {
            return Ok(());
        }
        let backend = self.backend.as_ref().expect("stale host without backend");
        let mut buf = vec![0.0; self.domain.cells().read().len()];
        backend.pull_to_host(&mut buf)?;
        self.domain.cells_mut().load(&buf);
        self.sync.ram_stale = false;
        Ok(())
    }

    fn growth_tick(&mut self) -> crate::Result<()> {
        // Growth reads concentrations on the host; make them current first.
        self.sync_to_host()?;

        let changed = self.domain.grow_and_subdivide(
            self.config.growth,
            self.config.max_cell_area,
            self.config.subdivision_enabled,
            self.step_count,
        );

        if changed {
            self.rebuild_thread_work();
            if let Some(backend) = self.backend.as_mut() {
                backend.create_buffers(&self.domain.kernel_tables())?;
                backend.push_to_device(self.domain.cells().read())?;
            }
        } else if let Some(backend) = self.backend.as_mut() {
            if self.sync.gpu_active {
                // Positions moved: coefficients changed even without new
                // vertices.
                backend.create_buffers(&self.domain.kernel_tables())?;
                backend.push_to_device(self.domain.cells().read())?;
            }
        }
        Ok(())
    }

    fn rebuild_thread_work(&mut self) {
        self.thread_work = compute_thread_work(
            self.domain.partition(),
            self.domain.vertex_count(),
            self.pool.size(),
        );
    }

    /// Resolve pointer input against the domain.
    pub fn raycast(&self, origin: Point3D, direction: Vector3D) -> Option<RaycastHit> {
        self.domain.raycast(origin, direction)
    }

    /// Paint around the vertex hit by a ray. Host edits require current
    /// host-side concentrations first.
    pub fn paint(
        &mut self,
        origin: Point3D,
        direction: Vector3D,
        radius: f64,
        target: &PaintTarget,
    ) -> crate::Result<Option<RaycastHit>> {
        let hit = match self.domain.raycast(origin, direction) {
            Some(hit) => hit,
            None => return Ok(None),
        };
        self.sync_to_host()?;

        let position = origin + direction * hit.distance;
        self.domain.paint(hit.vertex, position, radius, target);

        let attr = match target {
            PaintTarget::Concentration { fix, .. } => {
                if *fix {
                    self.sync.mark_dirty(DirtyAttr::FixedFlags, [hit.vertex as u32]);
                }
                DirtyAttr::Concentrations
            }
            PaintTarget::Tangent { .. } | PaintTarget::Rates { .. } => DirtyAttr::Coefficients,
            PaintTarget::Selection { .. } => return Ok(Some(hit)),
        };
        self.sync.mark_dirty(attr, [hit.vertex as u32]);
        Ok(Some(hit))
    }

    /// Reassign reaction parameters for a set of vertices.
    pub fn update_params(&mut self, targets: &[u32], overrides: &ParamOverrides) -> bool {
        let created = self.domain.update_params(targets, overrides);
        self.rebuild_thread_work();
        self.sync
            .mark_dirty(DirtyAttr::Params, targets.iter().copied());
        created
    }

    pub fn save_state<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<()> {
        self.sync_to_host()?;
        let state = SavedState::capture(
            self.domain.cells().read(),
            self.domain.morphogen_count(),
            self.domain.tensor_rows(),
        );
        state_io::save_to_path(&path, &state)?;
        log::info!(
            "saved state: {} vertices, {} faces",
            state.vertex_count,
            state.face_count
        );
        Ok(())
    }

    pub fn load_state<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<()> {
        let state = state_io::load_from_path(&path)?;
        self.domain.apply_state(&state)?;
        self.rebuild_thread_work();

        if let Some(backend) = self.backend.as_mut() {
            backend.create_buffers(&self.domain.kernel_tables())?;
            backend.push_to_device(self.domain.cells().read())?;
        }
        self.sync.ram_stale = false;
        log::info!("loaded state: {} vertices", state.vertex_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuReferenceBackend;
    use crate::diffusion::CoefficientConfig;
    use crate::grid_domain::GridDomain;
    use crate::mesh_domain::MeshDomain;
    use crate::params::ReactionParams;
    use crate::{builders, domain::GrowthMode};

    fn seeded_grid(n: usize) -> GridDomain {
        let mut g = GridDomain::new(n, n, 1.0, 2, ReactionParams::default());
        for v in 0..g.vertex_count() {
            g.cells_mut().set_value(v, 0, 1.0);
        }
        let center = n * n / 2;
        g.cells_mut().set_value(center, 1, 0.7);
        g
    }

    fn config(workers: usize) -> SimulationConfig {
        SimulationConfig {
            workers: Some(workers),
            ..Default::default()
        }
    }

    #[test]
    fn test_cpu_step_is_worker_count_independent() {
        let mut single: Simulation<_, CpuReferenceBackend> =
            Simulation::new(seeded_grid(6), config(1));
        let mut quad: Simulation<_, CpuReferenceBackend> =
            Simulation::new(seeded_grid(6), config(4));

        for _ in 0..5 {
            single.step().unwrap();
            quad.step().unwrap();
        }
        assert_eq!(single.domain().cells().read(), quad.domain().cells().read());
    }

    #[test]
    fn test_device_path_matches_cpu_path() {
        let mut cpu: Simulation<_, CpuReferenceBackend> =
            Simulation::new(seeded_grid(5), config(2));

        let mut gpu_config = config(2);
        gpu_config.use_gpu = true;
        let mut gpu = Simulation::new(seeded_grid(5), gpu_config);
        gpu.attach_backend(CpuReferenceBackend::new()).unwrap();

        for _ in 0..4 {
            cpu.step().unwrap();
            gpu.step().unwrap();
        }
        gpu.sync_to_host().unwrap();

        let a = cpu.domain().cells().read();
        let b = gpu.domain().cells().read();
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_tick_respects_run_state() {
        let mut sim: Simulation<_, CpuReferenceBackend> =
            Simulation::new(seeded_grid(4), config(1));
        sim.tick().unwrap();
        assert_eq!(sim.step_count(), 0);

        sim.set_run_state(RunState::Running);
        sim.tick().unwrap();
        assert_eq!(sim.step_count(), 1);
    }

    #[test]
    fn test_growth_rebuilds_work_lists() {
        let domain = MeshDomain::new(
            builders::square_patch(2, 1.0, 2),
            ReactionParams::default(),
            CoefficientConfig::default(),
        );
        let mut sim: Simulation<_, CpuReferenceBackend> = Simulation::new(
            domain,
            SimulationConfig {
                growth_interval: 1,
                growth: Vector3D::new(0.5, 0.5, 0.0),
                max_cell_area: 0.6,
                subdivision_enabled: true,
                use_gpu: false,
                workers: Some(2),
            },
        );

        let before = sim.domain().vertex_count();
        for _ in 0..3 {
            sim.step().unwrap();
        }
        let after = sim.domain().vertex_count();
        assert!(after > before);

        // The work lists track the grown vertex range; another step must
        // cover every vertex (debug-checked inside compute_thread_work and
        // exercised here).
        sim.step().unwrap();
        assert_eq!(sim.domain().cells().vertex_count(), sim.domain().vertex_count());
    }

    #[test]
    fn test_paint_reaches_device_before_next_dispatch() {
        let mut gpu_config = config(1);
        gpu_config.use_gpu = true;
        let mut gpu = Simulation::new(seeded_grid(5), gpu_config);
        gpu.attach_backend(CpuReferenceBackend::new()).unwrap();

        let mut cpu: Simulation<_, CpuReferenceBackend> =
            Simulation::new(seeded_grid(5), config(1));

        let origin = Point3D::new(1.0, 1.0, 3.0);
        let down = Vector3D::new(0.0, 0.0, -1.0);
        let target = PaintTarget::Concentration {
            morphogen: 1,
            value: 0.9,
            fix: false,
        };
        gpu.paint(origin, down, 0.5, &target).unwrap().unwrap();
        cpu.paint(origin, down, 0.5, &target).unwrap().unwrap();

        gpu.step().unwrap();
        cpu.step().unwrap();
        gpu.sync_to_host().unwrap();

        let a = cpu.domain().cells().read();
        let b = gpu.domain().cells().read();
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_update_params_takes_effect() {
        let mut sim: Simulation<_, CpuReferenceBackend> =
            Simulation::new(seeded_grid(4), config(2));
        let created = sim.update_params(
            &[0, 1],
            &ParamOverrides {
                feed: Some(0.09),
                ..Default::default()
            },
        );
        assert!(created);
        assert_eq!(sim.domain().partition().params_for(0).feed, 0.09);
        sim.step().unwrap();
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join("morphsim_sim_state_test.txt");

        let mut sim: Simulation<_, CpuReferenceBackend> =
            Simulation::new(seeded_grid(4), config(1));
        for _ in 0..3 {
            sim.step().unwrap();
        }
        sim.save_state(&path).unwrap();
        let saved = sim.domain().cells().read().to_vec();

        let mut fresh: Simulation<_, CpuReferenceBackend> =
            Simulation::new(seeded_grid(4), config(1));
        fresh.load_state(&path).unwrap();
        assert_eq!(fresh.domain().cells().read(), saved.as_slice());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_animated_growth_follows_keyframes() {
        use crate::spline::{BsplinePatch, PatchPair};

        let mut domain = MeshDomain::new(
            builders::square_patch(3, 0.5, 1),
            ReactionParams::default(),
            CoefficientConfig::default(),
        );
        let start = BsplinePatch::planar(4, 4, 1.0, 1.0);
        let end = BsplinePatch::planar(4, 4, 3.0, 3.0);
        domain.set_growth_mode(GrowthMode::Animation(Box::new(PatchPair {
            start,
            end,
            duration_steps: 2,
        })));

        let mut sim: Simulation<_, CpuReferenceBackend> = Simulation::new(
            domain,
            SimulationConfig {
                growth_interval: 1,
                subdivision_enabled: false,
                workers: Some(1),
                ..Default::default()
            },
        );

        for _ in 0..2 {
            sim.step().unwrap();
        }
        // At the end of the animation the corner vertex with uv (1, 1)
        // sits at the end patch's far corner.
        let far = (0..sim.domain().vertex_count() as u32)
            .map(|v| sim.domain().mesh().position(v).x)
            .fold(f64::NEG_INFINITY, f64::max);
        assert!((far - 3.0).abs() < 1e-9);
    }
}
