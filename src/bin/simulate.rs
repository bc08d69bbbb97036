// Headless simulation driver
//
// Builds a flat patch domain, seeds a spot of the second morphogen in the
// middle, runs the step loop and writes the final state to disk.
//
// Usage: simulate [steps] [output-path]

use morphsim::backend::CpuReferenceBackend;
use morphsim::diffusion::CoefficientConfig;
use morphsim::domain::{Domain, PaintTarget};
use morphsim::{
    builders, MeshDomain, Point3D, ReactionParams, Simulation, SimulationConfig, Vector3D,
};

fn main() -> morphsim::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let steps: u64 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2000);
    let output = args.next().unwrap_or_else(|| "state.txt".to_string());

    let mesh = builders::square_patch(32, 0.5, 2);
    let mut domain = MeshDomain::new(mesh, ReactionParams::default(), CoefficientConfig::default());

    // Uniform substrate with a pinned seed spot in the middle
    for v in 0..domain.vertex_count() {
        domain.cells_mut().set_value(v, 0, 1.0);
    }
    let seed_vertex = 16 * 32 + 16;
    let center = Point3D::new(8.0, 8.0, 0.0);
    domain.paint(
        seed_vertex,
        center,
        1.0,
        &PaintTarget::Concentration {
            morphogen: 1,
            value: 0.5,
            fix: false,
        },
    );

    let config = SimulationConfig {
        growth_interval: 200,
        growth: Vector3D::new(0.002, 0.002, 0.0),
        max_cell_area: 0.25,
        subdivision_enabled: true,
        use_gpu: false,
        workers: None,
    };
    let mut sim: Simulation<MeshDomain, CpuReferenceBackend> = Simulation::new(domain, config);

    log::info!("running {} steps", steps);
    for i in 0..steps {
        sim.step()?;
        if (i + 1) % 500 == 0 {
            log::info!(
                "step {}: {} vertices",
                i + 1,
                sim.domain().vertex_count()
            );
        }
    }

    sim.save_state(&output)?;
    log::info!("state written to {}", output);
    Ok(())
}
