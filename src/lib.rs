// Core modules for reaction-diffusion simulation on adaptive triangle meshes

pub mod backend;
pub mod builders;
pub mod cells;
pub mod diffusion;
pub mod domain;
pub mod geometry;
pub mod grid_domain;
pub mod mesh_domain;
pub mod params;
pub mod simulation;
pub mod spline;
pub mod state_io;
pub mod subdivision;
pub mod thread_pool;
pub mod topology;

// Re-export commonly used types
pub use backend::{ComputeBackend, CpuReferenceBackend, DirtyAttr, KernelTables, SyncState};
pub use cells::CellStore;
pub use diffusion::{CoefficientConfig, DiffusionTensor, DualAreaMode};
pub use domain::{Domain, GrowthMode, PaintTarget, RaycastHit};
pub use geometry::{Point3D, Vector3D};
pub use grid_domain::GridDomain;
pub use mesh_domain::MeshDomain;
pub use params::{ParamOverrides, ParamPartition, ReactionParams};
pub use simulation::{RunState, Simulation, SimulationConfig};
pub use state_io::{SavedState, StateIoError};
pub use topology::{FaceId, HalfEdgeId, HalfEdgeMesh, VertexId, INVALID};

/// Main result type for the simulation core
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the simulation core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("State I/O error: {0}")]
    State(#[from] StateIoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Domain error: {0}")]
    Domain(String),
}
