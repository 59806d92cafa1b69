//! External pipeline stages
//!
//! - `kind` - the closed set of stages and their launch descriptions
//! - `executor` - one generic launcher call per stage invocation
//! - `chain` - the per-simulation chain and the final reduction

pub mod chain;
pub mod executor;
pub mod kind;

pub use chain::{
    measurements_filename, ReductionOutputs, StageChain, FINAL_MEASUREMENTS, FINAL_RESIDUALS,
    SIMULATION_CONFIG_PORT, TRAINING_DATA_PORTS,
};
pub use executor::StageExecutor;
pub use kind::{StageInvocation, StageKind, StageSpec};
