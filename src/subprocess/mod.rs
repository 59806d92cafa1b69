//! Child processes for pipeline stages
//!
//! Every stage runs as its own process group so that abandoning a worker's
//! future also tears down whatever the launcher started underneath it.

pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;

#[cfg(test)]
mod tests;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::{MockCommandConfig, MockProcessRunner};
pub use runner::{
    ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner,
    DEFAULT_SPAWN_RETRY_DELAY,
};

use std::sync::Arc;
use std::time::Duration;

/// Hands out the shared process runner of a run or submission
#[derive(Clone)]
pub struct SubprocessManager {
    runner: Arc<dyn ProcessRunner>,
}

impl SubprocessManager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub fn production(spawn_retry_delay: Duration) -> Self {
        Self::new(Arc::new(TokioProcessRunner::new(spawn_retry_delay)))
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }
}
