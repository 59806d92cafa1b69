use std::path::PathBuf;
use thiserror::Error;

use crate::subprocess::ProcessError;

/// Exit code used for malformed or missing configuration
pub const EXIT_CONFIG: i32 = 2;
/// Exit code used when an input or data file cannot be located
pub const EXIT_DEPENDENCY: i32 = 3;
/// Exit code used when a directory cannot be created
pub const EXIT_WORKSPACE: i32 = 4;
/// Exit code used when a worker or stage fails under fail-fast supervision
pub const EXIT_WORKER: i32 = 5;
/// Exit code for everything else
pub const EXIT_GENERAL: i32 = 1;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{file} cannot be found in path {search_path}")]
    Dependency { file: String, search_path: String },

    #[error("{name} not found in search path {search_path}")]
    NotFound { name: String, search_path: String },

    #[error("Workspace error: cannot create {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {slot} failed on simulation {simulation_index}: {reason}")]
    WorkerFailure {
        slot: usize,
        simulation_index: usize,
        reason: String,
    },

    #[error("Forked workers failed in batch {batch_number}: {failed} of {total} exited with errors")]
    BatchFailed {
        batch_number: usize,
        failed: usize,
        total: usize,
    },

    #[error("Stage {executable} failed: {reason}")]
    StageFailed { executable: String, reason: String },

    #[error("Cannot read data product {path}: {reason}")]
    Product { path: PathBuf, reason: String },

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// Create a dependency error for a file missing from a search path
    pub fn dependency(file: impl Into<String>, search_path: impl Into<String>) -> Self {
        PipelineError::Dependency {
            file: file.into(),
            search_path: search_path.into(),
        }
    }

    /// Create a workspace error for a directory that could not be created
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Workspace {
            path: path.into(),
            source,
        }
    }

    /// Process exit code reported when this error terminates the run
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) | PipelineError::Toml(_) => EXIT_CONFIG,
            PipelineError::Dependency { .. } | PipelineError::NotFound { .. } => EXIT_DEPENDENCY,
            PipelineError::Workspace { .. } => EXIT_WORKSPACE,
            PipelineError::WorkerFailure { .. }
            | PipelineError::BatchFailed { .. }
            | PipelineError::StageFailed { .. } => EXIT_WORKER,
            _ => EXIT_GENERAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
