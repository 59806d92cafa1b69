//! Run arguments shared by the command line and saved argument sets

use crate::error::{PipelineError, Result};
use crate::supervisor::SupervisionPolicy;
use crate::workspace::IsolationMode;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Arguments of a parallel bias-measurement run
#[derive(Args, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunArgs {
    /// Base ISF, searched for in the workdir
    #[arg(long)]
    pub isf: Option<String>,

    /// ISF overrides as key/value pairs
    #[arg(long = "isf_args", alias = "isf-args", num_args = 1.., value_name = "KEY VALUE")]
    pub isf_args: Vec<String>,

    /// Base pipeline configuration file
    #[arg(long)]
    pub config: Option<String>,

    /// Pipeline configuration overrides as key/value pairs
    #[arg(long = "config_args", alias = "config-args", num_args = 1.., value_name = "KEY VALUE")]
    pub config_args: Vec<String>,

    /// Simulation plan overrides as key/value pairs
    #[arg(long = "plan_args", alias = "plan-args", num_args = 1.., value_name = "KEY VALUE")]
    pub plan_args: Vec<String>,

    /// Top-level work directory
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Log directory name inside each workdir
    #[arg(long)]
    pub logdir: Option<String>,

    /// Application work directory as seen by the pipeline server
    #[arg(long = "app_workdir", alias = "app-workdir")]
    pub app_workdir: Option<PathBuf>,

    /// Root of the installed pipeline packages
    #[arg(long = "pipeline_dir", alias = "pipeline-dir")]
    pub pipeline_dir: Option<PathBuf>,

    /// Worker processes per batch; 0 picks one fewer than the number of cores
    #[arg(long = "number_threads", alias = "number-threads", default_value_t = 0)]
    pub number_threads: usize,

    /// Stop each simulation after shear estimation (0 or 1)
    #[arg(long = "est_shear_only", alias = "est-shear-only", default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=1))]
    pub est_shear_only: u8,

    /// Relax directory permissions for a shared cluster filesystem
    #[arg(long)]
    pub cluster: bool,

    /// Also measure calibration residuals
    #[arg(long)]
    pub residuals: bool,

    /// Print the final bias measurements
    #[arg(long = "print_bias", alias = "print-bias")]
    pub print_bias: bool,

    /// What to do when a worker fails
    #[arg(long, value_enum, default_value_t)]
    pub policy: SupervisionPolicy,

    /// Worker directory layout
    #[arg(long, value_enum, default_value_t)]
    pub isolation: IsolationMode,

    /// Settings file (TOML)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Saved argument set (JSON) replacing every other argument
    #[arg(long = "saved_args", visible_alias = "pickled_args")]
    #[serde(skip)]
    pub saved_args: Option<String>,
}

pub const DEFAULT_SERVER_URL: &str = "http://localhost:50000";

/// Arguments for submitting a pipeline to the execution server
#[derive(Args, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitArgs {
    /// Pipeline name, e.g. `analysis_validation`
    #[arg(long)]
    pub pipeline: String,

    /// Base ISF, searched for in the workdir
    #[arg(long)]
    pub isf: String,

    /// ISF overrides as key/value pairs
    #[arg(long = "isf_args", alias = "isf-args", num_args = 1.., value_name = "KEY VALUE")]
    pub isf_args: Vec<String>,

    /// Base pipeline configuration file
    #[arg(long)]
    pub config: Option<String>,

    /// Pipeline configuration overrides as key/value pairs
    #[arg(long = "config_args", alias = "config-args", num_args = 1.., value_name = "KEY VALUE")]
    pub config_args: Vec<String>,

    /// Pipeline server URL; defaults to the settings file, then localhost
    #[arg(long)]
    pub serverurl: Option<String>,

    #[arg(long)]
    pub workdir: Option<PathBuf>,

    #[arg(long)]
    pub logdir: Option<String>,

    /// Root of the installed pipeline packages
    #[arg(long = "pipeline_dir", alias = "pipeline-dir")]
    pub pipeline_dir: Option<PathBuf>,

    /// The pipeline server runs as another user
    #[arg(long)]
    pub cluster: bool,

    /// Settings file (TOML)
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

/// Pair up a flat `key value key value ...` list
pub fn parse_pairs(option: &str, values: &[String]) -> Result<Vec<(String, String)>> {
    if values.len() % 2 != 0 {
        return Err(PipelineError::Config(format!(
            "--{} requires key/value pairs, got {} values",
            option,
            values.len()
        )));
    }
    Ok(values
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}
