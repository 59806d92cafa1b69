//! Saved argument sets
//!
//! A run records the arguments it was started with as JSON under its
//! workdir; `--saved_args` replays such a file in place of the command line.

use super::args::RunArgs;
use crate::error::{PipelineError, Result};
use crate::workspace::{resolve, SearchPath, DATA_DIR};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SAVED_ARGS_FILENAME: &str = "run_args.json";

/// Load an argument set, searching `name` relative to `workdir`
pub fn load_saved_args(name: &str, workdir: &Path) -> Result<RunArgs> {
    let search_path = SearchPath::single(workdir);
    let path = resolve(name, &search_path)
        .map_err(|_| PipelineError::dependency(name, search_path.to_string()))?;
    let content = std::fs::read_to_string(&path)?;
    let args: RunArgs = serde_json::from_str(&content).map_err(|e| {
        PipelineError::Config(format!("Invalid saved arguments {}: {}", path.display(), e))
    })?;
    info!("Loaded saved arguments from {}", path.display());
    Ok(args)
}

/// Record `args` as `<workdir>/data/run_args.json`
pub fn save_args(args: &RunArgs, workdir: &Path) -> Result<PathBuf> {
    let path = workdir.join(DATA_DIR).join(SAVED_ARGS_FILENAME);
    std::fs::write(&path, serde_json::to_string_pretty(args)?)?;
    debug!("Saved run arguments to {}", path.display());
    Ok(path)
}
