//! The per-run pipeline configuration file

use crate::error::{PipelineError, Result};
use crate::isf::Isf;
use crate::workspace::{resolve, SearchPath, DATA_DIR};
use std::path::Path;
use tracing::info;

pub const PIPELINE_CONFIG_FILENAME: &str = "she_pipeline_config.txt";

/// Write this run's pipeline configuration into `<workdir>/data/`.
///
/// Starts from `base` (found on `search_path`) and applies `overrides`, each
/// of which must name a key of the base configuration. Without a base the
/// file is empty. Returns the workdir-relative filename.
pub fn create_pipeline_config(
    base: Option<&str>,
    overrides: &[(String, String)],
    workdir: &Path,
    search_path: &SearchPath,
) -> Result<String> {
    let mut config = match base {
        Some(base) => {
            let base_path = resolve(base, search_path)
                .map_err(|_| PipelineError::dependency(base, search_path.to_string()))?;
            Isf::read(&base_path)?
        }
        None if overrides.is_empty() => Isf::new(),
        None => {
            return Err(PipelineError::Config(
                "--config_args given without a base --config".to_string(),
            ))
        }
    };

    for (key, value) in overrides {
        if !config.contains(key) {
            return Err(PipelineError::Config(format!(
                "Unrecognized pipeline config key '{}'; allowed keys: {}",
                key,
                config.keys().join(", ")
            )));
        }
        config.set(key.as_str(), value.as_str());
    }

    let relative = format!("{DATA_DIR}/{PIPELINE_CONFIG_FILENAME}");
    config.write(&workdir.join(&relative))?;
    info!("Wrote pipeline config {}", relative);
    Ok(relative)
}
