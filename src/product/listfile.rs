//! Listfiles: JSON arrays of file paths standing in for one-to-many ports

use crate::error::{PipelineError, Result};
use std::path::Path;

pub const LISTFILE_EXTENSION: &str = ".json";

/// Read a listfile into its ordered sequence of paths
pub fn read_listfile(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| PipelineError::Product {
        path: path.to_path_buf(),
        reason: format!("not a listfile: {e}"),
    })
}

/// Write `entries` as a listfile, replacing any previous contents
pub fn write_listfile(path: &Path, entries: &[String]) -> Result<()> {
    let content = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn is_listfile(name: &str) -> bool {
    name.ends_with(LISTFILE_EXTENSION)
}
