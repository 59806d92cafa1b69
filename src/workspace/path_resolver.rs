//! Search-path file resolution
//!
//! Resolves logical filenames against an ordered, colon-delimited list of
//! candidate directories and rewrites absolute paths relative to a workdir.

use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Ordered list of directories searched when resolving a filename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Parse a colon-delimited search path. Empty entries mean the current directory.
    pub fn parse(spec: &str) -> Self {
        Self {
            dirs: spec.split(':').map(PathBuf::from).collect(),
        }
    }

    /// Search path consisting of a single directory
    pub fn single(dir: impl Into<PathBuf>) -> Self {
        Self {
            dirs: vec![dir.into()],
        }
    }

    /// Search path of a run: the workdir, then its `data/` directory
    pub fn for_workdir(workdir: &Path) -> Self {
        Self {
            dirs: vec![workdir.to_path_buf(), workdir.join("data")],
        }
    }

    /// Search path used for the data files of a product living in `product_dir`:
    /// the product's own directory, its parent, the sibling `data/` directory,
    /// then everything in `self`.
    pub fn for_product_dir(&self, product_dir: &Path) -> Self {
        let mut dirs = vec![
            product_dir.to_path_buf(),
            product_dir.join(".."),
            product_dir.join("..").join("data"),
        ];
        dirs.extend(self.dirs.iter().cloned());
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self
            .dirs
            .iter()
            .map(|d| d.to_string_lossy().into_owned())
            .collect();
        write!(f, "{}", joined.join(":"))
    }
}

/// Resolve `name` to an absolute path by probing each directory of `search_path` in order
pub fn resolve(name: &str, search_path: &SearchPath) -> Result<PathBuf> {
    let candidate = Path::new(name);

    if candidate.is_absolute() {
        if candidate.exists() {
            return Ok(candidate.to_path_buf());
        }
        return Err(PipelineError::NotFound {
            name: name.to_string(),
            search_path: search_path.to_string(),
        });
    }

    for dir in search_path.dirs() {
        let path = if dir.as_os_str().is_empty() {
            candidate.to_path_buf()
        } else {
            dir.join(candidate)
        };
        trace!("Looking for {}", path.display());
        if path.exists() {
            return Ok(std::path::absolute(&path)?);
        }
    }

    Err(PipelineError::NotFound {
        name: name.to_string(),
        search_path: search_path.to_string(),
    })
}

/// Rewrite `path` relative to `workdir` when it lies inside it; otherwise return it unchanged.
///
/// Fails with a configuration error if `workdir` does not exist. The file itself
/// is not checked since it may be an output yet to be written.
pub fn relativize(path: &Path, workdir: &Path) -> Result<PathBuf> {
    if !workdir.exists() {
        return Err(PipelineError::Config(format!(
            "Work directory {} does not exist",
            workdir.display()
        )));
    }

    match path.strip_prefix(workdir) {
        Ok(rest) => Ok(rest.to_path_buf()),
        Err(_) => Ok(path.to_path_buf()),
    }
}
