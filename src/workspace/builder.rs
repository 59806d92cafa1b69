//! Worker workspace construction
//!
//! Creates the on-disk skeleton of the top-level workdir and of every worker
//! slot beneath it: the slot directory itself plus `cache/`, `data/` and the
//! log directory. Creation is idempotent; in cluster mode every directory is
//! made world-writable so the pipeline server's user can write into it.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

pub const CACHE_DIR: &str = "cache";
pub const DATA_DIR: &str = "data";

/// How worker directories are shared between batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// One directory per worker slot, reused by every batch (`thread<w>`)
    #[default]
    PerWorker,
    /// One directory per worker slot and batch (`thread<w>_batch<b>`)
    PerBatch,
}

/// One isolated execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    pub index: usize,
    pub batch: Option<usize>,
    pub workdir: PathBuf,
    pub logdir: PathBuf,
    pub app_workdir: Option<PathBuf>,
    pub app_logdir: Option<PathBuf>,
}

impl WorkerSlot {
    pub fn data_dir(&self) -> PathBuf {
        self.workdir.join(DATA_DIR)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.workdir.join(CACHE_DIR)
    }
}

/// The full set of worker slots for a run
#[derive(Debug, Clone)]
pub struct WorkerSlots {
    mode: IsolationMode,
    concurrency: usize,
    slots: Vec<WorkerSlot>,
}

impl WorkerSlots {
    /// Slot used by worker `worker` while running batch `batch_number`
    pub fn get(&self, worker: usize, batch_number: usize) -> Option<&WorkerSlot> {
        if worker >= self.concurrency {
            return None;
        }
        match self.mode {
            IsolationMode::PerWorker => self.slots.get(worker),
            IsolationMode::PerBatch => self.slots.get(worker + self.concurrency * batch_number),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerSlot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Builds workdir skeletons
#[derive(Debug, Clone)]
pub struct WorkspaceBuilder {
    logdir: PathBuf,
    cluster: bool,
    app_root: Option<PathBuf>,
}

impl WorkspaceBuilder {
    pub fn new(logdir: impl Into<PathBuf>) -> Self {
        Self {
            logdir: logdir.into(),
            cluster: false,
            app_root: None,
        }
    }

    /// Relax permissions of every created directory to world-writable
    pub fn cluster(mut self, cluster: bool) -> Self {
        self.cluster = cluster;
        self
    }

    /// Mirror every worker slot under a second root (the pipeline server's application workdir)
    pub fn with_app_root(mut self, app_root: Option<PathBuf>) -> Self {
        self.app_root = app_root;
        self
    }

    /// Create `root` with its `cache/`, `data/` and log directories
    pub fn ensure_workspace(&self, root: &Path) -> Result<WorkerSlot> {
        self.ensure_tree(root)?;
        Ok(WorkerSlot {
            index: 0,
            batch: None,
            workdir: root.to_path_buf(),
            logdir: root.join(&self.logdir),
            app_workdir: None,
            app_logdir: None,
        })
    }

    /// Directory name of a worker slot
    pub fn slot_dir_name(worker: usize, batch: Option<usize>) -> String {
        match batch {
            Some(b) => format!("thread{worker}_batch{b}"),
            None => format!("thread{worker}"),
        }
    }

    /// Create every worker slot under `parent`
    pub fn build_slots(
        &self,
        parent: &Path,
        concurrency: usize,
        mode: IsolationMode,
        num_batches: usize,
    ) -> Result<WorkerSlots> {
        let mut slots = Vec::new();
        let batches: Vec<Option<usize>> = match mode {
            IsolationMode::PerWorker => vec![None],
            IsolationMode::PerBatch => (0..num_batches).map(Some).collect(),
        };

        for batch in batches {
            for worker in 0..concurrency {
                slots.push(self.build_slot(parent, worker, batch)?);
            }
        }

        debug!(
            "Created {} worker slots under {} ({:?})",
            slots.len(),
            parent.display(),
            mode
        );

        Ok(WorkerSlots {
            mode,
            concurrency,
            slots,
        })
    }

    fn build_slot(&self, parent: &Path, worker: usize, batch: Option<usize>) -> Result<WorkerSlot> {
        let name = Self::slot_dir_name(worker, batch);
        let workdir = parent.join(&name);
        self.ensure_tree(&workdir)?;

        let (app_workdir, app_logdir) = match &self.app_root {
            Some(app_root) if app_root != parent => {
                let app_workdir = app_root.join(&name);
                self.ensure_tree(&app_workdir)?;
                let app_logdir = app_workdir.join(&self.logdir);
                (Some(app_workdir), Some(app_logdir))
            }
            _ => (None, None),
        };

        Ok(WorkerSlot {
            index: worker,
            batch,
            logdir: workdir.join(&self.logdir),
            workdir,
            app_workdir,
            app_logdir,
        })
    }

    fn ensure_tree(&self, root: &Path) -> Result<()> {
        self.ensure_dir(root, "Workdir")?;
        self.ensure_dir(&root.join(CACHE_DIR), "Cache directory")?;
        self.ensure_dir(&root.join(DATA_DIR), "Data directory")?;
        self.ensure_dir(&root.join(&self.logdir), "Log directory")?;
        Ok(())
    }

    fn ensure_dir(&self, path: &Path, what: &str) -> Result<()> {
        if !path.is_dir() {
            match std::fs::create_dir(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => {}
                Err(e) => {
                    error!(
                        "{} ({}) does not exist and cannot be created.",
                        what,
                        path.display()
                    );
                    return Err(PipelineError::workspace(path, e));
                }
            }
        }

        if self.cluster {
            relax_permissions(path)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn relax_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))
        .map_err(|e| PipelineError::workspace(path, e))
}

#[cfg(not(unix))]
fn relax_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
