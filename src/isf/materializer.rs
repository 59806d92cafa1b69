//! Per-worker ISF materialization
//!
//! Builds the ISF a worker's stage chain reads: control keys pointing at the
//! worker's own directories, caller overrides, then the template for anything
//! still unset. Every filename-valued port is resolved, symlinked into the
//! worker's `data/` directory together with the files it depends on, and
//! rewritten to the worker-local path.

use super::file::Isf;
use super::ports::{
    belongs_to_simulation, is_filename_port, LOGDIR_KEY, MDB_PORT, PIPELINE_CONFIG_KEY,
    PIPELINE_DIR_KEY, PKG_REPOSITORY_KEY, WORKDIR_KEY,
};
use crate::error::{PipelineError, Result};
use crate::product::{
    is_listfile, is_null, write_listfile, DataFileRef, DependencyClosureResolver,
};
use crate::workspace::{link_file, link_if_absent, resolve, SearchPath, WorkerSlot, DATA_DIR};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Package locations seeded into every ISF
#[derive(Debug, Clone, Default)]
pub struct PackageDirs {
    pub pkg_repository: String,
    pub pipeline_dir: String,
}

pub const PIPELINE_PKGDEF_DIR: &str = "SHE_Pipeline_pkgdef";

impl PackageDirs {
    /// Locations for `pipeline` inside the package repository `pkg_repository`
    pub fn for_pipeline(pkg_repository: &Path, pipeline: &str) -> Self {
        let pipeline_dir = pkg_repository
            .join(PIPELINE_PKGDEF_DIR)
            .join(format!("{pipeline}.py"));
        Self {
            pkg_repository: pkg_repository.to_string_lossy().into_owned(),
            pipeline_dir: pipeline_dir.to_string_lossy().into_owned(),
        }
    }

    /// Whether the pipeline definition file exists
    pub fn pipeline_exists(&self) -> bool {
        Path::new(&self.pipeline_dir).exists()
    }
}

/// Values for one materialization beyond the template and overrides
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub pipeline_config: Option<String>,
    /// Simulation being prepared; selects `TEST-<n>` tagged inputs
    pub simulation_index: Option<usize>,
    /// Per-unit values applied after the template (e.g. `simulation_config`)
    pub computed: Vec<(String, String)>,
}

/// A materialized ISF and where it was written
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub isf: Isf,
    pub path: PathBuf,
}

impl RunSpec {
    pub fn get(&self, port: &str) -> Option<&str> {
        self.isf.get(port)
    }

    /// Port value, or `None` when unset or a null sentinel
    pub fn port(&self, port: &str) -> Option<&str> {
        self.isf.get(port).filter(|v| !is_null(v))
    }
}

#[derive(Debug, Clone)]
pub struct RunSpecMaterializer {
    resolver: DependencyClosureResolver,
    package_dirs: PackageDirs,
    optional_ports: Vec<String>,
    shared_workdir: Option<PathBuf>,
    version: String,
}

impl RunSpecMaterializer {
    pub fn new(package_dirs: PackageDirs) -> Self {
        Self {
            resolver: DependencyClosureResolver::new(),
            package_dirs,
            optional_ports: Vec::new(),
            shared_workdir: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_resolver(mut self, resolver: DependencyClosureResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_optional_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_ports = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Link `*bin` files of this directory into every materialized worker
    pub fn with_shared_workdir(mut self, shared_workdir: Option<PathBuf>) -> Self {
        self.shared_workdir = shared_workdir;
        self
    }

    pub fn materialize(
        &self,
        template: &Isf,
        overrides: &[(String, String)],
        slot: &WorkerSlot,
        search_path: &SearchPath,
        inputs: &RunInputs,
    ) -> Result<RunSpec> {
        let mut isf = self.seed(slot, inputs);

        for (key, value) in overrides {
            isf.set(key.as_str(), value.as_str());
        }
        for (key, value) in template.iter() {
            isf.set_if_absent(key, value);
        }
        for (key, value) in &inputs.computed {
            isf.set(key.as_str(), value.as_str());
        }

        for key in isf.keys() {
            if !is_filename_port(&key) {
                continue;
            }
            let Some(value) = isf.get(&key).map(str::to_string) else {
                continue;
            };
            if is_null(&value) {
                continue;
            }
            if !belongs_to_simulation(&value, inputs.simulation_index) {
                trace!("Skipping {}={} for simulation {:?}", key, value, inputs.simulation_index);
                continue;
            }

            let local = self.link_port(&key, &value, slot, search_path)?;
            isf.set(key, local);
        }

        for port in &self.optional_ports {
            self.shape_optional_port(&mut isf, port, slot)?;
        }

        let path = slot.workdir.join(self.isf_filename());
        isf.write(&path)?;
        debug!("Wrote ISF {}", path.display());

        if let Some(shared) = &self.shared_workdir {
            link_shared_bins(shared, &slot.workdir)?;
        }

        Ok(RunSpec { isf, path })
    }

    fn seed(&self, slot: &WorkerSlot, inputs: &RunInputs) -> Isf {
        let mut isf = Isf::new();
        let workdir = slot.app_workdir.as_ref().unwrap_or(&slot.workdir);
        let logdir = slot.app_logdir.as_ref().unwrap_or(&slot.logdir);
        isf.set(WORKDIR_KEY, workdir.to_string_lossy());
        isf.set(LOGDIR_KEY, logdir.to_string_lossy());
        isf.set(PKG_REPOSITORY_KEY, self.package_dirs.pkg_repository.as_str());
        isf.set(PIPELINE_DIR_KEY, self.package_dirs.pipeline_dir.as_str());
        if let Some(config) = &inputs.pipeline_config {
            isf.set(PIPELINE_CONFIG_KEY, config.as_str());
        }
        isf
    }

    /// Link one port's file and its dependencies; returns the worker-local value
    fn link_port(&self, key: &str, value: &str, slot: &WorkerSlot, search_path: &SearchPath) -> Result<String> {
        let qualified = resolve(value, search_path).map_err(|_| {
            PipelineError::dependency(value, search_path.to_string())
        })?;

        let basename = Path::new(value)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PipelineError::Config(format!("Port {key} has no filename: {value}")))?;
        let local = format!("{DATA_DIR}/{basename}");
        link_file(&qualified, &slot.workdir.join(&local))?;

        let references = if key == MDB_PORT {
            self.resolver.mdb_references(&qualified)?
        } else {
            if is_listfile(value) {
                for sub in self.resolver.sub_products(&qualified, search_path)? {
                    link_into(slot, &sub.name, &sub.location)?;
                }
            }
            self.resolver.references(&qualified, search_path)?
        };

        for reference in &references {
            self.link_reference(reference, slot, search_path)?;
        }

        Ok(local)
    }

    fn link_reference(&self, reference: &DataFileRef, slot: &WorkerSlot, search_path: &SearchPath) -> Result<()> {
        let location = self.resolver.locate(reference, search_path)?;
        link_into(slot, &reference.name, &location)
    }

    /// Make an optional port listfile-shaped
    fn shape_optional_port(&self, isf: &mut Isf, port: &str, slot: &WorkerSlot) -> Result<()> {
        let current = isf.get(port).filter(|v| !is_null(v)).map(str::to_string);

        let (name, entries) = match current {
            None => (format!("empty_{port}.json"), Vec::new()),
            Some(value) if is_listfile(&value) => return Ok(()),
            Some(value) => (format!("{port}_listfile.json"), vec![value]),
        };

        write_listfile(&slot.data_dir().join(&name), &entries)?;
        isf.set(port, format!("{DATA_DIR}/{name}"));
        Ok(())
    }

    fn isf_filename(&self) -> String {
        format!(
            "EUC_SHE_ISF_{}_{}_{}.txt",
            std::process::id(),
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            self.version
        )
    }
}

/// Link `location` at `name` under the worker's tree; absolute names are already reachable
fn link_into(slot: &WorkerSlot, name: &str, location: &Path) -> Result<()> {
    if Path::new(name).is_absolute() {
        return Ok(());
    }
    link_file(location, &slot.workdir.join(name))?;
    Ok(())
}

/// Symlink every `*bin` file of `shared` into `workdir` unless already present
pub fn link_shared_bins(shared: &Path, workdir: &Path) -> Result<usize> {
    let mut linked = 0;
    for entry in std::fs::read_dir(shared)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with("bin") || !entry.path().is_file() {
            continue;
        }
        if link_if_absent(&entry.path(), &workdir.join(&name))? {
            linked += 1;
        }
    }
    Ok(linked)
}
