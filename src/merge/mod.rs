//! Merging a finished batch back into the parent workdir
//!
//! Each worker's measurements product is registered in the aggregate
//! listfile by its path relative to the parent workdir, and the data files it
//! references are linked into the parent so the reduction stage can read
//! them. Missing files are warned about, never fatal: a simulation without an
//! output simply does not appear in the listfile.

use crate::batch::Batch;
use crate::error::Result;
use crate::product::{read_listfile, write_listfile, DependencyClosureResolver};
use crate::stage::measurements_filename;
use crate::workspace::{link_if_absent, relativize, SearchPath, WorkerSlots};
use std::path::Path;
use tracing::{debug, info, warn};

pub const AGGREGATE_LISTFILE: &str = "data/shear_bias_measurement_list.json";

/// What one merge changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Listfile entries added by this merge
    pub added: Vec<String>,
    /// Outputs already listed by an earlier merge
    pub already_listed: usize,
    /// Simulations of the batch that left no output
    pub missing_outputs: Vec<usize>,
    /// Data files linked into the parent workdir
    pub linked: usize,
    /// Referenced data files that could not be found
    pub missing_dependencies: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OutputMerger {
    resolver: DependencyClosureResolver,
}

impl OutputMerger {
    pub fn new(resolver: DependencyClosureResolver) -> Self {
        Self { resolver }
    }

    /// Merge every worker of `batch` into `aggregate_listfile`.
    ///
    /// Entries are de-duplicated by path, so merging a batch twice leaves
    /// the listfile unchanged.
    pub fn merge(
        &self,
        slots: &WorkerSlots,
        batch: &Batch,
        aggregate_listfile: &Path,
        parent_workdir: &Path,
    ) -> Result<MergeReport> {
        let mut report = MergeReport::default();
        let mut new_entries = Vec::new();

        for worker in batch.workers() {
            let (Some(slot), Some(simulation_index)) =
                (slots.get(worker, batch.batch_number), batch.sim_number(worker))
            else {
                continue;
            };

            let output = slot.workdir.join(measurements_filename(simulation_index));
            if !output.exists() {
                warn!(
                    "No output for simulation {} in {}",
                    simulation_index,
                    slot.workdir.display()
                );
                report.missing_outputs.push(simulation_index);
                continue;
            }

            self.link_dependencies(&output, &slot.workdir, parent_workdir, &mut report)?;

            let entry = relativize(&output, parent_workdir)?;
            new_entries.push(entry.to_string_lossy().into_owned());
        }

        let mut listed = if aggregate_listfile.exists() {
            read_listfile(aggregate_listfile)?
        } else {
            Vec::new()
        };
        for entry in new_entries {
            if listed.contains(&entry) {
                report.already_listed += 1;
                continue;
            }
            listed.push(entry.clone());
            report.added.push(entry);
        }
        write_listfile(aggregate_listfile, &listed)?;

        info!(
            "Merged {}: {} new outputs, {} missing",
            batch,
            report.added.len(),
            report.missing_outputs.len()
        );
        Ok(report)
    }

    fn link_dependencies(
        &self,
        product: &Path,
        worker_workdir: &Path,
        parent_workdir: &Path,
        report: &mut MergeReport,
    ) -> Result<()> {
        let search_path = SearchPath::single(worker_workdir);
        let references = match self.resolver.references(product, &search_path) {
            Ok(references) => references,
            Err(e) => {
                warn!("Cannot read references of {}: {}", product.display(), e);
                return Ok(());
            }
        };

        for reference in references {
            if Path::new(&reference.name).is_absolute() {
                continue;
            }
            let location = match self.resolver.locate(&reference, &search_path) {
                Ok(location) => location,
                Err(e) => {
                    warn!("Data file missing while merging {}: {}", product.display(), e);
                    report.missing_dependencies += 1;
                    continue;
                }
            };
            if link_if_absent(&location, &parent_workdir.join(&reference.name))? {
                debug!("Linked {} into {}", reference.name, parent_workdir.display());
                report.linked += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{IsolationMode, WorkspaceBuilder};
    use tempfile::TempDir;

    fn product(files: &[&str]) -> String {
        let mut xml = String::from("<she:ShearBiasMeasurements>\n");
        for f in files {
            xml.push_str(&format!("  <DataContainer><FileName>{f}</FileName></DataContainer>\n"));
        }
        xml.push_str("</she:ShearBiasMeasurements>\n");
        xml
    }

    fn write_output(workdir: &Path, simulation_index: usize, with_data: bool) {
        let data_file = format!("data/bias_stats_{simulation_index}.fits");
        std::fs::write(
            workdir.join(measurements_filename(simulation_index)),
            product(&[&data_file]),
        )
        .unwrap();
        if with_data {
            std::fs::write(workdir.join(&data_file), "FITS").unwrap();
        }
    }

    struct Fixture {
        dir: TempDir,
        slots: WorkerSlots,
    }

    fn fixture(concurrency: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let builder = WorkspaceBuilder::new("logs");
        builder.ensure_workspace(dir.path()).unwrap();
        let slots = builder
            .build_slots(dir.path(), concurrency, IsolationMode::PerWorker, 1)
            .unwrap();
        Fixture { dir, slots }
    }

    #[test]
    fn test_merge_links_and_lists_outputs() {
        let f = fixture(2);
        let batch = Batch::new(1, 2, 4).unwrap();
        write_output(&f.slots.get(0, 1).unwrap().workdir, 2, true);
        write_output(&f.slots.get(1, 1).unwrap().workdir, 3, true);

        let listfile = f.dir.path().join(AGGREGATE_LISTFILE);
        let report = OutputMerger::default()
            .merge(&f.slots, &batch, &listfile, f.dir.path())
            .unwrap();

        assert_eq!(report.added.len(), 2);
        assert_eq!(report.linked, 2);
        assert_eq!(
            read_listfile(&listfile).unwrap(),
            vec![
                "thread0/data/shear_bias_measurements_sim2.xml",
                "thread1/data/shear_bias_measurements_sim3.xml"
            ]
        );
        assert!(f.dir.path().join("data/bias_stats_2.fits").exists());
        assert!(f.dir.path().join("data/bias_stats_3.fits").exists());
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let f = fixture(1);
        let batch = Batch::new(0, 0, 1).unwrap();
        write_output(&f.slots.get(0, 0).unwrap().workdir, 0, true);
        let listfile = f.dir.path().join(AGGREGATE_LISTFILE);
        let merger = OutputMerger::default();

        merger.merge(&f.slots, &batch, &listfile, f.dir.path()).unwrap();
        let second = merger.merge(&f.slots, &batch, &listfile, f.dir.path()).unwrap();

        assert!(second.added.is_empty());
        assert_eq!(second.already_listed, 1);
        assert_eq!(read_listfile(&listfile).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_outputs_and_data_are_not_fatal() {
        let f = fixture(2);
        let batch = Batch::new(0, 0, 2).unwrap();
        write_output(&f.slots.get(0, 0).unwrap().workdir, 0, false);

        let listfile = f.dir.path().join(AGGREGATE_LISTFILE);
        let report = OutputMerger::default()
            .merge(&f.slots, &batch, &listfile, f.dir.path())
            .unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(report.missing_outputs, vec![1]);
        assert_eq!(report.missing_dependencies, 1);
    }

    #[test]
    fn test_merge_appends_to_existing_listfile() {
        let f = fixture(1);
        let listfile = f.dir.path().join(AGGREGATE_LISTFILE);
        write_listfile(&listfile, &["thread0/data/shear_bias_measurements_sim0.xml".to_string()])
            .unwrap();

        let batch = Batch::new(1, 1, 2).unwrap();
        write_output(&f.slots.get(0, 1).unwrap().workdir, 1, true);
        OutputMerger::default()
            .merge(&f.slots, &batch, &listfile, f.dir.path())
            .unwrap();

        assert_eq!(read_listfile(&listfile).unwrap().len(), 2);
    }
}
