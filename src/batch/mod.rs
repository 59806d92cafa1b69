//! Pure batch planning
//!
//! Partitions a run of work units into sequential batches of at most
//! `concurrency` units. Each unit in a batch is handed to one worker slot and
//! its global simulation index is derived from the batch's lower bound.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// One simulation/measurement job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub simulation_index: usize,
    pub simulation_config_ref: String,
}

/// Pure: Number simulation config references in listfile order
pub fn work_units(config_refs: Vec<String>) -> Vec<WorkUnit> {
    config_refs
        .into_iter()
        .enumerate()
        .map(|(simulation_index, simulation_config_ref)| WorkUnit {
            simulation_index,
            simulation_config_ref,
        })
        .collect()
}

/// A contiguous slice of work units dispatched together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_number: usize,
    pub worker_count: usize,
    pub min_index: usize,
    /// Exclusive upper bound
    pub max_index: usize,
}

impl Batch {
    /// Build a batch covering `[min_index, max_index)`
    pub fn new(batch_number: usize, min_index: usize, max_index: usize) -> Result<Self> {
        if max_index <= min_index {
            return Err(PipelineError::Config(format!(
                "Batch {batch_number} is empty: max index {max_index} <= min index {min_index}"
            )));
        }
        Ok(Self {
            batch_number,
            worker_count: max_index - min_index,
            min_index,
            max_index,
        })
    }

    /// Global simulation index processed by `worker` in this batch
    pub fn sim_number(&self, worker: usize) -> Option<usize> {
        (worker < self.worker_count).then(|| self.min_index + worker)
    }

    pub fn indices(&self) -> Range<usize> {
        self.min_index..self.max_index
    }

    pub fn workers(&self) -> Range<usize> {
        0..self.worker_count
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} (min={}, max={}, n={})",
            self.batch_number, self.min_index, self.max_index, self.worker_count
        )
    }
}

/// Pure: Partition `total_units` into batches of at most `concurrency` units
pub fn plan(total_units: usize, concurrency: usize) -> Result<Vec<Batch>> {
    if concurrency == 0 {
        return Err(PipelineError::Config(
            "Concurrency must be at least 1".to_string(),
        ));
    }

    let number_of_batches = total_units.div_ceil(concurrency);
    (0..number_of_batches)
        .map(|b| {
            let min_index = concurrency * b;
            let max_index = (concurrency * (b + 1)).min(total_units);
            Batch::new(b, min_index, max_index)
        })
        .collect()
}

/// Pure: Clamp a requested worker count to `[1, cpu_count]`; zero means
/// one fewer than the number of cores
pub fn clamp_concurrency(requested: usize, cpu_count: usize) -> usize {
    let cpu_count = cpu_count.max(1);
    let wanted = if requested == 0 {
        cpu_count.saturating_sub(1)
    } else {
        requested
    };
    wanted.clamp(1, cpu_count)
}

/// Worker count for this machine given the requested `number_threads`
pub fn resolve_concurrency(requested: usize) -> usize {
    let cpu_count = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    clamp_concurrency(requested, cpu_count)
}

/// Pure: Workers a run actually uses; never more than there are units
pub fn effective_concurrency(concurrency: usize, total_units: usize) -> usize {
    concurrency.min(total_units).max(1)
}
