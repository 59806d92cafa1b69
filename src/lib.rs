//! # she-pipeline
//!
//! Batch-parallel runner for the shear bias measurement pipeline. A run
//! partitions its simulations into batches, gives every worker an isolated
//! workdir whose inputs are symlinked in together with the data files they
//! depend on, supervises each worker's chain of external stages and merges
//! the per-simulation outputs into one listfile for the final bias
//! measurement.
//!
//! ## Usage
//!
//! ```bash
//! she-pipeline run --isf bias_isf.txt --number_threads 4 [--isf_args KEY VALUE ...]
//! she-pipeline plan --units 100 --threads 8
//! she-pipeline submit --pipeline analysis_validation --isf analysis_isf.txt
//! ```
//!
//! ## Modules
//!
//! - `app` - Logging setup and fatal error reporting for the binary
//! - `batch` - Pure batch planning
//! - `cli` - Command-line parsing and routing
//! - `config` - Run configuration, settings file, paired arguments, saved argument sets
//! - `error` - Error taxonomy and exit codes
//! - `isf` - Input specification files and per-worker materialization
//! - `merge` - Merging worker outputs into the aggregate listfile
//! - `product` - Data products, listfiles and their dependency closures
//! - `runner` - The run state machine
//! - `server` - Submission to the pipeline-execution server
//! - `stage` - External stages and the per-simulation stage chain
//! - `subprocess` - Process execution abstraction with a mock for tests
//! - `supervisor` - Fail-fast and best-effort worker supervision
//! - `workspace` - Search paths, workdir skeletons and symlinking
pub mod app;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod isf;
pub mod merge;
pub mod product;
pub mod runner;
pub mod server;
pub mod stage;
pub mod subprocess;
pub mod supervisor;
pub mod workspace;
