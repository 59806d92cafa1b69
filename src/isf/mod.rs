//! Input Specification Files
//!
//! - `file` - the `key=value` file format
//! - `ports` - which keys are control values and which name files
//! - `materializer` - building an isolated worker's ISF

pub mod file;
pub mod materializer;
pub mod ports;

pub use file::Isf;
pub use materializer::{
    link_shared_bins, PackageDirs, RunInputs, RunSpec, RunSpecMaterializer, PIPELINE_PKGDEF_DIR,
};
pub use ports::{belongs_to_simulation, is_filename_port, optional_ports_for, MDB_PORT, PIPELINE_CONFIG_KEY};
