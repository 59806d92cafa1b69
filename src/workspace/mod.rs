//! Worker workspace isolation
//!
//! - `path_resolver` - search-path resolution and workdir-relative paths
//! - `builder` - directory skeletons for the run and for each worker slot
//! - `link` - symlinking resolved files into a worker's tree

pub mod builder;
pub mod link;
pub mod path_resolver;

pub use builder::{IsolationMode, WorkerSlot, WorkerSlots, WorkspaceBuilder, CACHE_DIR, DATA_DIR};
pub use link::{link_file, link_if_absent, remove_stale, LinkOutcome};
pub use path_resolver::{relativize, resolve, SearchPath};
