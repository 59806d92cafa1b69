//! Classification of ISF keys

use once_cell::sync::Lazy;
use regex::Regex;

pub const WORKDIR_KEY: &str = "workdir";
pub const LOGDIR_KEY: &str = "logdir";
pub const PKG_REPOSITORY_KEY: &str = "pkgRepository";
pub const PIPELINE_DIR_KEY: &str = "pipelineDir";
pub const PIPELINE_CONFIG_KEY: &str = "pipeline_config";
pub const MDB_PORT: &str = "mdb";

/// Keys whose values are never filenames to link
pub const CONTROL_KEYS: [&str; 4] = [WORKDIR_KEY, LOGDIR_KEY, PKG_REPOSITORY_KEY, PIPELINE_DIR_KEY];

const SIMULATION_PLAN_MARKER: &str = "simulation_plan";

/// Optional ports of the shear analysis pipelines
pub const ANALYSIS_OPTIONAL_PORTS: [&str; 4] = [
    "phz_output_cat",
    "spe_output_cat",
    "momentsml_training_data",
    PIPELINE_CONFIG_KEY,
];

static TEST_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TEST-(\d+)").expect("TEST tag pattern is valid"));

/// Whether `key` names a port whose value is a file to resolve and link
pub fn is_filename_port(key: &str) -> bool {
    !CONTROL_KEYS.contains(&key) && !key.contains(SIMULATION_PLAN_MARKER)
}

/// Whether a port value is meant for `simulation_index`.
///
/// Values tagged `TEST-<n>` belong to simulation `n` only; untagged values
/// belong to every simulation. Without a simulation index nothing is filtered.
pub fn belongs_to_simulation(value: &str, simulation_index: Option<usize>) -> bool {
    let Some(index) = simulation_index else {
        return true;
    };
    let mut tags = TEST_TAG_RE
        .captures_iter(value)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .peekable();

    if tags.peek().is_none() {
        return !value.contains("TEST-");
    }
    tags.any(|tag| tag == index)
}

/// Optional ports registered for `pipeline`
pub fn optional_ports_for(pipeline: &str) -> &'static [&'static str] {
    if pipeline.starts_with("analysis") {
        &ANALYSIS_OPTIONAL_PORTS
    } else {
        &[]
    }
}
