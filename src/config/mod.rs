//! Run configuration
//!
//! `RunnerConfig` is built once from the validated command line and passed to
//! every component; nothing reads ambient globals after startup.

pub mod args;
pub mod pipeline_config;
pub mod saved_args;
pub mod settings;

pub use args::{parse_pairs, RunArgs, SubmitArgs};
pub use pipeline_config::{create_pipeline_config, PIPELINE_CONFIG_FILENAME};
pub use saved_args::{load_saved_args, save_args, SAVED_ARGS_FILENAME};
pub use settings::Settings;

use crate::batch::resolve_concurrency;
use crate::error::{PipelineError, Result};
use crate::isf::PackageDirs;
use crate::supervisor::SupervisionPolicy;
use crate::workspace::IsolationMode;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_LOGDIR: &str = "logs";

/// Default top-level workdir
///
/// `$HOME/Work/workspace` normally; `/workspace/<user>/workdir` on a cluster.
pub fn default_workdir(cluster: bool) -> PathBuf {
    if cluster {
        return PathBuf::from("/workspace")
            .join(whoami::username())
            .join("workdir");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/home/user"))
        .join("Work")
        .join("workspace")
}

/// Immutable configuration of one run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workdir: PathBuf,
    pub logdir: String,
    pub app_workdir: Option<PathBuf>,
    pub isf: Option<String>,
    pub isf_args: Vec<(String, String)>,
    pub config: Option<String>,
    pub config_args: Vec<(String, String)>,
    pub plan_args: Vec<(String, String)>,
    pub concurrency: usize,
    pub est_shear_only: bool,
    pub cluster: bool,
    pub residuals: bool,
    pub print_bias: bool,
    pub policy: SupervisionPolicy,
    pub isolation: IsolationMode,
    pub pipeline_dir: Option<PathBuf>,
    pub settings: Settings,
    /// Arguments this configuration was built from, recorded at startup
    pub args: RunArgs,
}

impl RunnerConfig {
    /// Build the configuration, replaying a saved argument set when one is named
    pub fn from_args(args: RunArgs) -> Result<Self> {
        let args = match &args.saved_args {
            Some(name) => {
                let workdir = args
                    .workdir
                    .clone()
                    .unwrap_or_else(|| default_workdir(args.cluster));
                let mut saved = load_saved_args(name, &workdir)?;
                saved.workdir.get_or_insert(workdir);
                saved
            }
            None => args,
        };

        let settings = Settings::load_or_default(args.settings.as_deref())?;
        let config = Self::with_settings(args, settings)?;
        debug!("Run configuration: {:?}", config);
        Ok(config)
    }

    /// Build the configuration with already-loaded settings
    pub fn with_settings(args: RunArgs, settings: Settings) -> Result<Self> {
        let isf_args = parse_pairs("isf_args", &args.isf_args)?;
        let config_args = parse_pairs("config_args", &args.config_args)?;
        let plan_args = parse_pairs("plan_args", &args.plan_args)?;

        let workdir = args
            .workdir
            .clone()
            .unwrap_or_else(|| default_workdir(args.cluster));
        let workdir = absolute(&workdir)?;

        let logdir = args
            .logdir
            .clone()
            .unwrap_or_else(|| DEFAULT_LOGDIR.to_string());

        Ok(Self {
            workdir,
            logdir,
            app_workdir: args.app_workdir.clone(),
            isf: args.isf.clone(),
            isf_args,
            config: args.config.clone(),
            config_args,
            plan_args,
            concurrency: resolve_concurrency(args.number_threads),
            est_shear_only: args.est_shear_only != 0,
            cluster: args.cluster,
            residuals: args.residuals,
            print_bias: args.print_bias,
            policy: args.policy,
            isolation: args.isolation,
            pipeline_dir: args.pipeline_dir.clone(),
            settings,
            args,
        })
    }

    /// Base ISF name; a run cannot start without one
    pub fn require_isf(&self) -> Result<&str> {
        self.isf
            .as_deref()
            .ok_or_else(|| PipelineError::Config("No --isf given".to_string()))
    }

    /// Package locations written into every ISF of `pipeline`
    pub fn package_dirs(&self, pipeline: &str) -> PackageDirs {
        PackageDirs::for_pipeline(
            &pkg_repository(self.pipeline_dir.as_deref(), &self.settings),
            pipeline,
        )
    }
}

/// Root of the installed packages: the command line, then settings, then
/// the directory holding this executable
pub fn pkg_repository(pipeline_dir: Option<&Path>, settings: &Settings) -> PathBuf {
    pipeline_dir
        .map(Path::to_path_buf)
        .or_else(|| settings.pkg_repository.clone())
        .or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_workdir() {
        assert!(default_workdir(false).ends_with("Work/workspace"));
        let cluster = default_workdir(true);
        assert!(cluster.starts_with("/workspace"));
        assert!(cluster.ends_with("workdir"));
    }

    #[test]
    fn test_from_args_defaults() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let args = RunArgs {
            workdir: Some(dir.path().to_path_buf()),
            isf: Some("isf.txt".to_string()),
            isf_args: vec!["a".into(), "1".into(), "a".into(), "2".into()],
            number_threads: 1,
            est_shear_only: 1,
            ..RunArgs::default()
        };
        let config = RunnerConfig::with_settings(args, Settings::default())?;

        assert_eq!(config.workdir, dir.path());
        assert_eq!(config.logdir, DEFAULT_LOGDIR);
        assert_eq!(config.concurrency, 1);
        assert!(config.est_shear_only);
        assert_eq!(config.policy, SupervisionPolicy::FailFast);
        assert_eq!(config.isf_args.len(), 2);
        assert_eq!(config.require_isf()?, "isf.txt");
        Ok(())
    }

    #[test]
    fn test_odd_pairs_rejected() {
        let args = RunArgs {
            plan_args: vec!["NUM_GALAXIES".into()],
            ..RunArgs::default()
        };
        let err = RunnerConfig::with_settings(args, Settings::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }

    #[test]
    fn test_saved_args_override_command_line() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        std::fs::create_dir(dir.path().join("data"))?;
        let saved = RunArgs {
            isf: Some("saved_isf.txt".to_string()),
            number_threads: 2,
            ..RunArgs::default()
        };
        save_args(&saved, dir.path())?;

        let args = RunArgs {
            workdir: Some(dir.path().to_path_buf()),
            isf: Some("command_line_isf.txt".to_string()),
            saved_args: Some("data/run_args.json".to_string()),
            ..RunArgs::default()
        };
        let config = RunnerConfig::from_args(args)?;
        assert_eq!(config.isf.as_deref(), Some("saved_isf.txt"));
        assert_eq!(config.workdir, dir.path());
        Ok(())
    }

    #[test]
    fn test_package_dirs_prefer_command_line() -> anyhow::Result<()> {
        let args = RunArgs {
            pipeline_dir: Some(PathBuf::from("/opt/she")),
            ..RunArgs::default()
        };
        let settings = Settings {
            pkg_repository: Some(PathBuf::from("/ignored")),
            ..Settings::default()
        };
        let config = RunnerConfig::with_settings(args, settings)?;
        let dirs = config.package_dirs("bias_measurement");
        assert_eq!(dirs.pkg_repository, "/opt/she");
        assert_eq!(
            dirs.pipeline_dir,
            "/opt/she/SHE_Pipeline_pkgdef/bias_measurement.py"
        );
        Ok(())
    }

    #[test]
    fn test_missing_isf() -> anyhow::Result<()> {
        let config = RunnerConfig::with_settings(RunArgs::default(), Settings::default())?;
        assert!(config.require_isf().is_err());
        Ok(())
    }
}
