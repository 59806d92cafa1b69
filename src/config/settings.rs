//! Site settings loaded from an optional TOML file
//!
//! ```toml
//! spawn_retry_delay_secs = 60
//! optional_ports = []
//!
//! [launcher]
//! program = "E-Run"
//!
//! [packages]
//! SHE_CTE = "0.8.5"
//! SHE_GST = "1.8.3"
//! ```

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SHE_CTE: &str = "SHE_CTE";
pub const SHE_GST: &str = "SHE_GST";
pub const SHE_MER: &str = "SHE_MER";
pub const SHE_PSF_TOOLKIT: &str = "SHE_PSFToolkit";
pub const SHE_PIPELINE: &str = "SHE_Pipeline";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub launcher: LauncherSettings,
    /// Package name to version passed to the launcher
    pub packages: BTreeMap<String, String>,
    /// Extra ports always made listfile-shaped
    pub optional_ports: Vec<String>,
    /// Mission-database keys naming auxiliary data files
    pub mdb_keys: Option<Vec<String>>,
    pub spawn_retry_delay_secs: u64,
    /// Root of the installed pipeline packages (`pkgRepository`)
    pub pkg_repository: Option<PathBuf>,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Launcher command line; may carry its own arguments
    pub program: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub runner: String,
    pub url: Option<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            program: "E-Run".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            runner: "pipeline_runner.py".to_string(),
            url: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            launcher: LauncherSettings::default(),
            packages: default_packages(),
            optional_ports: Vec::new(),
            mdb_keys: None,
            spawn_retry_delay_secs: 60,
            pkg_repository: None,
            server: ServerSettings::default(),
        }
    }
}

fn default_packages() -> BTreeMap<String, String> {
    [
        (SHE_CTE, "0.8.5"),
        (SHE_GST, "1.8.3"),
        (SHE_MER, "0.4.4"),
        (SHE_PSF_TOOLKIT, "2.2.1"),
        (SHE_PIPELINE, "0.8.4"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Settings {
    /// Load settings from `path`; packages missing from the file keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read settings {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(content)?;
        for (package, version) in default_packages() {
            settings.packages.entry(package).or_insert(version);
        }
        Ok(settings)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn package_version(&self, package: &str) -> Result<&str> {
        self.packages
            .get(package)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::Config(format!("No version configured for package {package}")))
    }

    /// Launcher program and its leading arguments
    pub fn launcher_command(&self) -> Result<(String, Vec<String>)> {
        split_command("launcher", &self.launcher.program)
    }

    /// Pipeline-server runner program and its leading arguments
    pub fn server_runner_command(&self) -> Result<(String, Vec<String>)> {
        split_command("server runner", &self.server.runner)
    }

    pub fn spawn_retry_delay(&self) -> Duration {
        Duration::from_secs(self.spawn_retry_delay_secs)
    }
}

fn split_command(what: &str, line: &str) -> Result<(String, Vec<String>)> {
    let words = shell_words::split(line)
        .map_err(|e| PipelineError::Config(format!("Invalid {what} '{line}': {e}")))?;
    let mut words = words.into_iter();
    let program = words
        .next()
        .ok_or_else(|| PipelineError::Config(format!("The {what} command is empty")))?;
    Ok((program, words.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let settings = Settings::default();
        assert_eq!(settings.package_version(SHE_CTE)?, "0.8.5");
        assert_eq!(settings.package_version(SHE_GST)?, "1.8.3");
        assert_eq!(settings.spawn_retry_delay(), Duration::from_secs(60));
        assert_eq!(settings.launcher_command()?, ("E-Run".to_string(), vec![]));
        Ok(())
    }

    #[test]
    fn test_parse_overrides_and_keeps_defaults() -> anyhow::Result<()> {
        let settings = Settings::parse(
            r#"
spawn_retry_delay_secs = 5
optional_ports = ["phz_output_cat"]

[launcher]
program = "/bin/sh '/opt/fake launcher.sh'"

[packages]
SHE_CTE = "0.9.0"
"#,
        )?;
        assert_eq!(settings.package_version(SHE_CTE)?, "0.9.0");
        assert_eq!(settings.package_version(SHE_MER)?, "0.4.4");
        assert_eq!(settings.optional_ports, vec!["phz_output_cat".to_string()]);
        assert_eq!(
            settings.launcher_command()?,
            ("/bin/sh".to_string(), vec!["/opt/fake launcher.sh".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Settings::parse("spawn_retry_delay_secs = \"soon\"").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }

    #[test]
    fn test_empty_launcher_is_config_error() {
        let settings = Settings::parse("[launcher]\nprogram = \"\"\n").unwrap();
        assert!(settings.launcher_command().is_err());
    }

    #[test]
    fn test_unknown_package_is_config_error() {
        assert!(Settings::default().package_version("SHE_XYZ").is_err());
    }
}
