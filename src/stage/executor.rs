//! Launching one external stage through the versioned launcher

use super::kind::StageInvocation;
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessOutput, ProcessRunner};
use crate::workspace::remove_stale;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runs stages as `<launcher> <package> <version> <executable> --flag value ...`
#[derive(Clone)]
pub struct StageExecutor {
    runner: Arc<dyn ProcessRunner>,
    launcher: String,
    launcher_args: Vec<String>,
    packages: BTreeMap<String, String>,
}

impl StageExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: &Settings) -> Result<Self> {
        let (launcher, launcher_args) = settings.launcher_command()?;
        Ok(Self {
            runner,
            launcher,
            launcher_args,
            packages: settings.packages.clone(),
        })
    }

    /// Run `invocation` in `workdir`, teeing its output into `logdir`.
    ///
    /// Fails when the executable exits nonzero or leaves any declared output
    /// missing.
    pub async fn invoke(
        &self,
        invocation: &StageInvocation,
        workdir: &Path,
        logdir: Option<&Path>,
    ) -> Result<ProcessOutput> {
        let spec = invocation.kind.spec();

        let missing = invocation.missing_flags();
        if !missing.is_empty() {
            return Err(PipelineError::Config(format!(
                "{} is missing required flags: --{}",
                spec.executable,
                missing.join(", --")
            )));
        }

        let version = self.packages.get(spec.package).ok_or_else(|| {
            PipelineError::Config(format!("No version configured for package {}", spec.package))
        })?;

        let mut builder = ProcessCommandBuilder::launcher(&self.launcher, &self.launcher_args)
            .args([spec.package, version.as_str(), spec.executable]);
        for (flag, value) in &invocation.flags {
            builder = builder.flag(flag, value);
        }
        builder = builder.flag("workdir", &workdir.to_string_lossy());
        if spec.takes_logdir {
            if let Some(logdir) = logdir {
                builder = builder.flag("logdir", &logdir.to_string_lossy());
            }
        }
        let command = builder
            .args(&invocation.extra_args)
            .current_dir(workdir)
            .build();

        clear_outputs(invocation, workdir)?;
        info!("{}", command);
        let output = self.runner.run(command).await?;

        if let Some(logdir) = logdir {
            tee_output(logdir, spec.executable, &output);
        }
        log_output(&output);

        if !output.status.success() {
            let last_error = output
                .stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or_default();
            return Err(PipelineError::StageFailed {
                executable: spec.executable.to_string(),
                reason: format!("{} {}", output.status, last_error).trim_end().to_string(),
            });
        }

        for flag in spec.output_flags {
            let Some(value) = invocation.value(flag) else {
                continue;
            };
            if !workdir.join(value).exists() {
                return Err(PipelineError::StageFailed {
                    executable: spec.executable.to_string(),
                    reason: format!("declared output {value} (--{flag}) was not produced"),
                });
            }
        }

        Ok(output)
    }
}

/// Remove what an earlier simulation left at this call's output paths, so
/// an output is only found afterwards if this call wrote it. Outputs the call
/// also reads (updated in place) are kept.
fn clear_outputs(invocation: &StageInvocation, workdir: &Path) -> Result<()> {
    let spec = invocation.kind.spec();
    for flag in spec.output_flags {
        let Some(value) = invocation.value(flag) else {
            continue;
        };
        let read_too = invocation.flags.iter().any(|(name, v)| {
            v.as_str() == value && !spec.output_flags.iter().any(|out| *out == name.as_str())
        });
        if !read_too {
            remove_stale(&workdir.join(value))?;
        }
    }
    Ok(())
}

fn log_output(output: &ProcessOutput) {
    for line in output.stdout.lines() {
        debug!("{}", line);
    }
    for line in output.stderr.lines() {
        if line.to_lowercase().contains("error") {
            error!("# {}", line);
        } else {
            debug!("# {}", line);
        }
    }
}

/// Append a stage's output to `<logdir>/<executable>.out`
fn tee_output(logdir: &Path, executable: &str, output: &ProcessOutput) {
    let path = logdir.join(format!("{executable}.out"));
    let written = std::fs::create_dir_all(logdir).and_then(|_| {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(output.stdout.as_bytes())?;
        file.write_all(output.stderr.as_bytes())
    });
    if let Err(e) = written {
        warn!("Cannot write stage log {}: {}", path.display(), e);
    }
}
