//! Command lines for stage launchers and runner scripts

use std::path::Path;

use crate::subprocess::ProcessCommand;

/// Builds a [`ProcessCommand`] one argument group at a time.
///
/// Flags become two arguments (`--name value`), the form stage executables
/// parse; options become one (`--name=value`), the form the pipeline-server
/// runner expects.
pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: ProcessCommand {
                program: program.to_string(),
                args: Vec::new(),
                working_dir: None,
            },
        }
    }

    /// Start from a configured launcher: its program plus the arguments that
    /// precede every call (`/bin/sh fake_erun.sh`, say)
    pub fn launcher(program: &str, leading_args: &[String]) -> Self {
        Self::new(program).args(leading_args)
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Append `--name value`
    pub fn flag(mut self, name: &str, value: &str) -> Self {
        self.command.args.push(format!("--{name}"));
        self.command.args.push(value.to_string());
        self
    }

    /// Append `--name=value`
    pub fn option(mut self, name: &str, value: &str) -> Self {
        self.command.args.push(format!("--{name}={value}"));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_launcher_call_layout() {
        let command = ProcessCommandBuilder::launcher("/bin/sh", &["fake_erun.sh".to_string()])
            .args(["SHE_GST", "1.8.3", "SHE_GST_GenGalaxyImages"])
            .flag("config_files", "data/sim_config_0.xml")
            .flag("workdir", "/work/thread0")
            .current_dir(Path::new("/work/thread0"))
            .build();

        assert_eq!(command.program, "/bin/sh");
        assert_eq!(
            command.args,
            vec![
                "fake_erun.sh",
                "SHE_GST",
                "1.8.3",
                "SHE_GST_GenGalaxyImages",
                "--config_files",
                "data/sim_config_0.xml",
                "--workdir",
                "/work/thread0",
            ]
        );
        assert_eq!(command.working_dir, Some(PathBuf::from("/work/thread0")));
    }

    #[test]
    fn test_options_are_single_arguments() {
        let command = ProcessCommandBuilder::new("pipeline_runner.py")
            .option("pipeline", "bias_measurement.py")
            .option("serverurl", "http://localhost:50000")
            .build();
        assert_eq!(
            command.args,
            vec![
                "--pipeline=bias_measurement.py",
                "--serverurl=http://localhost:50000"
            ]
        );
    }
}
