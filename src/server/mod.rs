//! Submission of a pipeline to the pipeline-execution server
//!
//! The server receives a pipeline definition name and a materialized ISF;
//! everything after that (scheduling, the stage graph) happens remotely.

use crate::config::args::DEFAULT_SERVER_URL;
use crate::config::{create_pipeline_config, parse_pairs, pkg_repository, Settings, SubmitArgs};
use crate::error::{PipelineError, Result};
use crate::isf::{optional_ports_for, Isf, PackageDirs, RunInputs, RunSpec, RunSpecMaterializer};
use crate::product::DependencyClosureResolver;
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};
use crate::workspace::{resolve, SearchPath, WorkspaceBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Everything needed to submit one pipeline
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub pipeline: String,
    pub isf: String,
    pub isf_args: Vec<(String, String)>,
    pub config: Option<String>,
    pub config_args: Vec<(String, String)>,
    pub server_url: String,
    pub workdir: PathBuf,
    pub logdir: String,
    pub cluster: bool,
    pub package_dirs: PackageDirs,
    pub settings: Settings,
}

impl SubmitRequest {
    pub fn from_args(args: SubmitArgs) -> Result<Self> {
        let settings = Settings::load_or_default(args.settings.as_deref())?;
        let workdir = args
            .workdir
            .clone()
            .unwrap_or_else(|| crate::config::default_workdir(args.cluster));
        let server_url = args
            .serverurl
            .clone()
            .or_else(|| settings.server.url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let package_dirs = PackageDirs::for_pipeline(
            &pkg_repository(args.pipeline_dir.as_deref(), &settings),
            &args.pipeline,
        );

        Ok(Self {
            isf_args: parse_pairs("isf_args", &args.isf_args)?,
            config_args: parse_pairs("config_args", &args.config_args)?,
            pipeline: args.pipeline,
            isf: args.isf,
            config: args.config,
            server_url,
            workdir: std::path::absolute(&workdir)?,
            logdir: args
                .logdir
                .unwrap_or_else(|| crate::config::DEFAULT_LOGDIR.to_string()),
            cluster: args.cluster,
            package_dirs,
            settings,
        })
    }
}

pub struct PipelineSubmitter {
    runner: Arc<dyn ProcessRunner>,
}

impl PipelineSubmitter {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Prepare the run's ISF and hand it to the server
    pub async fn submit(&self, request: &SubmitRequest) -> Result<RunSpec> {
        if !request.package_dirs.pipeline_exists() {
            error!(
                "Pipeline '{}' cannot be found. Expected location: {}",
                request.pipeline, request.package_dirs.pipeline_dir
            );
        }

        let run = self.prepare_isf(request)?;
        let (program, leading_args) = request.settings.server_runner_command()?;
        let command = ProcessCommandBuilder::launcher(&program, &leading_args)
            .option("pipeline", &format!("{}.py", request.pipeline))
            .option("data", &run.path.to_string_lossy())
            .option("serverurl", &request.server_url)
            .current_dir(&request.workdir)
            .build();
        info!("Calling pipeline runner: '{}'", command);

        let output = self.runner.run(command).await?;
        if !output.status.success() {
            return Err(PipelineError::StageFailed {
                executable: program,
                reason: format!("{} {}", output.status, output.stderr.trim()),
            });
        }
        Ok(run)
    }

    fn prepare_isf(&self, request: &SubmitRequest) -> Result<RunSpec> {
        let builder = WorkspaceBuilder::new(&request.logdir).cluster(request.cluster);
        let slot = builder.ensure_workspace(&request.workdir)?;
        let search_path = SearchPath::single(&request.workdir);

        let isf_path = resolve(&request.isf, &search_path)
            .map_err(|_| PipelineError::dependency(&request.isf, search_path.to_string()))?;
        let template = Isf::read(&isf_path)?;

        let pipeline_config = if request.config.is_some() || !request.config_args.is_empty() {
            Some(create_pipeline_config(
                request.config.as_deref(),
                &request.config_args,
                &request.workdir,
                &search_path,
            )?)
        } else {
            None
        };

        let optional_ports = optional_ports_for(&request.pipeline)
            .iter()
            .map(|p| p.to_string())
            .chain(request.settings.optional_ports.iter().cloned());

        let resolver = match &request.settings.mdb_keys {
            Some(keys) => DependencyClosureResolver::new().with_mdb_keys(keys.clone()),
            None => DependencyClosureResolver::new(),
        };

        let materializer = RunSpecMaterializer::new(request.package_dirs.clone())
            .with_resolver(resolver)
            .with_optional_ports(optional_ports);
        let inputs = RunInputs {
            pipeline_config,
            ..RunInputs::default()
        };
        materializer.materialize(&template, &request.isf_args, &slot, &search_path, &inputs)
    }
}
