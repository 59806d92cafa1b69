//! Batch-parallel bias-measurement runs
//!
//! A run moves through `INIT -> PLAN -> (MATERIALIZE -> DISPATCH -> MERGE)* ->
//! REDUCE -> DONE`. Batches are strictly sequential: batch `b + 1` is only
//! materialized once batch `b` has been merged. Any error ends the run.

use crate::batch::{effective_concurrency, plan, work_units, Batch, WorkUnit};
use crate::config::{create_pipeline_config, save_args, RunnerConfig};
use crate::error::{PipelineError, Result};
use crate::isf::{optional_ports_for, Isf, RunInputs, RunSpec, RunSpecMaterializer};
use crate::merge::{MergeReport, OutputMerger, AGGREGATE_LISTFILE};
use crate::product::{is_null, read_listfile, DependencyClosureResolver};
use crate::stage::{
    measurements_filename, ReductionOutputs, StageChain, StageExecutor, StageInvocation,
    StageKind, SIMULATION_CONFIG_PORT,
};
use crate::subprocess::ProcessRunner;
use crate::supervisor::{BatchReport, WorkerSpec, WorkerSupervisor};
use crate::workspace::{
    remove_stale, resolve, SearchPath, WorkerSlot, WorkerSlots, WorkspaceBuilder,
};
use futures::FutureExt;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pipeline whose package definition is recorded in every worker ISF
pub const BIAS_MEASUREMENT_PIPELINE: &str = "bias_measurement";

pub const SIMULATION_PLAN_PORT: &str = "simulation_plan";
pub const CONFIG_TEMPLATE_PORT: &str = "config_template";
pub const SIMULATION_CONFIGS_PORT: &str = "simulation_configs";

/// Listfile written by the config-preparation stage
pub const SIMULATION_CONFIGS_LISTFILE: &str = "data/sim_configs.json";

/// Ports consumed while planning; workers get their own `simulation_config`
const PLANNING_PORTS: [&str; 3] = [
    SIMULATION_PLAN_PORT,
    CONFIG_TEMPLATE_PORT,
    SIMULATION_CONFIGS_PORT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Plan,
    Materialize(usize),
    Dispatch(usize),
    Merge(usize),
    Reduce,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Init => write!(f, "INIT"),
            RunPhase::Plan => write!(f, "PLAN"),
            RunPhase::Materialize(b) => write!(f, "MATERIALIZE batch {b}"),
            RunPhase::Dispatch(b) => write!(f, "DISPATCH batch {b}"),
            RunPhase::Merge(b) => write!(f, "MERGE batch {b}"),
            RunPhase::Reduce => write!(f, "REDUCE"),
            RunPhase::Done => write!(f, "DONE"),
        }
    }
}

/// How one batch went
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch: Batch,
    pub workers: BatchReport,
    /// `None` when merging is skipped (`est_shear_only`)
    pub merge: Option<MergeReport>,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub total_units: usize,
    pub batches: Vec<BatchSummary>,
    /// Entries of the aggregate listfile after the last merge
    pub aggregate_entries: usize,
    pub outputs: Option<ReductionOutputs>,
}

impl RunReport {
    pub fn failed_workers(&self) -> usize {
        self.batches.iter().map(|b| b.workers.failed()).sum()
    }
}

/// State established by `INIT` and shared by every later phase
struct RunContext {
    workdir: PathBuf,
    search_path: SearchPath,
    /// Base ISF with `--isf_args` applied
    isf: Isf,
    pipeline_config: String,
    builder: WorkspaceBuilder,
}

/// One worker's materialized inputs for the current batch
#[derive(Debug, Clone)]
struct Assignment {
    worker: usize,
    run: RunSpec,
    slot: WorkerSlot,
}

pub struct PipelineRunner {
    config: RunnerConfig,
    chain: StageChain,
    supervisor: WorkerSupervisor,
    merger: OutputMerger,
    resolver: DependencyClosureResolver,
}

impl PipelineRunner {
    pub fn new(config: RunnerConfig, runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        let executor = StageExecutor::new(runner, &config.settings)?;
        let resolver = match &config.settings.mdb_keys {
            Some(keys) => DependencyClosureResolver::new().with_mdb_keys(keys.clone()),
            None => DependencyClosureResolver::new(),
        };
        Ok(Self {
            chain: StageChain::new(executor, config.est_shear_only),
            supervisor: WorkerSupervisor::new(config.policy),
            merger: OutputMerger::new(resolver.clone()),
            resolver,
            config,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Drive the run to completion
    pub async fn run(&self) -> Result<RunReport> {
        enter(RunPhase::Init);
        let ctx = self.init()?;

        enter(RunPhase::Plan);
        let configs_listfile = self.simulation_configs(&ctx).await?;
        let units = self.read_units(&ctx, &configs_listfile)?;
        let concurrency = effective_concurrency(self.config.concurrency, units.len());
        let batches = plan(units.len(), concurrency)?;
        info!(
            "Planned {} simulations in {} batches of up to {} workers",
            units.len(),
            batches.len(),
            concurrency
        );
        let slots = ctx.builder.build_slots(
            &ctx.workdir,
            concurrency,
            self.config.isolation,
            batches.len(),
        )?;

        let aggregate_listfile = ctx.workdir.join(AGGREGATE_LISTFILE);
        let mut summaries = Vec::with_capacity(batches.len());
        for batch in &batches {
            enter(RunPhase::Materialize(batch.batch_number));
            let assignments = self.materialize_batch(&ctx, &slots, batch, &units)?;

            enter(RunPhase::Dispatch(batch.batch_number));
            let workers = self.dispatch(batch, assignments).await?;

            let merge = if self.config.est_shear_only {
                None
            } else {
                enter(RunPhase::Merge(batch.batch_number));
                Some(
                    self.merger
                        .merge(&slots, batch, &aggregate_listfile, &ctx.workdir)?,
                )
            };

            summaries.push(BatchSummary {
                batch: *batch,
                workers,
                merge,
            });
        }

        let mut report = RunReport {
            total_units: units.len(),
            batches: summaries,
            aggregate_entries: 0,
            outputs: None,
        };

        if self.config.est_shear_only {
            info!("Shear estimation only; skipping bias measurement");
            enter(RunPhase::Done);
            return Ok(report);
        }

        report.aggregate_entries = if aggregate_listfile.exists() {
            read_listfile(&aggregate_listfile)?.len()
        } else {
            0
        };
        if report.aggregate_entries < report.total_units {
            warn!(
                "Only {} of {} simulations produced measurements",
                report.aggregate_entries, report.total_units
            );
        }

        enter(RunPhase::Reduce);
        report.outputs = Some(
            self.chain
                .reduce(
                    &ctx.workdir,
                    AGGREGATE_LISTFILE,
                    &ctx.pipeline_config,
                    self.config.residuals,
                    self.config.print_bias,
                )
                .await?,
        );

        enter(RunPhase::Done);
        Ok(report)
    }

    fn init(&self) -> Result<RunContext> {
        let isf_name = self.config.require_isf()?;
        let builder = WorkspaceBuilder::new(&self.config.logdir)
            .cluster(self.config.cluster)
            .with_app_root(self.config.app_workdir.clone());
        let root = builder.ensure_workspace(&self.config.workdir)?;
        let workdir = root.workdir;

        let stale = workdir.join(AGGREGATE_LISTFILE);
        if stale.exists() {
            info!("Removing aggregate listfile left by an earlier run: {}", stale.display());
            std::fs::remove_file(&stale)?;
        }

        save_args(&self.config.args, &workdir)?;

        let search_path = SearchPath::for_workdir(&workdir);
        let isf_path = resolve(isf_name, &search_path)
            .map_err(|_| PipelineError::dependency(isf_name, search_path.to_string()))?;
        let mut isf = Isf::read(&isf_path)?;
        for (key, value) in &self.config.isf_args {
            isf.set(key.as_str(), value.as_str());
        }

        let pipeline_config = create_pipeline_config(
            self.config.config.as_deref(),
            &self.config.config_args,
            &workdir,
            &search_path,
        )?;

        Ok(RunContext {
            workdir,
            search_path,
            isf,
            pipeline_config,
            builder,
        })
    }

    /// Workdir-relative listfile of simulation configurations.
    ///
    /// Generated from `simulation_plan` and `config_template` when the ISF
    /// names both, otherwise taken from `simulation_configs`.
    async fn simulation_configs(&self, ctx: &RunContext) -> Result<String> {
        let port = |key: &str| ctx.isf.get(key).filter(|v| !is_null(v));

        if let (Some(plan), Some(template)) =
            (port(SIMULATION_PLAN_PORT), port(CONFIG_TEMPLATE_PORT))
        {
            let template = resolve(template, &ctx.search_path)
                .map_err(|_| PipelineError::dependency(template, ctx.search_path.to_string()))?;
            let plan = resolve(plan, &ctx.search_path)
                .map_err(|_| PipelineError::dependency(plan, ctx.search_path.to_string()))?;

            let mut plan_args = Vec::new();
            if !self.config.plan_args.is_empty() {
                plan_args.push("--plan_args".to_string());
                for (key, value) in &self.config.plan_args {
                    plan_args.push(key.clone());
                    plan_args.push(value.clone());
                }
            }

            info!("Preparing simulation configurations");
            let prepare = StageInvocation::new(StageKind::PrepareConfigs)
                .flag("simulation_plan", plan.to_string_lossy())
                .flag("config_template", template.to_string_lossy())
                .flag("pipeline_config", ctx.pipeline_config.as_str())
                .flag("simulation_configs", SIMULATION_CONFIGS_LISTFILE)
                .extra_args(plan_args);
            self.chain
                .executor()
                .invoke(&prepare, &ctx.workdir, None)
                .await?;
            return Ok(SIMULATION_CONFIGS_LISTFILE.to_string());
        }

        if !self.config.plan_args.is_empty() {
            warn!("--plan_args ignored: the ISF names no simulation_plan");
        }

        port(SIMULATION_CONFIGS_PORT)
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "ISF must name either {SIMULATION_PLAN_PORT} and {CONFIG_TEMPLATE_PORT}, or {SIMULATION_CONFIGS_PORT}"
                ))
            })
    }

    fn read_units(&self, ctx: &RunContext, listfile: &str) -> Result<Vec<WorkUnit>> {
        let path = resolve(listfile, &ctx.search_path)
            .map_err(|_| PipelineError::dependency(listfile, ctx.search_path.to_string()))?;
        let units = work_units(read_listfile(&path)?);
        if units.is_empty() {
            return Err(PipelineError::Config(format!(
                "Simulation configuration listfile {} is empty",
                path.display()
            )));
        }
        Ok(units)
    }

    fn materialize_batch(
        &self,
        ctx: &RunContext,
        slots: &WorkerSlots,
        batch: &Batch,
        units: &[WorkUnit],
    ) -> Result<Vec<Assignment>> {
        let mut template = Isf::new();
        for (key, value) in ctx.isf.iter() {
            if !PLANNING_PORTS.contains(&key) {
                template.set(key, value);
            }
        }

        let materializer = RunSpecMaterializer::new(
            self.config.package_dirs(BIAS_MEASUREMENT_PIPELINE),
        )
        .with_resolver(self.resolver.clone())
        .with_optional_ports(
            optional_ports_for(BIAS_MEASUREMENT_PIPELINE)
                .iter()
                .map(|p| p.to_string())
                .chain(self.config.settings.optional_ports.iter().cloned()),
        )
        .with_shared_workdir(Some(ctx.workdir.clone()));

        let mut assignments = Vec::with_capacity(batch.worker_count);
        for worker in batch.workers() {
            let (Some(slot), Some(simulation_index)) =
                (slots.get(worker, batch.batch_number), batch.sim_number(worker))
            else {
                continue;
            };
            let unit = units.get(simulation_index).ok_or_else(|| {
                PipelineError::Config(format!("No simulation configuration for index {simulation_index}"))
            })?;

            remove_stale(&slot.workdir.join(measurements_filename(simulation_index)))?;

            let inputs = RunInputs {
                pipeline_config: Some(ctx.pipeline_config.clone()),
                simulation_index: Some(simulation_index),
                computed: vec![(
                    SIMULATION_CONFIG_PORT.to_string(),
                    unit.simulation_config_ref.clone(),
                )],
            };
            let run = materializer.materialize(&template, &[], slot, &ctx.search_path, &inputs)?;
            debug!(
                "Worker {} gets simulation {} ({})",
                worker,
                simulation_index,
                run.path.display()
            );
            assignments.push(Assignment {
                worker,
                run,
                slot: slot.clone(),
            });
        }
        Ok(assignments)
    }

    async fn dispatch(&self, batch: &Batch, assignments: Vec<Assignment>) -> Result<BatchReport> {
        let chain = self.chain.clone();
        let assignments = Arc::new(assignments);

        self.supervisor
            .run_batch(batch, move |spec: WorkerSpec| {
                let chain = chain.clone();
                let assignments = Arc::clone(&assignments);
                async move {
                    let assignment = assignments
                        .iter()
                        .find(|a| a.worker == spec.worker)
                        .ok_or_else(|| PipelineError::WorkerFailure {
                            slot: spec.worker,
                            simulation_index: spec.simulation_index,
                            reason: "no materialized inputs".to_string(),
                        })?;
                    chain
                        .run_simulation(&assignment.run, &assignment.slot, spec.simulation_index)
                        .await
                        .map_err(|e| PipelineError::WorkerFailure {
                            slot: spec.worker,
                            simulation_index: spec.simulation_index,
                            reason: e.to_string(),
                        })?;
                    Ok::<(), PipelineError>(())
                }
                .boxed()
            })
            .await
    }
}

fn enter(phase: RunPhase) {
    info!("Entering {}", phase);
}
