//! Stage chains: per-simulation processing and the final reduction

use super::executor::StageExecutor;
use super::kind::{StageInvocation, StageKind};
use crate::error::{PipelineError, Result};
use crate::isf::{RunSpec, MDB_PORT, PIPELINE_CONFIG_KEY};
use crate::workspace::WorkerSlot;
use std::path::Path;
use tracing::info;

pub const SIMULATION_CONFIG_PORT: &str = "simulation_config";
pub const BFD_TRAINING_DATA_PORT: &str = "bfd_training_data";

/// Training-data ports forwarded to shear estimation when set
pub const TRAINING_DATA_PORTS: [&str; 5] = [
    BFD_TRAINING_DATA_PORT,
    "ksb_training_data",
    "lensmc_training_data",
    "momentsml_training_data",
    "regauss_training_data",
];

pub const DATA_IMAGES: &str = "data/data_images.json";
pub const STACKED_IMAGE: &str = "data/stacked_image.xml";
pub const PSF_IMAGES_AND_TABLES: &str = "data/psf_images_and_tables.json";
pub const SEGMENTATION_IMAGES: &str = "data/segmentation_images.json";
pub const STACKED_SEGMENTATION_IMAGE: &str = "data/stacked_segm_image.xml";
pub const DETECTIONS_TABLES: &str = "data/detections_tables.json";
pub const DETAILS_TABLE: &str = "data/details_table.xml";
pub const SHEAR_ESTIMATES: &str = "data/shear_estimates_product.xml";
pub const SHEAR_BIAS_STATISTICS: &str = "data/shear_bias_statistics.xml";

pub const FINAL_MEASUREMENTS: &str = "data/shear_bias_measurements_final.xml";
pub const FINAL_RESIDUALS: &str = "data/shear_bias_residuals_measurements_final.xml";

/// Output of simulation `n`, relative to its worker's workdir
pub fn measurements_filename(simulation_index: usize) -> String {
    format!("data/shear_bias_measurements_sim{simulation_index}.xml")
}

/// Files produced by the reduction, relative to the parent workdir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionOutputs {
    pub measurements: String,
    pub residuals: Option<String>,
}

#[derive(Clone)]
pub struct StageChain {
    executor: StageExecutor,
    est_shear_only: bool,
}

impl StageChain {
    pub fn new(executor: StageExecutor, est_shear_only: bool) -> Self {
        Self {
            executor,
            est_shear_only,
        }
    }

    pub fn executor(&self) -> &StageExecutor {
        &self.executor
    }

    /// Run the stages of one simulation inside `slot`.
    ///
    /// Returns the workdir-relative measurements file, or `None` when the
    /// chain stops after shear estimation.
    pub async fn run_simulation(
        &self,
        run: &RunSpec,
        slot: &WorkerSlot,
        simulation_index: usize,
    ) -> Result<Option<String>> {
        let workdir = slot.workdir.as_path();
        let logdir = Some(slot.logdir.as_path());
        let simulation_config = run.port(SIMULATION_CONFIG_PORT).ok_or_else(|| {
            PipelineError::Config(format!(
                "No {SIMULATION_CONFIG_PORT} for simulation {simulation_index}"
            ))
        })?;
        let pipeline_config = run.port(PIPELINE_CONFIG_KEY);
        let mdb = run.port(MDB_PORT);

        info!("Simulating images for simulation {}", simulation_index);
        let simulate = StageInvocation::new(StageKind::Simulate)
            .flag("config_files", simulation_config)
            .optional_flag("pipeline_config", pipeline_config)
            .flag("data_images", DATA_IMAGES)
            .flag("stacked_data_image", STACKED_IMAGE)
            .flag("psf_images_and_tables", PSF_IMAGES_AND_TABLES)
            .flag("segmentation_images", SEGMENTATION_IMAGES)
            .flag("stacked_segmentation_image", STACKED_SEGMENTATION_IMAGE)
            .flag("detections_tables", DETECTIONS_TABLES)
            .flag("details_table", DETAILS_TABLE);
        self.executor.invoke(&simulate, workdir, logdir).await?;

        let mut estimate = StageInvocation::new(StageKind::EstimateShear)
            .flag("data_images", DATA_IMAGES)
            .flag("stacked_image", STACKED_IMAGE)
            .flag("psf_images_and_tables", PSF_IMAGES_AND_TABLES)
            .flag("segmentation_images", SEGMENTATION_IMAGES)
            .flag("stacked_segmentation_image", STACKED_SEGMENTATION_IMAGE)
            .flag("detections_tables", DETECTIONS_TABLES);
        for port in TRAINING_DATA_PORTS {
            estimate = estimate.optional_flag(port, run.port(port));
        }
        let estimate = estimate
            .optional_flag("pipeline_config", pipeline_config)
            .optional_flag("mdb", mdb)
            .flag("shear_estimates_product", SHEAR_ESTIMATES);
        self.executor.invoke(&estimate, workdir, logdir).await?;

        if let Some(bfd_training_data) = run.port(BFD_TRAINING_DATA_PORT) {
            let integrate = StageInvocation::new(StageKind::Integrate)
                .flag("shear_estimates_product", SHEAR_ESTIMATES)
                .flag("bfd_training_data", bfd_training_data)
                .optional_flag("pipeline_config", pipeline_config)
                .optional_flag("mdb", mdb)
                .flag("shear_estimates_product_update", SHEAR_ESTIMATES);
            self.executor.invoke(&integrate, workdir, logdir).await?;
        }

        if self.est_shear_only {
            info!("Shear estimated for simulation {}; stopping", simulation_index);
            return Ok(None);
        }

        let statistics = StageInvocation::new(StageKind::MeasureStatistics)
            .flag("details_table", DETAILS_TABLE)
            .flag("shear_estimates", SHEAR_ESTIMATES)
            .optional_flag("pipeline_config", pipeline_config)
            .flag("shear_bias_statistics", SHEAR_BIAS_STATISTICS);
        self.executor.invoke(&statistics, workdir, logdir).await?;

        let measurements = measurements_filename(simulation_index);
        let cleanup = StageInvocation::new(StageKind::Cleanup)
            .flag("simulation_config", simulation_config)
            .flag("data_images", DATA_IMAGES)
            .flag("stacked_data_image", STACKED_IMAGE)
            .flag("psf_images_and_tables", PSF_IMAGES_AND_TABLES)
            .flag("segmentation_images", SEGMENTATION_IMAGES)
            .flag("stacked_segmentation_image", STACKED_SEGMENTATION_IMAGE)
            .flag("detections_tables", DETECTIONS_TABLES)
            .flag("details_table", DETAILS_TABLE)
            .flag("shear_estimates", SHEAR_ESTIMATES)
            .flag("shear_bias_statistics_in", SHEAR_BIAS_STATISTICS)
            .optional_flag("pipeline_config", pipeline_config)
            .flag("shear_bias_statistics_out", measurements.as_str());
        self.executor.invoke(&cleanup, workdir, logdir).await?;

        info!("Completed stage chain for simulation {}", simulation_index);
        Ok(Some(measurements))
    }

    /// Reduce the aggregate listfile into the final bias measurements
    pub async fn reduce(
        &self,
        workdir: &Path,
        aggregate_listfile: &str,
        pipeline_config: &str,
        residuals: bool,
        print_bias: bool,
    ) -> Result<ReductionOutputs> {
        info!("Running final bias measurement: output in {}", FINAL_MEASUREMENTS);
        let measure = StageInvocation::new(StageKind::MeasureBias)
            .flag("shear_bias_statistics", aggregate_listfile)
            .flag("pipeline_config", pipeline_config)
            .flag("shear_bias_measurements", FINAL_MEASUREMENTS);
        self.executor.invoke(&measure, workdir, None).await?;

        let residuals = if residuals {
            info!("Measuring bias calibration residuals: output in {}", FINAL_RESIDUALS);
            let measure = StageInvocation::new(StageKind::MeasureBiasResiduals)
                .flag("shear_bias_statistics", aggregate_listfile)
                .flag("pipeline_config", pipeline_config)
                .flag("shear_bias_residuals_measurements", FINAL_RESIDUALS);
            self.executor.invoke(&measure, workdir, None).await?;
            Some(FINAL_RESIDUALS.to_string())
        } else {
            None
        };

        if print_bias {
            let print = StageInvocation::new(StageKind::PrintBias)
                .flag("shear_bias_measurements", FINAL_MEASUREMENTS);
            let output = self.executor.invoke(&print, workdir, None).await?;
            for line in output.stdout.lines() {
                info!("{}", line);
            }
        }

        Ok(ReductionOutputs {
            measurements: FINAL_MEASUREMENTS.to_string(),
            residuals,
        })
    }
}
