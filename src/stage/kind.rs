//! The external executables of the bias-measurement pipeline

use crate::config::settings::{SHE_CTE, SHE_GST};
use std::fmt;

/// One external pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    PrepareConfigs,
    Simulate,
    EstimateShear,
    Integrate,
    MeasureStatistics,
    Cleanup,
    MeasureBias,
    MeasureBiasResiduals,
    PrintBias,
}

/// Static description of how a stage is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub package: &'static str,
    pub executable: &'static str,
    /// Flags every invocation must carry
    pub required_flags: &'static [&'static str],
    /// Flags naming files the stage must leave behind
    pub output_flags: &'static [&'static str],
    pub takes_logdir: bool,
}

const SIMULATED_PRODUCTS: [&str; 7] = [
    "data_images",
    "stacked_data_image",
    "psf_images_and_tables",
    "segmentation_images",
    "stacked_segmentation_image",
    "detections_tables",
    "details_table",
];

impl StageKind {
    pub const PER_SIMULATION: [StageKind; 5] = [
        StageKind::Simulate,
        StageKind::EstimateShear,
        StageKind::Integrate,
        StageKind::MeasureStatistics,
        StageKind::Cleanup,
    ];

    pub fn spec(self) -> StageSpec {
        match self {
            StageKind::PrepareConfigs => StageSpec {
                package: SHE_GST,
                executable: "SHE_GST_PrepareConfigs",
                required_flags: &["simulation_plan", "config_template", "simulation_configs"],
                output_flags: &["simulation_configs"],
                takes_logdir: false,
            },
            StageKind::Simulate => StageSpec {
                package: SHE_GST,
                executable: "SHE_GST_GenGalaxyImages",
                required_flags: &[
                    "config_files",
                    "pipeline_config",
                    "data_images",
                    "stacked_data_image",
                    "psf_images_and_tables",
                    "segmentation_images",
                    "stacked_segmentation_image",
                    "detections_tables",
                    "details_table",
                ],
                output_flags: &SIMULATED_PRODUCTS,
                takes_logdir: true,
            },
            StageKind::EstimateShear => StageSpec {
                package: SHE_CTE,
                executable: "SHE_CTE_EstimateShear",
                required_flags: &[
                    "data_images",
                    "stacked_image",
                    "psf_images_and_tables",
                    "segmentation_images",
                    "stacked_segmentation_image",
                    "detections_tables",
                    "pipeline_config",
                    "shear_estimates_product",
                ],
                output_flags: &["shear_estimates_product"],
                takes_logdir: true,
            },
            StageKind::Integrate => StageSpec {
                package: SHE_CTE,
                executable: "SHE_CTE_BFDIntegrate",
                required_flags: &[
                    "shear_estimates_product",
                    "bfd_training_data",
                    "pipeline_config",
                    "shear_estimates_product_update",
                ],
                output_flags: &["shear_estimates_product_update"],
                takes_logdir: true,
            },
            StageKind::MeasureStatistics => StageSpec {
                package: SHE_CTE,
                executable: "SHE_CTE_MeasureStatistics",
                required_flags: &[
                    "details_table",
                    "shear_estimates",
                    "pipeline_config",
                    "shear_bias_statistics",
                ],
                output_flags: &["shear_bias_statistics"],
                takes_logdir: true,
            },
            StageKind::Cleanup => StageSpec {
                package: SHE_CTE,
                executable: "SHE_CTE_CleanupBiasMeasurement",
                required_flags: &[
                    "simulation_config",
                    "data_images",
                    "stacked_data_image",
                    "psf_images_and_tables",
                    "segmentation_images",
                    "stacked_segmentation_image",
                    "detections_tables",
                    "details_table",
                    "shear_estimates",
                    "shear_bias_statistics_in",
                    "pipeline_config",
                    "shear_bias_statistics_out",
                ],
                output_flags: &["shear_bias_statistics_out"],
                takes_logdir: true,
            },
            StageKind::MeasureBias => StageSpec {
                package: SHE_CTE,
                executable: "SHE_CTE_MeasureBias",
                required_flags: &["shear_bias_statistics", "pipeline_config", "shear_bias_measurements"],
                output_flags: &["shear_bias_measurements"],
                takes_logdir: false,
            },
            StageKind::MeasureBiasResiduals => StageSpec {
                package: SHE_CTE,
                executable: "SHE_CTE_MeasureBiasCalibrationResiduals",
                required_flags: &[
                    "shear_bias_statistics",
                    "pipeline_config",
                    "shear_bias_residuals_measurements",
                ],
                output_flags: &["shear_bias_residuals_measurements"],
                takes_logdir: false,
            },
            StageKind::PrintBias => StageSpec {
                package: SHE_CTE,
                executable: "SHE_CTE_PrintBias",
                required_flags: &["shear_bias_measurements"],
                output_flags: &[],
                takes_logdir: false,
            },
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec().executable)
    }
}

/// A stage together with the flag values of one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub kind: StageKind,
    pub flags: Vec<(String, String)>,
    /// Trailing arguments passed verbatim after the flags
    pub extra_args: Vec<String>,
}

impl StageInvocation {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            flags: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    pub fn flag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.flags.push((name.to_string(), value.into()));
        self
    }

    /// Add `name` only when a value is present
    pub fn optional_flag(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.flag(name, value),
            None => self,
        }
    }

    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(flag, _)| flag == name)
            .map(|(_, value)| value.as_str())
    }

    /// Required flags this invocation does not carry
    pub fn missing_flags(&self) -> Vec<&'static str> {
        self.kind
            .spec()
            .required_flags
            .iter()
            .copied()
            .filter(|flag| self.value(flag).map_or(true, str::is_empty))
            .collect()
    }
}
