//! Shared fixtures: a workdir with simulation configs and a fake launcher

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Stand-in for the versioned launcher: `<package> <version> <executable> --flag value ...`.
///
/// Writes each declared output of the executable relative to the current
/// directory and fails when any flag value contains `FAIL`.
pub const FAKE_LAUNCHER: &str = r#"#!/bin/sh
exe="$3"
shift 3
case "$exe" in
  SHE_GST_PrepareConfigs) outputs="simulation_configs" ;;
  SHE_GST_GenGalaxyImages) outputs="data_images stacked_data_image psf_images_and_tables segmentation_images stacked_segmentation_image detections_tables details_table" ;;
  SHE_CTE_EstimateShear) outputs="shear_estimates_product" ;;
  SHE_CTE_BFDIntegrate) outputs="shear_estimates_product_update" ;;
  SHE_CTE_MeasureStatistics) outputs="shear_bias_statistics" ;;
  SHE_CTE_CleanupBiasMeasurement) outputs="shear_bias_statistics_out" ;;
  SHE_CTE_MeasureBias) outputs="shear_bias_measurements" ;;
  SHE_CTE_MeasureBiasCalibrationResiduals) outputs="shear_bias_residuals_measurements" ;;
  *) outputs="" ;;
esac
while [ $# -gt 1 ]; do
  flag="${1#--}"
  value="$2"
  shift 2
  case "$value" in
    *FAIL*) echo "ERROR: $exe cannot read $value" >&2; exit 1 ;;
  esac
  for output in $outputs; do
    if [ "$flag" = "$output" ]; then
      mkdir -p "$(dirname "$value")"
      if [ "$exe" = "SHE_GST_PrepareConfigs" ]; then
        echo '<SimulationConfig/>' > data/generated_0.xml
        echo '<SimulationConfig/>' > data/generated_1.xml
        echo '["data/generated_0.xml", "data/generated_1.xml"]' > "$value"
      else
        echo '<product/>' > "$value"
      fi
    fi
  done
done
echo "$exe finished"
"#;

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    /// Workdir holding `configs` simulation configurations, a bias ISF and a
    /// settings file pointing at the fake launcher
    pub fn with_configs(configs: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir(root.join("data")).unwrap();

        let entries: Vec<String> = configs.iter().map(|c| format!("data/{c}")).collect();
        for entry in &entries {
            std::fs::write(root.join(entry), "<SimulationConfig/>").unwrap();
        }
        std::fs::write(
            root.join("data/sim_configs.json"),
            serde_json::to_string(&entries).unwrap(),
        )
        .unwrap();
        std::fs::write(
            root.join("bias_isf.txt"),
            "# bias measurement inputs\nsimulation_configs=data/sim_configs.json\nmdb=None\nbfd_training_data=None\n",
        )
        .unwrap();

        let launcher = root.join("fake_erun.sh");
        std::fs::write(&launcher, FAKE_LAUNCHER).unwrap();
        std::fs::write(
            root.join("settings.toml"),
            format!(
                "spawn_retry_delay_secs = 1\n\n[launcher]\nprogram = \"sh {}\"\n",
                launcher.display()
            ),
        )
        .unwrap();

        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn settings(&self) -> PathBuf {
        self.path("settings.toml")
    }

    pub fn write(&self, relative: &str, content: &str) {
        std::fs::write(self.path(relative), content).unwrap();
    }
}
