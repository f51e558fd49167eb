use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cost::CostConfig;
use crate::error::FillError;
use crate::fill::FillConfig;

/// Operator parameters of one batch run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory searched recursively for images
    pub input_root: PathBuf,
    /// Directory receiving masks; mirrors the input tree
    pub output_root: PathBuf,
    /// File name suffix selecting images (default ".nd2")
    pub suffix: String,
    pub fill: FillConfig,
    pub cost: CostConfig,
    /// Fill worker threads; 0 uses every logical CPU (default 0)
    pub workers: usize,
    /// Gzip the written volumes (default true)
    pub compress: bool,
    /// Also write the per-voxel minimum cost map (default false)
    pub write_cost_map: bool,
    /// Also write the source intensities inside the mask (default false)
    pub write_masked_intensity: bool,
    /// Where to write the JSON batch report, if anywhere
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_json: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("."),
            output_root: PathBuf::from("fills"),
            suffix: ".nd2".to_string(),
            fill: FillConfig::default(),
            cost: CostConfig::default(),
            workers: 0,
            compress: true,
            write_cost_map: false,
            write_masked_intensity: false,
            report_json: None,
        }
    }
}

impl BatchConfig {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), FillError> {
        if self.suffix.is_empty() {
            return Err(FillError::InvalidConfig("suffix must not be empty".into()));
        }
        self.fill.validate()?;
        self.cost.validate()
    }

    /// Extension of written volumes.
    pub fn output_extension(&self) -> &'static str {
        if self.compress {
            ".nii.gz"
        } else {
            ".nii"
        }
    }
}

pub fn load_config(path: &Path) -> Result<BatchConfig, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::StopPolicy;

    #[test]
    fn test_defaults() {
        let cfg = BatchConfig::default();
        assert_eq!(cfg.suffix, ".nd2");
        assert_eq!(cfg.fill.threshold, 0.01);
        assert_eq!(cfg.output_extension(), ".nii.gz");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: BatchConfig = serde_json::from_str(
            r#"{
                "input_root": "/data/in",
                "fill": { "threshold": 0.05, "stop": { "mode": "exhaustive", "node_budget": 1000 } },
                "compress": false
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.input_root, PathBuf::from("/data/in"));
        assert_eq!(cfg.output_root, PathBuf::from("fills"));
        assert_eq!(cfg.fill.threshold, 0.05);
        assert_eq!(cfg.fill.stop, StopPolicy::Exhaustive { node_budget: Some(1000) });
        assert_eq!(cfg.cost, CostConfig::default());
        assert_eq!(cfg.output_extension(), ".nii");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = BatchConfig::default();
        cfg.suffix.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = BatchConfig::default();
        cfg.fill.threshold = f64::NAN;
        assert!(matches!(cfg.validate(), Err(FillError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/batch.json")).unwrap_err();
        assert!(err.contains("Failed to read config"), "{}", err);
    }
}
