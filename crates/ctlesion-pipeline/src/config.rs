//! Workflow settings.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use ctlesion_registration::AffineSearchConfig;
use serde::{Deserialize, Serialize};
use crate::error::{PipelineError, Result};

/// Settings of the optional scanner-device removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRemovalConfig {
    pub enabled: bool,
    /// Voxels above this value (HU) belong to the head mask.
    pub head_threshold: f64,
    /// Value written outside the kept head component (HU).
    pub air_value: f64,
}

impl Default for DeviceRemovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            head_threshold: -500.0,
            air_value: -1024.0,
        }
    }
}

/// Template the deformable stage registers onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeformableTarget {
    /// `MNI152_T1_1mm.nii.gz`
    #[default]
    WholeHead,
    /// `MNI152_T1_1mm_brain.nii.gz`
    Brain,
}

impl fmt::Display for DeformableTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WholeHead => write!(f, "whole-head"),
            Self::Brain => write!(f, "brain"),
        }
    }
}

impl FromStr for DeformableTarget {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "whole-head" | "whole_head" => Ok(Self::WholeHead),
            "brain" => Ok(Self::Brain),
            other => Err(PipelineError::invalid_input(format!(
                "unknown deformable target `{}` (expected `whole-head` or `brain`)",
                other
            ))),
        }
    }
}

/// Settings of the lesion and CT-only workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bone threshold of the skull extraction (HU, inclusive).
    pub skull_threshold: f64,
    /// Skull components smaller than this many voxels are ignored.
    pub skull_min_size: usize,
    /// Hounsfield window of the contrast-stretched volume.
    pub intensity_window: [f64; 2],
    pub device_removal: DeviceRemovalConfig,
    pub affine: AffineSearchConfig,
    /// Fixed volume of the deformable stage.
    pub deformable_target: DeformableTarget,
    /// Write the artifacts that only feed later stages.
    pub keep_intermediates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            skull_threshold: 700.0,
            skull_min_size: 1,
            intensity_window: [0.0, 100.0],
            device_removal: DeviceRemovalConfig::default(),
            affine: AffineSearchConfig::default(),
            deformable_target: DeformableTarget::default(),
            keep_intermediates: true,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skull_threshold(mut self, threshold: f64) -> Self {
        self.skull_threshold = threshold;
        self
    }

    pub fn with_skull_min_size(mut self, min_size: usize) -> Self {
        self.skull_min_size = min_size;
        self
    }

    pub fn with_intensity_window(mut self, lower: f64, upper: f64) -> Self {
        self.intensity_window = [lower, upper];
        self
    }

    pub fn with_device_removal(mut self, enabled: bool) -> Self {
        self.device_removal.enabled = enabled;
        self
    }

    pub fn with_affine(mut self, affine: AffineSearchConfig) -> Self {
        self.affine = affine;
        self
    }

    pub fn with_deformable_target(mut self, target: DeformableTarget) -> Self {
        self.deformable_target = target;
        self
    }

    pub fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    /// Load settings from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::invalid_input(format!("cannot read config {}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| PipelineError::invalid_input(format!("config {}: {}", path.display(), e)))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| PipelineError::invalid_input(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::invalid_input(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let [lower, upper] = self.intensity_window;
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(PipelineError::invalid_input(format!(
                "intensity window [{}, {}] is not an interval",
                lower, upper
            )));
        }
        if !self.skull_threshold.is_finite() {
            return Err(PipelineError::invalid_input("skull threshold must be finite"));
        }
        if !self.device_removal.head_threshold.is_finite() || !self.device_removal.air_value.is_finite() {
            return Err(PipelineError::invalid_input("device removal values must be finite"));
        }
        self.affine
            .validate()
            .map_err(|e| PipelineError::invalid_input(format!("affine settings: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.skull_threshold, 700.0);
        assert_eq!(config.intensity_window, [0.0, 100.0]);
        assert!(config.device_removal.enabled);
        assert_eq!(config.affine.num_bins, 256);
        assert_eq!(config.affine.search_range_degrees, [-180.0, 180.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{ "skull_threshold": 650.0, "device_removal": { "enabled": false }, "affine": { "iterations": 10 } }"#,
        )
        .unwrap();
        assert_eq!(config.skull_threshold, 650.0);
        assert!(!config.device_removal.enabled);
        assert_eq!(config.device_removal.air_value, -1024.0);
        assert_eq!(config.affine.iterations, 10);
        assert_eq!(config.affine.num_bins, 256);
    }

    #[test]
    fn test_deformable_target() {
        assert_eq!(PipelineConfig::default().deformable_target, DeformableTarget::WholeHead);
        let config = PipelineConfig::from_json(r#"{ "deformable_target": "brain" }"#).unwrap();
        assert_eq!(config.deformable_target, DeformableTarget::Brain);
        assert_eq!("whole-head".parse::<DeformableTarget>().unwrap(), DeformableTarget::WholeHead);
        assert_eq!(DeformableTarget::Brain.to_string(), "brain");
        assert!(matches!("skull".parse::<DeformableTarget>(), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig::default()
            .with_keep_intermediates(false)
            .with_intensity_window(-10.0, 90.0)
            .with_deformable_target(DeformableTarget::Brain);
        let parsed = PipelineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_values_are_input_errors() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{ "intensity_window": [100.0, 0.0] }"#),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(PipelineConfig::from_json("{ not json"), Err(PipelineError::InvalidInput(_))));
        assert!(matches!(
            PipelineConfig::from_json(r#"{ "affine": { "num_bins": 1 } }"#),
            Err(PipelineError::InvalidInput(_))
        ));
    }
}
