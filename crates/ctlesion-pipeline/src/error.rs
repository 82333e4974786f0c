//! Error types for the workflows.

use std::fmt;
use serde::Serialize;
use thiserror::Error;

/// Boxed engine error carried by [`PipelineError::Stage`].
pub type EngineError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Workflow step that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Load,
    DeviceRemoval,
    SkullExtraction,
    IntensityBounding,
    AffineRegistration,
    AffinePropagation,
    ExclusionMask,
    DeformableRegistration,
    DeformablePropagation,
    AgeLookup,
    VentricleRemoval,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::DeviceRemoval => "device removal",
            Stage::SkullExtraction => "skull extraction",
            Stage::IntensityBounding => "intensity bounding",
            Stage::AffineRegistration => "affine registration",
            Stage::AffinePropagation => "affine propagation",
            Stage::ExclusionMask => "exclusion mask",
            Stage::DeformableRegistration => "deformable registration",
            Stage::DeformablePropagation => "deformable propagation",
            Stage::AgeLookup => "age lookup",
            Stage::VentricleRemoval => "ventricle removal",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Main error type for the workflows.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad arguments, missing files or templates. Raised before any stage runs.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Volumes that must share a voxel grid do not.
    #[error("Space mismatch: {0}")]
    SpaceMismatch(String),

    /// Missing or unusable subject metadata.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// An engine failed inside a stage.
    #[error("Stage `{stage}` failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: EngineError,
    },
}

/// Result type for the workflows.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn space_mismatch(msg: impl Into<String>) -> Self {
        Self::SpaceMismatch(msg.into())
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn stage(stage: Stage, source: impl Into<EngineError>) -> Self {
        Self::Stage {
            stage,
            source: source.into(),
        }
    }

    /// The failing stage, if the error came from an engine.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Tags engine errors with the stage they happened in.
pub trait StageResultExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T, E: Into<EngineError>> StageResultExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| PipelineError::stage(stage, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctlesion_core::CoreError;
    use ctlesion_registration::RegistrationError;

    #[test]
    fn test_stage_tagging() {
        let failed: std::result::Result<(), RegistrationError> = Err(RegistrationError::NonConvergence {
            iterations: 10,
            initial_loss: -0.2,
            final_loss: -0.1,
        });
        let err = failed.stage(Stage::DeformableRegistration).unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::DeformableRegistration));
        assert!(err.to_string().starts_with("Stage `deformable registration` failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_anyhow_errors_are_tagged() {
        let failed: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let err = failed.stage(Stage::Persist).unwrap_err();
        assert!(err.to_string().contains("disk full"));

        let core: std::result::Result<(), CoreError> = Err(CoreError::SingularDirection);
        assert_eq!(core.stage(Stage::Load).unwrap_err().failed_stage(), Some(Stage::Load));
    }

    #[test]
    fn test_input_errors_have_no_stage() {
        assert_eq!(PipelineError::invalid_input("missing CT").failed_stage(), None);
    }
}
