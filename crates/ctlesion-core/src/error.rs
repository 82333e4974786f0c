//! Error types for volume and transform operations.

use thiserror::Error;
use crate::image::VolumeKind;

/// Errors raised by core volume, resampling and filter operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// An operation would break the semantics of a volume kind,
    /// e.g. trilinear resampling of a binary label volume.
    #[error("Volume kind violation in {operation}: {kind:?} volume cannot be processed with {detail}")]
    KindViolation {
        operation: &'static str,
        kind: VolumeKind,
        detail: String,
    },

    /// Two volumes that must share a voxel grid do not.
    #[error("Grid mismatch in {operation}: {detail}")]
    GridMismatch {
        operation: &'static str,
        detail: String,
    },

    /// The direction matrix of an image cannot be inverted.
    #[error("Singular direction matrix")]
    SingularDirection,

    /// Tensor data could not be read back to the host.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// Invalid argument passed to a filter or transform.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a grid mismatch error.
    pub fn grid_mismatch(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::GridMismatch {
            operation,
            detail: detail.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
