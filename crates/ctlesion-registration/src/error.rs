//! Error types for registration operations.

use ctlesion_core::error::CoreError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Error in metric computation.
    #[error("Metric error: {0}")]
    MetricError(String),

    /// Error in transform operation.
    #[error("Transform error: {0}")]
    TransformError(String),

    /// Error in image validation.
    #[error("Image validation error: {0}")]
    ImageValidationError(String),

    /// Numerical instability detected.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// The optimization ended with a non-finite loss, or a loss worse than
    /// where it started.
    #[error("Registration did not converge after {iterations} iterations (initial loss {initial_loss}, final loss {final_loss})")]
    NonConvergence {
        iterations: usize,
        initial_loss: f64,
        final_loss: f64,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Volume, resampling or transform failure from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a metric error.
    pub fn metric(msg: impl Into<String>) -> Self {
        Self::MetricError(msg.into())
    }

    /// Create a transform error.
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::TransformError(msg.into())
    }

    /// Create an image validation error.
    pub fn image_validation(msg: impl Into<String>) -> Self {
        Self::ImageValidationError(msg.into())
    }

    /// Create a numerical instability error.
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::metric("test error");
        assert_eq!(err.to_string(), "Metric error: test error");
    }

    #[test]
    fn test_non_convergence_display() {
        let err = RegistrationError::NonConvergence {
            iterations: 250,
            initial_loss: -0.5,
            final_loss: f64::NAN,
        };
        let msg = err.to_string();
        assert!(msg.contains("250 iterations"));
        assert!(msg.contains("NaN"));
    }

    #[test]
    fn test_core_errors_convert() {
        let err: RegistrationError = CoreError::SingularDirection.into();
        assert!(matches!(err, RegistrationError::Core(CoreError::SingularDirection)));
    }
}
