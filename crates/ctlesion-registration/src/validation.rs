//! Validation utilities for registration inputs, settings and results.

use burn::tensor::backend::Backend;
use ctlesion_core::image::Image;
use crate::error::{RegistrationError, Result};

/// Validate learning rate.
pub fn validate_learning_rate(lr: f64) -> Result<()> {
    if !lr.is_finite() || lr <= 0.0 {
        return Err(RegistrationError::invalid_configuration(
            format!("Learning rate must be positive, got {}", lr),
        ));
    }

    if lr > 100.0 {
        return Err(RegistrationError::invalid_configuration(
            format!("Learning rate too large: {}", lr),
        ));
    }

    Ok(())
}

/// Validate iteration count. Zero iterations is allowed and keeps the
/// initial transform.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations > 1_000_000 {
        return Err(RegistrationError::invalid_configuration(
            format!("Iterations too large: {}", iterations),
        ));
    }

    Ok(())
}

/// Validate the number of histogram bins for mutual information.
pub fn validate_histogram_bins(num_bins: usize) -> Result<()> {
    if num_bins < 2 {
        return Err(RegistrationError::invalid_configuration(
            format!("Number of bins must be at least 2, got {}", num_bins),
        ));
    }

    if num_bins > 1024 {
        return Err(RegistrationError::invalid_configuration(
            format!("Number of bins too large: {}", num_bins),
        ));
    }

    Ok(())
}

/// Reject empty images and images holding NaN or infinite voxels.
pub fn validate_image<B: Backend, const D: usize>(image: &Image<B, D>, role: &str) -> Result<()> {
    let values = image.to_vec()?;
    if values.is_empty() {
        return Err(RegistrationError::image_validation(format!("{} image is empty", role)));
    }
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(RegistrationError::image_validation(format!(
            "{} image has a non-finite voxel at flat index {}",
            role, pos
        )));
    }
    Ok(())
}

/// Accept an optimization result only if it ended finite and no worse than
/// it started.
pub fn check_convergence(iterations: usize, initial_loss: f64, final_loss: f64) -> Result<()> {
    if !initial_loss.is_finite() || !final_loss.is_finite() || final_loss > initial_loss {
        return Err(RegistrationError::NonConvergence {
            iterations,
            initial_loss,
            final_loss,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use ctlesion_core::image::ImageGeometry;

    type B = NdArray<f32>;

    #[test]
    fn test_validate_learning_rate() {
        assert!(validate_learning_rate(0.01).is_ok());
        assert!(validate_learning_rate(1.0).is_ok());
        assert!(validate_learning_rate(0.0).is_err());
        assert!(validate_learning_rate(-0.01).is_err());
        assert!(validate_learning_rate(f64::NAN).is_err());
        assert!(validate_learning_rate(1000.0).is_err());
    }

    #[test]
    fn test_validate_iterations() {
        assert!(validate_iterations(0).is_ok());
        assert!(validate_iterations(1000).is_ok());
        assert!(validate_iterations(2_000_000).is_err());
    }

    #[test]
    fn test_validate_histogram_bins() {
        assert!(validate_histogram_bins(256).is_ok());
        assert!(validate_histogram_bins(1).is_err());
        assert!(validate_histogram_bins(2000).is_err());
    }

    #[test]
    fn test_validate_image() {
        let geometry = ImageGeometry::<3>::unit([1, 1, 3]);
        let good = Image::<B, 3>::from_vec(vec![0.0, 1.0, 2.0], &geometry, &Default::default()).unwrap();
        let bad = Image::<B, 3>::from_vec(vec![0.0, f32::NAN, 2.0], &geometry, &Default::default()).unwrap();
        assert!(validate_image(&good, "fixed").is_ok());
        assert!(matches!(validate_image(&bad, "moving"), Err(RegistrationError::ImageValidationError(_))));
    }

    #[test]
    fn test_check_convergence() {
        assert!(check_convergence(10, -0.2, -0.5).is_ok());
        assert!(check_convergence(10, -0.2, -0.2).is_ok());
        assert!(check_convergence(10, -0.2, -0.1).is_err());
        assert!(check_convergence(10, -0.2, f64::NAN).is_err());
        assert!(check_convergence(10, f64::INFINITY, f64::INFINITY).is_err());
    }
}
