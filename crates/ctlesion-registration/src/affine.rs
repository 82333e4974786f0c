//! 12-parameter affine registration.
//!
//! The solver starts from the centres of mass, scans a coarse grid of Euler
//! angles, then refines all twelve affine parameters with Adam against
//! Mattes mutual information.

use burn::tensor::backend::{AutodiffBackend, Backend};
use ctlesion_core::image::{Image, Volume};
use ctlesion_core::spatial::Point;
use ctlesion_core::transform::{AffineMatrix, AffineTransform};
use ctlesion_core::util::to_host_scalar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::error::{RegistrationError, Result};
use crate::metric::{MattesMutualInformation, Metric};
use crate::optimizer::AdamOptimizer;
use crate::registration::Registration;
use crate::validation::{validate_histogram_bins, validate_image, validate_iterations, validate_learning_rate};

/// Computes the affine that maps `fixed` physical points onto `moving`.
pub trait AffineSolver<B: Backend> {
    fn compute(&self, moving: &Volume<B, 3>, fixed: &Volume<B, 3>) -> Result<AffineMatrix>;
}

/// Settings of [`MutualInformationAffineSolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffineSearchConfig {
    /// Histogram bins of the mutual information.
    pub num_bins: usize,
    /// Euler angle range scanned on every axis, in degrees.
    pub search_range_degrees: [f64; 2],
    /// Spacing of the coarse angle grid, in degrees. `0` skips the scan.
    pub coarse_step_degrees: f64,
    /// Adam iterations of the refinement.
    pub iterations: usize,
    pub learning_rate: f64,
    /// Millimetres of translation per unit of the translation parameter.
    pub translation_scale: f64,
    /// Fixed voxels sampled by the metric; `0` uses every voxel.
    pub num_samples: usize,
    /// Start from aligned centres of mass instead of aligned grid centres.
    pub center_of_mass_init: bool,
}

impl Default for AffineSearchConfig {
    fn default() -> Self {
        Self {
            num_bins: 256,
            search_range_degrees: [-180.0, 180.0],
            coarse_step_degrees: 60.0,
            iterations: 200,
            learning_rate: 0.005,
            translation_scale: 10.0,
            num_samples: 4096,
            center_of_mass_init: true,
        }
    }
}

impl AffineSearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_bins(mut self, num_bins: usize) -> Self {
        self.num_bins = num_bins;
        self
    }

    pub fn with_search_range(mut self, lower: f64, upper: f64) -> Self {
        self.search_range_degrees = [lower, upper];
        self
    }

    pub fn with_coarse_step(mut self, degrees: f64) -> Self {
        self.coarse_step_degrees = degrees;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_translation_scale(mut self, scale: f64) -> Self {
        self.translation_scale = scale;
        self
    }

    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    pub fn with_center_of_mass_init(mut self, enabled: bool) -> Self {
        self.center_of_mass_init = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_histogram_bins(self.num_bins)?;
        validate_iterations(self.iterations)?;
        validate_learning_rate(self.learning_rate)?;
        let [lower, upper] = self.search_range_degrees;
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(RegistrationError::invalid_configuration(format!(
                "search range [{}, {}] is not an interval",
                lower, upper
            )));
        }
        if !self.coarse_step_degrees.is_finite() || self.coarse_step_degrees < 0.0 {
            return Err(RegistrationError::invalid_configuration(format!(
                "coarse step must be >= 0, got {}",
                self.coarse_step_degrees
            )));
        }
        if !(self.translation_scale > 0.0) || !self.translation_scale.is_finite() {
            return Err(RegistrationError::invalid_configuration(format!(
                "translation scale must be positive, got {}",
                self.translation_scale
            )));
        }
        Ok(())
    }

    /// Angles scanned on each axis. Zero comes first when it is in range; a
    /// full turn does not visit both ends.
    pub fn coarse_angles(&self) -> Vec<f64> {
        let [lower, upper] = self.search_range_degrees;
        let step = self.coarse_step_degrees;
        let zero_in_range = lower <= 0.0 && 0.0 <= upper;

        let mut angles = Vec::new();
        if zero_in_range {
            angles.push(0.0);
        }
        if step > 0.0 {
            let full_turn = upper - lower >= 360.0 - 1e-9;
            let mut k = 0usize;
            loop {
                let angle = lower + k as f64 * step;
                if angle > upper + 1e-9 || (full_turn && angle >= lower + 360.0 - 1e-9) {
                    break;
                }
                if angle.abs() > 1e-9 {
                    angles.push(angle);
                }
                k += 1;
            }
        }
        if angles.is_empty() {
            angles.push(lower);
        }
        angles
    }
}

/// Mutual information affine solver.
#[derive(Debug, Clone, Default)]
pub struct MutualInformationAffineSolver {
    config: AffineSearchConfig,
}

impl MutualInformationAffineSolver {
    pub fn new(config: AffineSearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AffineSearchConfig {
        &self.config
    }

    fn initial_centers<B: Backend>(&self, moving: &Image<B, 3>, fixed: &Image<B, 3>) -> Result<(Point<3>, Point<3>)> {
        if self.config.center_of_mass_init {
            Ok((center_of_mass(fixed)?, center_of_mass(moving)?))
        } else {
            Ok((fixed.geometry().center(), moving.geometry().center()))
        }
    }
}

impl<B: AutodiffBackend> AffineSolver<B> for MutualInformationAffineSolver {
    fn compute(&self, moving: &Volume<B, 3>, fixed: &Volume<B, 3>) -> Result<AffineMatrix> {
        self.config.validate()?;
        validate_image(moving.image(), "moving")?;
        validate_image(fixed.image(), "fixed")?;

        let (fixed_center, moving_center) = self.initial_centers(moving.image(), fixed.image())?;
        let shift = moving_center - fixed_center;
        let initial_translation = AffineMatrix::from_translation([shift[0], shift[1], shift[2]]);
        info!(
            fixed_center = ?fixed_center.to_array(),
            moving_center = ?moving_center.to_array(),
            "affine registration started"
        );

        let metric = MattesMutualInformation::<B, 3>::new(self.config.num_bins, self.config.num_samples);

        // 1. Coarse rotation scan
        let angles = self.config.coarse_angles();
        let mut best: Option<(AffineMatrix, f64)> = None;
        for &ax in &angles {
            for &ay in &angles {
                for &az in &angles {
                    let candidate = initial_translation.compose(&AffineMatrix::from_euler_degrees([ax, ay, az], &fixed_center));
                    let loss = to_host_scalar(metric.forward(fixed.image(), moving.image(), &candidate)?)?;
                    if loss.is_finite() && best.map_or(true, |(_, best_loss)| loss < best_loss) {
                        best = Some((candidate, loss));
                    }
                }
            }
        }
        let (coarse, coarse_loss) = match best {
            Some(best) => best,
            None => return Err(RegistrationError::numerical_instability("no finite loss in the coarse rotation scan")),
        };
        debug!(candidates = angles.len().pow(3), coarse_loss, "coarse rotation scan finished");

        if self.config.iterations == 0 {
            return Ok(coarse);
        }

        // 2. Refinement of all twelve parameters
        let device = fixed.data().device();
        let transform = AffineTransform::<B, 3>::from_affine_matrix(&coarse, &fixed_center, &device)
            .with_translation_scale(self.config.translation_scale);
        let mut registration = Registration::new(AdamOptimizer::new(self.config.learning_rate), metric);
        let outcome = registration.execute(
            fixed.image(),
            moving.image(),
            transform,
            self.config.iterations,
            self.config.learning_rate,
        )?;

        let refined = outcome.transform.to_affine_matrix()?;
        if !refined.is_finite() || !(outcome.final_loss <= coarse_loss) {
            warn!(
                coarse_loss,
                final_loss = outcome.final_loss,
                "affine refinement did not improve on the coarse scan, keeping the coarse result"
            );
            return Ok(coarse);
        }

        info!(
            initial_loss = coarse_loss,
            final_loss = outcome.final_loss,
            "affine registration finished"
        );
        Ok(refined)
    }
}

/// Intensity-weighted centre of an image, in physical coordinates.
///
/// Weights are voxel values shifted so that the minimum weighs zero. A
/// constant image has its grid centre as centre of mass.
pub fn center_of_mass<B: Backend>(image: &Image<B, 3>) -> Result<Point<3>> {
    let values = image.to_vec()?;
    let [nz, ny, nx] = image.shape();
    let min = values.iter().copied().fold(f32::INFINITY, f32::min) as f64;

    let mut total = 0.0f64;
    let mut acc = [0.0f64; 3];
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let w = values[(z * ny + y) * nx + x] as f64 - min;
                if w > 0.0 {
                    total += w;
                    acc[0] += w * x as f64;
                    acc[1] += w * y as f64;
                    acc[2] += w * z as f64;
                }
            }
        }
    }

    if !(total > 0.0) {
        return Ok(image.geometry().center());
    }
    let index = Point::new([acc[0] / total, acc[1] / total, acc[2] / total]);
    Ok(image.transform_continuous_index_to_physical_point(&index))
}
