//! Masked B-spline (free-form) registration and the reusable result
//! transform.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use burn::module::Module;
use burn::tensor::backend::{AutodiffBackend, Backend};
use ctlesion_core::filter::ResampleImageFilter;
use ctlesion_core::image::{ImageGeometry, Volume};
use ctlesion_core::interpolation::Interpolation;
use ctlesion_core::transform::{BSplineTransform, Transform};
use ctlesion_io::ParameterMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::error::{RegistrationError, Result};
use crate::metric::MattesMutualInformation;
use crate::optimizer::AdamOptimizer;
use crate::regularization::BendingEnergyPenalty;
use crate::registration::Registration;
use crate::validation::{
    check_convergence, validate_histogram_bins, validate_image, validate_iterations, validate_learning_rate,
};

/// Parameter file keys read by [`BSplineConfig::from_parameters`].
pub const KNOWN_PARAMETERS: [&str; 8] = [
    "FinalGridSpacingInPhysicalUnits",
    "MaximumNumberOfIterations",
    "NumberOfSpatialSamples",
    "NumberOfHistogramBins",
    "FinalBSplineInterpolationOrder",
    "MaximumStepLength",
    "Metric",
    "Metric1Weight",
];

/// Parameter file keys whose setting is fixed in this solver.
const ENGINE_PARAMETERS: [&str; 24] = [
    "FixedInternalImagePixelType",
    "MovingInternalImagePixelType",
    "FixedImageDimension",
    "MovingImageDimension",
    "UseDirectionCosines",
    "Registration",
    "Interpolator",
    "ResampleInterpolator",
    "Resampler",
    "FixedImagePyramid",
    "MovingImagePyramid",
    "Optimizer",
    "Transform",
    "ImageSampler",
    "NumberOfResolutions",
    "HowToCombineTransforms",
    "AutomaticTransformInitialization",
    "AutomaticScalesEstimation",
    "WriteResultImage",
    "ResultImagePixelType",
    "ResultImageFormat",
    "DefaultPixelValue",
    "NewSamplesEveryIteration",
    "ErodeMask",
];

/// Settings of [`BSplineSolver`], usually read from a parameter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BSplineConfig {
    /// Control point spacing in millimetres, `(x, y, z)`.
    pub grid_spacing: [f64; 3],
    pub iterations: usize,
    /// Fixed voxels sampled by the metric; `0` uses every voxel.
    pub num_samples: usize,
    pub num_bins: usize,
    /// Interpolation order of the final resampling.
    pub final_order: u32,
    pub learning_rate: f64,
    /// Weight of the bending energy penalty; `0` disables it.
    pub bending_energy_weight: f64,
}

impl Default for BSplineConfig {
    fn default() -> Self {
        Self {
            grid_spacing: [16.0; 3],
            iterations: 250,
            num_samples: 2048,
            num_bins: 32,
            final_order: 3,
            learning_rate: 1.0,
            bending_energy_weight: 0.0,
        }
    }
}

impl BSplineConfig {
    /// Read the settings from an elastix-style parameter map.
    ///
    /// Missing keys keep their defaults. Multi-resolution keys use their
    /// last (finest) value. Keys this solver does not understand are
    /// reported once with `warn!`.
    pub fn from_parameters(params: &ParameterMap) -> Result<Self> {
        let mut config = Self::default();

        if let Some(spacing) = get_all::<f64>(params, "FinalGridSpacingInPhysicalUnits")? {
            config.grid_spacing = match spacing.as_slice() {
                [s] => [*s; 3],
                [x, y, z] => [*x, *y, *z],
                other => {
                    return Err(RegistrationError::invalid_configuration(format!(
                        "FinalGridSpacingInPhysicalUnits needs 1 or 3 values, got {}",
                        other.len()
                    )))
                }
            };
        }
        if let Some(iterations) = last::<usize>(params, "MaximumNumberOfIterations")? {
            config.iterations = iterations;
        }
        if let Some(samples) = last::<usize>(params, "NumberOfSpatialSamples")? {
            config.num_samples = samples;
        }
        if let Some(bins) = last::<usize>(params, "NumberOfHistogramBins")? {
            config.num_bins = bins;
        }
        if let Some(order) = last::<u32>(params, "FinalBSplineInterpolationOrder")? {
            config.final_order = order;
        }
        if let Some(step) = last::<f64>(params, "MaximumStepLength")? {
            config.learning_rate = step;
        }
        let penalized = params
            .values("Metric")
            .map_or(false, |metrics| metrics.iter().any(|m| m == "TransformBendingEnergyPenalty"));
        if penalized {
            config.bending_energy_weight = last::<f64>(params, "Metric1Weight")?.unwrap_or(1.0);
        }

        let unused: Vec<&str> = params
            .keys()
            .filter(|key| !KNOWN_PARAMETERS.contains(key) && !ENGINE_PARAMETERS.contains(key))
            .collect();
        if !unused.is_empty() {
            warn!(keys = ?unused, "parameter file entries are not used by the B-spline solver");
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_grid_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.grid_spacing = spacing;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_final_order(mut self, order: u32) -> Self {
        self.final_order = order;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_iterations(self.iterations)?;
        validate_histogram_bins(self.num_bins)?;
        validate_learning_rate(self.learning_rate)?;
        if self.grid_spacing.iter().any(|s| !(*s > 0.0) || !s.is_finite()) {
            return Err(RegistrationError::invalid_configuration(format!(
                "grid spacing must be positive, got {:?}",
                self.grid_spacing
            )));
        }
        if !(self.bending_energy_weight >= 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "bending energy weight must be >= 0, got {}",
                self.bending_energy_weight
            )));
        }
        Ok(())
    }
}

fn get_all<T>(params: &ParameterMap, key: &str) -> Result<Option<Vec<T>>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    params
        .get_all::<T>(key)
        .map_err(|e| RegistrationError::invalid_configuration(format!("{:#}", e)))
}

fn last<T>(params: &ParameterMap, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    Ok(get_all::<T>(params, key)?.and_then(|values| values.into_iter().last()))
}

/// A computed dense transform together with the order it resamples with.
///
/// Cloning shares the field; [`DeformableTransform::with_resampling_order`]
/// gives another view of the same field.
#[derive(Clone)]
pub struct DeformableTransform<B: Backend> {
    field: Arc<dyn Transform<B, 3>>,
    reference: ImageGeometry<3>,
    order: u32,
}

impl<B: Backend> DeformableTransform<B> {
    /// Wrap `field`, which maps points of `reference` into moving space.
    pub fn new(field: Arc<dyn Transform<B, 3>>, reference: ImageGeometry<3>, order: u32) -> Self {
        Self { field, reference, order }
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn reference(&self) -> &ImageGeometry<3> {
        &self.reference
    }

    pub fn field(&self) -> &Arc<dyn Transform<B, 3>> {
        &self.field
    }

    pub fn with_resampling_order(&self, order: u32) -> Self {
        Self {
            field: Arc::clone(&self.field),
            reference: self.reference,
            order,
        }
    }

    /// Resample `volume` onto the reference grid.
    ///
    /// Label volumes need order 0; any other order is a kind violation.
    pub fn apply(&self, volume: &Volume<B, 3>) -> Result<Volume<B, 3>> {
        let filter = ResampleImageFilter::new(
            self.reference,
            Arc::clone(&self.field),
            Interpolation::from_order(self.order),
        );
        Ok(filter.apply_volume(volume)?)
    }
}

impl<B: Backend> fmt::Debug for DeformableTransform<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeformableTransform")
            .field("reference", &self.reference.shape())
            .field("order", &self.order)
            .finish()
    }
}

/// Output of a deformable registration.
#[derive(Debug, Clone)]
pub struct DeformableRegistration<B: Backend> {
    /// The moving volume resampled onto the fixed grid.
    pub registered: Volume<B, 3>,
    pub transform: DeformableTransform<B>,
    pub initial_loss: f64,
    pub final_loss: f64,
}

/// Computes a dense transform from `fixed` space into `moving` space.
pub trait DeformableSolver<B: Backend> {
    fn compute(
        &self,
        fixed: &Volume<B, 3>,
        moving: &Volume<B, 3>,
        moving_mask: Option<&Volume<B, 3>>,
        params: &ParameterMap,
    ) -> Result<DeformableRegistration<B>>;
}

/// Adam on the control point displacements of a cubic B-spline grid,
/// scored by masked Mattes mutual information.
#[derive(Debug, Clone, Copy, Default)]
pub struct BSplineSolver;

impl BSplineSolver {
    pub fn new() -> Self {
        Self
    }
}

impl<B: AutodiffBackend> DeformableSolver<B> for BSplineSolver {
    fn compute(
        &self,
        fixed: &Volume<B, 3>,
        moving: &Volume<B, 3>,
        moving_mask: Option<&Volume<B, 3>>,
        params: &ParameterMap,
    ) -> Result<DeformableRegistration<B>> {
        let config = BSplineConfig::from_parameters(params)?;
        validate_image(fixed.image(), "fixed")?;
        validate_image(moving.image(), "moving")?;

        let mut metric = MattesMutualInformation::<B, 3>::new(config.num_bins, config.num_samples);
        if let Some(mask) = moving_mask {
            moving.geometry().ensure_same_grid(&mask.geometry(), "deformable registration mask")?;
            metric = metric.with_moving_mask(mask.image().clone());
        }

        let device = fixed.data().device();
        let fixed_geometry = fixed.geometry();
        let transform = BSplineTransform::<B, 3>::for_domain(&fixed_geometry, config.grid_spacing, &device)?;
        info!(
            grid = ?transform.grid_size(),
            iterations = config.iterations,
            masked = moving_mask.is_some(),
            "deformable registration started"
        );

        let mut registration = Registration::new(AdamOptimizer::new(config.learning_rate), metric);
        if config.bending_energy_weight > 0.0 {
            registration = registration.with_penalty(BendingEnergyPenalty::new(config.bending_energy_weight));
        }
        let outcome = registration.execute(
            fixed.image(),
            moving.image(),
            transform,
            config.iterations,
            config.learning_rate,
        )?;
        check_convergence(outcome.history.len(), outcome.initial_loss, outcome.final_loss)?;

        let field: Arc<dyn Transform<B, 3>> = Arc::new(outcome.transform.no_grad());
        let transform = DeformableTransform::new(field, fixed_geometry, config.final_order);
        let registered = transform.apply(moving)?;
        info!(
            initial_loss = outcome.initial_loss,
            final_loss = outcome.final_loss,
            "deformable registration finished"
        );

        Ok(DeformableRegistration {
            registered,
            transform,
            initial_loss: outcome.initial_loss,
            final_loss: outcome.final_loss,
        })
    }
}
