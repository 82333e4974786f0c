//! Intensity filters: clamping, thresholding and masking by multiplication.

use burn::tensor::backend::Backend;
use crate::error::{CoreError, Result};
use crate::image::{Volume, VolumeKind};

/// Clamp every voxel into `[lower, upper]`.
///
/// Used to bound CT intensities to a Hounsfield window (e.g. `[0, 100]` HU
/// for brain tissue contrast).
pub fn clamp_intensity<B: Backend, const D: usize>(
    volume: &Volume<B, D>,
    lower: f64,
    upper: f64,
) -> Result<Volume<B, D>> {
    if !lower.is_finite() || !upper.is_finite() || lower > upper {
        return Err(CoreError::invalid_argument(format!(
            "invalid intensity window [{}, {}]",
            lower, upper
        )));
    }
    let data = volume.data().clone().clamp(lower, upper);
    Ok(Volume::continuous(volume.image().with_data(data)))
}

/// Label voxels with `value >= lower`.
pub fn threshold<B: Backend, const D: usize>(volume: &Volume<B, D>, lower: f64) -> Volume<B, D> {
    let mask = volume.data().clone().greater_equal_elem(lower).float();
    Volume::label(volume.image().with_data(mask))
}

/// Label voxels with `value > 0`.
pub fn binarize<B: Backend, const D: usize>(volume: &Volume<B, D>) -> Volume<B, D> {
    Volume::binarized(volume.image().clone())
}

/// Multiply a volume by a binary mask on the same grid.
///
/// The result keeps the kind of `volume`.
pub fn multiply<B: Backend, const D: usize>(volume: &Volume<B, D>, mask: &Volume<B, D>) -> Result<Volume<B, D>> {
    if mask.kind() != VolumeKind::BinaryLabel {
        return Err(CoreError::KindViolation {
            operation: "multiply",
            kind: mask.kind(),
            detail: "a mask operand".into(),
        });
    }
    volume.geometry().ensure_same_grid(&mask.geometry(), "multiply")?;
    let data = volume.data().clone() * mask.data().clone();
    Ok(Volume::with_kind(volume.image().with_data(data), volume.kind()))
}
