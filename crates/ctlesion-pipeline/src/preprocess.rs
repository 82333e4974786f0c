//! Intensity and morphology preprocessing of the raw CT.

use burn::tensor::backend::Backend;
use ctlesion_core::filter::{clamp_intensity, largest_connected_component, multiply, threshold};
use ctlesion_core::image::Volume;
use ctlesion_core::Result;
use tracing::{debug, warn};
use crate::config::DeviceRemovalConfig;

/// Removes the scanner bed and other devices from a CT volume.
pub trait DeviceRemover<B: Backend> {
    fn remove(&self, ct: &Volume<B, 3>) -> Result<Volume<B, 3>>;

    fn name(&self) -> &'static str;
}

/// Keeps the largest connected component of the head mask and fills every
/// other voxel with air.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LargestComponentDeviceRemoval {
    head_threshold: f64,
    air_value: f64,
}

impl LargestComponentDeviceRemoval {
    pub fn new(head_threshold: f64, air_value: f64) -> Self {
        Self {
            head_threshold,
            air_value,
        }
    }
}

impl Default for LargestComponentDeviceRemoval {
    fn default() -> Self {
        Self::from(&DeviceRemovalConfig::default())
    }
}

impl From<&DeviceRemovalConfig> for LargestComponentDeviceRemoval {
    fn from(config: &DeviceRemovalConfig) -> Self {
        Self::new(config.head_threshold, config.air_value)
    }
}

impl<B: Backend> DeviceRemover<B> for LargestComponentDeviceRemoval {
    fn remove(&self, ct: &Volume<B, 3>) -> Result<Volume<B, 3>> {
        let head_mask = ct.data().clone().greater_elem(self.head_threshold).float();
        let head = largest_connected_component(&Volume::label(ct.image().with_data(head_mask)), 1)?;

        let keep = head.data().clone();
        let air = keep.clone().neg().add_scalar(1.0).mul_scalar(self.air_value);
        let data = ct.data().clone() * keep + air;
        debug!(head_voxels = head.count_nonzero()?, "device removal");
        Ok(Volume::continuous(ct.image().with_data(data)))
    }

    fn name(&self) -> &'static str {
        "largest-component"
    }
}

/// Raw CT values inside the largest bone component, zero elsewhere.
///
/// Bone is `value >= threshold`; components under `min_size` voxels are
/// ignored. An empty result is logged and returned as is.
pub fn extract_skull<B: Backend>(ct: &Volume<B, 3>, threshold_hu: f64, min_size: usize) -> Result<Volume<B, 3>> {
    let bone = threshold(ct, threshold_hu);
    let skull = largest_connected_component(&bone, min_size)?;
    let voxels = skull.count_nonzero()?;
    if voxels == 0 {
        warn!(threshold = threshold_hu, min_size, "no bone component found, skull volume is empty");
    } else {
        debug!(voxels, "skull component");
    }
    multiply(ct, &skull)
}

/// Clamp the CT into the `[lower, upper]` HU window.
pub fn bound_intensity<B: Backend>(ct: &Volume<B, 3>, lower: f64, upper: f64) -> Result<Volume<B, 3>> {
    clamp_intensity(ct, lower, upper)
}
