//! Volumes: images tagged with the semantics of their voxel values.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use super::{Image, ImageGeometry};

/// Semantics of the voxel values of a [`Volume`].
///
/// The kind decides how a volume may be resampled: binary labels only go
/// through label-preserving (nearest neighbour) sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeKind {
    /// Scalar intensities (Hounsfield units, template T1 values).
    ContinuousIntensity,
    /// Voxels in `{0, 1}` (lesion, ventricle and exclusion masks).
    BinaryLabel,
}

impl VolumeKind {
    pub fn is_label(self) -> bool {
        matches!(self, Self::BinaryLabel)
    }
}

/// An [`Image`] together with its [`VolumeKind`].
#[derive(Debug, Clone)]
pub struct Volume<B: Backend, const D: usize> {
    image: Image<B, D>,
    kind: VolumeKind,
}

impl<B: Backend, const D: usize> Volume<B, D> {
    /// Wrap an intensity image.
    pub fn continuous(image: Image<B, D>) -> Self {
        Self {
            image,
            kind: VolumeKind::ContinuousIntensity,
        }
    }

    /// Wrap an image whose voxels are already in `{0, 1}`.
    ///
    /// Callers that cannot guarantee this should use [`Volume::binarized`].
    pub fn label(image: Image<B, D>) -> Self {
        Self {
            image,
            kind: VolumeKind::BinaryLabel,
        }
    }

    /// Build a label volume from any image: voxels `> 0` become 1.
    pub fn binarized(image: Image<B, D>) -> Self {
        let mask = image.data().clone().greater_elem(0.0).float();
        Self::label(image.with_data(mask))
    }

    /// Wrap an image with an explicit kind.
    pub fn with_kind(image: Image<B, D>, kind: VolumeKind) -> Self {
        match kind {
            VolumeKind::ContinuousIntensity => Self::continuous(image),
            VolumeKind::BinaryLabel => Self::binarized(image),
        }
    }

    pub fn kind(&self) -> VolumeKind {
        self.kind
    }

    pub fn image(&self) -> &Image<B, D> {
        &self.image
    }

    pub fn into_image(self) -> Image<B, D> {
        self.image
    }

    pub fn data(&self) -> &Tensor<B, D> {
        self.image.data()
    }

    pub fn shape(&self) -> [usize; D] {
        self.image.shape()
    }

    pub fn geometry(&self) -> ImageGeometry<D> {
        self.image.geometry()
    }

    /// Number of voxels with a value greater than zero.
    pub fn count_nonzero(&self) -> Result<usize> {
        Ok(self.image.to_vec()?.iter().filter(|v| **v > 0.0).count())
    }

    /// Whether every voxel is exactly 0 or 1.
    pub fn is_binary(&self) -> Result<bool> {
        Ok(self.image.to_vec()?.iter().all(|v| *v == 0.0 || *v == 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_binarized_volume() {
        let device = Default::default();
        let geometry = ImageGeometry::<3>::unit([1, 2, 2]);
        let image = Image::<Backend, 3>::from_vec(vec![0.0, 255.0, -3.0, 0.2], &geometry, &device).unwrap();

        let raw = Volume::continuous(image.clone());
        assert_eq!(raw.kind(), VolumeKind::ContinuousIntensity);
        assert!(!raw.is_binary().unwrap());

        let mask = Volume::binarized(image);
        assert_eq!(mask.kind(), VolumeKind::BinaryLabel);
        assert!(mask.is_binary().unwrap());
        assert_eq!(mask.count_nonzero().unwrap(), 2);
        assert_eq!(mask.image().to_vec().unwrap(), vec![0.0, 1.0, 0.0, 1.0]);
    }
}
