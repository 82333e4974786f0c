//! Affine alignment of the subject skull to the template skull and its
//! propagation to other subject-space volumes.

use burn::tensor::backend::Backend;
use ctlesion_core::filter::ResampleImageFilter;
use ctlesion_core::image::{ImageGeometry, Volume};
use ctlesion_core::interpolation::Interpolation;
use ctlesion_core::transform::AffineMatrix;
use ctlesion_registration::AffineSolver;
use tracing::info;
use crate::error::{Result, Stage, StageResultExt};

/// Affine mapping template space onto subject space, from the skull pair.
pub fn compute_affine<B, A>(solver: &A, skull: &Volume<B, 3>, template_bone: &Volume<B, 3>) -> Result<AffineMatrix>
where
    B: Backend,
    A: AffineSolver<B> + ?Sized,
{
    info!("affine registration of the skull");
    let matrix = solver.compute(skull, template_bone).stage(Stage::AffineRegistration)?;
    info!(matrix = ?matrix.to_rows(), "affine registration done");
    Ok(matrix)
}

/// Interpolation used for a volume of this kind.
pub fn interpolation_for<B: Backend>(volume: &Volume<B, 3>) -> Interpolation {
    if volume.kind().is_label() {
        Interpolation::NearestNeighbor
    } else {
        Interpolation::Linear
    }
}

/// Resample `volume` onto `reference` through `matrix`.
///
/// Intensity volumes are interpolated trilinearly, label volumes with
/// nearest neighbour.
pub fn apply_affine<B: Backend>(
    matrix: &AffineMatrix,
    volume: &Volume<B, 3>,
    reference: &ImageGeometry<3>,
) -> Result<Volume<B, 3>> {
    ResampleImageFilter::new(*reference, *matrix, interpolation_for(volume))
        .apply_volume(volume)
        .stage(Stage::AffinePropagation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use ctlesion_core::image::Image;
    use ctlesion_core::spatial::Point;

    type B = NdArray<f32>;

    fn cube(kind_label: bool) -> Volume<B, 3> {
        let geometry = ImageGeometry::<3>::unit([6, 6, 6]);
        let mut values = vec![0.0f32; 216];
        for z in 2..4 {
            for y in 2..4 {
                for x in 1..3 {
                    values[(z * 6 + y) * 6 + x] = if kind_label { 1.0 } else { 80.0 };
                }
            }
        }
        let image = Image::from_vec(values, &geometry, &Default::default()).unwrap();
        if kind_label {
            Volume::label(image)
        } else {
            Volume::continuous(image)
        }
    }

    #[test]
    fn test_label_volume_uses_nearest_neighbour() {
        let lesion = cube(true);
        let matrix = AffineMatrix::from_translation([0.5, 0.0, 0.0])
            .compose(&AffineMatrix::from_euler_degrees([0.0, 0.0, 10.0], &Point::new([2.5, 2.5, 2.5])));
        let moved = apply_affine(&matrix, &lesion, &lesion.geometry()).unwrap();
        assert!(moved.kind().is_label());
        assert!(moved.is_binary().unwrap());
        assert_eq!(interpolation_for(&lesion), Interpolation::NearestNeighbor);
    }

    #[test]
    fn test_intensity_volume_uses_trilinear() {
        let ct = cube(false);
        assert_eq!(interpolation_for(&ct), Interpolation::Linear);

        let moved = apply_affine(&AffineMatrix::from_translation([0.5, 0.0, 0.0]), &ct, &ct.geometry()).unwrap();
        let values = moved.image().to_vec().unwrap();
        // half-voxel shift blends the block edge
        assert!((values[(2 * 6 + 2) * 6] - 40.0).abs() < 1e-4);
        assert!((values[(2 * 6 + 2) * 6 + 1] - 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_identity_keeps_label_count() {
        let lesion = cube(true);
        let moved = apply_affine(&AffineMatrix::identity(), &lesion, &lesion.geometry()).unwrap();
        assert_eq!(moved.count_nonzero().unwrap(), 8);
    }
}
