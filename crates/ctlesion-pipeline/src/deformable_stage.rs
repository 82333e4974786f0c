//! Masked deformable alignment of the pre-template CT and reuse of the
//! result transform for the lesion mask.

use burn::tensor::backend::Backend;
use ctlesion_core::image::Volume;
use ctlesion_io::ParameterMap;
use ctlesion_registration::{DeformableRegistration, DeformableSolver, DeformableTransform};
use tracing::info;
use crate::error::{Result, Stage, StageResultExt};

/// Register `moving` onto `template` with the exclusion mask applied on the
/// moving side. Non-convergence fails the stage.
pub fn compute_deformable<B, S>(
    solver: &S,
    template: &Volume<B, 3>,
    moving: &Volume<B, 3>,
    exclusion_mask: &Volume<B, 3>,
    params: &ParameterMap,
) -> Result<DeformableRegistration<B>>
where
    B: Backend,
    S: DeformableSolver<B> + ?Sized,
{
    info!("deformable registration of the pre-template CT");
    let result = solver
        .compute(template, moving, Some(exclusion_mask), params)
        .stage(Stage::DeformableRegistration)?;
    info!(
        order = result.transform.order(),
        initial_loss = result.initial_loss,
        final_loss = result.final_loss,
        "deformable registration done"
    );
    Ok(result)
}

/// Warp a label volume with the nearest-neighbour view of `transform`.
pub fn propagate_label<B: Backend>(transform: &DeformableTransform<B>, label: &Volume<B, 3>) -> Result<Volume<B, 3>> {
    transform
        .with_resampling_order(0)
        .apply(label)
        .stage(Stage::DeformablePropagation)
}
