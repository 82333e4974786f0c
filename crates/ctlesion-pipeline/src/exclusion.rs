//! Exclusion mask of the deformable stage: CT foreground without the lesion.

use burn::tensor::backend::Backend;
use ctlesion_core::filter::{binarize, mask_and, mask_not};
use ctlesion_core::image::Volume;
use tracing::debug;
use crate::error::{PipelineError, Result, Stage, StageResultExt};

/// `binarize(ct) AND NOT lesion`.
///
/// Both volumes must be on the same grid. A lesion stored as intensities is
/// binarized first.
pub fn build_exclusion_mask<B: Backend>(ct: &Volume<B, 3>, lesion: &Volume<B, 3>) -> Result<Volume<B, 3>> {
    let (ct_grid, lesion_grid) = (ct.geometry(), lesion.geometry());
    if !ct_grid.same_grid(&lesion_grid) {
        return Err(PipelineError::space_mismatch(format!(
            "CT grid (shape {:?}, origin {:?}) differs from lesion grid (shape {:?}, origin {:?})",
            ct_grid.shape(),
            ct_grid.origin().to_array(),
            lesion_grid.shape(),
            lesion_grid.origin().to_array()
        )));
    }

    let foreground = binarize(ct);
    let lesion = binarize(lesion);
    let mask = mask_not(&lesion)
        .and_then(|outside| mask_and(&foreground, &outside))
        .stage(Stage::ExclusionMask)?;
    debug!(voxels = mask.count_nonzero().stage(Stage::ExclusionMask)?, "exclusion mask");
    Ok(mask)
}

/// Exclusion mask when there is no lesion: the CT foreground.
pub fn build_ct_mask<B: Backend>(ct: &Volume<B, 3>) -> Volume<B, 3> {
    binarize(ct)
}
