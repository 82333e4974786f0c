//! Binary mask algebra on label volumes sharing one voxel grid.

use burn::tensor::backend::Backend;
use crate::error::{CoreError, Result};
use crate::image::{Volume, VolumeKind};

fn ensure_label<B: Backend, const D: usize>(volume: &Volume<B, D>, operation: &'static str) -> Result<()> {
    match volume.kind() {
        VolumeKind::BinaryLabel => Ok(()),
        kind => Err(CoreError::KindViolation {
            operation,
            kind,
            detail: "a mask operation".into(),
        }),
    }
}

fn ensure_pair<B: Backend, const D: usize>(
    a: &Volume<B, D>,
    b: &Volume<B, D>,
    operation: &'static str,
) -> Result<()> {
    ensure_label(a, operation)?;
    ensure_label(b, operation)?;
    a.geometry().ensure_same_grid(&b.geometry(), operation)
}

/// `a AND b`.
pub fn mask_and<B: Backend, const D: usize>(a: &Volume<B, D>, b: &Volume<B, D>) -> Result<Volume<B, D>> {
    ensure_pair(a, b, "mask_and")?;
    let data = a.data().clone() * b.data().clone();
    Ok(Volume::label(a.image().with_data(data)))
}

/// `NOT a`.
pub fn mask_not<B: Backend, const D: usize>(a: &Volume<B, D>) -> Result<Volume<B, D>> {
    ensure_label(a, "mask_not")?;
    let data = a.data().clone().neg().add_scalar(1.0);
    Ok(Volume::label(a.image().with_data(data)))
}

/// `binarize((a - b) > 0)`, keeping the spatial metadata of `a`.
pub fn subtract<B: Backend, const D: usize>(a: &Volume<B, D>, b: &Volume<B, D>) -> Result<Volume<B, D>> {
    ensure_pair(a, b, "subtract")?;
    let data = (a.data().clone() - b.data().clone()).greater_elem(0.0).float();
    Ok(Volume::label(a.image().with_data(data)))
}
