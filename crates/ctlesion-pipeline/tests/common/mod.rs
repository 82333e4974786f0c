//! Stub engines and synthetic volumes shared by the workflow tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use burn::tensor::backend::Backend;
use burn_ndarray::NdArray;
use ctlesion_core::image::{Image, ImageGeometry, Volume};
use ctlesion_core::transform::{AffineMatrix, IdentityTransform};
use ctlesion_io::ParameterMap;
use ctlesion_registration::{
    AffineSolver, DeformableRegistration, DeformableSolver, DeformableTransform, RegistrationError,
};

pub type B = NdArray<f32>;

pub const AIR: f32 = -1000.0;
pub const BONE: f32 = 1000.0;

/// Affine solver returning the identity.
pub struct IdentityAffine;

impl<Bk: Backend> AffineSolver<Bk> for IdentityAffine {
    fn compute(&self, _moving: &Volume<Bk, 3>, _fixed: &Volume<Bk, 3>) -> ctlesion_registration::Result<AffineMatrix> {
        Ok(AffineMatrix::identity())
    }
}

/// Deformable solver returning the identity field.
pub struct IdentityDeformable;

impl<Bk: Backend> DeformableSolver<Bk> for IdentityDeformable {
    fn compute(
        &self,
        fixed: &Volume<Bk, 3>,
        moving: &Volume<Bk, 3>,
        _moving_mask: Option<&Volume<Bk, 3>>,
        params: &ParameterMap,
    ) -> ctlesion_registration::Result<DeformableRegistration<Bk>> {
        let order = params
            .get::<u32>("FinalBSplineInterpolationOrder")
            .map_err(|e| RegistrationError::invalid_configuration(e.to_string()))?
            .unwrap_or(3);
        let transform = DeformableTransform::new(Arc::new(IdentityTransform), fixed.geometry(), order);
        let registered = transform.apply(moving)?;
        Ok(DeformableRegistration {
            registered,
            transform,
            initial_loss: -0.5,
            final_loss: -0.5,
        })
    }
}

/// Identity deformable solver that keeps the voxels of every fixed volume
/// it is given.
#[derive(Default)]
pub struct RecordingDeformable {
    pub fixed: Mutex<Vec<Vec<f32>>>,
}

impl<Bk: Backend> DeformableSolver<Bk> for RecordingDeformable {
    fn compute(
        &self,
        fixed: &Volume<Bk, 3>,
        moving: &Volume<Bk, 3>,
        moving_mask: Option<&Volume<Bk, 3>>,
        params: &ParameterMap,
    ) -> ctlesion_registration::Result<DeformableRegistration<Bk>> {
        let values = fixed.image().to_vec()?;
        if let Ok(mut seen) = self.fixed.lock() {
            seen.push(values);
        }
        IdentityDeformable.compute(fixed, moving, moving_mask, params)
    }
}

/// Deformable solver that never converges.
pub struct DivergingDeformable;

impl<Bk: Backend> DeformableSolver<Bk> for DivergingDeformable {
    fn compute(
        &self,
        _fixed: &Volume<Bk, 3>,
        _moving: &Volume<Bk, 3>,
        _moving_mask: Option<&Volume<Bk, 3>>,
        _params: &ParameterMap,
    ) -> ctlesion_registration::Result<DeformableRegistration<Bk>> {
        Err(RegistrationError::NonConvergence {
            iterations: 250,
            initial_loss: -0.4,
            final_loss: f64::NAN,
        })
    }
}

fn filled(size: usize, background: f32, fill: impl Fn(usize, usize, usize) -> Option<f32>) -> Vec<f32> {
    let mut values = Vec::with_capacity(size * size * size);
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                values.push(fill(x, y, z).unwrap_or(background));
            }
        }
    }
    values
}

/// Air with a `side`³ bone block in the corner.
pub fn corner_ct(size: usize, side: usize) -> Volume<B, 3> {
    let values = filled(size, AIR, |x, y, z| (x < side && y < side && z < side).then_some(BONE));
    Volume::continuous(Image::from_vec(values, &ImageGeometry::unit([size; 3]), &Default::default()).unwrap())
}

/// Label volume of the voxels with `x < nx`, `y < ny`, `z < nz`.
pub fn block_label(size: usize, [nx, ny, nz]: [usize; 3]) -> Volume<B, 3> {
    let values = filled(size, 0.0, |x, y, z| (x < nx && y < ny && z < nz).then_some(1.0));
    Volume::label(Image::from_vec(values, &ImageGeometry::unit([size; 3]), &Default::default()).unwrap())
}

/// Label volume of the voxels with every coordinate `>= start`.
pub fn far_label(size: usize, start: usize) -> Volume<B, 3> {
    let values = filled(size, 0.0, |x, y, z| (x >= start && y >= start && z >= start).then_some(1.0));
    Volume::label(Image::from_vec(values, &ImageGeometry::unit([size; 3]), &Default::default()).unwrap())
}

/// Intensity template on the same unit grid.
pub fn template(size: usize) -> Volume<B, 3> {
    let values = filled(size, 0.0, |x, _, _| Some(x as f32));
    Volume::continuous(Image::from_vec(values, &ImageGeometry::unit([size; 3]), &Default::default()).unwrap())
}

/// Constant intensity volume on the unit grid.
pub fn constant(size: usize, value: f32) -> Volume<B, 3> {
    let values = vec![value; size * size * size];
    Volume::continuous(Image::from_vec(values, &ImageGeometry::unit([size; 3]), &Default::default()).unwrap())
}
