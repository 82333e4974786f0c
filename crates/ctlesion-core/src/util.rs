//! Host/device helpers shared by images, transforms and filters.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use crate::error::{CoreError, Result};

/// Copy a tensor's values to the host as `f32`, in memory order.
pub fn to_host_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    let data = tensor.into_data().convert::<f32>();
    data.as_slice::<f32>()
        .map(|slice| slice.to_vec())
        .map_err(|e| CoreError::TensorData(format!("{:?}", e)))
}

/// Read a single-element tensor as `f64`.
pub fn to_host_scalar<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<f64> {
    let values = to_host_vec(tensor)?;
    match values.as_slice() {
        [value] => Ok(*value as f64),
        other => Err(CoreError::TensorData(format!(
            "expected a single element, found {}",
            other.len()
        ))),
    }
}
