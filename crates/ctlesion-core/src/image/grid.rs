use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Continuous indices of every voxel of a grid of `shape`.
///
/// Returns a tensor of shape `[N, D]` in memory order, with columns ordered
/// `(x, y, z)`, i.e. the reverse of the `shape` axes.
pub fn generate_grid<B, const D: usize>(shape: [usize; D], device: &B::Device) -> Tensor<B, 2>
where
    B: Backend,
{
    let total = shape.iter().product();
    generate_grid_chunk::<B, D>(shape, 0, total, device)
}

/// Continuous indices of `len` voxels starting at flat position `start`.
///
/// # Arguments
/// * `shape` - The grid shape `[.., H, W]`
/// * `start` - First flat (memory order) voxel position
/// * `len` - Number of voxels
pub fn generate_grid_chunk<B, const D: usize>(
    shape: [usize; D],
    start: usize,
    len: usize,
    device: &B::Device,
) -> Tensor<B, 2>
where
    B: Backend,
{
    let mut grid = Vec::with_capacity(len * D);
    for flat in start..start + len {
        let mut rest = flat;
        for axis in (0..D).rev() {
            grid.push((rest % shape[axis]) as f32);
            rest /= shape[axis];
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([len * D])), device).reshape([len, D])
}
