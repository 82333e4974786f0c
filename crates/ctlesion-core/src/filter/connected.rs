//! Connected component labeling.
//!
//! Face connectivity only (6-connected in 3D, 4-connected in 2D). Labels
//! are assigned in scan order, so label 1 is the component containing the
//! first foreground voxel in memory order.

use std::collections::VecDeque;
use burn::tensor::backend::Backend;
use tracing::debug;
use crate::error::{CoreError, Result};
use crate::image::{Image, Volume, VolumeKind};

/// Result of labeling a binary volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentLabels {
    /// Label per voxel in memory order, 0 for background.
    pub labels: Vec<u32>,
    /// `sizes[k]` is the voxel count of label `k + 1`.
    pub sizes: Vec<usize>,
}

impl ComponentLabels {
    pub fn num_components(&self) -> usize {
        self.sizes.len()
    }

    /// Label of the largest component with at least `min_size` voxels.
    /// Ties resolve to the lowest label.
    pub fn largest(&self, min_size: usize) -> Option<u32> {
        let mut best: Option<(u32, usize)> = None;
        for (i, &size) in self.sizes.iter().enumerate() {
            if size < min_size.max(1) {
                continue;
            }
            if best.map_or(true, |(_, best_size)| size > best_size) {
                best = Some((i as u32 + 1, size));
            }
        }
        best.map(|(label, _)| label)
    }
}

/// Label the foreground (`> 0`) of a voxel buffer laid out with `shape`
/// in tensor order.
pub fn label_components<const D: usize>(foreground: &[bool], shape: [usize; D]) -> ComponentLabels {
    let total: usize = shape.iter().product();
    debug_assert_eq!(foreground.len(), total);

    let mut strides = [1usize; D];
    for axis in (0..D.saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }

    let mut labels = vec![0u32; total];
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..total {
        if !foreground[seed] || labels[seed] != 0 {
            continue;
        }
        let label = sizes.len() as u32 + 1;
        labels[seed] = label;
        queue.push_back(seed);
        let mut size = 0usize;

        while let Some(flat) = queue.pop_front() {
            size += 1;
            for axis in 0..D {
                let coord = (flat / strides[axis]) % shape[axis];
                if coord > 0 {
                    let n = flat - strides[axis];
                    if foreground[n] && labels[n] == 0 {
                        labels[n] = label;
                        queue.push_back(n);
                    }
                }
                if coord + 1 < shape[axis] {
                    let n = flat + strides[axis];
                    if foreground[n] && labels[n] == 0 {
                        labels[n] = label;
                        queue.push_back(n);
                    }
                }
            }
        }
        sizes.push(size);
    }

    ComponentLabels { labels, sizes }
}

/// Keep only the largest connected component of a binary volume.
///
/// Components smaller than `min_size` voxels are discarded; if none is left
/// the result is an empty mask. The output is a label volume on the input grid.
pub fn largest_connected_component<B: Backend, const D: usize>(
    mask: &Volume<B, D>,
    min_size: usize,
) -> Result<Volume<B, D>> {
    if mask.kind() != VolumeKind::BinaryLabel {
        return Err(CoreError::KindViolation {
            operation: "largest_connected_component",
            kind: mask.kind(),
            detail: "component labeling".into(),
        });
    }

    let geometry = mask.geometry();
    let foreground: Vec<bool> = mask.image().to_vec()?.iter().map(|v| *v > 0.0).collect();
    let components = label_components(&foreground, geometry.shape());
    let keep = components.largest(min_size);

    debug!(
        components = components.num_components(),
        kept = ?keep.map(|label| components.sizes[label as usize - 1]),
        "connected components"
    );

    let values: Vec<f32> = components
        .labels
        .iter()
        .map(|label| if Some(*label) == keep && *label != 0 { 1.0 } else { 0.0 })
        .collect();
    let image = Image::from_vec(values, &geometry, &mask.data().device())?;
    Ok(Volume::label(image))
}
