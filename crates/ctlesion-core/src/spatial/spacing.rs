//! Voxel spacing.

use super::Vector;

/// Physical distance between adjacent voxels along each index axis.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Same spacing along every axis.
    pub fn uniform(value: f64) -> Self {
        Vector::new([value; D])
    }

    /// Volume of one voxel (area in 2D).
    pub fn voxel_volume(&self) -> f64 {
        (0..D).map(|i| self[i]).product()
    }

    /// Smallest spacing component.
    pub fn min_spacing(&self) -> f64 {
        (0..D).map(|i| self[i]).fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_helpers() {
        let s = Spacing::<3>::new([0.5, 1.0, 2.0]);
        assert!((s.voxel_volume() - 1.0).abs() < 1e-12);
        assert_eq!(s.min_spacing(), 0.5);
        assert_eq!(Spacing::<2>::uniform(1.5), Vector::new([1.5, 1.5]));
    }
}
