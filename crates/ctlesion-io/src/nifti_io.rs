use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use ctlesion_core::image::{Image, ImageGeometry, Volume, VolumeKind};
use ctlesion_core::spatial::{Direction, Point, Spacing};
use nalgebra::{Matrix4, SMatrix, Vector3};
use ndarray::{Array3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;
use tracing::debug;

/// Voxel-to-world matrix stored in a NIfTI header.
///
/// The sform is preferred, then the qform, then plain `pixdim` scaling.
fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        return Matrix4::from_fn(|r, c| if r < 3 { rows[r][c] as f64 } else if c == 3 { 1.0 } else { 0.0 });
    }

    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;

    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

        let rotation = nalgebra::Matrix3::new(
            a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c),
            2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b),
            2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b,
        );
        let scale = nalgebra::Matrix3::from_diagonal(&Vector3::new(dx, dy, dz * qfac));
        let linear = rotation * scale;
        let offset = Vector3::new(header.quatern_x as f64, header.quatern_y as f64, header.quatern_z as f64);

        let mut affine = Matrix4::identity();
        affine.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        affine.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
        return affine;
    }

    Matrix4::from_diagonal(&nalgebra::Vector4::new(dx, dy, dz, 1.0))
}

/// Split a voxel-to-world matrix into origin, spacing and direction cosines.
fn geometry_from_affine(affine: &Matrix4<f64>, shape: [usize; 3]) -> ImageGeometry<3> {
    let origin = Point::new([affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]]);

    let columns: [Vector3<f64>; 3] = std::array::from_fn(|c| affine.fixed_view::<3, 1>(0, c).into_owned());
    let spacing = Spacing::new(std::array::from_fn(|c| columns[c].norm()));

    let axes = [Vector3::x(), Vector3::y(), Vector3::z()];
    let unit: [Vector3<f64>; 3] = std::array::from_fn(|c| {
        let norm = columns[c].norm();
        if norm > 1e-9 { columns[c] / norm } else { axes[c] }
    });
    let direction = Direction(SMatrix::<f64, 3, 3>::from_columns(&unit));

    ImageGeometry::new(shape, origin, spacing, direction)
}

/// Header carrying the grid of `geometry` as an sform.
fn header_for_geometry(geometry: &ImageGeometry<3>) -> NiftiHeader {
    let origin = geometry.index_to_physical(&Point::origin());
    let column = |axis: usize| {
        let mut index = Point::origin();
        index[axis] = 1.0;
        geometry.index_to_physical(&index) - origin
    };
    let columns = [column(0), column(1), column(2)];
    let row = |r: usize| -> [f32; 4] {
        [
            columns[0][r] as f32,
            columns[1][r] as f32,
            columns[2][r] as f32,
            origin[r] as f32,
        ]
    };
    let spacing = geometry.spacing();

    NiftiHeader {
        pixdim: [1.0, spacing[0] as f32, spacing[1] as f32, spacing[2] as f32, 1.0, 1.0, 1.0, 1.0],
        sform_code: 1,
        qform_code: 0,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        scl_slope: 1.0,
        scl_inter: 0.0,
        ..NiftiHeader::default()
    }
}

/// Read a 3D NIfTI image (`.nii` or `.nii.gz`).
///
/// The tensor is laid out `[Z, Y, X]`. A trailing singleton time axis is
/// dropped; any other 4D image is rejected.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let affine = header_affine(obj.header());

    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let array = match array.ndim() {
        3 => array,
        4 if array.shape()[3] == 1 => array.index_axis_move(Axis(3), 0),
        n => bail!("Expected a 3D NIfTI volume in {}, found {} dimensions", path.display(), n),
    };
    let array = array.into_dimensionality::<Ix3>()?;

    let (nx, ny, nz) = array.dim();
    // Logical iteration over [z, y, x] is independent of the memory layout.
    let values: Vec<f32> = array.permuted_axes([2, 1, 0]).iter().copied().collect();

    let geometry = geometry_from_affine(&affine, [nz, ny, nx]);
    debug!(path = %path.display(), shape = ?geometry.shape(), "read NIfTI");
    Ok(Image::from_vec(values, &geometry, device)?)
}

/// Write an image as 32-bit float NIfTI. A `.gz` extension compresses the file.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    let values = image.to_vec()?;
    let array = to_nifti_array(&values, image.shape(), |v| v);
    let path = path.as_ref();
    WriterOptions::new(path)
        .reference_header(&header_for_geometry(&image.geometry()))
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    debug!(path = %path.display(), "wrote NIfTI");
    Ok(())
}

/// Read a volume and tag it with `kind`. Label volumes are binarized (`> 0`).
pub fn read_volume<B: Backend, P: AsRef<Path>>(path: P, kind: VolumeKind, device: &B::Device) -> Result<Volume<B, 3>> {
    let image = read_nifti(path, device)?;
    Ok(match kind {
        VolumeKind::BinaryLabel => Volume::binarized(image),
        VolumeKind::ContinuousIntensity => Volume::continuous(image),
    })
}

/// Write a volume. Label volumes are stored as 16-bit integers.
pub fn write_volume<B: Backend, P: AsRef<Path>>(path: P, volume: &Volume<B, 3>) -> Result<()> {
    if volume.kind() == VolumeKind::ContinuousIntensity {
        return write_nifti(path, volume.image());
    }
    let values = volume.image().to_vec()?;
    let array = to_nifti_array(&values, volume.shape(), |v| if v > 0.0 { 1i16 } else { 0 });
    let path = path.as_ref();
    WriterOptions::new(path)
        .reference_header(&header_for_geometry(&volume.geometry()))
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    debug!(path = %path.display(), "wrote label NIfTI");
    Ok(())
}

/// Reorder `[Z, Y, X]` values into an `(x, y, z)` indexed array.
fn to_nifti_array<T>(values: &[f32], shape: [usize; 3], convert: impl Fn(f32) -> T) -> Array3<T> {
    let [nz, ny, nx] = shape;
    Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| convert(values[(z * ny + y) * nx + x]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use nalgebra::Rotation3;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_read_orders_axes_as_zyx() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");

        // X=3, Y=4, Z=5 with value = x + 10 y + 100 z
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let image = read_nifti::<TestBackend, _>(&file_path, &Default::default())?;
        assert_eq!(image.shape(), [5, 4, 3]);

        let values = image.to_vec()?;
        // flat [z, y, x] index of (x=2, y=1, z=4)
        assert_eq!(values[(4 * 4 + 1) * 3 + 2], 412.0);
        assert_eq!(values[1], 1.0);
        Ok(())
    }

    #[test]
    fn test_geometry_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("ct.nii.gz");

        let rotation = Rotation3::from_euler_angles(0.0, 0.0, 0.3);
        let geometry = ImageGeometry::new(
            [4, 3, 2],
            Point::new([-90.0, 126.0, -72.0]),
            Spacing::new([0.5, 0.75, 2.0]),
            Direction(*rotation.matrix()),
        );
        let values: Vec<f32> = (0..24).map(|v| v as f32 * 1.5 - 10.0).collect();
        let image = Image::<TestBackend, 3>::from_vec(values.clone(), &geometry, &Default::default())?;

        write_nifti(&file_path, &image)?;
        let back = read_nifti::<TestBackend, _>(&file_path, &Default::default())?;

        assert_eq!(back.shape(), [4, 3, 2]);
        assert!(back.origin().approx_eq(image.origin(), 1e-4));
        assert!(back.spacing().approx_eq(image.spacing(), 1e-5));
        assert!(back.direction().approx_eq(image.direction(), 1e-5));
        assert_eq!(back.to_vec()?, values);
        Ok(())
    }

    #[test]
    fn test_label_volume_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("lesion.nii.gz");

        let geometry = ImageGeometry::<3>::unit([2, 2, 2]);
        let image = Image::<TestBackend, 3>::from_vec(vec![0.0, 3.0, 0.0, 1.0, 0.0, 0.0, 7.0, 0.0], &geometry, &Default::default())?;
        let mask = Volume::binarized(image);

        write_volume(&file_path, &mask)?;
        let back = read_volume::<TestBackend, _>(&file_path, VolumeKind::BinaryLabel, &Default::default())?;

        assert_eq!(back.kind(), VolumeKind::BinaryLabel);
        assert_eq!(back.image().to_vec()?, vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_nifti::<TestBackend, _>("/nonexistent/ct.nii.gz", &Default::default()).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ct.nii.gz"));
    }
}
