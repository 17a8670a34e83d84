// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Array I/O for sound-speed tables, ray fans and arrival tables.
//!
//! Two formats are supported, chosen by file extension: NumPy `.npy` and
//! MATLAB Level 5 `.mat`. MAT variables are read with the `matfile` crate;
//! writing uses a small Level 5 encoder since that crate is read-only.

use std::io::Write;
use std::path::Path;

use ndarray::{Array2, ArrayD, Ix2, ShapeBuilder};

use crate::core::RayTrajectory;
use crate::eigenray::Arrival;
use crate::error::{RayError, Result};
use crate::sound_speed::SoundSpeed;

/// Supported file formats for array I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// MATLAB .mat format (Level 5).
    Mat,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(RayError::UnsupportedFileFormat(ext.to_string())),
        None => Err(RayError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

fn as_matrix(arr: ArrayD<f64>) -> Result<Array2<f64>> {
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<Ix2>()
        .map_err(|_| RayError::ShapeMismatch {
            expected: vec![0, 0],
            got: shape,
        })
}

/// Read a 2-D array from a .npy file, promoting f32 data to f64.
pub fn load_npy_matrix(path: &Path) -> Result<Array2<f64>> {
    let arr: ArrayD<f64> = match ndarray_npy::read_npy(path) {
        Ok(a) => a,
        Err(_) => {
            let arr32: ArrayD<f32> = ndarray_npy::read_npy(path)
                .map_err(|e| RayError::UnsupportedDtype(format!("{}", e)))?;
            arr32.mapv(|v| v as f64)
        }
    };
    Ok(as_matrix(arr)?.as_standard_layout().to_owned())
}

/// Read the 2-D variable `name` from a .mat file.
pub fn load_mat_matrix(path: &Path, name: &str) -> Result<Array2<f64>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| RayError::Other(format!("MAT parse error: {}", e)))?;

    let array = mat
        .find_by_name(name)
        .ok_or_else(|| RayError::MatVariableNotFound {
            expected: name.to_string(),
            available: mat.arrays().iter().map(|a| a.name().to_string()).collect(),
        })?;

    let data: Vec<f64> = match array.data() {
        matfile::NumericData::Double { real, .. } => real.clone(),
        matfile::NumericData::Single { real, .. } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(RayError::UnsupportedDtype(format!(
                "MAT variable '{}' is not f64 or f32",
                name
            )))
        }
    };

    let dims = array.size().to_vec();
    if dims.len() != 2 {
        return Err(RayError::ShapeMismatch {
            expected: vec![0, 0],
            got: dims,
        });
    }
    // MAT data is column-major
    let arr = Array2::from_shape_vec((dims[0], dims[1]).f(), data).map_err(|_| {
        RayError::ShapeMismatch {
            expected: dims.clone(),
            got: vec![array.size().iter().product()],
        }
    })?;
    Ok(arr.as_standard_layout().to_owned())
}

/// Read a 2-D array, inferring the format from the extension.
///
/// `name` selects the variable inside .mat files and is ignored for .npy.
pub fn load_matrix(path: &Path, name: &str) -> Result<Array2<f64>> {
    match infer_format(path)? {
        FileFormat::Npy => load_npy_matrix(path),
        FileFormat::Mat => load_mat_matrix(path, name),
    }
}

/// Load a tabulated depth profile stored as an `n × 2` array of `(z, c)` rows.
pub fn load_profile(path: &Path) -> Result<SoundSpeed> {
    let table = load_matrix(path, "c")?;
    if table.ncols() != 2 {
        return Err(RayError::ShapeMismatch {
            expected: vec![table.nrows(), 2],
            got: table.shape().to_vec(),
        });
    }
    let z = table.column(0).to_vec();
    let c = table.column(1).to_vec();
    SoundSpeed::tabulated(z, c)
}

/// Load a range/depth sound-speed field sampled on `ranges × depths`.
///
/// The stored array may be shaped `[ranges, depths]` or `[depths, ranges]`;
/// the latter is transposed.
pub fn load_field(path: &Path, ranges: Vec<f64>, depths: Vec<f64>) -> Result<SoundSpeed> {
    let table = load_matrix(path, "c")?;
    let (nr, nz) = (ranges.len(), depths.len());
    let c = if table.dim() == (nr, nz) {
        table
    } else if table.dim() == (nz, nr) {
        table.t().as_standard_layout().to_owned()
    } else {
        return Err(RayError::ShapeMismatch {
            expected: vec![nr, nz],
            got: table.shape().to_vec(),
        });
    };
    SoundSpeed::field(ranges, depths, c)
}

/// Ray coordinates as an `n × 2` array of `(r, z)` rows.
///
/// Rays are concatenated in order with a row of NaN between consecutive rays.
pub fn rays_to_matrix(rays: &[RayTrajectory]) -> Result<Array2<f64>> {
    let rows: usize = rays.iter().map(|ray| ray.len()).sum::<usize>() + rays.len().saturating_sub(1);
    let mut data = Vec::with_capacity(rows * 2);
    for (k, ray) in rays.iter().enumerate() {
        if k > 0 {
            data.extend_from_slice(&[f64::NAN, f64::NAN]);
        }
        for (&r, &z) in ray.r.iter().zip(&ray.z) {
            data.push(r);
            data.push(z);
        }
    }
    Array2::from_shape_vec((rows, 2), data)
        .map_err(|e| RayError::Other(format!("shape error: {}", e)))
}

/// Columns of an arrival table row.
pub const ARRIVAL_COLUMNS: [&str; 11] = [
    "receiver",
    "r",
    "z",
    "theta_deg",
    "tau",
    "amp_re",
    "amp_im",
    "caustic_phase",
    "surface_reflections",
    "bottom_reflections",
    "object_reflections",
];

/// Arrivals as a table with one row per arrival, see [`ARRIVAL_COLUMNS`].
pub fn arrivals_to_matrix(arrivals: &[Vec<Arrival>]) -> Array2<f64> {
    let rows: usize = arrivals.iter().map(Vec::len).sum();
    let mut table = Array2::zeros((rows, ARRIVAL_COLUMNS.len()));
    for (mut row, a) in table.rows_mut().into_iter().zip(arrivals.iter().flatten()) {
        let values = [
            a.receiver as f64,
            a.position.r,
            a.position.z,
            a.theta.to_degrees(),
            a.tau,
            a.amplitude.re,
            a.amplitude.im,
            a.caustic_phase,
            a.surface_reflections as f64,
            a.bottom_reflections as f64,
            a.object_reflections as f64,
        ];
        for (cell, v) in row.iter_mut().zip(values) {
            *cell = v;
        }
    }
    table
}

/// Save a 2-D array, inferring the format from the extension.
///
/// `name` is the variable name used in .mat files.
pub fn save_matrix(path: &Path, name: &str, arr: &Array2<f64>) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Npy => ndarray_npy::write_npy(path, arr)
            .map_err(|e| RayError::Other(format!("npy write error: {}", e))),
        FileFormat::Mat => {
            let column_major: Vec<f64> = arr.t().iter().copied().collect();
            write_mat_level5(path, name, &[arr.nrows(), arr.ncols()], &column_major)
        }
    }
}

/// Save a ray fan as variable `rays`.
pub fn save_rays(path: &Path, rays: &[RayTrajectory]) -> Result<()> {
    save_matrix(path, "rays", &rays_to_matrix(rays)?)
}

/// Save an arrival table as variable `arrivals`.
pub fn save_arrivals(path: &Path, arrivals: &[Vec<Arrival>]) -> Result<()> {
    save_matrix(path, "arrivals", &arrivals_to_matrix(arrivals))
}

// Level 5 data types and array class
const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;

/// A tagged data element padded to 8 bytes.
fn element(data_type: u32, payload: &[u8]) -> Vec<u8> {
    let padded = payload.len().div_ceil(8) * 8;
    let mut out = Vec::with_capacity(8 + padded);
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.resize(8 + padded, 0);
    out
}

/// Write one real double matrix to a MAT-file Level 5 (uncompressed).
///
/// `data` must be column-major with `dims.iter().product()` entries.
fn write_mat_level5(path: &Path, name: &str, dims: &[usize], data: &[f64]) -> Result<()> {
    let flags: Vec<u8> = [MX_DOUBLE_CLASS, 0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let shape: Vec<u8> = dims
        .iter()
        .flat_map(|&d| (d as i32).to_le_bytes())
        .collect();
    let values: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();

    let mut body = element(MI_UINT32, &flags);
    body.extend(element(MI_INT32, &shape));
    body.extend(element(MI_INT8, name.as_bytes()));
    body.extend(element(MI_DOUBLE, &values));

    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);

    // 116 bytes of text, 8 bytes subsystem offset, version, endian marker
    let mut header = [b' '; 128];
    let text = b"MATLAB 5.0 MAT-file, created by ray-eikonal";
    header[..text.len()].copy_from_slice(text);
    header[116..124].fill(0);
    header[124..126].copy_from_slice(&0x0100u16.to_le_bytes());
    header[126..128].copy_from_slice(b"IM");
    w.write_all(&header)?;

    w.write_all(&MI_MATRIX.to_le_bytes())?;
    w.write_all(&(body.len() as u32).to_le_bytes())?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Vec2;
    use num_complex::Complex64;

    fn tmp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ray_eikonal_{}", name))
    }

    fn table() -> Array2<f64> {
        Array2::from_shape_vec(
            (3, 2),
            vec![0.0, 1520.0, 500.0, 1490.0, 1000.0, 1505.0],
        )
        .unwrap()
    }

    #[test]
    fn npy_profile_roundtrip() {
        let path = tmp("profile.npy");
        save_matrix(&path, "c", &table()).unwrap();
        let speed = load_profile(&path).unwrap();
        match speed {
            SoundSpeed::Tabulated { z, c } => {
                assert_eq!(z, vec![0.0, 500.0, 1000.0]);
                assert_eq!(c, vec![1520.0, 1490.0, 1505.0]);
            }
            other => panic!("expected a tabulated profile, got {:?}", other),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mat_profile_roundtrip() {
        let path = tmp("profile.mat");
        save_matrix(&path, "c", &table()).unwrap();
        let loaded = load_mat_matrix(&path, "c").unwrap();
        assert_eq!(loaded, table());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mat_missing_variable() {
        let path = tmp("missing.mat");
        save_matrix(&path, "speed", &table()).unwrap();
        let err = load_mat_matrix(&path, "c");
        match err {
            Err(RayError::MatVariableNotFound { expected, available }) => {
                assert_eq!(expected, "c");
                assert_eq!(available, vec!["speed".to_string()]);
            }
            other => panic!("unexpected result {:?}", other),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn profile_needs_two_columns() {
        let path = tmp("three_columns.npy");
        save_matrix(&path, "c", &Array2::from_elem((4, 3), 1500.0)).unwrap();
        assert!(matches!(
            load_profile(&path),
            Err(RayError::ShapeMismatch { .. })
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn field_accepts_depth_major_layout() {
        let path = tmp("field.mat");
        // 3 depths by 2 ranges
        let stored = Array2::from_shape_vec(
            (3, 2),
            vec![1500.0, 1501.0, 1510.0, 1511.0, 1520.0, 1521.0],
        )
        .unwrap();
        save_matrix(&path, "c", &stored).unwrap();
        let speed = load_field(&path, vec![0.0, 1000.0], vec![0.0, 50.0, 100.0]).unwrap();
        match speed {
            SoundSpeed::Field { c, .. } => {
                assert_eq!(c.dim(), (2, 3));
                assert_eq!(c[[1, 0]], 1501.0);
                assert_eq!(c[[0, 2]], 1520.0);
            }
            other => panic!("expected a field, got {:?}", other),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn field_shape_mismatch() {
        let path = tmp("field_bad.npy");
        save_matrix(&path, "c", &Array2::from_elem((4, 4), 1500.0)).unwrap();
        let err = load_field(&path, vec![0.0, 1.0], vec![0.0, 1.0, 2.0]);
        assert!(matches!(err, Err(RayError::ShapeMismatch { .. })));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rays_are_separated_by_nan_rows() {
        let mut a = RayTrajectory::with_capacity(0.0, 2);
        a.r = vec![0.0, 1.0];
        a.z = vec![5.0, 5.0];
        let mut b = RayTrajectory::with_capacity(0.1, 3);
        b.r = vec![0.0, 1.0, 2.0];
        b.z = vec![5.0, 6.0, 7.0];
        let m = rays_to_matrix(&[a, b]).unwrap();
        assert_eq!(m.dim(), (6, 2));
        assert!(m[[2, 0]].is_nan() && m[[2, 1]].is_nan());
        assert_eq!(m[[5, 1]], 7.0);
    }

    #[test]
    fn arrival_rows() {
        let arrival = Arrival {
            receiver: 3,
            position: Vec2::new(1000.0, 50.0),
            theta: 0.1,
            z: 50.001,
            tau: 0.667,
            amplitude: Complex64::new(1e-3, -2e-3),
            caustic_phase: 0.0,
            surface_reflections: 1,
            bottom_reflections: 2,
            object_reflections: 0,
            trajectory: RayTrajectory::with_capacity(0.1, 0),
        };
        let m = arrivals_to_matrix(&[vec![], vec![arrival]]);
        assert_eq!(m.dim(), (1, ARRIVAL_COLUMNS.len()));
        assert_eq!(m[[0, 0]], 3.0);
        assert!((m[[0, 3]] - 0.1f64.to_degrees()).abs() < 1e-12);
        assert_eq!(m[[0, 6]], -2e-3);
        assert_eq!(m[[0, 9]], 2.0);
    }

    #[test]
    fn unsupported_format() {
        let result = infer_format(Path::new("rays.txt"));
        assert!(matches!(result, Err(RayError::UnsupportedFileFormat(_))));
        assert_eq!(infer_format(Path::new("a.mat")).unwrap(), FileFormat::Mat);
    }
}
