// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::str::FromStr;

use ndarray::Array2;

use crate::core::{Medium, SpeedSample};
use crate::error::{RayError, Result};
use crate::interpolation::{
    bracket_extrapolating, degrading_stencil, interpolate_grid, stencil_1d, validate_increasing,
};

/// Munk profile scale depth (m).
const MUNK_SCALE: f64 = 1300.0;
/// Munk profile perturbation coefficient.
const MUNK_EPSILON: f64 = 0.00737;

/// Whether sound speed depends on depth only or on range and depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// c(z): depth-only profile.
    Profile,
    /// c(r, z): range-dependent field.
    Field,
}

impl FromStr for Distribution {
    type Err = RayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c(z,z)" | "profile" => Ok(Distribution::Profile),
            "c(r,z)" | "field" => Ok(Distribution::Field),
            _ => Err(RayError::UnknownTag {
                kind: "sound speed distribution",
                tag: s.to_string(),
            }),
        }
    }
}

/// Sound-speed class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedClass {
    /// Constant speed.
    Isovelocity,
    /// Linear in depth.
    Linear,
    /// Parabolic in depth.
    Parabolic,
    /// Exponential in depth.
    Exponential,
    /// Squared refraction index linear in depth.
    N2Linear,
    /// Slowness linear in depth (inverse-square speed gradient).
    InverseSquare,
    /// Munk canonical deep-water profile.
    Munk,
    /// Tabulated values.
    Tabulated,
}

impl FromStr for SpeedClass {
    type Err = RayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ISOV" => Ok(SpeedClass::Isovelocity),
            "LINP" => Ok(SpeedClass::Linear),
            "PARP" => Ok(SpeedClass::Parabolic),
            "EXPP" => Ok(SpeedClass::Exponential),
            "N2LP" => Ok(SpeedClass::N2Linear),
            "ISQP" => Ok(SpeedClass::InverseSquare),
            "MUNK" => Ok(SpeedClass::Munk),
            "TABL" => Ok(SpeedClass::Tabulated),
            _ => Err(RayError::UnknownTag {
                kind: "sound speed class",
                tag: s.to_string(),
            }),
        }
    }
}

/// Check that a distribution/class pair is meaningful.
///
/// Range-dependent fields only exist in tabulated form.
pub fn check_combination(distribution: Distribution, class: SpeedClass) -> Result<()> {
    if distribution == Distribution::Field && class != SpeedClass::Tabulated {
        return Err(RayError::UnknownTag {
            kind: "sound speed class for a c(r,z) field",
            tag: format!("{:?}", class),
        });
    }
    Ok(())
}

/// The sound-speed description of the waveguide.
#[derive(Debug, Clone)]
pub enum SoundSpeed {
    /// Analytic depth profile defined by two reference points.
    Profile {
        /// Profile class (never `Tabulated`).
        class: SpeedClass,
        /// First reference depth.
        z0: f64,
        /// Speed at `z0`.
        c0: f64,
        /// Second reference depth.
        z1: f64,
        /// Speed at `z1`.
        c1: f64,
    },
    /// Tabulated depth profile.
    Tabulated {
        /// Depths (strictly increasing).
        z: Vec<f64>,
        /// Speeds at `z`.
        c: Vec<f64>,
    },
    /// Tabulated range/depth field, `c[[ir, iz]]`.
    Field {
        /// Ranges (strictly increasing).
        r: Vec<f64>,
        /// Depths (strictly increasing).
        z: Vec<f64>,
        /// Speeds on the grid.
        c: Array2<f64>,
    },
}

fn check_speed(name: &'static str, c: f64) -> Result<()> {
    if !c.is_finite() || c <= 0.0 {
        return Err(RayError::InvalidParameter { name, value: c });
    }
    Ok(())
}

impl SoundSpeed {
    /// Uniform sound speed `c`.
    pub fn isovelocity(c: f64) -> Result<Self> {
        Self::profile(SpeedClass::Isovelocity, 0.0, c, 1.0, c)
    }

    /// Analytic profile through `(z0, c0)` and `(z1, c1)`.
    ///
    /// For the Munk class `(z0, c0)` is the channel axis and the second point
    /// is ignored.
    pub fn profile(class: SpeedClass, z0: f64, c0: f64, z1: f64, c1: f64) -> Result<Self> {
        if class == SpeedClass::Tabulated {
            return Err(RayError::UnknownTag {
                kind: "analytic sound speed class",
                tag: "TABL".to_string(),
            });
        }
        check_speed("c0", c0)?;
        if !matches!(class, SpeedClass::Isovelocity | SpeedClass::Munk) {
            check_speed("c1", c1)?;
            if !(z1 - z0).is_finite() || z1 == z0 {
                return Err(RayError::InvalidParameter {
                    name: "z1 - z0",
                    value: z1 - z0,
                });
            }
        }
        Ok(SoundSpeed::Profile {
            class,
            z0,
            c0,
            z1,
            c1,
        })
    }

    /// Tabulated depth profile.
    pub fn tabulated(z: Vec<f64>, c: Vec<f64>) -> Result<Self> {
        validate_increasing("sound speed depth", &z, 2)?;
        if c.len() != z.len() {
            return Err(RayError::ShapeMismatch {
                expected: vec![z.len()],
                got: vec![c.len()],
            });
        }
        for &v in &c {
            check_speed("tabulated c", v)?;
        }
        Ok(SoundSpeed::Tabulated { z, c })
    }

    /// Tabulated range/depth field with `c` shaped `[r.len(), z.len()]`.
    pub fn field(r: Vec<f64>, z: Vec<f64>, c: Array2<f64>) -> Result<Self> {
        validate_increasing("sound speed range", &r, 2)?;
        validate_increasing("sound speed depth", &z, 2)?;
        if c.dim() != (r.len(), z.len()) {
            return Err(RayError::ShapeMismatch {
                expected: vec![r.len(), z.len()],
                got: c.shape().to_vec(),
            });
        }
        for &v in c.iter() {
            check_speed("tabulated c", v)?;
        }
        Ok(SoundSpeed::Field { r, z, c })
    }

    /// The distribution this description belongs to.
    pub fn distribution(&self) -> Distribution {
        match self {
            SoundSpeed::Field { .. } => Distribution::Field,
            _ => Distribution::Profile,
        }
    }

    /// Evaluate sound speed and its derivatives at `(r, z)`.
    pub fn evaluate(&self, r: f64, z: f64) -> Result<SpeedSample> {
        match self {
            SoundSpeed::Profile {
                class,
                z0,
                c0,
                z1,
                c1,
            } => {
                let (c, dc, ddc) = analytic_profile(*class, *z0, *c0, *z1, *c1, z)?;
                Ok(SpeedSample::new(c, 0.0, dc, 0.0, ddc, 0.0))
            }
            SoundSpeed::Tabulated { z: zt, c: ct } => {
                let i = bracket_extrapolating(zt, z)?;
                let (start, k) = degrading_stencil(zt.len(), i, 4);
                let out = stencil_1d(zt, ct, start, k, z);
                Ok(SpeedSample::new(out.value, 0.0, out.d1, 0.0, out.d2, 0.0))
            }
            SoundSpeed::Field { r: rt, z: zt, c } => {
                let out = interpolate_grid(rt, zt, c.view(), r, z)?;
                Ok(SpeedSample::new(
                    out.value, out.dr, out.dz, out.drr, out.dzz, out.drz,
                ))
            }
        }
    }
}

impl Medium for SoundSpeed {
    fn speed(&self, r: f64, z: f64) -> Result<SpeedSample> {
        self.evaluate(r, z)
    }
}

/// Closed-form c(z), dc/dz and d²c/dz² for the analytic classes.
fn analytic_profile(
    class: SpeedClass,
    z0: f64,
    c0: f64,
    z1: f64,
    c1: f64,
    z: f64,
) -> Result<(f64, f64, f64)> {
    let dz = z - z0;
    let out = match class {
        SpeedClass::Isovelocity => (c0, 0.0, 0.0),
        SpeedClass::Linear => {
            let k = (c1 - c0) / (z1 - z0);
            (c0 + k * dz, k, 0.0)
        }
        SpeedClass::Parabolic => {
            let k = (c1 - c0) / ((z1 - z0) * (z1 - z0));
            (c0 + k * dz * dz, 2.0 * k * dz, 2.0 * k)
        }
        SpeedClass::Exponential => {
            let a = (c0 / c1).ln() / (z1 - z0);
            let c = c0 * (-a * dz).exp();
            (c, -a * c, a * a * c)
        }
        SpeedClass::N2Linear => {
            let a = ((c0 / c1).powi(2) - 1.0) / (z1 - z0);
            let u = 1.0 + a * dz;
            if u <= 0.0 {
                return Err(RayError::InvalidParameter {
                    name: "n2-linear profile depth",
                    value: z,
                });
            }
            let c = c0 / u.sqrt();
            (c, -0.5 * a * c / u, 0.75 * a * a * c / (u * u))
        }
        SpeedClass::InverseSquare => {
            let a = (1.0 / c1 - 1.0 / c0) / (z1 - z0);
            let slowness = 1.0 / c0 + a * dz;
            if slowness <= 0.0 {
                return Err(RayError::InvalidParameter {
                    name: "inverse-square profile depth",
                    value: z,
                });
            }
            let c = 1.0 / slowness;
            (c, -a * c * c, 2.0 * a * a * c * c * c)
        }
        SpeedClass::Munk => {
            let eta = 2.0 * dz / MUNK_SCALE;
            let e = (-eta).exp();
            let g = 2.0 / MUNK_SCALE;
            (
                c0 * (1.0 + MUNK_EPSILON * (eta + e - 1.0)),
                c0 * MUNK_EPSILON * g * (1.0 - e),
                c0 * MUNK_EPSILON * g * g * e,
            )
        }
        SpeedClass::Tabulated => {
            return Err(RayError::UnknownTag {
                kind: "analytic sound speed class",
                tag: "TABL".to_string(),
            })
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_derivatives(ssp: &SoundSpeed, z: f64) -> (f64, f64) {
        let h = 1e-3;
        let cp = ssp.evaluate(0.0, z + h).unwrap().c;
        let cm = ssp.evaluate(0.0, z - h).unwrap().c;
        let c = ssp.evaluate(0.0, z).unwrap().c;
        ((cp - cm) / (2.0 * h), (cp - 2.0 * c + cm) / (h * h))
    }

    #[test]
    fn profiles_pass_through_reference_points() {
        for class in [
            SpeedClass::Linear,
            SpeedClass::Parabolic,
            SpeedClass::Exponential,
            SpeedClass::N2Linear,
            SpeedClass::InverseSquare,
        ] {
            let ssp = SoundSpeed::profile(class, 0.0, 1500.0, 1000.0, 1540.0).unwrap();
            let a = ssp.evaluate(0.0, 0.0).unwrap();
            let b = ssp.evaluate(0.0, 1000.0).unwrap();
            assert!((a.c - 1500.0).abs() < 1e-9, "{:?}", class);
            assert!((b.c - 1540.0).abs() < 1e-9, "{:?}", class);
            assert_eq!(a.grad.r, 0.0);
        }
    }

    #[test]
    fn analytic_derivatives_match_finite_differences() {
        for class in [
            SpeedClass::Linear,
            SpeedClass::Parabolic,
            SpeedClass::Exponential,
            SpeedClass::N2Linear,
            SpeedClass::InverseSquare,
            SpeedClass::Munk,
        ] {
            let ssp = SoundSpeed::profile(class, 1000.0, 1500.0, 3000.0, 1530.0).unwrap();
            for &z in &[200.0, 1000.0, 2500.0] {
                let s = ssp.evaluate(5.0, z).unwrap();
                let (d1, d2) = numeric_derivatives(&ssp, z);
                assert!((s.grad.z - d1).abs() < 1e-6, "{:?} dc/dz at {}", class, z);
                assert!((s.czz - d2).abs() < 1e-5, "{:?} d2c/dz2 at {}", class, z);
            }
        }
    }

    #[test]
    fn munk_minimum_on_axis() {
        let ssp = SoundSpeed::profile(SpeedClass::Munk, 1300.0, 1500.0, 0.0, 0.0).unwrap();
        let axis = ssp.evaluate(0.0, 1300.0).unwrap();
        assert!((axis.c - 1500.0).abs() < 1e-12);
        assert!(axis.grad.z.abs() < 1e-12);
        assert!(ssp.evaluate(0.0, 500.0).unwrap().c > 1500.0);
        assert!(ssp.evaluate(0.0, 4000.0).unwrap().c > 1500.0);
    }

    #[test]
    fn slowness_gradient_consistent() {
        let ssp = SoundSpeed::profile(SpeedClass::Linear, 0.0, 1500.0, 100.0, 1510.0).unwrap();
        let s = ssp.evaluate(0.0, 50.0).unwrap();
        assert!((s.c - 1505.0).abs() < 1e-12);
        assert!((s.c2 - 1505.0 * 1505.0).abs() < 1e-6);
        assert!((s.inv_c - 1.0 / 1505.0).abs() < 1e-15);
        assert!((s.slowness_grad.z + 0.1 / (1505.0 * 1505.0)).abs() < 1e-15);
    }

    #[test]
    fn tabulated_profile_interpolates_cubic_exactly() {
        let z: Vec<f64> = (0..8).map(|k| k as f64 * 25.0).collect();
        let f = |z: f64| 1500.0 + 0.05 * z - 2e-4 * z * z + 1e-7 * z * z * z;
        let c: Vec<f64> = z.iter().map(|&d| f(d)).collect();
        let ssp = SoundSpeed::tabulated(z, c).unwrap();
        let s = ssp.evaluate(0.0, 80.0).unwrap();
        assert!((s.c - f(80.0)).abs() < 1e-9);
        // end interval degrades to parabolic: value still exact at nodes
        let end = ssp.evaluate(0.0, 175.0).unwrap();
        assert!((end.c - f(175.0)).abs() < 1e-9);
    }

    #[test]
    fn field_is_range_dependent() {
        let r = vec![0.0, 500.0, 1000.0];
        let z = vec![0.0, 50.0, 100.0];
        let c = Array2::from_shape_fn((3, 3), |(i, j)| 1500.0 + 0.01 * r[i] + 0.1 * z[j]);
        let ssp = SoundSpeed::field(r, z, c).unwrap();
        let s = ssp.evaluate(250.0, 30.0).unwrap();
        assert!((s.c - 1505.5).abs() < 1e-9);
        assert!((s.grad.r - 0.01).abs() < 1e-12);
        assert!((s.grad.z - 0.1).abs() < 1e-12);
        assert_eq!(ssp.distribution(), Distribution::Field);
    }

    #[test]
    fn tags_parse_and_reject() {
        assert_eq!("munk".parse::<SpeedClass>().unwrap(), SpeedClass::Munk);
        assert_eq!(
            "c(r,z)".parse::<Distribution>().unwrap(),
            Distribution::Field
        );
        assert!(matches!(
            "XXXX".parse::<SpeedClass>(),
            Err(RayError::UnknownTag { .. })
        ));
        assert!(check_combination(Distribution::Field, SpeedClass::Linear).is_err());
        assert!(check_combination(Distribution::Field, SpeedClass::Tabulated).is_ok());
    }

    #[test]
    fn invalid_tables_rejected() {
        assert!(SoundSpeed::tabulated(vec![0.0, 0.0], vec![1500.0, 1500.0]).is_err());
        assert!(SoundSpeed::tabulated(vec![0.0, 10.0], vec![1500.0]).is_err());
        assert!(SoundSpeed::field(vec![0.0, 1.0], vec![0.0, 1.0], Array2::zeros((2, 2))).is_err());
        assert!(SoundSpeed::profile(SpeedClass::Linear, 10.0, 1500.0, 10.0, 1510.0).is_err());
    }
}
