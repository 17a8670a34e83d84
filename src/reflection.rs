// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::f64::consts::{LOG10_E, PI};
use std::str::FromStr;

use num_complex::Complex64;

use crate::core::Vec2;
use crate::error::{RayError, Result};

/// dB per neper.
const DB_PER_NEPER: f64 = 8.685_889_638_065_037;

/// How a surface treats an incident ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceClass {
    /// Fully absorbing: the ray stops.
    Absorbent,
    /// Elastic half-space with a physical reflection coefficient.
    Elastic,
    /// Perfectly rigid: coefficient +1.
    Rigid,
    /// Pressure release: coefficient -1.
    Vacuum,
}

impl FromStr for SurfaceClass {
    type Err = RayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" | "ABSORBENT" => Ok(SurfaceClass::Absorbent),
            "E" | "ELASTIC" => Ok(SurfaceClass::Elastic),
            "R" | "RIGID" => Ok(SurfaceClass::Rigid),
            "V" | "VACUUM" => Ok(SurfaceClass::Vacuum),
            _ => Err(RayError::UnknownTag {
                kind: "surface class",
                tag: s.to_string(),
            }),
        }
    }
}

/// Units in which interface attenuations are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttenuationUnits {
    /// dB/(kHz·m).
    DbPerKhz,
    /// dB/m.
    DbPerMeter,
    /// Nepers/m.
    DbPerNeper,
    /// Quality factor Q.
    QFactor,
    /// dB per wavelength.
    DbPerWavelength,
}

impl FromStr for AttenuationUnits {
    type Err = RayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "F" => Ok(AttenuationUnits::DbPerKhz),
            "M" => Ok(AttenuationUnits::DbPerMeter),
            "N" => Ok(AttenuationUnits::DbPerNeper),
            "Q" => Ok(AttenuationUnits::QFactor),
            "W" => Ok(AttenuationUnits::DbPerWavelength),
            _ => Err(RayError::UnknownTag {
                kind: "attenuation unit",
                tag: s.to_string(),
            }),
        }
    }
}

impl AttenuationUnits {
    /// Convert an attenuation to dB per wavelength for a wave of speed `c` at `frequency` Hz.
    pub fn to_db_per_wavelength(self, alpha: f64, c: f64, frequency: f64) -> f64 {
        let wavelength = c / frequency;
        match self {
            AttenuationUnits::DbPerKhz => alpha * c / 1000.0,
            AttenuationUnits::DbPerMeter => alpha * wavelength,
            AttenuationUnits::DbPerNeper => alpha * DB_PER_NEPER * wavelength,
            AttenuationUnits::QFactor => {
                if alpha > 0.0 {
                    20.0 * PI * LOG10_E / alpha
                } else {
                    0.0
                }
            }
            AttenuationUnits::DbPerWavelength => alpha,
        }
    }
}

/// Material properties of the medium beyond an interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Compressional speed (m/s).
    pub cp: f64,
    /// Shear speed (m/s); zero for a fluid.
    pub cs: f64,
    /// Density relative to water.
    pub rho: f64,
    /// Compressional attenuation.
    pub alpha_p: f64,
    /// Shear attenuation.
    pub alpha_s: f64,
}

impl Material {
    /// Create a material.
    pub const fn new(cp: f64, cs: f64, rho: f64, alpha_p: f64, alpha_s: f64) -> Self {
        Material {
            cp,
            cs,
            rho,
            alpha_p,
            alpha_s,
        }
    }

    /// Linear blend `self + t (other - self)`.
    pub fn lerp(&self, other: &Material, t: f64) -> Material {
        let mix = |a: f64, b: f64| a + t * (b - a);
        Material::new(
            mix(self.cp, other.cp),
            mix(self.cs, other.cs),
            mix(self.rho, other.rho),
            mix(self.alpha_p, other.alpha_p),
            mix(self.alpha_s, other.alpha_s),
        )
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::new(1500.0, 0.0, 1.0, 0.0, 0.0)
    }
}

/// Reflect `incident` about the surface with unit `normal`.
///
/// Returns the reflected direction and the angle (radians) between the
/// normal and the reflected ray.
pub fn specular_reflection(normal: Vec2, incident: Vec2) -> (Vec2, f64) {
    let reflected = incident - normal * (2.0 * incident.dot(normal));
    let theta = normal.dot(reflected).clamp(-1.0, 1.0).acos();
    (reflected, theta)
}

/// Complex speed `c / (1 + iδ)` for an attenuation in dB per wavelength.
fn lossy_speed(c: f64, alpha_db_per_wavelength: f64) -> Complex64 {
    let delta = alpha_db_per_wavelength / (40.0 * PI * LOG10_E);
    Complex64::new(c, 0.0) / Complex64::new(1.0, delta)
}

/// Plane-wave reflection coefficient of a fluid over an elastic half-space.
///
/// `theta` is the angle of incidence measured from the normal. Attenuations
/// are in dB per wavelength. A zero shear speed gives the fluid-fluid result.
#[allow(clippy::too_many_arguments)]
pub fn reflection_coefficient(
    rho1: f64,
    rho2: f64,
    cp1: f64,
    cp2: f64,
    cs2: f64,
    alpha_p: f64,
    alpha_s: f64,
    theta: f64,
) -> Complex64 {
    let cos1 = theta.cos();
    if cos1.abs() < 1e-12 {
        return Complex64::new(-1.0, 0.0);
    }
    let sin1 = theta.sin();
    let one = Complex64::new(1.0, 0.0);

    let cp = lossy_speed(cp2, alpha_p);
    let sin_p = cp / cp1 * sin1;
    let cos_p = (one - sin_p * sin_p).sqrt();
    let z1 = Complex64::new(rho1 * cp1 / cos1, 0.0);
    let zp = cp * rho2 / cos_p;

    let z = if cs2 > 0.0 {
        let cs = lossy_speed(cs2, alpha_s);
        let sin_s = cs / cp1 * sin1;
        let cos_s = (one - sin_s * sin_s).sqrt();
        let zs = cs * rho2 / cos_s;
        let sin2s = sin_s * cos_s * 2.0;
        let cos2s = one - sin_s * sin_s * 2.0;
        zp * cos2s * cos2s + zs * sin2s * sin2s
    } else {
        zp
    };

    (z - z1) / (z + z1)
}

/// Reflection coefficient for a surface of the given class.
///
/// `c_water` is the sound speed at the reflection point and `theta` the angle
/// of incidence from the normal. Water density is taken as 1.
pub fn surface_coefficient(
    class: SurfaceClass,
    material: &Material,
    units: AttenuationUnits,
    frequency: f64,
    c_water: f64,
    theta: f64,
) -> Complex64 {
    match class {
        SurfaceClass::Absorbent => Complex64::new(0.0, 0.0),
        SurfaceClass::Rigid => Complex64::new(1.0, 0.0),
        SurfaceClass::Vacuum => Complex64::new(-1.0, 0.0),
        SurfaceClass::Elastic => {
            let ap = units.to_db_per_wavelength(material.alpha_p, material.cp, frequency);
            let as_ = if material.cs > 0.0 {
                units.to_db_per_wavelength(material.alpha_s, material.cs, frequency)
            } else {
                0.0
            };
            reflection_coefficient(
                1.0,
                material.rho,
                c_water,
                material.cp,
                material.cs,
                ap,
                as_,
                theta,
            )
        }
    }
}

/// Thorp's volume absorption at `frequency` Hz, in nepers per metre.
pub fn thorp_attenuation(frequency: f64) -> f64 {
    let f2 = (frequency / 1000.0).powi(2);
    let db_per_km = 0.11 * f2 / (1.0 + f2) + 44.0 * f2 / (4100.0 + f2) + 2.75e-4 * f2 + 0.003;
    db_per_km / (DB_PER_NEPER * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specular_reflection_properties() {
        let normal = Vec2::new(0.3, -0.8).normalized();
        let incident = Vec2::from_angle(0.7);
        let (reflected, theta) = specular_reflection(normal, incident);
        assert!((reflected.norm() - 1.0).abs() < 1e-12);
        let (back, _) = specular_reflection(normal, reflected);
        assert!((back - incident).norm() < 1e-12);
        assert!((theta - normal.dot(reflected).acos()).abs() < 1e-12);
    }

    #[test]
    fn flat_surface_reflection_flips_depth_component() {
        let normal = Vec2::new(0.0, 1.0);
        let incident = Vec2::from_angle(-0.3);
        let (reflected, theta) = specular_reflection(normal, incident);
        assert!((reflected.r - incident.r).abs() < 1e-15);
        assert!((reflected.z + incident.z).abs() < 1e-15);
        assert!((theta - (PI / 2.0 - 0.3)).abs() < 1e-12);
    }

    #[test]
    fn ideal_surfaces_for_all_angles() {
        let m = Material::default();
        for k in 0..=18 {
            let theta = k as f64 * PI / 36.0;
            let args = (&m, AttenuationUnits::DbPerWavelength, 100.0, 1500.0, theta);
            let rigid = surface_coefficient(SurfaceClass::Rigid, args.0, args.1, args.2, args.3, args.4);
            let vacuum = surface_coefficient(SurfaceClass::Vacuum, args.0, args.1, args.2, args.3, args.4);
            let absorbent =
                surface_coefficient(SurfaceClass::Absorbent, args.0, args.1, args.2, args.3, args.4);
            assert_eq!(rigid, Complex64::new(1.0, 0.0));
            assert_eq!(vacuum, Complex64::new(-1.0, 0.0));
            assert_eq!(absorbent, Complex64::new(0.0, 0.0));
        }
    }

    #[test]
    fn fluid_normal_incidence_matches_impedance_contrast() {
        let r = reflection_coefficient(1.0, 1.8, 1500.0, 1700.0, 0.0, 0.0, 0.0, 0.0);
        let expected = (1.8 * 1700.0 - 1500.0) / (1.8 * 1700.0 + 1500.0);
        assert!((r.re - expected).abs() < 1e-12);
        assert!(r.im.abs() < 1e-12);
    }

    #[test]
    fn lossless_fluid_total_reflection_beyond_critical_angle() {
        // critical angle from normal: asin(1500/1700)
        let critical = (1500.0f64 / 1700.0).asin();
        let r = reflection_coefficient(1.0, 1.8, 1500.0, 1700.0, 0.0, 0.0, 0.0, critical + 0.1);
        assert!((r.norm() - 1.0).abs() < 1e-9);
        let below = reflection_coefficient(1.0, 1.8, 1500.0, 1700.0, 0.0, 0.0, 0.0, critical - 0.3);
        assert!(below.norm() < 1.0);
    }

    #[test]
    fn attenuation_reduces_magnitude() {
        let theta = 1.3;
        let lossless = reflection_coefficient(1.0, 1.8, 1500.0, 1700.0, 400.0, 0.0, 0.0, theta);
        let lossy = reflection_coefficient(1.0, 1.8, 1500.0, 1700.0, 400.0, 0.5, 0.5, theta);
        assert!(lossy.norm() < lossless.norm());
        assert!(lossy.norm() <= 1.0);
    }

    #[test]
    fn grazing_incidence_is_pressure_release() {
        let r = reflection_coefficient(1.0, 1.8, 1500.0, 1700.0, 400.0, 0.5, 0.5, PI / 2.0);
        assert_eq!(r, Complex64::new(-1.0, 0.0));
    }

    #[test]
    fn unit_conversions() {
        let c = 1600.0;
        let f = 800.0;
        let w = AttenuationUnits::DbPerWavelength;
        assert_eq!(w.to_db_per_wavelength(0.5, c, f), 0.5);
        let m = AttenuationUnits::DbPerMeter.to_db_per_wavelength(0.01, c, f);
        assert!((m - 0.02).abs() < 1e-12);
        let k = AttenuationUnits::DbPerKhz.to_db_per_wavelength(0.5, c, f);
        assert!((k - 0.8).abs() < 1e-12);
        let n = AttenuationUnits::DbPerNeper.to_db_per_wavelength(1.0, c, f);
        assert!((n - DB_PER_NEPER * 2.0).abs() < 1e-9);
        let q = AttenuationUnits::QFactor.to_db_per_wavelength(100.0, c, f);
        assert!((q - 0.272_875).abs() < 1e-5);
        assert!("X".parse::<AttenuationUnits>().is_err());
        assert_eq!("w".parse::<AttenuationUnits>().unwrap(), w);
    }

    #[test]
    fn thorp_values() {
        // about 0.069 dB/km at 1 kHz
        let alpha_db_km = thorp_attenuation(1000.0) * DB_PER_NEPER * 1000.0;
        assert!((alpha_db_km - 0.0686).abs() < 1e-3, "{}", alpha_db_km);
        assert!(thorp_attenuation(10_000.0) > thorp_attenuation(1000.0));
    }

    #[test]
    fn surface_class_tags() {
        assert_eq!("V".parse::<SurfaceClass>().unwrap(), SurfaceClass::Vacuum);
        assert_eq!("elastic".parse::<SurfaceClass>().unwrap(), SurfaceClass::Elastic);
        assert!("Z".parse::<SurfaceClass>().is_err());
    }
}
