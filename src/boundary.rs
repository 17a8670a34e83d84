// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::str::FromStr;

use crate::core::Vec2;
use crate::error::{RayError, Result};
use crate::interpolation::{bracket, clamped_stencil, stencil_1d, validate_increasing};
use crate::reflection::{AttenuationUnits, Material, SurfaceClass};

/// Number of samples along a segment when searching a curved interface.
const INTERSECTION_SAMPLES: usize = 101;

/// Depths closer to zero than this snap to exactly zero.
const SURFACE_SNAP: f64 = 1e-10;

/// How an interface is interpolated between control points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Constant depth (first control point).
    Flat,
    /// Straight line through the first and last control points.
    Sloped,
    /// Piecewise linear.
    Linear,
    /// Piecewise barycentric parabolic.
    Parabolic,
    /// Piecewise barycentric cubic.
    Cubic,
}

impl InterpolationMode {
    /// Control points in one interpolation stencil.
    pub fn stencil_points(self) -> usize {
        match self {
            InterpolationMode::Flat => 1,
            InterpolationMode::Sloped | InterpolationMode::Linear => 2,
            InterpolationMode::Parabolic => 3,
            InterpolationMode::Cubic => 4,
        }
    }
}

impl FromStr for InterpolationMode {
    type Err = RayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FL" | "FLAT" => Ok(InterpolationMode::Flat),
            "SL" | "SLOPED" => Ok(InterpolationMode::Sloped),
            "2P" | "LINEAR" => Ok(InterpolationMode::Linear),
            "3P" | "PARABOLIC" => Ok(InterpolationMode::Parabolic),
            "4P" | "CUBIC" => Ok(InterpolationMode::Cubic),
            _ => Err(RayError::UnknownTag {
                kind: "interface interpolation",
                tag: s.to_string(),
            }),
        }
    }
}

/// Material properties of an interface.
#[derive(Debug, Clone, PartialEq)]
pub enum Properties {
    /// One material everywhere.
    Homogeneous(Material),
    /// One material per control point, interpolated linearly in range.
    PerPoint(Vec<Material>),
}

/// Depth, tangent and normal of an interface at one range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryPoint {
    /// Interface depth.
    pub depth: f64,
    /// Unit tangent, oriented toward increasing range.
    pub tangent: Vec2,
    /// Unit normal, the tangent rotated by +90 degrees.
    pub normal: Vec2,
}

/// A piecewise-defined reflecting surface.
#[derive(Debug, Clone)]
pub struct Interface {
    r: Vec<f64>,
    z: Vec<f64>,
    mode: InterpolationMode,
    class: SurfaceClass,
    properties: Properties,
    units: AttenuationUnits,
}

impl Interface {
    /// Create an interface through the control points `(r[i], z[i])`.
    ///
    /// Ranges must be strictly increasing, with at least as many points as
    /// the interpolation stencil needs (and never fewer than two).
    pub fn new(
        r: Vec<f64>,
        z: Vec<f64>,
        mode: InterpolationMode,
        class: SurfaceClass,
    ) -> Result<Self> {
        let min_len = mode.stencil_points().max(2);
        validate_increasing("interface range", &r, min_len)?;
        if z.len() != r.len() {
            return Err(RayError::ShapeMismatch {
                expected: vec![r.len()],
                got: vec![z.len()],
            });
        }
        if let Some(&bad) = z.iter().find(|v| !v.is_finite()) {
            return Err(RayError::InvalidParameter {
                name: "interface depth",
                value: bad,
            });
        }
        Ok(Interface {
            r,
            z,
            mode,
            class,
            properties: Properties::Homogeneous(Material::default()),
            units: AttenuationUnits::DbPerWavelength,
        })
    }

    /// A flat interface at `depth` spanning `[r0, r1]`.
    pub fn flat(depth: f64, r0: f64, r1: f64, class: SurfaceClass) -> Result<Self> {
        Self::new(
            vec![r0, r1],
            vec![depth, depth],
            InterpolationMode::Flat,
            class,
        )
    }

    /// Use one material everywhere.
    pub fn with_material(mut self, material: Material, units: AttenuationUnits) -> Self {
        self.properties = Properties::Homogeneous(material);
        self.units = units;
        self
    }

    /// Use one material per control point.
    pub fn with_point_materials(
        mut self,
        materials: Vec<Material>,
        units: AttenuationUnits,
    ) -> Result<Self> {
        if materials.len() != self.r.len() {
            return Err(RayError::ShapeMismatch {
                expected: vec![self.r.len()],
                got: vec![materials.len()],
            });
        }
        self.properties = Properties::PerPoint(materials);
        self.units = units;
        Ok(self)
    }

    /// Interpolation mode.
    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    /// Surface class.
    pub fn class(&self) -> SurfaceClass {
        self.class
    }

    /// Attenuation units of the material.
    pub fn units(&self) -> AttenuationUnits {
        self.units
    }

    /// Control-point ranges.
    pub fn ranges(&self) -> &[f64] {
        &self.r
    }

    /// Control-point depths.
    pub fn depths(&self) -> &[f64] {
        &self.z
    }

    /// First and last control-point range.
    pub fn span(&self) -> (f64, f64) {
        (self.r[0], self.r[self.r.len() - 1])
    }

    /// True if the interface is defined at range `r`.
    pub fn covers(&self, r: f64) -> bool {
        let (lo, hi) = self.span();
        r >= lo && r <= hi
    }

    /// Depth of the interface at range `r`.
    pub fn depth_at(&self, r: f64) -> Result<f64> {
        Ok(self.depth_and_slope(r)?.0)
    }

    fn depth_and_slope(&self, r: f64) -> Result<(f64, f64)> {
        let n = self.r.len();
        match self.mode {
            InterpolationMode::Flat => Ok((self.z[0], 0.0)),
            InterpolationMode::Sloped => {
                let slope = (self.z[n - 1] - self.z[0]) / (self.r[n - 1] - self.r[0]);
                Ok((self.z[0] + slope * (r - self.r[0]), slope))
            }
            InterpolationMode::Linear | InterpolationMode::Parabolic | InterpolationMode::Cubic => {
                let i = bracket(&self.r, r)?;
                let k = self.mode.stencil_points();
                let start = clamped_stencil(n, i, k);
                let out = stencil_1d(&self.r, &self.z, start, k, r);
                Ok((out.value, out.d1))
            }
        }
    }

    /// Depth, tangent and normal at range `r`.
    pub fn evaluate(&self, r: f64) -> Result<BoundaryPoint> {
        let (depth, slope) = self.depth_and_slope(r)?;
        let angle = slope.atan();
        let mut tangent = Vec2::new(angle.cos(), angle.sin()).normalized();
        if tangent.r.abs() == 1.0 {
            tangent.z = 0.0;
        }
        if tangent.z.abs() == 1.0 {
            tangent.r = 0.0;
        }
        Ok(BoundaryPoint {
            depth,
            tangent,
            normal: tangent.rotated(),
        })
    }

    /// Point where the segment `a -> b` crosses the interface.
    ///
    /// `b` is expected to lie on the far side of the interface.
    pub fn intersect(&self, a: Vec2, b: Vec2) -> Result<Vec2> {
        let d = b - a;
        let hit = match self.mode {
            InterpolationMode::Flat => {
                let zi = self.z[0];
                if d.z == 0.0 {
                    Vec2::new(b.r, zi)
                } else {
                    Vec2::new(a.r + (zi - a.z) * d.r / d.z, zi)
                }
            }
            InterpolationMode::Sloped => {
                let n = self.r.len();
                let slope = (self.z[n - 1] - self.z[0]) / (self.r[n - 1] - self.r[0]);
                let denom = d.z - slope * d.r;
                if denom == 0.0 {
                    b
                } else {
                    let t = (self.z[0] + slope * (a.r - self.r[0]) - a.z) / denom;
                    a + d * t
                }
            }
            _ => self.sampled_intersection(a, b)?,
        };
        let z = if hit.z.abs() < SURFACE_SNAP { 0.0 } else { hit.z };
        Ok(Vec2::new(hit.r, z))
    }

    fn sampled_intersection(&self, a: Vec2, b: Vec2) -> Result<Vec2> {
        let d = b - a;
        let gap = |t: f64| -> Result<f64> {
            let p = a + d * t;
            Ok(self.depth_at(p.r)? - p.z)
        };
        let far = gap(1.0)?;
        let steps = (INTERSECTION_SAMPLES - 1) as f64;
        let mut t0 = 0.0;
        let mut f0 = gap(0.0)?;
        for k in 1..INTERSECTION_SAMPLES {
            let t1 = k as f64 / steps;
            let f1 = gap(t1)?;
            if f1 * far > 0.0 && f0 * far <= 0.0 {
                let t = if f1 != f0 {
                    t0 - f0 * (t1 - t0) / (f1 - f0)
                } else {
                    t1
                };
                return Ok(a + d * t);
            }
            t0 = t1;
            f0 = f1;
        }
        Err(RayError::Other(format!(
            "segment ({}, {}) -> ({}, {}) does not cross the interface",
            a.r, a.z, b.r, b.z
        )))
    }

    /// Material at range `r`.
    pub fn material_at(&self, r: f64) -> Result<Material> {
        match &self.properties {
            Properties::Homogeneous(m) => Ok(*m),
            Properties::PerPoint(ms) => {
                let i = bracket(&self.r, r)?;
                let t = (r - self.r[i]) / (self.r[i + 1] - self.r[i]);
                Ok(ms[i].lerp(&ms[i + 1], t))
            }
        }
    }
}

/// Which face of an object a ray struck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    /// The upper face: water lies above it.
    Upper,
    /// The lower face: water lies below it.
    Lower,
}

/// A closed obstacle bounded by an upper and a lower face.
#[derive(Debug, Clone)]
pub struct Object {
    upper: Interface,
    lower: Interface,
}

/// End-depth mismatch tolerance for object faces.
const CLOSURE_TOLERANCE: f64 = 1e-9;

impl Object {
    /// Build an object from its faces.
    ///
    /// Both faces must span the same ranges and meet at both ends. `index` is
    /// only used for error reporting.
    pub fn new(index: usize, upper: Interface, lower: Interface) -> Result<Self> {
        let (u0, u1) = upper.span();
        let (l0, l1) = lower.span();
        if u0 != l0 || u1 != l1 {
            return Err(RayError::InconsistentObject {
                index,
                reason: format!("face spans differ: [{}, {}] vs [{}, {}]", u0, u1, l0, l1),
            });
        }
        for edge in [u0, u1] {
            let zu = upper.depth_at(edge)?;
            let zl = lower.depth_at(edge)?;
            if (zu - zl).abs() > CLOSURE_TOLERANCE {
                return Err(RayError::InconsistentObject {
                    index,
                    reason: format!(
                        "faces do not meet at r = {}: upper {} vs lower {}",
                        edge, zu, zl
                    ),
                });
            }
        }
        for (&r, &zu) in upper.ranges().iter().zip(upper.depths()) {
            if zu > lower.depth_at(r)? + CLOSURE_TOLERANCE {
                return Err(RayError::InconsistentObject {
                    index,
                    reason: format!("upper face below lower face at r = {}", r),
                });
            }
        }
        Ok(Object { upper, lower })
    }

    /// The upper face.
    pub fn upper(&self) -> &Interface {
        &self.upper
    }

    /// The lower face.
    pub fn lower(&self) -> &Interface {
        &self.lower
    }

    /// The given face.
    pub fn face(&self, face: Face) -> &Interface {
        match face {
            Face::Upper => &self.upper,
            Face::Lower => &self.lower,
        }
    }

    /// Range span shared by both faces.
    pub fn span(&self) -> (f64, f64) {
        self.upper.span()
    }

    /// True if `p` lies strictly inside the object.
    pub fn contains(&self, p: Vec2) -> bool {
        let (lo, hi) = self.span();
        if !(p.r > lo && p.r < hi) {
            return false;
        }
        match (self.upper.depth_at(p.r), self.lower.depth_at(p.r)) {
            (Ok(zu), Ok(zl)) => p.z > zu && p.z < zl,
            _ => false,
        }
    }

    /// The face struck by a segment `a -> b` whose end lies inside the object,
    /// with the point the search should start from.
    ///
    /// When `a` is inside the object's range span the face is chosen by
    /// whether `a` sits above or below the object. Otherwise the segment
    /// entered through an end; the face follows from whether the segment's
    /// depth at that end is above or below the tip.
    pub fn entry_face(&self, a: Vec2, b: Vec2) -> Result<(Face, Vec2)> {
        let (lo, hi) = self.span();
        if a.r >= lo && a.r <= hi {
            let face = if a.z <= self.upper.depth_at(a.r)? {
                Face::Upper
            } else {
                Face::Lower
            };
            return Ok((face, a));
        }
        let edge = if b.r > a.r { lo } else { hi };
        let t = (edge - a.r) / (b.r - a.r);
        let entry = a + (b - a) * t;
        let tip = self.upper.depth_at(edge)?;
        let face = if entry.z <= tip {
            Face::Upper
        } else {
            Face::Lower
        };
        Ok((face, entry))
    }
}

/// The obstacles inserted in the waveguide.
#[derive(Debug, Clone, Default)]
pub struct ObjectSet {
    objects: Vec<Object>,
}

impl ObjectSet {
    /// An empty set.
    pub fn new() -> Self {
        ObjectSet::default()
    }

    /// Build a set from `(upper, lower)` face pairs.
    pub fn from_faces(faces: Vec<(Interface, Interface)>) -> Result<Self> {
        let objects = faces
            .into_iter()
            .enumerate()
            .map(|(i, (upper, lower))| Object::new(i, upper, lower))
            .collect::<Result<Vec<_>>>()?;
        Ok(ObjectSet { objects })
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if there are no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Object `index`.
    pub fn get(&self, index: usize) -> Option<&Object> {
        self.objects.get(index)
    }

    /// Iterate over the objects.
    pub fn iter(&self) -> std::slice::Iter<'_, Object> {
        self.objects.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump() -> Interface {
        // shallowest at r = 500
        let r: Vec<f64> = (0..=10).map(|k| k as f64 * 100.0).collect();
        let z = r.iter().map(|&x| 100.0 + 1e-4 * (x - 500.0).powi(2)).collect();
        Interface::new(r, z, InterpolationMode::Parabolic, SurfaceClass::Rigid).unwrap()
    }

    #[test]
    fn flat_interface() {
        let top = Interface::flat(0.0, 0.0, 1000.0, SurfaceClass::Vacuum).unwrap();
        let p = top.evaluate(123.0).unwrap();
        assert_eq!(p.depth, 0.0);
        assert_eq!(p.tangent, Vec2::new(1.0, 0.0));
        assert_eq!(p.normal, Vec2::new(0.0, 1.0));
        let hit = top
            .intersect(Vec2::new(0.0, 10.0), Vec2::new(20.0, -10.0))
            .unwrap();
        assert!((hit.r - 10.0).abs() < 1e-12);
        assert_eq!(hit.z, 0.0);
    }

    #[test]
    fn sloped_interface() {
        let bottom = Interface::new(
            vec![0.0, 500.0, 1000.0],
            vec![100.0, 400.0, 200.0],
            InterpolationMode::Sloped,
            SurfaceClass::Rigid,
        )
        .unwrap();
        // the middle point is ignored
        assert!((bottom.depth_at(500.0).unwrap() - 150.0).abs() < 1e-12);
        let p = bottom.evaluate(200.0).unwrap();
        assert!((p.tangent.z / p.tangent.r - 0.1).abs() < 1e-12);
        let hit = bottom
            .intersect(Vec2::new(100.0, 100.0), Vec2::new(100.0, 200.0))
            .unwrap();
        assert!((hit.r - 100.0).abs() < 1e-12);
        assert!((hit.z - 110.0).abs() < 1e-12);
    }

    #[test]
    fn piecewise_linear_evaluation() {
        let iface = Interface::new(
            vec![0.0, 100.0, 200.0],
            vec![50.0, 60.0, 40.0],
            InterpolationMode::Linear,
            SurfaceClass::Rigid,
        )
        .unwrap();
        assert!((iface.depth_at(50.0).unwrap() - 55.0).abs() < 1e-12);
        assert!((iface.depth_at(150.0).unwrap() - 50.0).abs() < 1e-12);
        let p = iface.evaluate(150.0).unwrap();
        assert!(p.tangent.z < 0.0);
        assert!((p.tangent.norm() - 1.0).abs() < 1e-12);
        assert!(iface.evaluate(250.0).is_err());
    }

    #[test]
    fn sampled_intersection_lands_on_interface() {
        let iface = bump();
        let a = Vec2::new(420.0, 50.0);
        let b = Vec2::new(460.0, 150.0);
        let hit = iface.intersect(a, b).unwrap();
        let depth = iface.depth_at(hit.r).unwrap();
        assert!((hit.z - depth).abs() < 1e-3, "{} vs {}", hit.z, depth);
        // on the segment
        let t = (hit.r - a.r) / (b.r - a.r);
        assert!((a.z + t * (b.z - a.z) - hit.z).abs() < 1e-9);
    }

    #[test]
    fn too_few_points_rejected() {
        let err = Interface::new(
            vec![0.0, 100.0, 200.0],
            vec![1.0, 2.0, 3.0],
            InterpolationMode::Cubic,
            SurfaceClass::Rigid,
        );
        assert!(matches!(err, Err(RayError::InvalidTable { .. })));
        let err = Interface::new(
            vec![0.0, 100.0],
            vec![1.0],
            InterpolationMode::Linear,
            SurfaceClass::Rigid,
        );
        assert!(matches!(err, Err(RayError::ShapeMismatch { .. })));
    }

    #[test]
    fn per_point_material_interpolates() {
        let iface = Interface::new(
            vec![0.0, 1000.0],
            vec![100.0, 100.0],
            InterpolationMode::Linear,
            SurfaceClass::Elastic,
        )
        .unwrap()
        .with_point_materials(
            vec![
                Material::new(1600.0, 0.0, 1.5, 0.1, 0.0),
                Material::new(1800.0, 200.0, 2.0, 0.3, 0.2),
            ],
            AttenuationUnits::DbPerWavelength,
        )
        .unwrap();
        let m = iface.material_at(250.0).unwrap();
        assert!((m.cp - 1650.0).abs() < 1e-12);
        assert!((m.cs - 50.0).abs() < 1e-12);
        assert!((m.rho - 1.625).abs() < 1e-12);
    }

    #[test]
    fn mode_tags() {
        assert_eq!("4P".parse::<InterpolationMode>().unwrap(), InterpolationMode::Cubic);
        assert_eq!("fl".parse::<InterpolationMode>().unwrap(), InterpolationMode::Flat);
        assert!("5P".parse::<InterpolationMode>().is_err());
    }

    fn diamond() -> Object {
        let upper = Interface::new(
            vec![400.0, 500.0, 600.0],
            vec![50.0, 40.0, 50.0],
            InterpolationMode::Linear,
            SurfaceClass::Rigid,
        )
        .unwrap();
        let lower = Interface::new(
            vec![400.0, 500.0, 600.0],
            vec![50.0, 60.0, 50.0],
            InterpolationMode::Linear,
            SurfaceClass::Rigid,
        )
        .unwrap();
        Object::new(0, upper, lower).unwrap()
    }

    #[test]
    fn object_containment() {
        let obj = diamond();
        assert!(obj.contains(Vec2::new(500.0, 50.0)));
        assert!(!obj.contains(Vec2::new(500.0, 30.0)));
        assert!(!obj.contains(Vec2::new(700.0, 50.0)));
    }

    #[test]
    fn object_entry_faces() {
        let obj = diamond();
        // from above, inside the span
        let (face, _) = obj
            .entry_face(Vec2::new(500.0, 30.0), Vec2::new(505.0, 45.0))
            .unwrap();
        assert_eq!(face, Face::Upper);
        // from below, inside the span
        let (face, _) = obj
            .entry_face(Vec2::new(500.0, 70.0), Vec2::new(505.0, 55.0))
            .unwrap();
        assert_eq!(face, Face::Lower);
        // through the left tip, slightly above
        let (face, entry) = obj
            .entry_face(Vec2::new(390.0, 49.0), Vec2::new(410.0, 49.0))
            .unwrap();
        assert_eq!(face, Face::Upper);
        assert_eq!(entry.r, 400.0);
        // through the right tip, travelling left, slightly below
        let (face, entry) = obj
            .entry_face(Vec2::new(610.0, 51.0), Vec2::new(590.0, 51.0))
            .unwrap();
        assert_eq!(face, Face::Lower);
        assert_eq!(entry.r, 600.0);
    }

    #[test]
    fn faces_must_start_at_equal_depth() {
        let face = |depths: Vec<f64>| {
            Interface::new(
                vec![0.0, 5.0, 10.0],
                depths,
                InterpolationMode::Linear,
                SurfaceClass::Rigid,
            )
            .unwrap()
        };
        let err = Object::new(1, face(vec![4.0, 3.0, 5.0]), face(vec![5.0, 7.0, 5.0]));
        assert!(matches!(err, Err(RayError::InconsistentObject { index: 1, .. })));
        assert!(Object::new(1, face(vec![5.0, 3.0, 5.0]), face(vec![5.0, 7.0, 5.0])).is_ok());
    }

    #[test]
    fn faces_must_also_meet_at_the_right_end() {
        let upper = Interface::new(
            vec![0.0, 10.0],
            vec![5.0, 5.0],
            InterpolationMode::Linear,
            SurfaceClass::Rigid,
        )
        .unwrap();
        let lower = Interface::new(
            vec![0.0, 10.0],
            vec![5.0, 7.0],
            InterpolationMode::Linear,
            SurfaceClass::Rigid,
        )
        .unwrap();
        let err = Object::new(3, upper, lower);
        assert!(matches!(err, Err(RayError::InconsistentObject { index: 3, .. })));
    }
}
