// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::ops::{Add, Mul, Neg, Sub};

use num_complex::Complex64;

use crate::error::Result;
use crate::interpolation::{bracket, extended_bracket};

/// A (range, depth) pair. Depth is positive downward.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    /// Range component.
    pub r: f64,
    /// Depth component.
    pub z: f64,
}

impl Vec2 {
    /// Create a vector from its range and depth components.
    pub const fn new(r: f64, z: f64) -> Self {
        Vec2 { r, z }
    }

    /// Unit vector at angle `theta` (radians) below the horizontal.
    pub fn from_angle(theta: f64) -> Self {
        Vec2::new(theta.cos(), theta.sin())
    }

    /// Dot product.
    pub fn dot(self, other: Vec2) -> f64 {
        self.r * other.r + self.z * other.z
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        self.r.hypot(self.z)
    }

    /// Unit vector in the same direction.
    pub fn normalized(self) -> Vec2 {
        let n = self.norm();
        Vec2::new(self.r / n, self.z / n)
    }

    /// The vector rotated by +90 degrees: `(-z, r)`.
    pub fn rotated(self) -> Vec2 {
        Vec2::new(-self.z, self.r)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.r + rhs.r, self.z + rhs.z)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.r - rhs.r, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.r * rhs, self.z * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.r, -self.z)
    }
}

/// Sound speed and its derivatives at a point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedSample {
    /// Sound speed.
    pub c: f64,
    /// Sound speed squared.
    pub c2: f64,
    /// Inverse sound speed.
    pub inv_c: f64,
    /// Gradient of c: (∂c/∂r, ∂c/∂z).
    pub grad: Vec2,
    /// Gradient of 1/c, i.e. `-grad / c²`.
    pub slowness_grad: Vec2,
    /// ∂²c/∂r².
    pub crr: f64,
    /// ∂²c/∂z².
    pub czz: f64,
    /// ∂²c/∂r∂z.
    pub crz: f64,
}

impl SpeedSample {
    /// Build a sample from c and its first and second derivatives.
    pub fn new(c: f64, dcdr: f64, dcdz: f64, crr: f64, czz: f64, crz: f64) -> Self {
        let c2 = c * c;
        SpeedSample {
            c,
            c2,
            inv_c: 1.0 / c,
            grad: Vec2::new(dcdr, dcdz),
            slowness_grad: Vec2::new(-dcdr / c2, -dcdz / c2),
            crr,
            czz,
            crz,
        }
    }
}

/// A medium that can report sound speed and its derivatives at a point.
pub trait Medium {
    /// Evaluate sound speed and derivatives at range `r`, depth `z`.
    fn speed(&self, r: f64, z: f64) -> Result<SpeedSample>;
}

/// Which side of the water a reflecting surface bounds.
///
/// Object faces map onto these: an upper face bounds water from below
/// (like the bottom), a lower face bounds it from above (like the surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Surface-like: water lies below.
    Top,
    /// Bottom-like: water lies above.
    Bottom,
}

impl Side {
    /// Signed boundary tag: -1 for top, +1 for bottom.
    pub fn tag(self) -> i8 {
        match self {
            Side::Top => -1,
            Side::Bottom => 1,
        }
    }
}

/// Which surface a reflection happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The altimetry interface.
    Altimetry,
    /// The bathymetry interface.
    Bathymetry,
    /// A face of an object.
    Object {
        /// Index of the object in the set.
        index: usize,
    },
}

/// Reflection bookkeeping attached to a trajectory sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reflection {
    /// The surface hit.
    pub surface: Surface,
    /// Side of the water the surface bounds.
    pub side: Side,
    /// Boundary tangent at the reflection point.
    pub boundary_tangent: Vec2,
    /// Ray direction just before the reflection.
    pub incident: Vec2,
    /// Complex reflection coefficient applied.
    pub coefficient: Complex64,
}

/// Why a ray stopped before leaving the range box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KillReason {
    /// The ray left the range covered by an interface.
    OutOfDomain,
    /// The ray hit an absorbing surface.
    Absorbed,
    /// The reflection coefficient fell below the minimum.
    WeakReflection,
    /// After reflecting, the ray would still be beyond the boundary.
    DiggingIn,
}

/// The trajectory of one ray, stored as parallel per-sample arrays.
#[derive(Debug, Clone)]
pub struct RayTrajectory {
    /// Launch angle (radians, positive downward).
    pub theta: f64,
    /// Range per sample.
    pub r: Vec<f64>,
    /// Depth per sample.
    pub z: Vec<f64>,
    /// Sound speed per sample.
    pub c: Vec<f64>,
    /// Accumulated travel time.
    pub tau: Vec<f64>,
    /// Accumulated path length.
    pub s: Vec<f64>,
    /// Accumulated ∫c ds, used to normalize amplitudes.
    pub ic: Vec<f64>,
    /// Unit ray tangent per sample (after any reflection at that sample).
    pub tangent: Vec<Vec2>,
    /// Reflection at each sample, if any.
    pub reflection: Vec<Option<Reflection>>,
    /// Running product of reflection coefficients.
    pub decay: Vec<Complex64>,
    /// Accumulated reflection phase (radians).
    pub phase: Vec<f64>,
    /// Depth extrema not caused by reflections.
    pub refraction_points: Vec<Vec2>,
    /// Whether the range sequence turns back on itself.
    pub returning: bool,
    /// Number of reflections on the altimetry.
    pub surface_reflections: usize,
    /// Number of reflections on the bathymetry.
    pub bottom_reflections: usize,
    /// Number of reflections on objects.
    pub object_reflections: usize,
    /// Minimum range reached.
    pub r_min: f64,
    /// Maximum range reached.
    pub r_max: f64,
    /// Set when the march stopped before leaving the box.
    pub killed: Option<KillReason>,
    /// Paraxial p per sample (empty until dynamics are solved).
    pub p: Vec<f64>,
    /// Paraxial q per sample.
    pub q: Vec<f64>,
    /// Accumulated caustic phase per sample.
    pub caustic_phase: Vec<f64>,
    /// Complex amplitude per sample.
    pub amplitude: Vec<Complex64>,
    /// Number of caustics crossed.
    pub caustics: usize,
}

/// Fields of one trajectory sample, used when appending.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    /// Position.
    pub pos: Vec2,
    /// Sound speed.
    pub c: f64,
    /// Travel time.
    pub tau: f64,
    /// Arc length.
    pub s: f64,
    /// ∫c ds.
    pub ic: f64,
    /// Unit ray tangent.
    pub tangent: Vec2,
    /// Reflection at this sample.
    pub reflection: Option<Reflection>,
    /// Running reflection product.
    pub decay: Complex64,
    /// Accumulated reflection phase.
    pub phase: f64,
}

impl RayTrajectory {
    /// Create an empty trajectory with room for `capacity` samples.
    pub fn with_capacity(theta: f64, capacity: usize) -> Self {
        RayTrajectory {
            theta,
            r: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            c: Vec::with_capacity(capacity),
            tau: Vec::with_capacity(capacity),
            s: Vec::with_capacity(capacity),
            ic: Vec::with_capacity(capacity),
            tangent: Vec::with_capacity(capacity),
            reflection: Vec::with_capacity(capacity),
            decay: Vec::with_capacity(capacity),
            phase: Vec::with_capacity(capacity),
            refraction_points: Vec::new(),
            returning: false,
            surface_reflections: 0,
            bottom_reflections: 0,
            object_reflections: 0,
            r_min: f64::INFINITY,
            r_max: f64::NEG_INFINITY,
            killed: None,
            p: Vec::new(),
            q: Vec::new(),
            caustic_phase: Vec::new(),
            amplitude: Vec::new(),
            caustics: 0,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.r.len()
    }

    /// True if the trajectory has no samples.
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// Append one sample.
    pub fn push(&mut self, sample: Sample) {
        self.r.push(sample.pos.r);
        self.z.push(sample.pos.z);
        self.c.push(sample.c);
        self.tau.push(sample.tau);
        self.s.push(sample.s);
        self.ic.push(sample.ic);
        self.tangent.push(sample.tangent);
        self.reflection.push(sample.reflection);
        self.decay.push(sample.decay);
        self.phase.push(sample.phase);
    }

    /// Read back sample `i`.
    pub fn sample(&self, i: usize) -> Sample {
        Sample {
            pos: Vec2::new(self.r[i], self.z[i]),
            c: self.c[i],
            tau: self.tau[i],
            s: self.s[i],
            ic: self.ic[i],
            tangent: self.tangent[i],
            reflection: self.reflection[i],
            decay: self.decay[i],
            phase: self.phase[i],
        }
    }

    /// Signed boundary tag at sample `i`: -1 top, +1 bottom, 0 none.
    pub fn boundary_tag(&self, i: usize) -> i8 {
        self.reflection[i].map_or(0, |refl| refl.side.tag())
    }

    /// Total number of reflections of any kind.
    pub fn reflections(&self) -> usize {
        self.surface_reflections + self.bottom_reflections + self.object_reflections
    }

    /// True once the dynamic solver has filled in amplitudes.
    pub fn has_dynamics(&self) -> bool {
        self.amplitude.len() == self.len() && !self.is_empty()
    }

    /// The range lookup appropriate for this trajectory's shape.
    pub fn lookup(&self, capacity: usize) -> RangeLookup {
        if self.returning || (self.len() >= 2 && self.r[self.len() - 1] < self.r[0]) {
            RangeLookup::Extended { capacity }
        } else {
            RangeLookup::Monotonic
        }
    }

    fn fraction(&self, i: usize, range: f64) -> f64 {
        let dr = self.r[i + 1] - self.r[i];
        if dr != 0.0 {
            (range - self.r[i]) / dr
        } else {
            0.0
        }
    }

    /// Linearly interpolate the trajectory at range `range` inside interval `i`.
    pub fn interpolate(&self, i: usize, range: f64) -> TrajectoryPoint {
        let t = self.fraction(i, range);
        let lerp = |a: f64, b: f64| a + t * (b - a);
        let (amplitude, caustic_phase) = if self.has_dynamics() {
            (
                self.amplitude[i] + (self.amplitude[i + 1] - self.amplitude[i]) * t,
                lerp(self.caustic_phase[i], self.caustic_phase[i + 1]),
            )
        } else {
            (Complex64::new(f64::NAN, f64::NAN), 0.0)
        };
        TrajectoryPoint {
            index: i,
            r: range,
            z: lerp(self.z[i], self.z[i + 1]),
            tau: lerp(self.tau[i], self.tau[i + 1]),
            s: lerp(self.s[i], self.s[i + 1]),
            amplitude,
            caustic_phase,
        }
    }

    /// Recompute range extent, returning flag and refraction points from the samples.
    pub fn measure_shape(&mut self) {
        let n = self.len();
        self.r_min = self.r.iter().copied().fold(f64::INFINITY, f64::min);
        self.r_max = self.r.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.refraction_points.clear();
        self.returning = false;
        for i in 1..n.saturating_sub(1) {
            let dz0 = self.z[i] - self.z[i - 1];
            let dz1 = self.z[i + 1] - self.z[i];
            if dz0 * dz1 < 0.0 && self.reflection[i].is_none() {
                self.refraction_points.push(Vec2::new(self.r[i], self.z[i]));
            }
            let dr0 = self.r[i] - self.r[i - 1];
            let dr1 = self.r[i + 1] - self.r[i];
            if dr0 * dr1 < 0.0 {
                self.returning = true;
            }
        }
    }

    /// Copy of the trajectory up to and including sample `i`, plus the point `end`.
    ///
    /// The copy describes the path up to `end` only: it is never killed, and
    /// its extent, returning flag and refraction points cover the kept samples.
    pub fn truncated(&self, i: usize, end: &TrajectoryPoint) -> RayTrajectory {
        let keep = i + 1;
        let mut out = self.clone();
        for v in [
            &mut out.r,
            &mut out.z,
            &mut out.c,
            &mut out.tau,
            &mut out.s,
            &mut out.ic,
        ] {
            v.truncate(keep);
        }
        out.tangent.truncate(keep);
        out.reflection.truncate(keep);
        out.decay.truncate(keep);
        out.phase.truncate(keep);
        if self.has_dynamics() {
            out.p.truncate(keep);
            out.q.truncate(keep);
            out.caustic_phase.truncate(keep);
            out.amplitude.truncate(keep);
        }

        let mut last = self.sample(i);
        last.pos = Vec2::new(end.r, end.z);
        last.tau = end.tau;
        last.s = end.s;
        last.reflection = None;
        out.push(last);
        if self.has_dynamics() {
            let j = (i + 1).min(self.len() - 1);
            let t = if j > i { self.fraction(i, end.r) } else { 0.0 };
            out.p.push(self.p[i] + t * (self.p[j] - self.p[i]));
            out.q.push(self.q[i] + t * (self.q[j] - self.q[i]));
            out.caustic_phase.push(end.caustic_phase);
            out.amplitude.push(end.amplitude);
        }
        out.killed = None;
        out.measure_shape();
        out
    }
}

/// A trajectory interpolated at a given range.
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryPoint {
    /// Interval index the point lies in.
    pub index: usize,
    /// Range.
    pub r: f64,
    /// Depth.
    pub z: f64,
    /// Travel time.
    pub tau: f64,
    /// Path length.
    pub s: f64,
    /// Complex amplitude (NaN if dynamics were not solved).
    pub amplitude: Complex64,
    /// Caustic phase.
    pub caustic_phase: f64,
}

/// How to find the intervals of a trajectory's range table containing a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeLookup {
    /// Ranges increase monotonically: a single binary-search bracket.
    Monotonic,
    /// Ranges turn back on themselves: every crossing, up to `capacity`.
    Extended {
        /// Maximum number of intervals returned.
        capacity: usize,
    },
}

impl RangeLookup {
    /// Interval indices of `ranges` containing `x` (empty if none).
    pub fn intervals(&self, ranges: &[f64], x: f64) -> Vec<usize> {
        match *self {
            RangeLookup::Monotonic => bracket(ranges, x).map(|i| vec![i]).unwrap_or_default(),
            RangeLookup::Extended { capacity } => extended_bracket(ranges, x, capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_ray(n: usize) -> RayTrajectory {
        let mut ray = RayTrajectory::with_capacity(0.0, n);
        for k in 0..n {
            let r = k as f64 * 10.0;
            ray.push(Sample {
                pos: Vec2::new(r, 50.0 + 0.1 * r),
                c: 1500.0,
                tau: r / 1500.0,
                s: r,
                ic: 1500.0 * r,
                tangent: Vec2::new(1.0, 0.0),
                reflection: None,
                decay: Complex64::new(1.0, 0.0),
                phase: 0.0,
            });
        }
        ray
    }

    #[test]
    fn vector_ops() {
        let a = Vec2::new(3.0, 4.0);
        assert_eq!(a.norm(), 5.0);
        assert_eq!(a.rotated(), Vec2::new(-4.0, 3.0));
        assert_eq!(a.dot(a.rotated()), 0.0);
        assert!((a.normalized().norm() - 1.0).abs() < 1e-15);
        assert_eq!(a - a * 2.0, -a);
    }

    #[test]
    fn side_tags() {
        assert_eq!(Side::Top.tag(), -1);
        assert_eq!(Side::Bottom.tag(), 1);
    }

    #[test]
    fn lookup_selection() {
        let mut ray = straight_ray(5);
        assert_eq!(ray.lookup(50), RangeLookup::Monotonic);
        ray.returning = true;
        assert_eq!(ray.lookup(50), RangeLookup::Extended { capacity: 50 });
    }

    #[test]
    fn interpolate_and_truncate() {
        let ray = straight_ray(6);
        let i = RangeLookup::Monotonic.intervals(&ray.r, 25.0)[0];
        assert_eq!(i, 2);
        let pt = ray.interpolate(i, 25.0);
        assert!((pt.z - 52.5).abs() < 1e-12);
        assert!((pt.tau - 25.0 / 1500.0).abs() < 1e-15);

        let cut = ray.truncated(i, &pt);
        assert_eq!(cut.len(), 4);
        assert_eq!(*cut.r.last().unwrap(), 25.0);
    }

    #[test]
    fn truncating_a_returning_ray_keeps_its_own_shape() {
        let mut ray = RayTrajectory::with_capacity(0.0, 6);
        let path = [
            (0.0, 50.0),
            (10.0, 52.0),
            (25.0, 56.0),
            (30.0, 55.0),
            (20.0, 54.0),
            (10.0, 53.0),
        ];
        for (r, z) in path {
            ray.push(Sample {
                pos: Vec2::new(r, z),
                c: 1500.0,
                tau: 0.0,
                s: 0.0,
                ic: 0.0,
                tangent: Vec2::new(1.0, 0.0),
                reflection: None,
                decay: Complex64::new(1.0, 0.0),
                phase: 0.0,
            });
        }
        ray.killed = Some(KillReason::Absorbed);
        ray.measure_shape();
        assert!(ray.returning);
        assert_eq!(ray.r_max, 30.0);

        // on the way back, past the refraction point at r = 25
        let i = ray.lookup(50).intervals(&ray.r, 15.0)[1];
        assert_eq!(i, 4);
        let cut = ray.truncated(i, &ray.interpolate(i, 15.0));
        assert_eq!(cut.len(), 6);
        assert!(cut.killed.is_none());
        assert!(cut.returning);
        assert_eq!(cut.refraction_points, vec![Vec2::new(25.0, 56.0)]);
        assert_eq!((cut.r_min, cut.r_max), (0.0, 30.0));

        // on the way out, before it
        let cut = ray.truncated(1, &ray.interpolate(1, 15.0));
        assert!(!cut.returning);
        assert!(cut.refraction_points.is_empty());
        assert_eq!((cut.r_min, cut.r_max), (0.0, 15.0));
    }

    #[test]
    fn lookup_outside_is_empty() {
        let ray = straight_ray(3);
        assert!(RangeLookup::Monotonic.intervals(&ray.r, 100.0).is_empty());
    }
}
