// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::boundary::{Interface, Object, ObjectSet};
use crate::core::Vec2;
use crate::error::{RayError, Result};
use crate::sound_speed::SoundSpeed;

fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RayError::InvalidParameter { name, value });
    }
    Ok(())
}

/// Acoustic source: position, frequency, launch fan and range box.
#[derive(Debug, Clone)]
pub struct Source {
    /// Source range.
    pub r: f64,
    /// Source depth.
    pub z: f64,
    /// Frequency (Hz).
    pub frequency: f64,
    /// Nominal integration step (m).
    pub ds: f64,
    /// Range box `[r0, r1]`; rays stop when they leave it.
    pub range_box: (f64, f64),
    /// Launch angles (radians, positive downward).
    pub angles: Vec<f64>,
}

impl Source {
    /// Create a source with a single horizontal launch angle.
    pub fn new(r: f64, z: f64, frequency: f64, ds: f64, range_box: (f64, f64)) -> Result<Self> {
        check_positive("frequency", frequency)?;
        check_positive("ds", ds)?;
        if !(range_box.1 > range_box.0) || !range_box.0.is_finite() || !range_box.1.is_finite() {
            return Err(RayError::InvalidParameter {
                name: "range box width",
                value: range_box.1 - range_box.0,
            });
        }
        if !(r >= range_box.0 && r <= range_box.1) || !z.is_finite() {
            return Err(RayError::SourceOutsideWaveguide { r, z });
        }
        Ok(Source {
            r,
            z,
            frequency,
            ds,
            range_box,
            angles: vec![0.0],
        })
    }

    /// Launch `n` angles evenly spaced from `min_deg` to `max_deg` degrees.
    pub fn with_fan(mut self, min_deg: f64, max_deg: f64, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(RayError::InvalidParameter {
                name: "number of rays",
                value: 0.0,
            });
        }
        if !(max_deg >= min_deg) || min_deg <= -90.0 || max_deg >= 90.0 {
            return Err(RayError::InvalidParameter {
                name: "launch fan",
                value: max_deg - min_deg,
            });
        }
        self.angles = if n == 1 {
            vec![min_deg.to_radians()]
        } else {
            let step = (max_deg - min_deg) / (n - 1) as f64;
            (0..n)
                .map(|k| (min_deg + k as f64 * step).to_radians())
                .collect()
        };
        Ok(self)
    }

    /// Launch exactly the given angles (degrees).
    pub fn with_angles(mut self, degrees: &[f64]) -> Result<Self> {
        if degrees.is_empty() {
            return Err(RayError::InvalidParameter {
                name: "number of rays",
                value: 0.0,
            });
        }
        if let Some(&bad) = degrees.iter().find(|a| !a.is_finite() || a.abs() > 90.0) {
            return Err(RayError::InvalidParameter {
                name: "launch angle",
                value: bad,
            });
        }
        self.angles = degrees.iter().map(|a| a.to_radians()).collect();
        Ok(self)
    }

    /// Position as a vector.
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.r, self.z)
    }

    /// Sample limit for one ray: `ceil(box width / ds) * factor`.
    pub fn sample_budget(&self, factor: usize) -> usize {
        let steps = ((self.range_box.1 - self.range_box.0) / self.ds).ceil() as usize;
        steps.max(1).saturating_mul(factor.max(1))
    }
}

/// Receiver positions and acceptance tolerance.
#[derive(Debug, Clone)]
pub struct Receivers {
    points: Vec<Vec2>,
    miss: f64,
}

impl Receivers {
    /// Every combination of `ranges` and `depths`.
    pub fn grid(ranges: &[f64], depths: &[f64], miss: f64) -> Result<Self> {
        let points = ranges
            .iter()
            .flat_map(|&r| depths.iter().map(move |&z| Vec2::new(r, z)))
            .collect();
        Self::points(points, miss)
    }

    /// Explicit receiver positions.
    pub fn points(points: Vec<Vec2>, miss: f64) -> Result<Self> {
        check_positive("miss", miss)?;
        if let Some(bad) = points.iter().find(|p| !p.r.is_finite() || !p.z.is_finite()) {
            return Err(RayError::InvalidParameter {
                name: "receiver range",
                value: bad.r,
            });
        }
        Ok(Receivers { points, miss })
    }

    /// Receiver positions.
    pub fn positions(&self) -> &[Vec2] {
        &self.points
    }

    /// Depth tolerance for accepting an eigenray.
    pub fn miss(&self) -> f64 {
        self.miss
    }

    /// Number of receivers.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if there are no receivers.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// The immutable description of a waveguide and its source.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Source and launch fan.
    pub source: Source,
    /// Upper boundary.
    pub altimetry: Interface,
    /// Lower boundary.
    pub bathymetry: Interface,
    /// Sound speed.
    pub sound_speed: SoundSpeed,
    /// Obstacles.
    pub objects: ObjectSet,
    /// Receivers (may be empty).
    pub receivers: Receivers,
}

impl Scenario {
    /// Assemble a scenario, checking that the boundaries cover the range box
    /// and that the source lies strictly between them.
    pub fn new(
        source: Source,
        altimetry: Interface,
        bathymetry: Interface,
        sound_speed: SoundSpeed,
    ) -> Result<Self> {
        let (r0, r1) = source.range_box;
        for (name, iface) in [("altimetry", &altimetry), ("bathymetry", &bathymetry)] {
            let (lo, hi) = iface.span();
            if lo > r0 || hi < r1 {
                return Err(RayError::InvalidTable {
                    what: name,
                    reason: format!(
                        "covers [{}, {}] but the range box is [{}, {}]",
                        lo, hi, r0, r1
                    ),
                });
            }
        }
        let top = altimetry.depth_at(source.r)?;
        let bottom = bathymetry.depth_at(source.r)?;
        if !(source.z > top && source.z < bottom) {
            return Err(RayError::SourceOutsideWaveguide {
                r: source.r,
                z: source.z,
            });
        }
        sound_speed.evaluate(source.r, source.z)?;
        Ok(Scenario {
            source,
            altimetry,
            bathymetry,
            sound_speed,
            objects: ObjectSet::new(),
            receivers: Receivers {
                points: Vec::new(),
                miss: 1.0,
            },
        })
    }

    /// Insert obstacles.
    pub fn with_objects(mut self, objects: ObjectSet) -> Result<Self> {
        let src = self.source.position();
        if let Some(index) = objects.iter().position(|o: &Object| o.contains(src)) {
            return Err(RayError::InconsistentObject {
                index,
                reason: "source lies inside the object".to_string(),
            });
        }
        self.objects = objects;
        Ok(self)
    }

    /// Set the receivers.
    pub fn with_receivers(mut self, receivers: Receivers) -> Self {
        self.receivers = receivers;
        self
    }
}

/// Cooperative cancellation shared between a caller and running traces.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that only cancels when asked.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Also cancel once `timeout` has elapsed from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` if cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RayError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Numerical knobs of the tracer.
#[derive(Debug, Clone)]
pub struct TracerSettings {
    /// Accepted relative disagreement between the RKF45 step lengths.
    pub step_tolerance: f64,
    /// Maximum step halvings before giving up on a step.
    pub max_step_halvings: usize,
    /// Sample budget multiplier.
    pub memory_factor: usize,
    /// Rays whose reflection coefficient magnitude drops below this stop.
    pub min_reflection_coefficient: f64,
    /// Maximum crossings returned by the extended bracket search.
    pub bracket_capacity: usize,
    /// Regula falsi iteration cap per bracket.
    pub max_regula_falsi_iterations: usize,
    /// Cancellation token polled every step.
    pub cancel: CancelToken,
}

impl Default for TracerSettings {
    fn default() -> Self {
        TracerSettings {
            step_tolerance: 0.1,
            max_step_halvings: 20,
            memory_factor: 20,
            min_reflection_coefficient: 1e-5,
            bracket_capacity: 50,
            max_regula_falsi_iterations: 21,
            cancel: CancelToken::new(),
        }
    }
}

impl TracerSettings {
    /// Default settings.
    pub fn new() -> Self {
        TracerSettings::default()
    }

    /// Set the RKF45 step tolerance.
    pub fn with_step_tolerance(mut self, tolerance: f64) -> Self {
        self.step_tolerance = tolerance;
        self
    }

    /// Set the maximum number of step halvings.
    pub fn with_max_step_halvings(mut self, n: usize) -> Self {
        self.max_step_halvings = n;
        self
    }

    /// Set the sample budget multiplier.
    pub fn with_memory_factor(mut self, factor: usize) -> Self {
        self.memory_factor = factor;
        self
    }

    /// Set the minimum reflection coefficient magnitude.
    pub fn with_min_reflection_coefficient(mut self, value: f64) -> Self {
        self.min_reflection_coefficient = value;
        self
    }

    /// Set the extended bracket capacity.
    pub fn with_bracket_capacity(mut self, capacity: usize) -> Self {
        self.bracket_capacity = capacity;
        self
    }

    /// Set the regula falsi iteration cap.
    pub fn with_max_regula_falsi_iterations(mut self, n: usize) -> Self {
        self.max_regula_falsi_iterations = n;
        self
    }

    /// Use the given cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::SurfaceClass;

    fn waveguide(source: Source) -> Result<Scenario> {
        Scenario::new(
            source,
            Interface::flat(0.0, 0.0, 1000.0, SurfaceClass::Vacuum)?,
            Interface::flat(100.0, 0.0, 1000.0, SurfaceClass::Rigid)?,
            SoundSpeed::isovelocity(1500.0)?,
        )
    }

    #[test]
    fn fan_spacing() {
        let src = Source::new(0.0, 50.0, 100.0, 1.0, (0.0, 1000.0))
            .unwrap()
            .with_fan(-10.0, 10.0, 5)
            .unwrap();
        assert_eq!(src.angles.len(), 5);
        assert!((src.angles[2]).abs() < 1e-15);
        assert!((src.angles[4] - 10f64.to_radians()).abs() < 1e-15);
    }

    #[test]
    fn budget_rounds_up() {
        let src = Source::new(0.0, 50.0, 100.0, 3.0, (0.0, 1000.0)).unwrap();
        assert_eq!(src.sample_budget(20), 334 * 20);
    }

    #[test]
    fn source_must_be_inside() {
        let outside = Source::new(0.0, 150.0, 100.0, 1.0, (0.0, 1000.0)).unwrap();
        assert!(matches!(
            waveguide(outside),
            Err(RayError::SourceOutsideWaveguide { .. })
        ));
        let on_surface = Source::new(0.0, 0.0, 100.0, 1.0, (0.0, 1000.0)).unwrap();
        assert!(waveguide(on_surface).is_err());
        let ok = Source::new(0.0, 50.0, 100.0, 1.0, (0.0, 1000.0)).unwrap();
        assert!(waveguide(ok).is_ok());
    }

    #[test]
    fn boundaries_must_cover_box() {
        let src = Source::new(0.0, 50.0, 100.0, 1.0, (0.0, 2000.0)).unwrap();
        assert!(matches!(
            waveguide(src),
            Err(RayError::InvalidTable { what: "altimetry", .. })
        ));
    }

    #[test]
    fn bad_parameters_rejected() {
        assert!(Source::new(0.0, 50.0, 0.0, 1.0, (0.0, 1.0)).is_err());
        assert!(Source::new(0.0, 50.0, 10.0, -1.0, (0.0, 1.0)).is_err());
        assert!(Source::new(0.0, 50.0, 10.0, 1.0, (1.0, 1.0)).is_err());
        assert!(Receivers::grid(&[1.0], &[2.0], 0.0).is_err());
    }

    #[test]
    fn receiver_grid_order() {
        let rx = Receivers::grid(&[100.0, 200.0], &[10.0, 20.0, 30.0], 0.5).unwrap();
        assert_eq!(rx.len(), 6);
        assert_eq!(rx.positions()[3], Vec2::new(200.0, 10.0));
    }

    #[test]
    fn cancel_token() {
        let token = CancelToken::new();
        let shared = token.clone();
        assert!(token.check().is_ok());
        shared.cancel();
        assert!(matches!(token.check(), Err(RayError::Cancelled)));
        let expired = CancelToken::new().with_timeout(Duration::ZERO);
        assert!(expired.is_cancelled());
    }

    #[test]
    fn settings_builder() {
        let s = TracerSettings::new()
            .with_bracket_capacity(7)
            .with_memory_factor(3);
        assert_eq!(s.bracket_capacity, 7);
        assert_eq!(s.memory_factor, 3);
        assert_eq!(s.max_regula_falsi_iterations, 21);
    }
}
