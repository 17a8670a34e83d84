// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Eigenray search: rays that connect the source to a receiver.
//!
//! Proximity matching accepts any traced ray passing within `miss` of a
//! receiver. Regula falsi brackets launch angles whose depth residual at the
//! receiver range changes sign and refines each bracket by false position,
//! tracing one new ray per iteration.

use log::{debug, warn};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::core::{RayTrajectory, Surface, Vec2};
use crate::dynamic::solve_dynamics;
use crate::eikonal::trace_ray;
use crate::error::{RayError, Result};
use crate::scenario::{Scenario, TracerSettings};

/// A ray reaching a receiver.
#[derive(Debug, Clone)]
pub struct Arrival {
    /// Index of the receiver.
    pub receiver: usize,
    /// Receiver position.
    pub position: Vec2,
    /// Launch angle (radians).
    pub theta: f64,
    /// Ray depth at the receiver range.
    pub z: f64,
    /// Travel time.
    pub tau: f64,
    /// Complex amplitude (NaN if dynamics were not solved).
    pub amplitude: Complex64,
    /// Caustic phase accumulated up to the receiver.
    pub caustic_phase: f64,
    /// Surface reflections before the receiver.
    pub surface_reflections: usize,
    /// Bottom reflections before the receiver.
    pub bottom_reflections: usize,
    /// Object reflections before the receiver.
    pub object_reflections: usize,
    /// The trajectory up to the receiver.
    pub trajectory: RayTrajectory,
}

impl Arrival {
    fn new(ray: &RayTrajectory, receiver: usize, position: Vec2, interval: usize) -> Self {
        let point = ray.interpolate(interval, position.r);
        let mut trajectory = ray.truncated(interval, &point);
        let (mut surface, mut bottom, mut object) = (0, 0, 0);
        for refl in trajectory.reflection.iter().flatten() {
            match refl.surface {
                Surface::Altimetry => surface += 1,
                Surface::Bathymetry => bottom += 1,
                Surface::Object { .. } => object += 1,
            }
        }
        trajectory.surface_reflections = surface;
        trajectory.bottom_reflections = bottom;
        trajectory.object_reflections = object;
        Arrival {
            receiver,
            position,
            theta: ray.theta,
            z: point.z,
            tau: point.tau,
            amplitude: point.amplitude,
            caustic_phase: point.caustic_phase,
            surface_reflections: surface,
            bottom_reflections: bottom,
            object_reflections: object,
            trajectory,
        }
    }

    /// Depth mismatch between the ray and the receiver.
    pub fn miss(&self) -> f64 {
        (self.z - self.position.z).abs()
    }
}

/// How eigenrays are searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EigenrayMethod {
    /// Accept traced rays passing close to the receiver.
    Proximity,
    /// Refine sign changes of the depth residual by false position.
    RegulaFalsi,
}

/// Rays from `rays` passing within the miss distance of each receiver.
///
/// The result holds one list per receiver, in receiver order.
pub fn find_eigenrays_proximity(
    scenario: &Scenario,
    settings: &TracerSettings,
    rays: &[RayTrajectory],
) -> Vec<Vec<Arrival>> {
    let miss = scenario.receivers.miss();
    let capacity = settings.bracket_capacity;
    scenario
        .receivers
        .positions()
        .par_iter()
        .enumerate()
        .map(|(k, &rx)| {
            let mut found = Vec::new();
            for ray in rays {
                if ray.len() < 2 || rx.r < ray.r_min || rx.r > ray.r_max {
                    continue;
                }
                let lookup = ray.lookup(capacity);
                for i in lookup.intervals(&ray.r, rx.r) {
                    let z = ray.interpolate(i, rx.r).z;
                    if (z - rx.z).abs() <= miss {
                        found.push(Arrival::new(ray, k, rx, i));
                    }
                }
            }
            debug!(
                "receiver {} at ({}, {}): {} proximity eigenrays",
                k,
                rx.r,
                rx.z,
                found.len()
            );
            found
        })
        .collect()
}

/// Depth residual `z - zR` at the receiver range and the interval it was found in.
fn residual(ray: &RayTrajectory, rx: Vec2, capacity: usize) -> Option<(usize, f64)> {
    if ray.len() < 2 || rx.r < ray.r_min || rx.r > ray.r_max {
        return None;
    }
    let i = *ray.lookup(capacity).intervals(&ray.r, rx.r).first()?;
    Some((i, ray.interpolate(i, rx.r).z - rx.z))
}

/// Eigenrays by false-position refinement of the traced family `rays`.
///
/// `rays` must be ordered by launch angle and contain no returning ray.
/// Brackets that fail to converge are logged and skipped.
pub fn find_eigenrays_regula_falsi(
    scenario: &Scenario,
    settings: &TracerSettings,
    rays: &[RayTrajectory],
) -> Result<Vec<Vec<Arrival>>> {
    if let Some(ray) = rays.iter().find(|ray| ray.returning) {
        return Err(RayError::ReturningRay { theta: ray.theta });
    }
    scenario
        .receivers
        .positions()
        .par_iter()
        .enumerate()
        .map(|(k, &rx)| search_receiver(scenario, settings, rays, k, rx))
        .collect()
}

fn search_receiver(
    scenario: &Scenario,
    settings: &TracerSettings,
    rays: &[RayTrajectory],
    k: usize,
    rx: Vec2,
) -> Result<Vec<Arrival>> {
    let capacity = settings.bracket_capacity;
    let residuals: Vec<Option<(usize, f64)>> =
        rays.iter().map(|ray| residual(ray, rx, capacity)).collect();

    let mut found = Vec::new();
    for j in 0..rays.len() {
        let Some((i, f)) = residuals[j] else {
            continue;
        };
        if f == 0.0 {
            found.push(Arrival::new(&rays[j], k, rx, i));
            continue;
        }
        if let Some(Some((_, f_next))) = residuals.get(j + 1) {
            if f * f_next < 0.0 {
                let left = (rays[j].theta, f);
                let right = (rays[j + 1].theta, *f_next);
                if let Some(arrival) = refine(scenario, settings, k, rx, left, right)? {
                    found.push(arrival);
                }
            }
        }
    }
    debug!(
        "receiver {} at ({}, {}): {} regula falsi eigenrays",
        k,
        rx.r,
        rx.z,
        found.len()
    );
    Ok(found)
}

fn refine(
    scenario: &Scenario,
    settings: &TracerSettings,
    k: usize,
    rx: Vec2,
    left: (f64, f64),
    right: (f64, f64),
) -> Result<Option<Arrival>> {
    let miss = scenario.receivers.miss();
    let (mut theta_l, mut f_l) = left;
    let (mut theta_r, mut f_r) = right;
    for _ in 0..settings.max_regula_falsi_iterations {
        let theta = theta_r - f_r * (theta_l - theta_r) / (f_l - f_r);
        let mut ray = match trace_ray(scenario, settings, theta) {
            Ok(ray) => ray,
            Err(RayError::Cancelled) => return Err(RayError::Cancelled),
            Err(e) if e.is_local() => {
                warn!(
                    "receiver {}: ray {:.6} deg failed during refinement: {}",
                    k,
                    theta.to_degrees(),
                    e
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if ray.returning {
            warn!(
                "receiver {}: ray {:.6} deg turns back in range, bracket skipped",
                k,
                theta.to_degrees()
            );
            return Ok(None);
        }
        solve_dynamics(scenario, &mut ray)?;
        let Some((i, f)) = residual(&ray, rx, settings.bracket_capacity) else {
            warn!(
                "receiver {}: ray {:.6} deg does not reach range {}",
                k,
                theta.to_degrees(),
                rx.r
            );
            return Ok(None);
        };
        if f.abs() <= miss {
            return Ok(Some(Arrival::new(&ray, k, rx, i)));
        }
        if f * f_l > 0.0 {
            theta_l = theta;
            f_l = f;
        } else {
            theta_r = theta;
            f_r = f;
        }
    }
    warn!(
        "receiver {}: no eigenray in [{:.6}, {:.6}] deg after {} iterations",
        k,
        theta_l.to_degrees(),
        theta_r.to_degrees(),
        settings.max_regula_falsi_iterations
    );
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{Interface, InterpolationMode, ObjectSet};
    use crate::core::KillReason;
    use crate::reflection::SurfaceClass;
    use crate::scenario::{Receivers, Source};
    use crate::sound_speed::SoundSpeed;

    fn scenario(receivers: Receivers, fan: (f64, f64, usize)) -> Scenario {
        let source = Source::new(0.0, 50.0, 200.0, 5.0, (0.0, 1000.0))
            .unwrap()
            .with_fan(fan.0, fan.1, fan.2)
            .unwrap();
        Scenario::new(
            source,
            Interface::flat(0.0, 0.0, 1000.0, SurfaceClass::Vacuum).unwrap(),
            Interface::flat(100.0, 0.0, 1000.0, SurfaceClass::Rigid).unwrap(),
            SoundSpeed::isovelocity(1500.0).unwrap(),
        )
        .unwrap()
        .with_receivers(receivers)
    }

    fn family(scenario: &Scenario) -> Vec<RayTrajectory> {
        let settings = TracerSettings::default();
        scenario
            .source
            .angles
            .iter()
            .map(|&theta| {
                let mut ray = trace_ray(scenario, &settings, theta).unwrap();
                solve_dynamics(scenario, &mut ray).unwrap();
                ray
            })
            .collect()
    }

    #[test]
    fn proximity_finds_direct_path() {
        let rx = Receivers::points(vec![Vec2::new(600.0, 50.0)], 0.5).unwrap();
        let sc = scenario(rx, (-2.0, 2.0, 5));
        let rays = family(&sc);
        let found = find_eigenrays_proximity(&sc, &TracerSettings::default(), &rays);
        assert_eq!(found.len(), 1);
        let direct: Vec<&Arrival> = found[0].iter().filter(|a| a.theta == 0.0).collect();
        assert_eq!(direct.len(), 1);
        let a = direct[0];
        assert!((a.tau - 600.0 / 1500.0).abs() < 1e-12);
        assert!(a.miss() < 1e-9);
        assert_eq!(*a.trajectory.r.last().unwrap(), 600.0);
        assert_eq!(a.surface_reflections + a.bottom_reflections, 0);
        assert!(a.amplitude.norm() > 0.0);
    }

    #[test]
    fn regula_falsi_converges_on_image_paths() {
        let rx = Receivers::points(vec![Vec2::new(800.0, 70.0)], 0.01).unwrap();
        let sc = scenario(rx, (-30.0, 30.0, 61));
        let rays = family(&sc);
        let found = find_eigenrays_regula_falsi(&sc, &TracerSettings::default(), &rays).unwrap();
        let arrivals = &found[0];
        assert!(!arrivals.is_empty());
        for a in arrivals {
            assert!(a.miss() <= 0.01);
        }
        // direct path and the single bottom bounce via the image at depth 130
        let direct = (20.0f64 / 800.0).atan();
        let bottom = (80.0f64 / 800.0).atan();
        for (theta, zr, bounces) in [(direct, 70.0, 0), (bottom, 130.0, 1)] {
            let a = arrivals
                .iter()
                .find(|a| (a.theta - theta).abs() < 1e-4)
                .unwrap_or_else(|| panic!("no arrival near {} rad", theta));
            let tau = (800.0f64.powi(2) + (zr - 50.0f64).powi(2)).sqrt() / 1500.0;
            assert!((a.tau - tau).abs() < 1e-5);
            assert_eq!(a.bottom_reflections, bounces);
            assert_eq!(a.surface_reflections, 0);
        }
    }

    #[test]
    fn regula_falsi_rejects_returning_rays() {
        let rx = Receivers::points(vec![Vec2::new(800.0, 70.0)], 0.01).unwrap();
        let sc = scenario(rx, (-5.0, 5.0, 3));
        let mut rays = family(&sc);
        rays[1].returning = true;
        let err = find_eigenrays_regula_falsi(&sc, &TracerSettings::default(), &rays);
        assert!(matches!(err, Err(RayError::ReturningRay { .. })));
    }

    #[test]
    fn refinement_skips_rays_turned_back_by_an_object() {
        // a wedge whose steep lower face sends the horizontal ray back upstream
        let face = |depths: Vec<f64>| {
            Interface::new(
                vec![400.0, 401.0, 419.0, 420.0],
                depths,
                InterpolationMode::Linear,
                SurfaceClass::Rigid,
            )
            .unwrap()
        };
        let objects = ObjectSet::from_faces(vec![(
            face(vec![45.0, 35.0, 35.0, 45.0]),
            face(vec![45.0, 55.0, 55.0, 45.0]),
        )])
        .unwrap();
        let rx = Receivers::points(vec![Vec2::new(300.0, 50.0)], 0.01).unwrap();
        let sc = scenario(rx, (-10.0, 10.0, 2)).with_objects(objects).unwrap();
        let rays = family(&sc);
        assert!(rays.iter().all(|ray| !ray.returning));

        let settings = TracerSettings::default();
        let turned = trace_ray(&sc, &settings, 0.0).unwrap();
        assert!(turned.returning);
        // the outbound leg passes the receiver exactly
        assert!(residual(&turned, Vec2::new(300.0, 50.0), 50).unwrap().1.abs() < 1e-9);

        let found = find_eigenrays_regula_falsi(&sc, &settings, &rays).unwrap();
        assert!(found[0].is_empty());
    }

    #[test]
    fn arrival_trajectory_ends_at_the_receiver() {
        let theta = 20f64.to_radians();
        let rx = Vec2::new(60.0, 50.0 + 60.0 * theta.tan());
        let receivers = Receivers::points(vec![rx], 0.5).unwrap();
        let source = Source::new(0.0, 50.0, 200.0, 5.0, (0.0, 1000.0))
            .unwrap()
            .with_angles(&[20.0])
            .unwrap();
        let sc = Scenario::new(
            source,
            Interface::flat(0.0, 0.0, 1000.0, SurfaceClass::Vacuum).unwrap(),
            Interface::flat(100.0, 0.0, 1000.0, SurfaceClass::Absorbent).unwrap(),
            SoundSpeed::isovelocity(1500.0).unwrap(),
        )
        .unwrap()
        .with_receivers(receivers);
        let rays = family(&sc);
        assert_eq!(rays[0].killed, Some(KillReason::Absorbed));
        assert!(rays[0].r_max > 130.0);

        let found = find_eigenrays_proximity(&sc, &TracerSettings::default(), &rays);
        assert_eq!(found[0].len(), 1);
        let a = &found[0][0];
        let t = &a.trajectory;
        assert_eq!(*t.r.last().unwrap(), 60.0);
        assert!(t.killed.is_none());
        assert_eq!(t.r_min, 0.0);
        assert_eq!(t.r_max, 60.0);
        assert!(!t.returning);
        assert!(t.refraction_points.is_empty());
        assert_eq!(t.p.len(), t.len());
        // isovelocity spreading: p = 1 and q = c s up to the receiver
        let s = 60.0 / theta.cos();
        assert!((*t.s.last().unwrap() - s).abs() < 1e-9);
        assert!((*t.p.last().unwrap() - 1.0).abs() < 1e-12);
        assert!((*t.q.last().unwrap() - 1500.0 * s).abs() < 1e-6);
    }

    #[test]
    fn iteration_cap_skips_bracket() {
        let rx = Receivers::points(vec![Vec2::new(800.0, 70.0)], 1e-9).unwrap();
        let sc = scenario(rx, (-30.0, 30.0, 61));
        let rays = family(&sc);
        let settings = TracerSettings::default().with_max_regula_falsi_iterations(0);
        let found = find_eigenrays_regula_falsi(&sc, &settings, &rays).unwrap();
        assert!(found[0].is_empty());
    }
}
