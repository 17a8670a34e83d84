// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Per-ray march through the waveguide.
//!
//! A ray is advanced with the RKF45 integrator until it leaves the range box
//! or is killed. Every step is checked against the altimetry, the bathymetry
//! and the objects; a crossing is resolved to an intersection point where
//! the ray is specularly reflected and its decay multiplied by the surface's
//! reflection coefficient.

use log::{debug, warn};
use num_complex::Complex64;

use crate::boundary::{Face, Interface};
use crate::core::{KillReason, RayTrajectory, Reflection, Sample, Side, Surface, Vec2};
use crate::error::{RayError, Result};
use crate::reflection::{specular_reflection, surface_coefficient, Material, SurfaceClass};
use crate::rkf45::{Integrator, RayState};
use crate::scenario::{Scenario, TracerSettings};

/// A surface crossing detected during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryEvent {
    /// Crossed the altimetry.
    Top,
    /// Crossed the bathymetry.
    Bottom,
    /// Entered an object through one of its faces.
    Object {
        /// Index of the object.
        index: usize,
        /// Face struck.
        face: Face,
    },
}

#[derive(Debug, Clone, Copy)]
enum MarchState {
    Marching,
    BoundaryHit {
        event: BoundaryEvent,
        hit: Vec2,
        incident: Vec2,
    },
    Killed(KillReason),
    Done,
}

/// Trace the ray launched at `theta` radians (positive downward).
pub fn trace_ray(
    scenario: &Scenario,
    settings: &TracerSettings,
    theta: f64,
) -> Result<RayTrajectory> {
    RayMarch::new(scenario, settings, theta)?.run()
}

struct RayMarch<'a> {
    scenario: &'a Scenario,
    settings: &'a TracerSettings,
    integrator: Integrator,
    ray: RayTrajectory,
    state: RayState,
    last: Sample,
    limit: usize,
}

impl<'a> RayMarch<'a> {
    fn new(scenario: &'a Scenario, settings: &'a TracerSettings, theta: f64) -> Result<Self> {
        if !theta.is_finite() {
            return Err(RayError::InvalidParameter {
                name: "launch angle",
                value: theta,
            });
        }
        let source = &scenario.source;
        let pos = source.position();
        let c = scenario.sound_speed.evaluate(pos.r, pos.z)?.c;
        let direction = Vec2::from_angle(theta);
        let limit = source.sample_budget(settings.memory_factor);

        let first = Sample {
            pos,
            c,
            tau: 0.0,
            s: 0.0,
            ic: 0.0,
            tangent: direction,
            reflection: None,
            decay: Complex64::new(1.0, 0.0),
            phase: 0.0,
        };
        let mut ray = RayTrajectory::with_capacity(theta, limit.min(4096));
        ray.push(first);

        Ok(RayMarch {
            scenario,
            settings,
            integrator: Integrator::new(settings.step_tolerance, settings.max_step_halvings),
            ray,
            state: RayState::launch(pos, direction, c),
            last: first,
            limit,
        })
    }

    fn run(mut self) -> Result<RayTrajectory> {
        let mut state = MarchState::Marching;
        loop {
            state = match state {
                MarchState::Marching => {
                    self.settings.cancel.check()?;
                    if self.ray.len() >= self.limit {
                        return Err(RayError::MemoryBudgetExceeded { limit: self.limit });
                    }
                    self.step()?
                }
                MarchState::BoundaryHit {
                    event,
                    hit,
                    incident,
                } => self.reflect(event, hit, incident)?,
                MarchState::Killed(reason) => {
                    self.kill(reason);
                    break;
                }
                MarchState::Done => break,
            };
        }
        self.finish();
        Ok(self.ray)
    }

    fn step(&mut self) -> Result<MarchState> {
        let scenario = self.scenario;
        let (out, _) =
            self.integrator
                .advance(&scenario.sound_speed, &self.state, scenario.source.ds)?;
        let mut next = out.state;

        let (r0, r1) = scenario.source.range_box;
        let mut exiting = false;
        if next.pos.r > r1 || next.pos.r < r0 {
            let edge = if next.pos.r > r1 { r1 } else { r0 };
            let t = (edge - self.state.pos.r) / (next.pos.r - self.state.pos.r);
            next = self.state.lerp(&next, t);
            next.pos.r = edge;
            exiting = true;
        }

        if !scenario.altimetry.covers(next.pos.r) || !scenario.bathymetry.covers(next.pos.r) {
            return Ok(MarchState::Killed(KillReason::OutOfDomain));
        }

        if let Some((event, hit)) = self.detect(self.state.pos, next.pos)? {
            let travelled = (next.pos - self.state.pos).norm();
            let t = if travelled > 0.0 {
                (hit - self.state.pos).norm() / travelled
            } else {
                0.0
            };
            let incident = self.state.lerp(&next, t).tangent();
            return Ok(MarchState::BoundaryHit {
                event,
                hit,
                incident,
            });
        }

        let c = scenario.sound_speed.evaluate(next.pos.r, next.pos.z)?.c;
        self.append(next.pos, c, next.tangent(), None);
        self.state = next;
        Ok(if exiting {
            MarchState::Done
        } else {
            MarchState::Marching
        })
    }

    /// The nearest surface crossed by the segment `a -> b`, if any.
    fn detect(&self, a: Vec2, b: Vec2) -> Result<Option<(BoundaryEvent, Vec2)>> {
        let scenario = self.scenario;
        let mut best: Option<(BoundaryEvent, Vec2, f64)> = None;
        let mut consider = |event: BoundaryEvent, hit: Vec2| {
            let d = (hit - a).norm();
            if best.map_or(true, |(_, _, bd)| d < bd) {
                best = Some((event, hit, d));
            }
        };

        if b.z < scenario.altimetry.depth_at(b.r)? {
            consider(BoundaryEvent::Top, scenario.altimetry.intersect(a, b)?);
        }
        if b.z > scenario.bathymetry.depth_at(b.r)? {
            consider(BoundaryEvent::Bottom, scenario.bathymetry.intersect(a, b)?);
        }
        for (index, object) in scenario.objects.iter().enumerate() {
            if object.contains(b) {
                let (face, start) = object.entry_face(a, b)?;
                let hit = object.face(face).intersect(start, b)?;
                consider(BoundaryEvent::Object { index, face }, hit);
            }
        }
        Ok(best.map(|(event, hit, _)| (event, hit)))
    }

    fn surface(&self, event: BoundaryEvent) -> Result<(&'a Interface, Side, Surface)> {
        let scenario = self.scenario;
        Ok(match event {
            BoundaryEvent::Top => (&scenario.altimetry, Side::Top, Surface::Altimetry),
            BoundaryEvent::Bottom => (&scenario.bathymetry, Side::Bottom, Surface::Bathymetry),
            BoundaryEvent::Object { index, face } => {
                let object = scenario.objects.get(index).ok_or_else(|| {
                    RayError::Other(format!("object {} does not exist", index))
                })?;
                // water lies above an upper face, as above the bottom
                let side = match face {
                    Face::Upper => Side::Bottom,
                    Face::Lower => Side::Top,
                };
                (object.face(face), side, Surface::Object { index })
            }
        })
    }

    fn reflect(&mut self, event: BoundaryEvent, hit: Vec2, incident: Vec2) -> Result<MarchState> {
        let scenario = self.scenario;
        let (iface, side, surface) = self.surface(event)?;
        let point = iface.evaluate(hit.r)?;
        // normal pointing into the water
        let normal = match side {
            Side::Top => point.normal,
            Side::Bottom => -point.normal,
        };
        let (reflected, theta) = specular_reflection(normal, incident);
        let c = scenario.sound_speed.evaluate(hit.r, hit.z)?.c;

        let class = iface.class();
        let material = if class == SurfaceClass::Elastic {
            iface.material_at(hit.r)?
        } else {
            Material::default()
        };
        let coefficient = surface_coefficient(
            class,
            &material,
            iface.units(),
            scenario.source.frequency,
            c,
            theta,
        );

        match surface {
            Surface::Altimetry => self.ray.surface_reflections += 1,
            Surface::Bathymetry => self.ray.bottom_reflections += 1,
            Surface::Object { .. } => self.ray.object_reflections += 1,
        }
        let reflection = Reflection {
            surface,
            side,
            boundary_tangent: point.tangent,
            incident,
            coefficient,
        };
        self.append(hit, c, reflected, Some(reflection));
        self.state = RayState::launch(hit, reflected, c);

        if class == SurfaceClass::Absorbent {
            return Ok(MarchState::Killed(KillReason::Absorbed));
        }
        if coefficient.norm() < self.settings.min_reflection_coefficient {
            return Ok(MarchState::Killed(KillReason::WeakReflection));
        }
        let probe = hit + reflected * scenario.source.ds;
        if self.beyond(event, probe)? {
            return Ok(MarchState::Killed(KillReason::DiggingIn));
        }
        Ok(MarchState::Marching)
    }

    /// True if `p` lies on the far side of the surface behind `event`.
    fn beyond(&self, event: BoundaryEvent, p: Vec2) -> Result<bool> {
        let scenario = self.scenario;
        Ok(match event {
            BoundaryEvent::Top => {
                scenario.altimetry.covers(p.r) && p.z < scenario.altimetry.depth_at(p.r)?
            }
            BoundaryEvent::Bottom => {
                scenario.bathymetry.covers(p.r) && p.z > scenario.bathymetry.depth_at(p.r)?
            }
            BoundaryEvent::Object { index, .. } => scenario
                .objects
                .get(index)
                .is_some_and(|object| object.contains(p)),
        })
    }

    fn append(&mut self, pos: Vec2, c: f64, tangent: Vec2, reflection: Option<Reflection>) {
        let prev = self.last;
        let ds = (pos - prev.pos).norm();
        let (decay, phase) = match reflection {
            Some(refl) => {
                let rc = refl.coefficient;
                let dphi = if rc.norm() > 0.0 { rc.arg() } else { 0.0 };
                (prev.decay * rc, prev.phase + dphi)
            }
            None => (prev.decay, prev.phase),
        };
        let sample = Sample {
            pos,
            c,
            tau: prev.tau + ds * 0.5 * (1.0 / prev.c + 1.0 / c),
            s: prev.s + ds,
            ic: prev.ic + ds * 0.5 * (prev.c + c),
            tangent,
            reflection,
            decay,
            phase,
        };
        self.ray.push(sample);
        self.last = sample;
    }

    fn kill(&mut self, reason: KillReason) {
        let theta = self.ray.theta.to_degrees();
        match reason {
            KillReason::OutOfDomain | KillReason::DiggingIn => warn!(
                "ray {:.4} deg killed ({:?}) at ({:.3}, {:.3})",
                theta, reason, self.last.pos.r, self.last.pos.z
            ),
            KillReason::Absorbed | KillReason::WeakReflection => debug!(
                "ray {:.4} deg stopped ({:?}) at ({:.3}, {:.3})",
                theta, reason, self.last.pos.r, self.last.pos.z
            ),
        }
        self.ray.killed = Some(reason);
    }

    /// Range extent, returning flag and refraction points.
    fn finish(&mut self) {
        let ray = &mut self.ray;
        ray.measure_shape();
        let n = ray.len();
        debug!(
            "ray {:.4} deg: {} samples, {} reflections, {} refraction points, tau {:.6}",
            ray.theta.to_degrees(),
            n,
            ray.reflections(),
            ray.refraction_points.len(),
            ray.tau.last().copied().unwrap_or(0.0)
        );
    }
}
