// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Paraxial ray-tube equations along a traced trajectory.
//!
//! `q` measures the ray-tube width and `p` its rate of change:
//! `dq/ds = c p`, `dp/ds = -(c_nn / c²) q`, with `c_nn` the second
//! derivative of sound speed normal to the ray. Reflections add a jump to
//! `p` that accounts for the sound-speed gradient at the boundary.

use std::f64::consts::FRAC_PI_2;

use num_complex::Complex64;

use crate::core::{RayTrajectory, Reflection, Side, SpeedSample, Vec2};
use crate::error::Result;
use crate::reflection::thorp_attenuation;
use crate::scenario::Scenario;

/// Second derivative of c along the unit normal `n`.
fn normal_curvature(speed: &SpeedSample, n: Vec2) -> f64 {
    speed.crr * n.r * n.r + 2.0 * speed.crz * n.r * n.z + speed.czz * n.z * n.z
}

/// Jump in `p / q` across a reflection.
///
/// `reflected` is the outgoing unit tangent and `speed` the sound speed at
/// the reflection point. Boundaries are treated as locally straight.
pub fn reflection_correction(reflection: &Reflection, reflected: Vec2, speed: &SpeedSample) -> f64 {
    let t_in = reflection.incident;
    let tangent = reflection.boundary_tangent;
    // outward normal: out of the water, into the boundary
    let outward = match reflection.side {
        Side::Top => -tangent.rotated(),
        Side::Bottom => tangent.rotated(),
    };
    let tg = t_in.dot(tangent);
    let th = t_in.dot(outward);
    if th.abs() < 1e-12 {
        return 0.0;
    }

    let n_in = t_in.rotated();
    let n_out = -reflected.rotated();
    let mut cn_jump = -speed.grad.dot(n_out - n_in);
    let cs_jump = -speed.grad.dot(reflected - t_in);
    if reflection.side == Side::Top {
        cn_jump = -cn_jump;
    }
    let rm = tg / th;
    rm * (2.0 * cn_jump - rm * cs_jump) / speed.c2
}

/// Solve `p`, `q`, the caustic phase and the complex amplitude along `ray`.
pub fn solve_dynamics(scenario: &Scenario, ray: &mut RayTrajectory) -> Result<()> {
    let n = ray.len();
    ray.p = Vec::with_capacity(n);
    ray.q = Vec::with_capacity(n);
    ray.caustic_phase = Vec::with_capacity(n);
    ray.amplitude = Vec::with_capacity(n);
    ray.caustics = 0;
    if n == 0 {
        return Ok(());
    }

    let medium = &scenario.sound_speed;
    let alpha = thorp_attenuation(scenario.source.frequency);
    let c0 = ray.c[0];
    let launch = c0 * ray.theta.cos().abs();

    let mut speed_prev = medium.evaluate(ray.r[0], ray.z[0])?;
    let mut p = 1.0;
    let mut q = 0.0;
    let mut phase = 0.0;
    ray.p.push(p);
    ray.q.push(q);
    ray.caustic_phase.push(phase);
    ray.amplitude.push(Complex64::new(f64::NAN, f64::NAN));

    for i in 1..n {
        let speed = medium.evaluate(ray.r[i], ray.z[i])?;
        let ds = ray.s[i] - ray.s[i - 1];
        let reflection = ray.reflection[i];
        // direction travelled into sample i
        let t_prev = ray.tangent[i - 1];
        let t_here = reflection.map_or(ray.tangent[i], |refl| refl.incident);

        let k1q = speed_prev.c * p;
        let k1p = -normal_curvature(&speed_prev, t_prev.rotated()) / speed_prev.c2 * q;
        let qp = q + ds * k1q;
        let pp = p + ds * k1p;
        let k2q = speed.c * pp;
        let k2p = -normal_curvature(&speed, t_here.rotated()) / speed.c2 * qp;
        let q_new = q + 0.5 * ds * (k1q + k2q);
        let mut p_new = p + 0.5 * ds * (k1p + k2p);

        if let Some(refl) = reflection {
            p_new += q_new * reflection_correction(&refl, ray.tangent[i], &speed);
        }

        if i > 1 && (q_new == 0.0 || q_new * q < 0.0) {
            phase += FRAC_PI_2;
            ray.caustics += 1;
        }

        let spreading = (launch * speed.c / (ray.ic[i] * q_new.abs())).sqrt();
        let amplitude = ray.decay[i] * (spreading * (-alpha * ray.s[i]).exp());

        ray.p.push(p_new);
        ray.q.push(q_new);
        ray.caustic_phase.push(phase);
        ray.amplitude.push(amplitude);

        p = p_new;
        q = q_new;
        speed_prev = speed;
    }
    Ok(())
}
