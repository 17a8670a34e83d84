// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Runge-Kutta-Fehlberg 4(5) integration of the ray equations.
//!
//! The state is position `x = (r, z)` and slowness vector `σ = (σr, σz)` with
//! `dx/ds = c σ` and `dσ/ds = ∇(1/c)`. One Fehlberg step produces embedded
//! fourth- and fifth-order solutions; the disagreement between the lengths of
//! the two displacements drives step halving.

use crate::core::{Medium, Vec2};
use crate::error::{RayError, Result};

/// Stage coupling coefficients (lower triangle). Row sums are the stage
/// nodes 0, 1/4, 3/8, 12/13, 1, 1/2; the derivative has no explicit `s`
/// dependence so the nodes themselves are never needed.
const A: [[f64; 5]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 4.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 32.0, 9.0 / 32.0, 0.0, 0.0, 0.0],
    [1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0, 0.0, 0.0],
    [439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0, 0.0],
    [-8.0 / 27.0, 2.0, -3544.0 / 2565.0, 1859.0 / 4104.0, -11.0 / 40.0],
];

/// Fourth-order weights.
const B4: [f64; 6] = [
    25.0 / 216.0,
    0.0,
    1408.0 / 2565.0,
    2197.0 / 4104.0,
    -1.0 / 5.0,
    0.0,
];

/// Fifth-order weights.
const B5: [f64; 6] = [
    16.0 / 135.0,
    0.0,
    6656.0 / 12825.0,
    28561.0 / 56430.0,
    -9.0 / 50.0,
    2.0 / 55.0,
];

/// Position and slowness vector of a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayState {
    /// Position (r, z).
    pub pos: Vec2,
    /// Slowness vector, tangent / c.
    pub sigma: Vec2,
}

impl RayState {
    /// State at `pos` travelling along unit `direction` where the speed is `c`.
    pub fn launch(pos: Vec2, direction: Vec2, c: f64) -> Self {
        RayState {
            pos,
            sigma: direction * (1.0 / c),
        }
    }

    /// Unit tangent.
    pub fn tangent(&self) -> Vec2 {
        self.sigma.normalized()
    }

    /// Linear blend of two states.
    pub fn lerp(&self, other: &RayState, t: f64) -> RayState {
        RayState {
            pos: self.pos + (other.pos - self.pos) * t,
            sigma: self.sigma + (other.sigma - self.sigma) * t,
        }
    }

    fn offset(&self, k: &[(Vec2, Vec2)], coeffs: &[f64], h: f64) -> RayState {
        let mut out = *self;
        for (&(dx, ds), &a) in k.iter().zip(coeffs) {
            if a != 0.0 {
                out.pos = out.pos + dx * (h * a);
                out.sigma = out.sigma + ds * (h * a);
            }
        }
        out
    }
}

/// Result of a single Fehlberg step.
#[derive(Debug, Clone, Copy)]
pub struct StepOutput {
    /// Fifth-order state, the one carried forward.
    pub state: RayState,
    /// Length of the fourth-order displacement.
    pub ds4: f64,
    /// Length of the fifth-order displacement.
    pub ds5: f64,
}

impl StepOutput {
    /// Relative disagreement between the two displacement lengths.
    pub fn relative_error(&self) -> f64 {
        let mean = 0.5 * (self.ds4 + self.ds5);
        if mean == 0.0 {
            0.0
        } else {
            (self.ds4 - self.ds5).abs() / mean
        }
    }
}

fn derivative<M: Medium + ?Sized>(medium: &M, y: &RayState) -> Result<(Vec2, Vec2)> {
    let sample = medium.speed(y.pos.r, y.pos.z)?;
    Ok((y.sigma * sample.c, sample.slowness_grad))
}

/// One Fehlberg step of length `h` from `y0`.
pub fn rkf45_step<M: Medium + ?Sized>(medium: &M, y0: &RayState, h: f64) -> Result<StepOutput> {
    let mut k: Vec<(Vec2, Vec2)> = Vec::with_capacity(6);
    for stage in 0..6 {
        let y = y0.offset(&k, &A[stage][..stage], h);
        k.push(derivative(medium, &y)?);
    }
    let y4 = y0.offset(&k, &B4, h);
    let y5 = y0.offset(&k, &B5, h);
    Ok(StepOutput {
        state: y5,
        ds4: (y4.pos - y0.pos).norm(),
        ds5: (y5.pos - y0.pos).norm(),
    })
}

/// Step-halving driver around [`rkf45_step`].
#[derive(Debug, Clone, Copy)]
pub struct Integrator {
    tolerance: f64,
    max_halvings: usize,
}

impl Integrator {
    /// Create an integrator accepting steps whose relative error is at most `tolerance`.
    pub fn new(tolerance: f64, max_halvings: usize) -> Self {
        Integrator {
            tolerance,
            max_halvings,
        }
    }

    /// Advance from `y0` by at most `h`, halving until the step is accepted.
    ///
    /// Returns the accepted step and the step length used.
    pub fn advance<M: Medium + ?Sized>(
        &self,
        medium: &M,
        y0: &RayState,
        h: f64,
    ) -> Result<(StepOutput, f64)> {
        let mut h = h;
        for _ in 0..=self.max_halvings {
            let out = rkf45_step(medium, y0, h)?;
            if out.relative_error() <= self.tolerance {
                return Ok((out, h));
            }
            h *= 0.5;
        }
        Err(RayError::StepNonConvergence {
            r: y0.pos.r,
            z: y0.pos.z,
            halvings: self.max_halvings,
        })
    }
}

impl Default for Integrator {
    fn default() -> Self {
        Integrator::new(0.1, 20)
    }
}
