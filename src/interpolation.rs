// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use ndarray::ArrayView2;

use crate::error::{RayError, Result};

/// Value and derivatives of a 1D interpolant at a query point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Interp1 {
    /// Interpolated value.
    pub value: f64,
    /// First derivative.
    pub d1: f64,
    /// Second derivative (zero for linear interpolation).
    pub d2: f64,
}

/// Value and partial derivatives of a 2D interpolant at a query point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Interp2 {
    /// Interpolated value.
    pub value: f64,
    /// First derivative along the first axis.
    pub dr: f64,
    /// First derivative along the second axis.
    pub dz: f64,
    /// Second derivative along the first axis.
    pub drr: f64,
    /// Second derivative along the second axis.
    pub dzz: f64,
    /// Mixed second derivative.
    pub drz: f64,
}

/// Check that a coordinate table has at least `min_len` entries and is strictly increasing.
pub fn validate_increasing(what: &'static str, table: &[f64], min_len: usize) -> Result<()> {
    if table.len() < min_len {
        return Err(RayError::InvalidTable {
            what,
            reason: format!("{} entries, need at least {}", table.len(), min_len),
        });
    }
    for (i, w) in table.windows(2).enumerate() {
        if !w[0].is_finite() || !w[1].is_finite() || w[1] <= w[0] {
            return Err(RayError::InvalidTable {
                what,
                reason: format!(
                    "not strictly increasing at index {}: {} then {}",
                    i + 1,
                    w[0],
                    w[1]
                ),
            });
        }
    }
    Ok(())
}

/// Locate the interval of a strictly increasing table containing `x`.
///
/// Returns `i` such that `table[i] <= x < table[i + 1]`. A query equal to the
/// last node maps to the last interval. Queries outside the table are an error:
/// callers are responsible for keeping rays and receivers inside the tables.
pub fn bracket(table: &[f64], x: f64) -> Result<usize> {
    let n = table.len();
    if n < 2 {
        return Err(RayError::InvalidTable {
            what: "bracket",
            reason: format!("{} entries, need at least 2", n),
        });
    }
    // written so that NaN falls through to the error
    if !(x >= table[0] && x <= table[n - 1]) {
        return Err(RayError::OutOfRange {
            value: x,
            lo: table[0],
            hi: table[n - 1],
        });
    }
    if x == table[n - 1] {
        return Ok(n - 2);
    }

    let (mut lo, mut hi) = (0usize, n - 1);
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if x >= table[mid] {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// Like [`bracket`], but queries beyond either end map to the end interval.
///
/// Used where a polynomial may be extrapolated a short distance, such as
/// Runge-Kutta stage points that overshoot a boundary before the crossing is
/// resolved. Non-finite queries are still an error.
pub fn bracket_extrapolating(table: &[f64], x: f64) -> Result<usize> {
    let n = table.len();
    if n >= 2 && x.is_finite() {
        if x < table[0] {
            return Ok(0);
        }
        if x > table[n - 1] {
            return Ok(n - 2);
        }
    }
    bracket(table, x)
}

/// Locate every interval of a possibly non-monotonic table that contains `x`.
///
/// Intervals are accepted in either orientation. At most `capacity` indices
/// are returned, in table order; further matches are dropped.
pub fn extended_bracket(table: &[f64], x: f64, capacity: usize) -> Vec<usize> {
    let mut found = Vec::new();
    let mut dropped = 0usize;
    let last = table.len().saturating_sub(2);
    for (i, w) in table.windows(2).enumerate() {
        let (a, b) = (w[0], w[1]);
        let inside = (a <= x && x < b) || (a >= x && x > b) || (i == last && x == b);
        if inside {
            if found.len() < capacity {
                found.push(i);
            } else {
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        log::warn!(
            "extended bracket at {}: kept {} intervals, dropped {}",
            x,
            found.len(),
            dropped
        );
    }
    found
}

/// Start index of a `k`-point stencil around interval `i`, clamped inside an `n`-point table.
pub fn clamped_stencil(n: usize, i: usize, k: usize) -> usize {
    let offset = k.saturating_sub(2) / 2;
    i.saturating_sub(offset).min(n.saturating_sub(k))
}

/// Stencil for interval `i` that degrades from `k` points near the table ends.
///
/// Returns `(start, points)`. A cubic stencil on the first or last interval
/// becomes parabolic; tables shorter than the stencil use what they have.
pub fn degrading_stencil(n: usize, i: usize, k: usize) -> (usize, usize) {
    let mut k = k.min(n).max(2);
    if k == 4 && (i == 0 || i + 2 >= n) {
        k = 3;
    }
    (clamped_stencil(n, i, k), k)
}

/// Two-point linear interpolation: value and slope.
pub fn lin_1d(x: [f64; 2], f: [f64; 2], xi: f64) -> (f64, f64) {
    let slope = (f[1] - f[0]) / (x[1] - x[0]);
    (f[0] + slope * (xi - x[0]), slope)
}

/// Lagrange basis values and first/second derivatives in barycentric-weight form.
fn lagrange_basis<const N: usize>(x: &[f64; N], xi: f64) -> ([f64; N], [f64; N], [f64; N]) {
    let mut l = [0.0; N];
    let mut dl = [0.0; N];
    let mut ddl = [0.0; N];
    let diff: [f64; N] = std::array::from_fn(|k| xi - x[k]);

    for j in 0..N {
        let mut w = 1.0;
        for k in 0..N {
            if k != j {
                w /= x[j] - x[k];
            }
        }

        let mut prod = 1.0;
        let mut d1 = 0.0;
        let mut d2 = 0.0;
        for k in 0..N {
            if k == j {
                continue;
            }
            prod *= diff[k];
            let mut p1 = 1.0;
            for m in 0..N {
                if m != j && m != k {
                    p1 *= diff[m];
                }
            }
            d1 += p1;
            for m in 0..N {
                if m == j || m == k {
                    continue;
                }
                let mut p2 = 1.0;
                for q in 0..N {
                    if q != j && q != k && q != m {
                        p2 *= diff[q];
                    }
                }
                d2 += p2;
            }
        }
        l[j] = w * prod;
        dl[j] = w * d1;
        ddl[j] = w * d2;
    }
    (l, dl, ddl)
}

fn lagrange_1d<const N: usize>(x: &[f64; N], f: &[f64; N], xi: f64) -> Interp1 {
    let (l, dl, ddl) = lagrange_basis(x, xi);
    let mut out = Interp1::default();
    for j in 0..N {
        out.value += l[j] * f[j];
        out.d1 += dl[j] * f[j];
        out.d2 += ddl[j] * f[j];
    }
    out
}

/// Three-point barycentric parabolic interpolation with first and second derivatives.
pub fn parabolic_1d(x: [f64; 3], f: [f64; 3], xi: f64) -> Interp1 {
    lagrange_1d(&x, &f, xi)
}

/// Four-point barycentric cubic interpolation with first and second derivatives.
pub fn cubic_1d(x: [f64; 4], f: [f64; 4], xi: f64) -> Interp1 {
    lagrange_1d(&x, &f, xi)
}

/// Interpolate a tabulated function over `k` consecutive nodes starting at `start`.
pub fn stencil_1d(x: &[f64], f: &[f64], start: usize, k: usize, xi: f64) -> Interp1 {
    match k {
        2 => {
            let (value, d1) = lin_1d([x[start], x[start + 1]], [f[start], f[start + 1]], xi);
            Interp1 { value, d1, d2: 0.0 }
        }
        3 => parabolic_1d(
            [x[start], x[start + 1], x[start + 2]],
            [f[start], f[start + 1], f[start + 2]],
            xi,
        ),
        _ => cubic_1d(
            [x[start], x[start + 1], x[start + 2], x[start + 3]],
            [f[start], f[start + 1], f[start + 2], f[start + 3]],
            xi,
        ),
    }
}

fn tensor_2d<const N: usize, const M: usize>(
    r: &[f64; N],
    z: &[f64; M],
    f: &[[f64; M]; N],
    ri: f64,
    zi: f64,
) -> Interp2 {
    let (lr, dlr, ddlr) = lagrange_basis(r, ri);
    let (lz, dlz, ddlz) = lagrange_basis(z, zi);
    let mut out = Interp2::default();
    for i in 0..N {
        for j in 0..M {
            let fij = f[i][j];
            out.value += lr[i] * lz[j] * fij;
            out.dr += dlr[i] * lz[j] * fij;
            out.dz += lr[i] * dlz[j] * fij;
            out.drr += ddlr[i] * lz[j] * fij;
            out.dzz += lr[i] * ddlz[j] * fij;
            out.drz += dlr[i] * dlz[j] * fij;
        }
    }
    out
}

/// Tensor-product barycentric parabolic interpolation over a 3×3 stencil.
pub fn parabolic_2d(r: [f64; 3], z: [f64; 3], f: [[f64; 3]; 3], ri: f64, zi: f64) -> Interp2 {
    tensor_2d(&r, &z, &f, ri, zi)
}

/// Bilinear interpolation over a 2×2 stencil (second derivatives along each axis vanish).
pub fn bilinear_2d(r: [f64; 2], z: [f64; 2], f: [[f64; 2]; 2], ri: f64, zi: f64) -> Interp2 {
    tensor_2d(&r, &z, &f, ri, zi)
}

/// Interpolate a gridded field `f[r][z]` at `(ri, zi)`.
///
/// Uses a clamped 3×3 parabolic stencil, or a bilinear one when either axis
/// has only two nodes. Points outside the grid are extrapolated from the
/// edge stencil.
pub fn interpolate_grid(
    r: &[f64],
    z: &[f64],
    f: ArrayView2<f64>,
    ri: f64,
    zi: f64,
) -> Result<Interp2> {
    let ir = bracket_extrapolating(r, ri)?;
    let iz = bracket_extrapolating(z, zi)?;
    if r.len() >= 3 && z.len() >= 3 {
        let sr = clamped_stencil(r.len(), ir, 3);
        let sz = clamped_stencil(z.len(), iz, 3);
        let rr = [r[sr], r[sr + 1], r[sr + 2]];
        let zz = [z[sz], z[sz + 1], z[sz + 2]];
        let ff: [[f64; 3]; 3] = std::array::from_fn(|a| std::array::from_fn(|b| f[[sr + a, sz + b]]));
        Ok(parabolic_2d(rr, zz, ff, ri, zi))
    } else {
        let rr = [r[ir], r[ir + 1]];
        let zz = [z[iz], z[iz + 1]];
        let ff: [[f64; 2]; 2] = std::array::from_fn(|a| std::array::from_fn(|b| f[[ir + a, iz + b]]));
        Ok(bilinear_2d(rr, zz, ff, ri, zi))
    }
}
