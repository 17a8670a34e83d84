// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! A parallel 2-D underwater acoustic ray tracer.
//!
//! Rays are launched from a point source into a range/depth waveguide bounded
//! by an altimetry, a bathymetry and optional obstacles. Each ray follows the
//! eikonal equations through the sound-speed field with an adaptive
//! Runge–Kutta–Fehlberg integrator, reflecting off boundaries with
//! class-dependent coefficients. The paraxial ray-tube equations then give
//! amplitudes, and eigenrays connecting the source to receivers are found by
//! proximity matching or regula falsi. Launch angles are traced in parallel.

#![warn(missing_docs)]

/// Interfaces (altimetry, bathymetry) and obstacles.
pub mod boundary;
/// Vectors, sound-speed samples and ray trajectories.
pub mod core;
/// Paraxial amplitude and caustic phase along a ray.
pub mod dynamic;
/// Eigenray search.
pub mod eigenray;
/// The eikonal ray march with boundary reflections.
pub mod eikonal;
/// Error types for the library.
pub mod error;
/// Table search and polynomial interpolation.
pub mod interpolation;
/// File I/O for sound-speed tables, ray fans and arrivals.
pub mod io;
/// Reflection geometry and coefficients.
pub mod reflection;
/// Embedded Runge–Kutta–Fehlberg 4(5) integrator.
pub mod rkf45;
/// Source, receivers, waveguide and tracer settings.
pub mod scenario;
/// Parallel launch-angle sweep.
pub mod scheduler;
/// Sound-speed profiles and fields.
pub mod sound_speed;

pub use crate::core::{RayTrajectory, Vec2};
pub use crate::dynamic::solve_dynamics;
pub use crate::eigenray::{find_eigenrays_proximity, find_eigenrays_regula_falsi, Arrival, EigenrayMethod};
pub use crate::eikonal::trace_ray;
pub use crate::error::{RayError, Result};
pub use crate::scenario::{CancelToken, Receivers, Scenario, Source, TracerSettings};
pub use crate::scheduler::{ProgressInfo, RaySweep, SweepOutput};
