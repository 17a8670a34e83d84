// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use log::{info, warn};

use crate::core::RayTrajectory;
use crate::dynamic::solve_dynamics;
use crate::eigenray::{find_eigenrays_proximity, find_eigenrays_regula_falsi, Arrival, EigenrayMethod};
use crate::eikonal::trace_ray;
use crate::error::{RayError, Result};
use crate::scenario::{Scenario, TracerSettings};

/// Progress information passed to the optional callback.
pub struct ProgressInfo {
    /// Number of rays finished so far.
    pub rays_traced: u64,
    /// Launch angles still waiting in the queue.
    pub rays_pending: usize,
    /// Number of worker threads currently tracing.
    pub in_flight: usize,
    /// Elapsed time since the sweep started.
    pub elapsed: Duration,
}

/// A launch angle whose ray could not be completed.
#[derive(Debug)]
pub struct RayFailure {
    /// Position of the angle in the launch fan.
    pub index: usize,
    /// Launch angle (radians).
    pub theta: f64,
    /// What went wrong.
    pub error: RayError,
}

/// Result of a sweep over the launch fan.
#[derive(Debug)]
pub struct SweepOutput {
    /// Completed rays, in launch-angle order, with dynamics solved.
    pub rays: Vec<RayTrajectory>,
    /// Rays that failed with a per-ray error.
    pub failures: Vec<RayFailure>,
}

/// Traces every launch angle of a scenario on a worker pool.
///
/// Workers pop angle indices from a shared queue, trace the ray and solve
/// its dynamics. Each ray is computed by one thread, so the output does not
/// depend on the number of threads.
pub struct RaySweep<'a> {
    scenario: &'a Scenario,
    settings: TracerSettings,
    num_threads: Option<usize>,
    progress_interval: Duration,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
}

impl<'a> RaySweep<'a> {
    /// Create a sweep over `scenario`'s launch fan.
    pub fn new(scenario: &'a Scenario, settings: TracerSettings) -> Self {
        RaySweep {
            scenario,
            settings,
            num_threads: None,
            progress_interval: Duration::from_millis(500),
            progress_callback: None,
        }
    }

    /// Set the number of worker threads (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads.max(1));
        self
    }

    /// Set a progress callback (builder method).
    /// The callback receives progress information approximately every 500ms,
    /// see [`RaySweep::with_progress_interval`].
    pub fn with_progress(mut self, callback: Box<dyn Fn(ProgressInfo) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Minimum time between two progress reports (builder method).
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    fn build_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.get_num_threads())
            .build()
            .map_err(|e| RayError::Other(e.to_string()))
    }

    fn trace_one(&self, theta: f64) -> Result<RayTrajectory> {
        let mut ray = trace_ray(self.scenario, &self.settings, theta)?;
        solve_dynamics(self.scenario, &mut ray)?;
        Ok(ray)
    }

    /// Trace all launch angles.
    ///
    /// Per-ray failures (step non-convergence, exhausted sample budget) are
    /// logged and returned in [`SweepOutput::failures`]; any other error
    /// aborts the sweep.
    ///
    /// # Parameters
    /// - `progress_cb`: Optional callback for progress updates (overrides builder-set callback)
    ///
    /// # Errors
    /// Returns `Cancelled` if the settings' cancel token fires, or the first
    /// configuration error hit by any ray.
    pub fn run(&self, progress_cb: Option<&(dyn Fn(ProgressInfo) + Sync)>) -> Result<SweepOutput> {
        let angles = &self.scenario.source.angles;
        let jobs = SegQueue::new();
        for index in 0..angles.len() {
            jobs.push(index);
        }
        let results: SegQueue<(usize, Result<RayTrajectory>)> = SegQueue::new();

        let use_progress = progress_cb.is_some() || self.progress_callback.is_some();
        let num_threads = self.get_num_threads();
        let pool = self.build_pool()?;

        let in_flight = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let traced = AtomicU64::new(0);
        let start_time = Instant::now();
        let last_progress = AtomicU64::new(0);
        let interval_ms = self.progress_interval.as_millis() as u64;

        pool.scope(|s| {
            for _ in 0..num_threads {
                s.spawn(|_| loop {
                    if abort.load(Ordering::Acquire) {
                        break;
                    }
                    let Some(index) = jobs.pop() else {
                        break;
                    };
                    in_flight.fetch_add(1, Ordering::AcqRel);

                    let outcome = self.trace_one(angles[index]);
                    if let Err(e) = &outcome {
                        if !e.is_local() || matches!(e, RayError::Cancelled) {
                            abort.store(true, Ordering::Release);
                        }
                    }
                    results.push((index, outcome));
                    let count = traced.fetch_add(1, Ordering::Relaxed) + 1;

                    if use_progress {
                        let elapsed_ms = start_time.elapsed().as_millis() as u64;
                        let last = last_progress.load(Ordering::Relaxed);
                        if elapsed_ms >= last + interval_ms
                            && last_progress
                                .compare_exchange(
                                    last,
                                    elapsed_ms,
                                    Ordering::Relaxed,
                                    Ordering::Relaxed,
                                )
                                .is_ok()
                        {
                            let info = ProgressInfo {
                                rays_traced: count,
                                rays_pending: jobs.len(),
                                in_flight: in_flight.load(Ordering::Relaxed),
                                elapsed: start_time.elapsed(),
                            };
                            if let Some(cb) = progress_cb {
                                cb(info);
                            } else if let Some(cb) = &self.progress_callback {
                                cb(info);
                            }
                        }
                    }
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                });
            }
        });

        if self.settings.cancel.is_cancelled() {
            return Err(RayError::Cancelled);
        }

        let mut outcomes: Vec<(usize, Result<RayTrajectory>)> = Vec::with_capacity(angles.len());
        while let Some(item) = results.pop() {
            outcomes.push(item);
        }
        outcomes.sort_by_key(|(index, _)| *index);

        let mut rays = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(ray) => rays.push(ray),
                Err(error) if error.is_local() => {
                    warn!(
                        "ray {} ({:.4} deg) failed: {}",
                        index,
                        angles[index].to_degrees(),
                        error
                    );
                    failures.push(RayFailure {
                        index,
                        theta: angles[index],
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        info!(
            "traced {} rays ({} failed) on {} threads in {:.3?}",
            angles.len(),
            failures.len(),
            num_threads,
            start_time.elapsed()
        );
        Ok(SweepOutput { rays, failures })
    }

    /// Search eigenrays for every receiver on this sweep's worker pool.
    pub fn eigenrays(
        &self,
        rays: &[RayTrajectory],
        method: EigenrayMethod,
    ) -> Result<Vec<Vec<Arrival>>> {
        let pool = self.build_pool()?;
        pool.install(|| match method {
            EigenrayMethod::Proximity => Ok(find_eigenrays_proximity(
                self.scenario,
                &self.settings,
                rays,
            )),
            EigenrayMethod::RegulaFalsi => {
                find_eigenrays_regula_falsi(self.scenario, &self.settings, rays)
            }
        })
    }
}
