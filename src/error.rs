// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors raised while configuring or tracing rays.
///
/// Variants fall in two groups. Configuration and precondition violations
/// (tables, tags, geometry) mean the scenario is malformed. Numerical and
/// resource failures (`StepNonConvergence`, `MemoryBudgetExceeded`,
/// `Cancelled`) are local to one ray and are reported per ray by the sweep.
#[derive(Debug)]
pub enum RayError {
    /// A coordinate table is too short or not strictly increasing.
    InvalidTable {
        /// Which table was rejected.
        what: &'static str,
        /// Explanation of the violation.
        reason: String,
    },
    /// A query fell outside the covered range of a monotonic table.
    OutOfRange {
        /// The queried value.
        value: f64,
        /// First table entry.
        lo: f64,
        /// Last table entry.
        hi: f64,
    },
    /// An unrecognized configuration tag.
    UnknownTag {
        /// The kind of tag being parsed.
        kind: &'static str,
        /// The offending text.
        tag: String,
    },
    /// Object faces do not form a closed obstacle.
    InconsistentObject {
        /// Index of the object in the set.
        index: usize,
        /// Explanation of the inconsistency.
        reason: String,
    },
    /// A scalar parameter is out of its admissible domain.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// The source is not strictly inside the waveguide.
    SourceOutsideWaveguide {
        /// Source range.
        r: f64,
        /// Source depth.
        z: f64,
    },
    /// The adaptive step could not meet the tolerance.
    StepNonConvergence {
        /// Range where the step was attempted.
        r: f64,
        /// Depth where the step was attempted.
        z: f64,
        /// Number of halvings performed.
        halvings: usize,
    },
    /// The per-ray sample budget was exhausted.
    MemoryBudgetExceeded {
        /// The sample limit.
        limit: usize,
    },
    /// Regula falsi was asked to search a family containing a returning ray.
    ReturningRay {
        /// Launch angle of the returning ray (radians).
        theta: f64,
    },
    /// The trace was cancelled or its deadline passed.
    Cancelled,
    /// Array shape does not match expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Unsupported data type in file.
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl RayError {
    /// True for failures confined to a single ray or bracket.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RayError::StepNonConvergence { .. }
                | RayError::MemoryBudgetExceeded { .. }
                | RayError::Cancelled
        )
    }
}

impl fmt::Display for RayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RayError::InvalidTable { what, reason } => {
                write!(f, "invalid {} table: {}", what, reason)
            }
            RayError::OutOfRange { value, lo, hi } => {
                write!(f, "value {} outside table range [{}, {}]", value, lo, hi)
            }
            RayError::UnknownTag { kind, tag } => {
                write!(f, "unknown {} tag: '{}'", kind, tag)
            }
            RayError::InconsistentObject { index, reason } => {
                write!(f, "inconsistent object {}: {}", index, reason)
            }
            RayError::InvalidParameter { name, value } => {
                write!(f, "invalid parameter {}: {}", name, value)
            }
            RayError::SourceOutsideWaveguide { r, z } => {
                write!(f, "source at ({}, {}) is outside the waveguide", r, z)
            }
            RayError::StepNonConvergence { r, z, halvings } => {
                write!(
                    f,
                    "step did not converge at ({}, {}) after {} halvings",
                    r, z, halvings
                )
            }
            RayError::MemoryBudgetExceeded { limit } => {
                write!(f, "ray memory budget exceeded: limit was {} samples", limit)
            }
            RayError::ReturningRay { theta } => {
                write!(
                    f,
                    "regula falsi cannot search returning ray (launch angle {} rad)",
                    theta
                )
            }
            RayError::Cancelled => write!(f, "trace cancelled"),
            RayError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            RayError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            RayError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            RayError::MatVariableNotFound {
                expected,
                available,
            } => {
                write!(
                    f,
                    "MAT variable '{}' not found; available variables: {:?}",
                    expected, available
                )
            }
            RayError::IoError(e) => write!(f, "I/O error: {}", e),
            RayError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RayError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RayError {
    fn from(e: std::io::Error) -> Self {
        RayError::IoError(e)
    }
}

/// Convenience type alias for Results with RayError.
pub type Result<T> = std::result::Result<T, RayError>;
