//! The error types raised by the flow model engine.
//!
//! Functions in this crate return [`anyhow::Result`]. Where a failure belongs to one of the
//! categories below it is raised as a [`ModelError`], so callers can tell the categories apart with
//! `err.downcast_ref::<ModelError>()`.
use derive_more::{Display, Error};

/// A failure of the flow model engine
#[derive(Debug, Display, Error, PartialEq)]
pub enum ModelError {
    /// A vector or matrix does not match the dimensions the model was declared with
    #[display("{what} has dimensions {actual} but the model requires {expected}")]
    DimensionMismatch {
        /// The input which was rejected
        what: String,
        /// The dimensions the model requires
        expected: String,
        /// The dimensions of the supplied input
        actual: String,
    },
    /// An origin code has no row in the zone lookup
    #[display("Unknown origin code {code}")]
    UnresolvedCode {
        /// The code which could not be resolved
        code: String,
    },
    /// Every origin row of a flow matrix is degenerate
    #[display(
        "All {rows} origin rows are degenerate (zero attractiveness or no reachable destinations)"
    )]
    DegenerateRow {
        /// The number of rows in the matrix
        rows: usize,
    },
    /// The calibration loop for the doubly-constrained model ran out of iterations
    #[display(
        "Calibration did not converge after {iterations} iterations \
        (beta = {beta}, relative delta = {relative_delta})"
    )]
    NonConvergence {
        /// The number of iterations performed
        iterations: u32,
        /// The last value of beta tried
        beta: f64,
        /// The relative total-flow error for that value of beta
        relative_delta: f64,
    },
    /// No nearest zone centroid could be found for a destination point
    #[display("No zone centroid could be found for destination {destination}")]
    GeometryResolutionFailure {
        /// The destination which could not be placed
        destination: String,
    },
}

impl ModelError {
    /// A [`ModelError::DimensionMismatch`] for a vector of the wrong length
    pub fn length_mismatch(what: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// A [`ModelError::DimensionMismatch`] for a matrix of the wrong shape
    pub fn shape_mismatch(what: &str, expected: (usize, usize), actual: (usize, usize)) -> Self {
        Self::DimensionMismatch {
            what: what.to_string(),
            expected: format!("{}x{}", expected.0, expected.1),
            actual: format!("{}x{}", actual.0, actual.1),
        }
    }
}
