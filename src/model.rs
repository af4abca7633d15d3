//! The model: everything read from a model directory that a build needs.
use crate::destination::DestinationIndex;
use crate::matrix::{Matrix, Vector};
use crate::zone::ZoneIndex;

pub mod parameters;
pub use parameters::{Category, ModelParameters, Variant};

/// A loaded and validated model
#[derive(Debug, PartialEq)]
pub struct Model {
    /// Parameters from `model.toml`
    pub parameters: ModelParameters,
    /// The origin zones (rows)
    pub zones: ZoneIndex,
    /// The destinations (columns)
    pub destinations: DestinationIndex,
    /// Per-zone origin values: trip-generating mass for the singly-constrained model, observed
    /// outflow for the doubly-constrained model
    pub origins: Vector,
    /// Zone-to-destination travel costs (M x N)
    pub costs: Matrix,
}

impl Model {
    /// The dimensions `(m, n)` of the model
    pub fn dim(&self) -> (usize, usize) {
        (self.zones.len(), self.destinations.len())
    }
}
