//! The singly-constrained (production-constrained) gravity model.
use super::{FlowInputs, check_beta, decay_matrix};
use crate::matrix::{CowMatrix, Matrix, MatrixView, Vector};
use anyhow::Result;
use log::{info, warn};
use ndarray::Zip;
use std::time::Instant;

/// The output of a singly-constrained model run
#[derive(Debug, Clone, PartialEq)]
pub struct SinglyConstrainedRun {
    /// Predicted flows (`Sij`), indexed as `[origin, destination]`
    pub flows: Matrix,
    /// The decay parameter used
    pub beta: f64,
    /// Origin rows with no attractive, reachable destination. Their flows are all zero.
    pub degenerate: Vec<usize>,
}

/// A gravity model in which each origin's total outflow equals its mass.
///
/// For origin `i` and destination `j`:
///
/// ```text
/// Sij = Ei * Aj * exp(-beta * cij) / sum_k(Ak * exp(-beta * cik))
/// ```
///
/// Column totals are not constrained.
#[derive(Debug, Clone, PartialEq)]
pub struct GravityFlowModel<'a> {
    inputs: FlowInputs<'a>,
}

impl<'a> GravityFlowModel<'a> {
    /// Create a model for `m` origin zones and `n` destinations
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            inputs: FlowInputs::new(m, n),
        }
    }

    /// The dimensions `(m, n)` of the model
    pub fn dim(&self) -> (usize, usize) {
        self.inputs.dim()
    }

    /// Set the origin mass vector (`Ei`), which must have length `m`
    pub fn set_origin_mass(&mut self, origin_mass: Vector) -> Result<()> {
        self.inputs.set_origins("Origin mass vector", origin_mass)
    }

    /// Set the destination attractiveness vector (`Aj`), which must have length `n`
    pub fn set_attractiveness(&mut self, attractiveness: Vector) -> Result<()> {
        self.inputs
            .set_destinations("Attractiveness vector", attractiveness)
    }

    /// Set the cost matrix (`cij`), which must be `m` x `n`. It may be borrowed.
    pub fn set_costs<C>(&mut self, costs: C) -> Result<()>
    where
        C: Into<CowMatrix<'a>>,
    {
        self.inputs.set_costs(costs)
    }

    /// The cost matrix the model was given
    pub fn costs(&self) -> Result<MatrixView<'_>> {
        self.inputs.costs()
    }

    /// Run the model with the decay parameter `beta`.
    ///
    /// Origins whose denominator is zero (every destination unattractive or unreachable) get a row
    /// of zeros and are listed in [`SinglyConstrainedRun::degenerate`].
    pub fn run(&self, beta: f64) -> Result<SinglyConstrainedRun> {
        check_beta(beta)?;
        let costs = self.inputs.costs()?;
        let origin_mass = self.inputs.origins()?;
        let attractiveness = self.inputs.destinations()?;

        let start = Instant::now();
        let decay = decay_matrix(&costs, beta);
        let denominators = decay.dot(attractiveness);

        let mut flows = Matrix::zeros(costs.raw_dim());
        Zip::from(flows.rows_mut())
            .and(decay.rows())
            .and(origin_mass)
            .and(&denominators)
            .par_for_each(|mut row, decay_row, &mass, &denom| {
                if denom > 0.0 {
                    Zip::from(&mut row)
                        .and(attractiveness)
                        .and(decay_row)
                        .for_each(|flow, &attr, &decay| *flow = mass * attr * decay / denom);
                }
            });

        let degenerate: Vec<_> = denominators
            .iter()
            .enumerate()
            .filter(|(_, denom)| **denom <= 0.0)
            .map(|(i, _)| i)
            .collect();
        if !degenerate.is_empty() {
            warn!(
                "{} of {} origin zones have no attractive, reachable destination; \
                their flows are set to zero",
                degenerate.len(),
                denominators.len()
            );
        }

        let (m, n) = self.dim();
        info!(
            "Singly-constrained model run for {m}x{n} (beta = {beta}) took {:.2?}",
            start.elapsed()
        );

        Ok(SinglyConstrainedRun {
            flows,
            beta,
            degenerate,
        })
    }
}
