//! Spatial-interaction flow models.
//!
//! Both models distribute trips between origin zones and destinations in proportion to how
//! attractive each destination is, discounted by `exp(-beta * cost)`. The singly-constrained model
//! matches origin totals exactly; the doubly-constrained model matches destination totals exactly
//! and calibrates beta against origin totals.
use crate::cost::check_costs;
use crate::matrix::{
    CowMatrix, Matrix, MatrixView, Vector, check_length, check_non_negative, check_shape,
};
use anyhow::{Context, Result, ensure};
use ndarray::{ArrayBase, Data, Ix2, Zip};

pub mod doubly;
pub use doubly::{
    CalibrationMethod, CalibrationOptions, DoublyConstrainedFit, DoublyConstrainedFlowModel,
    FitStatus,
};
pub mod singly;
pub use singly::{GravityFlowModel, SinglyConstrainedRun};

/// Default value of the decay parameter, from a previous calibration against observed trips
pub const DEFAULT_BETA: f64 = 0.13;

/// Check that a value of the decay parameter is usable
pub fn check_beta(beta: f64) -> Result<()> {
    ensure!(
        beta.is_finite() && beta > 0.0,
        "Beta must be a finite number greater than zero (got {beta})"
    );

    Ok(())
}

/// Compute `exp(-beta * costs)` for every cell.
///
/// This is by far the most expensive step of a model run, so it is done once per run and the
/// result shared by every pass over the matrix.
pub fn decay_matrix<S>(costs: &ArrayBase<S, Ix2>, beta: f64) -> Matrix
where
    S: Data<Elem = f64>,
{
    let mut decay = Matrix::zeros(costs.raw_dim());
    Zip::from(&mut decay)
        .and(costs)
        .par_for_each(|decay, &cost| *decay = (-beta * cost).exp());

    decay
}

/// The flow-weighted mean trip cost (often written `cbar`).
///
/// Cells with no flow are ignored, so unreachable (infinite cost) pairs do not poison the result.
///
/// # Returns
///
/// The mean cost, or `None` if the total flow is zero and the mean is undefined.
pub fn mean_cost<S>(flows: &Matrix, costs: &ArrayBase<S, Ix2>) -> Result<Option<f64>>
where
    S: Data<Elem = f64>,
{
    check_shape("Cost matrix", costs, flows.dim())?;

    let (weighted, total) =
        Zip::from(flows)
            .and(costs)
            .fold((0.0, 0.0), |(weighted, total), &flow, &cost| {
                if flow > 0.0 {
                    (weighted + flow * cost, total + flow)
                } else {
                    (weighted, total)
                }
            });

    Ok((total > 0.0).then(|| weighted / total))
}

/// The inputs shared by both flow models, validated against the model's dimensions as they are set.
///
/// The cost matrix may be borrowed, as it is usually the largest structure in a model and callers
/// often need to keep it after the run.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowInputs<'a> {
    m: usize,
    n: usize,
    origins: Option<Vector>,
    destinations: Option<Vector>,
    costs: Option<CowMatrix<'a>>,
}

impl<'a> FlowInputs<'a> {
    /// Create empty inputs for `m` origin zones and `n` destinations
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            m,
            n,
            origins: None,
            destinations: None,
            costs: None,
        }
    }

    /// The dimensions `(m, n)` the inputs were declared with
    pub fn dim(&self) -> (usize, usize) {
        (self.m, self.n)
    }

    /// The per-origin vector (length `m`), which must have been set
    pub fn origins(&self) -> Result<&Vector> {
        self.origins
            .as_ref()
            .context("Origin vector has not been set")
    }

    /// The per-destination vector (length `n`), which must have been set
    pub fn destinations(&self) -> Result<&Vector> {
        self.destinations
            .as_ref()
            .context("Destination vector has not been set")
    }

    /// The cost matrix, which must have been set
    pub fn costs(&self) -> Result<MatrixView<'_>> {
        self.costs
            .as_ref()
            .map(ArrayBase::view)
            .context("Cost matrix has not been set")
    }

    /// Set the per-origin vector
    pub fn set_origins(&mut self, what: &str, origins: Vector) -> Result<()> {
        check_length(what, &origins, self.m)?;
        check_non_negative(what, &origins)?;
        self.origins = Some(origins);

        Ok(())
    }

    /// Set the per-destination vector
    pub fn set_destinations(&mut self, what: &str, destinations: Vector) -> Result<()> {
        check_length(what, &destinations, self.n)?;
        check_non_negative(what, &destinations)?;
        self.destinations = Some(destinations);

        Ok(())
    }

    /// Set the cost matrix, either owned or borrowed
    pub fn set_costs<C>(&mut self, costs: C) -> Result<()>
    where
        C: Into<CowMatrix<'a>>,
    {
        let costs = costs.into();
        check_shape("Cost matrix", &costs, (self.m, self.n))?;
        check_costs("Cost matrix", &costs)?;
        self.costs = Some(costs);

        Ok(())
    }
}
