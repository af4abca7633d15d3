//! The doubly-constrained (production- and attraction-constrained) model.
//!
//! Flows are balanced so that every destination receives exactly its observed total. Beta is then
//! calibrated so that the predicted total outflow matches the observed total outflow.
use super::{DEFAULT_BETA, FlowInputs, check_beta, decay_matrix};
use crate::error::ModelError;
use crate::matrix::{CowMatrix, Matrix, MatrixView, Vector};
use anyhow::{Context, Result, ensure};
use log::{debug, info, warn};
use ndarray::Zip;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::time::Instant;

/// How beta is adjusted between calibration iterations
#[derive(DeserializeLabeledStringEnum, Debug, PartialEq, Clone, Copy, Default)]
pub enum CalibrationMethod {
    /// Evaluate the initial beta, then bisect between the bounds on the sign of the error
    #[default]
    #[string = "bisection"]
    Bisection,
    /// Scale beta by the ratio of predicted to observed total outflow
    #[string = "proportional"]
    Proportional,
}

/// Settings for the calibration loop
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOptions {
    /// How beta is adjusted
    pub method: CalibrationMethod,
    /// The first value of beta tried
    pub initial_beta: f64,
    /// The largest acceptable relative error in total outflow
    pub tolerance: f64,
    /// The maximum number of model evaluations
    pub max_iterations: u32,
    /// Beta is never tried outside these bounds
    pub beta_bounds: (f64, f64),
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            method: CalibrationMethod::default(),
            initial_beta: DEFAULT_BETA,
            tolerance: 1e-3,
            max_iterations: 100,
            beta_bounds: (1e-6, 10.0),
        }
    }
}

impl CalibrationOptions {
    /// Check the options are usable
    pub fn validate(&self) -> Result<()> {
        let (lower, upper) = self.beta_bounds;
        check_beta(lower)?;
        check_beta(upper)?;
        ensure!(
            lower < upper,
            "The lower bound for beta must be less than the upper bound"
        );
        check_beta(self.initial_beta)?;
        ensure!(
            (lower..=upper).contains(&self.initial_beta),
            "The initial value of beta must lie within its bounds"
        );
        ensure!(
            self.tolerance.is_finite() && self.tolerance >= 0.0,
            "Calibration tolerance must be a finite number greater than or equal to zero"
        );
        ensure!(
            self.max_iterations > 0,
            "The maximum number of calibration iterations cannot be zero"
        );

        Ok(())
    }
}

/// Whether calibration reached its tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitStatus {
    /// The total outflow matches the observed total within tolerance
    Converged,
    /// The iteration budget ran out (or no root was bracketed); the best iterate is reported
    NotConverged,
}

/// The output of a doubly-constrained calibration
#[derive(Debug, Clone, PartialEq)]
pub struct DoublyConstrainedFit {
    /// Predicted flows (`Tij`), indexed as `[origin, destination]`
    pub flows: Matrix,
    /// The value of beta which produced `flows`
    pub beta: f64,
    /// The number of model evaluations performed
    pub iterations: u32,
    /// `(sum(OiPred) - sum(OiObs)) / sum(OiObs)` for `flows`
    pub relative_delta: f64,
    /// Whether the tolerance was reached
    pub status: FitStatus,
    /// Destination columns which no origin can reach. Their flows are all zero.
    pub degenerate: Vec<usize>,
}

impl DoublyConstrainedFit {
    /// Whether calibration reached its tolerance
    pub fn is_converged(&self) -> bool {
        self.status == FitStatus::Converged
    }

    /// Return the fit if it converged, or a [`ModelError::NonConvergence`] error if not
    pub fn into_converged(self) -> Result<Self> {
        if !self.is_converged() {
            Err(ModelError::NonConvergence {
                iterations: self.iterations,
                beta: self.beta,
                relative_delta: self.relative_delta,
            })?;
        }

        Ok(self)
    }
}

/// The model evaluated at a single value of beta
struct Iterate {
    beta: f64,
    flows: Matrix,
    relative_delta: f64,
    degenerate: Vec<usize>,
}

/// A doubly-constrained spatial-interaction model.
///
/// For origin `i` and destination `j`:
///
/// ```text
/// Tij = Dj * Oi * exp(-beta * cij) / sum_k(Ok * exp(-beta * ckj))
/// ```
///
/// so every column total equals `Dj` by construction, whatever the value of beta.
#[derive(Debug, Clone, PartialEq)]
pub struct DoublyConstrainedFlowModel<'a> {
    inputs: FlowInputs<'a>,
}

impl<'a> DoublyConstrainedFlowModel<'a> {
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

    /// Set the observed origin totals (`OiObs`), which must have length `m`
    pub fn set_origin_totals(&mut self, origin_totals: Vector) -> Result<()> {
        self.inputs.set_origins("Origin totals vector", origin_totals)
    }

    /// Set the observed destination totals (`DjObs`), which must have length `n`
    pub fn set_destination_totals(&mut self, destination_totals: Vector) -> Result<()> {
        self.inputs
            .set_destinations("Destination totals vector", destination_totals)
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

    /// Calibrate beta and return the balanced flows.
    ///
    /// The loop is bounded by `options.max_iterations` model evaluations. If the tolerance is not
    /// reached, the iterate with the smallest error is returned with
    /// [`FitStatus::NotConverged`]; use [`DoublyConstrainedFit::into_converged`] to treat that as
    /// an error.
    pub fn run(&self, options: &CalibrationOptions) -> Result<DoublyConstrainedFit> {
        options.validate()?;
        let balancing = Balancing {
            costs: self.inputs.costs()?,
            origin_totals: self.inputs.origins()?,
            destination_totals: self.inputs.destinations()?,
        };

        let start = Instant::now();
        let mut calibration = Calibration::new(balancing, options);
        let status = match options.method {
            CalibrationMethod::Bisection => calibration.bisect(),
            CalibrationMethod::Proportional => calibration.scale_proportionally(),
        };
        let fit = calibration.finish(status)?;

        if !fit.degenerate.is_empty() {
            warn!(
                "{} of {} destinations cannot be reached from any origin; \
                their flows are set to zero",
                fit.degenerate.len(),
                self.dim().1
            );
        }

        match fit.status {
            FitStatus::Converged => info!(
                "Calibration converged after {} iterations (beta = {}) in {:.2?}",
                fit.iterations,
                fit.beta,
                start.elapsed()
            ),
            FitStatus::NotConverged => warn!(
                "Calibration did not converge after {} iterations; best beta = {} \
                (relative delta = {})",
                fit.iterations, fit.beta, fit.relative_delta
            ),
        }

        Ok(fit)
    }
}

/// The inputs to a single balancing pass
struct Balancing<'a> {
    costs: MatrixView<'a>,
    origin_totals: &'a Vector,
    destination_totals: &'a Vector,
}

impl Balancing<'_> {
    /// Evaluate the model at a single value of beta
    fn evaluate(&self, beta: f64) -> Iterate {
        let costs = &self.costs;
        let origin_totals = self.origin_totals;
        let destination_totals = self.destination_totals;

        let decay = decay_matrix(costs, beta);
        let denominators = origin_totals.dot(&decay);

        let mut flows = Matrix::zeros(costs.raw_dim());
        Zip::from(flows.columns_mut())
            .and(decay.columns())
            .and(destination_totals)
            .and(&denominators)
            .par_for_each(|mut column, decay_column, &total, &denom| {
                if denom > 0.0 {
                    Zip::from(&mut column)
                        .and(origin_totals)
                        .and(decay_column)
                        .for_each(|flow, &origin, &decay| {
                            *flow = total * origin * decay / denom;
                        });
                }
            });

        let predicted = flows.sum();
        let observed = origin_totals.sum();
        let relative_delta = if observed > 0.0 {
            (predicted - observed) / observed
        } else if predicted == 0.0 {
            0.0
        } else {
            f64::INFINITY
        };

        let degenerate = denominators
            .iter()
            .enumerate()
            .filter(|(_, denom)| **denom <= 0.0)
            .map(|(j, _)| j)
            .collect();

        Iterate {
            beta,
            flows,
            relative_delta,
            degenerate,
        }
    }
}

/// State of the calibration loop
struct Calibration<'a> {
    balancing: Balancing<'a>,
    options: &'a CalibrationOptions,
    iterations: u32,
    best: Option<Iterate>,
}

impl<'a> Calibration<'a> {
    fn new(balancing: Balancing<'a>, options: &'a CalibrationOptions) -> Self {
        Self {
            balancing,
            options,
            iterations: 0,
            best: None,
        }
    }

    /// Whether the iteration budget has been used up
    fn exhausted(&self) -> bool {
        self.iterations >= self.options.max_iterations
    }

    fn within_tolerance(&self, relative_delta: f64) -> bool {
        relative_delta.abs() <= self.options.tolerance
    }

    /// Evaluate the model at `beta`, keeping the result if it is the best so far.
    ///
    /// Returns the relative error in total outflow.
    fn try_beta(&mut self, beta: f64) -> f64 {
        self.iterations += 1;
        let iterate = self.balancing.evaluate(beta);
        let relative_delta = iterate.relative_delta;
        debug!(
            "Calibration iteration {}: beta = {beta}, relative delta = {relative_delta}",
            self.iterations
        );

        let is_better = self
            .best
            .as_ref()
            .is_none_or(|best| relative_delta.abs() < best.relative_delta.abs());
        if is_better {
            self.best = Some(iterate);
        }

        relative_delta
    }

    /// Scale beta by `sum(OiPred) / sum(OiObs)` until the error is within tolerance
    fn scale_proportionally(&mut self) -> FitStatus {
        let (lower, upper) = self.options.beta_bounds;
        let mut beta = self.options.initial_beta;
        while !self.exhausted() {
            let relative_delta = self.try_beta(beta);
            if self.within_tolerance(relative_delta) {
                return FitStatus::Converged;
            }

            let next = (beta * (1.0 + relative_delta)).clamp(lower, upper);
            if next == beta {
                debug!("Beta is pinned at its bound ({beta}); stopping calibration");
                break;
            }
            beta = next;
        }

        FitStatus::NotConverged
    }

    /// Try the initial beta, then bisect between the bounds
    fn bisect(&mut self) -> FitStatus {
        let (mut lower, mut upper) = self.options.beta_bounds;
        let mut deltas = Vec::with_capacity(3);
        for beta in [self.options.initial_beta, lower, upper] {
            if self.exhausted() {
                return FitStatus::NotConverged;
            }
            let relative_delta = self.try_beta(beta);
            if self.within_tolerance(relative_delta) {
                return FitStatus::Converged;
            }
            deltas.push(relative_delta);
        }

        let lower_delta = deltas[1];
        if lower_delta.signum() == deltas[2].signum() {
            debug!("The error in total outflow has the same sign at both bounds of beta");
            return FitStatus::NotConverged;
        }

        while !self.exhausted() {
            let mid = 0.5 * (lower + upper);
            let relative_delta = self.try_beta(mid);
            if self.within_tolerance(relative_delta) {
                return FitStatus::Converged;
            }

            if relative_delta.signum() == lower_delta.signum() {
                lower = mid;
            } else {
                upper = mid;
            }
        }

        FitStatus::NotConverged
    }

    fn finish(self, status: FitStatus) -> Result<DoublyConstrainedFit> {
        let best = self
            .best
            .context("No calibration iterations were performed")?;

        Ok(DoublyConstrainedFit {
            flows: best.flows,
            beta: best.beta,
            iterations: self.iterations,
            relative_delta: best.relative_delta,
            status,
            degenerate: best.degenerate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use crate::matrix::column_totals;
    use float_cmp::assert_approx_eq;
    use ndarray::array;
    use rstest::rstest;

    fn model(
        origin_totals: Vector,
        destination_totals: Vector,
        costs: Matrix,
    ) -> DoublyConstrainedFlowModel<'static> {
        let (m, n) = costs.dim();
        let mut model = DoublyConstrainedFlowModel::new(m, n);
        model.set_origin_totals(origin_totals).unwrap();
        model.set_destination_totals(destination_totals).unwrap();
        model.set_costs(costs).unwrap();
        model
    }

    /// Origin and destination totals which balance (both sum to 60)
    fn balanced_model() -> DoublyConstrainedFlowModel<'static> {
        model(
            array![10.0, 20.0, 30.0],
            array![25.0, 35.0],
            array![[1.0, 8.0], [4.0, 2.0], [6.0, 3.0]],
        )
    }

    #[rstest]
    #[case(CalibrationMethod::Bisection)]
    #[case(CalibrationMethod::Proportional)]
    fn test_balanced_totals_converge_at_initial_beta(#[case] method: CalibrationMethod) {
        let options = CalibrationOptions {
            method,
            ..CalibrationOptions::default()
        };
        let fit = balanced_model().run(&options).unwrap();

        assert!(fit.is_converged());
        assert_eq!(fit.iterations, 1);
        assert_approx_eq!(f64, fit.beta, DEFAULT_BETA);
        assert!(fit.degenerate.is_empty());
    }

    #[test]
    fn test_column_totals_match_destination_totals() {
        let fit = balanced_model().run(&CalibrationOptions::default()).unwrap();
        let totals = column_totals(&fit.flows);
        assert_approx_eq!(f64, totals[0], 25.0, epsilon = 1e-9);
        assert_approx_eq!(f64, totals[1], 35.0, epsilon = 1e-9);
    }

    #[rstest]
    #[case(CalibrationMethod::Bisection)]
    #[case(CalibrationMethod::Proportional)]
    fn test_unbalanced_totals_do_not_converge(#[case] method: CalibrationMethod) {
        // Destination totals sum to 60 but origin totals to 90, whatever beta is
        let model = model(
            array![30.0, 30.0, 30.0],
            array![25.0, 35.0],
            array![[1.0, 8.0], [4.0, 2.0], [6.0, 3.0]],
        );
        let options = CalibrationOptions {
            method,
            max_iterations: 10,
            ..CalibrationOptions::default()
        };
        let fit = model.run(&options).unwrap();

        assert_eq!(fit.status, FitStatus::NotConverged);
        assert!(fit.iterations <= 10);
        assert_approx_eq!(f64, fit.relative_delta, -1.0 / 3.0, epsilon = 1e-9);

        // Destination totals still hold for the reported iterate
        let totals = column_totals(&fit.flows);
        assert_approx_eq!(f64, totals[0], 25.0, epsilon = 1e-9);
        assert_approx_eq!(f64, totals[1], 35.0, epsilon = 1e-9);

        let err = fit.into_converged().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::NonConvergence { .. })
        ));
    }

    /// One origin and three equal destinations, the last so far away that its decay underflows to
    /// zero once beta exceeds about 0.75
    fn underflow_model() -> DoublyConstrainedFlowModel<'static> {
        model(
            array![20.0],
            array![10.0, 10.0, 10.0],
            array![[1.0, 2.0, 1000.0]],
        )
    }

    #[test]
    fn test_proportional_calibration() {
        let options = CalibrationOptions {
            method: CalibrationMethod::Proportional,
            ..CalibrationOptions::default()
        };
        let fit = underflow_model().run(&options).unwrap();

        // Each step scales beta by 30 / 20 until the far destination drops out at the sixth
        assert!(fit.is_converged());
        assert_eq!(fit.iterations, 6);
        assert_approx_eq!(f64, fit.beta, 0.13 * 1.5_f64.powi(5), epsilon = 1e-9);
        assert_approx_eq!(f64, fit.relative_delta, 0.0, epsilon = 1e-12);
        assert_eq!(fit.degenerate, vec![2]);
        assert_eq!(fit.flows.column(2), array![0.0]);
    }

    #[test]
    fn test_bisection_converges_at_bound() {
        let fit = underflow_model()
            .run(&CalibrationOptions::default())
            .unwrap();

        // Initial beta and the lower bound overshoot; the upper bound is exact
        assert!(fit.is_converged());
        assert_eq!(fit.iterations, 3);
        assert_approx_eq!(f64, fit.beta, 10.0);
        assert_eq!(fit.degenerate, vec![2]);
    }

    #[test]
    fn test_iteration_cap() {
        let options = CalibrationOptions {
            method: CalibrationMethod::Proportional,
            max_iterations: 2,
            ..CalibrationOptions::default()
        };
        let fit = underflow_model().run(&options).unwrap();
        assert_eq!(fit.status, FitStatus::NotConverged);
        assert_eq!(fit.iterations, 2);
    }

    #[rstest]
    #[case((0.0, 1.0), 0.5, 1e-3, 10)]
    #[case((1.0, 0.5), 0.7, 1e-3, 10)]
    #[case((0.1, 1.0), 2.0, 1e-3, 10)]
    #[case((0.1, 1.0), 0.5, -1.0, 10)]
    #[case((0.1, 1.0), 0.5, 1e-3, 0)]
    fn test_invalid_options(
        #[case] beta_bounds: (f64, f64),
        #[case] initial_beta: f64,
        #[case] tolerance: f64,
        #[case] max_iterations: u32,
    ) {
        let options = CalibrationOptions {
            method: CalibrationMethod::Bisection,
            initial_beta,
            tolerance,
            max_iterations,
            beta_bounds,
        };
        assert!(balanced_model().run(&options).is_err());
    }

    #[test]
    fn test_setters_reject_wrong_dimensions() {
        let mut model = DoublyConstrainedFlowModel::new(2, 3);
        assert_error!(
            model.set_origin_totals(array![1.0]),
            "Origin totals vector has dimensions 1 but the model requires 2"
        );
        assert_error!(
            model.set_destination_totals(array![1.0, 2.0]),
            "Destination totals vector has dimensions 2 but the model requires 3"
        );
    }

    #[test]
    fn test_run_without_destination_totals() {
        let mut model = DoublyConstrainedFlowModel::new(1, 1);
        model.set_costs(array![[1.0]]).unwrap();
        model.set_origin_totals(array![5.0]).unwrap();
        assert_error!(
            model.run(&CalibrationOptions::default()),
            "Destination vector has not been set"
        );
    }
}
