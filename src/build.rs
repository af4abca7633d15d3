//! Building a model: running the flow model and publishing its probabilities for querying.
use crate::error::ModelError;
use crate::flow::{DoublyConstrainedFlowModel, GravityFlowModel, mean_cost};
use crate::matrix::{Matrix, row_totals};
use crate::model::{Model, Variant};
use crate::output::publish_artifact;
use crate::probability::normalise_rows;
use anyhow::Result;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// The results of running a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRun {
    /// Predicted flows, indexed as `[origin, destination]`
    pub flows: Matrix,
    /// Row-normalised flows
    pub probabilities: Matrix,
    /// The value of beta used (calibrated, for the doubly-constrained model)
    pub beta: f64,
    /// The number of model evaluations performed
    pub iterations: u32,
    /// Whether calibration converged (always true for the singly-constrained model)
    pub converged: bool,
    /// Flow-weighted mean trip cost, if there is any flow
    pub mean_cost: Option<f64>,
    /// Origin zones with no outgoing flow
    pub degenerate_origins: Vec<usize>,
}

/// Run the configured flow model and normalise its output.
///
/// The flow models treat degenerate rows as valid and zero-fill them. A build is stricter: if
/// *every* origin row is degenerate the artifact could only ever answer queries with nothing, so
/// this fails with [`ModelError::DegenerateRow`]. Individual degenerate rows are listed in
/// [`ModelRun::degenerate_origins`].
///
/// Also fails with [`ModelError::NonConvergence`] if calibration fails and `accept_unconverged`
/// is not set.
pub fn run_model(model: &Model) -> Result<ModelRun> {
    let (m, n) = model.dim();
    let parameters = &model.parameters;
    info!(
        "Running {:?} model for {} with {m} zones and {n} destinations",
        parameters.variant, parameters.category
    );

    let (flows, beta, iterations, converged) = match parameters.variant {
        Variant::Singly => {
            let mut flow_model = GravityFlowModel::new(m, n);
            flow_model.set_origin_mass(model.origins.clone())?;
            flow_model.set_attractiveness(model.destinations.attractiveness())?;
            flow_model.set_costs(model.costs.view())?;
            let run = flow_model.run(parameters.beta)?;

            (run.flows, run.beta, 1, true)
        }
        Variant::Doubly => {
            let mut flow_model = DoublyConstrainedFlowModel::new(m, n);
            flow_model.set_origin_totals(model.origins.clone())?;
            flow_model.set_destination_totals(model.destinations.attractiveness())?;
            flow_model.set_costs(model.costs.view())?;
            let mut fit = flow_model.run(&parameters.calibration_options())?;
            if parameters.accept_unconverged {
                if !fit.is_converged() {
                    warn!("Using unconverged fit as accept_unconverged is set");
                }
            } else {
                fit = fit.into_converged()?;
            }

            let converged = fit.is_converged();
            (fit.flows, fit.beta, fit.iterations, converged)
        }
    };

    let degenerate_origins: Vec<_> = row_totals(&flows)
        .iter()
        .enumerate()
        .filter(|(_, total)| **total <= 0.0)
        .map(|(i, _)| i)
        .collect();
    if m > 0 && degenerate_origins.len() == m {
        Err(ModelError::DegenerateRow { rows: m })?;
    }

    let mean_cost = mean_cost(&flows, &model.costs)?;
    match mean_cost {
        Some(cbar) => info!("Mean trip cost: {cbar:.3} minutes (beta = {beta})"),
        None => warn!("Mean trip cost is undefined as there is no flow"),
    }

    Ok(ModelRun {
        probabilities: normalise_rows(&flows),
        flows,
        beta,
        iterations,
        converged,
        mean_cost,
        degenerate_origins,
    })
}

/// Run a model and publish the results under `output_path`.
///
/// # Arguments
///
/// * `model` - The model to run
/// * `output_path` - The folder to which the artifact will be written
/// * `debug_model` - Whether to write additional information (e.g. row totals) to CSV files
///
/// # Returns
///
/// The path to the published artifact.
pub fn run(model: &Model, output_path: &Path, debug_model: bool) -> Result<PathBuf> {
    let model_run = run_model(model)?;
    let artifact_dir = publish_artifact(output_path, model, &model_run, debug_model)?;
    info!("Published model to {}", artifact_dir.display());

    Ok(artifact_dir)
}
