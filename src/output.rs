//! The module responsible for writing output data to disk.
//!
//! The output of a build is an artifact directory, `<output_dir>/<category>/`, holding everything
//! the query layer needs. An artifact is written to a staging directory alongside it and then
//! moved into place, so a reader never sees a partly written artifact. Replacing an existing
//! artifact takes two renames, and a reader that looks between them finds no artifact at all.
use crate::build::ModelRun;
use crate::destination::DestinationID;
use crate::input::{input_err_msg, read_toml};
use crate::matrix::{Vector, column_totals, row_totals, save_matrix};
use crate::model::{Category, Model, Variant};
use crate::zone::ZoneID;
use anyhow::{Context, Result, ensure};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "gravflow_results";

/// The output file name for zones
const ZONES_FILE_NAME: &str = "zones.csv";

/// The output file name for destinations
const DESTINATIONS_FILE_NAME: &str = "destinations.csv";

/// The output file name for the flow matrix
const FLOWS_FILE_NAME: &str = "flows.bin";

/// The output file name for the probability matrix
pub const PROBABILITIES_FILE_NAME: &str = "probabilities.bin";

/// The output file name for the run summary
const SUMMARY_FILE_NAME: &str = "summary.toml";

/// The output file name for predicted and input origin totals
const ORIGIN_TOTALS_FILE_NAME: &str = "debug_origin_totals.csv";

/// The output file name for predicted and input destination totals
const DESTINATION_TOTALS_FILE_NAME: &str = "debug_destination_totals.csv";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create the output directory (with parents) if it doesn't already exist
pub fn create_output_directory(output_dir: &Path) -> Result<()> {
    if output_dir.is_dir() {
        // already exists
        return Ok(());
    }

    fs::create_dir_all(output_dir)?;

    Ok(())
}

/// The path to the artifact for `category` under `output_dir`
pub fn get_artifact_dir(output_dir: &Path, category: Category) -> PathBuf {
    output_dir.join(category.to_string())
}

/// Check whether an artifact may be written to `artifact_dir`.
///
/// # Returns
///
/// Whether an existing artifact will be replaced, or an error if one exists and `allow_overwrite`
/// is false.
pub fn check_artifact_dir(artifact_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    if !artifact_dir.exists() {
        return Ok(false);
    }

    ensure!(
        allow_overwrite,
        "A model has already been built in {}. Please delete the folder or pass the --overwrite \
        command-line option.",
        artifact_dir.display()
    );

    Ok(true)
}

/// Represents a row in the zones CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ZoneRow {
    code: ZoneID,
    zonei: usize,
    east: f64,
    north: f64,
}

/// Represents a row in the destinations CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DestinationRow {
    id: DestinationID,
    zonej: usize,
    east: f64,
    north: f64,
    attractiveness: f64,
}

/// Represents a row in the debug origin totals CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct OriginTotalsRow {
    zonei: usize,
    code: ZoneID,
    input: f64,
    predicted: f64,
}

/// Represents a row in the debug destination totals CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DestinationTotalsRow {
    zonej: usize,
    id: DestinationID,
    input: f64,
    predicted: f64,
}

/// The contents of the summary file written with each artifact
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ArtifactSummary {
    /// The kind of destination modelled
    pub category: Category,
    /// The flow model which was run
    pub variant: Variant,
    /// The value of beta used
    pub beta: f64,
    /// The number of model evaluations performed
    pub iterations: u32,
    /// Whether calibration converged
    pub converged: bool,
    /// Flow-weighted mean trip cost, if defined
    pub mean_cost: Option<f64>,
    /// The number of zones
    pub m: usize,
    /// The number of destinations
    pub n: usize,
}

impl ArtifactSummary {
    fn new(model: &Model, model_run: &ModelRun) -> Self {
        let (m, n) = model.dim();
        Self {
            category: model.parameters.category,
            variant: model.parameters.variant,
            beta: model_run.beta,
            iterations: model_run.iterations,
            converged: model_run.converged,
            mean_cost: model_run.mean_cost,
            m,
            n,
        }
    }

    /// Read the summary from an artifact directory
    pub fn from_artifact(artifact_dir: &Path) -> Result<Self> {
        read_toml(&artifact_dir.join(SUMMARY_FILE_NAME))
    }
}

/// Write the zones and destinations lookup tables
fn write_lookup_tables(artifact_dir: &Path, model: &Model) -> Result<()> {
    let mut writer = csv::Writer::from_path(artifact_dir.join(ZONES_FILE_NAME))?;
    for (zonei, zone) in model.zones.iter().enumerate() {
        writer.serialize(ZoneRow {
            code: zone.code.clone(),
            zonei,
            east: zone.east,
            north: zone.north,
        })?;
    }
    writer.flush()?;

    let mut writer = csv::Writer::from_path(artifact_dir.join(DESTINATIONS_FILE_NAME))?;
    for (zonej, dest) in model.destinations.iter().enumerate() {
        writer.serialize(DestinationRow {
            id: dest.id.clone(),
            zonej,
            east: dest.east,
            north: dest.north,
            attractiveness: dest.attractiveness,
        })?;
    }
    writer.flush()?;

    Ok(())
}

/// Write input and predicted row and column totals of the flow matrix
fn write_debug_totals(artifact_dir: &Path, model: &Model, model_run: &ModelRun) -> Result<()> {
    let mut writer = csv::Writer::from_path(artifact_dir.join(ORIGIN_TOTALS_FILE_NAME))?;
    let predicted = row_totals(&model_run.flows);
    for (zonei, zone) in model.zones.iter().enumerate() {
        writer.serialize(OriginTotalsRow {
            zonei,
            code: zone.code.clone(),
            input: model.origins[zonei],
            predicted: predicted[zonei],
        })?;
    }
    writer.flush()?;

    let mut writer = csv::Writer::from_path(artifact_dir.join(DESTINATION_TOTALS_FILE_NAME))?;
    let input: Vector = model.destinations.attractiveness();
    let predicted = column_totals(&model_run.flows);
    for (zonej, dest) in model.destinations.iter().enumerate() {
        writer.serialize(DestinationTotalsRow {
            zonej,
            id: dest.id.clone(),
            input: input[zonej],
            predicted: predicted[zonej],
        })?;
    }
    writer.flush()?;

    Ok(())
}

/// Write every file of an artifact into `artifact_dir`
fn write_artifact_files(
    artifact_dir: &Path,
    model: &Model,
    model_run: &ModelRun,
    debug_model: bool,
) -> Result<()> {
    write_lookup_tables(artifact_dir, model)?;
    save_matrix(&artifact_dir.join(FLOWS_FILE_NAME), &model_run.flows)?;
    save_matrix(
        &artifact_dir.join(PROBABILITIES_FILE_NAME),
        &model_run.probabilities,
    )?;

    let summary = toml::to_string(&ArtifactSummary::new(model, model_run))?;
    fs::write(artifact_dir.join(SUMMARY_FILE_NAME), summary)?;

    if debug_model {
        write_debug_totals(artifact_dir, model, model_run)?;
    }

    Ok(())
}

/// Move a fully written staging directory to `target`, replacing any existing directory there.
///
/// An existing `target` is first renamed aside, so `target` is briefly missing. A reader that opens
/// it in that window fails to load and should retry. If the second rename fails, the previous
/// directory is put back.
fn swap_into_place(staging: &Path, target: &Path) -> Result<()> {
    if !target.exists() {
        fs::rename(staging, target)?;
        return Ok(());
    }

    let old = staging.with_extension("old");
    fs::rename(target, &old)?;
    if let Err(err) = fs::rename(staging, target) {
        // Put the previous artifact back
        fs::rename(&old, target)?;
        return Err(err.into());
    }
    fs::remove_dir_all(&old)?;

    Ok(())
}

/// Write the results of a model run to `<output_dir>/<category>/`.
///
/// # Arguments
///
/// * `output_dir` - Folder in which the artifact will be created
/// * `model` - The model which was run
/// * `model_run` - The results
/// * `debug_model` - Whether to include extra CSV files for debugging the model
///
/// # Returns
///
/// The path to the artifact.
pub fn publish_artifact(
    output_dir: &Path,
    model: &Model,
    model_run: &ModelRun,
    debug_model: bool,
) -> Result<PathBuf> {
    let artifact_dir = get_artifact_dir(output_dir, model.parameters.category);
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(output_dir)
        .with_context(|| {
            format!(
                "Could not create staging folder in {}",
                output_dir.display()
            )
        })?;
    debug!("Writing artifact to {}", staging.path().display());

    write_artifact_files(staging.path(), model, model_run, debug_model)?;

    let staging = staging.keep();
    swap_into_place(&staging, &artifact_dir)
        .with_context(|| format!("Could not publish {}", artifact_dir.display()))?;

    Ok(artifact_dir)
}

/// Read the summary for an artifact, adding the file path to any error
pub fn read_summary(artifact_dir: &Path) -> Result<ArtifactSummary> {
    ArtifactSummary::from_artifact(artifact_dir)
        .with_context(|| input_err_msg(artifact_dir.join(SUMMARY_FILE_NAME)))
}
