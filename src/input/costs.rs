//! Reading, deriving and caching the zone-to-destination cost matrix.
//!
//! Deriving the matrix for a large model is slow, so `build` caches it next to the inputs. A small
//! TOML file records what the cache was derived from, and the cache is only reused while that
//! record still matches the model.
use super::destination::DESTINATIONS_FILE_NAME;
use super::zone::ZONES_FILE_NAME;
use super::{input_err_msg, read_toml};
use crate::cost::{CostDirection, CostMatrixAugmenter, check_costs};
use crate::destination::DestinationIndex;
use crate::matrix::{Matrix, load_matrix, save_matrix, write_atomically};
use crate::model::ModelParameters;
use crate::zone::ZoneIndex;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// The file name for the zone-to-zone cost matrix
pub(super) const ZONE_COSTS_FILE_NAME: &str = "zone_costs.bin";

/// The file name for the zone-to-destination cost matrix
const DESTINATION_COSTS_FILE_NAME: &str = "destination_costs.bin";

/// The file name for the record of what a cached cost matrix was derived from
const DESTINATION_COSTS_SOURCE_FILE_NAME: &str = "destination_costs.toml";

/// The inputs a derived cost matrix depends on
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct CostSource {
    speed: f64,
    cost_direction: CostDirection,
    /// SHA-256 digests of the input files
    zones_sha256: String,
    destinations_sha256: String,
    zone_costs_sha256: String,
}

impl CostSource {
    /// Describe the inputs in `model_dir` as they are now
    fn new(model_dir: &Path, parameters: &ModelParameters) -> Result<Self> {
        Ok(Self {
            speed: parameters.speed,
            cost_direction: parameters.cost_direction,
            zones_sha256: file_digest(&model_dir.join(ZONES_FILE_NAME))?,
            destinations_sha256: file_digest(&model_dir.join(DESTINATIONS_FILE_NAME))?,
            zone_costs_sha256: file_digest(&model_dir.join(ZONE_COSTS_FILE_NAME))?,
        })
    }
}

/// Hex-encoded SHA-256 digest of a file's contents
fn file_digest(file_path: &Path) -> Result<String> {
    let mut file = File::open(file_path).with_context(|| input_err_msg(file_path))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| input_err_msg(file_path))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// The path to the cached zone-to-destination cost matrix for a model
pub fn destination_costs_path(model_dir: &Path) -> PathBuf {
    model_dir.join(DESTINATION_COSTS_FILE_NAME)
}

fn destination_costs_source_path(model_dir: &Path) -> PathBuf {
    model_dir.join(DESTINATION_COSTS_SOURCE_FILE_NAME)
}

/// Whether the cached cost matrix can be used for the model as it is now.
///
/// A cache with no source record was supplied by the user and is always used.
fn is_cache_current(model_dir: &Path, parameters: &ModelParameters) -> Result<bool> {
    let source_path = destination_costs_source_path(model_dir);
    if !source_path.is_file() {
        return Ok(true);
    }

    let cached: CostSource = read_toml(&source_path)?;
    if cached == CostSource::new(model_dir, parameters)? {
        return Ok(true);
    }

    info!(
        "Model inputs have changed since {} was derived; recomputing",
        destination_costs_path(model_dir).display()
    );
    Ok(false)
}

/// Read the zone-to-destination cost matrix for a model.
///
/// A cached or pre-computed matrix is used if it is still current. Otherwise the matrix is derived
/// from the zone-to-zone cost matrix.
///
/// # Returns
///
/// The cost matrix and whether it was derived (and so is worth caching).
pub(super) fn read_costs(
    model_dir: &Path,
    parameters: &ModelParameters,
    zones: &ZoneIndex,
    destinations: &DestinationIndex,
) -> Result<(Matrix, bool)> {
    let file_path = destination_costs_path(model_dir);
    if file_path.is_file() && is_cache_current(model_dir, parameters)? {
        info!(
            "Using pre-computed destination costs from {}",
            file_path.display()
        );
        let costs = load_matrix(&file_path, (zones.len(), destinations.len()))
            .and_then(|costs| {
                check_costs("Destination cost matrix", &costs)?;
                Ok(costs)
            })
            .with_context(|| input_err_msg(&file_path))?;

        return Ok((costs, false));
    }

    let file_path = model_dir.join(ZONE_COSTS_FILE_NAME);
    let base_costs = load_matrix(&file_path, (zones.len(), zones.len()))
        .with_context(|| input_err_msg(&file_path))?;
    let augmenter = CostMatrixAugmenter::new(zones, parameters.speed, parameters.cost_direction)?;
    let costs = augmenter
        .augment(&base_costs, destinations)
        .with_context(|| input_err_msg(&file_path))?;

    Ok((costs, true))
}

/// Cache a derived cost matrix in the model directory, along with a record of its source
pub fn save_destination_costs(
    model_dir: &Path,
    parameters: &ModelParameters,
    costs: &Matrix,
) -> Result<()> {
    let source = CostSource::new(model_dir, parameters)?;
    save_matrix(&destination_costs_path(model_dir), costs)?;

    let contents = toml::to_string(&source)?;
    write_atomically(&destination_costs_source_path(model_dir), |writer| {
        writer.write_all(contents.as_bytes())?;
        Ok(())
    })
}
