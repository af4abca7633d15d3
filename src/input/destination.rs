//! Code for reading destinations from a CSV file.
use super::{check_indices_contiguous, input_err_msg, read_csv};
use crate::destination::{DestinationID, DestinationIndex, PointLocation};
use crate::matrix::check_non_negative;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub(super) const DESTINATIONS_FILE_NAME: &str = "destinations.csv";

/// A destination record retrieved from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct DestinationRaw {
    id: DestinationID,
    zonej: usize,
    east: f64,
    north: f64,
    attractiveness: f64,
}

fn read_destinations_from_iter<I>(iter: I) -> Result<DestinationIndex>
where
    I: Iterator<Item = DestinationRaw>,
{
    let mut destinations: Vec<_> = iter.collect();
    check_indices_contiguous("zonej", destinations.iter().map(|dest| dest.zonej))?;
    check_non_negative(
        "attractiveness",
        destinations.iter().map(|dest| &dest.attractiveness),
    )?;

    destinations.sort_by_key(|dest| dest.zonej);
    Ok(DestinationIndex::new(
        destinations
            .into_iter()
            .map(|dest| PointLocation {
                id: dest.id,
                east: dest.east,
                north: dest.north,
                attractiveness: dest.attractiveness,
            })
            .collect(),
    ))
}

/// Read destinations from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The destinations, indexed by their `zonej` column
pub fn read_destinations(model_dir: &Path) -> Result<DestinationIndex> {
    let file_path = model_dir.join(DESTINATIONS_FILE_NAME);
    let destinations_csv = read_csv(&file_path)?;
    read_destinations_from_iter(destinations_csv).with_context(|| input_err_msg(&file_path))
}
