//! Code for reading zones from a CSV file.
use super::{check_indices_contiguous, input_err_msg, read_csv};
use crate::zone::{Zone, ZoneID, ZoneIndex};
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;

pub(super) const ZONES_FILE_NAME: &str = "zones.csv";

/// A zone record retrieved from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct ZoneRaw {
    code: ZoneID,
    zonei: usize,
    east: f64,
    north: f64,
}

/// Build the zone index from raw records, which may be in any order
fn read_zones_from_iter<I>(iter: I) -> Result<ZoneIndex>
where
    I: Iterator<Item = ZoneRaw>,
{
    let mut zones: Vec<_> = iter.collect();
    check_indices_contiguous("zonei", zones.iter().map(|zone| zone.zonei))?;
    for zone in &zones {
        ensure!(
            zone.east.is_finite() && zone.north.is_finite(),
            "Zone {} has an invalid centroid",
            zone.code
        );
    }

    zones.sort_by_key(|zone| zone.zonei);
    ZoneIndex::new(zones.into_iter().map(|zone| Zone {
        code: zone.code,
        east: zone.east,
        north: zone.north,
    }))
}

/// Read zones from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The zones, indexed by their `zonei` column
pub fn read_zones(model_dir: &Path) -> Result<ZoneIndex> {
    let file_path = model_dir.join(ZONES_FILE_NAME);
    let zones_csv = read_csv(&file_path)?;
    read_zones_from_iter(zones_csv).with_context(|| input_err_msg(&file_path))
}
