//! Code for reading per-zone origin values from a CSV file.
use super::{check_indices_contiguous, input_err_msg, read_csv};
use crate::matrix::{Vector, check_non_negative};
use crate::zone::ZoneIndex;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;

const ORIGINS_FILE_NAME: &str = "origins.csv";

/// An origin record retrieved from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct OriginRaw {
    zonei: usize,
    mass: f64,
}

fn read_origins_from_iter<I>(iter: I, zones: &ZoneIndex) -> Result<Vector>
where
    I: Iterator<Item = OriginRaw>,
{
    let origins: Vec<_> = iter.collect();
    ensure!(
        origins.len() == zones.len(),
        "Expected one row for each of the {} zones, found {}",
        zones.len(),
        origins.len()
    );
    check_indices_contiguous("zonei", origins.iter().map(|origin| origin.zonei))?;
    check_non_negative("mass", origins.iter().map(|origin| &origin.mass))?;

    let mut mass = Vector::zeros(zones.len());
    for origin in origins {
        mass[origin.zonei] = origin.mass;
    }

    Ok(mass)
}

/// Read origin mass (or observed outflow) for each zone from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `zones` - The zones, which must each have exactly one row
pub fn read_origins(model_dir: &Path, zones: &ZoneIndex) -> Result<Vector> {
    let file_path = model_dir.join(ORIGINS_FILE_NAME);
    let origins_csv = read_csv(&file_path)?;
    read_origins_from_iter(origins_csv, zones).with_context(|| input_err_msg(&file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, zones};
    use ndarray::array;
    use rstest::rstest;

    fn origins(rows: &[(usize, f64)]) -> impl Iterator<Item = OriginRaw> + '_ {
        rows.iter().map(|&(zonei, mass)| OriginRaw { zonei, mass })
    }

    #[rstest]
    fn test_read_origins_from_iter(zones: ZoneIndex) {
        let mass = read_origins_from_iter(origins(&[(2, 5.0), (0, 1.0), (1, 0.0)]), &zones);
        assert_eq!(mass.unwrap(), array![1.0, 0.0, 5.0]);
    }

    #[rstest]
    fn test_read_origins_from_iter_missing_zone(zones: ZoneIndex) {
        assert_error!(
            read_origins_from_iter(origins(&[(0, 1.0), (1, 1.0)]), &zones),
            "Expected one row for each of the 3 zones, found 2"
        );
    }

    #[rstest]
    #[case(&[(0, 1.0), (1, 1.0), (1, 1.0)])]
    #[case(&[(0, 1.0), (1, 1.0), (3, 1.0)])]
    #[case(&[(0, 1.0), (1, -1.0), (2, 1.0)])]
    fn test_read_origins_from_iter_invalid(zones: ZoneIndex, #[case] rows: &[(usize, f64)]) {
        assert!(read_origins_from_iter(origins(rows), &zones).is_err());
    }
}
