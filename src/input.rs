//! Common routines for handling input data.
use crate::model::{Model, ModelParameters};
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub mod costs;
pub use costs::{destination_costs_path, save_destination_costs};
use costs::read_costs;
pub mod destination;
pub use destination::read_destinations;
pub mod origin;
pub use origin::read_origins;
pub mod zone;
pub use zone::read_zones;

/// Read a series of type `T`s from a CSV file.
///
/// Will raise an error if the file is empty.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<T: DeserializeOwned>(file_path: &Path) -> Result<impl Iterator<Item = T>> {
    let vec = csv::Reader::from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .process_results(|iter| iter.collect_vec())
        .with_context(|| input_err_msg(file_path))?;

    ensure!(
        !vec.is_empty(),
        "CSV file {} cannot be empty",
        file_path.display()
    );

    Ok(vec.into_iter())
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;

    Ok(toml_data)
}

/// Format an error message to include the file path
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Check that a column of indices runs from zero to `len - 1` with no gaps or duplicates.
///
/// The indices may be given in any order.
fn check_indices_contiguous<I>(column: &str, indices: I) -> Result<()>
where
    I: IntoIterator<Item = usize>,
{
    for (expected, actual) in indices.into_iter().sorted().enumerate() {
        ensure!(
            actual == expected,
            "{column} values must be contiguous from zero without duplicates \
            (expected {expected}, found {actual})"
        );
    }

    Ok(())
}

/// Read a model from the specified directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The model and whether its destination cost matrix was derived during loading.
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<(Model, bool)> {
    let model_dir = model_dir.as_ref();
    let parameters = ModelParameters::from_path(model_dir)?;
    let zones = read_zones(model_dir)?;
    let destinations = read_destinations(model_dir)?;
    let origins = read_origins(model_dir, &zones)?;
    let (costs, derived) = read_costs(model_dir, &parameters, &zones, &destinations)?;

    let model = Model {
        parameters,
        zones,
        destinations,
        origins,
        costs,
    };

    Ok((model, derived))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::costs::ZONE_COSTS_FILE_NAME;
    use crate::fixture::{assert_error, write_model_dir};
    use crate::matrix::save_matrix;
    use ndarray::array;
    use rstest::rstest;
    use serde::Deserialize;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Record {
        id: String,
        value: u32,
    }

    /// Create an example CSV file in dir_path
    fn create_csv_file(dir_path: &Path, contents: &str) -> PathBuf {
        let file_path = dir_path.join("test.csv");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{contents}").unwrap();
        file_path
    }

    /// Test a normal read
    #[test]
    fn test_read_csv() {
        let dir = tempdir().unwrap();
        let file_path = create_csv_file(dir.path(), "id,value\nhello,1\nworld,2\n");
        let records: Vec<Record> = read_csv(&file_path).unwrap().collect();
        assert_eq!(
            records,
            &[
                Record {
                    id: "hello".to_string(),
                    value: 1,
                },
                Record {
                    id: "world".to_string(),
                    value: 2,
                }
            ]
        );

        // File with no data (only column headers)
        let file_path = create_csv_file(dir.path(), "id,value\n");
        assert!(read_csv::<Record>(&file_path).is_err());
    }

    #[test]
    fn test_read_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.toml");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id = \"hello\"\nvalue = 1").unwrap();
        }

        assert_eq!(
            read_toml::<Record>(&file_path).unwrap(),
            Record {
                id: "hello".to_string(),
                value: 1,
            }
        );

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "bad toml syntax").unwrap();
        }

        assert!(read_toml::<Record>(&file_path).is_err());
    }

    #[rstest]
    #[case(vec![], true)]
    #[case(vec![0], true)]
    #[case(vec![2, 0, 1], true)]
    #[case(vec![1], false)]
    #[case(vec![0, 0], false)]
    #[case(vec![0, 2], false)]
    fn test_check_indices_contiguous(#[case] indices: Vec<usize>, #[case] expected_valid: bool) {
        assert_eq!(
            check_indices_contiguous("zonei", indices).is_ok(),
            expected_valid
        );
    }

    #[test]
    fn test_check_indices_contiguous_message() {
        assert_error!(
            check_indices_contiguous("zonej", [0, 1, 3]),
            "zonej values must be contiguous from zero without duplicates (expected 2, found 3)"
        );
    }

    #[test]
    fn test_load_model() {
        let dir = tempdir().unwrap();
        write_model_dir(dir.path());

        let (model, derived) = load_model(dir.path()).unwrap();
        assert!(derived);
        assert_eq!(model.dim(), (2, 2));
        assert_eq!(model.zones.index_of("E02000002").unwrap(), 1);
        assert_eq!(model.origins, array![30.0, 10.0]);
        assert_eq!(model.costs, array![[0.0, 5.0], [6.0, 0.0]]);
    }

    #[test]
    fn test_load_model_precomputed_costs() {
        let dir = tempdir().unwrap();
        write_model_dir(dir.path());
        let costs = array![[1.0, 2.0], [3.0, 4.0]];
        save_matrix(&destination_costs_path(dir.path()), &costs).unwrap();

        let (model, derived) = load_model(dir.path()).unwrap();
        assert!(!derived);
        assert_eq!(model.costs, costs);
    }

    #[test]
    fn test_load_model_wrong_cost_shape() {
        let dir = tempdir().unwrap();
        write_model_dir(dir.path());
        save_matrix(
            &dir.path().join(ZONE_COSTS_FILE_NAME),
            &array![[0.0, 5.0, 1.0], [6.0, 0.0, 1.0]],
        )
        .unwrap();

        assert!(load_model(dir.path()).is_err());
    }
}
