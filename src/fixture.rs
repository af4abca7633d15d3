//! Fixtures for tests
use crate::destination::{DestinationIndex, PointLocation};
use crate::matrix::{Matrix, save_matrix};
use crate::query::QueryContext;
use crate::zone::{Zone, ZoneIndex};
use ndarray::array;
use rstest::fixture;
use std::fs;
use std::path::Path;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Three zones with centroids at the corners of a 1km right angle
#[fixture]
pub fn zones() -> ZoneIndex {
    ZoneIndex::new([
        Zone {
            code: "E02000001".into(),
            east: 0.0,
            north: 0.0,
        },
        Zone {
            code: "E02000002".into(),
            east: 1000.0,
            north: 0.0,
        },
        Zone {
            code: "E02000003".into(),
            east: 0.0,
            north: 1000.0,
        },
    ])
    .unwrap()
}

#[fixture]
pub fn destinations() -> DestinationIndex {
    DestinationIndex::new(vec![
        PointLocation {
            id: "school1".into(),
            east: 100.0,
            north: 50.0,
            attractiveness: 100.0,
        },
        PointLocation {
            id: "school2".into(),
            east: 900.0,
            north: 900.0,
            attractiveness: 300.0,
        },
    ])
}

/// Asymmetric zone-to-zone travel times in minutes
#[fixture]
pub fn zone_costs() -> Matrix {
    array![[0.0, 10.0, 20.0], [12.0, 0.0, 25.0], [15.0, 30.0, 0.0]]
}

/// Probabilities for [`zones`] travelling to [`destinations`]
#[fixture]
pub fn probabilities() -> Matrix {
    array![[0.8, 0.2], [0.25, 0.75], [0.0, 0.0]]
}

#[fixture]
pub fn query_context(
    probabilities: Matrix,
    zones: ZoneIndex,
    destinations: DestinationIndex,
) -> QueryContext {
    QueryContext::new(probabilities, zones, destinations).unwrap()
}

/// Write a small, complete model directory with two zones and two schools
pub fn write_model_dir(dir_path: &Path) {
    let files = [
        ("model.toml", "category = \"schools-primary\"\n"),
        (
            "zones.csv",
            "code,zonei,east,north\nE02000002,1,1000,0\nE02000001,0,0,0\n",
        ),
        (
            "destinations.csv",
            "id,zonej,east,north,attractiveness\nschool1,0,0,0,100\nschool2,1,1000,0,50\n",
        ),
        ("origins.csv", "zonei,mass\n0,30\n1,10\n"),
    ];
    for (file_name, contents) in files {
        fs::write(dir_path.join(file_name), contents).unwrap();
    }
    save_matrix(
        &dir_path.join("zone_costs.bin"),
        &array![[0.0, 5.0], [6.0, 0.0]],
    )
    .unwrap();
}
