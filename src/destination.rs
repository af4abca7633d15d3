//! Destinations are the point locations (schools, stores, hospitals) that trips end at.
use crate::id::define_id_type;
use crate::matrix::Vector;
use serde::{Deserialize, Serialize};

define_id_type! {DestinationID}

/// A point destination with an attractiveness measure.
///
/// What the attractiveness represents depends on the category of destination: pupil capacity for
/// schools, turnover or floorspace for retail and floor area for hospitals.
#[derive(PartialEq, Debug, Clone, Deserialize, Serialize)]
pub struct PointLocation {
    /// External identifier (e.g. a school URN)
    pub id: DestinationID,
    /// Easting (metres)
    pub east: f64,
    /// Northing (metres)
    pub north: f64,
    /// How strongly the destination attracts trips
    pub attractiveness: f64,
}

/// Destinations in column order (`zonej`).
///
/// The column index of a destination is its position, so indices are contiguous from zero.
/// Identifiers are not required to be unique.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct DestinationIndex(Vec<PointLocation>);

impl DestinationIndex {
    /// Create an index from destinations given in column order
    pub fn new(destinations: Vec<PointLocation>) -> Self {
        Self(destinations)
    }

    /// The number of destinations (`N`)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no destinations
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the destination at the given column index
    pub fn get(&self, zonej: usize) -> Option<&PointLocation> {
        self.0.get(zonej)
    }

    /// Iterate over destinations in column order
    pub fn iter(&self) -> impl Iterator<Item = &PointLocation> {
        self.0.iter()
    }

    /// The attractiveness vector (`Aj`)
    pub fn attractiveness(&self) -> Vector {
        self.iter().map(|dest| dest.attractiveness).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::destinations;
    use ndarray::array;
    use rstest::rstest;

    #[rstest]
    fn test_destination_index(destinations: DestinationIndex) {
        assert_eq!(destinations.len(), 2);
        assert_eq!(destinations.get(1).unwrap().id, "school2".into());
        assert!(destinations.get(2).is_none());
        assert_eq!(destinations.attractiveness(), array![100.0, 300.0]);
    }
}
