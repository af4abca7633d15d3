//! Zones are the residential areas in which trips originate.
use crate::id::{IDIndex, define_id_type};
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

define_id_type! {ZoneID}

/// An origin area with a stable external code (e.g. an MSOA code such as "E02000001")
#[derive(PartialEq, Debug, Clone, Deserialize, Serialize)]
pub struct Zone {
    /// The zone's code
    pub code: ZoneID,
    /// Easting of the zone centroid (metres)
    pub east: f64,
    /// Northing of the zone centroid (metres)
    pub north: f64,
}

/// The bijection between zone codes and dense row indices (`zonei`).
///
/// The row index of a zone is its position in the index, so indices are always contiguous from
/// zero. An index is fixed for the lifetime of a model artifact.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ZoneIndex(IndexMap<ZoneID, Zone>);

impl ZoneIndex {
    /// Create an index from zones given in row order.
    ///
    /// Fails if a code appears more than once.
    pub fn new<I>(zones: I) -> Result<Self>
    where
        I: IntoIterator<Item = Zone>,
    {
        let mut map = IndexMap::new();
        for zone in zones {
            let code = zone.code.clone();
            ensure!(
                map.insert(code.clone(), zone).is_none(),
                "Duplicate zone code: {code}"
            );
        }

        Ok(Self(map))
    }

    /// The number of zones (`M`)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no zones
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up the row index for a zone code.
    ///
    /// Fails with [`crate::error::ModelError::UnresolvedCode`] if the code is not indexed.
    pub fn index_of(&self, code: &str) -> Result<usize> {
        self.0.index_of(code)
    }

    /// Get the zone at the given row index
    pub fn get(&self, zonei: usize) -> Option<&Zone> {
        self.0.get_index(zonei).map(|(_, zone)| zone)
    }

    /// Iterate over zones in row order
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.0.values()
    }

    /// Iterate over zone centroids as `(zonei, [east, north])`
    pub fn centroids(&self) -> impl Iterator<Item = (usize, [f64; 2])> + '_ {
        self.iter()
            .enumerate()
            .map(|(zonei, zone)| (zonei, [zone.east, zone.north]))
    }
}
