//! Answering "where do trips from this zone probably go?" against a built model.
//!
//! A [`QueryContext`] holds everything needed to answer queries for one category of destination.
//! It is immutable once loaded, so a single context can be shared between threads and queried
//! concurrently without locking. A [`QueryService`] maps each category to its context.
use crate::destination::{DestinationID, DestinationIndex};
use crate::input::{read_destinations, read_zones};
use crate::matrix::{Matrix, check_shape, load_matrix};
use crate::model::Category;
use crate::output::{PROBABILITIES_FILE_NAME, read_summary};
use crate::zone::ZoneIndex;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use strum::IntoEnumIterator;

/// A destination reachable from an origin, with the probability of a trip ending there
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct ProbableDestination {
    /// The destination's identifier
    pub id: DestinationID,
    /// Probability that a trip from the origin ends at this destination
    pub p: f64,
}

/// Check that a probability threshold lies in `[0, 1]`
pub fn check_threshold(threshold: f64) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&threshold),
        "Threshold must be between 0 and 1 (got {threshold})"
    );

    Ok(())
}

/// The probability matrix for one category of destination plus its lookup tables
#[derive(PartialEq, Debug, Clone)]
pub struct QueryContext {
    probabilities: Matrix,
    zones: ZoneIndex,
    destinations: DestinationIndex,
}

impl QueryContext {
    /// Create a context, checking that the matrix is zones x destinations
    pub fn new(
        probabilities: Matrix,
        zones: ZoneIndex,
        destinations: DestinationIndex,
    ) -> Result<Self> {
        check_shape(
            "Probability matrix",
            &probabilities,
            (zones.len(), destinations.len()),
        )?;

        Ok(Self {
            probabilities,
            zones,
            destinations,
        })
    }

    /// Load a context from a published artifact directory
    pub fn from_artifact(artifact_dir: &Path) -> Result<Self> {
        let summary = read_summary(artifact_dir)?;
        if !summary.converged {
            warn!(
                "Model in {} was built from an unconverged calibration (beta = {})",
                artifact_dir.display(),
                summary.beta
            );
        }

        let zones = read_zones(artifact_dir)?;
        let destinations = read_destinations(artifact_dir)?;
        let probabilities = load_matrix(
            &artifact_dir.join(PROBABILITIES_FILE_NAME),
            (zones.len(), destinations.len()),
        )?;
        ensure!(
            (summary.m, summary.n) == (zones.len(), destinations.len()),
            "Summary for model in {} does not match its lookup tables",
            artifact_dir.display()
        );

        Self::new(probabilities, zones, destinations)
    }

    /// The row-normalised trip probabilities
    pub fn probabilities(&self) -> &Matrix {
        &self.probabilities
    }

    /// The origin zones (matrix rows)
    pub fn zones(&self) -> &ZoneIndex {
        &self.zones
    }

    /// The destinations (matrix columns)
    pub fn destinations(&self) -> &DestinationIndex {
        &self.destinations
    }

    /// Get every destination whose probability for the given origin is at least `threshold`.
    ///
    /// # Arguments
    ///
    /// * `origin_code` - Code of the origin zone
    /// * `threshold` - Minimum probability, between 0 and 1 inclusive
    ///
    /// # Returns
    ///
    /// The destinations, in column order. Callers should not rely on the order. Fails with
    /// [`crate::error::ModelError::UnresolvedCode`] if the origin is not in the zone index.
    pub fn probable_destinations(
        &self,
        origin_code: &str,
        threshold: f64,
    ) -> Result<Vec<ProbableDestination>> {
        check_threshold(threshold)?;
        let zonei = self.zones.index_of(origin_code)?;
        let row = self.probabilities.row(zonei);

        debug!(
            "Query for {origin_code} (row {zonei}): sum = {}, max = {}, mean = {}",
            row.sum(),
            row.fold(0.0, |max: f64, &p| max.max(p)),
            row.mean().unwrap_or(0.0)
        );

        Ok(row
            .iter()
            .zip(self.destinations.iter())
            .filter(|(p, _)| **p >= threshold)
            .map(|(&p, dest)| ProbableDestination {
                id: dest.id.clone(),
                p,
            })
            .collect())
    }
}

/// Query contexts for each category of destination
#[derive(Debug, Clone, Default)]
pub struct QueryService {
    contexts: IndexMap<Category, Arc<QueryContext>>,
}

impl QueryService {
    /// Create a service with no categories
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every category with an artifact under `artifact_root`.
    ///
    /// Artifacts are expected in `<artifact_root>/<category>/`. Categories with no artifact
    /// directory are skipped; at least one must be present.
    pub fn load(artifact_root: &Path) -> Result<Self> {
        let mut service = Self::new();
        for category in Category::iter() {
            let artifact_dir = artifact_root.join(category.to_string());
            if !artifact_dir.is_dir() {
                continue;
            }

            let context = QueryContext::from_artifact(&artifact_dir).with_context(|| {
                format!("Could not load {category} model from {}", artifact_dir.display())
            })?;
            service.insert(category, context);
        }

        ensure!(
            !service.contexts.is_empty(),
            "No model artifacts found in {}",
            artifact_root.display()
        );
        info!(
            "Loaded query contexts for: {}",
            service.contexts.keys().join(", ")
        );

        Ok(service)
    }

    /// Add (or replace) the context for a category
    pub fn insert(&mut self, category: Category, context: QueryContext) {
        self.contexts.insert(category, Arc::new(context));
    }

    /// Get the context for a category
    pub fn context(&self, category: Category) -> Result<Arc<QueryContext>> {
        self.contexts
            .get(&category)
            .cloned()
            .with_context(|| format!("No model has been loaded for {category}"))
    }

    /// Get the destinations in `category` a trip from the given origin probably ends at.
    ///
    /// See [`QueryContext::probable_destinations`].
    pub fn get_probable_destinations_by_origin_code(
        &self,
        category: Category,
        origin_code: &str,
        threshold: f64,
    ) -> Result<Vec<ProbableDestination>> {
        self.context(category)?
            .probable_destinations(origin_code, threshold)
    }
}
