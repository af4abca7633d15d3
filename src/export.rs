//! Exporting probable trips, e.g. for drawing desire lines in a GIS.
//!
//! Trips are written either as CSV or as a GeoJSON `FeatureCollection` with one `LineString` per
//! trip. Coordinates are the eastings and northings of the input files, not longitude and latitude.
use crate::destination::DestinationID;
use crate::matrix::write_atomically;
use crate::query::{QueryContext, check_threshold};
use crate::zone::ZoneID;
use anyhow::Result;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;
use strum::{Display, EnumString};

/// The file formats probable trips can be exported in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    /// One row per trip
    #[default]
    Csv,
    /// A `FeatureCollection` of desire lines
    Geojson,
}

/// Represents a row in the probable trips CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ProbableTripRow {
    origin: ZoneID,
    origin_east: f64,
    origin_north: f64,
    destination: DestinationID,
    destination_east: f64,
    destination_north: f64,
    p: f64,
}

impl ProbableTripRow {
    /// A straight line from origin to destination, carrying the IDs and probability
    fn into_feature(self) -> Feature {
        let geometry = Geometry::new(Value::LineString(vec![
            vec![self.origin_east, self.origin_north],
            vec![self.destination_east, self.destination_north],
        ]));
        let mut feature = Feature::from(geometry);
        feature.set_property("origin", self.origin.to_string());
        feature.set_property("destination", self.destination.to_string());
        feature.set_property("p", self.p);

        feature
    }
}

/// Every origin-destination pair with probability of at least `threshold`, by origin then
/// destination
fn probable_trips(
    context: &QueryContext,
    threshold: f64,
) -> impl Iterator<Item = ProbableTripRow> + '_ {
    context
        .zones()
        .iter()
        .enumerate()
        .flat_map(move |(zonei, zone)| {
            context
                .probabilities()
                .row(zonei)
                .into_iter()
                .zip(context.destinations().iter())
                .filter(move |&(&p, _)| p >= threshold)
                .map(move |(&p, dest)| ProbableTripRow {
                    origin: zone.code.clone(),
                    origin_east: zone.east,
                    origin_north: zone.north,
                    destination: dest.id.clone(),
                    destination_east: dest.east,
                    destination_north: dest.north,
                    p,
                })
        })
}

/// Write every origin-destination pair with probability of at least `threshold` as CSV.
///
/// # Returns
///
/// The number of rows written.
pub fn write_probable_trips<W: Write>(
    writer: W,
    context: &QueryContext,
    threshold: f64,
) -> Result<usize> {
    check_threshold(threshold)?;

    let mut writer = csv::Writer::from_writer(writer);
    let mut count = 0;
    for row in probable_trips(context, threshold) {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;

    Ok(count)
}

/// Write every origin-destination pair with probability of at least `threshold` as GeoJSON.
///
/// # Returns
///
/// The number of features written.
pub fn write_probable_trips_geojson<W: Write>(
    mut writer: W,
    context: &QueryContext,
    threshold: f64,
) -> Result<usize> {
    check_threshold(threshold)?;

    let features = probable_trips(context, threshold)
        .map(ProbableTripRow::into_feature)
        .collect::<Vec<_>>();
    let count = features.len();
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    serde_json::to_writer(&mut writer, &collection)?;
    writeln!(writer)?;

    Ok(count)
}

/// Write probable trips in the given format
fn write_in_format<W: Write>(
    writer: W,
    context: &QueryContext,
    threshold: f64,
    format: ExportFormat,
) -> Result<usize> {
    match format {
        ExportFormat::Csv => write_probable_trips(writer, context, threshold),
        ExportFormat::Geojson => write_probable_trips_geojson(writer, context, threshold),
    }
}

/// Export probable trips to a file, or to stdout if no file is given
pub fn export_probable_trips(
    context: &QueryContext,
    threshold: f64,
    format: ExportFormat,
    file_path: Option<&Path>,
) -> Result<()> {
    let count = if let Some(file_path) = file_path {
        let mut count = 0;
        write_atomically(file_path, |writer| {
            count = write_in_format(writer, context, threshold, format)?;
            Ok(())
        })?;
        info!("Wrote {count} probable trips to {}", file_path.display());
        count
    } else {
        write_in_format(io::stdout().lock(), context, threshold, format)?
    };

    if count == 0 {
        warn!("No trips have a probability of at least {threshold}");
    }

    Ok(())
}
