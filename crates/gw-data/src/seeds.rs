//! Groundwater data points from CSV
//!
//! Expects a header row with `name,lat,lng,level` columns; `level` is one
//! of excellent, good, moderate, poor or critical in any case.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use gw_core::{Coordinate, SeedPoint, Severity};
use serde::Deserialize;
use tracing::info;

use crate::DataError;

#[derive(Debug, Deserialize)]
struct SeedRecord {
    name: String,
    lat: f64,
    lng: f64,
    level: String,
}

/// Read seed points from any CSV source
pub fn read_seed_points<R: Read>(reader: R) -> Result<Vec<SeedPoint>, DataError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut points = Vec::new();
    for result in csv_reader.records() {
        let row = result?;
        let line = row.position().map(|pos| pos.line()).unwrap_or_default();
        let record: SeedRecord = row.deserialize(Some(&headers))?;

        let coordinate = Coordinate::new(record.lat, record.lng).map_err(|e| {
            DataError::SeedPoint {
                line,
                reason: e.to_string(),
            }
        })?;
        let severity: Severity = record
            .level
            .parse()
            .map_err(|reason| DataError::SeedPoint { line, reason })?;

        points.push(SeedPoint {
            name: record.name,
            coordinate,
            severity,
        });
    }

    Ok(points)
}

/// Load seed points from a CSV file
pub fn load_seed_points(path: impl AsRef<Path>) -> Result<Vec<SeedPoint>, DataError> {
    let path = path.as_ref();
    let points = read_seed_points(File::open(path)?)?;
    info!("Loaded {} seed points from {}", points.len(), path.display());
    Ok(points)
}
