//! Data and service backends for the groundwater map

pub mod config;
pub mod geocoding;
pub mod seeds;

use thiserror::Error;

// Re-exports
pub use config::{AppConfig, GeocodingConfig, MapSettings};
pub use geocoding::MapboxGeocoder;
pub use seeds::{load_seed_points, read_seed_points};

/// Errors that can occur while loading configuration and data files
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid seed point on line {line}: {reason}")]
    SeedPoint { line: u64, reason: String },
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => {
                DataError::Io(std::io::Error::new(io_err.kind(), error.to_string()))
            }
            _ => DataError::Csv(error.to_string()),
        }
    }
}
