//! Geographic value types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when building a coordinate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
}

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lng)
    }
}

impl Coordinate {
    /// Create a coordinate, rejecting values outside the valid ranges
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        // NaN fails both range checks
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::Latitude(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::Longitude(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Compile-time constructor for known-good constants
    pub(crate) const fn from_const(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build from a `[lng, lat]` pair, the order used by GeoJSON
    pub fn from_lng_lat(pair: [f64; 2]) -> Result<Self, CoordinateError> {
        Self::new(pair[1], pair[0])
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lng)
    }
}

/// The map's center and zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(center: Coordinate, zoom: f64) -> Self {
        Self { center, zoom }
    }
}
