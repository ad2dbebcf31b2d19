//! Application configuration
//!
//! Settings are read from an optional JSON file and then overridden from
//! the environment:
//!
//! - `GWMAP_CONFIG`: path of the JSON file
//! - `GWMAP_COUNTRY`: country filter for search
//! - `GWMAP_GEOCODING_ENDPOINT`: base URL of the geocoding service
//! - `GWMAP_SEEDS_CSV`: CSV file replacing the built-in data points
//!
//! The access token is never read from or written to the config file.

mod duration;

use std::path::{Path, PathBuf};
use std::time::Duration;

use gw_core::{Coordinate, SeedPoint, SessionConfig, UserClickPolicy, Viewport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::seeds::load_seed_points;
use crate::DataError;

pub const ENV_CONFIG: &str = "GWMAP_CONFIG";
pub const ENV_COUNTRY: &str = "GWMAP_COUNTRY";
pub const ENV_GEOCODING_ENDPOINT: &str = "GWMAP_GEOCODING_ENDPOINT";
pub const ENV_SEEDS_CSV: &str = "GWMAP_SEEDS_CSV";

/// Map appearance and interaction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    pub container: String,
    pub style: String,
    pub center: Coordinate,
    pub zoom: f64,
    pub search_zoom: f64,
    #[serde(with = "duration")]
    pub fly_duration: Duration,
    pub user_clicks: UserClickPolicy,
}

impl Default for MapSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            container: session.container,
            style: session.style,
            center: session.default_viewport.center,
            zoom: session.default_viewport.zoom,
            search_zoom: session.search_zoom,
            fly_duration: session.fly_duration,
            user_clicks: session.user_clicks,
        }
    }
}

/// Geocoding service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Base URL, without the `/geocoding/v5` path
    pub endpoint: String,

    /// ISO 3166 country filter
    pub country: String,

    /// Maximum number of features requested, service default when unset
    pub limit: Option<u8>,

    /// Request timeout
    #[serde(with = "duration")]
    pub timeout: Duration,

    pub user_agent: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.mapbox.com".to_string(),
            country: "IN".to_string(),
            limit: None,
            timeout: Duration::from_secs(15),
            user_agent: concat!("gwmap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub map: MapSettings,
    pub geocoding: GeocodingConfig,

    /// CSV file with data points; the built-in presets are used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds_csv: Option<PathBuf>,
}

impl AppConfig {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self, DataError> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `GWMAP_CONFIG` if set, then apply environment overrides
    pub fn from_env() -> Result<Self, DataError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, DataError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup, such as the environment
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(country) = lookup(ENV_COUNTRY) {
            debug!("Country filter overridden to {}", country);
            self.geocoding.country = country;
        }
        if let Some(endpoint) = lookup(ENV_GEOCODING_ENDPOINT) {
            debug!("Geocoding endpoint overridden to {}", endpoint);
            self.geocoding.endpoint = endpoint;
        }
        if let Some(path) = lookup(ENV_SEEDS_CSV) {
            self.seeds_csv = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if !(0.0..=24.0).contains(&self.map.zoom) || !(0.0..=24.0).contains(&self.map.search_zoom)
        {
            return Err(DataError::Config("zoom levels must be within 0-24".to_string()));
        }
        if self.geocoding.endpoint.trim().is_empty() {
            return Err(DataError::Config("geocoding endpoint is empty".to_string()));
        }
        if self.geocoding.timeout.is_zero() {
            return Err(DataError::Config("geocoding timeout must be positive".to_string()));
        }
        if self.geocoding.limit == Some(0) {
            return Err(DataError::Config("geocoding limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Session settings, with data points read from `seeds_csv` when set
    pub fn session_config(&self) -> Result<SessionConfig, DataError> {
        let seed_points = match &self.seeds_csv {
            Some(path) => load_seed_points(path)?,
            None => SeedPoint::presets(),
        };

        Ok(SessionConfig {
            container: self.map.container.clone(),
            style: self.map.style.clone(),
            default_viewport: Viewport::new(self.map.center, self.map.zoom),
            search_zoom: self.map.search_zoom,
            fly_duration: self.map.fly_duration,
            user_clicks: self.map.user_clicks,
            seed_points,
        })
    }
}
