//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, Viewport};
use crate::marker::Severity;

/// Center of India, the default map focus
const DEFAULT_CENTER: Coordinate = Coordinate::from_const(20.5937, 78.9629);
const DEFAULT_ZOOM: f64 = 4.5;
const SEARCH_ZOOM: f64 = 10.0;
const FLY_DURATION: Duration = Duration::from_millis(2000);

/// What happens to earlier click markers when the user clicks again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserClickPolicy {
    /// Every click leaves a marker behind
    #[default]
    Accumulate,
    /// Only the latest click marker stays on the map
    ReplacePrevious,
}

/// A pre-seeded groundwater data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPoint {
    pub name: String,
    pub coordinate: Coordinate,
    pub severity: Severity,
}

impl SeedPoint {
    fn preset(name: &str, lat: f64, lng: f64, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            coordinate: Coordinate::from_const(lat, lng),
            severity,
        }
    }

    /// The built-in sample data points
    pub fn presets() -> Vec<SeedPoint> {
        vec![
            Self::preset("Delhi", 28.7041, 77.1025, Severity::Excellent),
            Self::preset("Mumbai", 19.0760, 72.8777, Severity::Moderate),
            Self::preset("Bangalore", 12.9716, 77.5946, Severity::Good),
            Self::preset("Kolkata", 22.5726, 88.3639, Severity::Critical),
            Self::preset("Chennai", 13.0827, 80.2707, Severity::Poor),
        ]
    }
}

/// Settings applied to every map session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Host element the provider renders into
    pub container: String,

    /// Provider style URL
    pub style: String,

    /// Viewport the map opens on
    pub default_viewport: Viewport,

    /// Zoom used when flying to a search result
    pub search_zoom: f64,

    /// Duration of the fly-to animation
    pub fly_duration: Duration,

    /// Replacement policy for click markers
    pub user_clicks: UserClickPolicy,

    /// Data points seeded once the session is active
    pub seed_points: Vec<SeedPoint>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            container: "map".to_string(),
            style: "mapbox://styles/mapbox/dark-v11".to_string(),
            default_viewport: Viewport::new(DEFAULT_CENTER, DEFAULT_ZOOM),
            search_zoom: SEARCH_ZOOM,
            fly_duration: FLY_DURATION,
            user_clicks: UserClickPolicy::default(),
            seed_points: SeedPoint::presets(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.default_viewport.center.lat(), 20.5937);
        assert_eq!(config.default_viewport.center.lng(), 78.9629);
        assert_eq!(config.default_viewport.zoom, 4.5);
        assert_eq!(config.seed_points.len(), 5);
        assert_eq!(config.user_clicks, UserClickPolicy::Accumulate);
    }

    #[test]
    fn test_preset_levels() {
        let presets = SeedPoint::presets();
        let names: Vec<_> = presets.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Delhi", "Mumbai", "Bangalore", "Kolkata", "Chennai"]);
        assert_eq!(presets[3].severity, Severity::Critical);
    }
}
