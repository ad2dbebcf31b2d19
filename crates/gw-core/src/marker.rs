//! Map markers
//!
//! A marker binds one coordinate to one semantic category. The category
//! decides how the provider draws it and whether user interaction may
//! remove it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SeedPoint;
use crate::geo::Coordinate;

/// Unique identifier for a marker
pub type MarkerId = Uuid;

/// What placed a marker on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerCategory {
    /// Placed where the user clicked
    UserClick,
    /// Placed on a resolved search query
    SearchResult,
    /// Pre-seeded groundwater data point
    SeedPoint,
}

impl MarkerCategory {
    /// Seed points are never removed by user interaction
    pub fn user_removable(&self) -> bool {
        !matches!(self, MarkerCategory::SeedPoint)
    }
}

/// Groundwater level classification of a data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Excellent,
    Good,
    Moderate,
    Poor,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Excellent,
        Severity::Good,
        Severity::Moderate,
        Severity::Poor,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Excellent => "excellent",
            Severity::Good => "good",
            Severity::Moderate => "moderate",
            Severity::Poor => "poor",
            Severity::Critical => "critical",
        }
    }

    /// Theme color token the renderer maps to a legend color
    pub fn color_token(&self) -> &'static str {
        match self {
            Severity::Excellent => "data-excellent",
            Severity::Good => "data-good",
            Severity::Moderate => "data-moderate",
            Severity::Poor => "data-poor",
            Severity::Critical => "data-critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Severity::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or_else(|| format!("unknown groundwater level '{}'", s))
    }
}

/// Visual style requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    /// Accent-colored pin
    Pin,
    /// Small dot colored by groundwater level
    Dot { severity: Severity },
}

/// Popup content attached to a marker
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub title: String,
    pub lines: Vec<String>,
}

/// A marker placed on the map
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Unique identifier
    pub id: MarkerId,

    /// Where the marker sits
    pub coordinate: Coordinate,

    /// What placed it
    pub category: MarkerCategory,

    /// Human readable label
    pub label: String,

    /// Groundwater level, only set for data points
    pub severity: Option<Severity>,
}

impl Marker {
    /// Marker for a map click
    pub fn user_click(coordinate: Coordinate) -> Self {
        Self {
            id: Uuid::new_v4(),
            coordinate,
            category: MarkerCategory::UserClick,
            label: "Location".to_string(),
            severity: None,
        }
    }

    /// Marker for a resolved search
    pub fn search_result(coordinate: Coordinate, place_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            coordinate,
            category: MarkerCategory::SearchResult,
            label: place_name.into(),
            severity: None,
        }
    }

    /// Marker for a pre-seeded data point
    pub fn seed(point: &SeedPoint) -> Self {
        Self {
            id: Uuid::new_v4(),
            coordinate: point.coordinate,
            category: MarkerCategory::SeedPoint,
            label: point.name.clone(),
            severity: Some(point.severity),
        }
    }

    /// Replace the generated id
    pub fn with_id(mut self, id: MarkerId) -> Self {
        self.id = id;
        self
    }

    pub fn style(&self) -> MarkerStyle {
        match (self.category, self.severity) {
            (MarkerCategory::SeedPoint, Some(severity)) => MarkerStyle::Dot { severity },
            _ => MarkerStyle::Pin,
        }
    }

    pub fn popup(&self) -> Popup {
        let lines = match self.category {
            MarkerCategory::UserClick => vec![
                format!("Lat: {:.4}", self.coordinate.lat()),
                format!("Lng: {:.4}", self.coordinate.lng()),
            ],
            MarkerCategory::SearchResult => Vec::new(),
            MarkerCategory::SeedPoint => self
                .severity
                .map(|level| vec![format!("Groundwater: {}", level)])
                .unwrap_or_default(),
        };

        Popup {
            title: self.label.clone(),
            lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse() {
        assert_eq!("Critical".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!(" good ".parse::<Severity>(), Ok(Severity::Good));
        assert!("flooded".parse::<Severity>().is_err());
    }

    #[test]
    fn test_click_popup() {
        let marker = Marker::user_click(Coordinate::new(28.70412, 77.10249).unwrap());
        let popup = marker.popup();
        assert_eq!(popup.title, "Location");
        assert_eq!(popup.lines, vec!["Lat: 28.7041", "Lng: 77.1025"]);
        assert_eq!(marker.style(), MarkerStyle::Pin);
    }

    #[test]
    fn test_seed_style() {
        let point = SeedPoint {
            name: "Kolkata".to_string(),
            coordinate: Coordinate::new(22.5726, 88.3639).unwrap(),
            severity: Severity::Critical,
        };
        let marker = Marker::seed(&point);
        assert_eq!(marker.style(), MarkerStyle::Dot { severity: Severity::Critical });
        assert_eq!(marker.popup().lines, vec!["Groundwater: critical"]);
        assert!(!marker.category.user_removable());
    }
}
