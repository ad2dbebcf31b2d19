//! Mapbox places geocoding
//!
//! `GET {endpoint}/geocoding/v5/mapbox.places/{query}.json` answers with a
//! GeoJSON feature collection. Only the first feature is used.

use std::fmt::Write as _;

use async_trait::async_trait;
use gw_core::{
    Coordinate, Credential, GeocodeError, GeocodeOutcome, GeocodeQuery, GeocodeResult, Geocoder,
};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::GeocodingConfig;
use crate::DataError;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    /// `[lng, lat]`
    center: [f64; 2],
    place_name: String,
}

/// Geocoder backed by the Mapbox places API
pub struct MapboxGeocoder {
    client: Client,
    base: Url,
    country: String,
    limit: Option<u8>,
}

impl MapboxGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self, DataError> {
        let base = Url::parse(config.endpoint.trim())
            .map_err(|e| DataError::Config(format!("invalid geocoding endpoint: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(DataError::Config(format!(
                "geocoding endpoint {} cannot carry a path",
                base
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            country: config.country.clone(),
            limit: config.limit,
        })
    }

    /// Request URL for a query; carries the access token
    fn request_url(&self, credential: &Credential, query: &GeocodeQuery) -> Url {
        let mut url = self.base.clone();
        let path = format!(
            "{}/geocoding/v5/mapbox.places/{}.json",
            self.base.path().trim_end_matches('/'),
            encode_component(query.as_str())
        );
        url.set_path(&path);

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("access_token", credential.as_str());
            if !self.country.is_empty() {
                params.append_pair("country", &self.country);
            }
            if let Some(limit) = self.limit {
                params.append_pair("limit", &limit.to_string());
            }
        }
        url
    }
}

/// Percent-encode everything outside the unreserved set
///
/// The places API splits batch queries on `;`, so the query must travel as
/// one opaque path segment.
fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

/// Take the best match out of a places response body
pub fn parse_response(body: &str) -> Result<GeocodeOutcome, GeocodeError> {
    let collection: FeatureCollection = serde_json::from_str(body)
        .map_err(|e| GeocodeError::Decode(format!("failed to parse geocoding response: {}", e)))?;

    let Some(feature) = collection.features.into_iter().next() else {
        return Ok(GeocodeOutcome::NotFound);
    };
    let coordinate = Coordinate::from_lng_lat(feature.center)
        .map_err(|e| GeocodeError::Decode(format!("invalid feature center: {}", e)))?;

    Ok(GeocodeOutcome::Found(GeocodeResult {
        coordinate,
        display_name: feature.place_name,
    }))
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    async fn geocode(
        &self,
        credential: &Credential,
        query: &GeocodeQuery,
    ) -> Result<GeocodeOutcome, GeocodeError> {
        let url = self.request_url(credential, query);
        debug!("Geocoding '{}' via {}", query, self.base);

        // Errors are stripped of the URL, it holds the access token
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Network(format!(
                "geocoding service returned status {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::Network(e.without_url().to_string()))?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn geocoder(endpoint: &str, limit: Option<u8>) -> MapboxGeocoder {
        let config = GeocodingConfig {
            endpoint: endpoint.to_string(),
            limit,
            ..GeocodingConfig::default()
        };
        MapboxGeocoder::new(&config).unwrap()
    }

    fn credential() -> Credential {
        Credential::parse("pk.test-token").unwrap()
    }

    #[test]
    fn test_request_url() {
        let geocoder = geocoder("https://api.mapbox.com", None);
        let query = GeocodeQuery::parse("Jaipur").unwrap();
        let url = geocoder.request_url(&credential(), &query);

        assert_eq!(
            url.as_str(),
            "https://api.mapbox.com/geocoding/v5/mapbox.places/Jaipur.json?access_token=pk.test-token&country=IN"
        );
    }

    #[test]
    fn test_request_url_encodes_query() {
        let geocoder = geocoder("http://localhost:8080/proxy/", Some(1));
        let query = GeocodeQuery::parse("New Delhi/NCR #1").unwrap();
        let url = geocoder.request_url(&credential(), &query);

        assert_eq!(
            url.path(),
            "/proxy/geocoding/v5/mapbox.places/New%20Delhi%2FNCR%20%231.json"
        );
        assert_eq!(url.query(), Some("access_token=pk.test-token&country=IN&limit=1"));
    }

    #[test]
    fn test_request_url_escapes_separators() {
        let geocoder = geocoder("https://api.mapbox.com", None);
        let query = GeocodeQuery::parse("Ward 5; Sector=3 & Co, Pune").unwrap();
        let url = geocoder.request_url(&credential(), &query);

        assert_eq!(
            url.path(),
            "/geocoding/v5/mapbox.places/Ward%205%3B%20Sector%3D3%20%26%20Co%2C%20Pune.json"
        );
        assert_eq!(url.query(), Some("access_token=pk.test-token&country=IN"));

        let query = GeocodeQuery::parse("Bengaluru 100%").unwrap();
        let url = geocoder.request_url(&credential(), &query);
        assert_eq!(url.path(), "/geocoding/v5/mapbox.places/Bengaluru%20100%25.json");
    }

    #[test]
    fn test_non_ascii_query() {
        let geocoder = geocoder("https://api.mapbox.com", None);
        let query = GeocodeQuery::parse("दिल्ली").unwrap();
        let url = geocoder.request_url(&credential(), &query);
        assert!(url.path().ends_with("/%E0%A4%A6%E0%A4%BF%E0%A4%B2%E0%A5%8D%E0%A4%B2%E0%A5%80.json"));
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let config = GeocodingConfig {
            endpoint: "not a url".to_string(),
            ..GeocodingConfig::default()
        };
        assert!(matches!(MapboxGeocoder::new(&config), Err(DataError::Config(_))));

        let config = GeocodingConfig {
            endpoint: "mailto:maps@example.com".to_string(),
            ..GeocodingConfig::default()
        };
        assert!(matches!(MapboxGeocoder::new(&config), Err(DataError::Config(_))));
    }

    #[test]
    fn test_parse_first_feature() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                { "center": [75.7873, 26.9124], "place_name": "Jaipur, Rajasthan, India" },
                { "center": [75.8, 26.9], "place_name": "Jaipur Junction" }
            ]
        }"#;

        let outcome = parse_response(body).unwrap();
        assert_eq!(
            outcome,
            GeocodeOutcome::Found(GeocodeResult {
                coordinate: Coordinate::new(26.9124, 75.7873).unwrap(),
                display_name: "Jaipur, Rajasthan, India".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_no_features() {
        assert_eq!(parse_response(r#"{"features": []}"#), Ok(GeocodeOutcome::NotFound));
        assert_eq!(parse_response(r#"{"type": "FeatureCollection"}"#), Ok(GeocodeOutcome::NotFound));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_response("<html>"), Err(GeocodeError::Decode(_))));
        assert!(matches!(
            parse_response(r#"{"features": [{"center": [200.0, 10.0], "place_name": "Nowhere"}]}"#),
            Err(GeocodeError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let config = GeocodingConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            ..GeocodingConfig::default()
        };
        let geocoder = MapboxGeocoder::new(&config).unwrap();
        let query = GeocodeQuery::parse("Jaipur").unwrap();

        match geocoder.geocode(&credential(), &query).await {
            Err(GeocodeError::Network(message)) => assert!(!message.contains("pk.test-token")),
            other => panic!("expected network error, got {:?}", other),
        }
    }
}
