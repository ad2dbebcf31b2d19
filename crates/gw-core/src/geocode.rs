//! Free-text place resolution
//!
//! [`GeocodeResolver`] numbers every request it issues. Callers compare the
//! number against [`GeocodeResolver::is_latest`] when the answer arrives and
//! drop anything that was superseded in the meantime. Nothing is cancelled
//! on the wire.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::geo::Coordinate;
use crate::session::Credential;

/// Errors raised while resolving a query
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeocodeError {
    #[error("search query is empty")]
    InvalidQuery,

    #[error("geocoding request failed: {0}")]
    Network(String),

    #[error("unreadable geocoding response: {0}")]
    Decode(String),
}

/// A trimmed, non-empty search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeQuery(String);

impl GeocodeQuery {
    pub fn parse(raw: &str) -> Result<Self, GeocodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GeocodeError::InvalidQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GeocodeQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved place
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub coordinate: Coordinate,
    pub display_name: String,
}

/// Answer of a lookup; not finding anything is not an error
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Found(GeocodeResult),
    NotFound,
}

/// Remote lookup service
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a query to its best match
    async fn geocode(
        &self,
        credential: &Credential,
        query: &GeocodeQuery,
    ) -> Result<GeocodeOutcome, GeocodeError>;
}

/// An issued request waiting for its answer
#[derive(Debug, Clone)]
pub struct PendingLookup {
    seq: u64,
    query: GeocodeQuery,
}

impl PendingLookup {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn query(&self) -> &GeocodeQuery {
        &self.query
    }
}

/// A completed lookup tagged with its request number
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub seq: u64,
    pub outcome: GeocodeOutcome,
}

/// Issues numbered lookups against a [`Geocoder`]
pub struct GeocodeResolver {
    geocoder: Arc<dyn Geocoder>,
    latest_issued: AtomicU64,
}

impl GeocodeResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            geocoder,
            latest_issued: AtomicU64::new(0),
        }
    }

    /// Validate a query and give it the next request number
    ///
    /// Empty queries are rejected before any number is used up.
    pub fn issue(&self, raw: &str) -> Result<PendingLookup, GeocodeError> {
        let query = GeocodeQuery::parse(raw)?;
        let seq = self.latest_issued.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Issued geocode request #{} for '{}'", seq, query);
        Ok(PendingLookup { seq, query })
    }

    /// Perform the remote lookup for an issued request
    pub async fn lookup(
        &self,
        credential: &Credential,
        pending: &PendingLookup,
    ) -> Result<GeocodeOutcome, GeocodeError> {
        self.geocoder.geocode(credential, &pending.query).await
    }

    /// Issue and perform a lookup in one go
    pub async fn resolve(
        &self,
        credential: &Credential,
        raw: &str,
    ) -> Result<Resolution, GeocodeError> {
        let pending = self.issue(raw)?;
        let outcome = self.lookup(credential, &pending).await?;
        Ok(Resolution {
            seq: pending.seq,
            outcome,
        })
    }

    /// Whether no request was issued after `seq`
    pub fn is_latest(&self, seq: u64) -> bool {
        self.latest_issued.load(Ordering::SeqCst) == seq
    }

    pub fn latest(&self) -> u64 {
        self.latest_issued.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGeocoder;

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(
            &self,
            _credential: &Credential,
            query: &GeocodeQuery,
        ) -> Result<GeocodeOutcome, GeocodeError> {
            match query.as_str() {
                "Pune" => Ok(GeocodeOutcome::Found(GeocodeResult {
                    coordinate: Coordinate::new(18.52, 73.86).unwrap(),
                    display_name: "Pune, Maharashtra".to_string(),
                })),
                "offline" => Err(GeocodeError::Network("connection refused".to_string())),
                _ => Ok(GeocodeOutcome::NotFound),
            }
        }
    }

    fn credential() -> Credential {
        Credential::parse("pk.test-token").unwrap()
    }

    #[test]
    fn test_query_trimmed() {
        assert_eq!(GeocodeQuery::parse("  Pune ").unwrap().as_str(), "Pune");
        assert_eq!(GeocodeQuery::parse(" \t"), Err(GeocodeError::InvalidQuery));
    }

    #[test]
    fn test_sequence_numbers() {
        let resolver = GeocodeResolver::new(Arc::new(FixedGeocoder));
        let first = resolver.issue("Delhi").unwrap();
        assert!(resolver.is_latest(first.seq()));

        assert_eq!(resolver.issue("   ").unwrap_err(), GeocodeError::InvalidQuery);
        assert!(resolver.is_latest(first.seq()));

        let second = resolver.issue("Mumbai").unwrap();
        assert!(second.seq() > first.seq());
        assert!(!resolver.is_latest(first.seq()));
        assert!(resolver.is_latest(second.seq()));
    }

    #[tokio::test]
    async fn test_resolve() {
        let resolver = GeocodeResolver::new(Arc::new(FixedGeocoder));
        let credential = credential();

        let found = resolver.resolve(&credential, "Pune").await.unwrap();
        assert!(matches!(found.outcome, GeocodeOutcome::Found(ref r) if r.display_name == "Pune, Maharashtra"));

        let missing = resolver.resolve(&credential, "Atlantis").await.unwrap();
        assert_eq!(missing.outcome, GeocodeOutcome::NotFound);
        assert!(resolver.is_latest(missing.seq));

        assert!(matches!(
            resolver.resolve(&credential, "offline").await,
            Err(GeocodeError::Network(_))
        ));
        assert_eq!(
            resolver.resolve(&credential, "").await,
            Err(GeocodeError::InvalidQuery)
        );
    }
}
