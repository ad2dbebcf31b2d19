//! Core functionality for the groundwater map
//!
//! This crate owns the map session lifecycle, marker bookkeeping, query
//! resolution and the events delivered to the hosting application. Map
//! rendering and the remote geocoding service are reached through the
//! [`MapProvider`] and [`Geocoder`] capabilities.

pub mod bridge;
pub mod config;
pub mod events;
pub mod geo;
pub mod geocode;
pub mod marker;
pub mod provider;
pub mod registry;
pub mod session;

// Re-export commonly used types
pub use bridge::{LocationEventBridge, SearchOutcome};
pub use config::{SeedPoint, SessionConfig, UserClickPolicy};
pub use events::EventBus;
pub use geo::{Coordinate, CoordinateError, Viewport};
pub use geocode::{
    GeocodeError, GeocodeOutcome, GeocodeQuery, GeocodeResolver, GeocodeResult, Geocoder,
    PendingLookup, Resolution,
};
pub use marker::{Marker, MarkerCategory, MarkerId, MarkerStyle, Popup, Severity};
pub use provider::{
    ClickCallback, HeadlessProvider, InstanceOptions, ListenerId, MapProvider, ProviderError,
    ProviderHandle, ProviderMarkerHandle,
};
pub use registry::{MarkerRegistry, RegistryError};
pub use session::{
    Credential, CredentialError, MapSessionManager, SessionError, SessionHandle, SessionId,
    SessionState,
};
