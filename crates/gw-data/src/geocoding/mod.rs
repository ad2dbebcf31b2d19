//! Geocoding service backends

pub mod mapbox;

pub use mapbox::MapboxGeocoder;
