//! Map-provider capability
//!
//! The core never draws anything itself. It drives a provider (Mapbox GL,
//! a native widget, or the [`HeadlessProvider`]) through this trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::geo::{Coordinate, Viewport};
use crate::marker::Marker;

mod headless;

pub use headless::{HeadlessProvider, ProviderOp, RenderedMarker};

/// Handle to one provider map instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderHandle(pub u64);

/// Handle to a marker drawn by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderMarkerHandle(pub u64);

/// Handle to a registered click listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Callback invoked with the clicked coordinate
pub type ClickCallback = Arc<dyn Fn(Coordinate) + Send + Sync>;

/// Errors reported by a provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("unknown map instance {0:?}")]
    UnknownInstance(ProviderHandle),

    #[error("unknown marker {0:?}")]
    UnknownMarker(ProviderMarkerHandle),

    #[error("unknown click listener {0:?}")]
    UnknownListener(ListenerId),

    #[error("provider failure: {0}")]
    Backend(String),
}

/// Parameters for constructing a map instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceOptions {
    /// Host element to render into
    pub container: String,
    /// Style URL
    pub style: String,
    /// Initial center and zoom
    pub viewport: Viewport,
}

/// Rendering capability driven by a map session
#[async_trait]
pub trait MapProvider: Send + Sync {
    /// Construct a map instance, resolving once it reports ready
    async fn create_instance(&self, options: InstanceOptions)
        -> Result<ProviderHandle, ProviderError>;

    /// Draw a marker with its style and popup
    fn add_marker(
        &self,
        instance: ProviderHandle,
        marker: &Marker,
    ) -> Result<ProviderMarkerHandle, ProviderError>;

    /// Remove a previously drawn marker
    fn remove_marker(
        &self,
        instance: ProviderHandle,
        marker: ProviderMarkerHandle,
    ) -> Result<(), ProviderError>;

    /// Animate the camera to a viewport
    fn fly_to(
        &self,
        instance: ProviderHandle,
        viewport: Viewport,
        duration: Duration,
    ) -> Result<(), ProviderError>;

    /// Register a click listener
    fn on_click(
        &self,
        instance: ProviderHandle,
        callback: ClickCallback,
    ) -> Result<ListenerId, ProviderError>;

    /// Unregister a click listener
    fn off_click(&self, instance: ProviderHandle, listener: ListenerId)
        -> Result<(), ProviderError>;

    /// Release the instance and everything drawn on it
    fn destroy(&self, instance: ProviderHandle) -> Result<(), ProviderError>;
}
