//! Location event bridge
//!
//! Turns map clicks and resolved searches into one `LocationSelected`
//! event for the host, places the matching markers and raises the
//! user-visible notifications. User-input failures stop here: nothing
//! raised by a click or a search propagates to the host as an error.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::UserClickPolicy;
use crate::events::events::{LocationSelected, Notification, NotificationLevel};
use crate::geo::Coordinate;
use crate::geocode::{
    GeocodeError, GeocodeOutcome, GeocodeResolver, GeocodeResult, Geocoder, PendingLookup,
};
use crate::marker::{Marker, MarkerCategory, MarkerId};
use crate::registry::RegistryError;
use crate::session::SessionHandle;

/// What became of a submitted search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Viewport moved and a marker placed
    Applied(MarkerId),
    /// The service had no match
    NotFound,
    /// The lookup failed
    Failed,
    /// A newer search was issued before this one resolved
    Superseded,
    /// The session went away before the result arrived
    Cancelled,
    /// Empty query or no active session; no request was made
    Ignored,
}

/// Normalizes clicks and search results into host events
pub struct LocationEventBridge {
    session: SessionHandle,
    resolver: GeocodeResolver,
}

impl LocationEventBridge {
    pub fn new(session: SessionHandle, geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            session,
            resolver: GeocodeResolver::new(geocoder),
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn resolver(&self) -> &GeocodeResolver {
        &self.resolver
    }

    fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.session.events().publish(Notification::new(level, message));
    }

    fn select(&self, coordinate: Coordinate, name: Option<String>) {
        self.session
            .events()
            .publish(LocationSelected { coordinate, name });
    }

    /// Place a marker; `None` when the session closed underneath us
    fn place(&self, marker: Marker) -> Option<MarkerId> {
        match self.session.add_marker(marker) {
            Ok(id) => Some(id),
            Err(RegistryError::SessionNotActive) => {
                debug!("Session closed before the marker could be placed");
                None
            }
            Err(e) => {
                error!("Marker bookkeeping fault: {}", e);
                debug_assert!(false, "marker bookkeeping fault: {}", e);
                None
            }
        }
    }

    /// Handle a click on the map
    pub fn on_map_clicked(&self, coordinate: Coordinate) -> Option<MarkerId> {
        if !self.session.is_active() {
            debug!("Ignoring click at {} on an inactive session", coordinate);
            return None;
        }

        if self.session.config().user_clicks == UserClickPolicy::ReplacePrevious {
            let replaced = self.session.remove_category(MarkerCategory::UserClick);
            if replaced > 0 {
                debug!("Replaced {} earlier click marker(s)", replaced);
            }
        }

        let id = self.place(Marker::user_click(coordinate))?;
        self.select(coordinate, None);
        self.notify(
            NotificationLevel::Success,
            format!("Location selected: {}", coordinate),
        );
        Some(id)
    }

    /// Validate and number a search; `None` if nothing should be requested
    pub fn begin_search(&self, raw: &str) -> Option<PendingLookup> {
        if !self.session.is_active() {
            debug!("Ignoring search while the map session is {}", self.session.state());
            return None;
        }

        match self.resolver.issue(raw) {
            Ok(pending) => Some(pending),
            Err(GeocodeError::InvalidQuery) => None,
            Err(e) => {
                warn!("Could not issue search: {}", e);
                None
            }
        }
    }

    /// Apply the answer to an issued search, unless it went stale
    pub fn on_search_resolved(
        &self,
        pending: &PendingLookup,
        result: Result<GeocodeOutcome, GeocodeError>,
    ) -> SearchOutcome {
        if !self.resolver.is_latest(pending.seq()) {
            debug!(
                "Discarding result of superseded search #{} '{}'",
                pending.seq(),
                pending.query()
            );
            return SearchOutcome::Superseded;
        }
        if !self.session.is_active() {
            debug!("Discarding result of search '{}' after teardown", pending.query());
            return SearchOutcome::Cancelled;
        }

        match result {
            Ok(GeocodeOutcome::Found(found)) => self.apply_result(found),
            Ok(GeocodeOutcome::NotFound) => {
                info!("No match for '{}'", pending.query());
                self.notify(NotificationLevel::Info, "Location not found");
                SearchOutcome::NotFound
            }
            Err(e) => {
                warn!("Search for '{}' failed: {}", pending.query(), e);
                self.notify(NotificationLevel::Error, "Search failed");
                SearchOutcome::Failed
            }
        }
    }

    fn apply_result(&self, found: GeocodeResult) -> SearchOutcome {
        let config = self.session.config();
        self.session
            .set_viewport(found.coordinate, config.search_zoom, config.fly_duration);

        let marker = Marker::search_result(found.coordinate, found.display_name.clone());
        let Some(id) = self.place(marker) else {
            return SearchOutcome::Cancelled;
        };

        info!("Found '{}' at {}", found.display_name, found.coordinate);
        self.notify(
            NotificationLevel::Success,
            format!("Found: {}", found.display_name),
        );
        self.select(found.coordinate, Some(found.display_name));
        SearchOutcome::Applied(id)
    }

    /// Resolve a query and apply the result if it is still current
    pub async fn search(&self, raw: &str) -> SearchOutcome {
        let Some(pending) = self.begin_search(raw) else {
            return SearchOutcome::Ignored;
        };
        let result = self
            .resolver
            .lookup(self.session.credential(), &pending)
            .await;
        self.on_search_resolved(&pending, result)
    }

    /// Tear down the session; pending searches will be discarded
    pub fn dispose(&self) {
        self.session.dispose();
    }
}
