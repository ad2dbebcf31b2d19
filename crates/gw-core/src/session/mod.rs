//! Map session lifecycle
//!
//! A session owns one provider instance, its click listener and the marker
//! registry. It is created when a credential is supplied and disposed when
//! the host tears the map down. [`SessionHandle`] is the owning guard:
//! dropping it disposes the session on every exit path.

use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::events::events::SessionStateChanged;
use crate::events::EventBus;
use crate::geo::{Coordinate, Viewport};
use crate::marker::{Marker, MarkerCategory, MarkerId};
use crate::provider::{
    ClickCallback, InstanceOptions, ListenerId, MapProvider, ProviderError, ProviderHandle,
    ProviderMarkerHandle,
};
use crate::registry::{MarkerRegistry, RegistryError};

mod credential;
mod state;

pub use credential::{Credential, CredentialError};
pub use state::SessionState;

/// Session identifier type
pub type SessionId = Uuid;

/// Errors raised while opening a session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("map provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("session was disposed before the map became ready")]
    DisposedDuringInit,
}

/// Creates map sessions and tracks the one currently mounted
pub struct MapSessionManager {
    provider: Arc<dyn MapProvider>,
    events: Arc<EventBus>,
    config: Arc<SessionConfig>,
    current: Mutex<Option<Weak<SessionShared>>>,
}

impl MapSessionManager {
    pub fn new(
        provider: Arc<dyn MapProvider>,
        events: Arc<EventBus>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            provider,
            events,
            config,
            current: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    /// State of the mounted session, `Uninitialized` when there is none
    pub fn state(&self) -> SessionState {
        self.current_session()
            .map(|session| session.state())
            .unwrap_or_default()
    }

    fn current_session(&self) -> Option<Arc<SessionShared>> {
        self.current.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Open a session for a credential
    ///
    /// Resolves once the provider reports the map ready, with the seed
    /// points placed. A live previous session is disposed first.
    pub async fn initialize(&self, credential: &str) -> Result<SessionHandle, SessionError> {
        let credential = Credential::parse(credential)?;

        let previous = self.current.lock().take();
        if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
            info!("Credential changed, disposing map session {}", previous.id);
            previous.dispose();
        }

        let shared = Arc::new(SessionShared::new(
            credential,
            self.provider.clone(),
            self.events.clone(),
            self.config.clone(),
        ));
        *self.current.lock() = Some(Arc::downgrade(&shared));

        // From here on an early return disposes through the handle
        let handle = SessionHandle { shared };
        handle.shared.begin_initializing();

        let options = InstanceOptions {
            container: self.config.container.clone(),
            style: self.config.style.clone(),
            viewport: self.config.default_viewport,
        };
        let instance = match self.provider.create_instance(options).await {
            Ok(instance) => instance,
            Err(e) => {
                warn!("Map provider failed to create an instance: {}", e);
                return Err(e.into());
            }
        };

        handle.shared.activate(instance)?;
        Ok(handle)
    }

    /// Dispose the mounted session, if any
    pub fn dispose_current(&self) {
        let current = self.current.lock().take();
        if let Some(session) = current.and_then(|weak| weak.upgrade()) {
            session.dispose();
        }
    }
}

/// Mutable part of a session
struct SessionInner {
    state: SessionState,
    instance: Option<ProviderHandle>,
    click_listener: Option<ListenerId>,
    viewport: Viewport,
    registry: MarkerRegistry,
    /// Markers the provider has drawn, by registry id
    rendered: IndexMap<MarkerId, ProviderMarkerHandle>,
    click_tx: Option<UnboundedSender<Coordinate>>,
    click_rx: Option<UnboundedReceiver<Coordinate>>,
}

/// State shared between the handle and the manager
struct SessionShared {
    id: SessionId,
    credential: Credential,
    provider: Arc<dyn MapProvider>,
    events: Arc<EventBus>,
    config: Arc<SessionConfig>,
    inner: Mutex<SessionInner>,
}

impl SessionShared {
    fn new(
        credential: Credential,
        provider: Arc<dyn MapProvider>,
        events: Arc<EventBus>,
        config: Arc<SessionConfig>,
    ) -> Self {
        let (click_tx, click_rx) = mpsc::unbounded_channel();
        let inner = SessionInner {
            state: SessionState::Uninitialized,
            instance: None,
            click_listener: None,
            viewport: config.default_viewport,
            registry: MarkerRegistry::new(),
            rendered: IndexMap::new(),
            click_tx: Some(click_tx),
            click_rx: Some(click_rx),
        };

        Self {
            id: Uuid::new_v4(),
            credential,
            provider,
            events,
            config,
            inner: Mutex::new(inner),
        }
    }

    fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    fn publish_transition(&self, from: SessionState, to: SessionState) {
        debug!("Map session {}: {} -> {}", self.id, from, to);
        self.events.publish(SessionStateChanged {
            session_id: self.id,
            from,
            to,
        });
    }

    fn begin_initializing(&self) {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            inner.state = SessionState::Initializing;
            from
        };
        self.publish_transition(from, SessionState::Initializing);
    }

    /// Provider reported ready: wire the listener and seed the registry
    fn activate(&self, instance: ProviderHandle) -> Result<(), SessionError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.state != SessionState::Initializing {
            drop(guard);
            debug!("Map session {} disposed while the map was loading", self.id);
            if let Err(e) = self.provider.destroy(instance) {
                warn!("Failed to release orphaned map instance: {}", e);
            }
            return Err(SessionError::DisposedDuringInit);
        }
        inner.instance = Some(instance);

        // Forwards into the channel only, never re-enters the session
        let click_tx = inner.click_tx.clone();
        let callback: ClickCallback = Arc::new(move |coordinate: Coordinate| {
            if let Some(tx) = &click_tx {
                let _ = tx.send(coordinate);
            }
        });
        match self.provider.on_click(instance, callback) {
            Ok(listener) => inner.click_listener = Some(listener),
            Err(e) => {
                drop(guard);
                error!("Failed to register map click listener: {}", e);
                self.dispose();
                return Err(e.into());
            }
        }

        inner.registry.open();
        for point in &self.config.seed_points {
            if let Err(e) = inner.registry.add(Marker::seed(point)) {
                error!("Failed to seed data point '{}': {}", point.name, e);
                debug_assert!(false, "seeding a fresh registry failed: {}", e);
            }
        }

        let from = inner.state;
        inner.state = SessionState::Active;
        self.reconcile(inner);
        let seeded = inner.registry.len();
        drop(guard);

        info!("Map session {} active with {} data points", self.id, seeded);
        self.publish_transition(from, SessionState::Active);
        Ok(())
    }

    /// Bring the provider's drawn markers in line with the registry
    fn reconcile(&self, inner: &mut SessionInner) {
        let Some(instance) = inner.instance else {
            return;
        };

        let diff = inner.registry.diff(&inner.rendered);
        if diff.is_empty() {
            return;
        }

        for id in &diff.to_remove {
            if let Some(handle) = inner.rendered.shift_remove(id) {
                if let Err(e) = self.provider.remove_marker(instance, handle) {
                    warn!("Provider failed to remove marker {}: {}", id, e);
                }
            }
        }

        for marker in diff.to_add {
            match self.provider.add_marker(instance, marker) {
                Ok(handle) => {
                    inner.rendered.insert(marker.id, handle);
                }
                // Left unrendered, the next reconcile retries it
                Err(e) => warn!("Provider failed to draw marker '{}': {}", marker.label, e),
            }
        }
    }

    fn add_marker(&self, marker: Marker) -> Result<MarkerId, RegistryError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let id = inner.registry.add(marker)?;
        self.reconcile(inner);
        Ok(id)
    }

    fn remove_marker(&self, id: &MarkerId) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let removed = inner.registry.remove(id).is_some();
        if removed {
            self.reconcile(inner);
        }
        removed
    }

    fn remove_category(&self, category: MarkerCategory) -> usize {
        if !category.user_removable() {
            warn!("Refusing to remove {:?} markers", category);
            return 0;
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let ids = inner.registry.ids_in(category);
        for id in &ids {
            inner.registry.remove(id);
        }
        self.reconcile(inner);
        ids.len()
    }

    fn set_viewport(&self, center: Coordinate, zoom: f64, duration: Duration) -> bool {
        let mut inner = self.inner.lock();
        let instance = match (inner.state, inner.instance) {
            (SessionState::Active, Some(instance)) => instance,
            (state, _) => {
                debug!("Ignoring viewport change while session is {}", state);
                return false;
            }
        };

        let viewport = Viewport::new(center, zoom);
        match self.provider.fly_to(instance, viewport, duration) {
            Ok(()) => {
                inner.viewport = viewport;
                true
            }
            Err(e) => {
                warn!("Provider failed to move the viewport: {}", e);
                false
            }
        }
    }

    fn dispose(&self) {
        let (from, instance, listener, cleared) = {
            let mut inner = self.inner.lock();
            if inner.state.is_disposed() {
                return;
            }
            let from = inner.state;
            inner.state = SessionState::Disposed;
            inner.rendered.clear();
            inner.click_tx = None;
            let cleared = inner.registry.close();
            (from, inner.instance.take(), inner.click_listener.take(), cleared)
        };

        // Best effort: the session is disposed whatever the provider says
        if let Some(instance) = instance {
            if let Some(listener) = listener {
                if let Err(e) = self.provider.off_click(instance, listener) {
                    warn!("Failed to remove map click listener: {}", e);
                }
            }
            if let Err(e) = self.provider.destroy(instance) {
                warn!("Failed to destroy map instance: {}", e);
            }
        }

        info!("Disposed map session {} ({} markers cleared)", self.id, cleared);
        self.publish_transition(from, SessionState::Disposed);
    }
}

/// Owning handle to a map session
///
/// Dropping the handle disposes the session.
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn credential(&self) -> &Credential {
        &self.shared.credential
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.shared.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    /// Provider instance backing the session while it is active
    pub fn instance(&self) -> Option<ProviderHandle> {
        self.shared.inner.lock().instance
    }

    pub fn viewport(&self) -> Viewport {
        self.shared.inner.lock().viewport
    }

    /// Animate to a new viewport; a no-op unless the session is active
    pub fn set_viewport(&self, center: Coordinate, zoom: f64, duration: Duration) -> bool {
        self.shared.set_viewport(center, zoom, duration)
    }

    /// Place a marker and draw it
    pub fn add_marker(&self, marker: Marker) -> Result<MarkerId, RegistryError> {
        self.shared.add_marker(marker)
    }

    /// Remove a marker; returns false if it was not registered
    pub fn remove_marker(&self, id: &MarkerId) -> bool {
        self.shared.remove_marker(id)
    }

    /// Remove every marker of a category, returning how many went away
    ///
    /// Seed points stay until the session is disposed.
    pub fn remove_category(&self, category: MarkerCategory) -> usize {
        self.shared.remove_category(category)
    }

    /// Snapshot of the registered markers in insertion order
    pub fn markers(&self) -> Vec<Marker> {
        self.shared.inner.lock().registry.list().cloned().collect()
    }

    pub fn marker_count(&self) -> usize {
        self.shared.inner.lock().registry.len()
    }

    /// Take the stream of map clicks forwarded by the provider listener
    ///
    /// Only the first call gets the receiver. The stream ends once the
    /// session is disposed and the provider has released the listener.
    pub fn take_clicks(&self) -> Option<UnboundedReceiver<Coordinate>> {
        self.shared.inner.lock().click_rx.take()
    }

    /// Tear the session down; later calls are no-ops
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::marker::MarkerStyle;
    use crate::provider::{HeadlessProvider, ProviderOp};

    const TOKEN: &str = "pk.test-token";

    fn setup() -> (Arc<HeadlessProvider>, MapSessionManager) {
        let provider = Arc::new(HeadlessProvider::new());
        let manager = MapSessionManager::new(
            provider.clone(),
            Arc::new(EventBus::new()),
            Arc::new(SessionConfig::default()),
        );
        (provider, manager)
    }

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_seeds_presets() {
        let (provider, manager) = setup();
        let transitions = EventLog::<SessionStateChanged>::attach(manager.events());

        let session = manager.initialize(TOKEN).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(manager.state(), SessionState::Active);

        let markers = session.markers();
        assert_eq!(markers.len(), 5);
        assert!(markers.iter().all(|m| m.category == MarkerCategory::SeedPoint));

        let instance = session.instance().unwrap();
        let rendered = provider.rendered(instance);
        assert_eq!(rendered.len(), 5);
        assert!(matches!(rendered[0].style, MarkerStyle::Dot { .. }));
        assert_eq!(provider.listener_count(instance), 1);

        let reached_active = transitions
            .snapshot()
            .iter()
            .filter(|t| t.to == SessionState::Active)
            .count();
        assert_eq!(reached_active, 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_credential() {
        let (provider, manager) = setup();
        let err = manager.initialize("  ").await.unwrap_err();
        assert_eq!(err, SessionError::Credential(CredentialError::Missing));
        assert!(provider.ops().is_empty());
        assert_eq!(manager.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_dispose_twice() {
        let (provider, manager) = setup();
        let transitions = EventLog::<SessionStateChanged>::attach(manager.events());
        let session = manager.initialize(TOKEN).await.unwrap();
        let instance = session.instance().unwrap();

        session.dispose();
        assert_eq!(session.state(), SessionState::Disposed);
        assert!(session.markers().is_empty());
        assert_eq!(provider.live_instances(), 0);
        let ops_after_first = provider.ops().len();

        session.dispose();
        assert!(session.markers().is_empty());
        assert_eq!(provider.ops().len(), ops_after_first);
        assert_eq!(transitions.len(), 3);

        let ops = provider.ops();
        let tail = &ops[ops.len() - 2..];
        assert!(matches!(tail[0], ProviderOp::OffClick { instance: i, .. } if i == instance));
        assert_eq!(tail[1], ProviderOp::Destroy { instance });
    }

    #[tokio::test]
    async fn test_dispose_swallows_provider_errors() {
        let (provider, manager) = setup();
        let transitions = EventLog::<SessionStateChanged>::attach(manager.events());
        let session = manager.initialize(TOKEN).await.unwrap();

        provider.fail_teardown("renderer lost");
        session.dispose();

        assert_eq!(session.state(), SessionState::Disposed);
        assert!(session.markers().is_empty());
        assert_eq!(session.instance(), None);
        assert_eq!(transitions.len(), 3);

        let ops_after_first = provider.ops().len();
        session.dispose();
        assert_eq!(session.state(), SessionState::Disposed);
        assert_eq!(provider.ops().len(), ops_after_first);
        assert_eq!(transitions.len(), 3);
        assert_eq!(
            session.add_marker(Marker::user_click(coord(1.0, 1.0))),
            Err(RegistryError::SessionNotActive)
        );
    }

    #[tokio::test]
    async fn test_drop_disposes() {
        let (provider, manager) = setup();
        {
            let _session = manager.initialize(TOKEN).await.unwrap();
            assert_eq!(provider.live_instances(), 1);
        }
        assert_eq!(provider.live_instances(), 0);
        assert_eq!(manager.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_markers_rejected_after_dispose() {
        let (_provider, manager) = setup();
        let session = manager.initialize(TOKEN).await.unwrap();
        session.dispose();

        let result = session.add_marker(Marker::user_click(coord(1.0, 1.0)));
        assert_eq!(result, Err(RegistryError::SessionNotActive));
    }

    #[tokio::test]
    async fn test_viewport_only_when_active() {
        let (provider, manager) = setup();
        let session = manager.initialize(TOKEN).await.unwrap();
        let target = coord(26.91, 75.79);

        assert!(session.set_viewport(target, 10.0, Duration::from_secs(2)));
        assert_eq!(session.viewport(), Viewport::new(target, 10.0));
        let instance = session.instance().unwrap();
        assert_eq!(provider.viewport(instance), Some(Viewport::new(target, 10.0)));

        session.dispose();
        assert!(!session.set_viewport(coord(0.0, 0.0), 3.0, Duration::ZERO));
        assert_eq!(provider.fly_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_marker_signals_provider() {
        let (provider, manager) = setup();
        let session = manager.initialize(TOKEN).await.unwrap();
        let instance = session.instance().unwrap();

        let id = session.add_marker(Marker::user_click(coord(5.0, 5.0))).unwrap();
        assert_eq!(provider.rendered(instance).len(), 6);

        assert!(session.remove_marker(&id));
        assert!(!session.remove_marker(&id));
        assert_eq!(provider.rendered(instance).len(), 5);
        assert!(provider.rendered(instance).iter().all(|r| r.marker_id != id));
    }

    #[tokio::test]
    async fn test_remove_category_keeps_seeds() {
        let (provider, manager) = setup();
        let session = manager.initialize(TOKEN).await.unwrap();
        let instance = session.instance().unwrap();
        session.add_marker(Marker::user_click(coord(1.0, 1.0))).unwrap();
        session.add_marker(Marker::user_click(coord(2.0, 2.0))).unwrap();

        assert_eq!(session.remove_category(MarkerCategory::SeedPoint), 0);
        assert_eq!(session.remove_category(MarkerCategory::UserClick), 2);
        assert_eq!(session.marker_count(), 5);
        assert_eq!(provider.rendered(instance).len(), 5);
    }

    #[tokio::test]
    async fn test_failed_draw_is_retried() {
        let (provider, manager) = setup();
        let session = manager.initialize(TOKEN).await.unwrap();
        let instance = session.instance().unwrap();

        provider.set_reject_markers(true);
        let first = session.add_marker(Marker::user_click(coord(1.0, 1.0))).unwrap();
        assert_eq!(session.marker_count(), 6);
        assert_eq!(provider.rendered(instance).len(), 5);

        provider.set_reject_markers(false);
        let second = session.add_marker(Marker::user_click(coord(2.0, 2.0))).unwrap();
        let drawn: Vec<_> = provider.rendered(instance).iter().map(|r| r.marker_id).collect();
        assert!(drawn.contains(&first));
        assert!(drawn.contains(&second));
    }

    #[tokio::test]
    async fn test_provider_failure() {
        let (provider, manager) = setup();
        provider.fail_next_create("style not found");

        let err = manager.initialize(TOKEN).await.unwrap_err();
        assert!(matches!(err, SessionError::Provider(ProviderError::Backend(_))));
        assert_eq!(manager.state(), SessionState::Uninitialized);
        assert_eq!(provider.live_instances(), 0);
    }

    #[tokio::test]
    async fn test_disposed_while_loading() {
        let (provider, manager) = setup();
        let gate = provider.gate_readiness();

        let (result, ()) = tokio::join!(manager.initialize(TOKEN), async {
            tokio::task::yield_now().await;
            assert_eq!(manager.state(), SessionState::Initializing);
            manager.dispose_current();
            gate.notify_one();
        });

        assert_eq!(result.unwrap_err(), SessionError::DisposedDuringInit);
        assert_eq!(provider.live_instances(), 0);
    }

    #[tokio::test]
    async fn test_new_credential_replaces_session() {
        let (provider, manager) = setup();
        let first = manager.initialize(TOKEN).await.unwrap();
        let second = manager.initialize("pk.other-token").await.unwrap();

        assert_eq!(first.state(), SessionState::Disposed);
        assert_eq!(second.state(), SessionState::Active);
        assert_eq!(second.credential().as_str(), "pk.other-token");
        assert_eq!(provider.live_instances(), 1);
    }

    #[tokio::test]
    async fn test_clicks_forwarded() {
        let (provider, manager) = setup();
        let session = manager.initialize(TOKEN).await.unwrap();
        let mut clicks = session.take_clicks().unwrap();
        assert!(session.take_clicks().is_none());

        provider.simulate_click(coord(12.0, 77.0));
        assert_eq!(clicks.recv().await, Some(coord(12.0, 77.0)));

        session.dispose();
        assert_eq!(clicks.recv().await, None);
    }
}
