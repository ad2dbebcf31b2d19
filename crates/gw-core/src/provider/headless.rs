//! In-memory provider that records every call
//!
//! Used by the terminal host, where there is no renderer, and by tests.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::{
    ClickCallback, InstanceOptions, ListenerId, MapProvider, ProviderError, ProviderHandle,
    ProviderMarkerHandle,
};
use crate::geo::{Coordinate, Viewport};
use crate::marker::{Marker, MarkerId, MarkerStyle, Popup};

/// A call received by the provider
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOp {
    Create { instance: ProviderHandle },
    AddMarker { instance: ProviderHandle, marker: ProviderMarkerHandle, marker_id: MarkerId },
    RemoveMarker { instance: ProviderHandle, marker: ProviderMarkerHandle },
    FlyTo { instance: ProviderHandle, viewport: Viewport, duration: Duration },
    OnClick { instance: ProviderHandle, listener: ListenerId },
    OffClick { instance: ProviderHandle, listener: ListenerId },
    Destroy { instance: ProviderHandle },
}

/// A marker as the provider drew it
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMarker {
    pub marker_id: MarkerId,
    pub coordinate: Coordinate,
    pub style: MarkerStyle,
    pub popup: Popup,
}

struct Instance {
    viewport: Viewport,
    markers: IndexMap<ProviderMarkerHandle, RenderedMarker>,
    listeners: Vec<(ListenerId, ClickCallback)>,
}

#[derive(Default)]
struct HeadlessState {
    next_id: u64,
    instances: AHashMap<ProviderHandle, Instance>,
    /// Only filled when recording
    ops: Vec<ProviderOp>,
    record_ops: bool,
    flights: usize,
    fail_next_create: Option<String>,
    fail_off_click: Option<String>,
    fail_destroy: Option<String>,
    reject_markers: bool,
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, op: ProviderOp) {
        if self.record_ops {
            self.ops.push(op);
        }
    }

    fn instance_mut(&mut self, handle: ProviderHandle) -> Result<&mut Instance, ProviderError> {
        self.instances
            .get_mut(&handle)
            .ok_or(ProviderError::UnknownInstance(handle))
    }
}

/// Provider without a renderer
pub struct HeadlessProvider {
    state: Mutex<HeadlessState>,
    ready_gate: Mutex<Option<Arc<Notify>>>,
}

impl HeadlessProvider {
    /// Provider that records every call, see [`HeadlessProvider::ops`]
    pub fn new() -> Self {
        Self::with_recording(true)
    }

    /// Provider that keeps no call log, for long-running hosts
    pub fn untraced() -> Self {
        Self::with_recording(false)
    }

    fn with_recording(record_ops: bool) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                record_ops,
                ..HeadlessState::default()
            }),
            ready_gate: Mutex::new(None),
        }
    }

    /// Hold `create_instance` until the returned notify fires
    pub fn gate_readiness(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.ready_gate.lock() = Some(gate.clone());
        gate
    }

    /// Make the next `create_instance` fail
    pub fn fail_next_create(&self, reason: impl Into<String>) {
        self.state.lock().fail_next_create = Some(reason.into());
    }

    /// Make the next `off_click` and the next `destroy` fail
    pub fn fail_teardown(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.lock();
        state.fail_off_click = Some(reason.clone());
        state.fail_destroy = Some(reason);
    }

    /// Refuse to draw markers until switched back
    pub fn set_reject_markers(&self, reject: bool) {
        self.state.lock().reject_markers = reject;
    }

    /// Deliver a click to every listener of every live instance
    ///
    /// Returns the number of listeners invoked.
    pub fn simulate_click(&self, coordinate: Coordinate) -> usize {
        let callbacks: Vec<ClickCallback> = {
            let state = self.state.lock();
            state
                .instances
                .values()
                .flat_map(|instance| instance.listeners.iter().map(|(_, cb)| cb.clone()))
                .collect()
        };

        for callback in &callbacks {
            callback(coordinate);
        }
        callbacks.len()
    }

    /// Calls received so far; empty for an untraced provider
    pub fn ops(&self) -> Vec<ProviderOp> {
        self.state.lock().ops.clone()
    }

    pub fn live_instances(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// Markers drawn on an instance, in drawing order
    pub fn rendered(&self, instance: ProviderHandle) -> Vec<RenderedMarker> {
        self.state
            .lock()
            .instances
            .get(&instance)
            .map(|i| i.markers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn viewport(&self, instance: ProviderHandle) -> Option<Viewport> {
        self.state.lock().instances.get(&instance).map(|i| i.viewport)
    }

    pub fn listener_count(&self, instance: ProviderHandle) -> usize {
        self.state
            .lock()
            .instances
            .get(&instance)
            .map(|i| i.listeners.len())
            .unwrap_or(0)
    }

    /// Number of fly-to animations requested so far
    pub fn fly_count(&self) -> usize {
        self.state.lock().flights
    }
}

impl Default for HeadlessProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MapProvider for HeadlessProvider {
    async fn create_instance(
        &self,
        options: InstanceOptions,
    ) -> Result<ProviderHandle, ProviderError> {
        let gate = self.ready_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next_create.take() {
            return Err(ProviderError::Backend(reason));
        }

        let handle = ProviderHandle(state.next_id());
        debug!(
            "Created headless map {:?} in '{}' with style {}",
            handle, options.container, options.style
        );
        state.instances.insert(
            handle,
            Instance {
                viewport: options.viewport,
                markers: IndexMap::new(),
                listeners: Vec::new(),
            },
        );
        state.record(ProviderOp::Create { instance: handle });
        Ok(handle)
    }

    fn add_marker(
        &self,
        instance: ProviderHandle,
        marker: &Marker,
    ) -> Result<ProviderMarkerHandle, ProviderError> {
        let mut state = self.state.lock();
        if state.reject_markers {
            return Err(ProviderError::Backend("marker layer unavailable".to_string()));
        }

        let handle = ProviderMarkerHandle(state.next_id());
        state.instance_mut(instance)?.markers.insert(
            handle,
            RenderedMarker {
                marker_id: marker.id,
                coordinate: marker.coordinate,
                style: marker.style(),
                popup: marker.popup(),
            },
        );
        state.record(ProviderOp::AddMarker {
            instance,
            marker: handle,
            marker_id: marker.id,
        });
        debug!("Drew marker '{}' at {}", marker.label, marker.coordinate);
        Ok(handle)
    }

    fn remove_marker(
        &self,
        instance: ProviderHandle,
        marker: ProviderMarkerHandle,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state
            .instance_mut(instance)?
            .markers
            .shift_remove(&marker)
            .ok_or(ProviderError::UnknownMarker(marker))?;
        state.record(ProviderOp::RemoveMarker { instance, marker });
        Ok(())
    }

    fn fly_to(
        &self,
        instance: ProviderHandle,
        viewport: Viewport,
        duration: Duration,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.instance_mut(instance)?.viewport = viewport;
        state.flights += 1;
        state.record(ProviderOp::FlyTo {
            instance,
            viewport,
            duration,
        });
        debug!(
            "Flying to {} at zoom {} over {:?}",
            viewport.center, viewport.zoom, duration
        );
        Ok(())
    }

    fn on_click(
        &self,
        instance: ProviderHandle,
        callback: ClickCallback,
    ) -> Result<ListenerId, ProviderError> {
        let mut state = self.state.lock();
        let listener = ListenerId(state.next_id());
        state.instance_mut(instance)?.listeners.push((listener, callback));
        state.record(ProviderOp::OnClick { instance, listener });
        Ok(listener)
    }

    fn off_click(
        &self,
        instance: ProviderHandle,
        listener: ListenerId,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_off_click.take() {
            return Err(ProviderError::Backend(reason));
        }
        let listeners = &mut state.instance_mut(instance)?.listeners;
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != listener);
        if listeners.len() == before {
            return Err(ProviderError::UnknownListener(listener));
        }
        state.record(ProviderOp::OffClick { instance, listener });
        Ok(())
    }

    fn destroy(&self, instance: ProviderHandle) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_destroy.take() {
            return Err(ProviderError::Backend(reason));
        }
        state
            .instances
            .remove(&instance)
            .ok_or(ProviderError::UnknownInstance(instance))?;
        state.record(ProviderOp::Destroy { instance });
        debug!("Destroyed headless map {:?}", instance);
        Ok(())
    }
}
