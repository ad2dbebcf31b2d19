use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

/// Event bus connecting the map core to its host
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<std::any::TypeId, Vec<SharedHandler>>>>,
}

type SharedHandler = Arc<Mutex<Box<dyn EventHandler>>>;

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// Events published by the map core
pub mod events {
    use chrono::{DateTime, Utc};
    use serde::Serialize;

    use super::Event;
    use crate::geo::Coordinate;
    use crate::session::{SessionId, SessionState};

    /// Location payload handed to the host callback
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct SelectedLocation {
        pub lat: f64,
        pub lng: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
    }

    /// The user picked a location, by clicking or by search
    #[derive(Debug, Clone, PartialEq)]
    pub struct LocationSelected {
        pub coordinate: Coordinate,
        pub name: Option<String>,
    }

    impl LocationSelected {
        pub fn location(&self) -> SelectedLocation {
            SelectedLocation {
                lat: self.coordinate.lat(),
                lng: self.coordinate.lng(),
                name: self.name.clone(),
            }
        }
    }

    /// Severity of a transient notification
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum NotificationLevel {
        Success,
        Info,
        Error,
    }

    /// Transient user-visible message (a toast)
    #[derive(Debug, Clone)]
    pub struct Notification {
        pub level: NotificationLevel,
        pub message: String,
        pub issued_at: DateTime<Utc>,
    }

    impl Notification {
        pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
            Self {
                level,
                message: message.into(),
                issued_at: Utc::now(),
            }
        }
    }

    /// A session moved through its lifecycle
    #[derive(Debug, Clone, PartialEq)]
    pub struct SessionStateChanged {
        pub session_id: SessionId,
        pub from: SessionState,
        pub to: SessionState,
    }

    // Implement Event trait for all event types
    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(
        LocationSelected,
        Notification,
        SessionStateChanged
    );
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();
        handlers
            .entry(type_id)
            .or_insert_with(Vec::new)
            .push(Arc::new(Mutex::new(handler)));
    }

    /// Subscribe a closure that receives the concrete event type
    pub fn subscribe_fn<E, F>(&self, mut f: F)
    where
        E: Event,
        F: FnMut(&E) + Send + Sync + 'static,
    {
        self.subscribe::<E>(handler_from_fn(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                f(event);
            }
        }));
    }

    /// Publish an event
    ///
    /// Handlers run synchronously, outside the subscription table lock, so
    /// they may publish or subscribe on the same bus. A handler must not
    /// publish the event type it handles.
    pub fn publish<E: Event>(&self, event: E) {
        let type_id = std::any::TypeId::of::<E>();
        let handlers: Vec<SharedHandler> = match self.handlers.lock().get(&type_id) {
            Some(handlers) => handlers.clone(),
            None => return,
        };

        for handler in &handlers {
            handler.lock().handle(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}

/// Collects every event of one type, for tests and diagnostics
pub struct EventLog<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E: Event + Clone> EventLog<E> {
    /// Attach a new log to the bus
    pub fn attach(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe_fn::<E, _>(move |event: &E| sink.lock().push(event.clone()));
        Self { events }
    }

    pub fn snapshot(&self) -> Vec<E> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::events::{LocationSelected, Notification, NotificationLevel};
    use super::*;
    use crate::geo::Coordinate;

    #[test]
    fn test_typed_dispatch() {
        let bus = EventBus::new();
        let selections = EventLog::<LocationSelected>::attach(&bus);
        let toasts = EventLog::<Notification>::attach(&bus);

        bus.publish(LocationSelected {
            coordinate: Coordinate::new(26.91, 75.79).unwrap(),
            name: Some("Jaipur, Rajasthan".to_string()),
        });

        assert_eq!(selections.len(), 1);
        assert!(toasts.is_empty());

        bus.publish(Notification::new(NotificationLevel::Info, "Location not found"));
        assert_eq!(toasts.snapshot()[0].message, "Location not found");
        assert_eq!(selections.len(), 1);
    }

    #[test]
    fn test_handler_may_publish() {
        let bus = Arc::new(EventBus::new());
        let toasts = EventLog::<Notification>::attach(&bus);

        let inner = bus.clone();
        bus.subscribe_fn::<LocationSelected, _>(move |event: &LocationSelected| {
            inner.publish(Notification::new(
                NotificationLevel::Success,
                format!("Location selected: {}", event.coordinate),
            ));
        });

        bus.publish(LocationSelected {
            coordinate: Coordinate::new(10.0, 10.0).unwrap(),
            name: None,
        });
        assert_eq!(toasts.snapshot()[0].message, "Location selected: 10.0000, 10.0000");
    }

    #[test]
    fn test_host_payload_shape() {
        let click = LocationSelected {
            coordinate: Coordinate::new(12.5, 77.25).unwrap(),
            name: None,
        };
        let json = serde_json::to_value(click.location()).unwrap();
        assert_eq!(json, serde_json::json!({ "lat": 12.5, "lng": 77.25 }));

        let search = LocationSelected {
            name: Some("Jaipur, Rajasthan".to_string()),
            ..click
        };
        let json = serde_json::to_value(search.location()).unwrap();
        assert_eq!(json["name"], "Jaipur, Rajasthan");
    }
}
