//! Adapter Events
//!
//! Fire-and-forget notifications raised by the adapter for observability.
//! Observers subscribe per [`EventKind`]; emitting with no observers is a no-op
//! and an observer can never fail the operation that raised the event.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Stop,
    Connect,
    Get,
    Set,
    Drop,
    Error,
}

impl EventKind {
    /// Every event kind, in emission-log order
    pub const ALL: [EventKind; 7] = [
        EventKind::Start,
        EventKind::Stop,
        EventKind::Get,
        EventKind::Set,
        EventKind::Drop,
        EventKind::Connect,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Connect => "connect",
            EventKind::Get => "get",
            EventKind::Set => "set",
            EventKind::Drop => "drop",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum AdapterEvent {
    /// Adapter started against an endpoint/bucket
    Start(String),
    /// Adapter stopped
    Stop(String),
    /// Bucket connected
    Connect(String),
    /// Read issued for a backend key
    Get(String),
    /// Write issued for a backend key
    Set(String),
    /// Remove issued for a backend key
    Drop(String),
    /// Backend or codec failure
    Error(String),
}

impl AdapterEvent {
    /// Create an Error event from anything displayable
    pub fn error(err: impl fmt::Display) -> Self {
        AdapterEvent::Error(err.to_string())
    }

    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            AdapterEvent::Start(_) => EventKind::Start,
            AdapterEvent::Stop(_) => EventKind::Stop,
            AdapterEvent::Connect(_) => EventKind::Connect,
            AdapterEvent::Get(_) => EventKind::Get,
            AdapterEvent::Set(_) => EventKind::Set,
            AdapterEvent::Drop(_) => EventKind::Drop,
            AdapterEvent::Error(_) => EventKind::Error,
        }
    }

    /// Get the event payload
    pub fn data(&self) -> &str {
        match self {
            AdapterEvent::Start(data)
            | AdapterEvent::Stop(data)
            | AdapterEvent::Connect(data)
            | AdapterEvent::Get(data)
            | AdapterEvent::Set(data)
            | AdapterEvent::Drop(data)
            | AdapterEvent::Error(data) => data,
        }
    }
}

// =============================================================================
// Event Hub
// =============================================================================

/// Callback invoked for a subscribed event
pub type Observer = Arc<dyn Fn(&AdapterEvent) + Send + Sync>;

/// Observer registry
///
/// Clones share the same registry.
#[derive(Clone, Default)]
pub struct EventHub {
    observers: Arc<RwLock<Vec<(EventKind, Observer)>>>,
    log_events: bool,
}

impl EventHub {
    /// Create a hub; `log_events` mirrors every event into the debug log
    pub fn new(log_events: bool) -> Self {
        Self {
            observers: Arc::new(RwLock::new(Vec::new())),
            log_events,
        }
    }

    /// Subscribe to one kind of event
    pub fn on<F>(&self, kind: EventKind, observer: F)
    where
        F: Fn(&AdapterEvent) + Send + Sync + 'static,
    {
        self.observers.write().push((kind, Arc::new(observer)));
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Deliver an event to its observers
    pub fn emit(&self, event: AdapterEvent) {
        let kind = event.kind();
        if self.log_events {
            debug!(event = kind.as_str(), data = %event.data(), "Debug event");
        }

        // Snapshot so observers may subscribe from inside a callback
        let observers: Vec<Observer> = self
            .observers
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in observers {
            observer(&event);
        }
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("observers", &self.observer_count())
            .field("log_events", &self.log_events)
            .finish()
    }
}
