use std::fmt;
use std::rc::Rc;

use foundation::LngLat;
use serde_json::Value;

use crate::error::EngineFailure;
use crate::map::{EngineHandle, MarkerHandle, PopupHandle};

/// Payload delivered to event listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent {
    pub kind: String,
    /// Layer id for layer-targeted events.
    pub target: Option<String>,
    pub lng_lat: Option<LngLat>,
    pub error: Option<EngineFailure>,
    pub data: Value,
}

impl MapEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            lng_lat: None,
            error: None,
            data: Value::Null,
        }
    }

    pub fn error(failure: EngineFailure) -> Self {
        Self {
            error: Some(failure),
            ..Self::new("error")
        }
    }

    pub fn on_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn at(mut self, lng_lat: LngLat) -> Self {
        self.lng_lat = Some(lng_lat);
        self
    }
}

/// Event callback with a stable identity.
///
/// Engines key `off` by `(event, target, listener)`; two `Listener`s are the
/// same registration only if they are clones of one another.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&MapEvent)>);

impl Listener {
    pub fn new(f: impl Fn(&MapEvent) + 'static) -> Self {
        Listener(Rc::new(f))
    }

    pub fn call(&self, event: &MapEvent) {
        (self.0)(event)
    }

    pub fn same(&self, other: &Listener) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Rc::as_ptr(&self.0))
    }
}

/// Objects that accept event subscriptions.
pub trait Evented {
    /// Subscribes `listener`. `target` narrows map events to one layer.
    fn on(&self, event: &str, target: Option<&str>, listener: &Listener);

    /// Unsubscribes; must be called with the exact arguments used for `on`.
    fn off(&self, event: &str, target: Option<&str>, listener: &Listener);
}

/// The three kinds of object an event binding can subscribe to.
#[derive(Clone)]
pub enum EventSource {
    Map(EngineHandle),
    Popup(PopupHandle),
    Marker(MarkerHandle),
}

impl EventSource {
    pub fn on(&self, event: &str, target: Option<&str>, listener: &Listener) {
        match self {
            EventSource::Map(map) => map.on(event, target, listener),
            EventSource::Popup(popup) => popup.on(event, target, listener),
            EventSource::Marker(marker) => marker.on(event, target, listener),
        }
    }

    pub fn off(&self, event: &str, target: Option<&str>, listener: &Listener) {
        match self {
            EventSource::Map(map) => map.off(event, target, listener),
            EventSource::Popup(popup) => popup.off(event, target, listener),
            EventSource::Marker(marker) => marker.off(event, target, listener),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EventSource::Map(_) => "map",
            EventSource::Popup(_) => "popup",
            EventSource::Marker(_) => "marker",
        }
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventSource::{}", self.kind())
    }
}
