//! Recording fake engine for tests.
//!
//! Every capability call is appended to one shared [`Call`] log so tests can
//! assert the exact sequence, including calls made on markers and popups.
//! Asynchronous completions (the engine's `load`/`error` events, image loads)
//! only happen when the test triggers them, in whatever order it chooses.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::{LngLat, Quad};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::error::{EngineFailure, PlatformEvent};
use crate::event::{Evented, Listener, MapEvent};
use crate::map::{
    Control, ControlHandle, CoordinateSource, DataSource, EngineFactory, EngineHandle,
    ImageCallback, MapEngine, Marker, MarkerHandle, Popup, PopupHandle, Source, SourceHandle,
    VectorImageCallback,
};
use crate::options::{
    AccessToken, ControlPosition, ImageData, ImageOptions, ImageSize, LayerSpec, MapOptions,
    MarkerOptions, PopupOptions, SourceOptions,
};

/// Installs a `tracing` subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Operations recorded on markers and popups.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectOp {
    SetLngLat(LngLat),
    SetContent(String),
    AddTo,
    Remove,
    /// `true` when a popup was attached, `false` when detached.
    SetPopup(bool),
    On {
        event: String,
        target: Option<String>,
    },
    Off {
        event: String,
        target: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    On {
        event: String,
        target: Option<String>,
    },
    Off {
        event: String,
        target: Option<String>,
    },
    Remove,
    AddSource {
        id: String,
        options: SourceOptions,
    },
    RemoveSource {
        id: String,
    },
    SetData {
        source: String,
        data: Value,
    },
    SetCoordinates {
        source: String,
        coordinates: Quad,
    },
    AddLayer {
        layer: LayerSpec,
        before: Option<String>,
    },
    RemoveLayer {
        id: String,
    },
    SetLayoutProperty {
        layer: String,
        name: String,
        value: Value,
    },
    SetPaintProperty {
        layer: String,
        name: String,
        value: Value,
    },
    SetFilter {
        layer: String,
        filter: Option<Value>,
    },
    SetLayerZoomRange {
        layer: String,
        min_zoom: f64,
        max_zoom: f64,
    },
    LoadImage {
        url: String,
    },
    LoadVectorImage {
        url: String,
        size: ImageSize,
    },
    AddImage {
        name: String,
        options: ImageOptions,
    },
    RemoveImage {
        name: String,
    },
    AddControl {
        kind: String,
        position: Option<ControlPosition>,
    },
    RemoveControl {
        kind: String,
    },
    CreateMarker {
        marker: usize,
        options: MarkerOptions,
    },
    CreatePopup {
        popup: usize,
        options: PopupOptions,
    },
    Marker {
        marker: usize,
        op: ObjectOp,
    },
    Popup {
        popup: usize,
        op: ObjectOp,
    },
    Invoke {
        method: String,
        args: Vec<Value>,
    },
}

type CallLog = Rc<RefCell<Vec<Call>>>;

struct Subscription {
    event: String,
    target: Option<String>,
    listener: Listener,
}

#[derive(Default)]
struct Subscriptions(RefCell<Vec<Subscription>>);

impl Subscriptions {
    fn add(&self, event: &str, target: Option<&str>, listener: &Listener) {
        self.0.borrow_mut().push(Subscription {
            event: event.to_string(),
            target: target.map(str::to_string),
            listener: listener.clone(),
        });
    }

    fn remove(&self, event: &str, target: Option<&str>, listener: &Listener) {
        self.0.borrow_mut().retain(|s| {
            !(s.event == event && s.target.as_deref() == target && s.listener.same(listener))
        });
    }

    fn matching(&self, event: &str, target: Option<&str>) -> Vec<Listener> {
        self.0
            .borrow()
            .iter()
            .filter(|s| s.event == event && s.target.as_deref() == target)
            .map(|s| s.listener.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.0.borrow().len()
    }

    fn fire(&self, event: &MapEvent) {
        // Listeners may unsubscribe while being called.
        for listener in self.matching(&event.kind, event.target.as_deref()) {
            listener.call(event);
        }
    }
}

enum LoadDone {
    Raster(ImageCallback),
    Vector(VectorImageCallback),
}

struct PendingLoad {
    url: String,
    done: LoadDone,
}

/// A 1x1 transparent pixel.
pub fn sample_image() -> ImageData {
    ImageData::new(1, 1, vec![0, 0, 0, 0])
}

pub struct RecordingSource {
    id: String,
    kind: String,
    log: CallLog,
}

impl Source for RecordingSource {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn as_data_source(&self) -> Option<&dyn DataSource> {
        (self.kind == "geojson").then_some(self as &dyn DataSource)
    }

    fn as_coordinate_source(&self) -> Option<&dyn CoordinateSource> {
        matches!(self.kind.as_str(), "image" | "video" | "canvas")
            .then_some(self as &dyn CoordinateSource)
    }
}

impl DataSource for RecordingSource {
    fn set_data(&self, data: &Value) {
        self.log.borrow_mut().push(Call::SetData {
            source: self.id.clone(),
            data: data.clone(),
        });
    }
}

impl CoordinateSource for RecordingSource {
    fn set_coordinates(&self, coordinates: &Quad) {
        self.log.borrow_mut().push(Call::SetCoordinates {
            source: self.id.clone(),
            coordinates: *coordinates,
        });
    }
}

pub struct RecordingMarker {
    index: usize,
    log: CallLog,
    subs: Subscriptions,
    popup: RefCell<Option<PopupHandle>>,
    lng_lat: Cell<Option<LngLat>>,
    added: Cell<bool>,
}

impl RecordingMarker {
    fn record(&self, op: ObjectOp) {
        self.log.borrow_mut().push(Call::Marker {
            marker: self.index,
            op,
        });
    }

    pub fn lng_lat(&self) -> Option<LngLat> {
        self.lng_lat.get()
    }

    pub fn is_added(&self) -> bool {
        self.added.get()
    }

    pub fn has_popup(&self) -> bool {
        self.popup.borrow().is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.subs.len()
    }

    pub fn fire(&self, event: &MapEvent) {
        self.subs.fire(event);
    }
}

impl Evented for RecordingMarker {
    fn on(&self, event: &str, target: Option<&str>, listener: &Listener) {
        self.record(ObjectOp::On {
            event: event.to_string(),
            target: target.map(str::to_string),
        });
        self.subs.add(event, target, listener);
    }

    fn off(&self, event: &str, target: Option<&str>, listener: &Listener) {
        self.record(ObjectOp::Off {
            event: event.to_string(),
            target: target.map(str::to_string),
        });
        self.subs.remove(event, target, listener);
    }
}

impl Marker for RecordingMarker {
    fn set_lng_lat(&self, lng_lat: LngLat) {
        self.record(ObjectOp::SetLngLat(lng_lat));
        self.lng_lat.set(Some(lng_lat));
    }

    fn add_to(&self, _map: &EngineHandle) {
        self.record(ObjectOp::AddTo);
        self.added.set(true);
    }

    fn remove(&self) {
        self.record(ObjectOp::Remove);
        self.added.set(false);
    }

    fn popup(&self) -> Option<PopupHandle> {
        self.popup.borrow().clone()
    }

    fn set_popup(&self, popup: Option<PopupHandle>) {
        self.record(ObjectOp::SetPopup(popup.is_some()));
        *self.popup.borrow_mut() = popup;
    }
}

pub struct RecordingPopup {
    index: usize,
    log: CallLog,
    subs: Subscriptions,
    open: Cell<bool>,
    lng_lat: Cell<Option<LngLat>>,
    content: RefCell<Option<String>>,
}

impl RecordingPopup {
    fn record(&self, op: ObjectOp) {
        self.log.borrow_mut().push(Call::Popup {
            popup: self.index,
            op,
        });
    }

    pub fn lng_lat(&self) -> Option<LngLat> {
        self.lng_lat.get()
    }

    pub fn content(&self) -> Option<String> {
        self.content.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.subs.len()
    }

    /// Closes the popup the way a user click would, firing `close`.
    pub fn close(&self) {
        self.open.set(false);
        self.subs.fire(&MapEvent::new("close"));
    }

    pub fn fire(&self, event: &MapEvent) {
        self.subs.fire(event);
    }
}

impl Evented for RecordingPopup {
    fn on(&self, event: &str, target: Option<&str>, listener: &Listener) {
        self.record(ObjectOp::On {
            event: event.to_string(),
            target: target.map(str::to_string),
        });
        self.subs.add(event, target, listener);
    }

    fn off(&self, event: &str, target: Option<&str>, listener: &Listener) {
        self.record(ObjectOp::Off {
            event: event.to_string(),
            target: target.map(str::to_string),
        });
        self.subs.remove(event, target, listener);
    }
}

impl Popup for RecordingPopup {
    fn set_lng_lat(&self, lng_lat: LngLat) {
        self.record(ObjectOp::SetLngLat(lng_lat));
        self.lng_lat.set(Some(lng_lat));
    }

    fn set_content(&self, content: &str) {
        self.record(ObjectOp::SetContent(content.to_string()));
        *self.content.borrow_mut() = Some(content.to_string());
    }

    fn add_to(&self, _map: &EngineHandle) {
        self.record(ObjectOp::AddTo);
        self.open.set(true);
    }

    fn remove(&self) {
        self.record(ObjectOp::Remove);
        self.open.set(false);
    }

    fn is_open(&self) -> bool {
        self.open.get()
    }
}

/// Control with nothing but a name.
pub struct TestControl {
    kind: String,
}

impl TestControl {
    pub fn handle(kind: impl Into<String>) -> ControlHandle {
        Rc::new(TestControl { kind: kind.into() })
    }
}

impl Control for TestControl {
    fn kind(&self) -> &str {
        &self.kind
    }
}

pub struct RecordingEngine {
    pub options: MapOptions,
    log: CallLog,
    subs: Subscriptions,
    sources: RefCell<BTreeMap<String, Rc<RecordingSource>>>,
    layers: RefCell<Vec<LayerSpec>>,
    images: RefCell<BTreeMap<String, ImageData>>,
    controls: RefCell<Vec<ControlHandle>>,
    markers: RefCell<Vec<Rc<RecordingMarker>>>,
    popups: RefCell<Vec<Rc<RecordingPopup>>>,
    loads: RefCell<Vec<PendingLoad>>,
    invoke_results: RefCell<BTreeMap<String, Value>>,
    violations: RefCell<Vec<String>>,
    removed: Cell<bool>,
}

impl RecordingEngine {
    pub fn new(options: MapOptions) -> Rc<Self> {
        Rc::new(Self {
            options,
            log: Rc::new(RefCell::new(Vec::new())),
            subs: Subscriptions::default(),
            sources: RefCell::new(BTreeMap::new()),
            layers: RefCell::new(Vec::new()),
            images: RefCell::new(BTreeMap::new()),
            controls: RefCell::new(Vec::new()),
            markers: RefCell::new(Vec::new()),
            popups: RefCell::new(Vec::new()),
            loads: RefCell::new(Vec::new()),
            invoke_results: RefCell::new(BTreeMap::new()),
            violations: RefCell::new(Vec::new()),
            removed: Cell::new(false),
        })
    }

    /// Coerces to the handle type bindings consume.
    pub fn handle(self: &Rc<Self>) -> EngineHandle {
        Rc::clone(self) as EngineHandle
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }

    fn violation(&self, message: String) {
        tracing::warn!(%message, "engine contract violation");
        self.violations.borrow_mut().push(message);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.log.borrow_mut().clear();
    }

    /// Ordering mistakes the real engine would reject (layer without source,
    /// source removed while in use, calls after removal).
    pub fn violations(&self) -> Vec<String> {
        self.violations.borrow().clone()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.get()
    }

    pub fn has_source(&self, id: &str) -> bool {
        self.sources.borrow().contains_key(id)
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layers
            .borrow()
            .iter()
            .filter_map(|l| l.id.clone())
            .collect()
    }

    pub fn image_names(&self) -> Vec<String> {
        self.images.borrow().keys().cloned().collect()
    }

    pub fn control_count(&self) -> usize {
        self.controls.borrow().len()
    }

    pub fn listener_count(&self) -> usize {
        self.subs.len()
    }

    pub fn marker(&self, index: usize) -> Option<Rc<RecordingMarker>> {
        self.markers.borrow().get(index).cloned()
    }

    pub fn popup(&self, index: usize) -> Option<Rc<RecordingPopup>> {
        self.popups.borrow().get(index).cloned()
    }

    pub fn set_invoke_result(&self, method: &str, value: Value) {
        self.invoke_results
            .borrow_mut()
            .insert(method.to_string(), value);
    }

    pub fn fire(&self, event: &MapEvent) {
        self.subs.fire(event);
    }

    pub fn emit_load(&self) {
        self.fire(&MapEvent::new("load"));
    }

    pub fn emit_error(&self, message: &str) {
        self.fire(&MapEvent::error(EngineFailure::new(message)));
    }

    /// Urls of image loads that have not completed yet, oldest first.
    pub fn pending_loads(&self) -> Vec<String> {
        self.loads.borrow().iter().map(|l| l.url.clone()).collect()
    }

    fn take_load(&self, url: &str) -> Option<PendingLoad> {
        let mut loads = self.loads.borrow_mut();
        let idx = loads.iter().position(|l| l.url == url)?;
        Some(loads.remove(idx))
    }

    /// Completes the oldest pending load of `url` with [`sample_image`].
    pub fn complete_load(&self, url: &str) -> bool {
        let Some(load) = self.take_load(url) else {
            return false;
        };
        match load.done {
            LoadDone::Raster(done) => done(Ok(sample_image())),
            LoadDone::Vector(done) => done(Ok(sample_image())),
        }
        true
    }

    /// Fails the oldest pending load of `url`.
    pub fn fail_load(&self, url: &str, message: &str) -> bool {
        let Some(load) = self.take_load(url) else {
            return false;
        };
        match load.done {
            LoadDone::Raster(done) => done(Err(EngineFailure::new(message))),
            LoadDone::Vector(done) => done(Err(PlatformEvent::new("error", message))),
        }
        true
    }

    fn check_alive(&self, what: &str) {
        if self.removed.get() {
            self.violation(format!("{what} called after remove"));
        }
    }
}

impl Evented for RecordingEngine {
    fn on(&self, event: &str, target: Option<&str>, listener: &Listener) {
        self.record(Call::On {
            event: event.to_string(),
            target: target.map(str::to_string),
        });
        self.subs.add(event, target, listener);
    }

    fn off(&self, event: &str, target: Option<&str>, listener: &Listener) {
        self.record(Call::Off {
            event: event.to_string(),
            target: target.map(str::to_string),
        });
        self.subs.remove(event, target, listener);
    }
}

impl MapEngine for RecordingEngine {
    fn remove(&self) {
        if self.removed.replace(true) {
            self.violation("remove called twice".to_string());
        }
        self.record(Call::Remove);
    }

    fn add_source(&self, id: &str, options: &SourceOptions) -> Result<(), EngineFailure> {
        self.check_alive("add_source");
        self.record(Call::AddSource {
            id: id.to_string(),
            options: options.clone(),
        });
        let mut sources = self.sources.borrow_mut();
        if sources.contains_key(id) {
            return Err(EngineFailure::new(format!(
                "there is already a source with id {id}"
            )));
        }
        sources.insert(
            id.to_string(),
            Rc::new(RecordingSource {
                id: id.to_string(),
                kind: options.kind.clone(),
                log: Rc::clone(&self.log),
            }),
        );
        Ok(())
    }

    fn get_source(&self, id: &str) -> Option<SourceHandle> {
        self.sources
            .borrow()
            .get(id)
            .map(|s| Rc::clone(s) as SourceHandle)
    }

    fn remove_source(&self, id: &str) {
        self.check_alive("remove_source");
        self.record(Call::RemoveSource { id: id.to_string() });
        let users: Vec<String> = self
            .layers
            .borrow()
            .iter()
            .filter(|l| l.source.as_deref() == Some(id))
            .filter_map(|l| l.id.clone())
            .collect();
        if !users.is_empty() {
            self.violation(format!("source {id} removed while used by {users:?}"));
        }
        if self.sources.borrow_mut().remove(id).is_none() {
            self.violation(format!("source {id} does not exist"));
        }
    }

    fn add_layer(&self, layer: &LayerSpec, before: Option<&str>) -> Result<(), EngineFailure> {
        self.check_alive("add_layer");
        self.record(Call::AddLayer {
            layer: layer.clone(),
            before: before.map(str::to_string),
        });
        if let Some(source) = layer.source.as_deref() {
            if !self.has_source(source) {
                return Err(EngineFailure::new(format!(
                    "source {source} does not exist"
                )));
            }
        }
        let mut layers = self.layers.borrow_mut();
        let at = before
            .and_then(|b| layers.iter().position(|l| l.id.as_deref() == Some(b)))
            .unwrap_or(layers.len());
        layers.insert(at, layer.clone());
        Ok(())
    }

    fn remove_layer(&self, id: &str) {
        self.check_alive("remove_layer");
        self.record(Call::RemoveLayer { id: id.to_string() });
        self.layers
            .borrow_mut()
            .retain(|l| l.id.as_deref() != Some(id));
    }

    fn set_layout_property(&self, layer: &str, name: &str, value: &Value) {
        self.record(Call::SetLayoutProperty {
            layer: layer.to_string(),
            name: name.to_string(),
            value: value.clone(),
        });
    }

    fn set_paint_property(&self, layer: &str, name: &str, value: &Value) {
        self.record(Call::SetPaintProperty {
            layer: layer.to_string(),
            name: name.to_string(),
            value: value.clone(),
        });
    }

    fn set_filter(&self, layer: &str, filter: Option<&Value>) {
        self.record(Call::SetFilter {
            layer: layer.to_string(),
            filter: filter.cloned(),
        });
    }

    fn set_layer_zoom_range(&self, layer: &str, min_zoom: f64, max_zoom: f64) {
        self.record(Call::SetLayerZoomRange {
            layer: layer.to_string(),
            min_zoom,
            max_zoom,
        });
    }

    fn add_image(
        &self,
        name: &str,
        image: ImageData,
        options: &ImageOptions,
    ) -> Result<(), EngineFailure> {
        self.check_alive("add_image");
        self.record(Call::AddImage {
            name: name.to_string(),
            options: options.clone(),
        });
        let mut images = self.images.borrow_mut();
        if images.contains_key(name) {
            return Err(EngineFailure::new(format!(
                "an image named {name} already exists"
            )));
        }
        images.insert(name.to_string(), image);
        Ok(())
    }

    fn remove_image(&self, name: &str) {
        self.record(Call::RemoveImage {
            name: name.to_string(),
        });
        self.images.borrow_mut().remove(name);
    }

    fn has_image(&self, name: &str) -> bool {
        self.images.borrow().contains_key(name)
    }

    fn load_image(&self, url: &str, done: ImageCallback) {
        self.record(Call::LoadImage {
            url: url.to_string(),
        });
        self.loads.borrow_mut().push(PendingLoad {
            url: url.to_string(),
            done: LoadDone::Raster(done),
        });
    }

    fn load_vector_image(&self, url: &str, size: ImageSize, done: VectorImageCallback) {
        self.record(Call::LoadVectorImage {
            url: url.to_string(),
            size,
        });
        self.loads.borrow_mut().push(PendingLoad {
            url: url.to_string(),
            done: LoadDone::Vector(done),
        });
    }

    fn add_control(&self, control: ControlHandle, position: Option<ControlPosition>) {
        self.record(Call::AddControl {
            kind: control.kind().to_string(),
            position,
        });
        self.controls.borrow_mut().push(control);
    }

    fn remove_control(&self, control: &ControlHandle) {
        self.record(Call::RemoveControl {
            kind: control.kind().to_string(),
        });
        self.controls
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(c, control));
    }

    fn create_marker(&self, options: &MarkerOptions) -> MarkerHandle {
        let mut markers = self.markers.borrow_mut();
        let index = markers.len();
        self.record(Call::CreateMarker {
            marker: index,
            options: options.clone(),
        });
        let marker = Rc::new(RecordingMarker {
            index,
            log: Rc::clone(&self.log),
            subs: Subscriptions::default(),
            popup: RefCell::new(None),
            lng_lat: Cell::new(None),
            added: Cell::new(false),
        });
        markers.push(Rc::clone(&marker));
        marker
    }

    fn create_popup(&self, options: &PopupOptions) -> PopupHandle {
        let mut popups = self.popups.borrow_mut();
        let index = popups.len();
        self.record(Call::CreatePopup {
            popup: index,
            options: options.clone(),
        });
        let popup = Rc::new(RecordingPopup {
            index,
            log: Rc::clone(&self.log),
            subs: Subscriptions::default(),
            open: Cell::new(false),
            lng_lat: Cell::new(None),
            content: RefCell::new(None),
        });
        popups.push(Rc::clone(&popup));
        popup
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, EngineFailure> {
        self.record(Call::Invoke {
            method: method.to_string(),
            args: args.to_vec(),
        });
        self.invoke_results
            .borrow()
            .get(method)
            .cloned()
            .ok_or_else(|| EngineFailure::new(format!("{method} is not a map method")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FactoryCall {
    ConfigureCredential(String),
    IsSupported,
    Create,
}

/// Factory producing [`RecordingEngine`]s.
pub struct RecordingFactory {
    supported: Cell<bool>,
    log: RefCell<Vec<FactoryCall>>,
    engines: RefCell<Vec<Rc<RecordingEngine>>>,
}

impl Default for RecordingFactory {
    fn default() -> Self {
        Self {
            supported: Cell::new(true),
            log: RefCell::new(Vec::new()),
            engines: RefCell::new(Vec::new()),
        }
    }
}

impl RecordingFactory {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn unsupported() -> Rc<Self> {
        let factory = Self::default();
        factory.supported.set(false);
        Rc::new(factory)
    }

    pub fn calls(&self) -> Vec<FactoryCall> {
        self.log.borrow().clone()
    }

    pub fn created(&self) -> usize {
        self.engines.borrow().len()
    }

    pub fn last_engine(&self) -> Option<Rc<RecordingEngine>> {
        self.engines.borrow().last().cloned()
    }
}

impl EngineFactory for RecordingFactory {
    fn configure_credential(&self, token: &AccessToken) {
        self.log
            .borrow_mut()
            .push(FactoryCall::ConfigureCredential(token.as_str().to_string()));
    }

    fn is_supported(&self) -> bool {
        self.log.borrow_mut().push(FactoryCall::IsSupported);
        self.supported.get()
    }

    fn create(&self, options: &MapOptions) -> Result<EngineHandle, EngineFailure> {
        self.log.borrow_mut().push(FactoryCall::Create);
        let engine = RecordingEngine::new(options.clone());
        self.engines.borrow_mut().push(Rc::clone(&engine));
        Ok(engine as EngineHandle)
    }
}
