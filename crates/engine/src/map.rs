use std::rc::Rc;

use foundation::{LngLat, Quad};
use serde_json::Value;

use crate::error::{EngineFailure, PlatformEvent};
use crate::event::Evented;
use crate::options::{
    AccessToken, ControlPosition, ImageData, ImageOptions, ImageSize, LayerSpec, MapOptions,
    MarkerOptions, PopupOptions, SourceOptions,
};

pub type EngineHandle = Rc<dyn MapEngine>;
pub type SourceHandle = Rc<dyn Source>;
pub type MarkerHandle = Rc<dyn Marker>;
pub type PopupHandle = Rc<dyn Popup>;
pub type ControlHandle = Rc<dyn Control>;

pub type ImageCallback = Box<dyn FnOnce(Result<ImageData, EngineFailure>)>;
pub type VectorImageCallback = Box<dyn FnOnce(Result<ImageData, PlatformEvent>)>;

/// Builds engine instances.
pub trait EngineFactory {
    /// Sets the credential used by every instance built afterwards.
    ///
    /// This is process-wide state shared by all instances: last call wins.
    /// Call it immediately before [`EngineFactory::create`].
    fn configure_credential(&self, token: &AccessToken);

    /// Whether the platform can host an engine at all.
    fn is_supported(&self) -> bool;

    /// Constructs an instance synchronously. The instance later fires exactly
    /// one of `load` or `error`, or neither if it is removed first.
    fn create(&self, options: &MapOptions) -> Result<EngineHandle, EngineFailure>;
}

/// A constructed map engine instance.
pub trait MapEngine: Evented {
    /// Tears the instance down. Further calls are undefined.
    fn remove(&self);

    fn add_source(&self, id: &str, options: &SourceOptions) -> Result<(), EngineFailure>;
    fn get_source(&self, id: &str) -> Option<SourceHandle>;
    fn remove_source(&self, id: &str);

    fn add_layer(&self, layer: &LayerSpec, before: Option<&str>) -> Result<(), EngineFailure>;
    fn remove_layer(&self, id: &str);
    fn set_layout_property(&self, layer: &str, name: &str, value: &Value);
    fn set_paint_property(&self, layer: &str, name: &str, value: &Value);
    fn set_filter(&self, layer: &str, filter: Option<&Value>);
    fn set_layer_zoom_range(&self, layer: &str, min_zoom: f64, max_zoom: f64);

    fn add_image(
        &self,
        name: &str,
        image: ImageData,
        options: &ImageOptions,
    ) -> Result<(), EngineFailure>;
    fn remove_image(&self, name: &str);
    fn has_image(&self, name: &str) -> bool;
    /// Fetches and decodes a raster image; `done` runs later on the same thread.
    fn load_image(&self, url: &str, done: ImageCallback);
    /// Rasterizes a vector image offscreen at `size`.
    fn load_vector_image(&self, url: &str, size: ImageSize, done: VectorImageCallback);

    fn add_control(&self, control: ControlHandle, position: Option<ControlPosition>);
    fn remove_control(&self, control: &ControlHandle);

    fn create_marker(&self, options: &MarkerOptions) -> MarkerHandle;
    fn create_popup(&self, options: &PopupOptions) -> PopupHandle;

    /// Calls an engine method by name, e.g. `flyTo` or `fitBounds`.
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, EngineFailure>;
}

/// A registered source. Capabilities depend on the source type.
pub trait Source {
    fn kind(&self) -> &str;

    fn as_data_source(&self) -> Option<&dyn DataSource> {
        None
    }

    fn as_coordinate_source(&self) -> Option<&dyn CoordinateSource> {
        None
    }
}

/// Sources whose GeoJSON can be replaced in place.
pub trait DataSource {
    fn set_data(&self, data: &Value);
}

/// Image, video and canvas sources that can be re-anchored in place.
pub trait CoordinateSource {
    fn set_coordinates(&self, coordinates: &Quad);
}

pub trait Marker: Evented {
    fn set_lng_lat(&self, lng_lat: LngLat);
    fn add_to(&self, map: &EngineHandle);
    fn remove(&self);
    fn popup(&self) -> Option<PopupHandle>;
    fn set_popup(&self, popup: Option<PopupHandle>);
}

pub trait Popup: Evented {
    fn set_lng_lat(&self, lng_lat: LngLat);
    fn set_content(&self, content: &str);
    fn add_to(&self, map: &EngineHandle);
    fn remove(&self);
    fn is_open(&self) -> bool;
}

/// An author-supplied map control (navigation, scale, geolocate...).
pub trait Control {
    fn kind(&self) -> &str;
}
