use foundation::{LngLat, Quad};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Engine-wide access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        AccessToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn overlay_extra(base: &Map<String, Value>, over: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (k, v) in over {
        out.insert(k.clone(), v.clone());
    }
    out
}

/// Construction options for an engine instance.
///
/// Only read at construction; later changes have no effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<LngLat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MapOptions {
    /// Field-wise merge where values set in `over` win.
    pub fn overlay(&self, over: &MapOptions) -> MapOptions {
        MapOptions {
            container: over.container.clone().or_else(|| self.container.clone()),
            style: over.style.clone().or_else(|| self.style.clone()),
            center: over.center.or(self.center),
            zoom: over.zoom.or(self.zoom),
            extra: overlay_extra(&self.extra, &over.extra),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MarkerOptions {
    pub fn overlay(&self, over: &MarkerOptions) -> MarkerOptions {
        MarkerOptions {
            color: over.color.clone().or_else(|| self.color.clone()),
            draggable: over.draggable.or(self.draggable),
            anchor: over.anchor.clone().or_else(|| self.anchor.clone()),
            offset: over.offset.or(self.offset),
            rotation: over.rotation.or(self.rotation),
            scale: over.scale.or(self.scale),
            extra: overlay_extra(&self.extra, &over.extra),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_button: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_on_click: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PopupOptions {
    pub fn overlay(&self, over: &PopupOptions) -> PopupOptions {
        PopupOptions {
            close_button: over.close_button.or(self.close_button),
            close_on_click: over.close_on_click.or(self.close_on_click),
            anchor: over.anchor.clone().or_else(|| self.anchor.clone()),
            offset: over.offset.or(self.offset),
            max_width: over.max_width.clone().or_else(|| self.max_width.clone()),
            class_name: over.class_name.clone().or_else(|| self.class_name.clone()),
            extra: overlay_extra(&self.extra, &over.extra),
        }
    }
}

/// Source definition passed to `add_source`.
///
/// `data` and `coordinates` double as the replacement payload on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOptions {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Quad>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceOptions {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
            url: None,
            tiles: None,
            coordinates: None,
            extra: Map::new(),
        }
    }

    pub fn geojson(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new("geojson")
        }
    }

    pub fn image(url: impl Into<String>, coordinates: Quad) -> Self {
        Self {
            url: Some(url.into()),
            coordinates: Some(coordinates),
            ..Self::new("image")
        }
    }
}

/// Style-layer declaration.
///
/// As declared by authors `id`, `kind` and `source` may be absent; the layer
/// binding fills them in before calling `add_layer`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(
        rename = "source-layer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub layout: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub paint: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayerSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn layout(mut self, name: impl Into<String>, value: Value) -> Self {
        self.layout.insert(name.into(), value);
        self
    }

    pub fn paint(mut self, name: impl Into<String>, value: Value) -> Self {
        self.paint.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdf: Option<bool>,
}

/// Requested raster size for vector images.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Decoded image pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}
