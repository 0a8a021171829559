use serde::{Deserialize, Serialize};

/// Geographic position in degrees.
///
/// Serializes as a `[lng, lat]` pair, matching GeoJSON coordinate order.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(p: LngLat) -> Self {
        [p.lng, p.lat]
    }
}

/// Corner coordinates of an image, video or canvas source.
///
/// Order is top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quad(pub [LngLat; 4]);

impl Quad {
    pub fn corners(&self) -> &[LngLat; 4] {
        &self.0
    }
}
