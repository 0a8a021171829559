use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use engine::{AccessToken, MapOptions, MarkerOptions, PopupOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;

/// Environment variable overriding [`MapConfig::access_token`].
pub const ACCESS_TOKEN_ENV: &str = "MAPGL_ACCESS_TOKEN";

/// Layout and paint applied to every layer of one type unless the layer
/// declares its own value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerDefaults {
    pub layout: Map<String, Value>,
    pub paint: Map<String, Value>,
}

/// Application-level defaults shared by every node of a map tree.
///
/// ```json
/// {
///   "accessToken": "pk.abc",
///   "map": { "style": "mapbox://styles/mapbox/streets-v11" },
///   "marker": { "color": "#3fb1ce" },
///   "popup": { "closeOnClick": false },
///   "layers": { "circle": { "paint": { "circle-radius": 4 } } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapConfig {
    pub access_token: Option<AccessToken>,
    pub map: MapOptions,
    pub marker: MarkerOptions,
    pub popup: PopupOptions,
    pub layers: BTreeMap<String, LayerDefaults>,
}

impl MapConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded map config");
        Self::from_json_str(&text)
    }

    /// Applies `MAPGL_ACCESS_TOKEN` if it is set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        self.with_access_token_override(env::var(ACCESS_TOKEN_ENV).ok())
    }

    fn with_access_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.access_token = Some(AccessToken::new(token));
        }
        self
    }

    pub fn layer_defaults(&self, kind: &str) -> Option<&LayerDefaults> {
        self.layers.get(kind)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::MapConfig;
    use crate::error::ConfigError;

    const SAMPLE: &str = r#"{
        "accessToken": "pk.test",
        "map": { "style": "mapbox://styles/mapbox/streets-v11", "zoom": 3 },
        "marker": { "color": "red" },
        "layers": { "circle": { "paint": { "circle-radius": 4 } } }
    }"#;

    #[test]
    fn parses_all_sections() {
        let config = MapConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(
            config.access_token.as_ref().map(|t| t.as_str()),
            Some("pk.test")
        );
        assert_eq!(config.map.zoom, Some(3.0));
        assert_eq!(config.marker.color.as_deref(), Some("red"));
        assert_eq!(
            config.layer_defaults("circle").unwrap().paint.get("circle-radius"),
            Some(&json!(4))
        );
        assert!(config.layer_defaults("line").is_none());
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(MapConfig::from_json_str("{}").unwrap(), MapConfig::default());
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = MapConfig::from_path(file.path()).unwrap();
        assert_eq!(config.marker.color.as_deref(), Some("red"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = MapConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn env_token_overrides_file_token() {
        let config = MapConfig::from_json_str(SAMPLE)
            .unwrap()
            .with_access_token_override(Some("pk.env".to_string()));
        assert_eq!(config.access_token.unwrap().as_str(), "pk.env");

        let config = MapConfig::from_json_str(SAMPLE)
            .unwrap()
            .with_access_token_override(Some(String::new()));
        assert_eq!(config.access_token.unwrap().as_str(), "pk.test");
    }
}
