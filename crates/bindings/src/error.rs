use std::path::PathBuf;

use engine::{EngineFailure, PlatformEvent};
use thiserror::Error;

/// Why an [`crate::EngineLoader`] did not reach `Ready`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// Internal stop signal. Never exposed through `EngineLoader::error`.
    #[error("map load cancelled")]
    Cancelled,
    #[error("map engine is not supported on this platform")]
    Support,
    #[error("map engine error: {0}")]
    Engine(#[from] EngineFailure),
}

/// Failures of an image binding, delivered only to that binding's `on_error`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    #[error("failed to load image {url}")]
    Load {
        url: String,
        #[source]
        source: EngineFailure,
    },
    #[error("failed to decode vector image {url}")]
    VectorDecode {
        url: String,
        #[source]
        event: PlatformEvent,
    },
    #[error("failed to add image {name}")]
    Add {
        name: String,
        #[source]
        source: EngineFailure,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    /// A required input was absent. This is a programming error in the tree.
    #[error("{node} requires `{input}`")]
    MissingInput {
        node: &'static str,
        input: &'static str,
    },
    #[error("{node}: engine rejected call")]
    Engine {
        node: &'static str,
        #[source]
        source: EngineFailure,
    },
    #[error("{expected} node cannot be updated with {got} props")]
    KindMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("no node with key {0}")]
    UnknownNode(u64),
    #[error("map has been unmounted")]
    Unmounted,
}

impl BindingError {
    pub(crate) fn missing(node: &'static str, input: &'static str) -> Self {
        tracing::error!(node, input, "missing required input");
        BindingError::MissingInput { node, input }
    }

    pub(crate) fn engine(node: &'static str, source: EngineFailure) -> Self {
        BindingError::Engine { node, source }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid map config")]
    Parse(#[from] serde_json::Error),
}
