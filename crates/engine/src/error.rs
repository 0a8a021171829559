use serde_json::Value;
use thiserror::Error;

/// An error reported by the engine itself (its `error` event, a failed image
/// fetch, a rejected call).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct EngineFailure {
    pub message: String,
    /// Engine-specific payload, if any.
    pub detail: Option<Value>,
}

impl EngineFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(message: impl Into<String>, detail: Value) -> Self {
        Self {
            message: message.into(),
            detail: Some(detail),
        }
    }
}

/// Failure event raised by the platform's offscreen image decoder.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct PlatformEvent {
    pub kind: String,
    pub message: String,
}

impl PlatformEvent {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}
