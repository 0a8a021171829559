//! Declarative bindings over an imperative map engine.
//!
//! Each node of a declarative tree (source, layer, image, marker, popup,
//! control, event subscription, deferred call) is backed by a [`Binding`]
//! that turns mount/update/unmount transitions into engine calls. The
//! [`EngineLoader`] gates all of them on the engine's ready signal, and
//! [`MapComponent`] ties the two together as the root of a tree.

pub mod binding;
pub mod call;
pub mod callback;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod image;
pub mod layer;
pub mod loader;
pub mod map;
pub mod marker;
pub mod node;
pub mod popup;
pub mod source;

pub use binding::*;
pub use call::*;
pub use callback::*;
pub use config::*;
pub use control::*;
pub use error::*;
pub use event::*;
pub use image::*;
pub use layer::*;
pub use loader::*;
pub use map::*;
pub use marker::*;
pub use node::*;
pub use popup::*;
pub use source::*;
