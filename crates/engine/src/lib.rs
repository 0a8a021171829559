//! Capability surface of the external map engine.
//!
//! Everything here is consumed, not implemented: the engine renders, tiles and
//! projects; bindings only drive it through these traits. All calls are
//! synchronous except image loads and the engine's own `load`/`error` events,
//! which complete through callbacks on the same thread.

pub mod error;
pub mod event;
pub mod map;
pub mod options;

#[cfg(feature = "testing")]
pub mod testing;

pub use error::*;
pub use event::*;
pub use map::*;
pub use options::*;
