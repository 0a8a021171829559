use std::rc::Rc;

use engine::EngineHandle;
use foundation::IdGenerator;
use runtime::Scheduler;

use crate::config::MapConfig;
use crate::error::BindingError;

/// Everything a binding may touch: the engine (once ready), the run loop,
/// shared defaults and the id source of the mounted tree.
#[derive(Clone)]
pub struct BindingContext {
    map: Option<EngineHandle>,
    pub scheduler: Rc<Scheduler>,
    pub config: Rc<MapConfig>,
    pub ids: Rc<IdGenerator>,
}

impl BindingContext {
    pub fn new(
        map: Option<EngineHandle>,
        scheduler: Rc<Scheduler>,
        config: Rc<MapConfig>,
        ids: Rc<IdGenerator>,
    ) -> Self {
        Self {
            map,
            scheduler,
            config,
            ids,
        }
    }

    /// The engine, or a fail-fast `MissingInput` naming the binding.
    pub fn map(&self, node: &'static str) -> Result<&EngineHandle, BindingError> {
        self.map
            .as_ref()
            .ok_or_else(|| BindingError::missing(node, "map"))
    }

    /// The engine if it is still around. Teardown paths use this and skip
    /// their engine calls when it is gone.
    pub fn map_if_present(&self) -> Option<&EngineHandle> {
        self.map.as_ref()
    }

    pub fn with_map(&self, map: EngineHandle) -> Self {
        Self {
            map: Some(map),
            ..self.clone()
        }
    }

    pub fn without_map(&self) -> Self {
        Self {
            map: None,
            ..self.clone()
        }
    }
}

/// Create/update/destroy contract shared by every node kind.
///
/// - `mount` issues the create calls and returns the live binding.
/// - `update` receives the full new props; the binding diffs them against the
///   snapshot it kept and issues only the delta.
/// - `unmount` issues the destroy calls. It runs even if an earlier update
///   failed, and calling it twice is harmless.
///
/// Dependencies between bindings (a layer on its source) are resolved from
/// ids computed at mount, so nothing here suspends; only the engine-ready gate
/// does.
pub trait Binding: Sized {
    type Props;

    const KIND: &'static str;

    fn mount(ctx: &BindingContext, props: Self::Props) -> Result<Self, BindingError>;

    fn update(&mut self, ctx: &BindingContext, props: Self::Props) -> Result<(), BindingError>;

    fn unmount(&mut self, ctx: &BindingContext);
}
