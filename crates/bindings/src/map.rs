use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use engine::{EngineFactory, EngineHandle, MapOptions};
use foundation::IdGenerator;
use runtime::Scheduler;
use tracing::{debug, error, info, warn};

use crate::binding::BindingContext;
use crate::config::MapConfig;
use crate::error::{BindingError, LoadError};
use crate::loader::{EngineLoader, LoaderState};
use crate::node::{Node, NodeProps};

/// Handle of a declared node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(u64);

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum Slot {
    /// Declared before the engine (or the parent) was ready.
    Pending(NodeProps),
    Mounted(Node),
    /// Mount failed; kept so the key stays valid for update and remove.
    Failed,
    /// Temporarily taken out while its binding runs.
    Busy,
}

struct Entry {
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    slot: Slot,
}

#[derive(Default)]
struct Tree {
    next_key: u64,
    entries: BTreeMap<NodeKey, Entry>,
    roots: Vec<NodeKey>,
}

struct Shared {
    ctx: RefCell<BindingContext>,
    tree: RefCell<Tree>,
    mount_errors: RefCell<BTreeMap<NodeKey, BindingError>>,
    unmounted: Cell<bool>,
}

impl Shared {
    fn context(&self) -> BindingContext {
        self.ctx.borrow().clone()
    }

    fn is_engine_ready(&self) -> bool {
        self.ctx.borrow().map_if_present().is_some()
    }

    /// Whether `key` can mount now: the engine is ready and its parent, if
    /// any, is no longer pending.
    fn can_mount(&self, key: NodeKey) -> bool {
        if !self.is_engine_ready() {
            return false;
        }
        let tree = self.tree.borrow();
        match tree.entries.get(&key).and_then(|e| e.parent) {
            Some(parent) => !matches!(
                tree.entries.get(&parent).map(|e| &e.slot),
                Some(Slot::Pending(_))
            ),
            None => true,
        }
    }

    fn take_slot(&self, key: NodeKey) -> Option<Slot> {
        let mut tree = self.tree.borrow_mut();
        let entry = tree.entries.get_mut(&key)?;
        Some(mem::replace(&mut entry.slot, Slot::Busy))
    }

    fn put_slot(&self, key: NodeKey, slot: Slot) {
        if let Some(entry) = self.tree.borrow_mut().entries.get_mut(&key) {
            entry.slot = slot;
        }
    }

    /// Completes `props` from the parent's mounted node, if there is one.
    fn inherit(&self, key: NodeKey, props: NodeProps, ctx: &BindingContext) -> NodeProps {
        let tree = self.tree.borrow();
        let parent = tree
            .entries
            .get(&key)
            .and_then(|e| e.parent)
            .and_then(|p| tree.entries.get(&p))
            .and_then(|e| match &e.slot {
                Slot::Mounted(node) => Some(node),
                _ => None,
            });
        props.inherit(parent, ctx)
    }

    fn mount_node(&self, key: NodeKey, props: NodeProps) -> Result<(), BindingError> {
        let ctx = self.context();
        let props = self.inherit(key, props, &ctx);
        let kind = props.kind();
        match Node::mount(&ctx, props) {
            Ok(node) => {
                debug!(%key, %kind, "node mounted");
                self.mount_errors.borrow_mut().remove(&key);
                self.put_slot(key, Slot::Mounted(node));
                Ok(())
            }
            Err(err) => {
                error!(%key, %kind, error = %err, "node failed to mount");
                self.put_slot(key, Slot::Failed);
                Err(err)
            }
        }
    }

    /// Mounts `key` if pending, then its pending children in declaration
    /// order. Failures are recorded per node.
    fn mount_subtree(&self, key: NodeKey) {
        match self.take_slot(key) {
            Some(Slot::Pending(props)) => {
                if let Err(err) = self.mount_node(key, props) {
                    self.mount_errors.borrow_mut().insert(key, err);
                }
            }
            Some(slot) => self.put_slot(key, slot),
            None => return,
        }

        let children = self
            .tree
            .borrow()
            .entries
            .get(&key)
            .map(|e| e.children.clone())
            .unwrap_or_default();
        for child in children {
            self.mount_subtree(child);
        }
    }

    fn mount_pending(&self) {
        let roots = self.tree.borrow().roots.clone();
        info!(roots = roots.len(), "mounting declared nodes");
        for root in roots {
            self.mount_subtree(root);
        }
    }

    /// Unmounts children (most recent first), then the node, and forgets it.
    fn remove_subtree(&self, key: NodeKey) {
        let children = self
            .tree
            .borrow()
            .entries
            .get(&key)
            .map(|e| e.children.clone())
            .unwrap_or_default();
        for child in children.into_iter().rev() {
            self.remove_subtree(child);
        }

        if let Some(Slot::Mounted(mut node)) = self.take_slot(key) {
            debug!(%key, kind = %node.kind(), "unmounting node");
            node.unmount(&self.context());
        }

        let mut tree = self.tree.borrow_mut();
        if let Some(entry) = tree.entries.remove(&key) {
            match entry.parent.and_then(|p| tree.entries.get_mut(&p)) {
                Some(parent) => parent.children.retain(|c| *c != key),
                None => tree.roots.retain(|c| *c != key),
            }
        }
        self.mount_errors.borrow_mut().remove(&key);
    }
}

/// Root of a declarative map tree.
///
/// Owns the engine loader and every node declared under it. Nodes declared
/// before the engine is ready are held and mounted, in declaration order,
/// right after the ready callback runs. Unmounting tears nodes down children
/// first and then cancels the loader, which removes the engine one tick later.
pub struct MapComponent {
    shared: Rc<Shared>,
    loader: EngineLoader,
    factory: Rc<dyn EngineFactory>,
    config: Rc<MapConfig>,
}

impl MapComponent {
    pub fn new(
        scheduler: Rc<Scheduler>,
        config: MapConfig,
        factory: Rc<dyn EngineFactory>,
    ) -> Self {
        let config = Rc::new(config);
        let ctx = BindingContext::new(
            None,
            Rc::clone(&scheduler),
            Rc::clone(&config),
            Rc::new(IdGenerator::new()),
        );
        Self {
            shared: Rc::new(Shared {
                ctx: RefCell::new(ctx),
                tree: RefCell::new(Tree::default()),
                mount_errors: RefCell::new(BTreeMap::new()),
                unmounted: Cell::new(false),
            }),
            loader: EngineLoader::new(scheduler),
            factory,
            config,
        }
    }

    /// Starts loading the engine with the configured map defaults under
    /// `init_options`. `on_ready` runs before any declared node mounts.
    pub fn mount(&self, init_options: &MapOptions, on_ready: impl FnOnce(EngineHandle) + 'static) {
        let options = self.config.map.overlay(init_options);
        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        self.loader.load(
            &*self.factory,
            self.config.access_token.as_ref(),
            &options,
            move |engine| {
                on_ready(Rc::clone(&engine));
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if shared.unmounted.get() {
                    return;
                }
                let ctx = shared.ctx.borrow().with_map(engine);
                *shared.ctx.borrow_mut() = ctx;
                shared.mount_pending();
            },
        );
    }

    /// Declares a node under `parent` (or at the root).
    ///
    /// Mounts immediately when possible. An immediate mount failure is
    /// returned and the node is not kept; a failure of a deferred mount is
    /// reported by [`MapComponent::mount_error`].
    pub fn declare(
        &self,
        parent: Option<NodeKey>,
        props: impl Into<NodeProps>,
    ) -> Result<NodeKey, BindingError> {
        if self.shared.unmounted.get() {
            return Err(BindingError::Unmounted);
        }
        let props = props.into();

        let key = {
            let mut tree = self.shared.tree.borrow_mut();
            if let Some(parent) = parent {
                if !tree.entries.contains_key(&parent) {
                    return Err(BindingError::UnknownNode(parent.0));
                }
            }
            tree.next_key += 1;
            let key = NodeKey(tree.next_key);
            tree.entries.insert(
                key,
                Entry {
                    parent,
                    children: Vec::new(),
                    slot: Slot::Busy,
                },
            );
            match parent.and_then(|p| tree.entries.get_mut(&p)) {
                Some(entry) => entry.children.push(key),
                None => tree.roots.push(key),
            }
            key
        };

        if !self.shared.can_mount(key) {
            debug!(%key, kind = %props.kind(), "node declared before ready; deferring");
            self.shared.put_slot(key, Slot::Pending(props));
            return Ok(key);
        }

        if let Err(err) = self.shared.mount_node(key, props) {
            self.shared.remove_subtree(key);
            return Err(err);
        }
        Ok(key)
    }

    /// Passes new inputs to a node. Pending nodes just keep them; a node
    /// whose mount failed tries to mount again.
    pub fn update(&self, key: NodeKey, props: impl Into<NodeProps>) -> Result<(), BindingError> {
        if self.shared.unmounted.get() {
            return Err(BindingError::Unmounted);
        }
        let props = props.into();
        let slot = self
            .shared
            .take_slot(key)
            .ok_or(BindingError::UnknownNode(key.0))?;

        match slot {
            Slot::Pending(_) => {
                self.shared.put_slot(key, Slot::Pending(props));
                Ok(())
            }
            Slot::Failed if self.shared.can_mount(key) => {
                let result = self.shared.mount_node(key, props);
                if let Err(err) = &result {
                    self.shared.mount_errors.borrow_mut().insert(key, err.clone());
                }
                result
            }
            Slot::Failed => {
                self.shared.put_slot(key, Slot::Pending(props));
                Ok(())
            }
            Slot::Mounted(mut node) => {
                let ctx = self.shared.context();
                let props = self.shared.inherit(key, props, &ctx);
                let result = node.update(&ctx, props);
                if let Err(err) = &result {
                    warn!(%key, kind = %node.kind(), error = %err, "node update failed");
                }
                self.shared.put_slot(key, Slot::Mounted(node));
                result
            }
            Slot::Busy => {
                self.shared.put_slot(key, Slot::Busy);
                warn!(%key, "node updated while its binding is running; ignoring");
                Ok(())
            }
        }
    }

    /// Unmounts a node and everything declared under it.
    pub fn remove(&self, key: NodeKey) -> Result<(), BindingError> {
        if !self.shared.tree.borrow().entries.contains_key(&key) {
            return Err(BindingError::UnknownNode(key.0));
        }
        self.shared.remove_subtree(key);
        Ok(())
    }

    /// Tears the whole tree down and cancels the engine load. Idempotent.
    pub fn unmount(&self) {
        if self.shared.unmounted.replace(true) {
            return;
        }
        let roots = self.shared.tree.borrow().roots.clone();
        info!(roots = roots.len(), "unmounting map");
        for root in roots.into_iter().rev() {
            self.shared.remove_subtree(root);
        }
        self.loader.cancel();
    }

    pub fn state(&self) -> LoaderState {
        self.loader.state()
    }

    pub fn is_ready(&self) -> bool {
        self.loader.is_ready()
    }

    /// The engine load failure, if any.
    pub fn error(&self) -> Option<LoadError> {
        self.loader.error()
    }

    pub fn engine(&self) -> Option<EngineHandle> {
        self.loader.engine()
    }

    /// Failure of a mount that ran after the engine became ready.
    pub fn mount_error(&self, key: NodeKey) -> Option<BindingError> {
        self.shared.mount_errors.borrow().get(&key).cloned()
    }

    pub fn is_mounted(&self, key: NodeKey) -> bool {
        self.with_node(key, |_| ()).is_some()
    }

    pub fn is_pending(&self, key: NodeKey) -> bool {
        matches!(
            self.shared.tree.borrow().entries.get(&key).map(|e| &e.slot),
            Some(Slot::Pending(_))
        )
    }

    /// Inspects a mounted node.
    pub fn with_node<R>(&self, key: NodeKey, f: impl FnOnce(&Node) -> R) -> Option<R> {
        let tree = self.shared.tree.borrow();
        match &tree.entries.get(&key)?.slot {
            Slot::Mounted(node) => Some(f(node)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use engine::testing::{init_tracing, Call, RecordingFactory};
    use engine::{EngineFactory, LayerSpec, MapOptions, SourceOptions};
    use foundation::LngLat;
    use pretty_assertions::assert_eq;
    use runtime::Scheduler;
    use serde_json::json;

    use super::MapComponent;
    use crate::config::MapConfig;
    use crate::error::BindingError;
    use crate::layer::LayerProps;
    use crate::loader::LoaderState;
    use crate::marker::MarkerProps;
    use crate::node::Node;
    use crate::source::SourceProps;

    fn component(config: MapConfig) -> (Rc<RecordingFactory>, Rc<Scheduler>, MapComponent) {
        init_tracing();
        let factory = RecordingFactory::new();
        let scheduler = Rc::new(Scheduler::new());
        let map = MapComponent::new(
            Rc::clone(&scheduler),
            config,
            Rc::clone(&factory) as Rc<dyn EngineFactory>,
        );
        (factory, scheduler, map)
    }

    fn collection() -> SourceOptions {
        SourceOptions::geojson(json!({"type": "FeatureCollection", "features": []}))
    }

    #[test]
    fn init_options_override_configured_defaults() {
        let config = MapConfig::from_json_str(r#"{"map": {"style": "a", "zoom": 2}}"#).unwrap();
        let (factory, _scheduler, map) = component(config);
        map.mount(
            &MapOptions {
                zoom: Some(5.0),
                ..MapOptions::default()
            },
            |_| {},
        );

        let engine = factory.last_engine().unwrap();
        assert_eq!(engine.options.style.as_deref(), Some("a"));
        assert_eq!(engine.options.zoom, Some(5.0));
        assert_eq!(map.state(), LoaderState::Loading);
    }

    #[test]
    fn nodes_wait_for_ready_and_mount_in_order() {
        let (factory, _scheduler, map) = component(MapConfig::default());
        let ready_seen = Rc::new(Cell::new(false));
        let r = Rc::clone(&ready_seen);
        map.mount(&MapOptions::default(), move |_| r.set(true));

        let source = map
            .declare(None, SourceProps::new(collection()).with_id("s1"))
            .unwrap();
        let layer = map
            .declare(Some(source), LayerProps::new(LayerSpec::new("circle").with_id("dots")))
            .unwrap();
        assert!(map.is_pending(source));
        assert!(map.is_pending(layer));

        let engine = factory.last_engine().unwrap();
        engine.clear_calls();
        engine.emit_load();

        assert!(ready_seen.get());
        assert!(map.is_ready());
        assert!(map.is_mounted(source));
        assert!(map.is_mounted(layer));
        assert_eq!(engine.layer_ids(), vec!["dots".to_string()]);
        assert!(matches!(engine.calls()[2], Call::AddSource { .. }));
        assert!(engine.violations().is_empty());
    }

    #[test]
    fn declare_after_ready_mounts_immediately() {
        let (factory, _scheduler, map) = component(MapConfig::default());
        map.mount(&MapOptions::default(), |_| {});
        factory.last_engine().unwrap().emit_load();

        let marker = map
            .declare(None, MarkerProps::at(LngLat::new(1.0, 1.0)))
            .unwrap();
        assert!(map.with_node(marker, |n| matches!(n, Node::Marker(_))).unwrap());
    }

    #[test]
    fn immediate_mount_failure_is_returned() {
        let (factory, _scheduler, map) = component(MapConfig::default());
        map.mount(&MapOptions::default(), |_| {});
        factory.last_engine().unwrap().emit_load();

        let err = map.declare(None, MarkerProps::default()).unwrap_err();
        assert!(matches!(err, BindingError::MissingInput { input: "lng_lat", .. }));
    }

    #[test]
    fn deferred_mount_failure_is_scoped_to_the_node() {
        let (factory, _scheduler, map) = component(MapConfig::default());
        map.mount(&MapOptions::default(), |_| {});
        let bad = map.declare(None, MarkerProps::default()).unwrap();
        let good = map
            .declare(None, MarkerProps::at(LngLat::new(0.0, 0.0)))
            .unwrap();
        factory.last_engine().unwrap().emit_load();

        assert!(map.mount_error(bad).is_some());
        assert!(map.is_mounted(good));

        map.update(bad, MarkerProps::at(LngLat::new(2.0, 2.0))).unwrap();
        assert!(map.is_mounted(bad));
        assert!(map.mount_error(bad).is_none());
    }

    #[test]
    fn unmount_removes_layers_then_sources_then_engine() {
        let (factory, scheduler, map) = component(MapConfig::default());
        map.mount(&MapOptions::default(), |_| {});
        let engine = factory.last_engine().unwrap();
        engine.emit_load();

        let source = map
            .declare(None, SourceProps::new(collection()).with_id("s1"))
            .unwrap();
        map.declare(Some(source), LayerProps::new(LayerSpec::new("line").with_id("l1")))
            .unwrap();
        engine.clear_calls();

        map.unmount();
        map.unmount();
        assert_eq!(map.state(), LoaderState::Cancelled);
        assert_eq!(engine.calls(), vec![Call::RemoveLayer { id: "l1".to_string() }]);

        scheduler.end_pass();
        assert!(!engine.has_source("s1"));
        assert!(!engine.is_removed());

        scheduler.tick();
        assert!(engine.is_removed());
        assert!(engine.violations().is_empty());
        assert_eq!(
            map.declare(None, MarkerProps::default()).unwrap_err(),
            BindingError::Unmounted
        );
    }

    #[test]
    fn unknown_keys_are_reported() {
        let (_factory, _scheduler, map) = component(MapConfig::default());
        let key = map.declare(None, MarkerProps::default()).unwrap();
        map.remove(key).unwrap();
        assert!(matches!(map.remove(key), Err(BindingError::UnknownNode(_))));
        assert!(matches!(
            map.declare(Some(key), MarkerProps::default()),
            Err(BindingError::UnknownNode(_))
        ));
    }
}
