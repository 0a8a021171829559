use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use engine::{EventSource, Listener, MapEvent};
use runtime::{JobId, OnceKey, Queue};
use tracing::debug;

use crate::binding::{Binding, BindingContext};
use crate::callback::Callback;
use crate::error::BindingError;

/// `(event, target)` pair identifying one registration on an event source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub event: String,
    pub target: Option<String>,
}

impl SubscriptionKey {
    pub fn new(event: impl Into<String>, target: Option<String>) -> Self {
        Self {
            event: event.into(),
            target,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}@{}", self.event, target),
            None => f.write_str(&self.event),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventProps {
    /// Map, popup or marker. Filled from the enclosing node when declared in a
    /// tree.
    pub source: Option<EventSource>,
    pub event: String,
    /// Layer id for layer-targeted map events.
    pub target: Option<String>,
    pub action: Callback<MapEvent>,
}

impl EventProps {
    pub fn new(event: impl Into<String>, action: Callback<MapEvent>) -> Self {
        Self {
            source: None,
            event: event.into(),
            target: None,
            action,
        }
    }

    pub fn on_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_source(mut self, source: EventSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Keeps exactly one listener registered for the latest `(event, target)`.
///
/// The listener has a stable identity for the binding's whole life and
/// forwards to whatever action the latest props carry, so an action change
/// alone never re-subscribes.
pub struct EventBinding {
    source: EventSource,
    listener: Listener,
    action: Rc<RefCell<Callback<MapEvent>>>,
    /// The pair actually registered with the source. Unregistration always
    /// uses this exact pair.
    active: Option<SubscriptionKey>,
    /// The pair as of the end of the last completed pass.
    committed: Rc<RefCell<Option<SubscriptionKey>>>,
    commit_key: OnceKey,
    commit_job: Option<JobId>,
}

impl EventBinding {
    pub fn committed_key(&self) -> Option<SubscriptionKey> {
        self.committed.borrow().clone()
    }

    pub fn active_key(&self) -> Option<&SubscriptionKey> {
        self.active.as_ref()
    }

    fn subscribe(&mut self, ctx: &BindingContext, key: SubscriptionKey) {
        if self.active.as_ref() == Some(&key) {
            return;
        }

        if let Some(prev) = self.active.take() {
            debug!(source = self.source.kind(), key = %prev, "unsubscribing");
            self.source
                .off(&prev.event, prev.target.as_deref(), &self.listener);
        }

        debug!(source = self.source.kind(), key = %key, "subscribing");
        self.source
            .on(&key.event, key.target.as_deref(), &self.listener);
        self.active = Some(key.clone());

        let committed = Rc::clone(&self.committed);
        self.commit_job = Some(ctx.scheduler.schedule_once(
            Queue::Actions,
            self.commit_key,
            "event-commit",
            move || *committed.borrow_mut() = Some(key),
        ));
    }
}

fn validate(props: &EventProps) -> Result<(), BindingError> {
    if props.event.is_empty() {
        return Err(BindingError::missing(EventBinding::KIND, "event"));
    }
    Ok(())
}

impl Binding for EventBinding {
    type Props = EventProps;

    const KIND: &'static str = "event";

    fn mount(ctx: &BindingContext, props: EventProps) -> Result<Self, BindingError> {
        validate(&props)?;
        let source = props
            .source
            .ok_or_else(|| BindingError::missing(Self::KIND, "source"))?;

        let action = Rc::new(RefCell::new(props.action));
        let listener = {
            let action = Rc::clone(&action);
            Listener::new(move |event| {
                let action = action.borrow().clone();
                action.call(event);
            })
        };

        let mut binding = EventBinding {
            source,
            listener,
            action,
            active: None,
            committed: Rc::new(RefCell::new(None)),
            commit_key: ctx.scheduler.once_key(),
            commit_job: None,
        };
        binding.subscribe(ctx, SubscriptionKey::new(props.event, props.target));
        Ok(binding)
    }

    fn update(&mut self, ctx: &BindingContext, props: EventProps) -> Result<(), BindingError> {
        validate(&props)?;
        *self.action.borrow_mut() = props.action;
        self.subscribe(ctx, SubscriptionKey::new(props.event, props.target));
        Ok(())
    }

    fn unmount(&mut self, ctx: &BindingContext) {
        if let Some(job) = self.commit_job.take() {
            ctx.scheduler.cancel(job);
        }
        if let Some(prev) = self.active.take() {
            debug!(source = self.source.kind(), key = %prev, "unsubscribing on unmount");
            self.source
                .off(&prev.event, prev.target.as_deref(), &self.listener);
        }
        *self.committed.borrow_mut() = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use engine::testing::{Call, ObjectOp};
    use engine::{EngineHandle, EventSource, MapEngine, MapEvent, PopupOptions};
    use pretty_assertions::assert_eq;

    use super::{EventBinding, EventProps, SubscriptionKey};
    use crate::binding::test_support::ready_context;
    use crate::binding::Binding;
    use crate::callback::Callback;

    fn noop() -> Callback<MapEvent> {
        Callback::new(|_| {})
    }

    fn on(event: &str, target: Option<&str>) -> Call {
        Call::On {
            event: event.to_string(),
            target: target.map(str::to_string),
        }
    }

    fn off(event: &str, target: Option<&str>) -> Call {
        Call::Off {
            event: event.to_string(),
            target: target.map(str::to_string),
        }
    }

    fn map_props(map: &EngineHandle, event: &str) -> EventProps {
        EventProps::new(event, noop()).with_source(EventSource::Map(Rc::clone(map)))
    }

    #[test]
    fn same_key_is_idempotent() {
        let (engine, ctx) = ready_context();
        let map = engine.handle();
        let mut binding = EventBinding::mount(&ctx, map_props(&map, "click")).unwrap();
        binding.update(&ctx, map_props(&map, "click")).unwrap();

        assert_eq!(engine.calls(), vec![on("click", None)]);
        assert_eq!(engine.listener_count(), 1);
    }

    #[test]
    fn target_change_unsubscribes_old_pair_first() {
        let (engine, ctx) = ready_context();
        let map = engine.handle();
        let mut binding =
            EventBinding::mount(&ctx, map_props(&map, "click").on_target("a")).unwrap();
        ctx.scheduler.end_pass();
        binding
            .update(&ctx, map_props(&map, "click").on_target("b"))
            .unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                on("click", Some("a")),
                off("click", Some("a")),
                on("click", Some("b")),
            ]
        );
        assert_eq!(engine.listener_count(), 1);
    }

    #[test]
    fn commit_happens_after_the_pass() {
        let (engine, ctx) = ready_context();
        let map = engine.handle();
        let binding = EventBinding::mount(&ctx, map_props(&map, "zoom")).unwrap();

        assert_eq!(binding.committed_key(), None);
        assert_eq!(
            binding.active_key(),
            Some(&SubscriptionKey::new("zoom", None))
        );
        ctx.scheduler.end_pass();
        assert_eq!(
            binding.committed_key(),
            Some(SubscriptionKey::new("zoom", None))
        );
    }

    #[test]
    fn rapid_updates_within_a_pass_do_not_leak() {
        let (engine, ctx) = ready_context();
        let map = engine.handle();
        let mut binding = EventBinding::mount(&ctx, map_props(&map, "a")).unwrap();
        binding.update(&ctx, map_props(&map, "b")).unwrap();
        binding.update(&ctx, map_props(&map, "c")).unwrap();
        ctx.scheduler.end_pass();

        assert_eq!(engine.listener_count(), 1);
        assert_eq!(binding.committed_key(), Some(SubscriptionKey::new("c", None)));

        binding.unmount(&ctx);
        assert_eq!(engine.listener_count(), 0);
    }

    #[test]
    fn action_change_does_not_resubscribe() {
        let (engine, ctx) = ready_context();
        let map = engine.handle();
        let hits = Rc::new(Cell::new(0));

        let mut binding = EventBinding::mount(&ctx, map_props(&map, "click")).unwrap();
        let h = Rc::clone(&hits);
        let props = EventProps::new("click", Callback::new(move |_| h.set(h.get() + 1)))
            .with_source(EventSource::Map(Rc::clone(&map)));
        binding.update(&ctx, props).unwrap();

        engine.fire(&MapEvent::new("click"));
        assert_eq!(hits.get(), 1);
        assert_eq!(engine.calls(), vec![on("click", None)]);
    }

    #[test]
    fn unmounting_popup_event_mirrors_targetless_registration() {
        let (engine, ctx) = ready_context();
        let popup = engine.create_popup(&PopupOptions::default());
        engine.clear_calls();

        let props = EventProps::new("close", noop()).with_source(EventSource::Popup(popup));
        let mut binding = EventBinding::mount(&ctx, props).unwrap();
        binding.unmount(&ctx);
        binding.unmount(&ctx);

        assert_eq!(
            engine.calls(),
            vec![
                Call::Popup {
                    popup: 0,
                    op: ObjectOp::On {
                        event: "close".to_string(),
                        target: None
                    }
                },
                Call::Popup {
                    popup: 0,
                    op: ObjectOp::Off {
                        event: "close".to_string(),
                        target: None
                    }
                },
            ]
        );
        assert!(ctx.scheduler.is_idle());
    }

    #[test]
    fn requires_source_and_event() {
        let (engine, ctx) = ready_context();
        assert!(EventBinding::mount(&ctx, EventProps::new("click", noop())).is_err());
        assert!(EventBinding::mount(&ctx, map_props(&engine.handle(), "")).is_err());
    }
}
