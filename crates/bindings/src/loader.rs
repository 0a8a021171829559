use std::cell::RefCell;
use std::rc::Rc;

use engine::{AccessToken, EngineFactory, EngineFailure, EngineHandle, Listener, MapOptions};
use runtime::{Queue, Scheduler};
use tracing::{debug, error, info, warn};

use crate::error::LoadError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Loading,
    Ready,
    Cancelled,
    Errored,
}

type ReadyCallback = Box<dyn FnOnce(EngineHandle)>;

struct Inner {
    state: LoaderState,
    cancelled: bool,
    engine: Option<EngineHandle>,
    error: Option<LoadError>,
    on_ready: Option<ReadyCallback>,
    /// `(load, error)` listeners while waiting for the engine to settle.
    listeners: Option<(Listener, Listener)>,
    teardown_scheduled: bool,
}

/// Constructs the map engine and drives it to ready.
///
/// State machine:
/// - `Idle --load--> Loading`, then `Ready` on the engine's `load` event or
///   `Errored` on its `error` event (or a failed platform check).
/// - `cancel` from `Idle`, `Loading` or `Ready` moves to `Cancelled`.
///
/// Cancellation is checked before construction and again before the ready
/// callback; once cancelled, neither the callback nor an error surfaces. Calls
/// already made into the engine are not undone.
///
/// Single use: `load` is a no-op once a load has started or the loader has
/// been cancelled.
pub struct EngineLoader {
    inner: Rc<RefCell<Inner>>,
    scheduler: Rc<Scheduler>,
}

impl EngineLoader {
    pub fn new(scheduler: Rc<Scheduler>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: LoaderState::Idle,
                cancelled: false,
                engine: None,
                error: None,
                on_ready: None,
                listeners: None,
                teardown_scheduled: false,
            })),
            scheduler,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.inner.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LoaderState::Ready
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().cancelled
    }

    /// The load failure, if any. Never `LoadError::Cancelled`.
    pub fn error(&self) -> Option<LoadError> {
        self.inner.borrow().error.clone()
    }

    /// The constructed engine, from construction until its teardown runs.
    pub fn engine(&self) -> Option<EngineHandle> {
        self.inner.borrow().engine.clone()
    }

    pub fn load(
        &self,
        factory: &dyn EngineFactory,
        credential: Option<&AccessToken>,
        options: &MapOptions,
        on_ready: impl FnOnce(EngineHandle) + 'static,
    ) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != LoaderState::Idle || inner.cancelled {
                debug!(state = ?inner.state, "map load already started; ignoring");
                return;
            }
            inner.state = LoaderState::Loading;
            inner.on_ready = Some(Box::new(on_ready));
        }

        if let Err(err) = self.start(factory, credential, options) {
            fail(&self.inner, err);
        }
    }

    fn start(
        &self,
        factory: &dyn EngineFactory,
        credential: Option<&AccessToken>,
        options: &MapOptions,
    ) -> Result<(), LoadError> {
        self.checkpoint()?;

        // Process-wide engine state; set right before construction so another
        // loader cannot swap it in between.
        match credential {
            Some(token) => factory.configure_credential(token),
            None => warn!("no map access token configured"),
        }

        if !factory.is_supported() {
            return Err(LoadError::Support);
        }

        let engine = factory.create(options)?;
        debug!("map engine constructed; waiting for load");

        let on_load = {
            let weak = Rc::downgrade(&self.inner);
            Listener::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    settle(&inner, Ok(()));
                }
            })
        };
        let on_error = {
            let weak = Rc::downgrade(&self.inner);
            Listener::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    let failure = event
                        .error
                        .clone()
                        .unwrap_or_else(|| EngineFailure::new("unknown map engine error"));
                    settle(&inner, Err(LoadError::Engine(failure)));
                }
            })
        };

        {
            let mut inner = self.inner.borrow_mut();
            inner.engine = Some(Rc::clone(&engine));
            inner.listeners = Some((on_load.clone(), on_error.clone()));
        }
        engine.on("load", None, &on_load);
        engine.on("error", None, &on_error);
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), LoadError> {
        if self.inner.borrow().cancelled {
            return Err(LoadError::Cancelled);
        }
        Ok(())
    }

    /// Cancels the load and schedules engine teardown for the next tick.
    ///
    /// The teardown is deferred so that code which attached its own cleanup
    /// to the raw engine instance can still run against a live engine during
    /// the current pass. Idempotent.
    pub fn cancel(&self) {
        let engine = {
            let mut inner = self.inner.borrow_mut();
            inner.cancelled = true;
            if inner.state != LoaderState::Errored {
                inner.state = LoaderState::Cancelled;
            }
            if inner.teardown_scheduled {
                return;
            }
            inner.on_ready = None;
            let Some(engine) = inner.engine.clone() else {
                debug!("map load cancelled before engine construction");
                return;
            };
            inner.teardown_scheduled = true;
            engine
        };

        let weak = Rc::downgrade(&self.inner);
        self.scheduler
            .schedule(Queue::NextTick, "engine-teardown", move || {
                info!("removing map engine");
                engine.remove();
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().engine = None;
                }
            });
    }
}

fn settle(inner: &Rc<RefCell<Inner>>, outcome: Result<(), LoadError>) {
    let (engine, listeners) = {
        let mut i = inner.borrow_mut();
        (i.engine.clone(), i.listeners.take())
    };
    // Exactly one of load/error is honored.
    let Some((on_load, on_error)) = listeners else {
        return;
    };
    if let Some(engine) = &engine {
        engine.off("load", None, &on_load);
        engine.off("error", None, &on_error);
    }

    match (outcome, engine) {
        (Ok(()), Some(engine)) => ready(inner, engine),
        (Ok(()), None) => fail(inner, LoadError::Cancelled),
        (Err(err), _) => fail(inner, err),
    }
}

fn ready(inner: &Rc<RefCell<Inner>>, engine: EngineHandle) {
    let callback = {
        let mut i = inner.borrow_mut();
        if i.cancelled {
            debug!("map engine loaded after cancel; ready callback suppressed");
            i.state = LoaderState::Cancelled;
            i.on_ready = None;
            return;
        }
        i.on_ready.take()
    };

    if let Some(callback) = callback {
        callback(engine);
    }

    let mut i = inner.borrow_mut();
    if i.cancelled {
        // Cancelled from inside the ready callback.
        i.state = LoaderState::Cancelled;
        return;
    }
    i.state = LoaderState::Ready;
    info!("map engine ready");
}

fn fail(inner: &Rc<RefCell<Inner>>, err: LoadError) {
    let mut i = inner.borrow_mut();
    i.on_ready = None;
    match err {
        LoadError::Cancelled => {
            debug!("map load stopped at cancellation checkpoint");
            i.state = LoaderState::Cancelled;
        }
        err if i.cancelled => {
            error!(error = %err, "map engine failed after cancel");
            i.state = LoaderState::Cancelled;
        }
        err => {
            error!(error = %err, "map engine failed to load");
            i.state = LoaderState::Errored;
            i.error = Some(err);
        }
    }
}
