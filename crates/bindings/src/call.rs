use std::rc::Rc;

use engine::EngineFailure;
use runtime::{JobId, Queue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::binding::{Binding, BindingContext};
use crate::callback::Callback;
use crate::error::BindingError;

pub type CallResult = Result<Value, EngineFailure>;

#[derive(Debug, Clone, Default)]
pub struct CallProps {
    /// Engine method name, e.g. `flyTo`.
    pub method: String,
    pub args: Vec<Value>,
    pub on_response: Option<Callback<CallResult>>,
}

impl CallProps {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            on_response: None,
        }
    }

    pub fn on_response(mut self, callback: Callback<CallResult>) -> Self {
        self.on_response = Some(callback);
        self
    }
}

/// Invokes an engine method once after the pass that declared it, and again
/// after every update.
pub struct CallBinding {
    pending: Option<JobId>,
}

impl CallBinding {
    pub fn is_pending(&self, ctx: &BindingContext) -> bool {
        self.pending.is_some_and(|job| ctx.scheduler.is_pending(job))
    }

    fn schedule(&mut self, ctx: &BindingContext, props: CallProps) -> Result<(), BindingError> {
        if props.method.is_empty() {
            return Err(BindingError::missing(Self::KIND, "method"));
        }
        let map = Rc::clone(ctx.map(Self::KIND)?);

        if let Some(job) = self.pending.take() {
            ctx.scheduler.cancel(job);
        }
        self.pending = Some(ctx.scheduler.schedule(Queue::AfterRender, "map-call", move || {
            debug!(method = %props.method, "invoking map method");
            let result = map.invoke(&props.method, &props.args);
            if let Err(err) = &result {
                warn!(method = %props.method, error = %err, "map method failed");
            }
            if let Some(on_response) = &props.on_response {
                on_response.call(&result);
            }
        }));
        Ok(())
    }
}

impl Binding for CallBinding {
    type Props = CallProps;

    const KIND: &'static str = "call";

    fn mount(ctx: &BindingContext, props: CallProps) -> Result<Self, BindingError> {
        let mut binding = CallBinding { pending: None };
        binding.schedule(ctx, props)?;
        Ok(binding)
    }

    fn update(&mut self, ctx: &BindingContext, props: CallProps) -> Result<(), BindingError> {
        self.schedule(ctx, props)
    }

    fn unmount(&mut self, ctx: &BindingContext) {
        if let Some(job) = self.pending.take() {
            if ctx.scheduler.cancel(job) {
                debug!("pending map call cancelled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use engine::testing::Call;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{CallBinding, CallProps, CallResult};
    use crate::binding::test_support::ready_context;
    use crate::binding::Binding;
    use crate::callback::Callback;

    #[test]
    fn runs_after_the_pass_and_reports() {
        let (engine, ctx) = ready_context();
        engine.set_invoke_result("getZoom", json!(7.5));
        let responses = Rc::new(RefCell::new(Vec::new()));
        let r = Rc::clone(&responses);
        let props = CallProps::new("getZoom", vec![])
            .on_response(Callback::new(move |res: &CallResult| r.borrow_mut().push(res.clone())));

        let binding = CallBinding::mount(&ctx, props).unwrap();
        assert!(engine.calls().is_empty());
        assert!(binding.is_pending(&ctx));

        ctx.scheduler.end_pass();
        assert_eq!(*responses.borrow(), vec![Ok(json!(7.5))]);
        assert!(!binding.is_pending(&ctx));
    }

    #[test]
    fn update_replaces_pending_call() {
        let (engine, ctx) = ready_context();
        engine.set_invoke_result("flyTo", json!(null));
        let mut binding = CallBinding::mount(&ctx, CallProps::new("flyTo", vec![json!(1)])).unwrap();
        binding
            .update(&ctx, CallProps::new("flyTo", vec![json!(2)]))
            .unwrap();
        ctx.scheduler.end_pass();

        assert_eq!(
            engine.calls(),
            vec![Call::Invoke {
                method: "flyTo".to_string(),
                args: vec![json!(2)]
            }]
        );
    }

    #[test]
    fn unknown_method_reports_error() {
        let (_engine, ctx) = ready_context();
        let failed = Rc::new(RefCell::new(false));
        let f = Rc::clone(&failed);
        let props = CallProps::new("nope", vec![])
            .on_response(Callback::new(move |res: &CallResult| *f.borrow_mut() = res.is_err()));
        CallBinding::mount(&ctx, props).unwrap();
        ctx.scheduler.end_pass();
        assert!(*failed.borrow());
    }

    #[test]
    fn unmount_cancels_pending_call() {
        let (engine, ctx) = ready_context();
        let mut binding = CallBinding::mount(&ctx, CallProps::new("resize", vec![])).unwrap();
        binding.unmount(&ctx);
        ctx.scheduler.end_pass();
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn method_is_required() {
        let (_engine, ctx) = ready_context();
        assert!(CallBinding::mount(&ctx, CallProps::default()).is_err());
    }
}
