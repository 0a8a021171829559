use std::fmt;
use std::rc::Rc;

use engine::{ControlHandle, ControlPosition};
use tracing::debug;

use crate::binding::{Binding, BindingContext};
use crate::error::BindingError;

#[derive(Clone, Default)]
pub struct ControlProps {
    pub control: Option<ControlHandle>,
    pub position: Option<ControlPosition>,
}

impl ControlProps {
    pub fn new(control: ControlHandle) -> Self {
        Self {
            control: Some(control),
            position: None,
        }
    }

    pub fn at(mut self, position: ControlPosition) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Debug for ControlProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlProps")
            .field("control", &self.control.as_ref().map(|c| c.kind().to_string()))
            .field("position", &self.position)
            .finish()
    }
}

/// Controls are immutable once added.
pub struct ControlBinding {
    control: ControlHandle,
    removed: bool,
}

impl Binding for ControlBinding {
    type Props = ControlProps;

    const KIND: &'static str = "control";

    fn mount(ctx: &BindingContext, props: ControlProps) -> Result<Self, BindingError> {
        let map = ctx.map(Self::KIND)?;
        let control = props
            .control
            .ok_or_else(|| BindingError::missing(Self::KIND, "control"))?;

        debug!(kind = control.kind(), position = ?props.position, "adding control");
        map.add_control(Rc::clone(&control), props.position);
        Ok(ControlBinding {
            control,
            removed: false,
        })
    }

    fn update(&mut self, _ctx: &BindingContext, props: ControlProps) -> Result<(), BindingError> {
        if let Some(control) = &props.control {
            if !Rc::ptr_eq(control, &self.control) {
                debug!(
                    kind = control.kind(),
                    "controls cannot be swapped after mount; ignoring"
                );
            }
        }
        Ok(())
    }

    fn unmount(&mut self, ctx: &BindingContext) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Some(map) = ctx.map_if_present() {
            debug!(kind = self.control.kind(), "removing control");
            map.remove_control(&self.control);
        }
    }
}

#[cfg(test)]
mod tests {
    use engine::testing::{Call, TestControl};
    use engine::ControlPosition;
    use pretty_assertions::assert_eq;

    use super::{ControlBinding, ControlProps};
    use crate::binding::test_support::ready_context;
    use crate::binding::Binding;

    #[test]
    fn adds_at_position_and_removes() {
        let (engine, ctx) = ready_context();
        let props = ControlProps::new(TestControl::handle("navigation")).at(ControlPosition::TopLeft);
        let mut binding = ControlBinding::mount(&ctx, props).unwrap();
        assert_eq!(engine.control_count(), 1);

        binding.update(&ctx, ControlProps::new(TestControl::handle("scale"))).unwrap();
        binding.unmount(&ctx);
        binding.unmount(&ctx);

        assert_eq!(
            engine.calls(),
            vec![
                Call::AddControl {
                    kind: "navigation".to_string(),
                    position: Some(ControlPosition::TopLeft)
                },
                Call::RemoveControl {
                    kind: "navigation".to_string()
                },
            ]
        );
        assert_eq!(engine.control_count(), 0);
    }

    #[test]
    fn control_is_required() {
        let (_engine, ctx) = ready_context();
        assert!(ControlBinding::mount(&ctx, ControlProps::default()).is_err());
    }
}
