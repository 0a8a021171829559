use std::fmt;

use engine::{EventSource, MarkerHandle};

use crate::binding::{Binding, BindingContext};
use crate::call::{CallBinding, CallProps};
use crate::control::{ControlBinding, ControlProps};
use crate::error::BindingError;
use crate::event::{EventBinding, EventProps};
use crate::image::{ImageBinding, ImageProps};
use crate::layer::{LayerBinding, LayerProps};
use crate::marker::{MarkerBinding, MarkerProps};
use crate::popup::{PopupBinding, PopupProps};
use crate::source::{SourceBinding, SourceProps};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Source,
    Layer,
    Image,
    Marker,
    Popup,
    Control,
    Event,
    Call,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Source => SourceBinding::KIND,
            NodeKind::Layer => LayerBinding::KIND,
            NodeKind::Image => ImageBinding::KIND,
            NodeKind::Marker => MarkerBinding::KIND,
            NodeKind::Popup => PopupBinding::KIND,
            NodeKind::Control => ControlBinding::KIND,
            NodeKind::Event => EventBinding::KIND,
            NodeKind::Call => CallBinding::KIND,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of one declarative node.
#[derive(Debug, Clone)]
pub enum NodeProps {
    Source(SourceProps),
    Layer(LayerProps),
    Image(ImageProps),
    Marker(MarkerProps),
    Popup(PopupProps),
    Control(ControlProps),
    Event(EventProps),
    Call(CallProps),
}

impl NodeProps {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeProps::Source(_) => NodeKind::Source,
            NodeProps::Layer(_) => NodeKind::Layer,
            NodeProps::Image(_) => NodeKind::Image,
            NodeProps::Marker(_) => NodeKind::Marker,
            NodeProps::Popup(_) => NodeKind::Popup,
            NodeProps::Control(_) => NodeKind::Control,
            NodeProps::Event(_) => NodeKind::Event,
            NodeProps::Call(_) => NodeKind::Call,
        }
    }

    /// Fills inputs a node takes from its enclosing node: a layer's source id,
    /// a popup's owning marker, an event's source (the map when the parent
    /// offers none). Values the props already carry win.
    pub fn inherit(mut self, parent: Option<&Node>, ctx: &BindingContext) -> Self {
        match &mut self {
            NodeProps::Layer(props) if props.source_id.is_none() => {
                props.source_id = parent.and_then(Node::source_id);
            }
            NodeProps::Popup(props) if props.marker.is_none() => {
                props.marker = parent.and_then(Node::marker);
            }
            NodeProps::Event(props) if props.source.is_none() => {
                props.source = parent
                    .and_then(Node::event_source)
                    .or_else(|| ctx.map_if_present().cloned().map(EventSource::Map));
            }
            _ => {}
        }
        self
    }
}

macro_rules! impl_from_props {
    ($($variant:ident($props:ty)),* $(,)?) => {
        $(
            impl From<$props> for NodeProps {
                fn from(props: $props) -> Self {
                    NodeProps::$variant(props)
                }
            }
        )*
    };
}

impl_from_props!(
    Source(SourceProps),
    Layer(LayerProps),
    Image(ImageProps),
    Marker(MarkerProps),
    Popup(PopupProps),
    Control(ControlProps),
    Event(EventProps),
    Call(CallProps),
);

/// A mounted node: the closed set of binding kinds behind one lifecycle.
pub enum Node {
    Source(SourceBinding),
    Layer(LayerBinding),
    Image(ImageBinding),
    Marker(MarkerBinding),
    Popup(PopupBinding),
    Control(ControlBinding),
    Event(EventBinding),
    Call(CallBinding),
}

impl Node {
    pub fn mount(ctx: &BindingContext, props: NodeProps) -> Result<Node, BindingError> {
        Ok(match props {
            NodeProps::Source(p) => Node::Source(SourceBinding::mount(ctx, p)?),
            NodeProps::Layer(p) => Node::Layer(LayerBinding::mount(ctx, p)?),
            NodeProps::Image(p) => Node::Image(ImageBinding::mount(ctx, p)?),
            NodeProps::Marker(p) => Node::Marker(MarkerBinding::mount(ctx, p)?),
            NodeProps::Popup(p) => Node::Popup(PopupBinding::mount(ctx, p)?),
            NodeProps::Control(p) => Node::Control(ControlBinding::mount(ctx, p)?),
            NodeProps::Event(p) => Node::Event(EventBinding::mount(ctx, p)?),
            NodeProps::Call(p) => Node::Call(CallBinding::mount(ctx, p)?),
        })
    }

    pub fn update(&mut self, ctx: &BindingContext, props: NodeProps) -> Result<(), BindingError> {
        match (self, props) {
            (Node::Source(b), NodeProps::Source(p)) => b.update(ctx, p),
            (Node::Layer(b), NodeProps::Layer(p)) => b.update(ctx, p),
            (Node::Image(b), NodeProps::Image(p)) => b.update(ctx, p),
            (Node::Marker(b), NodeProps::Marker(p)) => b.update(ctx, p),
            (Node::Popup(b), NodeProps::Popup(p)) => b.update(ctx, p),
            (Node::Control(b), NodeProps::Control(p)) => b.update(ctx, p),
            (Node::Event(b), NodeProps::Event(p)) => b.update(ctx, p),
            (Node::Call(b), NodeProps::Call(p)) => b.update(ctx, p),
            (node, props) => Err(BindingError::KindMismatch {
                expected: node.kind().as_str(),
                got: props.kind().as_str(),
            }),
        }
    }

    pub fn unmount(&mut self, ctx: &BindingContext) {
        match self {
            Node::Source(b) => b.unmount(ctx),
            Node::Layer(b) => b.unmount(ctx),
            Node::Image(b) => b.unmount(ctx),
            Node::Marker(b) => b.unmount(ctx),
            Node::Popup(b) => b.unmount(ctx),
            Node::Control(b) => b.unmount(ctx),
            Node::Event(b) => b.unmount(ctx),
            Node::Call(b) => b.unmount(ctx),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Source(_) => NodeKind::Source,
            Node::Layer(_) => NodeKind::Layer,
            Node::Image(_) => NodeKind::Image,
            Node::Marker(_) => NodeKind::Marker,
            Node::Popup(_) => NodeKind::Popup,
            Node::Control(_) => NodeKind::Control,
            Node::Event(_) => NodeKind::Event,
            Node::Call(_) => NodeKind::Call,
        }
    }

    pub fn source_id(&self) -> Option<String> {
        match self {
            Node::Source(b) => Some(b.id().to_string()),
            _ => None,
        }
    }

    pub fn marker(&self) -> Option<MarkerHandle> {
        match self {
            Node::Marker(b) => Some(b.handle()),
            _ => None,
        }
    }

    pub fn event_source(&self) -> Option<EventSource> {
        match self {
            Node::Marker(b) => Some(EventSource::Marker(b.handle())),
            Node::Popup(b) => Some(EventSource::Popup(b.handle())),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node::{}", self.kind())
    }
}
