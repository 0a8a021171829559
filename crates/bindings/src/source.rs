use std::rc::Rc;

use engine::{EngineHandle, SourceOptions};
use foundation::BindingId;
use runtime::Queue;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::binding::{Binding, BindingContext};
use crate::error::BindingError;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceProps {
    /// Registered id. Generated when absent.
    pub id: Option<String>,
    pub options: SourceOptions,
}

impl SourceProps {
    pub fn new(options: SourceOptions) -> Self {
        Self { id: None, options }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Wraps a bare geometry into a `Feature`; features and collections pass
/// through.
fn as_feature(data: &Value) -> Value {
    match data.get("type").and_then(Value::as_str) {
        Some("Feature") | Some("FeatureCollection") | None => data.clone(),
        Some(_) => json!({
            "type": "Feature",
            "properties": {},
            "geometry": data,
        }),
    }
}

pub struct SourceBinding {
    id: BindingId,
    map: EngineHandle,
    options: SourceOptions,
    removal_scheduled: bool,
}

impl SourceBinding {
    pub fn id(&self) -> &BindingId {
        &self.id
    }
}

impl Binding for SourceBinding {
    type Props = SourceProps;

    const KIND: &'static str = "source";

    fn mount(ctx: &BindingContext, props: SourceProps) -> Result<Self, BindingError> {
        let map = Rc::clone(ctx.map(Self::KIND)?);
        let id = ctx.ids.resolve(props.id.as_deref(), Self::KIND);

        debug!(id = %id, kind = %props.options.kind, "adding source");
        map.add_source(id.as_str(), &props.options)
            .map_err(|err| BindingError::engine(Self::KIND, err))?;

        Ok(SourceBinding {
            id,
            map,
            options: props.options,
            removal_scheduled: false,
        })
    }

    fn update(&mut self, _ctx: &BindingContext, props: SourceProps) -> Result<(), BindingError> {
        if props.id.as_deref().is_some_and(|id| id != self.id.as_str()) {
            warn!(
                id = %self.id,
                requested = ?props.id,
                "source id is fixed for the mount; ignoring change"
            );
        }

        let Some(source) = self.map.get_source(self.id.as_str()) else {
            warn!(id = %self.id, "source missing from map; skipping update");
            self.options = props.options;
            return Ok(());
        };

        if let Some(data) = &props.options.data {
            if self.options.data.as_ref() != Some(data) {
                match source.as_data_source() {
                    Some(target) => {
                        debug!(id = %self.id, "replacing source data");
                        target.set_data(&as_feature(data));
                    }
                    None => warn!(
                        id = %self.id,
                        kind = source.kind(),
                        "source does not accept data updates"
                    ),
                }
            }
        }

        if let Some(coordinates) = &props.options.coordinates {
            if self.options.coordinates.as_ref() != Some(coordinates) {
                match source.as_coordinate_source() {
                    Some(target) => {
                        debug!(id = %self.id, "moving source coordinates");
                        target.set_coordinates(coordinates);
                    }
                    None => warn!(
                        id = %self.id,
                        kind = source.kind(),
                        "source does not accept coordinate updates"
                    ),
                }
            }
        }

        self.options = props.options;
        Ok(())
    }

    /// Removal runs after the pass so dependent layers are gone first.
    fn unmount(&mut self, ctx: &BindingContext) {
        if self.removal_scheduled {
            return;
        }
        self.removal_scheduled = true;

        let map = Rc::clone(&self.map);
        let id = self.id.clone();
        ctx.scheduler
            .schedule(Queue::AfterRender, "source-remove", move || {
                if map.get_source(id.as_str()).is_none() {
                    debug!(id = %id, "source already gone");
                    return;
                }
                debug!(id = %id, "removing source");
                map.remove_source(id.as_str());
            });
    }
}
