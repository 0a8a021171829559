use engine::{MarkerHandle, MarkerOptions};
use foundation::LngLat;
use tracing::debug;

use crate::binding::{Binding, BindingContext};
use crate::error::BindingError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerProps {
    pub lng_lat: Option<LngLat>,
    /// Construction options, laid over the configured marker defaults. Only
    /// read at mount.
    pub options: MarkerOptions,
}

impl MarkerProps {
    pub fn at(lng_lat: LngLat) -> Self {
        Self {
            lng_lat: Some(lng_lat),
            options: MarkerOptions::default(),
        }
    }
}

pub struct MarkerBinding {
    marker: MarkerHandle,
    lng_lat: LngLat,
    removed: bool,
}

impl MarkerBinding {
    /// The engine marker, for popups and event bindings nested under it.
    pub fn handle(&self) -> MarkerHandle {
        self.marker.clone()
    }
}

impl Binding for MarkerBinding {
    type Props = MarkerProps;

    const KIND: &'static str = "marker";

    fn mount(ctx: &BindingContext, props: MarkerProps) -> Result<Self, BindingError> {
        let map = ctx.map(Self::KIND)?;
        let lng_lat = props
            .lng_lat
            .ok_or_else(|| BindingError::missing(Self::KIND, "lng_lat"))?;

        let options = ctx.config.marker.overlay(&props.options);
        let marker = map.create_marker(&options);
        marker.set_lng_lat(lng_lat);
        marker.add_to(map);
        debug!(?lng_lat, "marker added");

        Ok(MarkerBinding {
            marker,
            lng_lat,
            removed: false,
        })
    }

    fn update(&mut self, _ctx: &BindingContext, props: MarkerProps) -> Result<(), BindingError> {
        let lng_lat = props
            .lng_lat
            .ok_or_else(|| BindingError::missing(Self::KIND, "lng_lat"))?;
        if lng_lat != self.lng_lat {
            self.marker.set_lng_lat(lng_lat);
            self.lng_lat = lng_lat;
        }
        Ok(())
    }

    fn unmount(&mut self, _ctx: &BindingContext) {
        if self.removed {
            return;
        }
        self.removed = true;
        debug!(lng_lat = ?self.lng_lat, "removing marker");
        self.marker.remove();
    }
}
