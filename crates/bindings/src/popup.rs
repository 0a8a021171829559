use std::fmt;
use std::rc::Rc;

use engine::{EngineHandle, MarkerHandle, PopupHandle, PopupOptions};
use foundation::LngLat;
use tracing::debug;

use crate::binding::{Binding, BindingContext};
use crate::error::BindingError;

#[derive(Clone, Default)]
pub struct PopupProps {
    /// Owning marker. When set the popup opens with the marker and `lng_lat`
    /// is ignored.
    pub marker: Option<MarkerHandle>,
    pub lng_lat: Option<LngLat>,
    /// Construction options, laid over the configured popup defaults.
    pub options: PopupOptions,
    pub content: Option<String>,
}

impl PopupProps {
    pub fn at(lng_lat: LngLat) -> Self {
        Self {
            lng_lat: Some(lng_lat),
            ..Self::default()
        }
    }

    pub fn on_marker(marker: MarkerHandle) -> Self {
        Self {
            marker: Some(marker),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

impl fmt::Debug for PopupProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupProps")
            .field("marker", &self.marker.is_some())
            .field("lng_lat", &self.lng_lat)
            .field("options", &self.options)
            .field("content", &self.content)
            .finish()
    }
}

/// A popup either attached to the map at a position or owned by a marker.
/// The mode is fixed at mount.
pub struct PopupBinding {
    popup: PopupHandle,
    map: EngineHandle,
    marker: Option<MarkerHandle>,
    lng_lat: Option<LngLat>,
    content: Option<String>,
    removed: bool,
}

impl PopupBinding {
    pub fn handle(&self) -> PopupHandle {
        Rc::clone(&self.popup)
    }

    /// A closed popup cannot be moved in place; reopen it first.
    fn reposition(&self, lng_lat: LngLat) {
        if self.popup.is_open() {
            self.popup.set_lng_lat(lng_lat);
        } else {
            debug!(?lng_lat, "reopening closed popup at new position");
            self.popup.remove();
            self.popup.add_to(&self.map);
            self.popup.set_lng_lat(lng_lat);
        }
    }
}

impl Binding for PopupBinding {
    type Props = PopupProps;

    const KIND: &'static str = "popup";

    fn mount(ctx: &BindingContext, props: PopupProps) -> Result<Self, BindingError> {
        let map = Rc::clone(ctx.map(Self::KIND)?);
        let options = ctx.config.popup.overlay(&props.options);
        let popup = map.create_popup(&options);

        if let Some(content) = &props.content {
            popup.set_content(content);
        }

        match &props.marker {
            Some(marker) => {
                debug!("attaching popup to marker");
                marker.set_popup(Some(Rc::clone(&popup)));
            }
            None => {
                popup.add_to(&map);
                if let Some(lng_lat) = props.lng_lat {
                    popup.set_lng_lat(lng_lat);
                }
                debug!(lng_lat = ?props.lng_lat, "popup opened on map");
            }
        }

        Ok(PopupBinding {
            popup,
            map,
            marker: props.marker,
            lng_lat: props.lng_lat,
            content: props.content,
            removed: false,
        })
    }

    fn update(&mut self, _ctx: &BindingContext, props: PopupProps) -> Result<(), BindingError> {
        if props.content != self.content {
            if let Some(content) = &props.content {
                self.popup.set_content(content);
            }
            self.content = props.content;
        }

        if self.marker.is_none() {
            if let Some(lng_lat) = props.lng_lat {
                if self.lng_lat != Some(lng_lat) {
                    self.reposition(lng_lat);
                }
            }
        }
        self.lng_lat = props.lng_lat;
        Ok(())
    }

    fn unmount(&mut self, _ctx: &BindingContext) {
        if self.removed {
            return;
        }
        self.removed = true;

        if let Some(marker) = &self.marker {
            if let Some(owned) = marker.popup() {
                owned.remove();
            }
            marker.set_popup(None);
        }
        debug!("removing popup");
        self.popup.remove();
    }
}
