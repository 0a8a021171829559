use engine::LayerSpec;
use foundation::BindingId;
use serde_json::{Map, Value};
use tracing::debug;

use crate::binding::{Binding, BindingContext};
use crate::config::MapConfig;
use crate::error::BindingError;

/// Layer type used when the declaration names none.
pub const DEFAULT_LAYER_KIND: &str = "line";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerProps {
    pub layer: LayerSpec,
    /// Id of the layer this one is inserted before.
    pub before: Option<String>,
    /// Source id inherited from an enclosing source node. The layer's own
    /// `source` wins.
    pub source_id: Option<String>,
}

impl LayerProps {
    pub fn new(layer: LayerSpec) -> Self {
        Self {
            layer,
            ..Self::default()
        }
    }

    pub fn before(mut self, id: impl Into<String>) -> Self {
        self.before = Some(id.into());
        self
    }
}

fn merge_under(defaults: &Map<String, Value>, declared: &mut Map<String, Value>) {
    for (k, v) in defaults {
        if !declared.contains_key(k) {
            declared.insert(k.clone(), v.clone());
        }
    }
}

/// Fills in id, type, source and configured per-type defaults.
fn resolve(config: &MapConfig, id: &BindingId, props: &LayerProps) -> LayerSpec {
    let mut layer = props.layer.clone();
    layer.id = Some(id.to_string());
    let kind = layer
        .kind
        .get_or_insert_with(|| DEFAULT_LAYER_KIND.to_string())
        .clone();
    if layer.source.is_none() {
        layer.source = props.source_id.clone();
    }
    if let Some(defaults) = config.layer_defaults(&kind) {
        merge_under(&defaults.layout, &mut layer.layout);
        merge_under(&defaults.paint, &mut layer.paint);
    }
    layer
}

pub struct LayerBinding {
    id: BindingId,
    resolved: LayerSpec,
    removed: bool,
}

impl LayerBinding {
    pub fn id(&self) -> &BindingId {
        &self.id
    }

    /// The declaration as last sent to the engine.
    pub fn resolved(&self) -> &LayerSpec {
        &self.resolved
    }
}

impl Binding for LayerBinding {
    type Props = LayerProps;

    const KIND: &'static str = "layer";

    fn mount(ctx: &BindingContext, props: LayerProps) -> Result<Self, BindingError> {
        let map = ctx.map(Self::KIND)?;
        let id = ctx.ids.resolve(props.layer.id.as_deref(), Self::KIND);
        let resolved = resolve(&ctx.config, &id, &props);

        debug!(
            id = %id,
            kind = ?resolved.kind,
            source = ?resolved.source,
            before = ?props.before,
            "adding layer"
        );
        map.add_layer(&resolved, props.before.as_deref())
            .map_err(|err| BindingError::engine(Self::KIND, err))?;

        Ok(LayerBinding {
            id,
            resolved,
            removed: false,
        })
    }

    /// Sets only what the new declaration carries and what changed.
    fn update(&mut self, ctx: &BindingContext, props: LayerProps) -> Result<(), BindingError> {
        let map = ctx.map(Self::KIND)?;
        let next = resolve(&ctx.config, &self.id, &props);
        let id = self.id.as_str();
        let prev = &self.resolved;

        for (name, value) in &next.layout {
            if prev.layout.get(name) != Some(value) {
                map.set_layout_property(id, name, value);
            }
        }
        for (name, value) in &next.paint {
            if prev.paint.get(name) != Some(value) {
                map.set_paint_property(id, name, value);
            }
        }
        if next.filter.is_some() && next.filter != prev.filter {
            map.set_filter(id, next.filter.as_ref());
        }
        if let (Some(min), Some(max)) = (next.minzoom, next.maxzoom) {
            if prev.minzoom != Some(min) || prev.maxzoom != Some(max) {
                map.set_layer_zoom_range(id, min, max);
            }
        }

        self.resolved = next;
        Ok(())
    }

    fn unmount(&mut self, ctx: &BindingContext) {
        if self.removed {
            return;
        }
        self.removed = true;
        match ctx.map_if_present() {
            Some(map) => {
                debug!(id = %self.id, "removing layer");
                map.remove_layer(self.id.as_str());
            }
            None => debug!(id = %self.id, "map gone; layer not removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use engine::testing::{Call, RecordingEngine};
    use engine::{LayerSpec, MapEngine, SourceOptions};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{LayerBinding, LayerProps};
    use crate::binding::test_support::{ready_context, ready_context_with};
    use crate::binding::Binding;
    use crate::config::MapConfig;

    fn with_source(map: &RecordingEngine, id: &str) {
        map.add_source(id, &SourceOptions::geojson(json!({"type": "FeatureCollection", "features": []})))
            .unwrap();
        map.clear_calls();
    }

    #[test]
    fn fills_defaults() {
        let (engine, ctx) = ready_context();
        with_source(&engine, "s1");
        let mut props = LayerProps::new(LayerSpec::default());
        props.source_id = Some("s1".to_string());

        let binding = LayerBinding::mount(&ctx, props).unwrap();
        assert!(binding.id().as_str().starts_with("layer-"));
        assert_eq!(binding.resolved().kind.as_deref(), Some("line"));
        assert_eq!(binding.resolved().source.as_deref(), Some("s1"));
        assert_eq!(engine.layer_ids(), vec![binding.id().to_string()]);
    }

    #[test]
    fn declared_source_wins_over_inherited() {
        let (engine, ctx) = ready_context();
        with_source(&engine, "own");
        let mut props = LayerProps::new(LayerSpec::new("circle").with_source("own"));
        props.source_id = Some("outer".to_string());
        let binding = LayerBinding::mount(&ctx, props).unwrap();
        assert_eq!(binding.resolved().source.as_deref(), Some("own"));
    }

    #[test]
    fn configured_defaults_sit_under_declared_values() {
        let config = MapConfig::from_json_str(
            r##"{"layers": {"circle": {"paint": {"circle-radius": 4, "circle-color": "#000"}}}}"##,
        )
        .unwrap();
        let (engine, ctx) = ready_context_with(config);
        with_source(&engine, "s1");

        let layer = LayerSpec::new("circle")
            .with_source("s1")
            .paint("circle-color", json!("#f00"));
        let binding = LayerBinding::mount(&ctx, LayerProps::new(layer)).unwrap();
        assert_eq!(binding.resolved().paint.get("circle-radius"), Some(&json!(4)));
        assert_eq!(binding.resolved().paint.get("circle-color"), Some(&json!("#f00")));
    }

    #[test]
    fn update_sets_only_changed_properties() {
        let (engine, ctx) = ready_context();
        with_source(&engine, "s1");
        let base = LayerSpec::new("line")
            .with_id("roads")
            .with_source("s1")
            .layout("line-cap", json!("round"))
            .paint("line-width", json!(1));
        let mut binding = LayerBinding::mount(&ctx, LayerProps::new(base.clone())).unwrap();
        engine.clear_calls();

        let mut next = base.paint("line-width", json!(3));
        next.filter = Some(json!(["==", "class", "motorway"]));
        next.minzoom = Some(4.0);
        next.maxzoom = Some(12.0);
        binding.update(&ctx, LayerProps::new(next.clone())).unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                Call::SetPaintProperty {
                    layer: "roads".to_string(),
                    name: "line-width".to_string(),
                    value: json!(3)
                },
                Call::SetFilter {
                    layer: "roads".to_string(),
                    filter: Some(json!(["==", "class", "motorway"]))
                },
                Call::SetLayerZoomRange {
                    layer: "roads".to_string(),
                    min_zoom: 4.0,
                    max_zoom: 12.0
                },
            ]
        );

        engine.clear_calls();
        binding.update(&ctx, LayerProps::new(next)).unwrap();
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn zoom_range_needs_both_bounds() {
        let (engine, ctx) = ready_context();
        with_source(&engine, "s1");
        let base = LayerSpec::new("fill").with_id("f").with_source("s1");
        let mut binding = LayerBinding::mount(&ctx, LayerProps::new(base.clone())).unwrap();
        engine.clear_calls();

        let mut next = base;
        next.minzoom = Some(3.0);
        binding.update(&ctx, LayerProps::new(next)).unwrap();
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn inserts_before_sibling() {
        let (engine, ctx) = ready_context();
        with_source(&engine, "s1");
        LayerBinding::mount(&ctx, LayerProps::new(LayerSpec::new("line").with_id("top").with_source("s1")))
            .unwrap();
        LayerBinding::mount(
            &ctx,
            LayerProps::new(LayerSpec::new("line").with_id("under").with_source("s1")).before("top"),
        )
        .unwrap();
        assert_eq!(engine.layer_ids(), vec!["under".to_string(), "top".to_string()]);
    }

    #[test]
    fn unmount_tolerates_missing_map() {
        let (engine, ctx) = ready_context();
        with_source(&engine, "s1");
        let mut binding = LayerBinding::mount(
            &ctx,
            LayerProps::new(LayerSpec::new("line").with_id("l").with_source("s1")),
        )
        .unwrap();
        engine.clear_calls();

        binding.unmount(&ctx.without_map());
        binding.unmount(&ctx);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn missing_source_is_rejected_by_engine() {
        let (_engine, ctx) = ready_context();
        let props = LayerProps::new(LayerSpec::new("line").with_source("nope"));
        assert!(LayerBinding::mount(&ctx, props).is_err());
    }
}
