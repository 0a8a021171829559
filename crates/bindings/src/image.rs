use std::cell::RefCell;
use std::rc::{Rc, Weak};

use engine::{EngineHandle, ImageData, ImageOptions, ImageSize};
use tracing::{debug, error, warn};

use crate::binding::{Binding, BindingContext};
use crate::callback::Callback;
use crate::error::{BindingError, ImageError};

#[derive(Debug, Clone, Default)]
pub struct ImageProps {
    /// Name the image is registered under.
    pub name: String,
    /// No url means nothing is loaded.
    pub url: Option<String>,
    pub options: ImageOptions,
    /// Raster size requested for vector images.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub on_load: Option<Callback<()>>,
    pub on_error: Option<Callback<ImageError>>,
}

impl ImageProps {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    fn is_vector(&self) -> bool {
        self.url.as_deref().is_some_and(|url| url.ends_with(".svg"))
    }

    fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width,
            height: self.height,
        }
    }

    fn load_inputs_differ(&self, other: &ImageProps) -> bool {
        self.name != other.name
            || self.url != other.url
            || self.width != other.width
            || self.height != other.height
    }
}

/// State shared with in-flight load callbacks.
struct ImageState {
    map: EngineHandle,
    props: ImageProps,
    /// Name of the image this binding last added.
    last_name: Option<String>,
    /// Bumped by every load; a result is only used if it carries the latest.
    generation: u64,
    destroyed: bool,
}

/// Registers at most one image per binding, always the most recently
/// requested one.
///
/// Loads complete asynchronously. Each load captures the generation that
/// started it, and on completion its result is dropped unless the binding is
/// still alive and no later load has been requested. Two loads of the same
/// url (a size change, or `a -> b -> a`) are therefore still told apart.
pub struct ImageBinding {
    state: Rc<RefCell<ImageState>>,
}

impl ImageBinding {
    /// Name of the image currently added by this binding, if any.
    pub fn added_name(&self) -> Option<String> {
        self.state.borrow().last_name.clone()
    }

    fn load(&self) {
        let (map, props, generation) = {
            let mut state = self.state.borrow_mut();
            state.generation += 1;
            if let Some(last) = state.last_name.take() {
                if state.map.has_image(&last) {
                    debug!(name = %last, "removing previously added image");
                    state.map.remove_image(&last);
                }
            }
            (Rc::clone(&state.map), state.props.clone(), state.generation)
        };

        let Some(url) = props.url.clone() else {
            return;
        };

        let weak = Rc::downgrade(&self.state);
        if props.is_vector() {
            debug!(%url, size = ?props.size(), "loading vector image");
            let captured = url.clone();
            map.load_vector_image(
                &url,
                props.size(),
                Box::new(move |result| {
                    let result = result.map_err(|event| ImageError::VectorDecode {
                        url: captured.clone(),
                        event,
                    });
                    on_image(&weak, generation, &captured, result);
                }),
            );
        } else {
            debug!(%url, "loading image");
            let captured = url.clone();
            map.load_image(
                &url,
                Box::new(move |result| {
                    let result = result.map_err(|source| ImageError::Load {
                        url: captured.clone(),
                        source,
                    });
                    on_image(&weak, generation, &captured, result);
                }),
            );
        }
    }
}

fn on_image(
    state: &Weak<RefCell<ImageState>>,
    generation: u64,
    url: &str,
    result: Result<ImageData, ImageError>,
) {
    let Some(state) = state.upgrade() else {
        return;
    };

    let (map, props) = {
        let s = state.borrow();
        if s.destroyed {
            debug!(%url, "image binding destroyed; dropping load result");
            return;
        }
        if s.generation != generation {
            debug!(%url, generation, current = s.generation, "stale image load; dropping result");
            return;
        }
        (Rc::clone(&s.map), s.props.clone())
    };

    let image = match result {
        Ok(image) => image,
        Err(err) => {
            warn!(error = %err, "image load failed");
            if let Some(on_error) = &props.on_error {
                on_error.call(&err);
            }
            return;
        }
    };

    if let Err(source) = map.add_image(&props.name, image, &props.options) {
        let err = ImageError::Add {
            name: props.name.clone(),
            source,
        };
        error!(error = %err, "engine rejected image");
        if let Some(on_error) = &props.on_error {
            on_error.call(&err);
        }
        return;
    }

    debug!(name = %props.name, %url, "image added");
    state.borrow_mut().last_name = Some(props.name.clone());
    if let Some(on_load) = &props.on_load {
        on_load.call(&());
    }
}

impl Binding for ImageBinding {
    type Props = ImageProps;

    const KIND: &'static str = "image";

    fn mount(ctx: &BindingContext, props: ImageProps) -> Result<Self, BindingError> {
        let map = Rc::clone(ctx.map(Self::KIND)?);
        if props.name.is_empty() {
            return Err(BindingError::missing(Self::KIND, "name"));
        }

        let binding = ImageBinding {
            state: Rc::new(RefCell::new(ImageState {
                map,
                props,
                last_name: None,
                generation: 0,
                destroyed: false,
            })),
        };
        binding.load();
        Ok(binding)
    }

    fn update(&mut self, _ctx: &BindingContext, props: ImageProps) -> Result<(), BindingError> {
        if props.name.is_empty() {
            return Err(BindingError::missing(Self::KIND, "name"));
        }

        let reload = {
            let mut state = self.state.borrow_mut();
            let reload = state.props.load_inputs_differ(&props);
            state.props = props;
            reload
        };
        if reload {
            self.load();
        }
        Ok(())
    }

    fn unmount(&mut self, _ctx: &BindingContext) {
        let mut state = self.state.borrow_mut();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(last) = state.last_name.take() {
            if state.map.has_image(&last) {
                debug!(name = %last, "removing image on unmount");
                state.map.remove_image(&last);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use engine::testing::{Call, RecordingEngine};
    use engine::{ImageOptions, ImageSize};
    use pretty_assertions::assert_eq;

    use super::{ImageBinding, ImageProps};
    use crate::binding::test_support::ready_context;
    use crate::binding::Binding;
    use crate::callback::Callback;
    use crate::error::ImageError;

    #[test]
    fn raster_load_adds_image_and_reports() {
        let (engine, ctx) = ready_context();
        let loaded = Rc::new(RefCell::new(0));
        let l = Rc::clone(&loaded);
        let props = ImageProps {
            on_load: Some(Callback::new(move |_| *l.borrow_mut() += 1)),
            ..ImageProps::new("cat", "cat.png")
        };

        let binding = ImageBinding::mount(&ctx, props).unwrap();
        assert!(engine.image_names().is_empty());
        assert!(engine.complete_load("cat.png"));

        assert_eq!(engine.image_names(), vec!["cat".to_string()]);
        assert_eq!(binding.added_name().as_deref(), Some("cat"));
        assert_eq!(*loaded.borrow(), 1);
    }

    #[test]
    fn svg_takes_vector_path_with_size() {
        let (engine, ctx) = ready_context();
        let props = ImageProps {
            width: Some(24),
            height: Some(32),
            ..ImageProps::new("pin", "icons/pin.svg")
        };
        let _binding = ImageBinding::mount(&ctx, props).unwrap();

        assert_eq!(
            engine.calls(),
            vec![Call::LoadVectorImage {
                url: "icons/pin.svg".to_string(),
                size: ImageSize {
                    width: Some(24),
                    height: Some(32)
                },
            }]
        );
    }

    #[test]
    fn vector_decode_failure_is_distinguished() {
        let (engine, ctx) = ready_context();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let e = Rc::clone(&errors);
        let props = ImageProps {
            on_error: Some(Callback::new(move |err: &ImageError| {
                e.borrow_mut().push(err.clone())
            })),
            ..ImageProps::new("pin", "pin.svg")
        };
        let _binding = ImageBinding::mount(&ctx, props).unwrap();
        engine.fail_load("pin.svg", "decode failed");

        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ImageError::VectorDecode { url, .. } if url == "pin.svg"));
        assert!(engine.image_names().is_empty());
    }

    #[test]
    fn stale_loads_are_discarded() {
        let (engine, ctx) = ready_context();
        let errors = Rc::new(RefCell::new(0));
        let e = Rc::clone(&errors);
        let on_error = Callback::new(move |_: &ImageError| *e.borrow_mut() += 1);

        let props = |url: &str| ImageProps {
            on_error: Some(on_error.clone()),
            ..ImageProps::new("icon", url)
        };
        let mut binding = ImageBinding::mount(&ctx, props("a.png")).unwrap();
        binding.update(&ctx, props("b.png")).unwrap();

        engine.fail_load("a.png", "404");
        engine.complete_load("b.png");

        assert_eq!(*errors.borrow(), 0);
        assert_eq!(engine.image_names(), vec!["icon".to_string()]);
    }

    #[test]
    fn reload_removes_previous_image_first() {
        let (engine, ctx) = ready_context();
        let mut binding = ImageBinding::mount(&ctx, ImageProps::new("a", "a.png")).unwrap();
        engine.complete_load("a.png");

        binding.update(&ctx, ImageProps::new("b", "a.png")).unwrap();
        assert!(engine.image_names().is_empty());
        engine.complete_load("a.png");
        assert_eq!(engine.image_names(), vec!["b".to_string()]);
    }

    #[test]
    fn unchanged_inputs_do_not_reload() {
        let (engine, ctx) = ready_context();
        let mut binding = ImageBinding::mount(&ctx, ImageProps::new("a", "a.png")).unwrap();
        let props = ImageProps {
            options: ImageOptions {
                sdf: Some(true),
                ..ImageOptions::default()
            },
            ..ImageProps::new("a", "a.png")
        };
        binding.update(&ctx, props).unwrap();

        assert_eq!(engine.pending_loads(), vec!["a.png".to_string()]);
        engine.complete_load("a.png");
        assert_eq!(
            engine.calls().last(),
            Some(&Call::AddImage {
                name: "a".to_string(),
                options: ImageOptions {
                    pixel_ratio: None,
                    sdf: Some(true)
                },
            })
        );
    }

    #[test]
    fn unmount_removes_image_and_ignores_late_results() {
        let (engine, ctx) = ready_context();
        let mut binding = ImageBinding::mount(&ctx, ImageProps::new("a", "a.png")).unwrap();
        engine.complete_load("a.png");
        binding.update(&ctx, ImageProps::new("a", "b.png")).unwrap();
        engine.complete_load("b.png");

        binding.unmount(&ctx);
        assert!(engine.image_names().is_empty());

        let mut binding = ImageBinding::mount(&ctx, ImageProps::new("c", "c.png")).unwrap();
        binding.unmount(&ctx);
        engine.complete_load("c.png");
        assert!(engine.image_names().is_empty());
    }

    fn counting_props(name: &str, url: &str) -> (ImageProps, Rc<RefCell<(u32, u32)>>) {
        let counts = Rc::new(RefCell::new((0, 0)));
        let (l, e) = (Rc::clone(&counts), Rc::clone(&counts));
        let props = ImageProps {
            on_load: Some(Callback::new(move |_| l.borrow_mut().0 += 1)),
            on_error: Some(Callback::new(move |_: &ImageError| e.borrow_mut().1 += 1)),
            ..ImageProps::new(name, url)
        };
        (props, counts)
    }

    fn added(engine: &RecordingEngine) -> usize {
        engine
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::AddImage { .. }))
            .count()
    }

    #[test]
    fn size_change_with_same_url_adds_only_latest() {
        let (engine, ctx) = ready_context();
        let (props, counts) = counting_props("pin", "pin.svg");
        let mut binding = ImageBinding::mount(
            &ctx,
            ImageProps {
                width: Some(16),
                ..props.clone()
            },
        )
        .unwrap();
        binding
            .update(
                &ctx,
                ImageProps {
                    width: Some(32),
                    ..props
                },
            )
            .unwrap();

        assert!(engine.complete_load("pin.svg"));
        assert!(engine.complete_load("pin.svg"));

        assert_eq!(added(&engine), 1);
        assert_eq!(*counts.borrow(), (1, 0));
        assert_eq!(engine.image_names(), vec!["pin".to_string()]);
    }

    #[test]
    fn url_switched_back_adds_only_latest() {
        let (engine, ctx) = ready_context();
        let (props, counts) = counting_props("icon", "a.png");
        let with_url = |url: &str| ImageProps {
            url: Some(url.to_string()),
            ..props.clone()
        };
        let mut binding = ImageBinding::mount(&ctx, with_url("a.png")).unwrap();
        binding.update(&ctx, with_url("b.png")).unwrap();
        binding.update(&ctx, with_url("a.png")).unwrap();

        engine.complete_load("a.png");
        engine.complete_load("b.png");
        engine.complete_load("a.png");

        assert_eq!(added(&engine), 1);
        assert_eq!(*counts.borrow(), (1, 0));
        assert_eq!(binding.added_name().as_deref(), Some("icon"));
    }

    #[test]
    fn missing_url_loads_nothing() {
        let (engine, ctx) = ready_context();
        let props = ImageProps {
            name: "empty".to_string(),
            ..ImageProps::default()
        };
        let _binding = ImageBinding::mount(&ctx, props).unwrap();
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn requires_map_and_name() {
        let (_engine, ctx) = ready_context();
        assert!(ImageBinding::mount(&ctx.without_map(), ImageProps::new("a", "a.png")).is_err());
        assert!(ImageBinding::mount(&ctx, ImageProps::new("", "a.png")).is_err());
    }
}
