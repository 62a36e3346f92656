//! The render-call policy shared by every effect.
//!
//! Fetch the images the call needs, run the processor over the render
//! window, and let the images drop on the way out. A failed fetch while the
//! host is aborting is not an error: the output is being discarded anyway.

use crate::core::error::{OfxResult, RenderError};
use crate::core::geometry::RectI;
use crate::core::handle::{ClipHandle, EffectHandle};
use crate::render::image::Image;
use crate::render::processor::{PixelKernel, ProcessOutcome, Processor, RenderOptions};
use crate::suite::HostSuites;
use log::{debug, warn};

/// How a render call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The window was processed, possibly stopping early on abort.
    Processed(ProcessOutcome),
    /// An image could not be fetched because the host is aborting.
    Aborted,
}

impl RenderOutcome {
    /// True if the call stopped because of an abort.
    pub fn was_aborted(&self) -> bool {
        match self {
            RenderOutcome::Processed(outcome) => outcome.aborted,
            RenderOutcome::Aborted => true,
        }
    }
}

/// A named clip of the instance being rendered.
#[derive(Debug, Clone, Copy)]
pub struct ClipRef<'a> {
    /// Clip handle.
    pub handle: ClipHandle,
    /// Clip name, for diagnostics.
    pub name: &'a str,
}

/// Render helper bound to one instance.
pub struct RenderEngine<'a> {
    suites: &'a HostSuites,
    effect: EffectHandle,
    options: RenderOptions,
}

impl<'a> RenderEngine<'a> {
    /// Create an engine for `effect`.
    pub fn new(suites: &'a HostSuites, effect: EffectHandle) -> Self {
        Self {
            suites,
            effect,
            options: RenderOptions::default(),
        }
    }

    /// Set per-call options.
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// True if the host has asked the current call to stop.
    pub fn is_aborted(&self) -> bool {
        self.suites.image_effect.abort(self.effect)
    }

    /// Fetch an image. `Ok(None)` means the fetch failed while aborting.
    pub fn fetch(&self, clip: ClipRef<'_>, time: f64) -> OfxResult<Option<Image>> {
        match self.suites.image_effect.clip_get_image(clip.handle, time, None) {
            Ok(image) => Ok(Some(image)),
            Err(_) if self.is_aborted() => {
                debug!("Fetch from '{}' at {} failed during abort", clip.name, time);
                Ok(None)
            }
            Err(e) => {
                warn!("Fetch from '{}' at {} failed: {}", clip.name, time, e);
                Err(RenderError::FetchFailed {
                    clip: clip.name.to_string(),
                    time,
                }
                .into())
            }
        }
    }

    /// Fetch the output (and source, if any) at `time` and run `kernel`
    /// over `window`.
    pub fn render<K: PixelKernel>(
        &self,
        kernel: &K,
        output: ClipRef<'_>,
        source: Option<ClipRef<'_>>,
        time: f64,
        window: RectI,
    ) -> OfxResult<RenderOutcome> {
        let Some(mut dst) = self.fetch(output, time)? else {
            return Ok(RenderOutcome::Aborted);
        };
        let src = match source {
            Some(clip) => match self.fetch(clip, time)? {
                Some(image) => Some(image),
                None => return Ok(RenderOutcome::Aborted),
            },
            None => None,
        };

        let abort = || self.is_aborted();
        let processor = Processor::new(&abort)
            .with_multi_thread(self.suites.multi_thread.as_deref())
            .with_options(self.options);
        let src_view = src.as_ref().map(|image| image.view());
        let outcome = processor.process(kernel, src_view.as_ref(), dst.view_mut()?, window)?;
        Ok(RenderOutcome::Processed(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::Status;
    use crate::core::types::Context;
    use crate::host::testing::{filter_inputs, host_with, solid_source, Fixture};
    use crate::host::HostConfig;
    use crate::plugin::OUTPUT_CLIP;
    use crate::render::Pixel;
    use crate::suite::PluginContext;

    struct Passthrough;

    impl PixelKernel for Passthrough {
        fn apply<P: Pixel>(&self, _x: i32, _y: i32, src: &[P], dst: &mut [P]) {
            dst.copy_from_slice(src);
        }
    }

    #[test]
    fn test_fetch_failure_is_an_error_unless_aborting() {
        let id = "org.ofxrs.test.engine";
        let host = host_with(HostConfig::default(), vec![Fixture::new(id)]);
        let instance = host
            .create_instance(id, Context::Filter, filter_inputs(solid_source([0.5; 4])))
            .unwrap();
        let plugin = PluginContext::from_host(&**host.interface()).unwrap();
        let engine = RenderEngine::new(&plugin.suites, instance.handle());
        let handle = plugin
            .suites
            .image_effect
            .clip_get_handle(instance.handle(), OUTPUT_CLIP)
            .unwrap();
        let output = ClipRef {
            handle,
            name: OUTPUT_CLIP,
        };
        let window = RectI::new(0, 0, 8, 4);

        // Outside a render the output has no target to hand out.
        let Err(err) = engine.fetch(output, 0.0) else {
            panic!("fetch should fail");
        };
        assert_eq!(err.status(), Status::Failed);
        assert!(engine.render(&Passthrough, output, None, 0.0, window).is_err());

        instance.abort().unwrap();
        assert!(engine.is_aborted());
        assert!(matches!(engine.fetch(output, 0.0), Ok(None)));
        let outcome = engine.render(&Passthrough, output, None, 0.0, window).unwrap();
        assert_eq!(outcome, RenderOutcome::Aborted);
        assert!(outcome.was_aborted());
    }

    #[test]
    fn test_processed_outcome_reports_abort() {
        let outcome = ProcessOutcome {
            rows: 3,
            workers: 1,
            aborted: true,
        };
        assert!(RenderOutcome::Processed(outcome).was_aborted());
        let outcome = ProcessOutcome { aborted: false, ..outcome };
        assert!(!RenderOutcome::Processed(outcome).was_aborted());
    }
}
