//! The per-module context resolved once at Load.
//!
//! [`PluginContext`] replaces process-wide suite pointers and capability
//! flags: it is built from the [`Host`] when the module loads, never
//! mutated afterwards, and passed explicitly to every handler.

use crate::core::error::SuiteError;
use crate::core::handle::EffectHandle;
use crate::core::status::Status;
use crate::core::types::{BitDepth, Components, Context, MessageKind};
use crate::property::{Prop, PropertySet};
use crate::suite::registry::{Host, Suite};
use crate::suite::{
    ImageEffectSuite, MessageSuite, MultiThreadSuite, ParameterSuite, IMAGE_EFFECT_SUITE, MESSAGE_SUITE,
    MULTI_THREAD_SUITE, PARAMETER_SUITE, SUITE_VERSION,
};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// The suites a module uses, fetched once.
#[derive(Clone)]
pub struct HostSuites {
    /// Required.
    pub image_effect: Arc<dyn ImageEffectSuite>,
    /// Required.
    pub parameter: Arc<dyn ParameterSuite>,
    /// Optional; without it rendering runs on the calling thread.
    pub multi_thread: Option<Arc<dyn MultiThreadSuite>>,
    /// Optional; without it messages go to the log.
    pub message: Option<Arc<dyn MessageSuite>>,
}

impl HostSuites {
    /// Fetch every suite from `host`. A missing required suite is an error;
    /// missing optional ones are left as `None`.
    pub fn fetch(host: &dyn Host) -> Result<Self, SuiteError> {
        let image_effect = match host.fetch_suite(IMAGE_EFFECT_SUITE, SUITE_VERSION) {
            Some(Suite::ImageEffect(suite)) => suite,
            _ => return Err(missing(IMAGE_EFFECT_SUITE)),
        };
        let parameter = match host.fetch_suite(PARAMETER_SUITE, SUITE_VERSION) {
            Some(Suite::Parameter(suite)) => suite,
            _ => return Err(missing(PARAMETER_SUITE)),
        };
        let multi_thread = match host.fetch_suite(MULTI_THREAD_SUITE, SUITE_VERSION) {
            Some(Suite::MultiThread(suite)) => Some(suite),
            _ => {
                debug!("Host has no {}; rendering single threaded", MULTI_THREAD_SUITE);
                None
            }
        };
        let message = match host.fetch_suite(MESSAGE_SUITE, SUITE_VERSION) {
            Some(Suite::Message(suite)) => Some(suite),
            _ => None,
        };
        Ok(Self {
            image_effect,
            parameter,
            multi_thread,
            message,
        })
    }
}

fn missing(name: &str) -> SuiteError {
    SuiteError::Missing {
        name: name.to_string(),
        version: SUITE_VERSION,
    }
}

/// Host capability flags read from the host property set.
#[derive(Debug, Clone, PartialEq)]
pub struct HostCapabilities {
    /// Host name.
    pub name: String,
    /// Host label.
    pub label: String,
    /// Host has no interface.
    pub is_background: bool,
    /// Clips may differ in pixel depth.
    pub supports_multiple_clip_depths: bool,
    /// Clips may differ in pixel aspect ratio.
    pub supports_multiple_clip_pars: bool,
    /// Inputs may differ in size.
    pub supports_multi_resolution: bool,
    /// Images may be tiles of their clip.
    pub supports_tiles: bool,
    /// Images may be fetched at other times than the render time.
    pub temporal_clip_access: bool,
    /// Module may change the output frame rate.
    pub setable_frame_rate: bool,
    /// Module may change the output fielding.
    pub setable_fielding: bool,
    /// Pixel depths the host can deliver.
    pub supported_depths: Vec<BitDepth>,
    /// Component layouts the host can deliver.
    pub supported_components: Vec<Components>,
    /// Contexts the host can create instances in.
    pub supported_contexts: Vec<Context>,
}

impl HostCapabilities {
    /// Read capabilities, using the reference defaults for absent flags.
    pub fn from_props(props: &PropertySet) -> Self {
        let flag = |prop: Prop, default: bool| props.try_get_bool(&prop, 0).unwrap_or(default);
        Self {
            name: props.try_get_string(&Prop::Name, 0).unwrap_or_default().to_string(),
            label: props.try_get_string(&Prop::Label, 0).unwrap_or_default().to_string(),
            is_background: flag(Prop::HostIsBackground, false),
            supports_multiple_clip_depths: flag(Prop::SupportsMultipleClipDepths, false),
            supports_multiple_clip_pars: flag(Prop::SupportsMultipleClipPars, false),
            supports_multi_resolution: flag(Prop::SupportsMultiResolution, true),
            supports_tiles: flag(Prop::SupportsTiles, true),
            temporal_clip_access: flag(Prop::TemporalClipAccess, false),
            setable_frame_rate: flag(Prop::SetableFrameRate, false),
            setable_fielding: flag(Prop::SetableFielding, false),
            supported_depths: props.get_enums(&Prop::SupportedPixelDepths).unwrap_or_default(),
            supported_components: props.get_enums(&Prop::SupportedComponents).unwrap_or_default(),
            supported_contexts: props.get_enums(&Prop::SupportedContexts).unwrap_or_default(),
        }
    }
}

/// Everything a module learned about its host at Load.
#[derive(Clone)]
pub struct PluginContext {
    /// Resolved suites.
    pub suites: HostSuites,
    /// Capability flags.
    pub capabilities: HostCapabilities,
}

impl PluginContext {
    /// Resolve suites and capabilities from `host`.
    pub fn from_host(host: &dyn Host) -> Result<Self, SuiteError> {
        let suites = HostSuites::fetch(host)?;
        let capabilities = HostCapabilities::from_props(host.properties());
        info!(
            "Loaded against host '{}' ({} depth(s), {} context(s))",
            capabilities.name,
            capabilities.supported_depths.len(),
            capabilities.supported_contexts.len()
        );
        Ok(Self { suites, capabilities })
    }

    /// Post a message through the host, or log it when the host has no
    /// message suite.
    pub fn message(&self, effect: Option<EffectHandle>, kind: MessageKind, id: &str, text: &str) -> Status {
        if let Some(suite) = &self.suites.message {
            return suite.message(effect, kind, id, text);
        }
        match kind {
            MessageKind::Error => error!("[{}] {}", id, text),
            MessageKind::Warning => warn!("[{}] {}", id, text),
            MessageKind::Log => debug!("[{}] {}", id, text),
            MessageKind::Message | MessageKind::Question => info!("[{}] {}", id, text),
        }
        match kind {
            MessageKind::Question => Status::ReplyDefault,
            _ => Status::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EncodedEnum;

    struct BareHost {
        props: PropertySet,
    }

    impl Host for BareHost {
        fn properties(&self) -> &PropertySet {
            &self.props
        }

        fn fetch_suite(&self, _name: &str, _version: u32) -> Option<Suite> {
            None
        }
    }

    #[test]
    fn test_missing_required_suite() {
        let host = BareHost {
            props: PropertySet::new(),
        };
        let err = HostSuites::fetch(&host).err().unwrap();
        assert_eq!(
            err,
            SuiteError::Missing {
                name: IMAGE_EFFECT_SUITE.into(),
                version: 1
            }
        );
    }

    #[test]
    fn test_capabilities_defaults() {
        let caps = HostCapabilities::from_props(&PropertySet::new());
        assert!(caps.supports_tiles);
        assert!(caps.supports_multi_resolution);
        assert!(!caps.supports_multiple_clip_depths);
        assert!(caps.supported_depths.is_empty());
    }

    #[test]
    fn test_capabilities_from_props() {
        let mut props = PropertySet::new();
        props.set(&Prop::Name, 0, "ofxrs").unwrap();
        props.set(&Prop::SupportsMultipleClipDepths, 0, true).unwrap();
        props
            .set_all(
                &Prop::SupportedPixelDepths,
                [BitDepth::Byte.as_str(), BitDepth::Float.as_str()],
            )
            .unwrap();
        let caps = HostCapabilities::from_props(&props);
        assert_eq!(caps.name, "ofxrs");
        assert!(caps.supports_multiple_clip_depths);
        assert_eq!(caps.supported_depths, vec![BitDepth::Byte, BitDepth::Float]);
    }
}
