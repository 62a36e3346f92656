//! Reference host configuration.
//!
//! Loaded from TOML. Every key is optional and falls back to the default
//! below, so an empty file is a valid configuration.

use crate::core::error::{ConfigError, PropertyResult};
use crate::core::geometry::RectD;
use crate::core::types::{BitDepth, Components, Context};
use crate::plugin::ViolationPolicy;
use crate::property::{Prop, PropertySet};
use crate::render::RenderOptions;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Project settings every instance sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Width in canonical units.
    pub width: f64,
    /// Height in canonical units.
    pub height: f64,
    /// Horizontal origin.
    pub offset_x: f64,
    /// Vertical origin.
    pub offset_y: f64,
    /// Pixel aspect ratio.
    pub pixel_aspect_ratio: f64,
    /// Frames per second.
    pub frame_rate: f64,
    /// First frame.
    pub first_frame: f64,
    /// Last frame.
    pub last_frame: f64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
            offset_x: 0.0,
            offset_y: 0.0,
            pixel_aspect_ratio: 1.0,
            frame_rate: 25.0,
            first_frame: 0.0,
            last_frame: 0.0,
        }
    }
}

impl ProjectConfig {
    /// Project extent in canonical coordinates.
    pub fn extent(&self) -> RectD {
        RectD::new(
            self.offset_x,
            self.offset_y,
            self.offset_x + self.width,
            self.offset_y + self.height,
        )
    }

    /// Project frame range.
    pub fn frame_range(&self) -> (f64, f64) {
        (self.first_frame, self.last_frame)
    }
}

/// Configuration of the reference host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host identifier.
    pub name: String,
    /// Host label.
    pub label: String,
    /// Maximum render workers; 0 uses every CPU.
    pub max_workers: usize,
    /// Rows between abort polls.
    pub abort_poll_rows: i32,
    /// Clips may differ in pixel depth.
    pub supports_multiple_clip_depths: bool,
    /// Clips may differ in pixel aspect ratio.
    pub supports_multiple_clip_pars: bool,
    /// Inputs may differ in size.
    pub supports_multi_resolution: bool,
    /// Images may be tiles.
    pub supports_tiles: bool,
    /// Images may be fetched at other times.
    pub temporal_clip_access: bool,
    /// Effects may set the output frame rate.
    pub setable_frame_rate: bool,
    /// Effects may set the output fielding.
    pub setable_fielding: bool,
    /// Pixel depths the host delivers.
    pub supported_depths: Vec<BitDepth>,
    /// Component layouts the host delivers.
    pub supported_components: Vec<Components>,
    /// Contexts the host creates instances in.
    pub supported_contexts: Vec<Context>,
    /// Budget of the image memory pool in bytes.
    pub memory_limit: usize,
    /// Longest cascade of module-made parameter changes delivered per edit.
    pub max_change_cascade: usize,
    /// What to do on protocol violations.
    pub violation_policy: ViolationPolicy,
    /// Project settings.
    pub project: ProjectConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: "org.ofxrs.host".to_string(),
            label: "ofxrs".to_string(),
            max_workers: 0,
            abort_poll_rows: crate::render::ABORT_POLL_ROWS,
            supports_multiple_clip_depths: false,
            supports_multiple_clip_pars: false,
            supports_multi_resolution: true,
            supports_tiles: true,
            temporal_clip_access: true,
            setable_frame_rate: false,
            setable_fielding: false,
            supported_depths: vec![BitDepth::Byte, BitDepth::Short, BitDepth::Float],
            supported_components: vec![Components::Rgba, Components::Rgb, Components::Alpha],
            supported_contexts: vec![Context::Generator, Context::Filter, Context::General],
            memory_limit: 1 << 30,
            max_change_cascade: 16,
            violation_policy: ViolationPolicy::Report,
            project: ProjectConfig::default(),
        }
    }
}

impl HostConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.display().to_string(),
            error,
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!("Loaded host configuration from {}", path.display());
        Ok(config)
    }

    /// Per-call render options derived from this configuration.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions::new()
            .with_max_workers(self.max_workers)
            .with_abort_poll_rows(self.abort_poll_rows)
    }

    /// The host property set modules read their capability flags from.
    pub fn host_properties(&self) -> PropertyResult<PropertySet> {
        let mut props = PropertySet::new();
        props.set(&Prop::Name, 0, self.name.as_str())?;
        props.set(&Prop::Label, 0, self.label.as_str())?;
        props.set(&Prop::ApiVersion, 0, 1)?;
        props.set(&Prop::HostIsBackground, 0, true)?;
        props.set(&Prop::SupportsMultipleClipDepths, 0, self.supports_multiple_clip_depths)?;
        props.set(&Prop::SupportsMultipleClipPars, 0, self.supports_multiple_clip_pars)?;
        props.set(&Prop::SupportsMultiResolution, 0, self.supports_multi_resolution)?;
        props.set(&Prop::SupportsTiles, 0, self.supports_tiles)?;
        props.set(&Prop::TemporalClipAccess, 0, self.temporal_clip_access)?;
        props.set(&Prop::SetableFrameRate, 0, self.setable_frame_rate)?;
        props.set(&Prop::SetableFielding, 0, self.setable_fielding)?;
        props.set_enums(&Prop::SupportedPixelDepths, &self.supported_depths)?;
        props.set_enums(&Prop::SupportedComponents, &self.supported_components)?;
        props.set_enums(&Prop::SupportedContexts, &self.supported_contexts)?;
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::HostCapabilities;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(HostConfig::from_toml_str("").unwrap(), HostConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = HostConfig::from_toml_str(
            r#"
            max_workers = 2
            supported_depths = ["byte", "float"]
            violation_policy = "abort"

            [project]
            width = 640.0
            height = 480.0
            "#,
        )
        .unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.supported_depths, vec![BitDepth::Byte, BitDepth::Float]);
        assert_eq!(config.violation_policy, ViolationPolicy::Abort);
        assert_eq!(config.project.extent(), RectD::new(0.0, 0.0, 640.0, 480.0));
        assert_eq!(config.project.frame_rate, 25.0);
        assert_eq!(config.render_options().max_workers, 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"test.host\"\nsupports_multiple_clip_depths = true").unwrap();
        let config = HostConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "test.host");
        assert!(config.supports_multiple_clip_depths);
    }

    #[test]
    fn test_missing_file_and_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let err = HostConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(matches!(
            HostConfig::from_toml_str("max_workers = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_host_properties_round_trip_capabilities() {
        let config = HostConfig {
            setable_frame_rate: true,
            ..HostConfig::default()
        };
        let caps = HostCapabilities::from_props(&config.host_properties().unwrap());
        assert_eq!(caps.name, "org.ofxrs.host");
        assert!(caps.setable_frame_rate);
        assert!(!caps.supports_multiple_clip_depths);
        assert_eq!(caps.supported_depths, config.supported_depths);
        assert_eq!(caps.supported_contexts, config.supported_contexts);
    }
}
