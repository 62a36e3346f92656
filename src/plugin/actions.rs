//! Action names.

use crate::core::types::EncodedEnum;
use std::fmt;

/// Every action the dispatcher recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// First call after the host is set.
    Load,
    /// Describe the effect's static capabilities.
    Describe,
    /// Last call before the module is released.
    Unload,
    /// Drop any cached data.
    PurgeCaches,
    /// Flush private data into parameters.
    SyncPrivateData,
    /// Create an instance.
    CreateInstance,
    /// Destroy an instance.
    DestroyInstance,
    /// A parameter or clip changed.
    InstanceChanged,
    /// A batch of changes begins.
    BeginInstanceChanged,
    /// A batch of changes ends.
    EndInstanceChanged,
    /// The user starts editing an instance.
    BeginInstanceEdit,
    /// The user stops editing an instance.
    EndInstanceEdit,
    /// Describe the effect for one context.
    DescribeInContext,
    /// Compute the region of definition.
    GetRegionOfDefinition,
    /// Compute regions of interest for each input.
    GetRegionsOfInterest,
    /// Compute the frame range the effect can produce.
    GetTimeDomain,
    /// Compute the input frames needed for an output frame.
    GetFramesNeeded,
    /// Override clip formats.
    GetClipPreferences,
    /// Ask whether rendering would be a pass-through.
    IsIdentity,
    /// Render a window.
    Render,
    /// A sequence of renders begins.
    BeginSequenceRender,
    /// A sequence of renders ends.
    EndSequenceRender,
}

impl EncodedEnum for Action {
    const ALL: &'static [Self] = &[
        Action::Load,
        Action::Describe,
        Action::Unload,
        Action::PurgeCaches,
        Action::SyncPrivateData,
        Action::CreateInstance,
        Action::DestroyInstance,
        Action::InstanceChanged,
        Action::BeginInstanceChanged,
        Action::EndInstanceChanged,
        Action::BeginInstanceEdit,
        Action::EndInstanceEdit,
        Action::DescribeInContext,
        Action::GetRegionOfDefinition,
        Action::GetRegionsOfInterest,
        Action::GetTimeDomain,
        Action::GetFramesNeeded,
        Action::GetClipPreferences,
        Action::IsIdentity,
        Action::Render,
        Action::BeginSequenceRender,
        Action::EndSequenceRender,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Action::Load => "OfxActionLoad",
            Action::Describe => "OfxActionDescribe",
            Action::Unload => "OfxActionUnload",
            Action::PurgeCaches => "OfxActionPurgeCaches",
            Action::SyncPrivateData => "OfxActionSyncPrivateData",
            Action::CreateInstance => "OfxActionCreateInstance",
            Action::DestroyInstance => "OfxActionDestroyInstance",
            Action::InstanceChanged => "OfxActionInstanceChanged",
            Action::BeginInstanceChanged => "OfxActionBeginInstanceChanged",
            Action::EndInstanceChanged => "OfxActionEndInstanceChanged",
            Action::BeginInstanceEdit => "OfxActionBeginInstanceEdit",
            Action::EndInstanceEdit => "OfxActionEndInstanceEdit",
            Action::DescribeInContext => "OfxImageEffectActionDescribeInContext",
            Action::GetRegionOfDefinition => "OfxImageEffectActionGetRegionOfDefinition",
            Action::GetRegionsOfInterest => "OfxImageEffectActionGetRegionsOfInterest",
            Action::GetTimeDomain => "OfxImageEffectActionGetTimeDomain",
            Action::GetFramesNeeded => "OfxImageEffectActionGetFramesNeeded",
            Action::GetClipPreferences => "OfxImageEffectActionGetClipPreferences",
            Action::IsIdentity => "OfxImageEffectActionIsIdentity",
            Action::Render => "OfxImageEffectActionRender",
            Action::BeginSequenceRender => "OfxImageEffectActionBeginSequenceRender",
            Action::EndSequenceRender => "OfxImageEffectActionEndSequenceRender",
        }
    }
}

impl Action {
    /// True for actions addressed to the plugin as a whole rather than to
    /// an instance.
    pub fn is_plugin_action(self) -> bool {
        matches!(
            self,
            Action::Load | Action::Describe | Action::Unload | Action::DescribeInContext
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_closed() {
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()), Some(*action));
        }
        assert_eq!(Action::parse("OfxActionSomethingNew"), None);
        assert_eq!(Action::ALL.len(), 22);
    }
}
