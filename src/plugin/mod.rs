//! The module-author side of the protocol.
//!
//! This module contains:
//! - Action names and typed action arguments
//! - Descriptors filled in during Describe and DescribeInContext
//! - The [`PluginFactory`] and [`ImageEffect`] traits an effect implements
//! - The [`Dispatcher`] that routes actions and enforces the lifecycle
//! - Bundle bootstrap for static and dynamically loaded modules

pub mod actions;
pub mod args;
pub mod bundle;
pub mod descriptor;
pub mod dispatcher;
pub mod effect;

pub use actions::Action;
pub use args::{
    ClipPreferences, FramesNeeded, IdentityClip, InstanceChangedArguments, IsIdentityArguments,
    RegionOfDefinitionArguments, RegionsOfInterest, RegionsOfInterestArguments, RenderArguments, SequenceArguments,
};
pub use bundle::{PluginBundle, PluginEntry, PluginMain, StaticBundle};
pub use descriptor::{ClipDescriptor, ContextDescriptor, EffectDescriptor};
pub use dispatcher::{Dispatcher, InstanceState, PluginState, ViolationPolicy};
pub use effect::{ImageEffect, InstanceContext, PluginFactory};

/// Name of the output clip every effect defines.
pub const OUTPUT_CLIP: &str = "Output";

/// Name of the single input of filters.
pub const SOURCE_CLIP: &str = "Source";

/// Name of the outgoing input of transitions.
pub const SOURCE_FROM_CLIP: &str = "SourceFrom";

/// Name of the incoming input of transitions.
pub const SOURCE_TO_CLIP: &str = "SourceTo";

/// Name of the transition progress parameter.
pub const TRANSITION_PARAM: &str = "Transition";
