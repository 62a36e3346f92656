//! Host capability suites.
//!
//! A suite is a named, versioned bundle of host services. Each one is a
//! trait object here; a module resolves the suites it needs once, at Load,
//! into a [`HostSuites`] and holds on to them until Unload. Optional suites
//! are `Option`s and a module must work without them.

pub mod context;
pub mod registry;

pub use context::{HostCapabilities, HostSuites, PluginContext};
pub use registry::{Host, Suite, SuiteRegistry};

use crate::core::error::OfxResult;
use crate::core::geometry::RectD;
use crate::core::handle::{ClipHandle, EffectHandle, MemoryHandle};
use crate::core::status::Status;
use crate::core::types::MessageKind;
use crate::param::{ParamDescriptor, ParamHandle, ParamValue};
use crate::property::SharedProps;
use crate::render::image::Image;

/// Name of the image effect suite.
pub const IMAGE_EFFECT_SUITE: &str = "OfxImageEffectSuite";
/// Name of the parameter suite.
pub const PARAMETER_SUITE: &str = "OfxParameterSuite";
/// Name of the multi-thread suite.
pub const MULTI_THREAD_SUITE: &str = "OfxMultiThreadSuite";
/// Name of the message suite.
pub const MESSAGE_SUITE: &str = "OfxMessageSuite";

/// Version of every suite this crate defines.
pub const SUITE_VERSION: u32 = 1;

/// A parameter of a particular effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamRef {
    /// Owning effect.
    pub effect: EffectHandle,
    /// Parameter within the effect.
    pub param: ParamHandle,
}

/// Effect, clip, image and image-memory services.
pub trait ImageEffectSuite: Send + Sync {
    /// Property set of an effect descriptor or instance.
    fn property_set(&self, effect: EffectHandle) -> OfxResult<SharedProps>;

    /// Define a clip on a descriptor, returning its descriptor properties.
    fn clip_define(&self, effect: EffectHandle, name: &str) -> OfxResult<SharedProps>;

    /// Handle of a named clip of an instance.
    fn clip_get_handle(&self, effect: EffectHandle, name: &str) -> OfxResult<ClipHandle>;

    /// Property set of a clip instance.
    fn clip_get_property_set(&self, clip: ClipHandle) -> OfxResult<SharedProps>;

    /// Fetch an image from a clip. `region` limits the fetched area in
    /// canonical coordinates. The image is released when dropped.
    fn clip_get_image(&self, clip: ClipHandle, time: f64, region: Option<RectD>) -> OfxResult<Image>;

    /// Region of definition of a clip at `time`.
    fn clip_get_region_of_definition(&self, clip: ClipHandle, time: f64) -> OfxResult<RectD>;

    /// True if the host wants the current action to stop early.
    fn abort(&self, effect: EffectHandle) -> bool;

    /// Allocate temporary image memory, optionally charged to an instance.
    fn image_memory_alloc(&self, effect: Option<EffectHandle>, bytes: usize) -> OfxResult<MemoryHandle>;

    /// Free image memory regardless of its lock count.
    fn image_memory_free(&self, memory: MemoryHandle) -> OfxResult<()>;

    /// Lock image memory, pinning its address. Locks nest.
    fn image_memory_lock(&self, memory: MemoryHandle) -> OfxResult<()>;

    /// Undo one lock. Unlocking an unlocked block does nothing.
    fn image_memory_unlock(&self, memory: MemoryHandle) -> OfxResult<()>;

    /// Run `access` over the bytes of a locked block.
    fn image_memory_access(&self, memory: MemoryHandle, access: &mut dyn FnMut(&mut [u8])) -> OfxResult<()>;
}

/// Parameter definition and value services.
pub trait ParameterSuite: Send + Sync {
    /// Define a parameter on a descriptor.
    fn param_define(&self, effect: EffectHandle, descriptor: ParamDescriptor) -> OfxResult<()>;

    /// Handle of a named parameter of an instance.
    fn param_get_handle(&self, effect: EffectHandle, name: &str) -> OfxResult<ParamRef>;

    /// Static value, ignoring animation.
    fn param_get_value(&self, param: ParamRef) -> OfxResult<ParamValue>;

    /// Value at `time`.
    fn param_get_value_at_time(&self, param: ParamRef, time: f64) -> OfxResult<ParamValue>;

    /// Set the static value.
    fn param_set_value(&self, param: ParamRef, value: ParamValue) -> OfxResult<()>;

    /// Set a keyframe.
    fn param_set_value_at_time(&self, param: ParamRef, time: f64, value: ParamValue) -> OfxResult<()>;

    /// Enable or disable a parameter.
    fn param_set_enabled(&self, param: ParamRef, enabled: bool) -> OfxResult<()>;
}

/// Fork-join execution.
pub trait MultiThreadSuite: Send + Sync {
    /// Number of CPUs available for `multi_thread`.
    fn num_cpus(&self) -> usize;

    /// Run `job(index, count)` for every index in `0..count` and wait for
    /// all of them.
    fn multi_thread(&self, count: usize, job: &(dyn Fn(usize, usize) + Sync)) -> OfxResult<()>;

    /// Index of the calling worker, or `None` outside `multi_thread`.
    fn thread_index(&self) -> Option<usize>;

    /// True when called from a worker spawned by `multi_thread`.
    fn is_spawned_thread(&self) -> bool {
        self.thread_index().is_some()
    }
}

/// User-facing messages.
pub trait MessageSuite: Send + Sync {
    /// Post a message. Questions reply yes or no; other kinds reply ok.
    fn message(&self, effect: Option<EffectHandle>, kind: MessageKind, id: &str, text: &str) -> Status;
}
