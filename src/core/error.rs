//! Error types for ofxrs.
//!
//! Uses thiserror for structured errors with context. Every error can be
//! collapsed to exactly one [`Status`] so that nothing but a status code ever
//! crosses the host/module boundary.

use crate::core::status::Status;
use crate::property::PropertyType;
use thiserror::Error;

/// Top-level error type.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum OfxError {
    /// Property access failed.
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    /// A suite could not be found or used.
    #[error("Suite error: {0}")]
    Suite(#[from] SuiteError),

    /// An action arrived out of order.
    #[error("Lifecycle violation: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Host and module could not agree on capabilities or formats.
    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Rendering failed.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// A handle was stale or a name unknown.
    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),

    /// Host image memory could not be allocated or locked.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Parameter definition or access failed.
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    /// A plugin could not be loaded or refused to run.
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Host configuration could not be read.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// A callee replied with a non-success status.
    #[error("Call returned {0}")]
    Status(Status),
}

/// Errors from typed property access.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// The set has no property of this name.
    #[error("Unknown property '{name}'")]
    Unknown {
        /// Property name.
        name: String,
    },

    /// Accessed with a type other than the one it holds.
    #[error("Property '{name}' holds {expected} values, accessed as {got}")]
    TypeMismatch {
        /// Property name.
        name: String,
        /// Type the property holds.
        expected: PropertyType,
        /// Type it was accessed as.
        got: PropertyType,
    },

    /// Index past the property's dimension.
    #[error("Index {index} out of range for property '{name}' of dimension {dimension}")]
    BadIndex {
        /// Property name.
        name: String,
        /// Requested index.
        index: usize,
        /// Current dimension.
        dimension: usize,
    },

    /// Written by the side that does not own it.
    #[error("Property '{name}' is not writable by the {writer}")]
    ReadOnly {
        /// Property name.
        name: String,
        /// The side that attempted the write.
        writer: &'static str,
    },

    /// Holds a string outside its enumeration.
    #[error("Property '{name}' holds '{value}', which is not a valid {expected}")]
    BadEnum {
        /// Property name.
        name: String,
        /// The stored string.
        value: String,
        /// Enumeration it should belong to.
        expected: &'static str,
    },
}

/// Errors from suite discovery.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuiteError {
    /// The host does not provide this suite.
    #[error("Host does not provide suite '{name}' version {version}")]
    Missing {
        /// Suite name.
        name: String,
        /// Requested version.
        version: u32,
    },

    /// Suites were looked up before `set_host`.
    #[error("Suites requested before the host was set")]
    HostNotSet,

    /// Suites were used outside Load..Unload.
    #[error("Suites used before Load or after Unload")]
    NotLoaded,
}

/// Actions invoked out of their legal order.
///
/// These are programmer errors in the host or the module and are always
/// reported as fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// The plugin is not in a state that accepts the action.
    #[error("Action '{action}' is illegal in plugin state {state}")]
    IllegalPluginAction {
        /// Action name.
        action: String,
        /// Plugin state at the time.
        state: String,
    },

    /// An instance action named a handle with no live instance.
    #[error("Action '{action}' on an instance that was never created")]
    NoInstance {
        /// Action name.
        action: String,
    },

    /// The instance is not in a state that accepts the action.
    #[error("Action '{action}' is illegal in instance state {state}")]
    IllegalInstanceAction {
        /// Action name.
        action: String,
        /// Instance state at the time.
        state: String,
    },

    /// CreateInstance in a context DescribeInContext never saw.
    #[error("Context {context} was not described before instance creation")]
    ContextNotDescribed {
        /// Context name.
        context: String,
    },

    /// Unload while instances are alive.
    #[error("Unload requested with {live} live instance(s)")]
    LiveInstances {
        /// Live instance count.
        live: usize,
    },

    /// Images fetched by the module were never released.
    #[error("Instance destroyed with {outstanding} unreleased image(s)")]
    OutstandingImages {
        /// Unreleased image count.
        outstanding: usize,
    },

    /// A closing bracket action with no open bracket.
    #[error("'{end}' without a matching '{begin}'")]
    Unbalanced {
        /// The opening action expected first.
        begin: String,
        /// The closing action received.
        end: String,
    },
}

/// Unsatisfiable capability or format negotiation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NegotiationError {
    /// No pixel depth both sides support.
    #[error("Host supports none of the pixel depths {required:?}")]
    NoCommonDepth {
        /// Depths the effect supports.
        required: Vec<String>,
    },

    /// No context both sides support.
    #[error("Host supports none of the contexts {required:?}")]
    NoCommonContext {
        /// Contexts the effect supports.
        required: Vec<String>,
    },

    /// No components layout the clip and host share.
    #[error("Clip '{clip}' supports none of the components {offered:?}")]
    NoCommonComponents {
        /// Clip name.
        clip: String,
        /// Components the host offered.
        offered: Vec<String>,
    },

    /// The effect needs a host capability that is absent.
    #[error("Host lacks required capability '{0}'")]
    MissingCapability(String),

    /// No clip of this name.
    #[error("Unknown clip '{0}'")]
    UnknownClip(String),
}

/// Errors raised while rendering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// An image fetch returned nothing.
    #[error("Could not fetch an image from clip '{clip}' at time {time}")]
    FetchFailed {
        /// Clip name.
        clip: String,
        /// Requested time.
        time: f64,
    },

    /// Depth with no pixel type.
    #[error("Unsupported pixel depth {0}")]
    UnsupportedDepth(String),

    /// Components layout the operation cannot handle.
    #[error("Unsupported components {0}")]
    UnsupportedComponents(String),

    /// Source and output images differ in depth or components.
    #[error("Source and output formats differ: {0}")]
    FormatMismatch(String),

    /// The render window is not inside the destination image.
    #[error("Render window {window} is not inside image bounds {bounds}")]
    WindowOutsideBounds {
        /// Requested window.
        window: String,
        /// Image bounds.
        bounds: String,
    },

    /// Buffer shorter than its layout needs.
    #[error("Image buffer is too small for its bounds and row stride")]
    BufferTooSmall,

    /// Mutable access to a shared image.
    #[error("Image is read only")]
    ReadOnlyImage,

    /// A processor worker panicked.
    #[error("A render worker panicked")]
    WorkerPanicked,
}

/// Errors from handle lookup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandleError {
    /// The object behind the handle is gone.
    #[error("Stale {kind} handle {index}:{generation}")]
    Stale {
        /// Handle kind.
        kind: &'static str,
        /// Slot index.
        index: u32,
        /// Generation the handle was issued for.
        generation: u32,
    },

    /// No object of this kind by that name.
    #[error("Unknown {kind} '{name}'")]
    UnknownName {
        /// Object kind.
        kind: &'static str,
        /// Requested name.
        name: String,
    },
}

/// Errors from the host image memory pool.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    /// The allocation would exceed the pool budget.
    #[error("Cannot allocate {requested} bytes: {in_use} of {limit} in use")]
    Exhausted {
        /// Bytes requested.
        requested: usize,
        /// Bytes already allocated.
        in_use: usize,
        /// Pool budget.
        limit: usize,
    },

    /// Data access on an unlocked block.
    #[error("Memory block is not locked")]
    NotLocked,
}

/// Errors from parameter definition and access.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    /// A second definition with the same name.
    #[error("Parameter '{0}' is already defined")]
    AlreadyDefined(String),

    /// No parameter of this name.
    #[error("Unknown parameter '{0}'")]
    Unknown(String),

    /// Value of the wrong kind for the parameter.
    #[error("Parameter '{name}' expects a {expected} value")]
    WrongKind {
        /// Parameter name.
        name: String,
        /// Kind the parameter holds.
        expected: &'static str,
    },

    /// Choice index past the option list.
    #[error("Choice index {index} out of range for parameter '{name}'")]
    BadChoice {
        /// Parameter name.
        name: String,
        /// Requested index.
        index: usize,
    },

    /// Keyframe set on a parameter that cannot animate.
    #[error("Parameter '{0}' does not animate")]
    NotAnimatable(String),
}

/// Errors from the plugin bootstrap and loader.
#[derive(Error, Debug)]
pub enum PluginError {
    /// The shared library could not be opened or lacks its entry symbols.
    #[error("Failed to load plugin bundle from {path}: {error}")]
    LoadFailed {
        /// Library path.
        path: String,
        /// Loader message.
        error: String,
    },

    /// The bundle was built against another ABI.
    #[error("Plugin ABI mismatch: host expects v{host_version}, bundle has v{plugin_version}")]
    IncompatibleVersion {
        /// ABI version of this host.
        host_version: u32,
        /// ABI version of the bundle.
        plugin_version: u32,
    },

    /// No loaded plugin with this identifier.
    #[error("Plugin '{name}' not found")]
    PluginNotFound {
        /// Plugin identifier.
        name: String,
    },

    /// Load or Describe returned a failure.
    #[error("Plugin '{name}' refused: {status}")]
    Refused {
        /// Plugin identifier.
        name: String,
        /// Status it returned.
        status: Status,
    },

    /// The plugin was asked for a context it does not support.
    #[error("Plugin '{name}' does not support context {context}")]
    UnsupportedContext {
        /// Plugin identifier.
        name: String,
        /// Requested context.
        context: String,
    },
}

/// Errors from loading host configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {error}")]
    Read {
        /// Config path.
        path: String,
        /// Underlying error.
        error: std::io::Error,
    },

    /// The file is not valid configuration TOML.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Status Mapping
// ============================================================================

impl PropertyError {
    /// The status a host returns for this failure.
    pub fn status(&self) -> Status {
        match self {
            PropertyError::Unknown { .. } => Status::ErrUnknown,
            PropertyError::TypeMismatch { .. }
            | PropertyError::ReadOnly { .. }
            | PropertyError::BadEnum { .. } => Status::ErrValue,
            PropertyError::BadIndex { .. } => Status::ErrBadIndex,
        }
    }
}

impl RenderError {
    /// The status reported when a render fails with this error.
    pub fn status(&self) -> Status {
        match self {
            RenderError::UnsupportedDepth(_)
            | RenderError::UnsupportedComponents(_)
            | RenderError::FormatMismatch(_) => Status::ErrImageFormat,
            RenderError::WindowOutsideBounds { .. } | RenderError::BufferTooSmall => {
                Status::ErrValue
            }
            _ => Status::Failed,
        }
    }
}

impl OfxError {
    /// Collapse this error to the status code returned across the boundary.
    pub fn status(&self) -> Status {
        match self {
            OfxError::Property(e) => e.status(),
            OfxError::Suite(SuiteError::Missing { .. }) => Status::ErrMissingHostFeature,
            OfxError::Suite(_) => Status::ErrFatal,
            OfxError::Lifecycle(_) => Status::ErrFatal,
            OfxError::Negotiation(NegotiationError::UnknownClip(_)) => Status::ErrUnknown,
            OfxError::Negotiation(_) => Status::ErrMissingHostFeature,
            OfxError::Render(e) => e.status(),
            OfxError::Handle(HandleError::Stale { .. }) => Status::ErrBadHandle,
            OfxError::Handle(HandleError::UnknownName { .. }) => Status::ErrUnknown,
            OfxError::Memory(MemoryError::Exhausted { .. }) => Status::ErrMemory,
            OfxError::Memory(MemoryError::NotLocked) => Status::ErrBadHandle,
            OfxError::Param(ParamError::AlreadyDefined(_)) => Status::ErrExists,
            OfxError::Param(ParamError::Unknown(_)) => Status::ErrUnknown,
            OfxError::Param(_) => Status::ErrValue,
            OfxError::Plugin(PluginError::Refused { status, .. }) => *status,
            OfxError::Plugin(_) => Status::Failed,
            OfxError::Config(_) => Status::ErrFormat,
            OfxError::Io(_) | OfxError::Image(_) => Status::Failed,
            OfxError::Status(s) => *s,
        }
    }

    /// True for protocol violations that a defensive host may escalate.
    pub fn is_violation(&self) -> bool {
        matches!(self, OfxError::Lifecycle(_) | OfxError::Handle(HandleError::Stale { .. }))
    }
}

impl From<Status> for OfxError {
    fn from(status: Status) -> Self {
        OfxError::Status(status)
    }
}

/// Result type alias for ofxrs operations.
pub type OfxResult<T> = Result<T, OfxError>;

/// Result type alias for property access.
pub type PropertyResult<T> = Result<T, PropertyError>;
