//! Status codes returned by every call that crosses the host/module boundary.
//!
//! The integer values are stable and shared with every host, so they must
//! never be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an action or suite call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    /// The call succeeded.
    Ok = 0,
    /// The call failed, but nothing is corrupted.
    Failed = 1,
    /// The call failed in a way that leaves the caller in an unusable state.
    ErrFatal = 2,
    /// Unknown property, suite or object.
    ErrUnknown = 3,
    /// The host lacks a capability the module requires.
    ErrMissingHostFeature = 4,
    /// The requested operation is not supported.
    ErrUnsupported = 5,
    /// Something with that name already exists.
    ErrExists = 6,
    /// Malformed data.
    ErrFormat = 7,
    /// Allocation failed.
    ErrMemory = 8,
    /// A handle was invalid or stale.
    ErrBadHandle = 9,
    /// An index into a multi-dimensional property was out of range.
    ErrBadIndex = 10,
    /// A value was of the wrong type or outside its legal range.
    ErrValue = 11,
    /// Affirmative reply to a yes/no query.
    ReplyYes = 12,
    /// Negative reply to a yes/no query.
    ReplyNo = 13,
    /// The module has no opinion; the host should do its default behaviour.
    ReplyDefault = 14,
    /// An image was in a pixel format the callee cannot handle.
    ErrImageFormat = 1000,
}

impl Status {
    /// All status values in code order.
    pub const ALL: [Status; 16] = [
        Status::Ok,
        Status::Failed,
        Status::ErrFatal,
        Status::ErrUnknown,
        Status::ErrMissingHostFeature,
        Status::ErrUnsupported,
        Status::ErrExists,
        Status::ErrFormat,
        Status::ErrMemory,
        Status::ErrBadHandle,
        Status::ErrBadIndex,
        Status::ErrValue,
        Status::ReplyYes,
        Status::ReplyNo,
        Status::ReplyDefault,
        Status::ErrImageFormat,
    ];

    /// The wire integer for this status.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Decode a wire integer.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// The symbolic name used by hosts in logs.
    pub fn name(self) -> &'static str {
        match self {
            Status::Ok => "kOfxStatOK",
            Status::Failed => "kOfxStatFailed",
            Status::ErrFatal => "kOfxStatErrFatal",
            Status::ErrUnknown => "kOfxStatErrUnknown",
            Status::ErrMissingHostFeature => "kOfxStatErrMissingHostFeature",
            Status::ErrUnsupported => "kOfxStatErrUnsupported",
            Status::ErrExists => "kOfxStatErrExists",
            Status::ErrFormat => "kOfxStatErrFormat",
            Status::ErrMemory => "kOfxStatErrMemory",
            Status::ErrBadHandle => "kOfxStatErrBadHandle",
            Status::ErrBadIndex => "kOfxStatErrBadIndex",
            Status::ErrValue => "kOfxStatErrValue",
            Status::ReplyYes => "kOfxStatReplyYes",
            Status::ReplyNo => "kOfxStatReplyNo",
            Status::ReplyDefault => "kOfxStatReplyDefault",
            Status::ErrImageFormat => "kOfxStatErrImageFormat",
        }
    }

    /// True for `Ok` and the three replies.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Status::Ok | Status::ReplyYes | Status::ReplyNo | Status::ReplyDefault
        )
    }

    /// True for every status that reports an error.
    pub fn is_error(self) -> bool {
        !self.is_success()
    }

    /// True if the callee asked the host to apply its default behaviour.
    pub fn is_default(self) -> bool {
        self == Status::ReplyDefault
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::ErrBadHandle.code(), 9);
        assert_eq!(Status::ReplyDefault.code(), 14);
        assert_eq!(Status::ErrImageFormat.code(), 1000);
    }

    #[test]
    fn test_from_code() {
        for status in Status::ALL {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(15), None);
        assert_eq!(Status::from_code(-1), None);
    }

    #[test]
    fn test_classification() {
        assert!(Status::Ok.is_success());
        assert!(Status::ReplyDefault.is_success());
        assert!(Status::ReplyDefault.is_default());
        assert!(Status::Failed.is_error());
        assert!(Status::ErrMemory.is_error());
        assert!(!Status::ReplyNo.is_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::Failed.to_string(), "kOfxStatFailed (1)");
    }
}
