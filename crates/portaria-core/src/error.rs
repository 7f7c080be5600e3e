//! Error types for the portaria core library
//!
//! All expected protocol failures (rejected registrations, failed or
//! disconnected calls) are surfaced as status transitions carrying one of
//! these values rendered as a human-readable cause; they never cross the
//! controller boundary as a panic.

use thiserror::Error;

/// Result type for portaria core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating intercom calls and camera feeds
#[derive(Debug, Error)]
pub enum Error {
    /// Registration did not complete before the watchdog expired
    #[error("registration timed out after {seconds} seconds; check credentials")]
    RegistrationTimeout { seconds: u64 },

    /// The registrar rejected the registration
    #[error("registration failed: {cause}")]
    RegistrationRejected { cause: String },

    /// An outgoing or answered call failed
    #[error("call failed: {cause}")]
    CallFailed { cause: String },

    /// The remote audio stream could not be routed to the sink
    #[error("remote audio attach failed: {reason}")]
    TrackAttachFailed { reason: String },

    /// A camera feed was torn down before its admission completed
    #[error("media load abandoned before admission completed")]
    AdmissionAbandoned,

    /// The external player could not load the stream
    #[error("camera load failed: {reason}")]
    CameraLoadFailed { reason: String },

    /// A local dial was attempted without an active registration
    #[error("not registered with the signaling server")]
    NotRegistered,

    /// A second call was attempted while one is already in progress
    #[error("a call is already in progress")]
    CallInProgress,

    /// answer() was called with no pending incoming call
    #[error("no incoming call to answer")]
    NoIncomingCall,

    /// hangup() was called with no active call session
    #[error("no active call session")]
    NoActiveCall,

    /// Invalid state for the requested operation
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// Error reported by the underlying signaling library
    #[error("signaling error: {message}")]
    Signaling { message: String },

    /// An operation exceeded its deadline
    #[error("operation timed out after {duration_ms} ms")]
    OperationTimeout { duration_ms: u64 },

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a call failure with the given cause
    pub fn call_failed(cause: impl Into<String>) -> Self {
        Self::CallFailed {
            cause: cause.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a signaling error
    pub fn signaling(message: impl Into<String>) -> Self {
        Self::Signaling {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the failed operation can reasonably succeed.
    ///
    /// Used by [`crate::retry::retry_with_backoff`]: transient conditions
    /// (a sink that has not mounted yet, a flaky signaling transport) are
    /// retried; precondition and configuration failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TrackAttachFailed { .. }
                | Error::Signaling { .. }
                | Error::OperationTimeout { .. }
        )
    }

    /// Coarse error category, used for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::RegistrationTimeout { .. } | Error::RegistrationRejected { .. } => {
                "registration"
            }
            Error::CallFailed { .. }
            | Error::NotRegistered
            | Error::CallInProgress
            | Error::NoIncomingCall
            | Error::NoActiveCall => "call",
            Error::TrackAttachFailed { .. } => "media",
            Error::AdmissionAbandoned | Error::CameraLoadFailed { .. } => "camera",
            Error::InvalidState { .. } => "state",
            Error::Signaling { .. } => "signaling",
            Error::OperationTimeout { .. } => "timeout",
            Error::Internal { .. } => "internal",
        }
    }
}
