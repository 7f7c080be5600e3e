//! Observable state of the call session controller

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registration lifecycle of the signaling connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection attempt in progress
    Disconnected,
    /// Transport opening, registration not yet attempted
    Connecting,
    /// Transport up, registration pending
    Connected,
    /// Registration accepted; calls can be placed
    Registered,
    /// Registration rejected or watchdog expired
    RegistrationFailed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Registered => "registered",
            Self::RegistrationFailed => "registration failed",
        };
        write!(f, "{s}")
    }
}

/// Call lifecycle; single-call model, at most one non-idle value at a time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// No call
    Idle,
    /// A remote party is calling
    Ringing { caller: String },
    /// An outgoing call is being set up
    Dialing,
    /// A call is established
    Active,
    /// The call just finished; transient, settles to `Idle`
    Ended,
}

impl CallState {
    /// Whether this state carries no live call session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Ended)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Ringing { caller } => write!(f, "ringing (from {caller})"),
            Self::Dialing => write!(f, "dialing"),
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Snapshot of controller state published through the status channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub connection: ConnectionState,
    pub call: CallState,
    /// Remote party of the current call, if any
    pub remote_identity: Option<String>,
    /// Human-readable status line, including the latest terminal failure
    /// cause until the next transition
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            call: CallState::Idle,
            remote_identity: None,
            message: "disconnected".to_string(),
            updated_at: Utc::now(),
        }
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}: {}", self.connection, self.call, self.message)
    }
}
