//! Signaling backend contract
//!
//! The controller does not speak SIP itself; it drives a signaling library
//! through these traits and reacts to the events the library emits. The
//! traits are object-safe so the backend can be swapped (production
//! user-agent, test double) without touching the controller.

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{MediaConstraints, SessionConfig};
use crate::error::Result;

/// Opaque handle to a remote media stream produced by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: Uuid,
}

impl MediaStream {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

/// UI-owned audio output the controller routes remote streams into
pub trait AudioSink: Send + Sync {
    /// Route the given stream to this output
    fn assign(&self, stream: MediaStream) -> Result<()>;
}

/// Mount point for the current [`AudioSink`].
///
/// The UI mounts and unmounts its audio element here on its own schedule;
/// the controller only ever assigns to whatever is mounted at attach time.
/// May legitimately be empty while a call is being set up.
#[derive(Clone, Default)]
pub struct SinkSlot {
    inner: Arc<RwLock<Option<Arc<dyn AudioSink>>>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&self, sink: Arc<dyn AudioSink>) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(sink);
        }
    }

    pub fn unmount(&self) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = None;
        }
    }

    pub fn current(&self) -> Option<Arc<dyn AudioSink>> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }

    pub fn is_mounted(&self) -> bool {
        self.current().is_some()
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSlot")
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// One established or pending call dialog
#[async_trait]
pub trait CallSession: Send + Sync {
    /// Identity of the remote party (extension or URI)
    fn remote_identity(&self) -> String;

    /// Remote media stream, once negotiation has produced one.
    ///
    /// May be `None` shortly after setup; callers are expected to retry.
    fn remote_stream(&self) -> Option<MediaStream>;

    /// Accept an incoming call
    async fn answer(&self, constraints: &MediaConstraints) -> Result<()>;

    /// Terminate the call
    async fn terminate(&self) -> Result<()>;
}

/// A started signaling connection bound to one account
#[async_trait]
pub trait SignalingAgent: Send + Sync {
    /// Open the transport and begin registration
    async fn start(&self) -> Result<()>;

    /// Close the transport and unregister
    async fn stop(&self);

    /// Place an outgoing call
    async fn call(
        &self,
        destination: &str,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn CallSession>>;
}

/// Factory for signaling agents
pub trait SignalingBackend: Send + Sync {
    /// Build an agent for the given account, delivering its events through
    /// `events`.
    fn create_agent(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Result<Arc<dyn SignalingAgent>>;
}

/// Events emitted by the signaling backend
pub enum SignalingEvent {
    /// Transport connected
    Connected,
    /// Registration accepted
    Registered,
    /// Transport lost or closed
    Disconnected { reason: Option<String> },
    /// Registration rejected or expired
    RegistrationFailed { cause: String },
    /// A remote party is calling
    IncomingSession { session: Arc<dyn CallSession> },
    /// The current call was confirmed (answered end to end)
    CallConfirmed,
    /// The current call ended normally
    CallEnded { reason: Option<String> },
    /// The current call failed
    CallFailed { cause: String },
}

impl fmt::Debug for SignalingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Registered => write!(f, "Registered"),
            Self::Disconnected { reason } => write!(f, "Disconnected({reason:?})"),
            Self::RegistrationFailed { cause } => write!(f, "RegistrationFailed({cause})"),
            Self::IncomingSession { session } => {
                write!(f, "IncomingSession(from {})", session.remote_identity())
            }
            Self::CallConfirmed => write!(f, "CallConfirmed"),
            Self::CallEnded { reason } => write!(f, "CallEnded({reason:?})"),
            Self::CallFailed { cause } => write!(f, "CallFailed({cause})"),
        }
    }
}

/// A pending incoming call awaiting answer or rejection
#[derive(Clone)]
pub struct IncomingCall {
    pub caller_extension: String,
    pub session: Arc<dyn CallSession>,
    pub received_at: DateTime<Utc>,
}

impl fmt::Debug for IncomingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingCall")
            .field("caller_extension", &self.caller_extension)
            .field("received_at", &self.received_at)
            .finish()
    }
}
