//! # Portaria Core - Intercom Client Coordination Library
//!
//! Client-side coordination for building-entry intercom panels that combine
//! VoIP calling with CCTV camera tiles:
//!
//! - **controller**: owns one signaling connection and at most one call,
//!   publishing push-based status snapshots for a UI to render
//! - **admission**: bounds how many camera streams load at once, with
//!   strictly FIFO admission and leak-proof slot tickets
//! - **camera**: per-tile player lifecycle with destroy-exactly-once
//!   semantics, gated by the admission queue
//! - **signaling**: the traits a SIP user-agent backend implements
//!
//! The actual SIP protocol and video transport live behind the
//! [`signaling::SignalingBackend`] and [`camera::PlayerFactory`] seams; this
//! crate supplies the state machines, retry policy, and concurrency control
//! around them.
//!
//! ## Quick Start
//!
//! ```rust
//! use portaria_core::{ControllerSettings, MediaConstraints, SessionConfig};
//! use url::Url;
//!
//! # fn main() -> Result<(), url::ParseError> {
//! let endpoint = Url::parse("wss://pbx.example.com:8089/ws")?;
//! let config = SessionConfig::new(endpoint, "sip:101@pbx.example.com", "secret", "101");
//!
//! let settings = ControllerSettings::new()
//!     .with_media_constraints(MediaConstraints::for_microphone(true));
//! # let _ = (config, settings);
//! # Ok(())
//! # }
//! ```
//!
//! With a backend in hand, `CallController::new(backend, settings)` plus
//! `connect(config)` starts registration; `subscribe()` yields a watch
//! channel the UI re-renders from.

pub mod admission;
pub mod camera;
pub mod config;
pub mod controller;
pub mod error;
pub mod retry;
pub mod signaling;

// Re-export main types
pub use admission::{AdmissionQueue, AdmissionTicket, DEFAULT_MAX_CONCURRENT_LOADS};
pub use camera::{CameraFeed, FeedId, FeedManager, PlayerFactory, PlayerHandle, PlayerRequest};
pub use config::{ControllerSettings, MediaConstraints, SessionConfig};
pub use controller::{CallController, CallState, ConnectionState, ControllerStatus};
pub use error::{Error, Result};
pub use retry::{retry_with_backoff, with_timeout, RetryConfig};
pub use signaling::{
    AudioSink, CallSession, IncomingCall, MediaStream, SignalingAgent, SignalingBackend,
    SignalingEvent, SinkSlot,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
