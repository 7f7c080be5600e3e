//! Configuration for the call session controller
//!
//! `SessionConfig` carries the account material handed to the signaling
//! backend; `ControllerSettings` carries the timing knobs of the controller
//! itself. Both follow the `new()` + `with_*` builder convention.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::retry::RetryConfig;

/// How long the controller waits for a `Registered` event before it gives
/// up and stops the signaling agent.
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the duplicate-hangup guard stays armed if teardown stalls.
pub const DEFAULT_HANGUP_GRACE: Duration = Duration::from_secs(1);

/// Account and endpoint configuration for one signaling connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Signaling server endpoint, e.g. `wss://pbx.example.com:8089/ws`
    pub signaling_endpoint: Url,
    /// Registered identity URI, e.g. `sip:101@pbx.example.com`
    pub identity: String,
    /// Registration secret
    pub secret: String,
    /// Local extension number presented to peers
    pub local_extension: String,
}

impl SessionConfig {
    pub fn new(
        signaling_endpoint: Url,
        identity: impl Into<String>,
        secret: impl Into<String>,
        local_extension: impl Into<String>,
    ) -> Self {
        Self {
            signaling_endpoint,
            identity: identity.into(),
            secret: secret.into(),
            local_extension: local_extension.into(),
        }
    }
}

/// Media constraints requested when placing or answering a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

impl MediaConstraints {
    /// Constraints for a client whose microphone may be unavailable.
    ///
    /// Intercom panels without capture permission still answer calls; they
    /// just offer no audio of their own.
    pub fn for_microphone(available: bool) -> Self {
        Self {
            audio: available,
            ..Self::default()
        }
    }
}

/// Timing and media policy for a [`crate::controller::CallController`]
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Registration watchdog deadline
    pub registration_timeout: Duration,
    /// Duplicate-hangup guard duration
    pub hangup_grace: Duration,
    /// Constraints used for outgoing and answered calls
    pub media_constraints: MediaConstraints,
    /// Retry policy for routing remote audio into the sink
    pub attach_retry: RetryConfig,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            hangup_grace: DEFAULT_HANGUP_GRACE,
            media_constraints: MediaConstraints::default(),
            attach_retry: RetryConfig::media_attach(),
        }
    }
}

impl ControllerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    pub fn with_hangup_grace(mut self, grace: Duration) -> Self {
        self.hangup_grace = grace;
        self
    }

    pub fn with_media_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.media_constraints = constraints;
        self
    }

    pub fn with_attach_retry(mut self, retry: RetryConfig) -> Self {
        self.attach_retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ControllerSettings::default();
        assert_eq!(settings.registration_timeout, Duration::from_secs(10));
        assert_eq!(settings.hangup_grace, Duration::from_secs(1));
        assert!(settings.media_constraints.audio);
        assert!(!settings.media_constraints.video);
    }

    #[test]
    fn test_builder_overrides() {
        let settings = ControllerSettings::new()
            .with_registration_timeout(Duration::from_secs(5))
            .with_media_constraints(MediaConstraints::for_microphone(false));
        assert_eq!(settings.registration_timeout, Duration::from_secs(5));
        assert!(!settings.media_constraints.audio);
        assert!(settings.media_constraints.echo_cancellation);
    }

    #[test]
    fn test_session_config_fields() {
        let url = Url::parse("wss://pbx.example.com:8089/ws").unwrap();
        let config = SessionConfig::new(url.clone(), "sip:101@pbx.example.com", "secret", "101");
        assert_eq!(config.signaling_endpoint, url);
        assert_eq!(config.identity, "sip:101@pbx.example.com");
        assert_eq!(config.local_extension, "101");
    }
}
