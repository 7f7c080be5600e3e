//! Call session controller
//!
//! Owns one signaling connection and at most one call at a time, and turns
//! the backend's asynchronous events into [`ControllerStatus`] snapshots
//! published through a `tokio::sync::watch` channel. Consumers re-render on
//! change; they never poll the backend.
//!
//! Failure semantics: expected protocol failures (rejected registration,
//! failed call, lost transport) surface as status transitions carrying a
//! human-readable cause. Precondition violations on the operations return
//! typed errors and leave state untouched.

pub mod state;

mod media;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ControllerSettings, SessionConfig};
use crate::error::{Error, Result};
use crate::retry::with_timeout;
use crate::signaling::{
    CallSession, IncomingCall, SignalingAgent, SignalingBackend, SignalingEvent, SinkSlot,
};

pub use state::{CallState, ConnectionState, ControllerStatus};

/// Mutable connection and call state, guarded by one lock so operations and
/// the event pump serialize against each other.
#[derive(Default)]
struct Connection {
    agent: Option<Arc<dyn SignalingAgent>>,
    session: Option<Arc<dyn CallSession>>,
    incoming: Option<IncomingCall>,
    watchdog: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

struct Inner {
    backend: Arc<dyn SignalingBackend>,
    settings: ControllerSettings,
    sink: SinkSlot,
    status_tx: watch::Sender<ControllerStatus>,
    conn: Mutex<Connection>,
    hanging_up: AtomicBool,
}

/// Coordinates one intercom account: connection, registration, and the
/// single active call.
#[derive(Clone)]
pub struct CallController {
    inner: Arc<Inner>,
}

impl CallController {
    pub fn new(backend: Arc<dyn SignalingBackend>, settings: ControllerSettings) -> Self {
        let (status_tx, _) = watch::channel(ControllerStatus::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                settings,
                sink: SinkSlot::new(),
                status_tx,
                conn: Mutex::new(Connection::default()),
                hanging_up: AtomicBool::new(false),
            }),
        }
    }

    /// Slot where the UI mounts its audio output
    pub fn sink(&self) -> SinkSlot {
        self.inner.sink.clone()
    }

    /// Current status snapshot
    pub fn status(&self) -> ControllerStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Whether a call session (pending or established) currently exists
    pub async fn has_active_session(&self) -> bool {
        let conn = self.inner.conn.lock().await;
        conn.session.is_some() || conn.incoming.is_some()
    }

    /// Open the signaling connection and begin registration.
    ///
    /// Idempotent re-entry: any existing connection is torn down first. A
    /// watchdog forcibly stops the agent if no `Registered` event arrives
    /// within the configured deadline.
    pub async fn connect(&self, config: SessionConfig) -> Result<()> {
        let mut conn = self.inner.conn.lock().await;
        self.inner.teardown_locked(&mut conn).await;

        info!(endpoint = %config.signaling_endpoint, identity = %config.identity, "connecting");
        self.inner.publish(|s| {
            s.connection = ConnectionState::Connecting;
            s.call = CallState::Idle;
            s.remote_identity = None;
            s.message = "connecting to signaling server".to_string();
        });

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let agent = match self.inner.backend.create_agent(&config, event_tx) {
            Ok(agent) => agent,
            Err(e) => {
                self.inner.publish(|s| {
                    s.connection = ConnectionState::Disconnected;
                    s.message = format!("connection failed: {e}");
                });
                return Err(e);
            }
        };

        if let Err(e) = agent.start().await {
            self.inner.publish(|s| {
                s.connection = ConnectionState::Disconnected;
                s.message = format!("connection failed: {e}");
            });
            return Err(e);
        }

        conn.agent = Some(agent);
        let inner = Arc::clone(&self.inner);
        conn.pump = Some(tokio::spawn(Inner::run_event_pump(inner, event_rx)));
        Ok(())
    }

    /// Tear down the connection and any call, returning to `Disconnected`
    pub async fn disconnect(&self) {
        let mut conn = self.inner.conn.lock().await;
        self.inner.teardown_locked(&mut conn).await;
        self.inner.publish(|s| {
            s.connection = ConnectionState::Disconnected;
            s.call = CallState::Idle;
            s.remote_identity = None;
            s.message = "disconnected".to_string();
        });
        info!("disconnected");
    }

    /// Place an outgoing call.
    ///
    /// Requires an active registration and no call in progress; violations
    /// return an error and leave state untouched.
    pub async fn dial(&self, destination: &str) -> Result<()> {
        let mut conn = self.inner.conn.lock().await;

        let connection = self.inner.status_tx.borrow().connection;
        if connection != ConnectionState::Registered {
            warn!(destination, %connection, "dial rejected, not registered");
            return Err(Error::NotRegistered);
        }
        if conn.session.is_some() || conn.incoming.is_some() {
            warn!(destination, "dial rejected, a call is already in progress");
            return Err(Error::CallInProgress);
        }
        let agent = conn.agent.clone().ok_or(Error::NotRegistered)?;

        match agent
            .call(destination, &self.inner.settings.media_constraints)
            .await
        {
            Ok(session) => {
                // Store the session before publishing, so observers never
                // see a dialing state with no session behind it.
                conn.session = Some(Arc::clone(&session));
                self.inner.publish(|s| {
                    s.call = CallState::Dialing;
                    s.remote_identity = Some(destination.to_string());
                    s.message = format!("calling {destination}");
                });
                self.inner.spawn_media_attach(session);
                info!(destination, "outgoing call started");
                Ok(())
            }
            Err(e) => {
                // State was never left Idle; only the status line changes.
                self.inner.publish(|s| {
                    s.message = Error::call_failed(e.to_string()).to_string();
                });
                warn!(destination, error = %e, "outgoing call failed");
                Err(e)
            }
        }
    }

    /// Accept the pending incoming call.
    ///
    /// The incoming record is taken before the backend is invoked, so a
    /// duplicate answer in the same tick finds nothing to accept.
    pub async fn answer(&self) -> Result<()> {
        let mut conn = self.inner.conn.lock().await;
        let incoming = conn.incoming.take().ok_or(Error::NoIncomingCall)?;

        match incoming
            .session
            .answer(&self.inner.settings.media_constraints)
            .await
        {
            Ok(()) => {
                conn.session = Some(Arc::clone(&incoming.session));
                self.inner.publish(|s| {
                    s.call = CallState::Active;
                    s.remote_identity = Some(incoming.caller_extension.clone());
                    s.message = "in call".to_string();
                });
                self.inner.spawn_media_attach(incoming.session);
                info!("incoming call answered");
                Ok(())
            }
            Err(e) => {
                self.inner.publish(|s| {
                    s.call = CallState::Idle;
                    s.remote_identity = None;
                    s.message = Error::call_failed(e.to_string()).to_string();
                });
                warn!(error = %e, "failed to answer incoming call");
                Err(e)
            }
        }
    }

    /// Terminate the current call.
    ///
    /// Safe under rapid duplicate invocation: a guard suppresses re-entry
    /// until teardown completes or the grace period elapses, whichever comes
    /// first, so each teardown terminates the session exactly once.
    pub async fn hangup(&self) -> Result<()> {
        if self.inner.hanging_up.swap(true, Ordering::SeqCst) {
            debug!("hangup already in flight, ignoring duplicate");
            return Ok(());
        }

        let grace = self.inner.settings.hangup_grace;
        // A pending incoming session counts: hanging up while ringing
        // rejects the call.
        let session = {
            let mut conn = self.inner.conn.lock().await;
            match conn.session.take() {
                Some(session) => {
                    conn.incoming = None;
                    Some(session)
                }
                None => conn.incoming.take().map(|incoming| incoming.session),
            }
        };

        let result = match session {
            Some(session) => {
                if let Err(e) =
                    with_timeout("terminate_session", grace, session.terminate()).await
                {
                    warn!(error = %e, "session teardown did not complete cleanly");
                }
                self.inner.publish(|s| {
                    s.call = CallState::Idle;
                    s.remote_identity = None;
                    s.message = "hung up".to_string();
                });
                info!("call hung up");
                Ok(())
            }
            None => {
                warn!("hangup requested with no active session");
                Err(Error::NoActiveCall)
            }
        };

        self.inner.hanging_up.store(false, Ordering::SeqCst);
        result
    }
}

impl Inner {
    fn publish<F: FnOnce(&mut ControllerStatus)>(&self, update: F) {
        self.status_tx.send_modify(|status| {
            update(status);
            status.updated_at = Utc::now();
        });
    }

    fn spawn_media_attach(self: &Arc<Self>, session: Arc<dyn CallSession>) {
        let sink = self.sink.clone();
        let policy = self.settings.attach_retry.clone();
        tokio::spawn(media::attach_remote_audio(session, sink, policy));
    }

    async fn run_event_pump(
        inner: Arc<Inner>,
        mut events: mpsc::UnboundedReceiver<SignalingEvent>,
    ) {
        while let Some(event) = events.recv().await {
            debug!(?event, "signaling event");
            Inner::handle_event(&inner, event).await;
        }
        debug!("signaling event channel closed");
    }

    async fn handle_event(inner: &Arc<Inner>, event: SignalingEvent) {
        let mut conn = inner.conn.lock().await;
        match event {
            SignalingEvent::Connected => {
                inner.publish(|s| {
                    s.connection = ConnectionState::Connected;
                    s.message = "connected, registering".to_string();
                });
                Inner::cancel_watchdog(&mut conn);
                let watchdog = Arc::clone(inner);
                let timeout = inner.settings.registration_timeout;
                conn.watchdog = Some(tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    Inner::registration_watchdog_fired(watchdog, timeout).await;
                }));
            }
            SignalingEvent::Registered => {
                Inner::cancel_watchdog(&mut conn);
                inner.publish(|s| {
                    s.connection = ConnectionState::Registered;
                    s.message = "registered".to_string();
                });
                info!("registration accepted");
            }
            SignalingEvent::RegistrationFailed { cause } => {
                Inner::cancel_watchdog(&mut conn);
                inner.publish(|s| {
                    s.connection = ConnectionState::RegistrationFailed;
                    s.message = Error::RegistrationRejected { cause: cause.clone() }.to_string();
                });
                warn!(%cause, "registration rejected");
            }
            SignalingEvent::Disconnected { reason } => {
                Inner::cancel_watchdog(&mut conn);
                conn.session = None;
                conn.incoming = None;
                inner.publish(|s| {
                    s.connection = ConnectionState::Disconnected;
                    s.call = CallState::Idle;
                    s.remote_identity = None;
                    s.message = match &reason {
                        Some(r) => format!("disconnected: {r}"),
                        None => "disconnected".to_string(),
                    };
                });
                warn!(?reason, "signaling transport lost");
            }
            SignalingEvent::IncomingSession { session } => {
                if conn.session.is_some() || conn.incoming.is_some() {
                    debug!("busy, ignoring additional incoming session");
                    return;
                }
                let caller = session.remote_identity();
                conn.incoming = Some(IncomingCall {
                    caller_extension: caller.clone(),
                    session,
                    received_at: Utc::now(),
                });
                inner.publish(|s| {
                    s.call = CallState::Ringing {
                        caller: caller.clone(),
                    };
                    s.remote_identity = Some(caller.clone());
                    s.message = format!("incoming call from {caller}");
                });
                info!(%caller, "incoming call");
            }
            SignalingEvent::CallConfirmed => {
                if conn.session.is_none() {
                    debug!("confirm event with no session, ignoring");
                    return;
                }
                inner.publish(|s| {
                    s.call = CallState::Active;
                    s.message = "in call".to_string();
                });
            }
            SignalingEvent::CallEnded { reason } => {
                if conn.session.is_none() && conn.incoming.is_none() {
                    debug!("end event with no session, ignoring");
                    return;
                }
                let message = match reason {
                    Some(r) => format!("call ended: {r}"),
                    None => "call ended".to_string(),
                };
                Inner::finish_call(inner, &mut conn, message);
            }
            SignalingEvent::CallFailed { cause } => {
                if conn.session.is_none() && conn.incoming.is_none() {
                    debug!("failure event with no session, ignoring");
                    return;
                }
                warn!(%cause, "call failed");
                let message = Error::call_failed(cause).to_string();
                Inner::finish_call(inner, &mut conn, message);
            }
        }
    }

    /// Clear the session and settle the call state through `Ended` to `Idle`,
    /// keeping `message` as the latest terminal cause.
    fn finish_call(inner: &Arc<Inner>, conn: &mut Connection, message: String) {
        conn.session = None;
        conn.incoming = None;
        inner.publish(|s| {
            s.call = CallState::Ended;
            s.message = message;
        });
        inner.publish(|s| {
            s.call = CallState::Idle;
            s.remote_identity = None;
        });
    }

    fn cancel_watchdog(conn: &mut Connection) {
        if let Some(watchdog) = conn.watchdog.take() {
            watchdog.abort();
        }
    }

    async fn registration_watchdog_fired(inner: Arc<Inner>, timeout: Duration) {
        let mut conn = inner.conn.lock().await;
        if inner.status_tx.borrow().connection == ConnectionState::Registered {
            return;
        }
        warn!(
            timeout_secs = timeout.as_secs(),
            "registration watchdog expired, stopping agent"
        );
        if let Some(agent) = conn.agent.take() {
            agent.stop().await;
        }
        conn.session = None;
        conn.incoming = None;
        conn.watchdog = None;
        inner.publish(|s| {
            s.connection = ConnectionState::RegistrationFailed;
            s.call = CallState::Idle;
            s.remote_identity = None;
            s.message = Error::RegistrationTimeout {
                seconds: timeout.as_secs(),
            }
            .to_string();
        });
    }

    async fn teardown_locked(&self, conn: &mut Connection) {
        Inner::cancel_watchdog(conn);
        if let Some(pump) = conn.pump.take() {
            pump.abort();
        }
        if let Some(session) = conn.session.take() {
            if let Err(e) = with_timeout(
                "terminate_session",
                self.settings.hangup_grace,
                session.terminate(),
            )
            .await
            {
                warn!(error = %e, "failed to terminate session during teardown");
            }
        }
        conn.incoming = None;
        if let Some(agent) = conn.agent.take() {
            agent.stop().await;
        }
    }
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallController")
            .field("status", &self.status())
            .finish()
    }
}
