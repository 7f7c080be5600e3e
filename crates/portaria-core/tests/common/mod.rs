//! Shared test doubles: a scriptable signaling backend and player factory

// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use portaria_core::{
    AudioSink, CallSession, Error, MediaConstraints, MediaStream, PlayerFactory, PlayerHandle,
    PlayerRequest, Result, SessionConfig, SignalingAgent, SignalingBackend, SignalingEvent,
};

pub fn test_config() -> SessionConfig {
    let endpoint = Url::parse("wss://pbx.test.local:8089/ws").unwrap();
    SessionConfig::new(endpoint, "sip:101@pbx.test.local", "secret", "101")
}

/// Backend that records every agent it creates
#[derive(Default)]
pub struct MockBackend {
    agents: Mutex<Vec<Arc<MockAgent>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn agent(&self, index: usize) -> Arc<MockAgent> {
        self.agents.lock().unwrap()[index].clone()
    }

    pub fn latest_agent(&self) -> Arc<MockAgent> {
        self.agents.lock().unwrap().last().unwrap().clone()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.lock().unwrap().len()
    }
}

impl SignalingBackend for MockBackend {
    fn create_agent(
        &self,
        _config: &SessionConfig,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Result<Arc<dyn SignalingAgent>> {
        let agent = Arc::new(MockAgent {
            events,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            fail_calls: AtomicBool::new(false),
            call_delay_ms: AtomicU64::new(0),
            sessions: Mutex::new(Vec::new()),
        });
        self.agents.lock().unwrap().push(agent.clone());
        Ok(agent)
    }
}

pub struct MockAgent {
    events: mpsc::UnboundedSender<SignalingEvent>,
    pub started: AtomicBool,
    pub stopped: AtomicBool,
    pub fail_calls: AtomicBool,
    call_delay_ms: AtomicU64,
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

impl MockAgent {
    pub fn emit(&self, event: SignalingEvent) {
        let _ = self.events.send(event);
    }

    pub fn set_call_delay(&self, delay: Duration) {
        self.call_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn session(&self, index: usize) -> Arc<MockSession> {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SignalingAgent for MockAgent {
    async fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn call(
        &self,
        destination: &str,
        _constraints: &MediaConstraints,
    ) -> Result<Arc<dyn CallSession>> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(Error::call_failed("destination unreachable"));
        }
        let delay = self.call_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let session = MockSession::new(destination);
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

pub struct MockSession {
    remote: String,
    pub answer_count: AtomicUsize,
    pub terminate_count: AtomicUsize,
    terminate_delay_ms: AtomicU64,
    stream: Mutex<Option<MediaStream>>,
}

impl MockSession {
    pub fn new(remote: &str) -> Arc<Self> {
        Arc::new(Self {
            remote: remote.to_string(),
            answer_count: AtomicUsize::new(0),
            terminate_count: AtomicUsize::new(0),
            terminate_delay_ms: AtomicU64::new(0),
            stream: Mutex::new(None),
        })
    }

    pub fn set_stream(&self, stream: MediaStream) {
        *self.stream.lock().unwrap() = Some(stream);
    }

    pub fn set_terminate_delay(&self, delay: Duration) {
        self.terminate_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn terminations(&self) -> usize {
        self.terminate_count.load(Ordering::SeqCst)
    }

    pub fn answers(&self) -> usize {
        self.answer_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallSession for MockSession {
    fn remote_identity(&self) -> String {
        self.remote.clone()
    }

    fn remote_stream(&self) -> Option<MediaStream> {
        self.stream.lock().unwrap().clone()
    }

    async fn answer(&self, _constraints: &MediaConstraints) -> Result<()> {
        self.answer_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        self.terminate_count.fetch_add(1, Ordering::SeqCst);
        let delay = self.terminate_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }
}

/// Audio sink that records every assigned stream
#[derive(Default)]
pub struct RecordingSink {
    pub fail_assign: AtomicBool,
    assigned: Mutex<Vec<MediaStream>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn assigned(&self) -> Vec<MediaStream> {
        self.assigned.lock().unwrap().clone()
    }
}

impl AudioSink for RecordingSink {
    fn assign(&self, stream: MediaStream) -> Result<()> {
        if self.fail_assign.load(Ordering::SeqCst) {
            return Err(Error::TrackAttachFailed {
                reason: "sink rejected stream".to_string(),
            });
        }
        self.assigned.lock().unwrap().push(stream);
        Ok(())
    }
}

/// Player factory that tracks load concurrency and destroy counts
pub struct MockPlayerFactory {
    pub load_delay: Duration,
    pub fail_loads: AtomicBool,
    load_order: Mutex<Vec<Url>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    destroyed: Arc<AtomicUsize>,
}

impl MockPlayerFactory {
    pub fn new(load_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            load_delay,
            fail_loads: AtomicBool::new(false),
            load_order: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            destroyed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn load_order(&self) -> Vec<Url> {
        self.load_order.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlayerFactory for MockPlayerFactory {
    async fn load(&self, request: PlayerRequest) -> Result<Box<dyn PlayerHandle>> {
        self.load_order.lock().unwrap().push(request.url.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.load_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(Error::CameraLoadFailed {
                reason: "relay refused the stream".to_string(),
            });
        }
        Ok(Box::new(MockPlayer {
            destroyed: Arc::clone(&self.destroyed),
        }))
    }
}

pub struct MockPlayer {
    destroyed: Arc<AtomicUsize>,
}

impl PlayerHandle for MockPlayer {
    fn destroy(self: Box<Self>) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
