//! Camera feed lifecycle
//!
//! Each feed owns at most one live player obtained from an external player
//! library. Loading a stream is expensive, so feeds go through the
//! [`AdmissionQueue`](crate::admission::AdmissionQueue) for the loading
//! phase only; once a player is established the slot is returned, success
//! and failure alike. Players are destroyed exactly once: on stop, and
//! before a replacement is loaded.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::admission::{AdmissionQueue, DEFAULT_MAX_CONCURRENT_LOADS};
use crate::error::{Error, Result};

/// Identifier of a camera feed
pub type FeedId = Uuid;

/// Parameters for loading one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRequest {
    pub url: Url,
}

/// Live player produced by the external library.
///
/// `destroy` consumes the handle, so a player cannot be destroyed twice.
pub trait PlayerHandle: Send {
    fn destroy(self: Box<Self>);
}

/// External player library seam
#[async_trait]
pub trait PlayerFactory: Send + Sync {
    /// Load a stream, resolving once the source is established
    async fn load(&self, request: PlayerRequest) -> Result<Box<dyn PlayerHandle>>;
}

struct FeedState {
    url: Url,
    player: Option<Box<dyn PlayerHandle>>,
    stopped: bool,
}

/// One camera tile: a URL and at most one live player
pub struct CameraFeed {
    id: FeedId,
    factory: Arc<dyn PlayerFactory>,
    queue: AdmissionQueue,
    state: Mutex<FeedState>,
}

impl CameraFeed {
    fn new(url: Url, factory: Arc<dyn PlayerFactory>, queue: AdmissionQueue) -> Self {
        Self {
            id: Uuid::new_v4(),
            factory,
            queue,
            state: Mutex::new(FeedState {
                url,
                player: None,
                stopped: false,
            }),
        }
    }

    pub fn id(&self) -> FeedId {
        self.id
    }

    pub async fn url(&self) -> Url {
        self.state.lock().await.url.clone()
    }

    pub async fn is_playing(&self) -> bool {
        self.state.lock().await.player.is_some()
    }

    /// Load and start this feed's stream.
    ///
    /// Destroys any previous player first, then waits for an admission slot,
    /// holds it only while the load is in flight, and installs the new
    /// player. Returns [`Error::AdmissionAbandoned`] if the feed was stopped
    /// while waiting or loading.
    pub async fn start(&self) -> Result<()> {
        let url = {
            let mut state = self.state.lock().await;
            state.stopped = false;
            if let Some(old) = state.player.take() {
                debug!(feed = %self.id, "destroying previous player before reload");
                old.destroy();
            }
            state.url.clone()
        };

        let ticket = self.queue.acquire().await;
        if self.state.lock().await.stopped {
            debug!(feed = %self.id, "feed stopped while waiting for admission");
            drop(ticket);
            return Err(Error::AdmissionAbandoned);
        }

        debug!(feed = %self.id, url = %url, "loading camera stream");
        let loaded = self.factory.load(PlayerRequest { url }).await;
        ticket.release();

        let player = loaded.map_err(|e| {
            warn!(feed = %self.id, error = %e, "camera stream failed to load");
            Error::CameraLoadFailed {
                reason: e.to_string(),
            }
        })?;

        let mut state = self.state.lock().await;
        if state.stopped {
            debug!(feed = %self.id, "feed stopped while loading, destroying player");
            player.destroy();
            return Err(Error::AdmissionAbandoned);
        }
        // A concurrent start may have installed a player while this load was
        // in flight; the feed owns at most one.
        if let Some(old) = state.player.take() {
            debug!(feed = %self.id, "replacing player installed by a concurrent start");
            old.destroy();
        }
        state.player = Some(player);
        info!(feed = %self.id, "camera feed playing");
        Ok(())
    }

    /// Stop the feed, destroying the player if one is live
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.stopped = true;
        if let Some(player) = state.player.take() {
            debug!(feed = %self.id, "camera feed stopped");
            player.destroy();
        }
    }

    /// Re-point the feed at a new URL and reload.
    ///
    /// The old player is destroyed before the new load begins.
    pub async fn set_url(&self, url: Url) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.url = url;
        }
        self.start().await
    }
}

impl fmt::Debug for CameraFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraFeed").field("id", &self.id).finish()
    }
}

/// Registry of camera feeds sharing one admission queue
pub struct FeedManager {
    factory: Arc<dyn PlayerFactory>,
    queue: AdmissionQueue,
    feeds: DashMap<FeedId, Arc<CameraFeed>>,
}

impl FeedManager {
    pub fn new(factory: Arc<dyn PlayerFactory>) -> Self {
        Self::with_capacity(factory, DEFAULT_MAX_CONCURRENT_LOADS)
    }

    pub fn with_capacity(factory: Arc<dyn PlayerFactory>, max_concurrent_loads: usize) -> Self {
        Self {
            factory,
            queue: AdmissionQueue::new(max_concurrent_loads),
            feeds: DashMap::new(),
        }
    }

    /// Shared admission queue, for diagnostics
    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Register a feed for the given stream URL
    pub fn add_feed(&self, url: Url) -> Arc<CameraFeed> {
        let feed = Arc::new(CameraFeed::new(
            url,
            Arc::clone(&self.factory),
            self.queue.clone(),
        ));
        self.feeds.insert(feed.id(), Arc::clone(&feed));
        debug!(feed = %feed.id(), total = self.feeds.len(), "camera feed added");
        feed
    }

    pub fn get(&self, id: &FeedId) -> Option<Arc<CameraFeed>> {
        self.feeds.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Stop and unregister a feed
    pub async fn remove_feed(&self, id: &FeedId) -> bool {
        match self.feeds.remove(id) {
            Some((_, feed)) => {
                feed.stop().await;
                debug!(feed = %id, "camera feed removed");
                true
            }
            None => false,
        }
    }

    /// Stop every registered feed
    pub async fn stop_all(&self) {
        let feeds: Vec<_> = self
            .feeds
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for feed in feeds {
            feed.stop().await;
        }
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

impl fmt::Debug for FeedManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedManager")
            .field("feeds", &self.feeds.len())
            .field("queue", &self.queue)
            .finish()
    }
}
