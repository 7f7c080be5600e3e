//! Bounded admission for concurrent media loads
//!
//! Camera feeds open their streams through an external player library that
//! degrades badly when too many loads run at once. [`AdmissionQueue`] caps
//! concurrent loads at a fixed capacity and admits waiters strictly in
//! arrival order.
//!
//! Capacity is held through an [`AdmissionTicket`]: release consumes the
//! ticket, and dropping an unreleased ticket releases the slot, so a load
//! abandoned by an error or a cancelled future never leaks capacity.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::debug;

/// Default cap on concurrent camera loads
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 4;

struct QueueState {
    active: usize,
    waiters: VecDeque<oneshot::Sender<AdmissionTicket>>,
}

struct Shared {
    max_concurrent: usize,
    state: Mutex<QueueState>,
}

/// FIFO counting semaphore for media loads
///
/// Cheaply cloneable handle; all clones share the same capacity.
#[derive(Clone)]
pub struct AdmissionQueue {
    shared: Arc<Shared>,
}

impl AdmissionQueue {
    /// Create a queue admitting at most `max_concurrent` loads at once
    pub fn new(max_concurrent: usize) -> Self {
        debug_assert!(max_concurrent > 0);
        Self {
            shared: Arc::new(Shared {
                max_concurrent: max_concurrent.max(1),
                state: Mutex::new(QueueState {
                    active: 0,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Number of admissions currently outstanding
    pub fn active(&self) -> usize {
        self.shared.state.lock().map(|s| s.active).unwrap_or(0)
    }

    /// Number of acquires currently waiting for a slot
    pub fn waiting(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|s| s.waiters.len())
            .unwrap_or(0)
    }

    /// Capacity this queue was built with
    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }

    /// Wait for an admission slot.
    ///
    /// Suspends (never blocks the thread) until a slot is free; waiters are
    /// admitted strictly first-come-first-served. Dropping the returned
    /// future before admission simply forfeits the place in line.
    pub async fn acquire(&self) -> AdmissionTicket {
        let rx = {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // A free slot with queued waiters cannot happen: releases hand
            // the slot to the head waiter without ever decrementing first.
            if state.active < self.shared.max_concurrent {
                state.active += 1;
                debug!(
                    active = state.active,
                    max = self.shared.max_concurrent,
                    "admission slot acquired"
                );
                return AdmissionTicket::new(Arc::clone(&self.shared));
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!(
                waiting = state.waiters.len(),
                max = self.shared.max_concurrent,
                "admission capacity exhausted, queued"
            );
            rx
        };

        // The sender side lives in the queue state we hold an Arc to and is
        // consumed only by a slot hand-off, so this cannot error while the
        // queue exists.
        match rx.await {
            Ok(ticket) => ticket,
            Err(_) => unreachable!("admission queue dropped while a waiter was queued"),
        }
    }
}

impl std::fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionQueue")
            .field("max_concurrent", &self.shared.max_concurrent)
            .field("active", &self.active())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// Proof of admission for one media load.
///
/// One-shot by construction: [`release`](Self::release) consumes the ticket,
/// and dropping an unreleased ticket releases the slot.
pub struct AdmissionTicket {
    shared: Arc<Shared>,
    released: AtomicBool,
}

impl AdmissionTicket {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            released: AtomicBool::new(false),
        }
    }

    /// Release the slot, admitting the head waiter if any
    pub fn release(self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            release_slot(&self.shared);
        }
    }

    // Marks the ticket as spent without touching the queue. Used when a
    // hand-off fails because the waiter's future was cancelled; the caller
    // keeps looking for another waiter while holding the state lock, so the
    // returned ticket must not re-enter release_slot on drop.
    fn disarm(&self) {
        self.released.store(true, Ordering::Release);
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!("admission ticket dropped without explicit release");
            release_slot(&self.shared);
        }
    }
}

impl std::fmt::Debug for AdmissionTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionTicket")
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}

fn release_slot(shared: &Arc<Shared>) {
    let mut state = shared
        .state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    while let Some(waiter) = state.waiters.pop_front() {
        let ticket = AdmissionTicket::new(Arc::clone(shared));
        match waiter.send(ticket) {
            Ok(()) => {
                // Slot handed over directly; active count is unchanged.
                debug!(
                    active = state.active,
                    waiting = state.waiters.len(),
                    "admission slot handed to next waiter"
                );
                return;
            }
            Err(stale) => {
                // Waiter cancelled its acquire; skip it without losing the slot.
                stale.disarm();
                debug!("skipping cancelled admission waiter");
            }
        }
    }
    state.active = state.active.saturating_sub(1);
    debug!(active = state.active, "admission slot released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::poll;
    use std::pin::pin;

    #[tokio::test]
    async fn test_acquire_within_capacity_is_immediate() {
        let queue = AdmissionQueue::new(4);
        let t1 = queue.acquire().await;
        let t2 = queue.acquire().await;
        assert_eq!(queue.active(), 2);
        assert_eq!(queue.waiting(), 0);
        t1.release();
        t2.release();
        assert_eq!(queue.active(), 0);
    }

    #[tokio::test]
    async fn test_capacity_bound_with_six_acquires() {
        let queue = AdmissionQueue::new(4);

        let t1 = queue.acquire().await;
        let t2 = queue.acquire().await;
        let t3 = queue.acquire().await;
        let t4 = queue.acquire().await;
        assert_eq!(queue.active(), 4);

        let mut f5 = pin!(queue.acquire());
        let mut f6 = pin!(queue.acquire());
        assert!(poll!(f5.as_mut()).is_pending());
        assert!(poll!(f6.as_mut()).is_pending());
        assert_eq!(queue.active(), 4);
        assert_eq!(queue.waiting(), 2);

        t1.release();
        let t5 = match poll!(f5.as_mut()) {
            std::task::Poll::Ready(t) => t,
            std::task::Poll::Pending => panic!("fifth acquire should resolve after a release"),
        };
        assert!(poll!(f6.as_mut()).is_pending());
        assert_eq!(queue.active(), 4);

        t2.release();
        let t6 = match poll!(f6.as_mut()) {
            std::task::Poll::Ready(t) => t,
            std::task::Poll::Pending => panic!("sixth acquire should resolve after a release"),
        };
        assert_eq!(queue.active(), 4);

        drop((t3, t4, t5, t6));
        assert_eq!(queue.active(), 0);
    }

    #[tokio::test]
    async fn test_fifo_admission_order() {
        let queue = AdmissionQueue::new(1);
        let held = queue.acquire().await;

        let mut first = pin!(queue.acquire());
        let mut second = pin!(queue.acquire());
        assert!(poll!(first.as_mut()).is_pending());
        assert!(poll!(second.as_mut()).is_pending());

        held.release();

        // The slot went to the first waiter regardless of poll order.
        assert!(poll!(second.as_mut()).is_pending());
        assert!(poll!(first.as_mut()).is_ready());
    }

    #[tokio::test]
    async fn test_dropped_ticket_releases_slot() {
        let queue = AdmissionQueue::new(2);
        let ticket = queue.acquire().await;
        assert_eq!(queue.active(), 1);
        drop(ticket);
        assert_eq!(queue.active(), 0);

        // Slot is reusable afterwards.
        let _again = queue.acquire().await;
        assert_eq!(queue.active(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_consume_slot() {
        let queue = AdmissionQueue::new(1);
        let held = queue.acquire().await;

        let mut cancelled = Box::pin(queue.acquire());
        let mut survivor = pin!(queue.acquire());
        assert!(poll!(cancelled.as_mut()).is_pending());
        assert!(poll!(survivor.as_mut()).is_pending());

        drop(cancelled);
        held.release();

        // The cancelled waiter is skipped; the survivor gets the slot.
        let _ticket = match poll!(survivor.as_mut()) {
            std::task::Poll::Ready(t) => t,
            std::task::Poll::Pending => panic!("survivor should resolve after a release"),
        };
        assert_eq!(queue.active(), 1);
    }

    #[tokio::test]
    async fn test_release_with_only_cancelled_waiters_frees_capacity() {
        let queue = AdmissionQueue::new(1);
        let held = queue.acquire().await;

        let waiter = Box::pin(queue.acquire());
        drop(waiter);
        held.release();

        assert_eq!(queue.active(), 0);
        assert_eq!(queue.waiting(), 0);
    }

    #[tokio::test]
    async fn test_active_never_exceeds_capacity_under_contention() {
        use std::sync::atomic::AtomicUsize;

        let queue = AdmissionQueue::new(4);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..24 {
            let queue = queue.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let ticket = queue.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                ticket.release();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(queue.active(), 0);
        assert_eq!(queue.waiting(), 0);
    }
}
