//! Fan-out of sampled snapshots to live stream subscribers.
//!
//! Each subscriber owns a small bounded queue. `publish` offers the snapshot to
//! every queue concurrently and waits at most `send_timeout` for room; a queue
//! that stays full, or whose receiver is gone, gets its subscriber evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::debug;

use crate::types::Snapshot;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(250);
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

type Registry = HashMap<u64, mpsc::Sender<Arc<Snapshot>>>;

struct Inner {
    subscribers: Mutex<Registry>,
    next_id: AtomicU64,
    send_timeout: Duration,
    queue_depth: usize,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT, DEFAULT_QUEUE_DEPTH)
    }
}

impl Broadcaster {
    pub fn new(send_timeout: Duration, queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                send_timeout,
                queue_depth: queue_depth.max(1),
            }),
        }
    }

    /// Register a new subscriber. It sees only snapshots published from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.queue_depth);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.registry().insert(id, tx);
        debug!(subscriber = id, "subscriber registered");
        Subscription {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.inner.registry().remove(&id).is_some() {
            debug!(subscriber = id, "subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry().len()
    }

    /// Deliver to every current subscriber; returns how many accepted it.
    ///
    /// Completes within roughly `send_timeout` regardless of subscriber health.
    pub async fn publish(&self, snapshot: Arc<Snapshot>) -> usize {
        // Copy the senders out so the registry lock is not held while waiting.
        let targets: Vec<(u64, mpsc::Sender<Arc<Snapshot>>)> = self
            .inner
            .registry()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let timeout = self.inner.send_timeout;
        let results = join_all(targets.into_iter().map(|(id, tx)| {
            let snapshot = Arc::clone(&snapshot);
            async move { (id, tx.send_timeout(snapshot, timeout).await) }
        }))
        .await;

        let mut delivered = 0;
        let mut evict = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Timeout(_)) => {
                    debug!(subscriber = id, "subscriber stalled; dropping");
                    evict.push(id);
                }
                Err(SendTimeoutError::Closed(_)) => evict.push(id),
            }
        }
        if !evict.is_empty() {
            let mut registry = self.inner.registry();
            for id in evict {
                registry.remove(&id);
            }
        }
        delivered
    }
}

/// Receiving end of one registration. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<Snapshot>>,
    inner: Arc<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next snapshot, or `None` once the broadcaster has evicted this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.inner.registry().remove(&self.id).is_some() {
            debug!(subscriber = self.id, "subscriber disconnected");
        }
    }
}
