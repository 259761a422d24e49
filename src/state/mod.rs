//! State store: the single current snapshot plus ordered observation.
//!
//! The current snapshot lives in a `watch` cell (single writer, many readers).
//! Readers clone an `Arc` out of it and never wait on handler work.
//!
//! Subscribers get a lossless, ordered feed: the snapshot current at subscribe
//! time first, then every published snapshot. Publishing and registering both
//! happen under the subscriber lock, so a subscriber can neither miss a snapshot
//! published after it attached nor see one twice.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};

use crate::types::SubscriberId;

/// Holds the current state snapshot and its subscribers.
pub struct StateStore<S> {
    current: watch::Sender<Arc<S>>,
    version: AtomicU64,
    subscribers: Mutex<Subscribers<S>>,
}

struct Subscribers<S> {
    entries: Vec<StateSubscriber<S>>,
    closed: bool,
}

struct StateSubscriber<S> {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<Arc<S>>,
}

impl<S> StateStore<S> {
    pub fn new(initial: S) -> Self {
        let (current, _) = watch::channel(Arc::new(initial));
        Self {
            current,
            version: AtomicU64::new(0),
            subscribers: Mutex::new(Subscribers {
                entries: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Latest committed snapshot.
    pub fn current(&self) -> Arc<S> {
        self.current.borrow().clone()
    }

    /// Number of snapshots published since construction.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Publish `transform(current)` as the new snapshot and return it.
    ///
    /// Single writer: only the owning controller's worker loop calls this.
    pub(crate) fn update<F>(&self, transform: F) -> Arc<S>
    where
        F: FnOnce(&S) -> S,
    {
        let previous = self.current();
        let next = Arc::new(transform(&previous));

        let mut subscribers = self.lock();
        self.current.send_replace(next.clone());
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        subscribers
            .entries
            .retain(|subscriber| subscriber.tx.send(next.clone()).is_ok());

        tracing::trace!(
            version,
            subscribers = subscribers.entries.len(),
            "state published"
        );

        next
    }

    /// Attach a subscriber. It first receives the current snapshot, then every
    /// later one in publish order.
    ///
    /// After [`close`](Self::close) the returned subscription is already ended.
    pub fn subscribe(&self) -> StateSubscription<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriberId::new();

        let mut subscribers = self.lock();
        if !subscribers.closed {
            // Still under the lock: no publish can slip in between.
            let _ = tx.send(self.current());
            subscribers.entries.push(StateSubscriber { id: id.clone(), tx });
            tracing::debug!(subscriber = %id, "state subscriber attached");
        }

        StateSubscription { id, rx }
    }

    /// Detach a subscriber. No-op if it is already gone or the store is closed.
    pub fn unsubscribe(&self, subscription: &StateSubscription<S>) {
        let mut subscribers = self.lock();
        subscribers.entries.retain(|s| s.id != subscription.id);
    }

    /// Number of attached subscribers whose receiving side is still alive.
    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }

    /// Detach every subscriber. Their streams end once drained.
    pub fn close(&self) {
        let mut subscribers = self.lock();
        subscribers.closed = true;
        let detached = subscribers.entries.len();
        subscribers.entries.clear();
        tracing::debug!(detached, "state store closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers<S>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("version", &self.version())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Live, ordered feed of state snapshots.
pub struct StateSubscription<S> {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<Arc<S>>,
}

impl<S> StateSubscription<S> {
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Next snapshot, or `None` once detached and drained.
    pub async fn recv(&mut self) -> Option<Arc<S>> {
        self.rx.recv().await
    }

    /// Next snapshot if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<S>> {
        self.rx.try_recv().ok()
    }
}

impl<S> Stream for StateSubscription<S> {
    type Item = Arc<S>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<S> fmt::Debug for StateSubscription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
