//! Effect bus: multicast, non-replaying delivery of one-shot effects.
//!
//! Every subscriber owns a bounded queue (`EffectPolicy::capacity`). `emit`
//! snapshots the subscriber set, then delivers to each member concurrently:
//!   - a subscriber with a free slot receives the effect immediately;
//!   - a saturated subscriber suspends only its own delivery, up to
//!     `EffectPolicy::timeout`, after which that delivery is abandoned and
//!     reported in [`EmitReport::timed_out`];
//!   - a subscriber whose receiver is gone is pruned and counted as detached.
//!
//! With zero subscribers the effect is dropped. Nothing is ever buffered for
//! subscribers that attach later.

use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::join_all;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::types::{Result, SubscriberId};
use crate::validation::validate_positive;

// =============================================================================
// Policy & Reports
// =============================================================================

/// Per-subscriber backpressure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectPolicy {
    /// Queue slots per subscriber. Must be at least 1.
    pub capacity: usize,
    /// Give up on a saturated subscriber after this long. `None` waits until
    /// the slot frees or the bus closes.
    pub timeout: Option<Duration>,
}

impl Default for EffectPolicy {
    fn default() -> Self {
        Self {
            capacity: 1,
            timeout: None,
        }
    }
}

/// Outcome of a single `emit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitReport {
    /// Subscribers attached at the instant of emission.
    pub attached: usize,
    /// Subscribers that accepted the effect.
    pub delivered: usize,
    /// Subscribers whose delivery was abandoned after the policy timeout.
    pub timed_out: Vec<SubscriberId>,
    /// Subscribers that went away (or were detached by close) mid-delivery.
    pub detached: usize,
}

impl EmitReport {
    /// True when every attached subscriber accepted the effect.
    pub fn is_complete(&self) -> bool {
        self.delivered == self.attached
    }
}

enum Delivery {
    Delivered,
    TimedOut,
    Detached,
}

// =============================================================================
// EffectBus
// =============================================================================

/// Fan-out bus for one-shot effects.
pub struct EffectBus<E> {
    policy: EffectPolicy,
    closed: CancellationToken,
    subscribers: Mutex<Vec<EffectSubscriber<E>>>,
}

struct EffectSubscriber<E> {
    id: SubscriberId,
    tx: mpsc::Sender<E>,
}

impl<E> EffectBus<E> {
    /// Create a bus with the given policy.
    pub fn new(policy: EffectPolicy) -> Result<Self> {
        Self::with_token(policy, CancellationToken::new())
    }

    /// Create a bus that closes when `closed` is cancelled.
    pub fn with_token(policy: EffectPolicy, closed: CancellationToken) -> Result<Self> {
        validate_positive(policy.capacity, "effect capacity")?;
        Ok(Self {
            policy,
            closed,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn policy(&self) -> EffectPolicy {
        self.policy
    }

    /// Attach a subscriber. It only sees effects emitted after this call.
    ///
    /// After the bus is closed the returned subscription is already ended.
    pub fn subscribe(&self) -> EffectSubscription<E> {
        let (tx, rx) = mpsc::channel(self.policy.capacity);
        let id = SubscriberId::new();

        let mut subscribers = self.lock();
        // close() cancels while holding this lock.
        if !self.closed.is_cancelled() {
            subscribers.push(EffectSubscriber { id: id.clone(), tx });
            tracing::debug!(subscriber = %id, "effect subscriber attached");
        }
        drop(subscribers);

        EffectSubscription { id, rx }
    }

    /// Detach a subscriber. No-op if it is already gone or the bus is closed.
    pub fn unsubscribe(&self, subscription: &EffectSubscription<E>) {
        self.lock().retain(|s| s.id != subscription.id);
    }

    /// Number of attached subscribers whose receiving side is still alive.
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|s| !s.tx.is_closed()).count()
    }

    /// Detach every subscriber and abandon deliveries blocked on a full slot.
    pub fn close(&self) {
        let detached = {
            let mut subscribers = self.lock();
            self.closed.cancel();
            let n = subscribers.len();
            subscribers.clear();
            n
        };
        tracing::debug!(detached, "effect bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EffectSubscriber<E>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Clone> EffectBus<E> {
    /// Deliver `effect` to every subscriber attached right now.
    pub async fn emit(&self, effect: E) -> EmitReport {
        let targets: Vec<(SubscriberId, mpsc::Sender<E>)> = self
            .lock()
            .iter()
            .map(|s| (s.id.clone(), s.tx.clone()))
            .collect();

        let mut report = EmitReport {
            attached: targets.len(),
            ..EmitReport::default()
        };

        if targets.is_empty() {
            tracing::trace!("effect discarded: no subscribers");
            return report;
        }

        let timeout = self.policy.timeout;
        let closed = &self.closed;
        let deliveries: Vec<_> = targets
            .into_iter()
            .map(|(id, tx)| {
                let effect = effect.clone();
                async move {
                    let outcome = deliver(&tx, effect, timeout, closed).await;
                    (id, outcome)
                }
            })
            .collect();

        let mut gone = Vec::new();
        for (id, outcome) in join_all(deliveries).await {
            match outcome {
                Delivery::Delivered => report.delivered += 1,
                Delivery::TimedOut => {
                    tracing::warn!(
                        subscriber = %id,
                        timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
                        "effect delivery abandoned: subscriber slot stayed full"
                    );
                    report.timed_out.push(id);
                }
                Delivery::Detached => {
                    report.detached += 1;
                    gone.push(id);
                }
            }
        }

        if !gone.is_empty() {
            self.lock().retain(|s| !gone.contains(&s.id));
        }

        tracing::debug!(
            attached = report.attached,
            delivered = report.delivered,
            timed_out = report.timed_out.len(),
            "effect emitted"
        );

        report
    }
}

async fn deliver<E>(
    tx: &mpsc::Sender<E>,
    effect: E,
    timeout: Option<Duration>,
    closed: &CancellationToken,
) -> Delivery {
    // A free slot always takes the effect, even while teardown is underway.
    let effect = match tx.try_send(effect) {
        Ok(()) => return Delivery::Delivered,
        Err(TrySendError::Closed(_)) => return Delivery::Detached,
        Err(TrySendError::Full(effect)) => effect,
    };

    let send = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, tx.send(effect)).await {
                Ok(Ok(())) => Delivery::Delivered,
                Ok(Err(_)) => Delivery::Detached,
                Err(_elapsed) => Delivery::TimedOut,
            },
            None => match tx.send(effect).await {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Detached,
            },
        }
    };

    tokio::select! {
        biased;
        _ = closed.cancelled() => Delivery::Detached,
        outcome = send => outcome,
    }
}

impl<E> fmt::Debug for EffectBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectBus")
            .field("policy", &self.policy)
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Live feed of effects emitted after the subscription was created.
pub struct EffectSubscription<E> {
    id: SubscriberId,
    rx: mpsc::Receiver<E>,
}

impl<E> EffectSubscription<E> {
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Next effect, or `None` once detached and drained.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Next effect if one is already queued.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E> Stream for EffectSubscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<E> fmt::Debug for EffectSubscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    enum Effect {
        Toast(&'static str),
        Navigate(&'static str),
    }

    fn new_bus(capacity: usize, timeout: Option<Duration>) -> EffectBus<Effect> {
        EffectBus::new(EffectPolicy { capacity, timeout }).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = EffectBus::<Effect>::new(EffectPolicy {
            capacity: 0,
            timeout: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("must be positive"));
    }

    #[tokio::test]
    async fn test_emit_to_zero_subscribers_is_discarded() {
        let bus = new_bus(1, None);

        let report = bus.emit(Effect::Toast("lost")).await;
        assert_eq!(report, EmitReport::default());

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscriber() {
        let bus = new_bus(4, None);
        let mut early = bus.subscribe();

        bus.emit(Effect::Toast("first")).await;
        let mut late = bus.subscribe();
        bus.emit(Effect::Toast("second")).await;

        assert_eq!(early.recv().await, Some(Effect::Toast("first")));
        assert_eq!(early.recv().await, Some(Effect::Toast("second")));
        assert_eq!(late.recv().await, Some(Effect::Toast("second")));
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_fan_out_preserves_per_subscriber_order() {
        let bus = new_bus(8, None);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let report = bus.emit(Effect::Navigate("home")).await;
        assert_eq!(report.attached, 2);
        assert_eq!(report.delivered, 2);
        assert!(report.is_complete());
        bus.emit(Effect::Toast("hi")).await;

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await, Some(Effect::Navigate("home")));
            assert_eq!(sub.recv().await, Some(Effect::Toast("hi")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_subscriber_times_out() {
        let bus = new_bus(1, Some(Duration::from_millis(500)));
        let stuck = bus.subscribe();

        let first = bus.emit(Effect::Toast("one")).await;
        assert_eq!(first.delivered, 1);

        let started = Instant::now();
        let second = bus.emit(Effect::Toast("two")).await;
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(second.delivered, 0);
        assert_eq!(second.timed_out, vec![stuck.id().clone()]);
        assert!(!second.is_complete());

        // The subscriber is still attached; it just missed "two".
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_subscriber_does_not_delay_others() {
        let bus = Arc::new(new_bus(1, Some(Duration::from_secs(5))));
        let _stuck = bus.subscribe();
        let mut reader = bus.subscribe();

        bus.emit(Effect::Toast("one")).await;
        assert_eq!(reader.recv().await, Some(Effect::Toast("one")));

        let started = Instant::now();
        let emitter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.emit(Effect::Toast("two")).await })
        };

        assert_eq!(reader.recv().await, Some(Effect::Toast("two")));
        assert!(started.elapsed() < Duration::from_secs(5));

        let report = emitter.await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.timed_out.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = new_bus(1, None);
        let gone = bus.subscribe();
        let mut kept = bus.subscribe();
        drop(gone);

        let report = bus.emit(Effect::Toast("x")).await;
        assert_eq!(report.attached, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.detached, 1);
        assert_eq!(bus.lock().len(), 1);
        assert_eq!(kept.recv().await, Some(Effect::Toast("x")));
    }

    #[tokio::test]
    async fn test_close_abandons_blocked_emit() {
        let bus = Arc::new(new_bus(1, None));
        let mut sub = bus.subscribe();
        bus.emit(Effect::Toast("fills slot")).await;

        let emitter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.emit(Effect::Toast("blocked")).await })
        };
        tokio::task::yield_now().await;

        bus.close();
        let report = emitter.await.unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.detached, 1);

        assert_eq!(sub.recv().await, Some(Effect::Toast("fills slot")));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_free_slot_accepts_effect_after_token_cancelled() {
        let token = CancellationToken::new();
        let bus = EffectBus::with_token(EffectPolicy::default(), token.clone()).unwrap();
        let mut sub = bus.subscribe();

        // Teardown signalled, subscribers not yet detached.
        token.cancel();
        let report = bus.emit(Effect::Navigate("home")).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.detached, 0);
        assert_eq!(sub.try_recv(), Some(Effect::Navigate("home")));

        // A full slot is still abandoned rather than waited on.
        bus.emit(Effect::Toast("fills slot")).await;
        let report = bus.emit(Effect::Toast("blocked")).await;
        assert_eq!(report.detached, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribe_racing_close_always_ends() {
        for _ in 0..200 {
            let bus = Arc::new(new_bus(1, None));
            let closer = {
                let bus = bus.clone();
                tokio::spawn(async move { bus.close() })
            };
            let mut sub = bus.subscribe();
            closer.await.unwrap();

            assert_eq!(sub.recv().await, None);
            assert_eq!(bus.subscriber_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe_after_close_are_noops() {
        let bus = new_bus(1, None);
        bus.close();

        let mut sub = bus.subscribe();
        assert_eq!(sub.recv().await, None);
        bus.unsubscribe(&sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.emit(Effect::Toast("void")).await.attached, 0);
    }
}
