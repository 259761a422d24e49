//! Controller - the intent/state/effect orchestrator.
//!
//! A controller owns one worker task that drains its mailbox and runs the
//! user-supplied [`IntentHandler`] for one intent at a time, to completion.
//! That single consumer is what serializes intent processing: no two intents
//! of the same controller are ever handled concurrently.
//!
//! ```text
//!   dispatch ──→ Mailbox ──→ worker ──→ handler ──┬──→ StateStore ──→ state subscribers
//!                                                 └──→ EffectBus  ──→ effect subscribers
//!                                      failures ─────→ diagnostics
//! ```
//!
//! Teardown (explicit `shutdown`, scope cancellation or drop):
//!   1. the mailbox closes at once, so `dispatch` fails with `QueueClosed`;
//!   2. the effect bus closes at once, abandoning any blocked delivery;
//!   3. an in-flight handler runs to completion, its committed state stays;
//!   4. the worker stops at its next wait, discards queued intents and detaches
//!      state subscribers.

mod context;
mod diagnostics;

pub use context::{Dispatcher, HandlerContext};
pub use diagnostics::Diagnostic;

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::effects::{EffectBus, EffectSubscription};
use crate::mailbox::{self, Inbox};
use crate::state::{StateStore, StateSubscription};
use crate::types::{ControllerConfig, ControllerId, Error, Result};

// =============================================================================
// Handler trait
// =============================================================================

/// User-supplied intent processing.
///
/// `handle` is awaited to completion before the next intent is consumed. It may
/// update state and emit effects any number of times. Returning an error (or
/// panicking) fails only this intent; the controller moves on to the next one.
#[async_trait]
pub trait IntentHandler: Send + Sync + 'static {
    type Intent: fmt::Debug + Send + 'static;
    type State: Send + Sync + 'static;
    type Effect: Clone + Send + 'static;

    async fn handle(
        &self,
        intent: Self::Intent,
        ctx: &HandlerContext<Self::Intent, Self::State, Self::Effect>,
    ) -> Result<()>;
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time controller counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub intents_accepted: u64,
    pub intents_processed: u64,
    pub handler_failures: u64,
    /// Intents still queued when the controller was torn down.
    pub intents_discarded: u64,
    pub effects_emitted: u64,
    pub effect_timeouts: u64,
    pub state_version: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) intents_accepted: AtomicU64,
    pub(crate) intents_processed: AtomicU64,
    pub(crate) handler_failures: AtomicU64,
    pub(crate) intents_discarded: AtomicU64,
    pub(crate) effects_emitted: AtomicU64,
    pub(crate) effect_timeouts: AtomicU64,
}

/// State shared between the controller handle, its dispatchers and the worker.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: ControllerId,
    pub(crate) counters: Counters,
    diagnostics: broadcast::Sender<Diagnostic>,
}

impl Shared {
    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        // No receivers is fine: diagnostics are also logged at the call site.
        let _ = self.diagnostics.send(diagnostic);
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Serializes intents through one handler and publishes state and effects.
pub struct Controller<H: IntentHandler> {
    shared: Arc<Shared>,
    dispatcher: Dispatcher<H::Intent>,
    state: Arc<StateStore<H::State>>,
    effects: Arc<EffectBus<H::Effect>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<H: IntentHandler> Controller<H> {
    /// Build a controller and start its worker loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F>(handler: H, initial_state: F, config: ControllerConfig) -> Result<Self>
    where
        F: FnOnce() -> H::State,
    {
        Self::with_scope(handler, initial_state, config, CancellationToken::new())
    }

    /// Like [`new`](Self::new), but tears down when `scope` is cancelled.
    ///
    /// `scope` is the surrounding lifecycle signal; cancelling it is
    /// equivalent to calling [`shutdown`](Self::shutdown).
    pub fn with_scope<F>(
        handler: H,
        initial_state: F,
        config: ControllerConfig,
        scope: CancellationToken,
    ) -> Result<Self>
    where
        F: FnOnce() -> H::State,
    {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::internal(format!("controller requires a tokio runtime: {}", e)))?;

        let cancel = scope.child_token();
        let (mailbox, inbox) = mailbox::channel_with_token(cancel.clone());
        let effects = Arc::new(EffectBus::with_token(config.effect_policy(), cancel.clone())?);
        let state = Arc::new(StateStore::new(initial_state()));
        let (diagnostics, _) = broadcast::channel(config.diagnostics_capacity);

        let shared = Arc::new(Shared {
            id: ControllerId::new(),
            counters: Counters::default(),
            diagnostics,
        });
        let dispatcher = Dispatcher::new(mailbox, shared.clone());

        let ctx = HandlerContext::new(
            state.clone(),
            effects.clone(),
            dispatcher.clone(),
            shared.clone(),
        );
        let span = tracing::info_span!("controller", controller = %shared.id);
        let worker = runtime.spawn(
            run_worker(handler, inbox, ctx, Worker {
                shared: shared.clone(),
                state: state.clone(),
                effects: effects.clone(),
            })
            .instrument(span),
        );

        tracing::info!(
            controller = %shared.id,
            effect_capacity = config.effect_capacity,
            effect_timeout_ms = config.effect_timeout.map(|t| t.as_millis() as u64),
            "controller started"
        );

        Ok(Self {
            shared,
            dispatcher,
            state,
            effects,
            cancel,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn id(&self) -> &ControllerId {
        &self.shared.id
    }

    /// Submit an intent. Never blocks; fails with `QueueClosed` after teardown.
    pub fn dispatch(&self, intent: H::Intent) -> Result<()> {
        self.dispatcher.dispatch(intent)
    }

    /// Cloneable producer handle for other tasks and collaborators.
    pub fn dispatcher(&self) -> Dispatcher<H::Intent> {
        self.dispatcher.clone()
    }

    /// Read-only access to the state store.
    pub fn state(&self) -> &StateStore<H::State> {
        &self.state
    }

    pub fn current_state(&self) -> Arc<H::State> {
        self.state.current()
    }

    pub fn subscribe_state(&self) -> StateSubscription<H::State> {
        self.state.subscribe()
    }

    pub fn subscribe_effects(&self) -> EffectSubscription<H::Effect> {
        self.effects.subscribe()
    }

    pub fn unsubscribe_effects(&self, subscription: &EffectSubscription<H::Effect>) {
        self.effects.unsubscribe(subscription);
    }

    /// Receive diagnostics reported after this call.
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.shared.diagnostics.subscribe()
    }

    pub fn stats(&self) -> ControllerStats {
        let c = &self.shared.counters;
        ControllerStats {
            intents_accepted: c.intents_accepted.load(Ordering::Relaxed),
            intents_processed: c.intents_processed.load(Ordering::Relaxed),
            handler_failures: c.handler_failures.load(Ordering::Relaxed),
            intents_discarded: c.intents_discarded.load(Ordering::Relaxed),
            effects_emitted: c.effects_emitted.load(Ordering::Relaxed),
            effect_timeouts: c.effect_timeouts.load(Ordering::Relaxed),
            state_version: self.state.version(),
        }
    }

    /// Request teardown. Returns immediately; see [`join`](Self::join).
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(controller = %self.shared.id, "controller shutdown requested");
        }
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the worker loop to exit. Returns at once if already joined.
    pub async fn join(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(controller = %self.shared.id, "controller worker aborted: {}", e);
            }
        }
    }

    /// `shutdown` followed by `join`.
    pub async fn close(&self) {
        self.shutdown();
        self.join().await;
    }
}

impl<H: IntentHandler> Drop for Controller<H> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<H: IntentHandler> fmt::Debug for Controller<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.shared.id)
            .field("shut_down", &self.is_shut_down())
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Worker loop
// =============================================================================

struct Worker<S, E> {
    shared: Arc<Shared>,
    state: Arc<StateStore<S>>,
    effects: Arc<EffectBus<E>>,
}

async fn run_worker<H: IntentHandler>(
    handler: H,
    mut inbox: Inbox<H::Intent>,
    mut ctx: HandlerContext<H::Intent, H::State, H::Effect>,
    worker: Worker<H::State, H::Effect>,
) {
    let shared = &worker.shared;
    let mut sequence = 0u64;

    // The only suspension point between intents; closing the mailbox ends it.
    while let Some(intent) = inbox.consume().await {
        sequence += 1;
        ctx.set_sequence(sequence);
        let label = format!("{:?}", intent);
        tracing::debug!(controller = %shared.id, sequence, intent = %label, "handling intent");

        let outcome = AssertUnwindSafe(handler.handle(intent, &ctx))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(Error::HandlerFailure(message))) => Some(message),
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("handler panicked: {}", panic_message(panic.as_ref()))),
        };

        match failure {
            None => {
                shared
                    .counters
                    .intents_processed
                    .fetch_add(1, Ordering::Relaxed);
            }
            Some(message) => {
                shared
                    .counters
                    .handler_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    controller = %shared.id,
                    sequence,
                    intent = %label,
                    "handler failure: {}",
                    message
                );
                shared.report(Diagnostic::HandlerFailure {
                    controller: shared.id.clone(),
                    sequence,
                    intent: label,
                    message,
                    at: Utc::now(),
                });
            }
        }
    }

    let discarded = inbox.discard_pending();
    shared
        .counters
        .intents_discarded
        .fetch_add(discarded as u64, Ordering::Relaxed);
    worker.effects.close();
    worker.state.close();

    tracing::info!(
        controller = %shared.id,
        handled = sequence,
        discarded,
        "controller stopped"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Intent {
        Increment,
        Fail,
        Panic,
        Chain(u32),
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Counter {
        count: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Effect {
        Reached(u32),
    }

    struct CounterHandler;

    #[async_trait]
    impl IntentHandler for CounterHandler {
        type Intent = Intent;
        type State = Counter;
        type Effect = Effect;

        async fn handle(
            &self,
            intent: Intent,
            ctx: &HandlerContext<Intent, Counter, Effect>,
        ) -> Result<()> {
            match intent {
                Intent::Increment => {
                    let next = ctx.update(|s| Counter { count: s.count + 1 });
                    ctx.emit(Effect::Reached(next.count)).await;
                    Ok(())
                }
                Intent::Fail => Err(Error::handler("refused")),
                Intent::Panic => panic!("handler exploded"),
                Intent::Chain(0) => Ok(()),
                Intent::Chain(n) => {
                    ctx.update(|s| Counter { count: s.count + 1 });
                    ctx.dispatch(Intent::Chain(n - 1))
                }
            }
        }
    }

    fn controller() -> Controller<CounterHandler> {
        Controller::new(CounterHandler, Counter::default, ControllerConfig::default()).unwrap()
    }

    async fn wait_for_count(ctl: &Controller<CounterHandler>, count: u32) {
        let mut sub = ctl.subscribe_state();
        while let Some(s) = sub.recv().await {
            if s.count == count {
                return;
            }
        }
        panic!("state stream ended before count {}", count);
    }

    #[test]
    fn test_new_outside_runtime_is_an_error() {
        let err = Controller::new(CounterHandler, Counter::default, ControllerConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("tokio runtime"));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ControllerConfig {
            effect_capacity: 0,
            ..ControllerConfig::default()
        };
        assert!(Controller::new(CounterHandler, Counter::default, config).is_err());
    }

    #[tokio::test]
    async fn test_dispatch_updates_state_and_emits() {
        let ctl = controller();
        let mut effects = ctl.subscribe_effects();

        ctl.dispatch(Intent::Increment).unwrap();
        assert_eq!(effects.recv().await, Some(Effect::Reached(1)));
        assert_eq!(ctl.current_state().count, 1);

        let stats = ctl.stats();
        assert_eq!(stats.intents_accepted, 1);
        assert_eq!(stats.intents_processed, 1);
        assert_eq!(stats.effects_emitted, 1);
        assert_eq!(stats.state_version, 1);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_loop() {
        let ctl = controller();
        let mut diagnostics = ctl.subscribe_diagnostics();

        ctl.dispatch(Intent::Fail).unwrap();
        ctl.dispatch(Intent::Chain(2)).unwrap();

        match diagnostics.recv().await.unwrap() {
            Diagnostic::HandlerFailure {
                sequence,
                intent,
                message,
                ..
            } => {
                assert_eq!(sequence, 1);
                assert_eq!(intent, "Fail");
                assert_eq!(message, "refused");
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }

        wait_for_count(&ctl, 2).await;
        assert_eq!(ctl.stats().handler_failures, 1);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let ctl = controller();
        let mut diagnostics = ctl.subscribe_diagnostics();

        ctl.dispatch(Intent::Panic).unwrap();
        ctl.dispatch(Intent::Increment).unwrap();

        let diagnostic = diagnostics.recv().await.unwrap();
        let err = diagnostic.to_error();
        assert!(matches!(err, Error::HandlerFailure(_)));
        assert!(err.to_string().contains("handler exploded"));

        wait_for_count(&ctl, 1).await;
        assert!(!ctl.is_shut_down());
    }

    #[tokio::test]
    async fn test_follow_up_intents_queue_behind() {
        let ctl = controller();
        ctl.dispatch(Intent::Chain(3)).unwrap();

        wait_for_count(&ctl, 3).await;
        // Chain(3) + three follow-ups.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ctl.stats().intents_accepted, 4);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_dispatch_and_detaches() {
        let ctl = controller();
        let mut state = ctl.subscribe_state();
        let mut effects = ctl.subscribe_effects();

        ctl.close().await;

        let err = ctl.dispatch(Intent::Increment).unwrap_err();
        assert!(matches!(err, Error::QueueClosed(_)));
        assert_eq!(state.recv().await.map(|s| s.count), Some(0));
        assert!(state.recv().await.is_none());
        assert!(effects.recv().await.is_none());

        // Second close and late unsubscribe are harmless.
        ctl.close().await;
        ctl.unsubscribe_effects(&effects);
    }

    #[tokio::test]
    async fn test_scope_cancellation_tears_down() {
        let scope = CancellationToken::new();
        let ctl = Controller::with_scope(
            CounterHandler,
            Counter::default,
            ControllerConfig::default(),
            scope.clone(),
        )
        .unwrap();

        scope.cancel();
        ctl.join().await;

        assert!(ctl.is_shut_down());
        assert!(ctl.dispatcher().is_closed());
        assert!(ctl.dispatch(Intent::Increment).is_err());
    }

    #[tokio::test]
    async fn test_controllers_are_independent() {
        let a = controller();
        let b = controller();

        a.dispatch(Intent::Increment).unwrap();
        wait_for_count(&a, 1).await;
        b.close().await;

        assert_eq!(a.current_state().count, 1);
        assert_eq!(b.current_state().count, 0);
        assert!(a.dispatch(Intent::Increment).is_ok());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
