//! Handler-facing context and the producer handle.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;

use super::diagnostics::Diagnostic;
use super::Shared;
use crate::effects::{EffectBus, EmitReport};
use crate::mailbox::Mailbox;
use crate::state::StateStore;
use crate::types::Result;

// =============================================================================
// Dispatcher
// =============================================================================

/// Cloneable producer handle onto a controller's mailbox.
///
/// Hand it to asynchronous collaborators so their completions come back as
/// intents instead of nested callbacks.
pub struct Dispatcher<I> {
    mailbox: Mailbox<I>,
    shared: Arc<Shared>,
}

impl<I> Dispatcher<I> {
    pub(crate) fn new(mailbox: Mailbox<I>, shared: Arc<Shared>) -> Self {
        Self { mailbox, shared }
    }

    /// Fire-and-forget submit. Fails only with `QueueClosed` after teardown.
    pub fn dispatch(&self, intent: I) -> Result<()> {
        match self.mailbox.submit(intent) {
            Ok(()) => {
                self.shared
                    .counters
                    .intents_accepted
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(controller = %self.shared.id, "dispatch rejected: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

impl<I> Clone for Dispatcher<I> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<I> fmt::Debug for Dispatcher<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("controller", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// HandlerContext
// =============================================================================

/// What a handler may touch while processing one intent.
pub struct HandlerContext<I, S, E> {
    sequence: u64,
    state: Arc<StateStore<S>>,
    effects: Arc<EffectBus<E>>,
    dispatcher: Dispatcher<I>,
    shared: Arc<Shared>,
}

impl<I, S, E> HandlerContext<I, S, E> {
    pub(crate) fn new(
        state: Arc<StateStore<S>>,
        effects: Arc<EffectBus<E>>,
        dispatcher: Dispatcher<I>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            sequence: 0,
            state,
            effects,
            dispatcher,
            shared,
        }
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Arrival index of the intent being handled (1-based).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Current state snapshot.
    pub fn state(&self) -> Arc<S> {
        self.state.current()
    }

    /// Replace the state with `transform(current)`. Each call publishes a
    /// distinct snapshot.
    pub fn update<F>(&self, transform: F) -> Arc<S>
    where
        F: FnOnce(&S) -> S,
    {
        self.state.update(transform)
    }

    /// Queue a follow-up intent behind everything already in the mailbox.
    pub fn dispatch(&self, intent: I) -> Result<()> {
        self.dispatcher.dispatch(intent)
    }

    pub fn dispatcher(&self) -> Dispatcher<I> {
        self.dispatcher.clone()
    }
}

impl<I, S, E: Clone> HandlerContext<I, S, E> {
    /// Emit a one-shot effect to the subscribers attached right now.
    ///
    /// Suspends while a subscriber's queue is full, bounded by the effect
    /// timeout. Abandoned deliveries are reported as diagnostics.
    pub async fn emit(&self, effect: E) -> EmitReport {
        let report = self.effects.emit(effect).await;

        let counters = &self.shared.counters;
        counters.effects_emitted.fetch_add(1, Ordering::Relaxed);

        if !report.timed_out.is_empty() {
            counters
                .effect_timeouts
                .fetch_add(report.timed_out.len() as u64, Ordering::Relaxed);

            let timeout_ms = self
                .effects
                .policy()
                .timeout
                .map(|t| t.as_millis() as u64)
                .unwrap_or(0);
            for subscriber in &report.timed_out {
                self.shared.report(Diagnostic::EffectDeliveryTimeout {
                    controller: self.shared.id.clone(),
                    subscriber: subscriber.clone(),
                    sequence: self.sequence,
                    timeout_ms,
                    at: Utc::now(),
                });
            }
        }

        report
    }
}

impl<I, S, E> fmt::Debug for HandlerContext<I, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("controller", &self.shared.id)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
