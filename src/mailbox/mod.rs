//! Intent mailbox: ordered many-producer / single-consumer hand-off buffer.
//!
//! The mailbox is split in two halves:
//!   - [`Mailbox`]: cloneable producer handle. `submit` never blocks.
//!   - [`Inbox`]: the single consumer, owned by a controller's worker loop.
//!
//! Closing the mailbox is immediate for both halves: producers get
//! [`Error::QueueClosed`] and the consumer sees `None` on its next `consume`,
//! even if intents are still buffered. Buffered intents are never handed out
//! after close.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{Error, Result};

/// Create a new, empty mailbox.
pub fn channel<I>() -> (Mailbox<I>, Inbox<I>) {
    channel_with_token(CancellationToken::new())
}

/// Create a mailbox whose closed state is driven by `closed`.
///
/// Cancelling the token closes the mailbox.
pub fn channel_with_token<I>(closed: CancellationToken) -> (Mailbox<I>, Inbox<I>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Mailbox {
            tx,
            closed: closed.clone(),
        },
        Inbox { rx, closed },
    )
}

// =============================================================================
// Producer half
// =============================================================================

/// Producer handle onto a mailbox. Clone freely; every clone feeds the same
/// consumer.
pub struct Mailbox<I> {
    tx: mpsc::UnboundedSender<I>,
    closed: CancellationToken,
}

impl<I> Mailbox<I> {
    /// Enqueue an intent. Returns immediately.
    pub fn submit(&self, intent: I) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::queue_closed("mailbox is closed"));
        }
        self.tx
            .send(intent)
            .map_err(|_| Error::queue_closed("mailbox consumer has been dropped"))
    }

    /// Close the mailbox. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

impl<I> Clone for Mailbox<I> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<I> fmt::Debug for Mailbox<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Consumer half
// =============================================================================

/// Single consumer of a mailbox.
pub struct Inbox<I> {
    rx: mpsc::UnboundedReceiver<I>,
    closed: CancellationToken,
}

impl<I> Inbox<I> {
    /// Wait for the next intent in arrival order.
    ///
    /// Returns `None` once the mailbox is closed or every producer is gone.
    pub async fn consume(&mut self) -> Option<I> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Number of intents currently buffered.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Close the mailbox from the consumer side.
    pub fn close(&mut self) {
        self.closed.cancel();
        self.rx.close();
    }

    /// Close and drop everything still buffered. Returns the number discarded.
    pub fn discard_pending(&mut self) -> usize {
        self.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

impl<I> fmt::Debug for Inbox<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox")
            .field("pending", &self.pending())
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
