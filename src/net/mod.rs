//! HTTP service wrapper.
//!
//! Requests complete into a [`RequestOutcome`], which a handler turns into a
//! synthetic intent and feeds back through a controller's mailbox:
//!
//! ```text
//!   handler ──→ ServiceClient::enqueue ──→ HTTP ──→ RequestOutcome ──→ Dispatcher ──→ mailbox
//! ```

mod client;
mod outcome;

pub use client::ServiceClient;
pub use outcome::RequestOutcome;
