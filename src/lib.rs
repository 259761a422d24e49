//! # mvi-core - Intent/State/Effect Controllers
//!
//! Unidirectional data flow for UI-like state machines:
//! - Intents are queued and handled strictly one at a time, in submission order
//! - State is an immutable snapshot, replaced wholesale and observed in order
//! - Effects are one-shot events delivered to the subscribers present at emission
//! - Handler failures are isolated and reported as diagnostics
//! - HTTP completions come back as ordinary intents
//!
//! ## Architecture
//!
//! Each `Controller` owns one worker task that drains its mailbox:
//! ```text
//!                        ┌──────────────────────────────────┐
//!   dispatch(intent) →   │          Controller              │
//!                        │  ┌─────────┐     ┌───────────┐   │
//!                        │  │ Mailbox │ ──→ │  Worker   │   │
//!                        │  └─────────┘     │ (handler) │   │
//!                        │                  └─────┬─────┘   │
//!                        │       ┌────────────────┴──┐      │
//!                        │  ┌────▼─────┐      ┌──────▼───┐  │
//!                        │  │StateStore│      │EffectBus │  │
//!                        │  └────┬─────┘      └──────┬───┘  │
//!                        └───────┼───────────────────┼──────┘
//!                                ▼                   ▼
//!                          state observers     effect observers
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod controller;
pub mod effects;
pub mod list;
pub mod mailbox;
pub mod net;
pub mod state;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use controller::{
    Controller, ControllerStats, Diagnostic, Dispatcher, HandlerContext, IntentHandler,
};
pub use effects::{EffectBus, EffectPolicy, EffectSubscription, EmitReport};
pub use list::{ContentCache, DiffCallback, DiffList, ListChange};
pub use net::{RequestOutcome, ServiceClient};
pub use state::{StateStore, StateSubscription};
pub use types::{Config, ControllerConfig, Error, HttpConfig, Result};
