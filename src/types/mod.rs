//! Core types for the controller runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ControllerId, SubscriberId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for controllers, HTTP and logging

mod config;
mod errors;
mod ids;

pub use config::{Config, ControllerConfig, HttpConfig, ObservabilityConfig};
pub use errors::{Error, Result};
pub use ids::{ControllerId, SubscriberId};
