//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the controller runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Intent submitted after the mailbox was closed (teardown). The intent is discarded.
    #[error("queue closed: {0}")]
    QueueClosed(String),

    /// An intent handler returned an error or panicked. Isolated to that intent.
    #[error("handler failure: {0}")]
    HandlerFailure(String),

    /// A subscriber did not accept an effect within the configured window.
    #[error("effect delivery timeout: {0}")]
    EffectDeliveryTimeout(String),

    /// Invalid configuration or arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client errors.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable, machine-readable code for diagnostics and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::QueueClosed(_) => "QUEUE_CLOSED",
            Error::HandlerFailure(_) => "HANDLER_FAILURE",
            Error::EffectDeliveryTimeout(_) => "EFFECT_DELIVERY_TIMEOUT",
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::Internal(_) => "INTERNAL",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Http(_) => "HTTP",
            Error::Io(_) => "IO",
        }
    }
}

// Convenience constructors
impl Error {
    pub fn queue_closed(msg: impl Into<String>) -> Self {
        Self::QueueClosed(msg.into())
    }

    /// Constructor for handlers that want to fail an intent with a message.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::HandlerFailure(msg.into())
    }

    pub fn effect_timeout(msg: impl Into<String>) -> Self {
        Self::EffectDeliveryTimeout(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::queue_closed("x").code(), "QUEUE_CLOSED");
        assert_eq!(Error::handler("x").code(), "HANDLER_FAILURE");
        assert_eq!(Error::effect_timeout("x").code(), "EFFECT_DELIVERY_TIMEOUT");
        assert_eq!(Error::validation("x").code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::handler("bad intent");
        assert_eq!(err.to_string(), "handler failure: bad intent");
    }
}
