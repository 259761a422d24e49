//! Failure reports published by a controller instead of being raised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ControllerId, Error, SubscriberId};

/// A contained failure inside a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The handler returned an error or panicked while processing an intent.
    HandlerFailure {
        controller: ControllerId,
        /// Arrival index of the intent (1-based).
        sequence: u64,
        /// Debug rendering of the failed intent.
        intent: String,
        message: String,
        at: DateTime<Utc>,
    },

    /// A subscriber did not accept an effect within the configured window.
    EffectDeliveryTimeout {
        controller: ControllerId,
        subscriber: SubscriberId,
        /// Sequence of the intent whose handler emitted the effect.
        sequence: u64,
        timeout_ms: u64,
        at: DateTime<Utc>,
    },
}

impl Diagnostic {
    pub fn controller(&self) -> &ControllerId {
        match self {
            Diagnostic::HandlerFailure { controller, .. } => controller,
            Diagnostic::EffectDeliveryTimeout { controller, .. } => controller,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            Diagnostic::HandlerFailure { sequence, .. } => *sequence,
            Diagnostic::EffectDeliveryTimeout { sequence, .. } => *sequence,
        }
    }

    /// The error this diagnostic stands for.
    pub fn to_error(&self) -> Error {
        match self {
            Diagnostic::HandlerFailure {
                sequence,
                intent,
                message,
                ..
            } => Error::handler(format!("intent #{} {}: {}", sequence, intent, message)),
            Diagnostic::EffectDeliveryTimeout {
                subscriber,
                timeout_ms,
                ..
            } => Error::effect_timeout(format!(
                "subscriber {} did not accept effect within {}ms",
                subscriber, timeout_ms
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_error_maps_variants() {
        let failure = Diagnostic::HandlerFailure {
            controller: ControllerId::new(),
            sequence: 3,
            intent: "Bad".to_string(),
            message: "boom".to_string(),
            at: Utc::now(),
        };
        let err = failure.to_error();
        assert!(matches!(err, Error::HandlerFailure(_)));
        assert_eq!(err.to_string(), "handler failure: intent #3 Bad: boom");

        let timeout = Diagnostic::EffectDeliveryTimeout {
            controller: ControllerId::new(),
            subscriber: SubscriberId::from_string("sub-1".to_string()).unwrap(),
            sequence: 1,
            timeout_ms: 250,
            at: Utc::now(),
        };
        assert!(matches!(timeout.to_error(), Error::EffectDeliveryTimeout(_)));
        assert!(timeout.to_error().to_string().contains("sub-1"));
        assert_eq!(timeout.sequence(), 1);
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let diagnostic = Diagnostic::HandlerFailure {
            controller: ControllerId::from_string("ctl".to_string()).unwrap(),
            sequence: 1,
            intent: "Load".to_string(),
            message: "offline".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["kind"], "handler_failure");
        assert_eq!(json["controller"], "ctl");
    }
}
