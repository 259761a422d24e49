//! Result of an HTTP request, as delivered back to a controller.

use serde::{Deserialize, Serialize};

/// Either the decoded response body or a failure with an optional status code.
///
/// `code` is `None` when no response was received at all (connect failure,
/// timeout, DNS). It may be a 2xx code when the body was empty or did not
/// decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOutcome<T> {
    Success(T),
    Failure { code: Option<u16>, message: String },
}

impl<T> RequestOutcome<T> {
    pub fn failure(code: Option<u16>, message: impl Into<String>) -> Self {
        Self::Failure {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Status code of a failure, if the server answered.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Success(_) => None,
            Self::Failure { code, .. } => *code,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> RequestOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(data) => RequestOutcome::Success(f(data)),
            Self::Failure { code, message } => RequestOutcome::Failure { code, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_failure() {
        let failed: RequestOutcome<u32> = RequestOutcome::failure(Some(404), "Not Found");
        let mapped = failed.map(|n| n * 2);
        assert_eq!(mapped.code(), Some(404));
        assert!(!mapped.is_success());
        assert_eq!(mapped.ok(), None);
    }

    #[test]
    fn test_map_transforms_success() {
        let outcome = RequestOutcome::Success(21).map(|n| n * 2);
        assert!(outcome.is_success());
        assert_eq!(outcome.code(), None);
        assert_eq!(outcome.ok(), Some(42));
    }
}
