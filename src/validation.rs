//! Configuration validation utilities.

use std::time::Duration;

use crate::types::{Error, Result};

/// Validate that a string is not empty (after trimming whitespace).
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate that a count is positive.
pub fn validate_positive(n: usize, field: &str) -> Result<()> {
    if n == 0 {
        return Err(Error::validation(format!("{} must be positive", field)));
    }
    Ok(())
}

/// Validate that a duration is non-zero.
pub fn validate_non_zero_duration(d: Duration, field: &str) -> Result<()> {
    if d.is_zero() {
        return Err(Error::validation(format!("{} must be greater than zero", field)));
    }
    Ok(())
}

/// Validate that a URL uses an http(s) scheme.
pub fn validate_http_url(url: &str, field: &str) -> Result<()> {
    validate_non_empty(url, field)?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::validation(format!(
            "{} must start with http:// or https://, got {}",
            field, url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1, "effect_capacity").is_ok());
        let err = validate_positive(0, "effect_capacity").unwrap_err();
        assert!(err.to_string().contains("effect_capacity must be positive"));
    }

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("http://127.0.0.1:8080", "base_url").is_ok());
        assert!(validate_http_url("  ", "base_url").is_err());
        assert!(validate_http_url("ftp://host", "base_url").is_err());
    }

    #[test]
    fn test_validate_non_zero_duration() {
        assert!(validate_non_zero_duration(Duration::from_millis(1), "t").is_ok());
        assert!(validate_non_zero_duration(Duration::ZERO, "t").is_err());
    }
}
