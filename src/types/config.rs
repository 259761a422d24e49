//! Configuration structures.
//!
//! Configuration is owned by the composition root and injected at construction;
//! no component reads ambient global state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::effects::EffectPolicy;
use crate::types;
use crate::validation::{
    validate_http_url, validate_non_empty, validate_non_zero_duration, validate_positive,
};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct Config {
    /// Controller configuration.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// HTTP service wrapper configuration.
    #[serde(default)]
    pub http: HttpConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse a JSON document. Missing sections fall back to defaults.
    pub fn from_json(json: &str) -> types::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> types::Result<()> {
        self.controller.validate()?;
        self.http.validate()?;
        self.observability.validate()
    }

    /// JSON Schema describing the configuration document.
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(Config);
        serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
    }
}

/// Controller configuration: effect backpressure and diagnostics buffering.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ControllerConfig {
    /// Per-subscriber effect queue capacity.
    pub effect_capacity: usize,

    /// How long `emit` waits on a saturated subscriber before abandoning that
    /// delivery. `None` waits indefinitely.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub effect_timeout: Option<Duration>,

    /// Diagnostics broadcast buffer. Slow diagnostics readers lag rather than
    /// block the worker loop.
    pub diagnostics_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            effect_capacity: 1,
            effect_timeout: None,
            diagnostics_capacity: 64,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> types::Result<()> {
        validate_positive(self.effect_capacity, "controller.effect_capacity")?;
        validate_positive(self.diagnostics_capacity, "controller.diagnostics_capacity")?;
        if let Some(timeout) = self.effect_timeout {
            validate_non_zero_duration(timeout, "controller.effect_timeout")?;
        }
        Ok(())
    }

    /// Effect bus policy derived from this configuration.
    pub fn effect_policy(&self) -> EffectPolicy {
        EffectPolicy {
            capacity: self.effect_capacity,
            timeout: self.effect_timeout,
        }
    }
}

/// HTTP service wrapper configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL every relative request path is joined onto.
    pub base_url: String,

    /// TCP connect timeout.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub connect_timeout: Duration,

    /// Per-read timeout on the response body.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub read_timeout: Duration,

    /// Log every request outcome at debug/warn level.
    pub log_requests: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            connect_timeout: Duration::from_secs(7),
            read_timeout: Duration::from_secs(15),
            log_requests: false,
        }
    }
}

impl HttpConfig {
    pub fn validate(&self) -> types::Result<()> {
        validate_http_url(&self.base_url, "http.base_url")?;
        validate_non_zero_duration(self.connect_timeout, "http.connect_timeout")?;
        validate_non_zero_duration(self.read_timeout, "http.read_timeout")
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing filter directive (trace, debug, info, warn, error, or full
    /// `EnvFilter` syntax). `RUST_LOG` takes precedence when set.
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> types::Result<()> {
        validate_non_empty(&self.log_level, "observability.log_level")
    }
}
