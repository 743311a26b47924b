use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::settings::{RetryConfig, SettingsConfig};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    pub relay: RelayConfig,
    pub issuer: IssuerConfig,
    /// Origin that origin-form proxy requests are forwarded to.
    pub upstream: String,
}

/// ================================
/// Interception
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// invariant: non-empty, each entry is a bare `scheme://host[:port]` origin
    pub trusted_origins: Vec<String>,
    /// invariant: non-empty, each entry starts and ends with '/'
    pub path_prefixes: Vec<String>,
    /// invariant: >= 0
    pub min_validity_seconds: Option<i64>,
    /// invariant: finite, >= 0, representable as a Duration. Zero disables batching.
    pub batch_window_ms: Option<f64>,
    #[serde(default)]
    pub cross_origin: bool,
    /// diagnostic logging
    #[serde(default)]
    pub debug: bool,
}

impl RelayConfig {
    pub fn min_validity_seconds(&self) -> i64 {
        self.min_validity_seconds.unwrap_or(0)
    }

    /// Zero when unset or unrepresentable; the validator rejects the latter.
    pub fn batch_window(&self) -> Duration {
        self.batch_window_ms
            .and_then(window_from_ms)
            .unwrap_or(Duration::ZERO)
    }
}

/// `None` for negative, non-finite, or out-of-range windows.
pub fn window_from_ms(ms: f64) -> Option<Duration> {
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

/// ================================
/// Issuer
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct IssuerConfig {
    pub url: String,
    pub headers: Option<HashMap<String, GenericValue>>,
    pub retry: Option<RetryConfig>,
    pub timeout_ms: Option<u64>,
}

/// Header value sources
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum GenericValue {
    Literal { value: String },
    FromEnv { from_env: String },
    FromFile { path: String },
}
