//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates relay invariants: origins, prefixes, validity margin, batch window
//! - Validates issuer, upstream, server, logging and retry settings

use reqwest::Url;
use tracing::{error, info};

use crate::config::relay::{window_from_ms, GenericValue, IssuerConfig, RelayConfig, ServiceConfig};
use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::error::ConfigError;
use crate::matcher::path_matcher::is_valid_prefix;
use crate::observability::metrics::get_metrics;

/// Public entrypoint: returns Ok(()) or every issue found as one `ConfigError::Invalid`.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_relay(&cfg.relay, &mut errors);
    validate_issuer(&cfg.issuer, &mut errors);
    validate_http_url("upstream", &cfg.upstream, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(ConfigError::Invalid(errors))
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.server.host.is_empty() {
        errors.push("settings.server.host must not be empty".to_string());
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be an integer in range 0-65535",
            settings.server.port
        ));
    }

    // metrics endpoint start with '/'
    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

/// Relay invariants alone, for callers building a pipeline without a full service config.
pub fn check_relay_config(relay: &RelayConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    validate_relay(relay, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

/// RELAY INVARIANTS
fn validate_relay(relay: &RelayConfig, errors: &mut Vec<String>) {
    if relay.trusted_origins.is_empty() {
        errors.push("relay.trusted_origins is empty; at least one origin required".to_string());
    }
    for origin in &relay.trusted_origins {
        match Url::parse(origin) {
            Ok(url) if url.origin().ascii_serialization() == *origin => {}
            Ok(url) => errors.push(format!(
                "relay.trusted_origins entry '{}' must be a bare origin like '{}'",
                origin,
                url.origin().ascii_serialization()
            )),
            Err(e) => errors.push(format!(
                "relay.trusted_origins entry '{}' is not a valid origin: {}",
                origin, e
            )),
        }
    }

    if relay.path_prefixes.is_empty() {
        errors.push("relay.path_prefixes is empty; at least one prefix required".to_string());
    }
    for prefix in &relay.path_prefixes {
        if !is_valid_prefix(prefix) {
            errors.push(format!(
                "relay.path_prefixes entry '{}' must start and end with '/'",
                prefix
            ));
        }
    }

    if let Some(margin) = relay.min_validity_seconds {
        if margin < 0 {
            errors.push(format!(
                "relay.min_validity_seconds ({}) must be non-negative",
                margin
            ));
        }
    }

    if let Some(window) = relay.batch_window_ms {
        if window_from_ms(window).is_none() {
            errors.push(format!(
                "relay.batch_window_ms ({}) must be finite, non-negative and in range",
                window
            ));
        }
    }
}

/// ISSUER
fn validate_issuer(issuer: &IssuerConfig, errors: &mut Vec<String>) {
    validate_http_url("issuer.url", &issuer.url, errors);

    if let Some(retry) = &issuer.retry {
        validate_retry("issuer.retry", retry, errors);
    }
    if let Some(headers) = &issuer.headers {
        for (name, value) in headers {
            let path = format!("issuer.headers['{}']", name);
            if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(format!("{} is not a valid header name", path));
            }
            validate_generic_value(&path, value, errors);
        }
    }
    if issuer.timeout_ms == Some(0) {
        errors.push("issuer.timeout_ms must be > 0".to_string());
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if let Some(attempts) = retry.attempts {
        if attempts == 0 {
            errors.push(format!("{}.attempts must be > 0", path));
        }
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                path, max, base
            ));
        }
    }
}

fn validate_generic_value(path: &str, v: &GenericValue, errors: &mut Vec<String>) {
    match v {
        GenericValue::Literal { value } if value.is_empty() => {
            errors.push(format!("{}.value must not be empty", path));
        }
        GenericValue::FromEnv { from_env } if from_env.is_empty() => {
            errors.push(format!("{}.from_env must not be empty", path));
        }
        GenericValue::FromFile { path: file } if file.is_empty() => {
            errors.push(format!("{}.path must not be empty", path));
        }
        _ => {}
    }
}

fn validate_http_url(path: &str, value: &str, errors: &mut Vec<String>) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(format!(
            "{} '{}' must use http or https, got '{}'",
            path,
            value,
            url.scheme()
        )),
        Err(e) => errors.push(format!("{} '{}' is not a valid URL: {}", path, value, e)),
    }
}
