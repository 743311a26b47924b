use std::{fs, path::Path};

use regex::Regex;
use tracing::{debug, error};

use crate::config::proc_validator;
use crate::config::relay::ServiceConfig;
use crate::config::settings::{LogFormat, LoggingConfig};
use crate::error::ConfigError;
use crate::observability::metrics::get_metrics;
use crate::utils::constants::{DEFAULT_BATCH_WINDOW_MS, DEFAULT_MIN_VALIDITY_SECS};

/// Load and validate config from YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::Parse(format!("cannot read '{}': {}", path.display(), e)))?;

    let expanded = expand_env_vars(&content);
    parse_config(expanded).await
}

pub async fn parse_config(content: String) -> Result<ServiceConfig, ConfigError> {
    let metrics = get_metrics().await;
    let mut service_config: ServiceConfig = serde_yaml::from_str(&content)
        .inspect_err(|e| {
            error!("parse config error: {}", e);
            metrics.config_validation_errors.inc();
        })
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    // Apply defaults
    if service_config.settings.logging.is_none() {
        service_config.settings.logging = Some(LoggingConfig::new("info".to_owned(), LogFormat::Compact));
    }
    if service_config.relay.min_validity_seconds.is_none() {
        service_config.relay.min_validity_seconds = Some(DEFAULT_MIN_VALIDITY_SECS);
    }
    if service_config.relay.batch_window_ms.is_none() {
        service_config.relay.batch_window_ms = Some(DEFAULT_BATCH_WINDOW_MS);
    }

    debug!("validation config ...");
    proc_validator::validate_service_config(&service_config).await?;

    Ok(service_config)
}

/// Replace `${VAR}` and `${VAR:default}` with environment values.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}
