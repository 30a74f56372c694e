//! Config validation. Every problem is collected into one
//! `ConfigError::ValidationError`, joined with `; `.

use cordlink_common::ConfigError;

use crate::schema::{ClientConfig, ProxyConfig};

fn require_non_empty(errors: &mut Vec<String>, name: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(format!("{name} must not be empty"));
    }
}

fn finish(errors: Vec<String>) -> Result<(), ConfigError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

pub fn validate_client(config: &ClientConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    require_non_empty(&mut errors, "host", &config.host);
    require_non_empty(&mut errors, "client_id", &config.client_id);
    require_non_empty(&mut errors, "client_secret", &config.client_secret);
    if config.port == 0 {
        errors.push("port must be between 1 and 65535".into());
    }
    if config.reconnect_delay_ms == 0 {
        errors.push("reconnect_delay_ms must be positive".into());
    }
    if config.request_timeout_ms == 0 {
        errors.push("request_timeout_ms must be positive".into());
    }

    finish(errors)
}

pub fn validate_proxy(config: &ProxyConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    require_non_empty(&mut errors, "client_id", &config.client_id);
    require_non_empty(&mut errors, "client_secret", &config.client_secret);
    require_non_empty(&mut errors, "redirect_uri", &config.redirect_uri);
    if config.scopes.is_empty() {
        errors.push("scopes must not be empty".into());
    }

    finish(errors)
}
