//! Configuration validation.
//!
//! Semantic checks on top of what serde enforces syntactically. Runs before
//! a config is accepted into the system, both at startup and on reload.
//! All errors are collected and reported together, not just the first.

use std::collections::HashSet;
use url::Url;

use crate::config::schema::Config;
use crate::load_balancer::is_known_strategy;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable description of the problem.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(err("server.port", "port cannot be 0"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(err("server.request_timeout_secs", "timeout must be positive"));
    }

    if config.backends.is_empty() {
        errors.push(err("backends", "at least one backend must be specified"));
    }
    let mut seen = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        let field = format!("backends[{i}].url");
        match Url::parse(&backend.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                if !seen.insert(url) {
                    errors.push(err(&field, format!("duplicate backend url: {}", backend.url)));
                }
            }
            Ok(url) => {
                errors.push(err(&field, format!("unsupported scheme: {}", url.scheme())));
            }
            Err(e) => {
                errors.push(err(&field, format!("invalid url: {e}")));
            }
        }
        if backend.timeout_secs == 0 {
            errors.push(err(
                &format!("backends[{i}].timeout_secs"),
                "backend timeout must be positive",
            ));
        }
    }

    if !is_known_strategy(&config.load_balancing.strategy) {
        errors.push(err(
            "load_balancing.strategy",
            format!("unknown strategy: {}", config.load_balancing.strategy),
        ));
    }

    let hc = &config.load_balancing.health_check;
    if hc.interval_secs == 0 {
        errors.push(err("load_balancing.health_check.interval_secs", "interval must be positive"));
    }
    if hc.timeout_secs == 0 {
        errors.push(err("load_balancing.health_check.timeout_secs", "timeout must be positive"));
    }
    if hc.interval_secs > 0 && hc.timeout_secs >= hc.interval_secs {
        errors.push(err(
            "load_balancing.health_check.timeout_secs",
            "probe timeout must be less than the interval",
        ));
    }
    if hc.unhealthy_threshold == 0 {
        errors.push(err(
            "load_balancing.health_check.unhealthy_threshold",
            "threshold must be positive",
        ));
    }
    if hc.healthy_threshold == 0 {
        errors.push(err(
            "load_balancing.health_check.healthy_threshold",
            "threshold must be positive",
        ));
    }

    let rl = &config.rate_limiter;
    if rl.enabled {
        if rl.rate <= 0.0 {
            errors.push(err("rate_limiter.rate", "refill rate must be positive when enabled"));
        }
        if rl.capacity == 0 {
            errors.push(err("rate_limiter.capacity", "capacity must be at least 1"));
        }
        if rl.max_clients == 0 {
            errors.push(err("rate_limiter.max_clients", "client cap must be at least 1"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    fn sample_config() -> Config {
        let mut config = Config::default();
        config.backends.push(BackendConfig {
            url: "http://127.0.0.1:9001".into(),
            timeout_secs: 5,
        });
        config
    }

    #[test]
    fn sample_config_is_valid() {
        assert!(validate_config(&sample_config()).is_ok());
    }

    #[test]
    fn empty_backend_list_rejected() {
        let config = Config::default();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "backends"));
    }

    #[test]
    fn duplicate_backend_rejected() {
        let mut config = sample_config();
        config.backends.push(BackendConfig {
            url: "http://127.0.0.1:9001".into(),
            timeout_secs: 3,
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[test]
    fn unknown_strategy_rejected() {
        let mut config = sample_config();
        config.load_balancing.strategy = "weighted_dice".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "load_balancing.strategy"));
    }

    #[test]
    fn probe_timeout_must_fit_in_interval() {
        let mut config = sample_config();
        config.load_balancing.health_check.interval_secs = 5;
        config.load_balancing.health_check.timeout_secs = 5;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("less than the interval")));
    }

    #[test]
    fn limiter_checked_only_when_enabled() {
        let mut config = sample_config();
        config.rate_limiter.rate = 0.0;
        assert!(validate_config(&config).is_ok());

        config.rate_limiter.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "rate_limiter.rate"));
    }
}
