//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that enabled features carry the settings they need
//! - Validate value ranges (intervals > 0, distinct ports)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BackendConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - TLS files are only checked for presence in the document here; reading
//!   them is the listener's job

use crate::config::schema::BackendConfig;
use crate::maintenance::restart::RestartSchedule;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending key.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &BackendConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.enable_https {
        if config.ssl.cert.trim().is_empty() {
            errors.push(ValidationError::new("ssl.cert", "required when bEnableHTTPS is set"));
        }
        if config.ssl.key.trim().is_empty() {
            errors.push(ValidationError::new("ssl.key", "required when bEnableHTTPS is set"));
        }
    }

    // Port 0 asks the OS for an ephemeral port, so two zeros never collide.
    if config.website.enabled && config.port != 0 && config.website.port == config.port {
        errors.push(ValidationError::new(
            "Website.websiteport",
            format!("must differ from the primary port {}", config.port),
        ));
    }

    if config.enable_auto_restart {
        if let Err(e) = RestartSchedule::parse(&config.restart_time) {
            errors.push(ValidationError::new("bRestartTime", e.to_string()));
        }
    }

    if config.update_check.enabled && config.update_check.interval_secs == 0 {
        errors.push(ValidationError::new("update_check.interval_secs", "must be greater than 0"));
    }

    if let Some(url) = &config.update_check.url {
        if let Err(e) = url::Url::parse(url) {
            errors.push(ValidationError::new("update_check.url", format!("invalid URL: {}", e)));
        }
    }

    if config.rate_limit.enabled {
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
        }
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
        }
    }

    if let Some(addr) = &config.metrics_address {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new("metrics_address", format!("not a socket address: {}", addr)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
