//! Configuration schema definitions.
//!
//! The service's configuration document predates this crate, so the original
//! key names (`bEnableHTTPS`, `Website.websiteport`, ...) are kept on the wire
//! via `serde(rename)`. Keys added by the orchestrator use snake_case.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Primary listener port.
    pub port: u16,

    /// Companion website listener.
    #[serde(rename = "Website")]
    pub website: WebsiteConfig,

    /// Serve the primary listener over TLS.
    #[serde(rename = "bEnableHTTPS")]
    pub enable_https: bool,

    /// Certificate material, only read when `enable_https` is set.
    pub ssl: SslConfig,

    /// Activate the rotation job at startup.
    #[serde(rename = "bUseAutoRotate")]
    pub use_auto_rotate: bool,

    /// Schedule a supervised restart.
    #[serde(rename = "bEnableAutoBackendRestart")]
    pub enable_auto_restart: bool,

    /// Restart trigger, either `HH:MM` (local time) or a delay such as `6h`.
    #[serde(rename = "bRestartTime")]
    pub restart_time: String,

    pub discord: DiscordConfig,

    pub mongodb: DatabaseConfig,

    /// Persisted token document.
    pub tokens_path: PathBuf,

    /// Per-account client settings storage, created at startup.
    pub client_settings_dir: PathBuf,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Prometheus exporter bind address. Disabled when absent.
    pub metrics_address: Option<String>,

    pub update_check: UpdateCheckConfig,

    pub rate_limit: RateLimitConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            website: WebsiteConfig::default(),
            enable_https: false,
            ssl: SslConfig::default(),
            use_auto_rotate: false,
            enable_auto_restart: false,
            restart_time: String::new(),
            discord: DiscordConfig::default(),
            mongodb: DatabaseConfig::default(),
            tokens_path: PathBuf::from("tokenManager/tokens.json"),
            client_settings_dir: PathBuf::from("ClientSettings"),
            log_level: "reload_backend=debug,tower_http=info".to_string(),
            metrics_address: None,
            update_check: UpdateCheckConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Companion website settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebsiteConfig {
    #[serde(rename = "bUseWebsite")]
    pub enabled: bool,

    #[serde(rename = "websiteport")]
    pub port: u16,
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 100,
        }
    }
}

/// TLS material paths (PEM).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SslConfig {
    pub cert: String,
    pub key: String,
    /// Optional CA chain, ignored when the file does not exist.
    pub ca: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscordConfig {
    #[serde(rename = "bUseDiscordBot")]
    pub enabled: bool,
}

/// Document database connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string. Empty disables the startup connectivity probe.
    pub database: String,

    /// Probe timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            connect_timeout_secs: 5,
        }
    }
}

/// Version polling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateCheckConfig {
    pub enabled: bool,

    /// Document exposing the latest published `version`. Polling is skipped
    /// when no URL is configured.
    pub url: Option<String>,

    pub interval_secs: u64,
}

impl Default for UpdateCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            interval_secs: 60,
        }
    }
}

/// Fixed-window rate limiting per client IP.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    pub window_secs: u64,

    /// Requests allowed per window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 30,
            max_requests: 45,
        }
    }
}
