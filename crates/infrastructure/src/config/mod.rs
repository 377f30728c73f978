//! Application configuration
//!
//! Split into focused sub-modules by domain:
//! - `tcp`: agent-facing TCP ingress settings
//! - `api`: HTTP query surface settings
//! - `panel`: user-limit directory (panel) client settings
//! - `detection`: detection-engine tuning knobs and data retention
//! - `database`: SQLite database settings
//! - `resilience`: telemetry and retry
//!
//! Every knob is a flat, unprefixed environment variable (`TCP_HOST`,
//! `PANEL_RELOAD_INTERVAL`, `BANLIST_THRESHOLD_SECONDS`, ...). Several of
//! those names carry more underscore-separated words than the nested
//! nesting `config::Environment` performs while consuming the same
//! separator it uses to split segments, so `AppConfig::load` reads them into
//! a flat intermediate record first and only then assembles the nested,
//! ergonomic `AppConfig` the rest of the crate consumes.

mod api;
mod database;
mod detection;
mod panel;
mod resilience;
mod tcp;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub use api::ApiConfig;
pub use database::DatabaseConfig;
pub use detection::DetectionAppConfig;
pub use panel::PanelConfig;
pub use resilience::{RetryAppConfig, TelemetryAppConfig};
pub use tcp::TcpConfig;

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// The full, assembled application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// TCP ingress settings
    pub tcp: TcpConfig,
    /// HTTP query surface settings
    pub api: ApiConfig,
    /// Panel user-limit directory client settings
    pub panel: PanelConfig,
    /// Detection engine tuning knobs and retention
    pub detection: DetectionAppConfig,
    /// SQLite database settings
    pub database: DatabaseConfig,
    /// Telemetry settings
    pub telemetry: TelemetryAppConfig,
    /// Retry settings for external service calls
    pub retry: RetryAppConfig,
}

/// Flat record mirroring the literal environment variable names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawEnv {
    #[serde(default)]
    tcp_host: Option<String>,
    #[serde(default)]
    tcp_port: Option<u16>,
    #[serde(default)]
    api_host: Option<String>,
    #[serde(default)]
    api_port: Option<u16>,
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default)]
    panel_url: Option<String>,
    #[serde(default)]
    panel_token: Option<String>,
    #[serde(default)]
    panel_reload_interval: Option<i64>,
    #[serde(default)]
    concurrent_window: Option<i64>,
    #[serde(default)]
    trigger_period: Option<i64>,
    #[serde(default)]
    trigger_count: Option<u32>,
    #[serde(default)]
    banlist_threshold_seconds: Option<i64>,
    #[serde(default)]
    subnet_grouping: Option<bool>,
    #[serde(default)]
    data_retention_seconds: Option<i64>,
    #[serde(default)]
    whitelist_emails: Option<String>,
    #[serde(default)]
    database_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from an optional `config.toml`, overridden by
    /// environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").try_parsing(true));

        let raw: RawEnv = builder.build()?.try_deserialize()?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawEnv) -> Self {
        let tcp_defaults = TcpConfig::default();
        let api_defaults = ApiConfig::default();
        let panel_defaults = PanelConfig::default();
        let detection_defaults = DetectionAppConfig::default();
        let database_defaults = DatabaseConfig::default();

        Self {
            tcp: TcpConfig {
                host: raw.tcp_host.unwrap_or(tcp_defaults.host),
                port: raw.tcp_port.unwrap_or(tcp_defaults.port),
                idle_timeout_secs: tcp_defaults.idle_timeout_secs,
            },
            api: ApiConfig {
                host: raw.api_host.unwrap_or(api_defaults.host),
                port: raw.api_port.unwrap_or(api_defaults.port),
                token: raw.api_token.map(SecretString::from),
                cors_enabled: api_defaults.cors_enabled,
            },
            panel: PanelConfig {
                url: raw.panel_url.unwrap_or(panel_defaults.url),
                token: raw.panel_token.map(SecretString::from),
                reload_interval_s: raw
                    .panel_reload_interval
                    .unwrap_or(panel_defaults.reload_interval_s),
                page_size: panel_defaults.page_size,
            },
            detection: DetectionAppConfig {
                concurrent_window_s: raw
                    .concurrent_window
                    .unwrap_or(detection_defaults.concurrent_window_s),
                trigger_period_s: raw.trigger_period.unwrap_or(detection_defaults.trigger_period_s),
                trigger_count: raw.trigger_count.unwrap_or(detection_defaults.trigger_count),
                banlist_threshold_s: raw
                    .banlist_threshold_seconds
                    .unwrap_or(detection_defaults.banlist_threshold_s),
                subnet_grouping: raw.subnet_grouping.unwrap_or(detection_defaults.subnet_grouping),
                data_retention_s: raw
                    .data_retention_seconds
                    .unwrap_or(detection_defaults.data_retention_s),
                notification_interval_s: detection_defaults.notification_interval_s,
                whitelist_emails: raw.whitelist_emails.unwrap_or(detection_defaults.whitelist_emails),
            },
            database: DatabaseConfig {
                path: raw.database_path.unwrap_or(database_defaults.path),
                max_connections: database_defaults.max_connections,
                run_migrations: database_defaults.run_migrations,
            },
            telemetry: TelemetryAppConfig::default(),
            retry: RetryAppConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_applies_defaults_when_env_absent() {
        let config = AppConfig::from_raw(RawEnv::default());
        assert_eq!(config.tcp.host, "0.0.0.0");
        assert_eq!(config.tcp.port, 9999);
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.api.port, 8080);
        assert!(config.api.token.is_none());
        assert_eq!(config.panel.url, "http://127.0.0.1:3000");
        assert_eq!(config.panel.reload_interval_s, 300);
        assert_eq!(config.detection.concurrent_window_s, 2);
        assert_eq!(config.detection.trigger_period_s, 30);
        assert_eq!(config.detection.trigger_count, 5);
        assert_eq!(config.detection.banlist_threshold_s, 300);
        assert!(!config.detection.subnet_grouping);
        assert_eq!(config.detection.data_retention_s, 300);
        assert_eq!(config.database.path, "banhammer.db");
    }

    #[test]
    fn from_raw_overrides_with_present_values() {
        let raw = RawEnv {
            tcp_port: Some(4000),
            trigger_count: Some(10),
            subnet_grouping: Some(true),
            whitelist_emails: Some("a@x,b@y".to_string()),
            ..RawEnv::default()
        };
        let config = AppConfig::from_raw(raw);
        assert_eq!(config.tcp.port, 4000);
        assert_eq!(config.detection.trigger_count, 10);
        assert!(config.detection.subnet_grouping);
        assert_eq!(config.detection.whitelist().len(), 2);
    }

    #[test]
    fn panel_token_is_wrapped_as_secret() {
        let raw = RawEnv {
            panel_token: Some("shh".to_string()),
            ..RawEnv::default()
        };
        let config = AppConfig::from_raw(raw);
        assert_eq!(config.panel.token_str(), Some("shh"));
    }
}
