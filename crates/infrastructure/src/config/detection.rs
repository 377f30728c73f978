//! Detection-engine tuning knobs plus the tracker's data retention window.

use std::collections::HashSet;

use application::DetectionConfig;
use domain::Email;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The env-facing view of `DetectionConfig`, plus the tracker's retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionAppConfig {
    /// Short window for counting "simultaneous" IPs, default 2s.
    #[serde(default = "default_concurrent_window_s")]
    pub concurrent_window_s: i64,

    /// Window over which triggers accumulate, default 30s.
    #[serde(default = "default_trigger_period_s")]
    pub trigger_period_s: i64,

    /// Triggers needed to enter violator state, default 5.
    #[serde(default = "default_trigger_count")]
    pub trigger_count: u32,

    /// Seconds in violator state before a persistent ban, default 300s.
    #[serde(default = "default_banlist_threshold_s")]
    pub banlist_threshold_s: i64,

    /// Count distinct /24s instead of distinct IPs
    #[serde(default)]
    pub subnet_grouping: bool,

    /// Seconds of inactivity before a user is purged from the tracker, default 300s.
    #[serde(default = "default_data_retention_s")]
    pub data_retention_s: i64,

    /// Minimum gap between per-user notifications, default 300s.
    #[serde(default = "default_notification_interval_s")]
    pub notification_interval_s: i64,

    /// Emails exempt from all detection, comma-separated
    #[serde(default)]
    pub whitelist_emails: String,
}

const fn default_concurrent_window_s() -> i64 {
    2
}

const fn default_trigger_period_s() -> i64 {
    30
}

const fn default_trigger_count() -> u32 {
    5
}

const fn default_banlist_threshold_s() -> i64 {
    300
}

const fn default_data_retention_s() -> i64 {
    300
}

const fn default_notification_interval_s() -> i64 {
    300
}

impl Default for DetectionAppConfig {
    fn default() -> Self {
        Self {
            concurrent_window_s: default_concurrent_window_s(),
            trigger_period_s: default_trigger_period_s(),
            trigger_count: default_trigger_count(),
            banlist_threshold_s: default_banlist_threshold_s(),
            subnet_grouping: false,
            data_retention_s: default_data_retention_s(),
            notification_interval_s: default_notification_interval_s(),
            whitelist_emails: String::new(),
        }
    }
}

impl DetectionAppConfig {
    /// Parse `whitelist_emails` into a set, dropping entries that fail the
    /// `Email` invariant (blank after trimming) with a warning instead of
    /// failing config load entirely.
    #[must_use]
    pub fn whitelist(&self) -> HashSet<Email> {
        self.whitelist_emails
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match Email::new(s) {
                Ok(email) => Some(email),
                Err(e) => {
                    warn!(raw = s, error = %e, "ignoring malformed WHITELIST_EMAILS entry");
                    None
                },
            })
            .collect()
    }

    /// Build the application-layer `DetectionConfig` this tunes.
    #[must_use]
    pub fn to_detection_config(&self) -> DetectionConfig {
        DetectionConfig {
            concurrent_window_s: self.concurrent_window_s,
            trigger_period_s: self.trigger_period_s,
            trigger_count: self.trigger_count,
            banlist_threshold_s: self.banlist_threshold_s,
            subnet_grouping: self.subnet_grouping,
            whitelist_emails: self.whitelist(),
            notification_interval_s: self.notification_interval_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_thresholds() {
        let config = DetectionAppConfig::default();
        assert_eq!(config.concurrent_window_s, 2);
        assert_eq!(config.trigger_period_s, 30);
        assert_eq!(config.trigger_count, 5);
        assert_eq!(config.banlist_threshold_s, 300);
        assert!(!config.subnet_grouping);
        assert_eq!(config.data_retention_s, 300);
        assert_eq!(config.notification_interval_s, 300);
    }

    #[test]
    fn whitelist_parses_comma_separated() {
        let config = DetectionAppConfig {
            whitelist_emails: "a@x, b@y ,, c@z".to_string(),
            ..DetectionAppConfig::default()
        };
        let set = config.whitelist();
        assert_eq!(set.len(), 3);
        assert!(set.contains(&Email::new("a@x").unwrap()));
        assert!(set.contains(&Email::new("c@z").unwrap()));
    }

    #[test]
    fn whitelist_empty_string_yields_empty_set() {
        let config = DetectionAppConfig::default();
        assert!(config.whitelist().is_empty());
    }

    #[test]
    fn to_detection_config_round_trips_fields() {
        let config = DetectionAppConfig {
            trigger_count: 10,
            subnet_grouping: true,
            ..DetectionAppConfig::default()
        };
        let detection = config.to_detection_config();
        assert_eq!(detection.trigger_count, 10);
        assert!(detection.subnet_grouping);
    }
}
