//! Panel user-limit directory configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Where the panel's user directory lives and how often to refresh it.
#[derive(Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Base URL of the panel API (e.g. `http://127.0.0.1:3000`)
    #[serde(default = "default_url")]
    pub url: String,

    /// Bearer token presented to the panel
    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,

    /// Minimum age, in seconds, before `needs_reload()` returns true, default 300s.
    #[serde(default = "default_reload_interval_s")]
    pub reload_interval_s: i64,

    /// Page size used for the paginated directory fetch
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl std::fmt::Debug for PanelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("reload_interval_s", &self.reload_interval_s)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn default_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

const fn default_reload_interval_s() -> i64 {
    300
}

const fn default_page_size() -> u32 {
    500
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            reload_interval_s: default_reload_interval_s(),
            page_size: default_page_size(),
        }
    }
}

impl PanelConfig {
    /// Borrow the configured token, if any, as a plain string.
    #[must_use]
    pub fn token_str(&self) -> Option<&str> {
        use secrecy::ExposeSecret;
        self.token.as_ref().map(ExposeSecret::expose_secret)
    }
}
