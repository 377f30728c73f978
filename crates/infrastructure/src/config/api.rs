//! HTTP query surface configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::default_true;

/// Where the HTTP query API binds, and the shared bearer token it checks.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host/interface to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared bearer token every request must present (header or `?token=`)
    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("cors_enabled", &self.cors_enabled)
            .finish()
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            token: None,
            cors_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Borrow the configured token, if any, as a plain string.
    #[must_use]
    pub fn token_str(&self) -> Option<&str> {
        use secrecy::ExposeSecret;
        self.token.as_ref().map(ExposeSecret::expose_secret)
    }
}
