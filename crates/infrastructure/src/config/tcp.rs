//! TCP ingress listener configuration.

use serde::{Deserialize, Serialize};

/// Where the agent-facing TCP line server binds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Host/interface to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Idle-read timeout before a connection is dropped.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    9999
}

const fn default_idle_timeout_secs() -> u64 {
    30
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}
