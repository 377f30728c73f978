//! Application state shared across handlers

use std::sync::Arc;

use application::ports::BanSinkPort;
use application::EngineHandle;
use ingress_tcp::NodeRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::SecretString;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Handle to the single-writer engine actor owning tracker/detection state
    pub engine: EngineHandle,
    /// Persistent ban-list store, queried directly (outside the engine actor)
    pub ban_sink: Arc<dyn BanSinkPort>,
    /// Currently connected TCP ingress nodes
    pub registry: NodeRegistry,
    /// Prometheus metrics renderer
    pub prometheus: PrometheusHandle,
    /// Shared bearer token, if auth is enabled
    pub api_token: Option<SecretString>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("connected_nodes", &self.registry.len())
            .field("auth_enabled", &self.api_token.is_some())
            .finish_non_exhaustive()
    }
}
