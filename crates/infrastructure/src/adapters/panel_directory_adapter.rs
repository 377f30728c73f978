//! Panel user-limit directory adapter.
//!
//! Fetches the full user directory from the upstream panel in pages, caches
//! it in an `ArcSwap` snapshot, and serves lookups from that snapshot without
//! ever blocking on the network. Refreshing is the caller's responsibility
//! (`needs_reload` / `refresh`), mirroring `PanelAPI.get_limit` /
//! `PanelAPI.needs_reload` in the original Python implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use application::error::ApplicationError;
use application::ports::LimitDirectoryPort;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use domain::{Email, UserLimitEntry};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::PanelConfig;

/// Response envelope: `{"response": {"users": [...]}}` or `{"response": [...]}`.
#[derive(Debug, Deserialize)]
struct UsersResponse {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseBody {
    Wrapped { users: Vec<PanelUser> },
    Bare(Vec<PanelUser>),
}

impl ResponseBody {
    fn into_users(self) -> Vec<PanelUser> {
        match self {
            Self::Wrapped { users } => users,
            Self::Bare(users) => users,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PanelUser {
    id: String,
    #[serde(default = "default_device_limit")]
    #[serde(rename = "hwidDeviceLimit")]
    hwid_device_limit: u32,
    #[serde(rename = "telegramId")]
    telegram_id: Option<String>,
    description: Option<String>,
    username: Option<String>,
}

const fn default_device_limit() -> u32 {
    1
}

/// Panel-backed `LimitDirectoryPort`, refreshed on a schedule external to this adapter.
pub struct PanelDirectoryAdapter {
    client: Client,
    config: PanelConfig,
    circuit_breaker: CircuitBreaker,
    entries: ArcSwap<HashMap<Email, UserLimitEntry>>,
    last_loaded_unix_s: AtomicI64,
}

impl std::fmt::Debug for PanelDirectoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelDirectoryAdapter")
            .field("url", &self.config.url)
            .field("circuit_breaker", &self.circuit_breaker.name())
            .field("cached_users", &self.entries.load().len())
            .finish()
    }
}

impl PanelDirectoryAdapter {
    /// Build an adapter with an empty cache; call `refresh` before serving traffic.
    #[must_use]
    pub fn new(config: PanelConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            circuit_breaker: CircuitBreaker::with_config("panel-directory", CircuitBreakerConfig::resilient()),
            entries: ArcSwap::from_pointee(HashMap::new()),
            last_loaded_unix_s: AtomicI64::new(0),
        }
    }

    async fn fetch_page(&self, start: u32) -> Result<Vec<PanelUser>, ApplicationError> {
        let url = format!(
            "{}/api/users?start={start}&size={}",
            self.config.url.trim_end_matches('/'),
            self.config.page_size
        );

        let mut request = self.client.get(&url);
        if let Some(token) = self.config.token_str() {
            request = request.bearer_auth(token);
        }

        let response = self
            .circuit_breaker
            .call(|| async { request.send().await })
            .await
            .map_err(|e| ApplicationError::ExternalService(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApplicationError::ExternalService(format!(
                "panel returned HTTP {}",
                response.status()
            )));
        }

        let body: UsersResponse = response
            .json()
            .await
            .map_err(|e| ApplicationError::ExternalService(format!("invalid panel response: {e}")))?;

        Ok(body.response.into_users())
    }
}

#[async_trait]
impl LimitDirectoryPort for PanelDirectoryAdapter {
    #[instrument(skip(self))]
    async fn get(&self, email: &Email) -> Option<UserLimitEntry> {
        self.entries.load().get(email).cloned()
    }

    #[instrument(skip(self))]
    async fn refresh(&self) -> Result<(), ApplicationError> {
        info!(url = %self.config.url, "Loading user directory from panel");

        let mut all_users = Vec::new();
        let mut start = 0u32;
        loop {
            let page = self.fetch_page(start).await?;
            let fetched = page.len();
            all_users.extend(page);

            if fetched < self.config.page_size as usize {
                break;
            }
            start += self.config.page_size;
        }

        let mut map = HashMap::with_capacity(all_users.len());
        for user in all_users {
            if user.id.is_empty() {
                continue;
            }
            let email = match Email::new(&user.id) {
                Ok(email) => email,
                Err(e) => {
                    warn!(raw = %user.id, error = %e, "skipping panel user with invalid id");
                    continue;
                },
            };
            let mut entry = UserLimitEntry::new(email.clone(), user.hwid_device_limit);
            entry.telegram_id = user.telegram_id;
            entry.username = user.username;
            entry.description = user.description;
            map.insert(email, entry);
        }

        debug!(count = map.len(), "Loaded panel user directory");
        self.entries.store(Arc::new(map));
        self.last_loaded_unix_s.store(chrono::Utc::now().timestamp(), Ordering::Relaxed);

        Ok(())
    }

    fn needs_reload(&self) -> bool {
        let last = self.last_loaded_unix_s.load(Ordering::Relaxed);
        if last == 0 {
            return true;
        }
        chrono::Utc::now().timestamp() - last > self.config.reload_interval_s
    }
}
