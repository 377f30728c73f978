//! Telegram ban-escalation notifier.
//!
//! The original implementation's `core/telegram.py` module (not present in
//! the filtered source pack) sent two distinct messages — "new violation"
//! and "violation continues" — carrying email, telegram id, description,
//! IP count/list, node list, and violation duration. This adapter reproduces
//! that contract over the public Telegram Bot API `sendMessage` call rather
//! than guessing at the original's wire format.

use application::error::ApplicationError;
use application::ports::NotifierPort;
use async_trait::async_trait;
use domain::BanRecord;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{instrument, warn};

use super::{CircuitBreaker, CircuitBreakerConfig};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends operator alerts to a Telegram chat via the Bot API.
pub struct TelegramNotifier {
    client: Client,
    bot_token: SecretString,
    api_base: String,
    circuit_breaker: CircuitBreaker,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("bot_token", &"[REDACTED]")
            .field("circuit_breaker", &self.circuit_breaker.name())
            .finish()
    }
}

impl TelegramNotifier {
    /// Build a notifier for the given bot token, targeting the public Telegram Bot API.
    #[must_use]
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_api_base(bot_token, TELEGRAM_API_BASE.to_string())
    }

    /// Build a notifier against a custom API base (used in tests).
    #[must_use]
    pub fn with_api_base(bot_token: SecretString, api_base: String) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            api_base,
            circuit_breaker: CircuitBreaker::with_config("telegram-notifier", CircuitBreakerConfig::sensitive()),
        }
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ApplicationError> {
        if chat_id.is_empty() {
            warn!("skipping telegram notification: no telegram_id on file");
            return Ok(());
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token.expose_secret());
        let body = json!({ "chat_id": chat_id, "text": text });

        let response = self
            .circuit_breaker
            .call(|| async { self.client.post(&url).json(&body).send().await })
            .await
            .map_err(|e| ApplicationError::ExternalService(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApplicationError::ExternalService(format!(
                "telegram API returned HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn format_new_violation(record: &BanRecord) -> String {
        format!(
            "New device-limit violation\nUser: {}\nIPs ({}): {}\nNodes: {}\nViolating for: {}s",
            record.email,
            record.ip_count,
            join(&record.ips),
            join(&record.nodes),
            record.violation_duration_s,
        )
    }

    fn format_continues(record: &BanRecord) -> String {
        format!(
            "Violation continues\nUser: {}\nIPs ({}): {}\nNodes: {}\nViolating for: {}s",
            record.email,
            record.ip_count,
            join(&record.ips),
            join(&record.nodes),
            record.violation_duration_s,
        )
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl NotifierPort for TelegramNotifier {
    #[instrument(skip(self, record), fields(email = %record.email))]
    async fn notify_new_violation(&self, record: &BanRecord) -> Result<(), ApplicationError> {
        self.send_message(&chat_id_for(record), &Self::format_new_violation(record)).await
    }

    #[instrument(skip(self, record), fields(email = %record.email))]
    async fn notify_continues(&self, record: &BanRecord) -> Result<(), ApplicationError> {
        self.send_message(&chat_id_for(record), &Self::format_continues(record)).await
    }
}

/// Falls back to the record's email only when the directory has no
/// `telegram_id` on file, matching `server.py`'s best-effort
/// `str(panel_info.get('telegram_id', ''))`.
fn chat_id_for(record: &BanRecord) -> String {
    record
        .telegram_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| record.email.to_string())
}
