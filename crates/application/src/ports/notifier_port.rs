//! Port for operator notifications on ban escalation.

use async_trait::async_trait;
use domain::BanRecord;

use crate::error::ApplicationError;

/// Sends an operator-facing alert when a violator is first banned or when an
/// existing ban continues to accrue evidence.
///
/// Failures are the caller's responsibility to log and swallow — a notifier
/// outage must never interrupt detection.
#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// A brand-new ban was just created.
    async fn notify_new_violation(&self, record: &BanRecord) -> Result<(), ApplicationError>;

    /// An existing ban was refreshed and the notification throttle allowed
    /// another alert.
    async fn notify_continues(&self, record: &BanRecord) -> Result<(), ApplicationError>;
}

/// A notifier that does nothing; used when no alerting channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl NotifierPort for NullNotifier {
    async fn notify_new_violation(&self, _record: &BanRecord) -> Result<(), ApplicationError> {
        Ok(())
    }

    async fn notify_continues(&self, _record: &BanRecord) -> Result<(), ApplicationError> {
        Ok(())
    }
}

#[cfg(test)]
pub use mock::MockNotifierPort;


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_notifier_is_a_no_op() {
        let notifier = NullNotifier;
        let record = BanRecord {
            id: 1,
            email: domain::Email::new("a@x").unwrap(),
            telegram_id: None,
            ip_count: 3,
            ips: vec![],
            nodes: vec![],
            violation_duration_s: 300,
            detected_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert!(notifier.notify_new_violation(&record).await.is_ok());
        assert!(notifier.notify_continues(&record).await.is_ok());
    }
}
