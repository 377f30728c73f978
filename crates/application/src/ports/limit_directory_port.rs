//! Port for the cached per-user device-limit directory.

use async_trait::async_trait;
use domain::{Email, UserLimitEntry};

use crate::error::ApplicationError;

/// Read-through cache of externally configured per-user device limits.
///
/// `get` never blocks on the network: the adapter serves the last
/// successfully fetched snapshot and refreshes it on its own schedule.
/// Returning `None` means "no limit configured", which the detection engine
/// treats as "do not evaluate" rather than an error.
#[async_trait]
pub trait LimitDirectoryPort: Send + Sync {
    /// Look up the current limit entry for `email`.
    async fn get(&self, email: &Email) -> Option<UserLimitEntry>;

    /// Force an out-of-schedule refresh against the upstream panel.
    async fn refresh(&self) -> Result<(), ApplicationError>;

    /// Whether the cached snapshot is stale enough to warrant a refresh.
    fn needs_reload(&self) -> bool;
}

#[cfg(test)]
pub use mock::MockLimitDirectoryPort;


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_returns_none_for_unknown_user() {
        let port = MockLimitDirectoryPort::new();
        let email = Email::new("a@x").unwrap();
        assert!(port.get(&email).await.is_none());
    }

    #[tokio::test]
    async fn mock_returns_inserted_entry() {
        let port = MockLimitDirectoryPort::new();
        let email = Email::new("a@x").unwrap();
        port.insert(UserLimitEntry::new(email.clone(), 2));

        let entry = port.get(&email).await.unwrap();
        assert_eq!(entry.device_limit, 2);
    }
}
