//! Port for the persistent ban-list store.

use async_trait::async_trait;
use chrono::Utc;
use domain::{BanRecord, Email, NewBanRecord, NodeName, SourceIp};

use crate::error::ApplicationError;

/// Persisted ban-list storage, idempotent by `(email, active-window)`.
#[async_trait]
pub trait BanSinkPort: Send + Sync {
    /// The currently active ban for `email`, if one was detected or updated
    /// within `lookback_s` seconds of now.
    async fn active_ban(&self, email: &Email, lookback_s: i64) -> Result<Option<BanRecord>, ApplicationError>;

    /// Persist a brand new ban record.
    async fn create(&self, record: NewBanRecord) -> Result<BanRecord, ApplicationError>;

    /// Refresh an existing active ban with the latest observed evidence.
    async fn update(
        &self,
        record_id: i64,
        ip_count: u32,
        ips: Vec<SourceIp>,
        nodes: Vec<NodeName>,
        violation_duration_s: i64,
    ) -> Result<(), ApplicationError>;

    /// All bans detected or updated within the last `hours`.
    async fn list(&self, hours: i64) -> Result<Vec<BanRecord>, ApplicationError>;

    /// Delete every ban record; returns the number removed.
    async fn clear(&self) -> Result<u64, ApplicationError>;
}

#[cfg(test)]
pub use mock::MockBanSinkPort;

#[cfg(test)]
mod mock {
    use super::{ApplicationError, BanRecord, Email, BanSinkPort, NewBanRecord, NodeName, SourceIp};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// In-memory ban sink for tests.
    #[derive(Debug, Clone, Default)]
    pub struct MockBanSinkPort {
        records: Arc<Mutex<Vec<BanRecord>>>,
        next_id: Arc<Mutex<i64>>,
    }

    impl MockBanSinkPort {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn records(&self) -> Vec<BanRecord> {
            self.records.lock().clone()
        }
    }

    #[async_trait]
    impl BanSinkPort for MockBanSinkPort {
        async fn active_ban(&self, email: &Email, lookback_s: i64) -> Result<Option<BanRecord>, ApplicationError> {
            let now = Utc::now();
            Ok(self
                .records
                .lock()
                .iter()
                .find(|r| &r.email == email && (now - r.updated_at).num_seconds() <= lookback_s)
                .cloned())
        }

        async fn create(&self, record: NewBanRecord) -> Result<BanRecord, ApplicationError> {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            let now = Utc::now();
            let stored = BanRecord {
                id: *next_id,
                email: record.email,
                telegram_id: record.telegram_id,
                ip_count: record.ip_count,
                ips: record.ips,
                nodes: record.nodes,
                violation_duration_s: record.violation_duration_s,
                detected_at: record.detected_at,
                updated_at: now,
            };
            self.records.lock().push(stored.clone());
            Ok(stored)
        }

        async fn update(
            &self,
            record_id: i64,
            ip_count: u32,
            ips: Vec<SourceIp>,
            nodes: Vec<NodeName>,
            violation_duration_s: i64,
        ) -> Result<(), ApplicationError> {
            let mut records = self.records.lock();
            let record = records
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or_else(|| ApplicationError::NotFound(format!("ban record {record_id}")))?;
            record.ip_count = ip_count;
            record.ips = ips;
            record.nodes = nodes;
            record.violation_duration_s = violation_duration_s;
            record.updated_at = Utc::now();
            Ok(())
        }

        async fn list(&self, hours: i64) -> Result<Vec<BanRecord>, ApplicationError> {
            let now = Utc::now();
            Ok(self
                .records
                .lock()
                .iter()
                .filter(|r| (now - r.updated_at).num_seconds() <= hours * 3600)
                .cloned()
                .collect())
        }

        async fn clear(&self) -> Result<u64, ApplicationError> {
            let mut records = self.records.lock();
            let count = records.len() as u64;
            records.clear();
            Ok(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn new_record(email: Email) -> NewBanRecord {
        NewBanRecord {
            email,
            telegram_id: None,
            ip_count: 3,
            ips: vec![SourceIp::new(Ipv4Addr::new(1, 1, 1, 1))],
            nodes: vec![NodeName::new("fra-01").unwrap()],
            violation_duration_s: 300,
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_active_ban_finds_it() {
        let sink = MockBanSinkPort::new();
        let email = Email::new("a@x").unwrap();
        sink.create(new_record(email.clone())).await.unwrap();

        let found = sink.active_ban(&email, 86400).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn clear_removes_all_and_reports_count() {
        let sink = MockBanSinkPort::new();
        sink.create(new_record(Email::new("a@x").unwrap())).await.unwrap();
        sink.create(new_record(Email::new("b@x").unwrap())).await.unwrap();

        let removed = sink.clear().await.unwrap();
        assert_eq!(removed, 2);
        assert!(sink.records().is_empty());
    }
}
