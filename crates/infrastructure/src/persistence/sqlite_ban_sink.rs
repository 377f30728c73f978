//! SQLite-based ban-record persistence.

use std::sync::Arc;

use application::{error::ApplicationError, ports::BanSinkPort};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{BanRecord, Email, NewBanRecord, NodeName, SourceIp};
use rusqlite::{Row, params};
use tokio::task;
use tracing::{debug, instrument};

use super::connection::ConnectionPool;

/// SQLite-based ban-record store
#[derive(Debug, Clone)]
pub struct SqliteBanSink {
    pool: Arc<ConnectionPool>,
}

impl SqliteBanSink {
    /// Create a new SQLite ban sink
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanSinkPort for SqliteBanSink {
    #[instrument(skip(self), fields(email = %email))]
    async fn active_ban(&self, email: &Email, lookback_s: i64) -> Result<Option<BanRecord>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let email = email.clone();
        let cutoff = (Utc::now() - chrono::Duration::seconds(lookback_s)).to_rfc3339();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            let result = conn
                .query_row(
                    "SELECT id, email, telegram_id, ip_count, ips, nodes, violation_duration_s, detected_at, updated_at
                     FROM ban_records
                     WHERE email = ?1 AND updated_at >= ?2
                     ORDER BY updated_at DESC
                     LIMIT 1",
                    params![email.as_str(), cutoff],
                    row_to_ban_record,
                )
                .optional()
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            result.transpose().map_err(ApplicationError::Internal)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self, record), fields(email = %record.email))]
    async fn create(&self, record: NewBanRecord) -> Result<BanRecord, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let now = Utc::now();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            conn.execute(
                "INSERT INTO ban_records (
                    email, telegram_id, ip_count, ips, nodes, violation_duration_s, detected_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.email.as_str(),
                    record.telegram_id,
                    record.ip_count,
                    join_ips(&record.ips),
                    join_nodes(&record.nodes),
                    record.violation_duration_s,
                    record.detected_at.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            let id = conn.last_insert_rowid();
            debug!(id, "Created ban record");

            Ok(BanRecord {
                id,
                email: record.email,
                telegram_id: record.telegram_id,
                ip_count: record.ip_count,
                ips: record.ips,
                nodes: record.nodes,
                violation_duration_s: record.violation_duration_s,
                detected_at: record.detected_at,
                updated_at: now,
            })
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self, ips, nodes), fields(record_id))]
    async fn update(
        &self,
        record_id: i64,
        ip_count: u32,
        ips: Vec<SourceIp>,
        nodes: Vec<NodeName>,
        violation_duration_s: i64,
    ) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let now = Utc::now().to_rfc3339();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            let affected = conn
                .execute(
                    "UPDATE ban_records SET
                        ip_count = ?1, ips = ?2, nodes = ?3, violation_duration_s = ?4, updated_at = ?5
                     WHERE id = ?6",
                    params![
                        ip_count,
                        join_ips(&ips),
                        join_nodes(&nodes),
                        violation_duration_s,
                        now,
                        record_id,
                    ],
                )
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            if affected == 0 {
                return Err(ApplicationError::NotFound(format!("ban record {record_id}")));
            }

            debug!("Updated ban record");
            Ok(())
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn list(&self, hours: i64) -> Result<Vec<BanRecord>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let cutoff = (Utc::now() - chrono::Duration::hours(hours)).to_rfc3339();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            let mut stmt = conn
                .prepare(
                    "SELECT id, email, telegram_id, ip_count, ips, nodes, violation_duration_s, detected_at, updated_at
                     FROM ban_records
                     WHERE updated_at >= ?1
                     ORDER BY updated_at DESC",
                )
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            let records: Vec<BanRecord> = stmt
                .query_map([&cutoff], row_to_ban_record)
                .map_err(|e| ApplicationError::Internal(e.to_string()))?
                .filter_map(Result::ok)
                .filter_map(Result::ok)
                .collect();

            debug!(count = records.len(), "Listed ban records");
            Ok(records)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<u64, ApplicationError> {
        let pool = Arc::clone(&self.pool);

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            let deleted = conn
                .execute("DELETE FROM ban_records", [])
                .map_err(|e| ApplicationError::Internal(e.to_string()))?;

            debug!(deleted, "Cleared ban records");
            #[allow(clippy::cast_sign_loss)] // DELETE count is always non-negative
            Ok(deleted as u64)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }
}

fn join_ips(ips: &[SourceIp]) -> String {
    ips.iter().map(ToString::to_string).collect::<Vec<_>>().join("|")
}

fn join_nodes(nodes: &[NodeName]) -> String {
    nodes.iter().map(NodeName::as_str).collect::<Vec<_>>().join("|")
}

/// Convert a database row into a `BanRecord`. Returns an error string (not a
/// `rusqlite::Error`) for malformed stored data, since those only arise from
/// hand-edited rows, never from this sink's own writes.
fn row_to_ban_record(row: &Row<'_>) -> rusqlite::Result<Result<BanRecord, String>> {
    let id: i64 = row.get(0)?;
    let email_str: String = row.get(1)?;
    let telegram_id: Option<String> = row.get(2)?;
    let ip_count: u32 = row.get(3)?;
    let ips_str: String = row.get(4)?;
    let nodes_str: String = row.get(5)?;
    let violation_duration_s: i64 = row.get(6)?;
    let detected_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(parse_ban_record(
        id,
        &email_str,
        telegram_id,
        ip_count,
        &ips_str,
        &nodes_str,
        violation_duration_s,
        &detected_at_str,
        &updated_at_str,
    ))
}

#[allow(clippy::too_many_arguments)]
fn parse_ban_record(
    id: i64,
    email_str: &str,
    telegram_id: Option<String>,
    ip_count: u32,
    ips_str: &str,
    nodes_str: &str,
    violation_duration_s: i64,
    detected_at_str: &str,
    updated_at_str: &str,
) -> Result<BanRecord, String> {
    let email = Email::new(email_str).map_err(|e| e.to_string())?;

    let ips = ips_str
        .split('|')
        .filter(|s| !s.is_empty())
        .map(SourceIp::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    let nodes = nodes_str
        .split('|')
        .filter(|s| !s.is_empty())
        .map(NodeName::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    let detected_at = parse_rfc3339(detected_at_str)?;
    let updated_at = parse_rfc3339(updated_at_str)?;

    Ok(BanRecord {
        id,
        email,
        telegram_id,
        ip_count,
        ips,
        nodes,
        violation_duration_s,
        detected_at,
        updated_at,
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
