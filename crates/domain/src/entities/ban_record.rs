//! Ban-list record persisted for an active over-limit violator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Email, NodeName, SourceIp};

/// A single entry written to the ban sink once a violator crosses the
/// ban-list threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanRecord {
    pub id: i64,
    pub email: Email,
    /// Directory-side Telegram chat id, carried along so notifiers don't
    /// need a second directory lookup. `None` when the directory has none on file.
    #[serde(default)]
    pub telegram_id: Option<String>,
    pub ip_count: u32,
    pub ips: Vec<SourceIp>,
    pub nodes: Vec<NodeName>,
    pub violation_duration_s: i64,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to write or refresh a ban record; the sink assigns `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBanRecord {
    pub email: Email,
    pub telegram_id: Option<String>,
    pub ip_count: u32,
    pub ips: Vec<SourceIp>,
    pub nodes: Vec<NodeName>,
    pub violation_duration_s: i64,
    pub detected_at: DateTime<Utc>,
}
