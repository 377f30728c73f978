//! Parsed access-log entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Email, Protocol, SourceIp};

/// The one verdict tag the engine treats specially; every other value is an
/// opaque pass-through.
pub const BLOCK_ACTION: &str = "BLOCK";

/// A single, immutable parsed log line.
///
/// Every field is non-empty after parsing; malformed lines never reach this
/// type — they are dropped at the ingress boundary instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub source_ip: SourceIp,
    pub protocol: Protocol,
    pub destination: String,
    pub destination_port: u16,
    pub action: String,
    pub email: Email,
}

impl LogEntry {
    /// Whether this entry's verdict was the reserved `BLOCK` tag.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.action == BLOCK_ACTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample() -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            source_ip: SourceIp::new(Ipv4Addr::new(10, 0, 0, 1)),
            protocol: Protocol::Tcp,
            destination: "example.com".to_string(),
            destination_port: 443,
            action: "DIRECT".to_string(),
            email: Email::new("a@x").unwrap(),
        }
    }

    #[test]
    fn is_blocked_matches_reserved_tag() {
        let mut entry = sample();
        assert!(!entry.is_blocked());
        entry.action = BLOCK_ACTION.to_string();
        assert!(entry.is_blocked());
    }
}
