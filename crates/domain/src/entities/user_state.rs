//! Per-user tracking state.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::log_entry::LogEntry;
use crate::value_objects::{NodeName, Protocol, SourceIp, Subnet24};

/// Bound on `UserState::recent_requests`: the engine only needs enough
/// history to serve the `/api/users/{email}` detail view, not a full log.
pub const MAX_RECENT_REQUESTS: usize = 100;

/// Last-seen bookkeeping for one source IP a user has connected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpStats {
    pub last_seen: DateTime<Utc>,
    pub request_count: u32,
}

/// A trimmed-down copy of a log entry kept for the recent-activity ring
/// buffer; carries the originating node since a single user can be seen
/// from multiple nodes concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    pub source_ip: SourceIp,
    pub protocol: Protocol,
    pub destination: String,
    pub destination_port: u16,
    pub action: String,
    pub node_name: NodeName,
}

/// Everything the engine tracks about one user identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    pub ip_stats: HashMap<SourceIp, IpStats>,
    pub recent_requests: VecDeque<RequestRecord>,
    pub request_count: u64,
    pub blocked_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl UserState {
    /// Seed a fresh state from the first observed entry for this user.
    #[must_use]
    pub fn new(entry: &LogEntry, node_name: NodeName) -> Self {
        let mut state = Self {
            ip_stats: HashMap::new(),
            recent_requests: VecDeque::new(),
            request_count: 0,
            blocked_count: 0,
            first_seen: entry.timestamp,
            last_seen: entry.timestamp,
        };
        state.record(entry, node_name);
        state
    }

    /// Fold one newly observed log entry into this user's state.
    pub fn record(&mut self, entry: &LogEntry, node_name: NodeName) {
        self.request_count += 1;
        if entry.is_blocked() {
            self.blocked_count += 1;
        }
        if entry.timestamp > self.last_seen {
            self.last_seen = entry.timestamp;
        }

        let stats = self
            .ip_stats
            .entry(entry.source_ip)
            .or_insert(IpStats {
                last_seen: entry.timestamp,
                request_count: 0,
            });
        stats.request_count += 1;
        if entry.timestamp > stats.last_seen {
            stats.last_seen = entry.timestamp;
        }

        self.recent_requests.push_back(RequestRecord {
            timestamp: entry.timestamp,
            source_ip: entry.source_ip,
            protocol: entry.protocol,
            destination: entry.destination.clone(),
            destination_port: entry.destination_port,
            action: entry.action.clone(),
            node_name,
        });
        while self.recent_requests.len() > MAX_RECENT_REQUESTS {
            self.recent_requests.pop_front();
        }
    }

    /// Distinct source IPs seen within `window_s` seconds of `now`, each
    /// having issued at least `min_requests` requests in that window.
    ///
    /// The request-count floor exists so a single stray probe from a new IP
    /// does not itself count as a concurrent connection.
    #[must_use]
    pub fn recent_ips(&self, now: DateTime<Utc>, window_s: i64, min_requests: u32) -> HashSet<SourceIp> {
        self.ip_stats
            .iter()
            .filter(|(_, stats)| {
                (now - stats.last_seen).num_seconds() <= window_s && stats.request_count >= min_requests
            })
            .map(|(ip, _)| *ip)
            .collect()
    }

    /// Drop IP entries whose last activity is older than `window_s` seconds,
    /// keeping per-user memory bounded for long-lived identities.
    pub fn expire_ips(&mut self, now: DateTime<Utc>, window_s: i64) {
        self.ip_stats
            .retain(|_, stats| (now - stats.last_seen).num_seconds() <= window_s);
    }

    /// Distinct /24 subnets among the IPs active within `window_s` seconds of
    /// `now`, used to tell a genuinely shared device limit apart from many
    /// devices hiding behind one egress NAT.
    #[must_use]
    pub fn recent_ips_by_subnet(&self, now: DateTime<Utc>, window_s: i64) -> HashMap<Subnet24, HashSet<SourceIp>> {
        let mut by_subnet: HashMap<Subnet24, HashSet<SourceIp>> = HashMap::new();
        for (ip, stats) in &self.ip_stats {
            if (now - stats.last_seen).num_seconds() <= window_s {
                by_subnet.entry(ip.subnet24()).or_default().insert(*ip);
            }
        }
        by_subnet
    }
}
